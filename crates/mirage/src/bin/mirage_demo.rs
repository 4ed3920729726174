//! # MIRAGE Headless Demo
//!
//! Replicates a small scene to a headless render thread:
//! - a spinning parent node with an orbiting child
//! - a camera whose exposure is set over RPC
//! - a `Beacon` class defined at startup and mirrored generically
//!
//! Usage: `mirage_demo [config.toml] [ticks]`
//!
//! `RUST_LOG` overrides the configured log filter.

use std::process::ExitCode;
use std::time::Duration;

use mirage::core::{FieldKind, FieldValue, SchemaError, SchemaRegistry};
use mirage::render::HeadlessSurface;
use mirage::shared::scene::{CAMERA, SCENE_NODE};
use mirage::shared::{register_scene_schemas, MirageConfig, RpcValue, Transform};
use mirage::{GameLoop, LoopError};
use tracing_subscriber::EnvFilter;

const DEFAULT_TICKS: u64 = 240;

fn demo_schemas(registry: &SchemaRegistry) -> Result<(), SchemaError> {
    register_scene_schemas(registry)?;
    registry.define_field("Beacon", "intensity", 1, FieldKind::U8)?;
    registry.define_field("Beacon", "label", 12, FieldKind::Str { capacity: 12 })?;
    Ok(())
}

fn main() -> ExitCode {
    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => match MirageConfig::load(&path) {
            Ok(config) => config,
            Err(error) => {
                eprintln!("mirage_demo: {error}");
                return ExitCode::FAILURE;
            }
        },
        None => MirageConfig::default(),
    };
    let ticks = args
        .next()
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(DEFAULT_TICKS);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(config, ticks) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!("Demo failed: {}", error);
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn run(config: MirageConfig, ticks: u64) -> Result<(), LoopError> {
    let surface = HeadlessSurface::new(
        "headless",
        config.render.initial_width,
        config.render.initial_height,
    );
    let mut game = GameLoop::start(config, demo_schemas, Some(Box::new(surface)))?;
    game.wait_running(Duration::from_secs(5))?;

    let sync = game.synchronizer_mut();
    let pivot = sync.register_proxy(SCENE_NODE)?;
    let moon = sync.register_proxy(SCENE_NODE)?;
    let camera = sync.register_proxy_with_port(CAMERA)?;
    let beacon = sync.register_proxy("Beacon")?;

    sync.set_fields(pivot, Transform::IDENTITY.fields())?;
    sync.set_fields(moon, Transform::from_position([2.0, 0.0, 0.0]).fields())?;
    sync.set_fields(pivot, [("visible", FieldValue::Bool(true)), ("name", "pivot".into())])?;
    sync.set_fields(moon, [("visible", FieldValue::Bool(true)), ("name", "moon".into())])?;
    sync.set_reference(moon, "parent", pivot)?;
    sync.set_fields(
        camera,
        [
            ("position_z", FieldValue::F32(10.0)),
            ("fov_y", FieldValue::F32(1.0)),
            ("near", FieldValue::F32(0.1)),
            ("far", FieldValue::F32(100.0)),
            ("active", FieldValue::Bool(true)),
        ],
    )?;
    sync.call_rpc(camera, "set_exposure", vec![RpcValue::F32(1.5)])?;
    sync.set_field(beacon, "label", "north tower")?;

    game.run_for(ticks, |sync, tick| {
        let angle = tick as f32 * 0.05;
        let (sin, cos) = (angle * 0.5).sin_cos();
        sync.set_fields(pivot, [("rotation_y", sin), ("rotation_w", cos)])?;
        sync.set_field(beacon, "intensity", u8::try_from(tick % 256).unwrap_or(0))?;
        if tick == ticks / 2 {
            sync.resize_viewport(1280, 720)?;
        }
        Ok(())
    })?;

    let sync = game.synchronizer();
    if let Some(info) = sync.rendering_info() {
        tracing::info!(
            "Render side at frame {} showing tick {} ({}x{})",
            info.frame,
            info.published_tick,
            info.width,
            info.height
        );
    }
    game.timings().log_summary("simulation");

    let report = game.shutdown()?;
    tracing::info!(
        "Render thread stopped after {} frames with {} proxies",
        report.frames,
        report.proxies
    );
    Ok(())
}
