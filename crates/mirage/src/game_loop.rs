//! # MIRAGE Game Loop
//!
//! Runs the producer on the calling thread and the consumer on a dedicated
//! render thread.
//!
//! ```text
//! game thread                                render thread ("mirage-render")
//! ───────────                                ───────────────────────────────
//! setup schemas                              setup schemas (own registry)
//! post Init ──── bootstrap port ───────────> RenderContext::bootstrap
//!            <─── control port ──── Running  publish rendering info
//! per tick:                                  per frame:
//!   update(&mut Synchronizer)                  pump()   control + RPC ports
//!   poll_control()                             render_frame()
//!   flush() ──── Proxy / triple buffers ───>   tick proxies
//! shutdown(): post Shutdown ───────────────> Flow::Shutdown, thread exits
//! ```

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use mirage_core::{SchemaError, SchemaRegistry};
use mirage_render::{ContextError, Flow, ProxyFactory, RenderContext};
use mirage_shared::config::ConfigError;
use mirage_shared::protocol::{ControlMessage, RenderSurface};
use mirage_shared::scene::RenderingInfo;
use mirage_shared::{channel, MessagePort, MirageConfig};
use mirage_sync::{FlushStats, SyncError, Synchronizer};
use thiserror::Error;

/// How long the render thread waits for `Init`.
pub const BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(5);

/// Sleep between polls while waiting for `Running`.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Registers the replicated classes on one context's registry.
///
/// Called once per context, so both sides derive identical layouts.
pub type SchemaSetup = fn(&SchemaRegistry) -> Result<(), SchemaError>;

/// Errors raised by [`GameLoop`].
#[derive(Error, Debug)]
pub enum LoopError {
    /// Configuration rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Schema setup failed on the game thread.
    #[error("schema setup failed: {0}")]
    Schema(#[from] SchemaError),

    /// Producer-side failure.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// The render thread stopped with an error.
    #[error("render thread failed: {0}")]
    Render(#[from] ContextError),

    /// The render thread could not be started.
    #[error("failed to spawn render thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// The render thread panicked.
    #[error("render thread panicked")]
    RenderPanicked,

    /// The render thread was already joined.
    #[error("render thread already stopped")]
    RenderStopped,

    /// `Running` did not arrive in time.
    #[error("render context not running after {0:?}")]
    NotRunning(Duration),
}

/// Timing statistics for one loop.
#[derive(Clone, Debug)]
pub struct LoopTimings {
    /// Iterations recorded.
    pub recorded: u64,
    /// Sum of iteration times.
    pub total_us_sum: u64,
    /// Fastest iteration.
    pub min_us: u64,
    /// Slowest iteration.
    pub max_us: u64,
    /// Iterations slower than the budget.
    pub over_budget: u64,
    /// Target time of one iteration.
    pub budget: Duration,
}

impl LoopTimings {
    /// Creates an empty accumulator for the given budget.
    #[must_use]
    pub fn new(budget: Duration) -> Self {
        Self {
            recorded: 0,
            total_us_sum: 0,
            min_us: u64::MAX,
            max_us: 0,
            over_budget: 0,
            budget,
        }
    }

    /// Records one iteration. Returns true if it exceeded the budget.
    pub fn record(&mut self, elapsed: Duration) -> bool {
        let us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.recorded += 1;
        self.total_us_sum = self.total_us_sum.saturating_add(us);
        self.min_us = self.min_us.min(us);
        self.max_us = self.max_us.max(us);

        let over = elapsed > self.budget;
        if over {
            self.over_budget += 1;
        }
        over
    }

    /// Average iteration time in milliseconds.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn avg_ms(&self) -> f64 {
        if self.recorded == 0 {
            return 0.0;
        }
        (self.total_us_sum as f64 / self.recorded as f64) / 1000.0
    }

    /// Average iterations per second.
    #[must_use]
    pub fn avg_rate(&self) -> f64 {
        let avg_ms = self.avg_ms();
        if avg_ms <= 0.0 {
            return 0.0;
        }
        1000.0 / avg_ms
    }

    /// Share of iterations over budget.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn over_budget_ratio(&self) -> f64 {
        if self.recorded == 0 {
            return 0.0;
        }
        self.over_budget as f64 / self.recorded as f64
    }

    /// Logs a one-line summary.
    pub fn log_summary(&self, label: &str) {
        tracing::info!(
            "{}: {} iterations, avg {:.3} ms ({:.1}/s), {:.1}% over {:?}",
            label,
            self.recorded,
            self.avg_ms(),
            self.avg_rate(),
            self.over_budget_ratio() * 100.0,
            self.budget
        );
    }
}

/// What the render thread reports when it stops.
#[derive(Clone, Debug)]
pub struct RenderReport {
    /// Frames drawn.
    pub frames: u32,
    /// Proxies alive at shutdown.
    pub proxies: usize,
    /// Last published rendering info.
    pub last: RenderingInfo,
    /// Frame timings.
    pub timings: LoopTimings,
}

/// Game thread half of a running MIRAGE pair.
///
/// Dropping the loop shuts the render thread down and joins it.
#[derive(Debug)]
pub struct GameLoop {
    synchronizer: Synchronizer,
    render: Option<JoinHandle<Result<RenderReport, ContextError>>>,
    config: MirageConfig,
    timings: LoopTimings,
}

impl GameLoop {
    /// Starts the render thread with the built-in proxy types and posts
    /// `Init` to it.
    ///
    /// # Errors
    ///
    /// Config validation, schema setup or thread spawn failures.
    pub fn start(
        config: MirageConfig,
        setup: SchemaSetup,
        surface: Option<Box<dyn RenderSurface>>,
    ) -> Result<Self, LoopError> {
        Self::start_with_factory(config, setup, surface, ProxyFactory::with_builtins())
    }

    /// As [`GameLoop::start`], building render proxies with `factory`.
    ///
    /// # Errors
    ///
    /// Config validation, schema setup or thread spawn failures.
    pub fn start_with_factory(
        config: MirageConfig,
        setup: SchemaSetup,
        surface: Option<Box<dyn RenderSurface>>,
        factory: ProxyFactory,
    ) -> Result<Self, LoopError> {
        config.validate()?;

        let registry = SchemaRegistry::new();
        setup(&registry)?;

        let (game_port, render_port) = channel();
        let synchronizer = Synchronizer::new(Arc::new(registry), game_port, &config)?;

        let (bootstrap, inbox) = channel();
        let frame_budget = config.frame_duration();
        let render = thread::Builder::new()
            .name("mirage-render".into())
            .spawn(move || render_main(&inbox, setup, factory, frame_budget))
            .map_err(LoopError::Spawn)?;

        let (width, height) = initial_viewport(&config, surface.as_deref());
        let init = synchronizer.init_message(surface, width, height, render_port);
        if !bootstrap.post(ControlMessage::Init(init)) {
            tracing::error!("Render thread exited before bootstrap");
        }

        let timings = LoopTimings::new(config.tick_duration());
        Ok(Self {
            synchronizer,
            render: Some(render),
            config,
            timings,
        })
    }

    /// Polls until the render context reports `Running`.
    ///
    /// # Errors
    ///
    /// - [`LoopError::NotRunning`] after `timeout`.
    /// - The render thread's own error if it stopped first.
    pub fn wait_running(&mut self, timeout: Duration) -> Result<(), LoopError> {
        let deadline = Instant::now() + timeout;
        loop {
            self.synchronizer.poll_control();
            if self.synchronizer.is_consumer_running() {
                return Ok(());
            }
            if self.render.as_ref().map_or(true, JoinHandle::is_finished) {
                self.join_render()?;
                return Err(LoopError::NotRunning(timeout));
            }
            if Instant::now() >= deadline {
                return Err(LoopError::NotRunning(timeout));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Handles consumer messages, then flushes one tick.
    ///
    /// # Errors
    ///
    /// As [`Synchronizer::flush`].
    pub fn tick(&mut self) -> Result<FlushStats, LoopError> {
        self.synchronizer.poll_control();
        Ok(self.synchronizer.flush()?)
    }

    /// Runs `ticks` paced simulation ticks.
    ///
    /// `update` receives the synchronizer and the tick about to be flushed.
    ///
    /// # Errors
    ///
    /// The first error returned by `update` or by a flush.
    pub fn run_for<F>(&mut self, ticks: u64, mut update: F) -> Result<(), LoopError>
    where
        F: FnMut(&mut Synchronizer, u64) -> Result<(), SyncError>,
    {
        let budget = self.config.tick_duration();
        for _ in 0..ticks {
            let started = Instant::now();
            let tick = self.synchronizer.tick();
            update(&mut self.synchronizer, tick)?;
            self.tick()?;

            let elapsed = started.elapsed();
            if self.timings.record(elapsed) {
                tracing::debug!(
                    "Tick {} exceeded budget: {:.2}ms (target: {:.2}ms)",
                    tick,
                    elapsed.as_secs_f64() * 1000.0,
                    budget.as_secs_f64() * 1000.0
                );
            }
            if let Some(rest) = budget.checked_sub(elapsed) {
                thread::sleep(rest);
            }
        }
        Ok(())
    }

    /// The producer.
    #[must_use]
    pub fn synchronizer(&self) -> &Synchronizer {
        &self.synchronizer
    }

    /// The producer, for registering objects and writing fields.
    pub fn synchronizer_mut(&mut self) -> &mut Synchronizer {
        &mut self.synchronizer
    }

    /// Tick timings recorded by [`GameLoop::run_for`].
    #[must_use]
    pub fn timings(&self) -> &LoopTimings {
        &self.timings
    }

    /// Stops the render thread and returns its report.
    ///
    /// # Errors
    ///
    /// The render thread's error, or [`LoopError::RenderPanicked`].
    pub fn shutdown(mut self) -> Result<RenderReport, LoopError> {
        self.stop_render()
    }

    fn stop_render(&mut self) -> Result<RenderReport, LoopError> {
        if let Err(error) = self.synchronizer.post(ControlMessage::Shutdown) {
            tracing::debug!("Shutdown not delivered: {}", error);
        }
        self.join_render()
    }

    fn join_render(&mut self) -> Result<RenderReport, LoopError> {
        let handle = self.render.take().ok_or(LoopError::RenderStopped)?;
        match handle.join() {
            Ok(result) => Ok(result?),
            Err(_) => Err(LoopError::RenderPanicked),
        }
    }
}

impl Drop for GameLoop {
    fn drop(&mut self) {
        if self.render.is_some() {
            if let Err(error) = self.stop_render() {
                tracing::warn!("Render thread stopped abnormally: {}", error);
            }
        }
    }
}

/// The surface's own size, or the configured viewport for a surface that
/// reports zero.
fn initial_viewport(config: &MirageConfig, surface: Option<&dyn RenderSurface>) -> (u32, u32) {
    surface
        .map(|surface| surface.size())
        .filter(|&(width, height)| width > 0 && height > 0)
        .unwrap_or((config.render.initial_width, config.render.initial_height))
}

fn render_main(
    inbox: &MessagePort<ControlMessage>,
    setup: SchemaSetup,
    factory: ProxyFactory,
    budget: Duration,
) -> Result<RenderReport, ContextError> {
    let schemas = SchemaRegistry::new();
    setup(&schemas)?;
    let mut context = RenderContext::bootstrap(inbox, BOOTSTRAP_TIMEOUT, schemas, factory)?;

    let mut timings = LoopTimings::new(budget);
    loop {
        let started = Instant::now();
        if context.pump()? == Flow::Shutdown {
            break;
        }
        let info = context.render_frame()?;

        let elapsed = started.elapsed();
        if timings.record(elapsed) {
            tracing::debug!(
                "Frame {} exceeded budget: {:.2}ms",
                info.frame,
                elapsed.as_secs_f64() * 1000.0
            );
        }
        if let Some(rest) = budget.checked_sub(elapsed) {
            thread::sleep(rest);
        }
    }

    timings.log_summary("render");
    Ok(RenderReport {
        frames: context.frame(),
        proxies: context.proxies().len(),
        last: context.rendering_info(),
        timings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirage_render::HeadlessSurface;
    use mirage_shared::register_scene_schemas;
    use mirage_shared::scene::SCENE_NODE;

    fn fast_config() -> MirageConfig {
        let mut config = MirageConfig::default();
        config.simulation.tick_rate = 1000;
        config.render.frame_rate = 1000;
        config
    }

    fn surface() -> Option<Box<dyn RenderSurface>> {
        Some(Box::new(HeadlessSurface::new("test", 64, 64)))
    }

    #[test]
    fn test_timings() {
        let mut timings = LoopTimings::new(Duration::from_millis(10));
        assert_eq!(timings.avg_ms(), 0.0);
        assert!(!timings.record(Duration::from_millis(4)));
        assert!(timings.record(Duration::from_millis(16)));
        assert_eq!(timings.recorded, 2);
        assert_eq!((timings.min_us, timings.max_us), (4_000, 16_000));
        assert!((timings.avg_ms() - 10.0).abs() < 1e-9);
        assert!((timings.avg_rate() - 100.0).abs() < 1e-9);
        assert!((timings.over_budget_ratio() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_start_tick_shutdown() {
        let mut game = GameLoop::start(fast_config(), register_scene_schemas, surface()).unwrap();
        game.wait_running(Duration::from_secs(5)).unwrap();

        let id = game.synchronizer_mut().register_proxy(SCENE_NODE).unwrap();
        game.run_for(3, |sync, tick| sync.set_field(id, "position_x", tick as f32))
            .unwrap();
        assert_eq!(game.synchronizer().tick(), 3);
        assert_eq!(game.timings().recorded, 3);

        let report = game.shutdown().unwrap();
        assert_eq!(report.proxies, 1);
        assert_eq!((report.last.width, report.last.height), (64, 64));
    }

    #[test]
    fn test_missing_surface_surfaces_render_error() {
        let mut game = GameLoop::start(fast_config(), register_scene_schemas, None).unwrap();
        assert!(matches!(
            game.wait_running(Duration::from_secs(5)),
            Err(LoopError::Render(ContextError::MissingSurface))
        ));
        assert!(matches!(game.shutdown(), Err(LoopError::RenderStopped)));
    }

    #[test]
    fn test_surface_size_wins_over_config() {
        let config = fast_config();
        let sized = HeadlessSurface::new("sized", 64, 48);
        assert_eq!(initial_viewport(&config, Some(&sized)), (64, 48));

        let empty = HeadlessSurface::new("empty", 0, 0);
        let configured = (config.render.initial_width, config.render.initial_height);
        assert_eq!(initial_viewport(&config, Some(&empty)), configured);
        assert_eq!(initial_viewport(&config, None), configured);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = fast_config();
        config.simulation.tick_rate = 0;
        assert!(matches!(
            GameLoop::start(config, register_scene_schemas, surface()),
            Err(LoopError::Config(_))
        ));
    }
}
