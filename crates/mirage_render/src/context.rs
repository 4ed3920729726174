//! # Render Context
//!
//! Owns the drawing surface, the proxy registry and the rendering-info
//! block of one render thread.
//!
//! ## Lifecycle
//!
//! ```text
//! bootstrap: first message must be Init
//!            ├─ no surface       -> ContextError::MissingSurface
//!            └─ ok               -> post Running { rendering_info }
//! per frame: pump()        drain control port + dedicated RPC ports
//!            render_frame() tick proxies, publish rendering info
//! teardown:  Shutdown      -> Flow::Shutdown
//! ```

use std::sync::Arc;
use std::time::Duration;

use mirage_core::{
    decode_values, encode_values, ProxyId, Schema, SchemaRegistry, TripleBuffer,
    TripleBufferHandle, TripleBufferWriter,
};
use mirage_shared::protocol::{ControlMessage, InitMessage, ProxyCreate, RenderSurface};
use mirage_shared::scene::{
    rendering_info_schema, simulation_info_schema, RenderingInfo, SimulationInfo,
};
use mirage_shared::{MessagePort, PeerGone};

use crate::error::ContextError;
use crate::factory::ProxyFactory;
use crate::proxy::{ProxyCore, RenderProxy};
use crate::registry::ProxyRegistry;

/// Whether the render loop keeps going.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    /// Keep rendering.
    Continue,
    /// The producer asked the loop to stop.
    Shutdown,
}

/// Render-thread state built from an `Init` message.
pub struct RenderContext {
    surface: Box<dyn RenderSurface>,
    port: MessagePort<ControlMessage>,
    schemas: SchemaRegistry,
    factory: ProxyFactory,
    proxies: ProxyRegistry,
    simulation_info: Option<TripleBufferHandle>,
    simulation_schema: Arc<Schema>,
    rendering_schema: Arc<Schema>,
    rendering_info: TripleBufferWriter,
    scratch: Vec<u8>,
    frame: u32,
    published_tick: u32,
}

impl RenderContext {
    /// Waits up to `timeout` for the first message on `inbox`, which must be
    /// `Init`, and builds the context from it.
    ///
    /// # Errors
    ///
    /// - [`ContextError::BootstrapTimeout`] if nothing arrives in time.
    /// - [`ContextError::NotInitialized`] if the first message is not `Init`.
    /// - Anything [`RenderContext::from_init`] returns.
    pub fn bootstrap(
        inbox: &MessagePort<ControlMessage>,
        timeout: Duration,
        schemas: SchemaRegistry,
        factory: ProxyFactory,
    ) -> Result<Self, ContextError> {
        match inbox.recv_timeout(timeout) {
            Some(ControlMessage::Init(init)) => Self::from_init(init, schemas, factory),
            Some(other) => Err(ContextError::NotInitialized(other.kind())),
            None => Err(ContextError::BootstrapTimeout(timeout)),
        }
    }

    /// Builds the context and reports `Running` on the reply port.
    ///
    /// `schemas` is this context's own registry; it must describe every
    /// class the producer will create proxies for.
    ///
    /// # Errors
    ///
    /// - [`ContextError::MissingSurface`] if the host provided no surface.
    /// - [`ContextError::ChannelClosed`] if `Running` cannot be posted.
    pub fn from_init(
        init: InitMessage,
        schemas: SchemaRegistry,
        factory: ProxyFactory,
    ) -> Result<Self, ContextError> {
        let InitMessage {
            surface,
            initial_width,
            initial_height,
            port,
            flags,
        } = init;
        let mut surface = surface.ok_or(ContextError::MissingSurface)?;
        if surface.size() != (initial_width, initial_height) {
            surface.resize(initial_width, initial_height);
        }

        let simulation_schema = Arc::new(simulation_info_schema()?);
        let simulation_info = flags.into_iter().next().filter(|handle| {
            let matches = handle.byte_len() == simulation_schema.byte_len();
            if !matches {
                tracing::warn!(
                    "Ignoring simulation-info block of {} bytes, expected {}",
                    handle.byte_len(),
                    simulation_schema.byte_len()
                );
            }
            matches
        });

        let rendering_schema = Arc::new(rendering_info_schema()?);
        let (rendering_info, handle) = TripleBuffer::create(rendering_schema.byte_len());

        let mut context = Self {
            surface,
            port,
            schemas,
            factory,
            proxies: ProxyRegistry::new(),
            simulation_info,
            simulation_schema,
            rendering_schema,
            rendering_info,
            scratch: Vec::new(),
            frame: 0,
            published_tick: 0,
        };
        context.publish_rendering_info()?;

        if !context.port.post(ControlMessage::Running {
            rendering_info: handle,
        }) {
            return Err(ContextError::ChannelClosed);
        }

        tracing::info!(
            "Render context running on {} ({}x{})",
            context.surface.label(),
            initial_width,
            initial_height
        );
        Ok(context)
    }

    /// Applies one control message.
    ///
    /// Protocol violations are logged and ignored.
    ///
    /// # Errors
    ///
    /// - [`ContextError::AlreadyInitialized`] on a second `Init`.
    /// - Rendering-info publish failures on resize.
    pub fn handle_message(&mut self, message: ControlMessage) -> Result<Flow, ContextError> {
        match message {
            ControlMessage::Init(_) => {
                tracing::error!("Rejected second init message");
                return Err(ContextError::AlreadyInitialized);
            }
            ControlMessage::Proxy(batch) => {
                for create in batch {
                    self.create_proxy(create);
                }
            }
            ControlMessage::Rpc { id, message } => {
                self.proxies.dispatch(id, &message);
            }
            ControlMessage::ViewportResize { width, height } => {
                self.surface.resize(width, height);
                self.proxies.resize_all(width, height);
                self.publish_rendering_info()?;
                tracing::debug!("Viewport resized to {}x{}", width, height);
            }
            ControlMessage::Ref { ref_id, parent_id } => {
                if !self.proxies.contains(ref_id) || !self.proxies.contains(parent_id) {
                    tracing::debug!(
                        "Reference {} -> {} stays unresolved until both proxies exist",
                        parent_id,
                        ref_id
                    );
                }
            }
            ControlMessage::Destroy { id, tick } => {
                if self.proxies.remove(id).is_some() {
                    tracing::debug!("Destroyed proxy {} at tick {}", id, tick);
                } else {
                    tracing::warn!("Destroy for unknown proxy {}", id);
                }
            }
            ControlMessage::Running { .. } => {
                tracing::warn!("Ignoring `running` message sent to the render context");
            }
            ControlMessage::Shutdown => return Ok(Flow::Shutdown),
        }
        Ok(Flow::Continue)
    }

    /// Drains the control port, then every dedicated RPC port.
    ///
    /// Messages queued behind a `Shutdown` are dropped. A producer that
    /// dropped its port counts as a `Shutdown`.
    ///
    /// # Errors
    ///
    /// As [`RenderContext::handle_message`].
    pub fn pump(&mut self) -> Result<Flow, ContextError> {
        loop {
            match self.port.poll() {
                Ok(Some(message)) => {
                    if self.handle_message(message)? == Flow::Shutdown {
                        return Ok(Flow::Shutdown);
                    }
                }
                Ok(None) => break,
                Err(PeerGone) => {
                    tracing::info!("Producer dropped its control port, stopping");
                    return Ok(Flow::Shutdown);
                }
            }
        }
        self.proxies.pump_rpc();
        Ok(Flow::Continue)
    }

    /// Ticks every proxy against the latest simulation info and publishes
    /// the rendering-info block.
    ///
    /// # Errors
    ///
    /// Rendering-info encode or publish failures.
    pub fn render_frame(&mut self) -> Result<RenderingInfo, ContextError> {
        let simulation = self.simulation_info().unwrap_or_default();
        self.proxies.tick_all(simulation.time);

        self.frame = self.frame.wrapping_add(1);
        self.published_tick = simulation.tick;
        self.publish_rendering_info()
    }

    /// Latest simulation-info block, if the producer shared one.
    #[must_use]
    pub fn simulation_info(&self) -> Option<SimulationInfo> {
        let handle = self.simulation_info.as_ref()?;
        let snapshot = handle.snapshot();
        let values = decode_values(self.simulation_schema.fields(), &snapshot.bytes).ok()?;
        SimulationInfo::from_values(&values)
    }

    /// Rendering info as last published.
    #[must_use]
    pub fn rendering_info(&self) -> RenderingInfo {
        let (width, height) = self.surface.size();
        RenderingInfo {
            frame: self.frame,
            published_tick: self.published_tick,
            width: u16::try_from(width).unwrap_or(u16::MAX),
            height: u16::try_from(height).unwrap_or(u16::MAX),
        }
    }

    /// All live proxies.
    #[must_use]
    pub fn proxies(&self) -> &ProxyRegistry {
        &self.proxies
    }

    /// One proxy.
    #[must_use]
    pub fn proxy(&self, id: ProxyId) -> Option<&dyn RenderProxy> {
        self.proxies.get(id)
    }

    /// Frames rendered so far.
    #[must_use]
    pub fn frame(&self) -> u32 {
        self.frame
    }

    /// Current surface size.
    #[must_use]
    pub fn surface_size(&self) -> (u32, u32) {
        self.surface.size()
    }

    fn create_proxy(&mut self, create: ProxyCreate) {
        let ProxyCreate {
            constructor,
            class,
            id,
            tb,
            port,
            tick,
        } = create;

        let schema = match self.schemas.seal(&class) {
            Ok(schema) => schema,
            Err(err) => {
                tracing::warn!("Dropped proxy {} of `{}`: {}", id, class, err);
                return;
            }
        };
        let core = match ProxyCore::new(id, schema, tb, port) {
            Ok(core) => core,
            Err(err) => {
                tracing::warn!("Dropped proxy {}: {}", id, err);
                return;
            }
        };

        let mut proxy = self.factory.build(&constructor, core);
        let (width, height) = self.surface.size();
        proxy.resize(width, height);
        if self.proxies.insert(proxy).is_some() {
            tracing::warn!("Proxy {} replaced an existing proxy with the same id", id);
        }
        tracing::debug!("Created {} for {} ({}) at tick {}", constructor, class, id, tick);
    }

    fn publish_rendering_info(&mut self) -> Result<RenderingInfo, ContextError> {
        let info = self.rendering_info();
        self.scratch.clear();
        self.scratch.resize(self.rendering_schema.byte_len(), 0);
        encode_values(self.rendering_schema.fields(), &info.values(), &mut self.scratch)?;
        self.rendering_info.copy_to_write_buffer(&self.scratch)?;
        Ok(info)
    }
}

impl std::fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderContext")
            .field("surface", &self.surface)
            .field("proxies", &self.proxies.len())
            .field("frame", &self.frame)
            .finish_non_exhaustive()
    }
}
