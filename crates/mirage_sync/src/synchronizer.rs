//! # Proxy Synchronizer
//!
//! Owns the authoritative copy of every replicated object and the writer of
//! its triple buffer.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut sync = Synchronizer::new(registry, game_port, &config)?;
//! let node = sync.register_proxy("SceneNode")?;
//! sync.set_field(node, "position_x", 4.0f32)?;
//! sync.flush()?; // render thread now reads position_x == 4.0
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use mirage_core::{
    decode_values, encode_values, CodecError, FieldValue, ProxyId, Schema, SchemaError,
    SchemaRegistry, TripleBuffer, TripleBufferHandle, TripleBufferWriter,
};
use mirage_shared::protocol::{ControlMessage, InitMessage, ProxyCreate, RenderSurface};
use mirage_shared::scene::{
    rendering_info_schema, simulation_info_schema, RenderingInfo, SimulationInfo,
};
use mirage_shared::{channel, MessagePort, MirageConfig, RpcMessage, RpcValue};

use crate::dirty::DirtySet;
use crate::error::{SyncError, SyncResult};
use crate::ids::IdAllocator;

/// What one [`Synchronizer::flush`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Tick that was flushed.
    pub tick: u64,
    /// Create-proxy instructions sent.
    pub created: usize,
    /// Objects encoded and published.
    pub published: usize,
    /// Bytes copied into write slots.
    pub bytes: usize,
}

/// Authoritative state of one replicated object.
struct Authority {
    schema: Arc<Schema>,
    values: Vec<FieldValue>,
    writer: TripleBufferWriter,
    rpc: Option<MessagePort<RpcMessage>>,
}

/// A global block published by this context.
struct InfoBlock {
    schema: Arc<Schema>,
    writer: TripleBufferWriter,
}

/// Producer side of replication for one game context.
pub struct Synchronizer {
    registry: Arc<SchemaRegistry>,
    port: MessagePort<ControlMessage>,
    ids: IdAllocator,
    objects: HashMap<ProxyId, Authority>,
    dirty: DirtySet,
    pending: Vec<ProxyCreate>,
    scratch: Vec<u8>,
    tick: u64,
    tick_seconds: f32,
    simulation_info: InfoBlock,
    rendering_info: Option<TripleBufferHandle>,
    rendering_schema: Arc<Schema>,
}

impl Synchronizer {
    /// Creates a synchronizer publishing over `port`.
    ///
    /// # Errors
    ///
    /// Only fails if the built-in info schemas are broken.
    pub fn new(
        registry: Arc<SchemaRegistry>,
        port: MessagePort<ControlMessage>,
        config: &MirageConfig,
    ) -> SyncResult<Self> {
        let info_schema = Arc::new(simulation_info_schema()?);
        let (writer, _) = TripleBuffer::create(info_schema.byte_len());

        Ok(Self {
            registry,
            port,
            ids: IdAllocator::new(),
            objects: HashMap::new(),
            dirty: DirtySet::new(),
            pending: Vec::new(),
            scratch: Vec::new(),
            tick: 0,
            tick_seconds: config.tick_duration().as_secs_f32(),
            simulation_info: InfoBlock {
                schema: info_schema,
                writer,
            },
            rendering_info: None,
            rendering_schema: Arc::new(rendering_info_schema()?),
        })
    }

    /// Builds the bootstrap message for the render context.
    ///
    /// `consumer_port` is the render end of the control pair this
    /// synchronizer posts on.
    #[must_use]
    pub fn init_message(
        &self,
        surface: Option<Box<dyn RenderSurface>>,
        initial_width: u32,
        initial_height: u32,
        consumer_port: MessagePort<ControlMessage>,
    ) -> InitMessage {
        InitMessage {
            surface,
            initial_width,
            initial_height,
            port: consumer_port,
            flags: vec![self.simulation_info.writer.handle()],
        }
    }

    /// Registers a new instance of `class` and returns its id.
    ///
    /// Seals the class schema, allocates a triple buffer sized to it and
    /// queues the create-proxy instruction for the next flush.
    ///
    /// # Errors
    ///
    /// - [`SyncError::MissingSchema`] if the class was never annotated.
    /// - [`SyncError::IdsExhausted`] if no id is left.
    pub fn register_proxy(&mut self, class: &str) -> SyncResult<ProxyId> {
        self.register(class, false)
    }

    /// Like [`Synchronizer::register_proxy`], and also opens a dedicated RPC
    /// port whose consumer end travels with the create-proxy instruction.
    ///
    /// # Errors
    ///
    /// As [`Synchronizer::register_proxy`].
    pub fn register_proxy_with_port(&mut self, class: &str) -> SyncResult<ProxyId> {
        self.register(class, true)
    }

    fn register(&mut self, class: &str, with_port: bool) -> SyncResult<ProxyId> {
        let schema = self.registry.seal(class).map_err(|err| match err {
            SchemaError::NotFound(class) => SyncError::MissingSchema(class),
            other => SyncError::Schema(other),
        })?;
        let id = self.ids.allocate()?;

        let (writer, handle) = TripleBuffer::create(schema.byte_len());
        let (rpc, consumer_port) = if with_port {
            let (producer, consumer) = channel::<RpcMessage>();
            (Some(producer), Some(consumer))
        } else {
            (None, None)
        };

        self.pending.push(ProxyCreate {
            constructor: schema.constructor().to_owned(),
            class: class.to_owned(),
            id,
            tb: handle,
            port: consumer_port,
            tick: self.tick,
        });
        self.objects.insert(
            id,
            Authority {
                values: schema.default_values(),
                schema,
                writer,
                rpc,
            },
        );
        self.dirty.mark(id);

        tracing::debug!("Registered {} as {}", class, id);
        Ok(id)
    }

    /// Sets one authoritative field and marks the object dirty.
    ///
    /// # Errors
    ///
    /// - [`SyncError::UnknownProxy`] for unregistered or destroyed ids.
    /// - [`SyncError::UnknownField`] if the class has no such field.
    /// - [`SyncError::Codec`] if the value kind disagrees with the field.
    pub fn set_field(
        &mut self,
        id: ProxyId,
        name: &str,
        value: impl Into<FieldValue>,
    ) -> SyncResult<()> {
        let object = self.objects.get_mut(&id).ok_or(SyncError::UnknownProxy(id))?;
        let index = object
            .schema
            .field_index(name)
            .ok_or_else(|| SyncError::UnknownField {
                class: object.schema.class().to_owned(),
                field: name.to_owned(),
            })?;

        let value = value.into();
        let field = &object.schema.fields()[index];
        if !value.matches(field.kind) {
            return Err(SyncError::Codec(CodecError::KindMismatch {
                field: field.name.clone(),
                expected: field.kind.name(),
                found: value.kind_name(),
            }));
        }

        object.values[index] = value;
        self.dirty.mark(id);
        Ok(())
    }

    /// Sets several fields of one object.
    ///
    /// # Errors
    ///
    /// Stops at the first failing field; earlier fields stay applied.
    pub fn set_fields<I, V>(&mut self, id: ProxyId, fields: I) -> SyncResult<()>
    where
        I: IntoIterator<Item = (&'static str, V)>,
        V: Into<FieldValue>,
    {
        for (name, value) in fields {
            self.set_field(id, name, value)?;
        }
        Ok(())
    }

    /// Current authoritative value of a field.
    ///
    /// # Errors
    ///
    /// [`SyncError::UnknownProxy`] or [`SyncError::UnknownField`].
    pub fn field(&self, id: ProxyId, name: &str) -> SyncResult<&FieldValue> {
        let object = self.objects.get(&id).ok_or(SyncError::UnknownProxy(id))?;
        object
            .schema
            .field_index(name)
            .map(|index| &object.values[index])
            .ok_or_else(|| SyncError::UnknownField {
                class: object.schema.class().to_owned(),
                field: name.to_owned(),
            })
    }

    /// Points the `Ref` field `name` of `id` at `target` and tells the
    /// consumer about the new edge.
    ///
    /// [`ProxyId::NONE`] clears the reference without a message.
    ///
    /// # Errors
    ///
    /// As [`Synchronizer::set_field`]; [`SyncError::UnknownProxy`] if
    /// `target` is not registered.
    pub fn set_reference(&mut self, id: ProxyId, name: &str, target: ProxyId) -> SyncResult<()> {
        if !target.is_none() && !self.objects.contains_key(&target) {
            return Err(SyncError::UnknownProxy(target));
        }
        self.set_field(id, name, FieldValue::Ref(target))?;
        if target.is_none() {
            return Ok(());
        }

        self.send_pending()?;
        self.post(ControlMessage::Ref {
            ref_id: target,
            parent_id: id,
        })
    }

    /// Invokes `name` on the render proxy of `id`.
    ///
    /// Uses the object's dedicated port if it has one, the control port
    /// otherwise. Queued creations are sent first so the call never overtakes
    /// the proxy it targets.
    ///
    /// # Errors
    ///
    /// [`SyncError::UnknownProxy`] or [`SyncError::ChannelClosed`].
    pub fn call_rpc(&mut self, id: ProxyId, name: &str, params: Vec<RpcValue>) -> SyncResult<()> {
        if !self.objects.contains_key(&id) {
            return Err(SyncError::UnknownProxy(id));
        }
        self.send_pending()?;

        let message = RpcMessage {
            name: name.to_owned(),
            params,
            tick: self.tick,
        };
        match self.objects.get(&id).and_then(|object| object.rpc.as_ref()) {
            Some(port) => {
                if port.post(message) {
                    Ok(())
                } else {
                    Err(SyncError::ChannelClosed)
                }
            }
            None => self.post(ControlMessage::Rpc { id, message }),
        }
    }

    /// Destroys the object. Its writer is dropped and the id is retired.
    ///
    /// # Errors
    ///
    /// [`SyncError::UnknownProxy`] or [`SyncError::ChannelClosed`].
    pub fn destroy_proxy(&mut self, id: ProxyId) -> SyncResult<()> {
        if self.objects.remove(&id).is_none() {
            return Err(SyncError::UnknownProxy(id));
        }
        self.dirty.unmark(id);
        self.send_pending()?;

        tracing::debug!("Destroyed {}", id);
        self.post(ControlMessage::Destroy { id, tick: self.tick })
    }

    /// Tells the consumer the drawing surface changed size.
    ///
    /// # Errors
    ///
    /// [`SyncError::ChannelClosed`] if the consumer is gone.
    pub fn resize_viewport(&mut self, width: u32, height: u32) -> SyncResult<()> {
        self.post(ControlMessage::ViewportResize { width, height })
    }

    /// Publishes everything that changed since the last flush, then sends
    /// the queued creations.
    ///
    /// Call exactly once per simulation tick. A new object's first publish
    /// lands before its create-proxy instruction, so no proxy ever sees the
    /// empty initial slot.
    ///
    /// # Errors
    ///
    /// [`SyncError::ChannelClosed`] if creations cannot be sent; codec or
    /// buffer errors indicate a broken schema and leave the dirty set intact.
    pub fn flush(&mut self) -> SyncResult<FlushStats> {
        let mut stats = FlushStats {
            tick: self.tick,
            ..FlushStats::default()
        };

        for id in self.dirty.iter() {
            if let Some(object) = self.objects.get_mut(&id) {
                stats.bytes += publish(object, &mut self.scratch)?;
                stats.published += 1;
            }
        }
        self.dirty.clear();
        stats.created = self.send_pending()?;

        self.publish_simulation_info()?;
        self.tick += 1;

        tracing::trace!(
            "Flushed tick {}: {} created, {} published ({} bytes)",
            stats.tick,
            stats.created,
            stats.published,
            stats.bytes
        );
        Ok(stats)
    }

    /// Handles messages sent back by the consumer. Returns how many were read.
    pub fn poll_control(&mut self) -> usize {
        let messages = self.port.drain();
        let count = messages.len();
        for message in messages {
            match message {
                ControlMessage::Running { rendering_info } => {
                    tracing::info!(
                        "Render context running ({} byte info block)",
                        rendering_info.byte_len()
                    );
                    self.rendering_info = Some(rendering_info);
                }
                other => {
                    tracing::warn!("Ignoring unexpected `{}` message from consumer", other.kind());
                }
            }
        }
        count
    }

    /// Whether the consumer reported `Running`.
    #[must_use]
    pub fn is_consumer_running(&self) -> bool {
        self.rendering_info.is_some()
    }

    /// Latest rendering-info block published by the consumer.
    #[must_use]
    pub fn rendering_info(&self) -> Option<RenderingInfo> {
        let handle = self.rendering_info.as_ref()?;
        let snapshot = handle.snapshot();
        let values = decode_values(self.rendering_schema.fields(), &snapshot.bytes).ok()?;
        RenderingInfo::from_values(&values)
    }

    /// Read handle of the simulation-info block.
    #[must_use]
    pub fn simulation_info_handle(&self) -> TripleBufferHandle {
        self.simulation_info.writer.handle()
    }

    /// Next tick to be flushed.
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Number of live objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns true if no object is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Checks whether `id` is live.
    #[must_use]
    pub fn contains(&self, id: ProxyId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Checks whether `id` changed since the last flush.
    #[must_use]
    pub fn is_dirty(&self, id: ProxyId) -> bool {
        self.dirty.contains(id)
    }

    /// Creations waiting for the next flush.
    #[must_use]
    pub fn pending_creations(&self) -> usize {
        self.pending.len()
    }

    /// Read handle of an object's buffer, for in-process inspection.
    #[must_use]
    pub fn buffer_handle(&self, id: ProxyId) -> Option<TripleBufferHandle> {
        self.objects.get(&id).map(|object| object.writer.handle())
    }

    /// Posts `message` on the control port.
    ///
    /// # Errors
    ///
    /// [`SyncError::ChannelClosed`] if the consumer is gone.
    pub fn post(&self, message: ControlMessage) -> SyncResult<()> {
        if self.port.post(message) {
            Ok(())
        } else {
            Err(SyncError::ChannelClosed)
        }
    }

    /// Sends the queued creations, publishing any that are still dirty first.
    fn send_pending(&mut self) -> SyncResult<usize> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        for create in &self.pending {
            if !self.dirty.contains(create.id) {
                continue;
            }
            if let Some(object) = self.objects.get_mut(&create.id) {
                publish(object, &mut self.scratch)?;
                self.dirty.unmark(create.id);
            }
        }
        let batch = std::mem::take(&mut self.pending);
        let count = batch.len();
        self.post(ControlMessage::Proxy(batch))?;
        Ok(count)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn publish_simulation_info(&mut self) -> SyncResult<()> {
        let info = SimulationInfo {
            tick: self.tick as u32,
            time: self.tick as f32 * self.tick_seconds,
            delta: self.tick_seconds,
        };
        let block = &mut self.simulation_info;
        self.scratch.clear();
        self.scratch.resize(block.schema.byte_len(), 0);
        encode_values(block.schema.fields(), &info.values(), &mut self.scratch)?;
        block.writer.copy_to_write_buffer(&self.scratch)?;
        Ok(())
    }
}

/// Encodes every authoritative value and publishes the slot. Returns the
/// bytes copied.
fn publish(object: &mut Authority, scratch: &mut Vec<u8>) -> SyncResult<usize> {
    let byte_len = object.schema.byte_len();
    scratch.clear();
    scratch.resize(byte_len, 0);
    encode_values(object.schema.fields(), &object.values, scratch)?;
    object.writer.copy_to_write_buffer(scratch)?;
    Ok(byte_len)
}

impl std::fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchronizer")
            .field("objects", &self.objects.len())
            .field("dirty", &self.dirty.len())
            .field("pending", &self.pending.len())
            .field("tick", &self.tick)
            .finish_non_exhaustive()
    }
}
