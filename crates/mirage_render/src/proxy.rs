//! # Render Proxies
//!
//! Read-only mirrors of authoritative objects.
//!
//! Every getter re-resolves the published slot index and decodes the field
//! from that slot, so a proxy always reflects the latest completed publish
//! and never a half-written one.

use std::fmt;
use std::sync::Arc;

use mirage_core::{
    decode_field, decode_values, FieldDescriptor, FieldValue, ProxyId, Schema, TripleBufferHandle,
};
use mirage_shared::{MessagePort, RpcMessage, RpcValue};

use crate::error::{ProxyError, ProxyResult};
use crate::registry::ProxyRegistry;

/// Widest field decoded without allocating.
const INLINE_FIELD: usize = 4;

/// State shared by every render proxy: identity, layout and buffer.
pub struct ProxyCore {
    id: ProxyId,
    schema: Arc<Schema>,
    buffer: TripleBufferHandle,
    port: Option<MessagePort<RpcMessage>>,
}

impl ProxyCore {
    /// Binds a proxy to its buffer.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::LayoutMismatch`] if the slot size disagrees with
    /// this context's schema for the class.
    pub fn new(
        id: ProxyId,
        schema: Arc<Schema>,
        buffer: TripleBufferHandle,
        port: Option<MessagePort<RpcMessage>>,
    ) -> ProxyResult<Self> {
        if buffer.byte_len() != schema.byte_len() {
            return Err(ProxyError::LayoutMismatch {
                id,
                class: schema.class().to_owned(),
                expected: schema.byte_len(),
                actual: buffer.byte_len(),
            });
        }
        Ok(Self {
            id,
            schema,
            buffer,
            port,
        })
    }

    /// Id shared with the authoritative object.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ProxyId {
        self.id
    }

    /// Class name.
    #[must_use]
    pub fn class(&self) -> &str {
        self.schema.class()
    }

    /// Layout of the buffer.
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Read end of the buffer.
    #[must_use]
    pub fn buffer(&self) -> &TripleBufferHandle {
        &self.buffer
    }

    /// Publish generation currently visible.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u32 {
        self.buffer.generation()
    }

    /// Reads one field from the latest published slot.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::UnknownField`] if the class has no such field.
    pub fn get(&self, name: &str) -> ProxyResult<FieldValue> {
        let field = self.descriptor(name)?;
        if field.size <= INLINE_FIELD {
            let mut bytes = [0u8; INLINE_FIELD];
            let bytes = &mut bytes[..field.size];
            self.read(field, bytes)?;
            Ok(decode_field(field, bytes)?)
        } else {
            let mut bytes = vec![0u8; field.size];
            self.read(field, &mut bytes)?;
            Ok(decode_field(field, &bytes)?)
        }
    }

    /// Reads every field from one published slot.
    ///
    /// # Errors
    ///
    /// Only fails if the layout check in [`ProxyCore::new`] was bypassed.
    pub fn values(&self) -> ProxyResult<Vec<FieldValue>> {
        let snapshot = self.buffer.snapshot();
        Ok(decode_values(self.schema.fields(), &snapshot.bytes)?)
    }

    /// Every non-empty reference in the latest published slot, in field order.
    #[must_use]
    pub fn references(&self) -> Vec<ProxyId> {
        self.values()
            .unwrap_or_default()
            .iter()
            .filter_map(FieldValue::as_ref_id)
            .filter(|id| !id.is_none())
            .collect()
    }

    /// Reads a float field.
    ///
    /// # Errors
    ///
    /// [`ProxyError::UnknownField`] or [`ProxyError::WrongKind`].
    pub fn f32(&self, name: &str) -> ProxyResult<f32> {
        self.typed(name, "f32", FieldValue::as_f32)
    }

    /// Reads an unsigned integer field of any width.
    ///
    /// # Errors
    ///
    /// [`ProxyError::UnknownField`] or [`ProxyError::WrongKind`].
    pub fn u32(&self, name: &str) -> ProxyResult<u32> {
        self.typed(name, "unsigned", FieldValue::as_u32)
    }

    /// Reads a signed integer field of any width.
    ///
    /// # Errors
    ///
    /// [`ProxyError::UnknownField`] or [`ProxyError::WrongKind`].
    pub fn i32(&self, name: &str) -> ProxyResult<i32> {
        self.typed(name, "signed", FieldValue::as_i32)
    }

    /// Reads a boolean field.
    ///
    /// # Errors
    ///
    /// [`ProxyError::UnknownField`] or [`ProxyError::WrongKind`].
    pub fn bool(&self, name: &str) -> ProxyResult<bool> {
        self.typed(name, "bool", FieldValue::as_bool)
    }

    /// Reads a string field.
    ///
    /// # Errors
    ///
    /// [`ProxyError::UnknownField`] or [`ProxyError::WrongKind`].
    pub fn string(&self, name: &str) -> ProxyResult<String> {
        match self.get(name)? {
            FieldValue::Str(value) => Ok(value),
            other => Err(wrong_kind(name, &other, "string")),
        }
    }

    /// Reads a reference field.
    ///
    /// # Errors
    ///
    /// [`ProxyError::UnknownField`] or [`ProxyError::WrongKind`].
    pub fn reference(&self, name: &str) -> ProxyResult<ProxyId> {
        self.typed(name, "ref", FieldValue::as_ref_id)
    }

    /// Consumer-side write attempt. Always rejected; the value is unchanged.
    ///
    /// # Errors
    ///
    /// Always [`ProxyError::ReadOnly`].
    pub fn set_field(&self, name: &str, value: impl Into<FieldValue>) -> ProxyResult<()> {
        let value = value.into();
        tracing::warn!(
            "Rejected write of {} to {}.{} on {}: replicated fields are read-only here",
            value.kind_name(),
            self.class(),
            name,
            self.id
        );
        Err(ProxyError::ReadOnly {
            id: self.id,
            field: name.to_owned(),
        })
    }

    /// Takes every call queued on the dedicated RPC port.
    pub(crate) fn drain_rpc(&self) -> Vec<RpcMessage> {
        self.port.as_ref().map(MessagePort::drain).unwrap_or_default()
    }

    /// Whether calls arrive on a dedicated port.
    #[must_use]
    pub fn has_port(&self) -> bool {
        self.port.is_some()
    }

    fn descriptor(&self, name: &str) -> ProxyResult<&FieldDescriptor> {
        self.schema.field(name).ok_or_else(|| ProxyError::UnknownField {
            class: self.schema.class().to_owned(),
            field: name.to_owned(),
        })
    }

    fn read(&self, field: &FieldDescriptor, out: &mut [u8]) -> ProxyResult<()> {
        self.buffer
            .read_into(field.offset, out)
            .map_err(|_| ProxyError::LayoutMismatch {
                id: self.id,
                class: self.class().to_owned(),
                expected: self.schema.byte_len(),
                actual: self.buffer.byte_len(),
            })?;
        Ok(())
    }

    fn typed<T>(
        &self,
        name: &str,
        requested: &'static str,
        extract: impl Fn(&FieldValue) -> Option<T>,
    ) -> ProxyResult<T> {
        let value = self.get(name)?;
        extract(&value).ok_or_else(|| wrong_kind(name, &value, requested))
    }
}

fn wrong_kind(name: &str, value: &FieldValue, requested: &'static str) -> ProxyError {
    ProxyError::WrongKind {
        field: name.to_owned(),
        actual: value.kind_name(),
        requested,
    }
}

impl fmt::Debug for ProxyCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyCore")
            .field("id", &self.id)
            .field("class", &self.schema.class())
            .field("generation", &self.generation())
            .finish()
    }
}

/// Result of dispatching one RPC to a proxy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RpcOutcome {
    /// The method ran.
    Handled,
    /// The proxy has no such method.
    UnknownMethod,
    /// The method exists but the parameters are unusable.
    InvalidParams(String),
}

/// Consumer-side mirror of one authoritative object.
pub trait RenderProxy: Send + fmt::Debug {
    /// Shared proxy state.
    fn core(&self) -> &ProxyCore;

    /// Id shared with the authoritative object.
    fn id(&self) -> ProxyId {
        self.core().id()
    }

    /// Proxies whose tick must run before this one in the same frame.
    ///
    /// Defaults to every reference in the latest publish.
    fn dependencies(&self) -> Vec<ProxyId> {
        self.core().references()
    }

    /// Per-frame update. `proxies` resolves references to other proxies;
    /// this proxy itself is not reachable through it during the call.
    /// Every proxy listed by [`RenderProxy::dependencies`] has already
    /// ticked this frame.
    fn tick(&mut self, _time: f32, _proxies: &ProxyRegistry) {}

    /// Handles a remote procedure call.
    fn call(&mut self, _name: &str, _params: &[RpcValue]) -> RpcOutcome {
        RpcOutcome::UnknownMethod
    }

    /// The drawing surface changed size.
    fn resize(&mut self, _width: u32, _height: u32) {}

    /// World transform of this proxy, if it has one.
    fn world_matrix(&self) -> Option<[[f32; 4]; 4]> {
        None
    }
}

/// Proxy for classes without a specialised constructor.
#[derive(Debug)]
pub struct GenericProxy {
    core: ProxyCore,
}

impl GenericProxy {
    /// Wraps a core.
    #[must_use]
    pub fn new(core: ProxyCore) -> Self {
        Self { core }
    }
}

impl RenderProxy for GenericProxy {
    fn core(&self) -> &ProxyCore {
        &self.core
    }
}
