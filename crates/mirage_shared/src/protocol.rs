//! Control protocol carried between the game and render contexts.
//!
//! Binary state never travels here: messages only bootstrap triple buffers
//! and carry out-of-band control. Slot layout is static, so no message
//! carries a length prefix; the slot size travels once, inside the handle.

use std::fmt;

use mirage_core::{ProxyId, TripleBufferHandle};

use crate::channel::MessagePort;

/// Drawing surface handed to the render context at bootstrap.
pub trait RenderSurface: Send + fmt::Debug {
    /// Current size in pixels.
    fn size(&self) -> (u32, u32);

    /// Resizes the backing surface.
    fn resize(&mut self, width: u32, height: u32);

    /// Label used in logs.
    fn label(&self) -> &str {
        "surface"
    }
}

/// A parameter of a remote procedure call.
#[derive(Clone, Debug, PartialEq)]
pub enum RpcValue {
    /// 32-bit float.
    F32(f32),
    /// Signed integer.
    I32(i32),
    /// Unsigned integer.
    U32(u32),
    /// Boolean.
    Bool(bool),
    /// String.
    Str(String),
}

impl RpcValue {
    /// Returns the float, if this is one.
    #[must_use]
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::F32(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the unsigned integer, if this is one.
    #[must_use]
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Self::U32(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the boolean, if this is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string, if this is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }
}

/// Invocation of a named method on one render proxy.
#[derive(Clone, Debug, PartialEq)]
pub struct RpcMessage {
    /// Method name.
    pub name: String,
    /// Positional parameters.
    pub params: Vec<RpcValue>,
    /// Simulation tick the call was issued on.
    pub tick: u64,
}

/// Instruction to build one render proxy bound to a triple buffer.
#[derive(Debug)]
pub struct ProxyCreate {
    /// Consumer-side constructor name.
    pub constructor: String,
    /// Class whose schema describes the buffer.
    pub class: String,
    /// Id shared with the authoritative object.
    pub id: ProxyId,
    /// Read end of the object's triple buffer.
    pub tb: TripleBufferHandle,
    /// Dedicated RPC port, if the object has one.
    pub port: Option<MessagePort<RpcMessage>>,
    /// Simulation tick the object was registered on.
    pub tick: u64,
}

/// Payload of [`ControlMessage::Init`].
#[derive(Debug)]
pub struct InitMessage {
    /// Drawing surface; `None` means the host could not provide one.
    pub surface: Option<Box<dyn RenderSurface>>,
    /// Initial surface width.
    pub initial_width: u32,
    /// Initial surface height.
    pub initial_height: u32,
    /// Reply port for consumer-to-producer messages.
    pub port: MessagePort<ControlMessage>,
    /// Global state blocks the consumer coordinates on.
    pub flags: Vec<TripleBufferHandle>,
}

/// Control messages between contexts.
#[derive(Debug)]
pub enum ControlMessage {
    /// Bootstraps the render context.
    Init(InitMessage),
    /// Creates one or more render proxies.
    Proxy(Vec<ProxyCreate>),
    /// Invokes a method on a proxy without a dedicated port.
    Rpc {
        /// Target proxy.
        id: ProxyId,
        /// The call.
        message: RpcMessage,
    },
    /// The drawing surface changed size.
    ViewportResize {
        /// New width.
        width: u32,
        /// New height.
        height: u32,
    },
    /// Establishes a reference between two registered proxies.
    Ref {
        /// Referenced object.
        ref_id: ProxyId,
        /// Referring object.
        parent_id: ProxyId,
    },
    /// Consumer finished bootstrapping (consumer to producer).
    Running {
        /// Rendering-info block owned by the consumer.
        rendering_info: TripleBufferHandle,
    },
    /// The authoritative object was destroyed.
    Destroy {
        /// Destroyed id (never reused).
        id: ProxyId,
        /// Simulation tick of the destruction.
        tick: u64,
    },
    /// Stop the receiving loop.
    Shutdown,
}

impl ControlMessage {
    /// Discriminant as it appears in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Init(_) => "init",
            Self::Proxy(_) => "proxy",
            Self::Rpc { .. } => "rpc",
            Self::ViewportResize { .. } => "viewport-resize",
            Self::Ref { .. } => "ref",
            Self::Running { .. } => "running",
            Self::Destroy { .. } => "destroy",
            Self::Shutdown => "shutdown",
        }
    }
}
