//! Consumer-side error types.

use mirage_core::{CodecError, ProxyId};
use thiserror::Error;

/// Errors raised by proxy field access.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProxyError {
    /// The proxy's class declares no such field.
    #[error("class `{class}` has no field `{field}`")]
    UnknownField {
        /// Class name.
        class: String,
        /// Requested field.
        field: String,
    },

    /// The field exists but holds another kind.
    #[error("field `{field}` is {actual}, requested {requested}")]
    WrongKind {
        /// Field name.
        field: String,
        /// Declared kind.
        actual: &'static str,
        /// Kind the caller asked for.
        requested: &'static str,
    },

    /// The consumer tried to write a replicated field.
    #[error("field `{field}` of {id} is read-only on the render thread")]
    ReadOnly {
        /// Proxy id.
        id: ProxyId,
        /// Field name.
        field: String,
    },

    /// The buffer was sized for another layout.
    #[error("buffer of {id} holds {actual} bytes, class `{class}` needs {expected}")]
    LayoutMismatch {
        /// Proxy id.
        id: ProxyId,
        /// Class name.
        class: String,
        /// Schema byte length.
        expected: usize,
        /// Buffer slot length.
        actual: usize,
    },

    /// Field decode failure.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Result type for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;

/// Errors raised while constructing or driving the render context.
#[derive(Error, Debug)]
pub enum ContextError {
    /// `Init` arrived without a drawing surface.
    #[error("init message carried no drawing surface")]
    MissingSurface,

    /// A second `Init` arrived after bootstrap.
    #[error("render context already initialized")]
    AlreadyInitialized,

    /// The first message was not `Init`.
    #[error("expected init message, got `{0}`")]
    NotInitialized(&'static str),

    /// No message arrived before the bootstrap deadline.
    #[error("no init message within {0:?}")]
    BootstrapTimeout(std::time::Duration),

    /// The producer dropped its end of the channel.
    #[error("control channel closed")]
    ChannelClosed,

    /// Built-in schema registration failed.
    #[error("schema error: {0}")]
    Schema(#[from] mirage_core::SchemaError),

    /// Rendering-info encode failure.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Rendering-info publish failure.
    #[error("buffer error: {0}")]
    Buffer(#[from] mirage_core::BufferError),
}
