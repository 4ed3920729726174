//! Producer-side error types.

use mirage_core::{BufferError, CodecError, ProxyId, SchemaError};
use thiserror::Error;

/// Errors raised by the synchronizer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The class has no schema in this context's registry.
    #[error("class `{0}` has no replication schema")]
    MissingSchema(String),

    /// The id is not (or no longer) registered.
    #[error("unknown proxy {0}")]
    UnknownProxy(ProxyId),

    /// The class declares no such field.
    #[error("class `{class}` has no field `{field}`")]
    UnknownField {
        /// Class name.
        class: String,
        /// Requested field.
        field: String,
    },

    /// Every 32-bit id has been handed out.
    #[error("proxy id space exhausted")]
    IdsExhausted,

    /// The render side dropped its end of the channel.
    #[error("control channel closed")]
    ChannelClosed,

    /// Triple buffer failure.
    #[error("buffer error: {0}")]
    Buffer(#[from] BufferError),

    /// Schema definition failure.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Field encode failure.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Result type for synchronizer operations.
pub type SyncResult<T> = Result<T, SyncError>;
