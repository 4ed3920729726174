//! # Core Error Types
//!
//! Everything here is a configuration or programming error: it is reported
//! once, at definition or registration time, never on every tick.

use thiserror::Error;

/// Errors raised by the triple buffer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// The payload does not fit in one slot.
    #[error("payload of {actual} bytes does not fit a {expected}-byte slot")]
    SizeMismatch {
        /// Slot size in bytes.
        expected: usize,
        /// Payload size in bytes.
        actual: usize,
    },

    /// A range read fell outside the slot.
    #[error("read of {len} bytes at offset {offset} exceeds slot of {byte_len} bytes")]
    OutOfBounds {
        /// Requested offset.
        offset: usize,
        /// Requested length.
        len: usize,
        /// Slot size in bytes.
        byte_len: usize,
    },

    /// The initial flags word is not a permutation of the three slot indices.
    #[error("invalid triple buffer flags: {0:#010x}")]
    InvalidFlags(u32),
}

/// Errors raised while defining a class schema.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// The class already had an instance synchronized; its layout is frozen.
    #[error("schema for `{0}` is sealed")]
    Sealed(String),

    /// The declared byte size disagrees with the field kind.
    #[error("field `{class}.{field}`: {kind} needs {expected} bytes, declared {declared}")]
    SizeMismatch {
        /// Class name.
        class: String,
        /// Field name.
        field: String,
        /// Kind name.
        kind: &'static str,
        /// Width required by the kind.
        expected: usize,
        /// Width that was declared.
        declared: usize,
    },

    /// A string field was declared with zero capacity.
    #[error("field `{class}.{field}`: string capacity must be non-zero")]
    EmptyString {
        /// Class name.
        class: String,
        /// Field name.
        field: String,
    },

    /// The field name was already declared on this class.
    #[error("field `{class}.{field}` declared twice")]
    DuplicateField {
        /// Class name.
        class: String,
        /// Field name.
        field: String,
    },

    /// A default names an undeclared field or has the wrong kind.
    #[error("default for `{class}.{field}`: {reason}")]
    InvalidDefault {
        /// Class name.
        class: String,
        /// Field name.
        field: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// A whole schema was registered for a class that already has one.
    #[error("schema for `{0}` already defined")]
    AlreadyDefined(String),

    /// The class was never annotated.
    #[error("no schema for class `{0}`")]
    NotFound(String),
}

/// Errors raised by the field codec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The value variant does not match the declared kind.
    #[error("field `{field}` is {expected}, got {found}")]
    KindMismatch {
        /// Field name.
        field: String,
        /// Declared kind.
        expected: &'static str,
        /// Kind of the supplied value.
        found: &'static str,
    },

    /// The field does not fit in the supplied slot.
    #[error("field `{field}` at offset {offset} overruns a {len}-byte slot")]
    OutOfBounds {
        /// Field name.
        field: String,
        /// Field offset.
        offset: usize,
        /// Slot length.
        len: usize,
    },

    /// The descriptor's width disagrees with its kind.
    #[error("field `{field}` declares {declared} bytes for a {expected}-byte {kind}")]
    BadWidth {
        /// Field name.
        field: String,
        /// Declared kind.
        kind: &'static str,
        /// Width the kind needs.
        expected: usize,
        /// Width in the descriptor.
        declared: usize,
    },
}
