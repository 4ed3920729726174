//! # MIRAGE Core
//!
//! Lock-free publication of per-object state from the game thread to the
//! render thread.
//!
//! ## Architecture Rules
//!
//! 1. **One writer per buffer** - the producer owns the only [`TripleBufferWriter`]
//! 2. **Readers never block the writer** - publication is a single atomic store
//! 3. **Static layout** - field offsets are computed once per class and never move
//! 4. **Little-endian on the wire** - both sides agree without negotiation
//!
//! ## Example
//!
//! ```rust,ignore
//! use mirage_core::{SchemaBuilder, TripleBuffer};
//!
//! let schema = SchemaBuilder::new("Marker").u16("x").u16("y").build()?;
//! let (mut writer, handle) = TripleBuffer::create(schema.byte_len());
//! writer.copy_to_write_buffer(&[10, 0, 20, 0])?;
//! assert_eq!(handle.snapshot().bytes, vec![10, 0, 20, 0]);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod error;
pub mod id;
pub mod schema;
pub mod sync;

pub use error::{BufferError, CodecError, SchemaError};
pub use id::ProxyId;
pub use schema::{
    decode_field, decode_str, decode_values, encode_field, encode_str, encode_values,
    is_field_descriptor, FieldDescriptor, FieldKind, FieldValue, MetadataEntry, Schema,
    SchemaBuilder, SchemaRegistry,
};
pub use sync::{BufferFlags, Snapshot, TripleBuffer, TripleBufferHandle, TripleBufferWriter, WriteSlot};
