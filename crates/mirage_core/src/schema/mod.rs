//! # Class Schemas
//!
//! Static, per-class tables describing which fields are mirrored into a
//! triple buffer slot and where.
//!
//! ## Layout
//!
//! ```text
//! class Marker { x: u16, visible: bool, speed: f32 }
//!
//! offset:  0    2   3          7
//!          ├────┼───┼──────────┤
//!          │ x  │ v │  speed   │      byte_len = 7
//!          └────┴───┴──────────┘
//! ```
//!
//! Offsets follow declaration order and never move once the class has a live
//! instance. Producer and consumer build the same table from the same static
//! definition, so the only runtime handshake is the slot size carried by the
//! triple buffer handle.

mod codec;
mod field;
mod registry;

pub use codec::{
    decode_field, decode_str, decode_values, encode_field, encode_str, encode_values,
};
pub use field::{is_field_descriptor, FieldDescriptor, FieldKind, FieldValue, MetadataEntry};
pub use registry::{Schema, SchemaBuilder, SchemaRegistry};
