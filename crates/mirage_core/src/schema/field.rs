//! Field descriptors, kinds and values.

use crate::id::ProxyId;

/// Element kind of a mirrored field.
///
/// Every kind has a fixed width; strings carry their capacity in the kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Unsigned 8-bit integer.
    U8,
    /// Unsigned 16-bit integer.
    U16,
    /// Unsigned 32-bit integer.
    U32,
    /// Signed 8-bit integer.
    I8,
    /// Signed 16-bit integer.
    I16,
    /// Signed 32-bit integer.
    I32,
    /// Boolean stored as one byte (0 = false).
    Bool,
    /// 32-bit float.
    F32,
    /// Fixed-capacity UTF-8 string, zero-padded.
    Str {
        /// Capacity in bytes.
        capacity: usize,
    },
    /// Id of another replicated object (0 = none).
    Ref,
}

impl FieldKind {
    /// Width of the field in a slot.
    #[inline]
    #[must_use]
    pub const fn byte_size(self) -> usize {
        match self {
            Self::U8 | Self::I8 | Self::Bool => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 | Self::Ref => 4,
            Self::Str { capacity } => capacity,
        }
    }

    /// Short name used in error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::Bool => "bool",
            Self::F32 => "f32",
            Self::Str { .. } => "string",
            Self::Ref => "ref",
        }
    }
}

/// One mirrored field: name, position in the slot, width and kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Field name.
    pub name: String,
    /// Byte offset in the slot.
    pub offset: usize,
    /// Width in bytes.
    pub size: usize,
    /// Element kind.
    pub kind: FieldKind,
}

impl FieldDescriptor {
    /// First byte past the field.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> usize {
        self.offset + self.size
    }
}

/// One entry of a class's metadata table.
#[derive(Clone, Debug, PartialEq)]
pub enum MetadataEntry {
    /// A mirrored field.
    Field(FieldDescriptor),
    /// Name of the consumer-side constructor that mirrors this class.
    RenderProxy {
        /// Constructor name sent in create-proxy messages.
        constructor: String,
    },
    /// Initial value of a field declared earlier, instead of its zero value.
    Default {
        /// Field name.
        field: String,
        /// Value every new instance starts with.
        value: FieldValue,
    },
}

impl MetadataEntry {
    /// Returns the field descriptor, if this entry is one.
    #[must_use]
    pub fn as_field(&self) -> Option<&FieldDescriptor> {
        match self {
            Self::Field(field) => Some(field),
            Self::RenderProxy { .. } | Self::Default { .. } => None,
        }
    }
}

/// Checks whether a metadata entry describes a mirrored field.
#[must_use]
pub fn is_field_descriptor(entry: &MetadataEntry) -> bool {
    matches!(entry, MetadataEntry::Field(_))
}

/// A live field value on either side of the buffer.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    /// Unsigned 8-bit integer.
    U8(u8),
    /// Unsigned 16-bit integer.
    U16(u16),
    /// Unsigned 32-bit integer.
    U32(u32),
    /// Signed 8-bit integer.
    I8(i8),
    /// Signed 16-bit integer.
    I16(i16),
    /// Signed 32-bit integer.
    I32(i32),
    /// Boolean.
    Bool(bool),
    /// 32-bit float.
    F32(f32),
    /// String (truncated to capacity on encode).
    Str(String),
    /// Reference to another replicated object.
    Ref(ProxyId),
}

impl FieldValue {
    /// Zero value for a kind: what a freshly allocated slot decodes to.
    #[must_use]
    pub fn default_for(kind: FieldKind) -> Self {
        match kind {
            FieldKind::U8 => Self::U8(0),
            FieldKind::U16 => Self::U16(0),
            FieldKind::U32 => Self::U32(0),
            FieldKind::I8 => Self::I8(0),
            FieldKind::I16 => Self::I16(0),
            FieldKind::I32 => Self::I32(0),
            FieldKind::Bool => Self::Bool(false),
            FieldKind::F32 => Self::F32(0.0),
            FieldKind::Str { .. } => Self::Str(String::new()),
            FieldKind::Ref => Self::Ref(ProxyId::NONE),
        }
    }

    /// Short name of the variant, matching [`FieldKind::name`].
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::U8(_) => "u8",
            Self::U16(_) => "u16",
            Self::U32(_) => "u32",
            Self::I8(_) => "i8",
            Self::I16(_) => "i16",
            Self::I32(_) => "i32",
            Self::Bool(_) => "bool",
            Self::F32(_) => "f32",
            Self::Str(_) => "string",
            Self::Ref(_) => "ref",
        }
    }

    /// Checks whether this value can be stored in a field of `kind`.
    #[must_use]
    pub fn matches(&self, kind: FieldKind) -> bool {
        self.kind_name() == kind.name()
    }

    /// Returns the float, if this is one.
    #[must_use]
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::F32(v) => Some(*v),
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

    /// Widens any unsigned integer to `u32`.
    #[must_use]
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Self::U8(v) => Some(u32::from(*v)),
            Self::U16(v) => Some(u32::from(*v)),
            Self::U32(v) => Some(*v),
            _ => None,
        }
    }

    /// Widens any signed integer to `i32`.
    #[must_use]
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::I8(v) => Some(i32::from(*v)),
            Self::I16(v) => Some(i32::from(*v)),
            Self::I32(v) => Some(*v),
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

    /// Returns the referenced id, if this is a reference.
    #[must_use]
    pub fn as_ref_id(&self) -> Option<ProxyId> {
        match self {
            Self::Ref(id) => Some(*id),
            _ => None,
        }
    }
}

macro_rules! impl_from_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

impl_from_value! {
    u8 => U8,
    u16 => U16,
    u32 => U32,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    bool => Bool,
    f32 => F32,
    String => Str,
    ProxyId => Ref,
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_sizes() {
        assert_eq!(FieldKind::U8.byte_size(), 1);
        assert_eq!(FieldKind::Bool.byte_size(), 1);
        assert_eq!(FieldKind::I16.byte_size(), 2);
        assert_eq!(FieldKind::F32.byte_size(), 4);
        assert_eq!(FieldKind::Ref.byte_size(), 4);
        assert_eq!(FieldKind::Str { capacity: 24 }.byte_size(), 24);
    }

    #[test]
    fn test_values_match_their_kind() {
        for kind in [
            FieldKind::U8,
            FieldKind::U16,
            FieldKind::U32,
            FieldKind::I8,
            FieldKind::I16,
            FieldKind::I32,
            FieldKind::Bool,
            FieldKind::F32,
            FieldKind::Str { capacity: 4 },
            FieldKind::Ref,
        ] {
            assert!(FieldValue::default_for(kind).matches(kind), "{kind:?}");
        }
        assert!(!FieldValue::U16(1).matches(FieldKind::U32));
    }

    #[test]
    fn test_is_field_descriptor() {
        let field = MetadataEntry::Field(FieldDescriptor {
            name: "x".into(),
            offset: 0,
            size: 2,
            kind: FieldKind::U16,
        });
        let proxy = MetadataEntry::RenderProxy {
            constructor: "Marker".into(),
        };
        assert!(is_field_descriptor(&field));
        assert!(!is_field_descriptor(&proxy));
        assert!(!is_field_descriptor(&MetadataEntry::Default {
            field: "x".into(),
            value: FieldValue::U16(1),
        }));
        assert_eq!(field.as_field().map(FieldDescriptor::end), Some(2));
        assert!(proxy.as_field().is_none());
    }

    #[test]
    fn test_widening_accessors() {
        assert_eq!(FieldValue::from(7u8).as_u32(), Some(7));
        assert_eq!(FieldValue::from(-3i16).as_i32(), Some(-3));
        assert_eq!(FieldValue::from("hi").as_str(), Some("hi"));
        assert_eq!(FieldValue::from(ProxyId::new(4)).as_ref_id(), Some(ProxyId::new(4)));
        assert_eq!(FieldValue::from(1.5f32).as_bool(), None);
    }
}
