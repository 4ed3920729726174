//! # Field Codec
//!
//! One fixed-width little-endian routine per [`FieldKind`].
//!
//! Encoding never allocates: the synchronizer reuses one scratch slot and
//! writes each field in place.

use crate::error::CodecError;
use crate::id::ProxyId;

use super::field::{FieldDescriptor, FieldKind, FieldValue};

/// Writes `value` into `slot` at the field's offset.
///
/// # Errors
///
/// - [`CodecError::KindMismatch`] if the value variant disagrees with the kind.
/// - [`CodecError::OutOfBounds`] if the field does not fit in `slot`.
/// - [`CodecError::BadWidth`] if the descriptor's size disagrees with its kind.
pub fn encode_field(
    field: &FieldDescriptor,
    value: &FieldValue,
    slot: &mut [u8],
) -> Result<(), CodecError> {
    check_width(field)?;
    if field.end() > slot.len() {
        return Err(CodecError::OutOfBounds {
            field: field.name.clone(),
            offset: field.offset,
            len: slot.len(),
        });
    }
    let out = &mut slot[field.offset..field.end()];

    match (field.kind, value) {
        (FieldKind::U8, FieldValue::U8(v)) => out[0] = *v,
        (FieldKind::I8, FieldValue::I8(v)) => out.copy_from_slice(&v.to_le_bytes()),
        (FieldKind::Bool, FieldValue::Bool(v)) => out[0] = u8::from(*v),
        (FieldKind::U16, FieldValue::U16(v)) => out.copy_from_slice(&v.to_le_bytes()),
        (FieldKind::I16, FieldValue::I16(v)) => out.copy_from_slice(&v.to_le_bytes()),
        (FieldKind::U32, FieldValue::U32(v)) => out.copy_from_slice(&v.to_le_bytes()),
        (FieldKind::I32, FieldValue::I32(v)) => out.copy_from_slice(&v.to_le_bytes()),
        (FieldKind::F32, FieldValue::F32(v)) => out.copy_from_slice(&v.to_le_bytes()),
        (FieldKind::Ref, FieldValue::Ref(id)) => out.copy_from_slice(&id.raw().to_le_bytes()),
        (FieldKind::Str { .. }, FieldValue::Str(v)) => {
            encode_str(v, out);
        }
        (kind, value) => {
            return Err(CodecError::KindMismatch {
                field: field.name.clone(),
                expected: kind.name(),
                found: value.kind_name(),
            })
        }
    }
    Ok(())
}

/// Reads a field from its own bytes (`bytes.len() == field.size`).
///
/// # Errors
///
/// - [`CodecError::OutOfBounds`] if `bytes` is not exactly the field width.
/// - [`CodecError::BadWidth`] if the descriptor's size disagrees with its kind.
pub fn decode_field(field: &FieldDescriptor, bytes: &[u8]) -> Result<FieldValue, CodecError> {
    check_width(field)?;
    if bytes.len() != field.size {
        return Err(CodecError::OutOfBounds {
            field: field.name.clone(),
            offset: field.offset,
            len: bytes.len(),
        });
    }

    let value = match field.kind {
        FieldKind::U8 => FieldValue::U8(bytes[0]),
        FieldKind::I8 => FieldValue::I8(i8::from_le_bytes([bytes[0]])),
        FieldKind::Bool => FieldValue::Bool(bytes[0] != 0),
        FieldKind::U16 => FieldValue::U16(u16::from_le_bytes([bytes[0], bytes[1]])),
        FieldKind::I16 => FieldValue::I16(i16::from_le_bytes([bytes[0], bytes[1]])),
        FieldKind::U32 => FieldValue::U32(u32::from_le_bytes(word(bytes))),
        FieldKind::I32 => FieldValue::I32(i32::from_le_bytes(word(bytes))),
        FieldKind::F32 => FieldValue::F32(f32::from_le_bytes(word(bytes))),
        FieldKind::Ref => FieldValue::Ref(ProxyId::new(u32::from_le_bytes(word(bytes)))),
        FieldKind::Str { .. } => FieldValue::Str(decode_str(bytes)),
    };
    Ok(value)
}

/// Writes `value` as UTF-8 into `out`, truncated to a char boundary and
/// zero-padded. Returns the number of string bytes kept.
pub fn encode_str(value: &str, out: &mut [u8]) -> usize {
    let mut end = value.len().min(out.len());
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    out[..end].copy_from_slice(&value.as_bytes()[..end]);
    out[end..].fill(0);
    end
}

/// Reads a zero-padded string, trimming trailing zero bytes.
#[must_use]
pub fn decode_str(bytes: &[u8]) -> String {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |last| last + 1);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Encodes one value per field into `slot`, in declaration order.
///
/// # Errors
///
/// Propagates the first [`encode_field`] failure.
pub fn encode_values(
    fields: &[FieldDescriptor],
    values: &[FieldValue],
    slot: &mut [u8],
) -> Result<(), CodecError> {
    for (field, value) in fields.iter().zip(values) {
        encode_field(field, value, slot)?;
    }
    Ok(())
}

/// Decodes every field of a full slot.
///
/// # Errors
///
/// Returns [`CodecError::OutOfBounds`] if a field does not fit in `slot`.
pub fn decode_values(fields: &[FieldDescriptor], slot: &[u8]) -> Result<Vec<FieldValue>, CodecError> {
    fields
        .iter()
        .map(|field| {
            let bytes = slot.get(field.offset..field.end()).ok_or_else(|| {
                CodecError::OutOfBounds {
                    field: field.name.clone(),
                    offset: field.offset,
                    len: slot.len(),
                }
            })?;
            decode_field(field, bytes)
        })
        .collect()
}

/// Descriptors are public, so a hand-built one may lie about its width.
fn check_width(field: &FieldDescriptor) -> Result<(), CodecError> {
    let expected = field.kind.byte_size();
    if field.size == expected {
        return Ok(());
    }
    Err(CodecError::BadWidth {
        field: field.name.clone(),
        kind: field.kind.name(),
        expected,
        declared: field.size,
    })
}

#[inline]
fn word(bytes: &[u8]) -> [u8; 4] {
    [bytes[0], bytes[1], bytes[2], bytes[3]]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str, offset: usize, kind: FieldKind) -> FieldDescriptor {
        FieldDescriptor {
            name: name.into(),
            offset,
            size: kind.byte_size(),
            kind,
        }
    }

    #[test]
    fn test_little_endian_layout() {
        let x = descriptor("x", 0, FieldKind::U16);
        let speed = descriptor("speed", 2, FieldKind::I32);
        let mut slot = [0u8; 6];

        encode_field(&x, &FieldValue::U16(0x0102), &mut slot).unwrap();
        encode_field(&speed, &FieldValue::I32(-2), &mut slot).unwrap();

        assert_eq!(slot, [0x02, 0x01, 0xFE, 0xFF, 0xFF, 0xFF]);
        assert_eq!(decode_field(&x, &slot[0..2]).unwrap(), FieldValue::U16(0x0102));
        assert_eq!(decode_field(&speed, &slot[2..6]).unwrap(), FieldValue::I32(-2));
    }

    #[test]
    fn test_string_round_trip() {
        let name = descriptor("name", 0, FieldKind::Str { capacity: 8 });
        let mut slot = [0xAAu8; 8];

        encode_field(&name, &FieldValue::from("hi"), &mut slot).unwrap();
        assert_eq!(&slot[..3], b"hi\0");
        assert_eq!(decode_field(&name, &slot).unwrap(), FieldValue::from("hi"));
    }

    #[test]
    fn test_string_truncates_to_capacity() {
        let mut out = [0u8; 5];
        assert_eq!(encode_str("hello world", &mut out), 5);
        assert_eq!(decode_str(&out), "hello");

        // "é" is two bytes; cutting through it backs off to the boundary.
        let mut out = [0u8; 2];
        assert_eq!(encode_str("héllo", &mut out), 1);
        assert_eq!(decode_str(&out), "h");
    }

    #[test]
    fn test_bool_and_ref() {
        let visible = descriptor("visible", 0, FieldKind::Bool);
        let parent = descriptor("parent", 1, FieldKind::Ref);
        let mut slot = [0u8; 5];

        encode_field(&visible, &FieldValue::Bool(true), &mut slot).unwrap();
        encode_field(&parent, &FieldValue::Ref(ProxyId::new(9)), &mut slot).unwrap();

        assert_eq!(slot, [1, 9, 0, 0, 0]);
        assert_eq!(decode_field(&visible, &slot[0..1]).unwrap(), FieldValue::Bool(true));
        assert_eq!(
            decode_field(&parent, &slot[1..5]).unwrap(),
            FieldValue::Ref(ProxyId::new(9))
        );
    }

    #[test]
    fn test_kind_mismatch_is_rejected() {
        let x = descriptor("x", 0, FieldKind::U16);
        let mut slot = [0u8; 2];
        let err = encode_field(&x, &FieldValue::F32(1.0), &mut slot).unwrap_err();
        assert_eq!(
            err,
            CodecError::KindMismatch {
                field: "x".into(),
                expected: "u16",
                found: "f32",
            }
        );
        assert_eq!(slot, [0, 0]);
    }

    #[test]
    fn test_field_past_slot_end() {
        let y = descriptor("y", 2, FieldKind::U16);
        let mut slot = [0u8; 3];
        assert!(matches!(
            encode_field(&y, &FieldValue::U16(1), &mut slot),
            Err(CodecError::OutOfBounds { .. })
        ));
        assert!(decode_field(&y, &slot[..1]).is_err());
        assert!(decode_values(&[y], &slot).is_err());
    }

    #[test]
    fn test_hand_built_descriptor_with_wrong_width() {
        let narrow = FieldDescriptor {
            name: "x".into(),
            offset: 0,
            size: 1,
            kind: FieldKind::U16,
        };
        let mut slot = [0u8; 4];
        let expected = CodecError::BadWidth {
            field: "x".into(),
            kind: "u16",
            expected: 2,
            declared: 1,
        };
        assert_eq!(encode_field(&narrow, &FieldValue::U16(7), &mut slot), Err(expected.clone()));
        assert_eq!(decode_field(&narrow, &slot[..1]), Err(expected));
        assert_eq!(slot, [0; 4]);
    }

    #[test]
    fn test_whole_slot_round_trip() {
        let fields = [
            descriptor("x", 0, FieldKind::U16),
            descriptor("y", 2, FieldKind::U16),
            descriptor("label", 4, FieldKind::Str { capacity: 4 }),
        ];
        let values = [FieldValue::U16(10), FieldValue::U16(20), FieldValue::from("ab")];
        let mut slot = [0u8; 8];

        encode_values(&fields, &values, &mut slot).unwrap();
        assert_eq!(slot, [10, 0, 20, 0, b'a', b'b', 0, 0]);
        assert_eq!(decode_values(&fields, &slot).unwrap(), values.to_vec());
    }
}
