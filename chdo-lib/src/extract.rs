//! Field value extraction.
//!
//! Every function takes a [FieldDefinition] and the raw CHDO payload the field's offsets
//! are relative to. None of them mutate or perform I/O.
//!
//! Bits are numbered from the most significant bit of `byte_offset`, so a field with
//! `bit_offset` 3 and `bit_length` 4 covers bits `0b000x_xxx0` of its first byte.
use crate::dictionary::{FieldDefinition, FieldFormat};
use crate::prelude::*;

/// Integer read widths. A field is read through the narrowest window that holds its
/// bit length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Window {
    W8,
    W16,
    W24,
    W32,
    W64,
}

impl Window {
    /// Narrowest window holding `bit_length` bits, or `None` if 0 or more than 64.
    #[must_use]
    pub fn for_bits(bit_length: u32) -> Option<Self> {
        match bit_length {
            1..=8 => Some(Self::W8),
            9..=16 => Some(Self::W16),
            17..=24 => Some(Self::W24),
            25..=32 => Some(Self::W32),
            33..=64 => Some(Self::W64),
            _ => None,
        }
    }

    #[must_use]
    pub fn bits(self) -> u32 {
        match self {
            Self::W8 => 8,
            Self::W16 => 16,
            Self::W24 => 24,
            Self::W32 => 32,
            Self::W64 => 64,
        }
    }

    /// Read `bit_length` bits starting `bit_offset` bits into `buf[byte_offset]`.
    ///
    /// The window covers `bits() / 8` whole bytes, plus one more byte when the field
    /// straddles the end of the window because of its bit offset.
    fn read(self, buf: &[u8], byte_offset: usize, bit_offset: u8, bit_length: u32) -> Result<u64> {
        debug_assert!(bit_length <= self.bits());
        let straddles = u32::from(bit_offset) + bit_length > self.bits();
        let num_bytes = self.bits() as usize / 8 + usize::from(straddles);
        let bytes = slice(buf, byte_offset, num_bytes)?;

        let mut acc: u128 = 0;
        for b in bytes {
            acc = (acc << 8) | u128::from(*b);
        }
        let shift = num_bytes * 8 - usize::from(bit_offset) - bit_length as usize;
        let mask = (1u128 << bit_length) - 1;
        // masked to at most 64 bits
        Ok(((acc >> shift) & mask) as u64)
    }
}

/// Get `len` bytes of `buf` at `offset`.
pub(crate) fn slice(buf: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    let end = offset + len;
    if buf.len() < end {
        return Err(Error::NotEnoughData {
            actual: buf.len(),
            minimum: end,
        });
    }
    Ok(&buf[offset..end])
}

/// Read the bits described by `field` through the window selected for its width.
fn read_bits(field: &FieldDefinition, raw: &[u8], max_bits: u32, repr: &'static str) -> Result<u64> {
    if field.bit_offset > 7 {
        return Err(Error::Config(format!(
            "field {} has bit offset {}; must be 0 to 7",
            field.field_id, field.bit_offset
        )));
    }
    let window = Window::for_bits(field.bit_length)
        .filter(|_| field.bit_length <= max_bits)
        .ok_or_else(|| unsupported_width(field, repr))?;
    window.read(
        raw,
        field.byte_offset as usize,
        field.bit_offset,
        field.bit_length,
    )
}

pub(crate) fn unsupported_width(field: &FieldDefinition, repr: &'static str) -> Error {
    Error::UnsupportedFieldWidth {
        field: field.field_id.clone(),
        bit_length: field.bit_length,
        repr,
    }
}

pub(crate) fn require_aligned(field: &FieldDefinition) -> Result<()> {
    if field.is_byte_aligned() {
        Ok(())
    } else {
        Err(Error::MisalignedField {
            field: field.field_id.clone(),
            bit_offset: field.bit_offset,
        })
    }
}

pub(crate) fn require_format(field: &FieldDefinition, format: FieldFormat, repr: &str) -> Result<()> {
    if field.format == format {
        Ok(())
    } else {
        Err(Error::UnsupportedOperation(format!(
            "field {} has format {}; {repr} requires {format}",
            field.field_id, field.format
        )))
    }
}

/// Sign extend the low `bits` bits of `value`.
fn sign_extend(value: u64, bits: u32) -> i64 {
    let shift = 64 - bits;
    // reinterpret as two's complement then arithmetic shift back down
    ((value << shift) as i64) >> shift
}

/// Extract an unsigned integer of up to 32 bits.
///
/// # Errors
/// [Error::UnsupportedFieldWidth] if `bit_length` is 0 or more than 32, or
/// [Error::NotEnoughData] if `raw` is too short.
pub fn as_unsigned_int(field: &FieldDefinition, raw: &[u8]) -> Result<u32> {
    let value = read_bits(field, raw, 32, "unsigned integer")?;
    // at most 32 bits were read
    Ok(value as u32)
}

/// Extract a two's complement signed integer of up to 64 bits.
///
/// # Errors
/// [Error::UnsupportedFieldWidth] if `bit_length` is 0 or more than 64, or
/// [Error::NotEnoughData] if `raw` is too short.
pub fn as_signed_int(field: &FieldDefinition, raw: &[u8]) -> Result<i64> {
    let value = read_bits(field, raw, 64, "signed integer")?;
    Ok(sign_extend(value, field.bit_length))
}

/// Extract an IEEE-754 single (32 bit) or double (64 bit) value.
///
/// # Errors
/// [Error::MisalignedField] if not byte aligned, [Error::UnsupportedFieldWidth] for any
/// other width, or [Error::NotEnoughData].
pub fn as_floating_point(field: &FieldDefinition, raw: &[u8]) -> Result<f64> {
    require_aligned(field)?;
    let offset = field.byte_offset as usize;
    match field.bit_length {
        32 => {
            let b = slice(raw, offset, 4)?;
            Ok(f64::from(f32::from_be_bytes([b[0], b[1], b[2], b[3]])))
        }
        64 => {
            let b = slice(raw, offset, 8)?;
            Ok(f64::from_be_bytes([
                b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
            ]))
        }
        _ => Err(unsupported_width(field, "floating point")),
    }
}

fn byte_slice<'a>(field: &FieldDefinition, raw: &'a [u8], repr: &'static str) -> Result<&'a [u8]> {
    require_aligned(field)?;
    if field.bit_length == 0 || field.bit_length % 8 != 0 {
        return Err(unsupported_width(field, repr));
    }
    slice(raw, field.byte_offset as usize, field.bit_length as usize / 8)
}

/// Extract `bit_length / 8` bytes.
///
/// # Errors
/// [Error::MisalignedField] if not byte aligned, [Error::UnsupportedFieldWidth] if the bit
/// length is not a whole number of bytes, or [Error::NotEnoughData].
pub fn as_byte_array(field: &FieldDefinition, raw: &[u8]) -> Result<Vec<u8>> {
    Ok(byte_slice(field, raw, "byte array")?.to_vec())
}

/// Extract a US-ASCII string.
///
/// # Errors
/// Same as [as_byte_array], plus [Error::InvalidCharacter] for any non US-ASCII byte.
pub fn as_string(field: &FieldDefinition, raw: &[u8]) -> Result<String> {
    let bytes = byte_slice(field, raw, "string")?;
    if let Some(byte) = bytes.iter().find(|b| !b.is_ascii()) {
        return Err(Error::InvalidCharacter {
            field: field.field_id.clone(),
            byte: *byte,
        });
    }
    Ok(bytes.iter().map(|b| char::from(*b)).collect())
}

/// Extract a boolean; any non-zero value is `true`.
///
/// # Errors
/// See [as_unsigned_int].
pub fn as_boolean(field: &FieldDefinition, raw: &[u8]) -> Result<bool> {
    Ok(as_unsigned_int(field, raw)? != 0)
}
