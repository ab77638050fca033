use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::dictionary::{ChdoDefinition, ChdoType, FieldDefinition, FieldFormat, CHDO_HEADER_SIZE};
use crate::extract;
use crate::prelude::*;
use crate::timecode::{self, ExtendedUnits, Sclk, SclkFormat};

/// Suffix of the boolean field enabling the extended resolution of a 64 bit date.
pub const EXTENDED_RESOLUTION_SUFFIX: &str = "_extended_resolution";
/// Suffix of the boolean field selecting the units of a 64 bit date's extended
/// resolution; `true` for tenths of microseconds, `false` for microseconds.
pub const EXTENDED_UNITS_SUFFIX: &str = "_ext_res_units";

/// Header common to every CHDO.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChdoHeader {
    pub chdo_type: ChdoType,
    /// Number of payload bytes following the header.
    pub length: u16,
}

impl ChdoHeader {
    /// Size of a ``ChdoHeader``
    pub const LEN: usize = CHDO_HEADER_SIZE;

    /// Decode from bytes. Returns `None` if there are not enough bytes to construct the
    /// header.
    #[must_use]
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::LEN {
            return None;
        }
        Some(ChdoHeader {
            chdo_type: u16::from_be_bytes([buf[0], buf[1]]),
            length: u16::from_be_bytes([buf[2], buf[3]]),
        })
    }

    #[must_use]
    pub fn encode(&self) -> [u8; Self::LEN] {
        let mut buf = [0u8; Self::LEN];
        buf[..2].copy_from_slice(&self.chdo_type.to_be_bytes());
        buf[2..].copy_from_slice(&self.length.to_be_bytes());
        buf
    }
}

/// A decoded field value.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    Unsigned(u32),
    Signed(i64),
    Float(f64),
    String(String),
    Binary(Vec<u8>),
    Date(DateTime<Utc>),
    Sclk(Sclk),
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unsigned(v) => write!(f, "{v}"),
            Self::Signed(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::Binary(v) => {
                for b in v {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
            Self::Date(v) => write!(f, "{}", v.to_rfc3339()),
            Self::Sclk(v) => write!(f, "{v}"),
        }
    }
}

/// One CHDO read from an SFDU.
///
/// Field offsets are relative to the payload, i.e., [Chdo::bytes_without_header].
#[derive(Debug, Clone)]
pub struct Chdo<'a> {
    definition: &'a ChdoDefinition,
    /// Header and payload bytes
    raw_value: Vec<u8>,
    header_length: usize,
}

impl<'a> Chdo<'a> {
    /// Create from header and payload bytes.
    ///
    /// # Errors
    /// [Error::NotEnoughData] if `raw_value` does not contain a header.
    pub fn new(definition: &'a ChdoDefinition, raw_value: Vec<u8>) -> Result<Self> {
        if raw_value.len() < ChdoHeader::LEN {
            return Err(Error::NotEnoughData {
                actual: raw_value.len(),
                minimum: ChdoHeader::LEN,
            });
        }
        Ok(Chdo {
            definition,
            raw_value,
            header_length: ChdoHeader::LEN,
        })
    }

    #[must_use]
    pub fn definition(&self) -> &'a ChdoDefinition {
        self.definition
    }

    #[must_use]
    pub fn chdo_type(&self) -> ChdoType {
        self.definition.chdo_type
    }

    #[must_use]
    pub fn header(&self) -> ChdoHeader {
        // constructor guarantees a header
        ChdoHeader::decode(&self.raw_value).unwrap_or(ChdoHeader {
            chdo_type: self.definition.chdo_type,
            length: 0,
        })
    }

    /// The length declared in the CHDO header.
    #[must_use]
    pub fn length(&self) -> u16 {
        self.header().length
    }

    #[must_use]
    pub fn header_length(&self) -> usize {
        self.header_length
    }

    #[must_use]
    pub fn raw_value(&self) -> &[u8] {
        &self.raw_value
    }

    #[must_use]
    pub fn bytes_without_header(&self) -> &[u8] {
        &self.raw_value[self.header_length..]
    }

    /// Lookup a field definition by name.
    ///
    /// # Errors
    /// [Error::UnknownField] if this CHDO has no such field.
    pub fn field(&self, name: &str) -> Result<&'a FieldDefinition> {
        self.definition.field(name).ok_or_else(|| Error::UnknownField {
            chdo_type: self.definition.chdo_type,
            field: name.to_string(),
        })
    }

    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.definition.field(name).is_some()
    }

    /// # Errors
    /// [Error::UnknownField] or any error from [extract::as_unsigned_int].
    pub fn unsigned_int(&self, name: &str) -> Result<u32> {
        extract::as_unsigned_int(self.field(name)?, self.bytes_without_header())
    }

    /// # Errors
    /// [Error::UnknownField] or any error from [extract::as_signed_int].
    pub fn signed_int(&self, name: &str) -> Result<i64> {
        extract::as_signed_int(self.field(name)?, self.bytes_without_header())
    }

    /// # Errors
    /// [Error::UnknownField] or any error from [extract::as_floating_point].
    pub fn floating_point(&self, name: &str) -> Result<f64> {
        extract::as_floating_point(self.field(name)?, self.bytes_without_header())
    }

    /// # Errors
    /// [Error::UnknownField] or any error from [extract::as_byte_array].
    pub fn byte_array(&self, name: &str) -> Result<Vec<u8>> {
        extract::as_byte_array(self.field(name)?, self.bytes_without_header())
    }

    /// # Errors
    /// [Error::UnknownField] or any error from [extract::as_string].
    pub fn string(&self, name: &str) -> Result<String> {
        extract::as_string(self.field(name)?, self.bytes_without_header())
    }

    /// Boolean value of a field. A missing field is logged and read as `false`.
    ///
    /// # Errors
    /// Any error from [extract::as_boolean].
    pub fn boolean(&self, name: &str) -> Result<bool> {
        let Some(field) = self.definition.field(name) else {
            warn!(
                chdo_type = self.definition.chdo_type,
                field = name,
                "boolean field not found; using false"
            );
            return Ok(false);
        };
        extract::as_boolean(field, self.bytes_without_header())
    }

    /// Date value of a time field.
    ///
    /// The extended resolution of a 64 bit date is applied only when this CHDO has a
    /// `<name>_extended_resolution` field that is set. Its units are selected by the
    /// `<name>_ext_res_units` field, defaulting to tenths of microseconds when absent.
    ///
    /// # Errors
    /// [Error::UnknownField] or any error from [timecode::as_date].
    pub fn date(&self, name: &str) -> Result<DateTime<Utc>> {
        let field = self.field(name)?;
        timecode::as_date(field, self.bytes_without_header(), self.extended_units(name)?)
    }

    fn extended_units(&self, name: &str) -> Result<Option<ExtendedUnits>> {
        let enabled = format!("{name}{EXTENDED_RESOLUTION_SUFFIX}");
        if !self.has_field(&enabled) || !self.boolean(&enabled)? {
            return Ok(None);
        }
        let units = format!("{name}{EXTENDED_UNITS_SUFFIX}");
        if !self.has_field(&units) || self.boolean(&units)? {
            Ok(Some(ExtendedUnits::TenthsOfMicroseconds))
        } else {
            Ok(Some(ExtendedUnits::Microseconds))
        }
    }

    /// # Errors
    /// [Error::UnknownField] or any error from [timecode::as_sclk].
    pub fn sclk(&self, name: &str, format: &SclkFormat) -> Result<Sclk> {
        timecode::as_sclk(self.field(name)?, self.bytes_without_header(), format)
    }

    /// Value of the field named `name` decoded according to its format.
    ///
    /// 40 bit time fields are decoded as [Sclk]; other time fields as dates.
    ///
    /// # Errors
    /// [Error::UnknownField] or any extraction error.
    pub fn value(&self, name: &str, sclk: &SclkFormat) -> Result<FieldValue> {
        let field = self.field(name)?;
        let raw = self.bytes_without_header();
        Ok(match field.format {
            FieldFormat::UnsignedInteger => FieldValue::Unsigned(extract::as_unsigned_int(field, raw)?),
            FieldFormat::SignedInteger => FieldValue::Signed(extract::as_signed_int(field, raw)?),
            FieldFormat::FloatingPoint => FieldValue::Float(extract::as_floating_point(field, raw)?),
            FieldFormat::String => FieldValue::String(extract::as_string(field, raw)?),
            FieldFormat::Binary => FieldValue::Binary(extract::as_byte_array(field, raw)?),
            FieldFormat::Time if field.bit_length == 40 => {
                FieldValue::Sclk(timecode::as_sclk(field, raw, sclk)?)
            }
            FieldFormat::Time => FieldValue::Date(self.date(name)?),
        })
    }

    /// Every field value, in [ChdoDefinition::fields_in_order] order.
    #[must_use]
    pub fn values(&self, sclk: &SclkFormat) -> Vec<(&'a FieldDefinition, Result<FieldValue>)> {
        self.definition
            .fields_in_order()
            .into_iter()
            .map(|field| (field, self.value(&field.field_id, sclk)))
            .collect()
    }
}

impl Display for Chdo<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Chdo{{type: {}, name: {}, length: {}}}",
            self.chdo_type(),
            self.definition.name,
            self.length()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::Classification;

    fn field(id: &str, byte_offset: u32, bit_offset: u8, bit_length: u32, format: FieldFormat) -> FieldDefinition {
        FieldDefinition::builder()
            .field_id(id)
            .byte_offset(byte_offset)
            .bit_offset(bit_offset)
            .bit_length(bit_length)
            .format(format)
            .build()
    }

    fn definition() -> ChdoDefinition {
        ChdoDefinition::new(5, "tertiary", Classification::Tertiary, 16)
            .with_field(field("scft_id", 0, 0, 16, FieldFormat::UnsignedInteger))
            .with_field(field("ert", 2, 0, 64, FieldFormat::Time))
            .with_field(field("ert_extended_resolution", 10, 0, 1, FieldFormat::UnsignedInteger))
            .with_field(field("ert_ext_res_units", 10, 1, 1, FieldFormat::UnsignedInteger))
            .with_field(field("sclk", 11, 0, 40, FieldFormat::Time))
    }

    #[rustfmt::skip]
    fn raw(flags: u8) -> Vec<u8> {
        vec![
            // header: type 5, length 16
            0x00, 0x05, 0x00, 0x10,
            // scft_id
            0x00, 0x4c,
            // ert: 1970-01-02 plus 1ms, extended value 10
            0x11, 0x20, 0x00, 0x00, 0x00, 0x01, 0x00, 0x0a,
            // flags
            flags,
            // sclk
            0x00, 0x00, 0x00, 0x10, 0x02,
        ]
    }

    #[test]
    fn header_decode() {
        let header = ChdoHeader::decode(&[0x00, 0x05, 0x01, 0x02]).unwrap();
        assert_eq!(header, ChdoHeader { chdo_type: 5, length: 0x102 });
        assert_eq!(header.encode(), [0x00, 0x05, 0x01, 0x02]);
        assert!(ChdoHeader::decode(&[0x00, 0x05, 0x01]).is_none());
    }

    #[test]
    fn accessors() {
        let def = definition();
        let chdo = Chdo::new(&def, raw(0)).unwrap();
        assert_eq!(chdo.chdo_type(), 5);
        assert_eq!(chdo.length(), 16);
        assert_eq!(chdo.bytes_without_header().len(), 16);
        assert_eq!(chdo.unsigned_int("scft_id").unwrap(), 76);
        assert_eq!(
            chdo.sclk("sclk", &SclkFormat::default()).unwrap(),
            Sclk::new(16, 2)
        );
    }

    #[test]
    fn unknown_field() {
        let def = definition();
        let chdo = Chdo::new(&def, raw(0)).unwrap();
        let err = chdo.unsigned_int("nope").unwrap_err();
        assert!(
            matches!(err, Error::UnknownField { chdo_type: 5, ref field } if field == "nope"),
            "got {err:?}"
        );
    }

    #[test]
    fn missing_boolean_is_false() {
        let def = definition();
        let chdo = Chdo::new(&def, raw(0xff)).unwrap();
        assert!(!chdo.boolean("nope").unwrap());
        assert!(chdo.boolean("ert_extended_resolution").unwrap());
    }

    #[test]
    fn date_extended_resolution() {
        let def = definition();
        let base = DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::milliseconds(86_400_001);

        // disabled
        let chdo = Chdo::new(&def, raw(0b0000_0000)).unwrap();
        assert_eq!(chdo.date("ert").unwrap(), base);
        // enabled, microseconds
        let chdo = Chdo::new(&def, raw(0b1000_0000)).unwrap();
        assert_eq!(
            chdo.date("ert").unwrap(),
            base + chrono::Duration::microseconds(10)
        );
        // enabled, tenths of microseconds
        let chdo = Chdo::new(&def, raw(0b1100_0000)).unwrap();
        assert_eq!(
            chdo.date("ert").unwrap(),
            base + chrono::Duration::nanoseconds(1000)
        );
    }

    #[test]
    fn date_extended_units_default() {
        let def = ChdoDefinition::new(5, "tertiary", Classification::Tertiary, 11)
            .with_field(field("ert", 2, 0, 64, FieldFormat::Time))
            .with_field(field("ert_extended_resolution", 10, 0, 1, FieldFormat::UnsignedInteger));
        let chdo = Chdo::new(&def, raw(0b1000_0000)).unwrap();
        let base = DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::milliseconds(86_400_001);
        assert_eq!(
            chdo.date("ert").unwrap(),
            base + chrono::Duration::nanoseconds(1000)
        );
    }

    #[test]
    fn values_in_field_order() {
        let def = definition();
        let chdo = Chdo::new(&def, raw(0)).unwrap();
        let values = chdo.values(&SclkFormat::default());
        let ids: Vec<&str> = values.iter().map(|(f, _)| f.field_id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["scft_id", "ert", "sclk", "ert_extended_resolution", "ert_ext_res_units"]
        );
        assert_eq!(*values[0].1.as_ref().unwrap(), FieldValue::Unsigned(76));
        assert_eq!(*values[2].1.as_ref().unwrap(), FieldValue::Sclk(Sclk::new(16, 2)));
        assert_eq!(values[2].1.as_ref().unwrap().to_string(), "16-2");
    }

    #[test]
    fn new_requires_header() {
        let def = definition();
        assert!(Chdo::new(&def, vec![0, 5]).is_err());
    }
}
