//! CHDO dictionary model.
//!
//! A [ChdoConfiguration] describes the shape of every known CHDO type, the control
//! authority ids that may start an SFDU label, and the named [Property]s used to
//! classify decoded SFDUs. It is loaded once (see [DictionaryParser]) and is read-only
//! afterwards, so it may be shared by reference across any number of reader sessions.
mod loader;

use std::collections::{HashMap, HashSet};
use std::fmt::Display;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::prelude::*;
use crate::timecode::SclkFormat;

pub use loader::*;

pub type ChdoType = u16;

/// Size of the CHDO type field in the CHDO header
pub const CHDO_TYPE_SIZE: usize = 2;
/// Size of the CHDO length field in the CHDO header
pub const CHDO_LENGTH_SIZE: usize = 2;
/// Size of the header common to every CHDO
pub const CHDO_HEADER_SIZE: usize = CHDO_TYPE_SIZE + CHDO_LENGTH_SIZE;

/// Length of a control authority id at the start of an SFDU label.
pub const CONTROL_AUTHORITY_ID_LEN: usize = 4;

/// Format class of a field, which determines how its bits are interpreted and compared.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FieldFormat {
    UnsignedInteger,
    SignedInteger,
    Time,
    FloatingPoint,
    String,
    Binary,
}

impl Display for FieldFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::UnsignedInteger => "unsigned_integer",
            Self::SignedInteger => "signed_integer",
            Self::Time => "time",
            Self::FloatingPoint => "floating_point",
            Self::String => "string",
            Self::Binary => "binary",
        };
        write!(f, "{name}")
    }
}

/// One named bit-field within a CHDO.
///
/// Offsets are relative to the start of the CHDO payload, i.e., the bytes following
/// the 4 byte CHDO type/length header.
///
/// # Example
/// ```
/// use chdo::dictionary::{FieldDefinition, FieldFormat};
///
/// let field = FieldDefinition::builder()
///     .field_id("mode")
///     .byte_offset(2)
///     .bit_offset(3)
///     .bit_length(4)
///     .format(FieldFormat::UnsignedInteger)
///     .build();
/// assert!(!field.is_flag());
/// ```
#[derive(Serialize, Deserialize, TypedBuilder, Debug, Clone, PartialEq, Eq)]
pub struct FieldDefinition {
    #[serde(rename = "id")]
    #[builder(setter(into))]
    pub field_id: String,
    #[serde(default)]
    #[builder(default)]
    pub byte_offset: u32,
    /// Bit offset, 0 to 7, relative to `byte_offset`. Bit 0 is the most significant bit.
    #[serde(default)]
    #[builder(default)]
    pub bit_offset: u8,
    pub bit_length: u32,
    pub format: FieldFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub min_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub max_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub default_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub fixed_value: Option<i64>,
}

impl FieldDefinition {
    /// Flags are single bit views overlapping another integer field.
    #[must_use]
    pub fn is_flag(&self) -> bool {
        self.bit_length == 1
    }

    #[must_use]
    pub fn is_byte_aligned(&self) -> bool {
        self.bit_offset == 0
    }

    /// Bit position, relative to the start of the payload, one past the last bit of
    /// this field.
    #[must_use]
    pub fn end_bit(&self) -> u64 {
        u64::from(self.byte_offset) * 8 + u64::from(self.bit_offset) + u64::from(self.bit_length)
    }

    /// Number of payload bytes required to read this field.
    #[must_use]
    pub fn min_payload_len(&self) -> u64 {
        self.end_bit().div_ceil(8)
    }
}

/// The role a CHDO plays within an SFDU.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Primary,
    Secondary,
    Tertiary,
    Quaternary,
    /// Container for the CHDOs that follow it.
    Aggregation,
    /// The telemetry payload.
    Data,
}

/// Shape of one numbered CHDO type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChdoDefinition {
    pub chdo_type: ChdoType,
    pub name: String,
    pub classification: Classification,
    /// Minimum payload size, in bytes, required to hold all fields. Zero for field-less
    /// containers such as aggregation and raw data CHDOs.
    pub byte_size: u32,
    fields: HashMap<String, FieldDefinition>,
}

impl ChdoDefinition {
    pub fn new<S: Into<String>>(
        chdo_type: ChdoType,
        name: S,
        classification: Classification,
        byte_size: u32,
    ) -> Self {
        Self {
            chdo_type,
            name: name.into(),
            classification,
            byte_size,
            fields: HashMap::default(),
        }
    }

    /// Add `field`, replacing any existing field with the same id.
    #[must_use]
    pub fn with_field(mut self, field: FieldDefinition) -> Self {
        self.insert_field(field);
        self
    }

    /// Insert `field`, returning the field previously defined with the same id, if any.
    pub fn insert_field(&mut self, field: FieldDefinition) -> Option<FieldDefinition> {
        self.fields.insert(field.field_id.clone(), field)
    }

    /// Lookup a field by its case-sensitive id.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.values()
    }

    /// All fields in processing order: non-flag fields first, followed by flags, each
    /// ordered by position.
    #[must_use]
    pub fn fields_in_order(&self) -> Vec<&FieldDefinition> {
        let mut fields: Vec<&FieldDefinition> = self.fields.values().collect();
        fields.sort_by(|a, b| {
            (a.is_flag(), a.byte_offset, a.bit_offset, &a.field_id).cmp(&(
                b.is_flag(),
                b.byte_offset,
                b.bit_offset,
                &b.field_id,
            ))
        });
        fields
    }

    /// Check field positions against this definition.
    ///
    /// # Errors
    /// [Error::Config] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.byte_size == 0 && !self.fields.is_empty() {
            return Err(Error::Config(format!(
                "CHDO {} has fields but a byte size of 0",
                self.chdo_type
            )));
        }
        for field in self.fields_in_order() {
            if field.bit_offset > 7 {
                return Err(Error::Config(format!(
                    "CHDO {} field {} has bit offset {}; must be 0 to 7",
                    self.chdo_type, field.field_id, field.bit_offset
                )));
            }
            if field.bit_length == 0 {
                return Err(Error::Config(format!(
                    "CHDO {} field {} has a bit length of 0",
                    self.chdo_type, field.field_id
                )));
            }
            if field.min_payload_len() > u64::from(self.byte_size) {
                return Err(Error::Config(format!(
                    "CHDO {} field {} ends at bit {}, beyond the CHDO byte size {}",
                    self.chdo_type,
                    field.field_id,
                    field.end_bit(),
                    self.byte_size
                )));
            }
        }
        Ok(())
    }
}

/// A single field comparison within a [Condition].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EqualityCondition {
    /// Field id the comparison applies to.
    pub name: String,
    /// Textual representation of the comparison literal.
    pub value: String,
    /// `true` if the field must equal `value`, `false` if it must not.
    #[serde(rename = "equal", default = "default_equality")]
    pub equality_value: bool,
}

fn default_equality() -> bool {
    true
}

impl EqualityCondition {
    pub fn new<N: Into<String>, V: Into<String>>(name: N, value: V, equality_value: bool) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            equality_value,
        }
    }
}

/// Compound test scoped to one CHDO type; all equalities must hold.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub chdo_type: ChdoType,
    #[serde(rename = "equalities")]
    pub equality_conditions: Vec<EqualityCondition>,
}

impl Condition {
    pub fn new(chdo_type: ChdoType, equality_conditions: Vec<EqualityCondition>) -> Self {
        Self {
            chdo_type,
            equality_conditions,
        }
    }
}

/// Named classification; true if any of its conditions hold.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub conditions: Vec<Condition>,
}

impl Property {
    pub fn new<S: Into<String>>(name: S, conditions: Vec<Condition>) -> Self {
        Self {
            name: name.into(),
            conditions,
        }
    }
}

/// The CHDO dictionary.
///
/// # Example
/// ```
/// use chdo::dictionary::{ChdoConfiguration, ChdoDefinition, Classification};
///
/// let config = ChdoConfiguration::new("1.0")
///     .with_control_authority("NJPL")
///     .with_definition(ChdoDefinition::new(10, "data", Classification::Data, 0));
/// assert!(config.definition_by_type(10).is_some());
/// assert!(config.require_definition(11).is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ChdoConfiguration {
    version: String,
    definitions: HashMap<ChdoType, ChdoDefinition>,
    control_authority_ids: HashSet<String>,
    properties: HashMap<String, Property>,
    sclk: SclkFormat,
}

impl ChdoConfiguration {
    pub fn new<S: Into<String>>(version: S) -> Self {
        Self {
            version: version.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_definition(mut self, definition: ChdoDefinition) -> Self {
        self.insert_definition(definition);
        self
    }

    #[must_use]
    pub fn with_control_authority<S: Into<String>>(mut self, id: S) -> Self {
        self.control_authority_ids.insert(id.into());
        self
    }

    #[must_use]
    pub fn with_property(mut self, property: Property) -> Self {
        self.insert_property(property);
        self
    }

    #[must_use]
    pub fn with_sclk_format(mut self, sclk: SclkFormat) -> Self {
        self.sclk = sclk;
        self
    }

    /// Insert `definition`, returning any definition previously registered for its type.
    pub fn insert_definition(&mut self, definition: ChdoDefinition) -> Option<ChdoDefinition> {
        self.definitions.insert(definition.chdo_type, definition)
    }

    /// Insert `property`, returning any property previously registered with its name.
    pub fn insert_property(&mut self, property: Property) -> Option<Property> {
        self.properties.insert(property.name.clone(), property)
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[must_use]
    pub fn definition_by_type(&self, chdo_type: ChdoType) -> Option<&ChdoDefinition> {
        self.definitions.get(&chdo_type)
    }

    /// Lookup a definition, treating a missing definition as an error.
    ///
    /// # Errors
    /// [Error::UnknownChdo] if there is no definition for `chdo_type`.
    pub fn require_definition(&self, chdo_type: ChdoType) -> Result<&ChdoDefinition> {
        self.definitions
            .get(&chdo_type)
            .ok_or(Error::UnknownChdo(chdo_type))
    }

    /// Lookup a field by name within the definition for `chdo_type`.
    #[must_use]
    pub fn field_definition_by_name(
        &self,
        chdo_type: ChdoType,
        name: &str,
    ) -> Option<&FieldDefinition> {
        self.definition_by_type(chdo_type)
            .and_then(|def| def.field(name))
    }

    pub fn definitions(&self) -> impl Iterator<Item = &ChdoDefinition> {
        self.definitions.values()
    }

    #[must_use]
    pub fn control_authority_ids(&self) -> &HashSet<String> {
        &self.control_authority_ids
    }

    #[must_use]
    pub fn is_control_authority(&self, id: &str) -> bool {
        self.control_authority_ids.contains(id)
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    pub fn properties(&self) -> impl Iterator<Item = &Property> {
        self.properties.values()
    }

    #[must_use]
    pub fn sclk_format(&self) -> &SclkFormat {
        &self.sclk
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty() && self.properties.is_empty()
    }

    /// Reset to an empty configuration.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Check the internal consistency of the dictionary.
    ///
    /// # Errors
    /// [Error::Config] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.control_authority_ids.is_empty() {
            return Err(Error::Config("no control authority ids".to_string()));
        }
        for id in &self.control_authority_ids {
            if id.len() != CONTROL_AUTHORITY_ID_LEN || !id.is_ascii() {
                return Err(Error::Config(format!(
                    "control authority id {id:?} must be {CONTROL_AUTHORITY_ID_LEN} ASCII characters"
                )));
            }
        }
        for definition in self.definitions.values() {
            definition.validate()?;
        }
        for property in self.properties.values() {
            for condition in &property.conditions {
                let definition = self.definition_by_type(condition.chdo_type).ok_or_else(|| {
                    Error::Config(format!(
                        "property {} references unknown CHDO type {}",
                        property.name, condition.chdo_type
                    ))
                })?;
                for equality in &condition.equality_conditions {
                    if definition.field(&equality.name).is_none() {
                        return Err(Error::Config(format!(
                            "property {} references unknown field {} of CHDO type {}",
                            property.name, equality.name, condition.chdo_type
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(id: &str, byte_offset: u32, bit_offset: u8, bit_length: u32) -> FieldDefinition {
        FieldDefinition::builder()
            .field_id(id)
            .byte_offset(byte_offset)
            .bit_offset(bit_offset)
            .bit_length(bit_length)
            .format(FieldFormat::UnsignedInteger)
            .build()
    }

    #[test]
    fn fields_in_order_puts_flags_last() {
        let def = ChdoDefinition::new(2, "primary", Classification::Primary, 4)
            .with_field(field("flag_b", 0, 1, 1))
            .with_field(field("mode", 1, 0, 8))
            .with_field(field("flag_a", 0, 0, 1))
            .with_field(field("major", 0, 0, 8));

        let ids: Vec<&str> = def
            .fields_in_order()
            .iter()
            .map(|f| f.field_id.as_str())
            .collect();
        assert_eq!(ids, vec!["major", "mode", "flag_a", "flag_b"]);
    }

    #[test]
    fn field_names_are_case_sensitive() {
        let def = ChdoDefinition::new(2, "primary", Classification::Primary, 4)
            .with_field(field("mode", 0, 0, 8));
        assert!(def.field("mode").is_some());
        assert!(def.field("MODE").is_none());
    }

    #[test]
    fn require_definition_unknown_type() {
        let config = ChdoConfiguration::new("1");
        let err = config.require_definition(99).unwrap_err();
        assert!(matches!(err, Error::UnknownChdo(99)), "got {err:?}");
    }

    #[test]
    fn validate_field_beyond_byte_size() {
        let def = ChdoDefinition::new(2, "primary", Classification::Primary, 2)
            .with_field(field("wide", 1, 4, 8));
        let err = def.validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)), "got {err:?}");
    }

    #[test]
    fn validate_rejects_fields_without_byte_size() {
        let def =
            ChdoDefinition::new(10, "data", Classification::Data, 0).with_field(field("x", 0, 0, 8));
        assert!(def.validate().is_err());
    }

    #[test]
    fn validate_bad_bit_offset() {
        let def = ChdoDefinition::new(2, "primary", Classification::Primary, 4)
            .with_field(field("x", 0, 8, 1));
        assert!(def.validate().is_err());
    }

    #[test]
    fn validate_property_with_unknown_field() {
        let config = ChdoConfiguration::new("1")
            .with_control_authority("NJPL")
            .with_definition(
                ChdoDefinition::new(2, "primary", Classification::Primary, 1)
                    .with_field(field("mode", 0, 0, 8)),
            )
            .with_property(Property::new(
                "is_idle",
                vec![Condition::new(
                    2,
                    vec![EqualityCondition::new("nope", "1", true)],
                )],
            ));
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)), "got {err:?}");
    }

    #[test]
    fn validate_control_authority_length() {
        let config = ChdoConfiguration::new("1").with_control_authority("NJP");
        assert!(config.validate().is_err());
    }

    #[test]
    fn clear_resets_everything() {
        let mut config = ChdoConfiguration::new("1")
            .with_control_authority("NJPL")
            .with_definition(ChdoDefinition::new(10, "data", Classification::Data, 0))
            .with_sclk_format(SclkFormat { coarse_bits: 24 });
        config.clear();

        assert!(config.is_empty());
        assert_eq!(config.version(), "");
        assert!(config.control_authority_ids().is_empty());
        assert_eq!(config.sclk_format(), &SclkFormat::default());
    }
}
