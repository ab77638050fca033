use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    ChdoConfiguration, ChdoDefinition, ChdoType, Classification, FieldDefinition, Property,
};
use crate::prelude::*;
use crate::timecode::SclkFormat;

/// Produces a [ChdoConfiguration] from a dictionary file.
pub trait DictionaryParser: Send + Sync {
    /// Parse and validate the dictionary at `path`.
    ///
    /// # Errors
    /// [Error::Config] if the dictionary is invalid, or any source error reading it.
    fn parse(&self, path: &Path) -> Result<ChdoConfiguration>;
}

/// On-disk JSON representation of a dictionary.
#[derive(Serialize, Deserialize, Debug, Clone)]
struct DictionaryFile {
    version: String,
    control_authority_ids: Vec<String>,
    #[serde(default)]
    sclk: SclkFormat,
    #[serde(default)]
    chdos: Vec<ChdoEntry>,
    #[serde(default)]
    properties: Vec<Property>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct ChdoEntry {
    #[serde(rename = "type")]
    chdo_type: ChdoType,
    name: String,
    classification: Classification,
    #[serde(default)]
    byte_size: u32,
    #[serde(default)]
    fields: Vec<FieldDefinition>,
}

impl DictionaryFile {
    fn into_configuration(self) -> Result<ChdoConfiguration> {
        let mut config = ChdoConfiguration::new(self.version).with_sclk_format(self.sclk);
        for id in self.control_authority_ids {
            config = config.with_control_authority(id);
        }

        for entry in self.chdos {
            let mut definition = ChdoDefinition::new(
                entry.chdo_type,
                entry.name,
                entry.classification,
                entry.byte_size,
            );
            for field in entry.fields {
                let id = field.field_id.clone();
                if definition.insert_field(field).is_some() {
                    return Err(Error::Config(format!(
                        "duplicate field {id} in CHDO type {}",
                        entry.chdo_type
                    )));
                }
            }
            if config.insert_definition(definition).is_some() {
                return Err(Error::Config(format!(
                    "duplicate CHDO type {}",
                    entry.chdo_type
                )));
            }
        }

        for property in self.properties {
            let name = property.name.clone();
            if config.insert_property(property).is_some() {
                return Err(Error::Config(format!("duplicate property {name}")));
            }
        }

        config.validate()?;
        Ok(config)
    }
}

/// Parses dictionaries in the JSON dictionary format.
///
/// # Example
/// ```
/// use chdo::dictionary::JsonDictionaryParser;
///
/// let config = JsonDictionaryParser::parse_str(r#"{
///     "version": "1.0",
///     "control_authority_ids": ["NJPL"],
///     "chdos": [
///         {"type": 10, "name": "data", "classification": "data"}
///     ]
/// }"#).unwrap();
/// assert_eq!(config.version(), "1.0");
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonDictionaryParser;

impl JsonDictionaryParser {
    /// Parse a dictionary from a JSON string.
    ///
    /// # Errors
    /// [Error::Json] if the input is not a valid dictionary document, or [Error::Config]
    /// if the dictionary is not internally consistent.
    pub fn parse_str(s: &str) -> Result<ChdoConfiguration> {
        let file: DictionaryFile = serde_json::from_str(s)?;
        file.into_configuration()
    }

    /// Parse a dictionary from a reader providing a JSON document.
    ///
    /// # Errors
    /// See [JsonDictionaryParser::parse_str].
    pub fn parse_reader<R: Read>(reader: R) -> Result<ChdoConfiguration> {
        let file: DictionaryFile = serde_json::from_reader(reader)?;
        file.into_configuration()
    }
}

impl DictionaryParser for JsonDictionaryParser {
    fn parse(&self, path: &Path) -> Result<ChdoConfiguration> {
        let config = Self::parse_reader(BufReader::new(File::open(path)?))?;
        debug!(path = %path.display(), version = config.version(), "loaded CHDO dictionary");
        Ok(config)
    }
}

/// Dictionary formats supported out of the box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum DictionaryKind {
    Json,
}

impl FromStr for DictionaryKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(Self::Json),
            _ => Err(Error::Config(format!("unknown dictionary kind {s}"))),
        }
    }
}

pub type ParserConstructor = fn() -> Box<dyn DictionaryParser>;

/// Resolves dictionary parsers by [DictionaryKind] or by a registered name.
///
/// Mission adaptations provide their own parsers by registering a constructor under a
/// name rather than being discovered at runtime.
///
/// # Example
/// ```
/// use chdo::dictionary::{DictionaryParser, JsonDictionaryParser, ParserRegistry};
///
/// fn mission_parser() -> Box<dyn DictionaryParser> {
///     Box::new(JsonDictionaryParser)
/// }
///
/// let mut registry = ParserRegistry::default();
/// registry.register("mission", mission_parser);
/// assert!(registry.custom("mission").is_ok());
/// assert!(registry.custom("other").is_err());
/// ```
#[derive(Default)]
pub struct ParserRegistry {
    custom: HashMap<String, ParserConstructor>,
}

impl ParserRegistry {
    /// Register a constructor under `name`, returning any constructor it replaces.
    pub fn register<S: Into<String>>(
        &mut self,
        name: S,
        constructor: ParserConstructor,
    ) -> Option<ParserConstructor> {
        self.custom.insert(name.into(), constructor)
    }

    #[must_use]
    pub fn parser(&self, kind: DictionaryKind) -> Box<dyn DictionaryParser> {
        match kind {
            DictionaryKind::Json => Box::new(JsonDictionaryParser),
        }
    }

    /// Construct the parser registered as `name`.
    ///
    /// # Errors
    /// [Error::Config] if nothing is registered under `name`.
    pub fn custom(&self, name: &str) -> Result<Box<dyn DictionaryParser>> {
        self.custom
            .get(name)
            .map(|constructor| constructor())
            .ok_or_else(|| Error::Config(format!("no dictionary parser registered as {name}")))
    }

    /// Resolve `name` as a built-in [DictionaryKind] first, then as a registered name.
    ///
    /// # Errors
    /// [Error::Config] if `name` is neither.
    pub fn resolve(&self, name: &str) -> Result<Box<dyn DictionaryParser>> {
        match DictionaryKind::from_str(name) {
            Ok(kind) => Ok(self.parser(kind)),
            Err(_) => self.custom(name),
        }
    }
}

/// Loaded dictionaries keyed by dictionary version.
///
/// A dictionary version identifies immutable content, so loading a version that is
/// already cached returns the cached instance. [DictionaryCache::clear] drops every
/// entry.
#[derive(Debug, Default)]
pub struct DictionaryCache {
    by_version: HashMap<String, Arc<ChdoConfiguration>>,
    current: Option<String>,
}

impl DictionaryCache {
    /// Parse the dictionary at `path` and make it the current dictionary.
    ///
    /// # Errors
    /// Any error from `parser`.
    pub fn load(
        &mut self,
        parser: &dyn DictionaryParser,
        path: &Path,
    ) -> Result<Arc<ChdoConfiguration>> {
        let config = parser.parse(path)?;
        Ok(self.insert(config))
    }

    /// Add `config` and make it the current dictionary.
    pub fn insert(&mut self, config: ChdoConfiguration) -> Arc<ChdoConfiguration> {
        let version = config.version().to_string();
        let config = self
            .by_version
            .entry(version.clone())
            .or_insert_with(|| Arc::new(config))
            .clone();
        self.current = Some(version);
        config
    }

    #[must_use]
    pub fn get(&self, version: &str) -> Option<Arc<ChdoConfiguration>> {
        self.by_version.get(version).cloned()
    }

    /// The most recently loaded dictionary.
    #[must_use]
    pub fn current(&self) -> Option<Arc<ChdoConfiguration>> {
        self.current.as_deref().and_then(|v| self.get(v))
    }

    /// Version of the most recently loaded dictionary.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.current.as_deref()
    }

    #[must_use]
    pub fn versions(&self) -> HashSet<&str> {
        self.by_version.keys().map(String::as_str).collect()
    }

    pub fn clear(&mut self) {
        self.by_version.clear();
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::dictionary::FieldFormat;

    const DICTIONARY: &str = r#"{
        "version": "2.1",
        "control_authority_ids": ["NJPL", "CCSD"],
        "chdos": [
            {
                "type": 2, "name": "primary", "classification": "primary", "byte_size": 4,
                "fields": [
                    {"id": "major", "byte_offset": 0, "bit_length": 8, "format": "unsigned_integer"},
                    {"id": "minor", "byte_offset": 1, "bit_length": 8, "format": "unsigned_integer"},
                    {"id": "mission_id", "byte_offset": 2, "bit_length": 8, "format": "unsigned_integer",
                     "fixed_value": 0}
                ]
            },
            {"type": 10, "name": "data", "classification": "data"}
        ],
        "properties": [
            {"name": "is_frame", "conditions": [
                {"chdo_type": 2, "equalities": [
                    {"name": "major", "value": "1"},
                    {"name": "minor", "value": "2", "equal": false}
                ]}
            ]}
        ]
    }"#;

    #[test]
    fn parse_str() {
        let config = JsonDictionaryParser::parse_str(DICTIONARY).unwrap();

        assert_eq!(config.version(), "2.1");
        assert!(config.is_control_authority("NJPL"));
        assert!(config.is_control_authority("CCSD"));
        assert_eq!(config.sclk_format(), &SclkFormat::default());

        let primary = config.definition_by_type(2).unwrap();
        assert_eq!(primary.classification, Classification::Primary);
        let mission = primary.field("mission_id").unwrap();
        assert_eq!(mission.format, FieldFormat::UnsignedInteger);
        assert_eq!(mission.fixed_value, Some(0));
        assert_eq!(mission.bit_offset, 0);

        let property = config.property("is_frame").unwrap();
        let equalities = &property.conditions[0].equality_conditions;
        assert!(equalities[0].equality_value, "equal should default to true");
        assert!(!equalities[1].equality_value);
    }

    #[test]
    fn duplicate_chdo_type_is_config_error() {
        let doc = r#"{
            "version": "1",
            "control_authority_ids": ["NJPL"],
            "chdos": [
                {"type": 10, "name": "data", "classification": "data"},
                {"type": 10, "name": "other", "classification": "data"}
            ]
        }"#;
        let err = JsonDictionaryParser::parse_str(doc).unwrap_err();
        assert!(matches!(err, Error::Config(_)), "got {err:?}");
    }

    #[test]
    fn malformed_json_is_json_error() {
        let err = JsonDictionaryParser::parse_str("{\"version\": ").unwrap_err();
        assert!(matches!(err, Error::Json(_)), "got {err:?}");
    }

    #[test]
    fn parse_file() {
        let tmpdir = tempfile::tempdir().unwrap();
        let path = tmpdir.path().join("chdo.json");
        fs::write(&path, DICTIONARY).unwrap();

        let config = JsonDictionaryParser.parse(&path).unwrap();
        assert_eq!(config.version(), "2.1");
    }

    #[test]
    fn registry_resolves_builtin_and_custom() {
        fn custom() -> Box<dyn DictionaryParser> {
            Box::new(JsonDictionaryParser)
        }
        let mut registry = ParserRegistry::default();
        assert!(registry.resolve("json").is_ok());
        assert!(registry.resolve("mission").is_err());

        assert!(registry.register("mission", custom).is_none());
        assert!(registry.resolve("mission").is_ok());
    }

    #[test]
    fn cache_is_keyed_by_version() {
        let tmpdir = tempfile::tempdir().unwrap();
        let path = tmpdir.path().join("chdo.json");
        fs::write(&path, DICTIONARY).unwrap();

        let mut cache = DictionaryCache::default();
        let first = cache.load(&JsonDictionaryParser, &path).unwrap();
        let second = cache.load(&JsonDictionaryParser, &path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.version(), Some("2.1"));

        cache.insert(ChdoConfiguration::new("3.0"));
        assert_eq!(cache.version(), Some("3.0"));
        assert_eq!(cache.versions().len(), 2);
        assert!(cache.get("2.1").is_some());

        cache.clear();
        assert!(cache.current().is_none());
        assert!(cache.get("2.1").is_none());
        assert!(cache.version().is_none());
    }
}
