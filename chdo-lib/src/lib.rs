//! Decoding of DSN Standard Formatted Data Units (SFDUs) made of Compressed Header Data
//! Objects (CHDOs).
//!
//! Decoding is driven by a [dictionary::ChdoConfiguration] describing the layout of every
//! CHDO type, the control authority ids that start an SFDU label, and named properties
//! used to classify decoded SFDUs. The configuration is read-only once loaded and may be
//! shared by any number of [sfdu::ChdoSfdu] read sessions.
//!
//! # Example
//! ```
//! use chdo::dictionary::JsonDictionaryParser;
//! use chdo::sfdu::read_sfdus;
//!
//! let config = JsonDictionaryParser::parse_str(r#"{
//!     "version": "1.0",
//!     "control_authority_ids": ["NJPL"],
//!     "chdos": [
//!         {"type": 2, "name": "primary", "classification": "primary", "byte_size": 1,
//!          "fields": [{"id": "mode", "bit_length": 8, "format": "unsigned_integer"}]},
//!         {"type": 10, "name": "data", "classification": "data", "byte_size": 0}
//!     ],
//!     "properties": [
//!         {"name": "is_idle", "conditions": [
//!             {"chdo_type": 2, "equalities": [{"name": "mode", "value": "1"}]}
//!         ]}
//!     ]
//! }"#).unwrap();
//!
//! let mut dat = b"NJPL1I00C12300000010".to_vec();
//! dat.extend([0x00, 0x02, 0x00, 0x01, 0x01, 0x00, 0x0a, 0x00, 0x01, 0xff]);
//!
//! for sfdu in read_sfdus(&dat[..], &config) {
//!     let sfdu = sfdu.unwrap();
//!     assert!(sfdu.evaluate("is_idle").unwrap());
//!     assert_eq!(sfdu.data_chdo().unwrap().bytes_without_header(), &[0xff]);
//! }
//! ```
mod bytes;
mod error;
mod prelude;

pub mod condition;
pub mod dictionary;
pub mod extract;
pub mod sfdu;
pub mod timecode;

pub use condition::{classify_all, evaluate_properties, evaluate_property};
pub use error::{Error, Result};
pub use sfdu::{read_sfdus, Chdo, ChdoSfdu, SfduLabel};
