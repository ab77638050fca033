#![allow(dead_code)]
use std::path::PathBuf;

use chdo::dictionary::{ChdoConfiguration, DictionaryParser, JsonDictionaryParser};

pub fn fixture_path(name: &str) -> PathBuf {
    let mut path =
        PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR not set"));
    path.push("tests/fixtures");
    path.push(name);
    path
}

pub fn dictionary() -> ChdoConfiguration {
    JsonDictionaryParser
        .parse(&fixture_path("dictionary.json"))
        .expect("fixture dictionary should load")
}

/// Prefix `body` with a version 1 `NJPL` label.
pub fn with_label(body: &[u8]) -> Vec<u8> {
    let mut dat = format!("NJPL1I00C123{:08}", body.len()).into_bytes();
    dat.extend(body);
    dat
}

/// Aggregation containing primary, secondary, and data CHDOs.
pub const FULL_BODY: &str = concat!(
    "0001002f",
    "00020004", "01020003",
    "0003001b", "00205f3f0036ee800005c50e123456789a4496000044533134ffff",
    "000a0004", "deadbeef",
);

/// Primary and data CHDOs.
pub const SHORT_BODY: &str = concat!(
    "00020004", "01020003",
    "000a0002", "cafe",
);

pub fn sfdu(body_hex: &str) -> Vec<u8> {
    with_label(&hex::decode(body_hex).expect("valid hex"))
}
