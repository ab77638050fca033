//! Property evaluation.
//!
//! A [Property] is true if any of its [Condition]s hold. A condition holds if its CHDO
//! type is present in the SFDU and every one of its [EqualityCondition]s holds.
//!
//! Equality literals are parsed according to the field format:
//!
//! | format | literal |
//! |---|---|
//! | unsigned/signed integer | decimal, or hex with a `0x` prefix |
//! | floating point | decimal; 32 bit fields compare at single precision |
//! | string | compared verbatim |
//! | time, 40 bits | SCLK `<coarse>[-<fine>]` |
//! | time, 48 bits | SCLK, else a date as for 64 and 96 bits |
//! | time, 64 and 96 bits | RFC 3339 or `YYYY-DDDTHH:MM:SS[.fff]` date compared to the millisecond |
//! | binary | not comparable |
//!
//! A literal that cannot be parsed makes its equality false, whether or not it is
//! inverted.
use std::collections::BTreeMap;

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::{debug, trace};

use crate::dictionary::{
    ChdoConfiguration, Condition, EqualityCondition, FieldDefinition, FieldFormat, Property,
};
use crate::extract;
use crate::prelude::*;
use crate::sfdu::{Chdo, ChdoSfdu};
use crate::timecode::{self, Sclk, SclkFormat};

/// Parse an integer literal, decimal or `0x` prefixed hex, with an optional leading `-`.
fn parse_integer(literal: &str) -> Option<i128> {
    let s = literal.trim();
    let (negative, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let value = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) if !hex.is_empty() && hex.bytes().all(|b| b.is_ascii_hexdigit()) => {
            i128::from_str_radix(hex, 16).ok()?
        }
        Some(_) => return None,
        None if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => s.parse::<i128>().ok()?,
        None => return None,
    };
    Some(if negative { -value } else { value })
}

/// Compare the value of `field` in `chdo` with `literal`.
///
/// Returns `Ok(None)` if `literal` cannot be parsed for the field format.
///
/// # Errors
/// [Error::UnsupportedOperation] for binary fields, or any error extracting the value.
pub fn compare(
    chdo: &Chdo,
    field: &FieldDefinition,
    literal: &str,
    sclk: &SclkFormat,
) -> Result<Option<bool>> {
    let raw = chdo.bytes_without_header();
    match field.format {
        FieldFormat::UnsignedInteger => {
            let Some(expected) = parse_integer(literal) else {
                return Ok(None);
            };
            let actual = extract::as_unsigned_int(field, raw)?;
            Ok(Some(i128::from(actual) == expected))
        }
        FieldFormat::SignedInteger => {
            let Some(expected) = parse_integer(literal) else {
                return Ok(None);
            };
            let actual = extract::as_signed_int(field, raw)?;
            Ok(Some(i128::from(actual) == expected))
        }
        FieldFormat::FloatingPoint => {
            let Ok(expected) = literal.trim().parse::<f64>() else {
                return Ok(None);
            };
            let actual = extract::as_floating_point(field, raw)?;
            #[allow(clippy::float_cmp, clippy::cast_possible_truncation)]
            let equal = if field.bit_length == 32 {
                actual as f32 == expected as f32
            } else {
                actual == expected
            };
            Ok(Some(equal))
        }
        FieldFormat::String => Ok(Some(extract::as_string(field, raw)? == literal)),
        FieldFormat::Time => {
            // 40 bits is only ever SCLK, 48 bits may be either
            let sclk_literal = match field.bit_length {
                40 | 48 => literal.parse::<Sclk>().ok(),
                _ => None,
            };
            if let Some(expected) = sclk_literal {
                let actual = timecode::as_sclk(field, raw, sclk)?;
                return Ok(Some(actual == expected));
            }
            if field.bit_length == 40 {
                return Ok(None);
            }
            let Ok(expected) = timecode::parse_date(literal) else {
                return Ok(None);
            };
            let actual = chdo.date(&field.field_id)?;
            Ok(Some(actual.timestamp_millis() == expected.timestamp_millis()))
        }
        FieldFormat::Binary => Err(Error::UnsupportedOperation(format!(
            "binary field {} of CHDO type {} cannot be compared",
            field.field_id,
            chdo.chdo_type()
        ))),
    }
}

/// Evaluate one equality against `chdo`.
///
/// # Errors
/// [Error::UnknownField] if `chdo` has no such field, or see [compare].
pub fn evaluate_equality(chdo: &Chdo, equality: &EqualityCondition, sclk: &SclkFormat) -> Result<bool> {
    let field = chdo.field(&equality.name)?;
    match compare(chdo, field, &equality.value, sclk)? {
        Some(equal) => Ok(equal == equality.equality_value),
        None => {
            debug!(
                chdo_type = chdo.chdo_type(),
                field = %equality.name,
                literal = %equality.value,
                format = %field.format,
                "literal does not parse; equality is false"
            );
            Ok(false)
        }
    }
}

/// Evaluate a condition. A condition for a CHDO type absent from `sfdu` is false.
///
/// # Errors
/// See [evaluate_equality].
pub fn evaluate_condition(sfdu: &ChdoSfdu, condition: &Condition, sclk: &SclkFormat) -> Result<bool> {
    let Some(chdo) = sfdu.chdo_by_type(condition.chdo_type) else {
        trace!(chdo_type = condition.chdo_type, "CHDO type not present");
        return Ok(false);
    };
    for equality in &condition.equality_conditions {
        if !evaluate_equality(chdo, equality, sclk)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn evaluate(property: &Property, sfdu: &ChdoSfdu, sclk: &SclkFormat) -> Result<bool> {
    for condition in &property.conditions {
        if evaluate_condition(sfdu, condition, sclk)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Evaluate the property `name` against `sfdu`.
///
/// # Errors
/// [Error::UnknownProperty] if `config` has no such property, or see
/// [evaluate_condition].
pub fn evaluate_property(config: &ChdoConfiguration, name: &str, sfdu: &ChdoSfdu) -> Result<bool> {
    let property = config
        .property(name)
        .ok_or_else(|| Error::UnknownProperty(name.to_string()))?;
    evaluate(property, sfdu, config.sclk_format())
}

/// Evaluate each of `names` against `sfdu`.
///
/// # Errors
/// The first error evaluating any property.
pub fn evaluate_properties<S: AsRef<str>>(
    config: &ChdoConfiguration,
    names: &[S],
    sfdu: &ChdoSfdu,
) -> Result<BTreeMap<String, bool>> {
    names
        .iter()
        .map(|name| {
            let name = name.as_ref();
            Ok((name.to_string(), evaluate_property(config, name, sfdu)?))
        })
        .collect()
}

/// Evaluate the property `name` against every SFDU, in parallel when the `parallel`
/// feature is enabled. Results are in the same order as `sfdus`.
#[must_use]
pub fn classify_all(config: &ChdoConfiguration, name: &str, sfdus: &[ChdoSfdu]) -> Vec<Result<bool>> {
    #[cfg(feature = "parallel")]
    let iter = sfdus.par_iter();
    #[cfg(not(feature = "parallel"))]
    let iter = sfdus.iter();

    iter.map(|sfdu| evaluate_property(config, name, sfdu))
        .collect()
}
