//! Time field decoding.
//!
//! CHDO time fields are either calendar dates, in one of three fixed encodings selected
//! by bit length, or a spacecraft clock (SCLK) value made of a coarse and fine count.
use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::dictionary::{FieldDefinition, FieldFormat};
use crate::extract::{require_aligned, require_format, slice, unsupported_width};
use crate::prelude::*;

/// Julian date of 1958-01-01, the reference day for 48 and 64 bit dates.
pub const JULIAN_DATE_1958: i64 = 2_436_204;
/// Julian date of 1970-01-01.
pub const JULIAN_DATE_1970: i64 = 2_440_587;
pub const MILLISECONDS_PER_DAY: i64 = 86_400_000;
/// Exclusive upper bound of the seconds of day of a 96 bit date; one day plus a leap
/// second.
pub const MAX_SECONDS_OF_DAY: f64 = 86_401.0;

/// Bit length of the only supported SCLK coarse component.
pub const SCLK_COARSE_BITS: u32 = 32;

/// SCLK layout shared by every time field decoded with [as_sclk].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SclkFormat {
    pub coarse_bits: u32,
}

impl Default for SclkFormat {
    fn default() -> Self {
        Self {
            coarse_bits: SCLK_COARSE_BITS,
        }
    }
}

/// Spacecraft clock value.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Sclk {
    pub coarse: u32,
    pub fine: u32,
}

impl Sclk {
    #[must_use]
    pub fn new(coarse: u32, fine: u32) -> Self {
        Self { coarse, fine }
    }
}

impl Display for Sclk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.coarse, self.fine)
    }
}

impl FromStr for Sclk {
    type Err = Error;

    /// Parse `<coarse>` or `<coarse>-<fine>`. A coarse only value has a fine of 0.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidTime(format!("invalid SCLK {s:?}"));
        let (coarse, fine) = match s.trim().split_once('-') {
            Some((coarse, fine)) => (coarse, Some(fine)),
            None => (s.trim(), None),
        };
        // u32::from_str accepts a leading '+'
        if !coarse.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let coarse = coarse.parse::<u32>().map_err(|_| invalid())?;
        let fine = match fine {
            Some(fine) if fine.bytes().all(|b| b.is_ascii_digit()) => {
                fine.parse::<u32>().map_err(|_| invalid())?
            }
            Some(_) => return Err(invalid()),
            None => 0,
        };
        Ok(Self { coarse, fine })
    }
}

/// Units of the 16 bit extended resolution value of a 64 bit date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtendedUnits {
    #[default]
    TenthsOfMicroseconds,
    Microseconds,
}

impl ExtendedUnits {
    fn nanoseconds(self, value: u16) -> i64 {
        match self {
            Self::TenthsOfMicroseconds => i64::from(value) * 100,
            Self::Microseconds => i64::from(value) * 1_000,
        }
    }
}

fn be_u16(b: &[u8]) -> u16 {
    u16::from_be_bytes([b[0], b[1]])
}

fn be_u32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

/// Milliseconds since 1970 for a day count referenced to 1958 and a millisecond of day.
///
/// Negative results, i.e., days before 1970, are clamped to 0.
#[must_use]
pub fn days_since_1958_to_unix_millis(days: u16, millis_of_day: u32) -> i64 {
    let millis = (i64::from(days) - (JULIAN_DATE_1970 - JULIAN_DATE_1958)) * MILLISECONDS_PER_DAY
        + i64::from(millis_of_day);
    millis.max(0)
}

/// Decode a date field.
///
/// Supported encodings:
/// * 48 bits: u16 days since 1958 followed by u32 milliseconds of day
/// * 64 bits: as 48 bits followed by a u16 extended resolution value, which is only
///   applied when `extended` is provided
/// * 96 bits: u16 year, u16 day of year (1 is Jan 1), and f64 seconds of day in
///   `[0, 86401)`, which is rounded to the nearest second
///
/// # Errors
/// [Error::UnsupportedOperation] if not a time field, [Error::MisalignedField],
/// [Error::UnsupportedFieldWidth], [Error::NotEnoughData], or [Error::InvalidTime] if a
/// 96 bit date has an invalid day of year or seconds of day outside `[0, 86401)`.
pub fn as_date(
    field: &FieldDefinition,
    raw: &[u8],
    extended: Option<ExtendedUnits>,
) -> Result<DateTime<Utc>> {
    require_format(field, FieldFormat::Time, "date")?;
    require_aligned(field)?;
    let offset = field.byte_offset as usize;
    match field.bit_length {
        48 => {
            let b = slice(raw, offset, 6)?;
            let millis = days_since_1958_to_unix_millis(be_u16(&b[0..2]), be_u32(&b[2..6]));
            Ok(DateTime::<Utc>::UNIX_EPOCH + Duration::milliseconds(millis))
        }
        64 => {
            let b = slice(raw, offset, 8)?;
            let millis = days_since_1958_to_unix_millis(be_u16(&b[0..2]), be_u32(&b[2..6]));
            if millis == 0 {
                // clamped, or exactly the epoch; sub-millis only apply past it
                return Ok(DateTime::<Utc>::UNIX_EPOCH);
            }
            let nanos = extended.map_or(0, |units| units.nanoseconds(be_u16(&b[6..8])));
            Ok(DateTime::<Utc>::UNIX_EPOCH
                + Duration::milliseconds(millis)
                + Duration::nanoseconds(nanos))
        }
        96 => {
            let b = slice(raw, offset, 12)?;
            let year = be_u16(&b[0..2]);
            let day_of_year = be_u16(&b[2..4]);
            let seconds = f64::from_be_bytes([b[4], b[5], b[6], b[7], b[8], b[9], b[10], b[11]]);
            year_day_seconds(year, day_of_year, seconds)
        }
        _ => Err(unsupported_width(field, "date")),
    }
}

fn year_day_seconds(year: u16, day_of_year: u16, seconds: f64) -> Result<DateTime<Utc>> {
    let date = NaiveDate::from_yo_opt(i32::from(year), u32::from(day_of_year)).ok_or_else(|| {
        Error::InvalidTime(format!("invalid year {year} and day of year {day_of_year}"))
    })?;
    if !seconds.is_finite() || !(0.0..MAX_SECONDS_OF_DAY).contains(&seconds) {
        return Err(Error::InvalidTime(format!("invalid seconds of day {seconds}")));
    }
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| Error::InvalidTime(format!("invalid date {date}")))?;
    // bounded above, so the cast cannot saturate
    let offset = Duration::try_seconds(seconds.round() as i64)
        .ok_or_else(|| Error::InvalidTime(format!("invalid seconds of day {seconds}")))?;
    Utc.from_utc_datetime(&midnight)
        .checked_add_signed(offset)
        .ok_or_else(|| Error::InvalidTime(format!("{date} plus {seconds}s is out of range")))
}

/// Decode a spacecraft clock field: a 32 bit coarse count followed by an 8 or 16 bit
/// fine count.
///
/// # Errors
/// [Error::UnsupportedConfiguration] if `format` does not use a 32 bit coarse count,
/// [Error::UnsupportedOperation] if not a time field, [Error::MisalignedField],
/// [Error::UnsupportedFieldWidth] if not 40 or 48 bits, or [Error::NotEnoughData].
pub fn as_sclk(field: &FieldDefinition, raw: &[u8], format: &SclkFormat) -> Result<Sclk> {
    if format.coarse_bits != SCLK_COARSE_BITS {
        return Err(Error::UnsupportedConfiguration(format!(
            "SCLK coarse length must be {SCLK_COARSE_BITS} bits; got {}",
            format.coarse_bits
        )));
    }
    require_format(field, FieldFormat::Time, "SCLK")?;
    require_aligned(field)?;
    let offset = field.byte_offset as usize;
    match field.bit_length {
        40 => {
            let b = slice(raw, offset, 5)?;
            Ok(Sclk::new(be_u32(&b[0..4]), u32::from(b[4])))
        }
        48 => {
            let b = slice(raw, offset, 6)?;
            Ok(Sclk::new(be_u32(&b[0..4]), u32::from(be_u16(&b[4..6]))))
        }
        _ => Err(unsupported_width(field, "SCLK")),
    }
}

/// Parse a date literal, either RFC 3339 or day of year form `YYYY-DDDTHH:MM:SS[.fff]`
/// taken as UTC.
///
/// # Errors
/// [Error::InvalidTime] if neither form matches.
pub fn parse_date(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let doy = s.strip_suffix('Z').unwrap_or(s);
    NaiveDateTime::parse_from_str(doy, "%Y-%jT%H:%M:%S%.f")
        .map(|dt| Utc.from_utc_datetime(&dt))
        .map_err(|_| Error::InvalidTime(format!("invalid date {s:?}")))
}
