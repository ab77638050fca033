use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::dictionary::CONTROL_AUTHORITY_ID_LEN;
use crate::prelude::*;

/// Label version whose length field is ASCII decimal digits.
pub const ASCII_LENGTH_VERSION: u8 = b'1';

/// Identifying part of an SFDU label.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct SfduId {
    /// Control authority id, e.g., `NJPL`.
    pub control_authority_id: String,
    pub version: char,
    pub class: char,
    /// Data description id, e.g., `C123`.
    pub data_description_id: String,
}

impl Display for SfduId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}{}{}",
            self.control_authority_id, self.version, self.class, self.data_description_id
        )
    }
}

/// Fixed size label at the start of every SFDU.
///
/// | bytes | content |
/// |---|---|
/// | 0..4 | control authority id |
/// | 4 | version |
/// | 5 | class |
/// | 6..8 | spare |
/// | 8..12 | data description id |
/// | 12..20 | body length; ASCII decimal for version `1`, else big-endian u64 |
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SfduLabel {
    pub id: SfduId,
    pub spare: [u8; 2],
    /// Number of bytes following the label.
    pub length: u64,
}

fn ascii(field: &str, buf: &[u8]) -> Result<String> {
    if let Some(b) = buf.iter().find(|b| !b.is_ascii()) {
        return Err(Error::InvalidCharacter {
            field: field.to_string(),
            byte: *b,
        });
    }
    Ok(buf.iter().map(|b| char::from(*b)).collect())
}

impl SfduLabel {
    /// Size of a label
    pub const LEN: usize = 20;

    /// Decode a label from the first [Self::LEN] bytes of `buf`.
    ///
    /// # Errors
    /// [Error::NotEnoughData] if `buf` is too short, [Error::InvalidCharacter] if an ASCII
    /// field contains other bytes, or [Error::MalformedSfdu] if an ASCII length is not
    /// decimal digits.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::LEN {
            return Err(Error::NotEnoughData {
                actual: buf.len(),
                minimum: Self::LEN,
            });
        }
        let id = SfduId {
            control_authority_id: ascii("control_authority_id", &buf[..CONTROL_AUTHORITY_ID_LEN])?,
            version: char::from(buf[4]),
            class: char::from(buf[5]),
            data_description_id: ascii("data_description_id", &buf[8..12])?,
        };
        let length = if buf[4] == ASCII_LENGTH_VERSION {
            let digits = &buf[12..20];
            if !digits.iter().all(u8::is_ascii_digit) {
                return Err(Error::MalformedSfdu(format!(
                    "label length is not decimal digits: {digits:02x?}"
                )));
            }
            digits
                .iter()
                .fold(0u64, |acc, d| acc * 10 + u64::from(d - b'0'))
        } else {
            u64::from_be_bytes([
                buf[12], buf[13], buf[14], buf[15], buf[16], buf[17], buf[18], buf[19],
            ])
        };

        Ok(SfduLabel {
            id,
            spare: [buf[6], buf[7]],
            length,
        })
    }

    /// Encode this label.
    ///
    /// # Errors
    /// [Error::MalformedSfdu] if an id field is not its fixed size, or if a version `1`
    /// length does not fit 8 decimal digits.
    pub fn encode(&self) -> Result<[u8; Self::LEN]> {
        let caid = self.id.control_authority_id.as_bytes();
        let ddid = self.id.data_description_id.as_bytes();
        if caid.len() != CONTROL_AUTHORITY_ID_LEN || ddid.len() != 4 {
            return Err(Error::MalformedSfdu(format!(
                "label ids must be 4 bytes: {}",
                self.id
            )));
        }
        if !self.id.version.is_ascii() || !self.id.class.is_ascii() {
            return Err(Error::MalformedSfdu(format!(
                "label version and class must be ASCII: {}",
                self.id
            )));
        }

        let mut buf = [0u8; Self::LEN];
        buf[..4].copy_from_slice(caid);
        // checked ASCII above
        buf[4] = self.id.version as u8;
        buf[5] = self.id.class as u8;
        buf[6..8].copy_from_slice(&self.spare);
        buf[8..12].copy_from_slice(ddid);
        if buf[4] == ASCII_LENGTH_VERSION {
            let digits = format!("{:08}", self.length);
            if digits.len() != 8 {
                return Err(Error::MalformedSfdu(format!(
                    "label length {} does not fit 8 digits",
                    self.length
                )));
            }
            buf[12..].copy_from_slice(digits.as_bytes());
        } else {
            buf[12..].copy_from_slice(&self.length.to_be_bytes());
        }
        Ok(buf)
    }
}

impl Display for SfduLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SfduLabel{{id: {}, length: {}}}", self.id, self.length)
    }
}
