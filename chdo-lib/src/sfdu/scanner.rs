use std::io::{ErrorKind, Read};

use tracing::trace;

use super::label::SfduLabel;
use super::MAX_SFDU_SIZE;
use crate::bytes::Bytes;
use crate::dictionary::{ChdoConfiguration, CONTROL_AUTHORITY_ID_LEN};
use crate::prelude::*;

/// Byte stream positioned between SFDUs.
///
/// Scans forward for a label starting with a known control authority id, skipping any
/// bytes that cannot start a label.
pub struct SfduStream<R>
where
    R: Read,
{
    bytes: Bytes<R>,
}

impl<R> SfduStream<R>
where
    R: Read,
{
    pub fn new(reader: R) -> Self {
        SfduStream {
            bytes: Bytes::new(reader),
        }
    }

    /// Number of bytes consumed from the underlying reader.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.bytes.offset()
    }

    fn next_byte(&mut self) -> Result<u8> {
        self.bytes.next().map_err(|err| {
            if err.kind() == ErrorKind::UnexpectedEof {
                Error::EndOfStream
            } else {
                Error::Io(err)
            }
        })
    }

    /// Scan until a label starting with one of `config`'s control authority ids is found
    /// and read it. At most [MAX_SFDU_SIZE] bytes are skipped.
    ///
    /// # Errors
    /// [Error::LabelNotFound] if no label starts within the scan limit,
    /// [Error::EndOfStream] if the stream ends first, or [Error::Config] if `config` has
    /// no control authority ids.
    pub fn scan_label(&mut self, config: &ChdoConfiguration) -> Result<SfduLabel> {
        let caids: Vec<&[u8]> = config
            .control_authority_ids()
            .iter()
            .map(String::as_bytes)
            .filter(|id| id.len() == CONTROL_AUTHORITY_ID_LEN)
            .collect();
        if caids.is_empty() {
            return Err(Error::Config("no control authority ids".to_string()));
        }

        let mut working: Vec<u8> = Vec::with_capacity(CONTROL_AUTHORITY_ID_LEN);
        let mut skipped = 0usize;
        loop {
            working.push(self.next_byte()?);
            if !caids.iter().any(|id| id.starts_with(&working)) {
                // Nothing starts at the first byte, but the rest may start a label
                self.bytes.push(&working[1..]);
                working.clear();
                skipped += 1;
                if skipped >= MAX_SFDU_SIZE {
                    return Err(Error::LabelNotFound { scanned: skipped });
                }
                continue;
            }
            if working.len() == CONTROL_AUTHORITY_ID_LEN {
                break;
            }
        }

        let mut buf = [0u8; SfduLabel::LEN];
        buf[..CONTROL_AUTHORITY_ID_LEN].copy_from_slice(&working);
        if !self.bytes.fill(&mut buf[CONTROL_AUTHORITY_ID_LEN..])? {
            return Err(Error::EndOfStream);
        }
        let label = SfduLabel::decode(&buf)?;
        trace!(
            offset = self.offset() - SfduLabel::LEN,
            skipped,
            length = label.length,
            "found SFDU label"
        );
        Ok(label)
    }

    /// Read exactly `len` bytes.
    ///
    /// # Errors
    /// [Error::EndOfStream] if the stream ends first.
    pub fn read_exact(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        if !self.bytes.fill(&mut buf)? {
            return Err(Error::EndOfStream);
        }
        Ok(buf)
    }
}
