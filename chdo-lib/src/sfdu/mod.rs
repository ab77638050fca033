//! SFDU reading.
//!
//! An SFDU is a fixed size [SfduLabel] followed by a body of `label.length` bytes that
//! is a chain of CHDOs, each a 4 byte type/length [ChdoHeader] followed by its payload.
//! The last CHDO in the chain is the data CHDO.
//!
//! ```text
//! | label (20) | type | len | payload ... | type | len | payload ... |
//! ```
mod chdo;
mod label;
mod scanner;

use std::io::Read;

use tracing::{debug, trace, warn};

use crate::dictionary::{ChdoConfiguration, ChdoType, Classification};
use crate::prelude::*;

pub use chdo::{Chdo, ChdoHeader, FieldValue, EXTENDED_RESOLUTION_SUFFIX, EXTENDED_UNITS_SUFFIX};
pub use label::{SfduId, SfduLabel, ASCII_LENGTH_VERSION};
pub use scanner::SfduStream;

/// Maximum size of an SFDU, label included. Also the maximum number of bytes skipped
/// while scanning for a label.
pub const MAX_SFDU_SIZE: usize = 131_096;

/// Name of the field holding the spacecraft id.
pub const SPACECRAFT_ID_FIELD: &str = "scft_id";

/// Progress of a [ChdoSfdu] read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    /// Nothing read, or cleared after an error.
    Seeking,
    LabelRead,
    ChdoChain,
    /// Label and full CHDO chain read.
    Complete,
    /// Only the label was read; the body remains in the stream.
    HeaderOnly,
}

/// A single SFDU read session.
///
/// A session borrows its CHDO definitions from the [ChdoConfiguration] it was created
/// with, so any number of sessions may share one configuration. A session itself is
/// meant to be used by one consumer at a time.
///
/// # Example
/// ```
/// use chdo::dictionary::{ChdoConfiguration, ChdoDefinition, Classification};
/// use chdo::sfdu::ChdoSfdu;
///
/// let config = ChdoConfiguration::new("1")
///     .with_control_authority("NJPL")
///     .with_definition(ChdoDefinition::new(10, "data", Classification::Data, 0));
///
/// let mut dat = b"NJPL1I00C12300000006".to_vec();
/// dat.extend([0x00, 0x0a, 0x00, 0x02, 0xca, 0xfe]);
///
/// let mut sfdu = ChdoSfdu::new(&config);
/// sfdu.decode(&dat).unwrap();
/// assert_eq!(sfdu.chdos().len(), 1);
/// assert_eq!(sfdu.data_chdo().unwrap().bytes_without_header(), &[0xca, 0xfe]);
/// ```
#[derive(Debug, Clone)]
pub struct ChdoSfdu<'a> {
    config: &'a ChdoConfiguration,
    state: ReadState,
    label: Option<SfduLabel>,
    chdos: Vec<Chdo<'a>>,
}

impl<'a> ChdoSfdu<'a> {
    #[must_use]
    pub fn new(config: &'a ChdoConfiguration) -> Self {
        ChdoSfdu {
            config,
            state: ReadState::Seeking,
            label: None,
            chdos: Vec::default(),
        }
    }

    /// Forget the label and all CHDOs.
    pub fn clear(&mut self) {
        self.state = ReadState::Seeking;
        self.label = None;
        self.chdos.clear();
    }

    #[must_use]
    pub fn config(&self) -> &'a ChdoConfiguration {
        self.config
    }

    #[must_use]
    pub fn state(&self) -> ReadState {
        self.state
    }

    #[must_use]
    pub fn label(&self) -> Option<&SfduLabel> {
        self.label.as_ref()
    }

    /// CHDOs in the order read.
    #[must_use]
    pub fn chdos(&self) -> &[Chdo<'a>] {
        &self.chdos
    }

    /// The last CHDO in the chain.
    #[must_use]
    pub fn data_chdo(&self) -> Option<&Chdo<'a>> {
        self.chdos.last()
    }

    /// The first CHDO of type `chdo_type`.
    #[must_use]
    pub fn chdo_by_type(&self, chdo_type: ChdoType) -> Option<&Chdo<'a>> {
        self.chdos.iter().find(|c| c.chdo_type() == chdo_type)
    }

    /// The first CHDO with `classification`.
    #[must_use]
    pub fn chdo_by_classification(&self, classification: Classification) -> Option<&Chdo<'a>> {
        self.chdos
            .iter()
            .find(|c| c.definition().classification == classification)
    }

    /// The first CHDO defining a field named `name`.
    #[must_use]
    pub fn find_field(&self, name: &str) -> Option<&Chdo<'a>> {
        self.chdos.iter().find(|c| c.has_field(name))
    }

    /// Boolean value of the first field named `name` in any CHDO. A missing field is
    /// logged and read as `false`.
    ///
    /// # Errors
    /// Any error extracting the value.
    pub fn boolean(&self, name: &str) -> Result<bool> {
        match self.find_field(name) {
            Some(chdo) => chdo.boolean(name),
            None => {
                warn!(field = name, "boolean field not found in any CHDO; using false");
                Ok(false)
            }
        }
    }

    /// Value of the spacecraft id field, if any CHDO has one.
    ///
    /// # Errors
    /// Any error extracting the value.
    pub fn spacecraft_id(&self) -> Result<Option<u32>> {
        self.find_field(SPACECRAFT_ID_FIELD)
            .map(|chdo| chdo.unsigned_int(SPACECRAFT_ID_FIELD))
            .transpose()
    }

    /// Evaluate the named property against this SFDU.
    ///
    /// # Errors
    /// See [crate::condition::evaluate_property].
    pub fn evaluate(&self, property: &str) -> Result<bool> {
        crate::condition::evaluate_property(self.config, property, self)
    }

    /// Read the next SFDU from `stream`, replacing the current contents.
    ///
    /// The full body declared by the label is consumed before the CHDO chain is
    /// decoded, so after a [Error::UnknownChdo] or [Error::MalformedSfdu] the stream is
    /// positioned at the start of the following SFDU. On any error this session is
    /// cleared.
    ///
    /// # Errors
    /// [Error::LabelNotFound], [Error::EndOfStream], [Error::UnknownChdo],
    /// [Error::MalformedSfdu], or [Error::Io].
    pub fn read_sfdu<R: Read>(&mut self, stream: &mut SfduStream<R>) -> Result<()> {
        self.clear();
        let result = self.read_sfdu_inner(stream);
        if let Err(err) = &result {
            debug!(offset = stream.offset(), "SFDU read failed: {err}");
            self.clear();
        }
        result
    }

    fn read_sfdu_inner<R: Read>(&mut self, stream: &mut SfduStream<R>) -> Result<()> {
        let label = read_label(self.config, stream)?;
        // validated against MAX_SFDU_SIZE
        let length = usize::try_from(label.length)
            .map_err(|_| Error::MalformedSfdu(format!("invalid length {}", label.length)))?;
        self.label = Some(label);
        self.state = ReadState::LabelRead;

        let body = stream.read_exact(length)?;
        self.state = ReadState::ChdoChain;
        self.chdos = walk_chain(self.config, &body)?;
        self.state = ReadState::Complete;
        Ok(())
    }

    /// Read only the label of the next SFDU, leaving its body in the stream.
    ///
    /// # Errors
    /// [Error::LabelNotFound], [Error::EndOfStream], [Error::MalformedSfdu], or
    /// [Error::Io].
    pub fn load_header_only<R: Read>(&mut self, stream: &mut SfduStream<R>) -> Result<&SfduLabel> {
        self.clear();
        match read_label(self.config, stream) {
            Ok(label) => {
                self.state = ReadState::HeaderOnly;
                Ok(&*self.label.insert(label))
            }
            Err(err) => {
                self.clear();
                Err(err)
            }
        }
    }

    /// Read a single SFDU from `buf`. See [ChdoSfdu::read_sfdu].
    ///
    /// # Errors
    /// See [ChdoSfdu::read_sfdu].
    pub fn decode(&mut self, buf: &[u8]) -> Result<()> {
        let mut stream = SfduStream::new(buf);
        self.read_sfdu(&mut stream)
    }
}

fn read_label<R: Read>(config: &ChdoConfiguration, stream: &mut SfduStream<R>) -> Result<SfduLabel> {
    let label = stream.scan_label(config)?;
    let max_body = (MAX_SFDU_SIZE - SfduLabel::LEN) as u64;
    if label.length > max_body {
        return Err(Error::MalformedSfdu(format!(
            "declared length {} exceeds the maximum {max_body}",
            label.length
        )));
    }
    Ok(label)
}

/// Decode the chain of CHDOs making up an SFDU body.
///
/// An aggregation CHDO contains every CHDO that follows it, so it is recorded with only
/// its header and its declared length must match the rest of the body.
///
/// # Errors
/// [Error::UnknownChdo] for a type not in `config`, or [Error::MalformedSfdu] if the
/// declared lengths are not consistent with `body`.
pub fn walk_chain<'a>(config: &'a ChdoConfiguration, body: &[u8]) -> Result<Vec<Chdo<'a>>> {
    let mut chdos = Vec::default();
    let mut offset = 0usize;
    while offset < body.len() {
        let remaining = body.len() - offset;
        let Some(header) = ChdoHeader::decode(&body[offset..]) else {
            return Err(Error::MalformedSfdu(format!(
                "{remaining} bytes left at offset {offset}; not enough for a CHDO header"
            )));
        };
        let definition = config.require_definition(header.chdo_type)?;
        let length = usize::from(header.length);
        trace!(chdo_type = header.chdo_type, length, offset, "CHDO");

        if definition.classification == Classification::Aggregation {
            if length != remaining - ChdoHeader::LEN {
                return Err(Error::MalformedSfdu(format!(
                    "aggregation CHDO {} has length {length} but contains {} bytes",
                    header.chdo_type,
                    remaining - ChdoHeader::LEN
                )));
            }
            let end = offset + ChdoHeader::LEN;
            chdos.push(Chdo::new(definition, body[offset..end].to_vec())?);
            offset = end;
            continue;
        }

        let end = offset + ChdoHeader::LEN + length;
        if end > body.len() {
            return Err(Error::MalformedSfdu(format!(
                "CHDO {} at offset {offset} has length {length}, overshooting the SFDU by {} bytes",
                header.chdo_type,
                end - body.len()
            )));
        }
        if length < definition.byte_size as usize {
            return Err(Error::MalformedSfdu(format!(
                "CHDO {} has length {length}, less than its size {}",
                header.chdo_type, definition.byte_size
            )));
        }
        chdos.push(Chdo::new(definition, body[offset..end].to_vec())?);
        offset = end;
    }
    Ok(chdos)
}

/// Iterator over the SFDUs in a stream. See [read_sfdus].
pub struct SfduIter<'a, R>
where
    R: Read,
{
    stream: SfduStream<R>,
    config: &'a ChdoConfiguration,
    done: bool,
}

impl<'a, R> Iterator for SfduIter<'a, R>
where
    R: Read,
{
    type Item = Result<ChdoSfdu<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut sfdu = ChdoSfdu::new(self.config);
        match sfdu.read_sfdu(&mut self.stream) {
            Ok(()) => Some(Ok(sfdu)),
            Err(Error::EndOfStream) => {
                self.done = true;
                None
            }
            Err(err @ Error::Io(_)) => {
                self.done = true;
                Some(Err(err))
            }
            // Stream is positioned after the bad SFDU, so iteration can continue
            Err(err) => Some(Err(err)),
        }
    }
}

/// Read every SFDU from `reader`.
///
/// Each item is an independent [ChdoSfdu]. Structurally invalid SFDUs are produced as
/// errors and reading resumes with the following SFDU. Iteration stops at the end of the
/// stream, including a stream ending within an SFDU.
///
/// # Example
/// ```
/// use chdo::dictionary::{ChdoConfiguration, ChdoDefinition, Classification};
/// use chdo::sfdu::read_sfdus;
///
/// let config = ChdoConfiguration::new("1")
///     .with_control_authority("NJPL")
///     .with_definition(ChdoDefinition::new(10, "data", Classification::Data, 0));
///
/// let mut dat = Vec::new();
/// for _ in 0..3 {
///     dat.extend(b"NJPL1I00C12300000005");
///     dat.extend([0x00, 0x0a, 0x00, 0x01, 0xff]);
/// }
///
/// let sfdus: Vec<_> = read_sfdus(&dat[..], &config).collect();
/// assert_eq!(sfdus.len(), 3);
/// ```
pub fn read_sfdus<R: Read>(reader: R, config: &ChdoConfiguration) -> SfduIter<'_, R> {
    SfduIter {
        stream: SfduStream::new(reader),
        config,
        done: false,
    }
}
