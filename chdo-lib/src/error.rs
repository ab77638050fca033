#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Not enough bytes")]
    NotEnoughData { actual: usize, minimum: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// The CHDO dictionary could not be loaded or failed validation.
    #[error("Invalid CHDO dictionary: {0}")]
    Config(String),

    #[error("Unknown CHDO type {0}")]
    UnknownChdo(u16),
    #[error("Unknown property {0}")]
    UnknownProperty(String),
    #[error("Unknown field {field} for CHDO type {chdo_type}")]
    UnknownField { chdo_type: u16, field: String },

    /// A representation that requires byte alignment was requested for a field with a
    /// non-zero bit offset.
    #[error("Field {field} has bit offset {bit_offset}; a byte aligned field is required")]
    MisalignedField { field: String, bit_offset: u8 },
    /// The field bit length is not supported for the requested representation.
    #[error("Field {field} has bit length {bit_length}, which is not supported as {repr}")]
    UnsupportedFieldWidth {
        field: String,
        bit_length: u32,
        repr: &'static str,
    },
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),
    /// An environment-wide decoding invariant does not hold.
    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    #[error("Field {field} contains non US-ASCII byte {byte:#04x}")]
    InvalidCharacter { field: String, byte: u8 },
    #[error("Invalid time: {0}")]
    InvalidTime(String),

    /// No SFDU label found within the scan limit.
    #[error("No SFDU label found in {scanned} bytes")]
    LabelNotFound { scanned: usize },
    /// Stream ended before a complete SFDU could be read.
    #[error("End of stream")]
    EndOfStream,
    #[error("Malformed SFDU: {0}")]
    MalformedSfdu(String),
}

pub type Result<T> = std::result::Result<T, Error>;
