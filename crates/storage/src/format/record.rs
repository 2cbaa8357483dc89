//! Log file header and record framing.
//!
//! A store's data file is a header followed by an append-only run of
//! self-delimiting records.
//!
//! # File Layout
//!
//! ```text
//! ┌────────────────────────────────────┐
//! │ File Header (16 bytes)             │
//! ├────────────────────────────────────┤
//! │ Record 1                           │
//! ├────────────────────────────────────┤
//! │ Record 2                           │
//! ├────────────────────────────────────┤
//! │ ...                                │
//! ├────────────────────────────────────┤
//! │ Zero fill up to the page boundary  │
//! └────────────────────────────────────┘
//! ```
//!
//! # Record Layout
//!
//! ```text
//! ┌─────────────────┬────────────────┬────────────────────┬──────────┐
//! │ Length (4 bytes)│ Format Ver (1) │ Payload (variable) │ CRC32 (4)│
//! └─────────────────┴────────────────┴────────────────────┴──────────┘
//!
//! Payload:
//! ┌────────┬──────────────┬───────────┬──────────────────────────────┐
//! │ Op (1) │ Key len (2)  │ Key bytes │ Put only: tag (1) + payload  │
//! └────────┴──────────────┴───────────┴──────────────────────────────┘
//! ```
//!
//! The length field counts everything after itself (version + payload +
//! CRC); the CRC covers version + payload. All integers are little-endian.

use crc32fast::Hasher;
use satchel_core::{TypeTag, Value};

use super::codec;

/// Magic bytes identifying a satchel data file: "SCHL"
pub const FILE_MAGIC: [u8; 4] = *b"SCHL";

/// Current file format version
pub const FILE_FORMAT_VERSION: u32 = 1;

/// Size of the file header in bytes
pub const FILE_HEADER_SIZE: usize = 16;

/// Current record format version
pub const RECORD_FORMAT_VERSION: u8 = 1;

/// Record op byte: entry written or replaced
const OP_PUT: u8 = 1;

/// Record op byte: entry removed
const OP_DELETE: u8 = 2;

/// Data file header (16 bytes).
///
/// Written once at file creation; validated on every open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// Magic bytes: "SCHL"
    pub magic: [u8; 4],

    /// Format version for forward compatibility
    pub format_version: u32,
}

impl FileHeader {
    /// Create a header for a fresh file.
    pub fn new() -> Self {
        FileHeader {
            magic: FILE_MAGIC,
            format_version: FILE_FORMAT_VERSION,
        }
    }

    /// Serialize header to bytes. The trailing 8 bytes are reserved and
    /// written as zero.
    pub fn to_bytes(&self) -> [u8; FILE_HEADER_SIZE] {
        let mut bytes = [0u8; FILE_HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4..8].copy_from_slice(&self.format_version.to_le_bytes());
        bytes
    }

    /// Deserialize header from bytes.
    pub fn from_bytes(bytes: &[u8; FILE_HEADER_SIZE]) -> Self {
        FileHeader {
            magic: bytes[0..4].try_into().unwrap(),
            format_version: u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
        }
    }

    /// Validate the header has correct magic bytes.
    pub fn is_valid(&self) -> bool {
        self.magic == FILE_MAGIC
    }
}

impl Default for FileHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// One logical mutation in the log.
///
/// Records are immutable once written. Replaying them in file order
/// reconstructs the live map (last record per key wins).
#[derive(Debug, Clone, PartialEq)]
pub enum LogRecord {
    /// Entry written or replaced
    Put {
        /// Entry key
        key: String,
        /// Entry value
        value: Value,
    },
    /// Entry removed
    Delete {
        /// Entry key
        key: String,
    },
}

impl LogRecord {
    /// Serialize the record into its framed byte form.
    pub fn to_bytes(&self) -> Result<Vec<u8>, RecordError> {
        match self {
            LogRecord::Put { key, value } => encode_put(key, value),
            LogRecord::Delete { key } => encode_delete(key),
        }
    }

    /// Deserialize one record from the front of `bytes`.
    ///
    /// Returns (record, bytes_consumed) on success. `InsufficientData`
    /// means `bytes` ends before the record does (a torn tail when the
    /// input is the end of a file).
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize), RecordError> {
        if bytes.len() < 4 {
            return Err(RecordError::InsufficientData);
        }

        let length = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;

        if length == 0 {
            return Err(RecordError::InvalidFormat);
        }

        if bytes.len() < 4 + length {
            return Err(RecordError::InsufficientData);
        }

        // Minimum: 1 byte format version + 4 bytes CRC
        if length < 5 {
            return Err(RecordError::InvalidFormat);
        }

        let framed = &bytes[4..4 + length];
        let payload = &framed[..length - 4];
        let stored_crc = u32::from_le_bytes(framed[length - 4..].try_into().unwrap());

        let computed_crc = compute_crc(payload);
        if computed_crc != stored_crc {
            return Err(RecordError::ChecksumMismatch {
                expected: stored_crc,
                computed: computed_crc,
            });
        }

        let record = Self::parse_payload(payload)?;
        Ok((record, 4 + length))
    }

    /// Parse a CRC-validated payload (version byte included).
    fn parse_payload(payload: &[u8]) -> Result<Self, RecordError> {
        // version (1) + op (1) + key length (2)
        if payload.len() < 4 {
            return Err(RecordError::InvalidFormat);
        }

        let format_version = payload[0];
        if format_version != RECORD_FORMAT_VERSION {
            return Err(RecordError::UnsupportedVersion(format_version));
        }

        let op = payload[1];
        let key_len = u16::from_le_bytes(payload[2..4].try_into().unwrap()) as usize;

        if payload.len() < 4 + key_len {
            return Err(RecordError::InvalidFormat);
        }

        let key = std::str::from_utf8(&payload[4..4 + key_len])
            .map_err(|_| RecordError::InvalidFormat)?
            .to_string();
        let rest = &payload[4 + key_len..];

        match op {
            OP_PUT => {
                let (&tag_byte, value_payload) =
                    rest.split_first().ok_or(RecordError::InvalidFormat)?;
                let tag = TypeTag::from_u8(tag_byte).ok_or(RecordError::InvalidFormat)?;
                let value = codec::decode_value(tag, value_payload)?;
                Ok(LogRecord::Put { key, value })
            }
            OP_DELETE => {
                if !rest.is_empty() {
                    return Err(RecordError::InvalidFormat);
                }
                Ok(LogRecord::Delete { key })
            }
            _ => Err(RecordError::InvalidFormat),
        }
    }
}

/// Serialize a put record without building a [`LogRecord`] first.
///
/// The write path borrows its key and value; only the index keeps owned
/// copies.
pub fn encode_put(key: &str, value: &Value) -> Result<Vec<u8>, RecordError> {
    let mut payload = Vec::with_capacity(5 + key.len());
    payload.push(RECORD_FORMAT_VERSION);
    payload.push(OP_PUT);
    encode_key(key, &mut payload)?;
    payload.push(value.type_tag().as_u8());
    codec::encode_value(value, &mut payload)?;
    frame(payload)
}

/// Serialize a delete record.
pub fn encode_delete(key: &str) -> Result<Vec<u8>, RecordError> {
    let mut payload = Vec::with_capacity(4 + key.len());
    payload.push(RECORD_FORMAT_VERSION);
    payload.push(OP_DELETE);
    encode_key(key, &mut payload)?;
    frame(payload)
}

fn encode_key(key: &str, payload: &mut Vec<u8>) -> Result<(), RecordError> {
    let len = u16::try_from(key.len()).map_err(|_| RecordError::TooLarge(key.len()))?;
    payload.extend_from_slice(&len.to_le_bytes());
    payload.extend_from_slice(key.as_bytes());
    Ok(())
}

/// Wrap a payload in length + CRC framing.
fn frame(payload: Vec<u8>) -> Result<Vec<u8>, RecordError> {
    let crc = compute_crc(&payload);
    let total_len = frame_length(payload.len())?;
    let mut record = Vec::with_capacity(payload.len() + 8);
    record.extend_from_slice(&total_len.to_le_bytes());
    record.extend_from_slice(&payload);
    record.extend_from_slice(&crc.to_le_bytes());
    Ok(record)
}

/// Length-field value for a payload of `payload_len` bytes.
///
/// Refuses anything the u32 field cannot carry; a wrapped length would
/// mis-frame the record, and a length that wraps to exactly zero reads
/// back as end-of-data.
fn frame_length(payload_len: usize) -> Result<u32, RecordError> {
    payload_len
        .checked_add(4)
        .and_then(|total| u32::try_from(total).ok())
        .ok_or(RecordError::TooLarge(payload_len))
}

/// Compute CRC32 checksum of data.
fn compute_crc(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Record parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    /// Not enough data to parse the record
    #[error("insufficient data to parse record")]
    InsufficientData,

    /// Record structure is invalid
    #[error("invalid record format")]
    InvalidFormat,

    /// Checksum verification failed
    #[error("checksum mismatch: expected {expected:08x}, computed {computed:08x}")]
    ChecksumMismatch {
        /// Checksum stored in the record
        expected: u32,
        /// Checksum computed from the payload
        computed: u32,
    },

    /// Unsupported record format version
    #[error("unsupported record format version: {0}")]
    UnsupportedVersion(u8),

    /// A length prefix would overflow the format's fixed-width fields
    #[error("payload of {0} bytes exceeds the maximum encodable size")]
    TooLarge(usize),
}

// The codec reads through a Cursor over an already-framed, CRC-valid
// payload; running out of bytes there is corruption, not a short read.
impl From<std::io::Error> for RecordError {
    fn from(_: std::io::Error) -> Self {
        RecordError::InvalidFormat
    }
}
