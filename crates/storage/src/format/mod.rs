//! On-disk byte formats for the data file.
//!
//! This module centralizes all serialization logic for persistent storage.
//! Keeping serialization separate from operational logic (how the log file
//! is managed) makes format evolution easier to manage.
//!
//! # Module Structure
//!
//! - `record`: file header and record framing
//! - `codec`: typed value payload encoding

pub mod codec;
pub mod record;

pub use codec::{decode_value, encode_value};
pub use record::{
    encode_delete, encode_put, FileHeader, LogRecord, RecordError, FILE_FORMAT_VERSION,
    FILE_HEADER_SIZE, FILE_MAGIC, RECORD_FORMAT_VERSION,
};
