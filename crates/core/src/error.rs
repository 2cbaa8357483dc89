//! Error types for the satchel engine
//!
//! This module defines all error kinds surfaced by the engine.
//! We use `thiserror` for automatic `Display` and `Error` trait
//! implementations.
//!
//! Every variant has a stable numeric code (`Error::code`) carried across
//! the C boundary. Codes are frozen: new variants append, existing codes
//! never change meaning.

use crate::value::TypeTag;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for satchel operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds for the satchel engine
#[derive(Debug, Error)]
pub enum Error {
    /// Key absent on read
    #[error("key not found: {0:?}")]
    NotFound(String),

    /// Stored tag differs from the requested tag
    #[error("type mismatch: stored {stored}, requested {requested}")]
    TypeMismatch {
        /// Tag persisted with the entry
        stored: TypeTag,
        /// Tag the caller asked for
        requested: TypeTag,
    },

    /// Value cannot be serialized
    #[error("encoding failed: {0}")]
    Encoding(String),

    /// Stored bytes are structurally invalid (including corruption)
    #[error("decoding failed: {0}")]
    Decoding(String),

    /// Underlying storage failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Operation on a closed instance
    #[error("instance is closed")]
    InstanceClosed,

    /// Directory already owned by a live instance
    #[error("store already open at {0:?}")]
    AlreadyOpen(PathBuf),

    /// Malformed argument at the boundary (null pointer, empty key, bad UTF-8)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Stable numeric code carried across the C boundary.
    ///
    /// The low codes match the original boundary contract and must not be
    /// renumbered; later additions continue the sequence.
    pub fn code(&self) -> i32 {
        match self {
            Error::NotFound(_) => 0,
            Error::Decoding(_) => 1,
            Error::TypeMismatch { .. } => 2,
            Error::InvalidArgument(_) => 3,
            Error::InstanceClosed => 4,
            Error::Encoding(_) => 5,
            Error::Io(_) => 6,
            Error::AlreadyOpen(_) => 7,
        }
    }
}
