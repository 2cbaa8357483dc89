//! Core types for satchel
//!
//! This crate defines the foundational types used throughout the system:
//! - Value: tagged scalar/array value, the unit of everything stored
//! - TypeTag: stable one-byte discriminant for the persisted format
//! - Error: error kind hierarchy with stable boundary codes
//!
//! No I/O lives here; this crate says what a value IS and how failures are
//! described, so both the storage engine and the boundary surface can agree
//! on them without depending on each other.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod value;

// Re-export commonly used types
pub use error::{Error, Result};
pub use value::{TypeTag, Value};
