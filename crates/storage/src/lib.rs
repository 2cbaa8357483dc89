//! Durable storage engine for satchel.
//!
//! This crate owns everything that touches the disk:
//! - `format`: record framing, CRC validation and the value codec
//! - `log`: the page-grown append-only data file
//! - `options`: durability mode and compaction tuning
//! - `store`: the in-memory index replayed from the log
//!
//! The crate is deliberately unaware of instance registries and of the
//! C boundary; it deals in `&str` keys and [`satchel_core::Value`]s only.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod format;
pub mod log;
pub mod options;
pub mod store;

pub use log::LogFile;
pub use options::{DurabilityMode, OptionsError, StoreOptions};
pub use store::{Store, DATA_FILE_NAME};
