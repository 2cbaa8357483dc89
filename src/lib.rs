//! Satchel - embedded, disk-persisted, typed key-value store built to be
//! called across a C boundary.
//!
//! Keys are strings; values are typed scalars or homogeneous arrays. Every
//! mutation is appended to a checksummed log, so the store survives
//! process crashes with at worst the loss of the final torn write. Hosts
//! address stores either through explicit handles or through one
//! process-wide default instance.
//!
//! # Quick Start
//!
//! ```ignore
//! use satchel::{registry, StoreOptions, TypeTag, Value};
//!
//! let handle = registry::open("/var/lib/myapp/satchel", StoreOptions::default())?;
//! let store = registry::resolve(handle)?;
//!
//! store.put("user:name", Value::String("Alice".into()))?;
//! let name = store.get("user:name", TypeTag::String)?;
//!
//! registry::close(handle)?;
//! ```
//!
//! # Architecture
//!
//! Layered bottom-up:
//!
//! - `satchel-core`: the [`Value`]/[`TypeTag`] data model and the
//!   [`Error`] type with its frozen boundary codes.
//! - `satchel-storage`: the append-only log, record format, recovery and
//!   compaction behind [`Store`].
//! - this crate: the instance [`registry`], the [`global`] default
//!   instance, the [`logging`] sink bridge and the exported [`ffi`]
//!   surface.
//!
//! The C surface in [`ffi`] never panics across the boundary: every
//! fallible path is an error payload in the returned result object.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ffi;
pub mod global;
pub mod logging;
pub mod registry;

pub use logging::{LogLevel, LogSink};
pub use registry::InstanceHandle;
pub use satchel_core::{Error, Result, TypeTag, Value};
pub use satchel_storage::{DurabilityMode, Store, StoreOptions};
