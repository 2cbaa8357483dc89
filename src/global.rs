//! The default instance: one process-wide store addressed without a
//! handle.
//!
//! Hosts that predate multi-instance support call [`initialize`] once and
//! then use the typed functions here. The default instance lives in the
//! same registry as handle-opened stores, so its directory is protected
//! by the same `AlreadyOpen` guard and the two modes cannot stack on one
//! log file.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use satchel_core::{Error, Result, TypeTag, Value};
use satchel_storage::{Store, StoreOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::registry::{self, InstanceHandle};

struct DefaultInstance {
    handle: InstanceHandle,
    /// Canonical directory, compared on re-initialize
    dir: PathBuf,
}

static DEFAULT: Lazy<Mutex<Option<DefaultInstance>>> = Lazy::new(|| Mutex::new(None));

/// Open the default instance rooted at `dir`.
///
/// Calling again with the same directory is a no-op. Calling with a
/// different directory closes the current default instance and opens the
/// new one in its place.
pub fn initialize(dir: impl AsRef<Path>) -> Result<()> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;
    let canonical = dir.canonicalize()?;

    let mut guard = DEFAULT.lock();
    let previous = match guard.as_ref() {
        Some(instance) if instance.dir == canonical => return Ok(()),
        _ => guard.take(),
    };
    if let Some(previous) = previous {
        info!(
            target: "satchel::store",
            from = %previous.dir.display(),
            to = %canonical.display(),
            "re-initializing default instance"
        );
        registry::close(previous.handle)?;
    }

    let handle = registry::open(&canonical, StoreOptions::default())?;
    *guard = Some(DefaultInstance {
        handle,
        dir: canonical,
    });
    Ok(())
}

/// The store behind the default instance, or `InstanceClosed` before
/// [`initialize`] (and after [`close`] or [`clear_data`]).
pub fn resolve() -> Result<Arc<Store>> {
    let guard = DEFAULT.lock();
    let instance = guard.as_ref().ok_or(Error::InstanceClosed)?;
    registry::resolve(instance.handle)
}

/// Whether a default instance is currently open.
pub fn is_initialized() -> bool {
    DEFAULT.lock().is_some()
}

/// Flush and close the default instance. Requires [`initialize`] before
/// further use.
pub fn close() -> Result<()> {
    let mut guard = DEFAULT.lock();
    let instance = guard.take().ok_or(Error::InstanceClosed)?;
    registry::close(instance.handle)
}

/// Delete the default instance's on-disk data and invalidate it.
/// Requires [`initialize`] before further use.
pub fn clear_data() -> Result<()> {
    let mut guard = DEFAULT.lock();
    let instance = guard.take().ok_or(Error::InstanceClosed)?;
    registry::clear_destroy(instance.handle)
}

/// Remove every entry but keep the instance open.
pub fn clear() -> Result<()> {
    resolve()?.clear()
}

/// Remove the entry for `key`; absence is not an error.
pub fn delete(key: &str) -> Result<()> {
    resolve()?.delete(key)
}

/// Whether `key` currently has an entry.
pub fn contains(key: &str) -> Result<bool> {
    resolve()?.contains(key)
}

macro_rules! scalar_api {
    ($(($put:ident, $get:ident, $ty:ty, $variant:ident, $as:ident)),* $(,)?) => {
        $(
            #[doc = concat!("Store a `", stringify!($ty), "` under `key`.")]
            pub fn $put(key: &str, value: $ty) -> Result<()> {
                resolve()?.put(key, Value::$variant(value))
            }

            #[doc = concat!("Read the `", stringify!($ty), "` stored under `key`.")]
            pub fn $get(key: &str) -> Result<$ty> {
                let value = resolve()?.get(key, TypeTag::$variant)?;
                value.$as().ok_or(Error::TypeMismatch {
                    stored: value.type_tag(),
                    requested: TypeTag::$variant,
                })
            }
        )*
    };
}

scalar_api!(
    (put_i32, get_i32, i32, Int32, as_i32),
    (put_i64, get_i64, i64, Int64, as_i64),
    (put_f32, get_f32, f32, Float32, as_f32),
    (put_f64, get_f64, f64, Float64, as_f64),
    (put_bool, get_bool, bool, Bool, as_bool),
);

/// Store a string under `key`.
pub fn put_str(key: &str, value: &str) -> Result<()> {
    resolve()?.put(key, Value::String(value.to_string()))
}

/// Read the string stored under `key`.
pub fn get_str(key: &str) -> Result<String> {
    let value = resolve()?.get(key, TypeTag::String)?;
    value
        .as_str()
        .map(str::to_string)
        .ok_or(Error::TypeMismatch {
            stored: value.type_tag(),
            requested: TypeTag::String,
        })
}

/// Store a byte buffer under `key`.
pub fn put_bytes(key: &str, value: Vec<u8>) -> Result<()> {
    resolve()?.put(key, Value::ByteArray(value))
}

/// Read the byte buffer stored under `key`.
pub fn get_bytes(key: &str) -> Result<Vec<u8>> {
    let value = resolve()?.get(key, TypeTag::ByteArray)?;
    value
        .as_bytes()
        .map(<[u8]>::to_vec)
        .ok_or(Error::TypeMismatch {
            stored: value.type_tag(),
            requested: TypeTag::ByteArray,
        })
}

macro_rules! array_api {
    ($(($put:ident, $get:ident, $elem:ty, $variant:ident, $as:ident)),* $(,)?) => {
        $(
            #[doc = concat!("Store a `", stringify!($elem), "` array under `key`.")]
            pub fn $put(key: &str, values: Vec<$elem>) -> Result<()> {
                resolve()?.put(key, Value::$variant(values))
            }

            #[doc = concat!("Read the `", stringify!($elem), "` array stored under `key`.")]
            pub fn $get(key: &str) -> Result<Vec<$elem>> {
                let value = resolve()?.get(key, TypeTag::$variant)?;
                value.$as().map(<[$elem]>::to_vec).ok_or(Error::TypeMismatch {
                    stored: value.type_tag(),
                    requested: TypeTag::$variant,
                })
            }
        )*
    };
}

array_api!(
    (put_i32_array, get_i32_array, i32, Int32Array, as_i32_slice),
    (put_i64_array, get_i64_array, i64, Int64Array, as_i64_slice),
    (put_f32_array, get_f32_array, f32, Float32Array, as_f32_slice),
    (put_f64_array, get_f64_array, f64, Float64Array, as_f64_slice),
);

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    // The default instance is process-wide state, so the whole lifecycle
    // runs in one test rather than racing across parallel test threads.
    #[test]
    fn test_default_instance_lifecycle() {
        let dir_a = tempdir().unwrap();
        let dir_b = tempdir().unwrap();

        // Nothing is initialized yet
        assert!(matches!(get_i32("k"), Err(Error::InstanceClosed)));
        assert!(!is_initialized());

        initialize(dir_a.path()).unwrap();
        assert!(is_initialized());

        put_i32("count", 3).unwrap();
        put_str("name", "satchel").unwrap();
        put_f64_array("samples", vec![0.5, f64::NAN]).unwrap();
        assert_eq!(get_i32("count").unwrap(), 3);
        assert_eq!(get_str("name").unwrap(), "satchel");
        let samples = get_f64_array("samples").unwrap();
        assert_eq!(samples.len(), 2);
        assert!(samples[1].is_nan());
        assert!(contains("count").unwrap());

        // Wrong-type reads refuse to reinterpret
        assert!(matches!(
            get_bool("count"),
            Err(Error::TypeMismatch { .. })
        ));

        // Same directory again is a no-op; the data is still there
        initialize(dir_a.path()).unwrap();
        assert_eq!(get_i32("count").unwrap(), 3);

        // Opening the default instance's directory by handle is refused
        assert!(matches!(
            registry::open(dir_a.path(), StoreOptions::for_testing()),
            Err(Error::AlreadyOpen(_))
        ));

        // A different directory swaps the default instance
        initialize(dir_b.path()).unwrap();
        assert!(matches!(get_i32("count"), Err(Error::NotFound(_))));
        put_i32("other", 9).unwrap();

        // The first directory has been released and reopens with its
        // data intact
        let handle = registry::open(dir_a.path(), StoreOptions::for_testing()).unwrap();
        let store = registry::resolve(handle).unwrap();
        assert_eq!(store.get("count", TypeTag::Int32).unwrap(), Value::Int32(3));
        registry::close(handle).unwrap();

        // Deletes go through the same implicit instance
        put_bool("flag", true).unwrap();
        delete("flag").unwrap();
        delete("flag").unwrap();
        assert!(!contains("flag").unwrap());

        // clear keeps the instance, clear_data destroys it
        clear().unwrap();
        assert!(matches!(get_i32("other"), Err(Error::NotFound(_))));
        put_i32("other", 10).unwrap();

        clear_data().unwrap();
        assert!(!is_initialized());
        assert!(matches!(put_i32("other", 11), Err(Error::InstanceClosed)));
        assert!(matches!(close(), Err(Error::InstanceClosed)));
        assert!(matches!(clear_data(), Err(Error::InstanceClosed)));

        // Re-initialize after destroy starts empty
        initialize(dir_b.path()).unwrap();
        assert!(matches!(get_i32("other"), Err(Error::NotFound(_))));
        close().unwrap();
    }
}
