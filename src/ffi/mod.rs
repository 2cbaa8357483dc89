//! The exported C surface.
//!
//! Every operation returns a heap-allocated [`RawResult`]; failures are
//! carried in its error field, never unwound across the boundary. The
//! host frees each result exactly once with [`satchel_free_result`].
//!
//! Instances are addressed by the `u64` handles issued by
//! [`satchel_open`]. Handle [`GLOBAL_HANDLE`] (0) addresses the default
//! instance created by [`satchel_initialize`]; the registry never issues
//! it. Caller mistakes (null or non-UTF-8 strings, stale handles) come
//! back as `InvalidArgument` or `InstanceClosed` results rather than
//! crashes.

pub mod buffer;

use satchel_core::{Error, Result, TypeTag, Value};
use satchel_storage::{Store, StoreOptions};
use std::ffi::CStr;
use std::os::raw::{c_char, c_void};
use std::sync::Arc;
use tracing::debug;

use crate::global;
use crate::logging::{self, LogLevel, LogSink};
use crate::registry::{self, InstanceHandle};
use buffer::{ByteSlice, RawResult, ResultPayload};

/// Handle value addressing the default instance.
pub const GLOBAL_HANDLE: u64 = 0;

fn run(f: impl FnOnce() -> Result<ResultPayload>) -> *const RawResult {
    match f() {
        Ok(payload) => RawResult::success(payload),
        Err(error) => {
            debug!(
                target: "satchel::ffi",
                code = error.code(),
                error = %error,
                "operation failed"
            );
            RawResult::failure(&error)
        }
    }
}

/// Borrow a caller string for the duration of the call.
unsafe fn parse_c_str<'a>(ptr: *const c_char, what: &str) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(Error::InvalidArgument(format!("{what} must not be null")));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| Error::InvalidArgument(format!("{what} must be valid UTF-8")))
}

/// Copy a caller array. Null with length 0 is a valid empty array.
unsafe fn copy_array<T: Copy>(ptr: *const T, len: usize) -> Result<Vec<T>> {
    if ptr.is_null() {
        if len == 0 {
            return Ok(Vec::new());
        }
        return Err(Error::InvalidArgument(
            "array pointer is null with non-zero length".to_string(),
        ));
    }
    Ok(std::slice::from_raw_parts(ptr, len).to_vec())
}

fn resolve(handle: u64) -> Result<Arc<Store>> {
    if handle == GLOBAL_HANDLE {
        global::resolve()
    } else {
        registry::resolve(InstanceHandle::from_raw(handle))
    }
}

/// Open the store rooted at `dir` and return its handle as an `i64`
/// payload.
///
/// # Safety
///
/// `dir` must be a valid null-terminated string or null.
#[no_mangle]
pub unsafe extern "C" fn satchel_open(dir: *const c_char) -> *const RawResult {
    let dir = parse_c_str(dir, "dir");
    run(|| {
        let handle = registry::open(dir?, StoreOptions::default())?;
        Ok(ResultPayload::I64(handle.as_raw() as i64))
    })
}

/// Open the default instance rooted at `dir`. Repeat calls with the same
/// directory are no-ops; a different directory replaces the default
/// instance.
///
/// # Safety
///
/// `dir` must be a valid null-terminated string or null.
#[no_mangle]
pub unsafe extern "C" fn satchel_initialize(dir: *const c_char) -> *const RawResult {
    let dir = parse_c_str(dir, "dir");
    run(|| {
        global::initialize(dir?)?;
        Ok(ResultPayload::Unit)
    })
}

/// Flush and close the instance. The handle (or the default instance)
/// is invalid afterwards.
#[no_mangle]
pub extern "C" fn satchel_close(handle: u64) -> *const RawResult {
    run(|| {
        if handle == GLOBAL_HANDLE {
            global::close()?;
        } else {
            registry::close(InstanceHandle::from_raw(handle))?;
        }
        Ok(ResultPayload::Unit)
    })
}

/// Remove every entry; the instance stays open.
#[no_mangle]
pub extern "C" fn satchel_clear(handle: u64) -> *const RawResult {
    run(|| {
        resolve(handle)?.clear()?;
        Ok(ResultPayload::Unit)
    })
}

/// Delete the instance's on-disk data and invalidate it. The default
/// instance needs `satchel_initialize` again afterwards.
#[no_mangle]
pub extern "C" fn satchel_clear_data(handle: u64) -> *const RawResult {
    run(|| {
        if handle == GLOBAL_HANDLE {
            global::clear_data()?;
        } else {
            registry::clear_destroy(InstanceHandle::from_raw(handle))?;
        }
        Ok(ResultPayload::Unit)
    })
}

/// Remove the entry for `key`; absence is not an error.
///
/// # Safety
///
/// `key` must be a valid null-terminated string or null.
#[no_mangle]
pub unsafe extern "C" fn satchel_delete(handle: u64, key: *const c_char) -> *const RawResult {
    let key = parse_c_str(key, "key");
    run(|| {
        resolve(handle)?.delete(key?)?;
        Ok(ResultPayload::Unit)
    })
}

/// Store the string `value` under `key`.
///
/// # Safety
///
/// `key` and `value` must be valid null-terminated strings or null.
#[no_mangle]
pub unsafe extern "C" fn satchel_put_str(
    handle: u64,
    key: *const c_char,
    value: *const c_char,
) -> *const RawResult {
    let key = parse_c_str(key, "key");
    let value = parse_c_str(value, "value");
    run(|| {
        resolve(handle)?.put(key?, Value::String(value?.to_string()))?;
        Ok(ResultPayload::Unit)
    })
}

/// Read the string stored under `key` as a [`ByteSlice`] payload.
///
/// # Safety
///
/// `key` must be a valid null-terminated string or null.
#[no_mangle]
pub unsafe extern "C" fn satchel_get_str(handle: u64, key: *const c_char) -> *const RawResult {
    let key = parse_c_str(key, "key");
    run(|| {
        let value = resolve(handle)?.get(key?, TypeTag::String)?;
        Ok(ResultPayload::from_value(value))
    })
}

macro_rules! impl_scalar_ops {
    ($($put:ident, $get:ident, $ty:ty, $variant:ident;)+) => {
        $(
        #[doc = concat!("Store the `", stringify!($ty), "` `value` under `key`.")]
        ///
        /// # Safety
        ///
        /// `key` must be a valid null-terminated string or null.
        #[no_mangle]
        pub unsafe extern "C" fn $put(
            handle: u64,
            key: *const c_char,
            value: $ty,
        ) -> *const RawResult {
            let key = parse_c_str(key, "key");
            run(|| {
                resolve(handle)?.put(key?, Value::$variant(value))?;
                Ok(ResultPayload::Unit)
            })
        }

        #[doc = concat!("Read the `", stringify!($ty), "` stored under `key`.")]
        ///
        /// # Safety
        ///
        /// `key` must be a valid null-terminated string or null.
        #[no_mangle]
        pub unsafe extern "C" fn $get(handle: u64, key: *const c_char) -> *const RawResult {
            let key = parse_c_str(key, "key");
            run(|| {
                let value = resolve(handle)?.get(key?, TypeTag::$variant)?;
                Ok(ResultPayload::from_value(value))
            })
        }
        )+
    };
}

impl_scalar_ops!(
    satchel_put_i32, satchel_get_i32, i32, Int32;
    satchel_put_i64, satchel_get_i64, i64, Int64;
    satchel_put_f32, satchel_get_f32, f32, Float32;
    satchel_put_f64, satchel_get_f64, f64, Float64;
    satchel_put_bool, satchel_get_bool, bool, Bool;
);

macro_rules! impl_array_ops {
    ($($put:ident, $get:ident, $elem:ty, $variant:ident;)+) => {
        $(
        #[doc = concat!("Store `len` `", stringify!($elem), "` elements from `values` under `key`.")]
        ///
        /// # Safety
        ///
        /// `key` must be a valid null-terminated string or null; `values`
        /// must point to `len` readable elements, or be null with `len` 0.
        #[no_mangle]
        pub unsafe extern "C" fn $put(
            handle: u64,
            key: *const c_char,
            values: *const $elem,
            len: usize,
        ) -> *const RawResult {
            let key = parse_c_str(key, "key");
            let values = copy_array(values, len);
            run(|| {
                resolve(handle)?.put(key?, Value::$variant(values?))?;
                Ok(ResultPayload::Unit)
            })
        }

        #[doc = concat!("Read the `", stringify!($elem), "` array stored under `key` as a [`RawTypedArray`](buffer::RawTypedArray) payload.")]
        ///
        /// # Safety
        ///
        /// `key` must be a valid null-terminated string or null.
        #[no_mangle]
        pub unsafe extern "C" fn $get(handle: u64, key: *const c_char) -> *const RawResult {
            let key = parse_c_str(key, "key");
            run(|| {
                let value = resolve(handle)?.get(key?, TypeTag::$variant)?;
                Ok(ResultPayload::from_value(value))
            })
        }
        )+
    };
}

impl_array_ops!(
    satchel_put_byte_array, satchel_get_byte_array, u8, ByteArray;
    satchel_put_i32_array, satchel_get_i32_array, i32, Int32Array;
    satchel_put_i64_array, satchel_get_i64_array, i64, Int64Array;
    satchel_put_f32_array, satchel_get_f32_array, f32, Float32Array;
    satchel_put_f64_array, satchel_get_f64_array, f64, Float64Array;
);

/// Release a result returned by any exported function. Null is a no-op.
///
/// # Safety
///
/// `result` must be null or a result that has not been freed before.
#[no_mangle]
pub unsafe extern "C" fn satchel_free_result(result: *const RawResult) {
    buffer::free_result(result);
}

/// Host log callback. `message` is a borrowed [`ByteSlice`], valid only
/// for the duration of the call.
pub type LogCallback =
    unsafe extern "C" fn(state: *mut c_void, level: i32, message: *const ByteSlice);

/// Teardown hook invoked once when the sink is replaced or cleared.
pub type LogTeardown = unsafe extern "C" fn(state: *mut c_void);

/// Forwards engine diagnostics to a host callback; tears the host state
/// down when dropped by sink replacement.
struct CallbackSink {
    state: *mut c_void,
    callback: LogCallback,
    destroy: Option<LogTeardown>,
}

// The host promises its callback and state are usable from any thread.
unsafe impl Send for CallbackSink {}
unsafe impl Sync for CallbackSink {}

impl LogSink for CallbackSink {
    fn log(&self, level: LogLevel, message: &str) {
        let slice = ByteSlice {
            ptr: message.as_ptr(),
            len: message.len(),
        };
        unsafe { (self.callback)(self.state, level.as_i32(), &slice) };
    }
}

impl Drop for CallbackSink {
    fn drop(&mut self) {
        if let Some(destroy) = self.destroy {
            unsafe { destroy(self.state) };
        }
    }
}

/// Register the process-wide log callback, replacing and tearing down
/// any previous one. A null `callback` clears the sink; `state` and
/// `destroy` are ignored in that case.
///
/// # Safety
///
/// `callback` and `destroy` must stay callable with `state` from any
/// thread until the sink is replaced; the callback must not call back
/// into the engine.
#[no_mangle]
pub unsafe extern "C" fn satchel_set_logger(
    state: *mut c_void,
    callback: Option<LogCallback>,
    destroy: Option<LogTeardown>,
) -> *const RawResult {
    run(|| {
        match callback {
            Some(callback) => logging::set_sink(Some(Box::new(CallbackSink {
                state,
                callback,
                destroy,
            }))),
            None => logging::set_sink(None),
        }
        Ok(ResultPayload::Unit)
    })
}

/// Set the minimum forwarded severity, 1 (error) to 5 (trace). Unknown
/// levels are rejected with `InvalidArgument`.
#[no_mangle]
pub extern "C" fn satchel_set_log_level(level: i32) -> *const RawResult {
    run(|| {
        let level = LogLevel::from_i32(level)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown log level {level}")))?;
        logging::set_max_level(level);
        Ok(ResultPayload::Unit)
    })
}
