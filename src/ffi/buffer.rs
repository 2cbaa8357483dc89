//! Ownership protocol for values crossing the C boundary.
//!
//! Everything handed to the host is built as a normal owned Rust value
//! first ([`ResultPayload`]), then converted to `repr(C)` form by
//! leaking the allocation. The host gives the memory back through the
//! single release entry point ([`free_result`]), which reconstructs the
//! owned shapes so Rust's own `Drop` glue frees them. Leaking consumes
//! the owned value, so a use-after-release cannot be expressed on the
//! Rust side of the boundary.
//!
//! A [`RawResult`] carries either a data payload or an error, never
//! both; a void success carries neither.

use satchel_core::{Error, TypeTag, Value};
use std::os::raw::c_void;

/// Boundary type tokens.
///
/// The ordinals are ABI, fixed forever, and deliberately distinct from
/// the on-disk [`TypeTag`] discriminants; the two evolve independently.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawType {
    /// `data` points to an `i32`
    I32 = 0,
    /// `data` points to a [`ByteSlice`] of UTF-8 text
    Str = 1,
    /// `data` points to a `bool` (one byte, 0 or 1)
    Bool = 2,
    /// `data` points to an `i64`
    I64 = 3,
    /// `data` points to an `f32`
    F32 = 4,
    /// `data` points to an `f64`
    F64 = 5,
    /// `data` points to a [`RawTypedArray`] of bytes
    ByteArray = 6,
    /// `data` points to a [`RawTypedArray`] of `i32`
    I32Array = 7,
    /// `data` points to a [`RawTypedArray`] of `i64`
    I64Array = 8,
    /// `data` points to a [`RawTypedArray`] of `f32`
    F32Array = 9,
    /// `data` points to a [`RawTypedArray`] of `f64`
    F64Array = 10,
}

impl RawType {
    /// Boundary token for a stored tag.
    pub fn from_tag(tag: TypeTag) -> RawType {
        match tag {
            TypeTag::Int32 => RawType::I32,
            TypeTag::Int64 => RawType::I64,
            TypeTag::Float32 => RawType::F32,
            TypeTag::Float64 => RawType::F64,
            TypeTag::Bool => RawType::Bool,
            TypeTag::String => RawType::Str,
            TypeTag::ByteArray => RawType::ByteArray,
            TypeTag::Int32Array => RawType::I32Array,
            TypeTag::Int64Array => RawType::I64Array,
            TypeTag::Float32Array => RawType::F32Array,
            TypeTag::Float64Array => RawType::F64Array,
        }
    }
}

/// Length-prefixed byte payload. Not null-terminated; zero bytes are
/// legal content.
#[repr(C)]
#[derive(Debug)]
pub struct ByteSlice {
    /// First byte, or dangling when `len` is 0
    pub ptr: *const u8,
    /// Byte count
    pub len: usize,
}

impl ByteSlice {
    pub(crate) fn from_vec(bytes: Vec<u8>) -> ByteSlice {
        let boxed = bytes.into_boxed_slice();
        let len = boxed.len();
        ByteSlice {
            ptr: Box::into_raw(boxed) as *const u8,
            len,
        }
    }

    /// Borrow the payload.
    ///
    /// # Safety
    ///
    /// `ptr`/`len` must describe a live allocation (true for every slice
    /// produced by this module until its result is freed).
    pub unsafe fn as_bytes(&self) -> &[u8] {
        std::slice::from_raw_parts(self.ptr, self.len)
    }

    /// Free the leaked byte buffer this slice points at. The slice
    /// struct itself is owned by its container.
    unsafe fn release_bytes(&self) {
        if self.ptr.is_null() {
            return;
        }
        drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
            self.ptr as *mut u8,
            self.len,
        )));
    }
}

/// Homogeneous array payload: element buffer, boundary token, element
/// count.
#[repr(C)]
#[derive(Debug)]
pub struct RawTypedArray {
    /// First element, or dangling when `len` is 0
    pub ptr: *const c_void,
    /// Element type; fixes the element width
    pub tag: RawType,
    /// Element count, not byte count
    pub len: usize,
}

impl RawTypedArray {
    fn from_vec<T>(values: Vec<T>, tag: RawType) -> RawTypedArray {
        let boxed = values.into_boxed_slice();
        let len = boxed.len();
        RawTypedArray {
            ptr: Box::into_raw(boxed) as *const c_void,
            tag,
            len,
        }
    }

    /// Borrow the elements.
    ///
    /// # Safety
    ///
    /// `T` must match `tag` and the array must still be live.
    pub unsafe fn as_slice<T>(&self) -> &[T] {
        std::slice::from_raw_parts(self.ptr as *const T, self.len)
    }

    unsafe fn release_elements<T>(&self) {
        if self.ptr.is_null() {
            return;
        }
        drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
            self.ptr as *mut T,
            self.len,
        )));
    }
}

/// Error crossing the boundary: stable code plus a human-readable
/// reason.
#[repr(C)]
#[derive(Debug)]
pub struct RawError {
    /// One of the frozen engine error codes
    pub code: i32,
    /// UTF-8 description, owned by the enclosing result
    pub reason: *const ByteSlice,
}

impl RawError {
    fn from_error(err: &Error) -> RawError {
        let reason = ByteSlice::from_vec(err.to_string().into_bytes());
        RawError {
            code: err.code(),
            reason: Box::into_raw(Box::new(reason)),
        }
    }
}

/// Every exported operation returns one of these, heap-allocated.
///
/// At most one of `data` and `err` is non-null; both null is a void
/// success. `tag` is meaningful only while `data` is non-null. The host
/// owns the allocation until it calls the paired release exactly once.
#[repr(C)]
#[derive(Debug)]
pub struct RawResult {
    /// Payload, interpreted per `tag`; null for void results and errors
    pub data: *const c_void,
    /// How to interpret `data`
    pub tag: RawType,
    /// Failure description; null on success
    pub err: *const RawError,
}

impl RawResult {
    pub(crate) fn success(payload: ResultPayload) -> *const RawResult {
        let (data, tag) = payload.leak();
        Box::into_raw(Box::new(RawResult {
            data,
            tag,
            err: std::ptr::null(),
        }))
    }

    pub(crate) fn failure(err: &Error) -> *const RawResult {
        Box::into_raw(Box::new(RawResult {
            data: std::ptr::null(),
            tag: RawType::Bool,
            err: Box::into_raw(Box::new(RawError::from_error(err))),
        }))
    }
}

/// Owned form of an outgoing payload; [`leak`](ResultPayload::leak)
/// converts it to raw form at the moment it crosses out.
pub enum ResultPayload {
    /// Operation succeeded with nothing to return
    Unit,
    /// An `i32` value
    I32(i32),
    /// An `i64` value (also carries instance handles)
    I64(i64),
    /// An `f32` value
    F32(f32),
    /// An `f64` value
    F64(f64),
    /// A `bool` value
    Bool(bool),
    /// A UTF-8 string
    Str(String),
    /// A byte buffer
    Bytes(Vec<u8>),
    /// An `i32` array
    I32Array(Vec<i32>),
    /// An `i64` array
    I64Array(Vec<i64>),
    /// An `f32` array
    F32Array(Vec<f32>),
    /// An `f64` array
    F64Array(Vec<f64>),
}

impl ResultPayload {
    /// Wrap a stored value for the trip across the boundary.
    pub fn from_value(value: Value) -> ResultPayload {
        match value {
            Value::Int32(v) => ResultPayload::I32(v),
            Value::Int64(v) => ResultPayload::I64(v),
            Value::Float32(v) => ResultPayload::F32(v),
            Value::Float64(v) => ResultPayload::F64(v),
            Value::Bool(v) => ResultPayload::Bool(v),
            Value::String(v) => ResultPayload::Str(v),
            Value::ByteArray(v) => ResultPayload::Bytes(v),
            Value::Int32Array(v) => ResultPayload::I32Array(v),
            Value::Int64Array(v) => ResultPayload::I64Array(v),
            Value::Float32Array(v) => ResultPayload::F32Array(v),
            Value::Float64Array(v) => ResultPayload::F64Array(v),
        }
    }

    fn leak(self) -> (*const c_void, RawType) {
        fn boxed<T>(value: T) -> *const c_void {
            Box::into_raw(Box::new(value)) as *const c_void
        }

        match self {
            ResultPayload::Unit => (std::ptr::null(), RawType::Bool),
            ResultPayload::I32(v) => (boxed(v), RawType::I32),
            ResultPayload::I64(v) => (boxed(v), RawType::I64),
            ResultPayload::F32(v) => (boxed(v), RawType::F32),
            ResultPayload::F64(v) => (boxed(v), RawType::F64),
            ResultPayload::Bool(v) => (boxed(v), RawType::Bool),
            ResultPayload::Str(v) => (
                boxed(ByteSlice::from_vec(v.into_bytes())),
                RawType::Str,
            ),
            ResultPayload::Bytes(v) => (
                boxed(RawTypedArray::from_vec(v, RawType::ByteArray)),
                RawType::ByteArray,
            ),
            ResultPayload::I32Array(v) => (
                boxed(RawTypedArray::from_vec(v, RawType::I32Array)),
                RawType::I32Array,
            ),
            ResultPayload::I64Array(v) => (
                boxed(RawTypedArray::from_vec(v, RawType::I64Array)),
                RawType::I64Array,
            ),
            ResultPayload::F32Array(v) => (
                boxed(RawTypedArray::from_vec(v, RawType::F32Array)),
                RawType::F32Array,
            ),
            ResultPayload::F64Array(v) => (
                boxed(RawTypedArray::from_vec(v, RawType::F64Array)),
                RawType::F64Array,
            ),
        }
    }
}

/// Reconstructs the owned allocation behind a leaked pointer and drops
/// it. Implementations must only be fed pointers produced by this
/// module.
pub(crate) trait Releasable {
    /// Free `ptr` and everything it owns. Null is a no-op.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a pointer leaked by this module that has
    /// not been released before.
    unsafe fn release(ptr: *const Self);
}

impl Releasable for ByteSlice {
    unsafe fn release(ptr: *const Self) {
        if ptr.is_null() {
            return;
        }
        let slice = Box::from_raw(ptr as *mut ByteSlice);
        slice.release_bytes();
    }
}

impl Releasable for RawTypedArray {
    unsafe fn release(ptr: *const Self) {
        if ptr.is_null() {
            return;
        }
        let array = Box::from_raw(ptr as *mut RawTypedArray);
        match array.tag {
            RawType::ByteArray => array.release_elements::<u8>(),
            RawType::I32Array => array.release_elements::<i32>(),
            RawType::I64Array => array.release_elements::<i64>(),
            RawType::F32Array => array.release_elements::<f32>(),
            RawType::F64Array => array.release_elements::<f64>(),
            // Scalars never cross as arrays; freeing with a guessed
            // width would be worse than the leak
            _ => debug_assert!(false, "array with scalar tag {:?}", array.tag),
        }
    }
}

impl Releasable for RawError {
    unsafe fn release(ptr: *const Self) {
        if ptr.is_null() {
            return;
        }
        let err = Box::from_raw(ptr as *mut RawError);
        ByteSlice::release(err.reason);
    }
}

impl Releasable for RawResult {
    unsafe fn release(ptr: *const Self) {
        if ptr.is_null() {
            return;
        }
        let result = Box::from_raw(ptr as *mut RawResult);
        RawError::release(result.err);
        if result.data.is_null() {
            return;
        }
        match result.tag {
            RawType::I32 => drop(Box::from_raw(result.data as *mut i32)),
            RawType::I64 => drop(Box::from_raw(result.data as *mut i64)),
            RawType::F32 => drop(Box::from_raw(result.data as *mut f32)),
            RawType::F64 => drop(Box::from_raw(result.data as *mut f64)),
            RawType::Bool => drop(Box::from_raw(result.data as *mut bool)),
            RawType::Str => ByteSlice::release(result.data as *const ByteSlice),
            RawType::ByteArray
            | RawType::I32Array
            | RawType::I64Array
            | RawType::F32Array
            | RawType::F64Array => {
                RawTypedArray::release(result.data as *const RawTypedArray)
            }
        }
    }
}

/// The single release for every result the boundary hands out. Null is
/// a no-op; releasing twice is a host bug the protocol cannot detect.
///
/// # Safety
///
/// `ptr` must be null or a result returned by an exported function that
/// has not been freed before.
pub(crate) unsafe fn free_result(ptr: *const RawResult) {
    RawResult::release(ptr);
}
