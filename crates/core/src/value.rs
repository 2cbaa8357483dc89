//! Typed values
//!
//! This module defines:
//! - Value: tagged union over every storable shape
//! - TypeTag: stable one-byte discriminant used by the persisted format
//!
//! ## Type rules
//!
//! - Eleven variants only; no implicit coercions
//! - A read must request the stored tag; a mismatch is an error, never a
//!   reinterpretation of payload bytes
//! - Equality is bit-exact for floats (`NaN == NaN`, `0.0 != -0.0`) so a
//!   value read back from disk always compares equal to the value written
//!
//! ## Tag stability
//!
//! `TypeTag` discriminants are part of the on-disk format and must never be
//! renumbered. The boundary ABI has its own enumeration with different
//! ordinals; the two are mapped explicitly at the boundary layer.

/// One-byte type discriminant persisted alongside every stored value.
///
/// Discriminants are frozen: appending new variants is allowed, renumbering
/// existing ones is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeTag {
    /// 32-bit signed integer
    Int32 = 1,
    /// 64-bit signed integer
    Int64 = 2,
    /// 32-bit IEEE-754 float
    Float32 = 3,
    /// 64-bit IEEE-754 float
    Float64 = 4,
    /// Boolean
    Bool = 5,
    /// UTF-8 string
    String = 6,
    /// Raw bytes
    ByteArray = 7,
    /// Homogeneous array of i32
    Int32Array = 8,
    /// Homogeneous array of i64
    Int64Array = 9,
    /// Homogeneous array of f32
    Float32Array = 10,
    /// Homogeneous array of f64
    Float64Array = 11,
}

impl TypeTag {
    /// Parse a persisted tag byte. Unknown bytes are rejected, not mapped.
    pub fn from_u8(byte: u8) -> Option<TypeTag> {
        match byte {
            1 => Some(TypeTag::Int32),
            2 => Some(TypeTag::Int64),
            3 => Some(TypeTag::Float32),
            4 => Some(TypeTag::Float64),
            5 => Some(TypeTag::Bool),
            6 => Some(TypeTag::String),
            7 => Some(TypeTag::ByteArray),
            8 => Some(TypeTag::Int32Array),
            9 => Some(TypeTag::Int64Array),
            10 => Some(TypeTag::Float32Array),
            11 => Some(TypeTag::Float64Array),
            _ => None,
        }
    }

    /// The persisted tag byte.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Element width in bytes for array variants, `None` for scalars and
    /// `String` (whose payloads are length-prefixed, not element-counted).
    pub fn element_width(self) -> Option<u8> {
        match self {
            TypeTag::ByteArray => Some(1),
            TypeTag::Int32Array | TypeTag::Float32Array => Some(4),
            TypeTag::Int64Array | TypeTag::Float64Array => Some(8),
            _ => None,
        }
    }

    /// Human-readable tag name for diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Int32 => "Int32",
            TypeTag::Int64 => "Int64",
            TypeTag::Float32 => "Float32",
            TypeTag::Float64 => "Float64",
            TypeTag::Bool => "Bool",
            TypeTag::String => "String",
            TypeTag::ByteArray => "ByteArray",
            TypeTag::Int32Array => "Int32Array",
            TypeTag::Int64Array => "Int64Array",
            TypeTag::Float32Array => "Float32Array",
            TypeTag::Float64Array => "Float64Array",
        }
    }
}

impl std::fmt::Display for TypeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A storable value: a typed scalar or a homogeneous array.
///
/// Array variants own their element buffers. Different variants are NEVER
/// equal, even when numerically equivalent: `Int32(1) != Int64(1)`.
#[derive(Debug, Clone)]
pub enum Value {
    /// 32-bit signed integer
    Int32(i32),
    /// 64-bit signed integer
    Int64(i64),
    /// 32-bit IEEE-754 float
    Float32(f32),
    /// 64-bit IEEE-754 float
    Float64(f64),
    /// Boolean
    Bool(bool),
    /// UTF-8 string
    String(String),
    /// Raw bytes (zero bytes are legal anywhere in the payload)
    ByteArray(Vec<u8>),
    /// Homogeneous array of i32
    Int32Array(Vec<i32>),
    /// Homogeneous array of i64
    Int64Array(Vec<i64>),
    /// Homogeneous array of f32
    Float32Array(Vec<f32>),
    /// Homogeneous array of f64
    Float64Array(Vec<f64>),
}

// Bit-exact equality: a stored value must round-trip to something equal,
// including NaN payloads, so floats compare via to_bits rather than IEEE ==.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int32(a), Value::Int32(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::Float32(a), Value::Float32(b)) => a.to_bits() == b.to_bits(),
            (Value::Float64(a), Value::Float64(b)) => a.to_bits() == b.to_bits(),
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::ByteArray(a), Value::ByteArray(b)) => a == b,
            (Value::Int32Array(a), Value::Int32Array(b)) => a == b,
            (Value::Int64Array(a), Value::Int64Array(b)) => a == b,
            (Value::Float32Array(a), Value::Float32Array(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b.iter()).all(|(x, y)| x.to_bits() == y.to_bits())
            }
            (Value::Float64Array(a), Value::Float64Array(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b.iter()).all(|(x, y)| x.to_bits() == y.to_bits())
            }
            // Different tags are never equal
            _ => false,
        }
    }
}

// Bitwise float comparison is reflexive, so full equivalence holds.
impl Eq for Value {}

impl Value {
    /// The tag describing this value's shape.
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Int32(_) => TypeTag::Int32,
            Value::Int64(_) => TypeTag::Int64,
            Value::Float32(_) => TypeTag::Float32,
            Value::Float64(_) => TypeTag::Float64,
            Value::Bool(_) => TypeTag::Bool,
            Value::String(_) => TypeTag::String,
            Value::ByteArray(_) => TypeTag::ByteArray,
            Value::Int32Array(_) => TypeTag::Int32Array,
            Value::Int64Array(_) => TypeTag::Int64Array,
            Value::Float32Array(_) => TypeTag::Float32Array,
            Value::Float64Array(_) => TypeTag::Float64Array,
        }
    }

    /// Get the type name as a string
    pub fn type_name(&self) -> &'static str {
        self.type_tag().name()
    }

    /// Check if this is a scalar (non-array, non-string) value
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Value::Int32(_)
                | Value::Int64(_)
                | Value::Float32(_)
                | Value::Float64(_)
                | Value::Bool(_)
        )
    }

    /// Check if this is an array value (including byte arrays)
    pub fn is_array(&self) -> bool {
        matches!(
            self,
            Value::ByteArray(_)
                | Value::Int32Array(_)
                | Value::Int64Array(_)
                | Value::Float32Array(_)
                | Value::Float64Array(_)
        )
    }

    /// Get as i32 if this is an Int32 value
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int32(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as i64 if this is an Int64 value
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as f32 if this is a Float32 value
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::Float32(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as f64 if this is a Float64 value
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as bool if this is a Bool value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as &str if this is a String value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as &[u8] if this is a ByteArray value
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::ByteArray(b) => Some(b),
            _ => None,
        }
    }

    /// Get as &[i32] if this is an Int32Array value
    pub fn as_i32_slice(&self) -> Option<&[i32]> {
        match self {
            Value::Int32Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get as &[i64] if this is an Int64Array value
    pub fn as_i64_slice(&self) -> Option<&[i64]> {
        match self {
            Value::Int64Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get as &[f32] if this is a Float32Array value
    pub fn as_f32_slice(&self) -> Option<&[f32]> {
        match self {
            Value::Float32Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get as &[f64] if this is a Float64Array value
    pub fn as_f64_slice(&self) -> Option<&[f64]> {
        match self {
            Value::Float64Array(a) => Some(a),
            _ => None,
        }
    }
}

// ============================================================================
// From implementations for ergonomic API usage
// ============================================================================

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::ByteArray(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::ByteArray(b.to_vec())
    }
}

impl From<Vec<i32>> for Value {
    fn from(a: Vec<i32>) -> Self {
        Value::Int32Array(a)
    }
}

impl From<Vec<i64>> for Value {
    fn from(a: Vec<i64>) -> Self {
        Value::Int64Array(a)
    }
}

impl From<Vec<f32>> for Value {
    fn from(a: Vec<f32>) -> Self {
        Value::Float32Array(a)
    }
}

impl From<Vec<f64>> for Value {
    fn from(a: Vec<f64>) -> Self {
        Value::Float64Array(a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // Tests for TypeTag stability

    #[test]
    fn test_tag_bytes_are_frozen() {
        assert_eq!(TypeTag::Int32.as_u8(), 1);
        assert_eq!(TypeTag::Int64.as_u8(), 2);
        assert_eq!(TypeTag::Float32.as_u8(), 3);
        assert_eq!(TypeTag::Float64.as_u8(), 4);
        assert_eq!(TypeTag::Bool.as_u8(), 5);
        assert_eq!(TypeTag::String.as_u8(), 6);
        assert_eq!(TypeTag::ByteArray.as_u8(), 7);
        assert_eq!(TypeTag::Int32Array.as_u8(), 8);
        assert_eq!(TypeTag::Int64Array.as_u8(), 9);
        assert_eq!(TypeTag::Float32Array.as_u8(), 10);
        assert_eq!(TypeTag::Float64Array.as_u8(), 11);
    }

    #[test]
    fn test_tag_round_trip() {
        for byte in 1..=11u8 {
            let tag = TypeTag::from_u8(byte).unwrap();
            assert_eq!(tag.as_u8(), byte);
        }
    }

    #[test]
    fn test_tag_rejects_unknown_bytes() {
        assert_eq!(TypeTag::from_u8(0), None);
        assert_eq!(TypeTag::from_u8(12), None);
        assert_eq!(TypeTag::from_u8(255), None);
    }

    #[test]
    fn test_tag_element_widths() {
        assert_eq!(TypeTag::ByteArray.element_width(), Some(1));
        assert_eq!(TypeTag::Int32Array.element_width(), Some(4));
        assert_eq!(TypeTag::Int64Array.element_width(), Some(8));
        assert_eq!(TypeTag::Float32Array.element_width(), Some(4));
        assert_eq!(TypeTag::Float64Array.element_width(), Some(8));
        assert_eq!(TypeTag::Int32.element_width(), None);
        assert_eq!(TypeTag::String.element_width(), None);
    }

    // Tests for Value variants

    #[test]
    fn test_value_int32() {
        let value = Value::Int32(42);
        assert!(matches!(value, Value::Int32(42)));
        assert_eq!(value.type_tag(), TypeTag::Int32);
        assert_eq!(value.as_i32(), Some(42));
        assert_eq!(value.as_i64(), None);
        assert!(value.is_scalar());
    }

    #[test]
    fn test_value_int64() {
        let value = Value::Int64(i64::MIN);
        assert_eq!(value.as_i64(), Some(i64::MIN));
        assert_eq!(value.type_name(), "Int64");
    }

    #[test]
    fn test_value_bool() {
        let value_true = Value::Bool(true);
        let value_false = Value::Bool(false);
        assert_eq!(value_true.as_bool(), Some(true));
        assert_eq!(value_false.as_bool(), Some(false));
        assert_ne!(value_true, value_false);
    }

    #[test]
    fn test_value_string() {
        let value = Value::String("hello world".to_string());
        assert_eq!(value.as_str(), Some("hello world"));
        assert!(!value.is_array());
        assert!(!value.is_scalar());
    }

    #[test]
    fn test_value_byte_array_with_zero_bytes() {
        let bytes = vec![0u8, 1, 0, 2, 0];
        let value = Value::ByteArray(bytes.clone());
        assert_eq!(value.as_bytes(), Some(bytes.as_slice()));
        assert!(value.is_array());
    }

    #[test]
    fn test_value_typed_arrays() {
        let value = Value::Int32Array(vec![1, 2, 3]);
        assert_eq!(value.as_i32_slice(), Some(&[1, 2, 3][..]));
        assert_eq!(value.as_i64_slice(), None);

        let value = Value::Float64Array(vec![1.5, -2.5]);
        assert_eq!(value.as_f64_slice(), Some(&[1.5, -2.5][..]));
    }

    #[test]
    fn test_empty_arrays_are_values() {
        let value = Value::Int32Array(Vec::new());
        assert!(value.is_array());
        assert_eq!(value.as_i32_slice(), Some(&[][..]));
        assert_eq!(value, Value::Int32Array(Vec::new()));
    }

    // Equality semantics

    #[test]
    fn test_different_tags_never_equal() {
        assert_ne!(Value::Int32(1), Value::Int64(1));
        assert_ne!(Value::Float32(1.0), Value::Float64(1.0));
        assert_ne!(
            Value::ByteArray(b"hi".to_vec()),
            Value::String("hi".to_string())
        );
        assert_ne!(Value::Int32Array(vec![1]), Value::Int64Array(vec![1]));
    }

    #[test]
    fn test_float_equality_is_bit_exact() {
        // NaN round-trips must compare equal
        assert_eq!(Value::Float32(f32::NAN), Value::Float32(f32::NAN));
        assert_eq!(Value::Float64(f64::NAN), Value::Float64(f64::NAN));

        // Signed zeroes carry different bits
        assert_ne!(Value::Float64(0.0), Value::Float64(-0.0));
        assert_ne!(Value::Float32(0.0), Value::Float32(-0.0));

        assert_eq!(Value::Float64(1.5), Value::Float64(1.5));
    }

    #[test]
    fn test_float_array_equality_is_bit_exact() {
        let a = Value::Float64Array(vec![f64::NAN, 0.5]);
        let b = Value::Float64Array(vec![f64::NAN, 0.5]);
        assert_eq!(a, b);

        let c = Value::Float64Array(vec![f64::NAN, -0.0]);
        let d = Value::Float64Array(vec![f64::NAN, 0.0]);
        assert_ne!(c, d);

        // Length mismatch
        assert_ne!(
            Value::Float32Array(vec![1.0]),
            Value::Float32Array(vec![1.0, 2.0])
        );
    }

    // From impls

    #[test]
    fn test_from_impls() {
        assert_eq!(Value::from(7i32), Value::Int32(7));
        assert_eq!(Value::from(7i64), Value::Int64(7));
        assert_eq!(Value::from(1.5f32), Value::Float32(1.5));
        assert_eq!(Value::from(1.5f64), Value::Float64(1.5));
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from("s"), Value::String("s".to_string()));
        assert_eq!(Value::from(vec![1u8, 2]), Value::ByteArray(vec![1, 2]));
        assert_eq!(Value::from(&b"xy"[..]), Value::ByteArray(b"xy".to_vec()));
        assert_eq!(Value::from(vec![1i32]), Value::Int32Array(vec![1]));
        assert_eq!(Value::from(vec![1i64]), Value::Int64Array(vec![1]));
        assert_eq!(Value::from(vec![1.0f32]), Value::Float32Array(vec![1.0]));
        assert_eq!(Value::from(vec![1.0f64]), Value::Float64Array(vec![1.0]));
    }

    #[test]
    fn test_value_tag_agreement() {
        let values = [
            Value::Int32(0),
            Value::Int64(0),
            Value::Float32(0.0),
            Value::Float64(0.0),
            Value::Bool(false),
            Value::String(String::new()),
            Value::ByteArray(Vec::new()),
            Value::Int32Array(Vec::new()),
            Value::Int64Array(Vec::new()),
            Value::Float32Array(Vec::new()),
            Value::Float64Array(Vec::new()),
        ];
        for value in &values {
            let tag = value.type_tag();
            assert_eq!(TypeTag::from_u8(tag.as_u8()), Some(tag));
            assert_eq!(value.type_name(), tag.name());
        }
    }

    // Property: tag bytes map one-to-one onto 1..=11, and equality on
    // float values follows bit patterns exactly.

    proptest! {
        #[test]
        fn prop_tag_bytes_round_trip(byte in any::<u8>()) {
            match TypeTag::from_u8(byte) {
                Some(tag) => prop_assert_eq!(tag.as_u8(), byte),
                None => prop_assert!(!(1..=11).contains(&byte)),
            }
        }

        #[test]
        fn prop_f64_equality_matches_bit_pattern(a in any::<f64>(), b in any::<f64>()) {
            prop_assert_eq!(
                Value::Float64(a) == Value::Float64(b),
                a.to_bits() == b.to_bits()
            );
            // Reflexive even for NaN, unlike the primitive comparison
            prop_assert_eq!(Value::Float64(a), Value::Float64(a));
        }

        #[test]
        fn prop_f32_equality_matches_bit_pattern(a in any::<f32>(), b in any::<f32>()) {
            prop_assert_eq!(
                Value::Float32(a) == Value::Float32(b),
                a.to_bits() == b.to_bits()
            );
        }

        #[test]
        fn prop_float_array_equality_is_elementwise(
            xs in proptest::collection::vec(any::<f64>(), 0..32),
        ) {
            prop_assert_eq!(
                Value::Float64Array(xs.clone()),
                Value::Float64Array(xs)
            );
        }
    }
}
