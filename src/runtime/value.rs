//! Runtime value representation

use crate::parser::module::ValueType;
use fhex::ToHex;
use std::fmt;

/// Runtime representation of WebAssembly values
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl Value {
    /// Get the WebAssembly type of this value
    pub fn typ(&self) -> ValueType {
        match self {
            Value::I32(_) => ValueType::I32,
            Value::I64(_) => ValueType::I64,
            Value::F32(_) => ValueType::F32,
            Value::F64(_) => ValueType::F64,
        }
    }

    /// The zero value locals of type `t` start with.
    pub fn default_for(t: ValueType) -> Value {
        match t {
            ValueType::I32 => Value::I32(0),
            ValueType::I64 => Value::I64(0),
            ValueType::F32 => Value::F32(0.0),
            ValueType::F64 => Value::F64(0.0),
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::F32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }

    /// Reduces a result to the harness's 32-bit integer: i64 wraps, floats
    /// truncate toward zero and saturate, NaN becomes 0.
    pub fn truncate_to_i32(&self) -> i32 {
        match *self {
            Value::I32(v) => v,
            Value::I64(v) => v as i32,
            Value::F32(v) => v as i32,
            Value::F64(v) => v as i32,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::I32(v) => write!(f, "i32:{v}"),
            Value::I64(v) => write!(f, "i64:{v}"),
            Value::F32(v) => write!(f, "f32:{}", v.to_hex()),
            Value::F64(v) => write!(f, "f64:{}", v.to_hex()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type() {
        assert_eq!(Value::I32(42).typ(), ValueType::I32);
        assert_eq!(Value::I64(42).typ(), ValueType::I64);
        assert_eq!(Value::F32(42.0).typ(), ValueType::F32);
        assert_eq!(Value::F64(42.0).typ(), ValueType::F64);
        assert_eq!(Value::default_for(ValueType::F64), Value::F64(0.0));
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::I32(42).as_i32(), Some(42));
        assert_eq!(Value::I32(42).as_i64(), None);
        assert_eq!(Value::I64(42).as_i64(), Some(42));
        assert_eq!(Value::F32(42.0).as_f32(), Some(42.0));
        assert_eq!(Value::F64(42.0).as_f64(), Some(42.0));
    }

    #[test]
    fn test_truncate_to_i32() {
        assert_eq!(Value::I32(-7).truncate_to_i32(), -7);
        assert_eq!(Value::I64(0x1_0000_0005).truncate_to_i32(), 5);
        assert_eq!(Value::I64(-1).truncate_to_i32(), -1);
        assert_eq!(Value::F64(-2.9).truncate_to_i32(), -2);
        assert_eq!(Value::F32(3.99).truncate_to_i32(), 3);
        assert_eq!(Value::F64(1e300).truncate_to_i32(), i32::MAX);
        assert_eq!(Value::F64(f64::NEG_INFINITY).truncate_to_i32(), i32::MIN);
        assert_eq!(Value::F64(f64::NAN).truncate_to_i32(), 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Value::I32(42)), "i32:42");
        assert_eq!(format!("{}", Value::I64(42)), "i64:42");
        // fhex uses a different format, just check it contains the value
        let f32_str = format!("{}", Value::F32(42.0));
        assert!(f32_str.starts_with("f32:"));
        let f64_str = format!("{}", Value::F64(42.0));
        assert!(f64_str.starts_with("f64:"));
    }
}
