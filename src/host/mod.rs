//! Host object model
//!
//! The values compiled modules exchange with their embedder: numbers in
//! Smi / HeapNumber form, objects with ordered own properties, callable
//! functions and the exceptions calls raise. Everything is `Rc` based and
//! single-threaded.

mod function;
mod object;

pub use function::{HostCallback, HostFunction};
pub use object::HostObject;

use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    TypeError,
    RangeError,
    RuntimeError,
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExceptionKind::TypeError => write!(f, "TypeError"),
            ExceptionKind::RangeError => write!(f, "RangeError"),
            ExceptionKind::RuntimeError => write!(f, "RuntimeError"),
        }
    }
}

/// An exception raised by a host call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct HostException {
    pub kind: ExceptionKind,
    pub message: String,
}

impl HostException {
    pub fn new(kind: ExceptionKind, message: impl Into<String>) -> HostException {
        HostException {
            kind,
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> HostException {
        HostException::new(ExceptionKind::TypeError, message)
    }

    pub fn range_error(message: impl Into<String>) -> HostException {
        HostException::new(ExceptionKind::RangeError, message)
    }

    pub fn runtime_error(message: impl Into<String>) -> HostException {
        HostException::new(ExceptionKind::RuntimeError, message)
    }
}

#[derive(Debug, Clone, Default)]
pub enum HostValue {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    /// Small integer
    Smi(i32),
    /// Any number that is not a Smi
    HeapNumber(f64),
    String(Rc<str>),
    Object(HostObject),
    Function(HostFunction),
}

impl HostValue {
    /// The canonical representation of a number: a Smi when it is an
    /// integer in `i32` range other than `-0`, a HeapNumber otherwise.
    pub fn from_number(n: f64) -> HostValue {
        let integral = n.fract() == 0.0 && n >= i32::MIN as f64 && n <= i32::MAX as f64;
        if integral && !(n == 0.0 && n.is_sign_negative()) {
            HostValue::Smi(n as i32)
        } else {
            HostValue::HeapNumber(n)
        }
    }

    pub fn string(s: &str) -> HostValue {
        HostValue::String(Rc::from(s))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, HostValue::Smi(_) | HostValue::HeapNumber(_))
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, HostValue::Function(_))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, HostValue::Undefined)
    }

    pub fn as_object(&self) -> Option<&HostObject> {
        match self {
            HostValue::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            HostValue::Undefined => "undefined",
            HostValue::Null => "null",
            HostValue::Bool(_) => "boolean",
            HostValue::Smi(_) | HostValue::HeapNumber(_) => "number",
            HostValue::String(_) => "string",
            HostValue::Object(_) => "object",
            HostValue::Function(_) => "function",
        }
    }

    /// Numeric conversion of any value, NaN where there is no number.
    pub fn to_number(&self) -> f64 {
        match self {
            HostValue::Undefined => f64::NAN,
            HostValue::Null => 0.0,
            HostValue::Bool(b) => *b as i32 as f64,
            HostValue::Smi(v) => *v as f64,
            HostValue::HeapNumber(v) => *v,
            HostValue::String(s) => string_to_number(s),
            HostValue::Object(_) | HostValue::Function(_) => f64::NAN,
        }
    }

    /// Calls the value with `args`. Raises a `TypeError` if it is not callable.
    pub fn call(&self, args: &[HostValue]) -> Result<HostValue, HostException> {
        match self {
            HostValue::Function(function) => function.call(args),
            other => Err(HostException::type_error(format!(
                "{} is not a function",
                other.type_name()
            ))),
        }
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HostValue::Undefined, HostValue::Undefined)
            | (HostValue::Null, HostValue::Null) => true,
            (HostValue::Bool(a), HostValue::Bool(b)) => a == b,
            (HostValue::String(a), HostValue::String(b)) => a == b,
            (HostValue::Object(a), HostValue::Object(b)) => a.ptr_eq(b),
            (HostValue::Function(a), HostValue::Function(b)) => a.ptr_eq(b),
            (a, b) if a.is_number() && b.is_number() => a.to_number() == b.to_number(),
            _ => false,
        }
    }
}

impl From<i32> for HostValue {
    fn from(v: i32) -> Self {
        HostValue::Smi(v)
    }
}

impl From<f64> for HostValue {
    fn from(v: f64) -> Self {
        HostValue::from_number(v)
    }
}

impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Undefined => write!(f, "undefined"),
            HostValue::Null => write!(f, "null"),
            HostValue::Bool(b) => write!(f, "{b}"),
            HostValue::Smi(v) => write!(f, "{v}"),
            HostValue::HeapNumber(v) => write!(f, "{v}"),
            HostValue::String(s) => write!(f, "{s:?}"),
            HostValue::Object(_) => write!(f, "[object Object]"),
            HostValue::Function(function) => write!(f, "function {}()", function.name()),
        }
    }
}

fn string_to_number(s: &str) -> f64 {
    let s = s.trim();
    if s.is_empty() {
        return 0.0;
    }
    let radix = |prefix: &str, radix: u32| {
        s.strip_prefix(prefix)
            .map(|digits| u64::from_str_radix(digits, radix).map_or(f64::NAN, |v| v as f64))
    };
    if let Some(n) = radix("0x", 16).or_else(|| radix("0X", 16)) {
        return n;
    }
    if let Some(n) = radix("0o", 8).or_else(|| radix("0O", 8)) {
        return n;
    }
    if let Some(n) = radix("0b", 2).or_else(|| radix("0B", 2)) {
        return n;
    }
    match s {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    // Rust also accepts "inf" and "nan" spellings
    if s.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return f64::NAN;
    }
    s.parse::<f64>().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0.0, HostValue::Smi(0))]
    #[case(42.0, HostValue::Smi(42))]
    #[case(-2147483648.0, HostValue::Smi(i32::MIN))]
    #[case(2147483648.0, HostValue::HeapNumber(2147483648.0))]
    #[case(1.5, HostValue::HeapNumber(1.5))]
    fn test_from_number(#[case] n: f64, #[case] expected: HostValue) {
        let value = HostValue::from_number(n);
        assert_eq!(
            std::mem::discriminant(&value),
            std::mem::discriminant(&expected)
        );
        assert_eq!(value, expected);
    }

    #[test]
    fn test_negative_zero_is_heap_number() {
        assert!(matches!(HostValue::from_number(-0.0), HostValue::HeapNumber(_)));
        assert!(matches!(HostValue::from_number(f64::NAN), HostValue::HeapNumber(_)));
    }

    #[rstest]
    #[case(HostValue::Null, 0.0)]
    #[case(HostValue::Bool(true), 1.0)]
    #[case(HostValue::Smi(-3), -3.0)]
    #[case(HostValue::string("  12.5 "), 12.5)]
    #[case(HostValue::string(""), 0.0)]
    #[case(HostValue::string("0x1f"), 31.0)]
    #[case(HostValue::string("-Infinity"), f64::NEG_INFINITY)]
    #[case(HostValue::string("1e3"), 1000.0)]
    fn test_to_number(#[case] value: HostValue, #[case] expected: f64) {
        assert_eq!(value.to_number(), expected);
    }

    #[rstest]
    #[case(HostValue::Undefined)]
    #[case(HostValue::string("inf"))]
    #[case(HostValue::string("12px"))]
    #[case(HostValue::Object(HostObject::new()))]
    fn test_to_number_nan(#[case] value: HostValue) {
        assert!(value.to_number().is_nan());
    }

    #[test]
    fn test_call_non_function_is_type_error() {
        let err = HostValue::Smi(1).call(&[]).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::TypeError);
        assert_eq!(err.to_string(), "TypeError: number is not a function");
    }
}
