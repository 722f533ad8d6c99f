//! Operand stack shared by the interpreter and compiled code

use super::{TrapReason, Value};
use crate::parser::module::ValueType;

#[derive(Debug, Default)]
pub struct Stack {
    values: Vec<Value>,
}

macro_rules! typed_pop {
    ($name:ident, $variant:ident, $t:ty) => {
        pub fn $name(&mut self) -> Result<$t, TrapReason> {
            match self.pop()? {
                Value::$variant(v) => Ok(v),
                other => Err(TrapReason::TypeMismatch {
                    expected: ValueType::$variant,
                    actual: other.typ(),
                }),
            }
        }
    };
}

impl Stack {
    pub fn new() -> Self {
        Stack { values: Vec::new() }
    }

    pub fn push(&mut self, value: Value) {
        self.values.push(value);
    }

    pub fn pop(&mut self) -> Result<Value, TrapReason> {
        self.values.pop().ok_or(TrapReason::StackUnderflow)
    }

    /// Pop a value and check its type
    pub fn pop_typed(&mut self, expected: ValueType) -> Result<Value, TrapReason> {
        let value = self.pop()?;
        if value.typ() != expected {
            return Err(TrapReason::TypeMismatch {
                expected,
                actual: value.typ(),
            });
        }
        Ok(value)
    }

    typed_pop!(pop_i32, I32, i32);
    typed_pop!(pop_i64, I64, i64);
    typed_pop!(pop_f32, F32, f32);
    typed_pop!(pop_f64, F64, f64);

    /// Removes the top `count` values, bottom first.
    pub fn pop_n(&mut self, count: usize) -> Result<Vec<Value>, TrapReason> {
        if count > self.values.len() {
            return Err(TrapReason::StackUnderflow);
        }
        Ok(self.values.split_off(self.values.len() - count))
    }

    /// Drops everything between `height` and the top `keep` values.
    pub fn unwind(&mut self, height: usize, keep: usize) -> Result<(), TrapReason> {
        let len = self.values.len();
        if height + keep > len {
            return Err(TrapReason::StackUnderflow);
        }
        self.values.drain(height..len - keep);
        Ok(())
    }

    pub fn truncate(&mut self, height: usize) {
        self.values.truncate(height);
    }

    pub fn depth(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn peek(&self) -> Option<&Value> {
        self.values.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop() {
        let mut stack = Stack::new();

        stack.push(Value::I32(42));
        stack.push(Value::I64(100));

        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.pop().unwrap(), Value::I64(100));
        assert_eq!(stack.pop().unwrap(), Value::I32(42));
        assert_eq!(stack.pop(), Err(TrapReason::StackUnderflow));
    }

    #[test]
    fn test_typed_pops() {
        let mut stack = Stack::new();

        stack.push(Value::I32(42));
        assert_eq!(stack.pop_i32().unwrap(), 42);
        stack.push(Value::F64(2.5));
        assert_eq!(stack.pop_f64().unwrap(), 2.5);

        stack.push(Value::I32(42));
        assert_eq!(
            stack.pop_i64(),
            Err(TrapReason::TypeMismatch {
                expected: ValueType::I64,
                actual: ValueType::I32
            })
        );
        stack.push(Value::F32(1.0));
        assert!(stack.pop_typed(ValueType::F64).is_err());
    }

    #[test]
    fn test_pop_n() {
        let mut stack = Stack::new();
        for i in 1..=4 {
            stack.push(Value::I32(i));
        }
        assert_eq!(stack.pop_n(2).unwrap(), vec![Value::I32(3), Value::I32(4)]);
        assert_eq!(stack.depth(), 2);
        assert!(stack.pop_n(3).is_err());
        assert_eq!(stack.pop_n(0).unwrap(), vec![]);
    }

    #[test]
    fn test_unwind_keeps_top_values() {
        let mut stack = Stack::new();
        for i in 1..=5 {
            stack.push(Value::I32(i));
        }
        stack.unwind(1, 1).unwrap();
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.pop_i32().unwrap(), 5);
        assert_eq!(stack.pop_i32().unwrap(), 1);

        stack.push(Value::I32(9));
        assert!(stack.unwind(1, 1).is_err());
        stack.unwind(0, 0).unwrap();
        assert!(stack.is_empty());
    }
}
