//! Callable host functions

use super::{HostException, HostValue};
use std::fmt;
use std::rc::Rc;

/// Native implementation of a host function.
pub type HostCallback = dyn Fn(&[HostValue]) -> Result<HostValue, HostException>;

#[derive(Clone)]
pub struct HostFunction {
    name: Rc<str>,
    arity: usize,
    callback: Rc<HostCallback>,
}

impl HostFunction {
    pub fn new<F>(name: &str, arity: usize, callback: F) -> HostFunction
    where
        F: Fn(&[HostValue]) -> Result<HostValue, HostException> + 'static,
    {
        HostFunction {
            name: Rc::from(name),
            arity,
            callback: Rc::new(callback),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameter count. Calls may pass more or fewer arguments.
    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn call(&self, args: &[HostValue]) -> Result<HostValue, HostException> {
        (self.callback)(args)
    }

    pub fn ptr_eq(&self, other: &HostFunction) -> bool {
        Rc::ptr_eq(&self.callback, &other.callback)
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_passes_args() {
        let sum = HostFunction::new("sum", 2, |args| {
            Ok(HostValue::from_number(args.iter().map(HostValue::to_number).sum()))
        });
        assert_eq!(sum.name(), "sum");
        assert_eq!(sum.arity(), 2);
        assert_eq!(
            sum.call(&[HostValue::Smi(2), HostValue::HeapNumber(0.5)]),
            Ok(HostValue::HeapNumber(2.5))
        );
        assert_eq!(HostValue::Function(sum.clone()).call(&[]), Ok(HostValue::Smi(0)));
        assert!(sum.ptr_eq(&sum.clone()));
    }
}
