//! Call frame
//!
//! Per-call interpreter state: the verified code being run, its program
//! counter, locals, and where its operands start on the shared stack.

use super::code::Code;
use super::Value;
use std::rc::Rc;

#[derive(Debug)]
pub struct CallFrame {
    pub function_index: u32,
    pub code: Rc<Code>,
    /// Index of the next op in `code.ops`
    pub pc: usize,
    /// Parameters followed by declared locals
    pub locals: Vec<Value>,
    /// Operand stack depth at entry
    pub stack_base: usize,
}

impl CallFrame {
    pub fn new(code: Rc<Code>, args: &[Value], stack_base: usize) -> CallFrame {
        CallFrame {
            function_index: code.function_index,
            locals: code.initial_locals(args),
            code,
            pc: 0,
            stack_base,
        }
    }
}
