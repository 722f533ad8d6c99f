//! Operation semantics shared by the interpreter and compiled code
//!
//! Both execution paths delegate stack-only numeric operators and memory
//! accesses here so that they trap and round identically.

pub mod memory;
pub mod numeric;

use crate::parser::module::Origin;

/// How integer division and remainder by zero behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticMode {
    /// Division or remainder by zero traps
    Trapping,
    /// asm.js coercion: division or remainder by zero yields 0
    AsmJs,
}

impl ArithmeticMode {
    pub fn for_origin(origin: Origin) -> ArithmeticMode {
        match origin {
            Origin::Wasm => ArithmeticMode::Trapping,
            Origin::AsmJs => ArithmeticMode::AsmJs,
        }
    }
}
