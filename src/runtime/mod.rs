//! Runtime shared by both execution paths
//!
//! Values, the operand stack, linear memory, operation semantics and the
//! frame-based [`interpreter`]. The compiled path in [`crate::compiler`]
//! reuses everything here except the interpreter loop.

pub mod code;
pub mod frame;
pub mod instance;
pub mod interpreter;
pub mod memory;
pub mod ops;
pub mod stack;
pub mod value;

pub use instance::{Instance, ModuleEnv};
pub use interpreter::{Interpreter, Thread, ThreadState};
pub use memory::LinearMemory;
pub use stack::Stack;
pub use value::Value;

use crate::parser::module::ValueType;

/// Why execution stopped abnormally.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrapReason {
    #[error("unreachable executed")]
    Unreachable,
    #[error("memory access out of bounds")]
    MemoryOutOfBounds,
    #[error("globals are not available")]
    GlobalsUnavailable,
    #[error("integer divide by zero")]
    DivideByZero,
    #[error("integer overflow")]
    IntegerOverflow,
    #[error("invalid conversion to integer")]
    InvalidConversion,
    #[error("call stack exhausted")]
    CallStackExhausted,
    #[error("callee failed verification: {0}")]
    CalleeVerification(String),
    #[error("cannot call imported function {0}")]
    ImportedFunction(u32),
    #[error("compiled code ran out of fuel")]
    OutOfFuel,
    // unreachable after verification
    #[error("stack underflow")]
    StackUnderflow,
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: ValueType, actual: ValueType },
    #[error("invalid local index {0}")]
    InvalidLocal(u32),
    #[error("invalid global index {0}")]
    InvalidGlobal(u32),
}
