//! Verified, flattened function code
//!
//! The verifier lowers structured control flow into a flat [`Op`] sequence
//! whose branches carry resolved [`BranchTarget`]s. Both execution paths run
//! from this form: the interpreter steps it directly and the compiler turns
//! each op into a closure.

use super::Value;
use crate::parser::instruction::{LoadOp, NumericOp, StoreOp};
use crate::parser::module::ValueType;
use std::fmt;

/// Where a taken branch lands and what it keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchTarget {
    /// Op index to continue at
    pub pc: usize,
    /// Operand stack height (relative to the frame) of the target label
    pub height: usize,
    /// Number of values carried across the branch
    pub arity: usize,
}

impl fmt::Display for BranchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{} h={} a={}", self.pc, self.height, self.arity)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Unreachable,
    Nop,
    Br(BranchTarget),
    BrIf(BranchTarget),
    BrTable {
        targets: Box<[BranchTarget]>,
        default: BranchTarget,
    },
    /// Pops an i32 and jumps when it is zero (the entry of an `if`)
    BrUnless(usize),
    /// Unconditional jump that keeps the stack (the end of a then-arm)
    Jump(usize),
    Return,
    Call(u32),
    Drop,
    Select,
    LocalGet(u32),
    LocalSet(u32),
    LocalTee(u32),
    GlobalGet(u32),
    GlobalSet(u32),
    Load(LoadOp, u32),
    Store(StoreOp, u32),
    MemorySize,
    MemoryGrow,
    Const(Value),
    Numeric(NumericOp),
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Unreachable => write!(f, "unreachable"),
            Op::Nop => write!(f, "nop"),
            Op::Br(target) => write!(f, "br {target}"),
            Op::BrIf(target) => write!(f, "br_if {target}"),
            Op::BrTable { targets, default } => {
                write!(f, "br_table")?;
                for target in targets.iter() {
                    write!(f, " [{target}]")?;
                }
                write!(f, " default [{default}]")
            }
            Op::BrUnless(pc) => write!(f, "br_unless @{pc}"),
            Op::Jump(pc) => write!(f, "jump @{pc}"),
            Op::Return => write!(f, "return"),
            Op::Call(idx) => write!(f, "call {idx}"),
            Op::Drop => write!(f, "drop"),
            Op::Select => write!(f, "select"),
            Op::LocalGet(idx) => write!(f, "local.get {idx}"),
            Op::LocalSet(idx) => write!(f, "local.set {idx}"),
            Op::LocalTee(idx) => write!(f, "local.tee {idx}"),
            Op::GlobalGet(idx) => write!(f, "global.get {idx}"),
            Op::GlobalSet(idx) => write!(f, "global.set {idx}"),
            Op::Load(op, offset) => write!(f, "{} offset={offset}", op.name()),
            Op::Store(op, offset) => write!(f, "{} offset={offset}", op.name()),
            Op::MemorySize => write!(f, "memory.size"),
            Op::MemoryGrow => write!(f, "memory.grow"),
            Op::Const(value) => write!(f, "const {value}"),
            Op::Numeric(op) => write!(f, "{}", op.name()),
        }
    }
}

/// The verified form of one function body.
#[derive(Debug, Clone, PartialEq)]
pub struct Code {
    pub function_index: u32,
    pub params: Vec<ValueType>,
    pub result: Option<ValueType>,
    /// Declared locals, excluding parameters
    pub locals: Vec<ValueType>,
    pub ops: Vec<Op>,
}

impl Code {
    /// Parameters plus declared locals.
    pub fn local_count(&self) -> usize {
        self.params.len() + self.locals.len()
    }

    /// Fresh locals for a call: the arguments followed by zeroed declared locals.
    pub fn initial_locals(&self, args: &[Value]) -> Vec<Value> {
        let mut locals = Vec::with_capacity(self.local_count());
        locals.extend_from_slice(args);
        locals.extend(self.locals.iter().map(|t| Value::default_for(*t)));
        locals
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "func[{}]", self.function_index)?;
        for (pc, op) in self.ops.iter().enumerate() {
            writeln!(f, "  {pc:4}: {op}")?;
        }
        Ok(())
    }
}
