//! Translation of verified ops into closures
//!
//! Each [`Op`] becomes one boxed closure over an [`Activation`]. Closures
//! never call other functions themselves; a call is reported back to the
//! driver in [`super::store`] as [`Flow::Call`].

use super::store::Store;
use crate::runtime::code::{BranchTarget, Op};
use crate::runtime::ops::{self, ArithmeticMode};
use crate::runtime::{Stack, TrapReason, Value};

/// What the driver does after an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Next,
    Jump(usize),
    Return,
    Call(u32),
}

/// State of one compiled function invocation.
pub struct Activation<'s> {
    /// Operands of this invocation only, so branch heights are absolute
    pub stack: Stack,
    pub locals: Vec<Value>,
    pub store: &'s Store,
}

pub type Action = Box<dyn Fn(&mut Activation<'_>) -> Result<Flow, TrapReason>>;

fn branch(activation: &mut Activation<'_>, target: &BranchTarget) -> Result<Flow, TrapReason> {
    activation.stack.unwind(target.height, target.arity)?;
    Ok(Flow::Jump(target.pc))
}

fn local<'a>(activation: &'a mut Activation<'_>, index: u32) -> Result<&'a mut Value, TrapReason> {
    activation
        .locals
        .get_mut(index as usize)
        .ok_or(TrapReason::InvalidLocal(index))
}

/// Boxes a closure, fixing its signature to the one [`Action`] needs.
fn action<F>(f: F) -> Action
where
    F: Fn(&mut Activation<'_>) -> Result<Flow, TrapReason> + 'static,
{
    Box::new(f)
}

pub fn translate(op: &Op, mode: ArithmeticMode) -> Action {
    match op.clone() {
        Op::Unreachable => action(|_| Err(TrapReason::Unreachable)),
        Op::Nop => action(|_| Ok(Flow::Next)),
        Op::Br(target) => action(move |a| branch(a, &target)),
        Op::BrIf(target) => action(move |a| {
            if a.stack.pop_i32()? != 0 {
                branch(a, &target)
            } else {
                Ok(Flow::Next)
            }
        }),
        Op::BrTable { targets, default } => action(move |a| {
            let index = a.stack.pop_i32()? as u32 as usize;
            branch(a, targets.get(index).unwrap_or(&default))
        }),
        Op::BrUnless(pc) => action(move |a| {
            if a.stack.pop_i32()? == 0 {
                Ok(Flow::Jump(pc))
            } else {
                Ok(Flow::Next)
            }
        }),
        Op::Jump(pc) => action(move |_| Ok(Flow::Jump(pc))),
        Op::Return => action(|_| Ok(Flow::Return)),
        Op::Call(function_index) => action(move |_| Ok(Flow::Call(function_index))),
        Op::Drop => action(|a| {
            a.stack.pop()?;
            Ok(Flow::Next)
        }),
        Op::Select => action(|a| {
            let condition = a.stack.pop_i32()?;
            let b = a.stack.pop()?;
            let v = a.stack.pop()?;
            a.stack.push(if condition != 0 { v } else { b });
            Ok(Flow::Next)
        }),
        Op::LocalGet(index) => action(move |a| {
            let value = *local(a, index)?;
            a.stack.push(value);
            Ok(Flow::Next)
        }),
        Op::LocalSet(index) => action(move |a| {
            let value = a.stack.pop()?;
            *local(a, index)? = value;
            Ok(Flow::Next)
        }),
        Op::LocalTee(index) => action(move |a| {
            let value = *a.stack.peek().ok_or(TrapReason::StackUnderflow)?;
            *local(a, index)? = value;
            Ok(Flow::Next)
        }),
        Op::GlobalGet(index) => action(move |a| {
            let value = a.store.global_get(index)?;
            a.stack.push(value);
            Ok(Flow::Next)
        }),
        Op::GlobalSet(index) => action(move |a| {
            let value = a.stack.pop()?;
            a.store.global_set(index, value)?;
            Ok(Flow::Next)
        }),
        Op::Load(op, offset) => action(move |a| {
            let memory = a.store.memory.borrow();
            ops::memory::execute_load(&memory, &mut a.stack, op, offset)?;
            Ok(Flow::Next)
        }),
        Op::Store(op, offset) => action(move |a| {
            let mut memory = a.store.memory.borrow_mut();
            ops::memory::execute_store(&mut memory, &mut a.stack, op, offset)?;
            Ok(Flow::Next)
        }),
        Op::MemorySize => action(|a| {
            let pages = a.store.memory.borrow().pages();
            a.stack.push(Value::I32(pages as i32));
            Ok(Flow::Next)
        }),
        Op::MemoryGrow => action(|a| {
            let delta = a.stack.pop_i32()?;
            let previous = a.store.memory.borrow_mut().grow(delta as u32);
            a.stack.push(Value::I32(previous));
            Ok(Flow::Next)
        }),
        Op::Const(value) => action(move |a| {
            a.stack.push(value);
            Ok(Flow::Next)
        }),
        Op::Numeric(op) => action(move |a| {
            ops::numeric::execute(op, mode, &mut a.stack)?;
            Ok(Flow::Next)
        }),
    }
}
