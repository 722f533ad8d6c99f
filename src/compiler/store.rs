//! Runtime store of a compiled instance and the call driver
//!
//! The store owns real linear memory and globals, shared with the exported
//! host functions through `Rc`. [`Store::call`] runs a function's actions on
//! an explicit frame stack with a bounded depth and optional fuel.

use super::closure::{Action, Activation, Flow};
use super::ExecutionLimits;
use crate::host::{HostException, HostFunction, HostValue};
use crate::parser::module::{FunctionType, ValueType};
use crate::runtime::code::Code;
use crate::runtime::{LinearMemory, Stack, TrapReason, Value};
use log::trace;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// A function body translated to closures.
pub struct CompiledFunction {
    pub code: Code,
    pub actions: Vec<Action>,
}

pub enum Callable {
    Compiled(Rc<CompiledFunction>),
    Host { function: HostFunction, sig: FunctionType },
}

impl Callable {
    fn param_count(&self) -> usize {
        match self {
            Callable::Compiled(function) => function.code.params.len(),
            Callable::Host { sig, .. } => sig.parameters.len(),
        }
    }
}

/// Why a call did not return normally.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CallError {
    #[error(transparent)]
    Trap(#[from] TrapReason),
    #[error(transparent)]
    Exception(#[from] HostException),
}

impl CallError {
    /// The exception a host caller observes.
    pub fn into_exception(self) -> HostException {
        match self {
            CallError::Trap(TrapReason::CallStackExhausted) => {
                HostException::range_error("Maximum call stack size exceeded")
            }
            CallError::Trap(reason) => HostException::runtime_error(reason.to_string()),
            CallError::Exception(exception) => exception,
        }
    }
}

pub struct Store {
    functions: Vec<Callable>,
    pub memory: RefCell<LinearMemory>,
    globals: RefCell<Vec<Value>>,
    limits: ExecutionLimits,
    depth: Cell<usize>,
    fuel: Cell<Option<u64>>,
}

impl Store {
    pub fn new(
        functions: Vec<Callable>,
        memory: LinearMemory,
        globals: Vec<Value>,
        limits: ExecutionLimits,
    ) -> Store {
        Store {
            functions,
            memory: RefCell::new(memory),
            globals: RefCell::new(globals),
            limits,
            depth: Cell::new(0),
            fuel: Cell::new(limits.fuel),
        }
    }

    pub fn global_get(&self, index: u32) -> Result<Value, TrapReason> {
        self.globals
            .borrow()
            .get(index as usize)
            .copied()
            .ok_or(TrapReason::InvalidGlobal(index))
    }

    pub fn global_set(&self, index: u32, value: Value) -> Result<(), TrapReason> {
        let mut globals = self.globals.borrow_mut();
        let slot = globals
            .get_mut(index as usize)
            .ok_or(TrapReason::InvalidGlobal(index))?;
        *slot = value;
        Ok(())
    }

    pub fn signature(&self, function_index: u32) -> Option<FunctionType> {
        match self.functions.get(function_index as usize)? {
            Callable::Compiled(function) => Some(FunctionType::new(
                function.code.params.clone(),
                function.code.result.into_iter().collect(),
            )),
            Callable::Host { sig, .. } => Some(sig.clone()),
        }
    }

    fn consume_fuel(&self) -> Result<(), TrapReason> {
        match self.fuel.get() {
            None => Ok(()),
            Some(0) => Err(TrapReason::OutOfFuel),
            Some(n) => {
                self.fuel.set(Some(n - 1));
                Ok(())
            }
        }
    }

    /// Calls a function from outside compiled code. The fuel bound restarts
    /// unless the store is already running.
    pub fn call(&self, function_index: u32, args: Vec<Value>) -> Result<Option<Value>, CallError> {
        if self.depth.get() == 0 {
            self.fuel.set(self.limits.fuel);
        }
        self.invoke(function_index, args)
    }

    fn invoke(&self, function_index: u32, args: Vec<Value>) -> Result<Option<Value>, CallError> {
        let depth = self.depth.get();
        let result = self.run(function_index, args);
        self.depth.set(depth);
        result
    }

    /// Enters a function: compiled functions get a frame, host functions
    /// run to completion.
    fn enter(&self, function_index: u32, args: Vec<Value>) -> Result<Entry<'_>, CallError> {
        let depth = self.depth.get();
        if depth >= self.limits.max_call_depth {
            return Err(TrapReason::CallStackExhausted.into());
        }
        let callable = self
            .functions
            .get(function_index as usize)
            .ok_or_else(|| {
                TrapReason::CalleeVerification(format!("unknown function {function_index}"))
            })?;

        trace!("enter function {function_index} at depth {depth}");
        self.depth.set(depth + 1);
        match callable {
            Callable::Compiled(function) => Ok(Entry::Frame(Frame {
                activation: Activation {
                    stack: Stack::new(),
                    locals: function.code.initial_locals(&args),
                    store: self,
                },
                function: Rc::clone(function),
                pc: 0,
            })),
            Callable::Host { function, sig } => {
                let result = call_host(function, sig, &args);
                self.depth.set(depth);
                Ok(Entry::Done(result?))
            }
        }
    }

    fn leave(&self, frame: Frame<'_>) -> Result<Option<Value>, CallError> {
        self.depth.set(self.depth.get().saturating_sub(1));
        let Frame { function, activation, .. } = frame;
        let mut stack = activation.stack;
        match function.code.result {
            Some(t) => Ok(Some(stack.pop_typed(t)?)),
            None => Ok(None),
        }
    }

    /// Runs compiled calls from a heap-allocated frame stack, so call depth
    /// is bounded by `max_call_depth` alone.
    fn run(&self, function_index: u32, args: Vec<Value>) -> Result<Option<Value>, CallError> {
        let mut frames = match self.enter(function_index, args)? {
            Entry::Frame(frame) => vec![frame],
            Entry::Done(value) => return Ok(value),
        };

        while let Some(frame) = frames.last_mut() {
            let flow = match frame.function.actions.get(frame.pc) {
                Some(action) => {
                    self.consume_fuel()?;
                    action(&mut frame.activation)?
                }
                None => Flow::Return,
            };
            match flow {
                Flow::Next => frame.pc += 1,
                Flow::Jump(target) => frame.pc = target,
                Flow::Call(callee) => {
                    let arity = self
                        .functions
                        .get(callee as usize)
                        .map_or(0, Callable::param_count);
                    let args = frame.activation.stack.pop_n(arity)?;
                    frame.pc += 1;
                    match self.enter(callee, args)? {
                        Entry::Frame(next) => frames.push(next),
                        Entry::Done(Some(value)) => frame.activation.stack.push(value),
                        Entry::Done(None) => {}
                    }
                }
                Flow::Return => {
                    let Some(finished) = frames.pop() else {
                        break;
                    };
                    let value = self.leave(finished)?;
                    match frames.last_mut() {
                        Some(caller) => {
                            if let Some(value) = value {
                                caller.activation.stack.push(value);
                            }
                        }
                        None => return Ok(value),
                    }
                }
            }
        }
        Ok(None)
    }
}

struct Frame<'s> {
    function: Rc<CompiledFunction>,
    activation: Activation<'s>,
    /// Index of the next action
    pc: usize,
}

enum Entry<'s> {
    Frame(Frame<'s>),
    Done(Option<Value>),
}

fn incompatible() -> HostException {
    HostException::type_error("type incompatibility when transforming from/to JS")
}

fn has_i64(sig: &FunctionType) -> bool {
    sig.parameters
        .iter()
        .chain(sig.return_types.iter())
        .any(|t| *t == ValueType::I64)
}

/// Number to 32-bit integer with wrap-around, 0 for NaN and infinities.
pub fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    n.trunc().rem_euclid(4_294_967_296.0) as u32 as i32
}

pub fn to_wasm_value(value: &HostValue, t: ValueType) -> Result<Value, HostException> {
    let n = value.to_number();
    match t {
        ValueType::I32 => Ok(Value::I32(to_int32(n))),
        ValueType::F32 => Ok(Value::F32(n as f32)),
        ValueType::F64 => Ok(Value::F64(n)),
        ValueType::I64 => Err(incompatible()),
    }
}

pub fn to_host_value(value: Value) -> Result<HostValue, HostException> {
    match value {
        Value::I32(v) => Ok(HostValue::Smi(v)),
        Value::F32(v) => Ok(HostValue::from_number(v as f64)),
        Value::F64(v) => Ok(HostValue::from_number(v)),
        Value::I64(_) => Err(incompatible()),
    }
}

fn call_host(
    function: &HostFunction,
    sig: &FunctionType,
    args: &[Value],
) -> Result<Option<Value>, CallError> {
    if has_i64(sig) {
        return Err(incompatible().into());
    }
    let host_args = args
        .iter()
        .map(|v| to_host_value(*v))
        .collect::<Result<Vec<_>, _>>()?;
    let result = function.call(&host_args)?;
    match sig.result() {
        Some(t) => Ok(Some(to_wasm_value(&result, t)?)),
        None => Ok(None),
    }
}

/// Wraps an exported function for host callers.
///
/// Missing arguments are `undefined`, extra ones are ignored. Signatures
/// mentioning i64 raise a `TypeError` on every call.
pub fn export_function(store: &Rc<Store>, function_index: u32, name: &str) -> Option<HostFunction> {
    let sig = store.signature(function_index)?;
    let store = Rc::clone(store);
    let arity = sig.parameters.len();
    Some(HostFunction::new(name, arity, move |args| {
        if has_i64(&sig) {
            return Err(incompatible());
        }
        let values = sig
            .parameters
            .iter()
            .enumerate()
            .map(|(i, t)| to_wasm_value(args.get(i).unwrap_or(&HostValue::Undefined), *t))
            .collect::<Result<Vec<_>, _>>()?;
        match store.call(function_index, values) {
            Ok(Some(value)) => to_host_value(value),
            Ok(None) => Ok(HostValue::Undefined),
            Err(e) => Err(e.into_exception()),
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0.0, 0)]
    #[case(-1.9, -1)]
    #[case(4294967297.0, 1)]
    #[case(2147483648.0, i32::MIN)]
    #[case(f64::NAN, 0)]
    #[case(f64::INFINITY, 0)]
    fn test_to_int32(#[case] n: f64, #[case] expected: i32) {
        assert_eq!(to_int32(n), expected);
    }

    #[test]
    fn test_marshal_values() {
        assert_eq!(to_wasm_value(&HostValue::string("7"), ValueType::I32), Ok(Value::I32(7)));
        assert_eq!(to_wasm_value(&HostValue::Undefined, ValueType::I32), Ok(Value::I32(0)));
        assert!(matches!(
            to_wasm_value(&HostValue::Undefined, ValueType::F64),
            Ok(Value::F64(n)) if n.is_nan()
        ));
        assert!(to_wasm_value(&HostValue::Smi(1), ValueType::I64).is_err());
        assert_eq!(to_host_value(Value::F64(3.0)), Ok(HostValue::Smi(3)));
        assert_eq!(
            to_host_value(Value::I64(3)).unwrap_err().kind,
            crate::host::ExceptionKind::TypeError
        );
    }

    #[test]
    fn test_trap_exceptions() {
        let e = CallError::from(TrapReason::CallStackExhausted).into_exception();
        assert_eq!(e.kind, crate::host::ExceptionKind::RangeError);
        let e = CallError::from(TrapReason::Unreachable).into_exception();
        assert_eq!(e.kind, crate::host::ExceptionKind::RuntimeError);
        assert_eq!(e.message, "unreachable executed");
    }
}
