//! Frame-based interpreter
//!
//! An [`Interpreter`] owns an [`Instance`] and exactly one [`Thread`]. A run
//! pushes a frame for the target function and steps verified [`Code`] until
//! the outermost frame returns, a trap occurs or the step budget runs out.
//! Callees are verified the first time they are called and cached.

use super::code::{BranchTarget, Code, Op};
use super::frame::CallFrame;
use super::ops::{self, ArithmeticMode};
use super::{Instance, ModuleEnv, Stack, TrapReason, Value};
use crate::parser::module::ValueType;
use crate::parser::validate::{verify_function, FunctionBody, VerificationError};
use log::{debug, trace};
use std::rc::Rc;

pub const DEFAULT_STEP_BUDGET: u64 = 1_000_000;
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1024;

/// Verifies a function body into executable [`Code`].
pub type Verifier<'a> =
    dyn Fn(&ModuleEnv<'_>, &FunctionBody<'_>) -> Result<Code, VerificationError> + 'a;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Ready,
    Running,
    Finished,
    Trapped,
    /// The step budget ran out before the outermost frame returned
    Paused,
}

/// Why a frame could not be pushed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameError {
    #[error("function {function_index} takes {expected} arguments, got {actual}")]
    ArgumentCount {
        function_index: u32,
        expected: usize,
        actual: usize,
    },
    #[error("argument {index} of function {function_index}: expected {expected}, got {actual}")]
    ArgumentType {
        function_index: u32,
        index: usize,
        expected: ValueType,
        actual: ValueType,
    },
    #[error("cannot interpret imported function {0}")]
    Imported(u32),
    #[error(transparent)]
    Verification(#[from] VerificationError),
}

/// The single thread of execution: operand stack, frames and outcome.
#[derive(Debug)]
pub struct Thread {
    state: ThreadState,
    stack: Stack,
    frames: Vec<CallFrame>,
    result: Option<Value>,
    trap: Option<TrapReason>,
    steps: u64,
}

impl Default for Thread {
    fn default() -> Self {
        Thread::new()
    }
}

impl Thread {
    pub fn new() -> Thread {
        Thread {
            state: ThreadState::Ready,
            stack: Stack::new(),
            frames: Vec::new(),
            result: None,
            trap: None,
            steps: 0,
        }
    }

    /// Clears frames, operands and any previous outcome.
    pub fn reset(&mut self) {
        self.state = ThreadState::Ready;
        self.stack.clear();
        self.frames.clear();
        self.result = None;
        self.trap = None;
        self.steps = 0;
    }

    pub fn state(&self) -> ThreadState {
        self.state
    }

    /// The value the outermost frame returned, if it returned one.
    pub fn result(&self) -> Option<Value> {
        self.result
    }

    pub fn trap_reason(&self) -> Option<&TrapReason> {
        self.trap.as_ref()
    }

    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    /// Steps executed since the last reset, across runs.
    pub fn steps(&self) -> u64 {
        self.steps
    }
}

enum Step {
    Continue,
    Finished(Option<Value>),
}

pub struct Interpreter<'a> {
    instance: Instance<'a>,
    thread: Thread,
    code: Vec<Option<Rc<Code>>>,
    mode: ArithmeticMode,
    step_budget: u64,
    max_call_depth: usize,
    verifier: Box<Verifier<'a>>,
}

impl<'a> Interpreter<'a> {
    pub fn new(instance: Instance<'a>) -> Interpreter<'a> {
        let function_count = instance.module().functions.len();
        Interpreter {
            mode: instance.env.arithmetic_mode(),
            instance,
            thread: Thread::new(),
            code: vec![None; function_count],
            step_budget: DEFAULT_STEP_BUDGET,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            verifier: Box::new(verify_function),
        }
    }

    pub fn with_step_budget(mut self, step_budget: u64) -> Self {
        self.step_budget = step_budget;
        self
    }

    pub fn with_max_call_depth(mut self, max_call_depth: usize) -> Self {
        self.max_call_depth = max_call_depth.max(1);
        self
    }

    /// Replaces the verifier applied to callees on their first call.
    pub fn with_verifier<F>(mut self, verifier: F) -> Self
    where
        F: Fn(&ModuleEnv<'_>, &FunctionBody<'_>) -> Result<Code, VerificationError> + 'a,
    {
        self.verifier = Box::new(verifier);
        self
    }

    pub fn thread(&self) -> &Thread {
        &self.thread
    }

    pub fn instance(&self) -> &Instance<'a> {
        &self.instance
    }

    /// Supplies already verified code so it is not verified again on use.
    pub fn install_code(&mut self, code: Code) -> Rc<Code> {
        let index = code.function_index as usize;
        let code = Rc::new(code);
        if let Some(slot) = self.code.get_mut(index) {
            *slot = Some(Rc::clone(&code));
        }
        code
    }

    pub fn reset(&mut self) {
        self.thread.reset();
    }

    /// Pushes a frame calling `function_index` with `args`.
    ///
    /// # Panics
    /// If `function_index` is not a function of the module.
    pub fn push_frame(&mut self, function_index: u32, args: &[Value]) -> Result<(), FrameError> {
        assert!(
            (function_index as usize) < self.code.len(),
            "function index {function_index} out of range"
        );
        let code = match &self.code[function_index as usize] {
            Some(code) => Rc::clone(code),
            None => self.verify(function_index)?,
        };

        if args.len() != code.params.len() {
            return Err(FrameError::ArgumentCount {
                function_index,
                expected: code.params.len(),
                actual: args.len(),
            });
        }
        for (index, (arg, expected)) in args.iter().zip(code.params.iter()).enumerate() {
            if arg.typ() != *expected {
                return Err(FrameError::ArgumentType {
                    function_index,
                    index,
                    expected: *expected,
                    actual: arg.typ(),
                });
            }
        }

        trace!("push frame for function {function_index} with {} args", args.len());
        let frame = CallFrame::new(code, args, self.thread.stack.depth());
        self.thread.frames.push(frame);
        Ok(())
    }

    /// Steps the thread until it finishes, traps or uses up this run's budget.
    ///
    /// Each call starts with a fresh budget, so a `Paused` thread can be
    /// resumed by running it again.
    pub fn run(&mut self) -> ThreadState {
        match self.thread.state {
            ThreadState::Ready | ThreadState::Paused => {}
            state => return state,
        }
        if self.thread.frames.is_empty() {
            return self.thread.state;
        }

        self.thread.state = ThreadState::Running;
        let mut fuel = self.step_budget;
        loop {
            if fuel == 0 {
                debug!("paused after {} steps", self.thread.steps);
                self.thread.state = ThreadState::Paused;
                break;
            }
            fuel -= 1;
            self.thread.steps += 1;

            match self.step() {
                Ok(Step::Continue) => {}
                Ok(Step::Finished(result)) => {
                    debug!("finished after {} steps", self.thread.steps);
                    self.thread.result = result;
                    self.thread.state = ThreadState::Finished;
                    break;
                }
                Err(reason) => {
                    debug!("trapped after {} steps: {reason}", self.thread.steps);
                    self.thread.trap = Some(reason);
                    self.thread.state = ThreadState::Trapped;
                    break;
                }
            }
        }
        self.thread.state
    }

    fn verify(&mut self, function_index: u32) -> Result<Rc<Code>, FrameError> {
        let module = self.instance.module();
        let function = &module.functions[function_index as usize];
        if function.imported {
            return Err(FrameError::Imported(function_index));
        }
        let body = FunctionBody::of(module, function_index)
            .ok_or(FrameError::Imported(function_index))?;
        trace!("verifying function {function_index}");
        let code = (self.verifier)(&self.instance.env, &body)?;
        Ok(self.install_code(code))
    }

    fn callee(&mut self, function_index: u32) -> Result<Rc<Code>, TrapReason> {
        if let Some(Some(code)) = self.code.get(function_index as usize) {
            return Ok(Rc::clone(code));
        }
        match self.verify(function_index) {
            Ok(code) => Ok(code),
            Err(FrameError::Imported(index)) => Err(TrapReason::ImportedFunction(index)),
            Err(e) => Err(TrapReason::CalleeVerification(e.to_string())),
        }
    }

    fn step(&mut self) -> Result<Step, TrapReason> {
        let Some(frame) = self.thread.frames.last_mut() else {
            return Ok(Step::Finished(None));
        };
        let code = Rc::clone(&frame.code);
        let Some(op) = code.ops.get(frame.pc) else {
            return self.do_return();
        };
        frame.pc += 1;

        let stack = &mut self.thread.stack;
        match op {
            Op::Unreachable => return Err(TrapReason::Unreachable),
            Op::Nop => {}
            Op::Br(target) => self.branch(target)?,
            Op::BrIf(target) => {
                if stack.pop_i32()? != 0 {
                    self.branch(target)?;
                }
            }
            Op::BrTable { targets, default } => {
                let index = stack.pop_i32()? as u32 as usize;
                self.branch(targets.get(index).unwrap_or(default))?;
            }
            Op::BrUnless(pc) => {
                if stack.pop_i32()? == 0 {
                    self.jump(*pc);
                }
            }
            Op::Jump(pc) => self.jump(*pc),
            Op::Return => return self.do_return(),
            Op::Call(function_index) => self.call(*function_index)?,
            Op::Drop => {
                stack.pop()?;
            }
            Op::Select => {
                let condition = stack.pop_i32()?;
                let b = stack.pop()?;
                let a = stack.pop()?;
                stack.push(if condition != 0 { a } else { b });
            }
            Op::LocalGet(index) => {
                let value = self.local(*index)?;
                self.thread.stack.push(value);
            }
            Op::LocalSet(index) => {
                let value = stack.pop()?;
                *self.local_mut(*index)? = value;
            }
            Op::LocalTee(index) => {
                let value = *stack.peek().ok_or(TrapReason::StackUnderflow)?;
                *self.local_mut(*index)? = value;
            }
            Op::GlobalGet(index) => {
                let value = self.instance.global_get(*index)?;
                self.thread.stack.push(value);
            }
            Op::GlobalSet(index) => {
                let value = stack.pop()?;
                self.instance.global_set(*index, value)?;
            }
            Op::Load(op, offset) => {
                ops::memory::execute_load(&self.instance.memory, stack, *op, *offset)?
            }
            Op::Store(op, offset) => {
                ops::memory::execute_store(&mut self.instance.memory, stack, *op, *offset)?
            }
            Op::MemorySize => stack.push(Value::I32(self.instance.memory.pages() as i32)),
            Op::MemoryGrow => {
                let delta = stack.pop_i32()?;
                stack.push(Value::I32(self.instance.memory.grow(delta as u32)));
            }
            Op::Const(value) => stack.push(*value),
            Op::Numeric(op) => ops::numeric::execute(*op, self.mode, stack)?,
        }
        Ok(Step::Continue)
    }

    fn current_frame(&mut self) -> Result<&mut CallFrame, TrapReason> {
        self.thread.frames.last_mut().ok_or(TrapReason::StackUnderflow)
    }

    fn local(&mut self, index: u32) -> Result<Value, TrapReason> {
        let frame = self.current_frame()?;
        frame.locals.get(index as usize).copied().ok_or(TrapReason::InvalidLocal(index))
    }

    fn local_mut(&mut self, index: u32) -> Result<&mut Value, TrapReason> {
        let frame = self.current_frame()?;
        frame.locals.get_mut(index as usize).ok_or(TrapReason::InvalidLocal(index))
    }

    fn jump(&mut self, pc: usize) {
        if let Some(frame) = self.thread.frames.last_mut() {
            frame.pc = pc;
        }
    }

    fn branch(&mut self, target: &BranchTarget) -> Result<(), TrapReason> {
        let frame = self.thread.frames.last_mut().ok_or(TrapReason::StackUnderflow)?;
        frame.pc = target.pc;
        let height = frame.stack_base + target.height;
        self.thread.stack.unwind(height, target.arity)
    }

    fn call(&mut self, function_index: u32) -> Result<(), TrapReason> {
        if self.thread.frames.len() >= self.max_call_depth {
            return Err(TrapReason::CallStackExhausted);
        }
        let code = self.callee(function_index)?;
        let args = self.thread.stack.pop_n(code.params.len())?;
        trace!("call function {function_index} at depth {}", self.thread.frames.len());
        let frame = CallFrame::new(code, &args, self.thread.stack.depth());
        self.thread.frames.push(frame);
        Ok(())
    }

    fn do_return(&mut self) -> Result<Step, TrapReason> {
        let frame = self.thread.frames.pop().ok_or(TrapReason::StackUnderflow)?;
        let result = match frame.code.result {
            Some(t) => Some(self.thread.stack.pop_typed(t)?),
            None => None,
        };
        self.thread.stack.truncate(frame.stack_base);

        if self.thread.frames.is_empty() {
            return Ok(Step::Finished(result));
        }
        if let Some(value) = result {
            self.thread.stack.push(value);
        }
        Ok(Step::Continue)
    }
}
