use super::instruction::{Instruction, MemArg};
use super::module::{FunctionType, Module, ValueType, ValueType::*};
use super::reader::Reader;
use super::{read_value_type, DecodeError, DecodeErrorKind, MAX_LOCALS};
use crate::runtime::code::{BranchTarget, Code, Op};
use crate::runtime::instance::ModuleEnv;
use crate::runtime::Value;
use thiserror::Error;
use MaybeValue::{Unknown, Val};

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind} @+{offset} in function {function_index}")]
pub struct VerificationError {
    pub function_index: u32,
    pub offset: usize,
    pub kind: VerificationErrorKind,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VerificationErrorKind {
    #[error("{0}")]
    Decode(DecodeErrorKind),

    #[error("type mismatch in {0}")]
    TypeMismatch(&'static str),

    #[error("unknown local {0}")]
    UnknownLocal(u32),

    #[error("unknown global {0}")]
    UnknownGlobal(u32),

    #[error("global {0} is immutable")]
    ImmutableGlobal(u32),

    #[error("unknown function {0}")]
    UnknownFunction(u32),

    #[error("unknown label {0}")]
    UnknownLabel(u32),

    #[error("memory instruction with no memory")]
    MemoryRequired,

    #[error("alignment must not be larger than natural")]
    BadAlignment,

    #[error("call_indirect is not supported")]
    CallIndirectUnsupported,

    #[error("else does not match an if")]
    ElseWithoutIf,

    #[error("if with a result requires an else")]
    IfWithoutElse,

    #[error("function body must end with an end opcode")]
    MissingEnd,

    #[error("operators remaining after the function end")]
    TrailingBytes,

    #[error("too many locals")]
    TooManyLocals,

    #[error("imported functions have no body")]
    ImportedFunction,
}

impl From<DecodeError> for VerificationError {
    fn from(e: DecodeError) -> Self {
        // function index is filled in by verify_function
        VerificationError {
            function_index: 0,
            offset: e.offset,
            kind: VerificationErrorKind::Decode(e.kind),
        }
    }
}

/// Non-owning view of one function's body bytes and signature.
#[derive(Debug, Clone, Copy)]
pub struct FunctionBody<'a> {
    pub function_index: u32,
    pub sig: &'a FunctionType,
    pub bytes: &'a [u8],
    /// Offset of `bytes` within the module
    pub offset: usize,
}

impl<'a> FunctionBody<'a> {
    pub fn new(function_index: u32, sig: &'a FunctionType, bytes: &'a [u8], offset: usize) -> Self {
        FunctionBody {
            function_index,
            sig,
            bytes,
            offset,
        }
    }

    /// View of a module function, `None` for an out of range index.
    pub fn of(module: &'a Module, function_index: u32) -> Option<FunctionBody<'a>> {
        let function = module.functions.get(function_index as usize)?;
        Some(FunctionBody {
            function_index,
            sig: &function.sig,
            bytes: module.code_bytes(function),
            offset: function.code.start,
        })
    }
}

#[derive(PartialEq, Debug, Clone, Copy)]
enum MaybeValue {
    Val(ValueType),
    Unknown,
}

#[derive(PartialEq, Debug, Clone, Copy)]
enum FrameKind {
    Function,
    Block,
    Loop,
    If,
    Else,
}

/// A forward branch waiting for its label's end.
#[derive(Debug, Clone, Copy)]
enum Fixup {
    Branch(usize),
    Table(usize, Option<usize>),
    Jump(usize),
}

struct CtrlFrame {
    kind: FrameKind,
    result: Option<ValueType>,
    height: usize,
    unreachable: bool,
    /// Loop header pc
    start_pc: usize,
    /// The `BrUnless` of an `if` awaiting its else or end
    if_op: Option<usize>,
    fixups: Vec<Fixup>,
}

struct CodeValidator<'a> {
    env: &'a ModuleEnv<'a>,
    mnemonic: &'static str,
    locals: Vec<ValueType>,
    result: Option<ValueType>,
    vals: Vec<MaybeValue>,
    ctrls: Vec<CtrlFrame>,
    ops: Vec<Op>,
}

/// Verifies a function body and lowers it to [`Code`].
pub fn verify_function(env: &ModuleEnv, body: &FunctionBody) -> Result<Code, VerificationError> {
    let with_index = |mut e: VerificationError| {
        e.function_index = body.function_index;
        e
    };

    let is_imported = env
        .module
        .functions
        .get(body.function_index as usize)
        .map_or(false, |f| f.imported);
    if is_imported {
        return Err(VerificationError {
            function_index: body.function_index,
            offset: body.offset,
            kind: VerificationErrorKind::ImportedFunction,
        });
    }

    let mut reader = Reader::with_base(body.bytes, body.offset);
    let declared = read_locals(&mut reader, body.sig).map_err(with_index)?;

    let mut validator = CodeValidator::new(env, body.sig, &declared);
    while !validator.ctrls.is_empty() {
        if reader.is_empty() {
            return Err(with_index(error_at(&reader, VerificationErrorKind::MissingEnd)));
        }
        let offset = reader.offset();
        let instruction = Instruction::decode(&mut reader).map_err(|e| with_index(e.into()))?;
        validator.mnemonic = instruction.mnemonic();
        validator
            .validate(&instruction)
            .map_err(|kind| VerificationError {
                function_index: body.function_index,
                offset,
                kind,
            })?;
    }
    if !reader.is_empty() {
        return Err(with_index(error_at(&reader, VerificationErrorKind::TrailingBytes)));
    }

    Ok(Code {
        function_index: body.function_index,
        params: body.sig.parameters.clone(),
        result: body.sig.result(),
        locals: declared,
        ops: validator.ops,
    })
}

fn error_at(reader: &Reader, kind: VerificationErrorKind) -> VerificationError {
    VerificationError {
        function_index: 0,
        offset: reader.offset(),
        kind,
    }
}

fn read_locals(
    reader: &mut Reader,
    sig: &FunctionType,
) -> Result<Vec<ValueType>, VerificationError> {
    let mut total = sig.parameters.len() as u64;
    let mut locals = Vec::new();
    let groups = reader.read_count()?;
    for _ in 0..groups {
        let offset = reader.offset();
        let count = reader.read_vu32()?;
        let value_type = read_value_type(reader)?;
        total += count as u64;
        if total > MAX_LOCALS {
            return Err(VerificationError {
                function_index: 0,
                offset,
                kind: VerificationErrorKind::TooManyLocals,
            });
        }
        locals.extend(std::iter::repeat(value_type).take(count as usize));
    }
    Ok(locals)
}

impl<'a> CodeValidator<'a> {
    fn new(
        env: &'a ModuleEnv<'a>,
        sig: &FunctionType,
        declared: &[ValueType],
    ) -> CodeValidator<'a> {
        let mut locals = sig.parameters.clone();
        locals.extend_from_slice(declared);

        let mut v = CodeValidator {
            env,
            mnemonic: "",
            locals,
            result: sig.result(),
            vals: vec![],
            ctrls: vec![],
            ops: vec![],
        };
        v.push_ctrl(FrameKind::Function, sig.result());
        v
    }

    fn mismatch(&self) -> VerificationErrorKind {
        VerificationErrorKind::TypeMismatch(self.mnemonic)
    }

    fn push_val(&mut self, val_type: MaybeValue) {
        self.vals.push(val_type);
    }

    fn pop_val(&mut self) -> Result<MaybeValue, VerificationErrorKind> {
        let frame = self.ctrls.last().ok_or_else(|| self.mismatch())?;
        if self.vals.len() == frame.height {
            if frame.unreachable {
                return Ok(Unknown);
            }
            return Err(self.mismatch());
        }
        self.vals.pop().ok_or_else(|| self.mismatch())
    }

    fn pop_expected(&mut self, val_type: ValueType) -> Result<MaybeValue, VerificationErrorKind> {
        let popped = self.pop_val()?;
        match popped {
            Val(t) if t != val_type => Err(self.mismatch()),
            _ => Ok(popped),
        }
    }

    fn push_ctrl(&mut self, kind: FrameKind, result: Option<ValueType>) {
        self.ctrls.push(CtrlFrame {
            kind,
            result,
            height: self.vals.len(),
            unreachable: false,
            start_pc: self.ops.len(),
            if_op: None,
            fixups: vec![],
        });
    }

    /// Checks the innermost frame's results are exactly on the stack.
    fn check_frame_end(&mut self) -> Result<(), VerificationErrorKind> {
        let (result, height) = match self.ctrls.last() {
            Some(frame) => (frame.result, frame.height),
            None => return Err(self.mismatch()),
        };
        if let Some(t) = result {
            self.pop_expected(t)?;
        }
        if self.vals.len() != height {
            return Err(self.mismatch());
        }
        Ok(())
    }

    fn unreachable(&mut self) {
        if let Some(ctrl) = self.ctrls.last_mut() {
            self.vals.truncate(ctrl.height);
            ctrl.unreachable = true;
        }
    }

    fn emit(&mut self, op: Op) -> usize {
        self.ops.push(op);
        self.ops.len() - 1
    }

    /// Resolves a relative label depth to its frame index and label type.
    fn label(&self, depth: u32) -> Result<(usize, Option<ValueType>), VerificationErrorKind> {
        if self.ctrls.len() <= depth as usize {
            return Err(VerificationErrorKind::UnknownLabel(depth));
        }
        let index = self.ctrls.len() - depth as usize - 1;
        let frame = &self.ctrls[index];
        let types = if frame.kind == FrameKind::Loop {
            None
        } else {
            frame.result
        };
        Ok((index, types))
    }

    /// Branch target for a frame; forward targets get their pc at the frame's end.
    fn target(&self, frame_index: usize) -> BranchTarget {
        let frame = &self.ctrls[frame_index];
        if frame.kind == FrameKind::Loop {
            BranchTarget {
                pc: frame.start_pc,
                height: frame.height,
                arity: 0,
            }
        } else {
            BranchTarget {
                pc: usize::MAX,
                height: frame.height,
                arity: frame.result.map_or(0, |_| 1),
            }
        }
    }

    fn add_fixup(&mut self, frame_index: usize, fixup: Fixup) {
        if self.ctrls[frame_index].kind != FrameKind::Loop {
            self.ctrls[frame_index].fixups.push(fixup);
        }
    }

    fn patch(&mut self, fixups: &[Fixup], pc: usize) {
        for fixup in fixups {
            match *fixup {
                Fixup::Branch(at) => {
                    if let Op::Br(target) | Op::BrIf(target) = &mut self.ops[at] {
                        target.pc = pc;
                    }
                }
                Fixup::Table(at, slot) => {
                    if let Op::BrTable { targets, default } = &mut self.ops[at] {
                        match slot {
                            Some(i) => targets[i].pc = pc,
                            None => default.pc = pc,
                        }
                    }
                }
                Fixup::Jump(at) => {
                    if let Op::Jump(to) = &mut self.ops[at] {
                        *to = pc;
                    }
                }
            }
        }
    }

    fn patch_if(&mut self, at: usize, pc: usize) {
        if let Op::BrUnless(to) = &mut self.ops[at] {
            *to = pc;
        }
    }

    fn local(&self, local_index: u32) -> Result<ValueType, VerificationErrorKind> {
        self.locals
            .get(local_index as usize)
            .copied()
            .ok_or(VerificationErrorKind::UnknownLocal(local_index))
    }

    fn require_memory(&self) -> Result<(), VerificationErrorKind> {
        if self.env.has_memory() {
            Ok(())
        } else {
            Err(VerificationErrorKind::MemoryRequired)
        }
    }

    fn check_alignment(&self, memarg: &MemArg, width: u32) -> Result<(), VerificationErrorKind> {
        if memarg.align >= 32 || 1u32 << memarg.align > width {
            return Err(VerificationErrorKind::BadAlignment);
        }
        Ok(())
    }

    fn validate(&mut self, inst: &Instruction) -> Result<(), VerificationErrorKind> {
        match inst {
            Instruction::Unreachable => {
                self.emit(Op::Unreachable);
                self.unreachable();
            }
            Instruction::Nop => {
                self.emit(Op::Nop);
            }
            Instruction::Block(bt) => self.push_ctrl(FrameKind::Block, bt.results()),
            Instruction::Loop(bt) => self.push_ctrl(FrameKind::Loop, bt.results()),
            Instruction::If(bt) => {
                self.pop_expected(I32)?;
                let at = self.emit(Op::BrUnless(usize::MAX));
                self.push_ctrl(FrameKind::If, bt.results());
                if let Some(frame) = self.ctrls.last_mut() {
                    frame.if_op = Some(at);
                }
            }
            Instruction::Else => {
                if self.ctrls.last().map(|f| f.kind) != Some(FrameKind::If) {
                    return Err(VerificationErrorKind::ElseWithoutIf);
                }
                self.check_frame_end()?;
                let jump = self.emit(Op::Jump(usize::MAX));
                let else_pc = self.ops.len();
                let if_op = match self.ctrls.last_mut() {
                    Some(frame) => {
                        frame.kind = FrameKind::Else;
                        frame.unreachable = false;
                        frame.fixups.push(Fixup::Jump(jump));
                        frame.if_op.take()
                    }
                    None => None,
                };
                if let Some(at) = if_op {
                    self.patch_if(at, else_pc);
                }
            }
            Instruction::End => {
                self.check_frame_end()?;
                let frame = match self.ctrls.pop() {
                    Some(frame) => frame,
                    None => return Err(self.mismatch()),
                };
                if frame.kind == FrameKind::If && frame.result.is_some() {
                    return Err(VerificationErrorKind::IfWithoutElse);
                }
                let end_pc = self.ops.len();
                if let Some(at) = frame.if_op {
                    self.patch_if(at, end_pc);
                }
                self.patch(&frame.fixups, end_pc);
                if frame.kind == FrameKind::Function {
                    self.emit(Op::Return);
                } else if let Some(t) = frame.result {
                    self.push_val(Val(t));
                }
            }
            Instruction::Br(depth) => {
                let (index, types) = self.label(*depth)?;
                if let Some(t) = types {
                    self.pop_expected(t)?;
                }
                let target = self.target(index);
                let at = self.emit(Op::Br(target));
                self.add_fixup(index, Fixup::Branch(at));
                self.unreachable();
            }
            Instruction::BrIf(depth) => {
                self.pop_expected(I32)?;
                let (index, types) = self.label(*depth)?;
                if let Some(t) = types {
                    self.pop_expected(t)?;
                    self.push_val(Val(t));
                }
                let target = self.target(index);
                let at = self.emit(Op::BrIf(target));
                self.add_fixup(index, Fixup::Branch(at));
            }
            Instruction::BrTable { labels, default } => {
                self.pop_expected(I32)?;
                let (default_index, default_types) = self.label(*default)?;
                let mut resolved = Vec::with_capacity(labels.len());
                for depth in labels {
                    let (index, types) = self.label(*depth)?;
                    if types != default_types {
                        return Err(self.mismatch());
                    }
                    resolved.push(index);
                }
                if let Some(t) = default_types {
                    self.pop_expected(t)?;
                }
                let targets: Box<[BranchTarget]> =
                    resolved.iter().map(|i| self.target(*i)).collect();
                let default_target = self.target(default_index);
                let at = self.emit(Op::BrTable {
                    targets,
                    default: default_target,
                });
                for (slot, index) in resolved.into_iter().enumerate() {
                    self.add_fixup(index, Fixup::Table(at, Some(slot)));
                }
                self.add_fixup(default_index, Fixup::Table(at, None));
                self.unreachable();
            }
            Instruction::Return => {
                if let Some(t) = self.result {
                    self.pop_expected(t)?;
                }
                self.emit(Op::Return);
                self.unreachable();
            }
            Instruction::Call(function_index) => {
                let sig = self
                    .env
                    .function_sig(*function_index)
                    .ok_or(VerificationErrorKind::UnknownFunction(*function_index))?;
                for t in sig.parameters.iter().rev() {
                    self.pop_expected(*t)?;
                }
                if let Some(t) = sig.result() {
                    self.push_val(Val(t));
                }
                self.emit(Op::Call(*function_index));
            }
            Instruction::CallIndirect { .. } => {
                return Err(VerificationErrorKind::CallIndirectUnsupported)
            }
            Instruction::Drop => {
                self.pop_val()?;
                self.emit(Op::Drop);
            }
            Instruction::Select => {
                self.pop_expected(I32)?;
                let t1 = self.pop_val()?;
                let t2 = self.pop_val()?;
                let t = match (t1, t2) {
                    (Val(a), Val(b)) if a != b => return Err(self.mismatch()),
                    (Unknown, t) => t,
                    (t, _) => t,
                };
                self.push_val(t);
                self.emit(Op::Select);
            }
            Instruction::LocalGet(idx) => {
                let t = self.local(*idx)?;
                self.push_val(Val(t));
                self.emit(Op::LocalGet(*idx));
            }
            Instruction::LocalSet(idx) => {
                let t = self.local(*idx)?;
                self.pop_expected(t)?;
                self.emit(Op::LocalSet(*idx));
            }
            Instruction::LocalTee(idx) => {
                let t = self.local(*idx)?;
                self.pop_expected(t)?;
                self.push_val(Val(t));
                self.emit(Op::LocalTee(*idx));
            }
            Instruction::GlobalGet(idx) => {
                let global = self
                    .env
                    .global_type(*idx)
                    .ok_or(VerificationErrorKind::UnknownGlobal(*idx))?;
                self.push_val(Val(global.value_type));
                self.emit(Op::GlobalGet(*idx));
            }
            Instruction::GlobalSet(idx) => {
                let global = self
                    .env
                    .global_type(*idx)
                    .ok_or(VerificationErrorKind::UnknownGlobal(*idx))?;
                if !global.mutable {
                    return Err(VerificationErrorKind::ImmutableGlobal(*idx));
                }
                self.pop_expected(global.value_type)?;
                self.emit(Op::GlobalSet(*idx));
            }
            Instruction::Load(op, memarg) => {
                self.require_memory()?;
                self.check_alignment(memarg, op.width())?;
                self.pop_expected(I32)?;
                self.push_val(Val(op.value_type()));
                self.emit(Op::Load(*op, memarg.offset));
            }
            Instruction::Store(op, memarg) => {
                self.require_memory()?;
                self.check_alignment(memarg, op.width())?;
                self.pop_expected(op.value_type())?;
                self.pop_expected(I32)?;
                self.emit(Op::Store(*op, memarg.offset));
            }
            Instruction::MemorySize => {
                self.require_memory()?;
                self.push_val(Val(I32));
                self.emit(Op::MemorySize);
            }
            Instruction::MemoryGrow => {
                self.require_memory()?;
                self.pop_expected(I32)?;
                self.push_val(Val(I32));
                self.emit(Op::MemoryGrow);
            }
            Instruction::I32Const(v) => self.push_const(Value::I32(*v)),
            Instruction::I64Const(v) => self.push_const(Value::I64(*v)),
            Instruction::F32Const(v) => self.push_const(Value::F32(*v)),
            Instruction::F64Const(v) => self.push_const(Value::F64(*v)),
            Instruction::Numeric(op) => {
                for t in op.params().iter().rev() {
                    self.pop_expected(*t)?;
                }
                self.push_val(Val(op.result()));
                self.emit(Op::Numeric(*op));
            }
        }
        Ok(())
    }

    fn push_const(&mut self, value: Value) {
        self.push_val(Val(value.typ()));
        self.emit(Op::Const(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::ModuleBuilder;
    use crate::parser::decode;
    use crate::parser::module::Origin;

    fn verify(
        params: &[ValueType],
        results: &[ValueType],
        locals: &[(u32, ValueType)],
        body: &[u8],
    ) -> Result<Code, VerificationError> {
        verify_with(ModuleBuilder::new(), params, results, locals, body)
    }

    fn verify_with(
        builder: ModuleBuilder,
        params: &[ValueType],
        results: &[ValueType],
        locals: &[(u32, ValueType)],
        body: &[u8],
    ) -> Result<Code, VerificationError> {
        let bytes = builder.function(params, results, locals, body).build();
        let module = decode(&bytes, Origin::Wasm).unwrap();
        let env = ModuleEnv::new(&module);
        let index = module.functions.len() as u32 - 1;
        verify_function(&env, &FunctionBody::of(&module, index).unwrap())
    }

    fn verify_err(
        params: &[ValueType],
        results: &[ValueType],
        body: &[u8],
    ) -> VerificationErrorKind {
        verify(params, results, &[], body).unwrap_err().kind
    }

    #[test]
    fn test_straight_line() {
        // local.get 0; i32.const 1; i32.add; end
        let code = verify(&[I32], &[I32], &[], &[0x20, 0x00, 0x41, 0x01, 0x6a, 0x0b]).unwrap();
        assert_eq!(
            code.ops,
            vec![
                Op::LocalGet(0),
                Op::Const(Value::I32(1)),
                Op::Numeric(crate::parser::instruction::NumericOp::I32Add),
                Op::Return,
            ]
        );
        assert_eq!(code.result, Some(I32));
    }

    #[test]
    fn test_locals_are_declared_after_params() {
        let code = verify(&[I32], &[], &[(2, I64), (1, F32)], &[0x0b]).unwrap();
        assert_eq!(code.locals, vec![I64, I64, F32]);
        assert_eq!(code.local_count(), 4);
    }

    #[test]
    fn test_branch_targets_resolved() {
        // block (result i32) i32.const 7 br 0 end end
        let body = [0x02, 0x7f, 0x41, 0x07, 0x0c, 0x00, 0x0b, 0x0b];
        let code = verify(&[], &[I32], &[], &body).unwrap();
        assert_eq!(
            code.ops,
            vec![
                Op::Const(Value::I32(7)),
                Op::Br(BranchTarget { pc: 2, height: 0, arity: 1 }),
                Op::Return,
            ]
        );
    }

    #[test]
    fn test_loop_branch_targets_header() {
        // loop br 0 end end
        let code = verify(&[], &[], &[], &[0x01, 0x03, 0x40, 0x0c, 0x00, 0x0b, 0x0b]).unwrap();
        assert_eq!(
            code.ops,
            vec![
                Op::Nop,
                Op::Br(BranchTarget { pc: 1, height: 0, arity: 0 }),
                Op::Return,
            ]
        );
    }

    #[test]
    fn test_if_else_jumps() {
        // local.get 0 if (result i32) i32.const 1 else i32.const 2 end end
        let code = verify(
            &[I32],
            &[I32],
            &[],
            &[0x20, 0x00, 0x04, 0x7f, 0x41, 0x01, 0x05, 0x41, 0x02, 0x0b, 0x0b],
        )
        .unwrap();
        assert_eq!(
            code.ops,
            vec![
                Op::LocalGet(0),
                Op::BrUnless(4),
                Op::Const(Value::I32(1)),
                Op::Jump(5),
                Op::Const(Value::I32(2)),
                Op::Return,
            ]
        );
    }

    #[test]
    fn test_br_table_targets() {
        // block block local.get 0 br_table 0 1 1 end end end
        let code = verify(
            &[I32],
            &[],
            &[],
            &[0x02, 0x40, 0x02, 0x40, 0x20, 0x00, 0x0e, 0x02, 0x00, 0x01, 0x01, 0x0b, 0x0b, 0x0b],
        )
        .unwrap();
        // both blocks end where the function's return is emitted
        let end = BranchTarget { pc: 2, height: 0, arity: 0 };
        assert_eq!(
            code.ops[1],
            Op::BrTable {
                targets: vec![end, end].into_boxed_slice(),
                default: end,
            }
        );
        assert_eq!(code.ops[2], Op::Return);
    }

    #[test]
    fn test_unreachable_makes_stack_polymorphic() {
        // unreachable i32.add end
        assert!(verify(&[], &[I32], &[], &[0x00, 0x6a, 0x0b]).is_ok());
        // return then junk types
        assert!(verify(&[], &[I32], &[], &[0x41, 0x01, 0x0f, 0x42, 0x00, 0x0b]).is_err());
    }

    #[test]
    fn test_type_errors() {
        // i64.const 0; end in an i32 function
        assert_eq!(
            verify_err(&[], &[I32], &[0x42, 0x00, 0x0b]),
            VerificationErrorKind::TypeMismatch("end")
        );
        // i32.add with one operand
        assert_eq!(
            verify_err(&[], &[I32], &[0x41, 0x01, 0x6a, 0x0b]),
            VerificationErrorKind::TypeMismatch("i32.add")
        );
        // value left on the stack of a void function
        assert_eq!(
            verify_err(&[], &[], &[0x41, 0x01, 0x0b]),
            VerificationErrorKind::TypeMismatch("end")
        );
    }

    #[test]
    fn test_structural_errors() {
        assert_eq!(verify_err(&[], &[], &[0x05, 0x0b]), VerificationErrorKind::ElseWithoutIf);
        assert_eq!(
            verify_err(&[I32], &[I32], &[0x20, 0x00, 0x04, 0x7f, 0x41, 0x01, 0x0b, 0x0b]),
            VerificationErrorKind::IfWithoutElse
        );
        assert_eq!(verify_err(&[], &[], &[0x01]), VerificationErrorKind::MissingEnd);
        assert_eq!(verify_err(&[], &[], &[0x0b, 0x01]), VerificationErrorKind::TrailingBytes);
        assert_eq!(
            verify_err(&[], &[], &[0x0c, 0x01, 0x0b]),
            VerificationErrorKind::UnknownLabel(1)
        );
        assert_eq!(
            verify_err(&[], &[], &[0x20, 0x00, 0x1a, 0x0b]),
            VerificationErrorKind::UnknownLocal(0)
        );
        assert_eq!(
            verify_err(&[], &[], &[0x10, 0x05, 0x0b]),
            VerificationErrorKind::UnknownFunction(5)
        );
        assert_eq!(
            verify_err(&[], &[], &[0x41, 0x00, 0x11, 0x00, 0x00, 0x0b]),
            VerificationErrorKind::CallIndirectUnsupported
        );
        assert_eq!(
            verify_err(&[], &[], &[0xff, 0x0b]),
            VerificationErrorKind::Decode(DecodeErrorKind::UnknownOpcode(0xff))
        );
    }

    #[test]
    fn test_memory_instructions_need_memory() {
        let body = [0x41, 0x00, 0x28, 0x02, 0x00, 0x0b];
        assert_eq!(verify_err(&[], &[I32], &body), VerificationErrorKind::MemoryRequired);
        assert!(verify_with(ModuleBuilder::new().memory(1, None), &[], &[I32], &[], &body).is_ok());
        // align 2^3 on a 4 byte access
        let misaligned = [0x41, 0x00, 0x28, 0x03, 0x00, 0x0b];
        assert_eq!(
            verify_with(ModuleBuilder::new().memory(1, None), &[], &[I32], &[], &misaligned)
                .unwrap_err()
                .kind,
            VerificationErrorKind::BadAlignment
        );
    }

    #[test]
    fn test_globals() {
        use crate::parser::module::ConstExpr;
        let builder = || {
            ModuleBuilder::new()
                .global(I32, false, ConstExpr::I32(1))
                .global(I64, true, ConstExpr::I64(2))
        };
        assert!(verify_with(builder(), &[], &[I32], &[], &[0x23, 0x00, 0x0b]).is_ok());
        assert!(verify_with(builder(), &[], &[], &[], &[0x42, 0x05, 0x24, 0x01, 0x0b]).is_ok());
        assert_eq!(
            verify_with(builder(), &[], &[], &[], &[0x41, 0x05, 0x24, 0x00, 0x0b])
                .unwrap_err()
                .kind,
            VerificationErrorKind::ImmutableGlobal(0)
        );
        assert_eq!(
            verify_with(builder(), &[], &[], &[], &[0x23, 0x02, 0x1a, 0x0b]).unwrap_err().kind,
            VerificationErrorKind::UnknownGlobal(2)
        );
    }

    #[test]
    fn test_too_many_locals() {
        let err = verify(&[], &[], &[(50_001, I32)], &[0x0b]).unwrap_err();
        assert_eq!(err.kind, VerificationErrorKind::TooManyLocals);
    }

    #[test]
    fn test_error_reports_function_and_offset() {
        let bytes = ModuleBuilder::new()
            .function(&[], &[], &[], &[0x0b])
            .function(&[], &[], &[], &[0x41, 0x00, 0x0b])
            .build();
        let module = decode(&bytes, Origin::Wasm).unwrap();
        let env = ModuleEnv::new(&module);
        let body = FunctionBody::of(&module, 1).unwrap();
        let err = verify_function(&env, &body).unwrap_err();
        assert_eq!(err.function_index, 1);
        // the failing end follows the local count and the i32.const
        assert_eq!(err.offset, body.offset + 3);
        assert!(err.to_string().contains("function 1"));
    }
}
