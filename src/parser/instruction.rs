//! Instruction representation and decoding
//!
//! Covers the MVP instruction set plus the sign-extension operators. Numeric
//! operators share a single [`NumericOp`] table generated by `numeric_ops!`,
//! so the verifier, interpreter and compiler agree on operand types.

use super::encoding::*;
use super::module::ValueType;
use super::reader::Reader;
use super::{DecodeError, DecodeErrorKind};
use fhex::ToHex;
use std::fmt;

/// Upper bound on `br_table` targets
pub const MAX_BR_TABLE_LABELS: u32 = 65520;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemArg {
    /// Alignment hint as a power of two
    pub align: u32,
    pub offset: u32,
}

impl MemArg {
    pub fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
        let align = reader.read_vu32()?;
        let offset = reader.read_vu32()?;
        Ok(MemArg { align, offset })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Empty,
    Value(ValueType),
}

impl BlockType {
    pub fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
        let offset = reader.offset();
        let b = reader.read_byte()?;
        if b == BLOCK_TYPE_EMPTY {
            return Ok(BlockType::Empty);
        }
        // multi-value type indices are not supported
        ValueType::decode(b)
            .map(BlockType::Value)
            .ok_or_else(|| DecodeError::new(offset, DecodeErrorKind::BadBlockType(b)))
    }

    pub fn results(self) -> Option<ValueType> {
        match self {
            BlockType::Empty => None,
            BlockType::Value(t) => Some(t),
        }
    }

    pub fn arity(self) -> usize {
        self.results().map_or(0, |_| 1)
    }
}

/// Memory load variants: the pushed type, the access width in bytes and
/// whether narrow accesses sign-extend.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadOp {
    I32,
    I64,
    F32,
    F64,
    I32_8S,
    I32_8U,
    I32_16S,
    I32_16U,
    I64_8S,
    I64_8U,
    I64_16S,
    I64_16U,
    I64_32S,
    I64_32U,
}

impl LoadOp {
    pub fn from_opcode(opcode: u8) -> Option<LoadOp> {
        use LoadOp::*;
        Some(match opcode {
            0x28 => I32,
            0x29 => I64,
            0x2a => F32,
            0x2b => F64,
            0x2c => I32_8S,
            0x2d => I32_8U,
            0x2e => I32_16S,
            0x2f => I32_16U,
            0x30 => I64_8S,
            0x31 => I64_8U,
            0x32 => I64_16S,
            0x33 => I64_16U,
            0x34 => I64_32S,
            0x35 => I64_32U,
            _ => return None,
        })
    }

    pub fn opcode(self) -> u8 {
        use LoadOp::*;
        match self {
            I32 => 0x28,
            I64 => 0x29,
            F32 => 0x2a,
            F64 => 0x2b,
            I32_8S => 0x2c,
            I32_8U => 0x2d,
            I32_16S => 0x2e,
            I32_16U => 0x2f,
            I64_8S => 0x30,
            I64_8U => 0x31,
            I64_16S => 0x32,
            I64_16U => 0x33,
            I64_32S => 0x34,
            I64_32U => 0x35,
        }
    }

    pub fn value_type(self) -> ValueType {
        use LoadOp::*;
        match self {
            I32 | I32_8S | I32_8U | I32_16S | I32_16U => ValueType::I32,
            I64 | I64_8S | I64_8U | I64_16S | I64_16U | I64_32S | I64_32U => ValueType::I64,
            F32 => ValueType::F32,
            F64 => ValueType::F64,
        }
    }

    pub fn width(self) -> u32 {
        use LoadOp::*;
        match self {
            I32_8S | I32_8U | I64_8S | I64_8U => 1,
            I32_16S | I32_16U | I64_16S | I64_16U => 2,
            I32 | F32 | I64_32S | I64_32U => 4,
            I64 | F64 => 8,
        }
    }

    pub fn sign_extends(self) -> bool {
        use LoadOp::*;
        matches!(self, I32_8S | I32_16S | I64_8S | I64_16S | I64_32S)
    }

    pub fn name(self) -> &'static str {
        use LoadOp::*;
        match self {
            I32 => "i32.load",
            I64 => "i64.load",
            F32 => "f32.load",
            F64 => "f64.load",
            I32_8S => "i32.load8_s",
            I32_8U => "i32.load8_u",
            I32_16S => "i32.load16_s",
            I32_16U => "i32.load16_u",
            I64_8S => "i64.load8_s",
            I64_8U => "i64.load8_u",
            I64_16S => "i64.load16_s",
            I64_16U => "i64.load16_u",
            I64_32S => "i64.load32_s",
            I64_32U => "i64.load32_u",
        }
    }
}

#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    I32,
    I64,
    F32,
    F64,
    I32_8,
    I32_16,
    I64_8,
    I64_16,
    I64_32,
}

impl StoreOp {
    pub fn from_opcode(opcode: u8) -> Option<StoreOp> {
        use StoreOp::*;
        Some(match opcode {
            0x36 => I32,
            0x37 => I64,
            0x38 => F32,
            0x39 => F64,
            0x3a => I32_8,
            0x3b => I32_16,
            0x3c => I64_8,
            0x3d => I64_16,
            0x3e => I64_32,
            _ => return None,
        })
    }

    pub fn opcode(self) -> u8 {
        use StoreOp::*;
        match self {
            I32 => 0x36,
            I64 => 0x37,
            F32 => 0x38,
            F64 => 0x39,
            I32_8 => 0x3a,
            I32_16 => 0x3b,
            I64_8 => 0x3c,
            I64_16 => 0x3d,
            I64_32 => 0x3e,
        }
    }

    pub fn value_type(self) -> ValueType {
        use StoreOp::*;
        match self {
            I32 | I32_8 | I32_16 => ValueType::I32,
            I64 | I64_8 | I64_16 | I64_32 => ValueType::I64,
            F32 => ValueType::F32,
            F64 => ValueType::F64,
        }
    }

    pub fn width(self) -> u32 {
        use StoreOp::*;
        match self {
            I32_8 | I64_8 => 1,
            I32_16 | I64_16 => 2,
            I32 | F32 | I64_32 => 4,
            I64 | F64 => 8,
        }
    }

    pub fn name(self) -> &'static str {
        use StoreOp::*;
        match self {
            I32 => "i32.store",
            I64 => "i64.store",
            F32 => "f32.store",
            F64 => "f64.store",
            I32_8 => "i32.store8",
            I32_16 => "i32.store16",
            I64_8 => "i64.store8",
            I64_16 => "i64.store16",
            I64_32 => "i64.store32",
        }
    }
}

macro_rules! numeric_ops {
    ($( $name:ident = $opcode:literal, $text:literal, [$($param:ident),*] -> $result:ident; )*) => {
        /// Stack-only numeric, comparison and conversion operators.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum NumericOp {
            $($name,)*
        }

        impl NumericOp {
            pub fn from_opcode(opcode: u8) -> Option<NumericOp> {
                match opcode {
                    $($opcode => Some(NumericOp::$name),)*
                    _ => None,
                }
            }

            pub fn opcode(self) -> u8 {
                match self {
                    $(NumericOp::$name => $opcode,)*
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $(NumericOp::$name => $text,)*
                }
            }

            /// Operand types, bottom of stack first.
            pub fn params(self) -> &'static [ValueType] {
                match self {
                    $(NumericOp::$name => &[$(ValueType::$param),*],)*
                }
            }

            pub fn result(self) -> ValueType {
                match self {
                    $(NumericOp::$name => ValueType::$result,)*
                }
            }
        }
    };
}

numeric_ops! {
    I32Eqz = 0x45, "i32.eqz", [I32] -> I32;
    I32Eq = 0x46, "i32.eq", [I32, I32] -> I32;
    I32Ne = 0x47, "i32.ne", [I32, I32] -> I32;
    I32LtS = 0x48, "i32.lt_s", [I32, I32] -> I32;
    I32LtU = 0x49, "i32.lt_u", [I32, I32] -> I32;
    I32GtS = 0x4a, "i32.gt_s", [I32, I32] -> I32;
    I32GtU = 0x4b, "i32.gt_u", [I32, I32] -> I32;
    I32LeS = 0x4c, "i32.le_s", [I32, I32] -> I32;
    I32LeU = 0x4d, "i32.le_u", [I32, I32] -> I32;
    I32GeS = 0x4e, "i32.ge_s", [I32, I32] -> I32;
    I32GeU = 0x4f, "i32.ge_u", [I32, I32] -> I32;

    I64Eqz = 0x50, "i64.eqz", [I64] -> I32;
    I64Eq = 0x51, "i64.eq", [I64, I64] -> I32;
    I64Ne = 0x52, "i64.ne", [I64, I64] -> I32;
    I64LtS = 0x53, "i64.lt_s", [I64, I64] -> I32;
    I64LtU = 0x54, "i64.lt_u", [I64, I64] -> I32;
    I64GtS = 0x55, "i64.gt_s", [I64, I64] -> I32;
    I64GtU = 0x56, "i64.gt_u", [I64, I64] -> I32;
    I64LeS = 0x57, "i64.le_s", [I64, I64] -> I32;
    I64LeU = 0x58, "i64.le_u", [I64, I64] -> I32;
    I64GeS = 0x59, "i64.ge_s", [I64, I64] -> I32;
    I64GeU = 0x5a, "i64.ge_u", [I64, I64] -> I32;

    F32Eq = 0x5b, "f32.eq", [F32, F32] -> I32;
    F32Ne = 0x5c, "f32.ne", [F32, F32] -> I32;
    F32Lt = 0x5d, "f32.lt", [F32, F32] -> I32;
    F32Gt = 0x5e, "f32.gt", [F32, F32] -> I32;
    F32Le = 0x5f, "f32.le", [F32, F32] -> I32;
    F32Ge = 0x60, "f32.ge", [F32, F32] -> I32;

    F64Eq = 0x61, "f64.eq", [F64, F64] -> I32;
    F64Ne = 0x62, "f64.ne", [F64, F64] -> I32;
    F64Lt = 0x63, "f64.lt", [F64, F64] -> I32;
    F64Gt = 0x64, "f64.gt", [F64, F64] -> I32;
    F64Le = 0x65, "f64.le", [F64, F64] -> I32;
    F64Ge = 0x66, "f64.ge", [F64, F64] -> I32;

    I32Clz = 0x67, "i32.clz", [I32] -> I32;
    I32Ctz = 0x68, "i32.ctz", [I32] -> I32;
    I32Popcnt = 0x69, "i32.popcnt", [I32] -> I32;
    I32Add = 0x6a, "i32.add", [I32, I32] -> I32;
    I32Sub = 0x6b, "i32.sub", [I32, I32] -> I32;
    I32Mul = 0x6c, "i32.mul", [I32, I32] -> I32;
    I32DivS = 0x6d, "i32.div_s", [I32, I32] -> I32;
    I32DivU = 0x6e, "i32.div_u", [I32, I32] -> I32;
    I32RemS = 0x6f, "i32.rem_s", [I32, I32] -> I32;
    I32RemU = 0x70, "i32.rem_u", [I32, I32] -> I32;
    I32And = 0x71, "i32.and", [I32, I32] -> I32;
    I32Or = 0x72, "i32.or", [I32, I32] -> I32;
    I32Xor = 0x73, "i32.xor", [I32, I32] -> I32;
    I32Shl = 0x74, "i32.shl", [I32, I32] -> I32;
    I32ShrS = 0x75, "i32.shr_s", [I32, I32] -> I32;
    I32ShrU = 0x76, "i32.shr_u", [I32, I32] -> I32;
    I32Rotl = 0x77, "i32.rotl", [I32, I32] -> I32;
    I32Rotr = 0x78, "i32.rotr", [I32, I32] -> I32;

    I64Clz = 0x79, "i64.clz", [I64] -> I64;
    I64Ctz = 0x7a, "i64.ctz", [I64] -> I64;
    I64Popcnt = 0x7b, "i64.popcnt", [I64] -> I64;
    I64Add = 0x7c, "i64.add", [I64, I64] -> I64;
    I64Sub = 0x7d, "i64.sub", [I64, I64] -> I64;
    I64Mul = 0x7e, "i64.mul", [I64, I64] -> I64;
    I64DivS = 0x7f, "i64.div_s", [I64, I64] -> I64;
    I64DivU = 0x80, "i64.div_u", [I64, I64] -> I64;
    I64RemS = 0x81, "i64.rem_s", [I64, I64] -> I64;
    I64RemU = 0x82, "i64.rem_u", [I64, I64] -> I64;
    I64And = 0x83, "i64.and", [I64, I64] -> I64;
    I64Or = 0x84, "i64.or", [I64, I64] -> I64;
    I64Xor = 0x85, "i64.xor", [I64, I64] -> I64;
    I64Shl = 0x86, "i64.shl", [I64, I64] -> I64;
    I64ShrS = 0x87, "i64.shr_s", [I64, I64] -> I64;
    I64ShrU = 0x88, "i64.shr_u", [I64, I64] -> I64;
    I64Rotl = 0x89, "i64.rotl", [I64, I64] -> I64;
    I64Rotr = 0x8a, "i64.rotr", [I64, I64] -> I64;

    F32Abs = 0x8b, "f32.abs", [F32] -> F32;
    F32Neg = 0x8c, "f32.neg", [F32] -> F32;
    F32Ceil = 0x8d, "f32.ceil", [F32] -> F32;
    F32Floor = 0x8e, "f32.floor", [F32] -> F32;
    F32Trunc = 0x8f, "f32.trunc", [F32] -> F32;
    F32Nearest = 0x90, "f32.nearest", [F32] -> F32;
    F32Sqrt = 0x91, "f32.sqrt", [F32] -> F32;
    F32Add = 0x92, "f32.add", [F32, F32] -> F32;
    F32Sub = 0x93, "f32.sub", [F32, F32] -> F32;
    F32Mul = 0x94, "f32.mul", [F32, F32] -> F32;
    F32Div = 0x95, "f32.div", [F32, F32] -> F32;
    F32Min = 0x96, "f32.min", [F32, F32] -> F32;
    F32Max = 0x97, "f32.max", [F32, F32] -> F32;
    F32Copysign = 0x98, "f32.copysign", [F32, F32] -> F32;

    F64Abs = 0x99, "f64.abs", [F64] -> F64;
    F64Neg = 0x9a, "f64.neg", [F64] -> F64;
    F64Ceil = 0x9b, "f64.ceil", [F64] -> F64;
    F64Floor = 0x9c, "f64.floor", [F64] -> F64;
    F64Trunc = 0x9d, "f64.trunc", [F64] -> F64;
    F64Nearest = 0x9e, "f64.nearest", [F64] -> F64;
    F64Sqrt = 0x9f, "f64.sqrt", [F64] -> F64;
    F64Add = 0xa0, "f64.add", [F64, F64] -> F64;
    F64Sub = 0xa1, "f64.sub", [F64, F64] -> F64;
    F64Mul = 0xa2, "f64.mul", [F64, F64] -> F64;
    F64Div = 0xa3, "f64.div", [F64, F64] -> F64;
    F64Min = 0xa4, "f64.min", [F64, F64] -> F64;
    F64Max = 0xa5, "f64.max", [F64, F64] -> F64;
    F64Copysign = 0xa6, "f64.copysign", [F64, F64] -> F64;

    I32WrapI64 = 0xa7, "i32.wrap_i64", [I64] -> I32;
    I32TruncF32S = 0xa8, "i32.trunc_f32_s", [F32] -> I32;
    I32TruncF32U = 0xa9, "i32.trunc_f32_u", [F32] -> I32;
    I32TruncF64S = 0xaa, "i32.trunc_f64_s", [F64] -> I32;
    I32TruncF64U = 0xab, "i32.trunc_f64_u", [F64] -> I32;
    I64ExtendI32S = 0xac, "i64.extend_i32_s", [I32] -> I64;
    I64ExtendI32U = 0xad, "i64.extend_i32_u", [I32] -> I64;
    I64TruncF32S = 0xae, "i64.trunc_f32_s", [F32] -> I64;
    I64TruncF32U = 0xaf, "i64.trunc_f32_u", [F32] -> I64;
    I64TruncF64S = 0xb0, "i64.trunc_f64_s", [F64] -> I64;
    I64TruncF64U = 0xb1, "i64.trunc_f64_u", [F64] -> I64;
    F32ConvertI32S = 0xb2, "f32.convert_i32_s", [I32] -> F32;
    F32ConvertI32U = 0xb3, "f32.convert_i32_u", [I32] -> F32;
    F32ConvertI64S = 0xb4, "f32.convert_i64_s", [I64] -> F32;
    F32ConvertI64U = 0xb5, "f32.convert_i64_u", [I64] -> F32;
    F32DemoteF64 = 0xb6, "f32.demote_f64", [F64] -> F32;
    F64ConvertI32S = 0xb7, "f64.convert_i32_s", [I32] -> F64;
    F64ConvertI32U = 0xb8, "f64.convert_i32_u", [I32] -> F64;
    F64ConvertI64S = 0xb9, "f64.convert_i64_s", [I64] -> F64;
    F64ConvertI64U = 0xba, "f64.convert_i64_u", [I64] -> F64;
    F64PromoteF32 = 0xbb, "f64.promote_f32", [F32] -> F64;
    I32ReinterpretF32 = 0xbc, "i32.reinterpret_f32", [F32] -> I32;
    I64ReinterpretF64 = 0xbd, "i64.reinterpret_f64", [F64] -> I64;
    F32ReinterpretI32 = 0xbe, "f32.reinterpret_i32", [I32] -> F32;
    F64ReinterpretI64 = 0xbf, "f64.reinterpret_i64", [I64] -> F64;

    I32Extend8S = 0xc0, "i32.extend8_s", [I32] -> I32;
    I32Extend16S = 0xc1, "i32.extend16_s", [I32] -> I32;
    I64Extend8S = 0xc2, "i64.extend8_s", [I64] -> I64;
    I64Extend16S = 0xc3, "i64.extend16_s", [I64] -> I64;
    I64Extend32S = 0xc4, "i64.extend32_s", [I64] -> I64;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    // Control instructions
    Unreachable,
    Nop,
    Block(BlockType),
    Loop(BlockType),
    If(BlockType),
    Else,
    End,
    Br(u32),
    BrIf(u32),
    BrTable { labels: Vec<u32>, default: u32 },
    Return,
    Call(u32),
    CallIndirect { type_idx: u32, table_idx: u32 },

    // Parametric instructions
    Drop,
    Select,

    // Variable instructions
    LocalGet(u32),
    LocalSet(u32),
    LocalTee(u32),
    GlobalGet(u32),
    GlobalSet(u32),

    // Memory instructions
    Load(LoadOp, MemArg),
    Store(StoreOp, MemArg),
    MemorySize,
    MemoryGrow,

    // Constants
    I32Const(i32),
    I64Const(i64),
    F32Const(f32),
    F64Const(f64),

    Numeric(NumericOp),
}

impl Instruction {
    /// Decode one instruction, immediates included.
    pub fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
        use Instruction::*;

        let offset = reader.offset();
        let opcode = reader.read_byte()?;
        let instruction = match opcode {
            OP_UNREACHABLE => Unreachable,
            OP_NOP => Nop,
            OP_BLOCK => Block(BlockType::decode(reader)?),
            OP_LOOP => Loop(BlockType::decode(reader)?),
            OP_IF => If(BlockType::decode(reader)?),
            OP_ELSE => Else,
            OP_END => End,
            OP_BR => Br(reader.read_vu32()?),
            OP_BR_IF => BrIf(reader.read_vu32()?),
            OP_BR_TABLE => {
                let count_offset = reader.offset();
                let count = reader.read_vu32()?;
                if count > MAX_BR_TABLE_LABELS || count as usize > reader.remaining() {
                    return Err(DecodeError::new(
                        count_offset,
                        DecodeErrorKind::CountTooLarge(count as u64),
                    ));
                }
                let labels = (0..count)
                    .map(|_| reader.read_vu32())
                    .collect::<Result<Vec<_>, _>>()?;
                let default = reader.read_vu32()?;
                BrTable { labels, default }
            }
            OP_RETURN => Return,
            OP_CALL => Call(reader.read_vu32()?),
            OP_CALL_INDIRECT => {
                let type_idx = reader.read_vu32()?;
                let table_idx = reader.read_vu32()?;
                CallIndirect { type_idx, table_idx }
            }
            OP_DROP => Drop,
            OP_SELECT => Select,
            OP_LOCAL_GET => LocalGet(reader.read_vu32()?),
            OP_LOCAL_SET => LocalSet(reader.read_vu32()?),
            OP_LOCAL_TEE => LocalTee(reader.read_vu32()?),
            OP_GLOBAL_GET => GlobalGet(reader.read_vu32()?),
            OP_GLOBAL_SET => GlobalSet(reader.read_vu32()?),
            OP_MEMORY_SIZE | OP_MEMORY_GROW => {
                let reserved_offset = reader.offset();
                if reader.read_byte()? != 0 {
                    return Err(DecodeError::new(
                        reserved_offset,
                        DecodeErrorKind::ZeroByteExpected,
                    ));
                }
                if opcode == OP_MEMORY_SIZE {
                    MemorySize
                } else {
                    MemoryGrow
                }
            }
            OP_I32_CONST => I32Const(reader.read_vs32()?),
            OP_I64_CONST => I64Const(reader.read_vs64()?),
            OP_F32_CONST => F32Const(reader.read_f32()?),
            OP_F64_CONST => F64Const(reader.read_f64()?),
            0xfc..=0xfe => {
                let sub = reader.read_vu32()?;
                return Err(DecodeError::new(
                    offset,
                    DecodeErrorKind::UnknownPrefixedOpcode(opcode, sub),
                ));
            }
            _ => {
                if let Some(op) = LoadOp::from_opcode(opcode) {
                    Load(op, MemArg::decode(reader)?)
                } else if let Some(op) = StoreOp::from_opcode(opcode) {
                    Store(op, MemArg::decode(reader)?)
                } else if let Some(op) = NumericOp::from_opcode(opcode) {
                    Numeric(op)
                } else {
                    return Err(DecodeError::new(offset, DecodeErrorKind::UnknownOpcode(opcode)));
                }
            }
        };
        Ok(instruction)
    }

    pub fn mnemonic(&self) -> &'static str {
        use Instruction::*;
        match self {
            Unreachable => "unreachable",
            Nop => "nop",
            Block(_) => "block",
            Loop(_) => "loop",
            If(_) => "if",
            Else => "else",
            End => "end",
            Br(_) => "br",
            BrIf(_) => "br_if",
            BrTable { .. } => "br_table",
            Return => "return",
            Call(_) => "call",
            CallIndirect { .. } => "call_indirect",
            Drop => "drop",
            Select => "select",
            LocalGet(_) => "local.get",
            LocalSet(_) => "local.set",
            LocalTee(_) => "local.tee",
            GlobalGet(_) => "global.get",
            GlobalSet(_) => "global.set",
            Load(op, _) => op.name(),
            Store(op, _) => op.name(),
            MemorySize => "memory.size",
            MemoryGrow => "memory.grow",
            I32Const(_) => "i32.const",
            I64Const(_) => "i64.const",
            F32Const(_) => "f32.const",
            F64Const(_) => "f64.const",
            Numeric(op) => op.name(),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instruction::*;
        write!(f, "{}", self.mnemonic())?;
        match self {
            Block(bt) | Loop(bt) | If(bt) => {
                if let BlockType::Value(t) = bt {
                    write!(f, " (result {t})")?;
                }
                Ok(())
            }
            Br(idx) | BrIf(idx) | Call(idx) | LocalGet(idx) | LocalSet(idx) | LocalTee(idx)
            | GlobalGet(idx) | GlobalSet(idx) => write!(f, " {idx}"),
            BrTable { labels, default } => {
                for label in labels {
                    write!(f, " {label}")?;
                }
                write!(f, " {default}")
            }
            CallIndirect { type_idx, .. } => write!(f, " (type {type_idx})"),
            Load(_, memarg) | Store(_, memarg) => {
                if memarg.offset != 0 {
                    write!(f, " offset={}", memarg.offset)?;
                }
                Ok(())
            }
            I32Const(v) => write!(f, " {v}"),
            I64Const(v) => write!(f, " {v}"),
            F32Const(v) => write!(f, " {}", v.to_hex()),
            F64Const(v) => write!(f, " {}", v.to_hex()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(bytes: &[u8]) -> Vec<Instruction> {
        let mut reader = Reader::new(bytes);
        let mut out = Vec::new();
        while !reader.is_empty() {
            out.push(Instruction::decode(&mut reader).unwrap());
        }
        out
    }

    #[test]
    fn test_numeric_table_is_consistent() {
        for opcode in 0x45..=0xc4u8 {
            let op = NumericOp::from_opcode(opcode).expect("numeric opcode");
            assert_eq!(op.opcode(), opcode);
            assert!(!op.params().is_empty() && op.params().len() <= 2, "{}", op.name());
        }
        assert_eq!(NumericOp::from_opcode(0x44), None);
        assert_eq!(NumericOp::from_opcode(0xc5), None);
        assert_eq!(NumericOp::I64Eqz.result(), ValueType::I32);
        assert_eq!(NumericOp::F64ConvertI64U.params(), &[ValueType::I64]);
    }

    #[test]
    fn test_memory_op_tables() {
        for opcode in 0x28..=0x35u8 {
            assert_eq!(LoadOp::from_opcode(opcode).unwrap().opcode(), opcode);
        }
        for opcode in 0x36..=0x3eu8 {
            assert_eq!(StoreOp::from_opcode(opcode).unwrap().opcode(), opcode);
        }
        assert_eq!(LoadOp::I64_32S.width(), 4);
        assert!(LoadOp::I64_32S.sign_extends());
        assert!(!LoadOp::I32_8U.sign_extends());
        assert_eq!(StoreOp::I64_16.value_type(), ValueType::I64);
    }

    #[test]
    fn test_decode_sequence() {
        let instructions = decode_all(&[
            0x02, 0x7f, // block (result i32)
            0x41, 0x7f, // i32.const -1
            0x0e, 0x02, 0x00, 0x01, 0x00, // br_table 0 1 0
            0x28, 0x02, 0x10, // i32.load offset=16
            0x3f, 0x00, // memory.size
            0x6a, // i32.add
            0x0b,
        ]);
        assert_eq!(
            instructions,
            vec![
                Instruction::Block(BlockType::Value(ValueType::I32)),
                Instruction::I32Const(-1),
                Instruction::BrTable {
                    labels: vec![0, 1],
                    default: 0
                },
                Instruction::Load(LoadOp::I32, MemArg { align: 2, offset: 16 }),
                Instruction::MemorySize,
                Instruction::Numeric(NumericOp::I32Add),
                Instruction::End,
            ]
        );
    }

    #[test]
    fn test_decode_errors() {
        let err = |bytes: &[u8]| Instruction::decode(&mut Reader::new(bytes)).unwrap_err().kind;

        assert_eq!(err(&[0xd7]), DecodeErrorKind::UnknownOpcode(0xd7));
        assert_eq!(err(&[0xfc, 0x00]), DecodeErrorKind::UnknownPrefixedOpcode(0xfc, 0));
        assert_eq!(err(&[0x02, 0x00]), DecodeErrorKind::BadBlockType(0x00));
        assert_eq!(err(&[0x40, 0x01]), DecodeErrorKind::ZeroByteExpected);
        assert_eq!(err(&[0x41]), DecodeErrorKind::UnexpectedEnd);
        assert_eq!(err(&[0x0e, 0x7f]), DecodeErrorKind::CountTooLarge(0x7f));
    }

    #[test]
    fn test_display() {
        assert_eq!(Instruction::LocalGet(3).to_string(), "local.get 3");
        assert_eq!(
            Instruction::Load(LoadOp::I64_8U, MemArg { align: 0, offset: 4 }).to_string(),
            "i64.load8_u offset=4"
        );
        assert_eq!(
            Instruction::If(BlockType::Value(ValueType::F64)).to_string(),
            "if (result f64)"
        );
        assert!(Instruction::F64Const(1.0).to_string().starts_with("f64.const 0x"));
    }
}
