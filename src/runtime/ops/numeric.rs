//! Numeric operators
//!
//! Every [`NumericOp`] pops its operands from the stack and pushes one
//! result. Integer arithmetic wraps; division, remainder and float-to-int
//! truncation are the only operators that can trap.

use super::ArithmeticMode;
use crate::parser::instruction::NumericOp;
use crate::runtime::{Stack, TrapReason, Value};

macro_rules! unary {
    ($stack:expr, $pop:ident, |$a:ident| $body:expr) => {{
        let $a = $stack.$pop()?;
        $body
    }};
}

macro_rules! binary {
    ($stack:expr, $pop:ident, |$a:ident, $b:ident| $body:expr) => {{
        let $b = $stack.$pop()?;
        let $a = $stack.$pop()?;
        $body
    }};
}

fn bool_value(b: bool) -> Value {
    Value::I32(b as i32)
}

/// Applies `op` to the operands on top of `stack`.
pub fn execute(op: NumericOp, mode: ArithmeticMode, stack: &mut Stack) -> Result<(), TrapReason> {
    use NumericOp::*;

    let result = match op {
        // ====================================================================
        // Comparisons
        // ====================================================================
        I32Eqz => unary!(stack, pop_i32, |a| bool_value(a == 0)),
        I32Eq => binary!(stack, pop_i32, |a, b| bool_value(a == b)),
        I32Ne => binary!(stack, pop_i32, |a, b| bool_value(a != b)),
        I32LtS => binary!(stack, pop_i32, |a, b| bool_value(a < b)),
        I32LtU => binary!(stack, pop_i32, |a, b| bool_value((a as u32) < (b as u32))),
        I32GtS => binary!(stack, pop_i32, |a, b| bool_value(a > b)),
        I32GtU => binary!(stack, pop_i32, |a, b| bool_value((a as u32) > (b as u32))),
        I32LeS => binary!(stack, pop_i32, |a, b| bool_value(a <= b)),
        I32LeU => binary!(stack, pop_i32, |a, b| bool_value((a as u32) <= (b as u32))),
        I32GeS => binary!(stack, pop_i32, |a, b| bool_value(a >= b)),
        I32GeU => binary!(stack, pop_i32, |a, b| bool_value((a as u32) >= (b as u32))),

        I64Eqz => unary!(stack, pop_i64, |a| bool_value(a == 0)),
        I64Eq => binary!(stack, pop_i64, |a, b| bool_value(a == b)),
        I64Ne => binary!(stack, pop_i64, |a, b| bool_value(a != b)),
        I64LtS => binary!(stack, pop_i64, |a, b| bool_value(a < b)),
        I64LtU => binary!(stack, pop_i64, |a, b| bool_value((a as u64) < (b as u64))),
        I64GtS => binary!(stack, pop_i64, |a, b| bool_value(a > b)),
        I64GtU => binary!(stack, pop_i64, |a, b| bool_value((a as u64) > (b as u64))),
        I64LeS => binary!(stack, pop_i64, |a, b| bool_value(a <= b)),
        I64LeU => binary!(stack, pop_i64, |a, b| bool_value((a as u64) <= (b as u64))),
        I64GeS => binary!(stack, pop_i64, |a, b| bool_value(a >= b)),
        I64GeU => binary!(stack, pop_i64, |a, b| bool_value((a as u64) >= (b as u64))),

        F32Eq => binary!(stack, pop_f32, |a, b| bool_value(a == b)),
        F32Ne => binary!(stack, pop_f32, |a, b| bool_value(a != b)),
        F32Lt => binary!(stack, pop_f32, |a, b| bool_value(a < b)),
        F32Gt => binary!(stack, pop_f32, |a, b| bool_value(a > b)),
        F32Le => binary!(stack, pop_f32, |a, b| bool_value(a <= b)),
        F32Ge => binary!(stack, pop_f32, |a, b| bool_value(a >= b)),

        F64Eq => binary!(stack, pop_f64, |a, b| bool_value(a == b)),
        F64Ne => binary!(stack, pop_f64, |a, b| bool_value(a != b)),
        F64Lt => binary!(stack, pop_f64, |a, b| bool_value(a < b)),
        F64Gt => binary!(stack, pop_f64, |a, b| bool_value(a > b)),
        F64Le => binary!(stack, pop_f64, |a, b| bool_value(a <= b)),
        F64Ge => binary!(stack, pop_f64, |a, b| bool_value(a >= b)),

        // ====================================================================
        // Integer arithmetic
        // ====================================================================
        I32Clz => unary!(stack, pop_i32, |a| Value::I32(a.leading_zeros() as i32)),
        I32Ctz => unary!(stack, pop_i32, |a| Value::I32(a.trailing_zeros() as i32)),
        I32Popcnt => unary!(stack, pop_i32, |a| Value::I32(a.count_ones() as i32)),
        I32Add => binary!(stack, pop_i32, |a, b| Value::I32(a.wrapping_add(b))),
        I32Sub => binary!(stack, pop_i32, |a, b| Value::I32(a.wrapping_sub(b))),
        I32Mul => binary!(stack, pop_i32, |a, b| Value::I32(a.wrapping_mul(b))),
        I32DivS => binary!(stack, pop_i32, |a, b| Value::I32(i32_div_s(a, b, mode)?)),
        I32DivU => binary!(stack, pop_i32, |a, b| Value::I32(i32_div_u(a, b, mode)?)),
        I32RemS => binary!(stack, pop_i32, |a, b| Value::I32(i32_rem_s(a, b, mode)?)),
        I32RemU => binary!(stack, pop_i32, |a, b| Value::I32(i32_rem_u(a, b, mode)?)),
        I32And => binary!(stack, pop_i32, |a, b| Value::I32(a & b)),
        I32Or => binary!(stack, pop_i32, |a, b| Value::I32(a | b)),
        I32Xor => binary!(stack, pop_i32, |a, b| Value::I32(a ^ b)),
        I32Shl => binary!(stack, pop_i32, |a, b| Value::I32(a.wrapping_shl(b as u32))),
        I32ShrS => binary!(stack, pop_i32, |a, b| Value::I32(a.wrapping_shr(b as u32))),
        I32ShrU => {
            binary!(stack, pop_i32, |a, b| Value::I32((a as u32).wrapping_shr(b as u32) as i32))
        }
        I32Rotl => binary!(stack, pop_i32, |a, b| Value::I32(a.rotate_left(b as u32 % 32))),
        I32Rotr => binary!(stack, pop_i32, |a, b| Value::I32(a.rotate_right(b as u32 % 32))),

        I64Clz => unary!(stack, pop_i64, |a| Value::I64(a.leading_zeros() as i64)),
        I64Ctz => unary!(stack, pop_i64, |a| Value::I64(a.trailing_zeros() as i64)),
        I64Popcnt => unary!(stack, pop_i64, |a| Value::I64(a.count_ones() as i64)),
        I64Add => binary!(stack, pop_i64, |a, b| Value::I64(a.wrapping_add(b))),
        I64Sub => binary!(stack, pop_i64, |a, b| Value::I64(a.wrapping_sub(b))),
        I64Mul => binary!(stack, pop_i64, |a, b| Value::I64(a.wrapping_mul(b))),
        I64DivS => binary!(stack, pop_i64, |a, b| Value::I64(i64_div_s(a, b, mode)?)),
        I64DivU => binary!(stack, pop_i64, |a, b| Value::I64(i64_div_u(a, b, mode)?)),
        I64RemS => binary!(stack, pop_i64, |a, b| Value::I64(i64_rem_s(a, b, mode)?)),
        I64RemU => binary!(stack, pop_i64, |a, b| Value::I64(i64_rem_u(a, b, mode)?)),
        I64And => binary!(stack, pop_i64, |a, b| Value::I64(a & b)),
        I64Or => binary!(stack, pop_i64, |a, b| Value::I64(a | b)),
        I64Xor => binary!(stack, pop_i64, |a, b| Value::I64(a ^ b)),
        I64Shl => binary!(stack, pop_i64, |a, b| Value::I64(a.wrapping_shl(b as u32))),
        I64ShrS => binary!(stack, pop_i64, |a, b| Value::I64(a.wrapping_shr(b as u32))),
        I64ShrU => {
            binary!(stack, pop_i64, |a, b| Value::I64((a as u64).wrapping_shr(b as u32) as i64))
        }
        I64Rotl => {
            binary!(stack, pop_i64, |a, b| Value::I64(a.rotate_left((b as u64 % 64) as u32)))
        }
        I64Rotr => {
            binary!(stack, pop_i64, |a, b| Value::I64(a.rotate_right((b as u64 % 64) as u32)))
        }

        // ====================================================================
        // Float arithmetic
        // ====================================================================
        F32Abs => unary!(stack, pop_f32, |a| Value::F32(a.abs())),
        F32Neg => unary!(stack, pop_f32, |a| Value::F32(-a)),
        F32Ceil => unary!(stack, pop_f32, |a| Value::F32(a.ceil())),
        F32Floor => unary!(stack, pop_f32, |a| Value::F32(a.floor())),
        F32Trunc => unary!(stack, pop_f32, |a| Value::F32(a.trunc())),
        F32Nearest => unary!(stack, pop_f32, |a| Value::F32(a.round_ties_even())),
        F32Sqrt => unary!(stack, pop_f32, |a| Value::F32(a.sqrt())),
        F32Add => binary!(stack, pop_f32, |a, b| Value::F32(a + b)),
        F32Sub => binary!(stack, pop_f32, |a, b| Value::F32(a - b)),
        F32Mul => binary!(stack, pop_f32, |a, b| Value::F32(a * b)),
        F32Div => binary!(stack, pop_f32, |a, b| Value::F32(a / b)),
        F32Min => binary!(stack, pop_f32, |a, b| Value::F32(f32_min(a, b))),
        F32Max => binary!(stack, pop_f32, |a, b| Value::F32(f32_max(a, b))),
        F32Copysign => binary!(stack, pop_f32, |a, b| Value::F32(a.copysign(b))),

        F64Abs => unary!(stack, pop_f64, |a| Value::F64(a.abs())),
        F64Neg => unary!(stack, pop_f64, |a| Value::F64(-a)),
        F64Ceil => unary!(stack, pop_f64, |a| Value::F64(a.ceil())),
        F64Floor => unary!(stack, pop_f64, |a| Value::F64(a.floor())),
        F64Trunc => unary!(stack, pop_f64, |a| Value::F64(a.trunc())),
        F64Nearest => unary!(stack, pop_f64, |a| Value::F64(a.round_ties_even())),
        F64Sqrt => unary!(stack, pop_f64, |a| Value::F64(a.sqrt())),
        F64Add => binary!(stack, pop_f64, |a, b| Value::F64(a + b)),
        F64Sub => binary!(stack, pop_f64, |a, b| Value::F64(a - b)),
        F64Mul => binary!(stack, pop_f64, |a, b| Value::F64(a * b)),
        F64Div => binary!(stack, pop_f64, |a, b| Value::F64(a / b)),
        F64Min => binary!(stack, pop_f64, |a, b| Value::F64(f64_min(a, b))),
        F64Max => binary!(stack, pop_f64, |a, b| Value::F64(f64_max(a, b))),
        F64Copysign => binary!(stack, pop_f64, |a, b| Value::F64(a.copysign(b))),

        // ====================================================================
        // Conversions
        // ====================================================================
        I32WrapI64 => unary!(stack, pop_i64, |a| Value::I32(a as i32)),
        I32TruncF32S => unary!(stack, pop_f32, |a| Value::I32(trunc_i32_s(a as f64)?)),
        I32TruncF32U => unary!(stack, pop_f32, |a| Value::I32(trunc_i32_u(a as f64)?)),
        I32TruncF64S => unary!(stack, pop_f64, |a| Value::I32(trunc_i32_s(a)?)),
        I32TruncF64U => unary!(stack, pop_f64, |a| Value::I32(trunc_i32_u(a)?)),
        I64ExtendI32S => unary!(stack, pop_i32, |a| Value::I64(a as i64)),
        I64ExtendI32U => unary!(stack, pop_i32, |a| Value::I64(a as u32 as i64)),
        I64TruncF32S => unary!(stack, pop_f32, |a| Value::I64(trunc_i64_s(a as f64)?)),
        I64TruncF32U => unary!(stack, pop_f32, |a| Value::I64(trunc_i64_u(a as f64)?)),
        I64TruncF64S => unary!(stack, pop_f64, |a| Value::I64(trunc_i64_s(a)?)),
        I64TruncF64U => unary!(stack, pop_f64, |a| Value::I64(trunc_i64_u(a)?)),
        F32ConvertI32S => unary!(stack, pop_i32, |a| Value::F32(a as f32)),
        F32ConvertI32U => unary!(stack, pop_i32, |a| Value::F32(a as u32 as f32)),
        F32ConvertI64S => unary!(stack, pop_i64, |a| Value::F32(a as f32)),
        F32ConvertI64U => unary!(stack, pop_i64, |a| Value::F32(a as u64 as f32)),
        F32DemoteF64 => unary!(stack, pop_f64, |a| Value::F32(a as f32)),
        F64ConvertI32S => unary!(stack, pop_i32, |a| Value::F64(a as f64)),
        F64ConvertI32U => unary!(stack, pop_i32, |a| Value::F64(a as u32 as f64)),
        F64ConvertI64S => unary!(stack, pop_i64, |a| Value::F64(a as f64)),
        F64ConvertI64U => unary!(stack, pop_i64, |a| Value::F64(a as u64 as f64)),
        F64PromoteF32 => unary!(stack, pop_f32, |a| Value::F64(a as f64)),
        I32ReinterpretF32 => unary!(stack, pop_f32, |a| Value::I32(a.to_bits() as i32)),
        I64ReinterpretF64 => unary!(stack, pop_f64, |a| Value::I64(a.to_bits() as i64)),
        F32ReinterpretI32 => unary!(stack, pop_i32, |a| Value::F32(f32::from_bits(a as u32))),
        F64ReinterpretI64 => unary!(stack, pop_i64, |a| Value::F64(f64::from_bits(a as u64))),

        I32Extend8S => unary!(stack, pop_i32, |a| Value::I32(a as i8 as i32)),
        I32Extend16S => unary!(stack, pop_i32, |a| Value::I32(a as i16 as i32)),
        I64Extend8S => unary!(stack, pop_i64, |a| Value::I64(a as i8 as i64)),
        I64Extend16S => unary!(stack, pop_i64, |a| Value::I64(a as i16 as i64)),
        I64Extend32S => unary!(stack, pop_i64, |a| Value::I64(a as i32 as i64)),
    };

    stack.push(result);
    Ok(())
}

// ============================================================================
// Division
// ============================================================================

macro_rules! division {
    ($div_s:ident, $div_u:ident, $rem_s:ident, $rem_u:ident, $s:ty, $u:ty) => {
        fn $div_s(a: $s, b: $s, mode: ArithmeticMode) -> Result<$s, TrapReason> {
            if b == 0 {
                return by_zero(mode);
            }
            if a == <$s>::MIN && b == -1 {
                return match mode {
                    ArithmeticMode::Trapping => Err(TrapReason::IntegerOverflow),
                    ArithmeticMode::AsmJs => Ok(<$s>::MIN),
                };
            }
            Ok(a / b)
        }

        fn $div_u(a: $s, b: $s, mode: ArithmeticMode) -> Result<$s, TrapReason> {
            if b == 0 {
                return by_zero(mode);
            }
            Ok(((a as $u) / (b as $u)) as $s)
        }

        fn $rem_s(a: $s, b: $s, mode: ArithmeticMode) -> Result<$s, TrapReason> {
            if b == 0 {
                return by_zero(mode);
            }
            // MIN % -1 is 0, not an overflow
            Ok(a.wrapping_rem(b))
        }

        fn $rem_u(a: $s, b: $s, mode: ArithmeticMode) -> Result<$s, TrapReason> {
            if b == 0 {
                return by_zero(mode);
            }
            Ok(((a as $u) % (b as $u)) as $s)
        }
    };
}

fn by_zero<T: Default>(mode: ArithmeticMode) -> Result<T, TrapReason> {
    match mode {
        ArithmeticMode::Trapping => Err(TrapReason::DivideByZero),
        ArithmeticMode::AsmJs => Ok(T::default()),
    }
}

division!(i32_div_s, i32_div_u, i32_rem_s, i32_rem_u, i32, u32);
division!(i64_div_s, i64_div_u, i64_rem_s, i64_rem_u, i64, u64);

// ============================================================================
// Float helpers
// ============================================================================

macro_rules! min_max {
    ($min:ident, $max:ident, $t:ty) => {
        /// NaN-propagating minimum with -0 < +0.
        fn $min(a: $t, b: $t) -> $t {
            if a.is_nan() || b.is_nan() {
                <$t>::NAN
            } else if a == b {
                if a.is_sign_negative() {
                    a
                } else {
                    b
                }
            } else {
                a.min(b)
            }
        }

        /// NaN-propagating maximum with +0 > -0.
        fn $max(a: $t, b: $t) -> $t {
            if a.is_nan() || b.is_nan() {
                <$t>::NAN
            } else if a == b {
                if a.is_sign_positive() {
                    a
                } else {
                    b
                }
            } else {
                a.max(b)
            }
        }
    };
}

min_max!(f32_min, f32_max, f32);
min_max!(f64_min, f64_max, f64);

// f32 operands are widened exactly, so one set of bounds serves both widths.

fn trunc_i32_s(x: f64) -> Result<i32, TrapReason> {
    if x.is_nan() {
        return Err(TrapReason::InvalidConversion);
    }
    if !(x > -2147483649.0 && x < 2147483648.0) {
        return Err(TrapReason::IntegerOverflow);
    }
    Ok(x as i32)
}

fn trunc_i32_u(x: f64) -> Result<i32, TrapReason> {
    if x.is_nan() {
        return Err(TrapReason::InvalidConversion);
    }
    if !(x > -1.0 && x < 4294967296.0) {
        return Err(TrapReason::IntegerOverflow);
    }
    Ok(x as u32 as i32)
}

fn trunc_i64_s(x: f64) -> Result<i64, TrapReason> {
    if x.is_nan() {
        return Err(TrapReason::InvalidConversion);
    }
    if !(x >= -9223372036854775808.0 && x < 9223372036854775808.0) {
        return Err(TrapReason::IntegerOverflow);
    }
    Ok(x as i64)
}

fn trunc_i64_u(x: f64) -> Result<i64, TrapReason> {
    if x.is_nan() {
        return Err(TrapReason::InvalidConversion);
    }
    if !(x > -1.0 && x < 18446744073709551616.0) {
        return Err(TrapReason::IntegerOverflow);
    }
    Ok(x as u64 as i64)
}
