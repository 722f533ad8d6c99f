//! Memory loads and stores
//!
//! The effective address is the unsigned 32-bit operand plus the static
//! offset, computed in 64 bits so it cannot wrap.

use crate::parser::instruction::{LoadOp, StoreOp};
use crate::runtime::{LinearMemory, Stack, TrapReason, Value};
use byteorder::{ByteOrder, LittleEndian};

fn effective_address(addr: i32, offset: u32) -> u64 {
    addr as u32 as u64 + offset as u64
}

pub fn load(
    memory: &LinearMemory,
    op: LoadOp,
    addr: i32,
    offset: u32,
) -> Result<Value, TrapReason> {
    let bytes = memory.read(effective_address(addr, offset), op.width() as usize)?;
    let value = match op {
        LoadOp::I32 => Value::I32(LittleEndian::read_i32(bytes)),
        LoadOp::I64 => Value::I64(LittleEndian::read_i64(bytes)),
        LoadOp::F32 => Value::F32(LittleEndian::read_f32(bytes)),
        LoadOp::F64 => Value::F64(LittleEndian::read_f64(bytes)),
        LoadOp::I32_8S => Value::I32(bytes[0] as i8 as i32),
        LoadOp::I32_8U => Value::I32(bytes[0] as i32),
        LoadOp::I32_16S => Value::I32(LittleEndian::read_i16(bytes) as i32),
        LoadOp::I32_16U => Value::I32(LittleEndian::read_u16(bytes) as i32),
        LoadOp::I64_8S => Value::I64(bytes[0] as i8 as i64),
        LoadOp::I64_8U => Value::I64(bytes[0] as i64),
        LoadOp::I64_16S => Value::I64(LittleEndian::read_i16(bytes) as i64),
        LoadOp::I64_16U => Value::I64(LittleEndian::read_u16(bytes) as i64),
        LoadOp::I64_32S => Value::I64(LittleEndian::read_i32(bytes) as i64),
        LoadOp::I64_32U => Value::I64(LittleEndian::read_u32(bytes) as i64),
    };
    Ok(value)
}

pub fn store(
    memory: &mut LinearMemory,
    op: StoreOp,
    addr: i32,
    offset: u32,
    value: Value,
) -> Result<(), TrapReason> {
    if value.typ() != op.value_type() {
        return Err(TrapReason::TypeMismatch {
            expected: op.value_type(),
            actual: value.typ(),
        });
    }
    let mut buf = [0u8; 8];
    // narrow stores keep the low bytes of the little-endian encoding
    match value {
        Value::I32(v) => LittleEndian::write_i32(&mut buf, v),
        Value::I64(v) => LittleEndian::write_i64(&mut buf, v),
        Value::F32(v) => LittleEndian::write_f32(&mut buf, v),
        Value::F64(v) => LittleEndian::write_f64(&mut buf, v),
    }
    memory.write(effective_address(addr, offset), &buf[..op.width() as usize])
}

/// Pops the address, loads and pushes the value.
pub fn execute_load(
    memory: &LinearMemory,
    stack: &mut Stack,
    op: LoadOp,
    offset: u32,
) -> Result<(), TrapReason> {
    let addr = stack.pop_i32()?;
    stack.push(load(memory, op, addr, offset)?);
    Ok(())
}

/// Pops the value then the address and stores.
pub fn execute_store(
    memory: &mut LinearMemory,
    stack: &mut Stack,
    op: StoreOp,
    offset: u32,
) -> Result<(), TrapReason> {
    let value = stack.pop()?;
    let addr = stack.pop_i32()?;
    store(memory, op, addr, offset, value)
}
