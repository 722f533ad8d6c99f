//! Binary encoding primitives for WebAssembly values.
//!
//! Provides the binary format constants shared by the decoder, verifier and
//! encoder, and LEB128 / IEEE 754 writers used by the encoder.
//!
//! All writers append directly into a caller-provided `&mut Vec<u8>` buffer.

use byteorder::{LittleEndian, WriteBytesExt};

// ---------------------------------------------------------------------------
// WebAssembly binary format constants
// ---------------------------------------------------------------------------

pub const MAGIC: &[u8; 4] = b"\0asm";
pub const VERSION: u32 = 1;

// Section IDs
pub const SECTION_CUSTOM: u8 = 0;
pub const SECTION_TYPE: u8 = 1;
pub const SECTION_IMPORT: u8 = 2;
pub const SECTION_FUNCTION: u8 = 3;
pub const SECTION_TABLE: u8 = 4;
pub const SECTION_MEMORY: u8 = 5;
pub const SECTION_GLOBAL: u8 = 6;
pub const SECTION_EXPORT: u8 = 7;
pub const SECTION_START: u8 = 8;
pub const SECTION_ELEMENT: u8 = 9;
pub const SECTION_CODE: u8 = 10;
pub const SECTION_DATA: u8 = 11;
pub const SECTION_DATA_COUNT: u8 = 12;

// Type constructors
pub const TYPE_FUNC: u8 = 0x60;
pub const TYPE_I32: u8 = 0x7f;
pub const TYPE_I64: u8 = 0x7e;
pub const TYPE_F32: u8 = 0x7d;
pub const TYPE_F64: u8 = 0x7c;
pub const TYPE_FUNCREF: u8 = 0x70;

// Import/export descriptor kinds
pub const DESC_FUNC: u8 = 0x00;
pub const DESC_TABLE: u8 = 0x01;
pub const DESC_MEMORY: u8 = 0x02;
pub const DESC_GLOBAL: u8 = 0x03;

// Block type: empty
pub const BLOCK_TYPE_EMPTY: u8 = 0x40;

// Control and structural opcodes
pub const OP_UNREACHABLE: u8 = 0x00;
pub const OP_NOP: u8 = 0x01;
pub const OP_BLOCK: u8 = 0x02;
pub const OP_LOOP: u8 = 0x03;
pub const OP_IF: u8 = 0x04;
pub const OP_ELSE: u8 = 0x05;
pub const OP_END: u8 = 0x0b;
pub const OP_BR: u8 = 0x0c;
pub const OP_BR_IF: u8 = 0x0d;
pub const OP_BR_TABLE: u8 = 0x0e;
pub const OP_RETURN: u8 = 0x0f;
pub const OP_CALL: u8 = 0x10;
pub const OP_CALL_INDIRECT: u8 = 0x11;
pub const OP_DROP: u8 = 0x1a;
pub const OP_SELECT: u8 = 0x1b;
pub const OP_LOCAL_GET: u8 = 0x20;
pub const OP_LOCAL_SET: u8 = 0x21;
pub const OP_LOCAL_TEE: u8 = 0x22;
pub const OP_GLOBAL_GET: u8 = 0x23;
pub const OP_GLOBAL_SET: u8 = 0x24;
pub const OP_MEMORY_SIZE: u8 = 0x3f;
pub const OP_MEMORY_GROW: u8 = 0x40;
pub const OP_I32_CONST: u8 = 0x41;
pub const OP_I64_CONST: u8 = 0x42;
pub const OP_F32_CONST: u8 = 0x43;
pub const OP_F64_CONST: u8 = 0x44;

// Linear memory page size (64KiB)
pub const PAGE_SIZE: u32 = 65536;
/// Largest page count a 32-bit memory can declare.
pub const MAX_PAGES: u32 = 65536;

// ---------------------------------------------------------------------------
// Unsigned LEB128
// ---------------------------------------------------------------------------

fn write_vu(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            break;
        }
        byte |= 0x80;
        buf.push(byte);
    }
}

pub fn write_vu32(buf: &mut Vec<u8>, v: u32) {
    write_vu(buf, v as u64);
}

pub fn write_vu64(buf: &mut Vec<u8>, v: u64) {
    write_vu(buf, v);
}

// ---------------------------------------------------------------------------
// Signed LEB128
// ---------------------------------------------------------------------------

fn write_vs(buf: &mut Vec<u8>, mut value: i64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
        if done {
            buf.push(byte);
            break;
        }
        buf.push(byte | 0x80);
    }
}

pub fn write_vs32(buf: &mut Vec<u8>, v: i32) {
    write_vs(buf, v as i64);
}

pub fn write_vs64(buf: &mut Vec<u8>, v: i64) {
    write_vs(buf, v);
}

// ---------------------------------------------------------------------------
// Floats, names and vectors
// ---------------------------------------------------------------------------

pub fn write_f32(buf: &mut Vec<u8>, v: f32) {
    // writes into a Vec cannot fail
    let _ = buf.write_f32::<LittleEndian>(v);
}

pub fn write_f64(buf: &mut Vec<u8>, v: f64) {
    let _ = buf.write_f64::<LittleEndian>(v);
}

pub fn write_name(buf: &mut Vec<u8>, name: &str) {
    write_vu32(buf, name.len() as u32);
    buf.extend_from_slice(name.as_bytes());
}

/// Appends a section: id, LEB128 byte length, contents.
pub fn write_section(buf: &mut Vec<u8>, id: u8, contents: &[u8]) {
    buf.push(id);
    write_vu32(buf, contents.len() as u32);
    buf.extend_from_slice(contents);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_vu32() {
        let emit = |v: u32| {
            let mut buf = Vec::new();
            write_vu32(&mut buf, v);
            buf
        };

        assert_eq!(emit(0), vec![0]);
        assert_eq!(emit(624485), vec![0b11100101, 0b10001110, 0b00100110]);
        assert_eq!(emit(127), vec![0x7f]);
        assert_eq!(emit(16256), vec![0x80, 0x7f]);
        assert_eq!(emit(0xffffffff), vec![0xff, 0xff, 0xff, 0xff, 0xf]);
    }

    #[test]
    fn test_write_vs() {
        let emit32 = |v: i32| {
            let mut buf = Vec::new();
            write_vs32(&mut buf, v);
            buf
        };
        let emit64 = |v: i64| {
            let mut buf = Vec::new();
            write_vs64(&mut buf, v);
            buf
        };

        assert_eq!(emit32(-1), vec![0x7f]);
        assert_eq!(emit32(-128), vec![0x80, 0x7f]);
        assert_eq!(emit32(63), vec![0x3f]);
        assert_eq!(emit32(64), vec![0xc0, 0x00]);
        assert_eq!(emit32(i32::MIN), vec![128, 128, 128, 128, 120]);
        assert_eq!(
            emit64(i64::MIN),
            vec![128, 128, 128, 128, 128, 128, 128, 128, 128, 127]
        );
    }

    #[test]
    fn test_write_section() {
        let mut buf = Vec::new();
        write_section(&mut buf, SECTION_START, &[3]);
        assert_eq!(buf, vec![SECTION_START, 1, 3]);
    }
}
