use byteorder::{ByteOrder, LittleEndian};

use super::{DecodeError, DecodeErrorKind};

/// Cursor over a borrowed byte slice.
///
/// Every read reports failures as a [`DecodeError`] carrying the absolute
/// offset of the failing read, so diagnostics point into the original buffer
/// even when the reader only covers a sub-range (e.g. a function body).
pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Reader<'a> {
        Reader { bytes, pos: 0, base: 0 }
    }

    /// Reader over `bytes` whose offsets are reported relative to `base`.
    pub fn with_base(bytes: &'a [u8], base: usize) -> Reader<'a> {
        Reader { bytes, pos: 0, base }
    }

    // Basic operations --------------------------------------------------------

    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Absolute offset of the cursor.
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    pub fn has_at_least(&self, count: usize) -> bool {
        self.remaining() >= count
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn error(&self, kind: DecodeErrorKind) -> DecodeError {
        DecodeError::new(self.offset(), kind)
    }

    pub fn read_byte(&mut self) -> Result<u8, DecodeError> {
        match self.bytes.get(self.pos) {
            Some(byte) => {
                self.pos += 1;
                Ok(*byte)
            }
            None => Err(self.error(DecodeErrorKind::UnexpectedEnd)),
        }
    }

    pub fn peek_byte(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if !self.has_at_least(len) {
            return Err(self.error(DecodeErrorKind::UnexpectedEnd));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), DecodeError> {
        self.read_bytes(len).map(|_| ())
    }

    // Read and interpret types ------------------------------------------------

    // le
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.read_bytes(4)?;
        Ok(LittleEndian::read_u32(bytes))
    }

    pub fn read_vu32(&mut self) -> Result<u32, DecodeError> {
        self.read_vu(32).map(|v| v as u32)
    }

    pub fn read_vu64(&mut self) -> Result<u64, DecodeError> {
        self.read_vu(64)
    }

    pub fn read_vs32(&mut self) -> Result<i32, DecodeError> {
        self.read_vs(32).map(|v| v as i32)
    }

    pub fn read_vs64(&mut self) -> Result<i64, DecodeError> {
        self.read_vs(64)
    }

    pub fn read_f32(&mut self) -> Result<f32, DecodeError> {
        let bytes = self.read_bytes(4)?;
        Ok(LittleEndian::read_f32(bytes))
    }

    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        let bytes = self.read_bytes(8)?;
        Ok(LittleEndian::read_f64(bytes))
    }

    /// Length-prefixed UTF-8 name.
    pub fn read_name(&mut self) -> Result<String, DecodeError> {
        let start = self.offset();
        let len = self.read_vu32()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| DecodeError::new(start, DecodeErrorKind::InvalidUtf8))
    }

    /// A vector length prefix, rejected early when it cannot possibly fit in
    /// the remaining bytes (every element occupies at least one byte).
    pub fn read_count(&mut self) -> Result<usize, DecodeError> {
        let start = self.offset();
        let count = self.read_vu32()? as usize;
        if count > self.remaining() {
            return Err(DecodeError::new(
                start,
                DecodeErrorKind::CountTooLarge(count as u64),
            ));
        }
        Ok(count)
    }

    fn read_vu(&mut self, size: u32) -> Result<u64, DecodeError> {
        let start = self.offset();
        let max_bytes = (size + 6) / 7;
        let mut result: u64 = 0;

        for i in 0..max_bytes {
            let b = self.read_byte()?;
            let shift = 7 * i;
            if i == max_bytes - 1 {
                // unused high bits of the final byte must be zero
                let used = size - shift;
                if used < 7 && (b & 0x7f) >> used != 0 {
                    return Err(DecodeError::new(start, DecodeErrorKind::IntegerTooLarge));
                }
            }
            result |= ((b & 0x7f) as u64) << shift;
            if b & 0x80 == 0 {
                return Ok(result);
            }
        }

        Err(DecodeError::new(start, DecodeErrorKind::IntegerRepresentationTooLong))
    }

    fn read_vs(&mut self, size: u32) -> Result<i64, DecodeError> {
        let start = self.offset();
        let max_bytes = (size + 6) / 7;
        let mut result: i64 = 0;
        let mut shift = 0;

        for i in 0..max_bytes {
            let b = self.read_byte()?;
            if i == max_bytes - 1 {
                // the unused bits of the final byte must sign-extend the value
                let used = size - shift;
                if used < 7 {
                    let upper = (b & 0x7f) >> (used - 1);
                    if upper != 0 && upper != 0x7f >> (used - 1) {
                        return Err(DecodeError::new(start, DecodeErrorKind::IntegerTooLarge));
                    }
                }
            }
            result |= ((b & 0x7f) as i64) << shift;
            shift += 7;
            if b & 0x80 == 0 {
                if shift < 64 && (b & 0x40) != 0 {
                    result |= -1i64 << shift;
                }
                return Ok(result);
            }
        }

        Err(DecodeError::new(start, DecodeErrorKind::IntegerRepresentationTooLong))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::encoding::{write_vs32, write_vs64, write_vu32, write_vu64};
    use rand::Rng;

    fn vu32(bytes: &[u8]) -> Result<u32, DecodeError> {
        Reader::new(bytes).read_vu32()
    }

    fn vs32(bytes: &[u8]) -> Result<i32, DecodeError> {
        Reader::new(bytes).read_vs32()
    }

    fn vs64(bytes: &[u8]) -> Result<i64, DecodeError> {
        Reader::new(bytes).read_vs64()
    }

    #[test]
    fn test_read_u32() {
        let read = |v: &[u8]| Reader::new(v).read_u32().expect("Failed to read u32");

        assert_eq!(read(&[0, 0, 0, 0]), 0);
        assert_eq!(read(&[1, 0, 0, 0]), 1);
        assert_eq!(read(&[0, 1, 0, 0]), 256);
        assert_eq!(read(&[0x00, 0x61, 0x73, 0x6d]), 0x6d736100);
        assert_eq!(read(&[0xff, 0xff, 0xff, 0xff]), 4294967295);
        assert!(Reader::new(&[1, 2, 3]).read_u32().is_err());
    }

    #[test]
    fn test_read_vu32() {
        assert_eq!(vu32(&[0]).unwrap(), 0);
        assert_eq!(vu32(&[1]).unwrap(), 1);
        assert_eq!(vu32(&[0b11100101, 0b10001110, 0b00100110]).unwrap(), 624485);
        assert_eq!(vu32(&[0x7f]).unwrap(), 127);
        assert_eq!(vu32(&[0x80, 0x7f]).unwrap(), 16256);
        assert_eq!(vu32(&[0xff, 0xff, 0xff, 0xff, 0x0f]).unwrap(), 0xffffffff);
        assert_eq!(vu32(&[128, 128, 128, 128, 8]).unwrap(), 0x80000000);
        // non-minimal but in range
        assert_eq!(vu32(&[0x80, 0x80, 0x80, 0x80, 0x00]).unwrap(), 0);
    }

    #[test]
    fn test_read_vu32_rejects_malformed() {
        assert_eq!(
            vu32(&[0xff, 0xff, 0xff, 0xff, 0x1f]).unwrap_err().kind,
            DecodeErrorKind::IntegerTooLarge
        );
        assert_eq!(
            vu32(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x00]).unwrap_err().kind,
            DecodeErrorKind::IntegerRepresentationTooLong
        );
        assert_eq!(vu32(&[0x80]).unwrap_err().kind, DecodeErrorKind::UnexpectedEnd);
    }

    #[test]
    fn test_read_vs32() {
        assert_eq!(vs32(&[0]).unwrap(), 0);
        assert_eq!(vs32(&[1]).unwrap(), 1);
        assert_eq!(vs32(&[0x7f]).unwrap(), -1);
        assert_eq!(vs32(&[0x80, 0x7f]).unwrap(), -128);
        assert_eq!(vs32(&[0b10011011, 0b11110001, 0b01011001]).unwrap(), -624485);
        assert_eq!(vs32(&[128, 128, 128, 128, 120]).unwrap(), i32::MIN);
        assert_eq!(vs32(&[0xff, 0xff, 0xff, 0xff, 0x07]).unwrap(), i32::MAX);
        assert_eq!(
            vs32(&[0xff, 0xff, 0xff, 0xff, 0x0f]).unwrap_err().kind,
            DecodeErrorKind::IntegerTooLarge
        );
    }

    #[test]
    fn test_read_vs64() {
        assert_eq!(vs64(&[0x7f]).unwrap(), -1);
        assert_eq!(
            vs64(&[128, 128, 128, 128, 128, 128, 128, 252, 255, 0]).unwrap(),
            0x7ff8000000000000
        );
        assert_eq!(
            vs64(&[128, 128, 128, 128, 128, 128, 128, 128, 128, 127]).unwrap(),
            i64::MIN
        );
    }

    #[test]
    fn test_read_floats() {
        let mut reader = Reader::new(&[0, 0, 192, 127, 24, 45, 68, 84, 251, 33, 25, 64]);
        assert!(reader.read_f32().unwrap().is_nan());
        assert_eq!(reader.read_f64().unwrap(), 6.28318530717958623);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_read_name() {
        let mut reader = Reader::new(&[4, b'm', b'a', b'i', b'n', 2, 0xc3, 0x28]);
        assert_eq!(reader.read_name().unwrap(), "main");
        assert_eq!(reader.read_name().unwrap_err().kind, DecodeErrorKind::InvalidUtf8);
    }

    #[test]
    fn test_offsets_are_absolute() {
        let mut reader = Reader::with_base(&[0x80], 100);
        let err = reader.read_vu32().unwrap_err();
        assert_eq!(err.offset, 101);
    }

    #[test]
    fn test_leb128_random_values() {
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let (a, b, c, d): (u32, u64, i32, i64) = (rng.gen(), rng.gen(), rng.gen(), rng.gen());
            let mut buf = Vec::new();
            write_vu32(&mut buf, a);
            write_vu64(&mut buf, b);
            write_vs32(&mut buf, c);
            write_vs64(&mut buf, d);

            let mut reader = Reader::new(&buf);
            assert_eq!(reader.read_vu32().unwrap(), a);
            assert_eq!(reader.read_vu64().unwrap(), b);
            assert_eq!(reader.read_vs32().unwrap(), c);
            assert_eq!(reader.read_vs64().unwrap(), d);
            assert!(reader.is_empty());
        }
    }
}
