//! Linear memory
//!
//! A [`LinearMemory`] always knows its declared size, but its backing storage
//! is optional: the interpreted path runs with a size-only memory, so every
//! load and store there traps. All accesses are bounds-checked before the
//! storage is touched.

use super::TrapReason;
use crate::parser::encoding::{MAX_PAGES, PAGE_SIZE};

#[derive(Debug, Clone)]
pub struct LinearMemory {
    /// Zero-initialised storage, absent for size-only memories
    data: Option<Vec<u8>>,
    pages: u32,
}

impl LinearMemory {
    /// A memory of `pages` pages with no storage behind it.
    pub fn without_backing(pages: u32) -> LinearMemory {
        LinearMemory {
            data: None,
            pages: pages.min(MAX_PAGES),
        }
    }

    /// A zero-filled memory of `pages` pages.
    pub fn with_backing(pages: u32) -> LinearMemory {
        let pages = pages.min(MAX_PAGES);
        LinearMemory {
            data: Some(vec![0u8; pages as usize * PAGE_SIZE as usize]),
            pages,
        }
    }

    pub fn pages(&self) -> u32 {
        self.pages
    }

    /// Declared size in bytes.
    pub fn size(&self) -> u64 {
        self.pages as u64 * PAGE_SIZE as u64
    }

    pub fn has_backing(&self) -> bool {
        self.data.is_some()
    }

    /// Growth is never supported: reports failure with -1.
    pub fn grow(&mut self, _delta_pages: u32) -> i32 {
        -1
    }

    #[inline]
    fn check_bounds(&self, addr: u64, len: usize) -> Result<std::ops::Range<usize>, TrapReason> {
        let data = self.data.as_ref().ok_or(TrapReason::MemoryOutOfBounds)?;
        let end = addr
            .checked_add(len as u64)
            .ok_or(TrapReason::MemoryOutOfBounds)?;
        if end > data.len() as u64 {
            return Err(TrapReason::MemoryOutOfBounds);
        }
        Ok(addr as usize..end as usize)
    }

    pub fn read(&self, addr: u64, len: usize) -> Result<&[u8], TrapReason> {
        let range = self.check_bounds(addr, len)?;
        match &self.data {
            Some(data) => Ok(&data[range]),
            None => Err(TrapReason::MemoryOutOfBounds),
        }
    }

    pub fn write(&mut self, addr: u64, bytes: &[u8]) -> Result<(), TrapReason> {
        let range = self.check_bounds(addr, bytes.len())?;
        match &mut self.data {
            Some(data) => {
                data[range].copy_from_slice(bytes);
                Ok(())
            }
            None => Err(TrapReason::MemoryOutOfBounds),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_without_backing_traps() {
        let memory = LinearMemory::without_backing(2);
        assert_eq!(memory.pages(), 2);
        assert_eq!(memory.size(), 2 * 65536);
        assert!(!memory.has_backing());
        assert_eq!(memory.read(0, 1), Err(TrapReason::MemoryOutOfBounds));
    }

    #[test]
    fn test_bounds() {
        let mut memory = LinearMemory::with_backing(1);
        memory.write(65532, &[1, 2, 3, 4]).unwrap();
        assert_eq!(memory.read(65532, 4).unwrap(), &[1, 2, 3, 4]);
        assert_eq!(memory.read(65533, 4), Err(TrapReason::MemoryOutOfBounds));
        assert_eq!(memory.write(u64::MAX, &[0]), Err(TrapReason::MemoryOutOfBounds));
        // zero-length access at the very end is in bounds
        assert!(memory.read(65536, 0).is_ok());
    }

    #[test]
    fn test_grow_always_fails() {
        let mut memory = LinearMemory::with_backing(1);
        assert_eq!(memory.grow(1), -1);
        assert_eq!(memory.pages(), 1);
    }
}
