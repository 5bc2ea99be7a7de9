//! Physical memory.

use thiserror::Error;

macro_rules! access_fns {
    ( $( $read_fn:ident, $write_fn:ident => $u:ident ),* $(,)? ) => {
        $(
            /// Little-endian read of the value at physical address `address`.
            ///
            /// The address doesn't need to be naturally aligned.
            pub fn $read_fn(&self, address: u64) -> Result<$u, MemoryError> {
                let mut buf = [0u8; std::mem::size_of::<$u>()];
                self.read(&mut buf, address)?;
                Ok($u::from_le_bytes(buf))
            }

            /// Little-endian write of `value` at physical address `address`.
            ///
            /// The address doesn't need to be naturally aligned.
            pub fn $write_fn(&mut self, address: u64, value: $u) -> Result<(), MemoryError> {
                self.write(address, &value.to_le_bytes())
            }
        )*
    };
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum MemoryError {
    #[error("physical access of {size} bytes at {address:#x} is outside of memory")]
    OutOfRange { address: u64, size: usize },
}

/// Byte-addressable RAM covering one continuous physical range starting at `base`.
///
/// This can be categorized as *main memory* according to the types of memory resources defined by
/// the RISC-V spec. Accesses that fall (partially) outside of the range fail as a whole, without
/// touching any byte.
#[derive(Debug, Clone)]
pub struct Memory {
    base: u64,
    data: Vec<u8>,
}

impl Memory {
    /// Create a new zero-initialized memory of `size` bytes starting at physical address `base`.
    pub fn new(base: u64, size: usize) -> Self {
        Self {
            base,
            data: vec![0; size],
        }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    /// Returns the size expressed in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` if every byte of `[address, address + size)` is backed by memory.
    pub fn contains(&self, address: u64, size: usize) -> bool {
        self.offset(address, size).is_ok()
    }

    /// Reads `buf.len()` bytes starting at `address`.
    pub fn read(&self, buf: &mut [u8], address: u64) -> Result<(), MemoryError> {
        let offset = self.offset(address, buf.len())?;
        buf.copy_from_slice(&self.data[offset..offset + buf.len()]);
        Ok(())
    }

    /// Writes all of `buf` starting at `address`.
    pub fn write(&mut self, address: u64, buf: &[u8]) -> Result<(), MemoryError> {
        let offset = self.offset(address, buf.len())?;
        self.data[offset..offset + buf.len()].copy_from_slice(buf);
        Ok(())
    }

    pub fn read_byte(&self, address: u64) -> Result<u8, MemoryError> {
        let mut buf = [0];
        self.read(&mut buf, address).map(|()| buf[0])
    }

    pub fn write_byte(&mut self, address: u64, value: u8) -> Result<(), MemoryError> {
        self.write(address, &[value])
    }

    access_fns! {
        read_halfword, write_halfword => u16,
        read_word, write_word => u32,
        read_doubleword, write_doubleword => u64,
    }

    fn offset(&self, address: u64, size: usize) -> Result<usize, MemoryError> {
        let error = MemoryError::OutOfRange { address, size };
        let offset = address.checked_sub(self.base).ok_or(error.clone())?;
        let end = offset.checked_add(size as u64).ok_or(error.clone())?;
        if end > self.data.len() as u64 {
            return Err(error);
        }
        Ok(offset as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_little_endian() {
        let mut memory = Memory::new(0x8000_0000, 64);
        memory.write_word(0x8000_0000, 0x1234_5678).unwrap();
        assert_eq!(0x78, memory.read_byte(0x8000_0000).unwrap());
        assert_eq!(0x1234, memory.read_halfword(0x8000_0002).unwrap());
        memory.write_doubleword(0x8000_0009, u64::MAX).unwrap();
        assert_eq!(0xFFFF_FF00, memory.read_word(0x8000_0008).unwrap());
    }

    #[test]
    fn test_out_of_range() {
        let mut memory = Memory::new(0x1000, 16);
        assert_eq!(
            Err(MemoryError::OutOfRange {
                address: 0xFFF,
                size: 1
            }),
            memory.read_byte(0xFFF)
        );
        assert!(memory.read_word(0x100C).is_ok());
        assert!(memory.read_word(0x100D).is_err());
        assert!(memory.write_doubleword(u64::MAX - 3, 0).is_err());
        // A failed write leaves memory untouched.
        assert!(memory.write(0x100E, &[1, 2, 3]).is_err());
        assert_eq!(0, memory.read_halfword(0x100E).unwrap());
        assert!(memory.contains(0x1000, 16));
        assert!(!memory.contains(0x1000, 17));
    }
}
