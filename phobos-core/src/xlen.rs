//! Word width (XLEN) selection.
//!
//! All integer registers are stored as `u64`. For RV32 the upper half is kept zero, so every value
//! that flows back into a register must go through [`Xlen::truncate`]. Instruction handlers are
//! written once as generic functions over [`Xlen`] and instantiated per width when the handler
//! tables are built.

use std::fmt;

/// Runtime tag for the two supported word widths.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum WordWidth {
    W32,
    W64,
}

impl WordWidth {
    /// Number of bits in a word of this width.
    pub fn bits(self) -> u32 {
        match self {
            Self::W32 => 32,
            Self::W64 => 64,
        }
    }

    /// Returns `value` with all bits above this width cleared.
    pub fn truncate(self, value: u64) -> u64 {
        match self {
            Self::W32 => Rv32::truncate(value),
            Self::W64 => Rv64::truncate(value),
        }
    }
}

impl fmt::Display for WordWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rv{}", self.bits())
    }
}

/// Compile-time word width.
pub trait Xlen: 'static + Copy + fmt::Debug {
    const WIDTH: WordWidth;
    const BITS: u32;
    /// Mask applied to shift amounts taken from registers or immediates.
    const SHAMT_MASK: u32;

    /// Clears all bits above `BITS`.
    fn truncate(value: u64) -> u64;

    /// Interprets the low `BITS` bits of `value` as a two's complement integer.
    fn to_signed(value: u64) -> i64;

    /// Sign-extends a 32-bit result as the RV64 `*W` instructions do, then truncates to `BITS`.
    fn sign_extend_word(value: u32) -> u64 {
        Self::truncate(value as i32 as i64 as u64)
    }

    /// Converts a sign-extended immediate into a register value.
    fn from_signed(value: i64) -> u64 {
        Self::truncate(value as u64)
    }
}

#[derive(Debug, Copy, Clone)]
pub struct Rv32;

#[derive(Debug, Copy, Clone)]
pub struct Rv64;

impl Xlen for Rv32 {
    const WIDTH: WordWidth = WordWidth::W32;
    const BITS: u32 = 32;
    const SHAMT_MASK: u32 = 0x1F;

    fn truncate(value: u64) -> u64 {
        value & 0xFFFF_FFFF
    }

    fn to_signed(value: u64) -> i64 {
        value as u32 as i32 as i64
    }
}

impl Xlen for Rv64 {
    const WIDTH: WordWidth = WordWidth::W64;
    const BITS: u32 = 64;
    const SHAMT_MASK: u32 = 0x3F;

    fn truncate(value: u64) -> u64 {
        value
    }

    fn to_signed(value: u64) -> i64 {
        value as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(0x2345_6789, Rv32::truncate(0x1_2345_6789));
        assert_eq!(0x1_2345_6789, Rv64::truncate(0x1_2345_6789));
        assert_eq!(0xFFFF_FFFF, WordWidth::W32.truncate(u64::MAX));
    }

    #[test]
    fn test_signed() {
        assert_eq!(-1, Rv32::to_signed(0xFFFF_FFFF));
        assert_eq!(0xFFFF_FFFF, Rv64::to_signed(0xFFFF_FFFF));
        assert_eq!(0xFFFF_FFFF, Rv32::from_signed(-1));
        assert_eq!(u64::MAX, Rv64::from_signed(-1));
        assert_eq!(0xFFFF_FFFF_8000_0000, Rv64::sign_extend_word(0x8000_0000));
        assert_eq!(0x8000_0000, Rv32::sign_extend_word(0x8000_0000));
    }
}
