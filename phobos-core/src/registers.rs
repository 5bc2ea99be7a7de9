//! General purpose registers.

use core::fmt;
use std::fmt::Formatter;

/// The number of `x` registers available (indices start at `0` for `x0`)
pub const LEN: u8 = 32;

/// A RISC-V hart's general purpose registers.
///
/// There are 32 `x` registers, named `x0` up to `x31`, each XLEN bits wide. Values are stored as
/// `u64`; for RV32 the instruction handlers keep the upper half zero.
/// The register `x0` (aka `zero`) is always zero. Writes to it are ignored.
///
/// > Register x0 is hardwired with all bits equal to 0. General purpose registers x1–x31 hold
/// > values that various instructions interpret as a collection of Boolean values, or as two’s
/// > complement signed binary integers or unsigned binary integers.
/// >
/// > There is one additional unprivileged register: the program counter pc holds the address of the
/// > current instruction.
///
/// Besides `pc`, the hart tracks `next_pc`: decode sets it to the address of the sequentially next
/// instruction, jumps and traps overwrite it, and retirement copies it into `pc`.
#[derive(Debug, Clone)]
pub struct Registers {
    x_registers: [u64; LEN as usize],
    pc: u64,
    next_pc: u64,
}

impl Default for Registers {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Registers {
    /// Returns a fresh set of all-zero registers.
    pub fn new(initial_pc: u64) -> Self {
        Self {
            x_registers: [0; LEN as usize],
            pc: initial_pc,
            next_pc: initial_pc,
        }
    }

    /// Returns the value of an `x` register.
    pub fn x(&self, specifier: Specifier) -> u64 {
        self.x_registers[usize::from(specifier)]
    }

    /// Sets the value of an `x` register.
    ///
    /// Writes to register `x0` are ignored.
    pub fn set_x(&mut self, specifier: Specifier, value: u64) {
        if specifier != Specifier::X0 {
            self.x_registers[usize::from(specifier)] = value;
        }
    }

    /// Returns the value of the `pc` register.
    pub fn pc(&self) -> u64 {
        self.pc
    }

    pub fn set_pc(&mut self, pc: u64) {
        self.pc = pc;
    }

    pub fn next_pc(&self) -> u64 {
        self.next_pc
    }

    pub fn set_next_pc(&mut self, next_pc: u64) {
        self.next_pc = next_pc;
    }
}

/// An `x` register specifier. Can take values in the range `0..LEN`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Specifier(u8);

impl Specifier {
    /// Register `x0`, a.k.a. register `zero`, always returns `0` on read, and ignores any writes.
    pub const X0: Self = Specifier(0);

    /// Create a register specifier from its index, returning `None` if `index > 31`.
    pub fn new<U: TryInto<u8>>(index: U) -> Option<Self> {
        let index = index.try_into().ok()?;
        (index < LEN).then_some(Self(index))
    }

    /// Convert the low five bits of `value` into a register specifier.
    pub fn from_u5(value: u8) -> Self {
        const_assert_eq!(LEN, 32);
        Self(value & 0x1F)
    }

    /// Return an iterator over all register specifier, starting at x0 up to x31.
    pub fn iter_all() -> impl Iterator<Item = Self> {
        (0..LEN).map(Self)
    }
}

impl From<Specifier> for u8 {
    fn from(value: Specifier) -> Self {
        value.0
    }
}

impl From<Specifier> for usize {
    fn from(value: Specifier) -> Self {
        value.0 as usize
    }
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_to_zero() {
        let mut registers = Registers::default();
        registers.set_x(Specifier::X0, 0xDEADBEEF);
        assert_eq!(0, registers.x(Specifier::X0));
        assert_eq!(0, registers.pc());
    }

    #[test]
    fn test_set_x() {
        let mut registers = Registers::default();
        for specifier in Specifier::iter_all() {
            registers.set_x(specifier, u8::from(specifier) as u64 + 1);
        }
        assert_eq!(0, registers.x(Specifier::X0));
        for i in 1..LEN {
            assert_eq!(i as u64 + 1, registers.x(Specifier::from_u5(i)));
        }
    }

    #[test]
    fn test_pc_and_next_pc() {
        let mut registers = Registers::new(0x8000_0000);
        assert_eq!(0x8000_0000, registers.next_pc());
        registers.set_next_pc(0x8000_0004);
        assert_eq!(0x8000_0000, registers.pc());
        registers.set_pc(registers.next_pc());
        assert_eq!(0x8000_0004, registers.pc());
    }

    #[test]
    fn test_specifier_range() {
        assert_eq!(Some(Specifier::from_u5(31)), Specifier::new(31));
        assert_eq!(None, Specifier::new(32));
        assert_eq!("x7", Specifier::from_u5(7).to_string());
    }
}
