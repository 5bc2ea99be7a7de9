#[macro_use]
extern crate static_assertions;

use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

pub mod csr;
pub mod hart;
mod insts;
pub mod instruction;
pub mod memory;
pub mod observer;
pub mod registers;
pub mod sequence;
pub mod simulator;
pub mod translation;
pub mod vector;
pub mod xlen;

pub use hart::{Config, Hart};
pub use simulator::{Simulator, Tick};
pub use xlen::{Rv32, Rv64, WordWidth, Xlen};

/// Fatal simulator error.
///
/// These signal a defect in the simulator's own configuration (a missing handler, a missing step
/// tag, a broken translation handshake, ...) rather than anything the guest program did. Guest
/// faults are architectural exceptions and never surface as a [`SimError`].
#[derive(Error, Debug)]
pub enum SimError {
    #[error(transparent)]
    Sequence(#[from] sequence::SequenceError),
    #[error("translation handshake violated: {0}")]
    Handshake(#[from] translation::HandshakeError),
    #[error("missing {kind} handler in {width} handler table: {mnemonic}")]
    MissingHandler {
        mnemonic: &'static str,
        width: WordWidth,
        kind: hart::execute::HandlerKind,
    },
    #[error("{step} step ran without a decoded instruction")]
    NoCurrentInstruction { step: sequence::StepTag },
    #[error(transparent)]
    Memory(#[from] memory::MemoryError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// List of all possible privilege levels for RISC-V.
///
/// Same as [`PrivilegeLevel`] except that it allows specifying the reserved privilege level `2`.
/// This can be useful in case a privilege level is read from a 2-bit field, since that value
/// itself may be a reserved privilege level.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub enum RawPrivilegeLevel {
    User = 0,
    Supervisor = 1,
    /// Privilege level `0b10` is reserved in the base ISA.
    Reserved = 2,
    Machine = 3,
}

impl RawPrivilegeLevel {
    /// Convert the low two bits of `value` into a [`RawPrivilegeLevel`].
    pub fn from_u2(value: u8) -> Self {
        match value & 0b11 {
            0 => Self::User,
            1 => Self::Supervisor,
            2 => Self::Reserved,
            _ => Self::Machine,
        }
    }
}

/// List of defined privilege levels for RISC-V.
///
/// > The machine level has the highest privileges and is the only mandatory privilege level for a
/// > RISC-V hardware platform. Code run in machine-mode (M-mode) is usually inherently trusted, as
/// > it has low-level access to the machine implementation. User-mode (U-mode) and
/// > supervisor-mode (S-mode) are intended for conventional application and operating system
/// > usage respectively.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum PrivilegeLevel {
    User = 0,
    Supervisor = 1,
    // Level 2 is reserved
    Machine = 3,
}

impl PartialEq<RawPrivilegeLevel> for PrivilegeLevel {
    fn eq(&self, other: &RawPrivilegeLevel) -> bool {
        *self as usize == *other as usize
    }
}

impl PartialOrd<RawPrivilegeLevel> for PrivilegeLevel {
    fn partial_cmp(&self, other: &RawPrivilegeLevel) -> Option<Ordering> {
        (*self as usize).partial_cmp(&(*other as usize))
    }
}

impl fmt::Display for PrivilegeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            PrivilegeLevel::User => "U",
            PrivilegeLevel::Supervisor => "S",
            PrivilegeLevel::Machine => "M",
        })
    }
}

impl From<PrivilegeLevel> for RawPrivilegeLevel {
    fn from(value: PrivilegeLevel) -> Self {
        match value {
            PrivilegeLevel::User => Self::User,
            PrivilegeLevel::Supervisor => Self::Supervisor,
            PrivilegeLevel::Machine => Self::Machine,
        }
    }
}

impl TryFrom<RawPrivilegeLevel> for PrivilegeLevel {
    type Error = ReservedPrivilegeLevelError;
    fn try_from(value: RawPrivilegeLevel) -> Result<Self, Self::Error> {
        match value {
            RawPrivilegeLevel::User => Ok(Self::User),
            RawPrivilegeLevel::Supervisor => Ok(Self::Supervisor),
            RawPrivilegeLevel::Reserved => Err(ReservedPrivilegeLevelError(value)),
            RawPrivilegeLevel::Machine => Ok(Self::Machine),
        }
    }
}

#[derive(Error, Debug)]
#[error("privilege level {0:?} is reserved")]
pub struct ReservedPrivilegeLevelError(RawPrivilegeLevel);

pub mod unit {
    //! Collection of the units in which memory can be addressed (in bytes).

    /// A _byte_ is 8 bits.
    pub const BYTE: usize = 1;

    /// A _halfword_ is 16 bits (2 bytes).
    pub const HALFWORD: usize = 2;

    /// A _word_ is 32 bits (4 bytes).
    pub const WORD: usize = 4;

    /// A _doubleword_ is 64 bits (8 bytes).
    pub const DOUBLEWORD: usize = 8;

    /// Size of a base page for every supported paging scheme.
    pub const PAGE: u64 = 4096;
}

/// Address alignment, always a power of two.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Alignment(u64);

impl Alignment {
    pub const BYTE: Self = Self(1);
    pub const HALFWORD: Self = Self(2);
    pub const WORD: Self = Self(4);
    pub const DOUBLEWORD: Self = Self(8);

    /// Creates the natural alignment for a unit of size `size`. Returns `None` if `size` is not a
    /// power of two.
    pub fn natural_for_size(size: usize) -> Option<Self> {
        size.is_power_of_two().then_some(Self(size as u64))
    }

    /// Returns `true` if `address` is aligned to this alignment.
    pub fn is_aligned(self, address: u64) -> bool {
        address & (self.0 - 1) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privilege_levels() {
        assert_eq!(RawPrivilegeLevel::Machine, RawPrivilegeLevel::from_u2(3));
        assert!(PrivilegeLevel::try_from(RawPrivilegeLevel::from_u2(2)).is_err());
        assert_eq!(
            PrivilegeLevel::Supervisor,
            PrivilegeLevel::try_from(RawPrivilegeLevel::Supervisor).unwrap()
        );
        assert!(PrivilegeLevel::Machine > RawPrivilegeLevel::Reserved);
        assert!(PrivilegeLevel::User < PrivilegeLevel::Supervisor);
    }

    #[test]
    fn test_alignment() {
        assert!(Alignment::WORD.is_aligned(0x8000_0004));
        assert!(!Alignment::WORD.is_aligned(0x8000_0002));
        assert!(Alignment::BYTE.is_aligned(0x8000_0003));
        assert_eq!(Some(Alignment::DOUBLEWORD), Alignment::natural_for_size(8));
        assert_eq!(None, Alignment::natural_for_size(6));
        const_assert_eq!(unit::PAGE, 1 << 12);
    }
}
