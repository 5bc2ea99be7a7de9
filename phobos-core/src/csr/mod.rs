//! Control and Status Registers.
//!
//! Only the machine and supervisor CSRs needed for trap handling, address translation and
//! counting retired instructions are modelled. A handful of CSRs (interrupt enables, PMP,
//! counter enables, ...) are accepted and stored so that ordinary boot code does not trap, but
//! they have no further effect because the simulator models neither interrupts nor PMP.
//! The vector CSRs live in [`VectorState`](crate::vector::VectorState) and are routed there by the
//! hart.

mod status;

pub use status::Status;

use crate::hart::translate::MmuMode;
use crate::xlen::WordWidth;
use crate::{PrivilegeLevel, RawPrivilegeLevel};
use std::collections::HashMap;
use thiserror::Error;

/// General 12-bit value representing a CSR specifier. Note that this can hold any 12-bit value,
/// even if the value represents an unsupported or non-existent CSR.
pub type CsrSpecifier = u16;

/// Errors that can occur when attempting to access a CSR. All of them raise an illegal
/// instruction exception.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum CsrError {
    #[error("unsupported CSR: {0:#05X}")]
    Unsupported(CsrSpecifier),
    /// Attempt to access a CSR that requires a higher privilege level.
    #[error(
        "cannot access CSR {specifier:#05X} from privilege level {actual_level}, \
             since it requires privilege level {required_level:?}"
    )]
    Privileged {
        specifier: CsrSpecifier,
        required_level: RawPrivilegeLevel,
        actual_level: PrivilegeLevel,
    },
    #[error("writing to read-only CSR {0:#05X} is invalid")]
    WriteToReadOnly(CsrSpecifier),
    /// Access intercepted by mstatus.TVM.
    #[error("access to satp trapped by mstatus.TVM")]
    TrappedVirtualMemory,
}

/// Checks the privilege encoded in the specifier itself (bits 9:8), and for writes that the CSR
/// is not read-only (bits 11:10 equal to `0b11`).
pub fn check_access(
    specifier: CsrSpecifier,
    privilege_level: PrivilegeLevel,
    write: bool,
) -> Result<(), CsrError> {
    let required_level = specifier::required_privilege_level(specifier);
    if privilege_level < required_level {
        return Err(CsrError::Privileged {
            specifier,
            required_level,
            actual_level: privilege_level,
        });
    }
    if write && specifier::is_read_only(specifier) {
        return Err(CsrError::WriteToReadOnly(specifier));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct CsRegisters {
    width: WordWidth,
    pub status: Status,
    misa: u64,
    medeleg: u64,
    mtvec: u64,
    stvec: u64,
    mscratch: u64,
    sscratch: u64,
    mepc: u64,
    sepc: u64,
    mcause: u64,
    scause: u64,
    mtval: u64,
    stval: u64,
    satp: u64,
    mhartid: u64,
    /// Cycle counter. Every retired instruction takes one cycle.
    mcycle: u64,
    minstret: u64,
    /// CSRs that are stored but otherwise inert.
    inert: HashMap<CsrSpecifier, u64>,
}

impl CsRegisters {
    pub fn new(width: WordWidth, hart_id: u64) -> Self {
        let mxl = match width {
            WordWidth::W32 => 1u64 << 30,
            WordWidth::W64 => 2u64 << 62,
        };
        let extensions = [b'I', b'M', b'S', b'U', b'V']
            .iter()
            .fold(0u64, |misa, ext| misa | 1 << (ext - b'A'));
        let inert = INERT.iter().map(|&specifier| (specifier, 0)).collect();
        Self {
            width,
            status: Status::new(width),
            misa: mxl | extensions,
            medeleg: 0,
            mtvec: 0,
            stvec: 0,
            mscratch: 0,
            sscratch: 0,
            mepc: 0,
            sepc: 0,
            mcause: 0,
            scause: 0,
            mtval: 0,
            stval: 0,
            satp: 0,
            mhartid: hart_id,
            mcycle: 0,
            minstret: 0,
            inert,
        }
    }

    /// Reads a CSR, without any privilege checks (see [`check_access`]).
    pub fn read(&self, specifier: CsrSpecifier) -> Result<u64, CsrError> {
        use specifier::*;
        let value = match specifier {
            MSTATUS => self.status.read_mstatus(),
            SSTATUS => self.status.read_sstatus(),
            MISA => self.misa,
            MEDELEG => self.medeleg,
            MTVEC => self.mtvec,
            STVEC => self.stvec,
            MSCRATCH => self.mscratch,
            SSCRATCH => self.sscratch,
            MEPC => self.mepc,
            SEPC => self.sepc,
            MCAUSE => self.mcause,
            SCAUSE => self.scause,
            MTVAL => self.mtval,
            STVAL => self.stval,
            SATP => self.satp,
            MHARTID => self.mhartid,
            MVENDORID | MARCHID | MIMPID => 0,
            MCYCLE | CYCLE => self.mcycle,
            MINSTRET | INSTRET => self.minstret,
            MCYCLEH | CYCLEH if self.width == WordWidth::W32 => self.mcycle >> 32,
            MINSTRETH | INSTRETH if self.width == WordWidth::W32 => self.minstret >> 32,
            _ => *self
                .inert
                .get(&specifier)
                .ok_or(CsrError::Unsupported(specifier))?,
        };
        Ok(self.width.truncate(value))
    }

    /// Writes a CSR, without any privilege checks (see [`check_access`]).
    ///
    /// WARL fields silently drop values they cannot hold.
    pub fn write(&mut self, specifier: CsrSpecifier, value: u64) -> Result<(), CsrError> {
        use specifier::*;
        let value = self.width.truncate(value);
        match specifier {
            MSTATUS => self.status.write_mstatus(value),
            SSTATUS => self.status.write_sstatus(value),
            // MXL and the extension set are fixed.
            MISA => {}
            MEDELEG => self.medeleg = value & MEDELEG_MASK,
            MTVEC => self.mtvec = value & !0b10,
            STVEC => self.stvec = value & !0b10,
            MSCRATCH => self.mscratch = value,
            SSCRATCH => self.sscratch = value,
            MEPC => self.mepc = value & !0b11,
            SEPC => self.sepc = value & !0b11,
            MCAUSE => self.mcause = value,
            SCAUSE => self.scause = value,
            MTVAL => self.mtval = value,
            STVAL => self.stval = value,
            SATP => self.write_satp(value),
            MCYCLE => self.mcycle = self.write_low(self.mcycle, value),
            MINSTRET => self.minstret = self.write_low(self.minstret, value),
            MCYCLEH if self.width == WordWidth::W32 => {
                self.mcycle = self.mcycle & 0xFFFF_FFFF | value << 32
            }
            MINSTRETH if self.width == WordWidth::W32 => {
                self.minstret = self.minstret & 0xFFFF_FFFF | value << 32
            }
            _ => match self.inert.get_mut(&specifier) {
                Some(stored) => *stored = value,
                None => return Err(CsrError::Unsupported(specifier)),
            },
        }
        Ok(())
    }

    fn write_low(&self, counter: u64, value: u64) -> u64 {
        match self.width {
            WordWidth::W32 => counter & !0xFFFF_FFFF | value,
            WordWidth::W64 => value,
        }
    }

    /// satp is **WARL**: a write selecting an unsupported translation mode has no effect at all.
    fn write_satp(&mut self, value: u64) {
        if matches!(
            self.satp_mode_of(value),
            Some(MmuMode::Baremetal | MmuMode::Sv32 | MmuMode::Sv39)
        ) {
            self.satp = value;
        }
    }

    fn satp_mode_of(&self, satp: u64) -> Option<MmuMode> {
        match self.width {
            WordWidth::W32 => Some(match satp >> 31 {
                0 => MmuMode::Baremetal,
                _ => MmuMode::Sv32,
            }),
            WordWidth::W64 => match satp >> 60 {
                0 => Some(MmuMode::Baremetal),
                8 => Some(MmuMode::Sv39),
                9 => Some(MmuMode::Sv48),
                10 => Some(MmuMode::Sv57),
                _ => None,
            },
        }
    }

    /// Translation mode selected by satp.
    pub fn satp_mode(&self) -> MmuMode {
        self.satp_mode_of(self.satp).unwrap_or(MmuMode::Baremetal)
    }

    /// Physical address of the root page table.
    pub fn satp_root(&self) -> u64 {
        let ppn = match self.width {
            WordWidth::W32 => self.satp & 0x003F_FFFF,
            WordWidth::W64 => self.satp & 0x0000_0FFF_FFFF_FFFF,
        };
        ppn << 12
    }

    pub fn medeleg(&self) -> u64 {
        self.medeleg
    }

    pub fn mtvec(&self) -> u64 {
        self.mtvec
    }

    pub fn stvec(&self) -> u64 {
        self.stvec
    }

    pub fn mepc(&self) -> u64 {
        self.mepc
    }

    pub fn sepc(&self) -> u64 {
        self.sepc
    }

    pub fn mcause(&self) -> u64 {
        self.mcause
    }

    pub fn scause(&self) -> u64 {
        self.scause
    }

    pub fn mtval(&self) -> u64 {
        self.mtval
    }

    pub fn stval(&self) -> u64 {
        self.stval
    }

    pub fn minstret(&self) -> u64 {
        self.minstret
    }

    /// Records a trap taken into M-mode.
    pub fn enter_machine_trap(&mut self, epc: u64, cause: u64, tval: u64) {
        self.mepc = epc & !0b11;
        self.mcause = cause;
        self.mtval = self.width.truncate(tval);
    }

    /// Records a trap taken into S-mode.
    pub fn enter_supervisor_trap(&mut self, epc: u64, cause: u64, tval: u64) {
        self.sepc = epc & !0b11;
        self.scause = cause;
        self.stval = self.width.truncate(tval);
    }

    /// Counts one retired instruction.
    pub fn retire(&mut self) {
        self.mcycle = self.mcycle.wrapping_add(1);
        self.minstret = self.minstret.wrapping_add(1);
    }
}

/// Exceptions that can be delegated to S-mode. Environment calls from M-mode never are.
const MEDELEG_MASK: u64 = 0xB3FF;

const INERT: &[CsrSpecifier] = &[
    specifier::SIE,
    specifier::SIP,
    specifier::SCOUNTEREN,
    specifier::SENVCFG,
    specifier::MIDELEG,
    specifier::MIE,
    specifier::MIP,
    specifier::MCOUNTEREN,
    specifier::MENVCFG,
    specifier::MCOUNTINHIBIT,
    specifier::PMPCFG0,
    specifier::PMPCFG0 + 2,
    specifier::PMPADDR0,
    specifier::PMPADDR0 + 1,
    specifier::PMPADDR0 + 2,
    specifier::PMPADDR0 + 3,
];

/// Specifiers for all supported CSRs.
pub mod specifier {
    use super::CsrSpecifier;
    use crate::RawPrivilegeLevel;

    pub const VSTART: CsrSpecifier = 0x008;
    pub const VXSAT: CsrSpecifier = 0x009;
    pub const VXRM: CsrSpecifier = 0x00A;
    pub const VCSR: CsrSpecifier = 0x00F;

    pub const CYCLE: CsrSpecifier = 0xC00;
    pub const INSTRET: CsrSpecifier = 0xC02;
    pub const VL: CsrSpecifier = 0xC20;
    pub const VTYPE: CsrSpecifier = 0xC21;
    pub const VLENB: CsrSpecifier = 0xC22;
    pub const CYCLEH: CsrSpecifier = 0xC80;
    pub const INSTRETH: CsrSpecifier = 0xC82;

    pub const SSTATUS: CsrSpecifier = 0x100;
    pub const SIE: CsrSpecifier = 0x104;
    pub const STVEC: CsrSpecifier = 0x105;
    pub const SCOUNTEREN: CsrSpecifier = 0x106;
    pub const SENVCFG: CsrSpecifier = 0x10A;
    pub const SSCRATCH: CsrSpecifier = 0x140;
    pub const SEPC: CsrSpecifier = 0x141;
    pub const SCAUSE: CsrSpecifier = 0x142;
    pub const STVAL: CsrSpecifier = 0x143;
    pub const SIP: CsrSpecifier = 0x144;
    pub const SATP: CsrSpecifier = 0x180;

    pub const MVENDORID: CsrSpecifier = 0xF11;
    pub const MARCHID: CsrSpecifier = 0xF12;
    pub const MIMPID: CsrSpecifier = 0xF13;
    pub const MHARTID: CsrSpecifier = 0xF14;

    pub const MSTATUS: CsrSpecifier = 0x300;
    pub const MISA: CsrSpecifier = 0x301;
    pub const MEDELEG: CsrSpecifier = 0x302;
    pub const MIDELEG: CsrSpecifier = 0x303;
    pub const MIE: CsrSpecifier = 0x304;
    pub const MTVEC: CsrSpecifier = 0x305;
    pub const MCOUNTEREN: CsrSpecifier = 0x306;
    pub const MENVCFG: CsrSpecifier = 0x30A;
    pub const MCOUNTINHIBIT: CsrSpecifier = 0x320;
    pub const MSCRATCH: CsrSpecifier = 0x340;
    pub const MEPC: CsrSpecifier = 0x341;
    pub const MCAUSE: CsrSpecifier = 0x342;
    pub const MTVAL: CsrSpecifier = 0x343;
    pub const MIP: CsrSpecifier = 0x344;
    pub const PMPCFG0: CsrSpecifier = 0x3A0;
    pub const PMPADDR0: CsrSpecifier = 0x3B0;

    pub const MCYCLE: CsrSpecifier = 0xB00;
    pub const MINSTRET: CsrSpecifier = 0xB02;
    pub const MCYCLEH: CsrSpecifier = 0xB80;
    pub const MINSTRETH: CsrSpecifier = 0xB82;

    /// Returns `true` if the CSR is read-only, based on its specifier.
    pub fn is_read_only(specifier: CsrSpecifier) -> bool {
        (specifier >> 10) & 0b11 == 0b11
    }

    /// Returns the lowest privilege level that can access the CSR, based on its specifier.
    pub fn required_privilege_level(specifier: CsrSpecifier) -> RawPrivilegeLevel {
        RawPrivilegeLevel::from_u2((specifier >> 8) as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_checks() {
        assert!(check_access(specifier::MSTATUS, PrivilegeLevel::Machine, true).is_ok());
        assert!(matches!(
            check_access(specifier::MSTATUS, PrivilegeLevel::Supervisor, false),
            Err(CsrError::Privileged { .. })
        ));
        assert!(check_access(specifier::SATP, PrivilegeLevel::Supervisor, true).is_ok());
        assert!(check_access(specifier::CYCLE, PrivilegeLevel::User, false).is_ok());
        assert_eq!(
            Err(CsrError::WriteToReadOnly(specifier::MHARTID)),
            check_access(specifier::MHARTID, PrivilegeLevel::Machine, true)
        );
    }

    #[test]
    fn test_satp_warl() {
        let mut csrs = CsRegisters::new(WordWidth::W64, 0);
        csrs.write(specifier::SATP, 8 << 60 | 0x80123).unwrap();
        assert_eq!(MmuMode::Sv39, csrs.satp_mode());
        assert_eq!(0x8012_3000, csrs.satp_root());
        // Sv48 is reserved: the whole write is dropped.
        csrs.write(specifier::SATP, 9 << 60 | 0x1).unwrap();
        assert_eq!(MmuMode::Sv39, csrs.satp_mode());
        assert_eq!(0x8012_3000, csrs.satp_root());
        csrs.write(specifier::SATP, 0).unwrap();
        assert_eq!(MmuMode::Baremetal, csrs.satp_mode());

        let mut csrs = CsRegisters::new(WordWidth::W32, 0);
        csrs.write(specifier::SATP, 1 << 31 | 0x80000).unwrap();
        assert_eq!(MmuMode::Sv32, csrs.satp_mode());
        assert_eq!(0x8000_0000, csrs.satp_root());
    }

    #[test]
    fn test_misa() {
        let csrs = CsRegisters::new(WordWidth::W32, 0);
        let misa = csrs.read(specifier::MISA).unwrap();
        assert_eq!(1, misa >> 30);
        assert_ne!(0, misa & 1 << (b'V' - b'A'));
        assert_eq!(0, misa & 1 << (b'F' - b'A'));
    }

    #[test]
    fn test_counters() {
        let mut csrs = CsRegisters::new(WordWidth::W32, 0);
        csrs.write(specifier::MINSTRET, 0xFFFF_FFFF).unwrap();
        csrs.retire();
        assert_eq!(0, csrs.read(specifier::INSTRET).unwrap());
        assert_eq!(1, csrs.read(specifier::INSTRETH).unwrap());
        assert_eq!(1, csrs.read(specifier::CYCLE).unwrap());
        let csrs64 = CsRegisters::new(WordWidth::W64, 0);
        assert_eq!(
            Err(CsrError::Unsupported(specifier::INSTRETH)),
            csrs64.read(specifier::INSTRETH)
        );
    }

    #[test]
    fn test_inert_and_unknown() {
        let mut csrs = CsRegisters::new(WordWidth::W64, 3);
        csrs.write(specifier::MIE, 0xAAA).unwrap();
        assert_eq!(0xAAA, csrs.read(specifier::MIE).unwrap());
        assert_eq!(3, csrs.read(specifier::MHARTID).unwrap());
        assert_eq!(Err(CsrError::Unsupported(0x7C0)), csrs.read(0x7C0));
        assert_eq!(Err(CsrError::Unsupported(0x7C0)), csrs.write(0x7C0, 1));
    }

    #[test]
    fn test_epc_alignment_and_medeleg() {
        let mut csrs = CsRegisters::new(WordWidth::W64, 0);
        csrs.write(specifier::MEPC, 0x8000_0007).unwrap();
        assert_eq!(0x8000_0004, csrs.mepc());
        csrs.write(specifier::MEDELEG, u64::MAX).unwrap();
        assert_eq!(0, csrs.medeleg() & 1 << 11);
        assert_ne!(0, csrs.medeleg() & 1 << 8);
    }
}
