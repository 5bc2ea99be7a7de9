use crate::xlen::WordWidth;
use crate::{PrivilegeLevel, RawPrivilegeLevel};
use bitvec::{field::BitField, order::Lsb0, view::BitView};

/// Provides the mstatus register and its restricted sstatus view.
///
/// > The mstatus register is an MXLEN-bit read/write register [...]. The mstatus register keeps
/// > track of and controls the hart’s current operating state. A restricted view of mstatus appears
/// > as the sstatus register in the S-level ISA.
///
/// Only the fields the simulator acts upon are writable; every other bit reads as zero, except
/// UXL/SXL on RV64 which are hardwired to 64-bit.
#[derive(Debug, Clone)]
pub struct Status {
    mstatus: u64,
    width: WordWidth,
}

impl Status {
    pub fn new(width: WordWidth) -> Self {
        let mut status = Self { mstatus: 0, width };
        if width == WordWidth::W64 {
            let bits = status.mstatus.view_bits_mut::<Lsb0>();
            bits[idx::UXL..idx::UXL + 2].store_le(2u8);
            bits[idx::SXL..idx::SXL + 2].store_le(2u8);
        }
        status
    }

    pub fn read_mstatus(&self) -> u64 {
        self.mstatus
    }

    pub fn write_mstatus(&mut self, value: u64) {
        let mpp =
            RawPrivilegeLevel::from_u2(value.view_bits::<Lsb0>()[idx::MPP..idx::MPP + 2].load_le());
        let mask = MSTATUS_WRITE_MASK & !MPP_MASK;
        self.mstatus = self.mstatus & !mask | value & mask;
        self.set_mpp(mpp);
    }

    pub fn read_sstatus(&self) -> u64 {
        let mask = match self.width {
            WordWidth::W32 => SSTATUS_MASK,
            WordWidth::W64 => SSTATUS_MASK | UXL_MASK,
        };
        self.mstatus & mask
    }

    pub fn write_sstatus(&mut self, value: u64) {
        let mask = SSTATUS_MASK & MSTATUS_WRITE_MASK;
        self.mstatus = self.mstatus & !mask | value & mask;
    }

    /// Returns `true` if the MIE (M-mode Interrupt Enable) bit is set.
    pub fn mie(&self) -> bool {
        self.mstatus.view_bits::<Lsb0>()[idx::MIE]
    }

    pub fn set_mie(&mut self, value: bool) {
        self.mstatus.view_bits_mut::<Lsb0>().set(idx::MIE, value);
    }

    /// Returns `true` if the SIE (S-mode Interrupt Enable) bit is set.
    pub fn sie(&self) -> bool {
        self.mstatus.view_bits::<Lsb0>()[idx::SIE]
    }

    pub fn set_sie(&mut self, value: bool) {
        self.mstatus.view_bits_mut::<Lsb0>().set(idx::SIE, value);
    }

    pub fn mpie(&self) -> bool {
        self.mstatus.view_bits::<Lsb0>()[idx::MPIE]
    }

    pub fn set_mpie(&mut self, value: bool) {
        self.mstatus.view_bits_mut::<Lsb0>().set(idx::MPIE, value);
    }

    pub fn spie(&self) -> bool {
        self.mstatus.view_bits::<Lsb0>()[idx::SPIE]
    }

    pub fn set_spie(&mut self, value: bool) {
        self.mstatus.view_bits_mut::<Lsb0>().set(idx::SPIE, value);
    }

    /// Returns the privilege level encoded by the MPP (M-mode Previous Privilege level) field.
    pub fn mpp(&self) -> PrivilegeLevel {
        let raw = RawPrivilegeLevel::from_u2(
            self.mstatus.view_bits::<Lsb0>()[idx::MPP..idx::MPP + 2].load_le(),
        );
        // set_mpp never stores the reserved level.
        PrivilegeLevel::try_from(raw).unwrap_or(PrivilegeLevel::User)
    }

    /// Sets the MPP field to `value`.
    ///
    /// The MPP field is **WARL**, the reserved level is ignored.
    pub fn set_mpp(&mut self, value: RawPrivilegeLevel) {
        let Ok(value) = PrivilegeLevel::try_from(value) else {
            return;
        };
        self.mstatus.view_bits_mut::<Lsb0>()[idx::MPP..idx::MPP + 2].store_le(value as u8);
    }

    /// Returns the privilege level encoded by the SPP (S-mode Previous Privilege level) field.
    pub fn spp(&self) -> PrivilegeLevel {
        if self.mstatus.view_bits::<Lsb0>()[idx::SPP] {
            PrivilegeLevel::Supervisor
        } else {
            PrivilegeLevel::User
        }
    }

    /// Sets the SPP field. Only User and Supervisor can be represented; Machine is ignored.
    pub fn set_spp(&mut self, value: PrivilegeLevel) {
        if value <= PrivilegeLevel::Supervisor {
            let bit = value == PrivilegeLevel::Supervisor;
            self.mstatus.view_bits_mut::<Lsb0>().set(idx::SPP, bit);
        }
    }

    /// Returns `true` if the MPRV (Modify PRiVilege) bit is set.
    pub fn mprv(&self) -> bool {
        self.mstatus.view_bits::<Lsb0>()[idx::MPRV]
    }

    pub fn set_mprv(&mut self, value: bool) {
        self.mstatus.view_bits_mut::<Lsb0>().set(idx::MPRV, value);
    }

    /// Returns `true` if the MXR (Make eXecutable Readable) bit is set.
    pub fn mxr(&self) -> bool {
        self.mstatus.view_bits::<Lsb0>()[idx::MXR]
    }

    /// Returns `true` if the SUM (permit Supervisor User Memory access) bit is set.
    pub fn sum(&self) -> bool {
        self.mstatus.view_bits::<Lsb0>()[idx::SUM]
    }

    /// Returns `true` if the TVM (Trap Virtual Memory) bit is set.
    pub fn tvm(&self) -> bool {
        self.mstatus.view_bits::<Lsb0>()[idx::TVM]
    }

    /// Returns `true` if the TSR (Trap SRET) bit is set.
    pub fn tsr(&self) -> bool {
        self.mstatus.view_bits::<Lsb0>()[idx::TSR]
    }
}

const fn bit(index: usize) -> u64 {
    1 << index
}

const MPP_MASK: u64 = 0b11 << idx::MPP;
const UXL_MASK: u64 = 0b11 << idx::UXL;

const MSTATUS_WRITE_MASK: u64 = bit(idx::SIE)
    | bit(idx::MIE)
    | bit(idx::SPIE)
    | bit(idx::MPIE)
    | bit(idx::SPP)
    | (0b11 << idx::VS)
    | MPP_MASK
    | bit(idx::MPRV)
    | bit(idx::SUM)
    | bit(idx::MXR)
    | bit(idx::TVM)
    | bit(idx::TW)
    | bit(idx::TSR);

const SSTATUS_MASK: u64 = bit(idx::SIE)
    | bit(idx::SPIE)
    | bit(idx::SPP)
    | (0b11 << idx::VS)
    | bit(idx::SUM)
    | bit(idx::MXR);

/// Bit indices into the mstatus register.
mod idx {
    pub const SIE: usize = 1;
    pub const MIE: usize = 3;
    pub const SPIE: usize = 5;
    pub const MPIE: usize = 7;
    pub const SPP: usize = 8;
    pub const VS: usize = 9;
    pub const MPP: usize = 11;
    pub const MPRV: usize = 17;
    pub const SUM: usize = 18;
    pub const MXR: usize = 19;
    pub const TVM: usize = 20;
    pub const TW: usize = 21;
    pub const TSR: usize = 22;
    pub const UXL: usize = 32;
    pub const SXL: usize = 34;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mpp_is_warl() {
        let mut status = Status::new(WordWidth::W32);
        status.set_mpp(RawPrivilegeLevel::Supervisor);
        assert_eq!(PrivilegeLevel::Supervisor, status.mpp());
        status.set_mpp(RawPrivilegeLevel::Reserved);
        assert_eq!(PrivilegeLevel::Supervisor, status.mpp());
        status.write_mstatus(0b10 << idx::MPP);
        assert_eq!(PrivilegeLevel::Supervisor, status.mpp());
        status.write_mstatus(0b11 << idx::MPP);
        assert_eq!(PrivilegeLevel::Machine, status.mpp());
    }

    #[test]
    fn test_sstatus_is_restricted_view() {
        let mut status = Status::new(WordWidth::W64);
        status.write_sstatus(u64::MAX);
        assert!(status.sie());
        assert!(status.sum());
        assert!(!status.mie());
        assert!(!status.mprv());
        assert_eq!(2, status.read_sstatus() >> idx::UXL & 0b11);
        status.write_mstatus(bit(idx::MIE));
        assert_eq!(0, status.read_sstatus() & bit(idx::MIE));
        assert_eq!(2, status.read_mstatus() >> idx::SXL & 0b11);
    }

    #[test]
    fn test_spp() {
        let mut status = Status::new(WordWidth::W64);
        status.set_spp(PrivilegeLevel::Supervisor);
        assert_eq!(PrivilegeLevel::Supervisor, status.spp());
        status.set_spp(PrivilegeLevel::Machine);
        assert_eq!(PrivilegeLevel::Supervisor, status.spp());
        status.set_spp(PrivilegeLevel::User);
        assert_eq!(PrivilegeLevel::User, status.spp());
    }
}
