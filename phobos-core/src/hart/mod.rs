//! The simulated hart: architectural state plus the bookkeeping the step sequences share.

pub mod config;
pub mod exception;
pub mod execute;
pub mod fetch;
pub mod finish;
pub mod pte;
pub mod translate;

pub use config::Config;
pub use exception::{Exception, Fault};
pub use fetch::DecodedInst;
pub use finish::Retired;

use crate::csr::{self, specifier, CsRegisters, CsrError, CsrSpecifier};
use crate::instruction::Instruction;
use crate::memory::Memory;
use crate::observer::Observer;
use crate::registers::Registers;
use crate::sequence::{SequenceId, StepTag};
use crate::translation::TranslationState;
use crate::vector::VectorState;
use crate::{PrivilegeLevel, SimError};
use exception::PendingTrap;
use fetch::Decoder;
use std::rc::Rc;
use translate::{AccessType, MmuMode};

/// Ids of the unit-owned sequences, as wired by the simulator.
#[derive(Debug, Copy, Clone)]
pub struct UnitSequences {
    pub fetch: SequenceId<Hart>,
    pub inst_translate: SequenceId<Hart>,
    pub decode: SequenceId<Hart>,
    pub execute: SequenceId<Hart>,
    pub load_translate: SequenceId<Hart>,
    pub store_translate: SequenceId<Hart>,
    pub exception: SequenceId<Hart>,
    pub finish: SequenceId<Hart>,
    pub stop: SequenceId<Hart>,
}

impl UnitSequences {
    /// The live translate sequence serving data accesses of type `access`.
    pub fn data_translate(&self, access: AccessType) -> SequenceId<Hart> {
        match access {
            AccessType::Store => self.store_translate,
            AccessType::Load | AccessType::Instruction => self.load_translate,
        }
    }
}

/// Run bookkeeping that is not architectural state.
#[derive(Debug, Clone, Default)]
pub struct SimState {
    /// Number of instructions retired, trapped ones included.
    pub inst_count: u64,
    pub stop_requested: bool,
    /// Set once the stop sequence has run.
    pub stopped: bool,
    pub exit_code: i64,
    /// The MMU modes must be recomputed before the next instruction.
    pub mode_change_pending: bool,
    /// The most recent retirement, until the driver collects it.
    pub retired: Option<Retired>,
    /// Exception taken by the instruction in flight.
    pub exception: Option<Exception>,
}

impl SimState {
    /// Asks the finish sequence to stop the simulation. `exit_code` overrides the current exit
    /// code when given.
    pub fn request_stop(&mut self, exit_code: Option<i64>) {
        self.stop_requested = true;
        if let Some(exit_code) = exit_code {
            self.exit_code = exit_code;
        }
    }
}

pub struct Hart {
    pub config: Config,
    pub registers: Registers,
    pub csrs: CsRegisters,
    pub vector: VectorState,
    pub memory: Memory,
    pub privilege: PrivilegeLevel,
    /// Handshake between fetch and the instruction translate sequence.
    pub fetch_translation: TranslationState,
    /// Handshake between memory instructions and the load/store translate sequences.
    pub data_translation: TranslationState,
    /// Physical address reserved by the last `lr`, cleared by any `sc` and by trap entry.
    pub reservation: Option<u64>,
    pub sim: SimState,
    pub(crate) decoder: Decoder,
    pub(crate) current: Option<Rc<DecodedInst>>,
    pub(crate) pending_trap: Option<PendingTrap>,
    pub(crate) units: UnitSequences,
    pub(crate) observers: Vec<Box<dyn Observer>>,
}

impl Hart {
    /// Creates a hart in M-mode at the reset vector.
    ///
    /// Fails if the handler tables for the configured width are incomplete.
    pub fn new(config: Config, units: UnitSequences) -> Result<Self, SimError> {
        let width = config.xlen;
        Ok(Self {
            registers: Registers::new(config.reset_vector),
            csrs: CsRegisters::new(width, config.hart_id),
            vector: VectorState::new(config.vlen),
            memory: Memory::new(config.memory_base, config.memory_size),
            privilege: PrivilegeLevel::Machine,
            fetch_translation: TranslationState::new(),
            data_translation: TranslationState::new(),
            reservation: None,
            sim: SimState::default(),
            decoder: Decoder::new(width, units.finish)?,
            current: None,
            pending_trap: None,
            units,
            observers: Vec::new(),
            config,
        })
    }

    pub fn units(&self) -> &UnitSequences {
        &self.units
    }

    /// The decoded instruction in flight.
    pub fn current(&self, step: StepTag) -> Result<Rc<DecodedInst>, SimError> {
        self.current
            .clone()
            .ok_or(SimError::NoCurrentInstruction { step })
    }

    /// Operands of the decoded instruction in flight.
    pub fn instruction(&self, step: StepTag) -> Result<Instruction, SimError> {
        self.current
            .as_ref()
            .map(|current| current.inst)
            .ok_or(SimError::NoCurrentInstruction { step })
    }

    /// Privilege level that loads and stores are checked against.
    ///
    /// > When MPRV=1, load and store memory addresses are translated and protected, and endianness
    /// > is applied, as though the current privilege mode were set to MPP.
    pub fn effective_data_privilege(&self) -> PrivilegeLevel {
        if self.privilege == PrivilegeLevel::Machine && self.csrs.status.mprv() {
            self.csrs.status.mpp()
        } else {
            self.privilege
        }
    }

    /// Translation modes for instruction fetch and for data accesses.
    pub fn mmu_modes(&self) -> (MmuMode, MmuMode) {
        let mode_at = |privilege| match privilege {
            PrivilegeLevel::Machine => MmuMode::Baremetal,
            _ => self.csrs.satp_mode(),
        };
        (
            mode_at(self.privilege),
            mode_at(self.effective_data_privilege()),
        )
    }

    /// Checks that the current privilege level may access the CSR.
    ///
    /// > When TVM=1, attempts to read or write the satp CSR or execute an SFENCE.VMA or SINVAL.VMA
    /// > instruction while executing in S-mode will raise an illegal instruction exception.
    pub fn check_csr(&self, specifier: CsrSpecifier, write: bool) -> Result<(), CsrError> {
        csr::check_access(specifier, self.privilege, write)?;
        if specifier == specifier::SATP
            && self.privilege == PrivilegeLevel::Supervisor
            && self.csrs.status.tvm()
        {
            return Err(CsrError::TrappedVirtualMemory);
        }
        Ok(())
    }

    /// Reads a CSR, including the vector CSRs. Does not check privileges.
    pub fn read_csr(&self, specifier: CsrSpecifier) -> Result<u64, CsrError> {
        use specifier::*;
        let vector = &self.vector;
        Ok(match specifier {
            VSTART => vector.vstart(),
            VXSAT => vector.vxsat() as u64,
            VXRM => vector.vxrm(),
            VCSR => vector.vxrm() << 1 | vector.vxsat() as u64,
            VL => vector.vl(),
            VTYPE => vector.read_vtype(self.config.xlen),
            VLENB => vector.vlenb() as u64,
            _ => self.csrs.read(specifier)?,
        })
    }

    /// Writes a CSR, including the vector CSRs. Does not check privileges.
    pub fn write_csr(&mut self, specifier: CsrSpecifier, value: u64) -> Result<(), CsrError> {
        use specifier::*;
        match specifier {
            VSTART => {
                let mask = self.vector.vlen() as u64 - 1;
                self.vector.set_vstart(value & mask);
            }
            VXSAT => self.vector.set_vxsat(value & 1 != 0),
            VXRM => self.vector.set_vxrm(value),
            VCSR => {
                self.vector.set_vxsat(value & 1 != 0);
                self.vector.set_vxrm(value >> 1);
            }
            SATP | MSTATUS | SSTATUS => {
                self.csrs.write(specifier, value)?;
                self.sim.mode_change_pending = true;
            }
            _ => self.csrs.write(specifier, value)?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Simulator;

    #[test]
    fn test_effective_privilege_and_modes() {
        let mut sim = Simulator::new(Config::default()).unwrap();
        let hart = sim.hart_mut();
        assert_eq!((MmuMode::Baremetal, MmuMode::Baremetal), hart.mmu_modes());
        hart.write_csr(specifier::SATP, 8 << 60 | 0x80010).unwrap();
        assert!(hart.sim.mode_change_pending);
        assert_eq!((MmuMode::Baremetal, MmuMode::Baremetal), hart.mmu_modes());
        hart.csrs.status.set_mpp(crate::RawPrivilegeLevel::Supervisor);
        hart.csrs.status.set_mprv(true);
        assert_eq!(PrivilegeLevel::Supervisor, hart.effective_data_privilege());
        assert_eq!((MmuMode::Baremetal, MmuMode::Sv39), hart.mmu_modes());
        hart.privilege = PrivilegeLevel::User;
        assert_eq!(PrivilegeLevel::User, hart.effective_data_privilege());
        assert_eq!((MmuMode::Sv39, MmuMode::Sv39), hart.mmu_modes());
    }

    #[test]
    fn test_csr_checks() {
        let mut sim = Simulator::new(Config::default()).unwrap();
        let hart = sim.hart_mut();
        assert!(hart.check_csr(specifier::SATP, true).is_ok());
        hart.privilege = PrivilegeLevel::Supervisor;
        hart.csrs.write(specifier::MSTATUS, 1 << 20).unwrap();
        assert_eq!(
            Err(CsrError::TrappedVirtualMemory),
            hart.check_csr(specifier::SATP, false)
        );
        assert!(matches!(
            hart.check_csr(specifier::MSCRATCH, false),
            Err(CsrError::Privileged { .. })
        ));
        assert_eq!(
            Err(CsrError::WriteToReadOnly(specifier::VL)),
            hart.check_csr(specifier::VL, true)
        );
    }

    #[test]
    fn test_vector_csrs() {
        let mut sim = Simulator::new(Config::default()).unwrap();
        let hart = sim.hart_mut();
        assert_eq!(16, hart.read_csr(specifier::VLENB).unwrap());
        assert_eq!(1 << 63, hart.read_csr(specifier::VTYPE).unwrap());
        hart.write_csr(specifier::VCSR, 0b101).unwrap();
        assert_eq!(0b10, hart.read_csr(specifier::VXRM).unwrap());
        assert_eq!(1, hart.read_csr(specifier::VXSAT).unwrap());
        hart.vector.configure(0b010_000, Some(3));
        assert_eq!(3, hart.read_csr(specifier::VL).unwrap());
        assert_eq!(0b010_000, hart.read_csr(specifier::VTYPE).unwrap());
    }
}
