//! Synchronous exceptions and the trap-entry step.

use super::Hart;
use crate::sequence::{StepContext, StepOutcome, StepResult};
use crate::{PrivilegeLevel, SimError};
use log::debug;
use std::fmt;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Exception {
    /// Instruction address is not on a four-byte aligned boundary in memory.
    InstructionAddressMisaligned,
    InstructionAccessFault,
    /// Generic exception used to communicate one of many possible scenarios:
    ///
    /// - Attempt to decode a reserved or unknown instruction.
    /// - Attempt to access a non-existent CSR.
    /// - Attempt to access a CSR without the appropriate privilege level.
    /// - Attempt to write to a read-only CSR.
    /// - Vector instruction while `vtype.vill` is set.
    IllegalInstruction,
    Breakpoint,
    LoadAddressMisaligned,
    LoadAccessFault,
    StoreOrAmoAddressMisaligned,
    StoreOrAmoAccessFault,
    EnvironmentCallFromUMode,
    EnvironmentCallFromSMode,
    EnvironmentCallFromMMode,
    InstructionPageFault,
    LoadPageFault,
    StoreOrAmoPageFault,
}

impl Exception {
    /// Returns the exception code (cause) for this exception.
    pub fn code(&self) -> u64 {
        match self {
            Self::InstructionAddressMisaligned => 0,
            Self::InstructionAccessFault => 1,
            Self::IllegalInstruction => 2,
            Self::Breakpoint => 3,
            Self::LoadAddressMisaligned => 4,
            Self::LoadAccessFault => 5,
            Self::StoreOrAmoAddressMisaligned => 6,
            Self::StoreOrAmoAccessFault => 7,
            Self::EnvironmentCallFromUMode => 8,
            Self::EnvironmentCallFromSMode => 9,
            Self::EnvironmentCallFromMMode => 11,
            Self::InstructionPageFault => 12,
            Self::LoadPageFault => 13,
            Self::StoreOrAmoPageFault => 15,
        }
    }

    pub fn environment_call_from(privilege_level: PrivilegeLevel) -> Self {
        match privilege_level {
            PrivilegeLevel::User => Self::EnvironmentCallFromUMode,
            PrivilegeLevel::Supervisor => Self::EnvironmentCallFromSMode,
            PrivilegeLevel::Machine => Self::EnvironmentCallFromMMode,
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?} (cause {})", self.code())
    }
}

/// Reason an instruction handler could not complete.
#[derive(Debug)]
pub enum Fault {
    /// The simulator itself is broken; aborts the run.
    Fatal(SimError),
    /// The guest caused an architectural exception.
    Exception { cause: Exception, tval: u64 },
}

impl Fault {
    pub fn exception(cause: Exception, tval: u64) -> Self {
        Self::Exception { cause, tval }
    }

    pub fn illegal_instruction(raw: u32) -> Self {
        Self::Exception {
            cause: Exception::IllegalInstruction,
            tval: raw as u64,
        }
    }
}

macro_rules! fatal_from {
    ( $( $error:ty ),* $(,)? ) => {
        $(
            impl From<$error> for Fault {
                fn from(error: $error) -> Self {
                    Self::Fatal(error.into())
                }
            }
        )*
    };
}

fatal_from! {
    SimError,
    crate::sequence::SequenceError,
    crate::translation::HandshakeError,
    crate::memory::MemoryError,
}

/// Trap recorded by [`Hart::raise`] for the exception step to take.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PendingTrap {
    pub cause: Exception,
    pub tval: u64,
}

impl Hart {
    /// Records `cause` as pending and returns the diversion into the exception sequence.
    pub fn raise(&mut self, cause: Exception, tval: u64) -> StepResult<Hart> {
        debug!("Raising {cause} at pc {:#x}, tval {tval:#x}", self.registers.pc());
        self.pending_trap = Some(PendingTrap { cause, tval });
        Ok(StepOutcome::Divert(self.units.exception.into()))
    }

    /// Converts the outcome of an instruction handler into a step outcome.
    pub fn finish(&mut self, result: Result<(), Fault>) -> StepResult<Hart> {
        match result {
            Ok(()) => Ok(StepOutcome::Advance),
            Err(Fault::Exception { cause, tval }) => self.raise(cause, tval),
            Err(Fault::Fatal(error)) => Err(error),
        }
    }
}

/// Body of the exception sequence: takes the pending trap.
///
/// > By default, all traps at any privilege level are handled in machine mode [...]. To increase
/// > performance, implementations can provide individual read/write bits within medeleg and
/// > mideleg to indicate that certain exceptions and interrupts should be processed directly by
/// > a lower privilege level.
pub fn take_trap(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    let Some(PendingTrap { cause, tval }) = hart.pending_trap else {
        // Nothing to take; leave the machine untouched and retire as usual.
        return Ok(StepOutcome::Advance);
    };
    hart.sim.exception = Some(cause);
    hart.pending_trap = None;
    hart.fetch_translation.clear();
    hart.data_translation.clear();
    hart.vector.set_vstart(0);
    hart.reservation = None;

    let epc = hart.registers.pc();
    let delegated = hart.privilege <= PrivilegeLevel::Supervisor
        && hart.csrs.medeleg() & (1 << cause.code()) != 0;
    let target = if delegated {
        hart.csrs.enter_supervisor_trap(epc, cause.code(), tval);
        let status = &mut hart.csrs.status;
        status.set_spie(status.sie());
        status.set_sie(false);
        status.set_spp(hart.privilege);
        hart.privilege = PrivilegeLevel::Supervisor;
        hart.csrs.stvec()
    } else {
        hart.csrs.enter_machine_trap(epc, cause.code(), tval);
        let status = &mut hart.csrs.status;
        status.set_mpie(status.mie());
        status.set_mie(false);
        status.set_mpp(hart.privilege.into());
        hart.privilege = PrivilegeLevel::Machine;
        hart.csrs.mtvec()
    };
    // Only direct mode: without interrupts, vectored mode also jumps to BASE for exceptions.
    hart.registers.set_next_pc(target & !0b11);
    hart.sim.mode_change_pending = true;
    debug!(
        "Took {cause} into {}-mode, handler at {:#x}",
        hart.privilege,
        hart.registers.next_pc()
    );
    Ok(StepOutcome::Advance)
}
