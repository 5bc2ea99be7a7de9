//! Retirement and stopping.

use super::{Exception, Hart};
use crate::sequence::{StepContext, StepOutcome, StepResult};
use log::{debug, info};

/// Everything observable about one retired instruction.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Retired {
    pub pc: u64,
    /// `None` when the trap happened before an opcode was decoded.
    pub opcode: Option<u32>,
    pub mnemonic: Option<&'static str>,
    pub unimplemented: bool,
    pub exception: Option<Exception>,
    /// Value of the instruction counter after this retirement.
    pub inst_count: u64,
}

/// Retires the instruction in flight: commits `next_pc`, counts it and records a [`Retired`].
///
/// Both translation handshakes must be drained by now.
pub fn increment_pc(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    hart.fetch_translation.ensure_drained()?;
    hart.data_translation.ensure_drained()?;

    let pc = hart.registers.pc();
    hart.registers.set_pc(hart.registers.next_pc());
    hart.sim.inst_count += 1;
    hart.csrs.retire();

    let current = hart.current.take();
    let retired = Retired {
        pc,
        opcode: current.as_ref().map(|current| current.opcode),
        mnemonic: current.as_ref().map(|current| current.inst.mnemonic),
        unimplemented: current.is_some_and(|current| current.is_unimplemented()),
        exception: hart.sim.exception.take(),
        inst_count: hart.sim.inst_count,
    };
    hart.sim.retired = Some(retired);

    if let Some(limit) = hart.config.ilimit {
        if hart.sim.inst_count >= limit {
            debug!("Instruction limit of {limit} reached");
            hart.sim.request_stop(None);
        }
    }
    Ok(StepOutcome::Advance)
}

/// Leaves the regular flow for the stop sequence once a stop was requested.
pub fn check_stop(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    if hart.sim.stop_requested {
        Ok(StepOutcome::Divert(hart.units.stop.into()))
    } else {
        Ok(StepOutcome::Advance)
    }
}

pub fn stop_sim(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    hart.sim.stopped = true;
    info!(
        "Simulation stopped after {} instructions with exit code {}",
        hart.sim.inst_count, hart.sim.exit_code
    );
    Ok(StepOutcome::Advance)
}
