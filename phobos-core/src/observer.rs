//! Hooks for co-simulation and tracing.
//!
//! Observers are registered with [`Simulator::add_observer`](crate::Simulator::add_observer),
//! which splices one hook step per callback into the live unit sequences. Until the first
//! observer is added the sequences carry no hook steps at all.

use crate::hart::{Hart, Retired};
use crate::sequence::{Step, StepContext, StepOutcome, StepResult, StepTag};
use log::info;
use std::mem;

/// Receives callbacks at fixed points of every instruction. All methods default to doing nothing.
pub trait Observer {
    /// Called right before the instruction's own sequence runs.
    fn pre_execute(&mut self, _hart: &Hart) {}

    /// Called once the instruction has retired, with or without a trap.
    fn post_execute(&mut self, _hart: &Hart, _retired: &Retired) {}

    /// Called right before a pending trap is taken. `hart.pc` still holds the faulting
    /// instruction.
    fn pre_exception(&mut self, _hart: &Hart) {}

    /// Called once when the simulation stops.
    fn stop_sim(&mut self, _hart: &Hart) {}
}

/// Logs every retired instruction at info level.
#[derive(Debug, Default)]
pub struct InstructionLogger;

impl Observer for InstructionLogger {
    fn post_execute(&mut self, _hart: &Hart, retired: &Retired) {
        let mnemonic = retired.mnemonic.unwrap_or("-");
        match (retired.opcode, retired.exception) {
            (Some(opcode), None) => {
                info!("{:>8} {:#010x}: {opcode:08x} {mnemonic}", retired.inst_count, retired.pc)
            }
            (opcode, Some(exception)) => info!(
                "{:>8} {:#010x}: {:08x} {mnemonic} trapped with {exception}",
                retired.inst_count,
                retired.pc,
                opcode.unwrap_or(0)
            ),
            (None, None) => info!("{:>8} {:#010x}: -", retired.inst_count, retired.pc),
        }
    }

    fn stop_sim(&mut self, hart: &Hart) {
        info!("Stopped with exit code {}", hart.sim.exit_code);
    }
}

pub(crate) const PRE_EXECUTE: Step<Hart> =
    Step::new("pre_execute", StepTag::PreExecute, pre_execute);
pub(crate) const POST_EXECUTE: Step<Hart> =
    Step::new("post_execute", StepTag::PostExecute, post_execute);
pub(crate) const PRE_EXCEPTION: Step<Hart> =
    Step::new("pre_exception", StepTag::PreException, pre_exception);
pub(crate) const STOP_SIM: Step<Hart> = Step::new("observe_stop", StepTag::StopSim, stop_sim);

/// Calls `f` on every observer. The observers are moved out of the hart for the duration so
/// they can borrow it immutably.
fn notify<F>(hart: &mut Hart, mut f: F)
where
    F: FnMut(&mut dyn Observer, &Hart),
{
    let mut observers = mem::take(&mut hart.observers);
    for observer in &mut observers {
        f(observer.as_mut(), hart);
    }
    hart.observers = observers;
}

fn pre_execute(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    notify(hart, |observer, hart| observer.pre_execute(hart));
    Ok(StepOutcome::Advance)
}

fn post_execute(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    if let Some(retired) = hart.sim.retired.clone() {
        notify(hart, |observer, hart| observer.post_execute(hart, &retired));
    }
    Ok(StepOutcome::Advance)
}

fn pre_exception(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    notify(hart, |observer, hart| observer.pre_exception(hart));
    Ok(StepOutcome::Advance)
}

fn stop_sim(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    notify(hart, |observer, hart| observer.stop_sim(hart));
    Ok(StepOutcome::Advance)
}
