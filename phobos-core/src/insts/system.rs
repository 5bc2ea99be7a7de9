//! Environment calls, trap returns, fences and `wfi`.

use crate::hart::execute::HandlerTable;
use crate::hart::{Exception, Hart};
use crate::sequence::{StepContext, StepOutcome, StepResult, StepTag};
use crate::xlen::Xlen;
use crate::{PrivilegeLevel, RawPrivilegeLevel};
use log::{debug, info};

pub(super) fn register<X: Xlen>(table: &mut HandlerTable) {
    table.insert_execute("fence", fence);
    table.insert_execute("fence.i", fence);
    table.insert_execute("ecall", ecall);
    table.insert_execute("ebreak", ebreak);
    table.insert_execute("mret", mret);
    table.insert_execute("sret", sret);
    table.insert_execute("wfi", wfi);
    table.insert_execute("sfence.vma", sfence_vma);
}

/// A single hart with no caches: every fence is a no-op.
fn fence(_: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    Ok(StepOutcome::Advance)
}

fn ecall(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    hart.raise(Exception::environment_call_from(hart.privilege), 0)
}

fn ebreak(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    let pc = hart.registers.pc();
    hart.raise(Exception::Breakpoint, pc)
}

/// > An MRET or SRET instruction is used to return from a trap in M-mode or S-mode respectively.
/// > When executing an xRET instruction, supposing xPP holds the value y, xIE is set to xPIE; the
/// > privilege mode is changed to y; xPIE is set to 1; and xPP is set to the least-privileged
/// > supported mode (U if U-mode is implemented, else M). If y≠M, xRET also sets MPRV=0.
fn mret(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    if hart.privilege < PrivilegeLevel::Machine {
        let raw = hart.instruction(StepTag::Execute)?.raw;
        return hart.raise(Exception::IllegalInstruction, raw as u64);
    }
    let status = &mut hart.csrs.status;
    let target = status.mpp();
    status.set_mie(status.mpie());
    status.set_mpie(true);
    status.set_mpp(RawPrivilegeLevel::User);
    if target != PrivilegeLevel::Machine {
        status.set_mprv(false);
    }
    hart.privilege = target;
    hart.registers.set_next_pc(hart.csrs.mepc());
    hart.sim.mode_change_pending = true;
    debug!("Returning to {target}-mode at {:#x}", hart.csrs.mepc());
    Ok(StepOutcome::Advance)
}

/// > The TSR (Trap SRET) bit [...] When TSR=1, attempts to execute SRET while executing in S-mode
/// > will raise an illegal instruction exception.
fn sret(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    let trapped = hart.privilege < PrivilegeLevel::Supervisor
        || (hart.privilege == PrivilegeLevel::Supervisor && hart.csrs.status.tsr());
    if trapped {
        let raw = hart.instruction(StepTag::Execute)?.raw;
        return hart.raise(Exception::IllegalInstruction, raw as u64);
    }
    let status = &mut hart.csrs.status;
    let target = status.spp();
    status.set_sie(status.spie());
    status.set_spie(true);
    status.set_spp(PrivilegeLevel::User);
    // SPP can only hold U or S, so the target is never M.
    status.set_mprv(false);
    hart.privilege = target;
    hart.registers.set_next_pc(hart.csrs.sepc());
    hart.sim.mode_change_pending = true;
    debug!("Returning to {target}-mode at {:#x}", hart.csrs.sepc());
    Ok(StepOutcome::Advance)
}

/// Without interrupts there is nothing to wait for. With `stop_on_wfi` the simulation ends
/// instead.
fn wfi(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    if hart.config.stop_on_wfi {
        info!("Stopping on wfi at {:#x}", hart.registers.pc());
        hart.sim.request_stop(Some(0));
    }
    Ok(StepOutcome::Advance)
}

/// There is no TLB to flush, so only the privilege checks remain.
fn sfence_vma(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    let trapped = hart.privilege == PrivilegeLevel::User
        || (hart.privilege == PrivilegeLevel::Supervisor && hart.csrs.status.tvm());
    if trapped {
        let raw = hart.instruction(StepTag::Execute)?.raw;
        return hart.raise(Exception::IllegalInstruction, raw as u64);
    }
    Ok(StepOutcome::Advance)
}
