//! Zicsr: CSR read-modify-write instructions.

use crate::hart::execute::HandlerTable;
use crate::hart::{Exception, Hart};
use crate::registers::Specifier;
use crate::sequence::{StepContext, StepOutcome, StepResult, StepTag};
use crate::xlen::Xlen;
use log::debug;

pub(super) fn register<X: Xlen>(table: &mut HandlerTable) {
    table.insert_execute("csrrw", csrrw::<X>);
    table.insert_execute("csrrs", csrrs::<X>);
    table.insert_execute("csrrc", csrrc::<X>);
    table.insert_execute("csrrwi", csrrwi::<X>);
    table.insert_execute("csrrsi", csrrsi::<X>);
    table.insert_execute("csrrci", csrrci::<X>);
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum CsrOp {
    Write,
    Set,
    Clear,
}

/// > The CSRRW (Atomic Read/Write CSR) instruction atomically swaps values in the CSRs and integer
/// > registers. [...] If rd=x0, then the instruction shall not read the CSR and shall not cause
/// > any of the side effects that might occur on a CSR read.
///
/// > For both CSRRS and CSRRC, if rs1=x0, then the instruction will not write to the CSR at all,
/// > and so shall not cause any of the side effects that might otherwise occur on a CSR write.
///
/// For the immediate variants the `rs1` field holds the zero-extended 5-bit immediate.
fn csr_op<X: Xlen>(hart: &mut Hart, op: CsrOp, immediate: bool) -> StepResult<Hart> {
    let inst = hart.instruction(StepTag::Execute)?;
    let specifier = inst.csr();
    let source = if immediate {
        u8::from(inst.rs1) as u64
    } else {
        hart.registers.x(inst.rs1)
    };
    let writes = op == CsrOp::Write || inst.rs1 != Specifier::X0;

    let result = hart.check_csr(specifier, writes).and_then(|()| {
        let old = hart.read_csr(specifier)?;
        if writes {
            let new = match op {
                CsrOp::Write => source,
                CsrOp::Set => old | source,
                CsrOp::Clear => old & !source,
            };
            hart.write_csr(specifier, X::truncate(new))?;
        }
        Ok(old)
    });
    match result {
        Ok(old) => {
            hart.registers.set_x(inst.rd, X::truncate(old));
            Ok(StepOutcome::Advance)
        }
        Err(error) => {
            debug!("CSR access by {} failed: {error}", inst.mnemonic);
            hart.raise(Exception::IllegalInstruction, inst.raw as u64)
        }
    }
}

fn csrrw<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    csr_op::<X>(hart, CsrOp::Write, false)
}

fn csrrs<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    csr_op::<X>(hart, CsrOp::Set, false)
}

fn csrrc<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    csr_op::<X>(hart, CsrOp::Clear, false)
}

fn csrrwi<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    csr_op::<X>(hart, CsrOp::Write, true)
}

fn csrrsi<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    csr_op::<X>(hart, CsrOp::Set, true)
}

fn csrrci<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    csr_op::<X>(hart, CsrOp::Clear, true)
}
