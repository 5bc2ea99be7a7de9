//! Instruction handlers, grouped by ISA extension.
//!
//! Handlers are plain step bodies generic over [`Xlen`], registered by mnemonic in a
//! [`HandlerTable`]. They read their operands from the hart's current instruction.

mod rva;
mod rvi;
mod rvm;
mod rvv;
mod system;
mod zicsr;

use crate::hart::execute::HandlerTable;
use crate::hart::translate::AccessType;
use crate::hart::Hart;
use crate::sequence::{Exit, StepContext, StepOutcome, StepResult, StepTag};
use crate::xlen::Xlen;
use crate::SimError;

/// Registers every implemented instruction for width `X`.
pub(crate) fn register<X: Xlen>(table: &mut HandlerTable) {
    rvi::register::<X>(table);
    rvm::register::<X>(table);
    rva::register::<X>(table);
    zicsr::register::<X>(table);
    system::register::<X>(table);
    rvv::register::<X>(table);
}

/// Runs the live data translate sequence for the requests just placed, passing on a diversion
/// into the exception sequence.
fn translate_data(
    hart: &mut Hart,
    context: StepContext<'_, Hart>,
    access: AccessType,
) -> StepResult<Hart> {
    let id = hart.units().data_translate(access);
    match context.sequences.run_nested(id, hart)? {
        Exit::Diverted(target) => Ok(StepOutcome::Divert(target)),
        Exit::FellThrough(_) | Exit::Suspended(_) => Ok(StepOutcome::Advance),
    }
}

/// Fills `buf` from the oldest translation results, which may cover it in several pieces.
fn read_translated(hart: &mut Hart, buf: &mut [u8]) -> Result<(), SimError> {
    let mut filled = 0;
    while filled < buf.len() {
        let result = hart.data_translation.take_result()?;
        let end = (filled + result.size).min(buf.len());
        hart.memory.read(&mut buf[filled..end], result.paddr)?;
        filled = end;
    }
    Ok(())
}

/// Writes `bytes` through the oldest translation results. Returns the physical address of the
/// first byte.
fn write_translated(hart: &mut Hart, bytes: &[u8]) -> Result<u64, SimError> {
    let mut written = 0;
    let mut first = None;
    while written < bytes.len() {
        let result = hart.data_translation.take_result()?;
        let end = (written + result.size).min(bytes.len());
        hart.memory.write(result.paddr, &bytes[written..end])?;
        first.get_or_insert(result.paddr);
        written = end;
    }
    Ok(first.unwrap_or_default())
}

#[inline]
fn reg_reg_op<X, F>(hart: &mut Hart, op: F) -> StepResult<Hart>
where
    X: Xlen,
    F: FnOnce(u64, u64) -> u64,
{
    let inst = hart.instruction(StepTag::Execute)?;
    let result = op(hart.registers.x(inst.rs1), hart.registers.x(inst.rs2));
    hart.registers.set_x(inst.rd, X::truncate(result));
    Ok(StepOutcome::Advance)
}

#[inline]
fn reg_imm_op<X, F>(hart: &mut Hart, op: F) -> StepResult<Hart>
where
    X: Xlen,
    F: FnOnce(u64, i64) -> u64,
{
    let inst = hart.instruction(StepTag::Execute)?;
    let result = op(hart.registers.x(inst.rs1), inst.imm);
    hart.registers.set_x(inst.rd, X::truncate(result));
    Ok(StepOutcome::Advance)
}

/// Register-register operation on the low 32 bits, with the result sign-extended (RV64 `*W`).
#[inline]
fn word_reg_op<X, F>(hart: &mut Hart, op: F) -> StepResult<Hart>
where
    X: Xlen,
    F: FnOnce(u32, u32) -> u32,
{
    reg_reg_op::<X, _>(hart, |a, b| X::sign_extend_word(op(a as u32, b as u32)))
}

/// Register-immediate operation on the low 32 bits, with the result sign-extended (RV64 `*W`).
#[inline]
fn word_imm_op<X, F>(hart: &mut Hart, op: F) -> StepResult<Hart>
where
    X: Xlen,
    F: FnOnce(u32, i64) -> u32,
{
    reg_imm_op::<X, _>(hart, |a, imm| X::sign_extend_word(op(a as u32, imm)))
}
