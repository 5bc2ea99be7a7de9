//! RV32I and RV64I base integer instructions.

use super::{
    read_translated, reg_imm_op, reg_reg_op, translate_data, word_imm_op, word_reg_op,
    write_translated,
};
use crate::hart::execute::HandlerTable;
use crate::hart::translate::{Access, LoadAccess, StoreAccess};
use crate::hart::{Exception, Hart};
use crate::registers::Specifier;
use crate::sequence::{StepContext, StepOutcome, StepResult, StepTag};
use crate::xlen::{WordWidth, Xlen};
use crate::{unit, Alignment};
use log::info;

pub(super) fn register<X: Xlen>(table: &mut HandlerTable) {
    table.insert_execute("lui", lui::<X>);
    table.insert_execute("auipc", auipc::<X>);
    table.insert_execute("jal", jal::<X>);
    table.insert_execute("jalr", jalr::<X>);

    table.insert_execute("beq", beq::<X>);
    table.insert_execute("bne", bne::<X>);
    table.insert_execute("blt", blt::<X>);
    table.insert_execute("bge", bge::<X>);
    table.insert_execute("bltu", bltu::<X>);
    table.insert_execute("bgeu", bgeu::<X>);

    table.insert_compute_address("lb", address::<X, LoadAccess, { unit::BYTE }>);
    table.insert_compute_address("lh", address::<X, LoadAccess, { unit::HALFWORD }>);
    table.insert_compute_address("lw", address::<X, LoadAccess, { unit::WORD }>);
    table.insert_compute_address("lbu", address::<X, LoadAccess, { unit::BYTE }>);
    table.insert_compute_address("lhu", address::<X, LoadAccess, { unit::HALFWORD }>);
    table.insert_execute("lb", load::<X, { unit::BYTE }, true>);
    table.insert_execute("lh", load::<X, { unit::HALFWORD }, true>);
    table.insert_execute("lw", load::<X, { unit::WORD }, true>);
    table.insert_execute("lbu", load::<X, { unit::BYTE }, false>);
    table.insert_execute("lhu", load::<X, { unit::HALFWORD }, false>);

    table.insert_compute_address("sb", address::<X, StoreAccess, { unit::BYTE }>);
    table.insert_compute_address("sh", address::<X, StoreAccess, { unit::HALFWORD }>);
    table.insert_compute_address("sw", address::<X, StoreAccess, { unit::WORD }>);
    table.insert_execute("sb", store::<X, { unit::BYTE }>);
    table.insert_execute("sh", store::<X, { unit::HALFWORD }>);
    table.insert_execute("sw", store::<X, { unit::WORD }>);

    table.insert_execute("addi", addi::<X>);
    table.insert_execute("slti", slti::<X>);
    table.insert_execute("sltiu", sltiu::<X>);
    table.insert_execute("xori", xori::<X>);
    table.insert_execute("ori", ori::<X>);
    table.insert_execute("andi", andi::<X>);
    table.insert_execute("slli", slli::<X>);
    table.insert_execute("srli", srli::<X>);
    table.insert_execute("srai", srai::<X>);

    table.insert_execute("add", add::<X>);
    table.insert_execute("sub", sub::<X>);
    table.insert_execute("sll", sll::<X>);
    table.insert_execute("slt", slt::<X>);
    table.insert_execute("sltu", sltu::<X>);
    table.insert_execute("xor", xor::<X>);
    table.insert_execute("srl", srl::<X>);
    table.insert_execute("sra", sra::<X>);
    table.insert_execute("or", or::<X>);
    table.insert_execute("and", and::<X>);

    if X::WIDTH == WordWidth::W64 {
        table.insert_compute_address("ld", address::<X, LoadAccess, { unit::DOUBLEWORD }>);
        table.insert_compute_address("lwu", address::<X, LoadAccess, { unit::WORD }>);
        table.insert_compute_address("sd", address::<X, StoreAccess, { unit::DOUBLEWORD }>);
        table.insert_execute("ld", load::<X, { unit::DOUBLEWORD }, true>);
        table.insert_execute("lwu", load::<X, { unit::WORD }, false>);
        table.insert_execute("sd", store::<X, { unit::DOUBLEWORD }>);

        table.insert_execute("addiw", addiw::<X>);
        table.insert_execute("slliw", slliw::<X>);
        table.insert_execute("srliw", srliw::<X>);
        table.insert_execute("sraiw", sraiw::<X>);
        table.insert_execute("addw", addw::<X>);
        table.insert_execute("subw", subw::<X>);
        table.insert_execute("sllw", sllw::<X>);
        table.insert_execute("srlw", srlw::<X>);
        table.insert_execute("sraw", sraw::<X>);
    }
}

/// > LUI (load upper immediate) is used to build 32-bit constants and uses the U-type format.
/// > LUI places the U-immediate value in the top 20 bits of the destination register rd,
/// > filling in the lowest 12 bits with zeros.
fn lui<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    let inst = hart.instruction(StepTag::Execute)?;
    hart.registers.set_x(inst.rd, X::from_signed(inst.imm));
    Ok(StepOutcome::Advance)
}

/// > AUIPC (add upper immediate to pc) is used to build pc-relative addresses and uses the
/// > U-type format. AUIPC forms a 32-bit offset from the 20-bit U-immediate, filling in the
/// > lowest 12 bits with zeros, adds this offset to the address of the AUIPC instruction, then
/// > places the result in register rd.
fn auipc<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    let inst = hart.instruction(StepTag::Execute)?;
    let result = hart.registers.pc().wrapping_add(inst.imm as u64);
    hart.registers.set_x(inst.rd, X::truncate(result));
    Ok(StepOutcome::Advance)
}

fn jal<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    let inst = hart.instruction(StepTag::Execute)?;
    let target = X::truncate(hart.registers.pc().wrapping_add(inst.imm as u64));
    jump(hart, inst.rd, target)
}

/// > The target address is obtained by adding the sign-extended 12-bit I-immediate to the
/// > register rs1, then setting the least-significant bit of the result to zero.
fn jalr<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    let inst = hart.instruction(StepTag::Execute)?;
    let target = X::truncate(hart.registers.x(inst.rs1).wrapping_add(inst.imm as u64)) & !1;
    jump(hart, inst.rd, target)
}

fn jump(hart: &mut Hart, link: Specifier, target: u64) -> StepResult<Hart> {
    if !Alignment::WORD.is_aligned(target) {
        return hart.raise(Exception::InstructionAddressMisaligned, target);
    }
    let return_address = hart.registers.next_pc();
    hart.registers.set_x(link, return_address);
    hart.registers.set_next_pc(target);
    Ok(StepOutcome::Advance)
}

// Takes the branch if `predicate` returns `true`.
fn cond_branch<X, P>(hart: &mut Hart, predicate: P) -> StepResult<Hart>
where
    X: Xlen,
    P: FnOnce(u64, u64) -> bool,
{
    let inst = hart.instruction(StepTag::Execute)?;
    if predicate(hart.registers.x(inst.rs1), hart.registers.x(inst.rs2)) {
        let target = X::truncate(hart.registers.pc().wrapping_add(inst.imm as u64));
        if !Alignment::WORD.is_aligned(target) {
            return hart.raise(Exception::InstructionAddressMisaligned, target);
        }
        hart.registers.set_next_pc(target);
    }
    Ok(StepOutcome::Advance)
}

fn beq<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    cond_branch::<X, _>(hart, |a, b| a == b)
}

fn bne<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    cond_branch::<X, _>(hart, |a, b| a != b)
}

fn blt<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    cond_branch::<X, _>(hart, |a, b| X::to_signed(a) < X::to_signed(b))
}

fn bge<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    cond_branch::<X, _>(hart, |a, b| X::to_signed(a) >= X::to_signed(b))
}

fn bltu<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    cond_branch::<X, _>(hart, |a, b| a < b)
}

fn bgeu<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    cond_branch::<X, _>(hart, |a, b| a >= b)
}

/// Computes `rs1 + imm` and translates the `SIZE`-byte access there.
///
/// Misaligned accesses are supported; one crossing a page is translated in two parts.
fn address<X: Xlen, A: Access, const SIZE: usize>(
    hart: &mut Hart,
    context: StepContext<'_, Hart>,
) -> StepResult<Hart> {
    let inst = hart.instruction(StepTag::ComputeAddress)?;
    let vaddr = X::truncate(hart.registers.x(inst.rs1).wrapping_add(inst.imm as u64));
    hart.data_translation.request(vaddr, SIZE)?;
    translate_data(hart, context, A::TYPE)
}

fn load<X: Xlen, const SIZE: usize, const SIGNED: bool>(
    hart: &mut Hart,
    _: StepContext<'_, Hart>,
) -> StepResult<Hart> {
    let inst = hart.instruction(StepTag::Execute)?;
    let mut buf = [0u8; 8];
    read_translated(hart, &mut buf[..SIZE])?;
    let raw = u64::from_le_bytes(buf);
    let value = if SIGNED {
        let shift = 64 - 8 * SIZE as u32;
        ((raw << shift) as i64 >> shift) as u64
    } else {
        raw
    };
    hart.registers.set_x(inst.rd, X::truncate(value));
    Ok(StepOutcome::Advance)
}

/// Stores the low `SIZE` bytes of rs2. A nonzero store to `tohost` requests a stop with exit code
/// `value >> 1`.
fn store<X: Xlen, const SIZE: usize>(
    hart: &mut Hart,
    _: StepContext<'_, Hart>,
) -> StepResult<Hart> {
    let inst = hart.instruction(StepTag::Execute)?;
    let value = hart.registers.x(inst.rs2);
    let bytes = value.to_le_bytes();
    let paddr = write_translated(hart, &bytes[..SIZE])?;
    if hart.config.tohost == Some(paddr) {
        let mut buf = [0u8; 8];
        buf[..SIZE].copy_from_slice(&bytes[..SIZE]);
        let value = u64::from_le_bytes(buf);
        if value != 0 {
            info!("Write of {value:#x} to tohost");
            hart.sim.request_stop(Some((value >> 1) as i64));
        }
    }
    Ok(StepOutcome::Advance)
}

/// > ADDI adds the sign-extended 12-bit immediate to register rs1. Arithmetic overflow is
/// > ignored and the result is simply the low XLEN bits of the result.
fn addi<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    reg_imm_op::<X, _>(hart, |s, imm| s.wrapping_add(imm as u64))
}

fn slti<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    reg_imm_op::<X, _>(hart, |s, imm| (X::to_signed(s) < imm) as u64)
}

/// > SLTIU is similar but compares the values as unsigned numbers (i.e., the immediate is first
/// > sign-extended to XLEN bits then treated as an unsigned number).
fn sltiu<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    reg_imm_op::<X, _>(hart, |s, imm| (s < X::from_signed(imm)) as u64)
}

fn xori<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    reg_imm_op::<X, _>(hart, |s, imm| s ^ imm as u64)
}

fn ori<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    reg_imm_op::<X, _>(hart, |s, imm| s | imm as u64)
}

fn andi<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    reg_imm_op::<X, _>(hart, |s, imm| s & imm as u64)
}

fn slli<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    reg_imm_op::<X, _>(hart, |s, shamt| s << (shamt as u32 & X::SHAMT_MASK))
}

fn srli<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    reg_imm_op::<X, _>(hart, |s, shamt| s >> (shamt as u32 & X::SHAMT_MASK))
}

fn srai<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    reg_imm_op::<X, _>(hart, |s, shamt| {
        (X::to_signed(s) >> (shamt as u32 & X::SHAMT_MASK)) as u64
    })
}

fn add<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    reg_reg_op::<X, _>(hart, |s1, s2| s1.wrapping_add(s2))
}

fn sub<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    reg_reg_op::<X, _>(hart, |s1, s2| s1.wrapping_sub(s2))
}

fn sll<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    reg_reg_op::<X, _>(hart, |s1, s2| s1 << (s2 as u32 & X::SHAMT_MASK))
}

/// > SLT and SLTU perform signed and unsigned compares respectively, writing 1 to rd if
/// > rs1 < rs2, 0 otherwise.
fn slt<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    reg_reg_op::<X, _>(hart, |s1, s2| (X::to_signed(s1) < X::to_signed(s2)) as u64)
}

fn sltu<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    reg_reg_op::<X, _>(hart, |s1, s2| (s1 < s2) as u64)
}

fn xor<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    reg_reg_op::<X, _>(hart, |s1, s2| s1 ^ s2)
}

fn srl<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    reg_reg_op::<X, _>(hart, |s1, s2| s1 >> (s2 as u32 & X::SHAMT_MASK))
}

fn sra<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    reg_reg_op::<X, _>(hart, |s1, s2| {
        (X::to_signed(s1) >> (s2 as u32 & X::SHAMT_MASK)) as u64
    })
}

fn or<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    reg_reg_op::<X, _>(hart, |s1, s2| s1 | s2)
}

fn and<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    reg_reg_op::<X, _>(hart, |s1, s2| s1 & s2)
}

fn addiw<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    word_imm_op::<X, _>(hart, |s, imm| s.wrapping_add(imm as u32))
}

fn slliw<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    word_imm_op::<X, _>(hart, |s, shamt| s << (shamt & 0x1F))
}

fn srliw<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    word_imm_op::<X, _>(hart, |s, shamt| s >> (shamt & 0x1F))
}

fn sraiw<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    word_imm_op::<X, _>(hart, |s, shamt| ((s as i32) >> (shamt & 0x1F)) as u32)
}

fn addw<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    word_reg_op::<X, _>(hart, |s1, s2| s1.wrapping_add(s2))
}

fn subw<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    word_reg_op::<X, _>(hart, |s1, s2| s1.wrapping_sub(s2))
}

fn sllw<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    word_reg_op::<X, _>(hart, |s1, s2| s1 << (s2 & 0x1F))
}

fn srlw<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    word_reg_op::<X, _>(hart, |s1, s2| s1 >> (s2 & 0x1F))
}

fn sraw<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    word_reg_op::<X, _>(hart, |s1, s2| ((s1 as i32) >> (s2 & 0x1F)) as u32)
}
