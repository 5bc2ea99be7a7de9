//! V extension subset: configuration, unit-stride, strided and indexed loads and stores, and a
//! handful of integer arithmetic instructions.
//!
//! Long vectors are processed in chunks of `Config::vector_chunk` elements. After each chunk the
//! instruction records its progress in `vstart` and yields back to the driver: arithmetic
//! instructions repeat their execute step, memory instructions divert back into their own
//! sequence so the next chunk's addresses are translated before its data moves.

use super::{read_translated, translate_data, write_translated};
use crate::hart::execute::HandlerTable;
use crate::hart::translate::{Access, AccessType, LoadAccess, StoreAccess};
use crate::hart::{Exception, Hart};
use crate::instruction::Instruction;
use crate::registers::Specifier;
use crate::sequence::{SequenceRef, StepContext, StepOutcome, StepResult, StepTag};
use crate::unit;
use crate::vector::VType;
use crate::xlen::Xlen;
use std::ops::Range;
use std::rc::Rc;

pub(super) fn register<X: Xlen>(table: &mut HandlerTable) {
    table.insert_execute("vsetvli", vsetvli::<X>);
    table.insert_execute("vsetivli", vsetivli::<X>);
    table.insert_execute("vsetvl", vsetvl::<X>);

    register_memory::<X, UnitStride>(
        table,
        ["vle8.v", "vle16.v", "vle32.v", "vle64.v"],
        ["vse8.v", "vse16.v", "vse32.v", "vse64.v"],
    );
    register_memory::<X, Strided>(
        table,
        ["vlse8.v", "vlse16.v", "vlse32.v", "vlse64.v"],
        ["vsse8.v", "vsse16.v", "vsse32.v", "vsse64.v"],
    );
    // A single hart observes ordered and unordered indexed accesses identically.
    register_memory::<X, Indexed>(
        table,
        ["vluxei8.v", "vluxei16.v", "vluxei32.v", "vluxei64.v"],
        ["vsuxei8.v", "vsuxei16.v", "vsuxei32.v", "vsuxei64.v"],
    );
    register_memory::<X, Indexed>(
        table,
        ["vloxei8.v", "vloxei16.v", "vloxei32.v", "vloxei64.v"],
        ["vsoxei8.v", "vsoxei16.v", "vsoxei32.v", "vsoxei64.v"],
    );

    table.insert_execute("vadd.vv", vadd_vv);
    table.insert_execute("vadd.vx", vadd_vx);
    table.insert_execute("vadd.vi", vadd_vi);
    table.insert_execute("vsub.vv", vsub_vv);
    table.insert_execute("vsub.vx", vsub_vx);
    table.insert_execute("vand.vv", vand_vv);
    table.insert_execute("vor.vv", vor_vv);
    table.insert_execute("vxor.vv", vxor_vv);
    table.insert_execute("vmul.vv", vmul_vv);
}

fn register_memory<X: Xlen, M: Addressing>(
    table: &mut HandlerTable,
    loads: [&'static str; 4],
    stores: [&'static str; 4],
) {
    for mnemonic in loads {
        table.insert_compute_address(mnemonic, vector_address::<X, LoadAccess, M>);
        table.insert_execute(mnemonic, vector_load::<M>);
    }
    for mnemonic in stores {
        table.insert_compute_address(mnemonic, vector_address::<X, StoreAccess, M>);
        table.insert_execute(mnemonic, vector_store::<M>);
    }
}

/// Application vector length requested by `vsetvl{i}`.
///
/// > When rs1 is not x0, the AVL is an unsigned integer held in the x register specified by rs1.
/// > When rs1=x0 but rd≠x0, the maximum unsigned integer value (~0) is used as the AVL. When
/// > rs1=x0 and rd=x0, the instruction operates as if the current vector length in vl is used as
/// > the AVL.
fn requested_avl(hart: &Hart, inst: &Instruction) -> Option<u64> {
    if inst.rs1 != Specifier::X0 {
        Some(hart.registers.x(inst.rs1))
    } else if inst.rd != Specifier::X0 {
        Some(u64::MAX)
    } else {
        None
    }
}

fn vsetvli<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    let inst = hart.instruction(StepTag::Execute)?;
    let avl = requested_avl(hart, &inst);
    let vl = hart.vector.configure(inst.imm as u64, avl);
    hart.registers.set_x(inst.rd, X::truncate(vl));
    Ok(StepOutcome::Advance)
}

/// The AVL is the 5-bit unsigned immediate held in the `rs1` field.
fn vsetivli<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    let inst = hart.instruction(StepTag::Execute)?;
    let avl = u8::from(inst.rs1) as u64;
    let vl = hart.vector.configure(inst.imm as u64, Some(avl));
    hart.registers.set_x(inst.rd, X::truncate(vl));
    Ok(StepOutcome::Advance)
}

fn vsetvl<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    let inst = hart.instruction(StepTag::Execute)?;
    let avl = requested_avl(hart, &inst);
    let raw_vtype = hart.registers.x(inst.rs2);
    let vl = hart.vector.configure(raw_vtype, avl);
    hart.registers.set_x(inst.rd, X::truncate(vl));
    Ok(StepOutcome::Advance)
}

/// Element indices handled by the next chunk of the instruction in flight.
fn chunk(hart: &Hart) -> Range<u64> {
    let start = hart.vector.vstart();
    let end = hart
        .vector
        .vl()
        .min(start.saturating_add(hart.config.vector_chunk));
    start..end
}

/// Returns `true` if element `index` is active under the instruction's mask.
fn active(hart: &Hart, inst: &Instruction, index: u64) -> bool {
    inst.vm() || hart.vector.mask_bit(index)
}

/// Returns `true` if `register` is a valid base of a register group of `2^emul_log2` registers.
///
/// > If LMUL=2, the vector register group contains vector register v n and vector register v n+1
/// > [...] Instructions specifying a vector operand with an odd-numbered vector register will
/// > raise an illegal instruction exception.
fn group_aligned(register: Specifier, emul_log2: i8) -> bool {
    emul_log2 <= 0 || u8::from(register) % (1 << emul_log2) == 0
}

fn sew_mask(sew: u32) -> u64 {
    u64::MAX >> (64 - sew)
}

fn illegal(hart: &mut Hart, inst: &Instruction) -> StepResult<Hart> {
    hart.raise(Exception::IllegalInstruction, inst.raw as u64)
}

/// Returns `true` if a masked instruction writes the mask register.
///
/// > The destination vector register group for a masked vector instruction cannot overlap the
/// > source mask register (v0)
fn overwrites_mask(inst: &Instruction) -> bool {
    !inst.vm() && u8::from(inst.rd) == 0
}

/// `log2(EMUL)` of an operand with element width `eew` under `vtype`.
///
/// > The EMUL is calculated as EMUL=(EEW/SEW)*LMUL. If the EMUL would be out of range
/// > (EMUL>8 or EMUL<1/8), the instruction encoding is reserved.
fn emul_log2(eew: u32, vtype: VType) -> Option<i8> {
    let ratio_log2 = eew.trailing_zeros() as i8 - vtype.sew.trailing_zeros() as i8;
    let emul_log2 = ratio_log2 + vtype.lmul_log2;
    (-3..=3).contains(&emul_log2).then_some(emul_log2)
}

/// How a vector load or store forms the addresses of its elements.
trait Addressing: 'static {
    /// Effective `vtype` of the data elements, or `None` if the encoding is reserved under the
    /// current configuration.
    fn data_vtype(hart: &Hart, inst: &Instruction) -> Option<VType>;

    /// Offset of element `index` from the base address in rs1.
    fn offset<X: Xlen>(hart: &Hart, inst: &Instruction, index: u64) -> Option<u64>;
}

struct UnitStride;

struct Strided;

struct Indexed;

/// Data elements are EEW wide, with EEW taken from the instruction and EMUL derived from it.
fn encoded_eew_vtype(hart: &Hart, inst: &Instruction) -> Option<VType> {
    let vtype = hart.vector.vtype()?;
    let sew = inst.vector_eew();
    let lmul_log2 = emul_log2(sew, vtype)?;
    group_aligned(inst.rd, lmul_log2).then_some(VType {
        sew,
        lmul_log2,
        ..vtype
    })
}

impl Addressing for UnitStride {
    fn data_vtype(hart: &Hart, inst: &Instruction) -> Option<VType> {
        encoded_eew_vtype(hart, inst)
    }

    fn offset<X: Xlen>(_hart: &Hart, inst: &Instruction, index: u64) -> Option<u64> {
        Some(index.wrapping_mul(inst.vector_eew() as u64 / 8))
    }
}

impl Addressing for Strided {
    fn data_vtype(hart: &Hart, inst: &Instruction) -> Option<VType> {
        encoded_eew_vtype(hart, inst)
    }

    /// The byte stride in rs2 is signed and may be zero.
    fn offset<X: Xlen>(hart: &Hart, inst: &Instruction, index: u64) -> Option<u64> {
        let stride = X::to_signed(hart.registers.x(inst.rs2)) as u64;
        Some(stride.wrapping_mul(index))
    }
}

impl Addressing for Indexed {
    /// > The data vector register group has EEW=SEW, EMUL=LMUL, while the offset vector register
    /// > group has EEW encoded in the instruction and EMUL=(EEW/SEW)*LMUL.
    fn data_vtype(hart: &Hart, inst: &Instruction) -> Option<VType> {
        let vtype = hart.vector.vtype()?;
        let index_emul_log2 = emul_log2(inst.vector_eew(), vtype)?;
        let aligned = group_aligned(inst.rd, vtype.lmul_log2)
            && group_aligned(inst.rs2, index_emul_log2);
        aligned.then_some(vtype)
    }

    /// Offsets are the unsigned elements of vs2.
    fn offset<X: Xlen>(hart: &Hart, inst: &Instruction, index: u64) -> Option<u64> {
        hart.vector.element(u8::from(inst.rs2), index, inst.vector_eew())
    }
}

/// Effective data `vtype` of a load or store, or `None` if the instruction is illegal.
fn memory_vtype<M: Addressing>(hart: &Hart, inst: &Instruction, load: bool) -> Option<VType> {
    if load && overwrites_mask(inst) {
        return None;
    }
    M::data_vtype(hart, inst)
}

fn element_address<X: Xlen, M: Addressing>(
    hart: &Hart,
    inst: &Instruction,
    index: u64,
) -> Option<u64> {
    let base = hart.registers.x(inst.rs1);
    let offset = M::offset::<X>(hart, inst, index)?;
    Some(X::truncate(base.wrapping_add(offset)))
}

/// Queues the translation of every active element of the next chunk and translates them.
fn vector_address<X: Xlen, A: Access, M: Addressing>(
    hart: &mut Hart,
    context: StepContext<'_, Hart>,
) -> StepResult<Hart> {
    let inst = hart.instruction(StepTag::ComputeAddress)?;
    let load = A::TYPE == AccessType::Load;
    let Some(vtype) = memory_vtype::<M>(hart, &inst, load) else {
        return illegal(hart, &inst);
    };
    let size = vtype.sew as usize / 8;
    let mut queued = false;
    for index in chunk(hart) {
        if !active(hart, &inst, index) {
            continue;
        }
        let Some(vaddr) = element_address::<X, M>(hart, &inst, index) else {
            hart.data_translation.clear();
            return illegal(hart, &inst);
        };
        hart.data_translation.enqueue_split(vaddr, size, unit::PAGE)?;
        queued = true;
    }
    if queued {
        translate_data(hart, context, A::TYPE)
    } else {
        Ok(StepOutcome::Advance)
    }
}

/// Finishes a chunk of a load or store: either the whole instruction is done, or it records its
/// progress and runs its own sequence again for the next chunk.
fn end_memory_chunk(hart: &mut Hart, end: u64) -> StepResult<Hart> {
    if end < hart.vector.vl() {
        hart.vector.set_vstart(end);
        let current = hart.current(StepTag::Execute)?;
        Ok(StepOutcome::Divert(SequenceRef::Shared(Rc::clone(
            &current.sequence,
        ))))
    } else {
        hart.vector.set_vstart(0);
        Ok(StepOutcome::Advance)
    }
}

fn vector_load<M: Addressing>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    let inst = hart.instruction(StepTag::Execute)?;
    let Some(vtype) = memory_vtype::<M>(hart, &inst, true) else {
        return illegal(hart, &inst);
    };
    let size = vtype.sew as usize / 8;
    let range = chunk(hart);
    let end = range.end;
    for index in range {
        if !active(hart, &inst, index) {
            continue;
        }
        let mut buf = [0u8; 8];
        read_translated(hart, &mut buf[..size])?;
        let value = u64::from_le_bytes(buf);
        if !hart
            .vector
            .set_element(u8::from(inst.rd), index, vtype.sew, value)
        {
            return illegal(hart, &inst);
        }
    }
    end_memory_chunk(hart, end)
}

/// The store data register group sits in the `rd` field.
fn vector_store<M: Addressing>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    let inst = hart.instruction(StepTag::Execute)?;
    let Some(vtype) = memory_vtype::<M>(hart, &inst, false) else {
        return illegal(hart, &inst);
    };
    let size = vtype.sew as usize / 8;
    let range = chunk(hart);
    let end = range.end;
    for index in range {
        if !active(hart, &inst, index) {
            continue;
        }
        let Some(value) = hart.vector.element(u8::from(inst.rd), index, vtype.sew) else {
            return illegal(hart, &inst);
        };
        write_translated(hart, &value.to_le_bytes()[..size])?;
    }
    end_memory_chunk(hart, end)
}

/// Second source operand of an arithmetic instruction.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Operand {
    /// Element of `vs1`.
    Vector,
    /// Value of `x[rs1]`.
    Scalar,
    /// Sign-extended 5-bit immediate.
    Immediate,
}

/// Computes `vd[i] = op(vs2[i], operand)` for the active elements of the next chunk.
///
/// Inactive and tail elements are left undisturbed.
fn vector_op<F>(hart: &mut Hart, operand: Operand, op: F) -> StepResult<Hart>
where
    F: Fn(u64, u64) -> u64,
{
    let inst = hart.instruction(StepTag::Execute)?;
    let Some(vtype) = hart.vector.vtype() else {
        return illegal(hart, &inst);
    };
    let vd = inst.rd;
    let vs1 = inst.rs1;
    let vs2 = inst.rs2;
    let groups_aligned = group_aligned(vd, vtype.lmul_log2)
        && group_aligned(vs2, vtype.lmul_log2)
        && (operand != Operand::Vector || group_aligned(vs1, vtype.lmul_log2));
    if !groups_aligned || overwrites_mask(&inst) {
        return illegal(hart, &inst);
    }

    let sew = vtype.sew;
    let scalar = match operand {
        Operand::Vector => 0,
        Operand::Scalar => hart.registers.x(vs1),
        Operand::Immediate => inst.imm as u64,
    };
    let range = chunk(hart);
    let end = range.end;
    for index in range {
        if !active(hart, &inst, index) {
            continue;
        }
        let a = hart.vector.element(u8::from(vs2), index, sew);
        let b = match operand {
            Operand::Vector => hart.vector.element(u8::from(vs1), index, sew),
            Operand::Scalar | Operand::Immediate => Some(scalar),
        };
        let (Some(a), Some(b)) = (a, b) else {
            return illegal(hart, &inst);
        };
        let result = op(a, b) & sew_mask(sew);
        hart.vector.set_element(u8::from(vd), index, sew, result);
    }

    if end < hart.vector.vl() {
        hart.vector.set_vstart(end);
        Ok(StepOutcome::Repeat)
    } else {
        hart.vector.set_vstart(0);
        Ok(StepOutcome::Advance)
    }
}

fn vadd_vv(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    vector_op(hart, Operand::Vector, u64::wrapping_add)
}

fn vadd_vx(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    vector_op(hart, Operand::Scalar, u64::wrapping_add)
}

fn vadd_vi(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    vector_op(hart, Operand::Immediate, u64::wrapping_add)
}

/// `vd[i] = vs2[i] - vs1[i]`
fn vsub_vv(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    vector_op(hart, Operand::Vector, u64::wrapping_sub)
}

fn vsub_vx(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    vector_op(hart, Operand::Scalar, u64::wrapping_sub)
}

fn vand_vv(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    vector_op(hart, Operand::Vector, |a, b| a & b)
}

fn vor_vv(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    vector_op(hart, Operand::Vector, |a, b| a | b)
}

fn vxor_vv(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    vector_op(hart, Operand::Vector, |a, b| a ^ b)
}

fn vmul_vv(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    vector_op(hart, Operand::Vector, u64::wrapping_mul)
}
