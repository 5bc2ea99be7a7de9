//! A extension: load-reserved/store-conditional and the atomic memory operations.
//!
//! Every atomic translates its address once in the compute-address step, as a load for `lr` and
//! as a store for everything else, and then reads and writes through that single result.

use super::translate_data;
use crate::hart::execute::HandlerTable;
use crate::hart::translate::{Access, LoadAccess, StoreAccess};
use crate::hart::Hart;
use crate::sequence::{StepBody, StepContext, StepOutcome, StepResult, StepTag};
use crate::xlen::{WordWidth, Xlen};
use crate::{unit, Alignment, SimError};

pub(super) fn register<X: Xlen>(table: &mut HandlerTable) {
    register_width::<X, { unit::WORD }>(table, WORD_MNEMONICS);
    if X::WIDTH == WordWidth::W64 {
        register_width::<X, { unit::DOUBLEWORD }>(table, DOUBLEWORD_MNEMONICS);
    }
}

/// `lr`, `sc`, `amoswap`, `amoadd`, `amoxor`, `amoand`, `amoor`, `amomin`, `amomax`, `amominu`
/// and `amomaxu`, in that order.
type Mnemonics = [&'static str; 11];

const WORD_MNEMONICS: Mnemonics = [
    "lr.w",
    "sc.w",
    "amoswap.w",
    "amoadd.w",
    "amoxor.w",
    "amoand.w",
    "amoor.w",
    "amomin.w",
    "amomax.w",
    "amominu.w",
    "amomaxu.w",
];

const DOUBLEWORD_MNEMONICS: Mnemonics = [
    "lr.d",
    "sc.d",
    "amoswap.d",
    "amoadd.d",
    "amoxor.d",
    "amoand.d",
    "amoor.d",
    "amomin.d",
    "amomax.d",
    "amominu.d",
    "amomaxu.d",
];

fn register_width<X: Xlen, const SIZE: usize>(table: &mut HandlerTable, names: Mnemonics) {
    let [lr_name, sc_name, amos @ ..] = names;
    table.insert_compute_address(lr_name, address::<X, LoadAccess, SIZE>);
    table.insert_execute(lr_name, lr::<X, SIZE>);
    table.insert_compute_address(sc_name, address::<X, StoreAccess, SIZE>);
    table.insert_execute(sc_name, sc::<X, SIZE>);

    let bodies: [StepBody<Hart>; 9] = [
        amoswap::<X, SIZE>,
        amoadd::<X, SIZE>,
        amoxor::<X, SIZE>,
        amoand::<X, SIZE>,
        amoor::<X, SIZE>,
        amomin::<X, SIZE>,
        amomax::<X, SIZE>,
        amominu::<X, SIZE>,
        amomaxu::<X, SIZE>,
    ];
    for (mnemonic, body) in amos.into_iter().zip(bodies) {
        table.insert_compute_address(mnemonic, address::<X, StoreAccess, SIZE>);
        table.insert_execute(mnemonic, body);
    }
}

/// Translates the address in rs1, which must be naturally aligned.
///
/// > For LR and SC, the Zalrsc extension requires that the address held in rs1 be naturally
/// > aligned to the size of the operand. If the address is not naturally aligned, an
/// > address-misaligned exception or an access-fault exception will be generated.
fn address<X: Xlen, A: Access, const SIZE: usize>(
    hart: &mut Hart,
    context: StepContext<'_, Hart>,
) -> StepResult<Hart> {
    let inst = hart.instruction(StepTag::ComputeAddress)?;
    let vaddr = X::truncate(hart.registers.x(inst.rs1));
    let aligned =
        Alignment::natural_for_size(SIZE).is_some_and(|alignment| alignment.is_aligned(vaddr));
    if !aligned {
        return hart.raise(A::TYPE.misaligned(), vaddr);
    }
    hart.data_translation.request(vaddr, SIZE)?;
    translate_data(hart, context, A::TYPE)
}

/// Zero-extended value of the `SIZE` bytes at `paddr`.
fn read<const SIZE: usize>(hart: &Hart, paddr: u64) -> Result<u64, SimError> {
    let mut buf = [0u8; 8];
    hart.memory.read(&mut buf[..SIZE], paddr)?;
    Ok(u64::from_le_bytes(buf))
}

fn write<const SIZE: usize>(hart: &mut Hart, paddr: u64, value: u64) -> Result<(), SimError> {
    Ok(hart.memory.write(paddr, &value.to_le_bytes()[..SIZE])?)
}

fn sign_extend<const SIZE: usize>(value: u64) -> i64 {
    let shift = 64 - 8 * SIZE as u32;
    (value << shift) as i64 >> shift
}

fn size_mask<const SIZE: usize>() -> u64 {
    u64::MAX >> (64 - 8 * SIZE as u32)
}

fn lr<X: Xlen, const SIZE: usize>(
    hart: &mut Hart,
    _: StepContext<'_, Hart>,
) -> StepResult<Hart> {
    let inst = hart.instruction(StepTag::Execute)?;
    let paddr = hart.data_translation.take_result()?.paddr;
    let value = read::<SIZE>(hart, paddr)?;
    hart.reservation = Some(paddr);
    hart.registers.set_x(inst.rd, X::from_signed(sign_extend::<SIZE>(value)));
    Ok(StepOutcome::Advance)
}

/// Stores rs2 if the reservation covers the address and writes 0 to rd, or writes 1 to rd without
/// storing. The reservation is gone either way.
fn sc<X: Xlen, const SIZE: usize>(
    hart: &mut Hart,
    _: StepContext<'_, Hart>,
) -> StepResult<Hart> {
    let inst = hart.instruction(StepTag::Execute)?;
    let paddr = hart.data_translation.take_result()?.paddr;
    let success = hart.reservation.take() == Some(paddr);
    if success {
        let value = hart.registers.x(inst.rs2);
        write::<SIZE>(hart, paddr, value)?;
    }
    hart.registers.set_x(inst.rd, !success as u64);
    Ok(StepOutcome::Advance)
}

/// Atomically loads the value at the translated address into rd and stores `op(loaded, rs2)`
/// back. Both operands are zero-extended from `SIZE` bytes; rd receives the loaded value
/// sign-extended.
fn amo<X, const SIZE: usize, F>(hart: &mut Hart, op: F) -> StepResult<Hart>
where
    X: Xlen,
    F: FnOnce(u64, u64) -> u64,
{
    let inst = hart.instruction(StepTag::Execute)?;
    let paddr = hart.data_translation.take_result()?.paddr;
    let loaded = read::<SIZE>(hart, paddr)?;
    let operand = hart.registers.x(inst.rs2) & size_mask::<SIZE>();
    write::<SIZE>(hart, paddr, op(loaded, operand))?;
    hart.registers.set_x(inst.rd, X::from_signed(sign_extend::<SIZE>(loaded)));
    Ok(StepOutcome::Advance)
}

fn amoswap<X: Xlen, const SIZE: usize>(
    hart: &mut Hart,
    _: StepContext<'_, Hart>,
) -> StepResult<Hart> {
    amo::<X, SIZE, _>(hart, |_, b| b)
}

fn amoadd<X: Xlen, const SIZE: usize>(
    hart: &mut Hart,
    _: StepContext<'_, Hart>,
) -> StepResult<Hart> {
    amo::<X, SIZE, _>(hart, u64::wrapping_add)
}

fn amoxor<X: Xlen, const SIZE: usize>(
    hart: &mut Hart,
    _: StepContext<'_, Hart>,
) -> StepResult<Hart> {
    amo::<X, SIZE, _>(hart, |a, b| a ^ b)
}

fn amoand<X: Xlen, const SIZE: usize>(
    hart: &mut Hart,
    _: StepContext<'_, Hart>,
) -> StepResult<Hart> {
    amo::<X, SIZE, _>(hart, |a, b| a & b)
}

fn amoor<X: Xlen, const SIZE: usize>(
    hart: &mut Hart,
    _: StepContext<'_, Hart>,
) -> StepResult<Hart> {
    amo::<X, SIZE, _>(hart, |a, b| a | b)
}

fn amomin<X: Xlen, const SIZE: usize>(
    hart: &mut Hart,
    _: StepContext<'_, Hart>,
) -> StepResult<Hart> {
    amo::<X, SIZE, _>(hart, |a, b| {
        if sign_extend::<SIZE>(a) <= sign_extend::<SIZE>(b) {
            a
        } else {
            b
        }
    })
}

fn amomax<X: Xlen, const SIZE: usize>(
    hart: &mut Hart,
    _: StepContext<'_, Hart>,
) -> StepResult<Hart> {
    amo::<X, SIZE, _>(hart, |a, b| {
        if sign_extend::<SIZE>(a) >= sign_extend::<SIZE>(b) {
            a
        } else {
            b
        }
    })
}

fn amominu<X: Xlen, const SIZE: usize>(
    hart: &mut Hart,
    _: StepContext<'_, Hart>,
) -> StepResult<Hart> {
    amo::<X, SIZE, _>(hart, u64::min)
}

fn amomaxu<X: Xlen, const SIZE: usize>(
    hart: &mut Hart,
    _: StepContext<'_, Hart>,
) -> StepResult<Hart> {
    amo::<X, SIZE, _>(hart, u64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_extend() {
        assert_eq!(-1, sign_extend::<4>(0xFFFF_FFFF));
        assert_eq!(0x7FFF_FFFF, sign_extend::<4>(0x7FFF_FFFF));
        assert_eq!(-2, sign_extend::<8>(u64::MAX - 1));
    }

    #[test]
    fn test_size_mask() {
        assert_eq!(0xFFFF_FFFF, size_mask::<4>());
        assert_eq!(u64::MAX, size_mask::<8>());
    }
}
