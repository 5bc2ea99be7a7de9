//! M extension: integer multiplication and division.

use super::{reg_reg_op, word_reg_op};
use crate::hart::execute::HandlerTable;
use crate::hart::Hart;
use crate::sequence::{StepContext, StepResult};
use crate::xlen::{WordWidth, Xlen};

pub(super) fn register<X: Xlen>(table: &mut HandlerTable) {
    table.insert_execute("mul", mul::<X>);
    table.insert_execute("mulh", mulh::<X>);
    table.insert_execute("mulhsu", mulhsu::<X>);
    table.insert_execute("mulhu", mulhu::<X>);
    table.insert_execute("div", div::<X>);
    table.insert_execute("divu", divu::<X>);
    table.insert_execute("rem", rem::<X>);
    table.insert_execute("remu", remu::<X>);

    if X::WIDTH == WordWidth::W64 {
        table.insert_execute("mulw", mulw::<X>);
        table.insert_execute("divw", divw::<X>);
        table.insert_execute("divuw", divuw::<X>);
        table.insert_execute("remw", remw::<X>);
        table.insert_execute("remuw", remuw::<X>);
    }
}

fn mul<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    reg_reg_op::<X, _>(hart, |s1, s2| s1.wrapping_mul(s2))
}

/// > MULH, MULHU, and MULHSU perform the same multiplication but return the upper XLEN bits of the
/// > full 2×XLEN-bit product, for signed×signed, unsigned×unsigned, and signed rs1×unsigned rs2
/// > multiplication, respectively.
fn mulh<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    reg_reg_op::<X, _>(hart, |s1, s2| {
        let product = X::to_signed(s1) as i128 * X::to_signed(s2) as i128;
        (product >> X::BITS) as u64
    })
}

fn mulhsu<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    reg_reg_op::<X, _>(hart, |s1, s2| {
        let product = X::to_signed(s1) as i128 * s2 as i128;
        (product >> X::BITS) as u64
    })
}

fn mulhu<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    reg_reg_op::<X, _>(hart, |s1, s2| ((s1 as u128 * s2 as u128) >> X::BITS) as u64)
}

/// Signed division, rounding towards zero.
///
/// Division by zero yields all ones, and the overflow case (most negative value divided by -1)
/// yields the dividend.
fn div<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    reg_reg_op::<X, _>(hart, |s1, s2| match X::to_signed(s2) {
        0 => u64::MAX,
        divisor => signed_div::<X>(X::to_signed(s1), divisor) as u64,
    })
}

fn divu<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    reg_reg_op::<X, _>(hart, |s1, s2| s1.checked_div(s2).unwrap_or(u64::MAX))
}

/// Signed remainder; its sign follows the dividend. Remainder by zero yields the dividend.
fn rem<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    reg_reg_op::<X, _>(hart, |s1, s2| match X::to_signed(s2) {
        0 => s1,
        divisor => signed_rem::<X>(X::to_signed(s1), divisor) as u64,
    })
}

fn remu<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    reg_reg_op::<X, _>(hart, |s1, s2| s1.checked_rem(s2).unwrap_or(s1))
}

// For RV32 the operands are sign-extended 32-bit values in an i64, so the overflow case has to be
// caught at 32 bits explicitly.
fn signed_div<X: Xlen>(dividend: i64, divisor: i64) -> i64 {
    match X::WIDTH {
        WordWidth::W32 => (dividend as i32).wrapping_div(divisor as i32) as i64,
        WordWidth::W64 => dividend.wrapping_div(divisor),
    }
}

fn signed_rem<X: Xlen>(dividend: i64, divisor: i64) -> i64 {
    match X::WIDTH {
        WordWidth::W32 => (dividend as i32).wrapping_rem(divisor as i32) as i64,
        WordWidth::W64 => dividend.wrapping_rem(divisor),
    }
}

fn mulw<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    word_reg_op::<X, _>(hart, |s1, s2| s1.wrapping_mul(s2))
}

fn divw<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    word_reg_op::<X, _>(hart, |s1, s2| match s2 {
        0 => u32::MAX,
        _ => (s1 as i32).wrapping_div(s2 as i32) as u32,
    })
}

fn divuw<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    word_reg_op::<X, _>(hart, |s1, s2| s1.checked_div(s2).unwrap_or(u32::MAX))
}

fn remw<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    word_reg_op::<X, _>(hart, |s1, s2| match s2 {
        0 => s1,
        _ => (s1 as i32).wrapping_rem(s2 as i32) as u32,
    })
}

fn remuw<X: Xlen>(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    word_reg_op::<X, _>(hart, |s1, s2| s1.checked_rem(s2).unwrap_or(s1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xlen::{Rv32, Rv64};

    #[test]
    fn test_signed_division_overflow() {
        assert_eq!(i32::MIN as i64, signed_div::<Rv32>(i32::MIN as i64, -1));
        assert_eq!(0, signed_rem::<Rv32>(i32::MIN as i64, -1));
        assert_eq!(i64::MIN, signed_div::<Rv64>(i64::MIN, -1));
        assert_eq!(0, signed_rem::<Rv64>(i64::MIN, -1));
        assert_eq!(-2, signed_div::<Rv64>(-7, 3));
        assert_eq!(-1, signed_rem::<Rv64>(-7, 3));
    }
}
