//! Handler tables and per-instruction sequence assembly.

use super::Hart;
use crate::insts;
use crate::instruction::{InstKind, Instruction};
use crate::sequence::{
    SequenceId, Step, StepBody, StepContext, StepOutcome, StepResult, StepSequence, StepTag,
};
use crate::xlen::{Rv32, Rv64, WordWidth, Xlen};
use crate::SimError;
use log::warn;
use std::collections::HashMap;
use std::fmt;

/// Which of the two handler maps an entry belongs to.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum HandlerKind {
    Execute,
    ComputeAddress,
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Execute => "execute",
            Self::ComputeAddress => "compute-address",
        })
    }
}

/// Instruction behavior for one word width, keyed by handler name.
pub struct HandlerTable {
    width: WordWidth,
    execute: HashMap<&'static str, Step<Hart>>,
    compute_address: HashMap<&'static str, Step<Hart>>,
}

impl HandlerTable {
    /// An empty table.
    pub fn empty(width: WordWidth) -> Self {
        Self {
            width,
            execute: HashMap::new(),
            compute_address: HashMap::new(),
        }
    }

    /// The table of every instruction the simulator implements, instantiated for `X`.
    pub fn new<X: Xlen>() -> Self {
        let mut table = Self::empty(X::WIDTH);
        insts::register::<X>(&mut table);
        table
    }

    pub fn for_width(width: WordWidth) -> Self {
        match width {
            WordWidth::W32 => Self::new::<Rv32>(),
            WordWidth::W64 => Self::new::<Rv64>(),
        }
    }

    pub fn width(&self) -> WordWidth {
        self.width
    }

    pub fn insert_execute(&mut self, mnemonic: &'static str, body: StepBody<Hart>) {
        self.execute
            .insert(mnemonic, Step::new(mnemonic, StepTag::Execute, body));
    }

    pub fn insert_compute_address(&mut self, mnemonic: &'static str, body: StepBody<Hart>) {
        self.compute_address
            .insert(mnemonic, Step::new(mnemonic, StepTag::ComputeAddress, body));
    }

    fn lookup(&self, mnemonic: &'static str, kind: HandlerKind) -> Result<Step<Hart>, SimError> {
        let map = match kind {
            HandlerKind::Execute => &self.execute,
            HandlerKind::ComputeAddress => &self.compute_address,
        };
        map.get(mnemonic)
            .copied()
            .ok_or(SimError::MissingHandler {
                mnemonic,
                width: self.width,
                kind,
            })
    }

    /// Checks that every instruction the decoder can produce for this width has its handlers.
    pub fn validate(&self) -> Result<(), SimError> {
        for (mnemonic, kind) in Instruction::mnemonics(self.width) {
            self.lookup(mnemonic, HandlerKind::Execute)?;
            if matches!(kind, InstKind::Load | InstKind::Store) {
                self.lookup(mnemonic, HandlerKind::ComputeAddress)?;
            }
        }
        Ok(())
    }

    /// Builds the sequence implementing `inst`: `[compute_address?, execute]`, continuing at
    /// `finish`.
    pub fn assemble(
        &self,
        inst: &Instruction,
        finish: SequenceId<Hart>,
    ) -> Result<StepSequence<Hart>, SimError> {
        let mut steps = Vec::with_capacity(2);
        if inst.is_unimplemented() {
            steps.push(Step::new(inst.handler(), StepTag::Execute, unimplemented));
        } else {
            if inst.is_memory() {
                steps.push(self.lookup(inst.mnemonic, HandlerKind::ComputeAddress)?);
            }
            steps.push(self.lookup(inst.mnemonic, HandlerKind::Execute)?);
        }
        Ok(StepSequence::with_steps(inst.mnemonic, steps, Some(finish)))
    }
}

/// Stands in for instructions that decode but have no implementation. Has no architectural
/// effect.
fn unimplemented(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    let current = hart.current(StepTag::Execute)?;
    warn!(
        mnemonic = current.inst.mnemonic,
        opcode = current.opcode,
        pc = hart.registers.pc();
        "Unimplemented instruction treated as a no-op"
    );
    Ok(StepOutcome::Advance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::SequenceArena;

    fn finish_id() -> SequenceId<Hart> {
        let mut arena = SequenceArena::new();
        arena.insert(StepSequence::new("finish"))
    }

    #[test]
    fn test_tables_are_complete() {
        assert!(HandlerTable::new::<Rv32>().validate().is_ok());
        assert!(HandlerTable::new::<Rv64>().validate().is_ok());
    }

    #[test]
    fn test_missing_handler() {
        let table = HandlerTable::empty(WordWidth::W32);
        match table.validate() {
            Err(SimError::MissingHandler {
                width,
                kind: HandlerKind::Execute,
                ..
            }) => assert_eq!(WordWidth::W32, width),
            other => panic!("unexpected validation result: {other:?}"),
        }
    }

    #[test]
    fn test_assembly() {
        let table = HandlerTable::new::<Rv64>();
        let finish = finish_id();

        // add x3, x1, x2
        let add = Instruction::decode(0x0020_81B3, WordWidth::W64).unwrap();
        let sequence = table.assemble(&add, finish).unwrap();
        assert_eq!(1, sequence.len());
        assert!(sequence.has_tag(StepTag::Execute));
        assert_eq!(Some(finish), sequence.continuation());

        // ld x5, 16(x10)
        let ld = Instruction::decode(0x0105_3283, WordWidth::W64).unwrap();
        let sequence = table.assemble(&ld, finish).unwrap();
        let tags: Vec<_> = sequence.steps().iter().map(Step::tag).collect();
        assert_eq!(vec![StepTag::ComputeAddress, StepTag::Execute], tags);

        // fadd.s f1, f2, f3
        let fadd = Instruction::decode(0x0031_00D3, WordWidth::W64).unwrap();
        let sequence = table.assemble(&fadd, finish).unwrap();
        assert_eq!(1, sequence.len());
        assert_eq!("unsupported", sequence.steps()[0].name());
    }
}
