//! Instruction fetch and decode.

use super::execute::HandlerTable;
use super::{Fault, Hart};
use crate::instruction::Instruction;
use crate::sequence::{
    SequenceId, SequenceRef, StepContext, StepOutcome, StepResult, StepSequence, StepTag,
};
use crate::xlen::WordWidth;
use crate::SimError;
use log::trace;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// A decoded static instruction together with the sequence that implements it.
pub struct DecodedInst {
    pub opcode: u32,
    pub inst: Instruction,
    pub sequence: Rc<StepSequence<Hart>>,
}

impl DecodedInst {
    pub fn is_unimplemented(&self) -> bool {
        self.inst.is_unimplemented()
    }
}

impl fmt::Debug for DecodedInst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedInst")
            .field("opcode", &format_args!("{:#010x}", self.opcode))
            .field("inst", &self.inst)
            .field("sequence", &self.sequence.name())
            .finish()
    }
}

/// Decoded-instruction cache.
///
/// Records are cached by opcode. Sequences are assembled once per mnemonic, so every opcode with
/// the same mnemonic shares the same sequence.
pub struct Decoder {
    width: WordWidth,
    handlers: HandlerTable,
    finish: SequenceId<Hart>,
    by_opcode: HashMap<u32, Rc<DecodedInst>>,
    by_mnemonic: HashMap<&'static str, Rc<StepSequence<Hart>>>,
}

impl Decoder {
    /// Creates a decoder for `width` whose sequences continue at `finish`.
    ///
    /// Fails if any instruction the decoder can produce lacks a handler.
    pub fn new(width: WordWidth, finish: SequenceId<Hart>) -> Result<Self, SimError> {
        let handlers = HandlerTable::for_width(width);
        handlers.validate()?;
        Ok(Self {
            width,
            handlers,
            finish,
            by_opcode: HashMap::new(),
            by_mnemonic: HashMap::new(),
        })
    }

    pub fn decode(&mut self, opcode: u32) -> Result<Rc<DecodedInst>, Fault> {
        if let Some(decoded) = self.by_opcode.get(&opcode) {
            return Ok(Rc::clone(decoded));
        }
        let inst = Instruction::decode(opcode, self.width)
            .map_err(|_| Fault::illegal_instruction(opcode))?;
        let sequence = match self.by_mnemonic.get(inst.mnemonic) {
            Some(sequence) => Rc::clone(sequence),
            None => {
                trace!("Assembling sequence for {}", inst.mnemonic);
                let sequence = Rc::new(self.handlers.assemble(&inst, self.finish)?);
                self.by_mnemonic.insert(inst.mnemonic, Rc::clone(&sequence));
                sequence
            }
        };
        let decoded = Rc::new(DecodedInst {
            opcode,
            inst,
            sequence,
        });
        self.by_opcode.insert(opcode, Rc::clone(&decoded));
        Ok(decoded)
    }
}

/// Requests the translation of the current PC.
pub fn fetch(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    let pc = hart.registers.pc();
    hart.fetch_translation.request(pc, 4)?;
    Ok(StepOutcome::Advance)
}

/// Reads the translated opcode and makes its decoded record current.
pub fn decode(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    let result = hart.fetch_translation.take_result()?;
    let opcode = hart.memory.read_word(result.paddr)?;
    let pc = hart.registers.pc();
    hart.registers.set_next_pc(hart.config.xlen.truncate(pc.wrapping_add(4)));
    match hart.decoder.decode(opcode) {
        Ok(decoded) => {
            hart.current = Some(decoded);
            Ok(StepOutcome::Advance)
        }
        Err(Fault::Exception { cause, tval }) => hart.raise(cause, tval),
        Err(Fault::Fatal(error)) => Err(error),
    }
}

/// Diverts into the sequence of the current instruction.
pub fn execute(hart: &mut Hart, _: StepContext<'_, Hart>) -> StepResult<Hart> {
    let current = hart.current(StepTag::Execute)?;
    Ok(StepOutcome::Divert(SequenceRef::Shared(Rc::clone(
        &current.sequence,
    ))))
}
