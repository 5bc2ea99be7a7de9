//! The translation unit.
//!
//! Instruction fetch, loads and stores each own a live translate sequence holding a single step
//! tagged [`StepTag::InstTranslate`] or [`StepTag::DataTranslate`]. Which step sits there depends
//! on the word width and the active [`MmuMode`], and is swapped by
//! [`Translate::change_mmu_mode`] between instructions. Requesters only ever see the
//! [`TranslationState`] handshake.

use super::pte::{self, Baremetal, PagingScheme, Sv32, Sv39};
use super::{Exception, Hart};
use crate::sequence::{
    SequenceArena, SequenceId, Step, StepContext, StepOutcome, StepResult, StepSequence, StepTag,
};
use crate::translation::{bytes_before_boundary, TranslationState};
use crate::unit::PAGE;
use crate::xlen::WordWidth;
use crate::{PrivilegeLevel, SimError};
use log::{debug, warn};
use std::collections::HashMap;
use std::fmt;

/// Address translation mode, as selected by `satp.MODE`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MmuMode {
    Baremetal,
    Sv32,
    Sv39,
    Sv48,
    Sv57,
}

impl fmt::Display for MmuMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Baremetal => "baremetal",
            Self::Sv32 => "sv32",
            Self::Sv39 => "sv39",
            Self::Sv48 => "sv48",
            Self::Sv57 => "sv57",
        })
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum AccessType {
    Instruction,
    Load,
    Store,
}

impl AccessType {
    pub fn page_fault(self) -> Exception {
        match self {
            Self::Instruction => Exception::InstructionPageFault,
            Self::Load => Exception::LoadPageFault,
            Self::Store => Exception::StoreOrAmoPageFault,
        }
    }

    pub fn access_fault(self) -> Exception {
        match self {
            Self::Instruction => Exception::InstructionAccessFault,
            Self::Load => Exception::LoadAccessFault,
            Self::Store => Exception::StoreOrAmoAccessFault,
        }
    }

    pub fn misaligned(self) -> Exception {
        match self {
            Self::Instruction => Exception::InstructionAddressMisaligned,
            Self::Load => Exception::LoadAddressMisaligned,
            Self::Store => Exception::StoreOrAmoAddressMisaligned,
        }
    }
}

/// Who is asking for a translation: selects the handshake queue and the privilege level the
/// access is checked against.
pub trait Access: 'static {
    const TYPE: AccessType;

    fn queue(hart: &mut Hart) -> &mut TranslationState;

    fn privilege(hart: &Hart) -> PrivilegeLevel;
}

pub struct FetchAccess;

pub struct LoadAccess;

pub struct StoreAccess;

impl Access for FetchAccess {
    const TYPE: AccessType = AccessType::Instruction;

    fn queue(hart: &mut Hart) -> &mut TranslationState {
        &mut hart.fetch_translation
    }

    fn privilege(hart: &Hart) -> PrivilegeLevel {
        hart.privilege
    }
}

impl Access for LoadAccess {
    const TYPE: AccessType = AccessType::Load;

    fn queue(hart: &mut Hart) -> &mut TranslationState {
        &mut hart.data_translation
    }

    fn privilege(hart: &Hart) -> PrivilegeLevel {
        hart.effective_data_privilege()
    }
}

impl Access for StoreAccess {
    const TYPE: AccessType = AccessType::Store;

    fn queue(hart: &mut Hart) -> &mut TranslationState {
        &mut hart.data_translation
    }

    fn privilege(hart: &Hart) -> PrivilegeLevel {
        hart.effective_data_privilege()
    }
}

/// Translates the oldest pending request of `A`'s queue under paging scheme `P`.
///
/// A request crossing a page boundary is split first, and only its first part is translated. The
/// step repeats while requests remain, so one invocation translates exactly one page-sized piece.
fn translate<P: PagingScheme, A: Access>(
    hart: &mut Hart,
    _: StepContext<'_, Hart>,
) -> StepResult<Hart> {
    let request = *A::queue(hart).peek_request()?;
    let mut size = request.size;
    if P::LEVELS > 0 {
        if let Some(first) = bytes_before_boundary(request.vaddr, size, PAGE) {
            A::queue(hart).split_front(first)?;
            size = first;
        }
    }

    let privilege = A::privilege(hart);
    let paddr = match pte::walk::<P>(hart, request.vaddr, A::TYPE, privilege) {
        Ok(paddr) => paddr,
        Err(cause) => return hart.raise(cause, request.vaddr),
    };
    if !hart.memory.contains(paddr, size) {
        return hart.raise(A::TYPE.access_fault(), request.vaddr);
    }
    debug!(
        "Translated {:?} {:#x} -> {paddr:#x} ({size} bytes) using {}",
        A::TYPE,
        request.vaddr,
        P::MODE
    );
    let queue = A::queue(hart);
    queue.supply_result(paddr, size)?;
    Ok(if queue.has_request() {
        StepOutcome::Repeat
    } else {
        StepOutcome::Advance
    })
}

/// The translation steps of one `(width, mode)` combination.
#[derive(Debug, Copy, Clone)]
pub struct ModeEntry {
    pub inst: Step<Hart>,
    pub load: Step<Hart>,
    pub store: Step<Hart>,
}

impl ModeEntry {
    fn new<P: PagingScheme>() -> Self {
        let [inst, load, store] = P::STEP_NAMES;
        Self {
            inst: Step::new(inst, StepTag::InstTranslate, translate::<P, FetchAccess>),
            load: Step::new(load, StepTag::DataTranslate, translate::<P, LoadAccess>),
            store: Step::new(store, StepTag::DataTranslate, translate::<P, StoreAccess>),
        }
    }
}

/// Maps every supported `(width, mode)` combination onto its translation steps.
#[derive(Debug)]
pub struct ModeTable {
    entries: HashMap<(WordWidth, MmuMode), ModeEntry>,
}

impl Default for ModeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeTable {
    pub fn new() -> Self {
        let entries = HashMap::from([
            ((WordWidth::W32, MmuMode::Baremetal), ModeEntry::new::<Baremetal>()),
            ((WordWidth::W32, MmuMode::Sv32), ModeEntry::new::<Sv32>()),
            ((WordWidth::W64, MmuMode::Baremetal), ModeEntry::new::<Baremetal>()),
            ((WordWidth::W64, MmuMode::Sv39), ModeEntry::new::<Sv39>()),
        ]);
        Self { entries }
    }

    /// Returns the entry for `(width, mode)`, falling back on baremetal translation for
    /// combinations that have no entry.
    pub fn lookup(&self, width: WordWidth, mode: MmuMode) -> ModeEntry {
        if let Some(entry) = self.entries.get(&(width, mode)) {
            return *entry;
        }
        warn!("No translation for {mode} on {width}, falling back to baremetal");
        ModeEntry::new::<Baremetal>()
    }
}

/// Owner of the instruction, load and store translate sequences.
#[derive(Debug)]
pub struct Translate {
    table: ModeTable,
    inst_sequence: SequenceId<Hart>,
    load_sequence: SequenceId<Hart>,
    store_sequence: SequenceId<Hart>,
    inst_mode: MmuMode,
    data_mode: MmuMode,
}

impl Translate {
    /// Creates the three translate sequences in baremetal mode. Their continuations are left for
    /// the caller to wire.
    pub fn new(arena: &mut SequenceArena<Hart>, width: WordWidth) -> Self {
        let table = ModeTable::new();
        let entry = table.lookup(width, MmuMode::Baremetal);
        Self {
            inst_sequence: arena.insert(StepSequence::with_steps(
                "inst_translate",
                [entry.inst],
                None,
            )),
            load_sequence: arena.insert(StepSequence::with_steps(
                "load_translate",
                [entry.load],
                None,
            )),
            store_sequence: arena.insert(StepSequence::with_steps(
                "store_translate",
                [entry.store],
                None,
            )),
            table,
            inst_mode: MmuMode::Baremetal,
            data_mode: MmuMode::Baremetal,
        }
    }

    pub fn inst_sequence(&self) -> SequenceId<Hart> {
        self.inst_sequence
    }

    pub fn load_sequence(&self) -> SequenceId<Hart> {
        self.load_sequence
    }

    pub fn store_sequence(&self) -> SequenceId<Hart> {
        self.store_sequence
    }

    pub fn modes(&self) -> (MmuMode, MmuMode) {
        (self.inst_mode, self.data_mode)
    }

    /// Swaps the translation steps of the live sequences to match the given modes.
    pub fn change_mmu_mode(
        &mut self,
        arena: &mut SequenceArena<Hart>,
        width: WordWidth,
        inst_mode: MmuMode,
        data_mode: MmuMode,
    ) -> Result<(), SimError> {
        if (inst_mode, data_mode) == (self.inst_mode, self.data_mode) {
            return Ok(());
        }
        let inst = self.table.lookup(width, inst_mode).inst;
        let data = self.table.lookup(width, data_mode);
        arena
            .get_mut(self.inst_sequence)?
            .replace(StepTag::InstTranslate, inst)?;
        arena
            .get_mut(self.load_sequence)?
            .replace(StepTag::DataTranslate, data.load)?;
        arena
            .get_mut(self.store_sequence)?
            .replace(StepTag::DataTranslate, data.store)?;
        debug!(
            "MMU mode changed from {}/{} to {inst_mode}/{data_mode}",
            self.inst_mode, self.data_mode
        );
        self.inst_mode = inst_mode;
        self.data_mode = data_mode;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_table_is_total() {
        let table = ModeTable::new();
        assert_eq!(
            "sv39_load_translate",
            table.lookup(WordWidth::W64, MmuMode::Sv39).load.name()
        );
        assert_eq!(
            "sv32_inst_translate",
            table.lookup(WordWidth::W32, MmuMode::Sv32).inst.name()
        );
        // Missing combinations fall back on baremetal.
        let entry = table.lookup(WordWidth::W32, MmuMode::Sv39);
        assert_eq!("baremetal_store_translate", entry.store.name());
        assert_eq!(StepTag::DataTranslate, entry.store.tag());
        assert_eq!(StepTag::InstTranslate, entry.inst.tag());
    }

    #[test]
    fn test_change_mmu_mode_swaps_steps() {
        let mut arena = SequenceArena::new();
        let mut translate = Translate::new(&mut arena, WordWidth::W64);
        let name = |arena: &SequenceArena<Hart>, id: SequenceId<Hart>| {
            arena.get(id).unwrap().steps()[0].name()
        };
        assert_eq!("baremetal_inst_translate", name(&arena, translate.inst_sequence()));

        translate
            .change_mmu_mode(&mut arena, WordWidth::W64, MmuMode::Sv39, MmuMode::Baremetal)
            .unwrap();
        assert_eq!("sv39_inst_translate", name(&arena, translate.inst_sequence()));
        assert_eq!("baremetal_load_translate", name(&arena, translate.load_sequence()));
        assert_eq!(1, arena.get(translate.inst_sequence()).unwrap().len());

        translate
            .change_mmu_mode(&mut arena, WordWidth::W64, MmuMode::Baremetal, MmuMode::Sv39)
            .unwrap();
        assert_eq!("baremetal_inst_translate", name(&arena, translate.inst_sequence()));
        assert_eq!("sv39_load_translate", name(&arena, translate.load_sequence()));
        assert_eq!("sv39_store_translate", name(&arena, translate.store_sequence()));
        assert_eq!((MmuMode::Baremetal, MmuMode::Sv39), translate.modes());
    }
}
