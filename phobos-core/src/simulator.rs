//! The simulation driver: builds and wires the unit sequences and steps them.

use crate::hart::exception::take_trap;
use crate::hart::fetch::{decode, execute, fetch};
use crate::hart::finish::{check_stop, increment_pc, stop_sim};
use crate::hart::translate::{AccessType, Translate};
use crate::hart::{Config, Exception, Hart, Retired, UnitSequences};
use crate::observer::{self, Observer};
use crate::sequence::{
    Cursor, Exit, SequenceArena, SequenceId, SequenceRef, Step, StepSequence, StepTag,
};
use crate::translation::{HandshakeError, TranslationState};
use crate::SimError;
use log::{debug, trace};

/// Result of a single [`Simulator::tick`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Tick {
    /// An instruction retired, possibly by taking a trap.
    Retired(Retired),
    /// A long-running instruction yielded before completing.
    Suspended,
    /// The simulation has stopped with the given exit code.
    Stopped(i64),
}

/// A single-hart simulator.
///
/// Owns the arena with every unit sequence, the hart the sequences run on, and the resume point
/// of whatever instruction is in flight.
pub struct Simulator {
    arena: SequenceArena<Hart>,
    hart: Hart,
    translate: Translate,
    next: SequenceRef<Hart>,
    cursor: Cursor<Hart>,
}

impl Simulator {
    /// Creates a simulator whose hart sits at the reset vector in M-mode with bare translation.
    ///
    /// Fails if `config` is invalid or the handler table for its width is incomplete.
    pub fn new(config: Config) -> Result<Self, SimError> {
        config.validate()?;
        let width = config.xlen;
        let mut arena = SequenceArena::new();
        let translate = Translate::new(&mut arena, width);

        let unit = |name: &str, steps: Vec<Step<Hart>>| StepSequence::with_steps(name, steps, None);
        let fetch = arena.insert(unit(
            "fetch",
            vec![Step::new("fetch", StepTag::Fetch, fetch)],
        ));
        let decode = arena.insert(unit(
            "decode",
            vec![Step::new("decode", StepTag::Decode, decode)],
        ));
        let execute = arena.insert(unit(
            "execute",
            vec![Step::new("execute", StepTag::Execute, execute)],
        ));
        let exception = arena.insert(unit(
            "exception",
            vec![Step::new("take_trap", StepTag::Exception, take_trap)],
        ));
        let finish = arena.insert(unit(
            "finish",
            vec![
                Step::new("increment_pc", StepTag::Finish, increment_pc),
                Step::new("check_stop", StepTag::Finish, check_stop),
            ],
        ));
        let stop = arena.insert(unit(
            "stop_sim",
            vec![Step::new("stop_sim", StepTag::StopSim, stop_sim)],
        ));

        let wiring = [
            (fetch, translate.inst_sequence()),
            (translate.inst_sequence(), decode),
            (decode, execute),
            (execute, finish),
            (exception, finish),
            (finish, fetch),
        ];
        for (from, to) in wiring {
            arena.get_mut(from)?.set_continuation(Some(to));
        }

        let units = UnitSequences {
            fetch,
            inst_translate: translate.inst_sequence(),
            decode,
            execute,
            load_translate: translate.load_sequence(),
            store_translate: translate.store_sequence(),
            exception,
            finish,
            stop,
        };
        let hart = Hart::new(config, units)?;
        debug!(
            "Created {} simulator with {} unit sequences",
            width,
            arena.len()
        );
        Ok(Self {
            arena,
            hart,
            translate,
            next: fetch.into(),
            cursor: Cursor::new(),
        })
    }

    pub fn hart(&self) -> &Hart {
        &self.hart
    }

    /// Mutable access to the hart, for loading programs and poking state between ticks.
    ///
    /// Changes to `satp`, `mstatus` or the privilege level take effect at the next instruction
    /// boundary only if `sim.mode_change_pending` is set, which [`Hart::write_csr`] does.
    pub fn hart_mut(&mut self) -> &mut Hart {
        &mut self.hart
    }

    pub fn arena(&self) -> &SequenceArena<Hart> {
        &self.arena
    }

    pub fn translate(&self) -> &Translate {
        &self.translate
    }

    pub fn is_stopped(&self) -> bool {
        self.hart.sim.stopped
    }

    /// Copies `bytes` into physical memory at `address`.
    pub fn load_physical(&mut self, address: u64, bytes: &[u8]) -> Result<(), SimError> {
        trace!("Loading {} bytes at {address:#x}", bytes.len());
        Ok(self.hart.memory.write(address, bytes)?)
    }

    /// Registers an observer. The hook steps are spliced into the unit sequences when the first
    /// observer is added.
    pub fn add_observer(&mut self, observer: Box<dyn Observer>) -> Result<(), SimError> {
        if self.hart.observers.is_empty() {
            let units = self.hart.units;
            self.arena
                .get_mut(units.execute)?
                .insert_before(observer::PRE_EXECUTE, StepTag::Execute)?;
            // After increment_pc, before check_stop can divert.
            self.arena
                .get_mut(units.finish)?
                .insert_after(observer::POST_EXECUTE, StepTag::Finish)?;
            self.arena
                .get_mut(units.exception)?
                .insert_before(observer::PRE_EXCEPTION, StepTag::Exception)?;
            self.arena
                .get_mut(units.stop)?
                .insert_after(observer::STOP_SIM, StepTag::StopSim)?;
            trace!("Inserted observer hooks");
        }
        self.hart.observers.push(observer);
        Ok(())
    }

    /// Returns `true` between instructions: the next sequence to run is fetch and nothing is
    /// suspended.
    fn at_boundary(&self) -> bool {
        self.next.id() == Some(self.hart.units.fetch) && !self.cursor.is_suspended()
    }

    /// Swaps the translation steps if the last instruction changed what the MMU should do.
    fn apply_mode_change(&mut self) -> Result<(), SimError> {
        if !self.hart.sim.mode_change_pending {
            return Ok(());
        }
        self.hart.sim.mode_change_pending = false;
        let (inst_mode, data_mode) = self.hart.mmu_modes();
        self.translate
            .change_mmu_mode(&mut self.arena, self.hart.config.xlen, inst_mode, data_mode)
    }

    /// Runs unit sequences until an instruction retires, a long-running instruction yields, or
    /// the simulation stops.
    pub fn tick(&mut self) -> Result<Tick, SimError> {
        if self.hart.sim.stopped {
            return Ok(Tick::Stopped(self.hart.sim.exit_code));
        }
        if self.at_boundary() {
            self.apply_mode_change()?;
        }
        loop {
            let target = self.next.clone();
            let is_stop = self.arena.resolve(&target)?.has_tag(StepTag::StopSim);
            let exit = self.arena.run(&target, &mut self.hart, &mut self.cursor)?;
            if is_stop {
                self.hart.sim.stopped = true;
                return Ok(Tick::Stopped(self.hart.sim.exit_code));
            }
            match exit {
                Exit::Suspended(_) => return Ok(Tick::Suspended),
                // A sequence diverting into itself yields between two rounds of work.
                Exit::Diverted(to) if to.same_as(&target) => return Ok(Tick::Suspended),
                exit => match exit.next() {
                    Some(next) => self.next = next,
                    None => {
                        self.hart.sim.stopped = true;
                        return Ok(Tick::Stopped(self.hart.sim.exit_code));
                    }
                },
            }
            if let Some(retired) = self.hart.sim.retired.take() {
                self.apply_mode_change()?;
                return Ok(Tick::Retired(retired));
            }
        }
    }

    /// Ticks until one instruction retires or the simulation stops.
    pub fn step_instruction(&mut self) -> Result<Tick, SimError> {
        loop {
            match self.tick()? {
                Tick::Suspended => continue,
                tick => return Ok(tick),
            }
        }
    }

    /// Performs at most `Config::quantum` ticks, stopping early if the simulation stops. Returns
    /// the number of instructions retired.
    pub fn run_quantum(&mut self) -> Result<u64, SimError> {
        trace!("Running a quantum of {} ticks", self.hart.config.quantum);
        let mut retired = 0;
        for _ in 0..self.hart.config.quantum {
            match self.tick()? {
                Tick::Retired(_) => retired += 1,
                Tick::Suspended => {}
                Tick::Stopped(_) => break,
            }
        }
        Ok(retired)
    }

    /// Runs until the simulation stops and returns the exit code.
    pub fn run(&mut self) -> Result<i64, SimError> {
        loop {
            if let Tick::Stopped(exit_code) = self.tick()? {
                return Ok(exit_code);
            }
        }
    }

    /// Stops the simulation right away, abandoning any instruction in flight, and returns the
    /// exit code.
    pub fn stop(&mut self) -> Result<i64, SimError> {
        if !self.hart.sim.stopped {
            self.cursor.clear();
            self.next = self.hart.units.stop.into();
            self.tick()?;
        }
        Ok(self.hart.sim.exit_code)
    }

    /// Translates `vaddr` through the live translate sequence for `access`, as the hart would
    /// right now. Must be called between instructions.
    ///
    /// Returns the fault the access would raise instead of raising it.
    pub fn debug_translate(
        &mut self,
        access: AccessType,
        vaddr: u64,
    ) -> Result<Result<u64, Exception>, SimError> {
        let sequence: SequenceId<Hart> = match access {
            AccessType::Instruction => self.translate.inst_sequence(),
            AccessType::Load => self.translate.load_sequence(),
            AccessType::Store => self.translate.store_sequence(),
        };
        queue(&mut self.hart, access).request(vaddr, 1)?;
        match self.arena.run_nested(sequence, &mut self.hart)? {
            Exit::Diverted(_) => {
                queue(&mut self.hart, access).clear();
                match self.hart.pending_trap.take() {
                    Some(trap) => Ok(Err(trap.cause)),
                    None => Err(HandshakeError::NoResult.into()),
                }
            }
            Exit::FellThrough(_) | Exit::Suspended(_) => {
                Ok(Ok(queue(&mut self.hart, access).take_result()?.paddr))
            }
        }
    }
}

fn queue(hart: &mut Hart, access: AccessType) -> &mut TranslationState {
    match access {
        AccessType::Instruction => &mut hart.fetch_translation,
        AccessType::Load | AccessType::Store => &mut hart.data_translation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csr::specifier;
    use crate::registers::Specifier;
    use crate::{PrivilegeLevel, RawPrivilegeLevel, WordWidth};

    const BASE: u64 = 0x8000_0000;

    fn simulator(config: Config, program: &[u32]) -> Simulator {
        let mut sim = Simulator::new(config).unwrap();
        let bytes: Vec<u8> = program.iter().flat_map(|word| word.to_le_bytes()).collect();
        sim.load_physical(BASE, &bytes).unwrap();
        sim
    }

    fn retire(sim: &mut Simulator) -> Retired {
        match sim.step_instruction().unwrap() {
            Tick::Retired(retired) => retired,
            other => panic!("expected a retirement, got {other:?}"),
        }
    }

    fn x(index: u8) -> Specifier {
        Specifier::from_u5(index)
    }

    #[test]
    fn test_invalid_config() {
        let config = Config {
            quantum: 0,
            ..Config::default()
        };
        assert!(matches!(
            Simulator::new(config),
            Err(SimError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_add_falls_through_to_finish() {
        let program = [
            0x0050_0093, // addi x1, x0, 5
            0x0070_0113, // addi x2, x0, 7
            0x0020_81B3, // add x3, x1, x2
        ];
        let mut sim = simulator(Config::default(), &program);
        retire(&mut sim);
        retire(&mut sim);
        let retired = retire(&mut sim);
        assert_eq!(
            Retired {
                pc: BASE + 8,
                opcode: Some(0x0020_81B3),
                mnemonic: Some("add"),
                unimplemented: false,
                exception: None,
                inst_count: 3,
            },
            retired
        );
        assert_eq!(12, sim.hart().registers.x(x(3)));
        assert_eq!(BASE + 12, sim.hart().registers.pc());
        assert_eq!(3, sim.hart().csrs.minstret());
    }

    #[test]
    fn test_rv32_wraps() {
        let config = Config {
            xlen: WordWidth::W32,
            ..Config::default()
        };
        let program = [
            0xFFF0_0093, // addi x1, x0, -1
            0x0010_8113, // addi x2, x1, 1
        ];
        let mut sim = simulator(config, &program);
        retire(&mut sim);
        retire(&mut sim);
        assert_eq!(0xFFFF_FFFF, sim.hart().registers.x(x(1)));
        assert_eq!(0, sim.hart().registers.x(x(2)));
    }

    #[test]
    fn test_trap_round_trip() {
        let mut program = vec![0; 0x44];
        program[0] = 0x0000_0073; // ecall
        program[1] = 0x0050_0093; // addi x1, x0, 5
        program[0x40] = 0x3410_2373; // csrrs x6, mepc, x0
        program[0x41] = 0x0043_0313; // addi x6, x6, 4
        program[0x42] = 0x3413_1073; // csrrw x0, mepc, x6
        program[0x43] = 0x3020_0073; // mret
        let mut sim = simulator(Config::default(), &program);
        let hart = sim.hart_mut();
        hart.csrs.write(specifier::MTVEC, BASE + 0x100).unwrap();
        hart.privilege = PrivilegeLevel::User;

        let retired = retire(&mut sim);
        assert_eq!(Some(Exception::EnvironmentCallFromUMode), retired.exception);
        assert_eq!(Some("ecall"), retired.mnemonic);
        assert_eq!(BASE, retired.pc);
        let hart = sim.hart();
        assert_eq!(PrivilegeLevel::Machine, hart.privilege);
        assert_eq!(BASE + 0x100, hart.registers.pc());
        assert_eq!(8, hart.csrs.mcause());
        assert_eq!(BASE, hart.csrs.mepc());
        assert_eq!(PrivilegeLevel::User, hart.csrs.status.mpp());

        for _ in 0..4 {
            assert_eq!(None, retire(&mut sim).exception);
        }
        assert_eq!(PrivilegeLevel::User, sim.hart().privilege);
        assert_eq!(BASE + 4, sim.hart().registers.pc());
        retire(&mut sim);
        assert_eq!(5, sim.hart().registers.x(x(1)));
        assert_eq!(6, sim.hart().sim.inst_count);
    }

    #[test]
    fn test_illegal_instruction_traps() {
        let mut sim = simulator(Config::default(), &[0xFFFF_FFFF]);
        sim.hart_mut()
            .csrs
            .write(specifier::MTVEC, BASE + 0x100)
            .unwrap();
        let retired = retire(&mut sim);
        assert_eq!(Some(Exception::IllegalInstruction), retired.exception);
        assert_eq!(None, retired.opcode);
        assert_eq!(0xFFFF_FFFF, sim.hart().csrs.mtval());
        assert_eq!(BASE + 0x100, sim.hart().registers.pc());
    }

    #[test]
    fn test_sv39_mode_swap() {
        const ROOT: u64 = 0x8010_0000;
        let mut program = vec![0; 6];
        program[0] = 0x3020_0073; // mret
        program[4] = 0x0050_0093; // addi x1, x0, 5
        program[5] = 0x1800_1073; // csrrw x0, satp, x0
        let mut sim = simulator(Config::default(), &program);
        let hart = sim.hart_mut();
        // 1 GiB superpage: 0x4000_0000 -> 0x8000_0000, V R W X A D.
        hart.memory
            .write_doubleword(ROOT + 8, (BASE >> 12) << 10 | 0xCF)
            .unwrap();
        hart.write_csr(specifier::SATP, 8 << 60 | ROOT >> 12).unwrap();
        hart.csrs.write(specifier::MEPC, 0x4000_0010).unwrap();
        hart.csrs.status.set_mpp(RawPrivilegeLevel::Supervisor);
        assert_eq!(
            Err(Exception::LoadAccessFault),
            sim.debug_translate(AccessType::Load, 0x4000_0123).unwrap()
        );

        retire(&mut sim);
        assert_eq!(PrivilegeLevel::Supervisor, sim.hart().privilege);
        let step_name = |sim: &Simulator, id| sim.arena().get(id).unwrap().steps()[0].name();
        let translate = sim.translate();
        assert_eq!("sv39_inst_translate", step_name(&sim, translate.inst_sequence()));
        assert_eq!("sv39_load_translate", step_name(&sim, translate.load_sequence()));

        let retired = retire(&mut sim);
        assert_eq!(0x4000_0010, retired.pc);
        assert_eq!(5, sim.hart().registers.x(x(1)));
        assert_eq!(
            Ok(BASE + 0x123),
            sim.debug_translate(AccessType::Load, 0x4000_0123).unwrap()
        );
        assert_eq!(
            Err(Exception::LoadPageFault),
            sim.debug_translate(AccessType::Load, 0x1000).unwrap()
        );
        assert_eq!(
            Err(Exception::StoreOrAmoPageFault),
            sim.debug_translate(AccessType::Store, 0x8000).unwrap()
        );

        // Clearing satp goes back to bare translation.
        let retired = retire(&mut sim);
        assert_eq!(Some("csrrw"), retired.mnemonic);
        assert_eq!(None, retired.exception);
        let translate = sim.translate();
        assert_eq!("baremetal_inst_translate", step_name(&sim, translate.inst_sequence()));
        assert_eq!("baremetal_load_translate", step_name(&sim, translate.load_sequence()));
        assert_eq!(
            Err(Exception::LoadAccessFault),
            sim.debug_translate(AccessType::Load, 0x4000_0123).unwrap()
        );
        assert_eq!(
            Ok(BASE + 0x123),
            sim.debug_translate(AccessType::Load, BASE + 0x123).unwrap()
        );
    }

    #[test]
    fn test_vector_add_suspends_and_resumes() {
        let config = Config {
            vector_chunk: 3,
            ..Config::default()
        };
        let program = [
            0xC114_70D7, // vsetivli x1, 8, e32, m2
            0x0223_0257, // vadd.vv v4, v2, v6
        ];
        let mut sim = simulator(config, &program);
        for i in 0..8 {
            let vector = &mut sim.hart_mut().vector;
            assert!(vector.set_element(2, i, 32, i));
            assert!(vector.set_element(6, i, 32, 10 * i));
        }

        retire(&mut sim);
        assert_eq!(8, sim.hart().registers.x(x(1)));
        assert_eq!(Tick::Suspended, sim.tick().unwrap());
        assert_eq!(3, sim.hart().vector.vstart());
        assert_eq!(Tick::Suspended, sim.tick().unwrap());
        assert_eq!(6, sim.hart().vector.vstart());
        match sim.tick().unwrap() {
            Tick::Retired(retired) => assert_eq!(Some("vadd.vv"), retired.mnemonic),
            other => panic!("expected a retirement, got {other:?}"),
        }
        assert_eq!(0, sim.hart().vector.vstart());
        for i in 0..8 {
            assert_eq!(Some(11 * i), sim.hart().vector.element(4, i, 32));
        }
        assert_eq!(BASE + 8, sim.hart().registers.pc());
    }

    #[test]
    fn test_strided_load_across_page() {
        let program = [
            0xC102_7057, // vsetivli x0, 4, e32, m1
            0x0AB5_6087, // vlse32.v v1, (x10), x11
        ];
        let mut sim = simulator(Config::default(), &program);
        let base = BASE + 0xFFE;
        let hart = sim.hart_mut();
        hart.registers.set_x(x(10), base);
        hart.registers.set_x(x(11), 0x100);
        for i in 0..4 {
            hart.memory
                .write_word(base + i * 0x100, 0x1122_3344 + i as u32)
                .unwrap();
        }

        retire(&mut sim);
        assert_eq!(4, sim.hart().vector.vl());
        let retired = retire(&mut sim);
        assert_eq!(None, retired.exception);
        for i in 0..4 {
            assert_eq!(Some(0x1122_3344 + i), sim.hart().vector.element(1, i, 32));
        }
    }

    #[test]
    fn test_indexed_gather_and_scatter() {
        let config = Config {
            vector_chunk: 3,
            ..Config::default()
        };
        let program = [
            0xC102_7057, // vsetivli x0, 4, e32, m1
            0x0625_6087, // vluxei32.v v1, (x10), v2
            0x0625_60A7, // vsuxei32.v v1, (x10), v2
        ];
        let mut sim = simulator(config, &program);
        let source = BASE + 0x1000;
        let destination = BASE + 0x2000;
        let hart = sim.hart_mut();
        hart.registers.set_x(x(10), source);
        for (i, offset) in [12, 0, 8, 4].into_iter().enumerate() {
            assert!(hart.vector.set_element(2, i as u64, 32, offset));
        }
        for k in 0..4 {
            hart.memory.write_word(source + 4 * k, 0xA0 + k as u32).unwrap();
        }

        retire(&mut sim);
        let retired = retire(&mut sim);
        assert_eq!(Some("vluxei32.v"), retired.mnemonic);
        assert_eq!(None, retired.exception);
        for (i, expected) in [0xA3, 0xA0, 0xA2, 0xA1].into_iter().enumerate() {
            assert_eq!(Some(expected), sim.hart().vector.element(1, i as u64, 32));
        }
        assert_eq!(0, sim.hart().vector.vstart());

        sim.hart_mut().registers.set_x(x(10), destination);
        let retired = retire(&mut sim);
        assert_eq!(Some("vsuxei32.v"), retired.mnemonic);
        assert_eq!(None, retired.exception);
        for k in 0..4 {
            assert_eq!(
                0xA0 + k as u32,
                sim.hart().memory.read_word(destination + 4 * k).unwrap()
            );
        }
    }

    #[test]
    fn test_masked_load_into_mask_register_traps() {
        let program = [
            0xC102_7057, // vsetivli x0, 4, e32, m1
            0x0005_6007, // vle32.v v0, (x10), v0.t
        ];
        let mut sim = simulator(Config::default(), &program);
        let hart = sim.hart_mut();
        hart.csrs.write(specifier::MTVEC, BASE + 0x100).unwrap();
        hart.registers.set_x(x(10), BASE + 0x1000);
        assert!(hart.vector.set_element(0, 0, 32, 0b1111));
        hart.memory.write_word(BASE + 0x1000, 0x1234_5678).unwrap();

        retire(&mut sim);
        let retired = retire(&mut sim);
        assert_eq!(Some(Exception::IllegalInstruction), retired.exception);
        assert_eq!(0x0005_6007, sim.hart().csrs.mtval());
        assert_eq!(Some(0b1111), sim.hart().vector.element(0, 0, 32));
    }

    #[test]
    fn test_unimplemented_instruction_retires() {
        let program = [
            0x0005_2087, // flw f1, 0(x10)
        ];
        let mut sim = simulator(Config::default(), &program);
        sim.hart_mut().registers.set_x(x(10), BASE + 0x1000);
        let before: Vec<u64> = (0..32).map(|i| sim.hart().registers.x(x(i))).collect();

        let retired = retire(&mut sim);
        assert_eq!(
            Retired {
                pc: BASE,
                opcode: Some(0x0005_2087),
                mnemonic: Some("fp-load"),
                unimplemented: true,
                exception: None,
                inst_count: 1,
            },
            retired
        );
        assert_eq!(BASE + 4, sim.hart().registers.pc());
        let after: Vec<u64> = (0..32).map(|i| sim.hart().registers.x(x(i))).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_atomic_memory_operations() {
        let program = [
            0x0025_20AF, // amoadd.w x1, x2, (x10)
            0x0825_222F, // amoswap.w x4, x2, (x10)
            0x8025_22AF, // amomin.w x5, x2, (x10)
        ];
        let mut sim = simulator(Config::default(), &program);
        let address = BASE + 0x1000;
        let hart = sim.hart_mut();
        hart.registers.set_x(x(10), address);
        hart.registers.set_x(x(2), 7);
        hart.memory.write_word(address, -5_i32 as u32).unwrap();

        retire(&mut sim);
        assert_eq!(-5_i64 as u64, sim.hart().registers.x(x(1)));
        assert_eq!(2, sim.hart().memory.read_word(address).unwrap());

        retire(&mut sim);
        assert_eq!(2, sim.hart().registers.x(x(4)));
        assert_eq!(7, sim.hart().memory.read_word(address).unwrap());

        // The minimum is signed: -3 wins over 7.
        sim.hart_mut().registers.set_x(x(2), -3_i64 as u64);
        retire(&mut sim);
        assert_eq!(7, sim.hart().registers.x(x(5)));
        assert_eq!(-3_i32 as u32, sim.hart().memory.read_word(address).unwrap());
    }

    #[test]
    fn test_load_reserved_store_conditional() {
        let program = [
            0x1005_22AF, // lr.w x5, (x10)
            0x1875_232F, // sc.w x6, x7, (x10)
            0x1875_232F, // sc.w x6, x7, (x10)
        ];
        let mut sim = simulator(Config::default(), &program);
        let address = BASE + 0x1000;
        let hart = sim.hart_mut();
        hart.registers.set_x(x(10), address);
        hart.registers.set_x(x(7), 42);
        hart.memory.write_word(address, 0x8000_0001).unwrap();

        retire(&mut sim);
        assert_eq!(0xFFFF_FFFF_8000_0001, sim.hart().registers.x(x(5)));
        assert_eq!(Some(address), sim.hart().reservation);

        retire(&mut sim);
        assert_eq!(0, sim.hart().registers.x(x(6)));
        assert_eq!(42, sim.hart().memory.read_word(address).unwrap());
        assert_eq!(None, sim.hart().reservation);

        // The first store consumed the reservation.
        sim.hart_mut().registers.set_x(x(7), 99);
        retire(&mut sim);
        assert_eq!(1, sim.hart().registers.x(x(6)));
        assert_eq!(42, sim.hart().memory.read_word(address).unwrap());
    }

    #[test]
    fn test_misaligned_atomic_traps() {
        let program = [
            0x0025_20AF, // amoadd.w x1, x2, (x10)
        ];
        let mut sim = simulator(Config::default(), &program);
        let hart = sim.hart_mut();
        hart.csrs.write(specifier::MTVEC, BASE + 0x100).unwrap();
        hart.registers.set_x(x(10), BASE + 0x1002);

        let retired = retire(&mut sim);
        assert_eq!(Some(Exception::StoreOrAmoAddressMisaligned), retired.exception);
        assert_eq!(BASE + 0x1002, sim.hart().csrs.mtval());
        assert_eq!(0, sim.hart().registers.x(x(1)));
    }

    #[test]
    fn test_instruction_limit() {
        let config = Config {
            ilimit: Some(2),
            ..Config::default()
        };
        let program = [0x0050_0093, 0x0070_0113, 0x0020_81B3];
        let mut sim = simulator(config, &program);
        assert_eq!(0, sim.run().unwrap());
        assert_eq!(2, sim.hart().sim.inst_count);
        assert_eq!(0, sim.hart().registers.x(x(3)));
        assert!(sim.is_stopped());
        assert_eq!(Tick::Stopped(0), sim.tick().unwrap());
    }

    #[test]
    fn test_tohost_stop() {
        let config = Config {
            tohost: Some(BASE + 0x1000),
            ..Config::default()
        };
        let program = [
            0x0000_1297, // auipc x5, 1
            0x0070_0313, // addi x6, x0, 7
            0x0062_A023, // sw x6, 0(x5)
            0x0050_0093, // addi x1, x0, 5
        ];
        let mut sim = simulator(config, &program);
        assert_eq!(3, sim.run().unwrap());
        assert_eq!(3, sim.hart().sim.inst_count);
        assert_eq!(0, sim.hart().registers.x(x(1)));
    }

    #[test]
    fn test_run_quantum() {
        let config = Config {
            quantum: 2,
            ..Config::default()
        };
        let program = [0x0050_0093, 0x0070_0113, 0x0020_81B3];
        let mut sim = simulator(config, &program);
        assert_eq!(2, sim.run_quantum().unwrap());
        assert_eq!(BASE + 8, sim.hart().registers.pc());
    }

    #[derive(Default)]
    struct Recorder(std::rc::Rc<std::cell::RefCell<Vec<String>>>);

    impl Observer for Recorder {
        fn pre_execute(&mut self, hart: &Hart) {
            self.0
                .borrow_mut()
                .push(format!("pre {:#x}", hart.registers.pc()));
        }

        fn post_execute(&mut self, _hart: &Hart, retired: &Retired) {
            self.0
                .borrow_mut()
                .push(format!("post {}", retired.mnemonic.unwrap_or("-")));
        }

        fn pre_exception(&mut self, _hart: &Hart) {
            self.0.borrow_mut().push("exception".to_owned());
        }

        fn stop_sim(&mut self, hart: &Hart) {
            self.0
                .borrow_mut()
                .push(format!("stop {}", hart.sim.exit_code));
        }
    }

    #[test]
    fn test_observer_hooks() {
        let config = Config {
            ilimit: Some(2),
            ..Config::default()
        };
        let program = [0x0050_0093, 0x0000_0073];
        let mut sim = simulator(config, &program);
        let events = std::rc::Rc::default();
        sim.add_observer(Box::new(Recorder(std::rc::Rc::clone(&events))))
            .unwrap();
        sim.add_observer(Box::new(crate::observer::InstructionLogger))
            .unwrap();
        assert_eq!(2, sim.arena().get(sim.hart().units().execute).unwrap().len());
        assert_eq!(0, sim.run().unwrap());
        assert_eq!(
            vec![
                "pre 0x80000000",
                "post addi",
                "pre 0x80000004",
                "exception",
                "post ecall",
                "stop 0",
            ],
            *events.borrow()
        );
    }
}
