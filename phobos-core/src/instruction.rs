use crate::registers::Specifier;
use crate::xlen::WordWidth;
use thiserror::Error;

/// Handler name shared by every instruction the simulator decodes but cannot execute.
pub const UNSUPPORTED: &str = "unsupported";

/// How an instruction interacts with memory, which decides how its sequence is assembled.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum InstKind {
    /// No data memory access.
    Compute,
    /// Reads data memory; needs an address-computation step.
    Load,
    /// Writes data memory; needs an address-computation step.
    Store,
    /// Recognized encoding without an implementation (floating point, atomics, ...).
    Unsupported,
}

/// A decoded instruction: its mnemonic plus the raw operand fields.
///
/// Operands are kept in their encoded positions, so the meaning of `rd`, `rs1` and `rs2` depends on
/// the instruction (e.g. `rs2` holds the stride register for strided vector accesses, and `rs1`
/// holds the 5-bit immediate of the `csrr*i` instructions).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Instruction {
    pub mnemonic: &'static str,
    pub kind: InstKind,
    pub raw: u32,
    pub rd: Specifier,
    pub rs1: Specifier,
    pub rs2: Specifier,
    /// Sign-extended immediate, shift amount, CSR specifier or `vtype` immediate depending on the
    /// format.
    pub imm: i64,
}

impl Instruction {
    /// Name of the handler implementing this instruction.
    pub fn handler(&self) -> &'static str {
        match self.kind {
            InstKind::Unsupported => UNSUPPORTED,
            _ => self.mnemonic,
        }
    }

    pub fn is_memory(&self) -> bool {
        matches!(self.kind, InstKind::Load | InstKind::Store)
    }

    pub fn is_unimplemented(&self) -> bool {
        self.kind == InstKind::Unsupported
    }

    /// CSR specifier of the Zicsr instructions.
    pub fn csr(&self) -> u16 {
        (self.raw >> 20) as u16
    }

    /// The vector `vm` bit: `true` means unmasked.
    pub fn vm(&self) -> bool {
        (self.raw >> 25) & 1 == 1
    }

    /// Element width in bits of a vector load or store, taken from the `width` field. For the
    /// indexed accesses this is the width of the index elements.
    pub fn vector_eew(&self) -> u32 {
        match funct3(self.raw) {
            0b000 => 8,
            0b101 => 16,
            0b110 => 32,
            _ => 64,
        }
    }

    pub fn decode(raw_instruction: u32, width: WordWidth) -> Result<Self, DecodeError> {
        let rv64 = width == WordWidth::W64;
        let raw = raw_instruction;
        let (mnemonic, kind, imm) = match opcode(raw).ok_or(DecodeError::UnsupportedOpcode)? {
            Opcode::Load => {
                let mnemonic = match funct3(raw) {
                    0b000 => "lb",
                    0b001 => "lh",
                    0b010 => "lw",
                    0b011 if rv64 => "ld",
                    0b100 => "lbu",
                    0b101 => "lhu",
                    0b110 if rv64 => "lwu",
                    _ => return Err(DecodeError::IllegalInstruction),
                };
                (mnemonic, InstKind::Load, i_imm(raw))
            }
            Opcode::LoadFp => vector_memory(raw, InstKind::Load)?,
            Opcode::MiscMem => match funct3(raw) {
                // All unused fields of FENCE are reserved and must be treated as a normal fence.
                0b000 => ("fence", InstKind::Compute, 0),
                0b001 => ("fence.i", InstKind::Compute, 0),
                _ => return Err(DecodeError::IllegalInstruction),
            },
            Opcode::OpImm => match funct3(raw) {
                0b000 => ("addi", InstKind::Compute, i_imm(raw)),
                0b010 => ("slti", InstKind::Compute, i_imm(raw)),
                0b011 => ("sltiu", InstKind::Compute, i_imm(raw)),
                0b100 => ("xori", InstKind::Compute, i_imm(raw)),
                0b110 => ("ori", InstKind::Compute, i_imm(raw)),
                0b111 => ("andi", InstKind::Compute, i_imm(raw)),
                funct3 => {
                    let mnemonic = shift_imm(raw, funct3, rv64, ["slli", "srli", "srai"])?;
                    (mnemonic, InstKind::Compute, shamt(raw, rv64))
                }
            },
            Opcode::Auipc => ("auipc", InstKind::Compute, u_imm(raw)),
            Opcode::OpImm32 if rv64 => match funct3(raw) {
                0b000 => ("addiw", InstKind::Compute, i_imm(raw)),
                funct3 => {
                    let mnemonic = shift_imm(raw, funct3, false, ["slliw", "srliw", "sraiw"])?;
                    (mnemonic, InstKind::Compute, shamt(raw, false))
                }
            },
            Opcode::Store => {
                let mnemonic = match funct3(raw) {
                    0b000 => "sb",
                    0b001 => "sh",
                    0b010 => "sw",
                    0b011 if rv64 => "sd",
                    _ => return Err(DecodeError::IllegalInstruction),
                };
                (mnemonic, InstKind::Store, s_imm(raw))
            }
            Opcode::StoreFp => vector_memory(raw, InstKind::Store)?,
            Opcode::Amo => atomic(raw, rv64)?,
            Opcode::Op => {
                let mnemonic = match (funct7(raw), funct3(raw)) {
                    (0b0000000, 0b000) => "add",
                    (0b0000000, 0b001) => "sll",
                    (0b0000000, 0b010) => "slt",
                    (0b0000000, 0b011) => "sltu",
                    (0b0000000, 0b100) => "xor",
                    (0b0000000, 0b101) => "srl",
                    (0b0000000, 0b110) => "or",
                    (0b0000000, 0b111) => "and",
                    (0b0100000, 0b000) => "sub",
                    (0b0100000, 0b101) => "sra",
                    (0b0000001, 0b000) => "mul",
                    (0b0000001, 0b001) => "mulh",
                    (0b0000001, 0b010) => "mulhsu",
                    (0b0000001, 0b011) => "mulhu",
                    (0b0000001, 0b100) => "div",
                    (0b0000001, 0b101) => "divu",
                    (0b0000001, 0b110) => "rem",
                    (0b0000001, 0b111) => "remu",
                    _ => return Err(DecodeError::IllegalInstruction),
                };
                (mnemonic, InstKind::Compute, 0)
            }
            Opcode::Lui => ("lui", InstKind::Compute, u_imm(raw)),
            Opcode::Op32 if rv64 => {
                let mnemonic = match (funct7(raw), funct3(raw)) {
                    (0b0000000, 0b000) => "addw",
                    (0b0000000, 0b001) => "sllw",
                    (0b0000000, 0b101) => "srlw",
                    (0b0100000, 0b000) => "subw",
                    (0b0100000, 0b101) => "sraw",
                    (0b0000001, 0b000) => "mulw",
                    (0b0000001, 0b100) => "divw",
                    (0b0000001, 0b101) => "divuw",
                    (0b0000001, 0b110) => "remw",
                    (0b0000001, 0b111) => "remuw",
                    _ => return Err(DecodeError::IllegalInstruction),
                };
                (mnemonic, InstKind::Compute, 0)
            }
            Opcode::OpImm32 | Opcode::Op32 => return Err(DecodeError::IllegalInstruction),
            Opcode::FusedMultiplyAdd => ("fmadd", InstKind::Unsupported, 0),
            Opcode::OpFp => ("op-fp", InstKind::Unsupported, 0),
            Opcode::OpV => vector_arithmetic(raw)?,
            Opcode::Branch => {
                let mnemonic = match funct3(raw) {
                    0b000 => "beq",
                    0b001 => "bne",
                    0b100 => "blt",
                    0b101 => "bge",
                    0b110 => "bltu",
                    0b111 => "bgeu",
                    _ => return Err(DecodeError::IllegalInstruction),
                };
                (mnemonic, InstKind::Compute, b_imm(raw))
            }
            Opcode::Jalr => match funct3(raw) {
                0b000 => ("jalr", InstKind::Compute, i_imm(raw)),
                _ => return Err(DecodeError::IllegalInstruction),
            },
            Opcode::Jal => ("jal", InstKind::Compute, j_imm(raw)),
            Opcode::System => system(raw)?,
        };
        Ok(Self {
            mnemonic,
            kind,
            raw,
            rd: rd(raw),
            rs1: rs1(raw),
            rs2: rs2(raw),
            imm,
        })
    }

    /// Every mnemonic the decoder can produce for `width` that must be backed by a handler,
    /// together with its kind.
    pub fn mnemonics(width: WordWidth) -> impl Iterator<Item = (&'static str, InstKind)> {
        let rv64: &[_] = match width {
            WordWidth::W32 => &[],
            WordWidth::W64 => RV64_MNEMONICS,
        };
        BASE_MNEMONICS.iter().chain(rv64).copied()
    }
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum DecodeError {
    #[error("instruction has unsupported opcode")]
    UnsupportedOpcode,
    #[error("illegal instruction")]
    IllegalInstruction,
}

use InstKind::{Compute as C, Load as L, Store as S};

#[rustfmt::skip]
const BASE_MNEMONICS: &[(&str, InstKind)] = &[
    ("lui", C), ("auipc", C), ("jal", C), ("jalr", C),
    ("beq", C), ("bne", C), ("blt", C), ("bge", C), ("bltu", C), ("bgeu", C),
    ("lb", L), ("lh", L), ("lw", L), ("lbu", L), ("lhu", L),
    ("sb", S), ("sh", S), ("sw", S),
    ("addi", C), ("slti", C), ("sltiu", C), ("xori", C), ("ori", C), ("andi", C),
    ("slli", C), ("srli", C), ("srai", C),
    ("add", C), ("sub", C), ("sll", C), ("slt", C), ("sltu", C),
    ("xor", C), ("srl", C), ("sra", C), ("or", C), ("and", C),
    ("fence", C), ("fence.i", C),
    ("ecall", C), ("ebreak", C), ("mret", C), ("sret", C), ("wfi", C), ("sfence.vma", C),
    ("csrrw", C), ("csrrs", C), ("csrrc", C), ("csrrwi", C), ("csrrsi", C), ("csrrci", C),
    ("mul", C), ("mulh", C), ("mulhsu", C), ("mulhu", C),
    ("div", C), ("divu", C), ("rem", C), ("remu", C),
    ("lr.w", L), ("sc.w", S), ("amoswap.w", S), ("amoadd.w", S), ("amoxor.w", S),
    ("amoand.w", S), ("amoor.w", S), ("amomin.w", S), ("amomax.w", S),
    ("amominu.w", S), ("amomaxu.w", S),
    ("vsetvli", C), ("vsetivli", C), ("vsetvl", C),
    ("vle8.v", L), ("vle16.v", L), ("vle32.v", L), ("vle64.v", L),
    ("vlse8.v", L), ("vlse16.v", L), ("vlse32.v", L), ("vlse64.v", L),
    ("vse8.v", S), ("vse16.v", S), ("vse32.v", S), ("vse64.v", S),
    ("vsse8.v", S), ("vsse16.v", S), ("vsse32.v", S), ("vsse64.v", S),
    ("vluxei8.v", L), ("vluxei16.v", L), ("vluxei32.v", L), ("vluxei64.v", L),
    ("vloxei8.v", L), ("vloxei16.v", L), ("vloxei32.v", L), ("vloxei64.v", L),
    ("vsuxei8.v", S), ("vsuxei16.v", S), ("vsuxei32.v", S), ("vsuxei64.v", S),
    ("vsoxei8.v", S), ("vsoxei16.v", S), ("vsoxei32.v", S), ("vsoxei64.v", S),
    ("vadd.vv", C), ("vadd.vx", C), ("vadd.vi", C), ("vsub.vv", C), ("vsub.vx", C),
    ("vand.vv", C), ("vor.vv", C), ("vxor.vv", C), ("vmul.vv", C),
];

#[rustfmt::skip]
const RV64_MNEMONICS: &[(&str, InstKind)] = &[
    ("ld", L), ("lwu", L), ("sd", S),
    ("addiw", C), ("slliw", C), ("srliw", C), ("sraiw", C),
    ("addw", C), ("subw", C), ("sllw", C), ("srlw", C), ("sraw", C),
    ("mulw", C), ("divw", C), ("divuw", C), ("remw", C), ("remuw", C),
    ("lr.d", L), ("sc.d", S), ("amoswap.d", S), ("amoadd.d", S), ("amoxor.d", S),
    ("amoand.d", S), ("amoor.d", S), ("amomin.d", S), ("amomax.d", S),
    ("amominu.d", S), ("amomaxu.d", S),
];

/// Decodes the immediate shift instructions. `names` holds the left, logical right and arithmetic
/// right shift mnemonics.
fn shift_imm(
    raw: u32,
    funct3: u8,
    wide_shamt: bool,
    names: [&'static str; 3],
) -> Result<&'static str, DecodeError> {
    // With a 6-bit shift amount, bit 25 belongs to the shift amount rather than to funct7.
    let upper = if wide_shamt { raw >> 26 << 1 } else { raw >> 25 };
    match (funct3, upper) {
        (0b001, 0b0000000) => Ok(names[0]),
        (0b101, 0b0000000) => Ok(names[1]),
        (0b101, 0b0100000) => Ok(names[2]),
        _ => Err(DecodeError::IllegalInstruction),
    }
}

fn system(raw: u32) -> Result<(&'static str, InstKind, i64), DecodeError> {
    let csr = (raw >> 20) as i64;
    let mnemonic = match funct3(raw) {
        0b000 => match raw {
            0x0000_0073 => "ecall",
            0x0010_0073 => "ebreak",
            0x3020_0073 => "mret",
            0x1020_0073 => "sret",
            0x1050_0073 => "wfi",
            _ if funct7(raw) == 0b0001001 && u8::from(rd(raw)) == 0 => "sfence.vma",
            _ => return Err(DecodeError::IllegalInstruction),
        },
        0b001 => "csrrw",
        0b010 => "csrrs",
        0b011 => "csrrc",
        0b101 => "csrrwi",
        0b110 => "csrrsi",
        0b111 => "csrrci",
        _ => return Err(DecodeError::IllegalInstruction),
    };
    Ok((mnemonic, InstKind::Compute, csr))
}

/// Decodes the AMO major opcode. The `aq` and `rl` bits are ignored, as a single hart has nothing
/// to order against.
fn atomic(raw: u32, rv64: bool) -> Result<(&'static str, InstKind, i64), DecodeError> {
    let doubleword = match funct3(raw) {
        0b010 => false,
        0b011 if rv64 => true,
        _ => return Err(DecodeError::IllegalInstruction),
    };
    let (word_name, doubleword_name, kind) = match raw >> 27 {
        0b00010 if u8::from(rs2(raw)) == 0 => ("lr.w", "lr.d", InstKind::Load),
        0b00011 => ("sc.w", "sc.d", InstKind::Store),
        0b00001 => ("amoswap.w", "amoswap.d", InstKind::Store),
        0b00000 => ("amoadd.w", "amoadd.d", InstKind::Store),
        0b00100 => ("amoxor.w", "amoxor.d", InstKind::Store),
        0b01100 => ("amoand.w", "amoand.d", InstKind::Store),
        0b01000 => ("amoor.w", "amoor.d", InstKind::Store),
        0b10000 => ("amomin.w", "amomin.d", InstKind::Store),
        0b10100 => ("amomax.w", "amomax.d", InstKind::Store),
        0b11000 => ("amominu.w", "amominu.d", InstKind::Store),
        0b11100 => ("amomaxu.w", "amomaxu.d", InstKind::Store),
        _ => return Err(DecodeError::IllegalInstruction),
    };
    let mnemonic = if doubleword { doubleword_name } else { word_name };
    Ok((mnemonic, kind, 0))
}

/// Decodes the LOAD-FP and STORE-FP major opcodes, which hold both the vector memory instructions
/// and the (unsupported) floating-point loads and stores.
fn vector_memory(raw: u32, kind: InstKind) -> Result<(&'static str, InstKind, i64), DecodeError> {
    let eew = match funct3(raw) {
        0b000 => 0,
        0b101 => 1,
        0b110 => 2,
        0b111 => 3,
        0b001..=0b100 => {
            let mnemonic = if kind == InstKind::Load { "fp-load" } else { "fp-store" };
            return Ok((mnemonic, InstKind::Unsupported, 0));
        }
        _ => return Err(DecodeError::IllegalInstruction),
    };
    let nf = raw >> 29;
    let mew = (raw >> 28) & 1;
    let mop = (raw >> 26) & 0b11;
    if mew != 0 {
        return Err(DecodeError::IllegalInstruction);
    }
    const UNIT: [[&str; 4]; 2] = [
        ["vle8.v", "vle16.v", "vle32.v", "vle64.v"],
        ["vse8.v", "vse16.v", "vse32.v", "vse64.v"],
    ];
    const STRIDED: [[&str; 4]; 2] = [
        ["vlse8.v", "vlse16.v", "vlse32.v", "vlse64.v"],
        ["vsse8.v", "vsse16.v", "vsse32.v", "vsse64.v"],
    ];
    // The width field holds the index EEW for the indexed accesses.
    const UNORDERED: [[&str; 4]; 2] = [
        ["vluxei8.v", "vluxei16.v", "vluxei32.v", "vluxei64.v"],
        ["vsuxei8.v", "vsuxei16.v", "vsuxei32.v", "vsuxei64.v"],
    ];
    const ORDERED: [[&str; 4]; 2] = [
        ["vloxei8.v", "vloxei16.v", "vloxei32.v", "vloxei64.v"],
        ["vsoxei8.v", "vsoxei16.v", "vsoxei32.v", "vsoxei64.v"],
    ];
    let store = (kind == InstKind::Store) as usize;
    match (nf, mop, u8::from(rs2(raw))) {
        (0, 0b00, 0) => Ok((UNIT[store][eew], kind, 0)),
        (0, 0b01, _) => Ok((UNORDERED[store][eew], kind, 0)),
        (0, 0b10, _) => Ok((STRIDED[store][eew], kind, 0)),
        (0, 0b11, _) => Ok((ORDERED[store][eew], kind, 0)),
        // Segment, whole-register, mask and fault-only-first accesses.
        _ => Ok(("vector-memory", InstKind::Unsupported, 0)),
    }
}

/// Decodes the OP-V major opcode.
fn vector_arithmetic(raw: u32) -> Result<(&'static str, InstKind, i64), DecodeError> {
    let funct6 = raw >> 26;
    let mnemonic = match funct3(raw) {
        // OPCFG
        0b111 => {
            return Ok(if raw >> 31 == 0 {
                ("vsetvli", InstKind::Compute, ((raw >> 20) & 0x7FF) as i64)
            } else if raw >> 30 == 0b11 {
                ("vsetivli", InstKind::Compute, ((raw >> 20) & 0x3FF) as i64)
            } else if raw >> 25 == 0b1000000 {
                ("vsetvl", InstKind::Compute, 0)
            } else {
                return Err(DecodeError::IllegalInstruction);
            });
        }
        // OPIVV
        0b000 => match funct6 {
            0b000000 => "vadd.vv",
            0b000010 => "vsub.vv",
            0b001001 => "vand.vv",
            0b001010 => "vor.vv",
            0b001011 => "vxor.vv",
            _ => return Ok(("vector-op", InstKind::Unsupported, 0)),
        },
        // OPIVX
        0b100 => match funct6 {
            0b000000 => "vadd.vx",
            0b000010 => "vsub.vx",
            _ => return Ok(("vector-op", InstKind::Unsupported, 0)),
        },
        // OPIVI
        0b011 => match funct6 {
            0b000000 => "vadd.vi",
            _ => return Ok(("vector-op", InstKind::Unsupported, 0)),
        },
        // OPMVV
        0b010 => match funct6 {
            0b100101 => "vmul.vv",
            _ => return Ok(("vector-op", InstKind::Unsupported, 0)),
        },
        // OPFVV, OPFVF, OPMVX
        _ => return Ok(("vector-op", InstKind::Unsupported, 0)),
    };
    // The 5-bit immediate of OPIVI is sign-extended.
    let simm5 = ((raw as i32) << 12 >> 27) as i64;
    Ok((mnemonic, InstKind::Compute, simm5))
}

/// Returns the 7-bit *opcode* value of the instruction, or `None` if it isn't supported.
fn opcode(raw_instruction: u32) -> Option<Opcode> {
    #[allow(clippy::unusual_byte_groupings)]
    match raw_instruction & 0x7F {
        0b00_000_11 => Some(Opcode::Load),
        0b00_001_11 => Some(Opcode::LoadFp),
        0b00_011_11 => Some(Opcode::MiscMem),
        0b00_100_11 => Some(Opcode::OpImm),
        0b00_101_11 => Some(Opcode::Auipc),
        0b00_110_11 => Some(Opcode::OpImm32),
        0b01_000_11 => Some(Opcode::Store),
        0b01_001_11 => Some(Opcode::StoreFp),
        0b01_011_11 => Some(Opcode::Amo),
        0b01_100_11 => Some(Opcode::Op),
        0b01_101_11 => Some(Opcode::Lui),
        0b01_110_11 => Some(Opcode::Op32),
        0b10_000_11 | 0b10_001_11 | 0b10_010_11 | 0b10_011_11 => Some(Opcode::FusedMultiplyAdd),
        0b10_100_11 => Some(Opcode::OpFp),
        0b10_101_11 => Some(Opcode::OpV),
        0b11_000_11 => Some(Opcode::Branch),
        0b11_001_11 => Some(Opcode::Jalr),
        0b11_011_11 => Some(Opcode::Jal),
        0b11_100_11 => Some(Opcode::System),
        _ => None,
    }
}

/// Returns the 5-bit *rd* value for R-type, I-type, U-type, J-type instructions.
fn rd(raw_instruction: u32) -> Specifier {
    Specifier::from_u5(((raw_instruction >> 7) & 0x1F) as u8)
}

/// Returns the 5-bit *rs1* value for R-type, I-type, S-type, B-type instructions.
fn rs1(raw_instruction: u32) -> Specifier {
    Specifier::from_u5(((raw_instruction >> 15) & 0x1F) as u8)
}

/// Returns the 5-bit *rs2* value for R-type, S-type, B-type instructions.
fn rs2(raw_instruction: u32) -> Specifier {
    Specifier::from_u5(((raw_instruction >> 20) & 0x1F) as u8)
}

/// Returns the 3-bit *funct3* value for R-type, I-type, S-type, B-type instructions.
fn funct3(raw_instruction: u32) -> u8 {
    ((raw_instruction >> 12) & 0b111) as u8
}

/// Returns the 7-bit *funct7* value for R-type instructions.
fn funct7(raw_instruction: u32) -> u8 {
    (raw_instruction >> 25) as u8
}

/// Returns the *shamt* value of the immediate shift instructions, 6 bits wide on RV64.
fn shamt(raw_instruction: u32, wide: bool) -> i64 {
    let mask = if wide { 0x3F } else { 0x1F };
    ((raw_instruction >> 20) & mask) as i64
}

/// Returns the 12-bit I-immediate sign-extended.
fn i_imm(raw_instruction: u32) -> i64 {
    (raw_instruction as i32 >> 20) as i64
}

/// Returns the 12-bit S-immediate sign-extended.
fn s_imm(raw_instruction: u32) -> i64 {
    let imm_11_5 = raw_instruction & 0xFE00_0000;
    let imm_4_0 = raw_instruction & 0x0000_0F80;
    ((imm_11_5 | (imm_4_0 << 13)) as i32 >> 20) as i64
}

/// Returns the 13-bit B-immediate sign-extended.
fn b_imm(raw_instruction: u32) -> i64 {
    let imm_12 = raw_instruction & 0x8000_0000;
    let imm_10_5 = raw_instruction & 0x7E00_0000;
    let imm_4_1 = raw_instruction & 0x0000_0F00;
    let imm_11 = raw_instruction & 0x0000_0080;
    ((imm_12 | (imm_11 << 23) | (imm_10_5 >> 1) | (imm_4_1 << 12)) as i32 >> 19) as i64
}

/// Returns the U-immediate sign-extended.
fn u_imm(raw_instruction: u32) -> i64 {
    (raw_instruction & 0xFFFF_F000) as i32 as i64
}

/// Returns the 21-bit J-immediate sign-extended.
fn j_imm(raw_instruction: u32) -> i64 {
    let imm_20 = raw_instruction & 0x8000_0000;
    let imm_10_1 = raw_instruction & 0x7FE0_0000;
    let imm_11 = raw_instruction & 0x0010_0000;
    let imm_19_12 = raw_instruction & 0x000F_F000;
    ((imm_20 | (imm_19_12 << 11) | (imm_11 << 2) | (imm_10_1 >> 9)) as i32 >> 11) as i64
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Opcode {
    Load,
    LoadFp,
    MiscMem,
    OpImm,
    Auipc,
    OpImm32,
    Store,
    StoreFp,
    Amo,
    Op,
    Lui,
    Op32,
    FusedMultiplyAdd,
    OpFp,
    OpV,
    Branch,
    Jalr,
    Jal,
    System,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode64(raw: u32) -> Instruction {
        Instruction::decode(raw, WordWidth::W64).unwrap()
    }

    #[test]
    fn test_i_imm() {
        assert_eq!(0, i_imm(0x0000_0000));
        assert_eq!(-1, i_imm(0xFFF0_0000));
        assert_eq!(2047, i_imm(2047 << 20));
        assert_eq!(-2048, i_imm(0x8000_0000));
        assert_eq!(-42, i_imm((-42_i32 << 20) as u32));
        // Check other bits are ignored
        assert_eq!(0, i_imm(0x000F_FFFF));
        assert_eq!(-1, i_imm(0xFFF1_2345));
        assert_eq!(1209, i_imm((1209 << 20) | 0x000C_D10A));
    }

    #[test]
    fn test_other_immediates() {
        // sw x2, -4(x1)
        assert_eq!(-4, s_imm(0xFE20_AE23));
        // beq x0, x0, -8
        assert_eq!(-8, b_imm(0xFE00_0CE3));
        // jal x0, 2048
        assert_eq!(2048, j_imm(0x0010_006F));
        // lui x1, 0x80000
        assert_eq!(-0x8000_0000, u_imm(0x8000_00B7));
    }

    #[test]
    fn test_decode_add() {
        // add x3, x1, x2
        let inst = decode64(0x0020_81B3);
        assert_eq!("add", inst.mnemonic);
        assert_eq!("add", inst.handler());
        assert_eq!(Specifier::from_u5(3), inst.rd);
        assert_eq!(Specifier::from_u5(1), inst.rs1);
        assert_eq!(Specifier::from_u5(2), inst.rs2);
        assert!(!inst.is_memory());
    }

    #[test]
    fn test_decode_memory() {
        // ld x5, 16(x10)
        let inst = decode64(0x0105_3283);
        assert_eq!("ld", inst.mnemonic);
        assert_eq!(InstKind::Load, inst.kind);
        assert_eq!(16, inst.imm);
        assert_eq!(
            Err(DecodeError::IllegalInstruction),
            Instruction::decode(0x0105_3283, WordWidth::W32)
        );
        // sw x2, -4(x1)
        let inst = decode64(0xFE20_AE23);
        assert_eq!("sw", inst.mnemonic);
        assert!(inst.is_memory());
        assert_eq!(-4, inst.imm);
    }

    #[test]
    fn test_decode_shifts() {
        // slli x1, x1, 40 is only legal on RV64.
        let raw = 0x0280_9093;
        assert_eq!("slli", decode64(raw).mnemonic);
        assert_eq!(40, decode64(raw).imm);
        assert_eq!(
            Err(DecodeError::IllegalInstruction),
            Instruction::decode(raw, WordWidth::W32)
        );
        // srai x1, x1, 3
        let inst = Instruction::decode(0x4030_D093, WordWidth::W32).unwrap();
        assert_eq!("srai", inst.mnemonic);
        assert_eq!(3, inst.imm);
    }

    #[test]
    fn test_decode_system() {
        assert_eq!("ecall", decode64(0x0000_0073).mnemonic);
        assert_eq!("mret", decode64(0x3020_0073).mnemonic);
        assert_eq!("sfence.vma", decode64(0x1200_0073).mnemonic);
        // csrrw x1, mscratch, x2
        let inst = decode64(0x3401_10F3);
        assert_eq!("csrrw", inst.mnemonic);
        assert_eq!(0x340, inst.csr());
    }

    #[test]
    fn test_decode_vector() {
        // vsetvli x1, x2, e32, m1, ta, ma
        let inst = decode64(0x0D01_70D7);
        assert_eq!("vsetvli", inst.mnemonic);
        assert_eq!(0b1101_0000, inst.imm);
        // vadd.vv v1, v2, v3
        let inst = decode64(0x0221_80D7);
        assert_eq!("vadd.vv", inst.mnemonic);
        assert!(inst.vm());
        // vadd.vi v1, v2, -1
        let inst = decode64(0x022F_B0D7);
        assert_eq!("vadd.vi", inst.mnemonic);
        assert_eq!(-1, inst.imm);
        // vlse32.v v1, (x10), x11
        let inst = decode64(0x0AB5_6087);
        assert_eq!("vlse32.v", inst.mnemonic);
        assert_eq!(32, inst.vector_eew());
        assert_eq!(Specifier::from_u5(11), inst.rs2);
        // vluxei32.v v1, (x10), v2
        let inst = decode64(0x0625_6087);
        assert_eq!("vluxei32.v", inst.mnemonic);
        assert_eq!(InstKind::Load, inst.kind);
        assert_eq!(32, inst.vector_eew());
        // vsoxei16.v v1, (x10), v2
        let inst = decode64(0x0E25_50A7);
        assert_eq!("vsoxei16.v", inst.mnemonic);
        assert_eq!(InstKind::Store, inst.kind);
    }

    #[test]
    fn test_decode_atomics() {
        // amoadd.w x1, x2, (x3)
        let inst = decode64(0x0021_A0AF);
        assert_eq!("amoadd.w", inst.mnemonic);
        assert_eq!(InstKind::Store, inst.kind);
        assert_eq!(Specifier::from_u5(3), inst.rs1);
        // lr.w x5, (x10)
        let inst = decode64(0x1005_22AF);
        assert_eq!("lr.w", inst.mnemonic);
        assert_eq!(InstKind::Load, inst.kind);
        // lr.w with a non-zero rs2 field
        assert_eq!(
            Err(DecodeError::IllegalInstruction),
            Instruction::decode(0x1015_22AF, WordWidth::W64)
        );
        // sc.w x6, x7, (x10)
        assert_eq!("sc.w", decode64(0x1875_232F).mnemonic);
        // amoadd.d x1, x2, (x3)
        assert_eq!("amoadd.d", decode64(0x0021_B0AF).mnemonic);
        assert_eq!(
            Err(DecodeError::IllegalInstruction),
            Instruction::decode(0x0021_B0AF, WordWidth::W32)
        );
    }

    #[test]
    fn test_unsupported_encodings() {
        // flw f1, 0(x10)
        let inst = decode64(0x0005_2087);
        assert!(inst.is_unimplemented());
        assert_eq!(UNSUPPORTED, inst.handler());
        // fadd.s f1, f2, f3
        assert!(decode64(0x0031_00D3).is_unimplemented());
        // vlseg2e32.v v1, (x10)
        assert!(decode64(0x2005_6087).is_unimplemented());
        assert_eq!(
            Err(DecodeError::UnsupportedOpcode),
            Instruction::decode(0x0000_007F, WordWidth::W64)
        );
    }

    #[test]
    fn test_mnemonic_tables() {
        let rv32: Vec<_> = Instruction::mnemonics(WordWidth::W32).collect();
        let rv64: Vec<_> = Instruction::mnemonics(WordWidth::W64).collect();
        assert!(rv32.contains(&("add", InstKind::Compute)));
        assert!(!rv32.iter().any(|(name, _)| *name == "ld"));
        assert!(rv64.contains(&("ld", InstKind::Load)));
        assert!(rv64.contains(&("vsse64.v", InstKind::Store)));
        assert!(rv32.contains(&("vloxei8.v", InstKind::Load)));
        assert!(rv32.contains(&("amoswap.w", InstKind::Store)));
        assert!(!rv32.iter().any(|(name, _)| *name == "lr.d"));
        assert!(rv64.contains(&("lr.d", InstKind::Load)));
    }
}
