use crate::alu::AluOp;
use crate::branch::BranchCondition;
use crate::registers::Specifier;
use bitvec::field::BitField;
use bitvec::order::Lsb0;
use bitvec::view::BitView;
use std::fmt;

/// Data structure that can hold any instruction class in its decoded form.
///
/// Function selectors (`funct3`, `funct7`) are kept as raw fields: resolving them into an actual
/// operation is up to the ALU and the branch resolver, which fall back to a default when the
/// selector is not supported.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Instruction {
    /// R-type register-register ALU operation.
    Op {
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
        funct3: u8,
        funct7: u8,
    },
    /// I-type register-immediate ALU operation.
    OpImm {
        dest: Specifier,
        src: Specifier,
        funct3: u8,
        immediate: i32,
    },
    /// I-type load. Decoded, but there is no data memory to load from.
    Load {
        dest: Specifier,
        base: Specifier,
        funct3: u8,
        offset: i32,
    },
    /// S-type store. Decoded, but there is no data memory to store to.
    Store {
        src: Specifier,
        base: Specifier,
        funct3: u8,
        offset: i32,
    },
    Lui {
        dest: Specifier,
        immediate: i32,
    },
    Auipc {
        dest: Specifier,
        immediate: i32,
    },
    Branch {
        src1: Specifier,
        src2: Specifier,
        funct3: u8,
        offset: i32,
    },
    Jal {
        dest: Specifier,
        offset: i32,
    },
    Jalr {
        dest: Specifier,
        base: Specifier,
        offset: i32,
    },
    /// Any instruction word whose 5-bit opcode field doesn't select one of the classes above.
    Unsupported {
        opcode: u8,
    },
}

impl Instruction {
    /// Decodes a raw instruction word. Decoding never fails: unknown opcodes decode to
    /// [`Instruction::Unsupported`].
    ///
    /// Bits `[1:0]` of the word are assumed to be `0b11` and are not checked.
    pub fn decode(raw_instruction: u32) -> Self {
        let opcode_u5 = opcode(raw_instruction);
        let Some(opcode) = Opcode::from_u5(opcode_u5) else {
            return Self::Unsupported { opcode: opcode_u5 };
        };
        match opcode {
            Opcode::Op => Self::Op {
                dest: rd(raw_instruction),
                src1: rs1(raw_instruction),
                src2: rs2(raw_instruction),
                funct3: funct3(raw_instruction),
                funct7: funct7(raw_instruction),
            },
            Opcode::OpImm => Self::OpImm {
                dest: rd(raw_instruction),
                src: rs1(raw_instruction),
                funct3: funct3(raw_instruction),
                immediate: i_imm(raw_instruction),
            },
            Opcode::Load => Self::Load {
                dest: rd(raw_instruction),
                base: rs1(raw_instruction),
                funct3: funct3(raw_instruction),
                offset: i_imm(raw_instruction),
            },
            Opcode::Store => Self::Store {
                src: rs2(raw_instruction),
                base: rs1(raw_instruction),
                funct3: funct3(raw_instruction),
                offset: s_imm(raw_instruction),
            },
            Opcode::Lui => Self::Lui {
                dest: rd(raw_instruction),
                immediate: u_imm(raw_instruction),
            },
            Opcode::Auipc => Self::Auipc {
                dest: rd(raw_instruction),
                immediate: u_imm(raw_instruction),
            },
            Opcode::Branch => Self::Branch {
                src1: rs1(raw_instruction),
                src2: rs2(raw_instruction),
                funct3: funct3(raw_instruction),
                offset: b_imm(raw_instruction),
            },
            Opcode::Jal => Self::Jal {
                dest: rd(raw_instruction),
                offset: j_imm(raw_instruction),
            },
            Opcode::Jalr => Self::Jalr {
                dest: rd(raw_instruction),
                base: rs1(raw_instruction),
                offset: i_imm(raw_instruction),
            },
        }
    }

    /// Returns the destination register this instruction names, if its class has one.
    pub fn dest(&self) -> Option<Specifier> {
        match *self {
            Self::Op { dest, .. }
            | Self::OpImm { dest, .. }
            | Self::Load { dest, .. }
            | Self::Lui { dest, .. }
            | Self::Auipc { dest, .. }
            | Self::Jal { dest, .. }
            | Self::Jalr { dest, .. } => Some(dest),
            Self::Store { .. } | Self::Branch { .. } | Self::Unsupported { .. } => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Op {
                dest,
                src1,
                src2,
                funct3,
                funct7,
            } => match AluOp::from_register_funct(funct7, funct3) {
                Some(op) => write!(f, "{op} {dest}, {src1}, {src2}"),
                None => write!(
                    f,
                    "<op funct7={funct7:#09b} funct3={funct3:#05b}> {dest}, {src1}, {src2}"
                ),
            },
            Self::OpImm {
                dest,
                src,
                funct3,
                immediate,
            } => match AluOp::from_immediate_funct(funct3) {
                op @ (AluOp::Sll | AluOp::Srl) => {
                    write!(f, "{op}i {dest}, {src}, {}", immediate & 0x1F)
                }
                AluOp::Sltu => write!(f, "sltiu {dest}, {src}, {immediate}"),
                op => write!(f, "{op}i {dest}, {src}, {immediate}"),
            },
            Self::Load {
                dest,
                base,
                funct3,
                offset,
            } => match funct3 {
                0b000 => write!(f, "lb {dest}, {offset}({base})"),
                0b001 => write!(f, "lh {dest}, {offset}({base})"),
                0b010 => write!(f, "lw {dest}, {offset}({base})"),
                0b100 => write!(f, "lbu {dest}, {offset}({base})"),
                0b101 => write!(f, "lhu {dest}, {offset}({base})"),
                _ => write!(f, "<load funct3={funct3:#05b}> {dest}, {offset}({base})"),
            },
            Self::Store {
                src,
                base,
                funct3,
                offset,
            } => match funct3 {
                0b000 => write!(f, "sb {src}, {offset}({base})"),
                0b001 => write!(f, "sh {src}, {offset}({base})"),
                0b010 => write!(f, "sw {src}, {offset}({base})"),
                _ => write!(f, "<store funct3={funct3:#05b}> {src}, {offset}({base})"),
            },
            Self::Lui { dest, immediate } => {
                write!(f, "lui {dest}, {:#x}", immediate as u32 >> 12)
            }
            Self::Auipc { dest, immediate } => {
                write!(f, "auipc {dest}, {:#x}", immediate as u32 >> 12)
            }
            Self::Branch {
                src1,
                src2,
                funct3,
                offset,
            } => match BranchCondition::from_funct3(funct3) {
                Some(condition) => write!(f, "{condition} {src1}, {src2}, {offset}"),
                None => write!(f, "<branch funct3={funct3:#05b}> {src1}, {src2}, {offset}"),
            },
            Self::Jal { dest, offset } => write!(f, "jal {dest}, {offset}"),
            Self::Jalr { dest, base, offset } => write!(f, "jalr {dest}, {offset}({base})"),
            Self::Unsupported { opcode } => write!(f, "<unsupported opcode {opcode:#07b}>"),
        }
    }
}

/// Returns the 5-bit *opcode* field (bits `[6:2]`) of the instruction.
fn opcode(raw_instruction: u32) -> u8 {
    raw_instruction.view_bits::<Lsb0>()[idx::OPCODE].load_le()
}

/// Returns the 5-bit *rd* value for R-type, I-type, U-type, J-type instructions.
fn rd(raw_instruction: u32) -> Specifier {
    Specifier::from_u5(raw_instruction.view_bits::<Lsb0>()[idx::RD].load_le())
}

/// Returns the 5-bit *rs1* value for R-type, I-type, S-type, B-type instructions.
fn rs1(raw_instruction: u32) -> Specifier {
    Specifier::from_u5(raw_instruction.view_bits::<Lsb0>()[idx::RS1].load_le())
}

/// Returns the 5-bit *rs2* value for R-type, S-type, B-type instructions.
fn rs2(raw_instruction: u32) -> Specifier {
    Specifier::from_u5(raw_instruction.view_bits::<Lsb0>()[idx::RS2].load_le())
}

/// Returns the 3-bit *funct3* value for R-type, I-type, S-type, B-type instructions.
fn funct3(raw_instruction: u32) -> u8 {
    raw_instruction.view_bits::<Lsb0>()[idx::FUNCT3].load_le()
}

/// Returns the 7-bit *funct7* value for R-type instructions.
fn funct7(raw_instruction: u32) -> u8 {
    raw_instruction.view_bits::<Lsb0>()[idx::FUNCT7].load_le()
}

/// Returns the 12-bit I-immediate sign-extended to 32 bits.
fn i_imm(raw_instruction: u32) -> i32 {
    raw_instruction as i32 >> 20
}

/// Returns the 12-bit S-immediate sign-extended to 32 bits.
fn s_imm(raw_instruction: u32) -> i32 {
    let imm_11_5 = raw_instruction & 0xFE00_0000;
    let imm_4_0 = raw_instruction & 0x0000_0F80;
    (imm_11_5 | (imm_4_0 << 13)) as i32 >> 20
}

/// Returns the 13-bit B-immediate sign-extended to 32 bits.
fn b_imm(raw_instruction: u32) -> i32 {
    let imm_12 = raw_instruction & 0x8000_0000;
    let imm_10_5 = raw_instruction & 0x7E00_0000;
    let imm_4_1 = raw_instruction & 0x0000_0F00;
    let imm_11 = raw_instruction & 0x0000_0080;
    (imm_12 | (imm_11 << 23) | (imm_10_5 >> 1) | (imm_4_1 << 12)) as i32 >> 19
}

/// Returns the signed 32-bit U-immediate.
fn u_imm(raw_instruction: u32) -> i32 {
    (raw_instruction & 0xFFFF_F000) as i32
}

/// Returns the 21-bit J-immediate sign-extended to 32 bits.
fn j_imm(raw_instruction: u32) -> i32 {
    let imm_20 = raw_instruction & 0x8000_0000;
    let imm_10_1 = raw_instruction & 0x7FE0_0000;
    let imm_11 = raw_instruction & 0x0010_0000;
    let imm_19_12 = raw_instruction & 0x000F_F000;
    (imm_20 | (imm_19_12 << 11) | (imm_11 << 2) | (imm_10_1 >> 9)) as i32 >> 11
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Opcode {
    Load,
    OpImm,
    Auipc,
    Store,
    Op,
    Lui,
    Branch,
    Jalr,
    Jal,
}

impl Opcode {
    /// Maps bits `[6:2]` of an instruction onto a supported opcode.
    fn from_u5(value_u5: u8) -> Option<Self> {
        #[allow(clippy::unusual_byte_groupings)]
        match value_u5 {
            0b00_000 => Some(Self::Load),
            0b00_100 => Some(Self::OpImm),
            0b00_101 => Some(Self::Auipc),
            0b01_000 => Some(Self::Store),
            0b01_100 => Some(Self::Op),
            0b01_101 => Some(Self::Lui),
            0b11_000 => Some(Self::Branch),
            0b11_001 => Some(Self::Jalr),
            0b11_011 => Some(Self::Jal),
            _ => None,
        }
    }
}

/// Bit ranges of the fixed instruction fields.
mod idx {
    use std::ops::Range;

    pub const OPCODE: Range<usize> = 2..7;
    pub const RD: Range<usize> = 7..12;
    pub const FUNCT3: Range<usize> = 12..15;
    pub const RS1: Range<usize> = 15..20;
    pub const RS2: Range<usize> = 20..25;
    pub const FUNCT7: Range<usize> = 25..32;
}
