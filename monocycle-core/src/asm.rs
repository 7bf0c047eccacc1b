//! Minimal instruction encoder used to write test programs.

#![allow(dead_code)]

pub const LOAD: u32 = 0b00_000_11;
pub const OP_IMM: u32 = 0b00_100_11;
pub const AUIPC: u32 = 0b00_101_11;
pub const STORE: u32 = 0b01_000_11;
pub const OP: u32 = 0b01_100_11;
pub const LUI: u32 = 0b01_101_11;
pub const BRANCH: u32 = 0b11_000_11;
pub const JALR: u32 = 0b11_001_11;
pub const JAL: u32 = 0b11_011_11;

pub fn r_type(opcode: u32, rd: u8, funct3: u8, rs1: u8, rs2: u8, funct7: u8) -> u32 {
    (funct7 as u32) << 25
        | (rs2 as u32) << 20
        | (rs1 as u32) << 15
        | (funct3 as u32) << 12
        | (rd as u32) << 7
        | opcode
}

pub fn i_type(opcode: u32, rd: u8, funct3: u8, rs1: u8, imm: i32) -> u32 {
    (imm as u32 & 0xFFF) << 20 | (rs1 as u32) << 15 | (funct3 as u32) << 12 | (rd as u32) << 7 | opcode
}

pub fn s_type(opcode: u32, funct3: u8, rs1: u8, rs2: u8, imm: i32) -> u32 {
    let imm = imm as u32;
    ((imm >> 5) & 0x7F) << 25
        | (rs2 as u32) << 20
        | (rs1 as u32) << 15
        | (funct3 as u32) << 12
        | (imm & 0x1F) << 7
        | opcode
}

pub fn b_type(opcode: u32, funct3: u8, rs1: u8, rs2: u8, imm: i32) -> u32 {
    let imm = imm as u32;
    ((imm >> 12) & 1) << 31
        | ((imm >> 5) & 0x3F) << 25
        | (rs2 as u32) << 20
        | (rs1 as u32) << 15
        | (funct3 as u32) << 12
        | ((imm >> 1) & 0xF) << 8
        | ((imm >> 11) & 1) << 7
        | opcode
}

pub fn u_type(opcode: u32, rd: u8, imm: i32) -> u32 {
    (imm as u32 & 0xFFFF_F000) | (rd as u32) << 7 | opcode
}

pub fn j_type(opcode: u32, rd: u8, imm: i32) -> u32 {
    let imm = imm as u32;
    ((imm >> 20) & 1) << 31
        | ((imm >> 1) & 0x3FF) << 21
        | ((imm >> 11) & 1) << 20
        | ((imm >> 12) & 0xFF) << 12
        | (rd as u32) << 7
        | opcode
}

pub fn add(rd: u8, rs1: u8, rs2: u8) -> u32 {
    r_type(OP, rd, 0b000, rs1, rs2, 0b0000000)
}

pub fn sub(rd: u8, rs1: u8, rs2: u8) -> u32 {
    r_type(OP, rd, 0b000, rs1, rs2, 0b0100000)
}

pub fn addi(rd: u8, rs1: u8, imm: i32) -> u32 {
    i_type(OP_IMM, rd, 0b000, rs1, imm)
}

pub fn srli(rd: u8, rs1: u8, shamt: i32) -> u32 {
    i_type(OP_IMM, rd, 0b101, rs1, shamt)
}

pub fn lw(rd: u8, rs1: u8, offset: i32) -> u32 {
    i_type(LOAD, rd, 0b010, rs1, offset)
}

pub fn sw(rs2: u8, rs1: u8, offset: i32) -> u32 {
    s_type(STORE, 0b010, rs1, rs2, offset)
}

pub fn lui(rd: u8, imm: i32) -> u32 {
    u_type(LUI, rd, imm)
}

pub fn auipc(rd: u8, imm: i32) -> u32 {
    u_type(AUIPC, rd, imm)
}

pub fn beq(rs1: u8, rs2: u8, offset: i32) -> u32 {
    b_type(BRANCH, 0b000, rs1, rs2, offset)
}

pub fn bne(rs1: u8, rs2: u8, offset: i32) -> u32 {
    b_type(BRANCH, 0b001, rs1, rs2, offset)
}

pub fn jal(rd: u8, offset: i32) -> u32 {
    j_type(JAL, rd, offset)
}

pub fn jalr(rd: u8, rs1: u8, offset: i32) -> u32 {
    i_type(JALR, rd, 0b000, rs1, offset)
}

#[test]
fn test_known_encodings() {
    assert_eq!(0x00A0_0093, addi(1, 0, 10));
    assert_eq!(0x4020_81B3, sub(3, 1, 2));
    assert_eq!(0x0080_00EF, jal(1, 8));
    assert_eq!(0x0020_8663, beq(1, 2, 12));
    assert_eq!(0xFE51_2E23, sw(5, 2, -4));
    assert_eq!(0x0081_2283, lw(5, 2, 8));
    assert_eq!(0x0000_8067, jalr(0, 1, 0));
}
