//! Arithmetic/logic unit.
//!
//! The ALU is a pure function of its two operands and an operation. Which operation applies is
//! resolved from the instruction's function selectors: `funct3` alone for register-immediate
//! instructions, and the `(funct7, funct3)` pair for register-register instructions.

use std::fmt;

/// Operations the ALU is able to perform. All arithmetic wraps around on overflow.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AluOp {
    Add,
    Sub,
    Sll,
    Slt,
    Sltu,
    Xor,
    Srl,
    Sra,
    Or,
    And,
}

/// `funct7` value selecting the primary operation of a `funct3` group.
const FUNCT7_BASE: u8 = 0b0000000;
/// `funct7` value selecting the alternate operation (SUB, SRA) of a `funct3` group.
const FUNCT7_ALT: u8 = 0b0100000;

impl AluOp {
    /// Resolves the operation of a register-register (R-type) instruction.
    ///
    /// Returns `None` if the `(funct7, funct3)` combination doesn't select a supported operation.
    /// Bits above the 7-bit and 3-bit field widths are ignored.
    pub fn from_register_funct(funct7: u8, funct3: u8) -> Option<Self> {
        let funct3 = funct3 & 0b111;
        match (funct7 & 0x7F, funct3) {
            (FUNCT7_BASE, _) => Some(Self::from_immediate_funct(funct3)),
            (FUNCT7_ALT, 0b000) => Some(Self::Sub),
            (FUNCT7_ALT, 0b101) => Some(Self::Sra),
            _ => None,
        }
    }

    /// Resolves the operation of a register-immediate (I-type) instruction.
    ///
    /// Every 3-bit selector maps onto an operation. There is no variant selector for immediates,
    /// so `0b101` always is a logical right shift. Only the lower 3 bits of `funct3` are used.
    pub fn from_immediate_funct(funct3: u8) -> Self {
        match funct3 & 0b111 {
            0b000 => Self::Add,
            0b001 => Self::Sll,
            0b010 => Self::Slt,
            0b011 => Self::Sltu,
            0b100 => Self::Xor,
            0b101 => Self::Srl,
            0b110 => Self::Or,
            // 0b111
            _ => Self::And,
        }
    }

    /// Applies the operation to `operand1` and `operand2`.
    ///
    /// Shifts only use the lower 5 bits of `operand2` as the shift amount.
    pub fn apply(self, operand1: u32, operand2: u32) -> u32 {
        let shamt = operand2 & 0x1F;
        match self {
            Self::Add => operand1.wrapping_add(operand2),
            Self::Sub => operand1.wrapping_sub(operand2),
            Self::Sll => operand1 << shamt,
            Self::Slt => ((operand1 as i32) < (operand2 as i32)) as u32,
            Self::Sltu => (operand1 < operand2) as u32,
            Self::Xor => operand1 ^ operand2,
            Self::Srl => operand1 >> shamt,
            Self::Sra => ((operand1 as i32) >> shamt) as u32,
            Self::Or => operand1 | operand2,
            Self::And => operand1 & operand2,
        }
    }

    /// Assembler mnemonic of the register-register form of this operation.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Sll => "sll",
            Self::Slt => "slt",
            Self::Sltu => "sltu",
            Self::Xor => "xor",
            Self::Srl => "srl",
            Self::Sra => "sra",
            Self::Or => "or",
            Self::And => "and",
        }
    }
}

impl fmt::Display for AluOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Computes the ALU output. An unresolved operation silently produces `0`.
pub fn execute(op: Option<AluOp>, operand1: u32, operand2: u32) -> u32 {
    op.map_or(0, |op| op.apply(operand1, operand2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_register_funct_table() {
        assert_eq!(Some(AluOp::Add), AluOp::from_register_funct(0, 0b000));
        assert_eq!(Some(AluOp::Sub), AluOp::from_register_funct(0b0100000, 0b000));
        assert_eq!(Some(AluOp::Srl), AluOp::from_register_funct(0, 0b101));
        assert_eq!(Some(AluOp::Sra), AluOp::from_register_funct(0b0100000, 0b101));
        assert_eq!(Some(AluOp::And), AluOp::from_register_funct(0, 0b111));
        // Alternate variant only exists for ADD/SUB and SRL/SRA
        assert_eq!(None, AluOp::from_register_funct(0b0100000, 0b111));
        // M extension
        assert_eq!(None, AluOp::from_register_funct(0b0000001, 0b000));
    }

    #[test]
    fn test_immediate_funct_has_no_variants() {
        assert_eq!(AluOp::Add, AluOp::from_immediate_funct(0b000));
        assert_eq!(AluOp::Srl, AluOp::from_immediate_funct(0b101));
    }

    #[test]
    fn test_selectors_are_truncated_to_field_width() {
        assert_eq!(AluOp::Sll, AluOp::from_immediate_funct(0b1001));
        assert_eq!(AluOp::And, AluOp::from_immediate_funct(u8::MAX));
        assert_eq!(Some(AluOp::Sub), AluOp::from_register_funct(0b0100000, 0b1000));
        assert_eq!(Some(AluOp::Xor), AluOp::from_register_funct(0b1000_0000, 0b100));
    }

    #[test]
    fn test_apply() {
        assert_eq!(7, AluOp::Sub.apply(10, 3));
        assert_eq!(0xFFFF_FFFF, AluOp::Sub.apply(0, 1));
        assert_eq!(0, AluOp::Add.apply(0xFFFF_FFFF, 1));
        assert_eq!(1, AluOp::Slt.apply(-5_i32 as u32, 3));
        assert_eq!(0, AluOp::Sltu.apply(-5_i32 as u32, 3));
        assert_eq!(0x8000_0000, AluOp::Sll.apply(1, 31));
        // Only the lower five bits of the shift amount are used
        assert_eq!(2, AluOp::Sll.apply(1, 33));
        assert_eq!(0x0800_0000, AluOp::Srl.apply(0x8000_0000, 4));
        assert_eq!(0xF800_0000, AluOp::Sra.apply(0x8000_0000, 4));
        assert_eq!(0b0110, AluOp::Xor.apply(0b1100, 0b1010));
        assert_eq!(0b1110, AluOp::Or.apply(0b1100, 0b1010));
        assert_eq!(0b1000, AluOp::And.apply(0b1100, 0b1010));
    }

    #[test]
    fn test_unresolved_yields_zero() {
        assert_eq!(0, execute(None, 0xDEAD_BEEF, 0x1234_5678));
        assert_eq!(13, execute(Some(AluOp::Add), 6, 7));
    }

    proptest! {
        #[test]
        fn sub_undoes_add(a: u32, b: u32) {
            prop_assert_eq!(a, AluOp::Sub.apply(AluOp::Add.apply(a, b), b));
        }

        #[test]
        fn sra_preserves_sign(a: u32, shamt in 0u32..32) {
            let result = AluOp::Sra.apply(a, shamt);
            prop_assert_eq!(a >> 31, result >> 31);
            prop_assert_eq!((a as i32 >> shamt) as u32, result);
        }

        #[test]
        fn set_less_than_is_boolean(a: u32, b: u32) {
            prop_assert!(AluOp::Slt.apply(a, b) <= 1);
            prop_assert_eq!((a < b) as u32, AluOp::Sltu.apply(a, b));
        }
    }
}
