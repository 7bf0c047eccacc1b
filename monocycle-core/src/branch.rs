//! Branch resolver for conditional control transfers.

use std::fmt;

/// Conditions a B-type instruction can branch on.
///
/// The unsigned comparisons (`bltu`, `bgeu`) are not part of this core.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BranchCondition {
    Beq,
    Bne,
    Blt,
    Bge,
}

impl BranchCondition {
    /// Resolves the branch condition selected by the lower 3 bits of `funct3`, or `None` if it
    /// isn't supported.
    pub fn from_funct3(funct3: u8) -> Option<Self> {
        match funct3 & 0b111 {
            0b000 => Some(Self::Beq),
            0b001 => Some(Self::Bne),
            0b100 => Some(Self::Blt),
            0b101 => Some(Self::Bge),
            _ => None,
        }
    }

    /// Returns `true` if the branch must be taken for operands `src1` and `src2`.
    pub fn is_taken(self, src1: u32, src2: u32) -> bool {
        match self {
            Self::Beq => src1 == src2,
            Self::Bne => src1 != src2,
            Self::Blt => (src1 as i32) < (src2 as i32),
            Self::Bge => (src1 as i32) >= (src2 as i32),
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Beq => "beq",
            Self::Bne => "bne",
            Self::Blt => "blt",
            Self::Bge => "bge",
        }
    }
}

impl fmt::Display for BranchCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Evaluates the branch predicate. An unresolved condition is never taken.
pub fn resolve(condition: Option<BranchCondition>, src1: u32, src2: u32) -> bool {
    condition.is_some_and(|condition| condition.is_taken(src1, src2))
}
