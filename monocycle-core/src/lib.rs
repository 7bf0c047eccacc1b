#[macro_use]
extern crate static_assertions;

pub mod alu;
pub mod branch;
pub mod core;
pub mod imem;
pub mod instruction;
pub mod registers;
pub mod simulator;

#[cfg(test)]
mod asm;

pub use crate::core::{Config, Core, ExecutionResult, Retired};
pub use imem::InstructionMemory;
pub use instruction::Instruction;

pub mod unit {
    //! Collection of the units in which memory can be addressed (in bytes).

    /// A _word_ is 32 bits (4 bytes).
    pub const WORD: u32 = 4;
}
