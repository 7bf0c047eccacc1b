//! Provides a simulatable single-cycle core implementing a subset of RV32I.

mod execute;

use crate::imem::InstructionMemory;
use crate::instruction::Instruction;
use crate::registers::{Registers, Specifier};
use crate::simulator::Simulatable;
use execute::Executor;
use log::{debug, trace};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Default, Clone)]
pub struct Config {
    /// Address to which the core's PC register is reset.
    pub reset_vector: u32,
    /// If `true`, a reset also zeroes all `x` registers.
    ///
    /// By default, a reset only affects the PC register. Register contents survive it.
    pub clear_registers_on_reset: bool,
}

/// Single-cycle RISC-V core.
///
/// Every call to [`step`](Self::step) fetches, decodes, executes and retires exactly one
/// instruction. All state changes of a step (at most one register write and exactly one PC update)
/// are committed together at the end of the step, so no intermediate state is ever observable.
///
/// The core has no data memory, no traps, and no CSRs. Instructions it cannot execute are retired
/// as no-ops and reported through [`ExecutionResult::Anomaly`].
#[derive(Debug, Clone)]
pub struct Core {
    config: Config,
    instruction_memory: InstructionMemory,
    registers: Registers,
}

impl Core {
    /// Creates a core in reset state, executing from `instruction_memory`.
    pub fn new(instruction_memory: InstructionMemory, config: Config) -> Self {
        let registers = Registers::new(config.reset_vector);
        Self {
            config,
            instruction_memory,
            registers,
        }
    }

    /// Force this core to its reset state.
    pub fn reset(&mut self) {
        debug!("Resetting core to {:#010x}", self.config.reset_vector);
        *self.registers.pc_mut() = self.config.reset_vector;
        if self.config.clear_registers_on_reset {
            self.registers.clear_x();
        }
    }

    /// Provide a read-only view of this core's configuration.
    ///
    /// It is not possible to modify the configuration after creation.
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn instruction_memory(&self) -> &InstructionMemory {
        &self.instruction_memory
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.registers
    }

    /// Returns the instruction that the next step will execute.
    pub fn next_instruction(&self) -> Instruction {
        Instruction::decode(self.instruction_memory.fetch(self.registers.pc()))
    }

    /// Advance one clock cycle, executing a single instruction.
    pub fn step(&mut self) -> Retired {
        let pc = self.registers.pc();
        let raw_instruction = self.instruction_memory.fetch(pc);
        let instruction = Instruction::decode(raw_instruction);

        let transition = evaluate(&self.registers, instruction);

        // Commit
        let previous = transition.write_back.map(|write_back| {
            self.registers
                .replace_x(write_back.dest, write_back.value)
        });
        *self.registers.pc_mut() = transition.next_pc;

        let unchanged = match (transition.write_back, previous) {
            (Some(write_back), Some(previous)) => write_back.value == previous,
            _ => true,
        };
        let retired = Retired {
            pc,
            raw_instruction,
            instruction,
            write_back: transition.write_back,
            next_pc: transition.next_pc,
            result: transition.result,
            halted: unchanged && transition.next_pc == pc,
        };

        trace!(pc = pc, raw = raw_instruction; "Retired `{instruction}`");
        if let ExecutionResult::Anomaly(anomaly) = &retired.result {
            debug!(pc = pc; "Anomaly at {pc:#010x}: {anomaly}");
        }

        retired
    }

    /// Advance one clock edge with the given reset level.
    ///
    /// Reset takes priority over execution: if `reset` is asserted, the core is reset and no
    /// instruction is executed, in which case `None` is returned.
    pub fn cycle(&mut self, reset: bool) -> Option<Retired> {
        if reset {
            self.reset();
            None
        } else {
            Some(self.step())
        }
    }
}

impl Simulatable for Core {
    type Snapshot = Registers;
    type Outcome = Retired;

    fn tick(&mut self) -> Retired {
        self.step()
    }

    fn snapshot(&self) -> Registers {
        self.registers.clone()
    }

    fn restore(&mut self, snapshot: &Registers) {
        self.registers.clone_from(snapshot);
    }
}

/// Computes the state transition `instruction` causes when executed with the state `registers`,
/// without modifying anything. The instruction is assumed to be located at `registers.pc()`.
pub fn evaluate(registers: &Registers, instruction: Instruction) -> Transition {
    Executor { registers }.execute(instruction)
}

/// The state change proposed by a single instruction: at most one register write, and the next
/// value of the PC register.
///
/// Having a single optional write-back makes it impossible for two write sources (e.g. an ALU
/// result and a jump's link address) to fire in the same cycle.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Transition {
    pub write_back: Option<WriteBack>,
    pub next_pc: u32,
    pub result: ExecutionResult,
}

/// A register write committed at the end of a cycle.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct WriteBack {
    pub dest: Specifier,
    pub value: u32,
    pub source: WriteSource,
}

impl WriteBack {
    /// Returns `None` if `dest` is `x0`, since such writes are discarded.
    pub fn new(dest: Specifier, value: u32, source: WriteSource) -> Option<Self> {
        (!dest.is_zero()).then_some(Self {
            dest,
            value,
            source,
        })
    }
}

/// Which datapath produced the value being written back.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum WriteSource {
    /// Result of the ALU (register-register and register-immediate instructions).
    Alu,
    /// The U-immediate, for `lui`.
    UpperImmediate,
    /// PC plus the U-immediate, for `auipc`.
    PcRelative,
    /// Return address of `jal` and `jalr`.
    Link,
}

/// Record of a single retired instruction.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Retired {
    /// Address the instruction was fetched from.
    pub pc: u32,
    pub raw_instruction: u32,
    pub instruction: Instruction,
    pub write_back: Option<WriteBack>,
    pub next_pc: u32,
    pub result: ExecutionResult,
    /// `true` if this step changed no state at all, so that every following step will do the
    /// same (e.g. `jal x0, 0`).
    pub halted: bool,
}

impl Retired {
    pub fn anomaly(&self) -> Option<&Anomaly> {
        match &self.result {
            ExecutionResult::Ok => None,
            ExecutionResult::Anomaly(anomaly) => Some(anomaly),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub enum ExecutionResult {
    /// Execution went normal
    #[default]
    Ok,
    /// The instruction could not be executed as encoded. The core still retired it and moved on.
    Anomaly(Anomaly),
}

/// Non-fatal problems encountered while executing a single instruction.
///
/// None of these stop the core: the PC still advances as it would for any other instruction.
#[derive(Error, Debug, Clone, Copy, Eq, PartialEq)]
pub enum Anomaly {
    /// The opcode field doesn't select any supported instruction class. Executed as a no-op.
    #[error("unsupported opcode {opcode:#07b}")]
    UnsupportedOpcode { opcode: u8 },
    /// An ALU function selector outside of the supported set. The ALU produced `0`.
    #[error("unsupported ALU function (funct7={funct7:#09b}, funct3={funct3:#05b})")]
    UnsupportedAluFunction { funct3: u8, funct7: u8 },
    /// A branch condition outside of the supported set. The branch was not taken.
    #[error("unsupported branch condition (funct3={funct3:#05b})")]
    UnsupportedBranchCondition { funct3: u8 },
    /// A decoded memory access, which needs a load/store unit that doesn't exist yet.
    #[error("{0} is not yet supported")]
    NotYetSupported(MemoryAccess),
}

/// Everything a load/store unit would need to perform a memory access.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MemoryAccess {
    Load {
        dest: Specifier,
        base: Specifier,
        offset: i32,
        funct3: u8,
        /// Effective address, `base + offset`.
        address: u32,
    },
    Store {
        src: Specifier,
        base: Specifier,
        offset: i32,
        funct3: u8,
        /// Effective address, `base + offset`.
        address: u32,
        /// Value of `src`.
        value: u32,
    },
}

impl fmt::Display for MemoryAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Load { dest, address, .. } => {
                write!(f, "load from {address:#010x} into {dest}")
            }
            Self::Store { address, value, .. } => {
                write!(f, "store of {value:#010x} to {address:#010x}")
            }
        }
    }
}
