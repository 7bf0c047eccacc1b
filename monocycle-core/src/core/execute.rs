use crate::alu::{self, AluOp};
use crate::branch::{self, BranchCondition};
use crate::core::{Anomaly, ExecutionResult, MemoryAccess, Transition, WriteBack, WriteSource};
use crate::instruction::Instruction;
use crate::registers::{Registers, Specifier};

/// Evaluates instructions against a snapshot of the registers.
///
/// The executor only ever reads: every method returns the [`Transition`] the instruction proposes,
/// which the core commits afterwards. Hence all operands are read before any write of the same
/// cycle happens.
#[derive(Debug)]
pub(super) struct Executor<'r> {
    pub registers: &'r Registers,
}

impl<'r> Executor<'r> {
    pub fn execute(&self, instruction: Instruction) -> Transition {
        match instruction {
            Instruction::Op {
                dest,
                src1,
                src2,
                funct3,
                funct7,
            } => self.op(dest, src1, src2, funct3, funct7),
            Instruction::OpImm {
                dest,
                src,
                funct3,
                immediate,
            } => self.op_imm(dest, src, funct3, immediate),
            Instruction::Load {
                dest,
                base,
                funct3,
                offset,
            } => self.load(dest, base, funct3, offset),
            Instruction::Store {
                src,
                base,
                funct3,
                offset,
            } => self.store(src, base, funct3, offset),
            Instruction::Lui { dest, immediate } => self.lui(dest, immediate),
            Instruction::Auipc { dest, immediate } => self.auipc(dest, immediate),
            Instruction::Branch {
                src1,
                src2,
                funct3,
                offset,
            } => self.branch(src1, src2, funct3, offset),
            Instruction::Jal { dest, offset } => self.jal(dest, offset),
            Instruction::Jalr { dest, base, offset } => self.jalr(dest, base, offset),
            Instruction::Unsupported { opcode } => {
                self.fall_through(None, Some(Anomaly::UnsupportedOpcode { opcode }))
            }
        }
    }

    /// Executes a register-register ALU instruction.
    ///
    /// A `(funct7, funct3)` pair that doesn't select an operation still writes back, with the ALU
    /// producing `0`.
    pub fn op(
        &self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
        funct3: u8,
        funct7: u8,
    ) -> Transition {
        let op = AluOp::from_register_funct(funct7, funct3);
        let anomaly = match op {
            Some(_) => None,
            None => Some(Anomaly::UnsupportedAluFunction { funct3, funct7 }),
        };
        self.alu_op(dest, src1, self.registers.x(src2), op, anomaly)
    }

    /// Executes a register-immediate ALU instruction.
    pub fn op_imm(&self, dest: Specifier, src: Specifier, funct3: u8, immediate: i32) -> Transition {
        let op = AluOp::from_immediate_funct(funct3);
        self.alu_op(dest, src, immediate as u32, Some(op), None)
    }

    /// Executes a `lui` instruction.
    ///
    /// The U-immediate already has its lowest 12 bits cleared, and is written as is.
    pub fn lui(&self, dest: Specifier, immediate: i32) -> Transition {
        let write_back = WriteBack::new(dest, immediate as u32, WriteSource::UpperImmediate);
        self.fall_through(write_back, None)
    }

    /// Executes an `auipc` instruction, adding the U-immediate to the address of the instruction.
    pub fn auipc(&self, dest: Specifier, immediate: i32) -> Transition {
        let result = self.pc().wrapping_add_signed(immediate);
        let write_back = WriteBack::new(dest, result, WriteSource::PcRelative);
        self.fall_through(write_back, None)
    }

    pub fn jal(&self, dest: Specifier, offset: i32) -> Transition {
        self.jump_op(dest, self.pc().wrapping_add_signed(offset))
    }

    /// The target is `base + offset` with the lowest bit cleared.
    pub fn jalr(&self, dest: Specifier, base: Specifier, offset: i32) -> Transition {
        self.jump_op(dest, self.registers.x(base).wrapping_add_signed(offset) & !1)
    }

    pub fn branch(&self, src1: Specifier, src2: Specifier, funct3: u8, offset: i32) -> Transition {
        let condition = BranchCondition::from_funct3(funct3);
        let taken = branch::resolve(condition, self.registers.x(src1), self.registers.x(src2));
        let anomaly = match condition {
            Some(_) => None,
            None => Some(Anomaly::UnsupportedBranchCondition { funct3 }),
        };
        if taken {
            Transition {
                write_back: None,
                next_pc: self.pc().wrapping_add_signed(offset),
                result: ExecutionResult::Ok,
            }
        } else {
            self.fall_through(None, anomaly)
        }
    }

    /// Loads have no data memory to read from. The access is reported instead, and `dest` is left
    /// untouched.
    pub fn load(&self, dest: Specifier, base: Specifier, funct3: u8, offset: i32) -> Transition {
        let access = MemoryAccess::Load {
            dest,
            base,
            offset,
            funct3,
            address: self.effective_address(base, offset),
        };
        self.fall_through(None, Some(Anomaly::NotYetSupported(access)))
    }

    /// Stores have no data memory to write to. The access is reported instead.
    pub fn store(&self, src: Specifier, base: Specifier, funct3: u8, offset: i32) -> Transition {
        let access = MemoryAccess::Store {
            src,
            base,
            offset,
            funct3,
            address: self.effective_address(base, offset),
            value: self.registers.x(src),
        };
        self.fall_through(None, Some(Anomaly::NotYetSupported(access)))
    }

    fn pc(&self) -> u32 {
        self.registers.pc()
    }

    fn effective_address(&self, base: Specifier, offset: i32) -> u32 {
        self.registers.x(base).wrapping_add_signed(offset)
    }

    #[inline]
    fn alu_op(
        &self,
        dest: Specifier,
        src1: Specifier,
        operand2: u32,
        op: Option<AluOp>,
        anomaly: Option<Anomaly>,
    ) -> Transition {
        let result = alu::execute(op, self.registers.x(src1), operand2);
        self.fall_through(WriteBack::new(dest, result, WriteSource::Alu), anomaly)
    }

    fn jump_op(&self, dest: Specifier, target: u32) -> Transition {
        // Link to the instruction following the jump
        let link = self.pc().wrapping_add(4);
        Transition {
            write_back: WriteBack::new(dest, link, WriteSource::Link),
            next_pc: target,
            result: ExecutionResult::Ok,
        }
    }

    /// Continues with the next instruction in memory.
    fn fall_through(&self, write_back: Option<WriteBack>, anomaly: Option<Anomaly>) -> Transition {
        Transition {
            write_back,
            next_pc: self.pc().wrapping_add(4),
            result: anomaly.map_or(ExecutionResult::Ok, ExecutionResult::Anomaly),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm;

    fn x(index: u8) -> Specifier {
        Specifier::from_u5(index)
    }

    fn execute(registers: &Registers, raw_instruction: u32) -> Transition {
        Executor { registers }.execute(Instruction::decode(raw_instruction))
    }

    #[test]
    fn test_write_to_x0_is_dropped() {
        let registers = Registers::new(0x10);
        let transition = execute(&registers, asm::addi(0, 0, 5));
        assert_eq!(None, transition.write_back);
        assert_eq!(0x14, transition.next_pc);
        let transition = execute(&registers, asm::jal(0, -16));
        assert_eq!(None, transition.write_back);
        assert_eq!(0, transition.next_pc);
    }

    #[test]
    fn test_jalr_reads_base_before_link() {
        let mut registers = Registers::new(0x20);
        registers.set_x(x(1), 0x41);
        let transition = execute(&registers, asm::jalr(1, 1, 4));
        assert_eq!(0x44, transition.next_pc);
        assert_eq!(
            WriteBack::new(x(1), 0x24, WriteSource::Link),
            transition.write_back
        );
    }

    #[test]
    fn test_unsupported_register_function() {
        let mut registers = Registers::default();
        registers.set_x(x(1), 6);
        registers.set_x(x(2), 7);
        // mul x3, x1, x2
        let transition = execute(&registers, asm::r_type(asm::OP, 3, 0b000, 1, 2, 0b0000001));
        assert_eq!(WriteBack::new(x(3), 0, WriteSource::Alu), transition.write_back);
        assert_eq!(4, transition.next_pc);
        assert_eq!(
            ExecutionResult::Anomaly(Anomaly::UnsupportedAluFunction {
                funct3: 0,
                funct7: 1
            }),
            transition.result
        );
    }

    #[test]
    fn test_unsupported_branch_condition() {
        let registers = Registers::default();
        // bltu x0, x1, 8 would be taken if it were supported
        let transition = execute(&registers, asm::b_type(asm::BRANCH, 0b110, 0, 1, 8));
        assert_eq!(4, transition.next_pc);
        assert_eq!(
            ExecutionResult::Anomaly(Anomaly::UnsupportedBranchCondition { funct3: 0b110 }),
            transition.result
        );
    }

    #[test]
    fn test_memory_access_is_reported() {
        let mut registers = Registers::new(8);
        registers.set_x(x(2), 0x100);
        registers.set_x(x(5), 0xCAFE);

        let transition = execute(&registers, asm::lw(5, 2, -8));
        assert_eq!(None, transition.write_back);
        assert_eq!(12, transition.next_pc);
        assert_eq!(
            ExecutionResult::Anomaly(Anomaly::NotYetSupported(MemoryAccess::Load {
                dest: x(5),
                base: x(2),
                offset: -8,
                funct3: 0b010,
                address: 0xF8,
            })),
            transition.result
        );

        let transition = execute(&registers, asm::sw(5, 2, 4));
        assert_eq!(None, transition.write_back);
        assert_eq!(
            ExecutionResult::Anomaly(Anomaly::NotYetSupported(MemoryAccess::Store {
                src: x(5),
                base: x(2),
                offset: 4,
                funct3: 0b010,
                address: 0x104,
                value: 0xCAFE,
            })),
            transition.result
        );
    }

    #[test]
    fn test_upper_immediates() {
        let registers = Registers::new(0x100);
        let transition = execute(&registers, asm::lui(4, 0x1234_5000));
        assert_eq!(
            WriteBack::new(x(4), 0x1234_5000, WriteSource::UpperImmediate),
            transition.write_back
        );
        let transition = execute(&registers, asm::auipc(4, -4096));
        assert_eq!(
            WriteBack::new(x(4), 0x100_u32.wrapping_sub(4096), WriteSource::PcRelative),
            transition.write_back
        );
        assert_eq!(0x104, transition.next_pc);
    }
}
