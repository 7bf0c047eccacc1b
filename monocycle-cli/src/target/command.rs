use monocycle_core::{imem::AccessError, registers::Registers};

pub enum Command {
    // Close the program
    Exit,
    // Pause execution
    Pause,
    Continue,
    ReverseContinue,
    Step,
    StepBack,
    RemoveBreakpoint(u32),
    AddBreakpoint(u32),
    ReadRegisters(oneshot::Sender<Registers>),
    // Little-endian word at a byte address of instruction memory
    ReadWord(u32, oneshot::Sender<Result<u32, AccessError>>),
    Reset,
    GoTo(usize),
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Exit => write!(f, "Exit"),
            Command::Pause => write!(f, "Stop"),
            Command::Continue => write!(f, "Continue"),
            Command::ReverseContinue => write!(f, "ReverseContinue"),
            Command::Step => write!(f, "Step"),
            Command::StepBack => write!(f, "ReverseStep"),
            Command::RemoveBreakpoint(addr) => write!(f, "RemoveBreakpoint({addr:#x})"),
            Command::AddBreakpoint(addr) => write!(f, "AddBreakpoint({addr:#x})"),
            Command::ReadRegisters(_) => write!(f, "ReadRegisters"),
            Command::ReadWord(addr, _) => write!(f, "ReadWord({addr:#x})"),
            Command::Reset => write!(f, "Reset"),
            Command::GoTo(steps) => write!(f, "GoTo({steps})"),
        }
    }
}
