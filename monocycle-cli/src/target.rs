pub mod command;

use std::collections::HashSet;

use log::{debug, info, trace};
use monocycle_core::{registers::Registers, simulator::Replayed, ExecutionResult, Instruction};
use tokio::sync::{
    mpsc::{error::TryRecvError, UnboundedReceiver},
    watch,
};

use crate::Simulator;
use command::Command;

/// Number of steps executed between two checks for incoming commands.
const BATCH_STEPS: usize = 1024;

/// Running backwards replays history, which makes every step considerably more expensive.
const REVERSE_BATCH_STEPS: usize = 64;

/// Why execution stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    DoneStep,
    Halted,
    Break,
    ReachedStart,
    Pause,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionType {
    Step,
    StepBack,
    Continue,
    ReverseContinue,
}

/// Snapshot of the target, published for the user interface after every change.
#[derive(Debug, Clone)]
pub struct SharedTargetState {
    pub state: Option<ExecutionType>,
    pub current_step: usize,
    pub total_steps: usize,
    pub registers: Registers,
    /// The instruction at the current PC, which the next step will execute.
    pub next_instruction: Instruction,
    /// Result of the instruction retired by the last step forward, if that step executed one.
    pub last_result: Option<ExecutionResult>,
    pub last_stop: Option<StopReason>,
}

impl SharedTargetState {
    pub fn new(simulator: &Simulator) -> Self {
        let core = simulator.inspect();
        Self {
            state: None,
            current_step: simulator.current_steps(),
            total_steps: simulator.available_steps(),
            registers: core.registers().clone(),
            next_instruction: core.next_instruction(),
            last_result: None,
            last_stop: None,
        }
    }
}

/// Owns the simulator and executes the commands sent by the user interface.
///
/// It is meant to run on a thread of its own, see [`SimTarget::run`].
pub struct SimTarget {
    simulator: Simulator,
    breakpoints: HashSet<u32>,
    execution: Option<ExecutionType>,
    last_result: Option<ExecutionResult>,
    last_stop: Option<StopReason>,

    command_receiver: UnboundedReceiver<Command>,
    shared_state: watch::Sender<SharedTargetState>,
}

impl SimTarget {
    pub fn new(
        simulator: Simulator,
        command_receiver: UnboundedReceiver<Command>,
        shared_state: watch::Sender<SharedTargetState>,
    ) -> Self {
        Self {
            simulator,
            breakpoints: HashSet::new(),
            execution: None,
            last_result: None,
            last_stop: None,
            command_receiver,
            shared_state,
        }
    }

    /// Handles commands until [`Command::Exit`] is received or all senders are dropped.
    ///
    /// Blocks the current thread, so this must not be called from an async context.
    pub fn run(mut self) {
        debug!("Simulation thread started");
        loop {
            let command = match self.execution {
                // Nothing to do until told otherwise
                None => match self.command_receiver.blocking_recv() {
                    Some(command) => Some(command),
                    None => break,
                },
                Some(_) => match self.command_receiver.try_recv() {
                    Ok(command) => Some(command),
                    Err(TryRecvError::Empty) => None,
                    Err(TryRecvError::Disconnected) => break,
                },
            };

            if !self.process(command) {
                break;
            }
        }
        debug!("Simulation thread stopped");
    }

    /// Handles `command` if there is one, runs one batch of the current execution and publishes
    /// the resulting state. Returns `false` if the target should shut down.
    fn process(&mut self, command: Option<Command>) -> bool {
        if let Some(command) = command {
            trace!("Handling command {command}");
            if !self.handle_command(command) {
                return false;
            }
        }

        if let Some(execution) = self.execution {
            self.execute(execution);
        }

        self.publish_state();
        true
    }

    /// Returns `false` if the target should shut down.
    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Exit => return false,
            Command::Pause => self.stop(StopReason::Pause),
            Command::Continue => self.execution = Some(ExecutionType::Continue),
            Command::ReverseContinue => self.execution = Some(ExecutionType::ReverseContinue),
            Command::Step => self.execution = Some(ExecutionType::Step),
            Command::StepBack => self.execution = Some(ExecutionType::StepBack),
            Command::RemoveBreakpoint(addr) => {
                if self.breakpoints.remove(&addr) {
                    info!("Removed breakpoint at {addr:#010x}");
                }
            }
            Command::AddBreakpoint(addr) => {
                if self.breakpoints.insert(addr) {
                    info!("Added breakpoint at {addr:#010x}");
                }
            }
            Command::ReadRegisters(sender) => {
                let _ = sender.send(self.simulator.inspect().registers().clone());
            }
            Command::ReadWord(addr, sender) => {
                let mut bytes = [0; 4];
                let result = self
                    .simulator
                    .simulatable()
                    .instruction_memory()
                    .read_bytes(addr, &mut bytes)
                    .map(|_| u32::from_le_bytes(bytes));
                let _ = sender.send(result);
            }
            Command::Reset => {
                self.simulator.step_with("reset core", |core| core.reset());
                self.last_result = None;
                info!("Core reset");
            }
            Command::GoTo(steps) => {
                self.simulator.go_to(steps);
                self.last_result = None;
            }
        }
        true
    }

    fn execute(&mut self, execution: ExecutionType) {
        match execution {
            ExecutionType::Step => {
                let reason = self.step().unwrap_or(StopReason::DoneStep);
                self.stop(reason);
            }
            ExecutionType::StepBack => {
                let reason = self.step_back().unwrap_or(StopReason::DoneStep);
                self.stop(reason);
            }
            ExecutionType::Continue => {
                for _ in 0..BATCH_STEPS {
                    if let Some(reason) = self.step() {
                        self.stop(reason);
                        break;
                    }
                }
            }
            ExecutionType::ReverseContinue => {
                for _ in 0..REVERSE_BATCH_STEPS {
                    if let Some(reason) = self.step_back() {
                        self.stop(reason);
                        break;
                    }
                }
            }
        }
    }

    fn pc(&self) -> u32 {
        self.simulator.inspect().registers().pc()
    }

    /// Steps forward, redoing previously undone steps before simulating new ones.
    fn step(&mut self) -> Option<StopReason> {
        let halted = match self.simulator.redo_step() {
            Some(Replayed::Tick(retired)) => {
                self.last_result = Some(retired.result);
                retired.halted
            }
            Some(Replayed::Custom(name)) => {
                debug!("Redid \"{name}\"");
                self.last_result = None;
                false
            }
            None => {
                let retired = self.simulator.step();
                self.last_result = Some(retired.result);
                retired.halted
            }
        };

        if self.breakpoints.contains(&self.pc()) {
            return Some(StopReason::Break);
        }
        if halted {
            return Some(StopReason::Halted);
        }
        None
    }

    fn step_back(&mut self) -> Option<StopReason> {
        if !self.simulator.undo_step() {
            return Some(StopReason::ReachedStart);
        }
        self.last_result = None;

        if self.breakpoints.contains(&self.pc()) {
            return Some(StopReason::Break);
        }
        None
    }

    fn stop(&mut self, reason: StopReason) {
        self.execution = None;
        self.last_stop = Some(reason);
        match reason {
            StopReason::DoneStep => {}
            StopReason::Halted => info!("Core halted at {:#010x}", self.pc()),
            StopReason::Break => info!("Hit breakpoint at {:#010x}", self.pc()),
            StopReason::ReachedStart => info!("Reached the start of history"),
            StopReason::Pause => info!("Paused at {:#010x}", self.pc()),
        }
    }

    fn publish_state(&self) {
        let core = self.simulator.inspect();
        self.shared_state.send_replace(SharedTargetState {
            state: self.execution,
            current_step: self.simulator.current_steps(),
            total_steps: self.simulator.available_steps(),
            registers: core.registers().clone(),
            next_instruction: core.next_instruction(),
            last_result: self.last_result,
            last_stop: self.last_stop,
        });
    }
}
