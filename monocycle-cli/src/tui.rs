use std::{io::stdout, time::Duration};

use crossterm::{
    event::{Event, EventStream, KeyCode, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use futures::{FutureExt, StreamExt};
use log::{error, info, warn};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph},
    Frame, Terminal,
};
use monocycle_core::{
    imem::AccessError,
    registers::{Registers, Specifier},
    ExecutionResult, Instruction,
};
use tokio::{
    select, spawn,
    sync::{mpsc::UnboundedSender, watch},
    time::interval,
};
use tui_logger::{TuiLoggerWidget, TuiWidgetState};
use tui_textarea::TextArea;

use crate::{
    parse_address,
    target::{command::Command, ExecutionType, SharedTargetState, StopReason},
};

/// Sets up the terminal on creation, and resets it back when dropped.
pub struct TermSetupDropGuard {}

impl TermSetupDropGuard {
    pub fn new() -> std::io::Result<Self> {
        std::io::stdout().execute(EnterAlternateScreen)?;
        enable_raw_mode()?;
        Ok(Self {})
    }
}

impl Drop for TermSetupDropGuard {
    fn drop(&mut self) {
        // Ignore all errors on drop, resetting the terminal is on a best effort basis
        let _ = std::io::stdout().execute(LeaveAlternateScreen);
        let _ = std::io::stdout().execute(crossterm::cursor::Show);
        let _ = disable_raw_mode();
    }
}

pub struct TuiState {
    command_sender: UnboundedSender<Command>,

    shared_state: watch::Receiver<SharedTargetState>,

    log_widget: TuiWidgetState,
    prompt: TextArea<'static>,

    last_command: Option<String>,
    exit: bool,
}

enum CommandResponse {
    Registers(oneshot::Receiver<Registers>),
    Word(u32, oneshot::Receiver<Result<u32, AccessError>>),
}

impl TuiState {
    pub fn new(
        command_sender: UnboundedSender<Command>,
        shared_state: watch::Receiver<SharedTargetState>,
    ) -> Self {
        let mut prompt_widget = TextArea::default();
        prompt_widget.set_cursor_line_style(Style::default());

        Self {
            command_sender,
            shared_state,

            log_widget: TuiWidgetState::new().set_default_display_level(log::LevelFilter::Trace),
            prompt: prompt_widget,

            last_command: None,
            exit: false,
        }
    }

    /// Parses and sends a command typed in the prompt. Returns `false` if it wasn't understood.
    fn run_command(&mut self, command_str: String) -> bool {
        let mut command_str = command_str.trim();
        if command_str.is_empty() {
            if let Some(old_command) = &self.last_command {
                command_str = old_command.as_str();
            }
        }

        let mut words = command_str.split_whitespace();
        let name = words.next().unwrap_or_default();
        let argument = words.next();

        let (command, command_response) = match (name, argument) {
            ("", None) => return false,
            ("q" | "quit", None) => {
                self.exit = true;
                (Command::Exit, None)
            }
            ("p" | "pause", None) => (Command::Pause, None),
            ("c" | "continue", None) => (Command::Continue, None),
            ("s" | "step", None) => (Command::Step, None),
            ("rc" | "reverse-continue", None) => (Command::ReverseContinue, None),
            ("rs" | "reverse-step", None) => (Command::StepBack, None),
            ("reset", None) => (Command::Reset, None),
            ("regs", None) => {
                let (sender, receiver) = oneshot::channel();
                (
                    Command::ReadRegisters(sender),
                    Some(CommandResponse::Registers(receiver)),
                )
            }
            ("goto", Some(steps)) => match steps.parse() {
                Ok(steps) => (Command::GoTo(steps), None),
                Err(e) => {
                    warn!("Invalid step count {steps:?}: {e}");
                    return false;
                }
            },
            ("b" | "break", Some(addr)) => match parse_address(addr) {
                Ok(addr) => (Command::AddBreakpoint(addr), None),
                Err(e) => {
                    warn!("Invalid address {addr:?}: {e}");
                    return false;
                }
            },
            ("d" | "delete", Some(addr)) => match parse_address(addr) {
                Ok(addr) => (Command::RemoveBreakpoint(addr), None),
                Err(e) => {
                    warn!("Invalid address {addr:?}: {e}");
                    return false;
                }
            },
            ("x", Some(addr)) => match parse_address(addr) {
                Ok(addr) => {
                    let (sender, receiver) = oneshot::channel();
                    (
                        Command::ReadWord(addr, sender),
                        Some(CommandResponse::Word(addr, receiver)),
                    )
                }
                Err(e) => {
                    warn!("Invalid address {addr:?}: {e}");
                    return false;
                }
            },
            _ => {
                warn!("Unknown command {command_str:?}");
                return false;
            }
        };
        self.last_command = Some(command_str.to_owned());
        if let Err(e) = self.command_sender.send(command) {
            error!("Failed to send command: {}", e.0);
        }

        if let Some(command_response) = command_response {
            spawn(async move {
                match command_response {
                    CommandResponse::Registers(registers) => {
                        if let Ok(registers) = registers.await {
                            for r in Specifier::iter_all() {
                                info!("${}: {:#010x}", r, registers.x(r));
                            }
                            info!("$pc: {:#010x}", registers.pc());
                        }
                    }
                    CommandResponse::Word(addr, word) => match word.await {
                        Ok(Ok(word)) => {
                            info!("{addr:#010x}: {word:08x}  {}", Instruction::decode(word))
                        }
                        Ok(Err(e)) => warn!("Cannot read {addr:#010x}: {e}"),
                        Err(_) => {}
                    },
                }
            });
        }

        true
    }

    fn draw_status(state: &SharedTargetState, frame: &mut Frame, rect: Rect) {
        let ratio = match state.total_steps {
            0 => 0.0,
            total_steps => state.current_step as f64 / total_steps as f64,
        }
        .clamp(0.0, 1.0);

        let running_state_name = match state.state {
            Some(ExecutionType::Step) => "Step",
            Some(ExecutionType::StepBack) => "Step Back",
            Some(ExecutionType::Continue) => "Running",
            Some(ExecutionType::ReverseContinue) => "Running Back",
            None => "Stopped",
        };

        let state_block = Block::bordered().title("State");

        let [running_state_area, current_step_area, bar_area, total_steps_area] =
            Layout::horizontal([
                Constraint::Length(12),
                Constraint::Length(9),
                Constraint::Fill(1),
                Constraint::Length(9),
            ])
            .spacing(1)
            .areas(state_block.inner(rect));

        let state_bar = Gauge::default()
            .gauge_style(Style::default().fg(Color::Blue))
            .label("")
            .use_unicode(true)
            .ratio(ratio);

        let running_state = Span::raw(running_state_name);
        let current_step = Span::styled(
            state.current_step.to_string(),
            Style::default().fg(Color::Blue),
        );
        let total_steps = Span::raw(state.total_steps.to_string());

        frame.render_widget(state_block, rect);
        frame.render_widget(running_state, running_state_area);

        frame.render_widget(current_step, current_step_area);
        frame.render_widget(state_bar, bar_area);
        frame.render_widget(total_steps, total_steps_area);
    }

    fn draw_core(state: &SharedTargetState, frame: &mut Frame, rect: Rect) {
        let core_block = Block::bordered().title("Core");
        let [summary_area, registers_area] =
            Layout::vertical([Constraint::Length(3), Constraint::Fill(1)])
                .areas(core_block.inner(rect));

        let label_style = Style::default().fg(Color::Blue);
        let result = match &state.last_result {
            None => Span::raw("-"),
            Some(ExecutionResult::Ok) => Span::styled("ok", Style::default().fg(Color::Green)),
            Some(ExecutionResult::Anomaly(anomaly)) => {
                Span::styled(anomaly.to_string(), Style::default().fg(Color::Yellow))
            }
        };
        let summary = Paragraph::new(vec![
            Line::from(vec![
                Span::styled("pc    ", label_style),
                Span::raw(format!("{:#010x}", state.registers.pc())),
            ]),
            Line::from(vec![
                Span::styled("next  ", label_style),
                Span::raw(state.next_instruction.to_string()),
            ]),
            Line::from(vec![
                Span::styled("last  ", label_style),
                result,
                Span::raw(match state.last_stop {
                    Some(StopReason::Halted) => "  (halted)",
                    Some(StopReason::Break) => "  (breakpoint)",
                    _ => "",
                }),
            ]),
        ]);

        // x0..x31 in four columns of eight registers each
        let columns: [Rect; 4] = Layout::horizontal([Constraint::Fill(1); 4]).areas(registers_area);
        for (column, area) in columns.into_iter().enumerate() {
            let lines: Vec<Line> = (column * 8..column * 8 + 8)
                .filter_map(Specifier::new)
                .map(|r| {
                    Line::from(vec![
                        Span::styled(format!("{:>4} ", r.to_string()), label_style),
                        Span::raw(format!("{:08x}", state.registers.x(r))),
                    ])
                })
                .collect();
            frame.render_widget(Paragraph::new(lines), area);
        }

        frame.render_widget(core_block, rect);
        frame.render_widget(summary, summary_area);
    }

    fn draw(&mut self, frame: &mut Frame) {
        let shared_state = self.shared_state.borrow_and_update();

        let [app_area, log_area] =
            Layout::horizontal(Constraint::from_percentages([60, 40])).areas(frame.size());

        let [status_area, core_area, prompt_area] = Layout::vertical([
            Constraint::Length(3),
            Constraint::Fill(1),
            Constraint::Length(3),
        ])
        .areas(app_area);

        Self::draw_status(&shared_state, frame, status_area);
        Self::draw_core(&shared_state, frame, core_area);

        self.prompt.set_block(
            Block::new()
                .borders(Borders::ALL)
                .title("Command")
                .border_style(Style::default().fg(Color::Green)),
        );

        let log = TuiLoggerWidget::default()
            .output_separator('|')
            .output_timestamp(None)
            .output_level(None)
            .output_target(false)
            .output_file(false)
            .output_line(false)
            .style_error(Style::default().fg(Color::Red))
            .style_debug(Style::default().fg(Color::Green))
            .style_warn(Style::default().fg(Color::Yellow))
            .style_trace(Style::default().fg(Color::Magenta))
            .style_info(Style::default().fg(Color::Cyan))
            .block(Block::new().borders(Borders::ALL).title("Log"))
            .state(&self.log_widget);

        frame.render_widget(self.prompt.widget(), prompt_area);
        frame.render_widget(log, log_area)
    }

    fn handle_event(&mut self, event: Event) {
        log::trace!("Got cli event: {event:?}");
        if let Event::Key(k) = event {
            match &k.code {
                KeyCode::Char('c') if k.modifiers.contains(KeyModifiers::CONTROL) => {
                    info!("Pausing simulation, use `quit` to exit");
                    let _ = self.command_sender.send(Command::Pause);
                }
                KeyCode::Char(_) | KeyCode::Backspace => {
                    self.prompt.input(event);
                }
                KeyCode::Enter => {
                    let command = self.prompt.lines()[0].to_owned();
                    if self.run_command(command) {
                        self.prompt.move_cursor(tui_textarea::CursorMove::End);
                        self.prompt.delete_line_by_head();
                    }
                }
                _ => {}
            }
        }
    }

    /// Will block until the user exits
    pub async fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> std::io::Result<()> {
        let mut event_stream = EventStream::new();
        let mut interval = interval(Duration::from_secs_f32(1.0 / 60.0));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        while !self.exit {
            terminal.draw(|frame| self.draw(frame))?;

            let event = event_stream.next().fuse();
            select! {
                event = event => match event {
                    Some(Ok(event)) => self.handle_event(event),
                    Some(Err(e)) => {
                        error!("Failed to read from keyboard: {e}");
                        break;
                    }
                    None => {
                        error!("Event stream closed unexpectedly");
                        break;
                    }
                },
                _ = interval.tick() => {
                    // update every 1 / 60 seconds
                }
            }
        }
        let _ = self.command_sender.send(Command::Exit);
        Ok(())
    }
}

pub async fn run_tui(
    command_sender: UnboundedSender<Command>,
    shared_state_receiver: watch::Receiver<SharedTargetState>,
) -> std::io::Result<()> {
    let _guard = TermSetupDropGuard::new()?;
    let mut tui = TuiState::new(command_sender, shared_state_receiver);
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    tui.run(&mut terminal).await
}
