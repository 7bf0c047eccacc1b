use std::io;
use std::num::ParseIntError;

use clap::{Parser, ValueEnum};
use log::{debug, error, info, warn, LevelFilter};
use monocycle_core::{Config, Core, InstructionMemory};
use tokio::sync::{mpsc, watch};

mod target;
mod tui;

use target::{SharedTargetState, SimTarget};

type Simulator = monocycle_core::simulator::Simulator<Core>;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Format of the program image.
    #[arg(short, long, value_enum, default_value_t = Format::Elf)]
    format: Format,
    /// Address the PC is set to on reset.
    #[arg(short, long, value_parser = parse_address)]
    reset_vector: Option<u32>,
    /// Also zero all registers on reset, instead of only the PC.
    #[arg(long)]
    clear_registers_on_reset: bool,
    /// Program to execute.
    binary: String,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    /// ELF executable, loaded section by section.
    Elf,
    /// Raw little-endian image, loaded at address 0.
    Bin,
    /// Text file with one hexadecimal instruction word per line.
    Hex,
}

/// Parses an address given either in hexadecimal (with a `0x` prefix) or in decimal.
pub fn parse_address(s: &str) -> Result<u32, ParseIntError> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(&hex.replace('_', ""), 16),
        None => s.parse(),
    }
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let args = Args::parse();

    tui_logger::init_logger(LevelFilter::Trace).map_err(io::Error::other)?;
    tui_logger::set_default_level(LevelFilter::Info);
    tui_logger::set_level_for_target("monocycle_core", LevelFilter::Debug);

    let buf = std::fs::read(&args.binary)?;
    let instruction_memory = match args.format {
        Format::Elf => load_elf(&buf)?,
        Format::Bin => InstructionMemory::from_le_bytes(&buf).map_err(io::Error::other)?,
        Format::Hex => {
            let text = String::from_utf8(buf).map_err(io::Error::other)?;
            InstructionMemory::from_hex(&text).map_err(io::Error::other)?
        }
    };

    let config = config(&args);
    info!("Loaded {}, starting at {:#010x}", args.binary, config.reset_vector);
    let simulator = Simulator::new(Core::new(instruction_memory, config));

    let (command_sender, command_receiver) = mpsc::unbounded_channel();
    let (state_sender, state_receiver) = watch::channel(SharedTargetState::new(&simulator));

    let target = SimTarget::new(simulator, command_receiver, state_sender);
    let target_thread = std::thread::spawn(move || target.run());

    let result = tui::run_tui(command_sender, state_receiver).await;

    if target_thread.join().is_err() {
        error!("Simulation thread panicked");
    }
    result
}

/// The core always starts executing at the reset vector, no matter what the program image says.
fn config(args: &Args) -> Config {
    Config {
        reset_vector: args.reset_vector.unwrap_or_default(),
        clear_registers_on_reset: args.clear_registers_on_reset,
    }
}

/// Loads the in-memory sections of an ELF file.
///
/// The entry point is not used, execution starts at the reset vector instead.
fn load_elf(program_elf: &[u8]) -> io::Result<InstructionMemory> {
    let elf_header = goblin::elf::Elf::parse(program_elf).map_err(io::Error::other)?;
    if elf_header.entry != 0 {
        warn!(
            "Ignoring ELF entry point {:#010x}, execution starts at the reset vector",
            elf_header.entry
        );
    }

    let mut memory = InstructionMemory::new();

    // copy all in-memory sections from the ELF file into instruction memory
    let sections = elf_header
        .section_headers
        .iter()
        .filter(|h| h.is_alloc() && h.sh_type != goblin::elf::section_header::SHT_NOBITS);

    for h in sections {
        debug!(
            "loading section {:?} into memory from [{:#010x?}..{:#010x?}]",
            elf_header.shdr_strtab.get_at(h.sh_name).unwrap_or("?"),
            h.sh_addr,
            h.sh_addr + h.sh_size,
        );

        let Some(bytes) = h.file_range().and_then(|range| program_elf.get(range)) else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "section lies outside of the file",
            ));
        };
        memory
            .load(h.sh_addr as u32, bytes)
            .map_err(io::Error::other)?;
    }

    Ok(memory)
}
