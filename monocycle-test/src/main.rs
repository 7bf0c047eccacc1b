use clap::{Parser, ValueEnum};
use goblin::elf::program_header::PT_LOAD;
use log::{debug, info, warn};
use monocycle_core::registers::Specifier;
use monocycle_core::{Config, Core, InstructionMemory};
use std::fs::File;
use std::io::{self, Write};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Format of the program image
    #[arg(short, long, value_enum, default_value_t = Format::Elf)]
    format: Format,
    /// Stop after this many cycles if the core hasn't halted by then
    #[arg(long, default_value_t = 1_000_000)]
    max_cycles: u64,
    /// Signature file to output the final register state to
    #[arg(long, short)]
    signature: Option<String>,
    /// Fail if any instruction couldn't be executed as encoded
    #[arg(long)]
    deny_anomalies: bool,
    /// Increase logging verbosity (-v, -vv, ...)
    #[arg(short, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Program to run
    program: String,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Elf,
    Bin,
    Hex,
}

/// Outcome of a headless run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Summary {
    cycles: u64,
    halted: bool,
    anomalies: u64,
}

fn main() -> io::Result<ExitCode> {
    let args = Args::parse();

    stderrlog::new()
        .verbosity(args.verbose as usize + 1)
        .modules([module_path!(), "monocycle_core"])
        .init()
        .map_err(io::Error::other)?;

    let buf = std::fs::read(&args.program)?;
    let memory = load(args.format, buf)?;
    // Execution always starts at address 0
    let mut core = Core::new(memory, Config::default());

    let summary = run(&mut core, args.max_cycles);
    println!(
        "cycles: {}, halted: {}, anomalies: {}",
        summary.cycles, summary.halted, summary.anomalies
    );
    if !summary.halted {
        warn!("Core did not halt within {} cycles", args.max_cycles);
    }

    if let Some(path) = args.signature {
        let mut file = File::create(path)?;
        write_signature(&mut file, &core)?;
    }

    if args.deny_anomalies && summary.anomalies > 0 {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn load(format: Format, buf: Vec<u8>) -> io::Result<InstructionMemory> {
    match format {
        Format::Elf => load_elf(&buf),
        Format::Bin => InstructionMemory::from_le_bytes(&buf).map_err(io::Error::other),
        Format::Hex => {
            let text = String::from_utf8(buf).map_err(io::Error::other)?;
            InstructionMemory::from_hex(&text).map_err(io::Error::other)
        }
    }
}

/// Loads all `PT_LOAD` segments at their physical address. The entry point is ignored.
fn load_elf(buf: &[u8]) -> io::Result<InstructionMemory> {
    let elf_header = goblin::elf::Elf::parse(buf).map_err(io::Error::other)?;
    if elf_header.entry != 0 {
        warn!(
            "Ignoring ELF entry point {:#010x}, execution starts at 0",
            elf_header.entry
        );
    }

    let segments = elf_header
        .program_headers
        .iter()
        .filter(|h| h.p_type == PT_LOAD);

    let mut memory = InstructionMemory::new();
    for h in segments {
        debug!(
            "loading segment at {:#010x} ({} bytes)",
            h.p_paddr, h.p_filesz
        );
        let bytes = buf.get(h.file_range()).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "segment lies outside of the file")
        })?;
        memory
            .load(h.p_paddr as u32, bytes)
            .map_err(io::Error::other)?;
    }

    Ok(memory)
}

/// Steps `core` until it halts, or until `max_cycles` cycles have passed.
fn run(core: &mut Core, max_cycles: u64) -> Summary {
    let mut summary = Summary::default();
    while summary.cycles < max_cycles {
        let retired = core.step();
        summary.cycles += 1;
        if let Some(anomaly) = retired.anomaly() {
            summary.anomalies += 1;
            info!("{:#010x}: `{}`: {anomaly}", retired.pc, retired.instruction);
        }
        if retired.halted {
            summary.halted = true;
            break;
        }
    }
    summary
}

/// Writes `x0` up to `x31`, followed by the PC, as one 8-digit hex word per line.
fn write_signature(out: &mut impl Write, core: &Core) -> io::Result<()> {
    let registers = core.registers();
    for r in Specifier::iter_all() {
        writeln!(out, "{:08x}", registers.x(r))?;
    }
    writeln!(out, "{:08x}", registers.pc())
}

#[cfg(test)]
mod tests {
    use super::*;

    // addi x1, x0, 5; addi x2, x1, -1; ecall; jal x0, 0
    const PROGRAM: [u32; 4] = [0x0050_0093, 0xFFF0_8113, 0x0000_0073, 0x0000_006F];

    fn core() -> Core {
        Core::new(
            InstructionMemory::from_words(&PROGRAM).unwrap(),
            Config::default(),
        )
    }

    #[test]
    fn test_run_until_halt() {
        let mut core = core();
        let summary = run(&mut core, 100);
        assert_eq!(
            Summary {
                cycles: 4,
                halted: true,
                anomalies: 1
            },
            summary
        );
        assert_eq!(0xC, core.registers().pc());
    }

    #[test]
    fn test_cycle_limit() {
        let mut core = core();
        let summary = run(&mut core, 2);
        assert_eq!(2, summary.cycles);
        assert!(!summary.halted);
        assert_eq!(0, summary.anomalies);
    }

    /// Builds a little-endian ELF32 RISC-V executable with a single `PT_LOAD` segment holding
    /// `program` at address 0.
    fn elf_with_entry(entry: u32, program: &[u32]) -> Vec<u8> {
        const EHSIZE: u16 = 52;
        const PHENTSIZE: u16 = 32;
        let code_offset = (EHSIZE + PHENTSIZE) as u32;
        let code_size = (program.len() * 4) as u32;

        let mut elf = vec![0x7F, b'E', b'L', b'F', 1, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        elf.extend_from_slice(&2u16.to_le_bytes()); // e_type: EXEC
        elf.extend_from_slice(&0xF3u16.to_le_bytes()); // e_machine: RISC-V
        elf.extend_from_slice(&1u32.to_le_bytes()); // e_version
        elf.extend_from_slice(&entry.to_le_bytes());
        elf.extend_from_slice(&(EHSIZE as u32).to_le_bytes()); // e_phoff
        elf.extend_from_slice(&0u32.to_le_bytes()); // e_shoff
        elf.extend_from_slice(&0u32.to_le_bytes()); // e_flags
        elf.extend_from_slice(&EHSIZE.to_le_bytes());
        elf.extend_from_slice(&PHENTSIZE.to_le_bytes());
        elf.extend_from_slice(&1u16.to_le_bytes()); // e_phnum
        elf.extend_from_slice(&40u16.to_le_bytes()); // e_shentsize
        elf.extend_from_slice(&0u16.to_le_bytes()); // e_shnum
        elf.extend_from_slice(&0u16.to_le_bytes()); // e_shstrndx

        for field in [PT_LOAD, code_offset, 0, 0, code_size, code_size, 0b101, 4] {
            elf.extend_from_slice(&field.to_le_bytes());
        }
        for word in program {
            elf.extend_from_slice(&word.to_le_bytes());
        }
        elf
    }

    #[test]
    fn test_elf_entry_point_is_ignored() {
        // addi x1, x0, 10; jal x0, 0; jal x0, 0
        let elf = elf_with_entry(8, &[0x00A0_0093, 0x0000_006F, 0x0000_006F]);
        let memory = load(Format::Elf, elf).unwrap();
        assert_eq!(0x00A0_0093, memory.fetch(0));

        let mut core = Core::new(memory, Config::default());
        assert_eq!(0, core.registers().pc());
        let summary = run(&mut core, 100);
        assert!(summary.halted);
        assert_eq!(2, summary.cycles);
        assert_eq!(10, core.registers().x(Specifier::from_u5(1)));
        assert_eq!(4, core.registers().pc());
    }

    #[test]
    fn test_signature() {
        let mut core = core();
        run(&mut core, 100);
        let mut out = Vec::new();
        write_signature(&mut out, &core).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(33, lines.len());
        assert_eq!("00000000", lines[0]);
        assert_eq!("00000005", lines[1]);
        assert_eq!("00000004", lines[2]);
        assert_eq!("0000000c", lines[32]);
    }
}
