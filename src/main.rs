//! CLI front-end: loads a raw binary image into the emulator, wires up the
//! BBC Micro OS-call traps against stdio/host-filesystem adapters, and
//! either runs it or disassembles it, per SPEC_FULL.md's "(ambient)
//! Configuration" section.

use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use ansi_term::Colour;
use clap::Parser;

use beebemu::disassembler;
use beebemu::registers::RegId;
use beebemu::traps::console::StdioConsole;
use beebemu::traps::filesystem::HostFilesystem;
use beebemu::traps::os;
use beebemu::Emulator;

#[derive(Parser, Debug)]
#[command(name = "beebemu", about = "A 6502 execution core for a BBC Micro-class host")]
struct Cli {
    /// Raw binary image to load into guest memory.
    image: PathBuf,

    /// Address to load the image at (hex, e.g. 2000 or 0x2000).
    #[arg(long, value_parser = parse_hex_u16, default_value = "2000")]
    load_address: u16,

    /// Override the reset vector (0xFFFC/FFFD). Defaults to the load
    /// address, as if the image were entered directly.
    #[arg(long, value_parser = parse_hex_u16)]
    reset_vector: Option<u16>,

    /// Stop after this many instructions (0 = unbounded).
    #[arg(long)]
    count: Option<u64>,

    /// Directory the OSFILE/OSFIND/OSBGET/OSBPUT traps read and write
    /// through. Defaults to the current directory.
    #[arg(long)]
    fs_root: Option<PathBuf>,

    /// Disassemble the image instead of executing it.
    #[arg(long)]
    disassemble: bool,
}

fn parse_hex_u16(s: &str) -> Result<u16, String> {
    let s = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    u16::from_str_radix(s, 16).map_err(|e| e.to_string())
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let bytes = match fs::read(&cli.image) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("{} reading {}: {}", Colour::Red.bold().paint("error"), cli.image.display(), e);
            std::process::exit(1);
        }
    };

    if cli.disassemble {
        run_disassemble(&bytes, cli.load_address);
        return;
    }

    if let Err(e) = run_emulator(&bytes, &cli) {
        eprintln!("{}: {}", Colour::Red.bold().paint("error"), e);
        std::process::exit(1);
    }
}

fn run_disassemble(bytes: &[u8], load_address: u16) {
    let decoder = beebemu::InstructionDecoder::default_table();
    for line in disassembler::disassemble(&decoder, bytes, load_address) {
        println!("{}", Colour::Cyan.paint(format!("{}", line)));
    }
}

fn run_emulator(bytes: &[u8], cli: &Cli) -> Result<(), String> {
    let mut emu = Emulator::with_default_table();
    emu.mem_write(cli.load_address, bytes).map_err(|e| e.to_string())?;

    let reset_vector = cli.reset_vector.unwrap_or(cli.load_address);
    emu.write_word(0xFFFC, reset_vector).map_err(|e| e.to_string())?;
    emu.reset().map_err(|e| e.to_string())?;

    let console = Rc::new(RefCell::new(StdioConsole::new()));
    let fs_root = cli.fs_root.clone().unwrap_or_else(|| PathBuf::from("."));
    let filesystem = Rc::new(RefCell::new(HostFilesystem::new(fs_root)));
    os::install_all(&mut emu, console, filesystem).map_err(|e| e.to_string())?;

    let count = cli.count.filter(|&c| c > 0);
    emu.emu_start(reset_vector, None, count).map_err(|e| e.to_string())?;

    log::info!("halted at {:#06x}: {}", emu.reg_read(RegId::Pc), emu.regs.status_line());
    Ok(())
}
