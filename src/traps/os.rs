//! The concrete OS-call traps, grounded address-for-address in
//! `pybeeb/Host/base.py`'s `OSInterface` subclasses and their `code`/
//! `vector` class attributes, with the character and filesystem calls'
//! bodies grounded in `pybeeb/Host/host.py` and `pybeeb/Host/hostfs.py`.
//!
//! `base.py` dispatches `OSBYTE`/`OSWORD`/`OSFILE` sub-functions through a
//! `dispatch` dict keyed by `(A, X, Y)`, falling back to `(A, X)` then `A`;
//! each trap below reproduces that fallback as a plain `match` on the
//! register values its particular sub-function set actually needs.

use std::cell::RefCell;
use std::rc::Rc;

use crate::emulator::Emulator;
use crate::error::BbcError;
use crate::traps::console::ConsoleDevice;
use crate::traps::filesystem::{FileMeta, FilesystemDevice};
use crate::traps::{HostTrap, TrapOutcome};

pub const OSWRCH_CODE: u16 = 0xE0A4;
pub const OSWRCH_VECTOR: u16 = 0x020E;
pub const OSRDCH_CODE: u16 = 0xDEC5;
pub const OSRDCH_VECTOR: u16 = 0x0210;
pub const OSCLI_CODE: u16 = 0xDF89;
pub const OSCLI_VECTOR: u16 = 0x0208;
pub const OSBYTE_CODE: u16 = 0xE772;
pub const OSBYTE_VECTOR: u16 = 0x020A;
pub const OSWORD_CODE: u16 = 0xE7EB;
pub const OSWORD_VECTOR: u16 = 0x020C;
pub const OSFILE_CODE: u16 = 0xF27D;
pub const OSFILE_VECTOR: u16 = 0x0212;
pub const OSARGS_CODE: u16 = 0xF1E8;
pub const OSARGS_VECTOR: u16 = 0x0214;
pub const OSBGET_CODE: u16 = 0xF4C9;
pub const OSBGET_VECTOR: u16 = 0x0216;
pub const OSBPUT_CODE: u16 = 0xF529;
pub const OSBPUT_VECTOR: u16 = 0x0218;
pub const OSFIND_CODE: u16 = 0xF3CA;
/// Shares `OSBPUT`'s vector cell. This is a quirk of the reference
/// implementation, not a typo here: `base.py` assigns both `OSFIND` and
/// `OSBPUT` vector 0x0218, and guests of the real machine rely on it.
pub const OSFIND_VECTOR: u16 = 0x0218;
pub const OSFSC_CODE: u16 = 0xFFB1;
/// `base.py` imports `OSFSC` from `.base` but no such class is defined
/// there; this vector slot is unused by any other trap and is this crate's
/// own choice, not a value recovered from the original.
pub const OSFSC_VECTOR: u16 = 0x021A;
pub const OSGBPB_CODE: u16 = 0xFFA6;
/// Real MOS wires `GBPBV` to 0x021A, but `OSFSC_VECTOR` above already
/// claims that cell in this crate; 0x021C is free here.
pub const OSGBPB_VECTOR: u16 = 0x021C;

fn read_long_word(emu: &mut Emulator, addr: u16) -> crate::error::EmuResult<u32> {
    let mut value = 0u32;
    for i in 0..4u16 {
        value |= (emu.read_byte(addr.wrapping_add(i))? as u32) << (8 * i);
    }
    Ok(value)
}

fn write_long_word(emu: &mut Emulator, addr: u16, value: u32) -> crate::error::EmuResult<()> {
    for i in 0..4u32 {
        emu.write_byte(addr.wrapping_add(i as u16), ((value >> (8 * i)) & 0xFF) as u8)?;
    }
    Ok(())
}

/// Installs every host trap this module knows about against `emu`, wiring
/// them to the given console and filesystem collaborators.
pub fn install_all(
    emu: &mut Emulator,
    console: Rc<RefCell<dyn ConsoleDevice>>,
    filesystem: Rc<RefCell<dyn FilesystemDevice>>,
) -> crate::error::EmuResult<()> {
    crate::traps::install(emu, OswrchTrap { console: console.clone() })?;
    crate::traps::install(emu, OsrdchTrap { console: console.clone() })?;
    crate::traps::install(emu, OscliTrap {})?;
    crate::traps::install(emu, OsbyteTrap {})?;
    crate::traps::install(emu, OsworldTrap { console: console.clone() })?;
    crate::traps::install(emu, OsfileTrap { filesystem: filesystem.clone() })?;
    crate::traps::install(emu, OsargsTrap { filesystem: filesystem.clone() })?;
    crate::traps::install(emu, OsbgetTrap { filesystem: filesystem.clone() })?;
    crate::traps::install(emu, OsbputTrap { filesystem: filesystem.clone() })?;
    crate::traps::install(emu, OsfindTrap { filesystem: filesystem.clone() })?;
    crate::traps::install(emu, OsfscTrap {})?;
    crate::traps::install(emu, OsgbpbTrap { filesystem: filesystem.clone() })?;
    Ok(())
}

// -- OSWRCH / OSRDCH -------------------------------------------------------

pub struct OswrchTrap {
    pub console: Rc<RefCell<dyn ConsoleDevice>>,
}

impl HostTrap for OswrchTrap {
    fn code_address(&self) -> u16 {
        OSWRCH_CODE
    }
    fn vector_address(&self) -> u16 {
        OSWRCH_VECTOR
    }
    fn call(&mut self, emu: &mut Emulator) -> TrapOutcome {
        let ch = emu.regs.a;
        self.console.borrow_mut().write_byte(ch);
        TrapOutcome::Handled
    }
}

pub struct OsrdchTrap {
    pub console: Rc<RefCell<dyn ConsoleDevice>>,
}

impl HostTrap for OsrdchTrap {
    fn code_address(&self) -> u16 {
        OSRDCH_CODE
    }
    fn vector_address(&self) -> u16 {
        OSRDCH_VECTOR
    }
    fn call(&mut self, emu: &mut Emulator) -> TrapOutcome {
        match self.console.borrow_mut().read_byte() {
            Some(ch) => {
                // ESC: set carry and the escape-pending cell at 0x00FF,
                // per `OSRDCHtty.call` in host.py.
                if ch == 27 {
                    emu.regs.carry = true;
                    emu.write_byte(0x00FF, 0x80).expect("0x00FF is always addressable");
                } else {
                    emu.regs.carry = false;
                }
                emu.regs.a = ch;
                TrapOutcome::Handled
            }
            None => TrapOutcome::EofSignal,
        }
    }
}

// -- OSCLI -------------------------------------------------------------------

/// Strips leading `*`s and splits the command word from its arguments on
/// the first space, mirroring `OSCLI.call`'s `line.lstrip('*').split(' ',
/// 1)` in base.py. Written as a tiny `nom` combinator rather than hand-
/// rolled string slicing, matching this crate's parser idiom elsewhere.
fn split_command_line(input: &str) -> (String, String) {
    use nom::bytes::complete::{take_till, take_while};
    use nom::IResult;

    fn parser(input: &str) -> IResult<&str, (&str, &str)> {
        let (rest, _stars) = take_while(|c: char| c == '*')(input)?;
        let (remainder, command) = take_till(|c: char| c == ' ')(rest)?;
        Ok((remainder, (command, remainder.trim_start_matches(' '))))
    }

    match parser(input) {
        Ok((_, (command, args))) => (command.to_ascii_uppercase(), args.to_string()),
        Err(_) => (input.trim_start_matches('*').to_ascii_uppercase(), String::new()),
    }
}

pub struct OscliTrap {}

impl HostTrap for OscliTrap {
    fn code_address(&self) -> u16 {
        OSCLI_CODE
    }
    fn vector_address(&self) -> u16 {
        OSCLI_VECTOR
    }
    fn call(&mut self, emu: &mut Emulator) -> TrapOutcome {
        let addr = (emu.regs.x as u16) | ((emu.regs.y as u16) << 8);
        let line = match emu.read_string(addr) {
            Ok(s) => s,
            Err(_) => return TrapOutcome::NotHandled,
        };
        let (command, _args) = split_command_line(&line);
        match command.as_str() {
            // `*QUIT` halts the run; every other command is left for the
            // ROM underneath (there isn't one here, so it falls through
            // to an undefined-opcode error, same as an unplugged OSCLI
            // extension ROM on the real machine).
            "QUIT" => {
                emu.request_stop();
                TrapOutcome::Handled
            }
            _ => TrapOutcome::NotHandled,
        }
    }
}

// -- OSBYTE / OSWORD ---------------------------------------------------------

pub struct OsbyteTrap {}

impl HostTrap for OsbyteTrap {
    fn code_address(&self) -> u16 {
        OSBYTE_CODE
    }
    fn vector_address(&self) -> u16 {
        OSBYTE_VECTOR
    }
    fn call(&mut self, emu: &mut Emulator) -> TrapOutcome {
        match emu.regs.a {
            // Acknowledge escape condition: clear carry, per base.py's
            // `OSBYTE` dispatch entry for A=0x7E.
            0x7E => {
                emu.regs.carry = false;
                TrapOutcome::Handled
            }
            _ => TrapOutcome::NotHandled,
        }
    }
}

pub struct OsworldTrap {
    pub console: Rc<RefCell<dyn ConsoleDevice>>,
}

impl OsworldTrap {
    /// `OSWORD 0`: read a line into a guest buffer, per
    /// `OSWORDtty.osword_readline` in host.py. The control block at
    /// `(Y,X)` holds: buffer address (word), max line length, lowest and
    /// highest acceptable character codes.
    fn readline(&mut self, emu: &mut Emulator, cb: u16) -> TrapOutcome {
        let buffer = match emu.read_word(cb) {
            Ok(v) => v,
            Err(_) => return TrapOutcome::NotHandled,
        };
        let max_len = match emu.read_byte(cb.wrapping_add(2)) {
            Ok(v) => v as usize,
            Err(_) => return TrapOutcome::NotHandled,
        };
        match self.console.borrow_mut().read_line(max_len.max(1)) {
            Some(bytes) => {
                if emu.mem_write(buffer, &bytes).is_err() {
                    return TrapOutcome::NotHandled;
                }
                emu.regs.carry = false;
                emu.regs.y = bytes.len() as u8;
                TrapOutcome::Handled
            }
            None => TrapOutcome::EofSignal,
        }
    }
}

impl HostTrap for OsworldTrap {
    fn code_address(&self) -> u16 {
        OSWORD_CODE
    }
    fn vector_address(&self) -> u16 {
        OSWORD_VECTOR
    }
    fn call(&mut self, emu: &mut Emulator) -> TrapOutcome {
        let cb = (emu.regs.x as u16) | ((emu.regs.y as u16) << 8);
        match emu.regs.a {
            0x00 => self.readline(emu, cb),
            _ => TrapOutcome::NotHandled,
        }
    }
}

// -- OSFILE / OSARGS / OSBGET / OSBPUT / OSFIND / OSFSC ---------------------

fn filename_at(emu: &mut Emulator, cb: u16) -> Option<String> {
    let ptr = emu.read_word(cb).ok()?;
    emu.read_string(ptr).ok()
}

pub struct OsfileTrap {
    pub filesystem: Rc<RefCell<dyn FilesystemDevice>>,
}

impl OsfileTrap {
    fn save_or_write(&mut self, emu: &mut Emulator, cb: u16, reason: u8) -> TrapOutcome {
        let name = match filename_at(emu, cb) {
            Some(n) => n,
            None => return TrapOutcome::NotHandled,
        };
        let load_addr = read_long_word(emu, cb.wrapping_add(2)).unwrap_or(0);
        let exec_addr = read_long_word(emu, cb.wrapping_add(6)).unwrap_or(0);
        let start_addr = read_long_word(emu, cb.wrapping_add(10)).unwrap_or(0);
        let end_addr = read_long_word(emu, cb.wrapping_add(14)).unwrap_or(0);

        let mut fs = self.filesystem.borrow_mut();
        match reason {
            // Reason 0: save the block [start, end) under `name`, with the
            // load/exec addresses from the control block.
            0 => {
                let len = end_addr.saturating_sub(start_addr) as usize;
                let data = match emu.mem_read(start_addr as u16, len) {
                    Ok(d) => d,
                    Err(_) => return TrapOutcome::NotHandled,
                };
                let meta = FileMeta { load_addr, exec_addr, attr: 0 };
                match fs.save(&name, &data, meta) {
                    Ok(()) => TrapOutcome::Handled,
                    Err(_) => TrapOutcome::Error(BbcError::new(0xC9, "Can't")),
                }
            }
            // Reasons 1-4: update catalogue metadata without touching the
            // file's bytes.
            1..=4 => {
                let mut meta = fs.meta(&name).ok().flatten().unwrap_or_default();
                match reason {
                    1 => {
                        meta.load_addr = load_addr;
                        meta.exec_addr = exec_addr;
                        meta.attr = start_addr;
                    }
                    2 => meta.load_addr = load_addr,
                    3 => meta.exec_addr = exec_addr,
                    4 => meta.attr = load_addr,
                    _ => unreachable!(),
                }
                match fs.set_meta(&name, meta) {
                    Ok(()) => TrapOutcome::Handled,
                    Err(_) => TrapOutcome::Error(BbcError::new(0xC9, "Can't")),
                }
            }
            _ => TrapOutcome::NotHandled,
        }
    }

    fn read_info(&mut self, emu: &mut Emulator, cb: u16) -> TrapOutcome {
        let name = match filename_at(emu, cb) {
            Some(n) => n,
            None => return TrapOutcome::NotHandled,
        };
        let mut fs = self.filesystem.borrow_mut();
        match fs.meta(&name) {
            Ok(Some(meta)) => {
                let _ = write_long_word(emu, cb.wrapping_add(2), meta.load_addr);
                let _ = write_long_word(emu, cb.wrapping_add(6), meta.exec_addr);
                let _ = write_long_word(emu, cb.wrapping_add(10), meta.attr);
                emu.regs.a = 1;
                TrapOutcome::Handled
            }
            Ok(None) => {
                emu.regs.a = 0;
                TrapOutcome::Handled
            }
            Err(_) => TrapOutcome::Error(BbcError::new(0xD6, "File not found")),
        }
    }

    fn delete(&mut self, emu: &mut Emulator, cb: u16) -> TrapOutcome {
        let name = match filename_at(emu, cb) {
            Some(n) => n,
            None => return TrapOutcome::NotHandled,
        };
        match self.filesystem.borrow_mut().delete(&name) {
            Ok(()) => {
                emu.regs.a = 1;
                TrapOutcome::Handled
            }
            Err(_) => TrapOutcome::Error(crate::traps::filesystem::file_not_found_error(&name)),
        }
    }

    fn load(&mut self, emu: &mut Emulator, cb: u16) -> TrapOutcome {
        let name = match filename_at(emu, cb) {
            Some(n) => n,
            None => return TrapOutcome::NotHandled,
        };
        // If the control block's load address high byte is 0xFF, use the
        // address the file was saved with instead, per `OSFILEhost.load`.
        let requested_load_addr = read_long_word(emu, cb.wrapping_add(2)).unwrap_or(0);
        let result = self.filesystem.borrow_mut().load(&name);
        match result {
            Ok((data, meta)) => {
                let load_addr = if (requested_load_addr >> 24) & 0xFF == 0xFF {
                    meta.load_addr
                } else {
                    requested_load_addr
                };
                if emu.mem_write(load_addr as u16, &data).is_err() {
                    return TrapOutcome::Error(BbcError::new(0xC9, "Can't"));
                }
                let _ = write_long_word(emu, cb.wrapping_add(2), meta.load_addr);
                let _ = write_long_word(emu, cb.wrapping_add(6), meta.exec_addr);
                let _ = write_long_word(emu, cb.wrapping_add(10), meta.attr);
                emu.regs.a = 1;
                TrapOutcome::Handled
            }
            Err(_) => TrapOutcome::Error(crate::traps::filesystem::file_not_found_error(&name)),
        }
    }
}

impl HostTrap for OsfileTrap {
    fn code_address(&self) -> u16 {
        OSFILE_CODE
    }
    fn vector_address(&self) -> u16 {
        OSFILE_VECTOR
    }
    fn call(&mut self, emu: &mut Emulator) -> TrapOutcome {
        let cb = (emu.regs.x as u16) | ((emu.regs.y as u16) << 8);
        match emu.regs.a {
            reason @ 0..=4 => self.save_or_write(emu, cb, reason),
            5 => self.read_info(emu, cb),
            6 => self.delete(emu, cb),
            0xFF => self.load(emu, cb),
            _ => TrapOutcome::NotHandled,
        }
    }
}

pub struct OsargsTrap {
    pub filesystem: Rc<RefCell<dyn FilesystemDevice>>,
}

impl HostTrap for OsargsTrap {
    fn code_address(&self) -> u16 {
        OSARGS_CODE
    }
    fn vector_address(&self) -> u16 {
        OSARGS_VECTOR
    }
    fn call(&mut self, emu: &mut Emulator) -> TrapOutcome {
        let handle = emu.regs.y;
        if handle == 0 {
            // Whole-filesystem queries (current directory etc.) are out
            // of scope; let them fall through unhandled.
            return TrapOutcome::NotHandled;
        }
        // The 4-byte value block this crate uses for OSARGS, pointed to by
        // (X); real hardware's exact zero-page convention differs by
        // filing system, so this is a deliberate, self-consistent choice
        // rather than a value recovered from the original.
        let cb = emu.regs.x as u16;
        let mut fs = self.filesystem.borrow_mut();
        match emu.regs.a {
            0 => match fs.ptr(handle) {
                Ok(ptr) => {
                    let _ = write_long_word(emu, cb, ptr);
                    TrapOutcome::Handled
                }
                Err(_) => TrapOutcome::Error(BbcError::new(0xDE, "Channel")),
            },
            1 => match read_long_word(emu, cb) {
                Ok(ptr) => match fs.set_ptr(handle, ptr) {
                    Ok(()) => TrapOutcome::Handled,
                    Err(_) => TrapOutcome::Error(BbcError::new(0xDE, "Channel")),
                },
                Err(_) => TrapOutcome::NotHandled,
            },
            2 => match fs.ext(handle) {
                Ok(ext) => {
                    let _ = write_long_word(emu, cb, ext);
                    TrapOutcome::Handled
                }
                Err(_) => TrapOutcome::Error(BbcError::new(0xDE, "Channel")),
            },
            _ => TrapOutcome::NotHandled,
        }
    }
}

pub struct OsbgetTrap {
    pub filesystem: Rc<RefCell<dyn FilesystemDevice>>,
}

impl HostTrap for OsbgetTrap {
    fn code_address(&self) -> u16 {
        OSBGET_CODE
    }
    fn vector_address(&self) -> u16 {
        OSBGET_VECTOR
    }
    fn call(&mut self, emu: &mut Emulator) -> TrapOutcome {
        let handle = emu.regs.x;
        match self.filesystem.borrow_mut().bget(handle) {
            Ok(Some(byte)) => {
                emu.regs.a = byte;
                emu.regs.carry = false;
                TrapOutcome::Handled
            }
            Ok(None) => {
                emu.regs.carry = true;
                TrapOutcome::Handled
            }
            Err(_) => TrapOutcome::Error(BbcError::new(0xDE, "Channel")),
        }
    }
}

pub struct OsbputTrap {
    pub filesystem: Rc<RefCell<dyn FilesystemDevice>>,
}

impl HostTrap for OsbputTrap {
    fn code_address(&self) -> u16 {
        OSBPUT_CODE
    }
    fn vector_address(&self) -> u16 {
        OSBPUT_VECTOR
    }
    fn call(&mut self, emu: &mut Emulator) -> TrapOutcome {
        let handle = emu.regs.x;
        let byte = emu.regs.a;
        match self.filesystem.borrow_mut().bput(handle, byte) {
            Ok(()) => TrapOutcome::Handled,
            Err(_) => TrapOutcome::Error(BbcError::new(0xDE, "Channel")),
        }
    }
}

pub struct OsfindTrap {
    pub filesystem: Rc<RefCell<dyn FilesystemDevice>>,
}

impl HostTrap for OsfindTrap {
    fn code_address(&self) -> u16 {
        OSFIND_CODE
    }
    fn vector_address(&self) -> u16 {
        OSFIND_VECTOR
    }
    fn call(&mut self, emu: &mut Emulator) -> TrapOutcome {
        match emu.regs.a {
            0x00 => {
                let handle = emu.regs.y;
                match self.filesystem.borrow_mut().close(handle) {
                    Ok(()) => TrapOutcome::Handled,
                    Err(_) => TrapOutcome::Error(BbcError::new(0xDE, "Channel")),
                }
            }
            mode @ (0x40 | 0x80 | 0xC0) => {
                let addr = (emu.regs.x as u16) | ((emu.regs.y as u16) << 8);
                let name = match emu.read_string(addr) {
                    Ok(n) => n,
                    Err(_) => return TrapOutcome::NotHandled,
                };
                let for_write = mode != 0x40;
                match self.filesystem.borrow_mut().open(&name, for_write) {
                    Ok(handle) => {
                        emu.regs.a = handle;
                        TrapOutcome::Handled
                    }
                    Err(_) => {
                        emu.regs.a = 0;
                        TrapOutcome::Handled
                    }
                }
            }
            _ => TrapOutcome::NotHandled,
        }
    }
}

pub struct OsfscTrap {}

impl HostTrap for OsfscTrap {
    fn code_address(&self) -> u16 {
        OSFSC_CODE
    }
    fn vector_address(&self) -> u16 {
        OSFSC_VECTOR
    }
    fn call(&mut self, _emu: &mut Emulator) -> TrapOutcome {
        // `*OPT` and the other OSFSC sub-functions (check EOF, read/write
        // a catalogue) have no host-side behaviour worth modelling here.
        TrapOutcome::NotHandled
    }
}

/// Block get/put-bytes. Reasons 1/2 put, 3/4 get; odd reasons seek the file
/// to an explicit pointer from the control block first, even reasons use
/// the file's current sequential position. Reasons 5-8 (catalogue/title
/// reads) aren't backed by anything here and fall through unhandled.
pub struct OsgbpbTrap {
    pub filesystem: Rc<RefCell<dyn FilesystemDevice>>,
}

impl OsgbpbTrap {
    /// Moves up to `count` bytes between the guest buffer at `data_addr`
    /// and `handle`, in the direction `put` selects. Stops early on EOF
    /// during a get; returns how many bytes actually moved and whether EOF
    /// was hit.
    fn transfer(
        &mut self,
        emu: &mut Emulator,
        handle: u8,
        data_addr: u16,
        count: u32,
        put: bool,
    ) -> Result<(u32, bool), BbcError> {
        let mut moved = 0u32;
        let mut eof = false;
        for i in 0..count {
            let addr = data_addr.wrapping_add(i as u16);
            if put {
                let byte = emu.read_byte(addr).map_err(|_| BbcError::new(0xC9, "Can't"))?;
                self.filesystem.borrow_mut().bput(handle, byte).map_err(|_| BbcError::new(0xDE, "Channel"))?;
            } else {
                let got = self.filesystem.borrow_mut().bget(handle).map_err(|_| BbcError::new(0xDE, "Channel"))?;
                match got {
                    Some(byte) => emu.write_byte(addr, byte).map_err(|_| BbcError::new(0xC9, "Can't"))?,
                    None => {
                        eof = true;
                        break;
                    }
                }
            }
            moved += 1;
        }
        Ok((moved, eof))
    }

    fn run(&mut self, emu: &mut Emulator, cb: u16, put: bool, use_pointer: bool) -> TrapOutcome {
        let handle = match emu.read_byte(cb) {
            Ok(h) => h,
            Err(_) => return TrapOutcome::NotHandled,
        };
        let data_addr = match read_long_word(emu, cb.wrapping_add(1)) {
            Ok(v) => v as u16,
            Err(_) => return TrapOutcome::NotHandled,
        };
        let count = match read_long_word(emu, cb.wrapping_add(5)) {
            Ok(v) => v,
            Err(_) => return TrapOutcome::NotHandled,
        };

        if use_pointer {
            let ptr = match read_long_word(emu, cb.wrapping_add(9)) {
                Ok(v) => v,
                Err(_) => return TrapOutcome::NotHandled,
            };
            if self.filesystem.borrow_mut().set_ptr(handle, ptr).is_err() {
                return TrapOutcome::Error(BbcError::new(0xDE, "Channel"));
            }
        }

        let (moved, eof) = match self.transfer(emu, handle, data_addr, count, put) {
            Ok(v) => v,
            Err(e) => return TrapOutcome::Error(e),
        };

        let _ = write_long_word(emu, cb.wrapping_add(1), data_addr.wrapping_add(moved as u16) as u32);
        let _ = write_long_word(emu, cb.wrapping_add(5), count - moved);
        if use_pointer {
            if let Ok(ptr) = self.filesystem.borrow_mut().ptr(handle) {
                let _ = write_long_word(emu, cb.wrapping_add(9), ptr);
            }
        }
        emu.regs.carry = eof;
        TrapOutcome::Handled
    }
}

impl HostTrap for OsgbpbTrap {
    fn code_address(&self) -> u16 {
        OSGBPB_CODE
    }
    fn vector_address(&self) -> u16 {
        OSGBPB_VECTOR
    }
    fn call(&mut self, emu: &mut Emulator) -> TrapOutcome {
        let cb = (emu.regs.x as u16) | ((emu.regs.y as u16) << 8);
        match emu.regs.a {
            1 => self.run(emu, cb, true, true),
            2 => self.run(emu, cb, true, false),
            3 => self.run(emu, cb, false, true),
            4 => self.run(emu, cb, false, false),
            _ => TrapOutcome::NotHandled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traps::console::BufferedConsole;
    use crate::traps::filesystem::HostFilesystem;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn oswrch_writes_the_accumulator_to_the_console() {
        let mut emu = Emulator::with_default_table();
        let console = Rc::new(RefCell::new(BufferedConsole::new()));
        crate::traps::install(&mut emu, OswrchTrap { console: console.clone() }).unwrap();

        emu.mem_write(0x0900, &[0xA9, b'A', 0x20, 0xA4, 0xE0]).unwrap();
        emu.emu_start(0x0900, None, Some(3)).unwrap();

        assert_eq!(console.borrow().output, vec![b'A']);
    }

    #[test]
    fn osrdch_signals_eof_when_the_console_is_empty() {
        let mut emu = Emulator::with_default_table();
        let console = Rc::new(RefCell::new(BufferedConsole::new()));
        crate::traps::install(&mut emu, OsrdchTrap { console: console.clone() }).unwrap();

        emu.mem_write(0x0900, &[0x20, 0xC5, 0xDE]).unwrap();
        emu.regs.pc = 0x0900;
        let err = emu.emu_start(0x0900, None, Some(2)).unwrap_err();
        assert!(matches!(err, crate::error::EmuError::InputEof));
    }

    #[test]
    fn osword_0_reads_a_line_terminated_by_carriage_return() {
        let mut emu = Emulator::with_default_table();
        let console = Rc::new(RefCell::new(BufferedConsole::with_input(b"HELLO\r".iter().copied())));
        crate::traps::install(&mut emu, OsworldTrap { console: console.clone() }).unwrap();

        // Control block at 0x0A00: buffer=0x0B00, max line length 32.
        emu.write_word(0x0A00, 0x0B00).unwrap();
        emu.write_byte(0x0A02, 32).unwrap();
        emu.regs.x = 0x00;
        emu.regs.y = 0x0A;
        emu.regs.a = 0x00;

        emu.mem_write(0x0900, &[0x20, 0xEB, 0xE7]).unwrap();
        emu.emu_start(0x0900, None, Some(2)).unwrap();

        assert_eq!(emu.read_string(0x0B00).unwrap(), "HELLO");
        assert!(!emu.regs.carry);
        assert_eq!(emu.regs.y, 6);
    }

    #[test]
    fn osfile_save_then_load_round_trips_through_the_host_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let mut emu = Emulator::with_default_table();
        let fs = Rc::new(RefCell::new(HostFilesystem::new(dir.path())));
        crate::traps::install(&mut emu, OsfileTrap { filesystem: fs.clone() }).unwrap();

        // Program bytes to save: 3 bytes at 0x2000..0x2003.
        emu.mem_write(0x2000, &[0xA9, 0x00, 0x60]).unwrap();
        // Filename "PROG" at 0x0C00, control block at 0x0C10.
        emu.mem_write(0x0C00, b"PROG\r").unwrap();
        emu.write_word(0x0C10, 0x0C00).unwrap();
        write_long_word(&mut emu, 0x0C12, 0x1900).unwrap();
        write_long_word(&mut emu, 0x0C16, 0x1900).unwrap();
        write_long_word(&mut emu, 0x0C1A, 0x2000).unwrap();
        write_long_word(&mut emu, 0x0C1E, 0x2003).unwrap();

        emu.regs.a = 0;
        emu.regs.x = 0x10;
        emu.regs.y = 0x0C;
        emu.mem_write(0x0900, &[0x20, 0x7D, 0xF2]).unwrap();
        emu.emu_start(0x0900, None, Some(2)).unwrap();

        let (data, meta) = fs.borrow_mut().load("PROG").unwrap();
        assert_eq!(data, vec![0xA9, 0x00, 0x60]);
        assert_eq!(meta.load_addr, 0x1900);
    }

    #[test]
    fn osgbpb_puts_then_gets_a_block_sequentially() {
        let dir = tempfile::tempdir().unwrap();
        let mut emu = Emulator::with_default_table();
        let fs = Rc::new(RefCell::new(HostFilesystem::new(dir.path())));
        fs.borrow_mut().save("DATA", b"", FileMeta::default()).unwrap();
        let handle = fs.borrow_mut().open("DATA", true).unwrap();
        crate::traps::install(&mut emu, OsgbpbTrap { filesystem: fs.clone() }).unwrap();

        // Control block at 0x0A00: handle, data addr 0x0B00, count 3, ptr 0.
        emu.mem_write(0x0B00, &[b'A', b'B', b'C']).unwrap();
        emu.write_byte(0x0A00, handle).unwrap();
        write_long_word(&mut emu, 0x0A01, 0x0B00).unwrap();
        write_long_word(&mut emu, 0x0A05, 3).unwrap();
        write_long_word(&mut emu, 0x0A09, 0).unwrap();

        emu.regs.a = 2; // put, sequential
        emu.regs.x = 0x00;
        emu.regs.y = 0x0A;
        emu.mem_write(0x0900, &[0x20, 0xA6, 0xFF]).unwrap();
        emu.emu_start(0x0900, None, Some(2)).unwrap();
        assert!(!emu.regs.carry);

        fs.borrow_mut().set_ptr(handle, 0).unwrap();
        emu.mem_write(0x0C00, &[0, 0, 0]).unwrap();
        emu.write_byte(0x0A00, handle).unwrap();
        write_long_word(&mut emu, 0x0A01, 0x0C00).unwrap();
        write_long_word(&mut emu, 0x0A05, 3).unwrap();
        write_long_word(&mut emu, 0x0A09, 0).unwrap();

        emu.regs.a = 4; // get, sequential
        emu.regs.x = 0x00;
        emu.regs.y = 0x0A;
        emu.regs.pc = 0x0900;
        emu.emu_start(0x0900, None, Some(2)).unwrap();

        assert!(!emu.regs.carry);
        assert_eq!(emu.mem_read(0x0C00, 3).unwrap(), vec![b'A', b'B', b'C']);
    }
}
