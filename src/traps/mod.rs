//! The BBC Micro OS-call convention layered on top of [`crate::hooks`] and
//! [`crate::emulator`], per spec.md §6.
//!
//! Grounded in `pybeeb/Host/base.py`'s `OSInterface` hierarchy: every call
//! is a fixed ROM `code` address with a paired OS "vector" cell at `0x02xx`
//! a guest can redirect through `*FX`/`EXTEND` tricks; installing a trap
//! means writing the vector cell once and placing a one-shot-free CODE hook
//! at the ROM address so a guest that jumps straight to the code (the
//! common case, since the vector starts out pointing there) still gets
//! intercepted.

pub mod console;
pub mod filesystem;
pub mod os;

use std::cell::RefCell;
use std::rc::Rc;

use crate::emulator::Emulator;
use crate::error::{BbcError, EmuError};
use crate::hooks::HookKind;

/// What a trap handler did with a call, per `OSInterface.call`'s boolean
/// return in the original (`True`/`False`) generalized to also carry guest
/// errors and end-of-input.
pub enum TrapOutcome {
    /// The call was serviced; simulate the callee's `RTS`.
    Handled,
    /// Not this trap's business; let the instruction underneath run.
    NotHandled,
    /// Raise a BBC-visible error: synthesize the guest error block and jump
    /// to the error handler.
    Error(BbcError),
    /// The host's input stream is exhausted; fail the whole run.
    EofSignal,
}

/// One OS-call trap: a fixed code address, a redirectable vector cell, and
/// a handler invoked with the machine paused at the call.
pub trait HostTrap {
    fn code_address(&self) -> u16;
    fn vector_address(&self) -> u16;
    fn call(&mut self, emu: &mut Emulator) -> TrapOutcome;
}

/// Address the guest error block is written to and the PC redirected to
/// when a trap raises `TrapOutcome::Error`, per spec.md §6.
const ERROR_BLOCK_ADDR: u16 = 0x0100;

/// Writes a guest error block at `0x0100`, per spec.md §6: a leading
/// `0x00`, the error number, the NUL-terminated message bytes, matching
/// the layout `BBCError`/`hostfs.py` error paths assume is already sitting
/// there when they raise.
fn write_error_block(emu: &mut Emulator, err: &BbcError) -> Result<(), EmuError> {
    let mut cursor = 0x0100u16;
    emu.write_byte(cursor, 0x00)?;
    cursor = cursor.wrapping_add(1);
    emu.write_byte(cursor, err.errnum)?;
    cursor = cursor.wrapping_add(1);
    for b in err.errmess.bytes() {
        emu.write_byte(cursor, b)?;
        cursor = cursor.wrapping_add(1);
    }
    emu.write_byte(cursor, 0x00)?;
    Ok(())
}

/// Installs `trap` at its code address: writes the vector cell to point at
/// the code address (the reset-time default, per `base.py`), then adds a
/// CODE hook there that runs the trap and simulates the RTS/error/EOF
/// outcome.
pub fn install(emu: &mut Emulator, trap: impl HostTrap + 'static) -> Result<(), EmuError> {
    let code_addr = trap.code_address();
    let vector_addr = trap.vector_address();
    emu.write_word(vector_addr, code_addr)?;
    log::debug!("trap installed at {:#06x} (vector {:#06x})", code_addr, vector_addr);

    let trap = Rc::new(RefCell::new(trap));
    emu.hook_add(HookKind::CODE, code_addr as u32, code_addr as u32 + 1, move |emu, _event| {
        let outcome = trap.borrow_mut().call(emu);
        match outcome {
            TrapOutcome::Handled => {
                log::trace!("trap at {:#06x} handled the call", code_addr);
                // Simulate the RTS the guest would otherwise have executed.
                match emu.pull_word() {
                    Ok(addr) => emu.regs.pc = addr.wrapping_add(1),
                    Err(e) => emu.fail(e),
                }
            }
            TrapOutcome::NotHandled => {
                log::trace!("trap at {:#06x} declined the call", code_addr);
            }
            TrapOutcome::Error(bbc_err) => {
                log::warn!("trap at {:#06x} raised {}", code_addr, bbc_err);
                if let Err(e) = write_error_block(emu, &bbc_err) {
                    emu.fail(e);
                } else {
                    emu.regs.pc = ERROR_BLOCK_ADDR;
                }
            }
            TrapOutcome::EofSignal => {
                log::info!("trap at {:#06x} signalled end of input", code_addr);
                emu.fail(EmuError::InputEof);
            }
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct AlwaysHandled {
        code: u16,
        vector: u16,
        calls: Rc<Cell<u32>>,
    }

    impl HostTrap for AlwaysHandled {
        fn code_address(&self) -> u16 {
            self.code
        }
        fn vector_address(&self) -> u16 {
            self.vector
        }
        fn call(&mut self, _emu: &mut Emulator) -> TrapOutcome {
            self.calls.set(self.calls.get() + 1);
            TrapOutcome::Handled
        }
    }

    #[test]
    fn handled_trap_simulates_an_rts_back_to_the_caller() {
        let mut emu = Emulator::with_default_table();
        let calls = Rc::new(Cell::new(0));
        install(&mut emu, AlwaysHandled { code: 0xE0A4, vector: 0x020E, calls: calls.clone() }).unwrap();

        // JSR $E0A4 at 0x0900, then a NOP the guest should land back on.
        emu.mem_write(0x0900, &[0x20, 0xA4, 0xE0, 0xEA]).unwrap();
        emu.emu_start(0x0900, Some(0x0903), None).unwrap();

        assert_eq!(calls.get(), 1);
        assert_eq!(emu.regs.pc, 0x0903);
    }

    struct AlwaysErrors {
        code: u16,
        vector: u16,
    }

    impl HostTrap for AlwaysErrors {
        fn code_address(&self) -> u16 {
            self.code
        }
        fn vector_address(&self) -> u16 {
            self.vector
        }
        fn call(&mut self, _emu: &mut Emulator) -> TrapOutcome {
            TrapOutcome::Error(BbcError::new(0xD6, "broken"))
        }
    }

    #[test]
    fn error_outcome_writes_the_guest_error_block_and_redirects_pc() {
        let mut emu = Emulator::with_default_table();
        install(&mut emu, AlwaysErrors { code: 0xF27D, vector: 0x0212 }).unwrap();
        emu.mem_write(0x0900, &[0x20, 0x7D, 0xF2]).unwrap();
        emu.regs.pc = 0x0900;
        crate::dispatch::tick(&mut emu).unwrap();
        // JSR pushed the return address; the next tick runs the trap hook
        // before the garbage byte sitting at 0xF27D is ever executed.
        crate::dispatch::tick(&mut emu).unwrap();

        assert_eq!(emu.regs.pc, ERROR_BLOCK_ADDR);
        assert_eq!(emu.read_byte(0x0100).unwrap(), 0x00);
        assert_eq!(emu.read_byte(0x0101).unwrap(), 0xD6);
    }
}
