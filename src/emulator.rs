//! The facade that owns memory, registers and hooks together, and exposes
//! the Unicorn-style embedding API from spec.md §4.7/§6.
//!
//! Grounded in `pybeeb/PyBeebicorn.py` (the `reg_read`/`reg_write`,
//! `mem_map`, `hook_add`/`hook_del`, `emu_start`/`emu_stop` surface) and
//! `pybeeb/MOS.py`'s `MOS.call` (the re-entrant subroutine-call helper).

use std::cell::Cell;
use std::rc::Rc;

use crate::decoder::InstructionDecoder;
use crate::dispatch;
use crate::error::{EmuError, EmuResult};
use crate::hooks::{HookEvent, HookHandle, HookKind, HookTable};
use crate::memory::{MappedDevice, Memory};
use crate::registers::{RegId, RegisterBank};

/// Sentinel return address used by [`Emulator::call`]. Never backed by a
/// mapped device, so nothing meaningful would execute there; a one-shot
/// code hook intercepts it before the garbage byte underneath is decoded.
const CALL_RETURN_ADDR: u16 = 0xFFFE;

pub struct Emulator {
    pub regs: RegisterBank,
    memory: Memory,
    decoder: InstructionDecoder,
    hooks: HookTable,
    stop_requested: bool,
    run_depth: u32,
    /// Set by a trap callback that needs to fail the current tick; hook
    /// callbacks return `()`, so this is how [`crate::traps`] surfaces a
    /// `TrapOutcome::Error`/`EofSignal` back through to [`crate::dispatch`].
    pending_error: Option<EmuError>,
}

impl Emulator {
    pub fn new(decoder: InstructionDecoder) -> Self {
        Emulator {
            regs: RegisterBank::new(),
            memory: Memory::new(),
            decoder,
            hooks: HookTable::new(),
            stop_requested: false,
            run_depth: 0,
            pending_error: None,
        }
    }

    pub fn with_default_table() -> Self {
        Self::new(InstructionDecoder::default_table())
    }

    pub(crate) fn decoder(&self) -> &InstructionDecoder {
        &self.decoder
    }

    pub fn executing(&self) -> bool {
        self.run_depth > 0
    }

    // -- Memory mapping ---------------------------------------------------

    pub fn mem_map(&mut self, begin: u16, end: u16, device: Box<dyn MappedDevice>) {
        self.memory.map(begin, end, device);
    }

    // -- Hooked byte-level access ------------------------------------------
    //
    // Every other memory accessor on this type (words, long words, strings,
    // the stack primitives, bulk transfers) composes from these two so a
    // hook fires on every byte the guest touches, per spec.md §4.6.

    pub fn read_byte(&mut self, addr: u16) -> EmuResult<u8> {
        let hooks = self.hooks.read_hooks_for(addr, 1);
        for hook in hooks {
            hook.fire(self, HookEvent::Mem { kind: crate::hooks::AccessKind::Read, addr, len: 1, value: None });
        }
        self.memory.read_byte(addr as i64)
    }

    pub fn write_byte(&mut self, addr: u16, value: u8) -> EmuResult<()> {
        let hooks = self.hooks.write_hooks_for(addr, 1);
        for hook in hooks {
            hook.fire(
                self,
                HookEvent::Mem { kind: crate::hooks::AccessKind::Write, addr, len: 1, value: Some(vec![value]) },
            );
        }
        self.memory.write_byte(addr as i64, value as i64)
    }

    pub fn read_word(&mut self, addr: u16) -> EmuResult<u16> {
        let lo = self.read_byte(addr)? as u16;
        let hi = self.read_byte(addr.wrapping_add(1))? as u16;
        Ok(lo | (hi << 8))
    }

    pub fn write_word(&mut self, addr: u16, value: u16) -> EmuResult<()> {
        self.write_byte(addr, (value & 0xFF) as u8)?;
        self.write_byte(addr.wrapping_add(1), (value >> 8) as u8)?;
        Ok(())
    }

    pub fn read_signed_byte(&mut self, addr: u16) -> EmuResult<i8> {
        Ok(self.read_byte(addr)? as i8)
    }

    pub fn read_string(&mut self, addr: u16) -> EmuResult<String> {
        let mut out = Vec::new();
        let mut cursor = addr;
        loop {
            let b = self.read_byte(cursor)?;
            if b == 0x0D {
                break;
            }
            out.push(b);
            cursor = cursor.wrapping_add(1);
        }
        Ok(out.into_iter().map(|b| b as char).collect())
    }

    /// Bulk read through the facade, firing one read hook per boundary-split
    /// sub-range rather than per byte.
    pub fn mem_read(&mut self, addr: u16, len: usize) -> EmuResult<Vec<u8>> {
        for span in self.memory.spans(addr as u32, len)? {
            let hooks = self.hooks.read_hooks_for(span.addr as u16, span.len);
            for hook in hooks {
                hook.fire(
                    self,
                    HookEvent::Mem {
                        kind: crate::hooks::AccessKind::Read,
                        addr: span.addr as u16,
                        len: span.len,
                        value: None,
                    },
                );
            }
        }
        self.memory.read_bytes(addr as i64, len)
    }

    /// Bulk write through the facade, firing one write hook per boundary-split
    /// sub-range rather than per byte.
    pub fn mem_write(&mut self, addr: u16, data: &[u8]) -> EmuResult<()> {
        let mut cursor = 0usize;
        for span in self.memory.spans(addr as u32, data.len())? {
            let chunk = data[cursor..cursor + span.len].to_vec();
            let hooks = self.hooks.write_hooks_for(span.addr as u16, span.len);
            for hook in hooks {
                hook.fire(
                    self,
                    HookEvent::Mem {
                        kind: crate::hooks::AccessKind::Write,
                        addr: span.addr as u16,
                        len: span.len,
                        value: Some(chunk.clone()),
                    },
                );
            }
            cursor += span.len;
        }
        self.memory.write_bytes(addr as i64, data)
    }

    // -- Stack primitives ---------------------------------------------------

    pub(crate) fn push_byte(&mut self, value: u8) -> EmuResult<()> {
        if self.regs.sp == 0x00 {
            return Err(EmuError::StackOverflow);
        }
        let addr = 0x0100u16 + self.regs.sp as u16;
        self.write_byte(addr, value)?;
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        Ok(())
    }

    pub(crate) fn pull_byte(&mut self) -> EmuResult<u8> {
        if self.regs.sp == 0xFF {
            return Err(EmuError::StackUnderflow);
        }
        self.regs.sp = self.regs.sp.wrapping_add(1);
        let addr = 0x0100u16 + self.regs.sp as u16;
        self.read_byte(addr)
    }

    pub(crate) fn push_word(&mut self, value: u16) -> EmuResult<()> {
        self.push_byte((value >> 8) as u8)?;
        self.push_byte((value & 0xFF) as u8)?;
        Ok(())
    }

    pub(crate) fn pull_word(&mut self) -> EmuResult<u16> {
        let lo = self.pull_byte()? as u16;
        let hi = self.pull_byte()? as u16;
        Ok(lo | (hi << 8))
    }

    // -- Register facade ----------------------------------------------------

    pub fn reg_read(&self, id: RegId) -> u32 {
        match id {
            RegId::Pc => self.regs.pc as u32,
            RegId::Sp => self.regs.sp as u32,
            RegId::A => self.regs.a as u32,
            RegId::X => self.regs.x as u32,
            RegId::Y => self.regs.y as u32,
            RegId::Ps => self.regs.ps() as u32,
        }
    }

    pub fn reg_write(&mut self, id: RegId, value: u32) {
        match id {
            RegId::Pc => self.regs.pc = value as u16,
            RegId::Sp => self.regs.sp = value as u8,
            RegId::A => self.regs.a = value as u8,
            RegId::X => self.regs.x = value as u8,
            RegId::Y => self.regs.y = value as u8,
            RegId::Ps => self.regs.set_ps(value as u8),
        }
    }

    // -- Hooks ---------------------------------------------------------------

    pub fn hook_add(
        &mut self,
        kinds: HookKind,
        begin: u32,
        end: u32,
        callback: impl FnMut(&mut Emulator, HookEvent) + 'static,
    ) -> HookHandle {
        self.hooks.hook_add(kinds, begin, end, callback)
    }

    pub fn hook_del(&mut self, handle: HookHandle) {
        self.hooks.hook_del(handle);
    }

    fn fire_code_hooks(&mut self, pc: u16, length: u8) {
        let hooks = self.hooks.code_hooks_at(pc);
        for hook in hooks {
            hook.fire(self, HookEvent::Code { pc, length });
        }
    }

    pub(crate) fn fire_code_hooks_pub(&mut self, pc: u16, length: u8) {
        self.fire_code_hooks(pc, length)
    }

    // -- Run control ----------------------------------------------------------

    pub fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    pub fn emu_stop(&mut self) {
        self.request_stop();
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    /// Fails the current tick from inside a hook callback. Also requests a
    /// stop, since there is no instruction left worth finishing.
    pub fn fail(&mut self, err: EmuError) {
        self.pending_error = Some(err);
        self.request_stop();
    }

    pub(crate) fn take_pending_error(&mut self) -> Option<EmuError> {
        self.pending_error.take()
    }

    /// Loads PC from the reset vector at 0xFFFC and zeroes the other
    /// registers, per spec.md §4.5.
    pub fn reset(&mut self) -> EmuResult<()> {
        self.regs.reset();
        let vector = self.read_word(0xFFFC)?;
        self.regs.pc = vector;
        self.regs.next_pc = vector;
        Ok(())
    }

    /// Runs from `begin` until `until` is reached, `count` instructions have
    /// retired, or a hook calls [`Emulator::emu_stop`] — whichever comes
    /// first, per spec.md §4.7.
    pub fn emu_start(&mut self, begin: u16, until: Option<u16>, count: Option<u64>) -> EmuResult<()> {
        log::debug!("emu_start: begin={:#06x} until={:?} count={:?} depth={}", begin, until, count, self.run_depth + 1);
        self.regs.pc = begin;
        self.regs.next_pc = begin;
        self.stop_requested = false;
        self.run_depth += 1;
        let result = self.run_loop(until, count);
        self.run_depth -= 1;
        if let Err(ref e) = result {
            log::warn!("emu_start terminated with an error: {e}");
        }
        result
    }

    fn run_loop(&mut self, until: Option<u16>, count: Option<u64>) -> EmuResult<()> {
        let mut executed = 0u64;
        loop {
            if self.stop_requested {
                break;
            }
            if let Some(u) = until {
                if self.regs.pc == u {
                    break;
                }
            }
            if let Some(limit) = count {
                if executed >= limit {
                    break;
                }
            }
            dispatch::tick(self)?;
            executed += 1;
        }
        Ok(())
    }

    /// Re-entrant subroutine call, grounded in `pybeeb/MOS.py`'s
    /// `MOS.call`: pushes the call site's own PC below a sentinel return
    /// address, runs until a one-shot code hook on that sentinel fires,
    /// pops the call-site PC back unconditionally, then restores the rest
    /// of the register bank if `preserve_state` is set. Returns the
    /// register state immediately after the callee's `RTS`.
    pub fn call(
        &mut self,
        address: u16,
        a: Option<u8>,
        x: Option<u8>,
        y: Option<u8>,
        preserve_state: bool,
    ) -> EmuResult<RegisterBank> {
        let saved = self.regs.copy();
        let caller_pc = self.regs.pc;

        self.push_word(caller_pc)?;
        self.push_word(CALL_RETURN_ADDR.wrapping_sub(1))?;

        if let Some(v) = a {
            self.regs.a = v;
        }
        if let Some(v) = x {
            self.regs.x = v;
        }
        if let Some(v) = y {
            self.regs.y = v;
        }

        let fired = Rc::new(Cell::new(false));
        let fired_cb = fired.clone();
        let handle = self.hooks.hook_add(
            HookKind::CODE,
            CALL_RETURN_ADDR as u32,
            CALL_RETURN_ADDR as u32 + 1,
            move |emu, _event| {
                fired_cb.set(true);
                emu.request_stop();
            },
        );

        self.regs.pc = address;
        self.regs.next_pc = address;
        self.stop_requested = false;
        self.run_depth += 1;
        let result = self.run_loop(None, None);
        self.run_depth -= 1;

        self.hooks.hook_del(handle);
        result?;
        debug_assert!(fired.get(), "call() unwound without reaching its sentinel return address");

        // Restore the call site's PC regardless of preserve_state: a caller
        // that asked not to preserve A/X/Y/flags still expects control to
        // land back after the CALL, not at the internal sentinel.
        let return_pc = self.pull_word()?;
        self.regs.pc = return_pc;
        self.regs.next_pc = return_pc;

        let outcome = self.regs.copy();
        if preserve_state {
            self.regs.restore(&saved);
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank() -> Emulator {
        Emulator::with_default_table()
    }

    #[test]
    fn reset_loads_pc_from_vector() {
        let mut emu = blank();
        emu.write_word(0xFFFC, 0x8000).unwrap();
        emu.reset().unwrap();
        assert_eq!(emu.regs.pc, 0x8000);
    }

    #[test]
    fn stack_push_pull_round_trips_and_detects_exhaustion() {
        let mut emu = blank();
        emu.regs.sp = 0xFF;
        emu.push_byte(0x42).unwrap();
        assert_eq!(emu.regs.sp, 0xFE);
        assert_eq!(emu.pull_byte().unwrap(), 0x42);
        assert_eq!(emu.regs.sp, 0xFF);
        assert!(emu.pull_byte().is_err());

        emu.regs.sp = 0x00;
        assert!(emu.push_byte(1).is_err());
    }

    #[test]
    fn call_runs_a_subroutine_and_returns_to_the_caller() {
        let mut emu = blank();
        // LDA #$42 ; RTS
        emu.mem_write(0x9000, &[0xA9, 0x42, 0x60]).unwrap();
        let result = emu.call(0x9000, None, None, None, true).unwrap();
        assert_eq!(result.a, 0x42);
        // preserve_state restores the caller's own registers afterwards.
        assert_ne!(emu.regs.a, 0x42);
    }

    #[test]
    fn call_without_preserve_state_leaves_registers_as_the_callee_set_them() {
        let mut emu = blank();
        emu.regs.pc = 0x0900;
        emu.mem_write(0x9000, &[0xA9, 0x7F, 0x60]).unwrap();
        emu.call(0x9000, None, None, None, false).unwrap();
        assert_eq!(emu.regs.a, 0x7F);
        // PC is always popped back to the call site, even without preserve_state.
        assert_eq!(emu.regs.pc, 0x0900);
    }

    #[test]
    fn fail_surfaces_through_the_next_tick() {
        let mut emu = blank();
        emu.mem_write(0x0200, &[0xEA]).unwrap();
        emu.regs.pc = 0x0200;
        emu.hook_add(crate::hooks::HookKind::CODE, 0x0200, 0x0201, |emu, _ev| {
            emu.fail(EmuError::InputEof);
        });
        let err = crate::dispatch::tick(&mut emu).unwrap_err();
        assert!(matches!(err, EmuError::InputEof));
    }
}
