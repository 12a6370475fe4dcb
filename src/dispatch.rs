//! The fetch/decode/execute/writeback tick, per spec.md §4.5.
//!
//! Grounded in `pybeeb/CPU/Dispatch.py`'s `Dispatch.step`: fetch the opcode,
//! advance a scratch next-PC cursor by the instruction's length, fire code
//! hooks, resolve the addressing mode, execute, write back, then commit PC
//! from the scratch cursor.

use crate::addressing;
use crate::execute;
use crate::writeback;
use crate::emulator::Emulator;
use crate::error::EmuResult;

/// Executes exactly one instruction, or nothing at all if a code hook
/// stopped the emulator or redirected PC before the instruction's body ran.
pub fn tick(emu: &mut Emulator) -> EmuResult<()> {
    let pc = emu.regs.pc;
    let opcode = emu.read_byte(pc)?;
    let meta = emu.decoder().lookup(opcode);
    emu.regs.next_pc = pc.wrapping_add(meta.length as u16);
    log::trace!("{:#06x}: {:#04x} {}", pc, opcode, meta.mnemonic);

    emu.fire_code_hooks_pub(pc, meta.length);
    if let Some(err) = emu.take_pending_error() {
        return Err(err);
    }
    if emu.stop_requested() || emu.regs.pc != pc {
        // A hook asked to stop, or redirected PC itself; either way this
        // instruction's body never runs.
        log::trace!("{:#06x}: redirected or stopped by a code hook, skipping body", pc);
        return Ok(());
    }

    let ea = addressing::resolve(emu, meta.mode, pc)?;
    let result = execute::run(emu, meta.mnemonic, ea, opcode, pc)?;
    writeback::apply(emu, meta.writeback, ea, result)?;

    emu.regs.pc = emu.regs.next_pc;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lda_immediate_loads_and_sets_flags() {
        let mut emu = Emulator::with_default_table();
        emu.mem_write(0x0200, &[0xA9, 0x00]).unwrap();
        emu.regs.pc = 0x0200;
        tick(&mut emu).unwrap();
        assert_eq!(emu.regs.a, 0x00);
        assert!(emu.regs.zero);
        assert_eq!(emu.regs.pc, 0x0202);
    }

    #[test]
    fn jmp_absolute_redirects_pc_without_writing_memory() {
        let mut emu = Emulator::with_default_table();
        emu.mem_write(0x0200, &[0x4C, 0x00, 0x30]).unwrap();
        emu.regs.pc = 0x0200;
        tick(&mut emu).unwrap();
        assert_eq!(emu.regs.pc, 0x3000);
    }

    #[test]
    fn undefined_opcode_surfaces_as_an_error() {
        let mut emu = Emulator::with_default_table();
        emu.mem_write(0x0200, &[0x02]).unwrap();
        emu.regs.pc = 0x0200;
        assert!(tick(&mut emu).is_err());
    }

    #[test]
    fn code_hook_redirecting_pc_skips_the_original_instruction() {
        let mut emu = Emulator::with_default_table();
        // NOP at 0x0200, would otherwise just advance PC to 0x0201.
        emu.mem_write(0x0200, &[0xEA]).unwrap();
        emu.regs.pc = 0x0200;
        emu.hook_add(crate::hooks::HookKind::CODE, 0x0200, 0x0201, |emu, _ev| {
            emu.regs.pc = 0x9000;
        });
        tick(&mut emu).unwrap();
        assert_eq!(emu.regs.pc, 0x9000);
    }
}
