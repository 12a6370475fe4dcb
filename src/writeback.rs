//! Routes an execution result to its register or memory destination, per
//! spec.md §4.4. Never touches flags — `execute::run` already set every
//! flag the instruction affects before returning its result.

use crate::addressing::EffectiveAddress;
use crate::decoder::WritebackTarget;
use crate::emulator::Emulator;
use crate::error::EmuResult;

pub fn apply(
    emu: &mut Emulator,
    target: WritebackTarget,
    ea: EffectiveAddress,
    value: Option<u32>,
) -> EmuResult<()> {
    if target == WritebackTarget::Nw {
        return Ok(());
    }
    let value = value.expect("non-NW writeback target produced no value");
    match target {
        WritebackTarget::A => emu.regs.a = value as u8,
        WritebackTarget::X => emu.regs.x = value as u8,
        WritebackTarget::Y => emu.regs.y = value as u8,
        WritebackTarget::Sp => emu.regs.sp = value as u8,
        WritebackTarget::Ps => emu.regs.set_ps(value as u8),
        WritebackTarget::Pc => emu.regs.next_pc = value as u16,
        WritebackTarget::M => match ea {
            EffectiveAddress::Memory(addr) => emu.write_byte(addr, value as u8)?,
            other => unreachable!("M writeback target paired with non-memory operand {other:?}"),
        },
        WritebackTarget::Nw => unreachable!(),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn m_target_writes_through_to_memory() {
        let mut emu = Emulator::with_default_table();
        apply(&mut emu, WritebackTarget::M, EffectiveAddress::Memory(0x2000), Some(0x55)).unwrap();
        assert_eq!(emu.read_byte(0x2000).unwrap(), 0x55);
    }

    #[test]
    fn nw_target_ignores_a_missing_value() {
        let mut emu = Emulator::with_default_table();
        apply(&mut emu, WritebackTarget::Nw, EffectiveAddress::Implicit, None).unwrap();
    }

    #[test]
    fn pc_target_sets_next_pc_not_pc_directly() {
        let mut emu = Emulator::with_default_table();
        emu.regs.pc = 0x1000;
        apply(&mut emu, WritebackTarget::Pc, EffectiveAddress::Memory(0x2000), Some(0x3000)).unwrap();
        assert_eq!(emu.regs.pc, 0x1000);
        assert_eq!(emu.regs.next_pc, 0x3000);
    }
}
