//! The ALU/control-flow semantics for all 56 documented mnemonics, per
//! spec.md §4.3.
//!
//! The overall per-mnemonic shape follows `cpu::instructions`'s match-based
//! dispatch style; the exact ADC/SBC overflow-flag formula and the
//! JSR/RTS/BRK/RTI stack conventions are grounded in `pybeeb/CPU/Dispatch.py`.
//! Each function returns the raw value the writeback stage should apply (or
//! `None` for instructions with no writeback target); flags are always set
//! here, never in writeback.

use crate::addressing::{read_operand, EffectiveAddress};
use crate::decoder::Mnemonic;
use crate::emulator::Emulator;
use crate::error::{EmuError, EmuResult};

pub fn run(
    emu: &mut Emulator,
    mnemonic: Mnemonic,
    ea: EffectiveAddress,
    opcode: u8,
    pc: u16,
) -> EmuResult<Option<u32>> {
    use Mnemonic::*;
    match mnemonic {
        Undefined => Err(EmuError::InvalidOpcode(opcode, pc)),

        Adc => {
            let operand = read_operand(emu, ea)?;
            let a = emu.regs.a;
            let carry_in = emu.regs.carry as u16;
            let sum = a as u16 + operand as u16 + carry_in;
            let result = sum as u8;
            emu.regs.carry = sum > 0xFF;
            emu.regs.overflow = ((a ^ result) & (operand ^ result) & 0x80) != 0;
            emu.regs.set_nz(result);
            Ok(Some(result as u32))
        }
        Sbc => {
            let operand = read_operand(emu, ea)?;
            let a = emu.regs.a;
            let borrow_in = if emu.regs.carry { 0 } else { 1 };
            let diff = a as i16 - operand as i16 - borrow_in;
            let result = diff as u8;
            emu.regs.carry = diff >= 0;
            emu.regs.overflow = ((a ^ operand) & (a ^ result) & 0x80) != 0;
            emu.regs.set_nz(result);
            Ok(Some(result as u32))
        }
        And => bitwise(emu, ea, |a, m| a & m),
        Ora => bitwise(emu, ea, |a, m| a | m),
        Eor => bitwise(emu, ea, |a, m| a ^ m),

        Asl => shift(emu, ea, |v| (v << 1, (v & 0x80) != 0)),
        Lsr => shift(emu, ea, |v| (v >> 1, (v & 0x01) != 0)),
        Rol => {
            let carry_in = emu.regs.carry as u8;
            shift(emu, ea, move |v| ((v << 1) | carry_in, (v & 0x80) != 0))
        }
        Ror => {
            let carry_in = emu.regs.carry as u8;
            shift(emu, ea, move |v| ((v >> 1) | (carry_in << 7), (v & 0x01) != 0))
        }

        Inc => {
            let v = read_operand(emu, ea)?.wrapping_add(1);
            emu.regs.set_nz(v);
            Ok(Some(v as u32))
        }
        Dec => {
            let v = read_operand(emu, ea)?.wrapping_sub(1);
            emu.regs.set_nz(v);
            Ok(Some(v as u32))
        }
        Inx => {
            let v = emu.regs.x.wrapping_add(1);
            emu.regs.set_nz(v);
            Ok(Some(v as u32))
        }
        Iny => {
            let v = emu.regs.y.wrapping_add(1);
            emu.regs.set_nz(v);
            Ok(Some(v as u32))
        }
        Dex => {
            let v = emu.regs.x.wrapping_sub(1);
            emu.regs.set_nz(v);
            Ok(Some(v as u32))
        }
        Dey => {
            let v = emu.regs.y.wrapping_sub(1);
            emu.regs.set_nz(v);
            Ok(Some(v as u32))
        }

        Lda => load(emu, ea),
        Ldx => load(emu, ea),
        Ldy => load(emu, ea),

        Sta => Ok(Some(emu.regs.a as u32)),
        Stx => Ok(Some(emu.regs.x as u32)),
        Sty => Ok(Some(emu.regs.y as u32)),

        Cmp => {
            let reg = emu.regs.a;
            compare(emu, ea, reg)
        }
        Cpx => {
            let reg = emu.regs.x;
            compare(emu, ea, reg)
        }
        Cpy => {
            let reg = emu.regs.y;
            compare(emu, ea, reg)
        }

        Bit => {
            let operand = read_operand(emu, ea)?;
            emu.regs.zero = (emu.regs.a & operand) == 0;
            emu.regs.negative = (operand & 0x80) != 0;
            emu.regs.overflow = (operand & 0x40) != 0;
            Ok(None)
        }

        Bcc => {
            let taken = !emu.regs.carry;
            branch(emu, ea, taken)
        }
        Bcs => {
            let taken = emu.regs.carry;
            branch(emu, ea, taken)
        }
        Beq => {
            let taken = emu.regs.zero;
            branch(emu, ea, taken)
        }
        Bne => {
            let taken = !emu.regs.zero;
            branch(emu, ea, taken)
        }
        Bpl => {
            let taken = !emu.regs.negative;
            branch(emu, ea, taken)
        }
        Bmi => {
            let taken = emu.regs.negative;
            branch(emu, ea, taken)
        }
        Bvc => {
            let taken = !emu.regs.overflow;
            branch(emu, ea, taken)
        }
        Bvs => {
            let taken = emu.regs.overflow;
            branch(emu, ea, taken)
        }

        Jmp => match ea {
            EffectiveAddress::Memory(addr) => Ok(Some(addr as u32)),
            _ => unreachable!("JMP always resolves to a memory target"),
        },
        Jsr => match ea {
            EffectiveAddress::Memory(addr) => {
                let return_addr = emu.regs.next_pc.wrapping_sub(1);
                emu.push_word(return_addr)?;
                Ok(Some(addr as u32))
            }
            _ => unreachable!("JSR always resolves to a memory target"),
        },
        Rts => {
            let addr = emu.pull_word()?;
            Ok(Some(addr.wrapping_add(1) as u32))
        }
        Brk => {
            let return_addr = emu.regs.next_pc.wrapping_add(1);
            emu.push_word(return_addr)?;
            // The pushed copy always carries the break bit; the unused bit
            // stays 0, consistent with `ps()` always packing it that way
            // (spec.md §9's bit-5 Open Question).
            emu.push_byte(emu.regs.ps() | 0b0001_0000)?;
            emu.regs.interrupt_disable = true;
            let target = emu.read_word(0xFFFE)?;
            Ok(Some(target as u32))
        }
        Rti => {
            let ps = emu.pull_byte()?;
            emu.regs.set_ps(ps);
            let target = emu.pull_word()?;
            Ok(Some(target as u32))
        }

        Pha => {
            emu.push_byte(emu.regs.a)?;
            Ok(None)
        }
        Php => {
            emu.push_byte(emu.regs.ps() | 0b0001_0000)?;
            Ok(None)
        }
        Pla => {
            let v = emu.pull_byte()?;
            emu.regs.set_nz(v);
            Ok(Some(v as u32))
        }
        Plp => {
            let v = emu.pull_byte()?;
            Ok(Some(v as u32))
        }

        Clc => {
            emu.regs.carry = false;
            Ok(None)
        }
        Sec => {
            emu.regs.carry = true;
            Ok(None)
        }
        Cli => {
            emu.regs.interrupt_disable = false;
            Ok(None)
        }
        Sei => {
            emu.regs.interrupt_disable = true;
            Ok(None)
        }
        Cld => {
            emu.regs.decimal = false;
            Ok(None)
        }
        Sed => {
            emu.regs.decimal = true;
            Ok(None)
        }
        Clv => {
            emu.regs.overflow = false;
            Ok(None)
        }

        Tax => {
            let v = emu.regs.a;
            transfer(emu, v, true)
        }
        Tay => {
            let v = emu.regs.a;
            transfer(emu, v, true)
        }
        Txa => {
            let v = emu.regs.x;
            transfer(emu, v, true)
        }
        Tya => {
            let v = emu.regs.y;
            transfer(emu, v, true)
        }
        Tsx => {
            let v = emu.regs.sp;
            transfer(emu, v, true)
        }
        Txs => {
            let v = emu.regs.x;
            transfer(emu, v, false)
        }

        Nop => Ok(None),
    }
}

fn bitwise(emu: &mut Emulator, ea: EffectiveAddress, f: impl Fn(u8, u8) -> u8) -> EmuResult<Option<u32>> {
    let operand = read_operand(emu, ea)?;
    let result = f(emu.regs.a, operand);
    emu.regs.set_nz(result);
    Ok(Some(result as u32))
}

/// Shared shift/rotate body: `f` maps the input byte to `(result, carry_out)`.
fn shift(emu: &mut Emulator, ea: EffectiveAddress, f: impl Fn(u8) -> (u8, bool)) -> EmuResult<Option<u32>> {
    let operand = read_operand(emu, ea)?;
    let (result, carry_out) = f(operand);
    emu.regs.carry = carry_out;
    emu.regs.set_nz(result);
    Ok(Some(result as u32))
}

fn load(emu: &mut Emulator, ea: EffectiveAddress) -> EmuResult<Option<u32>> {
    let v = read_operand(emu, ea)?;
    emu.regs.set_nz(v);
    Ok(Some(v as u32))
}

fn compare(emu: &mut Emulator, ea: EffectiveAddress, reg: u8) -> EmuResult<Option<u32>> {
    let operand = read_operand(emu, ea)?;
    let diff = reg.wrapping_sub(operand);
    emu.regs.carry = reg >= operand;
    emu.regs.zero = reg == operand;
    emu.regs.negative = (diff & 0x80) != 0;
    Ok(None)
}

fn branch(emu: &mut Emulator, ea: EffectiveAddress, taken: bool) -> EmuResult<Option<u32>> {
    match ea {
        EffectiveAddress::Relative(target) => {
            Ok(Some(if taken { target as u32 } else { emu.regs.next_pc as u32 }))
        }
        _ => unreachable!("branches always resolve to a relative target"),
    }
}

/// `TAX`/`TAY`/`TXA`/`TYA`/`TSX` update N/Z; `TXS` does not.
fn transfer(emu: &mut Emulator, value: u8, sets_flags: bool) -> EmuResult<Option<u32>> {
    if sets_flags {
        emu.regs.set_nz(value);
    }
    Ok(Some(value as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing::EffectiveAddress as Ea;

    fn emu() -> Emulator {
        Emulator::with_default_table()
    }

    #[test]
    fn adc_sets_overflow_and_carry_on_signed_overflow() {
        let mut e = emu();
        e.regs.a = 0x50;
        e.regs.carry = false;
        let result = run(&mut e, Mnemonic::Adc, Ea::Immediate(0x50), 0x69, 0x0000).unwrap();
        assert_eq!(result, Some(0xA0));
        assert!(e.regs.negative);
        assert!(e.regs.overflow);
        assert!(!e.regs.carry);
        assert!(!e.regs.zero);
    }

    #[test]
    fn sbc_borrows_when_carry_clear() {
        let mut e = emu();
        e.regs.a = 0x10;
        e.regs.carry = false; // borrow in
        let result = run(&mut e, Mnemonic::Sbc, Ea::Immediate(0x05), 0xE9, 0x0000).unwrap();
        assert_eq!(result, Some(0x0A));
        assert!(e.regs.carry); // no further borrow needed
    }

    #[test]
    fn undefined_opcode_is_a_hard_error() {
        let mut e = emu();
        let err = run(&mut e, Mnemonic::Undefined, Ea::Implicit, 0x02, 0x4000).unwrap_err();
        match err {
            EmuError::InvalidOpcode(op, pc) => {
                assert_eq!(op, 0x02);
                assert_eq!(pc, 0x4000);
            }
            other => panic!("expected InvalidOpcode, got {other:?}"),
        }
    }

    #[test]
    fn jsr_pushes_return_address_minus_one() {
        let mut e = emu();
        e.regs.sp = 0xFF;
        e.regs.next_pc = 0x1203;
        let result = run(&mut e, Mnemonic::Jsr, Ea::Memory(0x9000), 0x20, 0x1200).unwrap();
        assert_eq!(result, Some(0x9000));
        let pulled = e.pull_word().unwrap();
        assert_eq!(pulled, 0x1202);
    }

    #[test]
    fn branch_not_taken_leaves_next_pc_unchanged() {
        let mut e = emu();
        e.regs.next_pc = 0x0502;
        e.regs.carry = false;
        let result = run(&mut e, Mnemonic::Bcs, Ea::Relative(0x0600), 0xB0, 0x0500).unwrap();
        assert_eq!(result, Some(0x0502));
    }

    #[test]
    fn txs_does_not_touch_flags() {
        let mut e = emu();
        e.regs.x = 0x00;
        e.regs.zero = false;
        run(&mut e, Mnemonic::Txs, Ea::Implicit, 0x9A, 0x0000).unwrap();
        assert!(!e.regs.zero);
    }
}
