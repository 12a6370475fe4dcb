//! The 6502 register bank: A, X, Y, SP, PC and the seven processor-status
//! flags, packed/unpacked per the layout in spec.md §3.
//!
//! Grounded in `pybeeb/CPU/Registers.py`'s `RegisterBank`: the same field
//! set, the same `ps()`/`setPS()` packing, and the same `copy`/`restore`
//! snapshot helpers used by the re-entrant `call` in [`crate::emulator`].

use bitflags::bitflags;

bitflags! {
    /// Packed processor-status byte. Bit 5 (unused) is always forced to 0,
    /// both on pack and on unpack (Open Question in spec.md §9, resolved).
    pub struct StatusFlags: u8 {
        const CARRY     = 0b0000_0001;
        const ZERO      = 0b0000_0010;
        const INTERRUPT = 0b0000_0100;
        const DECIMAL   = 0b0000_1000;
        const BREAK     = 0b0001_0000;
        const UNUSED    = 0b0010_0000;
        const OVERFLOW  = 0b0100_0000;
        const NEGATIVE  = 0b1000_0000;
    }
}

/// Register identifiers used by [`crate::emulator::Emulator::reg_read`] and
/// `reg_write`, numbered per spec.md §6's "Host facade surface".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegId {
    Pc = 1,
    Sp = 2,
    A = 3,
    X = 4,
    Y = 5,
    Ps = 6,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterBank {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub sp: u8,
    pub pc: u16,
    /// Scratch cursor used between decode and writeback; committed to `pc`
    /// at the end of each tick.
    pub next_pc: u16,

    pub carry: bool,
    pub zero: bool,
    pub interrupt_disable: bool,
    pub decimal: bool,
    pub brk: bool,
    pub overflow: bool,
    pub negative: bool,
}

impl Default for RegisterBank {
    fn default() -> Self {
        RegisterBank {
            a: 0,
            x: 0,
            y: 0,
            sp: 0xFF,
            pc: 0,
            next_pc: 0,
            carry: false,
            zero: false,
            interrupt_disable: false,
            decimal: false,
            brk: false,
            overflow: false,
            negative: false,
        }
    }
}

impl RegisterBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Packs the seven flags into a status byte. Bit 5 is always 0.
    pub fn ps(&self) -> u8 {
        let mut flags = StatusFlags::empty();
        flags.set(StatusFlags::CARRY, self.carry);
        flags.set(StatusFlags::ZERO, self.zero);
        flags.set(StatusFlags::INTERRUPT, self.interrupt_disable);
        flags.set(StatusFlags::DECIMAL, self.decimal);
        flags.set(StatusFlags::BREAK, self.brk);
        flags.set(StatusFlags::OVERFLOW, self.overflow);
        flags.set(StatusFlags::NEGATIVE, self.negative);
        flags.bits()
    }

    /// Unpacks a status byte into the seven flag fields. Bit 5 is ignored.
    pub fn set_ps(&mut self, value: u8) {
        let flags = StatusFlags::from_bits_truncate(value);
        self.carry = flags.contains(StatusFlags::CARRY);
        self.zero = flags.contains(StatusFlags::ZERO);
        self.interrupt_disable = flags.contains(StatusFlags::INTERRUPT);
        self.decimal = flags.contains(StatusFlags::DECIMAL);
        self.brk = flags.contains(StatusFlags::BREAK);
        self.overflow = flags.contains(StatusFlags::OVERFLOW);
        self.negative = flags.contains(StatusFlags::NEGATIVE);
    }

    /// Sets N and Z from an 8-bit result, as almost every ALU/load
    /// instruction does.
    pub fn set_nz(&mut self, value: u8) {
        self.zero = value == 0;
        self.negative = (value & 0x80) != 0;
    }

    /// Zeros A/X/Y/PC/next-PC, sets SP=0xFF, clears all flags. The caller
    /// (the [`crate::dispatch::Dispatcher`]) is responsible for then
    /// loading PC from the reset vector.
    pub fn reset(&mut self) {
        self.a = 0;
        self.x = 0;
        self.y = 0;
        self.pc = 0;
        self.next_pc = 0;
        self.sp = 0xFF;
        self.set_ps(0);
    }

    /// Snapshots the full register state, for the re-entrant `call` helper.
    pub fn copy(&self) -> RegisterBank {
        self.clone()
    }

    /// Restores a previously snapshotted register state.
    pub fn restore(&mut self, saved: &RegisterBank) {
        *self = saved.clone();
    }

    pub fn status_line(&self) -> String {
        format!(
            "{}{}.{}{}{}{}{} A:{:02x} X:{:02x} Y:{:02x} PC:{:04x} SP:{:02x}",
            if self.negative { "N" } else { "-" },
            if self.overflow { "V" } else { "-" },
            if self.brk { "B" } else { "-" },
            if self.decimal { "D" } else { "-" },
            if self.interrupt_disable { "I" } else { "-" },
            if self.zero { "Z" } else { "-" },
            if self.carry { "C" } else { "-" },
            self.a,
            self.x,
            self.y,
            self.pc,
            self.sp,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ps_round_trips_for_every_byte_with_bit5_forced_low() {
        for v in 0u16..=255 {
            let v = v as u8;
            let mut regs = RegisterBank::new();
            regs.set_ps(v);
            assert_eq!(regs.ps(), v & 0b1101_1111);
        }
    }

    #[test]
    fn reset_clears_registers_and_sets_sp() {
        let mut regs = RegisterBank::new();
        regs.a = 0x42;
        regs.carry = true;
        regs.pc = 0x1234;
        regs.reset();
        assert_eq!(regs.a, 0);
        assert_eq!(regs.x, 0);
        assert_eq!(regs.y, 0);
        assert_eq!(regs.pc, 0);
        assert_eq!(regs.sp, 0xFF);
        assert_eq!(regs.ps(), 0);
    }

    #[test]
    fn copy_then_restore_is_identity() {
        let mut regs = RegisterBank::new();
        regs.a = 0x11;
        regs.x = 0x22;
        regs.pc = 0xBEEF;
        regs.carry = true;
        regs.negative = true;
        let snapshot = regs.copy();

        regs.a = 0xFF;
        regs.pc = 0x0000;
        regs.carry = false;

        regs.restore(&snapshot);
        assert_eq!(regs, snapshot);
    }
}
