//! Plain 6502 disassembly of a byte range, for the `--disassemble` CLI flag.
//!
//! The per-addressing-mode `Display` layout follows `cpu::disassembler::
//! disassemble`/`InstructionDeNovo`'s formatting conventions, but is driven
//! off [`crate::decoder::InstructionDecoder`]'s table instead of a second
//! hand-written opcode match, so the disassembler and the execution engine
//! can never disagree about what an opcode means. This stays a thin
//! front-end: it does not track cycles or attempt to separate code from
//! data.

use byteorder::{ByteOrder, LittleEndian};

use crate::decoder::{AddressingMode, InstructionDecoder};

/// One disassembled instruction: its address, raw bytes, and decoded shape.
#[derive(Debug, Clone)]
pub struct DisassembledLine {
    pub address: u16,
    pub opcode: u8,
    pub mnemonic: &'static str,
    pub mode: AddressingMode,
    pub operands: Vec<u8>,
}

impl std::fmt::Display for DisassembledLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use AddressingMode::*;
        let hex: String = self.operands.iter().map(|b| format!("{:02X}", b)).collect();
        match self.mode {
            ZeroPage => write!(f, "${:04X}  {:02X}{}  {} ${}", self.address, self.opcode, hex, self.mnemonic, hex),
            ZeroPageX => write!(f, "${:04X}  {:02X}{}  {} ${:02X},X", self.address, self.opcode, hex, self.mnemonic, self.operands[0]),
            ZeroPageY => write!(f, "${:04X}  {:02X}{}  {} ${:02X},Y", self.address, self.opcode, hex, self.mnemonic, self.operands[0]),
            Absolute => write!(f, "${:04X}  {:02X}{}  {} ${}", self.address, self.opcode, hex, self.mnemonic, little_endian_hex(&self.operands)),
            AbsoluteX => write!(f, "${:04X}  {:02X}{}  {} ${},X", self.address, self.opcode, hex, self.mnemonic, little_endian_hex(&self.operands)),
            AbsoluteY => write!(f, "${:04X}  {:02X}{}  {} ${},Y", self.address, self.opcode, hex, self.mnemonic, little_endian_hex(&self.operands)),
            Indirect => write!(f, "${:04X}  {:02X}{}  {} (${})", self.address, self.opcode, hex, self.mnemonic, little_endian_hex(&self.operands)),
            Implicit => write!(f, "${:04X}  {:02X}    {}", self.address, self.opcode, self.mnemonic),
            Accumulator => write!(f, "${:04X}  {:02X}    {} A", self.address, self.opcode, self.mnemonic),
            Immediate => write!(f, "${:04X}  {:02X}{}  {} #${:02X}", self.address, self.opcode, hex, self.mnemonic, self.operands[0]),
            Relative => {
                let offset = self.operands[0] as i8;
                let target = (self.address as i32 + 2 + offset as i32) as u16;
                write!(f, "${:04X}  {:02X}{}  {} ${:04X}", self.address, self.opcode, hex, self.mnemonic, target)
            }
            IndexedIndirect => write!(f, "${:04X}  {:02X}{}  {} (${:02X},X)", self.address, self.opcode, hex, self.mnemonic, self.operands[0]),
            IndirectIndexed => write!(f, "${:04X}  {:02X}{}  {} (${:02X}),Y", self.address, self.opcode, hex, self.mnemonic, self.operands[0]),
        }
    }
}

fn little_endian_hex(operands: &[u8]) -> String {
    match operands.len() {
        2 => format!("{:04X}", LittleEndian::read_u16(operands)),
        n => operands.iter().map(|b| format!("{:02X}", b)).take(n).collect(),
    }
}

/// Disassembles `bytes` starting at `base_addr`, one instruction per entry,
/// stopping when fewer bytes remain than the next opcode's length demands.
pub fn disassemble(decoder: &InstructionDecoder, bytes: &[u8], base_addr: u16) -> Vec<DisassembledLine> {
    let mut lines = Vec::new();
    let mut pc = 0usize;
    while pc < bytes.len() {
        let opcode = bytes[pc];
        let meta = decoder.lookup(opcode);
        let length = meta.length as usize;
        if pc + length > bytes.len() {
            break;
        }
        let operands = bytes[pc + 1..pc + length].to_vec();
        lines.push(DisassembledLine {
            address: base_addr.wrapping_add(pc as u16),
            opcode,
            mnemonic: meta.mnemonic.name(),
            mode: meta.mode,
            operands,
        });
        pc += length;
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disassembles_a_short_known_sequence() {
        let decoder = InstructionDecoder::default_table();
        // LDA #$42 ; STA $2000 ; RTS
        let bytes = [0xA9, 0x42, 0x8D, 0x00, 0x20, 0x60];
        let lines = disassemble(&decoder, &bytes, 0x0900);

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].mnemonic, "LDA");
        assert_eq!(lines[0].address, 0x0900);
        assert_eq!(lines[1].mnemonic, "STA");
        assert_eq!(lines[1].address, 0x0902);
        assert_eq!(lines[2].mnemonic, "RTS");
        assert_eq!(lines[2].address, 0x0905);
    }

    #[test]
    fn stops_short_of_a_truncated_trailing_instruction() {
        let decoder = InstructionDecoder::default_table();
        let bytes = [0xA9]; // LDA #imm, but the operand byte is missing
        let lines = disassemble(&decoder, &bytes, 0x0000);
        assert!(lines.is_empty());
    }

    #[test]
    fn relative_branch_formats_its_resolved_target() {
        let decoder = InstructionDecoder::default_table();
        let bytes = [0xF0, 0xFE]; // BEQ -2 (branch to self)
        let lines = disassemble(&decoder, &bytes, 0x0500);
        let text = format!("{}", lines[0]);
        assert!(text.contains("$0500"), "expected resolved branch target in {text:?}");
    }
}
