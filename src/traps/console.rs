//! The character I/O collaborator traps call into, per spec.md §4.8's
//! "external adapter" boundary.
//!
//! Grounded in `pybeeb/Host/hosttty.py`'s `OSWRCHtty`/`OSRDCHtty`/
//! `OSWORDtty`, which wrap a raw-mode terminal; the raw-mode driver itself
//! is out of scope (spec.md §1), so only the trait and an in-process
//! buffered double ship here.

/// A character sink/source a host plugs into the OS-call traps.
pub trait ConsoleDevice {
    /// Writes one BBC VDU code to the output stream.
    fn write_byte(&mut self, ch: u8);

    /// Reads one byte, or `None` on end-of-input (mirrors
    /// `InputEOFError` in the original).
    fn read_byte(&mut self) -> Option<u8>;

    /// Reads a line (used by `OSWORD 0`), returning at most `max_len - 1`
    /// characters plus a trailing `\r`. `None` signals end-of-input.
    fn read_line(&mut self, max_len: usize) -> Option<Vec<u8>>;
}

/// An in-process console that records written bytes and replays a queued
/// input script. Used by tests and by any host that doesn't want a real
/// terminal.
#[derive(Default)]
pub struct BufferedConsole {
    pub output: Vec<u8>,
    input: std::collections::VecDeque<u8>,
}

impl BufferedConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(bytes: impl IntoIterator<Item = u8>) -> Self {
        BufferedConsole { output: Vec::new(), input: bytes.into_iter().collect() }
    }

    pub fn feed(&mut self, bytes: impl IntoIterator<Item = u8>) {
        self.input.extend(bytes);
    }
}

impl ConsoleDevice for BufferedConsole {
    fn write_byte(&mut self, ch: u8) {
        self.output.push(ch);
    }

    fn read_byte(&mut self) -> Option<u8> {
        self.input.pop_front()
    }

    fn read_line(&mut self, max_len: usize) -> Option<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            let b = self.input.pop_front()?;
            if b == 0x0D || out.len() + 1 >= max_len {
                out.push(0x0D);
                break;
            }
            out.push(b);
        }
        Some(out)
    }
}

/// A line-buffered stdio console for the CLI binary. Not the raw-mode TTY
/// driver spec.md §1 excludes — it reads whole lines via the standard
/// library and never touches terminal modes — but it is enough to drive
/// `OSRDCH`/`OSWRCH`/`OSWORD 0` against a real process's stdin/stdout.
pub struct StdioConsole {
    pending: std::collections::VecDeque<u8>,
}

impl StdioConsole {
    pub fn new() -> Self {
        StdioConsole { pending: std::collections::VecDeque::new() }
    }

    fn refill(&mut self) -> bool {
        use std::io::BufRead;
        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) => false,
            Ok(_) => {
                self.pending.extend(line.into_bytes());
                true
            }
            Err(_) => false,
        }
    }
}

impl Default for StdioConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleDevice for StdioConsole {
    fn write_byte(&mut self, ch: u8) {
        use std::io::Write;
        let mut out = std::io::stdout();
        let _ = out.write_all(&[ch]);
        let _ = out.flush();
    }

    fn read_byte(&mut self) -> Option<u8> {
        if self.pending.is_empty() && !self.refill() {
            return None;
        }
        self.pending.pop_front()
    }

    fn read_line(&mut self, max_len: usize) -> Option<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            let b = self.read_byte()?;
            if b == b'\n' || out.len() + 1 >= max_len {
                out.push(0x0D);
                break;
            }
            if b != b'\r' {
                out.push(b);
            }
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffered_console_records_output() {
        let mut console = BufferedConsole::new();
        console.write_byte(b'A');
        console.write_byte(b'B');
        assert_eq!(console.output, b"AB");
    }

    #[test]
    fn read_line_stops_at_carriage_return() {
        let mut console = BufferedConsole::with_input(b"HELLO\rWORLD".iter().copied());
        let line = console.read_line(8).unwrap();
        assert_eq!(line, b"HELLO\r");
    }

    #[test]
    fn read_byte_returns_none_at_end_of_input() {
        let mut console = BufferedConsole::new();
        assert_eq!(console.read_byte(), None);
    }
}
