use thiserror::Error;

/// Error raised by trap handlers to signal a guest-visible BBC error.
///
/// Recovered at the trap boundary: written into the error block at 0x0100
/// and turned into a guest control transfer rather than propagated to the
/// host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BbcError {
    pub errnum: u8,
    pub errmess: String,
}

impl BbcError {
    pub fn new(errnum: u8, errmess: impl Into<String>) -> Self {
        BbcError { errnum, errmess: errmess.into() }
    }
}

impl std::fmt::Display for BbcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BBC error {:#04x}: {}", self.errnum, self.errmess)
    }
}

impl std::error::Error for BbcError {}

#[derive(Debug, Error)]
pub enum EmuError {
    #[error("invalid address: {0:#06x}")]
    InvalidAddress(i64),

    #[error("value out of range: {0}")]
    ValueOutOfRange(i64),

    #[error("execution of undefined opcode {0:#04x} at {1:#06x}")]
    InvalidOpcode(u8, u16),

    #[error("stack overflow (push with sp < 0)")]
    StackOverflow,

    #[error("stack underflow (pull with sp > 0xff)")]
    StackUnderflow,

    #[error(transparent)]
    BbcError(#[from] BbcError),

    #[error("input stream reached end of file")]
    InputEof,

    #[error("bad file handle: {0}")]
    BadFileHandle(u8),

    #[error("no free file handles")]
    NoFileHandles,

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("directory not found: {0}")]
    DirNotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to load instruction table: {0}")]
    DecoderLoad(String),
}

pub type EmuResult<T> = Result<T, EmuError>;
