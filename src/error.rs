//! The core's closed error taxonomy (spec.md §7).
//!
//! Every fallible core operation returns `Result<T, TacitError>`. The host
//! binary is free to wrap this in `anyhow::Error` once it needs to attach
//! file/line context of its own; the core itself never trades in
//! `anyhow::Error` so callers can still match on `TacitError`'s variants.

use crate::diag::StackSnapshot;

pub type Result<T> = std::result::Result<T, TacitError>;

#[derive(Debug, thiserror::Error)]
pub enum TacitError {
    #[error("stack underflow in `{op}`: needs {needed}, have {available}")]
    StackUnderflow {
        op: &'static str,
        needed: usize,
        available: usize,
        stack: StackSnapshot,
    },

    #[error("stack overflow in `{op}`")]
    StackOverflow {
        op: &'static str,
        stack: StackSnapshot,
    },

    #[error("return stack underflow in `{op}`")]
    ReturnStackUnderflow {
        op: &'static str,
        stack: StackSnapshot,
    },

    #[error("return stack overflow in `{op}`")]
    ReturnStackOverflow {
        op: &'static str,
        stack: StackSnapshot,
    },

    #[error("syntax error at {line}:{col}: {message}")]
    Syntax {
        message: String,
        line: u32,
        col: u32,
    },

    #[error("unknown word `{name}`")]
    UnknownWord { name: String },

    #[error("type mismatch in `{op}`: {message}")]
    TypeMismatch { op: &'static str, message: String },

    #[error("out of bounds: {segment} address {addr}")]
    OutOfBounds { segment: &'static str, addr: usize },

    #[error("string digest exhausted")]
    DigestOverflow,

    #[error("string longer than 255 bytes")]
    StringTooLong,

    #[error("global heap exhausted")]
    HeapExhausted,

    #[error("invalid opcode 0x{opcode:02x} at ip {ip}")]
    InvalidOpcode { opcode: u8, ip: usize },

    #[error("division by zero in `{op}`")]
    DivisionByZero { op: &'static str },

    #[error("fatal VM invariant violation: {0}")]
    Fatal(String),
}

impl TacitError {
    /// `true` for kinds spec.md §7 calls fatal-to-the-current-execution but
    /// recoverable from the host (everything except `Fatal` itself, which
    /// is the catch-all for invariant violations the host should not try
    /// to paper over).
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, TacitError::Fatal(_))
    }
}
