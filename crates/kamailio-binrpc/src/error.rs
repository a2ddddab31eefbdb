//! Error types for the BINRPC codec and transport.

use thiserror::Error;

/// Result type alias for BINRPC operations.
pub type BinRpcResult<T> = Result<T, BinRpcError>;

/// Errors raised while framing, encoding, decoding or exchanging packets.
#[derive(Debug, Error)]
pub enum BinRpcError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("invalid packet magic/version byte: {0:#04x}")]
    BadMagic(u8),

    #[error("payload of {0} bytes exceeds the 16 MiB limit")]
    PayloadTooLarge(usize),

    #[error("reply cookie {got:#010x} does not match request cookie {expected:#010x}")]
    CookieMismatch { expected: u32, got: u32 },

    #[error("truncated record: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("unknown record type: {0:#x}")]
    UnknownType(u8),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("cannot generate cookie: {0}")]
    Cookie(String),
}
