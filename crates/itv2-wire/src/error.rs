use thiserror::Error;

/// Errors raised by the wire-level layer: framing, encryption, and the
/// binary codec. These are always fatal to the owning session (see
/// `itv2_engine::error::EngineError` for the broader taxonomy).
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum WireError {
    #[error("framing error: {0}")]
    Framing(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("crypto check failed: {0}")]
    CryptoCheck(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("command {0:#06x} is not registered")]
    UnknownCommand(u16),

    #[error("record type is not registered for outbound send")]
    NotRegistered,

    #[error("duplicate command code {0:#06x} in registry")]
    DuplicateCommand(u16),
}
