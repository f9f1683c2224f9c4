use itv2_wire::WireError;
use thiserror::Error;

/// The engine-level error taxonomy (error handling design §7). Every
/// variant here is surfaced through a `Result`, never an unwinding panic
/// crossing a task boundary.
#[derive(Debug, Error, Clone)]
pub enum EngineError {
    /// External cancellation or session shutdown while a call was pending.
    #[error("operation cancelled")]
    Cancelled,

    /// A transaction's deadline elapsed, or a lock wait exceeded its bound.
    #[error("operation timed out")]
    Timeout,

    /// Transport EOF or abrupt close. Always fatal to the owning session.
    #[error("session disconnected")]
    Disconnected,

    /// A `SimpleAck`/`CommandResponse` arrived in a state not expecting it.
    #[error("unexpected response for the current transaction state")]
    UnexpectedResponse,

    /// The panel signalled `CommandError`, or a `CommandResponse` carried a
    /// non-success status code.
    #[error("panel rejected the command (nack {0:#04x})")]
    NackCode(u8),

    /// Attempted to begin an inbound `CommandRequest`-pattern transaction;
    /// the pattern is outbound-only.
    #[error("CommandRequest pattern cannot be initiated inbound")]
    ProtocolViolation,

    /// No session is registered under the requested identifier.
    #[error("session {0:?} not found")]
    SessionNotFound(String),

    /// A wire-level (framing/encoding/codec/crypto) failure. Always fatal
    /// to the owning session.
    #[error(transparent)]
    Wire(#[from] WireError),
}

impl EngineError {
    /// Whether this error closes the owning session (§7) as opposed to
    /// being scoped to one transaction.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Wire(_))
    }
}
