//! Session-level engine for the ITv2/TLink panel protocol: the
//! transaction/correlation state machine, the per-connection session
//! actor (handshake, heartbeat, flush gate, outbound sends), the session
//! registry, panel state, and the inbound notification dispatcher.
//!
//! Built on `itv2-wire` for framing, encryption, and message encoding;
//! this crate owns everything above a single frame.

pub mod dispatch;
pub mod error;
pub mod registry;
pub mod session;
pub mod state;
pub mod transaction;

pub use error::EngineError;
pub use registry::{SessionLifecycleEvent, SessionRegistry, SharedSessionRegistry};
pub use session::{InboundNotification, Session, SessionConfig, SessionHandle};
pub use state::{PanelStateChange, PanelStateStore, PartitionState, PartitionStatus, ZoneState};
pub use transaction::{Direction, Transaction, TransactionResult};
