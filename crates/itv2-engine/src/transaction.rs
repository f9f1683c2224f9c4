//! Transaction state machines (component C5).
//!
//! Three patterns, each a small machine driven by [`Transaction::offer`].
//! A session holds its pending transactions by value and passes each
//! offered packet to them in insertion order; the first to consume it wins
//! (§4.5). Transactions never hold a reference back to their owning
//! session — outbound sends they need to perform are returned to the
//! caller as data ([`BeginOutcome`], [`OfferOutcome`]) rather than invoked
//! directly, so there is no session/transaction reference cycle.

use tokio::sync::oneshot;
use tokio::time::Instant;

use itv2_wire::messages::{CommandRequestMessage, CommandResponse, MessageRecord, SimpleAck, TransactionPattern};
use itv2_wire::CommandCode;

use crate::error::EngineError;

pub type TransactionResult = Result<MessageRecord, EngineError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Which sequence counter, captured at transaction start, correlates
/// future packets to this transaction (§4.5 Correlation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationKey {
    pub direction: Direction,
    /// Inbound: the peer's `senderSeq` observed on the initiating packet.
    /// Outbound: our `localSeq` at the moment the initiating packet was sent.
    pub seq: u8,
}

/// A packet offered to a transaction for correlation, stripped to the
/// fields `offer` needs.
#[derive(Debug, Clone, Copy)]
pub struct OfferedSeq {
    pub sender_seq: u8,
    pub receiver_seq: u8,
}

impl CorrelationKey {
    fn matches(&self, offered: OfferedSeq) -> bool {
        match self.direction {
            Direction::Inbound => offered.sender_seq == self.seq,
            Direction::Outbound => offered.receiver_seq == self.seq,
        }
    }
}

#[derive(Debug)]
enum TxnState {
    SimpleAckOutboundWaitingAck,
    CommandResponseOutboundWaitingResponse,
    CommandResponseOutboundWaitingAck { nack: Option<u8> },
    CommandResponseInboundWaitingAck,
    CommandRequestOutboundWaiting { requested_command: CommandCode },
}

/// What the caller must do as a direct consequence of starting a
/// transaction: usually transmit the initiating record (or, for an
/// inbound `CommandResponse`, transmit the immediate reply).
pub struct BeginOutcome {
    pub send: Option<MessageRecord>,
    /// `Some` when the transaction is already finished at creation time
    /// (the `SimpleAck` inbound pattern completes as soon as its ack is
    /// queued, so callers handle it without ever storing a `Transaction`).
    pub completed: Option<TransactionResult>,
}

/// What the caller must do after offering a packet to a pending
/// transaction.
pub enum OfferOutcome {
    /// This transaction's correlation key didn't match, or it matched but
    /// the message wasn't of a type this transaction cares about; try the
    /// next pending transaction, or start a new inbound one.
    NotHandled,
    /// The packet was consumed by this transaction.
    Handled {
        send: Option<MessageRecord>,
        completed: Option<TransactionResult>,
    },
}

pub struct Transaction {
    pub pattern: TransactionPattern,
    pub correlation: CorrelationKey,
    pub initiating: MessageRecord,
    pub deadline: Option<Instant>,
    state: TxnState,
    result_tx: Option<oneshot::Sender<TransactionResult>>,
}

impl Transaction {
    /// Begin an outbound transaction for `initiating`, whose physical send
    /// the caller must perform (§4.6.5: "begin-outbound... performs the
    /// wire send").
    pub fn begin_outbound(
        initiating: MessageRecord,
        local_seq_at_send: u8,
        deadline: Option<Instant>,
        result_tx: oneshot::Sender<TransactionResult>,
    ) -> (Self, BeginOutcome) {
        let pattern = initiating.pattern();
        let state = match pattern {
            TransactionPattern::SimpleAck => TxnState::SimpleAckOutboundWaitingAck,
            TransactionPattern::CommandResponse => TxnState::CommandResponseOutboundWaitingResponse,
            TransactionPattern::CommandRequest => {
                let requested_command = match &initiating {
                    MessageRecord::CommandRequest(CommandRequestMessage {
                        requested_command,
                        ..
                    }) => *requested_command,
                    _ => unreachable!("CommandRequest pattern without a CommandRequestMessage"),
                };
                TxnState::CommandRequestOutboundWaiting { requested_command }
            }
        };
        let txn = Self {
            pattern,
            correlation: CorrelationKey {
                direction: Direction::Outbound,
                seq: local_seq_at_send,
            },
            initiating: initiating.clone(),
            deadline,
            state,
            result_tx: Some(result_tx),
        };
        (
            txn,
            BeginOutcome {
                send: Some(initiating),
                completed: None,
            },
        )
    }

    /// Begin an inbound transaction for a just-received `initiating`
    /// record whose pattern is `CommandResponse` (the only inbound
    /// pattern that remains pending after its first reply). `SimpleAck`
    /// inbound completes synchronously and should be handled by the
    /// caller without constructing a `Transaction` at all; `CommandRequest`
    /// cannot be initiated inbound (§4.5) and is rejected here.
    pub fn begin_inbound(
        initiating: MessageRecord,
        remote_seq_at_receipt: u8,
        deadline: Option<Instant>,
    ) -> Result<(Self, BeginOutcome), EngineError> {
        let pattern = initiating.pattern();
        match pattern {
            TransactionPattern::CommandResponse => {
                let txn = Self {
                    pattern,
                    correlation: CorrelationKey {
                        direction: Direction::Inbound,
                        seq: remote_seq_at_receipt,
                    },
                    initiating: initiating.clone(),
                    deadline,
                    state: TxnState::CommandResponseInboundWaitingAck,
                    result_tx: None,
                };
                let reply = MessageRecord::CommandResponse(CommandResponse {
                    status_code: CommandResponse::SUCCESS,
                });
                Ok((
                    txn,
                    BeginOutcome {
                        send: Some(reply),
                        completed: None,
                    },
                ))
            }
            TransactionPattern::CommandRequest => Err(EngineError::ProtocolViolation),
            TransactionPattern::SimpleAck => unreachable!(
                "SimpleAck inbound transactions complete at creation and are never constructed"
            ),
        }
    }

    /// Build the synchronous `SimpleAck`-pattern inbound outcome: ack the
    /// peer and hand the originating record straight to the dispatcher.
    /// No `Transaction` value is produced.
    pub fn complete_simple_ack_inbound(initiating: MessageRecord) -> BeginOutcome {
        BeginOutcome {
            send: Some(MessageRecord::SimpleAck(SimpleAck)),
            completed: Some(Ok(initiating)),
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|d| now >= d)
    }

    /// Resolve this transaction's waiting caller (outbound only; inbound
    /// transactions have no caller to notify).
    pub fn resolve(mut self, result: TransactionResult) {
        if let Some(tx) = self.result_tx.take() {
            let _ = tx.send(result);
        }
    }

    /// Offer an inbound packet to this pending transaction.
    pub fn offer(&mut self, seq: OfferedSeq, message: &MessageRecord) -> OfferOutcome {
        if !self.correlation.matches(seq) {
            return OfferOutcome::NotHandled;
        }

        match (&self.state, message) {
            // --- SimpleAck outbound ---
            (TxnState::SimpleAckOutboundWaitingAck, MessageRecord::SimpleAck(_)) => {
                OfferOutcome::Handled {
                    send: None,
                    completed: Some(Ok(self.initiating.clone())),
                }
            }
            (TxnState::SimpleAckOutboundWaitingAck, MessageRecord::CommandError(e)) => {
                OfferOutcome::Handled {
                    send: None,
                    completed: Some(Err(EngineError::NackCode(e.nack_code))),
                }
            }
            (TxnState::SimpleAckOutboundWaitingAck, MessageRecord::CommandResponse(_)) => {
                unexpected()
            }

            // --- CommandResponse outbound, first leg ---
            (TxnState::CommandResponseOutboundWaitingResponse, MessageRecord::CommandResponse(r)) => {
                let nack = if r.is_success() { None } else { Some(r.status_code) };
                self.state = TxnState::CommandResponseOutboundWaitingAck { nack };
                OfferOutcome::Handled {
                    send: Some(MessageRecord::SimpleAck(SimpleAck)),
                    completed: None,
                }
            }
            (TxnState::CommandResponseOutboundWaitingResponse, MessageRecord::CommandError(e)) => {
                OfferOutcome::Handled {
                    send: None,
                    completed: Some(Err(EngineError::NackCode(e.nack_code))),
                }
            }
            (TxnState::CommandResponseOutboundWaitingResponse, MessageRecord::SimpleAck(_)) => {
                unexpected()
            }

            // --- CommandResponse outbound, second leg ---
            (TxnState::CommandResponseOutboundWaitingAck { nack }, MessageRecord::SimpleAck(_)) => {
                let result = match nack {
                    Some(code) => Err(EngineError::NackCode(*code)),
                    None => Ok(self.initiating.clone()),
                };
                OfferOutcome::Handled {
                    send: None,
                    completed: Some(result),
                }
            }
            (TxnState::CommandResponseOutboundWaitingAck { .. }, MessageRecord::CommandResponse(_)) => {
                unexpected()
            }

            // --- CommandResponse inbound ---
            (TxnState::CommandResponseInboundWaitingAck, MessageRecord::SimpleAck(_)) => {
                OfferOutcome::Handled {
                    send: None,
                    completed: Some(Ok(self.initiating.clone())),
                }
            }
            (TxnState::CommandResponseInboundWaitingAck, MessageRecord::CommandResponse(_)) => {
                unexpected()
            }

            // --- CommandRequest outbound ---
            (
                TxnState::CommandRequestOutboundWaiting { requested_command },
                other,
            ) if other.command() == *requested_command => OfferOutcome::Handled {
                send: None,
                completed: Some(Ok(other.clone())),
            },
            (TxnState::CommandRequestOutboundWaiting { .. }, MessageRecord::CommandError(e)) => {
                OfferOutcome::Handled {
                    send: None,
                    completed: Some(Err(EngineError::NackCode(e.nack_code))),
                }
            }
            (
                TxnState::CommandRequestOutboundWaiting { .. },
                MessageRecord::SimpleAck(_) | MessageRecord::CommandResponse(_),
            ) => unexpected(),

            _ => OfferOutcome::NotHandled,
        }
    }
}

fn unexpected() -> OfferOutcome {
    OfferOutcome::Handled {
        send: None,
        completed: Some(Err(EngineError::UnexpectedResponse)),
    }
}
