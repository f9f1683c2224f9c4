//! Session (component C6): owns one TCP connection end to end — handshake,
//! listen loop, flush-gate debounce, heartbeat, and the outbound send path.
//!
//! Generic over the transport so tests can drive a [`tokio::io::duplex`]
//! pair instead of a real socket; production code instantiates this with
//! the halves of a `TcpStream`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use itv2_wire::crypto::EncryptionHandler;
use itv2_wire::error::WireError;
use itv2_wire::framing::{Framer, RawFrame, ReadOutcome};
use itv2_wire::messages::{
    ConnectionPoll, EncryptionTypeWire, MessageRecord, OpenSession, RequestAccess, SimpleAck,
    TransactionPattern,
};
use itv2_wire::{MessagePacket, Registry};

use crate::error::EngineError;
use crate::transaction::{Direction, OfferOutcome, OfferedSeq, Transaction, TransactionResult};

/// One decoded inbound record handed to the notification dispatcher (C9),
/// tagged with the session it arrived on.
#[derive(Debug, Clone)]
pub struct InboundNotification {
    pub session_id: String,
    pub record: MessageRecord,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Advertised in our `OpenSession` echo; the peer's own declared buffer
    /// size governs the largest payload it will send us.
    pub rx_buffer_size: u16,
    pub heartbeat_interval: Duration,
    pub flush_quiet_period: Duration,
    pub send_lock_timeout: Duration,
    /// Default deadline for `PartitionArmCommand` transactions (open
    /// question in the design notes; no value is stated upstream).
    pub partition_arm_timeout: Duration,
    pub type1_identifier_key: Option<[u8; 16]>,
    pub type1_access_code_key: Option<[u8; 16]>,
    pub type2_access_code_key: Option<[u8; 16]>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            rx_buffer_size: 2048,
            heartbeat_interval: Duration::from_secs(100),
            flush_quiet_period: Duration::from_secs(2),
            send_lock_timeout: Duration::from_secs(30),
            partition_arm_timeout: Duration::from_secs(5),
            type1_identifier_key: None,
            type1_access_code_key: None,
            type2_access_code_key: None,
        }
    }
}

fn deadline_for(record: &MessageRecord, config: &SessionConfig) -> Option<Duration> {
    match record {
        MessageRecord::PartitionArmCommand(_) => Some(config.partition_arm_timeout),
        _ => None,
    }
}

enum SessionCommand {
    Send {
        record: MessageRecord,
        respond_to: oneshot::Sender<TransactionResult>,
    },
    Shutdown,
}

/// A cheaply cloneable reference to a running session, used by command
/// originators (the bridge service) to submit sends.
#[derive(Clone)]
pub struct SessionHandle {
    pub id: String,
    cmd_tx: mpsc::Sender<SessionCommand>,
    send_lock_timeout: Duration,
}

impl SessionHandle {
    /// Submit `record` as a new outbound transaction and await its result.
    /// Mirrors §4.6.5's `SendMessage`: the timeout here stands in for the
    /// per-session transaction lock wait, since a single actor task already
    /// serialises sends and inbound processing.
    pub async fn send(&self, record: MessageRecord) -> Result<MessageRecord, EngineError> {
        let (respond_to, rx) = oneshot::channel();
        let cmd = SessionCommand::Send { record, respond_to };
        tokio::time::timeout(self.send_lock_timeout, self.cmd_tx.send(cmd))
            .await
            .map_err(|_| EngineError::Timeout)?
            .map_err(|_| EngineError::Disconnected)?;
        rx.await.map_err(|_| EngineError::Disconnected)?
    }

    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(SessionCommand::Shutdown).await;
    }
}

/// Outcome of a completed handshake, ready to drive the listen loop.
struct Handshake {
    session_id: String,
    framer: Framer,
    encryptor: EncryptionHandler,
    buf: Vec<u8>,
    local_seq: u8,
    remote_seq: u8,
}

async fn read_next_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    framer: &mut Framer,
    buf: &mut Vec<u8>,
) -> Result<RawFrame, EngineError> {
    loop {
        match framer.read(buf)? {
            ReadOutcome::Packet { frame, consumed } => {
                buf.drain(..consumed);
                return Ok(frame);
            }
            ReadOutcome::NeedMore => {
                let mut tmp = [0u8; 4096];
                let n = reader
                    .read(&mut tmp)
                    .await
                    .map_err(|_| EngineError::Disconnected)?;
                if n == 0 {
                    return Err(EngineError::Disconnected);
                }
                buf.extend_from_slice(&tmp[..n]);
            }
        }
    }
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, bytes: &[u8]) -> Result<(), EngineError> {
    writer
        .write_all(bytes)
        .await
        .map_err(|_| EngineError::Disconnected)?;
    writer.flush().await.map_err(|_| EngineError::Disconnected)?;
    Ok(())
}

/// Build one complete on-wire frame for an outbound record: envelope ->
/// prefix `senderSeq, receiverSeq` -> encrypt -> frame (§2's component
/// order; §4.6.7's prose lists framing before encryption, which this
/// follows §2 over — see DESIGN.md).
fn build_packet_bytes(
    record: &MessageRecord,
    app_seq: Option<u8>,
    sender_seq: u8,
    receiver_seq: u8,
    encryptor: &EncryptionHandler,
    framer: &Framer,
) -> Vec<u8> {
    let envelope = MessagePacket {
        app_seq,
        message: record.clone(),
    }
    .serialize();
    let mut payload = Vec::with_capacity(2 + envelope.len());
    payload.push(sender_seq);
    payload.push(receiver_seq);
    payload.extend_from_slice(&envelope);
    let encrypted = encryptor.encrypt(&payload);
    framer.write(&[], &encrypted)
}

/// Same as [`build_packet_bytes`] but never encrypts, for the handshake
/// packets exchanged before either direction's key is activated.
fn build_plain_packet_bytes(
    record: &MessageRecord,
    sender_seq: u8,
    receiver_seq: u8,
    framer: &Framer,
) -> Vec<u8> {
    let envelope = MessagePacket {
        app_seq: None,
        message: record.clone(),
    }
    .serialize();
    let mut payload = Vec::with_capacity(2 + envelope.len());
    payload.push(sender_seq);
    payload.push(receiver_seq);
    payload.extend_from_slice(&envelope);
    framer.write(&[], &payload)
}

fn decode_plain_packet(
    frame: &RawFrame,
    registry: &Registry,
) -> Result<(u8, u8, MessagePacket), EngineError> {
    if frame.payload.len() < 2 {
        return Err(EngineError::Wire(WireError::Codec(
            "handshake packet payload too short for sequence prefix".to_owned(),
        )));
    }
    let sender_seq = frame.payload[0];
    let receiver_seq = frame.payload[1];
    let packet = MessagePacket::deserialize(registry, &frame.payload[2..])?;
    Ok((sender_seq, receiver_seq, packet))
}

/// Drive the handshake (§4.6.1) to completion over `reader`/`writer`.
async fn perform_handshake<R, W>(
    reader: &mut R,
    writer: &mut W,
    registry: &Registry,
    config: &SessionConfig,
) -> Result<Handshake, EngineError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut framer = Framer::new();
    let mut buf = Vec::new();
    let mut local_seq: u8 = 0;

    // 1. First packet: OpenSession, unencrypted. The header carries the
    // session id.
    let frame = read_next_frame(reader, &mut framer, &mut buf).await?;
    let session_id = String::from_utf8(frame.header.clone()).map_err(|_| {
        EngineError::Wire(WireError::Encoding(
            "session header is not valid UTF-8".to_owned(),
        ))
    })?;
    let (sender_seq, _receiver_seq, packet) = decode_plain_packet(&frame, registry)?;
    let peer_open = match packet.message {
        MessageRecord::OpenSession(m) => m,
        other => {
            return Err(EngineError::Wire(WireError::Codec(format!(
                "expected OpenSession as the first handshake packet, got command {:#06x}",
                other.command()
            ))))
        }
    };
    let mut remote_seq = sender_seq;

    // Ack the inbound OpenSession (inbound SimpleAck pattern).
    local_seq = local_seq.wrapping_add(1);
    let ack = build_plain_packet_bytes(&MessageRecord::SimpleAck(SimpleAck), local_seq, remote_seq, &framer);
    write_frame(writer, &ack).await?;

    // Echo our own OpenSession (outbound SimpleAck pattern, awaited inline
    // since nothing else can be in flight yet).
    local_seq = local_seq.wrapping_add(1);
    let our_open = MessageRecord::OpenSession(OpenSession {
        rx_buffer_size: config.rx_buffer_size,
        encryption_type: peer_open.encryption_type,
    });
    let echo = build_plain_packet_bytes(&our_open, local_seq, remote_seq, &framer);
    write_frame(writer, &echo).await?;
    let frame = read_next_frame(reader, &mut framer, &mut buf).await?;
    let (sender_seq, _receiver_seq, reply) = decode_plain_packet(&frame, registry)?;
    remote_seq = sender_seq;
    expect_ack(reply.message)?;

    // 2. RequestAccess.
    let frame = read_next_frame(reader, &mut framer, &mut buf).await?;
    let (sender_seq, _receiver_seq, packet) = decode_plain_packet(&frame, registry)?;
    remote_seq = sender_seq;
    let peer_access = match packet.message {
        MessageRecord::RequestAccess(m) => m,
        other => {
            return Err(EngineError::Wire(WireError::Codec(format!(
                "expected RequestAccess as the second handshake packet, got command {:#06x}",
                other.command()
            ))))
        }
    };

    local_seq = local_seq.wrapping_add(1);
    let ack = build_plain_packet_bytes(&MessageRecord::SimpleAck(SimpleAck), local_seq, remote_seq, &framer);
    write_frame(writer, &ack).await?;

    let mut encryptor = EncryptionHandler::new();
    let our_initializer = match peer_open.encryption_type {
        EncryptionTypeWire::Type1 => {
            let identifier_key = config.type1_identifier_key.ok_or_else(|| {
                EngineError::Wire(WireError::CryptoCheck(
                    "Type 1 handshake requested but no integration identifier key configured".to_owned(),
                ))
            })?;
            let access_key = config.type1_access_code_key.ok_or_else(|| {
                EngineError::Wire(WireError::CryptoCheck(
                    "Type 1 handshake requested but no access code key configured".to_owned(),
                ))
            })?;
            let initializer: [u8; 48] = peer_access.initializer.as_slice().try_into().map_err(|_| {
                EngineError::Wire(WireError::Codec(
                    "Type 1 RequestAccess initializer must be 48 bytes".to_owned(),
                ))
            })?;
            encryptor.configure_outbound_type1(&identifier_key, &initializer)?;
            encryptor.configure_inbound_type1(&access_key)?.to_vec()
        }
        EncryptionTypeWire::Type2 => {
            let access_key = config.type2_access_code_key.ok_or_else(|| {
                EngineError::Wire(WireError::CryptoCheck(
                    "Type 2 handshake requested but no access code key configured".to_owned(),
                ))
            })?;
            let initializer: [u8; 16] = peer_access.initializer.as_slice().try_into().map_err(|_| {
                EngineError::Wire(WireError::Codec(
                    "Type 2 RequestAccess initializer must be 16 bytes".to_owned(),
                ))
            })?;
            encryptor.configure_outbound_type2(&access_key, &initializer)?;
            encryptor.configure_inbound_type2(&access_key)?.to_vec()
        }
    };

    local_seq = local_seq.wrapping_add(1);
    let our_access = MessageRecord::RequestAccess(RequestAccess {
        initializer: our_initializer,
    });
    let access = build_plain_packet_bytes(&our_access, local_seq, remote_seq, &framer);
    write_frame(writer, &access).await?;
    let frame = read_next_frame(reader, &mut framer, &mut buf).await?;
    let (sender_seq, _receiver_seq, reply) = decode_plain_packet(&frame, registry)?;
    remote_seq = sender_seq;
    expect_ack(reply.message)?;

    info!(session = %session_id, "handshake complete");

    Ok(Handshake {
        session_id,
        framer,
        encryptor,
        buf,
        local_seq,
        remote_seq,
    })
}

fn expect_ack(message: MessageRecord) -> Result<(), EngineError> {
    match message {
        MessageRecord::SimpleAck(_) => Ok(()),
        MessageRecord::CommandError(e) => Err(EngineError::NackCode(e.nack_code)),
        other => Err(EngineError::Wire(WireError::Codec(format!(
            "expected SimpleAck during handshake, got command {:#06x}",
            other.command()
        )))),
    }
}

pub struct Session<R, W> {
    id: String,
    reader: R,
    writer: W,
    framer: Framer,
    encryptor: EncryptionHandler,
    buf: Vec<u8>,
    local_seq: u8,
    remote_seq: u8,
    app_seq: u8,
    pending: Vec<Transaction>,
    registry: Arc<Registry>,
    config: SessionConfig,
    inbound_tx: mpsc::UnboundedSender<InboundNotification>,
    cmd_rx: mpsc::Receiver<SessionCommand>,
}

impl<R, W> Session<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Accept a new connection: run the handshake to completion and return
    /// the running session plus a handle external callers can submit sends
    /// through.
    pub async fn accept(
        mut reader: R,
        mut writer: W,
        registry: Arc<Registry>,
        config: SessionConfig,
        inbound_tx: mpsc::UnboundedSender<InboundNotification>,
    ) -> Result<(Self, SessionHandle), EngineError> {
        let handshake = perform_handshake(&mut reader, &mut writer, &registry, &config).await?;
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let handle = SessionHandle {
            id: handshake.session_id.clone(),
            cmd_tx,
            send_lock_timeout: config.send_lock_timeout,
        };
        let session = Self {
            id: handshake.session_id,
            reader,
            writer,
            framer: handshake.framer,
            encryptor: handshake.encryptor,
            buf: handshake.buf,
            local_seq: handshake.local_seq,
            remote_seq: handshake.remote_seq,
            app_seq: 0,
            pending: Vec::new(),
            registry,
            config,
            inbound_tx,
            cmd_rx,
        };
        Ok((session, handle))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Run the listen loop until the transport closes, a fatal wire error
    /// occurs, or the session is shut down.
    pub async fn run(mut self) {
        let mut flush_released = false;
        let mut flush_deadline = Instant::now() + self.config.flush_quiet_period;
        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval);
        heartbeat.reset();
        let mut deferred_sends: VecDeque<SessionCommand> = VecDeque::new();

        loop {
            let flush_wait = async {
                if flush_released {
                    std::future::pending::<()>().await
                } else {
                    tokio::time::sleep_until(flush_deadline).await
                }
            };

            tokio::select! {
                frame = read_next_frame(&mut self.reader, &mut self.framer, &mut self.buf) => {
                    match frame {
                        Ok(frame) => {
                            if !flush_released {
                                flush_deadline = Instant::now() + self.config.flush_quiet_period;
                            }
                            if let Err(err) = self.handle_inbound_frame(&frame).await {
                                warn!(session = %self.id, error = %err, "fatal session error");
                                break;
                            }
                        }
                        Err(err) => {
                            debug!(session = %self.id, error = %err, "session transport closed");
                            break;
                        }
                    }
                }
                () = flush_wait, if !flush_released => {
                    flush_released = true;
                    heartbeat.reset();
                    debug!(session = %self.id, "flush gate released");
                    while let Some(cmd) = deferred_sends.pop_front() {
                        self.handle_command(cmd).await;
                    }
                }
                _ = heartbeat.tick(), if flush_released => {
                    if let Err(err) = self.send_tracked(MessageRecord::ConnectionPoll(ConnectionPoll)).await {
                        warn!(session = %self.id, error = %err, "heartbeat send failed");
                        break;
                    }
                }
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(SessionCommand::Shutdown) | None => break,
                        Some(cmd) if flush_released => self.handle_command(cmd).await,
                        Some(cmd) => deferred_sends.push_back(cmd),
                    }
                }
            }

            self.reap_expired();
        }

        self.shutdown().await;
    }

    async fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Send { record, respond_to } => {
                // The write failure (if any) is already delivered to the
                // caller via `respond_to` inside `send_command`; nothing
                // further to do with it here.
                let _ = self.send_command(record, respond_to).await;
            }
            SessionCommand::Shutdown => {}
        }
    }

    async fn send_command(
        &mut self,
        record: MessageRecord,
        respond_to: oneshot::Sender<TransactionResult>,
    ) -> Result<(), EngineError> {
        let app_seq = if record.app_sequence() {
            self.app_seq = self.app_seq.wrapping_add(1);
            Some(self.app_seq)
        } else {
            None
        };
        self.local_seq = self.local_seq.wrapping_add(1);
        let deadline = deadline_for(&record, &self.config).map(|d| Instant::now() + d);
        let (txn, outcome) = Transaction::begin_outbound(record, self.local_seq, deadline, respond_to);

        if let Some(send_record) = &outcome.send {
            let bytes = build_packet_bytes(
                send_record,
                app_seq,
                self.local_seq,
                self.remote_seq,
                &self.encryptor,
                &self.framer,
            );
            if let Err(err) = write_frame(&mut self.writer, &bytes).await {
                txn.resolve(Err(err.clone()));
                return Err(err);
            }
        }

        match outcome.completed {
            Some(result) => txn.resolve(result),
            None => self.pending.push(txn),
        }
        Ok(())
    }

    /// Sends `record` as a real, tracked outbound transaction whose result
    /// the caller doesn't wait on — the transaction is still registered in
    /// `self.pending` so the peer's eventual ack is consumed by the
    /// transaction engine rather than falling through to the
    /// unmatched-packet path and drawing a spurious reply. Used for
    /// session-internal sends (the heartbeat poll) that have no external
    /// caller to notify.
    async fn send_tracked(&mut self, record: MessageRecord) -> Result<(), EngineError> {
        let (respond_to, _ignored) = oneshot::channel();
        self.send_command(record, respond_to).await
    }

    async fn send_raw(&mut self, record: MessageRecord, app_seq: Option<u8>) -> Result<(), EngineError> {
        self.local_seq = self.local_seq.wrapping_add(1);
        let bytes = build_packet_bytes(
            &record,
            app_seq,
            self.local_seq,
            self.remote_seq,
            &self.encryptor,
            &self.framer,
        );
        write_frame(&mut self.writer, &bytes).await
    }

    async fn handle_inbound_frame(&mut self, frame: &RawFrame) -> Result<(), EngineError> {
        let decrypted = self.encryptor.decrypt(&frame.payload)?;
        if decrypted.len() < 2 {
            return Err(EngineError::Wire(WireError::Codec(
                "packet payload too short for sequence prefix".to_owned(),
            )));
        }
        let sender_seq = decrypted[0];
        let receiver_seq = decrypted[1];
        let packet = MessagePacket::deserialize(&self.registry, &decrypted[2..])?;
        self.remote_seq = sender_seq;
        let offered = OfferedSeq {
            sender_seq,
            receiver_seq,
        };

        let mut idx = 0;
        while idx < self.pending.len() {
            match self.pending[idx].offer(offered, &packet.message) {
                OfferOutcome::NotHandled => idx += 1,
                OfferOutcome::Handled { send, completed } => {
                    if let Some(record) = send {
                        self.send_raw(record, None).await?;
                    }
                    if let Some(result) = completed {
                        let txn = self.pending.remove(idx);
                        if txn.correlation.direction == Direction::Inbound {
                            if let Ok(record) = &result {
                                self.dispatch_inbound(record.clone());
                            }
                        }
                        txn.resolve(result);
                    }
                    return Ok(());
                }
            }
        }

        match packet.message.pattern() {
            TransactionPattern::SimpleAck => {
                let outcome = Transaction::complete_simple_ack_inbound(packet.message.clone());
                if let Some(send) = outcome.send {
                    self.send_raw(send, None).await?;
                }
                if let Some(Ok(record)) = outcome.completed {
                    self.dispatch_inbound(record);
                }
            }
            TransactionPattern::CommandResponse => {
                match Transaction::begin_inbound(packet.message.clone(), sender_seq, None) {
                    Ok((txn, outcome)) => {
                        if let Some(send) = outcome.send {
                            self.send_raw(send, None).await?;
                        }
                        self.pending.push(txn);
                    }
                    Err(err) => warn!(session = %self.id, error = %err, "failed to begin inbound transaction"),
                }
            }
            TransactionPattern::CommandRequest => {
                warn!(session = %self.id, "peer attempted to initiate a CommandRequest transaction inbound; ignoring");
            }
        }
        Ok(())
    }

    fn dispatch_inbound(&self, record: MessageRecord) {
        let _ = self.inbound_tx.send(InboundNotification {
            session_id: self.id.clone(),
            record,
        });
    }

    fn reap_expired(&mut self) {
        let now = Instant::now();
        let mut idx = 0;
        while idx < self.pending.len() {
            if self.pending[idx].is_expired(now) {
                let txn = self.pending.remove(idx);
                txn.resolve(Err(EngineError::Timeout));
            } else {
                idx += 1;
            }
        }
    }

    async fn shutdown(mut self) {
        for txn in self.pending.drain(..) {
            txn.resolve(Err(EngineError::Cancelled));
        }
        let _ = self.writer.shutdown().await;
        info!(session = %self.id, "session shut down");
    }
}
