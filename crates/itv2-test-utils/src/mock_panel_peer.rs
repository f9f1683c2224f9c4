//! A mock ITv2 panel peer: drives the client side of the handshake (Type 2
//! encryption only, the scheme used by real panels in the field) and then
//! lets a test send and receive typed [`MessageRecord`]s.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use itv2_wire::crypto::EncryptionHandler;
use itv2_wire::error::WireError;
use itv2_wire::framing::{Framer, ReadOutcome};
use itv2_wire::messages::{EncryptionTypeWire, MessageRecord, OpenSession, RequestAccess, SimpleAck};
use itv2_wire::{MessagePacket, Registry};

/// Drives one simulated panel connection: the handshake, then ongoing
/// send/receive of application records.
pub struct MockPanelPeer<S> {
    stream: S,
    framer: Framer,
    encryptor: EncryptionHandler,
    buf: Vec<u8>,
    local_seq: u8,
    remote_seq: u8,
    registry: Registry,
}

impl<S> MockPanelPeer<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Open a session over `stream` as the connecting panel would: send the
    /// initial `OpenSession` with `session_id` as the frame header, echo the
    /// server's `OpenSession`, then run the Type 2 `RequestAccess` exchange
    /// using `access_code_key`.
    pub async fn connect(
        mut stream: S,
        session_id: &str,
        rx_buffer_size: u16,
        access_code_key: [u8; 16],
    ) -> Result<Self, WireError> {
        let mut framer = Framer::new();
        let mut buf = Vec::new();
        let mut local_seq: u8 = 0;
        let registry = Registry::build()?;

        let open = MessageRecord::OpenSession(OpenSession {
            rx_buffer_size,
            encryption_type: EncryptionTypeWire::Type2,
        });
        local_seq = local_seq.wrapping_add(1);
        let envelope = MessagePacket {
            app_seq: None,
            message: open,
        }
        .serialize();
        let mut payload = vec![local_seq, 0];
        payload.extend_from_slice(&envelope);
        let framed = framer.write(session_id.as_bytes(), &payload);
        stream.write_all(&framed).await.map_err(io_err)?;

        let frame = Self::read_frame(&mut stream, &mut framer, &mut buf).await?;
        let (sender_seq, _, packet) = Self::decode_plain(&frame, &registry)?;
        let mut remote_seq = sender_seq;
        expect_ack(packet.message)?;

        let frame = Self::read_frame(&mut stream, &mut framer, &mut buf).await?;
        let (sender_seq, _, packet) = Self::decode_plain(&frame, &registry)?;
        remote_seq = sender_seq;
        let MessageRecord::OpenSession(_) = packet.message else {
            return Err(WireError::Codec("expected server OpenSession echo".to_owned()));
        };
        local_seq = local_seq.wrapping_add(1);
        let ack = Self::plain_bytes(&MessageRecord::SimpleAck(SimpleAck), local_seq, remote_seq, &framer);
        stream.write_all(&ack).await.map_err(io_err)?;

        let mut encryptor = EncryptionHandler::new();
        let our_initializer = encryptor.configure_inbound_type2(&access_code_key)?;
        local_seq = local_seq.wrapping_add(1);
        let access = MessageRecord::RequestAccess(RequestAccess {
            initializer: our_initializer.to_vec(),
        });
        let bytes = Self::plain_bytes(&access, local_seq, remote_seq, &framer);
        stream.write_all(&bytes).await.map_err(io_err)?;

        let frame = Self::read_frame(&mut stream, &mut framer, &mut buf).await?;
        let (sender_seq, _, packet) = Self::decode_plain(&frame, &registry)?;
        remote_seq = sender_seq;
        expect_ack(packet.message)?;

        let frame = Self::read_frame(&mut stream, &mut framer, &mut buf).await?;
        let (sender_seq, _, packet) = Self::decode_plain(&frame, &registry)?;
        remote_seq = sender_seq;
        let MessageRecord::RequestAccess(server_access) = packet.message else {
            return Err(WireError::Codec("expected server RequestAccess".to_owned()));
        };
        let server_initializer: [u8; 16] = server_access
            .initializer
            .as_slice()
            .try_into()
            .map_err(|_| WireError::Codec("server initializer must be 16 bytes".to_owned()))?;
        encryptor.configure_outbound_type2(&access_code_key, &server_initializer)?;
        local_seq = local_seq.wrapping_add(1);
        let ack = Self::plain_bytes(&MessageRecord::SimpleAck(SimpleAck), local_seq, remote_seq, &framer);
        stream.write_all(&ack).await.map_err(io_err)?;

        Ok(Self {
            stream,
            framer,
            encryptor,
            buf,
            local_seq,
            remote_seq,
            registry,
        })
    }

    /// Send an application record, encrypted, with the given app-sequence
    /// byte (pass `Some(_)` for app-sequenced record types, `None` otherwise).
    pub async fn send(&mut self, record: MessageRecord, app_seq: Option<u8>) -> Result<(), WireError> {
        self.local_seq = self.local_seq.wrapping_add(1);
        let envelope = MessagePacket {
            app_seq,
            message: record,
        }
        .serialize();
        let mut payload = Vec::with_capacity(2 + envelope.len());
        payload.push(self.local_seq);
        payload.push(self.remote_seq);
        payload.extend_from_slice(&envelope);
        let encrypted = self.encryptor.encrypt(&payload);
        let framed = self.framer.write(&[], &encrypted);
        self.stream.write_all(&framed).await.map_err(io_err)
    }

    /// Receive the next application record, updating the tracked remote
    /// sequence number from its header.
    pub async fn recv(&mut self) -> Result<(Option<u8>, MessageRecord), WireError> {
        let frame = Self::read_frame(&mut self.stream, &mut self.framer, &mut self.buf).await?;
        let decrypted = self.encryptor.decrypt(&frame.payload)?;
        if decrypted.len() < 2 {
            return Err(WireError::Codec("encrypted payload too short for sequence prefix".to_owned()));
        }
        self.remote_seq = decrypted[0];
        let packet = MessagePacket::deserialize(&self.registry, &decrypted[2..])?;
        Ok((packet.app_seq, packet.message))
    }

    async fn read_frame(
        stream: &mut S,
        framer: &mut Framer,
        buf: &mut Vec<u8>,
    ) -> Result<itv2_wire::framing::RawFrame, WireError> {
        loop {
            match framer.read(buf)? {
                ReadOutcome::Packet { frame, consumed } => {
                    buf.drain(..consumed);
                    return Ok(frame);
                }
                ReadOutcome::NeedMore => {
                    let mut tmp = [0u8; 4096];
                    let n = stream.read(&mut tmp).await.map_err(io_err)?;
                    if n == 0 {
                        return Err(WireError::Codec("peer closed during read".to_owned()));
                    }
                    buf.extend_from_slice(&tmp[..n]);
                }
            }
        }
    }

    fn plain_bytes(record: &MessageRecord, sender_seq: u8, receiver_seq: u8, framer: &Framer) -> Vec<u8> {
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

    fn decode_plain(
        frame: &itv2_wire::framing::RawFrame,
        registry: &Registry,
    ) -> Result<(u8, u8, MessagePacket), WireError> {
        if frame.payload.len() < 2 {
            return Err(WireError::Codec("handshake packet payload too short".to_owned()));
        }
        let sender_seq = frame.payload[0];
        let receiver_seq = frame.payload[1];
        let packet = MessagePacket::deserialize(registry, &frame.payload[2..])?;
        Ok((sender_seq, receiver_seq, packet))
    }
}

fn expect_ack(message: MessageRecord) -> Result<(), WireError> {
    match message {
        MessageRecord::SimpleAck(_) => Ok(()),
        MessageRecord::CommandError(e) => Err(WireError::CryptoCheck(format!(
            "handshake nacked with code {:#04x}",
            e.nack_code
        ))),
        other => Err(WireError::Codec(format!(
            "expected SimpleAck during handshake, got command {:#06x}",
            other.command()
        ))),
    }
}

fn io_err(e: std::io::Error) -> WireError {
    WireError::Codec(format!("I/O error: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use itv2_wire::crypto::key_from_hex32;
    use itv2_wire::messages::ConnectionPoll;
    use tokio::io::{split, ReadHalf, WriteHalf};

    /// A from-scratch reference server that speaks the same handshake
    /// `MockPanelPeer::connect` expects, used only to prove the mock
    /// client's framing and crypto line up with a real counterpart.
    async fn run_reference_server<S>(mut r: ReadHalf<S>, mut w: WriteHalf<S>, access_code_key: [u8; 16])
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut framer = Framer::new();
        let mut buf = Vec::new();
        let registry = Registry::build().unwrap();
        let mut local_seq: u8 = 0;

        let frame = read_one(&mut r, &mut framer, &mut buf).await;
        let (sender_seq, _, packet) = MockPanelPeer::<S>::decode_plain(&frame, &registry).unwrap();
        let mut remote_seq = sender_seq;
        let MessageRecord::OpenSession(peer_open) = packet.message else {
            panic!("expected OpenSession");
        };

        local_seq = local_seq.wrapping_add(1);
        let ack = MockPanelPeer::<S>::plain_bytes(&MessageRecord::SimpleAck(SimpleAck), local_seq, remote_seq, &framer);
        w.write_all(&ack).await.unwrap();

        local_seq = local_seq.wrapping_add(1);
        let our_open = MessageRecord::OpenSession(OpenSession {
            rx_buffer_size: 2048,
            encryption_type: peer_open.encryption_type,
        });
        let bytes = MockPanelPeer::<S>::plain_bytes(&our_open, local_seq, remote_seq, &framer);
        w.write_all(&bytes).await.unwrap();

        let frame = read_one(&mut r, &mut framer, &mut buf).await;
        let (sender_seq, _, packet) = MockPanelPeer::<S>::decode_plain(&frame, &registry).unwrap();
        remote_seq = sender_seq;
        assert!(matches!(packet.message, MessageRecord::SimpleAck(_)));

        let frame = read_one(&mut r, &mut framer, &mut buf).await;
        let (sender_seq, _, packet) = MockPanelPeer::<S>::decode_plain(&frame, &registry).unwrap();
        remote_seq = sender_seq;
        let MessageRecord::RequestAccess(client_access) = packet.message else {
            panic!("expected RequestAccess");
        };

        local_seq = local_seq.wrapping_add(1);
        let ack = MockPanelPeer::<S>::plain_bytes(&MessageRecord::SimpleAck(SimpleAck), local_seq, remote_seq, &framer);
        w.write_all(&ack).await.unwrap();

        let mut encryptor = EncryptionHandler::new();
        let client_initializer: [u8; 16] = client_access.initializer.as_slice().try_into().unwrap();
        encryptor
            .configure_outbound_type2(&access_code_key, &client_initializer)
            .unwrap();
        let our_initializer = encryptor.configure_inbound_type2(&access_code_key).unwrap();

        local_seq = local_seq.wrapping_add(1);
        let our_access = MessageRecord::RequestAccess(RequestAccess {
            initializer: our_initializer.to_vec(),
        });
        let bytes = MockPanelPeer::<S>::plain_bytes(&our_access, local_seq, remote_seq, &framer);
        w.write_all(&bytes).await.unwrap();

        let frame = read_one(&mut r, &mut framer, &mut buf).await;
        let (sender_seq, _, packet) = MockPanelPeer::<S>::decode_plain(&frame, &registry).unwrap();
        remote_seq = sender_seq;
        assert!(matches!(packet.message, MessageRecord::SimpleAck(_)));

        // Handshake done. Read one encrypted ConnectionPoll and echo it
        // back encrypted, to prove the post-handshake wire format matches.
        let frame = read_one(&mut r, &mut framer, &mut buf).await;
        let decrypted = encryptor.decrypt(&frame.payload).unwrap();
        remote_seq = decrypted[0];
        let packet = MessagePacket::deserialize(&registry, &decrypted[2..]).unwrap();
        assert!(matches!(packet.message, MessageRecord::ConnectionPoll(_)));

        let reply_seq = local_seq.wrapping_add(1);
        let envelope = MessagePacket {
            app_seq: None,
            message: MessageRecord::ConnectionPoll(ConnectionPoll),
        }
        .serialize();
        let mut payload = vec![reply_seq, remote_seq];
        payload.extend_from_slice(&envelope);
        let encrypted = encryptor.encrypt(&payload);
        let framed = framer.write(&[], &encrypted);
        w.write_all(&framed).await.unwrap();
    }

    async fn read_one<S: AsyncRead + Unpin>(r: &mut S, framer: &mut Framer, buf: &mut Vec<u8>) -> itv2_wire::framing::RawFrame {
        loop {
            match framer.read(buf).unwrap() {
                ReadOutcome::Packet { frame, consumed } => {
                    buf.drain(..consumed);
                    return frame;
                }
                ReadOutcome::NeedMore => {
                    let mut tmp = [0u8; 4096];
                    let n = r.read(&mut tmp).await.unwrap();
                    buf.extend_from_slice(&tmp[..n]);
                }
            }
        }
    }

    #[tokio::test]
    async fn connects_and_round_trips_a_record_over_a_duplex_pipe() {
        let access_code_key = key_from_hex32("0123456789abcdef0123456789abcdef").unwrap();
        let (client_io, server_io) = tokio::io::duplex(8192);
        let (server_r, server_w) = split(server_io);

        let server = tokio::spawn(run_reference_server(server_r, server_w, access_code_key));
        let mut peer = MockPanelPeer::connect(client_io, "123456789012", 2048, access_code_key)
            .await
            .unwrap();

        peer.send(MessageRecord::ConnectionPoll(ConnectionPoll), None)
            .await
            .unwrap();
        let (_, record) = peer.recv().await.unwrap();
        assert!(matches!(record, MessageRecord::ConnectionPoll(_)));

        server.await.unwrap();
    }
}
