//! Byte-stuffed packet framer (component C1).
//!
//! Wire format: `<stuffed-header> 0x7E <stuffed-payload> 0x7F`. Both the
//! header and payload are escape-stuffed independently before being joined
//! by the unescaped `0x7E`/`0x7F` delimiters.
//!
//! | Raw byte | On-wire      |
//! |----------|--------------|
//! | `0x7D`   | `0x7D 0x00`  |
//! | `0x7E`   | `0x7D 0x01`  |
//! | `0x7F`   | `0x7D 0x02`  |
//! | other    | itself       |

use crate::error::WireError;

const ESC: u8 = 0x7D;
const HEADER_END: u8 = 0x7E;
const PACKET_END: u8 = 0x7F;

/// One complete framed packet: the opaque header bytes and the payload bytes,
/// both already un-stuffed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub header: Vec<u8>,
    pub payload: Vec<u8>,
}

/// Reassembles framed packets from an inbound byte stream.
///
/// The header is opaque to this layer. It is cached on the first
/// successfully read packet and reused for every subsequent outbound write,
/// since the panel's header does not change within a session.
#[derive(Debug, Default)]
pub struct Framer {
    cached_header: Option<Vec<u8>>,
}

/// Result of attempting to read one packet out of a buffer.
#[derive(Debug)]
pub enum ReadOutcome {
    /// A complete packet was parsed; `consumed` bytes should be removed from
    /// the front of the caller's buffer.
    Packet { frame: RawFrame, consumed: usize },
    /// No unescaped `0x7F` terminator was found yet; more bytes are needed.
    NeedMore,
}

impl Framer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The header cached from the first successfully parsed packet, if any.
    pub fn cached_header(&self) -> Option<&[u8]> {
        self.cached_header.as_deref()
    }

    /// Attempt to read the next complete packet from `buf`.
    ///
    /// On `Packet`, the caller is expected to drain `consumed` bytes from
    /// the front of its buffer before calling again.
    pub fn read(&mut self, buf: &[u8]) -> Result<ReadOutcome, WireError> {
        let end = match find_unescaped(buf, PACKET_END)? {
            Some(end) => end,
            None => return Ok(ReadOutcome::NeedMore),
        };
        let stuffed = &buf[..end];
        let split = find_unescaped(stuffed, HEADER_END)?.ok_or_else(|| {
            WireError::Framing("missing header/payload delimiter 0x7E".to_owned())
        })?;
        let header = unstuff(&stuffed[..split])?;
        let payload = unstuff(&stuffed[split + 1..])?;
        if let Some(cached) = &self.cached_header {
            if cached != &header {
                // The panel is not expected to change its header mid-session,
                // but we trust the freshest value rather than failing.
                self.cached_header = Some(header.clone());
            }
        } else {
            self.cached_header = Some(header.clone());
        }
        Ok(ReadOutcome::Packet {
            frame: RawFrame { header, payload },
            consumed: end + 1,
        })
    }

    /// Stuff `header` and `payload`, joining them with the framing bytes.
    ///
    /// If `header` is empty and a header was previously cached (from an
    /// inbound read), the cached header is used instead.
    pub fn write(&self, header: &[u8], payload: &[u8]) -> Vec<u8> {
        let header = if header.is_empty() {
            self.cached_header.as_deref().unwrap_or(header)
        } else {
            header
        };
        let mut out = Vec::with_capacity(header.len() * 2 + payload.len() * 2 + 2);
        stuff_into(header, &mut out);
        out.push(HEADER_END);
        stuff_into(payload, &mut out);
        out.push(PACKET_END);
        out
    }
}

/// Find the first index of `target` in `buf` that is not preceded by an
/// odd run of `ESC` bytes (i.e. is not itself escaped).
///
/// Validates the byte following every `ESC` as it goes: an invalid
/// continuation is a hard `WireError::Encoding`, not a "need more data"
/// signal, since the buffer already contains enough bytes to know it's
/// wrong. Only a genuinely dangling `ESC` at the very end of `buf` (the
/// continuation byte simply hasn't arrived yet) returns `Ok(None)`.
fn find_unescaped(buf: &[u8], target: u8) -> Result<Option<usize>, WireError> {
    let mut i = 0;
    while i < buf.len() {
        if buf[i] == ESC {
            match buf.get(i + 1) {
                Some(0x00) | Some(0x01) | Some(0x02) => {
                    i += 2;
                    continue;
                }
                Some(other) => {
                    return Err(WireError::Encoding(format!(
                        "invalid escape sequence 0x7D {:#04x}",
                        other
                    )));
                }
                None => return Ok(None),
            }
        }
        if buf[i] == target {
            return Ok(Some(i));
        }
        i += 1;
    }
    Ok(None)
}

fn stuff_into(raw: &[u8], out: &mut Vec<u8>) {
    for &b in raw {
        match b {
            ESC => out.extend_from_slice(&[ESC, 0x00]),
            HEADER_END => out.extend_from_slice(&[ESC, 0x01]),
            PACKET_END => out.extend_from_slice(&[ESC, 0x02]),
            other => out.push(other),
        }
    }
}

fn unstuff(stuffed: &[u8]) -> Result<Vec<u8>, WireError> {
    let mut out = Vec::with_capacity(stuffed.len());
    let mut i = 0;
    while i < stuffed.len() {
        let b = stuffed[i];
        if b == HEADER_END || b == PACKET_END {
            return Err(WireError::Framing(format!(
                "unescaped {:#04x} inside stuffed region",
                b
            )));
        }
        if b == ESC {
            let next = stuffed.get(i + 1).ok_or_else(|| {
                WireError::Encoding("escape byte 0x7D at end of stream".to_owned())
            })?;
            let unescaped = match next {
                0x00 => ESC,
                0x01 => HEADER_END,
                0x02 => PACKET_END,
                other => {
                    return Err(WireError::Encoding(format!(
                        "invalid escape sequence 0x7D {:#04x}",
                        other
                    )))
                }
            };
            out.push(unescaped);
            i += 2;
        } else {
            out.push(b);
            i += 1;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stuffing_example_from_spec() {
        // header 00 7D 7E, payload 01 02 7F 03
        let framer = Framer::new();
        let wire = framer.write(&[0x00, 0x7D, 0x7E], &[0x01, 0x02, 0x7F, 0x03]);
        assert_eq!(
            wire,
            vec![0x00, 0x7D, 0x00, 0x7D, 0x01, 0x7E, 0x01, 0x02, 0x7D, 0x02, 0x03, 0x7F]
        );

        let mut reader = Framer::new();
        let outcome = reader.read(&wire).unwrap();
        match outcome {
            ReadOutcome::Packet { frame, consumed } => {
                assert_eq!(consumed, wire.len());
                assert_eq!(frame.header, vec![0x00, 0x7D, 0x7E]);
                assert_eq!(frame.payload, vec![0x01, 0x02, 0x7F, 0x03]);
            }
            ReadOutcome::NeedMore => panic!("expected a full packet"),
        }
    }

    #[test]
    fn incomplete_packet_requests_more_bytes() {
        let mut framer = Framer::new();
        let outcome = framer.read(&[0x01, 0x02, 0x7D, 0x01]).unwrap();
        assert!(matches!(outcome, ReadOutcome::NeedMore));
    }

    #[test]
    fn dangling_escape_byte_is_an_encoding_error() {
        let mut framer = Framer::new();
        let err = framer.read(&[0x01, ESC, PACKET_END]).unwrap_err();
        assert!(matches!(err, WireError::Encoding(_)));
    }

    #[test]
    fn invalid_escape_sequence_is_an_encoding_error() {
        let mut framer = Framer::new();
        let err = framer
            .read(&[0x01, ESC, 0x05, HEADER_END, PACKET_END])
            .unwrap_err();
        assert!(matches!(err, WireError::Encoding(_)));
    }

    #[test]
    fn round_trip_is_identity() {
        let framer = Framer::new();
        let header = [0x12, 0x34];
        let payload: Vec<u8> = (0u8..=255).collect();
        let wire = framer.write(&header, &payload);

        let mut reader = Framer::new();
        let ReadOutcome::Packet { frame, .. } = reader.read(&wire).unwrap() else {
            panic!("expected packet");
        };
        assert_eq!(frame.header, header);
        assert_eq!(frame.payload, payload);
    }

    #[test]
    fn cached_header_is_reused_on_write() {
        let mut framer = Framer::new();
        let wire = framer.write(&[0xAA, 0xBB], &[0x01]);
        let _ = framer.read(&wire).unwrap();
        let reused = framer.write(&[], &[0x02]);
        let mut reader = Framer::new();
        let ReadOutcome::Packet { frame, .. } = reader.read(&reused).unwrap() else {
            panic!("expected packet");
        };
        assert_eq!(frame.header, vec![0xAA, 0xBB]);
    }

    #[test]
    fn multiple_packets_are_consumed_in_sequence() {
        let framer = Framer::new();
        let mut buf = framer.write(&[0x01], &[0x02]);
        buf.extend(framer.write(&[0x01], &[0x03]));

        let mut reader = Framer::new();
        let ReadOutcome::Packet { frame, consumed } = reader.read(&buf).unwrap() else {
            panic!("expected packet");
        };
        assert_eq!(frame.payload, vec![0x02]);
        buf.drain(..consumed);

        let ReadOutcome::Packet { frame, .. } = reader.read(&buf).unwrap() else {
            panic!("expected packet");
        };
        assert_eq!(frame.payload, vec![0x03]);
    }
}
