//! Datagram framing for the unreliable ordered channel
//!
//! Every datagram carries a sequence number followed by exactly one frame.
//! All integers are big-endian on the wire, regardless of platform. Object
//! snapshots are complete and self-sufficient: a lost datagram costs one
//! tick of staleness, never consistency.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use uuid::Uuid;

use crate::game::object::{ObjectId, ObjectKind};
use crate::game::player::PlayerId;

/// Datagram header: u32 sequence + u8 frame kind
pub const HEADER_LEN: usize = 5;

const FRAME_HELLO: u8 = 0;
const FRAME_PING: u8 = 1;
const FRAME_PONG: u8 = 2;
const FRAME_OBJECT_SYNC: u8 = 3;

/// Longest player name accepted in a Hello frame
const MAX_NAME_LEN: usize = 32;

/// One frame of the peer protocol
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Identity announcement, repeated periodically; the channel may drop
    /// any single datagram and a restarted peer must relearn the remote
    /// identity
    Hello {
        player_id: PlayerId,
        host: bool,
        name: String,
    },

    /// Latency probe carrying the sender's clock in milliseconds
    Ping { t: u64 },

    /// Echo of a previously received probe
    Pong { t: u64 },

    /// Complete state snapshot for one synchronized object
    ObjectSync {
        kind: ObjectKind,
        object_id: ObjectId,
        owner_id: PlayerId,
        payload: Bytes,
    },
}

impl Frame {
    /// Encode this frame into a datagram stamped with `seq`
    pub fn encode(&self, seq: u32) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u32(seq);

        match self {
            Frame::Hello {
                player_id,
                host,
                name,
            } => {
                buf.put_u8(FRAME_HELLO);
                buf.put_slice(player_id.as_bytes());
                buf.put_u8(u8::from(*host));
                let name = truncate_name(name);
                buf.put_u8(name.len() as u8);
                buf.put_slice(name.as_bytes());
            }
            Frame::Ping { t } => {
                buf.put_u8(FRAME_PING);
                buf.put_u64(*t);
            }
            Frame::Pong { t } => {
                buf.put_u8(FRAME_PONG);
                buf.put_u64(*t);
            }
            Frame::ObjectSync {
                kind,
                object_id,
                owner_id,
                payload,
            } => {
                buf.put_u8(FRAME_OBJECT_SYNC);
                buf.put_u8(kind.wire_tag());
                buf.put_slice(object_id.as_bytes());
                buf.put_slice(owner_id.as_bytes());
                buf.put_slice(payload);
            }
        }

        buf.freeze()
    }

    /// Decode a datagram into its sequence number and frame
    pub fn decode(datagram: &[u8]) -> Result<(u32, Frame), FrameError> {
        if datagram.len() < HEADER_LEN {
            return Err(FrameError::Truncated);
        }

        let mut buf = datagram;
        let seq = buf.get_u32();
        let frame_kind = buf.get_u8();

        let frame = match frame_kind {
            FRAME_HELLO => {
                // player id + host flag + name length
                if buf.remaining() < 18 {
                    return Err(FrameError::Truncated);
                }
                let player_id = get_uuid(&mut buf);
                let host = buf.get_u8() != 0;
                let name_len = buf.get_u8() as usize;
                if name_len > MAX_NAME_LEN || buf.remaining() != name_len {
                    return Err(FrameError::Truncated);
                }
                let name = std::str::from_utf8(buf)
                    .map_err(|_| FrameError::BadName)?
                    .to_string();
                Frame::Hello {
                    player_id,
                    host,
                    name,
                }
            }
            FRAME_PING | FRAME_PONG => {
                if buf.remaining() != 8 {
                    return Err(FrameError::Truncated);
                }
                let t = buf.get_u64();
                if frame_kind == FRAME_PING {
                    Frame::Ping { t }
                } else {
                    Frame::Pong { t }
                }
            }
            FRAME_OBJECT_SYNC => {
                // kind tag + two uuids
                if buf.remaining() < 33 {
                    return Err(FrameError::Truncated);
                }
                let tag = buf.get_u8();
                let kind =
                    ObjectKind::from_wire_tag(tag).ok_or(FrameError::UnknownObjectKind(tag))?;
                let object_id = get_uuid(&mut buf);
                let owner_id = get_uuid(&mut buf);

                // The payload length comes from the kind, not the datagram
                if buf.remaining() != kind.payload_len() {
                    return Err(FrameError::BadPayloadLength {
                        kind,
                        expected: kind.payload_len(),
                        got: buf.remaining(),
                    });
                }
                let payload = Bytes::copy_from_slice(buf);

                Frame::ObjectSync {
                    kind,
                    object_id,
                    owner_id,
                    payload,
                }
            }
            other => return Err(FrameError::UnknownFrameKind(other)),
        };

        Ok((seq, frame))
    }
}

fn get_uuid(buf: &mut &[u8]) -> Uuid {
    let mut bytes = [0u8; 16];
    buf.copy_to_slice(&mut bytes);
    Uuid::from_bytes(bytes)
}

/// Cap a name at `MAX_NAME_LEN` bytes without splitting a UTF-8 character
fn truncate_name(name: &str) -> &str {
    if name.len() <= MAX_NAME_LEN {
        return name;
    }

    let mut end = MAX_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// Filter turning a lossy datagram flow into the ordered-unreliable channel
/// the sync protocol expects: frames arriving behind the newest sequence
/// seen are dropped. u32 sequence space outlives any match by orders of
/// magnitude.
#[derive(Debug, Default)]
pub struct SequenceFilter {
    last_seen: Option<u32>,
}

impl SequenceFilter {
    /// Whether a datagram with this sequence number is in order and should
    /// be delivered
    pub fn accept(&mut self, seq: u32) -> bool {
        match self.last_seen {
            Some(last) if seq <= last => false,
            _ => {
                self.last_seen = Some(seq);
                true
            }
        }
    }
}

/// Errors while decoding a datagram. A bad datagram is dropped and logged;
/// it never interrupts the simulation loop.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum FrameError {
    #[error("datagram too short for its frame")]
    Truncated,

    #[error("unknown frame kind {0}")]
    UnknownFrameKind(u8),

    #[error("unknown object kind tag {0}")]
    UnknownObjectKind(u8),

    #[error("sync payload for {kind:?} is {got} bytes, expected {expected}")]
    BadPayloadLength {
        kind: ObjectKind,
        expected: usize,
        got: usize,
    },

    #[error("player name is not valid UTF-8")]
    BadName,
}

/// Errors while applying a decoded snapshot to an object. Both variants are
/// absorbed at the reconciliation layer: the object keeps its last-known-good
/// state and the frame is discarded.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Unexpected length or out-of-range decoded values; nothing was mutated
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Authored by a peer that neither hosts the match nor owns the object.
    /// Expected under lag or a misbehaving peer, not exceptional.
    #[error("sender {sender} may not author updates for owner {claimed_owner}")]
    InvalidOwnership {
        sender: PlayerId,
        claimed_owner: PlayerId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_round_trips() {
        let frame = Frame::Hello {
            player_id: Uuid::new_v4(),
            host: true,
            name: "driver".to_string(),
        };

        let datagram = frame.encode(7);
        assert_eq!(Frame::decode(&datagram), Ok((7, frame)));
    }

    #[test]
    fn ping_and_pong_round_trip() {
        for frame in [Frame::Ping { t: 123456 }, Frame::Pong { t: u64::MAX }] {
            let datagram = frame.encode(1);
            assert_eq!(Frame::decode(&datagram), Ok((1, frame)));
        }
    }

    #[test]
    fn object_sync_round_trips() {
        let frame = Frame::ObjectSync {
            kind: ObjectKind::Car,
            object_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            payload: Bytes::from_static(&[1, 2, 3, 4, 5, 6, 7, 8]),
        };

        let datagram = frame.encode(42);
        assert_eq!(Frame::decode(&datagram), Ok((42, frame)));
    }

    #[test]
    fn truncated_datagrams_are_rejected() {
        assert_eq!(Frame::decode(&[]), Err(FrameError::Truncated));
        assert_eq!(Frame::decode(&[0, 0, 0, 1]), Err(FrameError::Truncated));

        let datagram = Frame::Ping { t: 9 }.encode(1);
        assert_eq!(
            Frame::decode(&datagram[..datagram.len() - 1]),
            Err(FrameError::Truncated)
        );
    }

    #[test]
    fn unknown_frame_kind_is_rejected() {
        let mut datagram = BytesMut::new();
        datagram.put_u32(1);
        datagram.put_u8(99);
        assert_eq!(Frame::decode(&datagram), Err(FrameError::UnknownFrameKind(99)));
    }

    #[test]
    fn unknown_object_kind_is_rejected() {
        let frame = Frame::ObjectSync {
            kind: ObjectKind::Car,
            object_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            payload: Bytes::from_static(&[0; 8]),
        };
        let mut datagram = BytesMut::from(frame.encode(1).as_ref());
        datagram[HEADER_LEN] = 77;

        assert_eq!(
            Frame::decode(&datagram),
            Err(FrameError::UnknownObjectKind(77))
        );
    }

    #[test]
    fn sync_payload_length_is_sized_by_kind() {
        let frame = Frame::ObjectSync {
            kind: ObjectKind::Car,
            object_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            payload: Bytes::from_static(&[0; 5]),
        };

        assert_eq!(
            Frame::decode(&frame.encode(1)),
            Err(FrameError::BadPayloadLength {
                kind: ObjectKind::Car,
                expected: 8,
                got: 5,
            })
        );
    }

    #[test]
    fn long_names_are_truncated_on_encode() {
        let frame = Frame::Hello {
            player_id: Uuid::new_v4(),
            host: false,
            name: "x".repeat(100),
        };

        let (_, decoded) = Frame::decode(&frame.encode(1)).unwrap();
        match decoded {
            Frame::Hello { name, .. } => assert_eq!(name.len(), 32),
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn sequence_filter_drops_stale_and_duplicate_datagrams() {
        let mut filter = SequenceFilter::default();
        assert!(filter.accept(5));
        assert!(!filter.accept(5));
        assert!(!filter.accept(3));
        assert!(filter.accept(6));
        assert!(filter.accept(100));
        assert!(!filter.accept(99));
    }
}
