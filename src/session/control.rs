//! Control-plane wire format and the bounded retry queue.
//!
//! ## Outbound control messages (device → peer)
//!
//! ```text
//! ┌────────────┬──────┬──────────────────────────────────────────────┐
//! │ Message    │ Op   │ Payload (big-endian)                         │
//! ├────────────┼──────┼──────────────────────────────────────────────┤
//! │ AudioStop  │ 0x00 │ -                                            │
//! │ AudioStart │ 0x04 │ -                                            │
//! │ StartSearch│ 0x08 │ -                                            │
//! │ AudioSync  │ 0x0A │ frame u16                                    │
//! │ CapsResp   │ 0x0B │ version u16, codecs u16, frame u16, frag u16 │
//! │ MicOpenErr │ 0x0C │ code u16                                     │
//! └────────────┴──────┴──────────────────────────────────────────────┘
//! ```
//!
//! ## Inbound peer commands
//!
//! `GetCaps [0x0A, ver u16, codecs u16]`, `MicOpen [0x0C, codec u16]`
//! (a bare `[0x0C]` selects ADPCM 8 kHz) and `MicClose [0x0D]`.

use heapless::{Deque, Vec};

use super::{MicState, PeerId};
use crate::config::CONTROL_QUEUE_LEN;
use crate::error::SessionError;

// ── Protocol constants ───────────────────────────────────────

pub const PROTOCOL_VERSION: u16 = 0x0005;

pub const CODEC_ADPCM_8KHZ: u16 = 0x0001;
pub const CODEC_OPUS: u16 = 0x0004;

/// Codec mask advertised in the capabilities response.
pub const SUPPORTED_CODECS: u16 = CODEC_ADPCM_8KHZ;

/// Frame size advertised to the peer (6-byte header + 128 payload bytes).
pub const ADVERTISED_FRAME_BYTES: u16 = 134;

const OP_AUDIO_STOP: u8 = 0x00;
const OP_AUDIO_START: u8 = 0x04;
const OP_START_SEARCH: u8 = 0x08;
const OP_AUDIO_SYNC: u8 = 0x0A;
const OP_GET_CAPS_RESP: u8 = 0x0B;
const OP_MIC_OPEN_ERROR: u8 = 0x0C;

const CMD_GET_CAPS: u8 = 0x0A;
const CMD_MIC_OPEN: u8 = 0x0C;
const CMD_MIC_CLOSE: u8 = 0x0D;

/// Longest encoded control message.
pub const MAX_CONTROL_LEN: usize = 9;

// ───────────────────────────────────────────────────────────────
// Outbound messages
// ───────────────────────────────────────────────────────────────

/// Reason carried by [`ControlMessage::MicOpenError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum MicOpenErrorCode {
    InvalidCodec = 0x0F01,
    Timeout = 0x0F02,
    InvalidState = 0x0F03,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    AudioStop,
    AudioStart,
    StartSearch,
    AudioSync {
        frame: u16,
    },
    GetCapsResponse {
        version: u16,
        codecs: u16,
        frame_bytes: u16,
        fragment_bytes: u16,
    },
    MicOpenError(MicOpenErrorCode),
}

impl ControlMessage {
    pub fn opcode(&self) -> u8 {
        match self {
            Self::AudioStop => OP_AUDIO_STOP,
            Self::AudioStart => OP_AUDIO_START,
            Self::StartSearch => OP_START_SEARCH,
            Self::AudioSync { .. } => OP_AUDIO_SYNC,
            Self::GetCapsResponse { .. } => OP_GET_CAPS_RESP,
            Self::MicOpenError(_) => OP_MIC_OPEN_ERROR,
        }
    }

    pub fn encode(&self) -> Vec<u8, MAX_CONTROL_LEN> {
        let mut out = Vec::new();
        let mut put = |bytes: &[u8]| {
            // MAX_CONTROL_LEN covers the largest variant.
            let _ = out.extend_from_slice(bytes);
        };
        put(&[self.opcode()]);
        match *self {
            Self::AudioStop | Self::AudioStart | Self::StartSearch => {}
            Self::AudioSync { frame } => put(&frame.to_be_bytes()),
            Self::GetCapsResponse {
                version,
                codecs,
                frame_bytes,
                fragment_bytes,
            } => {
                put(&version.to_be_bytes());
                put(&codecs.to_be_bytes());
                put(&frame_bytes.to_be_bytes());
                put(&fragment_bytes.to_be_bytes());
            }
            Self::MicOpenError(code) => put(&(code as u16).to_be_bytes()),
        }
        out
    }
}

// ───────────────────────────────────────────────────────────────
// Inbound commands
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerCommand {
    GetCaps { version: u16, codecs: u16 },
    MicOpen { codec: u16 },
    MicClose,
}

impl PeerCommand {
    pub fn decode(bytes: &[u8]) -> Result<Self, SessionError> {
        let be16 = |i: usize| u16::from_be_bytes([bytes[i], bytes[i + 1]]);
        match (bytes.first(), bytes.len()) {
            (Some(&CMD_GET_CAPS), 5) => Ok(Self::GetCaps {
                version: be16(1),
                codecs: be16(3),
            }),
            (Some(&CMD_MIC_OPEN), 3) => Ok(Self::MicOpen { codec: be16(1) }),
            (Some(&CMD_MIC_OPEN), 1) => Ok(Self::MicOpen {
                codec: CODEC_ADPCM_8KHZ,
            }),
            (Some(&CMD_MIC_CLOSE), 1) => Ok(Self::MicClose),
            _ => Err(SessionError::MalformedCommand),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Retry queue
// ───────────────────────────────────────────────────────────────

/// A control message waiting for the link to accept it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedControl {
    pub peer: PeerId,
    pub message: ControlMessage,
    /// State to apply to the peer's session once the link accepts it.
    pub follow_up: Option<MicState>,
}

/// Bounded FIFO of pending control messages.  Never overwrites.
#[derive(Debug, Default)]
pub struct ControlQueue {
    entries: Deque<QueuedControl, CONTROL_QUEUE_LEN>,
}

impl ControlQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: QueuedControl) -> Result<(), SessionError> {
        self.entries
            .push_back(entry)
            .map_err(|_| SessionError::ControlQueueFull)
    }

    pub fn front(&self) -> Option<&QueuedControl> {
        self.entries.front()
    }

    pub fn pop(&mut self) -> Option<QueuedControl> {
        self.entries.pop_front()
    }

    /// Drop every entry matching `reject`, keeping the order of the rest.
    pub fn purge(&mut self, mut reject: impl FnMut(&QueuedControl) -> bool) -> usize {
        let before = self.entries.len();
        let mut kept = Deque::new();
        while let Some(entry) = self.entries.pop_front() {
            if !reject(&entry) {
                // Same capacity as the source queue.
                let _ = kept.push_back(entry);
            }
        }
        self.entries = kept;
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.is_full()
    }

    /// Number of entries matching `pred`.
    pub fn count(&self, pred: impl Fn(&QueuedControl) -> bool) -> usize {
        self.entries.iter().filter(|&e| pred(e)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_every_message() {
        assert_eq!(ControlMessage::AudioStop.encode().as_slice(), &[0x00]);
        assert_eq!(ControlMessage::AudioStart.encode().as_slice(), &[0x04]);
        assert_eq!(ControlMessage::StartSearch.encode().as_slice(), &[0x08]);
        assert_eq!(
            ControlMessage::AudioSync { frame: 0x0102 }.encode().as_slice(),
            &[0x0A, 0x01, 0x02]
        );
        assert_eq!(
            ControlMessage::MicOpenError(MicOpenErrorCode::Timeout)
                .encode()
                .as_slice(),
            &[0x0C, 0x0F, 0x02]
        );
        let caps = ControlMessage::GetCapsResponse {
            version: PROTOCOL_VERSION,
            codecs: SUPPORTED_CODECS,
            frame_bytes: ADVERTISED_FRAME_BYTES,
            fragment_bytes: 20,
        };
        assert_eq!(
            caps.encode().as_slice(),
            &[0x0B, 0x00, 0x05, 0x00, 0x01, 0x00, 0x86, 0x00, 0x14]
        );
    }

    #[test]
    fn decodes_peer_commands() {
        assert_eq!(
            PeerCommand::decode(&[0x0A, 0x00, 0x05, 0x00, 0x03]),
            Ok(PeerCommand::GetCaps {
                version: 5,
                codecs: 3
            })
        );
        assert_eq!(
            PeerCommand::decode(&[0x0C, 0x00, 0x04]),
            Ok(PeerCommand::MicOpen { codec: CODEC_OPUS })
        );
        assert_eq!(
            PeerCommand::decode(&[0x0C]),
            Ok(PeerCommand::MicOpen {
                codec: CODEC_ADPCM_8KHZ
            })
        );
        assert_eq!(PeerCommand::decode(&[0x0D]), Ok(PeerCommand::MicClose));
    }

    #[test]
    fn rejects_malformed_commands() {
        let cases: [&[u8]; 5] = [&[], &[0x0D, 0x00], &[0x0A, 0x00], &[0x0C, 0x00], &[0x42]];
        for bad in cases {
            assert_eq!(
                PeerCommand::decode(bad),
                Err(SessionError::MalformedCommand),
                "{bad:?}"
            );
        }
    }

    fn entry(peer: u16, message: ControlMessage) -> QueuedControl {
        QueuedControl {
            peer: PeerId(peer),
            message,
            follow_up: None,
        }
    }

    #[test]
    fn queue_rejects_when_full() {
        let mut q = ControlQueue::new();
        for _ in 0..CONTROL_QUEUE_LEN {
            q.push(entry(1, ControlMessage::AudioStop)).unwrap();
        }
        assert_eq!(
            q.push(entry(1, ControlMessage::AudioStart)),
            Err(SessionError::ControlQueueFull)
        );
        assert!(q.is_full());
        // The rejected push did not overwrite anything.
        assert_eq!(q.front().map(|e| e.message), Some(ControlMessage::AudioStop));
    }

    #[test]
    fn purge_keeps_order_of_survivors() {
        let mut q = ControlQueue::new();
        q.push(entry(1, ControlMessage::AudioStart)).unwrap();
        q.push(entry(2, ControlMessage::AudioStop)).unwrap();
        assert_eq!(q.purge(|e| e.peer == PeerId(1)), 1);
        assert_eq!(q.len(), 1);
        assert_eq!(q.count(|e| e.peer == PeerId(1)), 0);
        assert_eq!(q.pop().map(|e| e.peer), Some(PeerId(2)));
        assert!(q.is_empty());
    }
}
