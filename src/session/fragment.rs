//! Audio frame fragmentation.
//!
//! A frame is sent as a first fragment carrying a header, followed by raw
//! continuation fragments:
//!
//! ```text
//! first:        ┌─────────┬────────┬───────────┬──────┬────────────────────┐
//!               │ seq BE16│ remote │ predictor │ step │ frame[3..]         │
//!               │  (2B)   │  (1B)  │   (2B)    │ (1B) │ (len − 6 bytes)    │
//!               └─────────┴────────┴───────────┴──────┴────────────────────┘
//! continuation: ┌──────────────────────────────────────────────────────────┐
//!               │ next min(len, remaining) frame bytes                     │
//!               └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The predictor and step bytes are the codec state the encoder wrote at
//! the start of the frame; they are moved into the header verbatim.

use crate::config::{FRAME_CAPACITY, MAX_FRAGMENT_LEN};
use crate::error::SessionError;

/// First-fragment header size.
pub const HEADER_LEN: usize = 6;
/// Codec state bytes at the start of every encoded frame.
pub const CODEC_STATE_LEN: usize = 3;

/// Decoded first-fragment header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentHeader {
    pub sequence: u16,
    pub remote_id: u8,
    pub predictor: i16,
    pub step_index: u8,
}

impl FragmentHeader {
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let h = bytes.get(..HEADER_LEN)?;
        Some(Self {
            sequence: u16::from_be_bytes([h[0], h[1]]),
            remote_id: h[2],
            predictor: i16::from_be_bytes([h[3], h[4]]),
            step_index: h[5],
        })
    }
}

/// One fragment ready for the link.
#[derive(Debug, Clone)]
pub struct Fragment {
    buf: [u8; MAX_FRAGMENT_LEN],
    len: usize,
    /// Frame bytes this fragment carries (header excluded).
    pub consumed: usize,
}

impl Fragment {
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

/// Build the first fragment of `frame`.
pub fn first(
    frame: &[u8],
    sequence: u16,
    remote_id: u8,
    fragment_len: usize,
) -> Result<Fragment, SessionError> {
    if frame.len() < CODEC_STATE_LEN {
        return Err(SessionError::FrameTooShort);
    }
    if frame.len() > FRAME_CAPACITY {
        return Err(SessionError::FrameTooLarge);
    }
    let fragment_len = fragment_len.min(MAX_FRAGMENT_LEN);
    let mut buf = [0u8; MAX_FRAGMENT_LEN];
    buf[..2].copy_from_slice(&sequence.to_be_bytes());
    buf[2] = remote_id;
    buf[3..HEADER_LEN].copy_from_slice(&frame[..CODEC_STATE_LEN]);

    let payload = &frame[CODEC_STATE_LEN..];
    let take = payload.len().min(fragment_len.saturating_sub(HEADER_LEN));
    buf[HEADER_LEN..HEADER_LEN + take].copy_from_slice(&payload[..take]);
    Ok(Fragment {
        buf,
        len: HEADER_LEN + take,
        consumed: CODEC_STATE_LEN + take,
    })
}

/// Build a continuation fragment from the unsent tail of a frame.
pub fn continuation(remaining: &[u8], fragment_len: usize) -> Fragment {
    let take = remaining.len().min(fragment_len.min(MAX_FRAGMENT_LEN));
    let mut buf = [0u8; MAX_FRAGMENT_LEN];
    buf[..take].copy_from_slice(&remaining[..take]);
    Fragment {
        buf,
        len: take,
        consumed: take,
    }
}

/// Number of fragments a `frame_len`-byte frame occupies.
pub fn fragment_count(frame_len: usize, fragment_len: usize) -> usize {
    // The header replaces the codec state bytes and adds three more.
    (frame_len + HEADER_LEN - CODEC_STATE_LEN).div_ceil(fragment_len)
}
