//! Unified error types for the voice audio pipeline.
//!
//! A single `Error` enum that every subsystem converts into, so the
//! scheduler loop handles failures uniformly.  All variants are `Copy`
//! and allocation-free; the capture callback may construct them from
//! interrupt context.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level pipeline error
// ---------------------------------------------------------------------------

/// Every fallible operation in the audio pipeline funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The capture buffer exchange could not keep the source fed.
    Capture(CaptureError),
    /// A frame pool operation was rejected.
    Pool(PoolError),
    /// A session operation was rejected.
    Session(SessionError),
    /// The transport refused a notification.
    Link(LinkError),
    /// The encoder could not produce a frame.
    Encode(EncodeError),
    /// Configuration is invalid.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Capture(e) => write!(f, "capture: {e}"),
            Self::Pool(e) => write!(f, "frame pool: {e}"),
            Self::Session(e) => write!(f, "session: {e}"),
            Self::Link(e) => write!(f, "link: {e}"),
            Self::Encode(e) => write!(f, "encode: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl core::error::Error for Error {}

// ---------------------------------------------------------------------------
// Capture errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureError {
    /// The source asked for a buffer, the pool is empty and no filled
    /// buffer was available for reuse.  The source is now unfed.
    Starved,
    /// A callback arrived while the exchange was disarmed.
    NotArmed,
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starved => write!(f, "capture source starved of buffers"),
            Self::NotArmed => write!(f, "capture exchange not armed"),
        }
    }
}

impl From<CaptureError> for Error {
    fn from(e: CaptureError) -> Self {
        Self::Capture(e)
    }
}

// ---------------------------------------------------------------------------
// Frame pool errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// No free slot.  Callers treat this as backpressure.
    Exhausted,
    /// Handle index outside the arena.
    InvalidHandle,
    /// Handle refers to a slot that has since been freed (double release
    /// or use after release).
    StaleHandle,
    /// Retaining the frame would overflow its reference count.
    RefCountOverflow,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => write!(f, "no free frame"),
            Self::InvalidHandle => write!(f, "invalid frame handle"),
            Self::StaleHandle => write!(f, "stale frame handle"),
            Self::RefCountOverflow => write!(f, "frame reference count overflow"),
        }
    }
}

impl From<PoolError> for Error {
    fn from(e: PoolError) -> Self {
        Self::Pool(e)
    }
}

// ---------------------------------------------------------------------------
// Session errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    /// No session instance is allocated for the peer.
    UnknownPeer,
    /// Every session slot is already allocated.
    NoFreeInstance,
    /// The peer already has a session instance.
    AlreadyEnabled,
    /// Close requested while the session is not open.
    NotOpen,
    /// The request is not valid in the session's current state.
    InvalidState,
    /// The peer asked for a codec this device does not produce.
    CodecMismatch,
    /// The control message queue is full.
    ControlQueueFull,
    /// An inbound command had an unknown opcode or wrong length.
    MalformedCommand,
    /// A frame is too short to carry the codec state header.
    FrameTooShort,
    /// A frame exceeds the frame record capacity.
    FrameTooLarge,
    /// The transport reported an unrecoverable condition.
    LinkFatal(&'static str),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownPeer => write!(f, "unknown peer"),
            Self::NoFreeInstance => write!(f, "no free session instance"),
            Self::AlreadyEnabled => write!(f, "session already enabled"),
            Self::NotOpen => write!(f, "session not open"),
            Self::InvalidState => write!(f, "invalid session state"),
            Self::CodecMismatch => write!(f, "unsupported codec"),
            Self::ControlQueueFull => write!(f, "control queue full"),
            Self::MalformedCommand => write!(f, "malformed peer command"),
            Self::FrameTooShort => write!(f, "frame too short"),
            Self::FrameTooLarge => write!(f, "frame too large"),
            Self::LinkFatal(msg) => write!(f, "link fatal: {msg}"),
        }
    }
}

impl From<SessionError> for Error {
    fn from(e: SessionError) -> Self {
        Self::Session(e)
    }
}

// ---------------------------------------------------------------------------
// Link errors
// ---------------------------------------------------------------------------

/// Outcome of a refused notification.  `NotReady` and `BufferFull` are
/// transient; `Fatal` ends the current operation for that peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// Link not in a state to notify (not subscribed, busy, ...).
    NotReady,
    /// Transmit buffers are full; retry later.
    BufferFull,
    /// Anything else.
    Fatal(&'static str),
}

impl LinkError {
    /// `true` for outcomes that are expected to clear on their own.
    pub const fn is_backpressure(self) -> bool {
        matches!(self, Self::NotReady | Self::BufferFull)
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady => write!(f, "not ready"),
            Self::BufferFull => write!(f, "buffer full"),
            Self::Fatal(msg) => write!(f, "fatal: {msg}"),
        }
    }
}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

// ---------------------------------------------------------------------------
// Encoder errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    /// Input sample count does not match what the encoder expects.
    InputLength,
    /// The frame record cannot hold the encoded output.
    OutputTooSmall,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InputLength => write!(f, "unexpected input length"),
            Self::OutputTooSmall => write!(f, "output buffer too small"),
        }
    }
}

impl From<EncodeError> for Error {
    fn from(e: EncodeError) -> Self {
        Self::Encode(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Pipeline-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
