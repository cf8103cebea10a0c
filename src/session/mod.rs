//! Per-peer voice streaming sessions.
//!
//! ```text
//!                       mic open                first transmit
//!   ┌────────┐ ────────────────▶ ┌──────────┐ ────────────────▶ ┌─────────────┐
//!   │ Closed │                   │ OpenIdle │                   │ OpenWaiting │
//!   └────────┘ ◀──── close / T1 ─┴──────────┘                   └──────┬──────┘
//!       ▲  ▲                                                  start    │ close / T1
//!       │  │ close (idle) / T2                              delivered  ▼
//!       │  └──────────────────────────────────────────────── ┌────────────┐
//!       │                                                    │ OpenActive │
//!       │            frame completes  ┌─────────┐ ◀───────── └────────────┘
//!       └──────────────────────────── │ Closing │  close while frame in transit
//!                                     └─────────┘
//! ```
//!
//! - [`manager`]: the state machine, timeouts and command handling.
//! - [`control`]: control message encoding, peer command decoding and
//!   the bounded retry queue.
//! - [`fragment`]: splitting frames into transport fragments.
//! - [`outbound`]: the backlog of frames awaiting transmission.

pub mod control;
pub mod fragment;
pub mod manager;
pub mod outbound;
mod state;
mod timer;

pub use manager::{QueueStatus, SendReport, SendStatus, SessionManager};
pub use state::MicState;
pub use timer::TimeoutKind;

/// Link-layer identifier of a connected peer (the connection handle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(pub u16);

impl core::fmt::Display for PeerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}
