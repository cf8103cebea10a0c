//! Port traits: the hexagonal boundary between the audio pipeline and
//! the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ VoiceService (domain)
//! ```
//!
//! The microphone driver, the codec, the radio stack and the event
//! consumers implement these traits.  The [`VoiceService`](super::service::VoiceService)
//! takes them as generics at call sites, so every pipeline path runs on
//! the host against recording mocks.

use crate::audio::capture::{RawBuffer, SOURCE_SLOTS};
use crate::audio::frame::Frame;
use crate::error::{EncodeError, LinkError};
use crate::session::PeerId;

use super::events::AudioEvent;

// ───────────────────────────────────────────────────────────────
// Capture source (driven adapter: microphone → domain)
// ───────────────────────────────────────────────────────────────

/// The sampling hardware.  Its completion interrupt reports back through
/// [`CaptureExchange::on_event`](crate::audio::capture::CaptureExchange::on_event).
pub trait CaptureSource {
    /// Start sampling.  The source will request buffers right away.
    fn arm(&mut self);

    /// Stop sampling and hand back every buffer the source still holds.
    fn disarm(&mut self) -> heapless::Vec<RawBuffer, SOURCE_SLOTS>;

    /// Give the source the next buffer to fill.
    fn set_buffer(&mut self, buffer: RawBuffer);
}

// ───────────────────────────────────────────────────────────────
// Encoder (driven adapter: domain → codec)
// ───────────────────────────────────────────────────────────────

/// Synchronous audio codec.
pub trait Encoder {
    /// Encode one capture buffer into a pool-owned frame record,
    /// setting its payload and length.
    fn encode(&mut self, samples: &[i16], frame: &mut Frame) -> Result<(), EncodeError>;

    /// Drop any inter-frame codec state.  Called when capture starts.
    fn reset(&mut self) {}
}

// ───────────────────────────────────────────────────────────────
// Notify port (driven adapter: domain → radio)
// ───────────────────────────────────────────────────────────────

/// Which characteristic a notification goes out on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyChannel {
    /// Audio fragments.
    Audio,
    /// Control messages (start/stop/sync/caps/errors).
    Control,
}

/// Outbound notifications to a connected peer.
///
/// `Err(NotReady)` and `Err(BufferFull)` are backpressure: the caller
/// keeps its state and retries the same bytes later.
pub trait NotifyPort {
    fn notify(&mut self, peer: PeerId, channel: NotifyChannel, data: &[u8]) -> Result<(), LinkError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / application)
// ───────────────────────────────────────────────────────────────

/// The pipeline emits structured [`AudioEvent`]s through this port.
pub trait EventSink {
    fn emit(&mut self, event: &AudioEvent);
}
