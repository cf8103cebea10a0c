//! Outbound pipeline events.
//!
//! The session manager and the [`VoiceService`](super::service::VoiceService)
//! emit these through the [`EventSink`](super::ports::EventSink) port.
//! Adapters decide what to do with them: log to serial, drive an LED,
//! forward to the HID layer.

use crate::diagnostics::AudioDiagnostics;
use crate::session::PeerId;

/// Peer and sampling rate attached to every session lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionInfo {
    pub peer: PeerId,
    pub sampling_rate_khz: u8,
}

/// Structured events emitted by the audio core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioEvent {
    /// The peer enabled the voice service (session allocated).
    Enabled(SessionInfo),

    /// The peer disabled the voice service or disconnected.
    Disabled(SessionInfo),

    /// The peer opened the microphone.
    MicOpen(SessionInfo),

    /// The microphone closed (peer request, timeout or deferred close).
    MicClose(SessionInfo),

    /// A device-initiated search expired without a mic open.
    SearchTimeout(SessionInfo),

    /// Gauges collected when capture stopped.
    Diagnostics(AudioDiagnostics),
}
