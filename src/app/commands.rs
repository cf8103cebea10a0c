//! Inbound events from the radio stack.
//!
//! The BLE layer translates connection and GATT activity into
//! [`PeerEvent`]s that the [`VoiceService`](super::service::VoiceService)
//! interprets.

use crate::session::PeerId;

/// Longest command payload the voice service accepts.
pub const COMMAND_MAX_LEN: usize = 8;

/// Things a peer (or the local user, for search) can ask of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// The peer subscribed to the voice service.
    Enabled(PeerId),

    /// The peer unsubscribed or disconnected.
    Disabled(PeerId),

    /// Raw bytes written to the command characteristic.
    Command {
        peer: PeerId,
        payload: heapless::Vec<u8, COMMAND_MAX_LEN>,
    },

    /// The user pressed the voice key before the host opened the mic.
    SearchRequested(PeerId),
}

impl PeerEvent {
    /// Build a [`PeerEvent::Command`], truncating oversized writes.
    ///
    /// A truncated payload fails command decoding, so oversize writes
    /// are still rejected downstream.
    pub fn command(peer: PeerId, bytes: &[u8]) -> Self {
        let mut payload = heapless::Vec::new();
        for &b in bytes.iter().take(COMMAND_MAX_LEN) {
            let _ = payload.push(b);
        }
        Self::Command { peer, payload }
    }
}
