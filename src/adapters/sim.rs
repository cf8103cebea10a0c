//! Host-side simulation adapters.
//!
//! [`ToneSource`] stands in for the I2S microphone: it holds up to two
//! buffers and fills them with a sine tone when the caller signals a
//! completed capture period.  [`LoopbackLink`] stands in for the BLE
//! notification path, with a per-connection-interval credit budget that
//! produces the same `BufferFull` backpressure the radio stack reports.
//!
//! The device binary uses both for its bench loop; integration tests use
//! them to drive the pipeline end to end.

use log::debug;

use crate::app::ports::{CaptureSource, NotifyChannel, NotifyPort};
use crate::audio::capture::{CaptureEvent, RawBuffer, SOURCE_SLOTS};
use crate::config::SAMPLE_RATE_HZ;
use crate::error::LinkError;
use crate::session::PeerId;

// ───────────────────────────────────────────────────────────────
// Microphone
// ───────────────────────────────────────────────────────────────

/// Double-buffered tone generator.
pub struct ToneSource {
    armed: bool,
    held: heapless::Deque<RawBuffer, SOURCE_SLOTS>,
    phase: f32,
    step: f32,
    amplitude: f32,
}

impl ToneSource {
    pub fn new(freq_hz: f32, amplitude: i16) -> Self {
        Self {
            armed: false,
            held: heapless::Deque::new(),
            phase: 0.0,
            step: core::f32::consts::TAU * freq_hz / SAMPLE_RATE_HZ as f32,
            amplitude: f32::from(amplitude),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn held(&self) -> usize {
        self.held.len()
    }

    /// One capture period elapsed.  Fills the oldest held buffer and hands
    /// it back, asking for a replacement.  Returns `None` while disarmed.
    pub fn complete(&mut self) -> Option<CaptureEvent> {
        if !self.armed {
            return None;
        }
        let mut released = self.held.pop_front();
        if let Some(buffer) = released.as_mut() {
            for s in buffer.samples_mut().iter_mut() {
                *s = (self.phase.sin() * self.amplitude) as i16;
                self.phase = (self.phase + self.step) % core::f32::consts::TAU;
            }
        }
        Some(CaptureEvent {
            buffer_requested: true,
            buffer_released: released,
        })
    }

    /// The request issued when the source is first armed: one per slot.
    pub fn prime_event(&self) -> CaptureEvent {
        CaptureEvent {
            buffer_requested: self.armed && !self.held.is_full(),
            buffer_released: None,
        }
    }
}

impl CaptureSource for ToneSource {
    fn arm(&mut self) {
        self.armed = true;
    }

    fn disarm(&mut self) -> heapless::Vec<RawBuffer, SOURCE_SLOTS> {
        self.armed = false;
        let mut out = heapless::Vec::new();
        while let Some(buffer) = self.held.pop_front() {
            // Both containers share the same capacity.
            let _ = out.push(buffer);
        }
        out
    }

    fn set_buffer(&mut self, buffer: RawBuffer) {
        if let Err(buffer) = self.held.push_back(buffer) {
            debug!("Sim mic: slot overrun, dropping buffer {}", buffer.slot());
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Radio link
// ───────────────────────────────────────────────────────────────

/// Notification sink with a credit budget per connection interval.
#[derive(Debug)]
pub struct LoopbackLink {
    credits_per_interval: usize,
    credits: usize,
    audio_bytes: usize,
    audio_packets: usize,
    control: Vec<(PeerId, Vec<u8>)>,
}

impl LoopbackLink {
    pub fn new(credits_per_interval: usize) -> Self {
        Self {
            credits_per_interval,
            credits: credits_per_interval,
            audio_bytes: 0,
            audio_packets: 0,
            control: Vec::new(),
        }
    }

    /// A connection event went by: the controller drained its queue.
    pub fn next_interval(&mut self) {
        self.credits = self.credits_per_interval;
    }

    pub fn audio_bytes(&self) -> usize {
        self.audio_bytes
    }

    pub fn audio_packets(&self) -> usize {
        self.audio_packets
    }

    /// Control messages delivered so far, oldest first.
    pub fn control(&self) -> &[(PeerId, Vec<u8>)] {
        &self.control
    }
}

impl NotifyPort for LoopbackLink {
    fn notify(&mut self, peer: PeerId, channel: NotifyChannel, data: &[u8]) -> Result<(), LinkError> {
        if self.credits == 0 {
            return Err(LinkError::BufferFull);
        }
        self.credits -= 1;
        match channel {
            NotifyChannel::Audio => {
                self.audio_bytes += data.len();
                self.audio_packets += 1;
            }
            NotifyChannel::Control => {
                debug!("Sim link: peer {} control {:02x?}", peer, data);
                self.control.push((peer, data.to_vec()));
            }
        }
        Ok(())
    }
}
