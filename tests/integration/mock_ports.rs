//! Mock port adapters for integration tests.
//!
//! Records every notification and event so tests can assert on the full
//! history without a radio or a microphone.

use voiceremote::app::events::AudioEvent;
use voiceremote::app::ports::{CaptureSource, EventSink, NotifyChannel, NotifyPort};
use voiceremote::audio::capture::{CaptureEvent, CaptureExchange, RawBuffer, SOURCE_SLOTS};
use voiceremote::error::LinkError;
use voiceremote::session::PeerId;

// ── Link ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub peer: PeerId,
    pub channel: NotifyChannel,
    pub data: Vec<u8>,
}

#[derive(Default)]
pub struct RecordingLink {
    pub sent: Vec<Notification>,
    /// When set, every notification fails with this error.
    pub refuse: Option<LinkError>,
}

#[allow(dead_code)]
impl RecordingLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn audio(&self) -> Vec<&Notification> {
        self.sent
            .iter()
            .filter(|n| n.channel == NotifyChannel::Audio)
            .collect()
    }

    pub fn control(&self) -> Vec<&[u8]> {
        self.sent
            .iter()
            .filter(|n| n.channel == NotifyChannel::Control)
            .map(|n| n.data.as_slice())
            .collect()
    }

    /// Audio payload bytes, first-fragment headers included.
    pub fn audio_bytes(&self) -> usize {
        self.audio().iter().map(|n| n.data.len()).sum()
    }
}

impl NotifyPort for RecordingLink {
    fn notify(&mut self, peer: PeerId, channel: NotifyChannel, data: &[u8]) -> Result<(), LinkError> {
        if let Some(e) = self.refuse {
            return Err(e);
        }
        self.sent.push(Notification {
            peer,
            channel,
            data: data.to_vec(),
        });
        Ok(())
    }
}

// ── Event sink ────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AudioEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, pred: impl Fn(&AudioEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    pub fn last(&self) -> Option<&AudioEvent> {
        self.events.last()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AudioEvent) {
        self.events.push(event.clone());
    }
}

// ── Microphone ────────────────────────────────────────────────

/// Double-buffered microphone driven by hand.
#[derive(Default)]
pub struct ManualMic {
    pub armed: bool,
    pub held: Vec<RawBuffer>,
}

#[allow(dead_code)]
impl ManualMic {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand the source its initial buffers.
    pub fn prime(&mut self, capture: &CaptureExchange) {
        while self.held.len() < SOURCE_SLOTS {
            let event = CaptureEvent {
                buffer_requested: true,
                buffer_released: None,
            };
            capture.on_event(event, self).unwrap();
        }
    }

    /// One capture period: fill the oldest buffer with `value` and run the
    /// callback.
    pub fn fire(&mut self, capture: &CaptureExchange, value: i16) {
        let mut released = if self.held.is_empty() {
            None
        } else {
            Some(self.held.remove(0))
        };
        if let Some(buffer) = released.as_mut() {
            buffer.samples_mut().fill(value);
        }
        let event = CaptureEvent {
            buffer_requested: true,
            buffer_released: released,
        };
        capture.on_event(event, self).unwrap();
    }
}

impl CaptureSource for ManualMic {
    fn arm(&mut self) {
        self.armed = true;
    }

    fn disarm(&mut self) -> heapless::Vec<RawBuffer, SOURCE_SLOTS> {
        self.armed = false;
        let mut out = heapless::Vec::new();
        for buffer in self.held.drain(..) {
            out.push(buffer).unwrap();
        }
        out
    }

    fn set_buffer(&mut self, buffer: RawBuffer) {
        self.held.push(buffer);
    }
}
