//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing pipeline events to the ESP-IDF
//! logger (UART / USB-CDC in production, stderr on the host).

use log::info;

use crate::app::events::AudioEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AudioEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AudioEvent) {
        match event {
            AudioEvent::Enabled(s) => {
                info!("VOICE | enabled | peer={} rate={}kHz", s.peer, s.sampling_rate_khz);
            }
            AudioEvent::Disabled(s) => {
                info!("VOICE | disabled | peer={}", s.peer);
            }
            AudioEvent::MicOpen(s) => {
                info!("VOICE | mic open | peer={} rate={}kHz", s.peer, s.sampling_rate_khz);
            }
            AudioEvent::MicClose(s) => {
                info!("VOICE | mic close | peer={}", s.peer);
            }
            AudioEvent::SearchTimeout(s) => {
                info!("VOICE | search timeout | peer={}", s.peer);
            }
            AudioEvent::Diagnostics(d) => {
                info!(
                    "VOICE | stats | capture lost={}% frames lost={}% discarded={}% \
                     avg={}bit/s frames peak={}/{}",
                    d.capture.lost_percent(),
                    d.frames.lost_percent(),
                    d.frames.discarded_percent(),
                    d.bitrate.avg_bps,
                    d.frame_pool.max_in_use,
                    d.frame_pool.capacity,
                );
            }
        }
    }
}
