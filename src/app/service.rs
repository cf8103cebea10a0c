//! Voice service: the hexagonal core.
//!
//! [`VoiceService`] owns the session table, the frame pool, the outbound
//! stream and the scheduler-side gauges.  The capture exchange is shared
//! with the microphone interrupt and is borrowed, not owned.  All I/O
//! flows through port traits injected at call sites.
//!
//! ```text
//!  CaptureExchange ──▶ ┌──────────────────────────────┐ ──▶ NotifyPort
//!                      │         VoiceService         │
//!  PeerEvent ─────────▶│ Encoder · FramePool · Session│ ──▶ EventSink
//!                      └──────────────────────────────┘
//! ```
//!
//! Capture runs exactly while some session is past `Closed`: every entry
//! point finishes by reconciling the capture state with the sessions.

use log::{info, warn};

use crate::audio::capture::{CaptureExchange, RawBuffer};
use crate::audio::frame::FramePool;
use crate::config::AudioConfig;
use crate::diagnostics::{AudioDiagnostics, BitrateGauge, LossGauge};
use crate::error::{Error, Result};
use crate::session::outbound::{OutboundStream, StreamStatus};
use crate::session::{QueueStatus, SessionManager};

use super::commands::PeerEvent;
use super::events::AudioEvent;
use super::ports::{CaptureSource, Encoder, EventSink, NotifyPort};

/// Upper bound on link operations per [`VoiceService::poll`].
const MAX_TX_PER_POLL: usize = 32;

// ───────────────────────────────────────────────────────────────
// VoiceService
// ───────────────────────────────────────────────────────────────

pub struct VoiceService<'a, E: Encoder> {
    capture: &'a CaptureExchange,
    encoder: E,
    config: AudioConfig,
    sessions: SessionManager,
    frames: FramePool,
    outbound: OutboundStream,
    /// Encoded frames: handled, lost (no frame / no backlog room), discarded.
    frame_gauge: LossGauge,
    bitrate: BitrateGauge,
    capturing: bool,
}

impl<'a, E: Encoder> VoiceService<'a, E> {
    /// Build the service.  Fails if `config` does not validate.
    pub fn new(config: AudioConfig, capture: &'a CaptureExchange, encoder: E) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            capture,
            encoder,
            sessions: SessionManager::new(config.clone()),
            config,
            frames: FramePool::new(),
            outbound: OutboundStream::new(),
            frame_gauge: LossGauge::new(),
            bitrate: BitrateGauge::new(),
            capturing: false,
        })
    }

    // ── Inbound events ────────────────────────────────────────

    /// Apply one event from the radio stack.
    pub fn handle_peer_event(
        &mut self,
        event: PeerEvent,
        source: &mut impl CaptureSource,
        sink: &mut impl EventSink,
    ) -> Result<()> {
        let result = match event {
            PeerEvent::Enabled(peer) => self.sessions.on_peer_enabled(peer, sink),
            PeerEvent::Disabled(peer) => self.sessions.on_peer_disabled(peer, sink).map(|_| ()),
            PeerEvent::Command { peer, payload } => {
                self.sessions.handle_command(peer, &payload, sink)
            }
            PeerEvent::SearchRequested(peer) => self.sessions.start_search(peer),
        };
        self.reconcile_capture(source, sink);
        result.map_err(Error::from)
    }

    /// Advance session timeouts by `elapsed_ms`.
    pub fn tick(
        &mut self,
        elapsed_ms: u32,
        source: &mut impl CaptureSource,
        sink: &mut impl EventSink,
    ) -> Result<()> {
        let result = self.sessions.tick(elapsed_ms, sink);
        self.reconcile_capture(source, sink);
        result.map_err(Error::from)
    }

    // ── Scheduler poll ────────────────────────────────────────

    /// Encode every filled capture buffer, then push audio fragments and
    /// control messages in turn until both are idle or blocked.
    pub fn poll(
        &mut self,
        source: &mut impl CaptureSource,
        link: &mut impl NotifyPort,
        sink: &mut impl EventSink,
    ) -> Result<()> {
        while let Some(buffer) = self.capture.take_filled() {
            self.process_buffer(buffer);
        }

        let mut result = Ok(());
        for _ in 0..MAX_TX_PER_POLL {
            let audio = match self
                .outbound
                .process(&mut self.frames, &mut self.sessions, link, sink)
            {
                Ok(status) => status,
                Err(e) => {
                    warn!("Voice: audio frame dropped: {}", e);
                    result = Err(e);
                    StreamStatus::Dropped
                }
            };
            if audio == StreamStatus::Dropped {
                self.frame_gauge.count_lost();
            }

            let control = match self.sessions.process_control_queue(link, sink) {
                Ok(status) => status,
                Err(e) => {
                    warn!("Voice: control message dropped: {}", e);
                    result = Err(e.into());
                    QueueStatus::Sent
                }
            };

            let audio_busy = matches!(audio, StreamStatus::Progress | StreamStatus::Dropped);
            if !audio_busy && control != QueueStatus::Sent {
                break;
            }
        }

        self.reconcile_capture(source, sink);
        result
    }

    fn process_buffer(&mut self, buffer: RawBuffer) {
        if !self.capturing {
            self.capture.recycle(buffer);
            self.frame_gauge.count_discarded();
            return;
        }
        self.frame_gauge.count_handled();

        let handle = match self.frames.acquire(None) {
            Ok(handle) => handle,
            Err(e) => {
                self.capture.recycle(buffer);
                self.frame_gauge.count_lost();
                warn!("Voice: cannot allocate audio frame ({})", e);
                return;
            }
        };

        let encoded = match self.frames.frame_mut(handle) {
            Ok(frame) => self
                .encoder
                .encode(buffer.samples(), frame)
                .map(|()| frame.len())
                .map_err(Error::from),
            Err(e) => Err(e.into()),
        };
        self.capture.recycle(buffer);

        match encoded {
            Ok(len) => {
                self.bitrate.record(len);
                if let Err(e) = self.outbound.push(&mut self.frames, handle) {
                    warn!("Voice: frame not queued ({})", e);
                    self.frame_gauge.count_lost();
                }
            }
            Err(e) => {
                warn!("Voice: encode failed ({})", e);
                self.frame_gauge.count_lost();
            }
        }
        // The outbound stream holds its own reference.
        if let Err(e) = self.frames.release(handle) {
            warn!("Voice: frame release failed ({})", e);
        }
    }

    // ── Capture lifecycle ─────────────────────────────────────

    fn reconcile_capture(&mut self, source: &mut impl CaptureSource, sink: &mut impl EventSink) {
        let want = self.sessions.streaming_peer().is_some();
        if want && !self.capturing {
            self.enable_capture(source);
        } else if !want && self.capturing {
            self.disable_capture(source, sink);
        }
    }

    fn enable_capture(&mut self, source: &mut impl CaptureSource) {
        self.encoder.reset();
        self.frame_gauge.reset();
        self.bitrate.reset();
        self.frames.reset_max();
        self.capture.enable(self.config.skip_buffers(), source);
        self.capturing = true;
        info!("Voice: audio pipeline enabled");
    }

    fn disable_capture(&mut self, source: &mut impl CaptureSource, sink: &mut impl EventSink) {
        self.capture.disable(source);
        let dropped = self.outbound.flush(&mut self.frames);
        for _ in 0..dropped {
            self.frame_gauge.count_discarded();
        }
        self.capturing = false;

        let diagnostics = self.diagnostics();
        diagnostics.log_summary();
        sink.emit(&AudioEvent::Diagnostics(diagnostics));
        info!("Voice: audio pipeline disabled");
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn diagnostics(&self) -> AudioDiagnostics {
        AudioDiagnostics {
            capture: self.capture.gauge().snapshot(),
            frames: self.frame_gauge.snapshot(),
            bitrate: self.bitrate.snapshot(),
            buffer_pool: self.capture.pool_stats(),
            frame_pool: self.frames.stats(),
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn frame_pool(&self) -> &FramePool {
        &self.frames
    }

    pub fn backlog_len(&self) -> usize {
        self.outbound.len()
    }
}
