//! Session state machine, timeouts and audio transmission.
//!
//! [`SessionManager`] owns a fixed table of session slots (one per
//! enabled peer) and the shared control-message retry queue.  Every
//! operation runs in the scheduler context; side effects leave through
//! the [`NotifyPort`] and [`EventSink`] passed at the call site.
//!
//! Transition side effects:
//!
//! | From          | To            | Effect                                         |
//! |---------------|---------------|------------------------------------------------|
//! | `Closed`      | `OpenIdle`    | reset counter, start mic-open timeout, MicOpen |
//! | `OpenIdle`    | `OpenWaiting` | queue AudioStart (follow-up `OpenActive`)      |
//! | `OpenWaiting` | `OpenActive`  | start streaming timeout                        |
//! | `OpenIdle`    | `Closed`      | stop timer, purge follow-ups, MicClose         |
//! | `OpenWaiting` | `Closed`      | stop timer, purge follow-ups, MicClose         |
//! | `OpenActive`  | `Closed`      | stop timer; idle: queue AudioStop + MicClose   |
//! |               |               | in transit: park in `Closing` instead          |
//! | `Closing`     | `Closed`      | queue AudioStop, MicClose                      |
//!
//! A transition that must queue a message checks for room first.  With a
//! full control queue it fails without touching the session, so the
//! caller can retry.  A parked close is retried whenever the queue drains.

use log::{debug, info, warn};

use super::control::{
    ADVERTISED_FRAME_BYTES, CODEC_ADPCM_8KHZ, ControlMessage, ControlQueue, MicOpenErrorCode,
    PROTOCOL_VERSION, PeerCommand, QueuedControl, SUPPORTED_CODECS,
};
use super::fragment;
use super::state::{DEFAULT_SAMPLING_RATE_KHZ, Session};
use super::timer::TimeoutKind;
use super::{MicState, PeerId};
use crate::app::events::AudioEvent;
use crate::app::ports::{EventSink, NotifyChannel, NotifyPort};
use crate::config::{AudioConfig, MAX_PEERS};
use crate::error::{LinkError, SessionError};

// ───────────────────────────────────────────────────────────────
// Transmission results
// ───────────────────────────────────────────────────────────────

/// How an audio send attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// A fragment was accepted by the link.
    Sent,
    /// The session or link is not ready yet; keep the frame and retry.
    NotReady,
    /// Link buffers are full; keep the frame and retry.
    BufferFull,
    /// No session can take audio; the caller drops the frame.
    CannotSend,
}

/// Result of [`SessionManager::send_audio`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendReport {
    pub status: SendStatus,
    /// Frame bytes consumed by this attempt.
    pub consumed: usize,
}

impl SendReport {
    const fn with(status: SendStatus) -> Self {
        Self {
            status,
            consumed: 0,
        }
    }
}

/// Result of one control queue delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    Sent,
    Empty,
    Backpressure,
}

// ───────────────────────────────────────────────────────────────
// Manager
// ───────────────────────────────────────────────────────────────

/// Per-peer session table plus the shared control queue.
pub struct SessionManager {
    sessions: [Option<Session>; MAX_PEERS],
    queue: ControlQueue,
    config: AudioConfig,
}

impl SessionManager {
    pub fn new(config: AudioConfig) -> Self {
        Self {
            sessions: core::array::from_fn(|_| None),
            queue: ControlQueue::new(),
            config,
        }
    }

    // ── Peer lifecycle ────────────────────────────────────────

    /// Allocate a session for a peer that enabled the voice service.
    pub fn on_peer_enabled(
        &mut self,
        peer: PeerId,
        sink: &mut impl EventSink,
    ) -> Result<(), SessionError> {
        if self.index_of(peer).is_some() {
            return Err(SessionError::AlreadyEnabled);
        }
        let slot = self
            .sessions
            .iter_mut()
            .find(|s| s.is_none())
            .ok_or(SessionError::NoFreeInstance)?;
        let session = slot.insert(Session::new(peer));
        info!("Session: peer {} enabled", peer);
        sink.emit(&AudioEvent::Enabled(session.info()));
        Ok(())
    }

    /// Free the peer's session.  Returns the state it was in.
    pub fn on_peer_disabled(
        &mut self,
        peer: PeerId,
        sink: &mut impl EventSink,
    ) -> Result<MicState, SessionError> {
        let idx = self.index_of(peer).ok_or(SessionError::UnknownPeer)?;
        let Some(session) = self.sessions[idx].take() else {
            return Err(SessionError::UnknownPeer);
        };
        let purged = self.queue.purge(|e| e.peer == peer);
        info!(
            "Session: peer {} disabled in {} ({} queued message(s) dropped)",
            peer,
            session.state.name(),
            purged
        );
        sink.emit(&AudioEvent::Disabled(session.info()));
        Ok(session.state)
    }

    // ── Peer commands ─────────────────────────────────────────

    /// Decode and apply a command written by the peer.
    pub fn handle_command(
        &mut self,
        peer: PeerId,
        bytes: &[u8],
        sink: &mut impl EventSink,
    ) -> Result<(), SessionError> {
        let idx = self.index_of(peer).ok_or(SessionError::UnknownPeer)?;
        match PeerCommand::decode(bytes)? {
            PeerCommand::GetCaps { version, codecs } => {
                debug!(
                    "Session: peer {} caps v{:#06x} codecs {:#06x}",
                    peer, version, codecs
                );
                self.queue.push(QueuedControl {
                    peer,
                    message: ControlMessage::GetCapsResponse {
                        version: PROTOCOL_VERSION,
                        codecs: SUPPORTED_CODECS,
                        frame_bytes: ADVERTISED_FRAME_BYTES,
                        fragment_bytes: u16::from(self.config.fragment_len),
                    },
                    follow_up: None,
                })
            }
            PeerCommand::MicOpen { codec } => self.mic_open(idx, codec, sink),
            PeerCommand::MicClose => self.close(peer, sink),
        }
    }

    fn mic_open(
        &mut self,
        idx: usize,
        codec: u16,
        sink: &mut impl EventSink,
    ) -> Result<(), SessionError> {
        let peer = self.peer_at(idx)?;
        // Single microphone: only one session may be past Closed.
        if self.streaming_index().is_some() {
            warn!("Session: peer {} mic open rejected, mic busy", peer);
            self.reply_error(peer, MicOpenErrorCode::InvalidState);
            return Err(SessionError::InvalidState);
        }
        if codec != CODEC_ADPCM_8KHZ {
            warn!("Session: peer {} asked for codec {:#06x}", peer, codec);
            self.reply_error(peer, MicOpenErrorCode::InvalidCodec);
            return Err(SessionError::CodecMismatch);
        }
        if let Some(session) = self.sessions[idx].as_mut() {
            session.sampling_rate_khz = DEFAULT_SAMPLING_RATE_KHZ;
        }
        self.transition(idx, MicState::OpenIdle, sink)
    }

    /// Close the peer's microphone.  A close while a frame is in transit
    /// completes once that frame's last fragment is accepted.
    pub fn close(&mut self, peer: PeerId, sink: &mut impl EventSink) -> Result<(), SessionError> {
        let idx = self.index_of(peer).ok_or(SessionError::UnknownPeer)?;
        match self.state_at(idx)? {
            MicState::Closed => Err(SessionError::NotOpen),
            MicState::Closing if self.in_transit_at(idx) => Ok(()),
            _ => self.transition(idx, MicState::Closed, sink),
        }
    }

    /// Ask the peer to start a voice search.  Only valid while closed.
    pub fn start_search(&mut self, peer: PeerId) -> Result<(), SessionError> {
        let idx = self.index_of(peer).ok_or(SessionError::UnknownPeer)?;
        if self.state_at(idx)? != MicState::Closed {
            return Err(SessionError::InvalidState);
        }
        self.queue.push(QueuedControl {
            peer,
            message: ControlMessage::StartSearch,
            follow_up: None,
        })?;
        let timeout = self.config.search_timeout_ms;
        if let Some(session) = self.sessions[idx].as_mut() {
            session.timer.start(TimeoutKind::Search, timeout);
        }
        info!("Session: peer {} search requested", peer);
        Ok(())
    }

    // ── Timeouts ──────────────────────────────────────────────

    /// Advance every session timer by `elapsed_ms` and apply expiries.
    pub fn tick(&mut self, elapsed_ms: u32, sink: &mut impl EventSink) -> Result<(), SessionError> {
        let mut result = Ok(());
        for idx in 0..MAX_PEERS {
            let fired = self.sessions[idx]
                .as_mut()
                .and_then(|s| s.timer.advance(elapsed_ms));
            if let Some(kind) = fired {
                if let Err(e) = self.on_timeout(idx, kind, sink) {
                    result = Err(e);
                }
            }
        }
        result
    }

    fn on_timeout(
        &mut self,
        idx: usize,
        kind: TimeoutKind,
        sink: &mut impl EventSink,
    ) -> Result<(), SessionError> {
        let Some(session) = self.sessions[idx].as_ref() else {
            return Ok(());
        };
        let peer = session.peer;
        match (kind, session.state) {
            (TimeoutKind::Search, MicState::Closed) => {
                info!("Session: peer {} search timed out", peer);
                sink.emit(&AudioEvent::SearchTimeout(session.info()));
                Ok(())
            }
            (TimeoutKind::MicOpen, MicState::OpenIdle | MicState::OpenWaiting) => {
                // Closing purges the start message, which frees its slot.
                let reclaimed = self
                    .queue
                    .count(|e| e.peer == peer && e.follow_up.is_some());
                if self.queue.is_full() && reclaimed == 0 {
                    return self.rearm(idx, kind);
                }
                warn!("Session: peer {} opened the mic but no audio started", peer);
                self.transition(idx, MicState::Closed, sink)?;
                self.queue.push(QueuedControl {
                    peer,
                    message: ControlMessage::MicOpenError(MicOpenErrorCode::Timeout),
                    follow_up: None,
                })
            }
            (TimeoutKind::Streaming, MicState::OpenActive) => {
                info!("Session: peer {} streaming limit reached", peer);
                match self.transition(idx, MicState::Closed, sink) {
                    Err(SessionError::ControlQueueFull) => self.rearm(idx, kind),
                    other => other,
                }
            }
            (kind, state) => {
                debug!(
                    "Session: stale {:?} timeout for peer {} in {}",
                    kind,
                    peer,
                    state.name()
                );
                Ok(())
            }
        }
    }

    /// Fire `kind` again on the next tick; the queue had no room.
    fn rearm(&mut self, idx: usize, kind: TimeoutKind) -> Result<(), SessionError> {
        if let Some(session) = self.sessions[idx].as_mut() {
            warn!(
                "Session: peer {} {:?} timeout postponed, control queue full",
                session.peer, kind
            );
            session.timer.start(kind, 0);
        }
        Err(SessionError::ControlQueueFull)
    }

    // ── Control queue ─────────────────────────────────────────

    /// Try to deliver the oldest queued control message.
    ///
    /// On acceptance the entry's follow-up state is applied.  A fatal
    /// link error drops the entry and is returned to the caller.
    pub fn process_control_queue(
        &mut self,
        link: &mut impl NotifyPort,
        sink: &mut impl EventSink,
    ) -> Result<QueueStatus, SessionError> {
        let Some(entry) = self.queue.front().copied() else {
            return Ok(QueueStatus::Empty);
        };
        let bytes = entry.message.encode();
        match link.notify(entry.peer, NotifyChannel::Control, &bytes) {
            Ok(()) => {
                self.queue.pop();
                debug!(
                    "Session: peer {} <- control {:#04x}",
                    entry.peer,
                    entry.message.opcode()
                );
                if let Some(next) = entry.follow_up {
                    self.apply_follow_up(entry.peer, next, sink)?;
                }
                self.finish_parked_closes(sink);
                Ok(QueueStatus::Sent)
            }
            Err(e) if e.is_backpressure() => Ok(QueueStatus::Backpressure),
            Err(LinkError::Fatal(msg)) => {
                self.queue.pop();
                warn!(
                    "Session: peer {} control {:#04x} dropped: {}",
                    entry.peer,
                    entry.message.opcode(),
                    msg
                );
                self.finish_parked_closes(sink);
                Err(SessionError::LinkFatal(msg))
            }
            Err(_) => Ok(QueueStatus::Backpressure),
        }
    }

    fn apply_follow_up(
        &mut self,
        peer: PeerId,
        next: MicState,
        sink: &mut impl EventSink,
    ) -> Result<(), SessionError> {
        let Some(idx) = self.index_of(peer) else {
            return Ok(());
        };
        // Only the start message carries a follow-up; ignore it if the
        // session moved on while the message was queued.
        if next == MicState::OpenActive && self.state_at(idx)? != MicState::OpenWaiting {
            return Ok(());
        }
        self.transition(idx, next, sink)
    }

    /// Complete every `Closing` session whose last frame is already out.
    fn finish_parked_closes(&mut self, sink: &mut impl EventSink) {
        for idx in 0..MAX_PEERS {
            let parked = self.sessions[idx]
                .as_ref()
                .is_some_and(|s| s.state == MicState::Closing && !s.frame_in_transit);
            if parked {
                self.finish_close(idx, sink);
            }
        }
    }

    /// Run a deferred close.  A full queue leaves the session parked.
    fn finish_close(&mut self, idx: usize, sink: &mut impl EventSink) {
        if let Err(e) = self.transition(idx, MicState::Closed, sink) {
            debug!("Session: deferred close postponed ({})", e);
        }
    }

    // ── Audio ─────────────────────────────────────────────────

    /// Send the next fragment of a frame for the streaming session.
    ///
    /// `remaining` is the whole frame when no frame is in transit, or
    /// its unsent tail otherwise.
    pub fn send_audio(
        &mut self,
        remaining: &[u8],
        link: &mut impl NotifyPort,
        sink: &mut impl EventSink,
    ) -> Result<SendReport, SessionError> {
        let Some(idx) = self.streaming_index() else {
            return Ok(SendReport::with(SendStatus::CannotSend));
        };
        match self.state_at(idx)? {
            MicState::OpenIdle => {
                return match self.transition(idx, MicState::OpenWaiting, sink) {
                    Ok(()) => Ok(SendReport::with(SendStatus::NotReady)),
                    Err(SessionError::ControlQueueFull) => {
                        Ok(SendReport::with(SendStatus::BufferFull))
                    }
                    Err(e) => Err(e),
                };
            }
            MicState::OpenWaiting => return Ok(SendReport::with(SendStatus::NotReady)),
            MicState::Closed => return Ok(SendReport::with(SendStatus::CannotSend)),
            // The last frame went out but AudioStop had no room yet.
            MicState::Closing if !self.in_transit_at(idx) => {
                return match self.transition(idx, MicState::Closed, sink) {
                    Ok(()) => Ok(SendReport::with(SendStatus::CannotSend)),
                    Err(SessionError::ControlQueueFull) => {
                        Ok(SendReport::with(SendStatus::BufferFull))
                    }
                    Err(e) => Err(e),
                };
            }
            MicState::OpenActive | MicState::Closing => {}
        }

        let fragment_len = self.config.fragment_len as usize;
        let remote_id = self.config.remote_id;
        let Some(session) = self.sessions[idx].as_mut() else {
            return Ok(SendReport::with(SendStatus::CannotSend));
        };
        let frag = if session.frame_in_transit {
            fragment::continuation(remaining, fragment_len)
        } else {
            fragment::first(remaining, session.frame_counter, remote_id, fragment_len)?
        };

        match link.notify(session.peer, NotifyChannel::Audio, frag.as_bytes()) {
            Ok(()) => {
                let done = frag.consumed >= remaining.len();
                session.frame_in_transit = !done;
                if done {
                    self.complete_frame(idx, link, sink);
                }
                Ok(SendReport {
                    status: SendStatus::Sent,
                    consumed: frag.consumed,
                })
            }
            Err(LinkError::NotReady) => Ok(SendReport::with(SendStatus::NotReady)),
            Err(LinkError::BufferFull) => Ok(SendReport::with(SendStatus::BufferFull)),
            Err(LinkError::Fatal(msg)) => {
                warn!("Session: peer {} audio aborted: {}", session.peer, msg);
                // The frame is abandoned; the next one starts with a header.
                session.frame_in_transit = false;
                if session.state == MicState::Closing {
                    self.finish_close(idx, sink);
                }
                Err(SessionError::LinkFatal(msg))
            }
        }
    }

    /// Bookkeeping after a frame's last fragment was accepted.  Never
    /// fails: the frame is already on the link.
    fn complete_frame(&mut self, idx: usize, link: &mut impl NotifyPort, sink: &mut impl EventSink) {
        if self.state_at(idx) == Ok(MicState::Closing) {
            self.finish_close(idx, sink);
        }
        let interval = self.config.sync_interval;
        let Some(session) = self.sessions[idx].as_mut() else {
            return;
        };
        session.frame_counter = session.frame_counter.wrapping_add(1);
        if interval != 0 && session.frame_counter % interval == 0 {
            // Best effort: not queued, not retried.
            let sync = ControlMessage::AudioSync {
                frame: session.frame_counter,
            };
            if let Err(e) = link.notify(session.peer, NotifyChannel::Control, &sync.encode()) {
                debug!("Session: peer {} sync skipped ({})", session.peer, e);
            }
        }
    }

    // ── State machine ─────────────────────────────────────────

    fn transition(
        &mut self,
        idx: usize,
        to: MicState,
        sink: &mut impl EventSink,
    ) -> Result<(), SessionError> {
        let mic_open_ms = self.config.mic_open_timeout_ms;
        let streaming_ms = self.config.streaming_limit_ms;
        let Some(session) = self.sessions[idx].as_mut() else {
            return Err(SessionError::UnknownPeer);
        };
        let from = session.state;
        let peer = session.peer;
        if from == to {
            return Ok(());
        }

        match (from, to) {
            (MicState::Closed, MicState::OpenIdle) => {
                session.frame_counter = 0;
                session.frame_in_transit = false;
                session.timer.start(TimeoutKind::MicOpen, mic_open_ms);
                session.state = to;
                sink.emit(&AudioEvent::MicOpen(session.info()));
            }
            (MicState::OpenIdle, MicState::OpenWaiting) => {
                self.queue.push(QueuedControl {
                    peer,
                    message: ControlMessage::AudioStart,
                    follow_up: Some(MicState::OpenActive),
                })?;
                session.state = to;
            }
            (MicState::OpenWaiting, MicState::OpenActive) => {
                session.timer.start(TimeoutKind::Streaming, streaming_ms);
                session.state = to;
            }
            (MicState::OpenIdle | MicState::OpenWaiting, MicState::Closed) => {
                session.timer.cancel();
                session.state = to;
                sink.emit(&AudioEvent::MicClose(session.info()));
                self.queue.purge(|e| e.peer == peer && e.follow_up.is_some());
            }
            (MicState::OpenActive, MicState::Closed) if session.frame_in_transit => {
                session.timer.cancel();
                session.state = MicState::Closing;
                info!("Session: peer {} OpenActive -> Closing", peer);
                return Ok(());
            }
            (MicState::OpenActive | MicState::Closing, MicState::Closed) => {
                self.queue.push(QueuedControl {
                    peer,
                    message: ControlMessage::AudioStop,
                    follow_up: None,
                })?;
                session.timer.cancel();
                session.state = to;
                sink.emit(&AudioEvent::MicClose(session.info()));
            }
            _ => {
                warn!(
                    "Session: peer {} rejected {} -> {}",
                    peer,
                    from.name(),
                    to.name()
                );
                return Err(SessionError::InvalidState);
            }
        }
        info!("Session: peer {} {} -> {}", peer, from.name(), to.name());
        Ok(())
    }

    fn reply_error(&mut self, peer: PeerId, code: MicOpenErrorCode) {
        let entry = QueuedControl {
            peer,
            message: ControlMessage::MicOpenError(code),
            follow_up: None,
        };
        if self.queue.push(entry).is_err() {
            warn!("Session: peer {} error {:?} not queued, queue full", peer, code);
        }
    }

    // ── Queries ───────────────────────────────────────────────

    fn index_of(&self, peer: PeerId) -> Option<usize> {
        self.sessions
            .iter()
            .position(|s| s.as_ref().is_some_and(|s| s.peer == peer))
    }

    fn state_at(&self, idx: usize) -> Result<MicState, SessionError> {
        self.sessions[idx]
            .as_ref()
            .map(|s| s.state)
            .ok_or(SessionError::UnknownPeer)
    }

    fn in_transit_at(&self, idx: usize) -> bool {
        self.sessions[idx]
            .as_ref()
            .is_some_and(|s| s.frame_in_transit)
    }

    fn peer_at(&self, idx: usize) -> Result<PeerId, SessionError> {
        self.sessions[idx]
            .as_ref()
            .map(|s| s.peer)
            .ok_or(SessionError::UnknownPeer)
    }

    /// First session that is past `Closed`.
    fn streaming_index(&self) -> Option<usize> {
        self.sessions
            .iter()
            .position(|s| s.as_ref().is_some_and(|s| !s.state.is_closed()))
    }

    pub fn state(&self, peer: PeerId) -> Option<MicState> {
        self.index_of(peer).and_then(|i| self.state_at(i).ok())
    }

    /// Peer whose session is currently past `Closed`, if any.
    pub fn streaming_peer(&self) -> Option<PeerId> {
        self.streaming_index().and_then(|i| self.peer_at(i).ok())
    }

    pub fn frame_counter(&self, peer: PeerId) -> Option<u16> {
        let idx = self.index_of(peer)?;
        self.sessions[idx].as_ref().map(|s| s.frame_counter)
    }

    pub fn frame_in_transit(&self, peer: PeerId) -> Option<bool> {
        let idx = self.index_of(peer)?;
        self.sessions[idx].as_ref().map(|s| s.frame_in_transit)
    }

    pub fn running_timeout(&self, peer: PeerId) -> Option<TimeoutKind> {
        let idx = self.index_of(peer)?;
        self.sessions[idx].as_ref().and_then(|s| s.timer.running())
    }

    pub fn queued_control(&self) -> usize {
        self.queue.len()
    }

    pub fn enabled_peers(&self) -> usize {
        self.sessions.iter().flatten().count()
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }
}
