//! Outbound audio stream: the backlog of encoded frames waiting for the
//! streaming session.
//!
//! The stream holds its own reference on every queued frame and keeps
//! the byte offset of the frame at the head.  Each [`process`] call
//! pushes at most one fragment; the head frame is released when its last
//! fragment is accepted or when no session can take it.
//!
//! [`process`]: OutboundStream::process

use heapless::Deque;
use log::warn;

use super::{SendStatus, SessionManager};
use crate::app::ports::{EventSink, NotifyPort};
use crate::audio::frame::{FrameHandle, FramePool};
use crate::config::FRAME_BACKLOG;
use crate::error::{PoolError, Result};

/// What one [`OutboundStream::process`] call achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    /// Nothing queued.
    Idle,
    /// A fragment went out.
    Progress,
    /// Session or link not ready; the head frame stays put.
    Blocked,
    /// The head frame was dropped.
    Dropped,
}

#[derive(Debug, Default)]
pub struct OutboundStream {
    backlog: Deque<FrameHandle, FRAME_BACKLOG>,
    offset: usize,
}

impl OutboundStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a frame for transmission, taking a reference on it.
    pub fn push(&mut self, pool: &mut FramePool, frame: FrameHandle) -> Result<()> {
        if self.backlog.is_full() {
            return Err(PoolError::Exhausted.into());
        }
        let handle = pool.acquire(Some(frame))?;
        if let Err(handle) = self.backlog.push_back(handle) {
            pool.release(handle)?;
            return Err(PoolError::Exhausted.into());
        }
        Ok(())
    }

    /// Send the next fragment of the head frame.
    ///
    /// A session error drops the head frame before it is returned.
    pub fn process(
        &mut self,
        pool: &mut FramePool,
        sessions: &mut SessionManager,
        link: &mut impl NotifyPort,
        sink: &mut impl EventSink,
    ) -> Result<StreamStatus> {
        let Some(&head) = self.backlog.front() else {
            return Ok(StreamStatus::Idle);
        };
        let frame = match pool.frame(head) {
            Ok(frame) => frame,
            Err(e) => {
                // The backlog's own reference keeps the frame alive, so this
                // is a bookkeeping defect; discard the entry.
                warn!("Outbound: head frame unusable ({})", e);
                self.backlog.pop_front();
                self.offset = 0;
                return Err(e.into());
            }
        };
        let bytes = frame.as_bytes();
        let remaining = bytes.get(self.offset..).unwrap_or_default();

        let report = match sessions.send_audio(remaining, link, sink) {
            Ok(report) => report,
            Err(e) => {
                self.pop_head(pool)?;
                return Err(e.into());
            }
        };

        match report.status {
            SendStatus::Sent => {
                self.offset += report.consumed;
                if self.offset >= bytes.len() {
                    self.pop_head(pool)?;
                }
                Ok(StreamStatus::Progress)
            }
            SendStatus::NotReady | SendStatus::BufferFull => Ok(StreamStatus::Blocked),
            SendStatus::CannotSend => {
                self.pop_head(pool)?;
                Ok(StreamStatus::Dropped)
            }
        }
    }

    fn pop_head(&mut self, pool: &mut FramePool) -> Result<()> {
        self.offset = 0;
        if let Some(handle) = self.backlog.pop_front() {
            pool.release(handle)?;
        }
        Ok(())
    }

    /// Release every queued frame.  Returns how many were dropped.
    pub fn flush(&mut self, pool: &mut FramePool) -> usize {
        let mut dropped = 0;
        while let Some(handle) = self.backlog.pop_front() {
            if pool.release(handle).is_ok() {
                dropped += 1;
            }
        }
        self.offset = 0;
        dropped
    }

    pub fn len(&self) -> usize {
        self.backlog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backlog.is_empty()
    }
}
