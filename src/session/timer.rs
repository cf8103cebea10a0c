//! Single-shot session timer.
//!
//! Tick-driven like the rest of the scheduler context: the owner calls
//! [`OneShotTimer::advance`] with the elapsed milliseconds.  Starting a
//! timer replaces whatever was running, so a session never has two
//! timeouts armed at once.

/// What an armed timer will report when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    /// Device-initiated search went unanswered.
    Search,
    /// No audio started after mic open.
    MicOpen,
    /// Maximum streaming duration reached.
    Streaming,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct OneShotTimer {
    armed: Option<(TimeoutKind, u32)>,
}

impl OneShotTimer {
    pub const fn new() -> Self {
        Self { armed: None }
    }

    /// Arm for `duration_ms`, cancelling any running timeout.
    pub fn start(&mut self, kind: TimeoutKind, duration_ms: u32) {
        self.armed = Some((kind, duration_ms));
    }

    pub fn cancel(&mut self) {
        self.armed = None;
    }

    pub fn running(&self) -> Option<TimeoutKind> {
        self.armed.map(|(kind, _)| kind)
    }

    /// Advance by `elapsed_ms`; returns the kind exactly once on expiry.
    pub fn advance(&mut self, elapsed_ms: u32) -> Option<TimeoutKind> {
        let (kind, remaining) = self.armed?;
        if elapsed_ms >= remaining {
            self.armed = None;
            Some(kind)
        } else {
            self.armed = Some((kind, remaining - elapsed_ms));
            None
        }
    }
}
