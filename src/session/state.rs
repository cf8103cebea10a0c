use super::PeerId;
use super::timer::OneShotTimer;

/// Default sampling-rate tag for a fresh session (kHz).
pub(crate) const DEFAULT_SAMPLING_RATE_KHZ: u8 = 8;

/// Microphone lifecycle of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MicState {
    /// No stream.  Initial state and the end of every open/close cycle.
    Closed = 0,
    /// Close requested while a frame was in transit; finishes with it.
    Closing = 1,
    /// Open accepted, start message not yet queued.
    OpenIdle = 2,
    /// Start message queued, awaiting delivery.
    OpenWaiting = 3,
    /// Start delivered; audio flows.
    OpenActive = 4,
}

impl MicState {
    pub fn is_closed(self) -> bool {
        self == Self::Closed
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Closed => "Closed",
            Self::Closing => "Closing",
            Self::OpenIdle => "OpenIdle",
            Self::OpenWaiting => "OpenWaiting",
            Self::OpenActive => "OpenActive",
        }
    }
}

/// One allocated session slot.
#[derive(Debug, Clone)]
pub(crate) struct Session {
    pub peer: PeerId,
    pub state: MicState,
    pub frame_in_transit: bool,
    pub frame_counter: u16,
    pub sampling_rate_khz: u8,
    pub timer: OneShotTimer,
}

impl Session {
    pub fn new(peer: PeerId) -> Self {
        Self {
            peer,
            state: MicState::Closed,
            frame_in_transit: false,
            frame_counter: 0,
            sampling_rate_khz: DEFAULT_SAMPLING_RATE_KHZ,
            timer: OneShotTimer::new(),
        }
    }

    pub fn info(&self) -> crate::app::events::SessionInfo {
        crate::app::events::SessionInfo {
            peer: self.peer,
            sampling_rate_khz: self.sampling_rate_khz,
        }
    }
}
