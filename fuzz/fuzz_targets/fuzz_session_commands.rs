//! Fuzz target: `SessionManager` command and timer sequences
//!
//! Interprets the input as a script of peer commands, transmissions and
//! timer ticks, and checks that at most one session is ever past `Closed`
//! and that the control queue never exceeds its bound.
//!
//! cargo fuzz run fuzz_session_commands

#![no_main]

use libfuzzer_sys::fuzz_target;
use voiceremote::app::events::AudioEvent;
use voiceremote::app::ports::{EventSink, NotifyChannel, NotifyPort};
use voiceremote::config::{AudioConfig, CONTROL_QUEUE_LEN};
use voiceremote::error::LinkError;
use voiceremote::session::{PeerId, SessionManager};

struct Sink;

impl EventSink for Sink {
    fn emit(&mut self, _: &AudioEvent) {}
}

struct Link(bool);

impl NotifyPort for Link {
    fn notify(&mut self, _: PeerId, _: NotifyChannel, _: &[u8]) -> Result<(), LinkError> {
        if self.0 { Err(LinkError::BufferFull) } else { Ok(()) }
    }
}

fuzz_target!(|data: &[u8]| {
    let mut m = SessionManager::new(AudioConfig::default());
    let mut sink = Sink;
    let frame = [0x5Au8; 131];

    for chunk in data.chunks(2) {
        let op = chunk[0];
        let arg = chunk.get(1).copied().unwrap_or(0);
        let peer = PeerId(u16::from(op & 0x03));
        let mut link = Link(arg & 0x80 != 0);
        let _ = match op >> 2 {
            0 => m.on_peer_enabled(peer, &mut sink),
            1 => m.on_peer_disabled(peer, &mut sink).map(|_| ()),
            2 => m.handle_command(peer, &[0x0C], &mut sink),
            3 => m.handle_command(peer, &[0x0D], &mut sink),
            4 => m.handle_command(peer, &[0x0A, 0, 5, 0, 1], &mut sink),
            5 => m.start_search(peer),
            6 => m.tick(u32::from(arg) * 10, &mut sink),
            7 => m.process_control_queue(&mut link, &mut sink).map(|_| ()),
            _ => {
                let tail = usize::from(arg) % frame.len();
                m.send_audio(&frame[tail..], &mut link, &mut sink).map(|_| ())
            }
        };

        let open = [0, 1, 2, 3]
            .into_iter()
            .filter(|&p| m.state(PeerId(p)).is_some_and(|s| !s.is_closed()))
            .count();
        assert!(open <= 1, "more than one session holds the mic");
        assert!(m.queued_control() <= CONTROL_QUEUE_LEN);
    }
});
