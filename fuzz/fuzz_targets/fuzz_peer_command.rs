//! Fuzz target: `PeerCommand::decode`
//!
//! Feeds arbitrary bytes written to the command characteristic into the
//! decoder and asserts that it never panics and only accepts the exact
//! command lengths.
//!
//! cargo fuzz run fuzz_peer_command

#![no_main]

use libfuzzer_sys::fuzz_target;
use voiceremote::session::control::PeerCommand;

fuzz_target!(|data: &[u8]| {
    if let Ok(cmd) = PeerCommand::decode(data) {
        let expected_len = match cmd {
            PeerCommand::GetCaps { .. } => 5,
            PeerCommand::MicOpen { .. } => data.len().min(3),
            PeerCommand::MicClose => 1,
        };
        assert_eq!(data.len(), expected_len, "accepted a mis-sized command");
    }
});
