//! Session lifecycle through the service: timeouts, search, capability
//! exchange and the single-microphone rule.

use crate::mock_ports::{ManualMic, RecordingLink, RecordingSink};

use voiceremote::app::commands::PeerEvent;
use voiceremote::app::events::AudioEvent;
use voiceremote::app::service::VoiceService;
use voiceremote::audio::adpcm::AdpcmEncoder;
use voiceremote::audio::capture::CaptureExchange;
use voiceremote::config::AudioConfig;
use voiceremote::error::{Error, SessionError};
use voiceremote::session::{MicState, PeerId, TimeoutKind};

const TV: PeerId = PeerId(1);
const PHONE: PeerId = PeerId(2);

struct Bench {
    mic: ManualMic,
    link: RecordingLink,
    sink: RecordingSink,
}

impl Bench {
    fn new() -> Self {
        Self {
            mic: ManualMic::new(),
            link: RecordingLink::new(),
            sink: RecordingSink::new(),
        }
    }

    fn send(&mut self, svc: &mut VoiceService<'_, AdpcmEncoder>, event: PeerEvent) -> voiceremote::error::Result<()> {
        svc.handle_peer_event(event, &mut self.mic, &mut self.sink)
    }

    fn poll(&mut self, svc: &mut VoiceService<'_, AdpcmEncoder>) {
        svc.poll(&mut self.mic, &mut self.link, &mut self.sink).unwrap();
    }

    fn tick(&mut self, svc: &mut VoiceService<'_, AdpcmEncoder>, ms: u32) {
        svc.tick(ms, &mut self.mic, &mut self.sink).unwrap();
    }
}

fn service(capture: &CaptureExchange) -> VoiceService<'_, AdpcmEncoder> {
    VoiceService::new(AudioConfig::default(), capture, AdpcmEncoder::new()).unwrap()
}

#[test]
fn mic_open_without_audio_times_out() {
    let capture = CaptureExchange::new();
    let mut svc = service(&capture);
    let mut b = Bench::new();
    b.send(&mut svc, PeerEvent::Enabled(TV)).unwrap();
    b.send(&mut svc, PeerEvent::command(TV, &[0x0C])).unwrap();
    assert_eq!(svc.sessions().running_timeout(TV), Some(TimeoutKind::MicOpen));

    b.tick(&mut svc, 999);
    assert_eq!(svc.sessions().state(TV), Some(MicState::OpenIdle));
    b.tick(&mut svc, 1);
    assert_eq!(svc.sessions().state(TV), Some(MicState::Closed));
    assert!(!svc.is_capturing());
    assert_eq!(b.sink.count(|e| matches!(e, AudioEvent::MicClose(_))), 1);

    b.poll(&mut svc);
    assert_eq!(b.link.control(), vec![&[0x0C, 0x0F, 0x02][..]]);
}

#[test]
fn streaming_limit_closes_active_session() {
    let capture = CaptureExchange::new();
    let mut svc = service(&capture);
    let mut b = Bench::new();
    b.send(&mut svc, PeerEvent::Enabled(TV)).unwrap();
    b.send(&mut svc, PeerEvent::command(TV, &[0x0C])).unwrap();
    b.mic.prime(&capture);
    b.mic.fire(&capture, 0);
    b.mic.fire(&capture, 10);
    b.poll(&mut svc);
    assert_eq!(svc.sessions().state(TV), Some(MicState::OpenActive));
    assert_eq!(svc.sessions().running_timeout(TV), Some(TimeoutKind::Streaming));

    b.tick(&mut svc, 6_000);
    assert_eq!(svc.sessions().state(TV), Some(MicState::Closed));
    assert!(!svc.is_capturing());
    b.poll(&mut svc);
    assert_eq!(b.link.control().last(), Some(&&[0x00][..]));
}

#[test]
fn search_expires_only_while_closed() {
    let capture = CaptureExchange::new();
    let mut svc = service(&capture);
    let mut b = Bench::new();
    b.send(&mut svc, PeerEvent::Enabled(TV)).unwrap();

    b.send(&mut svc, PeerEvent::SearchRequested(TV)).unwrap();
    b.poll(&mut svc);
    assert_eq!(b.link.control(), vec![&[0x08][..]]);
    b.tick(&mut svc, 1_000);
    assert_eq!(b.sink.count(|e| matches!(e, AudioEvent::SearchTimeout(_))), 1);

    // The host answers the next search with a mic open: no timeout event.
    b.send(&mut svc, PeerEvent::SearchRequested(TV)).unwrap();
    b.send(&mut svc, PeerEvent::command(TV, &[0x0C])).unwrap();
    b.tick(&mut svc, 999);
    assert_eq!(b.sink.count(|e| matches!(e, AudioEvent::SearchTimeout(_))), 1);
    assert_eq!(svc.sessions().state(TV), Some(MicState::OpenIdle));

    assert_eq!(
        b.send(&mut svc, PeerEvent::SearchRequested(TV)),
        Err(Error::Session(SessionError::InvalidState))
    );
}

#[test]
fn second_peer_cannot_open_busy_mic() {
    let capture = CaptureExchange::new();
    let mut svc = service(&capture);
    let mut b = Bench::new();
    b.send(&mut svc, PeerEvent::Enabled(TV)).unwrap();
    b.send(&mut svc, PeerEvent::Enabled(PHONE)).unwrap();
    b.send(&mut svc, PeerEvent::command(TV, &[0x0C])).unwrap();

    assert_eq!(
        b.send(&mut svc, PeerEvent::command(PHONE, &[0x0C])),
        Err(Error::Session(SessionError::InvalidState))
    );
    assert_eq!(svc.sessions().state(PHONE), Some(MicState::Closed));
    assert_eq!(svc.sessions().streaming_peer(), Some(TV));

    b.poll(&mut svc);
    let err = b
        .link
        .sent
        .iter()
        .find(|n| n.peer == PHONE)
        .expect("phone got an error reply");
    assert_eq!(err.data, vec![0x0C, 0x0F, 0x03]);
}

#[test]
fn third_peer_rejected_when_table_full() {
    let capture = CaptureExchange::new();
    let mut svc = service(&capture);
    let mut b = Bench::new();
    b.send(&mut svc, PeerEvent::Enabled(TV)).unwrap();
    b.send(&mut svc, PeerEvent::Enabled(PHONE)).unwrap();
    assert_eq!(
        b.send(&mut svc, PeerEvent::Enabled(PeerId(3))),
        Err(Error::Session(SessionError::NoFreeInstance))
    );
    b.send(&mut svc, PeerEvent::Disabled(PHONE)).unwrap();
    b.send(&mut svc, PeerEvent::Enabled(PeerId(3))).unwrap();
    assert_eq!(svc.sessions().enabled_peers(), 2);
}

#[test]
fn caps_exchange_and_codec_negotiation() {
    let capture = CaptureExchange::new();
    let mut svc = service(&capture);
    let mut b = Bench::new();
    b.send(&mut svc, PeerEvent::Enabled(TV)).unwrap();
    b.send(&mut svc, PeerEvent::command(TV, &[0x0A, 0x00, 0x05, 0x00, 0x05]))
        .unwrap();
    assert_eq!(
        b.send(&mut svc, PeerEvent::command(TV, &[0x0C, 0x00, 0x04])),
        Err(Error::Session(SessionError::CodecMismatch))
    );
    assert!(!svc.is_capturing());

    b.poll(&mut svc);
    let control = b.link.control();
    assert_eq!(control.len(), 2);
    assert_eq!(control[0], &[0x0B, 0x00, 0x05, 0x00, 0x01, 0x00, 0x86, 0x00, 0x14][..]);
    assert_eq!(control[1], &[0x0C, 0x0F, 0x01][..]);
}

#[test]
fn malformed_and_unknown_peer_commands_rejected() {
    let capture = CaptureExchange::new();
    let mut svc = service(&capture);
    let mut b = Bench::new();
    assert_eq!(
        b.send(&mut svc, PeerEvent::command(TV, &[0x0C])),
        Err(Error::Session(SessionError::UnknownPeer))
    );
    b.send(&mut svc, PeerEvent::Enabled(TV)).unwrap();
    assert_eq!(
        b.send(&mut svc, PeerEvent::command(TV, &[0x0C, 0x00])),
        Err(Error::Session(SessionError::MalformedCommand))
    );
    assert_eq!(
        b.send(&mut svc, PeerEvent::command(TV, &[0x0D])),
        Err(Error::Session(SessionError::NotOpen))
    );
}
