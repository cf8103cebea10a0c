//! End-to-end tests for capture → encode → fragment → link.
//!
//! Drives a [`VoiceService`] with a hand-fired microphone and checks what
//! reaches the link and the event sink.

use crate::mock_ports::{ManualMic, RecordingLink, RecordingSink};

use voiceremote::adapters::sim::LoopbackLink;
use voiceremote::app::commands::PeerEvent;
use voiceremote::app::events::AudioEvent;
use voiceremote::app::service::VoiceService;
use voiceremote::audio::adpcm::AdpcmEncoder;
use voiceremote::audio::capture::CaptureExchange;
use voiceremote::config::AudioConfig;
use voiceremote::error::LinkError;
use voiceremote::session::fragment::FragmentHeader;
use voiceremote::session::{MicState, PeerId};

const HOST: PeerId = PeerId(1);
const MIC_OPEN: [u8; 3] = [0x0C, 0x00, 0x01];
const MIC_CLOSE: [u8; 1] = [0x0D];

fn open_service<'a>(
    capture: &'a CaptureExchange,
    mic: &mut ManualMic,
    sink: &mut RecordingSink,
) -> VoiceService<'a, AdpcmEncoder> {
    let mut svc = VoiceService::new(AudioConfig::default(), capture, AdpcmEncoder::new()).unwrap();
    svc.handle_peer_event(PeerEvent::Enabled(HOST), mic, sink).unwrap();
    svc.handle_peer_event(PeerEvent::command(HOST, &MIC_OPEN), mic, sink)
        .unwrap();
    assert!(svc.is_capturing());
    assert!(mic.armed);
    mic.prime(capture);
    // Default config discards one buffer of start-up transient.
    mic.fire(capture, 0);
    assert!(capture.take_filled().is_none());
    svc
}

#[test]
fn first_frame_reaches_link_after_audio_start() {
    let capture = CaptureExchange::new();
    let mut mic = ManualMic::new();
    let mut link = RecordingLink::new();
    let mut sink = RecordingSink::new();
    let mut svc = open_service(&capture, &mut mic, &mut sink);

    mic.fire(&capture, 500);
    svc.poll(&mut mic, &mut link, &mut sink).unwrap();

    assert_eq!(link.control(), vec![&[0x04][..]], "AudioStart goes first");
    let audio = link.audio();
    assert_eq!(audio.len(), 7, "131-byte frame in 20-byte fragments");
    let header = FragmentHeader::parse(&audio[0].data).unwrap();
    assert_eq!(header.sequence, 0);
    assert_eq!(header.remote_id, 1);
    assert_eq!(header.predictor, 0, "fresh encoder state");
    assert_eq!(link.audio_bytes(), 131 + 3);

    assert_eq!(svc.sessions().state(HOST), Some(MicState::OpenActive));
    assert_eq!(svc.sessions().frame_counter(HOST), Some(1));
    assert_eq!(svc.frame_pool().utilization(), 0);
    assert_eq!(svc.backlog_len(), 0);
}

#[test]
fn mic_close_stops_capture_and_reports_diagnostics() {
    let capture = CaptureExchange::new();
    let mut mic = ManualMic::new();
    let mut link = RecordingLink::new();
    let mut sink = RecordingSink::new();
    let mut svc = open_service(&capture, &mut mic, &mut sink);

    for _ in 0..3 {
        mic.fire(&capture, 200);
        svc.poll(&mut mic, &mut link, &mut sink).unwrap();
    }
    svc.handle_peer_event(PeerEvent::command(HOST, &MIC_CLOSE), &mut mic, &mut sink)
        .unwrap();

    assert!(!svc.is_capturing());
    assert!(!mic.armed);
    assert!(!capture.is_armed());
    assert_eq!(capture.pool_stats().in_use, 0, "every raw buffer reclaimed");

    let Some(AudioEvent::Diagnostics(d)) = sink.last() else {
        panic!("expected diagnostics, got {:?}", sink.last());
    };
    assert_eq!(d.frames.handled, 3);
    assert_eq!(d.frames.lost, 0);
    assert_eq!(d.capture.handled, 3);
    assert!(d.bitrate.avg_bps > 0);

    svc.poll(&mut mic, &mut link, &mut sink).unwrap();
    assert_eq!(link.control().last(), Some(&&[0x00][..]), "AudioStop delivered");
}

#[test]
fn close_mid_frame_completes_after_last_fragment() {
    let capture = CaptureExchange::new();
    let mut mic = ManualMic::new();
    let mut sink = RecordingSink::new();
    let mut svc = open_service(&capture, &mut mic, &mut sink);
    // AudioStart plus one fragment per interval.
    let mut link = LoopbackLink::new(2);

    mic.fire(&capture, 300);
    svc.poll(&mut mic, &mut link, &mut sink).unwrap();
    assert_eq!(link.audio_packets(), 1);
    assert_eq!(svc.sessions().frame_in_transit(HOST), Some(true));

    svc.handle_peer_event(PeerEvent::command(HOST, &MIC_CLOSE), &mut mic, &mut sink)
        .unwrap();
    assert_eq!(svc.sessions().state(HOST), Some(MicState::Closing));
    assert!(svc.is_capturing(), "capture runs until the frame is out");
    assert_eq!(sink.count(|e| matches!(e, AudioEvent::MicClose(_))), 0);

    for _ in 0..3 {
        link.next_interval();
        svc.poll(&mut mic, &mut link, &mut sink).unwrap();
    }
    assert_eq!(link.audio_packets(), 7);
    assert_eq!(svc.sessions().state(HOST), Some(MicState::Closed));
    assert_eq!(sink.count(|e| matches!(e, AudioEvent::MicClose(_))), 1);
    assert!(!svc.is_capturing());

    link.next_interval();
    svc.poll(&mut mic, &mut link, &mut sink).unwrap();
    let control: Vec<&[u8]> = link.control().iter().map(|(_, d)| d.as_slice()).collect();
    assert_eq!(control, vec![&[0x04][..], &[0x00][..]]);
}

#[test]
fn close_mid_frame_with_full_control_queue_keeps_the_frame() {
    const GUEST: PeerId = PeerId(2);
    const GET_CAPS: [u8; 5] = [0x0A, 0x00, 0x05, 0x00, 0x01];

    let capture = CaptureExchange::new();
    let mut mic = ManualMic::new();
    let mut sink = RecordingSink::new();
    let mut svc = open_service(&capture, &mut mic, &mut sink);
    // One notification per interval: audio goes before control.
    let mut link = LoopbackLink::new(1);

    mic.fire(&capture, 300);
    svc.poll(&mut mic, &mut link, &mut sink).unwrap();
    link.next_interval();
    svc.poll(&mut mic, &mut link, &mut sink).unwrap();
    assert_eq!(link.audio_packets(), 1);

    svc.handle_peer_event(PeerEvent::command(HOST, &MIC_CLOSE), &mut mic, &mut sink)
        .unwrap();
    for _ in 0..5 {
        link.next_interval();
        svc.poll(&mut mic, &mut link, &mut sink).unwrap();
    }
    assert_eq!(link.audio_packets(), 6);

    svc.handle_peer_event(PeerEvent::Enabled(GUEST), &mut mic, &mut sink)
        .unwrap();
    for _ in 0..2 {
        svc.handle_peer_event(PeerEvent::command(GUEST, &GET_CAPS), &mut mic, &mut sink)
            .unwrap();
    }

    // Last fragment goes out while there is no room for AudioStop.
    link.next_interval();
    svc.poll(&mut mic, &mut link, &mut sink).unwrap();
    assert_eq!(link.audio_packets(), 7);
    assert_eq!(svc.sessions().state(HOST), Some(MicState::Closing));
    assert_eq!(svc.sessions().frame_counter(HOST), Some(1));
    assert_eq!(svc.diagnostics().frames.lost, 0);
    assert_eq!(sink.count(|e| matches!(e, AudioEvent::MicClose(_))), 0);

    // The first delivered reply frees a slot and the close completes.
    link.next_interval();
    svc.poll(&mut mic, &mut link, &mut sink).unwrap();
    assert_eq!(svc.sessions().state(HOST), Some(MicState::Closed));
    assert_eq!(sink.count(|e| matches!(e, AudioEvent::MicClose(_))), 1);
    assert!(!svc.is_capturing());

    for _ in 0..2 {
        link.next_interval();
        svc.poll(&mut mic, &mut link, &mut sink).unwrap();
    }
    let to_host: Vec<&[u8]> = link
        .control()
        .iter()
        .filter(|(peer, _)| *peer == HOST)
        .map(|(_, d)| d.as_slice())
        .collect();
    assert_eq!(to_host, vec![&[0x04][..], &[0x00][..]]);
}

#[test]
fn blocked_link_fills_backlog_then_counts_losses() {
    let capture = CaptureExchange::new();
    let mut mic = ManualMic::new();
    let mut link = RecordingLink::new();
    link.refuse = Some(LinkError::BufferFull);
    let mut sink = RecordingSink::new();
    let mut svc = open_service(&capture, &mut mic, &mut sink);

    for _ in 0..6 {
        mic.fire(&capture, 100);
        svc.poll(&mut mic, &mut link, &mut sink).unwrap();
    }
    assert_eq!(svc.sessions().state(HOST), Some(MicState::OpenWaiting));
    assert_eq!(svc.backlog_len(), 4);
    let d = svc.diagnostics();
    assert_eq!(d.frames.handled, 6);
    assert_eq!(d.frames.lost, 2);
    assert!(link.sent.is_empty());

    svc.handle_peer_event(PeerEvent::command(HOST, &MIC_CLOSE), &mut mic, &mut sink)
        .unwrap();
    assert_eq!(svc.backlog_len(), 0);
    assert_eq!(svc.frame_pool().utilization(), 0);
    let Some(AudioEvent::Diagnostics(d)) = sink.last() else {
        panic!("expected diagnostics");
    };
    assert_eq!(d.frames.discarded, 4);
}

#[test]
fn fatal_link_error_drops_frame_and_keeps_streaming() {
    let capture = CaptureExchange::new();
    let mut mic = ManualMic::new();
    let mut link = RecordingLink::new();
    let mut sink = RecordingSink::new();
    let mut svc = open_service(&capture, &mut mic, &mut sink);

    mic.fire(&capture, 100);
    svc.poll(&mut mic, &mut link, &mut sink).unwrap();
    assert_eq!(svc.sessions().state(HOST), Some(MicState::OpenActive));

    link.refuse = Some(LinkError::Fatal("controller reset"));
    mic.fire(&capture, 100);
    assert!(svc.poll(&mut mic, &mut link, &mut sink).is_err());
    assert_eq!(svc.backlog_len(), 0);
    assert_eq!(svc.sessions().frame_in_transit(HOST), Some(false));
    assert_eq!(svc.diagnostics().frames.lost, 1);

    link.refuse = None;
    mic.fire(&capture, 100);
    svc.poll(&mut mic, &mut link, &mut sink).unwrap();
    let audio = link.audio();
    let header = FragmentHeader::parse(&audio[7].data).unwrap();
    assert_eq!(header.sequence, 1, "next frame starts with a header");
}

#[test]
fn peer_disconnect_mid_stream_releases_everything() {
    let capture = CaptureExchange::new();
    let mut mic = ManualMic::new();
    let mut link = RecordingLink::new();
    link.refuse = Some(LinkError::NotReady);
    let mut sink = RecordingSink::new();
    let mut svc = open_service(&capture, &mut mic, &mut sink);

    mic.fire(&capture, 100);
    svc.poll(&mut mic, &mut link, &mut sink).unwrap();
    assert_eq!(svc.backlog_len(), 1);

    svc.handle_peer_event(PeerEvent::Disabled(HOST), &mut mic, &mut sink)
        .unwrap();
    assert!(!svc.is_capturing());
    assert_eq!(svc.sessions().enabled_peers(), 0);
    assert_eq!(svc.sessions().queued_control(), 0);
    assert_eq!(svc.frame_pool().utilization(), 0);
    assert_eq!(capture.pool_stats().in_use, 0);
    assert_eq!(sink.count(|e| matches!(e, AudioEvent::Disabled(_))), 1);
}
