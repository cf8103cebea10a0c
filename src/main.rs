//! Voice remote firmware: bench entry point.
//!
//! Runs the full audio pipeline against the simulated microphone and a
//! credit-limited loopback link, scripting a host that enables the voice
//! service, opens the mic, streams for a while and closes it again.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  ToneSource        LoopbackLink     LogEventSink   UptimeClock │
//! │  (CaptureSource)   (NotifyPort)     (EventSink)                │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │            VoiceService (pure logic)                   │    │
//! │  │  CaptureExchange · Encoder · FramePool · Sessions      │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::Result;
use log::{info, warn};

use voiceremote::adapters::log_sink::LogEventSink;
use voiceremote::adapters::sim::{LoopbackLink, ToneSource};
use voiceremote::adapters::time::UptimeClock;
use voiceremote::app::commands::PeerEvent;
use voiceremote::app::service::VoiceService;
use voiceremote::audio::adpcm::AdpcmEncoder;
use voiceremote::audio::capture::{CaptureExchange, SOURCE_SLOTS};
use voiceremote::config::{AudioConfig, FRAME_DURATION_MS};
use voiceremote::session::PeerId;

/// Notifications the simulated controller accepts per capture period.
const LINK_CREDITS: usize = 8;
/// Capture periods per scripted voice query.
const QUERY_FRAMES: u32 = 100;
/// Idle periods between queries.
const PAUSE_FRAMES: u32 = 60;

const HOST: PeerId = PeerId(1);

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  VoiceRemote v{}                     ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Pipeline ───────────────────────────────────────────
    // Shared with the capture callback for the lifetime of the program.
    let capture: &'static CaptureExchange = Box::leak(Box::new(CaptureExchange::new()));
    // Bench builds may bake in a JSON override.
    let config = match option_env!("VOICEREMOTE_CONFIG_JSON") {
        Some(json) => match AudioConfig::from_json(json.as_bytes()) {
            Ok(cfg) => {
                info!("Config override loaded");
                cfg
            }
            Err(e) => {
                warn!("Config override rejected ({}), using defaults", e);
                AudioConfig::default()
            }
        },
        None => AudioConfig::default(),
    };
    let mut voice = VoiceService::new(config, capture, AdpcmEncoder::new())?;

    let mut mic = ToneSource::new(440.0, 6000);
    let mut link = LoopbackLink::new(LINK_CREDITS);
    let mut sink = LogEventSink::new();
    let mut clock = UptimeClock::new();

    voice.handle_peer_event(PeerEvent::Enabled(HOST), &mut mic, &mut sink)?;
    info!("System ready. Entering capture loop.");

    // ── 3. Capture loop ───────────────────────────────────────
    let mut period: u32 = 0;
    loop {
        std::thread::sleep(std::time::Duration::from_millis(u64::from(FRAME_DURATION_MS)));
        link.next_interval();

        // Scripted host: open, stream, close.
        let script = period % (QUERY_FRAMES + PAUSE_FRAMES);
        let command: Option<&[u8]> = match script {
            0 => Some(&[0x0C, 0x00, 0x01][..]),
            QUERY_FRAMES => Some(&[0x0D][..]),
            _ => None,
        };
        if let Some(bytes) = command {
            if let Err(e) = voice.handle_peer_event(PeerEvent::command(HOST, bytes), &mut mic, &mut sink) {
                warn!("Bench: command {:02x?} rejected: {}", bytes, e);
            }
        }

        // Microphone interrupt.
        for _ in 0..SOURCE_SLOTS {
            let event = mic.prime_event();
            if !event.buffer_requested {
                break;
            }
            if let Err(e) = capture.on_event(event, &mut mic) {
                warn!("Bench: capture prime failed: {}", e);
                break;
            }
        }
        if let Some(event) = mic.complete() {
            if let Err(e) = capture.on_event(event, &mut mic) {
                warn!("Bench: capture callback failed: {}", e);
            }
        }

        // Scheduler.
        if let Err(e) = voice.poll(&mut mic, &mut link, &mut sink) {
            warn!("Bench: poll: {}", e);
        }
        if let Err(e) = voice.tick(clock.elapsed_ms(), &mut mic, &mut sink) {
            warn!("Bench: tick: {}", e);
        }

        if script == QUERY_FRAMES {
            capture.log_and_reset_gauge();
            info!(
                "Bench: {} audio packets, {} bytes so far",
                link.audio_packets(),
                link.audio_bytes()
            );
        }
        period = period.wrapping_add(1);
    }
}
