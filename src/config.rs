//! Audio pipeline configuration.
//!
//! Compile-time capacities size the fixed pools and queues; everything
//! tunable at runtime lives in [`AudioConfig`], which can be overridden
//! from NVS or a provisioning channel and is validated before use.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ── Compile-time capacities ───────────────────────────────────

/// Samples per raw capture buffer.
pub const CAPTURE_SAMPLES: usize = 256;
/// Microphone sampling rate.
pub const SAMPLE_RATE_HZ: u32 = 8_000;
/// Raw capture buffers shared between the source and the encoder path.
pub const BUFFER_POOL_SIZE: usize = 4;
/// Compressed frame records in the frame pool.
pub const FRAME_POOL_SIZE: usize = 6;
/// Largest compressed frame a record can hold (bytes).
pub const FRAME_CAPACITY: usize = 134;
/// Concurrently enabled peers.
pub const MAX_PEERS: usize = 2;
/// Pending control messages awaiting delivery.
pub const CONTROL_QUEUE_LEN: usize = 2;
/// Encoded frames queued for transmission.
pub const FRAME_BACKLOG: usize = 4;
/// Upper bound for the runtime fragment length.
pub const MAX_FRAGMENT_LEN: usize = 64;

/// Duration of one capture buffer in milliseconds.
pub const FRAME_DURATION_MS: u32 = (CAPTURE_SAMPLES as u32 * 1000) / SAMPLE_RATE_HZ;

// ── Runtime configuration ─────────────────────────────────────

/// Runtime-tunable audio pipeline parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioConfig {
    // --- Session timeouts ---
    /// Time allowed between mic open and the first audio (ms).
    pub mic_open_timeout_ms: u32,
    /// Maximum streaming duration once audio starts (ms).
    pub streaming_limit_ms: u32,
    /// How long a peer-initiated search stays pending (ms).
    pub search_timeout_ms: u32,

    // --- Wire format ---
    /// Frames between best-effort sync messages.
    pub sync_interval: u16,
    /// Remote identifier written into every first fragment.
    pub remote_id: u8,
    /// Bytes per transport fragment.
    pub fragment_len: u8,

    // --- Capture ---
    /// Microphone start-up transient discarded after enable (ms).
    pub transient_skip_ms: u16,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            // Session timeouts
            mic_open_timeout_ms: 1_000,
            streaming_limit_ms: 6_000,
            search_timeout_ms: 1_000,

            // Wire format
            sync_interval: 15,
            remote_id: 0x01,
            fragment_len: 20,

            // Capture
            transient_skip_ms: 10,
        }
    }
}

impl AudioConfig {
    /// Reject values the pipeline cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.mic_open_timeout_ms == 0 || self.streaming_limit_ms == 0 {
            return Err(Error::Config("session timeouts must be non-zero"));
        }
        if self.search_timeout_ms == 0 {
            return Err(Error::Config("search timeout must be non-zero"));
        }
        if self.sync_interval == 0 {
            return Err(Error::Config("sync interval must be non-zero"));
        }
        // The first fragment must carry the header and at least one payload byte.
        let len = self.fragment_len as usize;
        if len <= crate::session::fragment::HEADER_LEN || len > MAX_FRAGMENT_LEN {
            return Err(Error::Config("fragment length out of range"));
        }
        Ok(())
    }

    /// Parse a JSON override (provisioning / bench builds) and validate it.
    /// Missing fields are an error; partial overrides are not merged.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let config: Self =
            serde_json::from_slice(bytes).map_err(|_| Error::Config("malformed config JSON"))?;
        config.validate()?;
        Ok(config)
    }

    /// Compact blob for NVS persistence.
    pub fn to_blob(&self) -> Result<Vec<u8>> {
        postcard::to_allocvec(self).map_err(|_| Error::Config("config encode failed"))
    }

    pub fn from_blob(bytes: &[u8]) -> Result<Self> {
        let config: Self =
            postcard::from_bytes(bytes).map_err(|_| Error::Config("malformed config blob"))?;
        config.validate()?;
        Ok(config)
    }

    /// Filled buffers discarded after enable: the transient rounded to
    /// whole buffers, never fewer than one.
    pub fn skip_buffers(&self) -> u8 {
        let frame = FRAME_DURATION_MS;
        let rounded = (u32::from(self.transient_skip_ms) + frame / 2) / frame;
        rounded.clamp(1, u32::from(u8::MAX)) as u8
    }
}
