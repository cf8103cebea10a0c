//! Loss, bitrate and pool utilization gauges.
//!
//! Gauges are owned by the pipeline and passed by reference; there are
//! no process-wide statics.  [`LossGauge`] is the only piece of state
//! written from the capture callback, so its counters are atomics.  The
//! remaining gauges live entirely in the scheduler context.
//!
//! ```text
//!  capture ISR ──▶ LossGauge (capture)     ┐
//!  scheduler  ──▶ LossGauge (frames)       ├─▶ AudioDiagnostics ─▶ log / RPC
//!  scheduler  ──▶ BitrateGauge, PoolStats  ┘
//! ```

use core::sync::atomic::{AtomicU32, Ordering};

use log::info;
use serde::{Deserialize, Serialize};

use crate::config::{CAPTURE_SAMPLES, SAMPLE_RATE_HZ};

// ═══════════════════════════════════════════════════════════════
//  Loss gauge
// ═══════════════════════════════════════════════════════════════

/// Monotonic handled / lost / discarded counters.
///
/// Counters only move forward; [`reset`](Self::reset) is the single way
/// to clear them.
#[derive(Debug, Default)]
pub struct LossGauge {
    handled: AtomicU32,
    lost: AtomicU32,
    discarded: AtomicU32,
}

impl LossGauge {
    pub const fn new() -> Self {
        Self {
            handled: AtomicU32::new(0),
            lost: AtomicU32::new(0),
            discarded: AtomicU32::new(0),
        }
    }

    pub fn count_handled(&self) {
        self.handled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_lost(&self) {
        self.lost.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_discarded(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.handled.store(0, Ordering::Relaxed);
        self.lost.store(0, Ordering::Relaxed);
        self.discarded.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LossSnapshot {
        LossSnapshot {
            handled: self.handled.load(Ordering::Relaxed),
            lost: self.lost.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of a [`LossGauge`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LossSnapshot {
    pub handled: u32,
    pub lost: u32,
    pub discarded: u32,
}

impl LossSnapshot {
    /// Lost share of everything that reached the gauge, in percent.
    pub fn lost_percent(&self) -> u32 {
        percent(self.lost, u64::from(self.handled) + u64::from(self.lost))
    }

    /// Discarded share of handled items, in percent.
    pub fn discarded_percent(&self) -> u32 {
        percent(self.discarded, u64::from(self.handled))
    }
}

fn percent(part: u32, whole: u64) -> u32 {
    if whole == 0 {
        return 0;
    }
    ((u64::from(part) * 100) / whole) as u32
}

// ═══════════════════════════════════════════════════════════════
//  Bitrate gauge
// ═══════════════════════════════════════════════════════════════

/// Tracks the encoded bitrate frame by frame.
#[derive(Debug, Clone, Default)]
pub struct BitrateGauge {
    frames: u32,
    bps_sum: u64,
    current: u32,
    min: u32,
    max: u32,
}

impl BitrateGauge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one encoded frame of `bytes` bytes.
    pub fn record(&mut self, bytes: usize) {
        // One frame covers CAPTURE_SAMPLES at SAMPLE_RATE_HZ.
        let bps = (bytes as u64 * 8 * u64::from(SAMPLE_RATE_HZ) / CAPTURE_SAMPLES as u64) as u32;
        self.current = bps;
        if self.frames == 0 || bps < self.min {
            self.min = bps;
        }
        if bps > self.max {
            self.max = bps;
        }
        self.frames = self.frames.saturating_add(1);
        self.bps_sum += u64::from(bps);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn snapshot(&self) -> BitrateSnapshot {
        let avg = if self.frames == 0 {
            0
        } else {
            (self.bps_sum / u64::from(self.frames)) as u32
        };
        BitrateSnapshot {
            current_bps: self.current,
            min_bps: self.min,
            avg_bps: avg,
            max_bps: self.max,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitrateSnapshot {
    pub current_bps: u32,
    pub min_bps: u32,
    pub avg_bps: u32,
    pub max_bps: u32,
}

// ═══════════════════════════════════════════════════════════════
//  Pool utilization
// ═══════════════════════════════════════════════════════════════

/// Current and high-water outstanding slots of a fixed pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub in_use: u8,
    pub max_in_use: u8,
    pub capacity: u8,
}

// ═══════════════════════════════════════════════════════════════
//  Aggregate snapshot
// ═══════════════════════════════════════════════════════════════

/// Everything the pipeline exposes for observability, collected on demand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioDiagnostics {
    /// Raw buffers forwarded / lost by the capture exchange.
    pub capture: LossSnapshot,
    /// Encoded frames sent / lost / discarded by the pipeline.
    pub frames: LossSnapshot,
    pub bitrate: BitrateSnapshot,
    pub buffer_pool: PoolStats,
    pub frame_pool: PoolStats,
}

impl AudioDiagnostics {
    /// Compact binary encoding for a diagnostics characteristic.
    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Emit the snapshot to the log, one subsystem per line.
    pub fn log_summary(&self) {
        info!(
            "Audio: capture handled={} lost={} ({}%)",
            self.capture.handled,
            self.capture.lost,
            self.capture.lost_percent()
        );
        info!(
            "Audio: frames handled={} lost={} ({}%) discarded={} ({}%)",
            self.frames.handled,
            self.frames.lost,
            self.frames.lost_percent(),
            self.frames.discarded,
            self.frames.discarded_percent()
        );
        info!(
            "Audio: bitrate cur={} min={} avg={} max={} bit/s",
            self.bitrate.current_bps,
            self.bitrate.min_bps,
            self.bitrate.avg_bps,
            self.bitrate.max_bps
        );
        info!(
            "Audio: buffer pool max {}/{}, frame pool max {}/{}",
            self.buffer_pool.max_in_use,
            self.buffer_pool.capacity,
            self.frame_pool.max_in_use,
            self.frame_pool.capacity
        );
    }
}
