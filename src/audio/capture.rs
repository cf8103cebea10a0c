//! Capture buffer exchange.
//!
//! Sits between the microphone driver (interrupt context) and the
//! encoder path (scheduler context).  Raw buffers are boxed sample arrays
//! that move by value, so at any instant exactly one side owns a buffer.
//!
//! ```text
//!              set_buffer                      try_send
//!  BufferPool ───────────▶ CaptureSource ──fill──▶ filled channel ──▶ encoder
//!      ▲                        │ (skip window)          │
//!      └──────── recycle ◀──────┴────────────────────────┘
//! ```
//!
//! [`CaptureExchange::on_event`] is the callback body.  It never blocks:
//! the pool is guarded by a critical section and the consumer handoff is
//! a bounded [`Channel`] driven with `try_send` only.

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use log::{info, warn};

use crate::app::ports::CaptureSource;
use crate::config::{BUFFER_POOL_SIZE, CAPTURE_SAMPLES};
use crate::diagnostics::{LossGauge, PoolStats};
use crate::error::CaptureError;

/// Buffers a capture source holds at once (double buffering).
pub const SOURCE_SLOTS: usize = 2;

// ───────────────────────────────────────────────────────────────
// Raw buffer
// ───────────────────────────────────────────────────────────────

/// One block of PCM samples plus the pool slot it belongs to.
#[derive(Debug)]
pub struct RawBuffer {
    slot: u8,
    samples: Box<[i16; CAPTURE_SAMPLES]>,
}

impl RawBuffer {
    fn new(slot: u8) -> Self {
        Self {
            slot,
            samples: Box::new([0; CAPTURE_SAMPLES]),
        }
    }

    pub fn slot(&self) -> u8 {
        self.slot
    }

    pub fn samples(&self) -> &[i16; CAPTURE_SAMPLES] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut [i16; CAPTURE_SAMPLES] {
        &mut self.samples
    }
}

// ───────────────────────────────────────────────────────────────
// Buffer pool
// ───────────────────────────────────────────────────────────────

/// Pre-allocated raw buffers, shared between interrupt and scheduler.
pub struct BufferPool {
    free: Mutex<CriticalSectionRawMutex, RefCell<heapless::Vec<RawBuffer, BUFFER_POOL_SIZE>>>,
    max_in_use: AtomicU8,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferPool {
    pub fn new() -> Self {
        let mut free = heapless::Vec::new();
        for slot in 0..BUFFER_POOL_SIZE {
            // Capacity equals the loop bound.
            let _ = free.push(RawBuffer::new(slot as u8));
        }
        Self {
            free: Mutex::new(RefCell::new(free)),
            max_in_use: AtomicU8::new(0),
        }
    }

    pub fn alloc(&self) -> Option<RawBuffer> {
        self.free.lock(|free| {
            let mut free = free.borrow_mut();
            let buf = free.pop()?;
            let in_use = (BUFFER_POOL_SIZE - free.len()) as u8;
            self.max_in_use.fetch_max(in_use, Ordering::Relaxed);
            Some(buf)
        })
    }

    pub fn free(&self, buffer: RawBuffer) {
        debug_assert!((buffer.slot as usize) < BUFFER_POOL_SIZE);
        self.free.lock(|free| {
            if free.borrow_mut().push(buffer).is_err() {
                debug_assert!(false, "buffer returned twice");
            }
        });
    }

    pub fn in_use(&self) -> usize {
        self.free.lock(|free| BUFFER_POOL_SIZE - free.borrow().len())
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            in_use: self.in_use() as u8,
            max_in_use: self.max_in_use.load(Ordering::Relaxed),
            capacity: BUFFER_POOL_SIZE as u8,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Exchange
// ───────────────────────────────────────────────────────────────

/// The facts delivered by one capture callback.
#[derive(Debug, Default)]
pub struct CaptureEvent {
    /// The source needs a buffer to keep sampling into.
    pub buffer_requested: bool,
    /// The source finished filling this buffer.
    pub buffer_released: Option<RawBuffer>,
}

/// Buffer pool, consumer handoff and loss accounting for one microphone.
pub struct CaptureExchange {
    pool: BufferPool,
    filled: Channel<CriticalSectionRawMutex, RawBuffer, BUFFER_POOL_SIZE>,
    gauge: LossGauge,
    skip_remaining: AtomicU8,
    armed: AtomicBool,
}

impl Default for CaptureExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureExchange {
    pub fn new() -> Self {
        Self {
            pool: BufferPool::new(),
            filled: Channel::new(),
            gauge: LossGauge::new(),
            skip_remaining: AtomicU8::new(0),
            armed: AtomicBool::new(false),
        }
    }

    /// Arm the source, discarding the first `skip_buffers` filled buffers.
    pub fn enable(&self, skip_buffers: u8, source: &mut impl CaptureSource) {
        self.gauge.reset();
        self.skip_remaining.store(skip_buffers, Ordering::Release);
        self.armed.store(true, Ordering::Release);
        source.arm();
        info!("Capture: enabled, skipping {} buffer(s)", skip_buffers);
    }

    /// Disarm the source and return every outstanding buffer to the pool.
    pub fn disable(&self, source: &mut impl CaptureSource) {
        self.armed.store(false, Ordering::Release);
        for buffer in source.disarm() {
            self.pool.free(buffer);
        }
        while let Ok(buffer) = self.filled.try_receive() {
            self.pool.free(buffer);
        }
        info!("Capture: disabled, {} buffer(s) still out", self.pool.in_use());
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Capture callback body.  Safe to call from interrupt context.
    ///
    /// The source is re-fed before the filled buffer is forwarded, so a
    /// drained pool falls back to reusing the buffer just released.
    pub fn on_event(
        &self,
        event: CaptureEvent,
        source: &mut impl CaptureSource,
    ) -> Result<(), CaptureError> {
        let CaptureEvent {
            buffer_requested,
            mut buffer_released,
        } = event;

        if !self.is_armed() {
            if let Some(buffer) = buffer_released {
                self.pool.free(buffer);
            }
            return Err(CaptureError::NotArmed);
        }

        if buffer_requested {
            match self.pool.alloc() {
                Some(buffer) => source.set_buffer(buffer),
                None => match buffer_released.take() {
                    Some(buffer) => {
                        self.gauge.count_lost();
                        source.set_buffer(buffer);
                    }
                    None => return Err(CaptureError::Starved),
                },
            }
        }

        if let Some(buffer) = buffer_released {
            self.deliver(buffer);
        }
        Ok(())
    }

    fn deliver(&self, buffer: RawBuffer) {
        let skipping = self
            .skip_remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if skipping {
            self.pool.free(buffer);
            return;
        }
        match self.filled.try_send(buffer) {
            Ok(()) => self.gauge.count_handled(),
            Err(TrySendError::Full(buffer)) => {
                self.pool.free(buffer);
                self.gauge.count_lost();
            }
        }
    }

    /// Next filled buffer for the encoder, if any.
    pub fn take_filled(&self) -> Option<RawBuffer> {
        self.filled.try_receive().ok()
    }

    /// Return a consumed buffer to the pool.
    pub fn recycle(&self, buffer: RawBuffer) {
        self.pool.free(buffer);
    }

    pub fn gauge(&self) -> &LossGauge {
        &self.gauge
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Log and clear the loss gauge.
    pub fn log_and_reset_gauge(&self) {
        let s = self.gauge.snapshot();
        if s.lost > 0 {
            warn!(
                "Capture: {} of {} buffers lost ({}%)",
                s.lost,
                s.handled + s.lost,
                s.lost_percent()
            );
        }
        self.gauge.reset();
    }
}
