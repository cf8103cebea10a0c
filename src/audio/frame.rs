//! Reference-counted compressed frame pool.
//!
//! A fixed arena of [`Frame`] records addressed by [`FrameHandle`].  A
//! handle carries the slot's generation, so a handle kept past its last
//! release is detected instead of silently aliasing the slot's next
//! occupant.
//!
//! ```text
//!   acquire(None) ──▶ refs = 1 ──▶ acquire(Some(h)) ──▶ refs = 2
//!                                                         │
//!   slot free ◀── generation++ ◀── refs = 0 ◀── release ×2 ┘
//! ```
//!
//! The pool lives in the scheduler context only; nothing here is shared
//! with the capture callback.

use log::error;

use crate::config::{FRAME_CAPACITY, FRAME_POOL_SIZE};
use crate::diagnostics::PoolStats;
use crate::error::{EncodeError, PoolError};

// ───────────────────────────────────────────────────────────────
// Frame record
// ───────────────────────────────────────────────────────────────

/// One encoded audio frame.
#[derive(Debug, Clone)]
pub struct Frame {
    data: [u8; FRAME_CAPACITY],
    len: usize,
}

impl Frame {
    const fn empty() -> Self {
        Self {
            data: [0; FRAME_CAPACITY],
            len: 0,
        }
    }

    /// Encoded payload.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whole backing store, for encoders that write in place and then
    /// call [`set_len`](Self::set_len).
    pub fn buffer_mut(&mut self) -> &mut [u8; FRAME_CAPACITY] {
        &mut self.data
    }

    pub fn set_len(&mut self, len: usize) -> Result<(), EncodeError> {
        if len > FRAME_CAPACITY {
            return Err(EncodeError::OutputTooSmall);
        }
        self.len = len;
        Ok(())
    }

    /// Replace the payload with `bytes`.
    pub fn fill(&mut self, bytes: &[u8]) -> Result<(), EncodeError> {
        if bytes.len() > FRAME_CAPACITY {
            return Err(EncodeError::OutputTooSmall);
        }
        self.data[..bytes.len()].copy_from_slice(bytes);
        self.len = bytes.len();
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Handles
// ───────────────────────────────────────────────────────────────

/// Index-plus-generation reference to a pooled frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHandle {
    index: u8,
    generation: u16,
}

impl FrameHandle {
    pub fn index(self) -> usize {
        self.index as usize
    }
}

struct Slot {
    frame: Frame,
    refs: u8,
    generation: u16,
}

// ───────────────────────────────────────────────────────────────
// Pool
// ───────────────────────────────────────────────────────────────

/// Fixed-capacity arena of reference-counted frames.
pub struct FramePool {
    slots: [Slot; FRAME_POOL_SIZE],
    in_use: u8,
    max_in_use: u8,
}

impl Default for FramePool {
    fn default() -> Self {
        Self::new()
    }
}

impl FramePool {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| Slot {
                frame: Frame::empty(),
                refs: 0,
                generation: 0,
            }),
            in_use: 0,
            max_in_use: 0,
        }
    }

    /// Take a fresh frame (`None`) or add a holder to an existing one.
    ///
    /// An empty pool yields [`PoolError::Exhausted`]; callers drop the
    /// input and count it as lost.
    pub fn acquire(&mut self, existing: Option<FrameHandle>) -> Result<FrameHandle, PoolError> {
        if let Some(handle) = existing {
            let slot = self.slot_mut(handle)?;
            let Some(refs) = slot.refs.checked_add(1) else {
                error!("FramePool: refcount overflow on slot {}", handle.index);
                debug_assert!(false, "frame refcount overflow");
                return Err(PoolError::RefCountOverflow);
            };
            slot.refs = refs;
            return Ok(handle);
        }

        let (index, slot) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, s)| s.refs == 0)
            .ok_or(PoolError::Exhausted)?;
        slot.refs = 1;
        slot.frame.len = 0;
        let handle = FrameHandle {
            index: index as u8,
            generation: slot.generation,
        };

        self.in_use += 1;
        self.max_in_use = self.max_in_use.max(self.in_use);
        Ok(handle)
    }

    /// Drop one holder; the slot returns to the pool on the last release.
    pub fn release(&mut self, handle: FrameHandle) -> Result<(), PoolError> {
        let slot = match self.slot_mut(handle) {
            Ok(slot) => slot,
            Err(e) => {
                error!("FramePool: release of {:?} rejected ({})", handle, e);
                return Err(e);
            }
        };
        slot.refs -= 1;
        let freed = slot.refs == 0;
        if freed {
            slot.generation = slot.generation.wrapping_add(1);
            self.in_use -= 1;
        }
        Ok(())
    }

    pub fn frame(&self, handle: FrameHandle) -> Result<&Frame, PoolError> {
        self.slot(handle).map(|s| &s.frame)
    }

    pub fn frame_mut(&mut self, handle: FrameHandle) -> Result<&mut Frame, PoolError> {
        self.slot_mut(handle).map(|s| &mut s.frame)
    }

    /// Current holder count of a live frame.
    pub fn ref_count(&self, handle: FrameHandle) -> Result<u8, PoolError> {
        self.slot(handle).map(|s| s.refs)
    }

    /// Frames currently held.
    pub fn utilization(&self) -> usize {
        self.in_use as usize
    }

    /// High-water mark of [`utilization`](Self::utilization).
    pub fn max_utilization(&self) -> usize {
        self.max_in_use as usize
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            in_use: self.in_use,
            max_in_use: self.max_in_use,
            capacity: FRAME_POOL_SIZE as u8,
        }
    }

    /// Clear the high-water mark down to the current level.
    pub fn reset_max(&mut self) {
        self.max_in_use = self.in_use;
    }

    fn slot(&self, handle: FrameHandle) -> Result<&Slot, PoolError> {
        let slot = self
            .slots
            .get(handle.index as usize)
            .ok_or(PoolError::InvalidHandle)?;
        if slot.refs == 0 || slot.generation != handle.generation {
            return Err(PoolError::StaleHandle);
        }
        Ok(slot)
    }

    fn slot_mut(&mut self, handle: FrameHandle) -> Result<&mut Slot, PoolError> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .ok_or(PoolError::InvalidHandle)?;
        if slot.refs == 0 || slot.generation != handle.generation {
            return Err(PoolError::StaleHandle);
        }
        Ok(slot)
    }
}
