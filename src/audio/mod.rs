//! Audio data path: raw capture buffers in, encoded frames out.
//!
//! ```text
//!   mic ISR ──▶ capture::CaptureExchange ──▶ Encoder ──▶ frame::FramePool
//! ```
//!
//! - [`capture`]: raw buffer pool and the interrupt-to-scheduler handoff.
//! - [`frame`]: reference-counted arena of encoded frames.
//! - [`adpcm`]: the IMA ADPCM encoder used on the device.

pub mod adpcm;
pub mod capture;
pub mod frame;
