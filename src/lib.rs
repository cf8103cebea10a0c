//! Voice remote audio pipeline.
//!
//! Exposes the pure-logic modules for integration testing and host-side
//! simulation. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod audio;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod session;

mod esp_link_shims;
