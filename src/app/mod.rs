//! Application core: session and pipeline logic, zero I/O.
//!
//! The voice pipeline is driven from three directions: the microphone
//! interrupt (through [`crate::audio::capture`]), the radio stack
//! ([`commands::PeerEvent`]) and the scheduler tick.  All interaction with
//! hardware happens through **port traits** defined in [`ports`], keeping
//! this layer testable on the host.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
