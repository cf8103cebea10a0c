//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements     | Connects to                         |
//! |------------|----------------|-------------------------------------|
//! | `log_sink` | EventSink      | Serial log output                   |
//! | `sim`      | CaptureSource  | Tone generator (host / bench)       |
//! |            | NotifyPort     | Credit-limited loopback link        |
//! | `time`     | -              | ESP32 system timer / `Instant`      |

pub mod log_sink;
pub mod sim;
pub mod time;
