//! Monotonic clock adapter.
//!
//! Feeds the session timers: the scheduler loop converts the distance
//! between two readings into `elapsed_ms` for
//! [`VoiceService::tick`](crate::app::service::VoiceService::tick).
//!
//! - **`target_os = "espidf"`**: wraps `esp_timer_get_time()` from the
//!   ESP-IDF high-resolution timer (microsecond precision, monotonic).
//! - **`not(target_os = "espidf")`**: uses `std::time::Instant` for
//!   host-side testing and simulation.

/// Monotonic uptime source.
pub struct UptimeClock {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
    last_ms: u64,
}

impl Default for UptimeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl UptimeClock {
    pub fn new() -> Self {
        let mut clock = Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
            last_ms: 0,
        };
        clock.last_ms = clock.uptime_ms();
        clock
    }

    /// Microseconds since boot.
    #[cfg(target_os = "espidf")]
    pub fn uptime_us(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64
    }

    /// Microseconds since the clock was created.
    #[cfg(not(target_os = "espidf"))]
    pub fn uptime_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    pub fn uptime_ms(&self) -> u64 {
        self.uptime_us() / 1000
    }

    /// Milliseconds since the previous call, saturated to `u32`.
    pub fn elapsed_ms(&mut self) -> u32 {
        let now = self.uptime_ms();
        let elapsed = now.saturating_sub(self.last_ms);
        self.last_ms = now;
        u32::try_from(elapsed).unwrap_or(u32::MAX)
    }
}
