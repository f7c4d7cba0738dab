use std::time::{Duration, Instant};

/// Per-host pacing state
///
/// The delay is measured from the end of the previous request, so a slow
/// response does not eat into the politeness gap.
#[derive(Debug, Clone, Default)]
pub struct HostState {
    /// Number of requests made to this host in the current run
    pub request_count: u32,

    /// When the most recent request to this host finished
    pub last_request_end: Option<Instant>,

    /// Whether a request to this host is currently running
    pub in_flight: bool,
}

impl HostState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that a request to this host has started
    pub fn record_start(&mut self) {
        self.request_count += 1;
        self.in_flight = true;
    }

    /// Records that a request to this host has finished
    pub fn record_end(&mut self, now: Instant) {
        self.in_flight = false;
        self.last_request_end = Some(now);
    }

    /// Calculates the time until the next request can start
    ///
    /// Returns None if a request can start now.
    pub fn time_until_next_request(&self, delay: Duration, now: Instant) -> Option<Duration> {
        let last = self.last_request_end?;
        let elapsed = now.saturating_duration_since(last);
        if elapsed < delay {
            Some(delay - elapsed)
        } else {
            None
        }
    }
}
