//! Per-host request pacing
//!
//! This module handles:
//! - Enforcing the minimum delay between two requests to the same host
//! - Measuring that delay from the end of the previous request
//! - Keeping one request per host in flight at a time

use crate::state::HostState;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Poll interval while another request to the same host is running
const BUSY_WAIT: Duration = Duration::from_millis(10);

/// Paces requests per host
///
/// Different hosts never wait on each other; requests to one host are
/// spaced at least `delay` apart, counted from when the previous one ended.
pub struct HostPacer {
    delay: Duration,
    hosts: Mutex<HashMap<String, HostState>>,
}

/// Permission to make one request to a host
///
/// Dropping the turn records the end of the request, including when the
/// request future is abandoned by a timeout or cancellation.
pub struct HostTurn<'a> {
    pacer: &'a HostPacer,
    host: String,
}

impl Drop for HostTurn<'_> {
    fn drop(&mut self) {
        self.pacer.finish(&self.host);
    }
}

impl HostPacer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Waits until a request to `host` may start
    ///
    /// # Arguments
    ///
    /// * `host` - The host about to be contacted
    ///
    /// # Returns
    ///
    /// A `HostTurn` that must be held for the duration of the request
    pub async fn wait_turn(&self, host: &str) -> HostTurn<'_> {
        loop {
            let wait = {
                let mut hosts = self.lock();
                let state = hosts.entry(host.to_string()).or_insert_with(HostState::new);
                if state.in_flight {
                    Some(BUSY_WAIT)
                } else {
                    match state.time_until_next_request(self.delay, Instant::now()) {
                        Some(wait) => Some(wait),
                        None => {
                            state.record_start();
                            None
                        }
                    }
                }
            };

            match wait {
                None => {
                    return HostTurn {
                        pacer: self,
                        host: host.to_string(),
                    }
                }
                Some(wait) => {
                    tracing::trace!("Waiting {:?} before contacting {}", wait, host);
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Number of requests started against a host in this run
    pub fn request_count(&self, host: &str) -> u32 {
        self.lock().get(host).map(|s| s.request_count).unwrap_or(0)
    }

    fn finish(&self, host: &str) {
        if let Some(state) = self.lock().get_mut(host) {
            state.record_end(Instant::now());
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, HostState>> {
        // Host state stays consistent even if a holder panicked
        self.hosts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
