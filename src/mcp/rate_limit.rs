//! Coarse per-client request budget.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::{Error, Result};

/// Tracked clients before expired windows are swept.
const MAX_TRACKED_CLIENTS: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u64,
}

/// Fixed-window request counter keyed by client identifier.
///
/// The increment and the budget comparison run under the map entry's lock,
/// so concurrent calls for one client never lose an update. Once the map
/// grows past its bound, expired windows are swept at most once per window.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u64,
    window: Duration,
    clients: DashMap<String, Window>,
    max_tracked: usize,
    epoch: Instant,
    /// Milliseconds since `epoch` at the last sweep.
    last_sweep_ms: AtomicU64,
}

impl RateLimiter {
    /// `max_requests == 0` disables limiting.
    pub fn new(max_requests: u64, window: Duration) -> Self {
        Self {
            max_requests,
            window: window.max(Duration::from_secs(1)),
            clients: DashMap::new(),
            max_tracked: MAX_TRACKED_CLIENTS,
            epoch: Instant::now(),
            last_sweep_ms: AtomicU64::new(0),
        }
    }

    /// Override the number of tracked clients that triggers a sweep.
    pub fn with_max_tracked(mut self, max_tracked: usize) -> Self {
        self.max_tracked = max_tracked.max(1);
        self
    }

    /// A limiter that admits everything.
    pub fn disabled() -> Self {
        Self::new(0, Duration::from_secs(60))
    }

    pub fn is_enabled(&self) -> bool {
        self.max_requests > 0
    }

    /// Count one request for `client`; fails once the window budget is spent.
    pub fn check(&self, client: &str) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        let now = Instant::now();
        if self.clients.len() >= self.max_tracked {
            self.sweep_if_due(now);
        }

        let count = {
            let mut entry = self.clients.entry(client.to_string()).or_insert(Window {
                started: now,
                count: 0,
            });
            if now.duration_since(entry.started) >= self.window {
                entry.started = now;
                entry.count = 0;
            }
            entry.count = entry.count.saturating_add(1);
            entry.count
        };

        if count > self.max_requests {
            debug!(client, count, limit = self.max_requests, "Rate limit exceeded");
            return Err(Error::RateLimited {
                client: client.to_string(),
                limit: self.max_requests,
                window_secs: self.window.as_secs(),
            });
        }
        Ok(())
    }

    /// Requests counted for `client` in its current window.
    pub fn current(&self, client: &str) -> u64 {
        self.clients
            .get(client)
            .filter(|w| w.started.elapsed() < self.window)
            .map(|w| w.count)
            .unwrap_or(0)
    }

    /// Sweep at most once per window.
    fn sweep_if_due(&self, now: Instant) {
        let now_ms = now.duration_since(self.epoch).as_millis() as u64;
        let last = self.last_sweep_ms.load(Ordering::Relaxed);
        if now_ms.saturating_sub(last) < self.window.as_millis() as u64 {
            return;
        }
        if self
            .last_sweep_ms
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            self.evict_expired();
        }
    }

    /// Drop clients whose window has ended.
    pub fn evict_expired(&self) {
        let window = self.window;
        let before = self.clients.len();
        self.clients.retain(|_, w| w.started.elapsed() < window);
        debug!("Evicted {} expired rate-limit windows", before - self.clients.len());
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }
}
