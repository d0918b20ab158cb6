//! Prometheus metrics for monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Metrics collector.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Total envelopes processed
    pub requests_total: AtomicU64,
    /// Envelopes answered with a result
    pub requests_success: AtomicU64,
    /// Envelopes answered with an error
    pub requests_failed: AtomicU64,
    /// tools/call invocations that reached a tool
    pub tool_calls: AtomicU64,
    /// Calls refused by the rate limiter
    pub rate_limited: AtomicU64,
    /// Response bytes received from upstreams
    pub bytes_fetched: AtomicU64,
}

impl Metrics {
    /// Create a new metrics collector.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_requests(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_success(&self) {
        self.requests_success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_tool_calls(&self) {
        self.tool_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_fetched(&self, bytes: u64) {
        self.bytes_fetched.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Get all metrics as a snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            requests_success: self.requests_success.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            tool_calls: self.tool_calls.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            bytes_fetched: self.bytes_fetched.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let s = self.snapshot();
        format!(
            r#"# HELP mcp_fetch_requests_total Total number of JSON-RPC requests
# TYPE mcp_fetch_requests_total counter
mcp_fetch_requests_total {}

# HELP mcp_fetch_requests_success Requests answered with a result
# TYPE mcp_fetch_requests_success counter
mcp_fetch_requests_success {}

# HELP mcp_fetch_requests_failed Requests answered with an error
# TYPE mcp_fetch_requests_failed counter
mcp_fetch_requests_failed {}

# HELP mcp_fetch_tool_calls Tool invocations
# TYPE mcp_fetch_tool_calls counter
mcp_fetch_tool_calls {}

# HELP mcp_fetch_rate_limited Calls rejected by the rate limiter
# TYPE mcp_fetch_rate_limited counter
mcp_fetch_rate_limited {}

# HELP mcp_fetch_bytes_fetched Response bytes received from upstreams
# TYPE mcp_fetch_bytes_fetched counter
mcp_fetch_bytes_fetched {}
"#,
            s.requests_total,
            s.requests_success,
            s.requests_failed,
            s.tool_calls,
            s.rate_limited,
            s.bytes_fetched
        )
    }
}

/// Metrics snapshot.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub requests_success: u64,
    pub requests_failed: u64,
    pub tool_calls: u64,
    pub rate_limited: u64,
    pub bytes_fetched: u64,
}

/// Timer for measuring durations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Get elapsed time in seconds.
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}
