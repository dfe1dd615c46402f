//! Process-wide metrics with Prometheus text exposition.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use serde::Serialize;

use crate::MetricsRecorder;

/// `Content-Type` of the text exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Upper bounds (seconds) of the latency histogram buckets.
const LATENCY_BUCKETS: [f64; 14] = [
    0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5, 10.0,
];

const REQUESTS: &str = "request_count_total";
const LATENCY: &str = "request_latency_seconds";
const UPTIME: &str = "process_uptime_seconds";

#[derive(Debug, Default)]
struct LatencyStats {
    count: u64,
    sum: f64,
    /// Non-cumulative counts per bucket; the last slot is `+Inf`.
    buckets: [u64; LATENCY_BUCKETS.len() + 1],
}

/// Point-in-time copy of the registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub latency_count: u64,
    pub latency_sum: f64,
}

/// Monotonic request counter and latency histogram. Reset only by
/// restarting the process.
pub struct PrometheusRegistry {
    requests: AtomicU64,
    latency: Mutex<LatencyStats>,
    started_at: Instant,
}

impl PrometheusRegistry {
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            latency: Mutex::new(LatencyStats::default()),
            started_at: Instant::now(),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let requests = self.requests.load(Ordering::Relaxed);
        let Ok(stats) = self.latency.lock() else {
            tracing::warn!("Failed to acquire latency lock");
            return MetricsSnapshot {
                requests,
                ..Default::default()
            };
        };
        MetricsSnapshot {
            requests,
            latency_count: stats.count,
            latency_sum: stats.sum,
        }
    }

    /// Renders every metric in the Prometheus text format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let requests = self.requests.load(Ordering::Relaxed);

        let _ = writeln!(out, "# HELP {REQUESTS} Total request count");
        let _ = writeln!(out, "# TYPE {REQUESTS} counter");
        let _ = writeln!(out, "{REQUESTS} {requests}");

        let _ = writeln!(out, "# HELP {LATENCY} Request latency");
        let _ = writeln!(out, "# TYPE {LATENCY} histogram");
        match self.latency.lock() {
            Ok(stats) => {
                let mut cumulative = 0;
                for (bound, count) in LATENCY_BUCKETS.iter().zip(stats.buckets.iter()) {
                    cumulative += count;
                    let _ = writeln!(out, "{LATENCY}_bucket{{le=\"{bound}\"}} {cumulative}");
                }
                cumulative += stats.buckets[LATENCY_BUCKETS.len()];
                let _ = writeln!(out, "{LATENCY}_bucket{{le=\"+Inf\"}} {cumulative}");
                let _ = writeln!(out, "{LATENCY}_sum {}", stats.sum);
                let _ = writeln!(out, "{LATENCY}_count {}", stats.count);
            }
            Err(_) => tracing::warn!("Failed to acquire latency lock"),
        }

        let _ = writeln!(out, "# HELP {UPTIME} Seconds since the registry was created");
        let _ = writeln!(out, "# TYPE {UPTIME} gauge");
        let _ = writeln!(out, "{UPTIME} {}", self.started_at.elapsed().as_secs_f64());

        out
    }
}

impl Default for PrometheusRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRecorder for PrometheusRegistry {
    fn inc_requests(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    fn observe_latency(&self, seconds: f64) {
        if !seconds.is_finite() || seconds < 0.0 {
            tracing::warn!(seconds, "Dropping invalid latency observation");
            return;
        }
        let Ok(mut stats) = self.latency.lock() else {
            tracing::warn!("Failed to acquire latency lock");
            return;
        };

        let slot = LATENCY_BUCKETS
            .iter()
            .position(|bound| seconds <= *bound)
            .unwrap_or(LATENCY_BUCKETS.len());
        stats.buckets[slot] += 1;
        stats.count += 1;
        stats.sum += seconds;

        tracing::debug!(seconds, count = stats.count, "Recorded latency");
    }
}
