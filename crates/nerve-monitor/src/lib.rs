//! Request metrics for nerve.
//!
//! Handlers talk to a [`MetricsRecorder`]: one counter increment per request
//! and one latency observation per model call. [`PrometheusRegistry`] keeps
//! these process-wide and renders them for scraping.

mod registry;

pub use registry::{MetricsSnapshot, PrometheusRegistry, CONTENT_TYPE};

use std::time::{Duration, Instant};

/// Sink for request metrics.
pub trait MetricsRecorder: Send + Sync {
    /// Count one request.
    fn inc_requests(&self);
    /// Record the duration of one timed call.
    fn observe_latency(&self, seconds: f64);
}

/// Measures one call and reports it to a recorder exactly once.
///
/// The observation happens on [`LatencyTimer::stop`], or on drop if the
/// timer was never stopped (early return, `?`, panic unwinding).
pub struct LatencyTimer<'a> {
    recorder: &'a dyn MetricsRecorder,
    started: Instant,
    observed: bool,
}

impl<'a> LatencyTimer<'a> {
    pub fn start(recorder: &'a dyn MetricsRecorder) -> Self {
        Self {
            recorder,
            started: Instant::now(),
            observed: false,
        }
    }

    /// Stops the timer, records the elapsed time and returns it.
    pub fn stop(mut self) -> Duration {
        self.observe()
    }

    fn observe(&mut self) -> Duration {
        let elapsed = self.started.elapsed();
        if !self.observed {
            self.observed = true;
            self.recorder.observe_latency(elapsed.as_secs_f64());
        }
        elapsed
    }
}

impl Drop for LatencyTimer<'_> {
    fn drop(&mut self) {
        self.observe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        requests: Mutex<u32>,
        latencies: Mutex<Vec<f64>>,
    }

    impl MetricsRecorder for Recording {
        fn inc_requests(&self) {
            *self.requests.lock().unwrap() += 1;
        }

        fn observe_latency(&self, seconds: f64) {
            self.latencies.lock().unwrap().push(seconds);
        }
    }

    #[test]
    fn test_timer_stop_observes_once() {
        let recorder = Recording::default();
        let elapsed = LatencyTimer::start(&recorder).stop();

        let latencies = recorder.latencies.lock().unwrap();
        assert_eq!(latencies.len(), 1);
        assert_eq!(latencies[0], elapsed.as_secs_f64());
    }

    #[test]
    fn test_timer_observes_on_drop() {
        let recorder = Recording::default();
        {
            let _timer = LatencyTimer::start(&recorder);
        }
        assert_eq!(recorder.latencies.lock().unwrap().len(), 1);
        assert_eq!(*recorder.requests.lock().unwrap(), 0);
    }
}
