//! Latency measurement
//!
//! Turn latency is wall-clock from submission to the reply being complete.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Measures elapsed time from a fixed start
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    start: Instant,
}

impl Stopwatch {
    /// Start a new stopwatch
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed time since start
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Get elapsed time in milliseconds
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// Sliding window of recent turn latencies
#[derive(Debug)]
pub struct LatencyTracker {
    samples: VecDeque<u64>,
    max_samples: usize,
}

impl LatencyTracker {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(1),
        }
    }

    pub fn record(&mut self, latency_ms: u64) {
        if self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(latency_ms);
    }

    pub fn average_ms(&self) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<u64>() / self.samples.len() as u64)
    }

    /// 95th percentile of the window
    pub fn p95_ms(&self) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted: Vec<u64> = self.samples.iter().copied().collect();
        sorted.sort_unstable();
        let idx = ((sorted.len() as f32 * 0.95) as usize).min(sorted.len() - 1);
        Some(sorted[idx])
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }

    pub fn summary(&self) -> String {
        match (self.average_ms(), self.p95_ms()) {
            (Some(avg), Some(p95)) => {
                format!("{} turns | avg {}ms | p95 {}ms", self.count(), avg, p95)
            }
            _ => "no turns yet".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_tracker_window() {
        let mut tracker = LatencyTracker::new(3);
        for ms in [10, 20, 30, 40, 50] {
            tracker.record(ms);
        }

        assert_eq!(tracker.count(), 3);
        assert_eq!(tracker.average_ms(), Some(40));
        assert_eq!(tracker.p95_ms(), Some(50));
    }

    #[test]
    fn test_empty_tracker() {
        let tracker = LatencyTracker::new(10);
        assert_eq!(tracker.average_ms(), None);
        assert_eq!(tracker.summary(), "no turns yet");
    }

    #[test]
    fn test_stopwatch() {
        let sw = Stopwatch::start();
        std::thread::sleep(Duration::from_millis(10));
        assert!(sw.elapsed() >= Duration::from_millis(10));
        assert!(sw.elapsed_ms() >= 10);
    }
}
