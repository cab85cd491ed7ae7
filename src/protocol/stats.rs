//! Per-session exchange statistics

use std::collections::VecDeque;

/// Size of the rolling window for recent exchange times
const RECENT_WINDOW_SIZE: usize = 100;

/// Statistics for peek/poke exchanges
///
/// Tracks success rate, timing and throughput of a session's exchanges.
#[derive(Debug, Clone)]
pub struct ExchangeStats {
    /// Total number of successful exchanges
    pub successful: u64,
    /// Total number of failed exchanges
    pub failed: u64,
    /// Total exchange time of successful exchanges in microseconds
    pub total_time_us: u64,
    /// Last successful exchange time in microseconds
    pub last_time_us: u64,
    /// Total data bytes transferred (peeked or poked)
    pub total_bytes: u64,
    /// Minimum exchange time observed (microseconds)
    pub min_time_us: u64,
    /// Maximum exchange time observed (microseconds)
    pub max_time_us: u64,
    /// Rolling window of recent exchange times for jitter calculation
    pub recent_times: VecDeque<u64>,
}

impl Default for ExchangeStats {
    fn default() -> Self {
        Self {
            successful: 0,
            failed: 0,
            total_time_us: 0,
            last_time_us: 0,
            total_bytes: 0,
            min_time_us: u64::MAX,
            max_time_us: 0,
            recent_times: VecDeque::with_capacity(RECENT_WINDOW_SIZE),
        }
    }
}

impl ExchangeStats {
    /// Average successful exchange time in microseconds
    pub fn avg_time_us(&self) -> f64 {
        if self.successful == 0 {
            0.0
        } else {
            self.total_time_us as f64 / self.successful as f64
        }
    }

    /// Success rate as percentage
    pub fn success_rate(&self) -> f64 {
        let total = self.successful + self.failed;
        if total == 0 {
            100.0
        } else {
            (self.successful as f64 / total as f64) * 100.0
        }
    }

    pub fn record_success(&mut self, time_us: u64, bytes: u64) {
        self.successful += 1;
        self.total_time_us += time_us;
        self.last_time_us = time_us;
        self.total_bytes += bytes;
        self.min_time_us = self.min_time_us.min(time_us);
        self.max_time_us = self.max_time_us.max(time_us);

        self.recent_times.push_back(time_us);
        if self.recent_times.len() > RECENT_WINDOW_SIZE {
            self.recent_times.pop_front();
        }
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    /// Jitter (max - min) over the recent window in microseconds
    pub fn jitter_us(&self) -> u64 {
        let min = self.recent_times.iter().min().copied().unwrap_or(0);
        let max = self.recent_times.iter().max().copied().unwrap_or(0);
        max.saturating_sub(min)
    }

    /// Sample standard deviation of recent exchange times in microseconds
    pub fn stddev_us(&self) -> f64 {
        if self.recent_times.len() < 2 {
            return 0.0;
        }
        let mean =
            self.recent_times.iter().sum::<u64>() as f64 / self.recent_times.len() as f64;
        let variance = self
            .recent_times
            .iter()
            .map(|&t| (t as f64 - mean).powi(2))
            .sum::<f64>()
            / (self.recent_times.len() - 1) as f64;
        variance.sqrt()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
