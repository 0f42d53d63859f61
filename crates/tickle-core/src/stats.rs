use crate::outcome::{RequestOutcome, Symbol};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Number of 1ms latency buckets; slower requests land in the last one.
const LATENCY_BUCKETS: usize = 10_000;

/// Outcome counters with an integer latency histogram.
#[derive(Debug, Clone)]
pub struct StatsCollector {
    pub total: u64,
    pub ok: u64,
    pub errors: u64,
    /// Non-200 responses indexed by leading status digit.
    pub by_class: [u64; 10],
    latency_buckets: Vec<u64>,
    start_time: Instant,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            total: 0,
            ok: 0,
            errors: 0,
            by_class: [0; 10],
            latency_buckets: vec![0; LATENCY_BUCKETS],
            start_time: Instant::now(),
        }
    }

    pub fn record(&mut self, outcome: &RequestOutcome) {
        self.total += 1;
        match outcome.symbol() {
            Symbol::Ok => self.ok += 1,
            Symbol::Error => self.errors += 1,
            Symbol::Status(digit) => {
                if let Some(idx) = digit.to_digit(10) {
                    self.by_class[idx as usize] += 1;
                }
            }
        }
        // Transport errors have no meaningful latency.
        if outcome.symbol() != Symbol::Error {
            self.record_latency(outcome.elapsed);
        }
    }

    fn record_latency(&mut self, latency: Duration) {
        let latency_ms = latency.as_millis().min((LATENCY_BUCKETS - 1) as u128) as usize;
        self.latency_buckets[latency_ms] += 1;
    }

    /// Percentile from the histogram, in whole milliseconds.
    pub fn percentile(&self, p: u64) -> u64 {
        let total: u64 = self.latency_buckets.iter().sum();
        if total == 0 {
            return 0;
        }

        let target = ((total * p) / 100).max(1);
        let mut cumulative = 0u64;

        for (bucket_idx, &count) in self.latency_buckets.iter().enumerate() {
            cumulative += count;
            if cumulative >= target {
                return bucket_idx as u64;
            }
        }

        self.latency_buckets.len() as u64
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    pub fn summary(&self) -> RunSummary {
        let elapsed_ms = self.elapsed_ms();
        RunSummary {
            total: self.total,
            ok: self.ok,
            informational: self.by_class[1],
            other_2xx: self.by_class[2],
            redirects: self.by_class[3],
            client_errors: self.by_class[4],
            server_errors: self.by_class[5],
            transport_errors: self.errors,
            latency_p50_ms: self.percentile(50),
            latency_p95_ms: self.percentile(95),
            latency_p99_ms: self.percentile(99),
            elapsed_ms,
            requests_per_sec: if elapsed_ms > 0 {
                (self.total * 1000) / elapsed_ms
            } else {
                0
            },
        }
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: u64,
    pub ok: u64,
    pub informational: u64,
    pub other_2xx: u64,
    pub redirects: u64,
    pub client_errors: u64,
    pub server_errors: u64,
    pub transport_errors: u64,
    pub latency_p50_ms: u64,
    pub latency_p95_ms: u64,
    pub latency_p99_ms: u64,
    pub elapsed_ms: u64,
    pub requests_per_sec: u64,
}
