use anyhow::Result;
use hdrhistogram::Histogram;
use std::time::Duration;

use crate::iteration::Sample;

const SIGNIFICANT_FIGURES: u8 = 3;

/// Request durations, recorded in microseconds and reported in milliseconds.
#[derive(Debug, Clone)]
pub struct Trend {
    histogram: Histogram<u64>,
}

impl Trend {
    pub fn new() -> Result<Self> {
        Ok(Self {
            histogram: Histogram::new(SIGNIFICANT_FIGURES)?,
        })
    }

    pub fn record(&mut self, duration: Duration) -> Result<()> {
        self.histogram.record(duration.as_micros() as u64)?;
        Ok(())
    }

    pub fn avg(&self) -> f64 {
        self.ms(|h| h.mean())
    }

    pub fn min(&self) -> f64 {
        self.ms(|h| h.min() as f64)
    }

    pub fn med(&self) -> f64 {
        self.percentile(50.0)
    }

    pub fn max(&self) -> f64 {
        self.ms(|h| h.max() as f64)
    }

    pub fn percentile(&self, p: f64) -> f64 {
        self.ms(|h| h.value_at_percentile(p.clamp(0.0, 100.0)) as f64)
    }

    // Empty trends report 0 for every aggregation.
    fn ms(&self, micros: impl Fn(&Histogram<u64>) -> f64) -> f64 {
        if self.histogram.is_empty() {
            0.0
        } else {
            micros(&self.histogram) / 1000.0
        }
    }
}

pub fn rate(hits: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

/// Driver-level counters that don't come from individual samples.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunStats {
    pub elapsed: Duration,
    pub dropped_iterations: u64,
    pub interrupted_iterations: u64,
    pub vus_max: usize,
}

#[derive(Debug, Clone)]
pub struct Summary {
    pub http_reqs: u64,
    pub http_reqs_per_sec: f64,
    pub http_req_failed: u64,
    /// Requests that never got a response.
    pub transport_errors: u64,
    pub http_req_duration: Trend,
    pub checks_passed: u64,
    pub checks_failed: u64,
    pub iterations: u64,
    pub dropped_iterations: u64,
    pub interrupted_iterations: u64,
    pub vus_max: usize,
    pub elapsed: Duration,
}

impl Summary {
    pub fn new(samples: &[Sample], stats: RunStats) -> Result<Self> {
        let mut http_req_duration = Trend::new()?;
        for sample in samples {
            http_req_duration.record(sample.duration)?;
        }
        let http_reqs = samples.len() as u64;
        let http_req_failed = samples.iter().filter(|s| s.failed).count() as u64;
        let checks_passed = samples.iter().filter(|s| s.check_passed).count() as u64;
        let secs = stats.elapsed.as_secs_f64();
        Ok(Self {
            http_reqs,
            http_reqs_per_sec: if secs > 0.0 {
                http_reqs as f64 / secs
            } else {
                0.0
            },
            http_req_failed,
            transport_errors: samples.iter().filter(|s| s.status.is_none()).count() as u64,
            http_req_duration,
            checks_passed,
            checks_failed: http_reqs - checks_passed,
            iterations: http_reqs,
            dropped_iterations: stats.dropped_iterations,
            interrupted_iterations: stats.interrupted_iterations,
            vus_max: stats.vus_max,
            elapsed: stats.elapsed,
        })
    }

    pub fn http_req_failed_rate(&self) -> f64 {
        rate(self.http_req_failed, self.http_reqs)
    }

    pub fn checks_rate(&self) -> f64 {
        rate(self.checks_passed, self.checks_passed + self.checks_failed)
    }
}
