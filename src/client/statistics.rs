use crate::client::constants::*;
use crate::client::error::{ClientError, Result};
use hdrhistogram::Histogram;
use tracing::{debug, warn};

/// Call latency statistics backed by an HDR histogram.
///
/// Samples outside the histogram bounds are clamped when recorded, but the
/// real extremes are kept so min and max stay exact.
pub struct Statistics {
    hist: Histogram<u64>,
    min_ns: Option<u64>,
    max_ns: u64,
    clamped: usize,
}

/// Percentile snapshot in nanoseconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySummary {
    pub mean: f64,
    pub min: u64,
    pub max: u64,
    pub p50: u64,
    pub p90: u64,
    pub p99: u64,
    pub p999: u64,
}

impl Statistics {
    /// Empty statistics ready for recording
    pub fn empty() -> Result<Self> {
        let hist = Histogram::<u64>::new_with_bounds(
            HISTOGRAM_LOW_BOUND_NS,
            HISTOGRAM_HIGH_BOUND_NS,
            HISTOGRAM_SIGNIFICANT_DIGITS,
        )
        .map_err(|e| ClientError::Measurement(format!("Failed to create histogram: {}", e)))?;

        Ok(Self {
            hist,
            min_ns: None,
            max_ns: 0,
            clamped: 0,
        })
    }

    /// Build statistics from a batch of call latencies
    pub fn new(latencies: &[u64]) -> Result<Self> {
        let mut stats = Self::empty()?;
        for &latency_ns in latencies {
            stats.record(latency_ns)?;
        }

        if stats.clamped > 0 {
            warn!(
                clamped_count = stats.clamped,
                total_count = latencies.len(),
                "Some call latencies fell outside the histogram bounds"
            );
        }
        debug!(
            samples = latencies.len(),
            min_ns = stats.min(),
            max_ns = stats.max(),
            "Call latency statistics built"
        );

        Ok(stats)
    }

    /// Record one latency sample in nanoseconds
    pub fn record(&mut self, latency_ns: u64) -> Result<()> {
        self.min_ns = Some(self.min_ns.map_or(latency_ns, |min| min.min(latency_ns)));
        self.max_ns = self.max_ns.max(latency_ns);

        let bounded = latency_ns.clamp(HISTOGRAM_LOW_BOUND_NS, HISTOGRAM_HIGH_BOUND_NS);
        if bounded != latency_ns {
            self.clamped += 1;
        }

        self.hist.record(bounded).map_err(|e| {
            ClientError::Measurement(format!("Failed to record latency {}: {}", latency_ns, e))
        })
    }

    pub fn mean(&self) -> f64 {
        self.hist.mean()
    }

    /// Smallest recorded latency, 0 when nothing was recorded
    pub fn min(&self) -> u64 {
        self.min_ns.unwrap_or(0)
    }

    pub fn max(&self) -> u64 {
        self.max_ns
    }

    pub fn percentile(&self, quantile: f64) -> u64 {
        self.hist.value_at_quantile(quantile)
    }

    /// Number of samples that had to be clamped into the histogram bounds
    pub fn clamped_count(&self) -> usize {
        self.clamped
    }

    pub fn count(&self) -> u64 {
        self.hist.len()
    }

    pub fn summary(&self) -> LatencySummary {
        LatencySummary {
            mean: self.mean(),
            min: self.min(),
            max: self.max(),
            p50: self.percentile(0.5),
            p90: self.percentile(0.9),
            p99: self.percentile(0.99),
            p999: self.percentile(0.999),
        }
    }

    /// Whether the mean call latency is under the pass threshold
    pub fn passes(&self) -> bool {
        self.count() > 0 && self.mean() / 1_000_000.0 < PASS_THRESHOLD_MS
    }
}
