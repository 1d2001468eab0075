//! Server call statistics with minimal impact on the request path

use crate::server::error::{Result, ServerError};
use hdrhistogram::Histogram;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Histogram lower bound in microseconds
const HISTOGRAM_LOW_BOUND_US: u64 = 1;

/// Histogram upper bound in microseconds (one minute)
const HISTOGRAM_HIGH_BOUND_US: u64 = 60_000_000;

/// Histogram significant digits for precision
const HISTOGRAM_SIGNIFICANT_DIGITS: u8 = 3;

type SharedHistogram = Arc<Mutex<Histogram<u64>>>;

/// Monitor for tracking call statistics.
///
/// Counters are atomics. Histograms sit behind their own mutexes, which are
/// held only for a single record or quantile lookup.
pub struct ServerMonitor {
    calls: Arc<AtomicU64>,
    faults: Arc<AtomicU64>,
    connections: Arc<AtomicU64>,
    gaps: SharedHistogram,
    execution: SharedHistogram,
    start_time: Instant,
    report_interval: Option<Duration>,
}

impl ServerMonitor {
    /// Create a new server monitor.
    ///
    /// # Arguments
    ///
    /// * `report_interval` - Interval between summary log lines, `None` disables them
    pub fn new(report_interval: Option<Duration>) -> Result<Self> {
        Ok(Self {
            calls: Arc::new(AtomicU64::new(0)),
            faults: Arc::new(AtomicU64::new(0)),
            connections: Arc::new(AtomicU64::new(0)),
            gaps: new_histogram()?,
            execution: new_histogram()?,
            start_time: Instant::now(),
            report_interval,
        })
    }

    /// Get counters for use by connection threads and handlers.
    pub fn counters(&self) -> ServerCounters {
        ServerCounters {
            calls: Arc::clone(&self.calls),
            faults: Arc::clone(&self.faults),
            connections: Arc::clone(&self.connections),
            gaps: Arc::clone(&self.gaps),
            execution: Arc::clone(&self.execution),
        }
    }

    /// Start the background reporting thread.
    ///
    /// Logs a summary every interval in which at least one call arrived.
    /// Does nothing when reporting is disabled.
    pub fn start_reporting(&self) {
        let Some(interval) = self.report_interval else {
            return;
        };
        let counters = self.counters();

        thread::spawn(move || {
            let mut last_calls = 0u64;
            loop {
                thread::sleep(interval);

                let stats = counters.snapshot();
                if stats.calls == last_calls {
                    continue;
                }
                last_calls = stats.calls;

                info!(
                    calls = stats.calls,
                    faults = stats.faults,
                    connections = stats.connections,
                    gap_p50_us = stats.gap_p50_us,
                    gap_p99_us = stats.gap_p99_us,
                    exec_p50_us = stats.exec_p50_us,
                    exec_p99_us = stats.exec_p99_us,
                    "Call statistics"
                );
            }
        });
    }

    /// Get current statistics.
    pub fn stats(&self) -> ServerStats {
        ServerStats {
            elapsed: self.start_time.elapsed(),
            ..self.counters().snapshot()
        }
    }
}

/// Lightweight handles for updating statistics from connection threads.
#[derive(Clone)]
pub struct ServerCounters {
    calls: Arc<AtomicU64>,
    faults: Arc<AtomicU64>,
    connections: Arc<AtomicU64>,
    gaps: SharedHistogram,
    execution: SharedHistogram,
}

impl ServerCounters {
    /// Increment the dispatched calls counter.
    #[inline]
    pub fn increment_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the fault responses counter.
    #[inline]
    pub fn increment_fault(&self) {
        self.faults.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the accepted connections counter.
    #[inline]
    pub fn increment_connection(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the gap between the starts of two successive calls.
    pub fn record_gap(&self, gap: Duration) {
        record(&self.gaps, gap);
    }

    /// Record how long one dispatch took.
    pub fn record_execution(&self, elapsed: Duration) {
        record(&self.execution, elapsed);
    }

    fn snapshot(&self) -> ServerStats {
        let (gap_p50_us, gap_p99_us) = percentiles(&self.gaps);
        let (exec_p50_us, exec_p99_us) = percentiles(&self.execution);
        ServerStats {
            calls: self.calls.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
            connections: self.connections.load(Ordering::Relaxed),
            gap_p50_us,
            gap_p99_us,
            exec_p50_us,
            exec_p99_us,
            elapsed: Duration::ZERO,
        }
    }
}

/// Server statistics snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerStats {
    pub calls: u64,
    pub faults: u64,
    pub connections: u64,
    pub gap_p50_us: u64,
    pub gap_p99_us: u64,
    pub exec_p50_us: u64,
    pub exec_p99_us: u64,
    pub elapsed: Duration,
}

fn new_histogram() -> Result<SharedHistogram> {
    let histogram = Histogram::new_with_bounds(
        HISTOGRAM_LOW_BOUND_US,
        HISTOGRAM_HIGH_BOUND_US,
        HISTOGRAM_SIGNIFICANT_DIGITS,
    )
    .map_err(|e| ServerError::Monitor(format!("Failed to create histogram: {}", e)))?;
    Ok(Arc::new(Mutex::new(histogram)))
}

fn record(histogram: &SharedHistogram, duration: Duration) {
    let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
    let clamped = micros.clamp(HISTOGRAM_LOW_BOUND_US, HISTOGRAM_HIGH_BOUND_US);
    let mut histogram = histogram.lock().unwrap_or_else(PoisonError::into_inner);
    if let Err(e) = histogram.record(clamped) {
        warn!(value_us = clamped, error = %e, "Failed to record histogram value");
    }
}

fn percentiles(histogram: &SharedHistogram) -> (u64, u64) {
    let histogram = histogram.lock().unwrap_or_else(PoisonError::into_inner);
    if histogram.len() == 0 {
        return (0, 0);
    }
    (
        histogram.value_at_quantile(0.5),
        histogram.value_at_quantile(0.99),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_creation() {
        let monitor = ServerMonitor::new(Some(Duration::from_secs(1))).unwrap();
        assert_eq!(monitor.report_interval, Some(Duration::from_secs(1)));
        assert_eq!(monitor.stats().calls, 0);
    }

    #[test]
    fn test_counters() {
        let monitor = ServerMonitor::new(None).unwrap();
        let counters = monitor.counters();

        counters.increment_call();
        counters.increment_call();
        counters.increment_fault();
        counters.increment_connection();

        let stats = monitor.stats();
        assert_eq!(stats.calls, 2);
        assert_eq!(stats.faults, 1);
        assert_eq!(stats.connections, 1);
    }

    #[test]
    fn test_histograms_record_microseconds() {
        let monitor = ServerMonitor::new(None).unwrap();
        let counters = monitor.counters();

        for _ in 0..100 {
            counters.record_gap(Duration::from_micros(250));
            counters.record_execution(Duration::from_micros(10));
        }

        let stats = monitor.stats();
        assert!((249..=251).contains(&stats.gap_p50_us));
        assert!((9..=11).contains(&stats.exec_p99_us));
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let monitor = ServerMonitor::new(None).unwrap();
        let counters = monitor.counters();

        counters.record_gap(Duration::ZERO);
        counters.record_gap(Duration::from_secs(3600));

        let stats = monitor.stats();
        assert!(stats.gap_p50_us >= HISTOGRAM_LOW_BOUND_US);
        assert!(stats.gap_p99_us <= HISTOGRAM_HIGH_BOUND_US + HISTOGRAM_HIGH_BOUND_US / 1000);
    }

    #[test]
    fn test_counter_performance() {
        let monitor = ServerMonitor::new(None).unwrap();
        let counters = monitor.counters();

        let start = Instant::now();
        for _ in 0..1_000_000 {
            counters.increment_call();
        }
        let elapsed = start.elapsed();

        // Should complete in well under a second (plain atomic increments)
        assert!(elapsed.as_millis() < 1000);
        assert_eq!(monitor.stats().calls, 1_000_000);
    }
}
