use crate::client::constants::PASS_THRESHOLD_MS;
use crate::client::error::Result;
use crate::client::measurement::MeasurementResult;
use crate::client::statistics::Statistics;
use colored::*;
use tracing::{debug, info, warn};

/// Prints the benchmark summary to stdout
pub struct Reporter;

const HISTOGRAM_BAR_WIDTH: usize = 30;
const OUTLIER_THRESHOLD_US: f64 = 10_000.0;

// Buckets past this index are only printed when non-empty
const EMPTY_BUCKET_SKIP_THRESHOLD: usize = 4;

const HIGH_PERCENTAGE_THRESHOLD: f64 = 50.0;
const MEDIUM_PERCENTAGE_THRESHOLD: f64 = 10.0;

const LOW_PERCENTAGE_THRESHOLD: f64 = 0.1;
const MEDIUM_PRECISION_THRESHOLD: f64 = 1.0;

const LABEL_WIDTH: usize = 12;

/// Latency buckets in microseconds, upper bound exclusive
const BUCKETS: [(f64, f64, &str); 8] = [
    (0.0, 50.0, "0-50 µs"),
    (50.0, 100.0, "50-100 µs"),
    (100.0, 200.0, "100-200 µs"),
    (200.0, 500.0, "200-500 µs"),
    (500.0, 1000.0, "500µs-1ms"),
    (1000.0, 2000.0, "1-2 ms"),
    (2000.0, 5000.0, "2-5 ms"),
    (5000.0, 10000.0, "5-10 ms"),
];

impl Reporter {
    /// Renders a bar scaled against the largest bucket.
    ///
    /// Buckets too small for a full block get a partial block, so every
    /// non-empty bucket stays visible.
    fn render_bar_from_percentage(
        percentage: f64,
        max_percentage: f64,
        bar_width: usize,
    ) -> String {
        if percentage <= 0.0 {
            return String::new();
        }

        let bar_length_fractional = if max_percentage > 0.0 {
            (percentage / max_percentage) * bar_width as f64
        } else {
            0.0
        };
        let bar_length = bar_length_fractional as usize;

        if bar_length >= 1 {
            "█".repeat(bar_length.min(bar_width))
        } else {
            let partial = match bar_length_fractional.fract() {
                f if f >= 0.875 => "▉",
                f if f >= 0.75 => "▊",
                f if f >= 0.625 => "▋",
                f if f >= 0.5 => "▌",
                f if f >= 0.375 => "▍",
                f if f >= 0.25 => "▎",
                _ => "▏",
            };
            partial.to_string()
        }
    }

    /// Smaller percentages get more decimal places
    fn format_percentage(percentage: f64) -> String {
        if percentage < LOW_PERCENTAGE_THRESHOLD {
            format!("{:5.3}%", percentage)
        } else if percentage < MEDIUM_PRECISION_THRESHOLD {
            format!("{:5.2}%", percentage)
        } else {
            format!("{:5.1}%", percentage)
        }
    }

    fn format_count(count: usize) -> String {
        if count >= 1000 {
            format!("{:>6}k", count / 1000)
        } else {
            format!("{:>7}", count)
        }
    }

    /// Pads before colouring so ANSI codes don't break alignment
    fn colorize_label(label: &str, percentage: f64) -> String {
        let padded_label = format!("{:>width$}", label, width = LABEL_WIDTH);
        if percentage > HIGH_PERCENTAGE_THRESHOLD {
            padded_label.green().to_string()
        } else if percentage > MEDIUM_PERCENTAGE_THRESHOLD {
            padded_label.cyan().to_string()
        } else {
            padded_label
        }
    }

    /// Count samples per bucket, plus the outliers above 10 ms
    fn bucket_counts(latencies: &[u64]) -> (Vec<usize>, usize) {
        let mut counts = vec![0usize; BUCKETS.len()];
        let mut outliers = 0usize;

        for &latency_ns in latencies {
            let latency_us = latency_ns as f64 / 1000.0;
            match BUCKETS
                .iter()
                .position(|&(min, max, _)| latency_us >= min && latency_us < max)
            {
                Some(i) => counts[i] += 1,
                None if latency_us >= OUTLIER_THRESHOLD_US => outliers += 1,
                None => {}
            }
        }

        (counts, outliers)
    }

    /// Print the complete results summary
    pub fn print_results(&self, stats: &Statistics, result: &MeasurementResult) -> Result<()> {
        debug!(
            calls_acknowledged = stats.count(),
            calls_failed = result.failed_calls,
            total_calls = result.total_calls,
            "Printing measurement results"
        );
        if stats.count() == 0 {
            warn!("No successful calls recorded");
            println!("{}\n", "No successful calls recorded.".red());
            println!("{}", "✗ FAIL: No data to analyze".red().bold());
            return Ok(());
        }

        let mean_ms = stats.mean() / 1_000_000.0;
        let failure_pct = (result.failed_calls as f64 / result.total_calls as f64) * 100.0;

        println!("\n{}", "┌─────────────────────────────┐".cyan());
        println!("{}", "│  unpack_data Results        │".cyan());
        println!("{}", "└─────────────────────────────┘".cyan());
        println!();

        let elapsed_secs = result.elapsed.as_secs_f64();
        let throughput = if elapsed_secs > 0.0 {
            result.total_calls as f64 / elapsed_secs
        } else {
            0.0
        };

        println!(
            "Calls:    {} made, {} failed ({:.2}%)",
            result.total_calls, result.failed_calls, failure_pct
        );
        println!("          └─ Faults and timeouts count as failed calls");
        println!();
        println!("Duration: {:.2}s", elapsed_secs);
        println!(
            "          └─ {:.1}k calls/second over one keep-alive connection",
            throughput / 1000.0
        );
        println!();

        println!("Call Latency (request sent to response parsed):");
        let summary = stats.summary();
        let rows = [
            ("Mean", summary.mean, "Average latency"),
            ("Min", summary.min as f64, "Fastest call"),
            ("Max", summary.max as f64, "Slowest call"),
            ("P50", summary.p50 as f64, "Median"),
            ("P90", summary.p90 as f64, "90% of calls are faster"),
            ("P99", summary.p99 as f64, "99% of calls are faster"),
            ("P99.9", summary.p999 as f64, "99.9% of calls are faster"),
        ];
        for (label, value_ns, note) in rows {
            println!(
                "  {:<10} {:>8.1} µs  ← {}",
                format!("{}:", label),
                value_ns / 1000.0,
                note
            );
        }

        if stats.clamped_count() > 0 {
            println!();
            println!(
                "  ⚠ Note: {} measurement(s) exceeded histogram bounds and were clamped",
                stats.clamped_count()
            );
        }
        println!();

        self.print_bucket_distribution(&result.latencies, result.total_calls)?;
        println!();

        let passed = stats.passes();
        let verdict = if passed {
            format!(
                "✓ PASS: Mean latency ({:.3}ms) is below {}ms threshold",
                mean_ms, PASS_THRESHOLD_MS
            )
            .green()
            .bold()
        } else {
            format!(
                "✗ FAIL: Mean latency ({:.3}ms) exceeds {}ms threshold",
                mean_ms, PASS_THRESHOLD_MS
            )
            .red()
            .bold()
        };

        println!("{}", verdict);
        info!(mean_latency_ms = mean_ms, passed = passed, "Results reported");

        Ok(())
    }

    /// Print bucket distribution of latencies
    pub fn print_bucket_distribution(&self, latencies: &[u64], total_calls: usize) -> Result<()> {
        println!("Latency Distribution (calls by range):");
        println!();

        let total = total_calls.max(1) as f64;
        let (counts, outliers) = Self::bucket_counts(latencies);
        let percentages: Vec<f64> = counts.iter().map(|&c| c as f64 / total * 100.0).collect();
        let max_percentage = percentages.iter().fold(0.0f64, |a, &b| a.max(b));

        for (i, &(_, _, label)) in BUCKETS.iter().enumerate() {
            let count = counts[i];
            if count == 0 && i > EMPTY_BUCKET_SKIP_THRESHOLD {
                continue;
            }

            let percentage = percentages[i];
            println!(
                "  {}:  {:30} {} ({:7} calls)",
                Self::colorize_label(label, percentage),
                Self::render_bar_from_percentage(percentage, max_percentage, HISTOGRAM_BAR_WIDTH),
                Self::format_percentage(percentage),
                Self::format_count(count)
            );
        }

        if outliers > 0 {
            let percentage = outliers as f64 / total * 100.0;
            let max_ms = latencies.iter().copied().max().unwrap_or(0) as f64 / 1_000_000.0;
            let outlier_label = format!("{:>width$}", ">10 ms", width = LABEL_WIDTH);

            println!(
                "  {}:  {:30} {} ({:7} calls) ← MAX: {:.1}ms",
                outlier_label.red().bold(),
                Self::render_bar_from_percentage(percentage, max_percentage, HISTOGRAM_BAR_WIDTH),
                Self::format_percentage(percentage),
                Self::format_count(outliers),
                max_ms
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn result(latencies: Vec<u64>, failed_calls: usize) -> MeasurementResult {
        MeasurementResult {
            total_calls: latencies.len() + failed_calls,
            latencies,
            failed_calls,
            elapsed: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_reporter_print_results_empty() -> Result<()> {
        let stats = Statistics::new(&[])?;
        Reporter.print_results(&stats, &result(Vec::new(), 10))?;
        Ok(())
    }

    #[test]
    fn test_reporter_print_results_with_data() -> Result<()> {
        let run = result(vec![40_000, 80_000, 150_000, 300_000, 12_000_000], 1);
        let stats = Statistics::new(&run.latencies)?;
        Reporter.print_results(&stats, &run)?;
        Ok(())
    }

    #[test]
    fn test_bucket_counts() {
        let latencies = vec![
            10_000,     // 10 µs
            50_000,     // 50 µs, lower bound is inclusive
            99_999,     // just under 100 µs
            750_000,    // 750 µs
            25_000_000, // 25 ms
        ];

        let (counts, outliers) = Reporter::bucket_counts(&latencies);
        assert_eq!(counts[0], 1);
        assert_eq!(counts[1], 2);
        assert_eq!(counts[4], 1);
        assert_eq!(outliers, 1);
    }

    #[test]
    fn test_render_bar_scales_to_max() {
        assert_eq!(Reporter::render_bar_from_percentage(0.0, 50.0, 30), "");
        assert_eq!(
            Reporter::render_bar_from_percentage(50.0, 50.0, 30).chars().count(),
            30
        );
        assert_eq!(Reporter::render_bar_from_percentage(0.1, 50.0, 30), "▏");
    }

    #[test]
    fn test_reporter_format_count() {
        assert_eq!(Reporter::format_count(100), "    100");
        assert_eq!(Reporter::format_count(1000), "     1k");
        assert_eq!(Reporter::format_count(5000), "     5k");
    }
}
