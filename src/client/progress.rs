use crate::client::constants::*;
use crate::client::error::{ClientError, Result};
use colored::*;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

/// Progress bar with live latency statistics
pub struct ProgressTracker {
    pb: ProgressBar,
    last_update: Instant,
    update_interval: usize,
}

impl ProgressTracker {
    /// Create a new progress tracker; `quiet` hides it entirely
    pub fn new(call_count: usize, update_interval: usize, quiet: bool) -> Result<Self> {
        let pb = ProgressBar::new(call_count as u64);
        if quiet {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        } else {
            pb.set_style(
                ProgressStyle::with_template(
                    "{msg}\n{bar:40.cyan/blue} {pos:>7}/{len:7} [{elapsed_precise}]",
                )
                .map_err(|e| {
                    ClientError::Measurement(format!("Failed to create progress style: {}", e))
                })?
                .progress_chars("█░"),
            );
            pb.enable_steady_tick(Duration::from_millis(PROGRESS_TICK_INTERVAL_MS));
        }

        Ok(Self {
            pb,
            last_update: Instant::now(),
            update_interval: update_interval.max(1),
        })
    }

    /// Advance by one call and refresh live statistics when due
    pub fn update(&mut self, latencies: &[u64], start_time: Instant, call_index: usize) -> Result<()> {
        self.pb.inc(1);

        if self.pb.is_hidden() {
            return Ok(());
        }

        if (call_index + 1) % self.update_interval == 0
            || self.last_update.elapsed().as_millis() > LIVE_STATS_UPDATE_INTERVAL_MS as u128
        {
            if !latencies.is_empty() {
                self.update_live_stats(latencies, start_time)?;
            }
            self.last_update = Instant::now();
        }

        Ok(())
    }

    fn update_live_stats(&self, latencies: &[u64], start_time: Instant) -> Result<()> {
        let last = latencies
            .last()
            .ok_or_else(|| ClientError::Measurement("No latencies available".into()))?;
        let mean = latencies.iter().sum::<u64>() as f64 / latencies.len() as f64;

        // Quick p99 estimate for live feedback
        let mut sorted = latencies.to_vec();
        sorted.sort_unstable();
        let p99_idx = ((sorted.len() as f64 * 0.99) as usize).min(sorted.len() - 1);
        let p99 = sorted[p99_idx];

        let elapsed = start_time.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            latencies.len() as f64 / elapsed
        } else {
            0.0
        };

        let last_ms = *last as f64 / 1_000_000.0;
        let mean_ms = mean / 1_000_000.0;
        let p99_ms = p99 as f64 / 1_000_000.0;

        let lines = [
            format!("→ {}ms", colorize_latency(last_ms)),
            format!("Mean: {}ms", colorize_latency(mean_ms)),
            format!("P99: {:.3}ms", p99_ms),
            format!("Rate: {:.1}k calls/s", rate / 1000.0),
        ];

        self.pb.set_message(lines.join("\n"));
        Ok(())
    }

    pub fn finish(&mut self) {
        self.pb.finish();
    }

    /// Final update of statistics before finishing
    pub fn final_update(&mut self, latencies: &[u64], start_time: Instant) -> Result<()> {
        if !latencies.is_empty() && !self.pb.is_hidden() {
            self.update_live_stats(latencies, start_time)?;
        }
        Ok(())
    }
}

fn colorize_latency(ms: f64) -> ColoredString {
    let text = format!("{:.3}", ms);
    if ms < EXCELLENT_LATENCY_MS {
        text.green()
    } else if ms < ACCEPTABLE_LATENCY_MS {
        text.yellow()
    } else {
        text.red()
    }
}
