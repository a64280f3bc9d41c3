// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-process metrics for diagnostics.
//!
//! Tool latency and success per tool name, latency histograms per named
//! operation (model calls, phases), and a running token counter.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;

/// Global metrics instance.
pub static GLOBAL_METRICS: Lazy<Metrics> = Lazy::new(Metrics::new);

/// Central metrics collection.
#[derive(Debug)]
pub struct Metrics {
    tools: RwLock<BTreeMap<String, ToolMetrics>>,
    operations: RwLock<BTreeMap<String, OperationMetrics>>,
    tokens: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(BTreeMap::new()),
            operations: RwLock::new(BTreeMap::new()),
            tokens: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a tool execution.
    pub fn record_tool(&self, name: &str, duration: Duration, success: bool) {
        self.tools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_default()
            .record(duration, success);
    }

    /// Record a named operation.
    pub fn record_operation(&self, name: &str, duration: Duration) {
        self.operations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_default()
            .record(duration);
    }

    /// Add to the running token count.
    pub fn record_tokens(&self, tokens: u64) {
        self.tokens.fetch_add(tokens, Ordering::Relaxed);
    }

    pub fn tool_metrics(&self, name: &str) -> Option<ToolMetrics> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn operation_metrics(&self, name: &str) -> Option<OperationMetrics> {
        self.operations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn token_count(&self) -> u64 {
        self.tokens.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tools: self.tools.read().unwrap_or_else(PoisonError::into_inner).clone(),
            operations: self
                .operations
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            tokens: self.token_count(),
            uptime: self.start_time.elapsed(),
        }
    }

    pub fn reset(&self) {
        self.tools.write().unwrap_or_else(PoisonError::into_inner).clear();
        self.operations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.tokens.store(0, Ordering::Relaxed);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics for a specific tool.
#[derive(Debug, Clone)]
pub struct ToolMetrics {
    pub invocations: u64,
    pub successes: u64,
    pub failures: u64,
    pub total_duration: Duration,
    pub max_duration: Duration,
}

impl ToolMetrics {
    pub fn record(&mut self, duration: Duration, success: bool) {
        self.invocations += 1;
        if success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        self.total_duration += duration;
        self.max_duration = self.max_duration.max(duration);
    }

    pub fn avg_duration(&self) -> Duration {
        if self.invocations == 0 {
            Duration::ZERO
        } else {
            self.total_duration / self.invocations as u32
        }
    }

    /// Fraction of successful calls; 1.0 when there were none.
    pub fn success_rate(&self) -> f64 {
        if self.invocations == 0 {
            1.0
        } else {
            self.successes as f64 / self.invocations as f64
        }
    }
}

impl Default for ToolMetrics {
    fn default() -> Self {
        Self {
            invocations: 0,
            successes: 0,
            failures: 0,
            total_duration: Duration::ZERO,
            max_duration: Duration::ZERO,
        }
    }
}

/// Operation count and latency distribution.
#[derive(Debug, Clone, Default)]
pub struct OperationMetrics {
    pub count: u64,
    pub total_duration: Duration,
    pub histogram: Histogram,
}

impl OperationMetrics {
    pub fn record(&mut self, duration: Duration) {
        self.count += 1;
        self.total_duration += duration;
        self.histogram.record(duration);
    }

    pub fn avg_duration(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.total_duration / self.count as u32
        }
    }
}

/// Fixed-bucket latency histogram.
///
/// Model calls take seconds, so buckets run from 1ms to 60s.
#[derive(Debug, Clone)]
pub struct Histogram {
    /// Upper bounds in milliseconds.
    buckets: Vec<u64>,
    /// One count per bucket plus an overflow slot.
    counts: Vec<u64>,
}

impl Histogram {
    pub fn with_buckets(buckets: Vec<u64>) -> Self {
        let counts = vec![0; buckets.len() + 1];
        Self { buckets, counts }
    }

    pub fn record(&mut self, duration: Duration) {
        let millis = duration.as_millis() as u64;
        let idx = self
            .buckets
            .iter()
            .position(|&b| millis <= b)
            .unwrap_or(self.buckets.len());
        self.counts[idx] += 1;
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Upper bound of the bucket holding the `p`th percentile.
    pub fn percentile(&self, p: f64) -> Duration {
        let total: u64 = self.counts.iter().sum();
        if total == 0 {
            return Duration::ZERO;
        }

        let target = (total as f64 * p / 100.0).ceil() as u64;
        let mut cumulative = 0;
        for (i, &count) in self.counts.iter().enumerate() {
            cumulative += count;
            if cumulative >= target {
                let millis = self
                    .buckets
                    .get(i)
                    .copied()
                    .unwrap_or_else(|| self.buckets.last().copied().unwrap_or(0) * 2);
                return Duration::from_millis(millis);
            }
        }
        Duration::ZERO
    }

    pub fn p50(&self) -> Duration {
        self.percentile(50.0)
    }

    pub fn p99(&self) -> Duration {
        self.percentile(99.0)
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::with_buckets(vec![1, 10, 100, 1_000, 5_000, 15_000, 60_000])
    }
}

/// Metrics at a point in time.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub tools: BTreeMap<String, ToolMetrics>,
    pub operations: BTreeMap<String, OperationMetrics>,
    pub tokens: u64,
    pub uptime: Duration,
}

impl MetricsSnapshot {
    /// Human-readable report, printed with `run --verbose`.
    pub fn format_report(&self) -> String {
        let mut report = String::new();

        report.push_str(&format!("Uptime: {:.2?}, tokens: {}\n", self.uptime, self.tokens));

        if !self.tools.is_empty() {
            report.push_str("Tools:\n");
            for (name, m) in &self.tools {
                report.push_str(&format!(
                    "  {}: {} calls, {:.1}% success, avg {:.2?}, max {:.2?}\n",
                    name,
                    m.invocations,
                    m.success_rate() * 100.0,
                    m.avg_duration(),
                    m.max_duration
                ));
            }
        }

        if !self.operations.is_empty() {
            report.push_str("Operations:\n");
            for (name, m) in &self.operations {
                report.push_str(&format!(
                    "  {}: {} ops, avg {:.2?}, p50 {:.2?}, p99 {:.2?}\n",
                    name,
                    m.count,
                    m.avg_duration(),
                    m.histogram.p50(),
                    m.histogram.p99()
                ));
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_metrics() {
        let mut metrics = ToolMetrics::default();
        metrics.record(Duration::from_millis(100), true);
        metrics.record(Duration::from_millis(200), true);
        metrics.record(Duration::from_millis(60), false);

        assert_eq!(metrics.invocations, 3);
        assert_eq!(metrics.failures, 1);
        assert_eq!(metrics.max_duration, Duration::from_millis(200));
        assert_eq!(metrics.avg_duration(), Duration::from_millis(120));
        assert!((metrics.success_rate() - 0.666).abs() < 0.01);
    }

    #[test]
    fn test_histogram_percentiles() {
        let mut hist = Histogram::default();
        for _ in 0..99 {
            hist.record(Duration::from_millis(700));
        }
        hist.record(Duration::from_secs(120));

        assert_eq!(hist.counts()[3], 99);
        assert_eq!(hist.p50(), Duration::from_millis(1_000));
        assert_eq!(hist.p99(), Duration::from_millis(1_000));
        assert_eq!(hist.percentile(100.0), Duration::from_millis(120_000));
    }

    #[test]
    fn test_snapshot_and_reset() {
        let metrics = Metrics::new();
        metrics.record_tool("write_file", Duration::from_millis(2), true);
        metrics.record_operation("gemini.chat", Duration::from_millis(900));
        metrics.record_tokens(1500);

        let snapshot = metrics.snapshot();
        assert!(snapshot.tools.contains_key("write_file"));
        assert_eq!(snapshot.tokens, 1500);
        let report = snapshot.format_report();
        assert!(report.contains("write_file: 1 calls"));
        assert!(report.contains("gemini.chat: 1 ops"));

        metrics.reset();
        assert!(metrics.tool_metrics("write_file").is_none());
        assert!(metrics.operation_metrics("gemini.chat").is_none());
        assert_eq!(metrics.token_count(), 0);
    }
}
