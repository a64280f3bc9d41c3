// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-run model usage accounting.
//!
//! A [`UsageTracker`] is created for one pipeline run and handed to every
//! model call site (through [`TrackedProvider`]). Counters only ever grow;
//! the final [`UsageReport`] maps each model identifier to its call count and
//! token total and is persisted as JSON in the output root.

mod tracked;

pub use tracked::TrackedProvider;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Usage counters for one model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelUsage {
    pub num_api_calls: u64,
    pub total_tokens: u64,
}

/// Immutable snapshot: model identifier to usage.
///
/// Serializes as `{"model": {"numApiCalls": n, "totalTokens": n}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsageReport(BTreeMap<String, ModelUsage>);

impl UsageReport {
    pub fn get(&self, model: &str) -> Option<&ModelUsage> {
        self.0.get(model)
    }

    pub fn models(&self) -> impl Iterator<Item = (&str, &ModelUsage)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total_calls(&self) -> u64 {
        self.0.values().map(|u| u.num_api_calls).sum()
    }

    pub fn total_tokens(&self) -> u64 {
        self.0.values().map(|u| u.total_tokens).sum()
    }

    /// Pretty JSON, as written to the report file.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// One completed model invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEvent {
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub tokens: u64,
    /// True when the backend did not report usage and tokens were estimated.
    pub estimated: bool,
    pub api_call_number: u64,
    pub total_tokens_so_far: u64,
}

#[derive(Debug, Default)]
struct UsageState {
    models: BTreeMap<String, ModelUsage>,
    events: Vec<UsageEvent>,
}

/// Accumulates usage for a single pipeline run.
///
/// Cloning yields a handle to the same counters.
#[derive(Debug, Clone, Default)]
pub struct UsageTracker {
    state: Arc<Mutex<UsageState>>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one invocation of `model` that consumed `tokens`.
    pub fn record(&self, model: &str, tokens: u64, estimated: bool) -> UsageEvent {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let usage = state.models.entry(model.to_string()).or_default();
        usage.num_api_calls += 1;
        usage.total_tokens += tokens;

        let event = UsageEvent {
            timestamp: Utc::now(),
            model: model.to_string(),
            tokens,
            estimated,
            api_call_number: usage.num_api_calls,
            total_tokens_so_far: usage.total_tokens,
        };
        state.events.push(event.clone());

        debug!(
            model = %model,
            tokens,
            estimated,
            call = event.api_call_number,
            total = event.total_tokens_so_far,
            "Model usage recorded"
        );

        #[cfg(feature = "telemetry")]
        crate::telemetry::metrics::GLOBAL_METRICS.record_tokens(tokens);

        event
    }

    /// Current counters.
    pub fn snapshot(&self) -> UsageReport {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        UsageReport(state.models.clone())
    }

    /// Every recorded invocation, oldest first.
    pub fn events(&self) -> Vec<UsageEvent> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .events
            .clone()
    }

    /// Human-readable summary table.
    pub fn summary(&self) -> String {
        let report = self.snapshot();
        let mut out = String::from("Model usage:\n");
        if report.is_empty() {
            out.push_str("  (no model calls)\n");
            return out;
        }
        for (model, usage) in report.models() {
            out.push_str(&format!(
                "  {model}: {} calls, {} tokens\n",
                usage.num_api_calls, usage.total_tokens
            ));
        }
        out.push_str(&format!(
            "  total: {} calls, {} tokens\n",
            report.total_calls(),
            report.total_tokens()
        ));
        out
    }

    /// Write the report JSON to `path`.
    pub fn save_report(&self, path: &Path) -> std::io::Result<()> {
        let json = self
            .snapshot()
            .to_json_pretty()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }
}

/// Rough token count for text when a backend reports none.
pub fn estimate_tokens(chars: usize) -> u64 {
    ((chars / 4) as u64).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_totals_are_monotonic_and_sum_per_call() {
        let tracker = UsageTracker::new();
        let calls = [("gemini-2.0-flash", 120), ("gpt-4o", 40), ("gemini-2.0-flash", 0), ("gemini-2.0-flash", 75)];

        let mut previous = 0;
        for (model, tokens) in calls {
            let event = tracker.record(model, tokens, false);
            let now = tracker.snapshot().total_tokens();
            assert!(now >= previous);
            previous = now;
            assert!(event.total_tokens_so_far >= event.tokens);
        }

        let report = tracker.snapshot();
        for (model, usage) in report.models() {
            let events: Vec<_> = tracker.events().into_iter().filter(|e| e.model == model).collect();
            assert_eq!(usage.num_api_calls, events.len() as u64);
            assert_eq!(usage.total_tokens, events.iter().map(|e| e.tokens).sum::<u64>());
        }
        assert_eq!(report.get("gemini-2.0-flash").unwrap().num_api_calls, 3);
        assert_eq!(report.get("gemini-2.0-flash").unwrap().total_tokens, 195);
    }

    #[test]
    fn test_report_json_shape() {
        let tracker = UsageTracker::new();
        tracker.record("m1", 10, false);

        let json: serde_json::Value =
            serde_json::from_str(&tracker.snapshot().to_json_pretty().unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({"m1": {"numApiCalls": 1, "totalTokens": 10}}));
    }

    #[test]
    fn test_clones_share_counters() {
        let tracker = UsageTracker::new();
        tracker.clone().record("m", 5, true);
        assert_eq!(tracker.snapshot().total_calls(), 1);
        assert!(tracker.events()[0].estimated);
    }

    #[test]
    fn test_summary_and_save() {
        let tracker = UsageTracker::new();
        assert!(tracker.summary().contains("no model calls"));

        tracker.record("m", 8, false);
        assert!(tracker.summary().contains("m: 1 calls, 8 tokens"));

        let temp = tempdir().unwrap();
        let path = temp.path().join("model_usage_report.json");
        tracker.save_report(&path).unwrap();
        let saved: UsageReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved, tracker.snapshot());
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(0), 1);
        assert_eq!(estimate_tokens(400), 100);
    }
}
