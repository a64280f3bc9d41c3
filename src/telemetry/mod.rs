// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Logging and diagnostic metrics.
//!
//! - **Tracing**: structured logs written to stderr, so a tool server on stdio
//!   keeps stdout for the protocol
//! - **Metrics**: in-process counters and latency histograms for tools,
//!   model calls and tokens
//! - **Run IDs**: one identifier per pipeline run, attached to its span
//!
//! Metrics here are diagnostic only. Per-run model usage is owned by the
//! [`UsageTracker`](crate::usage::UsageTracker) handed to each run.
//!
//! ```rust,ignore
//! use aicoder::telemetry::{init_telemetry, TelemetryConfig};
//!
//! init_telemetry(&TelemetryConfig::default())?;
//! ```

mod init;
pub mod metrics;
mod run_id;

pub use init::{init_telemetry, TelemetryConfig};
pub use metrics::{Histogram, Metrics, MetricsSnapshot, OperationMetrics, ToolMetrics, GLOBAL_METRICS};
pub use run_id::RunId;
