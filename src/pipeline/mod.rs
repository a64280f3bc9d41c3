// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Pipeline orchestration.
//!
//! A run moves strictly forward through
//! `NotStarted → RequirementsPhase → CodeGenPhase → TestGenPhase → Completed`.
//! Any phase may instead end in `Failed`, which halts the run without rolling
//! back files already written.
//!
//! # Example
//!
//! ```rust,ignore
//! use aicoder::pipeline::{Pipeline, PipelineOptions};
//!
//! let pipeline = Pipeline::new(tools, provider, PipelineOptions::default());
//! let result = pipeline.run("track daily expenses and compare two date ranges").await;
//! if !result.is_success() {
//!     eprintln!("{:?} failed: {:?}", result.failed_phase, result.error_kind);
//! }
//! ```

mod observer;
mod orchestrator;
mod state;

pub use observer::{NoopObserver, PipelineObserver};
pub use orchestrator::{Pipeline, PipelineOptions, PipelineResult, RoleProviders};
pub use state::{PipelinePhase, PipelineState, Transition};
