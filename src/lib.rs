// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! aicoder - a multi-agent code generator.
//!
//! Turns a free-text software description into structured requirements,
//! Python source code, and pytest tests, using three bounded LLM agents that
//! may only touch the filesystem through a sandboxed tool server.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`types`] - Core type definitions (Message, ToolDefinition, ProviderResponse, etc.)
//! - [`error`] - Error types and the user-visible error taxonomy
//! - [`config`] - Configuration loading and merging
//! - [`providers`] - Model backends (Gemini, OpenAI, Ollama, compatible APIs)
//! - [`telemetry`] - Tracing and in-process metrics
//! - [`tools`] - The sandboxed tool set and its registry
//! - [`ipc`] - Tool server, tool client, and the wire protocol between them
//! - [`usage`] - Per-run model usage accounting
//! - [`agent`] - The bounded agent loop and the three agent variants
//! - [`pipeline`] - The phase state machine and orchestrator
//!
//! # Example
//!
//! ```rust,ignore
//! use aicoder::config::{load_config, CliOptions};
//! use aicoder::pipeline::{Pipeline, PipelineOptions};
//!
//! let config = load_config(".".as_ref(), CliOptions::default())?;
//! let pipeline = Pipeline::new(tools, provider, PipelineOptions::from(&config));
//! let result = pipeline.run(aicoder::EXAMPLE_DESCRIPTION).await;
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod ipc;
pub mod pipeline;
pub mod providers;
pub mod telemetry;
pub mod tools;
pub mod types;
pub mod usage;

// Re-export commonly used types at crate root
pub use error::{AgentError, ConfigError, ErrorKind, PipelineError, ProviderError, Result, ToolError};
pub use pipeline::{Pipeline, PipelineOptions, PipelinePhase, PipelineResult};
pub use providers::{create_provider, create_provider_from_config, create_provider_from_env, ProviderType};
pub use types::{
    ContentBlock, Message, MessageContent, Provider, ProviderConfig, ProviderResponse, Role,
    SharedProvider, StopReason, TokenUsage, ToolCall, ToolDefinition, ToolResult,
};
pub use usage::{UsageReport, UsageTracker};

/// aicoder version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Description used by `aicoder run` when none is given.
pub const EXAMPLE_DESCRIPTION: &str = "\
Expense Comparator is a finance software application that helps users compare their
expenses across different time periods. Users can input their expenses and categorize
them into different categories such as groceries, transportation, entertainment, etc.
The application will provide a visual representation of their expenses through charts
and graphs, allowing users to easily compare their spending habits between different
timeframes. Users can also set custom date ranges for comparison. The main function
of the software is to provide users with a clear understanding of their spending
patterns and identify areas where they can make adjustments to improve their
financial well-being.

KEY FUNCTIONAL REQUIREMENTS:
1. Expense Input: Users can add expenses with amount, category, date, and description
2. Category Management: Support for predefined categories (groceries, transportation,
   entertainment, utilities, healthcare, dining, shopping, other)
3. Date Range Filtering: Filter expenses by custom date ranges
4. Expense Comparison: Compare spending between two different time periods
5. Visualization: Generate charts showing expense distribution and trends
6. Data Persistence: Save and load expense data from JSON files
7. Reporting: Generate summary reports with statistics (total, average, min, max)
8. Command-line Interface: User-friendly CLI for all operations
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_public_exports() {
        let _msg = Message::user("test");
        let _response = ProviderResponse::text("done");
        assert_eq!(PipelinePhase::NotStarted.next(), Some(PipelinePhase::RequirementsPhase));
        assert!(EXAMPLE_DESCRIPTION.contains("KEY FUNCTIONAL REQUIREMENTS"));
    }
}
