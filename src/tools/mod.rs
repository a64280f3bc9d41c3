// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tool system for aicoder.
//!
//! This module provides the fixed, versioned tool set the agents use to work on
//! the output directory, and the registry that validates and dispatches calls.
//!
//! # Architecture
//!
//! - [`ToolHandler`] trait - Core abstraction for tool implementations
//! - [`ToolRegistry`] - Maps tool names to handlers, validates arguments, dispatches calls
//! - [`OutputRoot`] - Sandbox every filesystem tool resolves paths through
//! - Individual handlers in the [`handlers`] module
//!
//! # Example
//!
//! ```rust,ignore
//! use aicoder::tools::{OutputRoot, ToolRegistry};
//!
//! let registry = ToolRegistry::for_output_root(OutputRoot::new("output")?);
//! let result = registry.dispatch("read_file", json!({"path": "app/main.py"})).await?;
//! ```

pub mod handlers;
pub mod registry;
pub mod sandbox;

pub use handlers::*;
pub use registry::{DispatchResult, ToolHandler, ToolOutput, ToolRegistry, ToolRegistryBuilder};
pub use sandbox::{normalize_path, OutputRoot};

use serde::Deserialize;
use crate::error::ToolError;

/// Version of the tool set; bumped whenever a tool or schema changes.
pub const TOOLSET_VERSION: &str = "1";

/// Tool names, as exposed to agents.
pub const CREATE_DIRECTORY: &str = "create_directory";
pub const WRITE_FILE: &str = "write_file";
pub const APPEND_TO_FILE: &str = "append_to_file";
pub const READ_FILE: &str = "read_file";
pub const LIST_DIRECTORY: &str = "list_directory";
pub const VALIDATE_PYTHON_SYNTAX: &str = "validate_python_syntax";

/// Parse JSON arguments into a typed struct.
///
/// This is a helper function for tool handlers to deserialize their input.
pub fn parse_arguments<T>(arguments: &serde_json::Value) -> Result<T, ToolError>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_value(arguments.clone())
        .map_err(|err| ToolError::InvalidInput(format!("Failed to parse arguments: {err}")))
}

/// Longest tool output echoed into debug logs.
pub const TELEMETRY_PREVIEW_MAX_BYTES: usize = 512;

/// Truncate text to a maximum byte length, respecting UTF-8 boundaries.
pub fn truncate_text(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }

    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }

    if end == 0 {
        return String::new();
    }

    format!("{}... [truncated]", &text[..end])
}
