// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tool registry and handler trait.
//!
//! This module defines the core abstractions for the tool system:
//! - [`ToolHandler`] trait that all tools must implement
//! - [`ToolRegistry`] for validating and dispatching tool calls
//! - [`ToolOutput`] for returning results from tool execution

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(feature = "telemetry")]
use tracing::{debug, info_span, Instrument};

use crate::error::ToolError;
#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;
use crate::types::ToolDefinition;

use super::handlers::{
    AppendFileHandler, CreateDirectoryHandler, ListDirHandler, ReadFileHandler,
    ValidatePythonHandler, WriteFileHandler,
};
use super::sandbox::OutputRoot;

/// Output from a successful tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolOutput {
    /// Simple text content result
    Text { content: String },
    /// Text plus a structured payload
    Structured {
        content: String,
        data: serde_json::Value,
    },
}

impl ToolOutput {
    /// Create a text output.
    pub fn success(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    /// Create a structured output.
    pub fn structured(content: impl Into<String>, data: serde_json::Value) -> Self {
        Self::Structured {
            content: content.into(),
            data,
        }
    }

    /// Get the content string.
    pub fn content(&self) -> &str {
        match self {
            Self::Text { content } => content,
            Self::Structured { content, .. } => content,
        }
    }

    /// Structured payload, if any.
    pub fn data(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Text { .. } => None,
            Self::Structured { data, .. } => Some(data),
        }
    }

    /// Get a preview suitable for logging (truncated).
    pub fn log_preview(&self, max_bytes: usize) -> String {
        super::truncate_text(self.content(), max_bytes)
    }
}

/// Trait that all tool handlers must implement.
///
/// # Example
///
/// ```rust,ignore
/// use aicoder::tools::{ToolHandler, ToolOutput};
/// use aicoder::types::ToolDefinition;
///
/// struct MyTool;
///
/// #[async_trait]
/// impl ToolHandler for MyTool {
///     fn definition(&self) -> ToolDefinition {
///         ToolDefinition::new("my_tool", "Does something useful")
///     }
///
///     async fn execute(&self, input: serde_json::Value) -> Result<ToolOutput, ToolError> {
///         Ok(ToolOutput::success("Done!"))
///     }
/// }
/// ```
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Get the tool definition (name, description, input schema, side effect).
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with already validated input parameters.
    async fn execute(&self, input: serde_json::Value) -> Result<ToolOutput, ToolError>;
}

/// Registry of available tools, maps names to handlers.
///
/// Descriptors are captured once at registration and never change afterwards.
pub struct ToolRegistry {
    handlers: BTreeMap<String, (ToolDefinition, Arc<dyn ToolHandler>)>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    /// Create a registry with the full tool set confined to `root`.
    pub fn for_output_root(root: OutputRoot) -> Self {
        let mut builder = ToolRegistryBuilder::new();

        builder.register(CreateDirectoryHandler::new(root.clone()));
        builder.register(WriteFileHandler::new(root.clone()));
        builder.register(AppendFileHandler::new(root.clone()));
        builder.register(ReadFileHandler::new(root.clone()));
        builder.register(ListDirHandler::new(root));
        builder.register(ValidatePythonHandler);

        builder.build()
    }

    /// Get a handler by tool name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.get(name).map(|(_, h)| Arc::clone(h))
    }

    /// Check if a tool exists.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Get all tool definitions, ordered by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.handlers.values().map(|(d, _)| d.clone()).collect()
    }

    /// Get all tool names.
    pub fn tool_names(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    /// Validate a call against the tool's schema, then run it.
    ///
    /// Unknown tools and schema violations are reported as errors without
    /// executing anything. When the `telemetry` feature is enabled, this method
    /// is instrumented with tracing spans and records metrics.
    pub async fn dispatch(&self, tool_name: &str, input: serde_json::Value) -> DispatchResult {
        let start = Instant::now();

        let result = match self.handlers.get(tool_name) {
            None => Err(ToolError::UnknownTool(tool_name.to_string())),
            Some((definition, handler)) => match definition.input_schema.validate(&input) {
                Err(err) => Err(err),
                Ok(()) => {
                    #[cfg(feature = "telemetry")]
                    debug!(tool = %tool_name, "Executing tool");

                    #[cfg(feature = "telemetry")]
                    let result = handler
                        .execute(input)
                        .instrument(info_span!("tool_execute", tool = %tool_name))
                        .await;

                    #[cfg(not(feature = "telemetry"))]
                    let result = handler.execute(input).await;

                    result
                }
            },
        };

        let duration = start.elapsed();

        #[cfg(feature = "telemetry")]
        {
            GLOBAL_METRICS.record_tool(tool_name, duration, result.is_ok());
            match &result {
                Ok(_) => debug!(
                    tool = %tool_name,
                    duration_ms = duration.as_secs_f64() * 1000.0,
                    "Tool execution succeeded"
                ),
                Err(err) => debug!(
                    tool = %tool_name,
                    duration_ms = duration.as_secs_f64() * 1000.0,
                    error = %err,
                    "Tool execution failed"
                ),
            }
        }

        DispatchResult {
            tool_name: tool_name.to_string(),
            result,
            duration,
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of dispatching a tool call.
#[derive(Debug)]
pub struct DispatchResult {
    /// Name of the tool that was called
    pub tool_name: String,
    /// Output or error from the tool
    pub result: Result<ToolOutput, ToolError>,
    /// Duration of execution
    pub duration: Duration,
}

impl DispatchResult {
    /// Whether the execution resulted in an error.
    pub fn is_error(&self) -> bool {
        self.result.is_err()
    }
}

/// Builder for constructing a ToolRegistry.
pub struct ToolRegistryBuilder {
    handlers: BTreeMap<String, (ToolDefinition, Arc<dyn ToolHandler>)>,
}

impl ToolRegistryBuilder {
    /// Create a new empty builder.
    pub fn new() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    /// Register a tool handler.
    pub fn register<T: ToolHandler + 'static>(&mut self, handler: T) -> &mut Self {
        let def = handler.definition();
        self.handlers.insert(def.name.clone(), (def, Arc::new(handler)));
        self
    }

    /// Build the final registry.
    pub fn build(self) -> ToolRegistry {
        ToolRegistry {
            handlers: self.handlers,
        }
    }
}

impl Default for ToolRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
