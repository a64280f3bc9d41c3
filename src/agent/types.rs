// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Agent types and configuration.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::tools::{CREATE_DIRECTORY, READ_FILE, VALIDATE_PYTHON_SYNTAX, WRITE_FILE};

/// The three agent variants of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    RequirementsAnalyzer,
    CodeGenerator,
    TestGenerator,
}

impl AgentKind {
    /// Tools this variant may invoke. Anything else fails closed.
    pub fn capabilities(&self) -> &'static [&'static str] {
        match self {
            Self::RequirementsAnalyzer => &[WRITE_FILE],
            Self::CodeGenerator => &[CREATE_DIRECTORY, WRITE_FILE, READ_FILE, VALIDATE_PYTHON_SYNTAX],
            Self::TestGenerator => &[READ_FILE, WRITE_FILE],
        }
    }

    /// Caller identity used by the tool client and the audit log.
    pub fn id(&self) -> &'static str {
        match self {
            Self::RequirementsAnalyzer => "requirements_analyzer",
            Self::CodeGenerator => "code_generator",
            Self::TestGenerator => "test_generator",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequirementsAnalyzer => write!(f, "Requirements Analyzer"),
            Self::CodeGenerator => write!(f, "Code Generator"),
            Self::TestGenerator => write!(f, "Test Generator"),
        }
    }
}

/// Configuration for one agent run.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Maximum reasoning-loop iterations (one model call each).
    pub max_iterations: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self { max_iterations: 50 }
    }
}

/// Callbacks for agent events.
///
/// Uses `Arc` so the pipeline can share one set across all three agents.
#[derive(Clone, Default)]
pub struct AgentCallbacks {
    /// Called at the top of every iteration (agent, iteration, budget).
    pub on_iteration: Option<Arc<dyn Fn(AgentKind, usize, usize) + Send + Sync>>,
    /// Called when a tool is about to be invoked (agent, tool name, input).
    pub on_tool_call: Option<Arc<dyn Fn(AgentKind, &str, &serde_json::Value) + Send + Sync>>,
    /// Called when a tool invocation completes (agent, tool name, result text, is_error).
    pub on_tool_result: Option<Arc<dyn Fn(AgentKind, &str, &str, bool) + Send + Sync>>,
}

impl fmt::Debug for AgentCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentCallbacks")
            .field("on_iteration", &self.on_iteration.is_some())
            .field("on_tool_call", &self.on_tool_call.is_some())
            .field("on_tool_result", &self.on_tool_result.is_some())
            .finish()
    }
}
