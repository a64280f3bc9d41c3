// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration type definitions.
//!
//! Defines the structure of workspace and resolved configuration,
//! supporting JSON and YAML formats.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Workspace configuration for aicoder.
/// Can be defined in .aicoder.json or .aicoder/config.json in the project root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceConfig {
    /// Provider to use (gemini, openai, ollama, openai-compatible)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Model name to use
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Custom base URL for API
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens per completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Per-phase model overrides
    #[serde(skip_serializing_if = "Option::is_none")]
    pub models: Option<RoleModels>,

    /// Directory all generated files are written under
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,

    /// Per-phase iteration budgets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budgets: Option<BudgetsConfig>,

    /// Minimum number of test cases the test phase must produce
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_test_cases: Option<usize>,

    /// Target pass rate for generated tests (reported, not enforced)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_pass_rate: Option<f64>,

    /// File name of the usage report in the output root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_report_file: Option<String>,

    /// File name of the persisted requirements in the output root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements_file: Option<String>,

    /// How to reach the tool server
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_server: Option<ToolServerMode>,

    /// Socket path when `toolServer` is `socket`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<PathBuf>,
}

/// Model used by each phase, when different from the main model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleModels {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests: Option<String>,
}

/// Iteration budgets as written in config files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tests: Option<usize>,
}

/// Maximum reasoning-loop iterations per phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseBudgets {
    pub requirements: usize,
    pub code: usize,
    pub tests: usize,
}

impl Default for PhaseBudgets {
    fn default() -> Self {
        Self {
            requirements: 50,
            code: 100,
            tests: 80,
        }
    }
}

impl PhaseBudgets {
    /// Same budget for every phase.
    pub fn uniform(iterations: usize) -> Self {
        Self {
            requirements: iterations,
            code: iterations,
            tests: iterations,
        }
    }
}

/// Where the tool server runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ToolServerMode {
    /// Same process, over an in-memory channel
    #[default]
    InProcess,
    /// Child process over stdio
    Spawn,
    /// Existing server on a local socket
    Socket,
}

impl std::str::FromStr for ToolServerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "in-process" | "inprocess" | "in_process" => Ok(Self::InProcess),
            "spawn" => Ok(Self::Spawn),
            "socket" => Ok(Self::Socket),
            other => Err(format!("unknown tool server mode: {other}")),
        }
    }
}

impl std::fmt::Display for ToolServerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InProcess => write!(f, "in-process"),
            Self::Spawn => write!(f, "spawn"),
            Self::Socket => write!(f, "socket"),
        }
    }
}

/// Resolved configuration with all values set.
/// This is the merged result of global, workspace, local, and CLI configs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedConfig {
    pub provider: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub models: RoleModels,
    pub output_dir: PathBuf,
    pub budgets: PhaseBudgets,
    pub min_test_cases: usize,
    pub target_pass_rate: f64,
    pub usage_report_file: String,
    pub requirements_file: String,
    pub tool_server: ToolServerMode,
    pub socket_path: Option<PathBuf>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: None,
            base_url: None,
            temperature: None,
            max_tokens: None,
            models: RoleModels::default(),
            output_dir: PathBuf::from("output"),
            budgets: PhaseBudgets::default(),
            min_test_cases: 10,
            target_pass_rate: 0.8,
            usage_report_file: "model_usage_report.json".to_string(),
            requirements_file: "requirements_spec.json".to_string(),
            tool_server: ToolServerMode::InProcess,
            socket_path: None,
        }
    }
}
