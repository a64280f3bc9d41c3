// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Append-only record of every tool invocation made during a run.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ToolError, ToolErrorKind};
use crate::tools::ToolOutput;

/// A single tool call as seen by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    pub timestamp: DateTime<Utc>,
    pub caller: String,
    pub tool: String,
    /// The `path` argument, when the tool takes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ToolErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ToolInvocation {
    pub fn new(
        caller: &str,
        tool: &str,
        arguments: &serde_json::Value,
        result: Result<&ToolOutput, &ToolError>,
        duration: Duration,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            caller: caller.to_string(),
            tool: tool.to_string(),
            path: arguments
                .get("path")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            success: result.is_ok(),
            error_kind: result.err().map(ToolError::kind),
            error: result.err().map(ToolError::to_string),
            duration_ms: duration.as_millis() as u64,
        }
    }
}

/// Shared, append-only invocation log.
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    entries: Arc<Mutex<Vec<ToolInvocation>>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, invocation: ToolInvocation) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(invocation);
    }

    /// Copy of all entries so far, oldest first.
    pub fn snapshot(&self) -> Vec<ToolInvocation> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of times `tool` was called on `path`.
    pub fn count_calls(&self, tool: &str, path: &str) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.tool == tool && e.path.as_deref() == Some(path))
            .count()
    }
}
