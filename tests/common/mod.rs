// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Shared fixtures for integration tests: a scripted model backend and an
//! in-process tool server over a temporary output root.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::watch;

use aicoder::error::{ProviderError, ToolError};
use aicoder::ipc::{ToolClient, ToolServer};
use aicoder::pipeline::RoleProviders;
use aicoder::tools::{
    CreateDirectoryHandler, OutputRoot, ReadFileHandler, ToolHandler, ToolOutput, ToolRegistry,
    ToolRegistryBuilder, WriteFileHandler, AppendFileHandler, ListDirHandler, VALIDATE_PYTHON_SYNTAX,
};
use aicoder::types::{
    ContentBlockType, InputSchema, Message, MessageContent, Provider, ProviderResponse,
    SharedProvider, ToolCall, ToolDefinition,
};

// ============================================================================
// Scripted provider
// ============================================================================

/// Replays a fixed list of responses, then repeats a fallback forever.
pub struct ScriptedProvider {
    model: String,
    script: Mutex<VecDeque<ProviderResponse>>,
    fallback: ProviderResponse,
    calls: AtomicUsize,
    offered: Mutex<Vec<Vec<String>>>,
    results: Mutex<Vec<(String, bool)>>,
    cancel: Option<(usize, watch::Sender<bool>)>,
}

impl ScriptedProvider {
    pub fn new(model: &str, script: Vec<ProviderResponse>) -> Self {
        Self {
            model: model.to_string(),
            script: Mutex::new(script.into()),
            fallback: text_step("Done."),
            calls: AtomicUsize::new(0),
            offered: Mutex::new(Vec::new()),
            results: Mutex::new(Vec::new()),
            cancel: None,
        }
    }

    /// Turn `cancel` on while answering call number `after`.
    pub fn cancel_after(mut self, after: usize, cancel: watch::Sender<bool>) -> Self {
        self.cancel = Some((after, cancel));
        self
    }

    pub fn with_fallback(mut self, fallback: ProviderResponse) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Tool results handed back so far, as `(content, is_error)`.
    pub fn tool_results(&self) -> Vec<(String, bool)> {
        self.results.lock().unwrap().clone()
    }

    /// Tool names offered on each call, in call order.
    pub fn offered_tools(&self) -> Vec<Vec<String>> {
        self.offered.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        _system_prompt: Option<&str>,
    ) -> Result<ProviderResponse, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((after, cancel)) = &self.cancel {
            if call == *after {
                cancel.send_replace(true);
            }
        }
        self.offered.lock().unwrap().push(
            tools
                .unwrap_or_default()
                .iter()
                .map(|t| t.name.clone())
                .collect(),
        );
        if let Some(MessageContent::Blocks(blocks)) = messages.last().map(|m| &m.content) {
            self.results.lock().unwrap().extend(
                blocks
                    .iter()
                    .filter(|b| b.block_type == ContentBlockType::ToolResult)
                    .map(|b| (b.content.clone().unwrap_or_default(), b.is_error.unwrap_or(false))),
            );
        }
        let next = self.script.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }

    fn name(&self) -> &str {
        "Scripted"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

pub fn call(id: &str, name: &str, input: Value) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        input,
        malformed: None,
    }
}

/// A call whose arguments the backend could not decode.
pub fn malformed_call(id: &str, name: &str, problem: &str) -> ToolCall {
    ToolCall {
        malformed: Some(problem.to_string()),
        ..call(id, name, json!({}))
    }
}

/// A tool-calling turn with fixed usage.
pub fn tool_step(calls: Vec<ToolCall>) -> ProviderResponse {
    ProviderResponse::tool_calls(calls).with_usage(120, 30)
}

/// A final-answer turn with fixed usage.
pub fn text_step(text: &str) -> ProviderResponse {
    ProviderResponse::text(text).with_usage(80, 20)
}

pub fn as_shared(provider: &Arc<ScriptedProvider>) -> SharedProvider {
    provider.clone()
}

// ============================================================================
// Tool server fixtures
// ============================================================================

pub async fn client_for(registry: ToolRegistry) -> Arc<ToolClient> {
    Arc::new(
        ToolClient::in_process(Arc::new(ToolServer::new(registry)))
            .await
            .unwrap(),
    )
}

pub async fn in_process_client(root: &Path) -> Arc<ToolClient> {
    client_for(ToolRegistry::for_output_root(OutputRoot::new(root).unwrap())).await
}

/// Syntax checker that rejects everything.
pub struct AlwaysInvalidSyntax;

#[async_trait]
impl ToolHandler for AlwaysInvalidSyntax {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(VALIDATE_PYTHON_SYNTAX, "Rejects all code").with_schema(
            InputSchema::new()
                .with_property("code", json!({"type": "string"}))
                .with_required(vec!["code".to_string()]),
        )
    }

    async fn execute(&self, _input: Value) -> Result<ToolOutput, ToolError> {
        let detail = "Syntax error at line 1: invalid syntax near 'def'";
        Ok(ToolOutput::structured(
            detail,
            json!({"valid": false, "error_detail": detail}),
        ))
    }
}

/// Full tool set, except that every syntax check fails.
pub async fn client_with_failing_syntax(root: &Path) -> Arc<ToolClient> {
    let root = OutputRoot::new(root).unwrap();
    let mut builder = ToolRegistryBuilder::new();
    builder
        .register(CreateDirectoryHandler::new(root.clone()))
        .register(WriteFileHandler::new(root.clone()))
        .register(AppendFileHandler::new(root.clone()))
        .register(ReadFileHandler::new(root.clone()))
        .register(ListDirHandler::new(root))
        .register(AlwaysInvalidSyntax);
    client_for(builder.build()).await
}

// ============================================================================
// Generated content
// ============================================================================

pub fn requirements_json() -> String {
    json!({
        "requirements": [
            "Users can add expenses with amount, category, date and description",
            "Expenses belong to predefined categories",
            "Expenses can be filtered by a custom date range",
            "Spending can be compared between two date ranges"
        ],
        "entities": [
            {"name": "Expense", "description": "A single spend", "attributes": ["amount", "category", "date", "description"]},
            {"name": "Category", "description": "Kind of spend", "attributes": ["name"]},
            {"name": "DateRange", "description": "A period to compare", "attributes": ["start", "end"]}
        ]
    })
    .to_string()
}

pub const MODELS_PY: &str = r#""""Data models for the expense tracker."""

from dataclasses import dataclass
from datetime import date
from enum import Enum


class Category(Enum):
    """Kind of spend."""

    GROCERIES = "groceries"
    OTHER = "other"


@dataclass
class Expense:
    """A single spend."""

    amount: float
    category: Category
    day: date


@dataclass
class DateRange:
    """Inclusive period of days."""

    start: date
    end: date

    def contains(self, day: date) -> bool:
        """Whether day falls inside the range."""
        return self.start <= day <= self.end
"#;

pub const INIT_PY: &str = "\"\"\"Expense tracker package.\"\"\"\n";

pub const BROKEN_PY: &str = "def broken(:\n    pass\n";

/// A pytest module with `count` tests.
pub fn test_module(count: usize) -> String {
    let mut source = String::from("from expense_tracker.models import Category\n\n");
    for i in 0..count {
        source.push_str(&format!(
            "\ndef test_case_{i}():\n    \"\"\"Case {i}.\"\"\"\n    assert Category.OTHER.value == \"other\"\n"
        ));
    }
    source
}

// ============================================================================
// Role scripts
// ============================================================================

pub fn requirements_script() -> ScriptedProvider {
    ScriptedProvider::new(
        "requirements-model",
        vec![text_step(&format!("```json\n{}\n```", requirements_json()))],
    )
}

pub fn code_script() -> ScriptedProvider {
    ScriptedProvider::new(
        "code-model",
        vec![
            tool_step(vec![call(
                "c1",
                "create_directory",
                json!({"path": "expense_tracker"}),
            )]),
            tool_step(vec![
                call(
                    "c2",
                    "write_file",
                    json!({"path": "expense_tracker/__init__.py", "content": INIT_PY}),
                ),
                call(
                    "c3",
                    "write_file",
                    json!({"path": "expense_tracker/models.py", "content": MODELS_PY}),
                ),
            ]),
            text_step("Wrote expense_tracker/__init__.py and expense_tracker/models.py."),
        ],
    )
}

pub fn tests_script(count: usize) -> ScriptedProvider {
    ScriptedProvider::new(
        "tests-model",
        vec![
            tool_step(vec![call(
                "t1",
                "read_file",
                json!({"path": "expense_tracker/models.py"}),
            )]),
            tool_step(vec![call(
                "t2",
                "write_file",
                json!({"path": "test_expense_tracker.py", "content": test_module(count)}),
            )]),
            text_step("Wrote test_expense_tracker.py."),
        ],
    )
}

/// The three scripted providers behind a well-formed run.
pub struct Scripts {
    pub requirements: Arc<ScriptedProvider>,
    pub code: Arc<ScriptedProvider>,
    pub tests: Arc<ScriptedProvider>,
}

impl Scripts {
    pub fn new(requirements: ScriptedProvider, code: ScriptedProvider, tests: ScriptedProvider) -> Self {
        Self {
            requirements: requirements.shared(),
            code: code.shared(),
            tests: tests.shared(),
        }
    }

    pub fn well_formed() -> Self {
        Self::new(requirements_script(), code_script(), tests_script(12))
    }

    pub fn providers(&self) -> RoleProviders {
        RoleProviders {
            requirements: as_shared(&self.requirements),
            code: as_shared(&self.code),
            tests: as_shared(&self.tests),
        }
    }
}
