// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Agents - bounded reasoning loops over a restricted tool set.
//!
//! Every agent runs the same loop: call the model, execute the tool calls it
//! asks for through a [`ScopedToolClient`], and repeat. When the model stops
//! asking for tools its [`AgentRole`] assesses the reply and either produces the
//! output [`Artifact`] or sends feedback for another round. The loop stops
//! after `max_iterations` model calls with [`AgentError::BudgetExceeded`].
//!
//! # Example
//!
//! ```rust,ignore
//! use aicoder::agent::{Agent, AgentConfig, RequirementsAnalyzer};
//!
//! let tools = client.scoped(kind.id(), kind.capabilities(), audit)?;
//! let mut agent = Agent::new(
//!     RequirementsAnalyzer::new("requirements_spec.json"),
//!     provider,
//!     AgentConfig { max_iterations: 50 },
//! );
//! let artifact = agent.run("track daily expenses", None, &tools).await?;
//! ```

mod artifact;
pub mod roles;
mod types;

pub use artifact::{
    Artifact, ArtifactContent, ArtifactKind, Entity, RequirementsSpec, SourceFileSet, TestCase,
    TestFileSet,
};
pub use roles::{CodeGenerator, RequirementsAnalyzer, TestGenerator};
pub use types::{AgentCallbacks, AgentConfig, AgentKind};

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AgentError;
use crate::ipc::ScopedToolClient;
use crate::tools::{normalize_path, APPEND_TO_FILE, CREATE_DIRECTORY, WRITE_FILE};
use crate::types::{ContentBlock, Message, Role, SharedProvider, ToolCall, ToolResult};

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

/// Verdict of a role on the model's final reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Assessment {
    /// The output artifact is complete.
    Complete(ArtifactContent),
    /// Not done yet; the feedback goes back to the model.
    Revise(String),
}

/// Per-variant behavior plugged into the shared loop.
#[async_trait]
pub trait AgentRole: Send + Sync {
    /// Input this variant consumes.
    type Input: Sync + ?Sized;

    fn kind(&self) -> AgentKind;

    fn system_prompt(&self) -> String;

    fn task_prompt(&self, input: &Self::Input) -> String;

    /// Paths this variant may write, when narrower than its tool set allows.
    fn writable_paths(&self) -> Option<fn(&str) -> bool> {
        None
    }

    /// Decide whether the work so far forms the output artifact.
    ///
    /// May call tools through `tools`; fatal tool errors are returned as
    /// [`AgentError::Tool`].
    async fn assess(
        &mut self,
        input: &Self::Input,
        reply: &str,
        work: &WorkLog,
        tools: &ScopedToolClient,
    ) -> Result<Assessment, AgentError>;
}

/// Filesystem effects of an agent's own successful tool calls.
#[derive(Debug, Clone, Default)]
pub struct WorkLog {
    written: Vec<String>,
    directories: Vec<String>,
    tool_calls: usize,
    failed_calls: usize,
}

impl WorkLog {
    fn record(&mut self, call: &ToolCall, success: bool) {
        self.tool_calls += 1;
        if !success {
            self.failed_calls += 1;
            return;
        }
        let Some(path) = call.input.get("path").and_then(|p| p.as_str()) else {
            return;
        };
        let path = normalize_path(path);
        let list = match call.name.as_str() {
            WRITE_FILE | APPEND_TO_FILE => &mut self.written,
            CREATE_DIRECTORY => &mut self.directories,
            _ => return,
        };
        if !list.contains(&path) {
            list.push(path);
        }
    }

    /// Files written or appended to, in first-write order.
    pub fn written_files(&self) -> &[String] {
        &self.written
    }

    pub fn directories(&self) -> &[String] {
        &self.directories
    }

    pub fn tool_calls(&self) -> usize {
        self.tool_calls
    }

    pub fn failed_calls(&self) -> usize {
        self.failed_calls
    }
}

/// A bounded reasoning loop bound to one role.
pub struct Agent<R: AgentRole> {
    role: R,
    provider: SharedProvider,
    config: AgentConfig,
    callbacks: AgentCallbacks,
    cancel: Option<watch::Receiver<bool>>,
}

impl<R: AgentRole> Agent<R> {
    pub fn new(role: R, provider: SharedProvider, config: AgentConfig) -> Self {
        Self {
            role,
            provider,
            config,
            callbacks: AgentCallbacks::default(),
            cancel: None,
        }
    }

    pub fn with_callbacks(mut self, callbacks: AgentCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Stop at the next iteration once `cancel` turns true.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn kind(&self) -> AgentKind {
        self.role.kind()
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Run the loop until the role accepts an artifact or the budget is spent.
    ///
    /// `tools` must be scoped to this agent's identity.
    pub async fn run(
        &mut self,
        input: &R::Input,
        derived_from: Option<Uuid>,
        tools: &ScopedToolClient,
    ) -> Result<Arc<Artifact>, AgentError> {
        let kind = self.role.kind();
        if tools.caller() != kind.id() {
            return Err(AgentError::InvalidInput(format!(
                "tool client is scoped to {}, not {}",
                tools.caller(),
                kind.id()
            )));
        }

        let started = Instant::now();
        let budget = self.config.max_iterations;
        let definitions = tools.definitions();
        let system_prompt = self.role.system_prompt();
        let mut messages = vec![Message::user(self.role.task_prompt(input))];
        let mut work = WorkLog::default();
        let mut last_issue: Option<String> = None;

        info!(agent = %kind, budget, model = %self.provider.model(), "Agent started");

        for iteration in 1..=budget {
            if self.cancelled() {
                info!(agent = %kind, iteration, "Agent cancelled");
                return Err(AgentError::Cancelled);
            }
            if let Some(ref cb) = self.callbacks.on_iteration {
                cb(kind, iteration, budget);
            }

            let response = self
                .provider
                .chat(&messages, Some(&definitions), Some(&system_prompt))
                .await?;

            let mut blocks = Vec::new();
            if !response.content.is_empty() {
                blocks.push(ContentBlock::text(&response.content));
            }
            for call in &response.tool_calls {
                blocks.push(ContentBlock::tool_use(&call.id, &call.name, call.input.clone()));
            }
            if !blocks.is_empty() {
                messages.push(Message::with_blocks(Role::Assistant, blocks));
            }

            if response.has_tool_calls() {
                let mut results = Vec::with_capacity(response.tool_calls.len());
                for call in &response.tool_calls {
                    let result = self.execute_tool(kind, call, tools, &mut work).await?;
                    if result.is_error == Some(true) {
                        last_issue = Some(result.content.clone());
                    }
                    results.push(result);
                }
                let blocks = results
                    .into_iter()
                    .map(|r| ContentBlock::tool_result(r.tool_use_id, r.content, r.is_error.unwrap_or(false)))
                    .collect();
                messages.push(Message::with_blocks(Role::User, blocks));
                continue;
            }

            match self.role.assess(input, &response.content, &work, tools).await? {
                Assessment::Complete(content) => {
                    info!(
                        agent = %kind,
                        iterations = iteration,
                        tool_calls = work.tool_calls(),
                        failed_calls = work.failed_calls(),
                        "Agent produced artifact"
                    );
                    #[cfg(feature = "telemetry")]
                    GLOBAL_METRICS.record_operation(&format!("agent.{}", kind.id()), started.elapsed());
                    return Ok(Artifact::new(kind, content, derived_from));
                }
                Assessment::Revise(feedback) => {
                    debug!(agent = %kind, iteration, feedback = %feedback, "Revision requested");
                    last_issue = Some(feedback.clone());
                    messages.push(Message::user(feedback));
                }
            }
        }

        warn!(agent = %kind, budget, last_issue = ?last_issue, "Iteration budget exhausted");
        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation(&format!("agent.{}", kind.id()), started.elapsed());
        #[cfg(not(feature = "telemetry"))]
        let _ = started;

        Err(AgentError::BudgetExceeded {
            iterations: budget,
            last_issue,
        })
    }

    /// Execute one tool call. Recoverable failures become error results for
    /// the model; fatal ones end the run.
    async fn execute_tool(
        &self,
        kind: AgentKind,
        call: &ToolCall,
        tools: &ScopedToolClient,
        work: &mut WorkLog,
    ) -> Result<ToolResult, AgentError> {
        if let Some(ref cb) = self.callbacks.on_tool_call {
            cb(kind, &call.name, &call.input);
        }

        if let Some(ref problem) = call.malformed {
            work.record(call, false);
            debug!(agent = %kind, tool = %call.name, error = %problem, "Malformed tool arguments");
            let result = ToolResult::error(
                &call.id,
                format!("Error: arguments for {} are not valid JSON: {problem}", call.name),
            );
            if let Some(ref cb) = self.callbacks.on_tool_result {
                cb(kind, &call.name, &result.content, true);
            }
            return Ok(result);
        }

        let outcome = tools.call(&call.name, call.input.clone()).await;
        work.record(call, outcome.is_ok());

        let result = match outcome {
            Ok(output) => ToolResult::success(&call.id, output.content()),
            Err(err) if err.is_fatal() => {
                warn!(agent = %kind, tool = %call.name, error = %err, "Fatal tool error");
                if let Some(ref cb) = self.callbacks.on_tool_result {
                    cb(kind, &call.name, &err.to_string(), true);
                }
                return Err(AgentError::Tool(err));
            }
            Err(err) => {
                debug!(agent = %kind, tool = %call.name, error = %err, "Tool call failed");
                ToolResult::error(&call.id, format!("Error: {err}"))
            }
        };

        if let Some(ref cb) = self.callbacks.on_tool_result {
            cb(kind, &call.name, &result.content, result.is_error.unwrap_or(false));
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str, input: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "c1".to_string(),
            name: name.to_string(),
            input,
            malformed: None,
        }
    }

    #[test]
    fn test_work_log_tracks_successful_writes_once() {
        let mut work = WorkLog::default();
        work.record(&call(CREATE_DIRECTORY, json!({"path": "app"})), true);
        work.record(&call(WRITE_FILE, json!({"path": "app/a.py", "content": ""})), true);
        work.record(&call(WRITE_FILE, json!({"path": "./app/a.py", "content": "x"})), true);
        work.record(&call(WRITE_FILE, json!({"path": "app/b.py", "content": ""})), false);
        work.record(&call(WRITE_FILE, json!({"path": "app/x/../a.py", "content": ""})), true);
        work.record(&call("read_file", json!({"path": "app/a.py"})), true);

        assert_eq!(work.written_files(), &["app/a.py".to_string()]);
        assert_eq!(work.directories(), &["app".to_string()]);
        assert_eq!(work.tool_calls(), 6);
        assert_eq!(work.failed_calls(), 1);
    }
}
