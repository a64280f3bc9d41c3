// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Progress notifications for front-ends.

use std::sync::Arc;

use serde_json::Value;

use super::PipelinePhase;
use crate::agent::{AgentCallbacks, AgentKind, Artifact};
use crate::error::PipelineError;

/// Receives progress events from a running pipeline.
///
/// Every method has an empty default so observers implement only what they
/// render.
pub trait PipelineObserver: Send + Sync {
    fn on_phase_start(&self, _phase: PipelinePhase, _agent: AgentKind) {}

    fn on_phase_complete(&self, _phase: PipelinePhase, _artifact: &Artifact) {}

    fn on_phase_failed(&self, _phase: PipelinePhase, _error: &PipelineError) {}

    fn on_iteration(&self, _agent: AgentKind, _iteration: usize, _budget: usize) {}

    fn on_tool_call(&self, _agent: AgentKind, _tool: &str, _arguments: &Value) {}

    fn on_tool_result(&self, _agent: AgentKind, _tool: &str, _result: &str, _is_error: bool) {}
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Forward agent loop events to `observer`.
pub(crate) fn agent_callbacks(observer: &Arc<dyn PipelineObserver>) -> AgentCallbacks {
    let on_iteration = Arc::clone(observer);
    let on_tool_call = Arc::clone(observer);
    let on_tool_result = Arc::clone(observer);
    AgentCallbacks {
        on_iteration: Some(Arc::new(move |agent: AgentKind, iteration: usize, budget: usize| {
            on_iteration.on_iteration(agent, iteration, budget)
        })),
        on_tool_call: Some(Arc::new(move |agent: AgentKind, tool: &str, arguments: &Value| {
            on_tool_call.on_tool_call(agent, tool, arguments)
        })),
        on_tool_result: Some(Arc::new(move |agent: AgentKind, tool: &str, result: &str, is_error: bool| {
            on_tool_result.on_tool_result(agent, tool, result, is_error)
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl PipelineObserver for Recorder {
        fn on_tool_call(&self, agent: AgentKind, tool: &str, _arguments: &Value) {
            self.0.lock().unwrap().push(format!("{}:{tool}", agent.id()));
        }
    }

    #[test]
    fn test_callbacks_forward_to_observer() {
        let recorder = Arc::new(Recorder::default());
        let observer: Arc<dyn PipelineObserver> = recorder.clone();
        let callbacks = agent_callbacks(&observer);

        if let Some(cb) = &callbacks.on_tool_call {
            cb(AgentKind::CodeGenerator, "write_file", &Value::Null);
        }
        if let Some(cb) = &callbacks.on_iteration {
            cb(AgentKind::CodeGenerator, 1, 100);
        }

        assert_eq!(*recorder.0.lock().unwrap(), vec!["code_generator:write_file"]);
    }
}
