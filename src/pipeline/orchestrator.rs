// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The orchestrator driving one run through the three phases.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::json;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use super::observer::{agent_callbacks, NoopObserver, PipelineObserver};
use super::{PipelinePhase, PipelineState};
use crate::agent::{
    Agent, AgentConfig, AgentRole, Artifact, CodeGenerator, RequirementsAnalyzer, TestGenerator,
};
use crate::config::{PhaseBudgets, ResolvedConfig};
use crate::error::{AgentError, ErrorKind, PipelineError};
use crate::ipc::{AuditLog, ToolClient, ToolInvocation};
use crate::telemetry::RunId;
use crate::tools::{normalize_path, CREATE_DIRECTORY, WRITE_FILE};
use crate::types::SharedProvider;
use crate::usage::{TrackedProvider, UsageEvent, UsageReport, UsageTracker};

/// Caller identity for writes the orchestrator makes itself.
const ORCHESTRATOR_CALLER: &str = "orchestrator";

/// Policy values for a run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub budgets: PhaseBudgets,
    pub min_test_cases: usize,
    /// Recorded in the result; no tool executes the generated tests.
    pub target_pass_rate: f64,
    pub requirements_file: String,
    pub usage_report_file: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from(&ResolvedConfig::default())
    }
}

impl From<&ResolvedConfig> for PipelineOptions {
    fn from(config: &ResolvedConfig) -> Self {
        Self {
            budgets: config.budgets,
            min_test_cases: config.min_test_cases,
            target_pass_rate: config.target_pass_rate,
            requirements_file: config.requirements_file.clone(),
            usage_report_file: config.usage_report_file.clone(),
        }
    }
}

/// Model backend per agent.
#[derive(Clone)]
pub struct RoleProviders {
    pub requirements: SharedProvider,
    pub code: SharedProvider,
    pub tests: SharedProvider,
}

impl RoleProviders {
    /// One backend for every agent.
    pub fn shared(provider: SharedProvider) -> Self {
        Self {
            requirements: Arc::clone(&provider),
            code: Arc::clone(&provider),
            tests: provider,
        }
    }

    fn tracked(&self, tracker: &UsageTracker) -> Self {
        let wrap = |p: &SharedProvider| -> SharedProvider {
            Arc::new(TrackedProvider::new(Arc::clone(p), tracker.clone()))
        };
        Self {
            requirements: wrap(&self.requirements),
            code: wrap(&self.code),
            tests: wrap(&self.tests),
        }
    }
}

/// Outcome of `Pipeline::run`, successful or not.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub run_id: RunId,
    /// `Completed` or `Failed`.
    pub status: PipelinePhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_phase: Option<PipelinePhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Artifacts in phase order; on failure, those produced before it.
    pub artifacts: Vec<Artifact>,
    /// Generated source files, relative to the output root.
    pub files: Vec<String>,
    pub test_files: Vec<String>,
    pub test_case_count: usize,
    pub target_pass_rate: f64,
    pub usage_report: UsageReport,
    pub usage_events: Vec<UsageEvent>,
    pub invocations: Vec<ToolInvocation>,
    /// Usage report location relative to the output root, once written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<String>,
    pub duration_ms: u64,
}

impl PipelineResult {
    pub fn is_success(&self) -> bool {
        self.status == PipelinePhase::Completed
    }

    /// Invocations of `tool`, in call order.
    pub fn invocations_of<'a>(&'a self, tool: &'a str) -> impl Iterator<Item = &'a ToolInvocation> {
        self.invocations.iter().filter(move |i| i.tool == tool)
    }
}

/// Mutable state of one run.
struct RunContext {
    state: PipelineState,
    providers: RoleProviders,
    audit: AuditLog,
    artifacts: Vec<Arc<Artifact>>,
    files: Vec<String>,
    test_files: Vec<String>,
    test_case_count: usize,
}

/// Drives a description through requirements, code, and tests.
pub struct Pipeline {
    tools: Arc<ToolClient>,
    providers: RoleProviders,
    options: PipelineOptions,
    observer: Arc<dyn PipelineObserver>,
    cancel: Option<watch::Receiver<bool>>,
}

impl Pipeline {
    pub fn new(tools: Arc<ToolClient>, provider: SharedProvider, options: PipelineOptions) -> Self {
        Self::with_role_providers(tools, RoleProviders::shared(provider), options)
    }

    pub fn with_role_providers(
        tools: Arc<ToolClient>,
        providers: RoleProviders,
        options: PipelineOptions,
    ) -> Self {
        Self {
            tools,
            providers,
            options,
            observer: Arc::new(NoopObserver),
            cancel: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Abort the run once `cancel` turns true. Checked at phase boundaries
    /// and at the top of every agent iteration.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Run the whole pipeline once.
    ///
    /// Never returns early on failure: the result carries the failed phase,
    /// the error kind, and everything produced up to that point. The usage
    /// report is written to the output root in both cases.
    pub async fn run(&self, description: &str) -> PipelineResult {
        let run_id = RunId::new();
        let started = Instant::now();
        let tracker = UsageTracker::new();
        let mut ctx = RunContext {
            state: PipelineState::new(),
            providers: self.providers.tracked(&tracker),
            audit: AuditLog::new(),
            artifacts: Vec::new(),
            files: Vec::new(),
            test_files: Vec::new(),
            test_case_count: 0,
        };

        info!(run = %run_id.short(), toolset = %self.tools.version(), "Pipeline run started");

        let mut outcome = self.execute(description, &mut ctx).await;

        let report_path = match self.write_report(&tracker).await {
            Ok(path) => Some(path),
            Err(err) if outcome.is_ok() => {
                outcome = Err(err);
                None
            }
            Err(err) => {
                warn!(error = %err, "Usage report not written");
                None
            }
        };
        if outcome.is_ok() {
            outcome = ctx.state.advance(PipelinePhase::Completed);
        }

        let failure = outcome.err();
        if let Some(ref err) = failure {
            let phase = ctx.state.phase();
            if ctx.state.fail().is_err() {
                warn!(phase = %phase, "Failure reported from a terminal phase");
            }
            error!(run = %run_id.short(), phase = %phase, kind = %err.kind(), error = %err, "Pipeline failed");
            self.observer.on_phase_failed(phase, err);
        } else {
            info!(
                run = %run_id.short(),
                files = ctx.files.len(),
                tests = ctx.test_case_count,
                "Pipeline completed"
            );
        }

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("pipeline.run", started.elapsed());

        PipelineResult {
            run_id,
            status: ctx.state.phase(),
            failed_phase: ctx.state.failed_in(),
            error_kind: failure.as_ref().map(PipelineError::kind),
            error: failure.as_ref().map(ToString::to_string),
            artifacts: ctx.artifacts.iter().map(|a| (**a).clone()).collect(),
            files: ctx.files,
            test_files: ctx.test_files,
            test_case_count: ctx.test_case_count,
            target_pass_rate: self.options.target_pass_rate,
            usage_report: tracker.snapshot(),
            usage_events: tracker.events(),
            invocations: ctx.audit.snapshot(),
            report_path,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    async fn execute(&self, description: &str, ctx: &mut RunContext) -> Result<(), PipelineError> {
        let budgets = self.options.budgets;

        self.ensure_parent(&self.options.requirements_file).await;
        let provider = Arc::clone(&ctx.providers.requirements);
        let requirements = self
            .run_phase(
                ctx,
                PipelinePhase::RequirementsPhase,
                RequirementsAnalyzer::new(self.options.requirements_file.clone()),
                provider,
                budgets.requirements,
                description,
                None,
                &[],
            )
            .await?;
        let spec = requirements
            .as_requirements()
            .ok_or_else(|| mismatched(PipelinePhase::CodeGenPhase, "requirements"))?;

        let provider = Arc::clone(&ctx.providers.code);
        let code = self
            .run_phase(
                ctx,
                PipelinePhase::CodeGenPhase,
                CodeGenerator::new(),
                provider,
                budgets.code,
                spec,
                Some(requirements.id),
                &[],
            )
            .await?;
        let sources = code
            .as_source_files()
            .ok_or_else(|| mismatched(PipelinePhase::TestGenPhase, "source file set"))?;
        ctx.files = sources.files.clone();

        // Accepted source files stay as validated.
        let read_only = ctx.files.clone();
        let provider = Arc::clone(&ctx.providers.tests);
        let tests = self
            .run_phase(
                ctx,
                PipelinePhase::TestGenPhase,
                TestGenerator::new(self.options.min_test_cases),
                provider,
                budgets.tests,
                sources,
                Some(code.id),
                &read_only,
            )
            .await?;
        let test_set = tests
            .as_test_files()
            .ok_or_else(|| mismatched(PipelinePhase::TestGenPhase, "test file set"))?;
        ctx.test_files = test_set.files.clone();
        ctx.test_case_count = test_set.test_case_count();

        if ctx.test_case_count < self.options.min_test_cases {
            return Err(PipelineError::InsufficientTests {
                phase: PipelinePhase::TestGenPhase,
                found: ctx.test_case_count,
                required: self.options.min_test_cases,
            });
        }
        Ok(())
    }

    /// Enter `phase`, run its agent with the phase's tool allow-list, and
    /// record the artifact. `read_only` paths may not be modified.
    #[allow(clippy::too_many_arguments)]
    async fn run_phase<R: AgentRole>(
        &self,
        ctx: &mut RunContext,
        phase: PipelinePhase,
        role: R,
        provider: SharedProvider,
        budget: usize,
        input: &R::Input,
        derived_from: Option<Uuid>,
        read_only: &[String],
    ) -> Result<Arc<Artifact>, PipelineError> {
        ctx.state.advance(phase)?;
        if self.cancelled() {
            return Err(PipelineError::PhaseFailure {
                phase,
                source: AgentError::Cancelled,
            });
        }

        let kind = role.kind();
        let started = Instant::now();
        self.observer.on_phase_start(phase, kind);
        info!(phase = %phase, agent = %kind, budget, "Phase started");

        let mut tools = self
            .tools
            .scoped(kind.id(), kind.capabilities(), ctx.audit.clone())?
            .with_read_only(read_only);
        if let Some(rule) = role.writable_paths() {
            tools = tools.with_writable(rule);
        }
        let mut agent = Agent::new(role, provider, AgentConfig { max_iterations: budget })
            .with_callbacks(agent_callbacks(&self.observer));
        if let Some(cancel) = &self.cancel {
            agent = agent.with_cancellation(cancel.clone());
        }

        let artifact = agent
            .run(input, derived_from, &tools)
            .await
            .map_err(|source| PipelineError::PhaseFailure { phase, source })?;

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation(&format!("phase.{phase}"), started.elapsed());
        info!(
            phase = %phase,
            artifact = %artifact.id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Phase completed"
        );

        ctx.artifacts.push(Arc::clone(&artifact));
        self.observer.on_phase_complete(phase, &artifact);
        Ok(artifact)
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Create the parent directory of an output file the orchestrator names.
    /// A failure only logs; the write that follows reports it.
    async fn ensure_parent(&self, file: &str) {
        let file = normalize_path(file);
        let Some((parent, _)) = file.rsplit_once('/') else {
            return;
        };
        let created = self
            .tools
            .call(CREATE_DIRECTORY, json!({ "path": parent }), Some(ORCHESTRATOR_CALLER))
            .await;
        if let Err(err) = created {
            warn!(path = %parent, error = %err, "Output directory not created");
        }
    }

    /// Persist the usage report through the tool server.
    async fn write_report(&self, tracker: &UsageTracker) -> Result<String, PipelineError> {
        let content = tracker
            .snapshot()
            .to_json_pretty()
            .map_err(|e| PipelineError::Report(e.to_string()))?;
        let path = self.options.usage_report_file.clone();
        self.ensure_parent(&path).await;
        self.tools
            .call(
                WRITE_FILE,
                json!({ "path": path, "content": content }),
                Some(ORCHESTRATOR_CALLER),
            )
            .await
            .map_err(|e| PipelineError::Report(e.to_string()))?;
        Ok(path)
    }
}

fn mismatched(phase: PipelinePhase, expected: &str) -> PipelineError {
    PipelineError::PhaseFailure {
        phase,
        source: AgentError::InvalidInput(format!("expected a {expected} artifact")),
    }
}
