// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Pipeline phases and the forward-only state machine over them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::AgentKind;
use crate::error::PipelineError;

/// Phase of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelinePhase {
    NotStarted,
    RequirementsPhase,
    CodeGenPhase,
    TestGenPhase,
    Completed,
    /// Absorbing failure state.
    Failed,
}

impl PipelinePhase {
    /// The phase that follows this one on success.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::NotStarted => Some(Self::RequirementsPhase),
            Self::RequirementsPhase => Some(Self::CodeGenPhase),
            Self::CodeGenPhase => Some(Self::TestGenPhase),
            Self::TestGenPhase => Some(Self::Completed),
            Self::Completed | Self::Failed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// The agent that works in this phase.
    pub fn agent(&self) -> Option<AgentKind> {
        match self {
            Self::RequirementsPhase => Some(AgentKind::RequirementsAnalyzer),
            Self::CodeGenPhase => Some(AgentKind::CodeGenerator),
            Self::TestGenPhase => Some(AgentKind::TestGenerator),
            _ => None,
        }
    }
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "NotStarted",
            Self::RequirementsPhase => "RequirementsPhase",
            Self::CodeGenPhase => "CodeGenPhase",
            Self::TestGenPhase => "TestGenPhase",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// One recorded transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: PipelinePhase,
    pub to: PipelinePhase,
    pub at: DateTime<Utc>,
}

/// Current phase plus the history that led to it.
///
/// Phases only move forward one step at a time. `Failed` can be entered from
/// any non-terminal phase and remembers where the run stopped.
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    phase: PipelinePhase,
    failed_in: Option<PipelinePhase>,
    history: Vec<Transition>,
}

impl Default for PipelinePhase {
    fn default() -> Self {
        Self::NotStarted
    }
}

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> PipelinePhase {
        self.phase
    }

    /// Phase the run was in when it failed.
    pub fn failed_in(&self) -> Option<PipelinePhase> {
        self.failed_in
    }

    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    /// Move to `to`, which must be the next phase.
    pub fn advance(&mut self, to: PipelinePhase) -> Result<(), PipelineError> {
        if self.phase.next() != Some(to) {
            return Err(PipelineError::InvalidTransition { from: self.phase, to });
        }
        self.record(to);
        Ok(())
    }

    /// Enter `Failed` from the current phase.
    pub fn fail(&mut self) -> Result<(), PipelineError> {
        if self.phase.is_terminal() {
            return Err(PipelineError::InvalidTransition {
                from: self.phase,
                to: PipelinePhase::Failed,
            });
        }
        self.failed_in = Some(self.phase);
        self.record(PipelinePhase::Failed);
        Ok(())
    }

    fn record(&mut self, to: PipelinePhase) {
        self.history.push(Transition {
            from: self.phase,
            to,
            at: Utc::now(),
        });
        self.phase = to;
    }
}
