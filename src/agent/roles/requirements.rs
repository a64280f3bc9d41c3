// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Requirements Analyzer: free-text description to structured requirements.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::extract_json;
use crate::agent::{AgentKind, AgentRole, ArtifactContent, Assessment, RequirementsSpec, WorkLog};
use crate::error::AgentError;
use crate::ipc::ScopedToolClient;
use crate::tools::WRITE_FILE;

/// Extracts requirements and entities, then persists them as JSON.
#[derive(Debug, Clone)]
pub struct RequirementsAnalyzer {
    requirements_file: String,
}

impl RequirementsAnalyzer {
    /// `requirements_file` is relative to the output root. Its parent
    /// directory must exist, since this agent cannot create directories.
    pub fn new(requirements_file: impl Into<String>) -> Self {
        Self {
            requirements_file: requirements_file.into(),
        }
    }

    pub fn requirements_file(&self) -> &str {
        &self.requirements_file
    }

    fn parse(reply: &str) -> Result<RequirementsSpec, String> {
        let body = extract_json(reply).ok_or_else(|| {
            "Your reply contained no JSON object. Reply with the requirements JSON only.".to_string()
        })?;
        let spec: RequirementsSpec = serde_json::from_str(body)
            .map_err(|e| format!("The requirements JSON could not be parsed ({e}). Follow the required shape exactly."))?;

        if spec.requirements.iter().all(|r| r.trim().is_empty()) {
            return Err("The \"requirements\" list is empty. List every functional requirement.".to_string());
        }
        if spec.entities.is_empty() {
            return Err("The \"entities\" list is empty. Name every data entity the software manages.".to_string());
        }
        if spec.entities.iter().any(|e| e.name.trim().is_empty()) {
            return Err("Every entity needs a non-empty \"name\".".to_string());
        }
        Ok(spec)
    }
}

#[async_trait]
impl AgentRole for RequirementsAnalyzer {
    type Input = str;

    fn kind(&self) -> AgentKind {
        AgentKind::RequirementsAnalyzer
    }

    fn system_prompt(&self) -> String {
        "You are a Requirements Analyzer Agent. You turn a free-text software description \
         into precise, structured requirements that a code generator can implement."
            .to_string()
    }

    fn task_prompt(&self, description: &str) -> String {
        format!(
            r#"Analyze the following software description and extract detailed, structured requirements.

SOFTWARE DESCRIPTION:
{description}

INSTRUCTIONS:
1. Identify every functional requirement, in order of importance.
2. Identify every data entity the software manages (for example records, categories, periods), with a short description and its attributes.
3. Reply with a single JSON object and nothing else:

{{"requirements": ["..."], "entities": [{{"name": "...", "description": "...", "attributes": ["..."]}}]}}

The structured requirements will be saved to '{file}' for you. Be concise but thorough."#,
            file = self.requirements_file
        )
    }

    async fn assess(
        &mut self,
        _description: &str,
        reply: &str,
        _work: &WorkLog,
        tools: &ScopedToolClient,
    ) -> Result<Assessment, AgentError> {
        let spec = match Self::parse(reply) {
            Ok(spec) => spec,
            Err(feedback) => return Ok(Assessment::Revise(feedback)),
        };

        let content = serde_json::to_string_pretty(&spec)
            .map_err(|e| AgentError::InvalidInput(format!("requirements not serializable: {e}")))?;
        let saved = tools
            .call(
                WRITE_FILE,
                json!({ "path": self.requirements_file, "content": content }),
            )
            .await;
        match saved {
            Ok(_) => {}
            Err(err) if err.is_fatal() => return Err(err.into()),
            Err(err) => {
                return Ok(Assessment::Revise(format!(
                    "The requirements could not be saved to '{}': {err}. Reply with the requirements JSON again.",
                    self.requirements_file
                )));
            }
        }

        debug!(
            requirements = spec.requirements.len(),
            entities = ?spec.entity_names(),
            file = %self.requirements_file,
            "Requirements persisted"
        );
        Ok(Assessment::Complete(ArtifactContent::RequirementsSpec(spec)))
    }
}
