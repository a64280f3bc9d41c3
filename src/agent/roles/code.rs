// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Code Generator: requirements to a syntax-checked set of Python files.

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use super::is_python;
use crate::agent::{AgentKind, AgentRole, ArtifactContent, Assessment, RequirementsSpec, SourceFileSet, WorkLog};
use crate::error::{AgentError, ToolError};
use crate::ipc::ScopedToolClient;
use crate::tools::{SyntaxCheck, READ_FILE, VALIDATE_PYTHON_SYNTAX};

/// Writes the application and accepts it only once every file parses.
#[derive(Debug, Clone, Default)]
pub struct CodeGenerator;

impl CodeGenerator {
    pub fn new() -> Self {
        Self
    }
}

/// Outcome of checking one written file.
enum FileCheck {
    Valid,
    Invalid(String),
}

/// Read `path` back and run the syntax check on what is actually on disk.
async fn check_file(tools: &ScopedToolClient, path: &str) -> Result<FileCheck, AgentError> {
    let source = match tools.call(READ_FILE, json!({ "path": path })).await {
        Ok(output) => output.content().to_string(),
        Err(err) if err.is_fatal() => return Err(err.into()),
        Err(err) => return Ok(FileCheck::Invalid(err.to_string())),
    };

    let output = tools
        .call(VALIDATE_PYTHON_SYNTAX, json!({ "code": source }))
        .await?;
    let check: SyntaxCheck = output
        .data()
        .cloned()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| ToolError::Protocol(format!("malformed syntax check result: {e}")))?
        .ok_or_else(|| ToolError::Protocol("syntax check returned no result".to_string()))?;

    Ok(if check.valid {
        FileCheck::Valid
    } else {
        FileCheck::Invalid(check.summary())
    })
}

#[async_trait]
impl AgentRole for CodeGenerator {
    type Input = RequirementsSpec;

    fn kind(&self) -> AgentKind {
        AgentKind::CodeGenerator
    }

    fn system_prompt(&self) -> String {
        "You are a Code Generator Agent. You write complete, runnable Python applications \
         using the file tools you are given. Nothing you write is ever executed, so check \
         every file with validate_python_syntax and fix it until it is valid."
            .to_string()
    }

    fn task_prompt(&self, spec: &RequirementsSpec) -> String {
        let requirements = spec
            .requirements
            .iter()
            .enumerate()
            .map(|(i, r)| format!("{}. {r}", i + 1))
            .collect::<Vec<_>>()
            .join("\n");
        let entities = spec
            .entities
            .iter()
            .map(|e| {
                let mut line = format!("- {}", e.name);
                if !e.description.is_empty() {
                    line.push_str(&format!(": {}", e.description));
                }
                if !e.attributes.is_empty() {
                    line.push_str(&format!(" ({})", e.attributes.join(", ")));
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"Generate complete Python code for the application described below.

REQUIREMENTS:
{requirements}

ENTITIES:
{entities}

INSTRUCTIONS:
1. Put the application in one Python package. Call 'create_directory' for the package directory before writing files into it; 'write_file' does not create directories.
2. Model every entity above (dataclasses or enums), implement every requirement, and add a command line entry point.
3. Every file needs a module docstring, type hints, and docstrings for classes and functions.
4. After writing a file, check it with 'validate_python_syntax' and rewrite it until it is valid.
5. When every file is written and valid, reply with a short summary of the files without calling any tool."#
        )
    }

    async fn assess(
        &mut self,
        _spec: &RequirementsSpec,
        _reply: &str,
        work: &WorkLog,
        tools: &ScopedToolClient,
    ) -> Result<Assessment, AgentError> {
        let files: Vec<String> = work
            .written_files()
            .iter()
            .filter(|p| is_python(p))
            .cloned()
            .collect();
        if files.is_empty() {
            return Ok(Assessment::Revise(
                "No Python files have been written yet. Write the application files with 'write_file'."
                    .to_string(),
            ));
        }

        let mut failures = Vec::new();
        for path in &files {
            if let FileCheck::Invalid(detail) = check_file(tools, path).await? {
                failures.push(format!("{path}: {detail}"));
            }
        }

        if !failures.is_empty() {
            debug!(invalid = failures.len(), total = files.len(), "Syntax gate rejected files");
            return Ok(Assessment::Revise(format!(
                "These files failed the syntax check and must be rewritten:\n{}",
                failures.join("\n")
            )));
        }

        info!(files = files.len(), "Syntax gate passed");
        Ok(Assessment::Complete(ArtifactContent::SourceFileSet(SourceFileSet { files })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Entity;

    #[test]
    fn test_task_prompt_lists_requirements_and_entities() {
        let spec = RequirementsSpec {
            requirements: vec!["Record expenses".to_string(), "Compare periods".to_string()],
            entities: vec![Entity {
                name: "Expense".to_string(),
                description: "A single spend".to_string(),
                attributes: vec!["amount".to_string(), "date".to_string()],
            }],
        };

        let prompt = CodeGenerator::new().task_prompt(&spec);
        assert!(prompt.contains("1. Record expenses"));
        assert!(prompt.contains("2. Compare periods"));
        assert!(prompt.contains("- Expense: A single spend (amount, date)"));
        assert!(prompt.contains("create_directory"));
    }
}
