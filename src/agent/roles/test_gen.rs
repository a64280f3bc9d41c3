// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Test Generator: source files to pytest test files.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use tracing::{debug, warn};

use super::is_test_file;
use crate::agent::{
    AgentKind, AgentRole, ArtifactContent, Assessment, SourceFileSet, TestCase, TestFileSet, WorkLog,
};
use crate::error::AgentError;
use crate::ipc::ScopedToolClient;
use crate::tools::READ_FILE;

/// Module-level test functions and test methods inside classes.
static TEST_FN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*(?:async[ \t]+)?def[ \t]+(test_\w*)[ \t]*\(").unwrap());

/// Test functions defined in `source`, each name once.
pub fn find_test_cases(file: &str, source: &str) -> Vec<TestCase> {
    let mut cases: Vec<TestCase> = Vec::new();
    for caps in TEST_FN.captures_iter(source) {
        let name = &caps[1];
        if !cases.iter().any(|c| c.name == name) {
            cases.push(TestCase {
                file: file.to_string(),
                name: name.to_string(),
            });
        }
    }
    cases
}

/// Writes tests for the generated modules.
///
/// Aims for `min_test_cases`; after a limited number of reminders it hands
/// back whatever it has and leaves enforcement to the pipeline.
#[derive(Debug, Clone)]
pub struct TestGenerator {
    min_test_cases: usize,
    reminders_left: usize,
}

impl TestGenerator {
    pub fn new(min_test_cases: usize) -> Self {
        Self {
            min_test_cases,
            reminders_left: 2,
        }
    }

    pub fn min_test_cases(&self) -> usize {
        self.min_test_cases
    }
}

#[async_trait]
impl AgentRole for TestGenerator {
    type Input = SourceFileSet;

    fn kind(&self) -> AgentKind {
        AgentKind::TestGenerator
    }

    fn system_prompt(&self) -> String {
        "You are a Test Generator Agent. You read Python modules and write thorough pytest \
         test suites for them."
            .to_string()
    }

    fn writable_paths(&self) -> Option<fn(&str) -> bool> {
        Some(is_test_file)
    }

    fn task_prompt(&self, sources: &SourceFileSet) -> String {
        let files = sources
            .files
            .iter()
            .map(|f| format!("- {f}"))
            .collect::<Vec<_>>()
            .join("\n");
        let suggested = sources
            .files
            .iter()
            .find_map(|f| f.split_once('/').map(|(pkg, _)| pkg.to_string()))
            .map(|pkg| format!("test_{pkg}.py"))
            .unwrap_or_else(|| "test_app.py".to_string());

        format!(
            r#"Create test cases for the generated Python application.

SOURCE FILES:
{files}

STEPS:
1. Read the source files with 'read_file' to learn the actual classes, functions and signatures.
2. Write '{suggested}' in the output root with 'write_file'. It must contain AT LEAST {min} pytest test functions named test_*, covering creation of every data type, every operation, edge cases and persistence.
3. Each test needs a docstring and clear assertions, and must import from the generated package exactly as it is written.
4. When the test file is written, reply with a short summary without calling any tool."#,
            min = self.min_test_cases
        )
    }

    async fn assess(
        &mut self,
        _sources: &SourceFileSet,
        _reply: &str,
        work: &WorkLog,
        tools: &ScopedToolClient,
    ) -> Result<Assessment, AgentError> {
        let files: Vec<String> = work
            .written_files()
            .iter()
            .filter(|p| is_test_file(p))
            .cloned()
            .collect();
        if files.is_empty() {
            return Ok(Assessment::Revise(
                "No test file has been written yet. Write a test_*.py file with 'write_file'.".to_string(),
            ));
        }

        let mut test_cases = Vec::new();
        for path in &files {
            match tools.call(READ_FILE, json!({ "path": path })).await {
                Ok(output) => test_cases.extend(find_test_cases(path, output.content())),
                Err(err) if err.is_fatal() => return Err(err.into()),
                Err(err) => warn!(file = %path, error = %err, "Test file unreadable"),
            }
        }

        let found = test_cases.len();
        if found < self.min_test_cases && self.reminders_left > 0 {
            self.reminders_left -= 1;
            debug!(found, required = self.min_test_cases, "Too few test cases");
            return Ok(Assessment::Revise(format!(
                "Only {found} test functions were found; at least {} are required. Add more tests.",
                self.min_test_cases
            )));
        }

        Ok(Assessment::Complete(ArtifactContent::TestFileSet(TestFileSet {
            files,
            test_cases,
        })))
    }
}
