// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! End-to-end pipeline runs against scripted model backends.

mod common;

use std::collections::BTreeMap;

use serde_json::json;
use tempfile::tempdir;
use tokio::sync::watch;

use aicoder::agent::{AgentKind, ArtifactKind};
use aicoder::config::PhaseBudgets;
use aicoder::error::{ErrorKind, ToolErrorKind};
use aicoder::pipeline::{Pipeline, PipelineOptions, PipelinePhase};
use aicoder::tools::check_python_syntax;
use aicoder::usage::UsageReport;

use common::*;

fn options() -> PipelineOptions {
    PipelineOptions::default()
}

// ============================================================================
// Successful runs
// ============================================================================

#[tokio::test]
async fn test_well_formed_run_completes() {
    let temp = tempdir().unwrap();
    let scripts = Scripts::well_formed();
    let pipeline = Pipeline::with_role_providers(
        in_process_client(temp.path()).await,
        scripts.providers(),
        options(),
    );

    let result = pipeline.run("track daily expenses and compare two date ranges").await;

    assert!(result.is_success(), "run failed: {:?}", result.error);
    assert_eq!(result.status, PipelinePhase::Completed);
    assert!(result.failed_phase.is_none());

    assert!(!result.files.is_empty());
    for file in &result.files {
        let source = std::fs::read_to_string(temp.path().join(file)).unwrap();
        assert!(check_python_syntax(&source).unwrap().valid, "{file} is invalid");
    }
    assert_eq!(result.test_files, vec!["test_expense_tracker.py".to_string()]);
    assert!(result.test_case_count >= 10);
}

#[tokio::test]
async fn test_artifacts_chain_in_phase_order() {
    let temp = tempdir().unwrap();
    let scripts = Scripts::well_formed();
    let pipeline = Pipeline::with_role_providers(
        in_process_client(temp.path()).await,
        scripts.providers(),
        options(),
    );

    let result = pipeline.run("track daily expenses").await;

    let kinds: Vec<ArtifactKind> = result.artifacts.iter().map(|a| a.kind()).collect();
    assert_eq!(
        kinds,
        vec![ArtifactKind::RequirementsSpec, ArtifactKind::SourceFileSet, ArtifactKind::TestFileSet]
    );
    assert_eq!(result.artifacts[0].derived_from, None);
    assert_eq!(result.artifacts[1].derived_from, Some(result.artifacts[0].id));
    assert_eq!(result.artifacts[2].derived_from, Some(result.artifacts[1].id));
    assert_eq!(result.artifacts[1].producer, AgentKind::CodeGenerator);
}

#[tokio::test]
async fn test_requirements_cover_expected_entities() {
    let temp = tempdir().unwrap();
    let scripts = Scripts::well_formed();
    let pipeline = Pipeline::with_role_providers(
        in_process_client(temp.path()).await,
        scripts.providers(),
        options(),
    );

    let result = pipeline.run("track daily expenses and compare two date ranges").await;

    let spec = result.artifacts[0].as_requirements().unwrap();
    for entity in ["Expense", "Category", "DateRange"] {
        assert!(spec.covers_entity(entity), "missing {entity}: {:?}", spec.entity_names());
    }

    let persisted = std::fs::read_to_string(temp.path().join("requirements_spec.json")).unwrap();
    let persisted: serde_json::Value = serde_json::from_str(&persisted).unwrap();
    assert_eq!(persisted["entities"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_usage_report_written_and_consistent() {
    let temp = tempdir().unwrap();
    let scripts = Scripts::well_formed();
    let pipeline = Pipeline::with_role_providers(
        in_process_client(temp.path()).await,
        scripts.providers(),
        options(),
    );

    let result = pipeline.run("track daily expenses").await;
    assert_eq!(result.report_path.as_deref(), Some("model_usage_report.json"));

    let written = std::fs::read_to_string(temp.path().join("model_usage_report.json")).unwrap();
    let report: UsageReport = serde_json::from_str(&written).unwrap();
    assert_eq!(report, result.usage_report);

    let raw: serde_json::Value = serde_json::from_str(&written).unwrap();
    assert_eq!(raw["code-model"]["numApiCalls"], json!(scripts.code.calls()));
    assert_eq!(
        raw["requirements-model"]["numApiCalls"],
        json!(scripts.requirements.calls())
    );
    assert!(raw["tests-model"]["totalTokens"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_usage_is_monotonic_and_sums_per_call() {
    let temp = tempdir().unwrap();
    let scripts = Scripts::well_formed();
    let pipeline = Pipeline::with_role_providers(
        in_process_client(temp.path()).await,
        scripts.providers(),
        options(),
    );

    let result = pipeline.run("track daily expenses").await;

    let mut running: BTreeMap<&str, u64> = BTreeMap::new();
    let mut previous_total = 0;
    for event in &result.usage_events {
        let total = running.entry(event.model.as_str()).or_default();
        *total += event.tokens;
        assert_eq!(*total, event.total_tokens_so_far);
        let grand: u64 = running.values().sum();
        assert!(grand >= previous_total);
        previous_total = grand;
    }
    for (model, usage) in result.usage_report.models() {
        assert_eq!(running[model], usage.total_tokens);
    }
    assert_eq!(
        result.usage_report.total_calls() as usize,
        scripts.requirements.calls() + scripts.code.calls() + scripts.tests.calls()
    );
}

// ============================================================================
// Capability restriction
// ============================================================================

#[tokio::test]
async fn test_agents_see_only_their_tools() {
    let temp = tempdir().unwrap();
    let scripts = Scripts::well_formed();
    let pipeline = Pipeline::with_role_providers(
        in_process_client(temp.path()).await,
        scripts.providers(),
        options(),
    );

    pipeline.run("track daily expenses").await;

    for offered in scripts.requirements.offered_tools() {
        assert_eq!(offered, vec!["write_file"]);
    }
    for offered in scripts.tests.offered_tools() {
        assert_eq!(offered, vec!["read_file", "write_file"]);
    }
    for offered in scripts.code.offered_tools() {
        assert!(!offered.contains(&"append_to_file".to_string()));
        assert!(!offered.contains(&"list_directory".to_string()));
    }
}

#[tokio::test]
async fn test_disallowed_tool_is_refused_without_effect() {
    let temp = tempdir().unwrap();
    let requirements = ScriptedProvider::new(
        "requirements-model",
        vec![
            tool_step(vec![call("r1", "create_directory", json!({"path": "sneaky"}))]),
            text_step(&requirements_json()),
        ],
    );
    let scripts = Scripts::new(requirements, code_script(), tests_script(12));
    let pipeline = Pipeline::with_role_providers(
        in_process_client(temp.path()).await,
        scripts.providers(),
        options(),
    );

    let result = pipeline.run("track daily expenses").await;

    assert!(result.is_success(), "run failed: {:?}", result.error);
    assert!(!temp.path().join("sneaky").exists());
    let denied: Vec<_> = result
        .invocations
        .iter()
        .filter(|i| i.caller == "requirements_analyzer" && i.tool == "create_directory")
        .collect();
    assert_eq!(denied.len(), 1);
    assert!(!denied[0].success);
}

#[tokio::test]
async fn test_test_phase_cannot_modify_accepted_sources() {
    let temp = tempdir().unwrap();
    let tests = ScriptedProvider::new(
        "tests-model",
        vec![
            tool_step(vec![
                call(
                    "t1",
                    "write_file",
                    json!({"path": "expense_tracker/models.py", "content": BROKEN_PY}),
                ),
                call(
                    "t2",
                    "write_file",
                    json!({"path": "./expense_tracker/helpers.py", "content": "x = 1\n"}),
                ),
            ]),
            tool_step(vec![call(
                "t3",
                "write_file",
                json!({"path": "test_expense_tracker.py", "content": test_module(12)}),
            )]),
            text_step("Wrote test_expense_tracker.py."),
        ],
    );
    let scripts = Scripts::new(requirements_script(), code_script(), tests);
    let pipeline = Pipeline::with_role_providers(
        in_process_client(temp.path()).await,
        scripts.providers(),
        options(),
    );

    let result = pipeline.run("track daily expenses").await;

    assert!(result.is_success(), "run failed: {:?}", result.error);
    let models = std::fs::read_to_string(temp.path().join("expense_tracker/models.py")).unwrap();
    assert_eq!(models, MODELS_PY);
    assert!(check_python_syntax(&models).unwrap().valid);
    assert!(!temp.path().join("expense_tracker/helpers.py").exists());

    let refused: Vec<_> = result
        .invocations_of("write_file")
        .filter(|i| i.caller == "test_generator" && !i.success)
        .collect();
    assert_eq!(refused.len(), 2);
    assert!(refused
        .iter()
        .all(|i| i.error_kind == Some(ToolErrorKind::ReadOnlyPath)));
    assert_eq!(result.test_files, vec!["test_expense_tracker.py".to_string()]);
}

// ============================================================================
// Failure handling
// ============================================================================

#[tokio::test]
async fn test_syntax_gate_exhausts_budget_and_skips_tests() {
    let temp = tempdir().unwrap();
    let scripts = Scripts::well_formed();
    let options = PipelineOptions {
        budgets: PhaseBudgets {
            requirements: 5,
            code: 6,
            tests: 5,
        },
        ..options()
    };
    let pipeline = Pipeline::with_role_providers(
        client_with_failing_syntax(temp.path()).await,
        scripts.providers(),
        options,
    );

    let result = pipeline.run("track daily expenses").await;

    assert_eq!(result.status, PipelinePhase::Failed);
    assert_eq!(result.failed_phase, Some(PipelinePhase::CodeGenPhase));
    assert_eq!(result.error_kind, Some(ErrorKind::BudgetExceeded));
    assert!(result.error.as_deref().unwrap().contains("CodeGenPhase"));

    assert_eq!(scripts.code.calls(), 6);
    assert_eq!(scripts.tests.calls(), 0);
    assert!(result.invocations.iter().all(|i| i.caller != "test_generator"));
    assert!(result.test_files.is_empty());

    // Partial output stays on disk and usage is still reported.
    assert_eq!(result.artifacts.len(), 1);
    assert!(temp.path().join("expense_tracker/models.py").exists());
    assert!(temp.path().join("model_usage_report.json").exists());
    assert_eq!(result.usage_report.get("code-model").unwrap().num_api_calls, 6);
}

#[tokio::test]
async fn test_invalid_file_is_regenerated_before_acceptance() {
    let temp = tempdir().unwrap();
    let code = ScriptedProvider::new(
        "code-model",
        vec![
            tool_step(vec![call("c1", "create_directory", json!({"path": "expense_tracker"}))]),
            tool_step(vec![call(
                "c2",
                "write_file",
                json!({"path": "expense_tracker/models.py", "content": BROKEN_PY}),
            )]),
            text_step("Done."),
            tool_step(vec![call(
                "c3",
                "write_file",
                json!({"path": "expense_tracker/models.py", "content": MODELS_PY}),
            )]),
            text_step("Fixed models.py."),
        ],
    );
    let scripts = Scripts::new(requirements_script(), code, tests_script(12));
    let pipeline = Pipeline::with_role_providers(
        in_process_client(temp.path()).await,
        scripts.providers(),
        options(),
    );

    let result = pipeline.run("track daily expenses").await;

    assert!(result.is_success(), "run failed: {:?}", result.error);
    assert_eq!(result.files, vec!["expense_tracker/models.py".to_string()]);
    let syntax_checks = result.invocations_of("validate_python_syntax").count();
    assert_eq!(syntax_checks, 2);
}

#[tokio::test]
async fn test_path_escape_fails_phase_without_mutation() {
    let temp = tempdir().unwrap();
    let root = temp.path().join("out");
    let code = ScriptedProvider::new(
        "code-model",
        vec![tool_step(vec![call(
            "c1",
            "write_file",
            json!({"path": "../escaped.py", "content": "x = 1\n"}),
        )])],
    );
    let scripts = Scripts::new(requirements_script(), code, tests_script(12));
    let pipeline = Pipeline::with_role_providers(
        in_process_client(&root).await,
        scripts.providers(),
        options(),
    );

    let result = pipeline.run("track daily expenses").await;

    assert_eq!(result.failed_phase, Some(PipelinePhase::CodeGenPhase));
    assert_eq!(result.error_kind, Some(ErrorKind::PermissionError));
    assert!(!temp.path().join("escaped.py").exists());
    assert_eq!(scripts.code.calls(), 1);
}

#[tokio::test]
async fn test_missing_parent_is_recoverable() {
    let temp = tempdir().unwrap();
    let code = ScriptedProvider::new(
        "code-model",
        vec![
            tool_step(vec![call(
                "c1",
                "write_file",
                json!({"path": "expense_tracker/models.py", "content": MODELS_PY}),
            )]),
            tool_step(vec![call("c2", "create_directory", json!({"path": "expense_tracker"}))]),
            tool_step(vec![call(
                "c3",
                "write_file",
                json!({"path": "expense_tracker/models.py", "content": MODELS_PY}),
            )]),
            text_step("Done."),
        ],
    );
    let scripts = Scripts::new(requirements_script(), code, tests_script(12));
    let pipeline = Pipeline::with_role_providers(
        in_process_client(temp.path()).await,
        scripts.providers(),
        options(),
    );

    let result = pipeline.run("track daily expenses").await;

    assert!(result.is_success(), "run failed: {:?}", result.error);
    let writes: Vec<bool> = result
        .invocations_of("write_file")
        .filter(|i| i.caller == "code_generator")
        .map(|i| i.success)
        .collect();
    assert_eq!(writes, vec![false, true]);
    assert!(temp.path().join("expense_tracker/models.py").exists());
}

#[tokio::test]
async fn test_undecodable_arguments_return_error_result() {
    let temp = tempdir().unwrap();
    let code = ScriptedProvider::new(
        "code-model",
        vec![
            tool_step(vec![malformed_call(
                "c0",
                "write_file",
                "EOF while parsing an object at line 1 column 16",
            )]),
            tool_step(vec![call("c1", "create_directory", json!({"path": "expense_tracker"}))]),
            tool_step(vec![call(
                "c2",
                "write_file",
                json!({"path": "expense_tracker/models.py", "content": MODELS_PY}),
            )]),
            text_step("Done."),
        ],
    );
    let scripts = Scripts::new(requirements_script(), code, tests_script(12));
    let pipeline = Pipeline::with_role_providers(
        in_process_client(temp.path()).await,
        scripts.providers(),
        options(),
    );

    let result = pipeline.run("track daily expenses").await;

    assert!(result.is_success(), "run failed: {:?}", result.error);
    let (content, is_error) = scripts.code.tool_results()[0].clone();
    assert!(is_error);
    assert!(content.contains("not valid JSON"), "{content}");
    assert!(content.contains("EOF while parsing"), "{content}");

    // The undecodable call never reaches the tool server.
    let writes = result
        .invocations_of("write_file")
        .filter(|i| i.caller == "code_generator")
        .count();
    assert_eq!(writes, 1);
}

#[tokio::test]
async fn test_requirements_file_in_subdirectory() {
    let temp = tempdir().unwrap();
    let scripts = Scripts::well_formed();
    let options = PipelineOptions {
        requirements_file: "specs/requirements_spec.json".to_string(),
        usage_report_file: "reports/usage.json".to_string(),
        ..options()
    };
    let pipeline = Pipeline::with_role_providers(
        in_process_client(temp.path()).await,
        scripts.providers(),
        options,
    );

    let result = pipeline.run("track daily expenses").await;

    assert!(result.is_success(), "run failed: {:?}", result.error);
    assert!(temp.path().join("specs/requirements_spec.json").is_file());
    assert!(temp.path().join("reports/usage.json").is_file());
    assert_eq!(scripts.requirements.calls(), 1);
}

#[tokio::test]
async fn test_unsaveable_requirements_are_revised_not_fatal() {
    let temp = tempdir().unwrap();
    std::fs::create_dir(temp.path().join("requirements_spec.json")).unwrap();
    let requirements = ScriptedProvider::new("requirements-model", Vec::new())
        .with_fallback(text_step(&format!("```json\n{}\n```", requirements_json())));
    let scripts = Scripts::new(requirements, code_script(), tests_script(12));
    let options = PipelineOptions {
        budgets: PhaseBudgets {
            requirements: 3,
            code: 5,
            tests: 5,
        },
        ..options()
    };
    let pipeline = Pipeline::with_role_providers(
        in_process_client(temp.path()).await,
        scripts.providers(),
        options,
    );

    let result = pipeline.run("track daily expenses").await;

    assert_eq!(result.failed_phase, Some(PipelinePhase::RequirementsPhase));
    assert_eq!(result.error_kind, Some(ErrorKind::BudgetExceeded));
    assert!(result.error.as_deref().unwrap().contains("is a directory"));
    assert_eq!(scripts.requirements.calls(), 3);
    assert_eq!(scripts.code.calls(), 0);
    let failed_writes = result
        .invocations_of("write_file")
        .filter(|i| i.caller == "requirements_analyzer" && !i.success)
        .count();
    assert_eq!(failed_writes, 3);
}

#[tokio::test]
async fn test_too_few_tests_fails_test_phase() {
    let temp = tempdir().unwrap();
    let scripts = Scripts::new(requirements_script(), code_script(), tests_script(3));
    let pipeline = Pipeline::with_role_providers(
        in_process_client(temp.path()).await,
        scripts.providers(),
        options(),
    );

    let result = pipeline.run("track daily expenses").await;

    assert_eq!(result.failed_phase, Some(PipelinePhase::TestGenPhase));
    assert_eq!(result.error_kind, Some(ErrorKind::InsufficientTests));
    assert_eq!(result.test_case_count, 3);
    assert!(!result.files.is_empty());
    assert!(temp.path().join("test_expense_tracker.py").exists());
}

#[tokio::test]
async fn test_cancelled_run_fails_at_first_phase() {
    let temp = tempdir().unwrap();
    let scripts = Scripts::well_formed();
    let (cancel_tx, cancel_rx) = watch::channel(false);
    cancel_tx.send(true).unwrap();
    let pipeline = Pipeline::with_role_providers(
        in_process_client(temp.path()).await,
        scripts.providers(),
        options(),
    )
    .with_cancellation(cancel_rx);

    let result = pipeline.run("track daily expenses").await;

    assert_eq!(result.failed_phase, Some(PipelinePhase::RequirementsPhase));
    assert_eq!(result.error_kind, Some(ErrorKind::Cancelled));
    assert_eq!(scripts.requirements.calls(), 0);
}

#[tokio::test]
async fn test_cancellation_mid_phase_stops_before_next_call() {
    let temp = tempdir().unwrap();
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let scripts = Scripts::new(
        requirements_script(),
        code_script().cancel_after(2, cancel_tx),
        tests_script(12),
    );
    let pipeline = Pipeline::with_role_providers(
        in_process_client(temp.path()).await,
        scripts.providers(),
        options(),
    )
    .with_cancellation(cancel_rx);

    let result = pipeline.run("track daily expenses").await;

    assert_eq!(result.status, PipelinePhase::Failed);
    assert_eq!(result.failed_phase, Some(PipelinePhase::CodeGenPhase));
    assert_eq!(result.error_kind, Some(ErrorKind::Cancelled));
    assert_eq!(scripts.code.calls(), 2);
    assert_eq!(scripts.tests.calls(), 0);
    assert!(result.invocations.iter().all(|i| i.caller != "test_generator"));

    // The answered call's tool work finished before the loop stopped.
    assert!(temp.path().join("expense_tracker/models.py").exists());
    assert_eq!(result.artifacts.len(), 1);
    assert_eq!(result.usage_report.get("code-model").unwrap().num_api_calls, 2);
}

// ============================================================================
// Append safety
// ============================================================================

#[tokio::test]
async fn test_pipeline_never_appends() {
    let temp = tempdir().unwrap();
    let scripts = Scripts::well_formed();
    let pipeline = Pipeline::with_role_providers(
        in_process_client(temp.path()).await,
        scripts.providers(),
        options(),
    );

    let result = pipeline.run("track daily expenses").await;

    assert!(result.is_success());
    assert_eq!(result.invocations_of("append_to_file").count(), 0);
}
