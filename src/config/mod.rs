// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration module for aicoder.
//!
//! Handles loading, merging, and validation of configuration from multiple sources:
//! - Global config: ~/.aicoder/config.json
//! - Workspace config: .aicoder.json, .aicoder/config.json, aicoder.config.json or .aicoder.yaml
//! - Local config: .aicoder.local.json (gitignored, for personal overrides)
//! - CLI options: command-line arguments
//!
//! Configuration is merged with precedence (CLI > local > workspace > global > defaults).

mod loader;
mod merger;
mod types;

pub use loader::{
    discover_workspace_root, global_config_path, read_config_file, starter_config,
    write_workspace_config, ConfigLayer, CONFIG_FILES, GLOBAL_CONFIG_DIR, GLOBAL_CONFIG_FILE,
    LOCAL_CONFIG_FILE,
};

pub use merger::{default_config, merge_config, CliOptions};

pub use types::{
    BudgetsConfig, PhaseBudgets, ResolvedConfig, RoleModels, ToolServerMode, WorkspaceConfig,
};

use crate::error::ConfigError;
use std::path::Path;

/// Load and merge all configuration sources for a workspace.
pub fn load_config(
    workspace_root: &Path,
    cli_options: CliOptions,
) -> Result<ResolvedConfig, ConfigError> {
    let global = ConfigLayer::Global.load(workspace_root)?;
    let workspace = ConfigLayer::Workspace.load(workspace_root)?;
    let local = ConfigLayer::Local.load(workspace_root)?;

    let config = merge_config(global, workspace, local, cli_options);
    validate(&config)?;
    Ok(config)
}

fn validate(config: &ResolvedConfig) -> Result<(), ConfigError> {
    let budgets = [
        ("budgets.requirements", config.budgets.requirements),
        ("budgets.code", config.budgets.code),
        ("budgets.tests", config.budgets.tests),
    ];
    if let Some((field, _)) = budgets.iter().find(|(_, n)| *n == 0) {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            message: "must be at least 1".to_string(),
        });
    }
    if !(0.0..=1.0).contains(&config.target_pass_rate) {
        return Err(ConfigError::InvalidValue {
            field: "targetPassRate".to_string(),
            message: "must be between 0 and 1".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_config_with_no_files() {
        let temp = TempDir::new().unwrap();
        let config = load_config(temp.path(), CliOptions::default()).unwrap();
        assert!(!config.provider.is_empty());
    }

    #[test]
    fn test_load_config_cli_override() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(".aicoder.json"),
            r#"{"provider": "openai", "minTestCases": 12}"#,
        )
        .unwrap();

        let cli = CliOptions {
            provider: Some("ollama".to_string()),
            ..Default::default()
        };

        let config = load_config(temp.path(), cli).unwrap();
        assert_eq!(config.provider, "ollama");
        assert_eq!(config.min_test_cases, 12);
    }

    #[test]
    fn test_zero_budget_is_rejected() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(".aicoder.json"),
            r#"{"budgets": {"tests": 0}}"#,
        )
        .unwrap();

        match load_config(temp.path(), CliOptions::default()) {
            Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, "budgets.tests"),
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }
}
