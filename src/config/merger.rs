// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration merging.
//!
//! Handles merging configurations from different sources with proper precedence.

use std::path::PathBuf;

use super::types::{ResolvedConfig, ToolServerMode, WorkspaceConfig};

/// CLI options that can override configuration.
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub min_test_cases: Option<usize>,
    pub tool_server: Option<ToolServerMode>,
    pub socket_path: Option<PathBuf>,
}

/// Default configuration values.
pub fn default_config() -> ResolvedConfig {
    ResolvedConfig::default()
}

/// Merge multiple configurations with precedence.
///
/// Precedence (highest to lowest):
/// 1. CLI options
/// 2. Local config (.aicoder.local.json)
/// 3. Workspace config (.aicoder.json)
/// 4. Global config (~/.aicoder/config.json)
/// 5. Default values
pub fn merge_config(
    global: Option<WorkspaceConfig>,
    workspace: Option<WorkspaceConfig>,
    local: Option<WorkspaceConfig>,
    cli: CliOptions,
) -> ResolvedConfig {
    let mut result = default_config();

    for config in [global, workspace, local].into_iter().flatten() {
        apply_workspace_config(&mut result, &config);
    }

    apply_cli_options(&mut result, &cli);

    result
}

fn apply_workspace_config(result: &mut ResolvedConfig, config: &WorkspaceConfig) {
    if let Some(ref provider) = config.provider {
        result.provider = provider.clone();
    }

    if config.model.is_some() {
        result.model = config.model.clone();
    }

    if config.base_url.is_some() {
        result.base_url = config.base_url.clone();
    }

    if config.temperature.is_some() {
        result.temperature = config.temperature;
    }

    if config.max_tokens.is_some() {
        result.max_tokens = config.max_tokens;
    }

    if let Some(ref models) = config.models {
        if models.requirements.is_some() {
            result.models.requirements = models.requirements.clone();
        }
        if models.code.is_some() {
            result.models.code = models.code.clone();
        }
        if models.tests.is_some() {
            result.models.tests = models.tests.clone();
        }
    }

    if let Some(ref dir) = config.output_dir {
        result.output_dir = dir.clone();
    }

    if let Some(ref budgets) = config.budgets {
        if let Some(n) = budgets.requirements {
            result.budgets.requirements = n;
        }
        if let Some(n) = budgets.code {
            result.budgets.code = n;
        }
        if let Some(n) = budgets.tests {
            result.budgets.tests = n;
        }
    }

    if let Some(n) = config.min_test_cases {
        result.min_test_cases = n;
    }

    if let Some(rate) = config.target_pass_rate {
        result.target_pass_rate = rate;
    }

    if let Some(ref file) = config.usage_report_file {
        result.usage_report_file = file.clone();
    }

    if let Some(ref file) = config.requirements_file {
        result.requirements_file = file.clone();
    }

    if let Some(mode) = config.tool_server {
        result.tool_server = mode;
    }

    if config.socket_path.is_some() {
        result.socket_path = config.socket_path.clone();
    }
}

fn apply_cli_options(result: &mut ResolvedConfig, cli: &CliOptions) {
    if let Some(ref provider) = cli.provider {
        result.provider = provider.clone();
    }

    if cli.model.is_some() {
        result.model = cli.model.clone();
    }

    if cli.base_url.is_some() {
        result.base_url = cli.base_url.clone();
    }

    if let Some(ref dir) = cli.output_dir {
        result.output_dir = dir.clone();
    }

    if let Some(n) = cli.min_test_cases {
        result.min_test_cases = n;
    }

    if let Some(mode) = cli.tool_server {
        result.tool_server = mode;
    }

    if cli.socket_path.is_some() {
        result.socket_path = cli.socket_path.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{BudgetsConfig, RoleModels};

    #[test]
    fn test_merge_config_precedence() {
        let global = WorkspaceConfig {
            provider: Some("gemini".to_string()),
            model: Some("global-model".to_string()),
            ..Default::default()
        };

        let workspace = WorkspaceConfig {
            model: Some("workspace-model".to_string()),
            ..Default::default()
        };

        let local = WorkspaceConfig {
            model: Some("local-model".to_string()),
            ..Default::default()
        };

        let cli = CliOptions {
            provider: Some("openai".to_string()),
            ..Default::default()
        };

        let result = merge_config(Some(global), Some(workspace), Some(local), cli);

        assert_eq!(result.provider, "openai");
        assert_eq!(result.model, Some("local-model".to_string()));
    }

    #[test]
    fn test_partial_budgets_keep_defaults() {
        let workspace = WorkspaceConfig {
            budgets: Some(BudgetsConfig {
                code: Some(5),
                ..Default::default()
            }),
            ..Default::default()
        };

        let result = merge_config(None, Some(workspace), None, CliOptions::default());
        assert_eq!(result.budgets.code, 5);
        assert_eq!(result.budgets.requirements, 50);
        assert_eq!(result.budgets.tests, 80);
    }

    #[test]
    fn test_role_models_merge_per_field() {
        let global = WorkspaceConfig {
            models: Some(RoleModels {
                code: Some("big".to_string()),
                tests: Some("small".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let workspace = WorkspaceConfig {
            models: Some(RoleModels {
                tests: Some("medium".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let result = merge_config(Some(global), Some(workspace), None, CliOptions::default());
        assert_eq!(result.models.code.as_deref(), Some("big"));
        assert_eq!(result.models.tests.as_deref(), Some("medium"));
        assert!(result.models.requirements.is_none());
    }

    #[test]
    fn test_cli_options_override() {
        let workspace = WorkspaceConfig {
            output_dir: Some(PathBuf::from("ws-out")),
            tool_server: Some(ToolServerMode::Socket),
            min_test_cases: Some(15),
            ..Default::default()
        };

        let cli = CliOptions {
            output_dir: Some(PathBuf::from("cli-out")),
            tool_server: Some(ToolServerMode::Spawn),
            ..Default::default()
        };

        let result = merge_config(None, Some(workspace), None, cli);

        assert_eq!(result.output_dir, PathBuf::from("cli-out"));
        assert_eq!(result.tool_server, ToolServerMode::Spawn);
        assert_eq!(result.min_test_cases, 15);
    }
}
