// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Locating and reading the config layers.
//!
//! A run reads up to three files: the user's global defaults, the project
//! file checked into the workspace, and a local override kept out of version
//! control. Each is a partial [`WorkspaceConfig`]; `merger` combines them.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

use super::types::{RoleModels, WorkspaceConfig};

/// Project file names, first match wins.
pub const CONFIG_FILES: &[&str] = &[
    ".aicoder.json",
    ".aicoder/config.json",
    "aicoder.config.json",
    ".aicoder.yaml",
];

/// Personal override beside the project file.
pub const LOCAL_CONFIG_FILE: &str = ".aicoder.local.json";

/// Directory under `$HOME` holding the global file.
pub const GLOBAL_CONFIG_DIR: &str = ".aicoder";

pub const GLOBAL_CONFIG_FILE: &str = "config.json";

/// One source of partial configuration, lowest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLayer {
    Global,
    Workspace,
    Local,
}

impl ConfigLayer {
    pub const ALL: [ConfigLayer; 3] = [Self::Global, Self::Workspace, Self::Local];

    /// The file this layer reads for `workspace_root`, if one exists.
    pub fn locate(self, workspace_root: &Path) -> Option<PathBuf> {
        match self {
            Self::Global => global_config_path().filter(|p| p.is_file()),
            Self::Workspace => CONFIG_FILES
                .iter()
                .map(|name| workspace_root.join(name))
                .find(|p| p.is_file()),
            Self::Local => Some(workspace_root.join(LOCAL_CONFIG_FILE)).filter(|p| p.is_file()),
        }
    }

    /// Read this layer. A missing file is `Ok(None)`; a malformed one is an error.
    pub fn load(self, workspace_root: &Path) -> Result<Option<WorkspaceConfig>, ConfigError> {
        self.locate(workspace_root)
            .map(|path| read_config_file(&path))
            .transpose()
    }
}

/// `~/.aicoder/config.json`, when a home directory is known.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(GLOBAL_CONFIG_DIR).join(GLOBAL_CONFIG_FILE))
}

/// Parse a config file, YAML for `.yaml`/`.yml` and JSON otherwise.
/// Parse errors name the file.
pub fn read_config_file(path: &Path) -> Result<WorkspaceConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));

    if yaml {
        serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::YamlError(format!("{}: {e}", path.display())))
    } else {
        serde_json::from_str(&content)
            .map_err(|e| ConfigError::JsonError(format!("{}: {e}", path.display())))
    }
}

/// Nearest directory at or above `start` holding a project file.
pub fn discover_workspace_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| ConfigLayer::Workspace.locate(dir).is_some())
        .map(Path::to_path_buf)
}

/// Write `config` as `.aicoder.json` in `workspace_root`, replacing any
/// existing file of that name.
pub fn write_workspace_config(
    workspace_root: &Path,
    config: &WorkspaceConfig,
) -> Result<PathBuf, ConfigError> {
    let path = workspace_root.join(CONFIG_FILES[0]);
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, content)?;
    Ok(path)
}

/// What `aicoder init` writes: Gemini for every role, ten tests minimum.
pub fn starter_config() -> WorkspaceConfig {
    WorkspaceConfig {
        provider: Some("gemini".to_string()),
        model: Some("gemini-2.0-flash".to_string()),
        models: Some(RoleModels {
            code: Some("gemini-2.0-flash".to_string()),
            ..Default::default()
        }),
        output_dir: Some(PathBuf::from("output")),
        min_test_cases: Some(10),
        ..Default::default()
    }
}
