// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Output root sandbox.
//!
//! Every filesystem tool resolves its `path` argument through [`OutputRoot::resolve`].
//! Resolution is checked twice:
//!
//! 1. Lexically: absolute paths, drive prefixes, and `..` components that climb
//!    above the root are rejected before touching the filesystem.
//! 2. Against the real filesystem: the deepest existing ancestor is canonicalized
//!    and must still live under the canonical root, which catches symlinks that
//!    point outside.

use std::path::{Component, Path, PathBuf};

use crate::error::ToolError;

/// The single directory all filesystem tools are confined to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRoot {
    root: PathBuf,
}

impl OutputRoot {
    /// Open (creating if needed) the output root.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, ToolError> {
        let path = path.as_ref();
        std::fs::create_dir_all(path).map_err(|e| {
            ToolError::Filesystem(format!("cannot create output root {}: {e}", path.display()))
        })?;
        let root = std::fs::canonicalize(path).map_err(|e| {
            ToolError::Filesystem(format!("cannot resolve output root {}: {e}", path.display()))
        })?;
        Ok(Self { root })
    }

    /// Canonical path of the root.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolve a root-relative path, refusing anything that escapes the root.
    pub fn resolve(&self, requested: &str) -> Result<PathBuf, ToolError> {
        let escape = || ToolError::PathEscape(requested.to_string());

        let mut clean = PathBuf::new();
        for component in Path::new(requested).components() {
            match component {
                Component::Normal(part) => clean.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    if !clean.pop() {
                        return Err(escape());
                    }
                }
                Component::RootDir | Component::Prefix(_) => return Err(escape()),
            }
        }

        let candidate = self.root.join(&clean);

        let mut probe = candidate.clone();
        loop {
            match std::fs::canonicalize(&probe) {
                Ok(real) => {
                    if !real.starts_with(&self.root) {
                        return Err(escape());
                    }
                    break;
                }
                Err(_) => {
                    // A dangling symlink cannot be verified.
                    if probe.symlink_metadata().is_ok() {
                        return Err(escape());
                    }
                    if !probe.pop() || !probe.starts_with(&self.root) {
                        return Err(escape());
                    }
                }
            }
        }

        Ok(candidate)
    }

    /// Render an absolute path under the root as a root-relative string.
    pub fn display_relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_else(|_| path.display().to_string())
    }
}

/// Lexical form of a root-relative path, used to compare paths from
/// different calls. `..` folds into its parent; leading ones are kept.
pub fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." if parts.last().is_some_and(|p| *p != "..") => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }
    parts.join("/")
}
