// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! List directory tool handler.
//!
//! Lists the immediate entries of a directory under the output root, sorted
//! by name. Directories are marked with a trailing `/` in the text output.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::fs;

#[cfg(feature = "telemetry")]
use tracing::{debug, instrument};

use crate::error::ToolError;
use crate::tools::registry::{ToolHandler, ToolOutput};
use crate::tools::sandbox::OutputRoot;
use crate::tools::{parse_arguments, LIST_DIRECTORY};
use crate::types::{InputSchema, ToolDefinition};

/// Handler for the `list_directory` tool.
pub struct ListDirHandler {
    root: OutputRoot,
}

impl ListDirHandler {
    pub fn new(root: OutputRoot) -> Self {
        Self { root }
    }
}

#[derive(Debug, Deserialize)]
struct ListDirArgs {
    /// Directory relative to the output root (default: the root itself).
    #[serde(default)]
    path: String,
}

#[async_trait]
impl ToolHandler for ListDirHandler {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(LIST_DIRECTORY, "List the entries of a directory under the output root")
            .with_schema(InputSchema::new().with_property("path", serde_json::json!({
                "type": "string",
                "description": "Directory path relative to the output root (default: root)"
            })))
    }

    #[cfg_attr(feature = "telemetry", instrument(skip(self, input), fields(path, entries)))]
    async fn execute(&self, input: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let args: ListDirArgs = parse_arguments(&input)?;
        let path = self.root.resolve(&args.path)?;
        let shown = self.root.display_relative(&path);
        let label = if shown.is_empty() { ".".to_string() } else { shown };

        let meta = fs::metadata(&path)
            .await
            .map_err(|_| ToolError::NotFound(label.clone()))?;
        if !meta.is_dir() {
            return Err(ToolError::Filesystem(format!("{label} is not a directory")));
        }

        let mut reader = fs::read_dir(&path)
            .await
            .map_err(|e| ToolError::Filesystem(format!("Failed to read {label}: {e}")))?;

        let mut entries: Vec<(String, bool)> = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| ToolError::Filesystem(format!("Failed to read {label}: {e}")))?
        {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            entries.push((entry.file_name().to_string_lossy().into_owned(), is_dir));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        #[cfg(feature = "telemetry")]
        {
            tracing::Span::current().record("path", label.as_str());
            tracing::Span::current().record("entries", entries.len());
            debug!(path = %label, entries = entries.len(), "Directory listed");
        }

        let text = if entries.is_empty() {
            "[Empty directory]".to_string()
        } else {
            entries
                .iter()
                .map(|(name, is_dir)| if *is_dir { format!("{name}/") } else { name.clone() })
                .collect::<Vec<_>>()
                .join("\n")
        };
        let names: Vec<&str> = entries.iter().map(|(name, _)| name.as_str()).collect();

        Ok(ToolOutput::structured(text, serde_json::json!({ "entries": names })))
    }
}
