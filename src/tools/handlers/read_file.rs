// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Read file tool handler.
//!
//! Returns the exact content of a file under the output root.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::fs;

#[cfg(feature = "telemetry")]
use tracing::{debug, instrument};

use crate::error::ToolError;
use crate::tools::registry::{ToolHandler, ToolOutput};
use crate::tools::sandbox::OutputRoot;
use crate::tools::{parse_arguments, READ_FILE};
use crate::types::{InputSchema, ToolDefinition};

/// Handler for the `read_file` tool.
pub struct ReadFileHandler {
    root: OutputRoot,
}

impl ReadFileHandler {
    pub fn new(root: OutputRoot) -> Self {
        Self { root }
    }
}

/// Arguments for the read_file tool.
#[derive(Debug, Deserialize)]
struct ReadFileArgs {
    /// Path relative to the output root.
    path: String,
}

#[async_trait]
impl ToolHandler for ReadFileHandler {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(READ_FILE, "Read the full contents of a file under the output root")
            .with_schema(
                InputSchema::new()
                    .with_property("path", serde_json::json!({
                        "type": "string",
                        "description": "File path relative to the output root"
                    }))
                    .with_required(vec!["path".to_string()]),
            )
    }

    #[cfg_attr(feature = "telemetry", instrument(skip(self, input), fields(path, bytes)))]
    async fn execute(&self, input: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let args: ReadFileArgs = parse_arguments(&input)?;
        let path = self.root.resolve(&args.path)?;
        let shown = self.root.display_relative(&path);

        let meta = fs::metadata(&path)
            .await
            .map_err(|_| ToolError::NotFound(shown.clone()))?;
        if meta.is_dir() {
            return Err(ToolError::Filesystem(format!("{shown} is a directory")));
        }

        let content = fs::read_to_string(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ToolError::NotFound(shown.clone()),
            _ => ToolError::Filesystem(format!("Failed to read {shown}: {e}")),
        })?;

        #[cfg(feature = "telemetry")]
        {
            tracing::Span::current().record("path", shown.as_str());
            tracing::Span::current().record("bytes", content.len());
            debug!(path = %shown, bytes = content.len(), "File read complete");
        }

        Ok(ToolOutput::success(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_read_file_exact_content() {
        let temp = tempdir().unwrap();
        let body = "line 1\n\tline 2\n\nline 4";
        std::fs::write(temp.path().join("test.txt"), body).unwrap();
        let handler = ReadFileHandler::new(OutputRoot::new(temp.path()).unwrap());

        let result = handler
            .execute(serde_json::json!({"path": "test.txt"}))
            .await
            .unwrap();

        assert_eq!(result.content(), body);
    }

    #[tokio::test]
    async fn test_read_file_not_found() {
        let temp = tempdir().unwrap();
        let handler = ReadFileHandler::new(OutputRoot::new(temp.path()).unwrap());

        let result = handler
            .execute(serde_json::json!({"path": "nonexistent.txt"}))
            .await;

        assert!(matches!(result, Err(ToolError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_read_file_directory() {
        let temp = tempdir().unwrap();
        std::fs::create_dir(temp.path().join("pkg")).unwrap();
        let handler = ReadFileHandler::new(OutputRoot::new(temp.path()).unwrap());

        let result = handler.execute(serde_json::json!({"path": "pkg"})).await;
        assert!(matches!(result, Err(ToolError::Filesystem(_))));
    }

    #[tokio::test]
    async fn test_read_file_escape() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("secret.txt"), "s").unwrap();
        let handler = ReadFileHandler::new(OutputRoot::new(temp.path().join("out")).unwrap());

        let result = handler
            .execute(serde_json::json!({"path": "../secret.txt"}))
            .await;
        assert!(matches!(result, Err(ToolError::PathEscape(_))));
    }
}
