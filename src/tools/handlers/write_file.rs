// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Write file tool handler.
//!
//! Creates or overwrites a file under the output root. The parent directory
//! must already exist; the content is written to a sibling temp file and
//! renamed into place so readers never observe a partial write.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

#[cfg(feature = "telemetry")]
use tracing::{debug, instrument};

use crate::error::ToolError;
use crate::tools::registry::{ToolHandler, ToolOutput};
use crate::tools::sandbox::OutputRoot;
use crate::tools::{parse_arguments, CREATE_DIRECTORY, WRITE_FILE};
use crate::types::{InputSchema, ToolDefinition};

/// Handler for the `write_file` tool.
pub struct WriteFileHandler {
    root: OutputRoot,
}

impl WriteFileHandler {
    pub fn new(root: OutputRoot) -> Self {
        Self { root }
    }
}

/// Arguments for the write_file tool.
#[derive(Debug, Deserialize)]
struct WriteFileArgs {
    /// Path relative to the output root.
    path: String,

    /// Full file content.
    content: String,
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4().simple()))
}

async fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    let tmp = temp_path_for(path);
    let result = async {
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, path).await
    }
    .await;

    if result.is_err() {
        let _ = fs::remove_file(&tmp).await;
    }
    result
}

#[async_trait]
impl ToolHandler for WriteFileHandler {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            WRITE_FILE,
            "Write content to a file under the output root, replacing it if it exists. \
             The parent directory must already exist.",
        )
        .with_schema(
            InputSchema::new()
                .with_property("path", serde_json::json!({
                    "type": "string",
                    "description": "File path relative to the output root"
                }))
                .with_property("content", serde_json::json!({
                    "type": "string",
                    "description": "The complete content to write"
                }))
                .with_required(vec!["path".to_string(), "content".to_string()]),
        )
        .mutating()
    }

    #[cfg_attr(feature = "telemetry", instrument(skip(self, input), fields(path, bytes, created)))]
    async fn execute(&self, input: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let args: WriteFileArgs = parse_arguments(&input)?;
        let path = self.root.resolve(&args.path)?;
        let shown = self.root.display_relative(&path);

        #[cfg(feature = "telemetry")]
        tracing::Span::current().record("path", shown.as_str());

        let parent = path
            .parent()
            .ok_or_else(|| ToolError::InvalidInput(format!("{shown} has no parent")))?;
        match fs::metadata(parent).await {
            Ok(meta) if meta.is_dir() => {}
            _ => {
                return Err(ToolError::Filesystem(format!(
                    "Parent directory of {shown} does not exist; call {CREATE_DIRECTORY} first"
                )));
            }
        }

        let existed = match fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => {
                return Err(ToolError::Filesystem(format!("{shown} is a directory")));
            }
            Ok(_) => true,
            Err(_) => false,
        };

        write_atomic(&path, &args.content)
            .await
            .map_err(|e| ToolError::Filesystem(format!("Failed to write {shown}: {e}")))?;

        let action = if existed { "Updated" } else { "Created" };
        let lines = args.content.lines().count();
        let bytes = args.content.len();

        #[cfg(feature = "telemetry")]
        {
            tracing::Span::current().record("bytes", bytes);
            tracing::Span::current().record("created", !existed);
            debug!(path = %shown, bytes, lines, created = !existed, "File write complete");
        }

        Ok(ToolOutput::structured(
            format!("{action} {shown} ({lines} lines, {bytes} bytes)"),
            serde_json::json!({ "path": shown, "bytes": bytes, "created": !existed }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn handler(root: &Path) -> WriteFileHandler {
        WriteFileHandler::new(OutputRoot::new(root).unwrap())
    }

    #[tokio::test]
    async fn test_write_file_new() {
        let temp = tempdir().unwrap();
        let result = handler(temp.path())
            .execute(serde_json::json!({"path": "new_file.txt", "content": "Hello, world!"}))
            .await
            .unwrap();

        assert!(result.content().contains("Created"));
        assert_eq!(
            std::fs::read_to_string(temp.path().join("new_file.txt")).unwrap(),
            "Hello, world!"
        );
    }

    #[tokio::test]
    async fn test_write_file_overwrite() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("existing.txt");
        std::fs::write(&file, "old content").unwrap();

        let result = handler(temp.path())
            .execute(serde_json::json!({"path": "existing.txt", "content": "new content"}))
            .await
            .unwrap();

        assert!(result.content().contains("Updated"));
        assert_eq!(result.data().unwrap()["created"], false);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "new content");
    }

    #[tokio::test]
    async fn test_write_file_requires_parent() {
        let temp = tempdir().unwrap();
        let result = handler(temp.path())
            .execute(serde_json::json!({"path": "nested/dir/file.txt", "content": "x"}))
            .await;

        assert!(matches!(result, Err(ToolError::Filesystem(_))));
        assert!(!temp.path().join("nested").exists());
    }

    #[tokio::test]
    async fn test_write_file_escape_leaves_disk_untouched() {
        let temp = tempdir().unwrap();
        let result = handler(&temp.path().join("out"))
            .execute(serde_json::json!({"path": "../escaped.txt", "content": "x"}))
            .await;

        assert!(matches!(result, Err(ToolError::PathEscape(_))));
        assert!(!temp.path().join("escaped.txt").exists());
    }

    #[tokio::test]
    async fn test_write_file_leaves_no_temp_files() {
        let temp = tempdir().unwrap();
        handler(temp.path())
            .execute(serde_json::json!({"path": "a.py", "content": "x = 1\n"}))
            .await
            .unwrap();

        let names: Vec<String> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.py"]);
    }

    #[tokio::test]
    async fn test_write_file_onto_directory() {
        let temp = tempdir().unwrap();
        std::fs::create_dir(temp.path().join("pkg")).unwrap();
        let result = handler(temp.path())
            .execute(serde_json::json!({"path": "pkg", "content": "x"}))
            .await;

        assert!(matches!(result, Err(ToolError::Filesystem(_))));
    }
}
