// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Append to file tool handler.
//!
//! Appends text to an existing file. The file is never created implicitly.
//! Appending is not idempotent: replaying the same call appends the suffix again.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

#[cfg(feature = "telemetry")]
use tracing::{debug, instrument};

use crate::error::ToolError;
use crate::tools::registry::{ToolHandler, ToolOutput};
use crate::tools::sandbox::OutputRoot;
use crate::tools::{parse_arguments, APPEND_TO_FILE, WRITE_FILE};
use crate::types::{InputSchema, ToolDefinition};

/// Handler for the `append_to_file` tool.
pub struct AppendFileHandler {
    root: OutputRoot,
}

impl AppendFileHandler {
    pub fn new(root: OutputRoot) -> Self {
        Self { root }
    }
}

#[derive(Debug, Deserialize)]
struct AppendFileArgs {
    path: String,
    content: String,
}

#[async_trait]
impl ToolHandler for AppendFileHandler {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            APPEND_TO_FILE,
            "Append content to the end of an existing file under the output root",
        )
        .with_schema(
            InputSchema::new()
                .with_property("path", serde_json::json!({
                    "type": "string",
                    "description": "File path relative to the output root"
                }))
                .with_property("content", serde_json::json!({
                    "type": "string",
                    "description": "Text to append"
                }))
                .with_required(vec!["path".to_string(), "content".to_string()]),
        )
        .mutating()
    }

    #[cfg_attr(feature = "telemetry", instrument(skip(self, input), fields(path, bytes)))]
    async fn execute(&self, input: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let args: AppendFileArgs = parse_arguments(&input)?;
        let path = self.root.resolve(&args.path)?;
        let shown = self.root.display_relative(&path);

        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                return Err(ToolError::Filesystem(format!("{shown} is not a regular file")));
            }
            Err(_) => {
                return Err(ToolError::Filesystem(format!(
                    "{shown} does not exist; use {WRITE_FILE} to create it"
                )));
            }
        }

        let mut file = OpenOptions::new()
            .append(true)
            .open(&path)
            .await
            .map_err(|e| ToolError::Filesystem(format!("Failed to open {shown}: {e}")))?;
        file.write_all(args.content.as_bytes())
            .await
            .map_err(|e| ToolError::Filesystem(format!("Failed to append to {shown}: {e}")))?;
        file.flush()
            .await
            .map_err(|e| ToolError::Filesystem(format!("Failed to append to {shown}: {e}")))?;

        let bytes = args.content.len();

        #[cfg(feature = "telemetry")]
        {
            tracing::Span::current().record("path", shown.as_str());
            tracing::Span::current().record("bytes", bytes);
            debug!(path = %shown, bytes, "Append complete");
        }

        Ok(ToolOutput::structured(
            format!("Appended {bytes} bytes to {shown}"),
            serde_json::json!({ "path": shown, "bytes": bytes }),
        ))
    }
}
