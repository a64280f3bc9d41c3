// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Create directory tool handler.
//!
//! Creates a directory and any missing parents. Calling it on a directory
//! that already exists succeeds without changing anything.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::fs;

#[cfg(feature = "telemetry")]
use tracing::{debug, instrument};

use crate::error::ToolError;
use crate::tools::registry::{ToolHandler, ToolOutput};
use crate::tools::sandbox::OutputRoot;
use crate::tools::{parse_arguments, CREATE_DIRECTORY};
use crate::types::{InputSchema, ToolDefinition};

/// Handler for the `create_directory` tool.
pub struct CreateDirectoryHandler {
    root: OutputRoot,
}

impl CreateDirectoryHandler {
    pub fn new(root: OutputRoot) -> Self {
        Self { root }
    }
}

#[derive(Debug, Deserialize)]
struct CreateDirectoryArgs {
    path: String,
}

#[async_trait]
impl ToolHandler for CreateDirectoryHandler {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            CREATE_DIRECTORY,
            "Create a directory (and missing parents) under the output root",
        )
        .with_schema(
            InputSchema::new()
                .with_property("path", serde_json::json!({
                    "type": "string",
                    "description": "Directory path relative to the output root"
                }))
                .with_required(vec!["path".to_string()]),
        )
        .mutating()
    }

    #[cfg_attr(feature = "telemetry", instrument(skip(self, input), fields(path, created)))]
    async fn execute(&self, input: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let args: CreateDirectoryArgs = parse_arguments(&input)?;
        let path = self.root.resolve(&args.path)?;
        let shown = self.root.display_relative(&path);

        #[cfg(feature = "telemetry")]
        tracing::Span::current().record("path", shown.as_str());

        match fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => {
                return Ok(ToolOutput::structured(
                    format!("Directory already exists: {shown}"),
                    serde_json::json!({ "path": shown, "created": false }),
                ));
            }
            Ok(_) => {
                return Err(ToolError::Filesystem(format!(
                    "{shown} exists and is not a directory"
                )));
            }
            Err(_) => {}
        }

        fs::create_dir_all(&path)
            .await
            .map_err(|e| ToolError::Filesystem(format!("Failed to create {shown}: {e}")))?;

        #[cfg(feature = "telemetry")]
        {
            tracing::Span::current().record("created", true);
            debug!(path = %shown, "Directory created");
        }

        Ok(ToolOutput::structured(
            format!("Created directory {shown}"),
            serde_json::json!({ "path": shown, "created": true }),
        ))
    }
}
