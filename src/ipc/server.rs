// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tool server.
//!
//! Serves the tool registry over any byte stream: a platform IPC endpoint,
//! the process's stdin/stdout, or an in-memory duplex pipe. Each connection
//! is handled sequentially, one request line at a time.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::error::IpcError;
use super::protocol::{decode, encode, ToolRequest, ToolResponse, WireError};
use super::transport;
use crate::error::ToolError;
use crate::tools::{ToolRegistry, TELEMETRY_PREVIEW_MAX_BYTES, TOOLSET_VERSION};

/// Serves tool calls against a registry.
pub struct ToolServer {
    registry: ToolRegistry,
}

impl ToolServer {
    /// Create a server over the given registry.
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    /// The registry being served.
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Answer a single request.
    pub async fn handle(&self, request: ToolRequest) -> ToolResponse {
        match request {
            ToolRequest::ListTools { id } => ToolResponse::Tools {
                id,
                version: TOOLSET_VERSION.to_string(),
                tools: self.registry.definitions(),
            },
            ToolRequest::CallTool {
                id,
                name,
                arguments,
                caller,
            } => {
                debug!(tool = %name, caller = caller.as_deref().unwrap_or("-"), "Tool call received");
                let dispatched = self.registry.dispatch(&name, arguments).await;
                match &dispatched.result {
                    Ok(output) => debug!(
                        tool = %name,
                        output = %output.log_preview(TELEMETRY_PREVIEW_MAX_BYTES),
                        "Tool call succeeded"
                    ),
                    Err(err) => debug!(tool = %name, error = %err, "Tool call failed"),
                }
                ToolResponse::result(id, &dispatched.result)
            }
        }
    }

    /// Serve requests from `reader`, writing responses to `writer`, until EOF.
    pub async fn serve_io<R, W>(&self, reader: R, mut writer: W) -> Result<(), IpcError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            let read = reader
                .read_line(&mut line)
                .await
                .map_err(|e| IpcError::from_io_error("reading request", e))?;
            if read == 0 {
                debug!("Tool client disconnected");
                return Ok(());
            }
            if line.trim().is_empty() {
                continue;
            }

            let response = match decode::<ToolRequest>(&line) {
                Ok(request) => self.handle(request).await,
                Err(e) => {
                    warn!("Malformed tool request: {}", e);
                    ToolResponse::Error {
                        id: String::new(),
                        error: WireError::from(&ToolError::Protocol(format!(
                            "malformed request: {e}"
                        ))),
                    }
                }
            };

            let encoded = encode(&response)
                .map_err(|e| IpcError::InvalidMessage(format!("encode failed: {}", e)))?;
            writer
                .write_all(encoded.as_bytes())
                .await
                .map_err(|e| IpcError::WriteFailed(e.to_string()))?;
            writer
                .flush()
                .await
                .map_err(|e| IpcError::WriteFailed(e.to_string()))?;
        }
    }

    /// Serve a single bidirectional stream until the peer disconnects.
    pub async fn serve_connection<S>(&self, stream: S) -> Result<(), IpcError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        self.serve_io(read_half, write_half).await
    }

    /// Serve the process's stdin and stdout.
    pub async fn serve_stdio(&self) -> Result<(), IpcError> {
        info!("Tool server (v{}) serving on stdio", TOOLSET_VERSION);
        self.serve_io(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Listen on an IPC endpoint until `shutdown` flips to true.
    pub async fn listen(
        self: Arc<Self>,
        socket_path: &Path,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), IpcError> {
        let listener = transport::bind(socket_path)
            .await
            .map_err(|e| IpcError::BindFailed(e.to_string()))?;
        let _guard = EndpointGuard(socket_path.to_path_buf());
        info!(
            "Tool server (v{}) listening on {:?}",
            TOOLSET_VERSION, socket_path
        );

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let stream = accepted.map_err(|e| IpcError::AcceptFailed(e.to_string()))?;
                    debug!("New tool client connection");
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = server.serve_connection(stream).await {
                            error!("Tool connection ended with error: {}", e);
                        }
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Tool server stopped");
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Removes the endpoint when the listener goes away.
struct EndpointGuard(PathBuf);

impl Drop for EndpointGuard {
    fn drop(&mut self) {
        let _ = transport::cleanup(&self.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::OutputRoot;
    use tempfile::tempdir;

    fn server(root: &Path) -> ToolServer {
        ToolServer::new(ToolRegistry::for_output_root(OutputRoot::new(root).unwrap()))
    }

    #[tokio::test]
    async fn test_handle_list_tools() {
        let temp = tempdir().unwrap();
        let response = server(temp.path()).handle(ToolRequest::list_tools()).await;

        match response {
            ToolResponse::Tools { version, tools, .. } => {
                assert_eq!(version, TOOLSET_VERSION);
                assert_eq!(tools.len(), 6);
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_handle_call_tool_echoes_id() {
        let temp = tempdir().unwrap();
        let request = ToolRequest::call(
            "write_file",
            serde_json::json!({"path": "a.txt", "content": "hi"}),
            Some("test".to_string()),
        );
        let id = request.id().to_string();

        let response = server(temp.path()).handle(request).await;
        assert_eq!(response.id(), id);
        assert_eq!(std::fs::read_to_string(temp.path().join("a.txt")).unwrap(), "hi");
    }

    #[tokio::test]
    async fn test_serve_connection_survives_malformed_line() {
        use tokio::io::AsyncReadExt;

        let temp = tempdir().unwrap();
        let server = Arc::new(server(temp.path()));
        let (client, server_side) = tokio::io::duplex(4096);

        let task = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.serve_connection(server_side).await })
        };

        let (mut read_half, mut write_half) = tokio::io::split(client);
        write_half.write_all(b"garbage\n").await.unwrap();
        write_half
            .write_all(encode(&ToolRequest::list_tools()).unwrap().as_bytes())
            .await
            .unwrap();
        write_half.shutdown().await.unwrap();

        let mut out = String::new();
        read_half.read_to_string(&mut out).await.unwrap();
        let lines: Vec<ToolResponse> = out.lines().map(|l| decode(l).unwrap()).collect();

        assert!(matches!(lines[0], ToolResponse::Error { .. }));
        assert!(matches!(lines[1], ToolResponse::Tools { .. }));
        task.await.unwrap().unwrap();
    }
}
