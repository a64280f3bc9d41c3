// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tool client used by the orchestrator.
//!
//! The client discovers the server's tool set once at connect time and
//! refuses to proceed if the server is unreachable or speaks a different
//! tool set version. Calls are strictly request/response; a lost connection
//! is reported as [`ToolError::Connection`] and never retried.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::audit::{AuditLog, ToolInvocation};
use super::error::IpcError;
use super::protocol::{decode, encode, ToolRequest, ToolResponse};
use super::server::ToolServer;
use super::transport::{self, IpcStream};
use crate::error::ToolError;
use crate::tools::{normalize_path, ToolOutput, APPEND_TO_FILE, TOOLSET_VERSION, WRITE_FILE};
use crate::types::ToolDefinition;

const CONNECT_RETRY_ATTEMPTS: usize = 3;
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(100);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);
const DUPLEX_BUFFER: usize = 64 * 1024;

type BoxedReader = BufReader<Box<dyn AsyncRead + Unpin + Send>>;
type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// One open connection to a tool server.
struct Connection {
    reader: BoxedReader,
    writer: BoxedWriter,
    /// Keeps a spawned server process alive for the lifetime of the client.
    _child: Option<Child>,
}

impl Connection {
    fn from_stream(stream: IpcStream) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(Box::new(read_half) as Box<dyn AsyncRead + Unpin + Send>),
            writer: Box::new(write_half) as BoxedWriter,
            _child: None,
        }
    }

    async fn roundtrip(&mut self, request: &ToolRequest) -> Result<ToolResponse, IpcError> {
        let encoded = encode(request)
            .map_err(|e| IpcError::InvalidMessage(format!("encode failed: {}", e)))?;
        self.writer
            .write_all(encoded.as_bytes())
            .await
            .map_err(|e| IpcError::WriteFailed(e.to_string()))?;
        self.writer
            .flush()
            .await
            .map_err(|e| IpcError::WriteFailed(e.to_string()))?;

        let mut line = String::new();
        let read = self
            .reader
            .read_line(&mut line)
            .await
            .map_err(|e| IpcError::from_io_error("reading response", e))?;
        if read == 0 {
            return Err(IpcError::ConnectionClosed);
        }

        let response: ToolResponse = decode(&line)
            .map_err(|e| IpcError::InvalidMessage(format!("decode failed: {}", e)))?;
        if response.id() != request.id() {
            return Err(IpcError::InvalidMessage(format!(
                "response id {} does not match request {}",
                response.id(),
                request.id()
            )));
        }
        Ok(response)
    }
}

/// Connection to a tool server with a discovered, versioned tool set.
pub struct ToolClient {
    connection: Mutex<Connection>,
    tools: Vec<ToolDefinition>,
    version: String,
    call_timeout: Duration,
}

impl ToolClient {
    /// Connect to a server listening on an IPC endpoint.
    pub async fn connect(socket_path: impl AsRef<Path>) -> Result<Self, ToolError> {
        let socket_path = socket_path.as_ref();
        let mut last_error: Option<String> = None;

        for attempt in 0..CONNECT_RETRY_ATTEMPTS {
            match tokio::time::timeout(CONNECT_TIMEOUT, transport::connect(socket_path)).await {
                Ok(Ok(stream)) => {
                    info!("Connected to tool server at {:?}", socket_path);
                    return Self::discover(Connection::from_stream(stream)).await;
                }
                Ok(Err(err)) => last_error = Some(err.to_string()),
                Err(_) => last_error = Some("connect timeout".to_string()),
            }

            if attempt + 1 < CONNECT_RETRY_ATTEMPTS {
                tokio::time::sleep(CONNECT_RETRY_DELAY).await;
            }
        }

        Err(IpcError::ConnectFailed(format!(
            "{}: {}",
            socket_path.display(),
            last_error.unwrap_or_else(|| "failed to connect".to_string())
        ))
        .into())
    }

    /// Spawn a tool server process and talk to it over its stdin/stdout.
    pub async fn spawn(program: impl AsRef<Path>, args: &[String]) -> Result<Self, ToolError> {
        let program: PathBuf = program.as_ref().to_path_buf();
        let mut child = Command::new(&program)
            .args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| IpcError::SpawnFailed(format!("{}: {}", program.display(), e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| IpcError::SpawnFailed("stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| IpcError::SpawnFailed("stdout not captured".to_string()))?;

        info!("Spawned tool server {:?}", program);
        Self::discover(Connection {
            reader: BufReader::new(Box::new(stdout) as Box<dyn AsyncRead + Unpin + Send>),
            writer: Box::new(stdin) as BoxedWriter,
            _child: Some(child),
        })
        .await
    }

    /// Run `server` on a background task connected through an in-memory pipe.
    pub async fn in_process(server: Arc<ToolServer>) -> Result<Self, ToolError> {
        let (client_side, server_side) = tokio::io::duplex(DUPLEX_BUFFER);
        tokio::spawn(async move {
            if let Err(e) = server.serve_connection(server_side).await {
                warn!("In-process tool server stopped: {}", e);
            }
        });
        Self::discover(Connection::from_stream(Box::new(client_side))).await
    }

    async fn discover(mut connection: Connection) -> Result<Self, ToolError> {
        let response = tokio::time::timeout(
            CONNECT_TIMEOUT,
            connection.roundtrip(&ToolRequest::list_tools()),
        )
        .await
        .map_err(|_| IpcError::Timeout)
        .and_then(|r| r)
        .map_err(|e| ToolError::from(IpcError::HandshakeFailed(e.to_string())))?;

        match response {
            ToolResponse::Tools { version, tools, .. } => {
                if version != TOOLSET_VERSION {
                    return Err(IpcError::HandshakeFailed(format!(
                        "server tool set version {version}, expected {TOOLSET_VERSION}"
                    ))
                    .into());
                }
                debug!(version = %version, tools = tools.len(), "Tool discovery complete");
                Ok(Self {
                    connection: Mutex::new(connection),
                    tools,
                    version,
                    call_timeout: DEFAULT_CALL_TIMEOUT,
                })
            }
            other => Err(IpcError::HandshakeFailed(format!(
                "unexpected discovery response: {other:?}"
            ))
            .into()),
        }
    }

    /// Override the per-call timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Tool descriptors advertised by the server.
    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    /// Tool set version advertised by the server.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Look up an advertised tool.
    pub fn definition(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Invoke a tool on the server.
    pub async fn call(
        &self,
        name: &str,
        arguments: serde_json::Value,
        caller: Option<&str>,
    ) -> Result<ToolOutput, ToolError> {
        let request = ToolRequest::call(name, arguments, caller.map(str::to_string));
        let mut connection = self.connection.lock().await;

        let response = tokio::time::timeout(self.call_timeout, connection.roundtrip(&request))
            .await
            .map_err(|_| ToolError::from(IpcError::Timeout))??;

        match response {
            ToolResponse::Result {
                output: Some(output),
                error: None,
                ..
            } => Ok(output),
            ToolResponse::Result {
                error: Some(error), ..
            }
            | ToolResponse::Error { error, .. } => Err(error.into_tool_error()),
            other => Err(ToolError::Protocol(format!(
                "unexpected response to {name}: {other:?}"
            ))),
        }
    }

    /// Restrict this client to the tools one agent may use.
    ///
    /// Every allowed tool must be advertised by the server; a missing
    /// capability is reported as a connection error.
    pub fn scoped(
        self: &Arc<Self>,
        caller: impl Into<String>,
        allowed: &[&str],
        audit: AuditLog,
    ) -> Result<ScopedToolClient, ToolError> {
        let caller = caller.into();
        let mut set = BTreeSet::new();
        for name in allowed {
            if self.definition(name).is_none() {
                return Err(ToolError::Connection(format!(
                    "tool server does not offer {name} required by {caller}"
                )));
            }
            set.insert((*name).to_string());
        }

        Ok(ScopedToolClient {
            client: Arc::clone(self),
            caller,
            allowed: set,
            audit,
            read_only: BTreeSet::new(),
            writable: None,
            applied_appends: std::sync::Mutex::new(Vec::new()),
        })
    }
}

/// A tool client bound to one agent and its allow-list.
pub struct ScopedToolClient {
    client: Arc<ToolClient>,
    caller: String,
    allowed: BTreeSet<String>,
    audit: AuditLog,
    /// Normalized paths this caller may read but not modify.
    read_only: BTreeSet<String>,
    /// Paths this caller may modify, when restricted.
    writable: Option<fn(&str) -> bool>,
    /// (normalized path, content) of appends applied since the last overwrite.
    applied_appends: std::sync::Mutex<Vec<(String, String)>>,
}

impl ScopedToolClient {
    /// Identity used in logs and the audit trail.
    pub fn caller(&self) -> &str {
        &self.caller
    }

    /// Refuse writes and appends to `paths`.
    pub fn with_read_only<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.read_only
            .extend(paths.into_iter().map(|p| normalize_path(p.as_ref())));
        self
    }

    /// Refuse writes and appends to paths for which `rule` is false.
    pub fn with_writable(mut self, rule: fn(&str) -> bool) -> Self {
        self.writable = Some(rule);
        self
    }

    /// Whether the allow-list includes `name`.
    pub fn permits(&self, name: &str) -> bool {
        self.allowed.contains(name)
    }

    /// Descriptors of the permitted tools, in server order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.client
            .tools()
            .iter()
            .filter(|t| self.allowed.contains(&t.name))
            .cloned()
            .collect()
    }

    /// Invoke a tool after checking the allow-list.
    ///
    /// Writes to read-only paths, or to paths the writable rule rejects, fail
    /// with [`ToolError::ReadOnlyPath`]. Paths are compared after
    /// normalization. Identical `append_to_file` calls are refused unless the file has been
    /// rewritten in between, so a replayed call cannot duplicate content.
    pub async fn call(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolOutput, ToolError> {
        if !self.permits(name) {
            let err = ToolError::NotPermitted {
                tool: name.to_string(),
                caller: self.caller.clone(),
            };
            self.audit
                .record(ToolInvocation::new(&self.caller, name, &arguments, Err(&err), Duration::ZERO));
            return Err(err);
        }

        let path = normalize_path(
            arguments
                .get("path")
                .and_then(|v| v.as_str())
                .unwrap_or_default(),
        );
        let content = arguments
            .get("content")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let mutating = name == WRITE_FILE || name == APPEND_TO_FILE;
        let writable = self.writable.map_or(true, |rule| rule(&path));
        if mutating && (self.read_only.contains(&path) || !writable) {
            let err = ToolError::ReadOnlyPath(path);
            self.audit
                .record(ToolInvocation::new(&self.caller, name, &arguments, Err(&err), Duration::ZERO));
            return Err(err);
        }

        if name == APPEND_TO_FILE && self.append_already_applied(&path, &content) {
            let err = ToolError::DuplicateAppend(path);
            self.audit
                .record(ToolInvocation::new(&self.caller, name, &arguments, Err(&err), Duration::ZERO));
            return Err(err);
        }

        let started = Instant::now();
        let result = self.client.call(name, arguments.clone(), Some(&self.caller)).await;
        self.audit.record(ToolInvocation::new(
            &self.caller,
            name,
            &arguments,
            result.as_ref(),
            started.elapsed(),
        ));

        if result.is_ok() {
            self.note_applied(name, path, content);
        }
        result
    }

    fn append_already_applied(&self, path: &str, content: &str) -> bool {
        let applied = self
            .applied_appends
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        applied.iter().any(|(p, c)| p == path && c == content)
    }

    fn note_applied(&self, name: &str, path: String, content: String) {
        let mut applied = self
            .applied_appends
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match name {
            APPEND_TO_FILE => applied.push((path, content)),
            WRITE_FILE => applied.retain(|(p, _)| *p != path),
            _ => {}
        }
    }
}
