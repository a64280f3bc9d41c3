// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! IPC error types for the tool transport.

use std::io;
use thiserror::Error;

use crate::error::ToolError;

/// Errors that can occur in the IPC subsystem.
#[derive(Debug, Error)]
pub enum IpcError {
    /// Failed to bind to the socket/pipe.
    #[error("Failed to bind IPC endpoint: {0}")]
    BindFailed(String),

    /// Failed to accept an incoming connection.
    #[error("Failed to accept IPC connection: {0}")]
    AcceptFailed(String),

    /// Failed to connect to the IPC endpoint.
    #[error("Failed to connect to IPC endpoint: {0}")]
    ConnectFailed(String),

    /// Failed to spawn the tool server process.
    #[error("Failed to spawn tool server: {0}")]
    SpawnFailed(String),

    /// Failed to read from the IPC stream.
    #[error("Failed to read from IPC stream: {0}")]
    ReadFailed(String),

    /// Failed to write to the IPC stream.
    #[error("Failed to write to IPC stream: {0}")]
    WriteFailed(String),

    /// Discovery handshake failed.
    #[error("Tool discovery failed: {0}")]
    HandshakeFailed(String),

    /// Invalid message received.
    #[error("Invalid IPC message: {0}")]
    InvalidMessage(String),

    /// Connection closed unexpectedly.
    #[error("IPC connection closed unexpectedly")]
    ConnectionClosed,

    /// Timeout waiting for response.
    #[error("IPC operation timed out")]
    Timeout,
}

impl IpcError {
    /// Create an IPC error from an IO error with context.
    pub fn from_io_error(context: &str, err: io::Error) -> Self {
        IpcError::ReadFailed(format!("{}: {}", context, err))
    }
}

impl From<IpcError> for ToolError {
    fn from(err: IpcError) -> Self {
        match err {
            IpcError::InvalidMessage(_) => ToolError::Protocol(err.to_string()),
            _ => ToolError::Connection(err.to_string()),
        }
    }
}

/// Result type for IPC operations.
pub type IpcResult<T> = Result<T, IpcError>;
