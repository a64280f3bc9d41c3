// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Transport between the orchestrator and the tool server.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                ┌──────────────────┐
//! │   Orchestrator   │                │   Tool Server    │
//! │                  │  socket/pipe,  │                  │
//! │ ScopedToolClient │  stdio, or     │   ToolRegistry   │
//! │   └ ToolClient ──┼──duplex────────┼─► ToolServer     │
//! └──────────────────┘                └──────────────────┘
//! ```
//!
//! # Protocol
//!
//! Messages are newline-delimited JSON (NDJSON), one request and one
//! response per line, matched by `id`.
//!
//! - `list_tools` / `tools` - capability discovery with the tool set version
//! - `call_tool` / `result` - tool invocation and its output or typed error
//! - `error` - the request line could not be decoded

pub mod audit;
pub mod client;
pub mod error;
pub mod protocol;
pub mod server;
pub mod transport;

pub use audit::{AuditLog, ToolInvocation};
pub use client::{ScopedToolClient, ToolClient};
pub use error::{IpcError, IpcResult};
pub use protocol::{decode, encode, ToolRequest, ToolResponse, WireError};
pub use server::ToolServer;
