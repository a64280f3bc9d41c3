// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tool protocol between the orchestrator and the tool server.
//!
//! Uses newline-delimited JSON. Every request carries an `id` that the
//! matching response echoes back.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ToolError, ToolErrorKind};
use crate::tools::ToolOutput;
use crate::types::ToolDefinition;

/// Generate a unique message ID.
pub fn generate_message_id() -> String {
    Uuid::new_v4().to_string()
}

// ============================================================================
// Client -> Server
// ============================================================================

/// Requests sent from the client to the tool server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolRequest {
    /// Capability discovery.
    ListTools { id: String },

    /// Invoke a tool.
    CallTool {
        id: String,
        name: String,
        arguments: serde_json::Value,
        /// Identity of the calling agent, for server-side logs.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caller: Option<String>,
    },
}

impl ToolRequest {
    pub fn list_tools() -> Self {
        Self::ListTools {
            id: generate_message_id(),
        }
    }

    pub fn call(
        name: impl Into<String>,
        arguments: serde_json::Value,
        caller: Option<String>,
    ) -> Self {
        Self::CallTool {
            id: generate_message_id(),
            name: name.into(),
            arguments,
            caller,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::ListTools { id } | Self::CallTool { id, .. } => id,
        }
    }
}

// ============================================================================
// Server -> Client
// ============================================================================

/// A tool failure as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    pub kind: ToolErrorKind,
    pub message: String,
}

impl From<&ToolError> for WireError {
    fn from(err: &ToolError) -> Self {
        Self {
            kind: err.kind(),
            message: err.detail(),
        }
    }
}

impl WireError {
    pub fn into_tool_error(self) -> ToolError {
        ToolError::from_wire(self.kind, self.message)
    }
}

/// Responses sent from the tool server to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolResponse {
    /// Answer to `list_tools`.
    Tools {
        id: String,
        version: String,
        tools: Vec<ToolDefinition>,
    },

    /// Answer to `call_tool`.
    Result {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<ToolOutput>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<WireError>,
    },

    /// The request line could not be understood.
    Error { id: String, error: WireError },
}

impl ToolResponse {
    /// Build the response to a tool call.
    pub fn result(id: impl Into<String>, result: &Result<ToolOutput, ToolError>) -> Self {
        match result {
            Ok(output) => Self::Result {
                id: id.into(),
                output: Some(output.clone()),
                error: None,
            },
            Err(err) => Self::Result {
                id: id.into(),
                output: None,
                error: Some(err.into()),
            },
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Tools { id, .. } | Self::Result { id, .. } | Self::Error { id, .. } => id,
        }
    }
}

// ============================================================================
// Encoding/Decoding
// ============================================================================

/// Encode a message to a JSON string with newline.
pub fn encode<T: Serialize>(msg: &T) -> Result<String, serde_json::Error> {
    let mut json = serde_json::to_string(msg)?;
    json.push('\n');
    Ok(json)
}

/// Decode a message from a JSON string.
pub fn decode<'a, T: Deserialize<'a>>(json: &'a str) -> Result<T, serde_json::Error> {
    serde_json::from_str(json.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let req = ToolRequest::CallTool {
            id: "1".to_string(),
            name: "read_file".to_string(),
            arguments: serde_json::json!({"path": "a.py"}),
            caller: None,
        };
        let line = encode(&req).unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(
            line.trim(),
            r#"{"type":"call_tool","id":"1","name":"read_file","arguments":{"path":"a.py"}}"#
        );
        assert_eq!(decode::<ToolRequest>(&line).unwrap(), req);
    }

    #[test]
    fn test_error_result_preserves_kind() {
        let resp = ToolResponse::result("7", &Err(ToolError::PathEscape("../x".into())));
        let decoded: ToolResponse = decode(&encode(&resp).unwrap()).unwrap();

        match decoded {
            ToolResponse::Result { id, output, error } => {
                assert_eq!(id, "7");
                assert!(output.is_none());
                let err = error.unwrap().into_tool_error();
                assert_eq!(err, ToolError::PathEscape("../x".into()));
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode::<ToolRequest>("not json").is_err());
        assert!(decode::<ToolRequest>(r#"{"type":"shutdown","id":"1"}"#).is_err());
    }

    #[test]
    fn test_unique_ids() {
        assert_ne!(ToolRequest::list_tools().id(), ToolRequest::list_tools().id());
    }
}
