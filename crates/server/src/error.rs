//! Structured errors raised by the tool layer itself.
//!
//! Engine failures arrive as `tilesync_core::Error` and convert on their own;
//! these cover requests the server rejects before reaching the engine.

use rmcp::model::{ErrorCode, ErrorData as McpError};

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Invalid input parameters (e.g., clearing without confirmation).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// No download job is tracked for the namespace.
    #[error("JOB_NOT_FOUND: {0}")]
    JobNotFound(String),

    /// Tool output could not be encoded.
    #[error("INTERNAL_ERROR: {0}")]
    Serialize(String),
}

impl From<ToolError> for McpError {
    fn from(err: ToolError) -> Self {
        let code = match &err {
            ToolError::InvalidInput(_) => -32602,
            ToolError::JobNotFound(_) => -32004,
            ToolError::Serialize(_) => -32603,
        };

        McpError { code: ErrorCode(code), message: err.to_string().into(), data: None }
    }
}
