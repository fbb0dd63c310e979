use rmcp::model::ErrorCode;
use rmcp::ErrorData;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

/// Failure kinds shared by the registry, the MCP server adapter and the client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid arguments: {0}")]
    Validation(String),

    #[error("Tool failed: {0}")]
    Internal(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection failed: {0}")]
    ConnectionFailure(String),

    #[error("Tool already registered: {0}")]
    Conflict(String),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    Internal,
    Timeout,
    ConnectionFailure,
    Conflict,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Validation => "validation",
            ErrorKind::Internal => "internal",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ConnectionFailure => "connection_failure",
            ErrorKind::Conflict => "conflict",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "not_found" => Some(ErrorKind::NotFound),
            "validation" => Some(ErrorKind::Validation),
            "internal" => Some(ErrorKind::Internal),
            "timeout" => Some(ErrorKind::Timeout),
            "connection_failure" => Some(ErrorKind::ConnectionFailure),
            "conflict" => Some(ErrorKind::Conflict),
            _ => None,
        }
    }
}

impl ToolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ToolError::NotFound(_) => ErrorKind::NotFound,
            ToolError::Validation(_) => ErrorKind::Validation,
            ToolError::Internal(_) => ErrorKind::Internal,
            ToolError::Timeout(_) => ErrorKind::Timeout,
            ToolError::ConnectionFailure(_) => ErrorKind::ConnectionFailure,
            ToolError::Conflict(_) => ErrorKind::Conflict,
        }
    }

    fn code(&self) -> ErrorCode {
        match self {
            ToolError::NotFound(_) => ErrorCode::METHOD_NOT_FOUND,
            ToolError::Validation(_) => ErrorCode::INVALID_PARAMS,
            _ => ErrorCode::INTERNAL_ERROR,
        }
    }

    /// Build the error from a JSON-RPC error object returned by a server.
    ///
    /// `data.kind` wins when present; otherwise the code is mapped back.
    pub fn from_error_data(err: &ErrorData) -> Self {
        let kind = err
            .data
            .as_ref()
            .and_then(|d| d.get("kind"))
            .and_then(Value::as_str)
            .and_then(ErrorKind::parse);
        let message = err.message.to_string();

        match kind {
            Some(ErrorKind::NotFound) => ToolError::NotFound(message),
            Some(ErrorKind::Validation) => ToolError::Validation(message),
            Some(ErrorKind::Conflict) => ToolError::Conflict(message),
            Some(ErrorKind::ConnectionFailure) => ToolError::ConnectionFailure(message),
            Some(ErrorKind::Internal) | Some(ErrorKind::Timeout) => ToolError::Internal(message),
            None if err.code == ErrorCode::METHOD_NOT_FOUND => ToolError::NotFound(message),
            None if err.code == ErrorCode::INVALID_PARAMS => ToolError::Validation(message),
            None => ToolError::Internal(message),
        }
    }
}

impl From<ToolError> for ErrorData {
    fn from(err: ToolError) -> Self {
        ErrorData::new(
            err.code(),
            err.to_string(),
            Some(json!({ "kind": err.kind().as_str() })),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(ToolError::NotFound("divide".into()), -32601; "not found")]
    #[test_case(ToolError::Validation("a".into()), -32602; "validation")]
    #[test_case(ToolError::Internal("boom".into()), -32603; "internal")]
    fn server_errors_use_jsonrpc_codes(err: ToolError, code: i32) {
        let data: ErrorData = err.clone().into();
        assert_eq!(data.code.0, code);
        assert_eq!(
            data.data.as_ref().and_then(|d| d.get("kind")),
            Some(&json!(err.kind().as_str()))
        );
    }

    #[test]
    fn kind_survives_the_wire() {
        let data: ErrorData = ToolError::NotFound("divide".into()).into();
        let back = ToolError::from_error_data(&data);
        assert_eq!(back.kind(), ErrorKind::NotFound);
        assert!(back.to_string().contains("divide"));
    }

    #[test]
    fn falls_back_to_code_without_kind() {
        let data = ErrorData::new(ErrorCode::INVALID_PARAMS, "bad", None);
        assert_eq!(
            ToolError::from_error_data(&data).kind(),
            ErrorKind::Validation
        );

        let data = ErrorData::new(ErrorCode::METHOD_NOT_FOUND, "nope", None);
        assert_eq!(ToolError::from_error_data(&data).kind(), ErrorKind::NotFound);

        let data = ErrorData::new(ErrorCode::PARSE_ERROR, "garbage", None);
        assert_eq!(ToolError::from_error_data(&data).kind(), ErrorKind::Internal);
    }
}
