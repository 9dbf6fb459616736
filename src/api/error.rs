//! Transport error types

use serde_json::Value;
use thiserror::Error;

/// Characters of a non-JSON error body kept in CRUD error messages
const BODY_PREVIEW_CHARS: usize = 100;

/// Error talking to the council backend
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never got a response
    #[error("Request failed: {0}")]
    Network(String),
    /// Non-2xx response
    #[error("{message}")]
    Status { status: u16, message: String },
    /// A 2xx body that did not match the expected shape
    #[error("Failed to parse response: {0}")]
    Decode(String),
    /// The response body broke off while streaming
    #[error("Stream read failed: {0}")]
    Stream(String),
    #[error("Invalid client configuration: {0}")]
    Config(String),
}

impl ApiError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Network(format!("Request timeout: {e}"))
        } else if e.is_connect() {
            ApiError::Network(format!("Connection failed: {e}"))
        } else if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

/// Backend operation, for choosing the default error message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ListConversations,
    CreateConversation,
    GetConversation,
    DeleteConversation,
    SendMessage,
    SendMessageStream,
}

impl Operation {
    fn default_message(self) -> &'static str {
        match self {
            Operation::ListConversations => "Failed to list conversations",
            Operation::CreateConversation => "Failed to create conversation",
            Operation::GetConversation => "Failed to get conversation",
            Operation::DeleteConversation => "Failed to delete conversation",
            Operation::SendMessage => "Failed to send message",
            Operation::SendMessageStream => "Server error",
        }
    }
}

/// Build the error for a non-2xx response.
///
/// Backend error bodies are not guaranteed to be JSON. A JSON object's
/// `detail` wins; JSON without it falls back to the operation's message; raw
/// text is wrapped with the status code, truncated except for the stream
/// endpoint.
pub fn status_error(operation: Operation, status: u16, body: &str) -> ApiError {
    let message = match serde_json::from_str::<Value>(body) {
        Ok(parsed) => match parsed.get("detail") {
            Some(Value::String(detail)) => detail.clone(),
            Some(detail) if !detail.is_null() => detail.to_string(),
            _ => operation.default_message().to_string(),
        },
        Err(_) if operation == Operation::SendMessageStream => {
            format!("Server Error ({status}): {body}")
        }
        Err(_) => {
            let preview: String = body.chars().take(BODY_PREVIEW_CHARS).collect();
            format!("Server Error ({status}): {preview}...")
        }
    };

    ApiError::Status { status, message }
}
