//! Error types and the translation of failures into JSON-RPC error objects.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the fetch gateway.
#[derive(Error, Debug)]
pub enum Error {
    // ===== Argument Errors =====
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("rate limited: client {client} exceeded {limit} requests per {window_secs}s")]
    RateLimited {
        client: String,
        limit: u64,
        window_secs: u64,
    },

    // ===== Fetch Errors =====
    #[error("Request timeout: no response within {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid response body: {message}")]
    InvalidResponseBody {
        message: String,
        status_code: u16,
        headers: BTreeMap<String, String>,
        raw_body: String,
        url: String,
    },

    // ===== Protocol Errors =====
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Parse error: {0}")]
    Parse(String),

    // ===== I/O Errors =====
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // ===== Internal Errors =====
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Classify an outbound client failure.
    ///
    /// Timeouts win over connection failures, so a connect timeout is
    /// reported as `Timeout`.
    pub fn from_fetch(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                seconds: timeout_secs,
            }
        } else if err.is_connect() || err.is_request() || err.is_body() {
            Self::Connection(describe_chain(&err))
        } else if err.is_builder() {
            Self::InvalidParams(describe_chain(&err))
        } else {
            Self::Http(err)
        }
    }

    /// The taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidParams(_) | Self::RateLimited { .. } => ErrorKind::InvalidParams,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Connection(_) => ErrorKind::ConnectionError,
            Self::InvalidResponseBody { .. } => ErrorKind::InvalidResponseBody,
            Self::ToolNotFound(_) => ErrorKind::ToolNotFound,
            Self::MethodNotFound(_) => ErrorKind::MethodNotFound,
            Self::Parse(_) => ErrorKind::ParseError,
            Self::Http(e) if e.is_timeout() => ErrorKind::Timeout,
            Self::Http(e) if e.is_connect() || e.is_request() => ErrorKind::ConnectionError,
            Self::Io(_) | Self::Json(_) | Self::Http(_) | Self::Internal(_) | Self::Config(_) => {
                ErrorKind::InternalError
            }
        }
    }

    /// Structured context attached to the protocol error, if any.
    fn data(&self) -> Option<Value> {
        match self {
            Self::RateLimited {
                client,
                limit,
                window_secs,
            } => Some(json!({
                "client": client,
                "limit": limit,
                "windowSeconds": window_secs,
            })),
            Self::Timeout { seconds } => Some(json!({ "timeoutSeconds": seconds })),
            Self::InvalidResponseBody {
                status_code,
                headers,
                raw_body,
                url,
                ..
            } => Some(json!({
                "statusCode": status_code,
                "headers": headers,
                "rawBody": raw_body,
                "url": url,
            })),
            Self::ToolNotFound(name) => Some(json!({ "name": name })),
            Self::MethodNotFound(method) => Some(json!({ "method": method })),
            _ => None,
        }
    }
}

/// Render an error with its source chain, e.g. "error sending request: dns error".
fn describe_chain(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !text.contains(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}

/// Stable error taxonomy exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidParams,
    Timeout,
    ConnectionError,
    InvalidResponseBody,
    ToolNotFound,
    MethodNotFound,
    ParseError,
    InternalError,
}

impl ErrorKind {
    /// JSON-RPC error code for this kind.
    pub fn code(self) -> i32 {
        match self {
            Self::InvalidParams | Self::InvalidResponseBody => -32602,
            Self::Timeout => -32000,
            Self::ConnectionError => -32001,
            Self::ToolNotFound | Self::MethodNotFound => -32601,
            Self::ParseError => -32700,
            Self::InternalError => -32603,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidParams => "InvalidParams",
            Self::Timeout => "Timeout",
            Self::ConnectionError => "ConnectionError",
            Self::InvalidResponseBody => "InvalidResponseBody",
            Self::ToolNotFound => "ToolNotFound",
            Self::MethodNotFound => "MethodNotFound",
            Self::ParseError => "ParseError",
            Self::InternalError => "InternalError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a failure happened, for the error log line.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    pub url: Option<String>,
    pub method: Option<String>,
    pub client: String,
}

impl ErrorContext {
    pub fn new(client: impl Into<String>) -> Self {
        Self {
            client: client.into(),
            ..Self::default()
        }
    }
}

/// A translated failure, ready to be placed into a response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorRecord {
    /// Translate an error into its protocol record.
    pub fn from_error(err: &Error) -> Self {
        let kind = err.kind();
        Self {
            kind,
            code: kind.code(),
            message: err.to_string(),
            data: err.data(),
        }
    }

    /// Emit the translated error to the log with its request context.
    pub fn log(&self, ctx: &ErrorContext) {
        warn!(
            kind = %self.kind,
            code = self.code,
            message = %self.message,
            url = ctx.url.as_deref().unwrap_or("-"),
            method = ctx.method.as_deref().unwrap_or("-"),
            client = %ctx.client,
            "request failed"
        );
    }
}
