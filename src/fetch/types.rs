//! Request and response records for outbound fetches.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use url::Url;

use crate::error::{Error, Result};

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP method.
pub const DEFAULT_METHOD: &str = "GET";

/// Response headers that are never echoed back to clients.
const HOP_HEADERS: [&str; 3] = ["host", "content-length", "transfer-encoding"];

/// A validated outbound request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchRequest {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    pub timeout_seconds: u64,
}

impl FetchRequest {
    /// Create a GET request with default timeout.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: DEFAULT_METHOD.to_string(),
            headers: BTreeMap::new(),
            body: None,
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Check the request before any network I/O.
    pub fn validate(&self) -> Result<Url> {
        if self.timeout_seconds == 0 {
            return Err(Error::InvalidParams(
                "timeoutSeconds must be greater than 0".to_string(),
            ));
        }
        validate_url(&self.url)
    }
}

/// Parse a URL and require a scheme and a host.
pub fn validate_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| Error::InvalidParams(format!("invalid URL '{}': {}", raw, e)))?;

    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => {
            return Err(Error::InvalidParams(format!(
                "invalid URL '{}': missing host",
                raw
            )))
        }
    }

    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::InvalidParams(format!(
            "invalid URL '{}': unsupported scheme '{}'",
            raw,
            url.scheme()
        )));
    }

    Ok(url)
}

/// Drop headers that must not be forwarded to clients.
pub fn sanitize_headers<I, K, V>(headers: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    headers
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .filter(|(k, _)| !HOP_HEADERS.contains(&k.to_ascii_lowercase().as_str()))
        .collect()
}

/// Response body, either raw text or a parsed JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FetchBody {
    Text(String),
    Json(Value),
}

/// Outcome of one successful outbound request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchResult {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: FetchBody,
    /// Unparsed text, only present when `body` holds parsed JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_body: Option<String>,
    pub final_url: String,
    pub method: String,
    pub size_bytes: u64,
}

impl FetchResult {
    /// The body as text, whichever variant it holds.
    pub fn text(&self) -> &str {
        match (&self.body, &self.raw_body) {
            (FetchBody::Text(text), _) => text,
            (FetchBody::Json(_), Some(raw)) => raw,
            (FetchBody::Json(_), None) => "",
        }
    }

    /// Re-interpret a text body as JSON.
    pub fn into_json(self) -> Result<Self> {
        let raw = match self.body {
            FetchBody::Text(text) => text,
            FetchBody::Json(_) => return Ok(self),
        };

        match serde_json::from_str::<Value>(&raw) {
            Ok(parsed) => Ok(Self {
                body: FetchBody::Json(parsed),
                raw_body: Some(raw),
                ..self
            }),
            Err(e) => Err(Error::InvalidResponseBody {
                message: format!("response is not valid JSON: {}", e),
                status_code: self.status_code,
                headers: self.headers,
                raw_body: raw,
                url: self.final_url,
            }),
        }
    }
}
