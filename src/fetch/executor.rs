//! Outbound HTTP execution over a shared, lazily created session.

use encoding_rs::{Encoding, UTF_8};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::fetch::types::{sanitize_headers, FetchBody, FetchRequest, FetchResult};
use crate::metrics::Timer;

/// Upper bound applied to caller-supplied timeouts unless configured otherwise.
pub const DEFAULT_MAX_TIMEOUT_SECS: u64 = 300;

/// Performs one HTTP request per call, never retrying.
///
/// The underlying `reqwest::Client` pools connections internally and is
/// shared by every in-flight call. It is built on first use and rebuilt on
/// the next call after [`FetchExecutor::close`].
#[derive(Debug)]
pub struct FetchExecutor {
    session: RwLock<Option<Client>>,
    user_agent: String,
    max_timeout_secs: u64,
}

impl FetchExecutor {
    /// Create an executor; no connection is opened until the first fetch.
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            session: RwLock::new(None),
            user_agent: user_agent.into(),
            max_timeout_secs: DEFAULT_MAX_TIMEOUT_SECS,
        }
    }

    /// Clamp caller timeouts to at most `secs`.
    pub fn with_max_timeout(mut self, secs: u64) -> Self {
        self.max_timeout_secs = secs.max(1);
        self
    }

    /// Whether a session currently exists.
    pub async fn is_open(&self) -> bool {
        self.session.read().await.is_some()
    }

    /// Drop the shared session. In-flight requests keep their clone.
    pub async fn close(&self) {
        if self.session.write().await.take().is_some() {
            debug!("Closed outbound HTTP session");
        }
    }

    async fn client(&self) -> Result<Client> {
        if let Some(client) = self.session.read().await.as_ref() {
            return Ok(client.clone());
        }

        let mut session = self.session.write().await;
        if let Some(client) = session.as_ref() {
            return Ok(client.clone());
        }

        let client = Client::builder()
            .user_agent(&self.user_agent)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;
        debug!("Created outbound HTTP session ({})", self.user_agent);
        *session = Some(client.clone());
        Ok(client)
    }

    /// Execute a request and return the raw-text result.
    pub async fn execute(&self, request: &FetchRequest) -> Result<FetchResult> {
        let url = request.validate()?;
        let method = parse_method(&request.method)?;
        let headers = build_headers(&request.headers)?;
        let timeout_secs = request.timeout_seconds.min(self.max_timeout_secs);

        let client = self.client().await?;
        let timer = Timer::start();

        let mut builder = client
            .request(method.clone(), url)
            .headers(headers)
            .timeout(Duration::from_secs(timeout_secs));
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::from_fetch(e, timeout_secs))?;

        let status_code = response.status().as_u16();
        let final_url = response.url().to_string();

        let mut raw_headers: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in response.headers() {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            raw_headers
                .entry(name.as_str().to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(&value);
                })
                .or_insert(value);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::from_fetch(e, timeout_secs))?;
        let size_bytes = bytes.len() as u64;
        let text = decode_body(&bytes, raw_headers.get("content-type").map(String::as_str));

        info!(
            method = %method,
            url = %final_url,
            status = status_code,
            bytes = size_bytes,
            duration_ms = timer.elapsed_ms(),
            "HTTP fetch completed"
        );

        Ok(FetchResult {
            status_code,
            headers: sanitize_headers(raw_headers),
            body: FetchBody::Text(text),
            raw_body: None,
            final_url,
            method: method.to_string(),
            size_bytes,
        })
    }
}

/// Decode a body using the `Content-Type` charset, falling back to UTF-8.
/// A byte-order mark takes precedence over the declared charset.
fn decode_body(bytes: &[u8], content_type: Option<&str>) -> String {
    let encoding = content_type
        .and_then(|ct| {
            ct.split(';').skip(1).find_map(|param| {
                let (key, value) = param.split_once('=')?;
                key.trim()
                    .eq_ignore_ascii_case("charset")
                    .then(|| value.trim().trim_matches('"'))
            })
        })
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8);

    let (text, _, _) = encoding.decode(bytes);
    text.into_owned()
}

fn parse_method(raw: &str) -> Result<Method> {
    Method::from_bytes(raw.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| Error::InvalidParams(format!("invalid HTTP method: '{}'", raw)))
}

fn build_headers(headers: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| Error::InvalidParams(format!("invalid header name: '{}'", name)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| Error::InvalidParams(format!("invalid value for header '{}'", name)))?;
        map.insert(name, value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn executor() -> FetchExecutor {
        FetchExecutor::new("mcp-fetch-server-test/1.0")
    }

    #[test]
    fn test_decode_body_charset() {
        let latin1 = [0x63, 0x61, 0x66, 0xE9];
        assert_eq!(
            decode_body(&latin1, Some("text/plain; charset=ISO-8859-1")),
            "café"
        );
        assert_eq!(
            decode_body(&latin1, Some("text/plain; charset=\"latin1\"")),
            "café"
        );
        assert_eq!(decode_body("café".as_bytes(), Some("text/plain")), "café");
        assert_eq!(
            decode_body("café".as_bytes(), Some("text/plain; charset=bogus")),
            "café"
        );
        assert_eq!(decode_body(b"ok", None), "ok");
    }

    #[tokio::test]
    async fn test_non_utf8_body_decoded_by_charset() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(vec![0x63, 0x61, 0x66, 0xE9], "text/plain; charset=iso-8859-1"),
            )
            .mount(&server)
            .await;

        let result = executor()
            .execute(&FetchRequest::get(server.uri()))
            .await
            .unwrap();
        assert_eq!(result.text(), "café");
        assert_eq!(result.size_bytes, 4);
    }

    #[tokio::test]
    async fn test_get_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hello"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-upstream", "yes")
                    .set_body_string("ok"),
            )
            .mount(&server)
            .await;

        let request = FetchRequest::get(format!("{}/hello", server.uri()));
        let result = executor().execute(&request).await.unwrap();

        assert_eq!(result.status_code, 200);
        assert_eq!(result.body, FetchBody::Text("ok".to_string()));
        assert_eq!(result.method, "GET");
        assert_eq!(result.size_bytes, 2);
        assert_eq!(result.final_url, format!("{}/hello", server.uri()));
        assert_eq!(result.headers["x-upstream"], "yes");
        assert!(!result.headers.contains_key("content-length"));
    }

    #[tokio::test]
    async fn test_post_with_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/items"))
            .and(header("content-type", "application/json"))
            .and(body_string(r#"{"name":"test"}"#))
            .respond_with(ResponseTemplate::new(201).set_body_string(r#"{"id":123}"#))
            .mount(&server)
            .await;

        let mut request = FetchRequest::get(format!("{}/items", server.uri()));
        request.method = "post".to_string();
        request
            .headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        request.body = Some(r#"{"name":"test"}"#.to_string());

        let result = executor().execute(&request).await.unwrap();
        assert_eq!(result.status_code, 201);
        assert_eq!(result.method, "POST");
    }

    #[tokio::test]
    async fn test_user_agent_is_sent() {
        let server = MockServer::start().await;
        Mock::given(header("user-agent", "mcp-fetch-server-test/1.0"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let result = executor()
            .execute(&FetchRequest::get(server.uri()))
            .await
            .unwrap();
        assert_eq!(result.status_code, 204);
    }

    #[tokio::test]
    async fn test_size_counts_encoded_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("héllo wörld"))
            .mount(&server)
            .await;

        let result = executor()
            .execute(&FetchRequest::get(server.uri()))
            .await
            .unwrap();

        assert_eq!(result.text().chars().count(), 11);
        assert_eq!(result.size_bytes, 13);
    }

    #[tokio::test]
    async fn test_non_success_status_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("missing"))
            .mount(&server)
            .await;

        let result = executor()
            .execute(&FetchRequest::get(server.uri()))
            .await
            .unwrap();
        assert_eq!(result.status_code, 404);
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(3))
                    .set_body_string("late"),
            )
            .mount(&server)
            .await;

        let mut request = FetchRequest::get(server.uri());
        request.timeout_seconds = 1;

        let err = executor().execute(&request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.kind().code(), -32000);
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let request = FetchRequest::get(format!("http://127.0.0.1:{}/", port));
        let err = executor().execute(&request).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ConnectionError);
        assert_eq!(err.kind().code(), -32001);
    }

    #[tokio::test]
    async fn test_invalid_url_skips_network() {
        let executor = executor();
        let err = executor
            .execute(&FetchRequest::get("not-a-url"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidParams);
        assert!(!executor.is_open().await);
    }

    #[tokio::test]
    async fn test_invalid_method_and_header() {
        let mut request = FetchRequest::get("http://example.test/");
        request.method = "GE T".to_string();
        let err = executor().execute(&request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParams);

        let mut request = FetchRequest::get("http://example.test/");
        request
            .headers
            .insert("bad header".to_string(), "x".to_string());
        let err = executor().execute(&request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParams);
    }

    #[tokio::test]
    async fn test_session_recreated_after_close() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let executor = executor();
        assert!(!executor.is_open().await);

        executor.execute(&FetchRequest::get(server.uri())).await.unwrap();
        assert!(executor.is_open().await);

        executor.close().await;
        assert!(!executor.is_open().await);

        let result = executor.execute(&FetchRequest::get(server.uri())).await.unwrap();
        assert_eq!(result.status_code, 200);
        assert!(executor.is_open().await);
    }
}
