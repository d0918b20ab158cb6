//! HTTP transport for MCP: streamable HTTP with JSON or event-stream delivery.
//!
//! `POST /mcp` answers with a single JSON document, or, when the caller's
//! `Accept` header asks for `text/event-stream`, with one `data:` frame
//! carrying the same envelope. The response is computed before any byte is
//! written, so a client that disconnects early drops the handler future and
//! with it the outbound fetch.

use axum::{
    body::to_bytes,
    extract::{ConnectInfo, FromRequestParts, Path, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{ErrorKind, Result};
use crate::mcp::protocol::{JsonRpcResponse, ListToolsResult};
use crate::mcp::server::{parse_error_response, McpServer};
use crate::metrics::Timer;

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Media type of the event-stream delivery mode.
pub const EVENT_STREAM: &str = "text/event-stream";

/// HTTP server state.
#[derive(Clone)]
pub struct HttpState {
    server: Arc<McpServer>,
}

/// How a response envelope is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Json,
    EventStream,
}

impl DeliveryMode {
    /// Pick the mode from the request's `Accept` header.
    pub fn negotiate(headers: &HeaderMap) -> Self {
        let wants_stream = headers
            .get_all(header::ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| v.to_ascii_lowercase().contains(EVENT_STREAM));

        if wants_stream {
            Self::EventStream
        } else {
            Self::Json
        }
    }
}

/// Permissive cross-origin policy; also answers `OPTIONS` pre-flights.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
        .max_age(Duration::from_secs(86400))
}

/// Peer socket address, present when served with connect info.
pub struct PeerAddr(pub Option<SocketAddr>);

impl<S: Send + Sync> FromRequestParts<S> for PeerAddr {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0),
        ))
    }
}

/// Identify the caller: proxy headers first, then the peer address.
pub fn client_id(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Write a finished envelope in the requested mode.
pub fn deliver(envelope: &JsonRpcResponse, mode: DeliveryMode) -> Response {
    let body = match serde_json::to_string(envelope) {
        Ok(body) => body,
        Err(e) => {
            warn!("Failed to serialize response envelope: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match mode {
        DeliveryMode::Json => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        DeliveryMode::EventStream => {
            let frame = tokio_stream::once(Ok::<_, Infallible>(Event::default().data(body)));
            (
                [(HeaderName::from_static("x-accel-buffering"), "no")],
                Sse::new(frame),
            )
                .into_response()
        }
    }
}

/// Build the router.
pub fn router(server: Arc<McpServer>) -> Router {
    let state = HttpState { server };

    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        .route("/metrics", get(metrics))
        .route("/tools", get(list_tools))
        .route("/tools/{tool_name}", post(call_tool))
        .route("/mcp", post(mcp_endpoint))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http().make_span_with(|req: &Request| {
                        info_span!(
                            "http",
                            method = %req.method(),
                            uri = %req.uri(),
                            request_id = %Uuid::new_v4(),
                        )
                    }),
                )
                .layer(cors_layer())
                .layer(middleware::from_fn(process_time)),
        )
        .with_state(state)
}

/// Start the HTTP server and run until a shutdown signal arrives.
pub async fn start_server(config: &Config, server: Arc<McpServer>) -> Result<()> {
    let app = router(server.clone());

    let addr = config.bind_addr();
    info!("Starting HTTP server on http://{}", addr);
    info!("MCP endpoint: http://{}/mcp", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    server.shutdown().await;
    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

/// Attach the `X-Process-Time` header.
async fn process_time(request: Request, next: Next) -> Response {
    let timer = Timer::start();
    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&format!("{:.6}", timer.elapsed_secs())) {
        response
            .headers_mut()
            .insert(HeaderName::from_static("x-process-time"), value);
    }
    response
}

/// MCP streamable HTTP endpoint.
async fn mcp_endpoint(
    State(state): State<HttpState>,
    PeerAddr(peer): PeerAddr,
    request: Request,
) -> Response {
    let (parts, body) = request.into_parts();
    let client = client_id(&parts.headers, peer);
    let mode = DeliveryMode::negotiate(&parts.headers);

    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => return envelope_rejection(format!("failed to read request body: {}", e)),
    };

    let message: Value = match serde_json::from_slice(&bytes) {
        Ok(message) => message,
        Err(e) => {
            warn!(client = %client, "Rejecting non-JSON request body: {}", e);
            return envelope_rejection(e.to_string());
        }
    };

    let envelope = state.server.handle_message(message, &client).await;
    deliver(&envelope, mode)
}

/// Only a body that is not JSON at all surfaces as an HTTP error status.
fn envelope_rejection(detail: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(parse_error_response(detail)),
    )
        .into_response()
}

/// Health check endpoint.
async fn health_check(State(state): State<HttpState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "server": state.server.name(),
        "version": state.server.version(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Static server metadata.
async fn server_info(State(state): State<HttpState>) -> impl IntoResponse {
    let tools: Vec<_> = state
        .server
        .registry()
        .list()
        .iter()
        .map(|d| d.name.clone())
        .collect();

    Json(json!({
        "name": state.server.name(),
        "version": state.server.version(),
        "transport": "streamable-http",
        "endpoints": {
            "mcp": "/mcp",
            "health": "/health",
            "info": "/info",
            "tools": "/tools",
            "metrics": "/metrics"
        },
        "tools": tools,
    }))
}

/// Prometheus metrics endpoint.
async fn metrics(State(state): State<HttpState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.server.metrics().to_prometheus(),
    )
}

/// List tools endpoint.
async fn list_tools(State(state): State<HttpState>) -> impl IntoResponse {
    Json(ListToolsResult {
        tools: state.server.registry().list_tools(),
    })
}

/// Call tool request.
#[derive(Debug, Deserialize)]
struct CallToolRequest {
    #[serde(default)]
    arguments: HashMap<String, Value>,
}

/// Direct tool invocation outside the JSON-RPC envelope.
async fn call_tool(
    State(state): State<HttpState>,
    Path(tool_name): Path<String>,
    PeerAddr(peer): PeerAddr,
    headers: HeaderMap,
    Json(req): Json<CallToolRequest>,
) -> impl IntoResponse {
    let client = client_id(&headers, peer);

    match state
        .server
        .invoke_tool(&tool_name, &req.arguments, &client)
        .await
    {
        Ok(result) => (
            StatusCode::OK,
            Json(json!({
                "tool": tool_name,
                "arguments": req.arguments,
                "result": result,
            })),
        ),
        Err(record) => {
            (
                rest_status(record.kind),
                Json(json!({
                    "tool": tool_name,
                    "error": record,
                })),
            )
        }
    }
}

/// Caller mistakes map to 4xx; every other failure travels in the body.
fn rest_status(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidParams | ErrorKind::ParseError => StatusCode::BAD_REQUEST,
        ErrorKind::ToolNotFound | ErrorKind::MethodNotFound => StatusCode::NOT_FOUND,
        ErrorKind::Timeout
        | ErrorKind::ConnectionError
        | ErrorKind::InvalidResponseBody
        | ErrorKind::InternalError => StatusCode::OK,
    }
}
