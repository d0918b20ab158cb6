//! MCP server: the JSON-RPC request dispatcher.
//!
//! Each envelope moves through `Received -> Parsed -> Resolved -> Executing
//! -> Responded`, or ends in `Failed`. Every path produces a response
//! envelope; failures are translated into an [`ErrorRecord`] exactly once,
//! here.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace, warn};

use crate::config::Config;
use crate::error::{Error, ErrorContext, ErrorRecord, Result};
use crate::fetch::{FetchExecutor, FetchResult};
use crate::mcp::protocol::*;
use crate::mcp::rate_limit::RateLimiter;
use crate::mcp::transport::{Message, Transport};
use crate::metrics::Metrics;
use crate::tools::ToolRegistry;
use crate::VERSION;

/// Lifecycle of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Parsed,
    Resolved,
    Executing,
    Responded,
    Failed,
}

/// MCP server.
pub struct McpServer {
    registry: ToolRegistry,
    executor: Arc<FetchExecutor>,
    limiter: RateLimiter,
    metrics: Arc<Metrics>,
    name: String,
    version: String,
}

impl McpServer {
    /// Create a new MCP server from explicit parts.
    pub fn new(
        registry: ToolRegistry,
        executor: Arc<FetchExecutor>,
        limiter: RateLimiter,
        name: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            executor,
            limiter,
            metrics: Metrics::new(),
            name: name.into(),
            version: VERSION.to_string(),
        }
    }

    /// Create a server wired according to `config`.
    pub fn from_config(config: &Config) -> Self {
        let executor =
            FetchExecutor::new(config.user_agent()).with_max_timeout(config.max_timeout_secs);
        let limiter = RateLimiter::new(
            config.rate_limit,
            Duration::from_secs(config.rate_window_secs),
        );
        Self::new(
            ToolRegistry::new(config.default_timeout_secs),
            Arc::new(executor),
            limiter,
            config.name.clone(),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn executor(&self) -> &Arc<FetchExecutor> {
        &self.executor
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Release the outbound session.
    pub async fn shutdown(&self) {
        self.executor.close().await;
    }

    /// Run the server with the given transport.
    ///
    /// Envelopes are handled concurrently and may be answered out of order.
    pub async fn run<T: Transport>(self: Arc<Self>, mut transport: T) -> Result<()> {
        info!("Starting MCP server: {} v{}", self.name, self.version);

        let (mut incoming, outgoing) = transport.start().await?;
        let mut in_flight = JoinSet::new();

        while let Some(msg) = incoming.recv().await {
            reap_finished(&mut in_flight);

            let response = match msg {
                Message::Envelope(envelope) => {
                    let server = self.clone();
                    let outgoing = outgoing.clone();
                    in_flight.spawn(async move {
                        let response = server.handle_message(envelope, "stdio").await;
                        if outgoing.send(response).await.is_err() {
                            error!("Failed to send response");
                        }
                    });
                    continue;
                }
                Message::Malformed(detail) => parse_error_response(detail),
            };

            if outgoing.send(response).await.is_err() {
                error!("Failed to send response");
                break;
            }
        }

        while in_flight.join_next().await.is_some() {}
        drop(outgoing);

        transport.stop().await?;
        self.shutdown().await;
        info!("MCP server stopped");
        Ok(())
    }

    /// Handle one decoded envelope from `client`.
    pub async fn handle_message(&self, message: Value, client: &str) -> JsonRpcResponse {
        self.metrics.inc_requests();
        trace!(stage = ?Stage::Received, client, "Envelope received");

        // Echo the id whenever it can be read, even if the envelope is invalid.
        let id = message.get("id").cloned().unwrap_or(Value::Null);
        let mut ctx = ErrorContext::new(client);

        match self.dispatch(message, &mut ctx).await {
            Ok(result) => {
                self.metrics.inc_success();
                trace!(stage = ?Stage::Responded, client, "Envelope answered");
                JsonRpcResponse::success(id, result)
            }
            Err(e) => {
                self.metrics.inc_failed();
                let record = ErrorRecord::from_error(&e);
                record.log(&ctx);
                trace!(stage = ?Stage::Failed, client, "Envelope failed");
                JsonRpcResponse::failure(id, record)
            }
        }
    }

    async fn dispatch(&self, message: Value, ctx: &mut ErrorContext) -> Result<Value> {
        let request = parse_envelope(message)?;
        debug!(stage = ?Stage::Parsed, "Handling request: {} (id: {})", request.method, request.id);

        match request.method.as_str() {
            "initialize" => self.handle_initialize(),
            "ping" => Ok(json!({})),
            "tools/list" => self.handle_list_tools(),
            "tools/call" => self.handle_call_tool(request.params, ctx).await,
            method if method.starts_with("notifications/") => {
                debug!("Notification acknowledged: {}", method);
                Ok(json!({}))
            }
            _ => Err(Error::MethodNotFound(request.method)),
        }
    }

    fn handle_initialize(&self) -> Result<Value> {
        let result = InitializeResult {
            protocol_version: MCP_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
                logging: Some(LoggingCapability {}),
            },
            server_info: ServerInfo {
                name: self.name.clone(),
                version: self.version.clone(),
            },
        };

        Ok(serde_json::to_value(result)?)
    }

    /// Handle list tools request. Params are ignored.
    fn handle_list_tools(&self) -> Result<Value> {
        let result = ListToolsResult {
            tools: self.registry.list_tools(),
        };
        Ok(serde_json::to_value(result)?)
    }

    async fn handle_call_tool(&self, params: Option<Value>, ctx: &mut ErrorContext) -> Result<Value> {
        let params: CallToolParams = params
            .filter(|v| !v.is_null())
            .ok_or_else(|| Error::InvalidParams("Missing params".to_string()))
            .and_then(|v| {
                serde_json::from_value(v).map_err(|e| {
                    Error::InvalidParams(format!(
                        "tools/call params must contain 'name' and 'arguments': {}",
                        e
                    ))
                })
            })?;

        let result = self.call_tool(&params.name, &params.arguments, ctx).await?;
        Ok(serde_json::to_value(CallToolResult::new(result))?)
    }

    /// Resolve, rate-limit and run a tool.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: &HashMap<String, Value>,
        ctx: &mut ErrorContext,
    ) -> Result<FetchResult> {
        ctx.url = arguments.get("url").and_then(Value::as_str).map(String::from);
        ctx.method = Some(
            arguments
                .get("method")
                .and_then(Value::as_str)
                .unwrap_or("GET")
                .to_ascii_uppercase(),
        );

        let tool = self.registry.resolve(name)?;
        debug!(stage = ?Stage::Resolved, tool = tool.name(), "Tool resolved");

        if let Err(e) = self.limiter.check(&ctx.client) {
            self.metrics.inc_rate_limited();
            warn!(client = %ctx.client, "Rejecting tool call: rate limited");
            return Err(e);
        }

        self.metrics.inc_tool_calls();
        debug!(stage = ?Stage::Executing, tool = tool.name(), "Invoking tool");
        let result = self.registry.invoke(tool, &self.executor, arguments).await?;
        self.metrics.add_bytes_fetched(result.size_bytes);
        Ok(result)
    }

    /// [`McpServer::call_tool`] with the failure translated and logged.
    pub async fn invoke_tool(
        &self,
        name: &str,
        arguments: &HashMap<String, Value>,
        client: &str,
    ) -> std::result::Result<FetchResult, ErrorRecord> {
        self.metrics.inc_requests();
        let mut ctx = ErrorContext::new(client);
        match self.call_tool(name, arguments, &mut ctx).await {
            Ok(result) => {
                self.metrics.inc_success();
                Ok(result)
            }
            Err(e) => {
                self.metrics.inc_failed();
                let record = ErrorRecord::from_error(&e);
                record.log(&ctx);
                Err(record)
            }
        }
    }
}

/// Collect tasks that already finished without waiting on the rest.
fn reap_finished(in_flight: &mut JoinSet<()>) -> usize {
    let mut reaped = 0;
    while let Some(joined) = in_flight.try_join_next() {
        if let Err(e) = joined {
            error!("Request task failed: {}", e);
        }
        reaped += 1;
    }
    reaped
}

/// Validate the envelope shape.
fn parse_envelope(message: Value) -> Result<JsonRpcRequest> {
    let obj = match &message {
        Value::Object(obj) => obj,
        Value::Array(_) => {
            return Err(Error::InvalidParams(
                "batch requests are not supported".to_string(),
            ))
        }
        _ => {
            return Err(Error::InvalidParams(
                "request must be a JSON object".to_string(),
            ))
        }
    };

    match obj.get("jsonrpc").and_then(Value::as_str) {
        Some(JSONRPC_VERSION) => {}
        _ => {
            return Err(Error::InvalidParams(format!(
                "jsonrpc must be \"{}\"",
                JSONRPC_VERSION
            )))
        }
    }

    if !obj.get("method").is_some_and(Value::is_string) {
        return Err(Error::InvalidParams(
            "method must be a string".to_string(),
        ));
    }

    serde_json::from_value(message).map_err(|e| Error::InvalidParams(e.to_string()))
}

/// Response for a message that is not JSON at all.
pub fn parse_error_response(detail: impl Into<String>) -> JsonRpcResponse {
    let record = ErrorRecord::from_error(&Error::Parse(detail.into()));
    JsonRpcResponse::failure(Value::Null, record)
}
