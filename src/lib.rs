//! MCP Fetch Server
//!
//! A Model Context Protocol (MCP) server that lets a client fetch arbitrary
//! HTTP(S) resources through two tools, `fetch` and `fetch_json`.
//!
//! # Architecture
//!
//! 1. **Fetch Layer** (`fetch`) - outbound HTTP execution over a shared, lazily created session
//! 2. **Tools Layer** (`tools`) - the fixed tool catalog and argument decoding
//! 3. **MCP Layer** (`mcp`) - JSON-RPC dispatch, rate limiting, stdio transport
//! 4. **HTTP Layer** (`http`) - streamable HTTP endpoint with JSON or event-stream delivery
//!
//! Every failure is translated into a single error taxonomy (`error`) before
//! it reaches a caller.

pub mod config;
pub mod error;
pub mod fetch;
pub mod http;
pub mod mcp;
pub mod metrics;
pub mod tools;

pub use error::{Error, Result};

/// Server version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
