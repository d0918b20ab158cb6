//! Model Context Protocol (MCP) implementation.
//!
//! # Architecture
//!
//! - `protocol` - JSON-RPC envelope and MCP message types
//! - `server` - request dispatcher (`McpServer`)
//! - `rate_limit` - per-client request budget consulted before tool calls
//! - `transport` - stdio transport

pub mod protocol;
pub mod rate_limit;
pub mod server;
pub mod transport;

pub use protocol::*;
pub use rate_limit::RateLimiter;
pub use server::McpServer;
pub use transport::{StdioTransport, Transport};
