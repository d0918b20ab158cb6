//! Configuration management for the fetch server.

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::fetch::executor::DEFAULT_MAX_TIMEOUT_SECS;
use crate::fetch::types::DEFAULT_TIMEOUT_SECS;

/// Command-line arguments for the fetch server.
#[derive(Parser, Debug, Clone)]
#[command(name = "mcp-fetch-server")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "MCP server exposing HTTP fetch tools over streamable HTTP or stdio")]
pub struct Args {
    /// Host address to bind (http transport)
    #[arg(long, default_value = "127.0.0.1", env = "MCP_FETCH_HOST")]
    pub host: String,

    /// Port to bind (http transport)
    #[arg(short, long, default_value = "8000", env = "MCP_FETCH_PORT")]
    pub port: u16,

    /// Server name reported to clients and used in the User-Agent
    #[arg(short, long, default_value = "mcp-fetch-server", env = "MCP_FETCH_NAME")]
    pub name: String,

    /// Transport mode: http or stdio
    #[arg(short, long, default_value = "http", env = "MCP_FETCH_TRANSPORT")]
    pub transport: Transport,

    /// Enable debug logging (same as --log-level debug)
    #[arg(short, long, env = "MCP_FETCH_DEBUG")]
    pub debug: bool,

    /// Log level: trace, debug, info, warn or error
    #[arg(long, default_value = "info", env = "MCP_FETCH_LOG_LEVEL")]
    pub log_level: String,

    /// Log output format
    #[arg(long, default_value = "text", env = "MCP_FETCH_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Requests allowed per client per window (0 disables rate limiting)
    #[arg(long, default_value = "100", env = "MCP_FETCH_RATE_LIMIT")]
    pub rate_limit: u64,

    /// Rate limit window in seconds
    #[arg(long, default_value = "60", env = "MCP_FETCH_RATE_WINDOW")]
    pub rate_window: u64,

    /// Timeout applied when a call omits timeoutSeconds
    #[arg(long, default_value = "30", env = "MCP_FETCH_DEFAULT_TIMEOUT")]
    pub default_timeout: u64,

    /// Upper bound for caller-supplied timeouts
    #[arg(long, default_value = "300", env = "MCP_FETCH_MAX_TIMEOUT")]
    pub max_timeout: u64,
}

/// Transport mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Http,
    Stdio,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Server name
    pub name: String,
    /// Transport mode
    pub transport: Transport,
    /// Log level directive
    pub log_level: String,
    /// Log format
    pub log_format: LogFormat,
    /// Requests per client per window, 0 = unlimited
    pub rate_limit: u64,
    /// Rate limit window (seconds)
    pub rate_window_secs: u64,
    /// Default fetch timeout (seconds)
    pub default_timeout_secs: u64,
    /// Maximum fetch timeout (seconds)
    pub max_timeout_secs: u64,
}

impl Config {
    /// Socket address string for the HTTP listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// User-Agent sent on outbound requests.
    pub fn user_agent(&self) -> String {
        format!("{}/{}", self.name, crate::VERSION)
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        let log_level = if args.debug {
            "debug".to_string()
        } else {
            args.log_level
        };

        Self {
            host: args.host,
            port: args.port,
            name: args.name,
            transport: args.transport,
            log_level,
            log_format: args.log_format,
            rate_limit: args.rate_limit,
            rate_window_secs: args.rate_window.max(1),
            default_timeout_secs: args.default_timeout.max(1),
            max_timeout_secs: args.max_timeout.max(1),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            name: "mcp-fetch-server".to_string(),
            transport: Transport::Http,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            rate_limit: 100,
            rate_window_secs: 60,
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_timeout_secs: DEFAULT_MAX_TIMEOUT_SECS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_default() {
        assert_eq!(Transport::default(), Transport::Http);
    }

    #[test]
    fn test_transport_serialization() {
        let transports = [
            (Transport::Stdio, "\"stdio\""),
            (Transport::Http, "\"http\""),
        ];

        for (transport, expected) in &transports {
            let json = serde_json::to_string(transport).unwrap();
            assert_eq!(json, *expected);
        }
    }

    #[test]
    fn test_config_default_values() {
        let config = Config::default();

        assert_eq!(config.transport, Transport::Http);
        assert_eq!(config.bind_addr(), "127.0.0.1:8000");
        assert_eq!(config.rate_limit, 100);
        assert_eq!(config.rate_window_secs, 60);
        assert_eq!(config.default_timeout_secs, 30);
        assert_eq!(config.max_timeout_secs, 300);
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn test_user_agent() {
        let config = Config {
            name: "fetcher".to_string(),
            ..Config::default()
        };
        assert_eq!(config.user_agent(), format!("fetcher/{}", crate::VERSION));
    }

    #[test]
    fn test_config_deserialization() {
        let json = r#"{
            "host": "0.0.0.0",
            "port": 9000,
            "name": "fetcher",
            "transport": "stdio",
            "log_level": "warn",
            "log_format": "json",
            "rate_limit": 0,
            "rate_window_secs": 10,
            "default_timeout_secs": 5,
            "max_timeout_secs": 20
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.transport, Transport::Stdio);
        assert_eq!(config.port, 9000);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.rate_limit, 0);
    }

    #[test]
    fn test_args_to_config() {
        let args = Args::parse_from([
            "mcp-fetch-server",
            "--port",
            "4000",
            "--debug",
            "--rate-limit",
            "5",
            "--rate-window",
            "0",
            "--transport",
            "stdio",
        ]);

        let config: Config = args.into();

        assert_eq!(config.port, 4000);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.rate_limit, 5);
        assert_eq!(config.rate_window_secs, 1);
        assert_eq!(config.transport, Transport::Stdio);
    }
}
