//! Stream transports for the MCP server.
//!
//! The HTTP transport lives in `crate::http`; this module carries the
//! newline-delimited stdio transport.

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use crate::error::Result;
use crate::mcp::protocol::JsonRpcResponse;

/// An inbound line, decoded or not.
#[derive(Debug, Clone)]
pub enum Message {
    Envelope(Value),
    Malformed(String),
}

/// Transport trait for MCP communication.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start the transport, returning channels for messages.
    async fn start(&mut self) -> Result<(mpsc::Receiver<Message>, mpsc::Sender<JsonRpcResponse>)>;

    /// Stop the transport.
    async fn stop(&mut self) -> Result<()>;
}

/// Stdio transport for MCP.
pub struct StdioTransport {
    running: bool,
    writer: Option<JoinHandle<()>>,
}

impl StdioTransport {
    /// Create a new stdio transport.
    pub fn new() -> Self {
        Self {
            running: false,
            writer: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode one line; `None` for blank lines.
pub fn decode_line(line: &str) -> Option<Message> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    Some(match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => Message::Envelope(value),
        Err(e) => Message::Malformed(e.to_string()),
    })
}

#[async_trait]
impl Transport for StdioTransport {
    async fn start(&mut self) -> Result<(mpsc::Receiver<Message>, mpsc::Sender<JsonRpcResponse>)> {
        self.running = true;

        // Channel for incoming messages (from stdin)
        let (incoming_tx, incoming_rx) = mpsc::channel::<Message>(100);
        // Channel for outgoing responses (to stdout)
        let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<JsonRpcResponse>(100);

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let mut reader = BufReader::new(stdin);
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        debug!("EOF on stdin, stopping transport");
                        break;
                    }
                    Ok(_) => {
                        trace!("Received: {}", line.trim());
                        let Some(message) = decode_line(&line) else {
                            continue;
                        };
                        if let Message::Malformed(ref detail) = message {
                            warn!("Failed to parse message: {}", detail);
                        }
                        if incoming_tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let writer = tokio::spawn(async move {
            let mut stdout = tokio::io::stdout();

            while let Some(response) = outgoing_rx.recv().await {
                match serde_json::to_string(&response) {
                    Ok(s) => {
                        trace!("Sending: {}", s);
                        if let Err(e) = stdout.write_all(s.as_bytes()).await {
                            error!("Error writing to stdout: {}", e);
                            break;
                        }
                        if let Err(e) = stdout.write_all(b"\n").await {
                            error!("Error writing newline: {}", e);
                            break;
                        }
                        if let Err(e) = stdout.flush().await {
                            error!("Error flushing stdout: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error serializing message: {}", e);
                    }
                }
            }
        });
        self.writer = Some(writer);

        Ok((incoming_rx, outgoing_tx))
    }

    /// Waits for queued responses to be written; callers drop their senders first.
    async fn stop(&mut self) -> Result<()> {
        self.running = false;
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.await {
                error!("stdout writer task failed: {}", e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_line() {
        assert!(decode_line("   \n").is_none());

        match decode_line(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#) {
            Some(Message::Envelope(value)) => assert_eq!(value["method"], "ping"),
            other => panic!("expected envelope, got {other:?}"),
        }

        match decode_line("{not json") {
            Some(Message::Malformed(detail)) => assert!(!detail.is_empty()),
            other => panic!("expected malformed, got {other:?}"),
        }
    }

    #[test]
    fn test_stdio_transport_default() {
        assert!(!StdioTransport::default().is_running());
    }
}
