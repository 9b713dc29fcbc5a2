//! stdio transport for MCP server.
//!
//! This module implements the stdio transport as specified by MCP:
//!
//! - Messages are UTF-8 encoded JSON-RPC
//! - Messages are delimited by newlines
//! - Messages must not contain embedded newlines
//! - stdin: receives messages from client
//! - stdout: sends messages to client
//! - stderr: may be used for logging (not MCP messages)
//!
//! The transport is generic over its byte streams so the server can be
//! driven by in-memory pipes in tests.
//!
//! # Cancellation
//!
//! [`StdioTransport::read_line`] is raced against tool completions in the
//! server's `select!` loop. Partially read bytes live in the transport, not
//! in the future, so a cancelled read loses nothing.

use std::io;

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::mcp::protocol::{JsonRpcError, JsonRpcResponse};

/// A line-delimited MCP transport, over stdin/stdout by default.
pub struct StdioTransport<R = BufReader<tokio::io::Stdin>, W = tokio::io::Stdout> {
    reader: R,
    writer: W,
    /// Bytes of the line currently being read.
    pending: Vec<u8>,
}

impl StdioTransport {
    /// Creates a new stdio transport.
    #[must_use]
    pub fn new() -> Self {
        Self::with_io(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, W> StdioTransport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a transport over arbitrary streams.
    #[must_use]
    pub fn with_io(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            pending: Vec::new(),
        }
    }

    /// Consumes the transport, returning its streams.
    pub fn into_parts(self) -> (R, W) {
        (self.reader, self.writer)
    }

    /// Reads the next message line.
    ///
    /// The trailing newline (and `\r`, if any) is stripped. An unterminated
    /// final line is returned at EOF. Returns `None` once the input is
    /// exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if reading from the input fails.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        let bytes_read = self.reader.read_until(b'\n', &mut self.pending).await?;

        if bytes_read == 0 && self.pending.is_empty() {
            return Ok(None);
        }

        let mut line = std::mem::take(&mut self.pending);
        if line.last() == Some(&b'\n') {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        }

        // Invalid UTF-8 cannot be JSON; let the parser drop it.
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }

    /// Writes a JSON-RPC response.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or writing fails.
    pub async fn write_response(&mut self, response: &JsonRpcResponse) -> io::Result<()> {
        self.write_message(response).await
    }

    /// Writes a JSON-RPC error.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or writing fails.
    pub async fn write_error(&mut self, error: &JsonRpcError) -> io::Result<()> {
        self.write_message(error).await
    }

    async fn write_message<T: Serialize>(&mut self, message: &T) -> io::Result<()> {
        let json = serde_json::to_string(message)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        self.write_raw(json).await
    }

    /// Writes one serialised message as a single newline-terminated line.
    async fn write_raw(&mut self, json: String) -> io::Result<()> {
        // stdio framing: a message must not contain embedded newlines
        debug_assert!(
            !json.contains('\n'),
            "JSON message must not contain embedded newlines"
        );

        let mut line = json.into_bytes();
        line.push(b'\n');

        self.writer.write_all(&line).await?;
        self.writer.flush().await
    }
}
