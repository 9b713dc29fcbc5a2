//! Model Context Protocol (MCP) server implementation.
//!
//! This module implements the MCP specification for exposing Azure API
//! Management operations as tools to AI assistants. The server communicates
//! over stdio transport using newline-delimited JSON-RPC 2.0 messages.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         MCP Server                          │
//! │                                                             │
//! │   ┌─────────────┐    ┌─────────────┐    ┌─────────────┐    │
//! │   │  Transport  │───▶│   Server    │───▶│   Tools     │    │
//! │   │   (stdio)   │    │  (lifecycle)│    │  (handlers) │    │
//! │   └─────────────┘    └─────────────┘    └─────────────┘    │
//! │          │                  │                  │            │
//! │          ▼                  ▼                  ▼            │
//! │   ┌─────────────────┐              ┌──────────────────┐    │
//! │   │ JSON-RPC Messages│              │  ApimBackend     │    │
//! │   └─────────────────┘              └──────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! Versions 2024-11-05, 2025-03-26 and 2025-06-18 are accepted; a client
//! asking for anything else is offered 2025-06-18.

pub mod protocol;
pub mod resources;
pub mod server;
pub mod tools;
pub mod transport;

pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_PROTOCOL_VERSION};
pub use server::McpServer;
pub use tools::{ToolName, ToolRegistry};
pub use transport::StdioTransport;
