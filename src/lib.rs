//! apim-mcp: MCP server for Azure API Management
//!
//! This library exposes the management plane of one Azure API Management
//! instance (APIs, versions, revisions, products, subscriptions, backends) as
//! MCP tools that AI assistants can call.
//!
//! # Architecture
//!
//! The server is a thin translation layer:
//!
//! - **MCP**: JSON-RPC over stdio, lifecycle, tool validation and dispatch
//! - **Azure**: Azure Resource Manager calls behind the [`azure::ApimBackend`] trait
//!
//! Tool failures reported by Azure are returned to the assistant as tool
//! results, not protocol errors, so it can read them and react.
//!
//! # Modules
//!
//! - [`azure`]: Azure Resource Manager client and APIM operations
//! - [`config`]: Configuration loading and validation
//! - [`error`]: Error types
//! - [`mcp`]: MCP protocol implementation

pub mod azure;
pub mod config;
pub mod error;
pub mod mcp;
