//! The tool registry.
//!
//! Tools form a closed set ([`ToolName`]). A `tools/call` request goes
//! through two stages:
//!
//! 1. [`ToolRegistry::prepare`] resolves the name, checks required
//!    arguments against the tool's input schema and deserializes the typed
//!    arguments. Failures here are JSON-RPC `-32602` errors.
//! 2. [`execute`] runs the invocation against the backend. Backend failures
//!    become `isError` tool results, never JSON-RPC errors.

pub mod args;
pub mod definitions;
mod handlers;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

pub use args::ToolInvocation;

use crate::azure::{ApimBackend, ApimError};
use crate::mcp::protocol::{ErrorCode, JsonRpcError, JsonRpcErrorData, RequestId};

/// Every tool the server exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    ListApis,
    GetApi,
    CreateApiFromYaml,
    CreateApiVersion,
    ListApiVersions,
    CreateApiRevision,
    ListApiRevisions,
    GetApiOperations,
    CreateGrpcApiFromProto,
    ListProducts,
    GetProduct,
    CreateProduct,
    AddApiToProduct,
    GetApiProducts,
    ListSubscriptions,
    CreateSubscription,
    GetSubscription,
    ListBackends,
}

impl ToolName {
    /// All tools, in `tools/list` order.
    pub const ALL: [Self; 18] = [
        Self::ListApis,
        Self::GetApi,
        Self::CreateApiFromYaml,
        Self::CreateApiVersion,
        Self::ListApiVersions,
        Self::CreateApiRevision,
        Self::ListApiRevisions,
        Self::GetApiOperations,
        Self::CreateGrpcApiFromProto,
        Self::ListProducts,
        Self::GetProduct,
        Self::CreateProduct,
        Self::AddApiToProduct,
        Self::GetApiProducts,
        Self::ListSubscriptions,
        Self::CreateSubscription,
        Self::GetSubscription,
        Self::ListBackends,
    ];

    /// The wire name of the tool.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ListApis => "list_apis",
            Self::GetApi => "get_api",
            Self::CreateApiFromYaml => "create_api_from_yaml",
            Self::CreateApiVersion => "create_api_version",
            Self::ListApiVersions => "list_api_versions",
            Self::CreateApiRevision => "create_api_revision",
            Self::ListApiRevisions => "list_api_revisions",
            Self::GetApiOperations => "get_api_operations",
            Self::CreateGrpcApiFromProto => "create_grpc_api_from_proto",
            Self::ListProducts => "list_products",
            Self::GetProduct => "get_product",
            Self::CreateProduct => "create_product",
            Self::AddApiToProduct => "add_api_to_product",
            Self::GetApiProducts => "get_api_products",
            Self::ListSubscriptions => "list_subscriptions",
            Self::CreateSubscription => "create_subscription",
            Self::GetSubscription => "get_subscription",
            Self::ListBackends => "list_backends",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string names no tool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown tool: {0}")]
pub struct UnknownTool(pub String);

impl FromStr for ToolName {
    type Err = UnknownTool;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tool| tool.as_str() == name)
            .ok_or_else(|| UnknownTool(name.to_string()))
    }
}

/// A tool definition for tools/list response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

/// Parameters for tools/call request.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool; absent means `{}`.
    #[serde(default)]
    pub arguments: Value,
}

/// Content item in a tool call response.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

/// Result of a tool call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
    /// Whether the tool call resulted in an error.
    #[serde(skip_serializing_if = "is_false")]
    pub is_error: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if requires a predicate fn(&T) -> bool
const fn is_false(b: &bool) -> bool {
    !*b
}

impl ToolCallResult {
    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Creates an error text result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }
}

/// Why a `tools/call` request was rejected before running.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// `params` is absent or not a tool call.
    #[error("Invalid tool call params: {0}")]
    InvalidParams(String),

    /// The tool name is not in the registry.
    #[error(transparent)]
    UnknownTool(#[from] UnknownTool),

    /// `arguments` is not a JSON object.
    #[error("Arguments for {tool} must be an object")]
    ArgumentsNotObject {
        /// The tool called.
        tool: ToolName,
    },

    /// Required arguments are absent.
    #[error("Missing required argument(s) for {tool}: {}", .missing.join(", "))]
    MissingArguments {
        /// The tool called.
        tool: ToolName,
        /// Names of the absent arguments.
        missing: Vec<String>,
    },

    /// An argument has the wrong type or an unknown enum value.
    #[error("Invalid arguments for {tool}: {source}")]
    InvalidArguments {
        /// The tool called.
        tool: ToolName,
        /// The deserialization error.
        source: serde_json::Error,
    },
}

impl DispatchError {
    /// Converts into a JSON-RPC invalid params error.
    #[must_use]
    pub fn into_response(self, id: RequestId) -> JsonRpcError {
        let data = match &self {
            Self::MissingArguments { tool, missing } => {
                Some(json!({ "tool": tool.as_str(), "missing": missing }))
            }
            Self::UnknownTool(UnknownTool(name)) => Some(json!({ "tool": name })),
            _ => None,
        };

        let mut error = JsonRpcErrorData::with_message(ErrorCode::InvalidParams, self.to_string());
        if let Some(data) = data {
            error = error.with_data(data);
        }
        JsonRpcError::new(Some(id), error)
    }
}

/// A handler failure.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The backend rejected the call.
    #[error(transparent)]
    Backend(#[from] ApimError),

    /// The handler's result could not be serialised.
    #[error("Failed to serialise tool result: {0}")]
    Serialise(#[from] serde_json::Error),
}

/// The static tool definitions and the validation built on them.
pub struct ToolRegistry {
    definitions: Vec<ToolDefinition>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    /// Builds the definitions of every tool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            definitions: ToolName::ALL
                .into_iter()
                .map(definitions::definition)
                .collect(),
        }
    }

    /// The definitions, in `tools/list` order.
    #[must_use]
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    fn definition(&self, tool: ToolName) -> Option<&ToolDefinition> {
        self.definitions.iter().find(|d| d.name == tool.as_str())
    }

    /// Validates `tools/call` params into a runnable invocation.
    ///
    /// # Errors
    ///
    /// Returns a [`DispatchError`] if the tool is unknown, a required
    /// argument is absent (or `null`), or an argument has the wrong type.
    pub fn prepare(&self, params: Option<&Value>) -> Result<ToolInvocation, DispatchError> {
        let params = params.ok_or_else(|| DispatchError::InvalidParams("missing params".into()))?;
        let ToolCallParams { name, arguments } = ToolCallParams::deserialize(params)
            .map_err(|e| DispatchError::InvalidParams(e.to_string()))?;

        let tool: ToolName = name.parse()?;

        let arguments = match arguments {
            Value::Null => Value::Object(serde_json::Map::new()),
            Value::Object(_) => arguments,
            _ => return Err(DispatchError::ArgumentsNotObject { tool }),
        };

        if let Some(definition) = self.definition(tool) {
            let missing: Vec<String> = definitions::required_arguments(definition)
                .filter(|name| arguments.get(*name).map_or(true, Value::is_null))
                .map(str::to_string)
                .collect();
            if !missing.is_empty() {
                return Err(DispatchError::MissingArguments { tool, missing });
            }
        }

        ToolInvocation::parse(tool, arguments)
            .map_err(|source| DispatchError::InvalidArguments { tool, source })
    }
}

/// Runs a validated invocation.
///
/// Backend failures are returned as `isError` results.
///
/// # Errors
///
/// Returns an error only if the handler's result cannot be serialised.
pub async fn execute(
    backend: &dyn ApimBackend,
    invocation: ToolInvocation,
) -> Result<ToolCallResult, serde_json::Error> {
    let tool = invocation.tool();
    tracing::debug!(%tool, "Calling tool");

    match handlers::run(backend, invocation).await {
        Ok(value) => Ok(ToolCallResult::text(serde_json::to_string_pretty(&value)?)),
        Err(ToolError::Backend(error)) => {
            tracing::warn!(%tool, %error, "Tool call failed");
            Ok(ToolCallResult::error(error.to_string()))
        }
        Err(ToolError::Serialise(error)) => Err(error),
    }
}
