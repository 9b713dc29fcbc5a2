//! MCP server implementation for Azure API Management.
//!
//! This module implements the MCP server lifecycle:
//!
//! 1. **Initialisation**: Version agreement and capability advertisement
//! 2. **Operation**: Handling tool calls and other requests
//! 3. **Shutdown**: EOF (after in-flight calls finish) or a signal
//!
//! # Concurrency
//!
//! Lines are read, parsed and routed on the loop itself. Each `tools/call`
//! is validated on the loop and then spawned, so slow Azure calls never block
//! reading. Their responses are written as they complete, which may differ
//! from arrival order; the `id` correlates them.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::task::{self, JoinError, JoinSet};

use crate::azure::ApimBackend;
use crate::mcp::protocol::{
    parse_message, IncomingMessage, JsonRpcError, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, RequestId, MCP_PROTOCOL_VERSION, SERVER_NAME, SUPPORTED_PROTOCOL_VERSIONS,
};
use crate::mcp::resources;
use crate::mcp::tools::{self, ToolRegistry};
use crate::mcp::transport::StdioTransport;

type Reply = Result<JsonRpcResponse, JsonRpcError>;

/// Server state in the MCP lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for initialize request.
    AwaitingInit,
    /// Ready for normal operation.
    Running,
    /// Shutdown in progress.
    ShuttingDown,
}

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolCapabilities>,
    /// Resource-related capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceCapabilities>,
    /// Prompt-related capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<PromptCapabilities>,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            tools: Some(ToolCapabilities::default()),
            resources: Some(ResourceCapabilities::default()),
            prompts: Some(PromptCapabilities::default()),
        }
    }
}

/// Tool-specific capabilities.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolCapabilities {
    /// Whether the tool list can change during the session.
    #[serde(rename = "listChanged", skip_serializing_if = "is_false")]
    pub list_changed: bool,
}

/// Resource-specific capabilities.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResourceCapabilities {
    /// Whether clients can subscribe to resource updates.
    #[serde(skip_serializing_if = "is_false")]
    pub subscribe: bool,
    /// Whether the resource list can change during the session.
    #[serde(rename = "listChanged", skip_serializing_if = "is_false")]
    pub list_changed: bool,
}

/// Prompt-specific capabilities.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PromptCapabilities {
    /// Whether the prompt list can change during the session.
    #[serde(rename = "listChanged", skip_serializing_if = "is_false")]
    pub list_changed: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if requires a predicate fn(&T) -> bool, so we must take &bool here
const fn is_false(b: &bool) -> bool {
    !*b
}

/// Server information for initialisation response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Client information received during initialisation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    #[serde(default)]
    pub version: Option<String>,
}

/// Parameters for the initialize request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version requested by client.
    pub protocol_version: String,
    /// Client capabilities.
    #[serde(default)]
    pub capabilities: Value,
    /// Client information.
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

/// Parameters for the resources/read request.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadResourceParams {
    /// URI of the resource.
    pub uri: String,
}

/// Picks the protocol version to answer `initialize` with.
///
/// A supported client version is echoed; anything else gets the newest
/// version this server speaks.
#[must_use]
pub fn negotiate_protocol_version(requested: &str) -> &'static str {
    SUPPORTED_PROTOCOL_VERSIONS
        .iter()
        .copied()
        .find(|version| *version == requested)
        .unwrap_or(MCP_PROTOCOL_VERSION)
}

/// The MCP server for Azure API Management.
pub struct McpServer<R = BufReader<tokio::io::Stdin>, W = tokio::io::Stdout> {
    /// Current server state.
    state: ServerState,
    /// The transport layer.
    transport: StdioTransport<R, W>,
    /// Negotiated protocol version (set after initialisation).
    protocol_version: Option<&'static str>,
    /// APIM access shared by every tool call.
    backend: Arc<dyn ApimBackend>,
    /// Static tool definitions.
    tools: ToolRegistry,
    /// Tool calls that have not answered yet.
    in_flight: JoinSet<Reply>,
    /// Request IDs of the tool call tasks, for answering a task that died.
    in_flight_ids: HashMap<task::Id, RequestId>,
}

impl McpServer {
    /// Creates a server speaking over stdin/stdout.
    #[must_use]
    pub fn new(backend: Arc<dyn ApimBackend>) -> Self {
        Self::with_transport(backend, StdioTransport::new())
    }
}

impl<R, W> McpServer<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a server over an arbitrary transport.
    #[must_use]
    pub fn with_transport(backend: Arc<dyn ApimBackend>, transport: StdioTransport<R, W>) -> Self {
        Self {
            state: ServerState::AwaitingInit,
            transport,
            protocol_version: None,
            backend,
            tools: ToolRegistry::new(),
            in_flight: JoinSet::new(),
            in_flight_ids: HashMap::new(),
        }
    }

    /// Returns the current server state.
    #[must_use]
    pub const fn state(&self) -> ServerState {
        self.state
    }

    /// Returns the negotiated protocol version, once initialised.
    #[must_use]
    pub const fn protocol_version(&self) -> Option<&'static str> {
        self.protocol_version
    }

    /// Consumes the server, returning its transport.
    pub fn into_transport(self) -> StdioTransport<R, W> {
        self.transport
    }

    /// Runs the MCP server main loop with graceful shutdown handling.
    ///
    /// Returns when input reaches EOF (after in-flight tool calls have
    /// answered) or when SIGINT/SIGTERM (Ctrl+C on Windows) arrives.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails or signal handlers cannot be
    /// installed.
    pub async fn run(&mut self) -> io::Result<()> {
        let shutdown = shutdown_signal()?;
        self.serve_until(shutdown).await
    }

    /// Runs the main loop until EOF, without signal handling.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn serve(&mut self) -> io::Result<()> {
        self.serve_until(std::future::pending()).await
    }

    /// Runs the main loop until EOF or until `shutdown` completes.
    ///
    /// In-flight tool calls are awaited at EOF but abandoned on shutdown,
    /// including a shutdown that arrives while they are being awaited.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn serve_until(&mut self, shutdown: impl Future<Output = ()>) -> io::Result<()> {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    self.abandon_in_flight();
                    return Ok(());
                }

                Some(joined) = self.in_flight.join_next_with_id(), if !self.in_flight.is_empty() => {
                    self.write_reply(joined).await?;
                }

                line_result = self.transport.read_line() => {
                    if self.handle_transport_result(line_result).await? {
                        break;
                    }
                }
            }
        }

        self.drain(shutdown).await
    }

    /// Writes the responses of every remaining tool call, unless `shutdown`
    /// completes first.
    async fn drain<S>(&mut self, mut shutdown: Pin<&mut S>) -> io::Result<()>
    where
        S: Future<Output = ()>,
    {
        if !self.in_flight.is_empty() {
            tracing::debug!(
                pending = self.in_flight.len(),
                "Input closed, waiting for in-flight tool calls"
            );
        }

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    self.abandon_in_flight();
                    return Ok(());
                }

                joined = self.in_flight.join_next_with_id() => match joined {
                    Some(joined) => self.write_reply(joined).await?,
                    None => return Ok(()),
                },
            }
        }
    }

    fn abandon_in_flight(&mut self) {
        if !self.in_flight.is_empty() {
            tracing::info!(
                pending = self.in_flight.len(),
                "Shutting down, abandoning in-flight tool calls"
            );
        }
        self.state = ServerState::ShuttingDown;
        self.in_flight.abort_all();
        self.in_flight_ids.clear();
    }

    /// Writes the outcome of a finished tool call task.
    ///
    /// A task that panicked is still answered, with an internal error.
    async fn write_reply(
        &mut self,
        joined: Result<(task::Id, Reply), JoinError>,
    ) -> io::Result<()> {
        match joined {
            Ok((task_id, reply)) => {
                self.in_flight_ids.remove(&task_id);
                match reply {
                    Ok(response) => self.transport.write_response(&response).await,
                    Err(error) => self.transport.write_error(&error).await,
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Tool call task failed");
                match self.in_flight_ids.remove(&e.id()) {
                    Some(id) => {
                        let error =
                            JsonRpcError::internal_error(id, "Internal error: tool call failed");
                        self.transport.write_error(&error).await
                    }
                    None => Ok(()),
                }
            }
        }
    }

    /// Handles the result from transport read.
    ///
    /// Returns `true` if input is exhausted.
    async fn handle_transport_result(
        &mut self,
        line_result: io::Result<Option<String>>,
    ) -> io::Result<bool> {
        let Some(line) = line_result? else {
            tracing::debug!("Input closed");
            self.state = ServerState::ShuttingDown;
            return Ok(true);
        };

        if line.trim().is_empty() {
            return Ok(false);
        }

        self.handle_line(&line).await?;
        Ok(false)
    }

    /// Handles a single line of input.
    ///
    /// Lines that are not JSON, or whose envelope is broken beyond
    /// recovering an `id`, are dropped without a response. Clients may
    /// share the stream with log output.
    async fn handle_line(&mut self, line: &str) -> io::Result<()> {
        match parse_message(line) {
            Ok(msg) => self.handle_message(msg).await,
            Err(error) if error.is_answerable() => self.transport.write_error(&error).await,
            Err(error) => {
                tracing::debug!(code = error.error.code, "Dropping unparseable input line");
                Ok(())
            }
        }
    }

    /// Handles a parsed incoming message.
    async fn handle_message(&mut self, msg: IncomingMessage) -> io::Result<()> {
        match msg {
            IncomingMessage::Request(req) => self.handle_request(req).await,
            IncomingMessage::Notification(ref notif) => {
                Self::handle_notification(notif);
                Ok(())
            }
        }
    }

    /// Handles an incoming request.
    async fn handle_request(&mut self, req: JsonRpcRequest) -> io::Result<()> {
        tracing::debug!(id = %req.id, method = %req.method, "Request received");

        if req.method == "tools/call" {
            return self.handle_tools_call(req).await;
        }

        let response = match req.method.as_str() {
            "initialize" => self.handle_initialize(&req),
            "ping" => Ok(Self::handle_ping(&req)),
            "tools/list" => self.handle_tools_list(&req),
            "resources/list" => self.handle_resources_list(&req),
            "resources/read" => self.handle_resources_read(&req),
            "prompts/list" => self.handle_prompts_list(&req),
            _ => Err(JsonRpcError::method_not_found(req.id.clone(), &req.method)),
        };

        match response {
            Ok(resp) => self.transport.write_response(&resp).await,
            Err(error) => self.transport.write_error(&error).await,
        }
    }

    /// Handles an incoming notification. None of them change state.
    fn handle_notification(notif: &JsonRpcNotification) {
        match notif.method.as_str() {
            "notifications/initialized" => tracing::debug!("Client finished initialisation"),
            "notifications/cancelled" => {
                tracing::debug!(params = ?notif.params, "Ignoring cancellation; tool calls run to completion");
            }
            other => tracing::debug!(method = other, "Ignoring notification"),
        }
    }

    /// Handles the initialize request.
    fn handle_initialize(&mut self, req: &JsonRpcRequest) -> Reply {
        if self.state != ServerState::AwaitingInit {
            return Err(JsonRpcError::lifecycle(
                req.id.clone(),
                "Server already initialised",
            ));
        }

        let params: InitializeParams = parse_params(req, "initialize")?;
        let negotiated_version = negotiate_protocol_version(&params.protocol_version);

        if let Some(client) = &params.client_info {
            tracing::info!(
                client = %client.name,
                version = client.version.as_deref().unwrap_or("unknown"),
                requested = %params.protocol_version,
                negotiated = negotiated_version,
                "Client connected"
            );
        }

        self.protocol_version = Some(negotiated_version);
        self.state = ServerState::Running;

        let result = json!({
            "protocolVersion": negotiated_version,
            "capabilities": ServerCapabilities::default(),
            "serverInfo": ServerInfo::default(),
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    /// Handles the ping request. Allowed in any state.
    fn handle_ping(req: &JsonRpcRequest) -> JsonRpcResponse {
        JsonRpcResponse::success(req.id.clone(), json!({}))
    }

    /// Handles the tools/list request.
    fn handle_tools_list(&self, req: &JsonRpcRequest) -> Reply {
        self.require_running(&req.id)?;

        let result = json!({
            "tools": self.tools.definitions(),
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    /// Handles the tools/call request.
    ///
    /// Validation errors are answered immediately; valid calls are spawned
    /// and answered when they complete.
    async fn handle_tools_call(&mut self, req: JsonRpcRequest) -> io::Result<()> {
        if let Err(error) = self.require_running(&req.id) {
            return self.transport.write_error(&error).await;
        }

        let invocation = match self.tools.prepare(req.params.as_ref()) {
            Ok(invocation) => invocation,
            Err(error) => {
                tracing::debug!(id = %req.id, %error, "Rejected tool call");
                return self.transport.write_error(&error.into_response(req.id)).await;
            }
        };

        let backend = Arc::clone(&self.backend);
        let id = req.id;
        let request_id = id.clone();

        let handle = self.in_flight.spawn(async move {
            tools::execute(backend.as_ref(), invocation)
                .await
                .and_then(serde_json::to_value)
                .map(|result| JsonRpcResponse::success(id.clone(), result))
                .map_err(|e| {
                    tracing::error!(error = %e, "Failed to serialise tool call result");
                    JsonRpcError::internal_error(id, "Internal error: failed to serialise result")
                })
        });
        self.in_flight_ids.insert(handle.id(), request_id);

        Ok(())
    }

    /// Handles the resources/list request.
    fn handle_resources_list(&self, req: &JsonRpcRequest) -> Reply {
        self.require_running(&req.id)?;

        Ok(JsonRpcResponse::success(
            req.id.clone(),
            json!({ "resources": resources::list() }),
        ))
    }

    /// Handles the resources/read request.
    fn handle_resources_read(&self, req: &JsonRpcRequest) -> Reply {
        self.require_running(&req.id)?;

        let params: ReadResourceParams = parse_params(req, "resources/read")?;
        let contents = resources::read(&params.uri, self.backend.as_ref(), self.tools.definitions())
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to serialise resource");
                JsonRpcError::internal_error(req.id.clone(), "Internal error: failed to serialise resource")
            })?
            .ok_or_else(|| {
                JsonRpcError::invalid_params(req.id.clone(), format!("Unknown resource: {}", params.uri))
            })?;

        Ok(JsonRpcResponse::success(
            req.id.clone(),
            json!({ "contents": [contents] }),
        ))
    }

    /// Handles the prompts/list request. No prompts are defined.
    fn handle_prompts_list(&self, req: &JsonRpcRequest) -> Reply {
        self.require_running(&req.id)?;

        Ok(JsonRpcResponse::success(req.id.clone(), json!({ "prompts": [] })))
    }

    /// Ensures the server is in the Running state.
    fn require_running(&self, id: &RequestId) -> Result<(), JsonRpcError> {
        if self.state != ServerState::Running {
            return Err(JsonRpcError::lifecycle(id.clone(), "Server not initialised"));
        }
        Ok(())
    }
}

/// Deserializes the request's params, which must be present.
fn parse_params<T: DeserializeOwned>(req: &JsonRpcRequest, method: &str) -> Result<T, JsonRpcError> {
    let params = req.params.as_ref().ok_or_else(|| {
        JsonRpcError::invalid_params(req.id.clone(), format!("Missing {method} params"))
    })?;

    T::deserialize(params).map_err(|e| {
        JsonRpcError::invalid_params(req.id.clone(), format!("Invalid {method} params: {e}"))
    })
}

/// Completes when the process is asked to stop.
#[cfg(unix)]
fn shutdown_signal() -> io::Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    Ok(async move {
        tokio::select! {
            _ = sigint.recv() => tracing::info!("Received SIGINT, initiating graceful shutdown"),
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, initiating graceful shutdown"),
        }
    })
}

/// Completes when the process is asked to stop.
#[cfg(windows)]
#[allow(clippy::unnecessary_wraps)] // matches the unix signature
fn shutdown_signal() -> io::Result<impl Future<Output = ()>> {
    Ok(async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received Ctrl+C, initiating graceful shutdown"),
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::azure::InMemoryApim;

    type TestServer = McpServer<Cursor<Vec<u8>>, Vec<u8>>;

    fn server(input: impl Into<String>) -> TestServer {
        McpServer::with_transport(
            Arc::new(InMemoryApim::default()),
            StdioTransport::with_io(Cursor::new(input.into().into_bytes()), Vec::new()),
        )
    }

    async fn responses(mut server: TestServer) -> Vec<Value> {
        server.serve().await.unwrap();
        let (_, written) = server.into_transport().into_parts();
        String::from_utf8(written)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    const INIT: &str = r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","capabilities":{}}}"#;

    #[test]
    fn server_initial_state() {
        let server = server("");
        assert_eq!(server.state(), ServerState::AwaitingInit);
        assert_eq!(server.protocol_version(), None);
    }

    #[test]
    fn protocol_version_negotiation() {
        assert_eq!(negotiate_protocol_version("2024-11-05"), "2024-11-05");
        assert_eq!(negotiate_protocol_version("2025-03-26"), "2025-03-26");
        assert_eq!(negotiate_protocol_version("1999-01-01"), MCP_PROTOCOL_VERSION);
    }

    #[test]
    fn capabilities_advertise_all_categories() {
        let value = serde_json::to_value(ServerCapabilities::default()).unwrap();
        assert_eq!(value, json!({"tools": {}, "resources": {}, "prompts": {}}));
    }

    #[tokio::test]
    async fn initialize_then_running() {
        let mut server = server(format!("{INIT}\n"));
        server.serve().await.unwrap();
        assert_eq!(server.protocol_version(), Some("2024-11-05"));
        assert_eq!(server.state(), ServerState::ShuttingDown);
    }

    #[tokio::test]
    async fn requests_before_initialize_are_refused() {
        let out = responses(server(
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"tools/list\"}\n\
             {\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}\n",
        ))
        .await;

        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["error"]["code"], -32600);
        assert_eq!(out[0]["error"]["message"], "Server not initialised");
        assert_eq!(out[1]["result"], json!({}));
    }

    #[tokio::test]
    async fn second_initialize_is_refused() {
        let input = format!("{INIT}\n{}\n", INIT.replace("\"id\":1", "\"id\":2"));
        let out = responses(server(input)).await;

        assert_eq!(out.len(), 2);
        assert_eq!(out[1]["id"], 2);
        assert_eq!(out[1]["error"]["message"], "Server already initialised");
    }

    #[tokio::test]
    async fn resources_and_prompts() {
        let input = format!(
            "{INIT}\n\
             {{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"resources/list\"}}\n\
             {{\"jsonrpc\":\"2.0\",\"id\":3,\"method\":\"resources/read\",\"params\":{{\"uri\":\"apim://service\"}}}}\n\
             {{\"jsonrpc\":\"2.0\",\"id\":4,\"method\":\"resources/read\",\"params\":{{\"uri\":\"apim://nope\"}}}}\n\
             {{\"jsonrpc\":\"2.0\",\"id\":5,\"method\":\"prompts/list\"}}\n"
        );
        let out = responses(server(input)).await;

        assert_eq!(out.len(), 5);
        assert_eq!(out[1]["result"]["resources"].as_array().unwrap().len(), 2);
        assert_eq!(out[2]["result"]["contents"][0]["uri"], "apim://service");
        assert_eq!(out[3]["error"]["code"], -32602);
        assert_eq!(out[4]["result"], json!({"prompts": []}));
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let input = format!(
            "{INIT}\n\
             {{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}}\n\
             {{\"jsonrpc\":\"2.0\",\"method\":\"notifications/cancelled\",\"params\":{{\"requestId\":1}}}}\n"
        );
        let out = responses(server(input)).await;
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn invalid_envelope_with_id_is_answered() {
        let out = responses(server(
            "{\"jsonrpc\":\"1.0\",\"id\":9,\"method\":\"ping\"}\n\
             {\"jsonrpc\":\"1.0\",\"method\":\"ping\"}\n",
        ))
        .await;

        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["id"], 9);
        assert_eq!(out[0]["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn shutdown_abandons_the_loop() {
        let mut server = server("");
        server.serve_until(async {}).await.unwrap();
        assert_eq!(server.state(), ServerState::ShuttingDown);
    }
}
