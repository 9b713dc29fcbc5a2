//! Shared harness for driving the server over in-process pipes.

#![allow(dead_code)]

use std::future::Future;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};
use tokio::sync::Notify;

use apim_mcp::azure::models::{
    ApiCreateOrUpdate, ApiInfo, ApiOperationInfo, ApiProperties, ApiRevision, ApiVersionSetInfo,
    ApiVersionSetProperties, BackendInfo, ProductInfo, ProductProperties, ServiceTarget,
    SubscriptionCreate, SubscriptionInfo, SubscriptionKeys,
};
use apim_mcp::azure::{ApimBackend, ApimResult, InMemoryApim};
use apim_mcp::mcp::server::McpServer;
use apim_mcp::mcp::StdioTransport;

pub type PipeServer = McpServer<BufReader<DuplexStream>, DuplexStream>;

const PIPE_CAPACITY: usize = 64 * 1024;

/// The client end of a server session.
pub struct Client {
    writer: Option<DuplexStream>,
    lines: Lines<BufReader<DuplexStream>>,
}

impl Client {
    /// Sends one raw line.
    pub async fn send_line(&mut self, line: &str) {
        let writer = self.writer.as_mut().expect("input already closed");
        writer.write_all(line.as_bytes()).await.unwrap();
        writer.write_all(b"\n").await.unwrap();
        writer.flush().await.unwrap();
    }

    /// Sends a JSON-RPC request without waiting for the response.
    pub async fn send(&mut self, id: Value, method: &str, params: Option<Value>) {
        let mut message = json!({"jsonrpc": "2.0", "id": id, "method": method});
        if let Some(params) = params {
            message["params"] = params;
        }
        self.send_line(&message.to_string()).await;
    }

    /// Receives the next message written by the server.
    pub async fn recv(&mut self) -> Value {
        let line = self
            .lines
            .next_line()
            .await
            .unwrap()
            .expect("server closed its output");
        serde_json::from_str(&line).unwrap()
    }

    /// Sends a request and waits for its response.
    pub async fn request(&mut self, id: i64, method: &str, params: Option<Value>) -> Value {
        self.send(json!(id), method, params).await;
        let response = self.recv().await;
        assert_eq!(response["id"], id, "unexpected response: {response}");
        response
    }

    /// Initialises the session with protocol version 2024-11-05.
    pub async fn initialize(&mut self) -> Value {
        self.request(
            1,
            "initialize",
            Some(json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "test-client", "version": "1.0.0"}
            })),
        )
        .await
    }

    /// Calls a tool and returns the response.
    pub async fn call_tool(&mut self, id: i64, name: &str, arguments: Value) -> Value {
        self.request(
            id,
            "tools/call",
            Some(json!({"name": name, "arguments": arguments})),
        )
        .await
    }

    /// Closes the server's input.
    pub fn close_input(&mut self) {
        self.writer = None;
    }

    /// Closes the input and collects everything the server still writes.
    pub async fn finish(mut self) -> Vec<Value> {
        self.close_input();
        let mut remaining = Vec::new();
        while let Some(line) = self.lines.next_line().await.unwrap() {
            remaining.push(serde_json::from_str(&line).unwrap());
        }
        remaining
    }
}

/// Connects a server to a fresh client over in-memory pipes.
pub fn connect(backend: Arc<dyn ApimBackend>) -> (PipeServer, Client) {
    let (client_writer, server_reader) = duplex(PIPE_CAPACITY);
    let (server_writer, client_reader) = duplex(PIPE_CAPACITY);

    let server = McpServer::with_transport(
        backend,
        StdioTransport::with_io(BufReader::new(server_reader), server_writer),
    );
    let client = Client {
        writer: Some(client_writer),
        lines: BufReader::new(client_reader).lines(),
    };

    (server, client)
}

/// Serves until EOF, then drops the server so the client sees its output close.
pub async fn serve(mut server: PipeServer) -> io::Result<()> {
    server.serve().await
}

/// Serves until EOF or `shutdown`, then drops the server.
pub async fn serve_until(
    mut server: PipeServer,
    shutdown: impl Future<Output = ()>,
) -> io::Result<()> {
    server.serve_until(shutdown).await
}

/// Returns the text of the first content item of a tool result.
pub fn tool_text(response: &Value) -> &str {
    response["result"]["content"][0]["text"]
        .as_str()
        .expect("tool result has no text content")
}

/// Builds an API with the given id.
pub fn api(name: &str) -> ApiInfo {
    ApiInfo {
        id: format!("/apis/{name}"),
        name: name.to_string(),
        properties: ApiProperties {
            display_name: Some(format!("{name} API")),
            path: Some(name.to_string()),
            protocols: vec!["https".to_string()],
            api_type: Some("http".to_string()),
            ..ApiProperties::default()
        },
    }
}

/// Delegates to an [`InMemoryApim`], holding `get_api` for one API until
/// the gate is opened. Optionally panics in `list_backends`.
pub struct GatedApim {
    inner: InMemoryApim,
    gated_api: String,
    gate: Arc<Notify>,
    panic_on_backends: bool,
}

impl GatedApim {
    pub fn new(inner: InMemoryApim, gated_api: &str) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let backend = Self {
            inner,
            gated_api: gated_api.to_string(),
            gate: Arc::clone(&gate),
            panic_on_backends: false,
        };
        (backend, gate)
    }

    /// A backend whose `list_backends` panics.
    pub fn panicking(inner: InMemoryApim) -> Self {
        Self {
            inner,
            gated_api: String::new(),
            gate: Arc::new(Notify::new()),
            panic_on_backends: true,
        }
    }
}

#[async_trait]
impl ApimBackend for GatedApim {
    fn target(&self) -> ServiceTarget {
        self.inner.target()
    }

    async fn list_apis(&self) -> ApimResult<Vec<ApiInfo>> {
        self.inner.list_apis().await
    }

    async fn get_api(&self, api_id: &str) -> ApimResult<ApiInfo> {
        if api_id == self.gated_api {
            self.gate.notified().await;
        }
        self.inner.get_api(api_id).await
    }

    async fn create_or_update_api(
        &self,
        api_id: &str,
        api: &ApiCreateOrUpdate,
    ) -> ApimResult<ApiInfo> {
        self.inner.create_or_update_api(api_id, api).await
    }

    async fn list_api_revisions(&self, api_id: &str) -> ApimResult<Vec<ApiRevision>> {
        self.inner.list_api_revisions(api_id).await
    }

    async fn list_api_operations(&self, api_id: &str) -> ApimResult<Vec<ApiOperationInfo>> {
        self.inner.list_api_operations(api_id).await
    }

    async fn create_or_update_version_set(
        &self,
        version_set_id: &str,
        version_set: &ApiVersionSetProperties,
    ) -> ApimResult<ApiVersionSetInfo> {
        self.inner
            .create_or_update_version_set(version_set_id, version_set)
            .await
    }

    async fn list_products(&self) -> ApimResult<Vec<ProductInfo>> {
        self.inner.list_products().await
    }

    async fn get_product(&self, product_id: &str) -> ApimResult<ProductInfo> {
        self.inner.get_product(product_id).await
    }

    async fn create_or_update_product(
        &self,
        product_id: &str,
        product: &ProductProperties,
    ) -> ApimResult<ProductInfo> {
        self.inner.create_or_update_product(product_id, product).await
    }

    async fn add_api_to_product(&self, product_id: &str, api_id: &str) -> ApimResult<ApiInfo> {
        self.inner.add_api_to_product(product_id, api_id).await
    }

    async fn list_api_products(&self, api_id: &str) -> ApimResult<Vec<ProductInfo>> {
        self.inner.list_api_products(api_id).await
    }

    async fn list_subscriptions(&self) -> ApimResult<Vec<SubscriptionInfo>> {
        self.inner.list_subscriptions().await
    }

    async fn get_subscription(&self, subscription_id: &str) -> ApimResult<SubscriptionInfo> {
        self.inner.get_subscription(subscription_id).await
    }

    async fn create_or_update_subscription(
        &self,
        subscription_id: &str,
        subscription: &SubscriptionCreate,
    ) -> ApimResult<SubscriptionInfo> {
        self.inner
            .create_or_update_subscription(subscription_id, subscription)
            .await
    }

    async fn list_subscription_secrets(
        &self,
        subscription_id: &str,
    ) -> ApimResult<SubscriptionKeys> {
        self.inner.list_subscription_secrets(subscription_id).await
    }

    async fn list_backends(&self) -> ApimResult<Vec<BackendInfo>> {
        assert!(!self.panic_on_backends, "backend listing blew up");
        self.inner.list_backends().await
    }
}
