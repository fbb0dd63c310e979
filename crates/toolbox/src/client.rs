use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::FutureExt;
use rmcp::model::{
    CallToolRequest, CallToolRequestParams, CallToolResult, CancelledNotification,
    CancelledNotificationMethod, CancelledNotificationParam, ClientCapabilities, ClientInfo,
    ClientRequest, Implementation, InitializeResult, JsonObject, ListToolsRequest,
    PaginatedRequestParams, PingRequest, ProtocolVersion, RequestId, ServerResult, Tool,
};
use rmcp::service::{PeerRequestOptions, RequestHandle, RunningService, ServiceRole};
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::{ClientHandler, Peer, RoleClient, ServiceError, ServiceExt};
use serde_json::Value;
use tracing::{debug, warn};

use crate::configuration::Settings;
use crate::error::ToolError;
use crate::registry::ToolCallResult;

pub const CLIENT_NAME: &str = "toolbox-client";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: String,
    pub timeout: Duration,
    pub client_name: String,
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(30),
            client_name: CLIENT_NAME.to_string(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl From<&Settings> for ClientConfig {
    fn from(settings: &Settings) -> Self {
        ClientConfig::new(settings.endpoint()).with_timeout(settings.timeout())
    }
}

/// Lifecycle of one client call. `SessionClosed` is terminal.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    SessionOpening,
    SessionOpen,
    RequestSent,
    ResponseReceived,
    SessionClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingOutcome {
    pub ok: bool,
    pub latency: Option<Duration>,
}

#[derive(Clone)]
struct ToolboxClientHandler {
    name: String,
}

impl ClientHandler for ToolboxClientHandler {
    fn get_info(&self) -> ClientInfo {
        ClientInfo {
            meta: None,
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: self.name.clone(),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                ..Default::default()
            },
        }
    }
}

/// One MCP session. Dropping it cancels the underlying service.
pub struct Session {
    service: Option<RunningService<RoleClient, ToolboxClientHandler>>,
    state: SessionState,
    history: Vec<SessionState>,
    timeout: Duration,
}

impl Session {
    pub async fn open(config: &ClientConfig) -> Result<Self, ToolError> {
        let mut session = Self {
            service: None,
            state: SessionState::Idle,
            history: vec![SessionState::Idle],
            timeout: config.timeout,
        };
        session.transition(SessionState::SessionOpening);
        debug!(endpoint = %config.endpoint, "opening session");

        let transport = StreamableHttpClientTransport::from_uri(config.endpoint.clone());
        let handler = ToolboxClientHandler {
            name: config.client_name.clone(),
        };
        let service = match tokio::time::timeout(config.timeout, handler.serve(transport)).await {
            Ok(Ok(service)) => service,
            Ok(Err(e)) => {
                session.transition(SessionState::SessionClosed);
                return Err(ToolError::ConnectionFailure(format!(
                    "{}: {}",
                    config.endpoint, e
                )));
            }
            Err(_) => {
                session.transition(SessionState::SessionClosed);
                return Err(ToolError::ConnectionFailure(format!(
                    "no answer from {} within {:?}",
                    config.endpoint, config.timeout
                )));
            }
        };

        session.service = Some(service);
        session.transition(SessionState::SessionOpen);
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Every state this session has been in, oldest first.
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "session state");
        self.state = next;
        self.history.push(next);
    }

    fn service(&self) -> Result<&RunningService<RoleClient, ToolboxClientHandler>, ToolError> {
        self.service
            .as_ref()
            .ok_or_else(|| ToolError::ConnectionFailure("session already closed".to_string()))
    }

    /// Metadata the server returned from `initialize`.
    pub fn initialize_result(&self) -> Result<InitializeResult, ToolError> {
        self.service()?
            .peer_info()
            .cloned()
            .ok_or_else(|| ToolError::Internal("server sent no initialize result".to_string()))
    }

    async fn send_request(&mut self, request: ClientRequest) -> Result<ServerResult, ToolError> {
        let handle = self
            .service()?
            .send_cancellable_request(request, PeerRequestOptions::no_options())
            .await
            .map_err(map_service_error)?;
        self.transition(SessionState::RequestSent);

        let response = await_response(handle, self.timeout).await;
        self.transition(SessionState::ResponseReceived);
        response.map_err(map_service_error)
    }

    pub async fn list_tools(&mut self) -> Result<Vec<Tool>, ToolError> {
        let mut tools = Vec::new();
        let mut cursor = None;
        loop {
            let res = self
                .send_request(ClientRequest::ListToolsRequest(ListToolsRequest {
                    params: Some(PaginatedRequestParams { meta: None, cursor }),
                    method: Default::default(),
                    extensions: Default::default(),
                }))
                .await?;
            let ServerResult::ListToolsResult(page) = res else {
                return Err(unexpected_response("tools/list"));
            };
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(tools),
            }
        }
    }

    pub async fn call_tool(&mut self, name: String, arguments: JsonObject) -> ToolCallResult {
        let res = self
            .send_request(ClientRequest::CallToolRequest(CallToolRequest {
                params: CallToolRequestParams {
                    meta: None,
                    name: name.into(),
                    arguments: Some(arguments),
                    task: None,
                },
                method: Default::default(),
                extensions: Default::default(),
            }))
            .await?;

        match res {
            ServerResult::CallToolResult(result) => decode_call_result(result),
            _ => Err(unexpected_response("tools/call")),
        }
    }

    pub async fn ping(&mut self) -> Result<Duration, ToolError> {
        let started = Instant::now();
        let res = self
            .send_request(ClientRequest::PingRequest(PingRequest {
                method: Default::default(),
                extensions: Default::default(),
            }))
            .await?;

        match res {
            ServerResult::EmptyResult(_) => Ok(started.elapsed()),
            _ => Err(unexpected_response("ping")),
        }
    }

    /// Shuts the session down. Calling it again is a no-op.
    pub async fn close(&mut self) {
        if let Some(service) = self.service.take() {
            if let Err(e) = service.cancel().await {
                warn!(error = %e, "session task did not shut down cleanly");
            }
        }
        if self.state != SessionState::SessionClosed {
            self.transition(SessionState::SessionClosed);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.service.take().is_some() {
            debug!(state = ?self.state, "session dropped without close, cancelling");
            self.transition(SessionState::SessionClosed);
        }
    }
}

async fn await_response(
    handle: RequestHandle<RoleClient>,
    timeout: Duration,
) -> Result<<RoleClient as ServiceRole>::PeerResp, ServiceError> {
    let receiver = handle.rx;
    let peer = handle.peer;
    let request_id = handle.id;
    tokio::select! {
        result = receiver => {
            result.map_err(|_e| ServiceError::TransportClosed)?
        }
        _ = tokio::time::sleep(timeout) => {
            send_cancel_message(&peer, request_id, Some("timed out".to_owned())).await?;
            Err(ServiceError::Timeout{timeout})
        }
    }
}

async fn send_cancel_message(
    peer: &Peer<RoleClient>,
    request_id: RequestId,
    reason: Option<String>,
) -> Result<(), ServiceError> {
    peer.send_notification(
        CancelledNotification {
            params: CancelledNotificationParam { request_id, reason },
            method: CancelledNotificationMethod,
            extensions: Default::default(),
        }
        .into(),
    )
    .await
}

fn map_service_error(err: ServiceError) -> ToolError {
    match err {
        ServiceError::McpError(data) => ToolError::from_error_data(&data),
        ServiceError::Timeout { timeout } => ToolError::Timeout(timeout),
        ServiceError::TransportClosed => {
            ToolError::ConnectionFailure("transport closed".to_string())
        }
        other => ToolError::Internal(other.to_string()),
    }
}

fn unexpected_response(method: &str) -> ToolError {
    ToolError::Internal(format!("unexpected response to {method}"))
}

/// Prefers `structuredContent.result`, then the first text block, then a resource link.
///
/// Text is only decoded as JSON when it holds an object or an array; scalars such as
/// `123` or `true` stay strings.
fn decode_call_result(result: CallToolResult) -> ToolCallResult {
    let text = result
        .content
        .iter()
        .find_map(|c| c.as_text().map(|t| t.text.clone()));

    if result.is_error == Some(true) {
        return Err(ToolError::Internal(
            text.unwrap_or_else(|| "tool reported an error".to_string()),
        ));
    }

    if let Some(value) = result
        .structured_content
        .as_ref()
        .and_then(|s| s.get("result"))
    {
        return Ok(value.clone());
    }

    if let Some(t) = text {
        return Ok(match serde_json::from_str::<Value>(&t) {
            Ok(v @ (Value::Object(_) | Value::Array(_))) => v,
            _ => Value::String(t),
        });
    }

    match result.content.iter().find_map(|c| c.as_resource_link()) {
        Some(link) => serde_json::to_value(link).map_err(|e| ToolError::Internal(e.to_string())),
        None => Ok(Value::Null),
    }
}

/// Opens a fresh session for every operation and always closes it afterwards.
#[derive(Debug, Clone)]
pub struct ToolClient {
    config: ClientConfig,
}

impl ToolClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Runs `op` inside a session. The session is closed on every exit path.
    pub async fn with_session<T, F>(&self, op: F) -> Result<T, ToolError>
    where
        F: for<'s> FnOnce(&'s mut Session) -> BoxFuture<'s, Result<T, ToolError>>,
    {
        debug!(state = ?SessionState::Idle, endpoint = %self.config.endpoint, "starting call");
        let mut session = Session::open(&self.config).await?;
        let result = op(&mut session).await;
        session.close().await;
        result
    }

    pub async fn fetch_initialize_result(&self) -> Result<InitializeResult, ToolError> {
        self.with_session(|s| {
            let info = s.initialize_result();
            async move { info }.boxed()
        })
        .await
    }

    pub async fn list_tools(&self) -> Result<Vec<Tool>, ToolError> {
        self.with_session(|s| s.list_tools().boxed()).await
    }

    pub async fn call_tool(&self, name: impl Into<String>, arguments: JsonObject) -> ToolCallResult {
        let name = name.into();
        self.with_session(move |s| s.call_tool(name, arguments).boxed())
            .await
    }

    /// A failed probe is reported as `ok: false`; only a failed connect is an error.
    pub async fn ping(&self) -> Result<PingOutcome, ToolError> {
        self.with_session(|s| {
            async move {
                match s.ping().await {
                    Ok(latency) => Ok(PingOutcome {
                        ok: true,
                        latency: Some(latency),
                    }),
                    Err(e) => {
                        warn!(error = %e, "ping failed");
                        Ok(PingOutcome {
                            ok: false,
                            latency: None,
                        })
                    }
                }
            }
            .boxed()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcp::model::{Content, ErrorCode, RawResource};
    use rmcp::ErrorData;
    use serde_json::json;
    use test_case::test_case;

    #[test]
    fn structured_result_wins() {
        let mut result = CallToolResult::success(vec![Content::text("ignored")]);
        result.structured_content = Some(json!({"result": 12}));
        assert_eq!(decode_call_result(result).unwrap(), json!(12));
    }

    #[test_case("hello", json!("hello"); "plain text")]
    #[test_case("123", json!("123"); "numeric text stays a string")]
    #[test_case("true", json!("true"); "boolean text stays a string")]
    #[test_case(r#"{"a":1}"#, json!({"a": 1}); "object text is decoded")]
    #[test_case("[1,2]", json!([1, 2]); "array text is decoded")]
    fn text_result_without_structured_content(text: &str, expected: Value) {
        let result = CallToolResult::success(vec![Content::text(text)]);
        assert_eq!(decode_call_result(result).unwrap(), expected);
    }

    #[test]
    fn resource_link_result_is_returned_as_json() {
        let mut link = RawResource::new("data:Hello%2C+World%21", "Sample tools/call");
        link.mime_type = Some("text/plain".to_string());
        let result = CallToolResult::success(vec![Content::resource_link(link)]);
        let value = decode_call_result(result).unwrap();
        assert_eq!(value["uri"], json!("data:Hello%2C+World%21"));
        assert_eq!(value["mimeType"], json!("text/plain"));
    }

    #[test]
    fn tool_level_error_is_internal() {
        let result = CallToolResult::error(vec![Content::text("bad input")]);
        assert_eq!(
            decode_call_result(result).unwrap_err(),
            ToolError::Internal("bad input".to_string())
        );
    }

    #[test]
    fn service_errors_are_classified() {
        let not_found = ErrorData::new(
            ErrorCode::METHOD_NOT_FOUND,
            "Tool not found: divide",
            Some(json!({"kind": "not_found"})),
        );
        assert!(matches!(
            map_service_error(ServiceError::McpError(not_found)),
            ToolError::NotFound(_)
        ));

        let timeout = Duration::from_millis(10);
        assert_eq!(
            map_service_error(ServiceError::Timeout { timeout }),
            ToolError::Timeout(timeout)
        );
        assert!(matches!(
            map_service_error(ServiceError::TransportClosed),
            ToolError::ConnectionFailure(_)
        ));
    }

    #[test]
    fn config_from_settings_uses_endpoint_and_timeout() {
        let settings = Settings {
            port: 9999,
            timeout_secs: 3,
            ..Settings::default()
        };
        let config = ClientConfig::from(&settings);
        assert_eq!(config.endpoint, "http://localhost:9999/mcp");
        assert_eq!(config.timeout, Duration::from_secs(3));
    }

    #[tokio::test]
    async fn unreachable_server_is_connection_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = ToolClient::new(
            ClientConfig::new(format!("http://127.0.0.1:{port}/mcp"))
                .with_timeout(Duration::from_secs(5)),
        );
        let err = client.ping().await.unwrap_err();
        assert!(matches!(err, ToolError::ConnectionFailure(_)));
    }
}
