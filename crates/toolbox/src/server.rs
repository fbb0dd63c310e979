use std::sync::Arc;

use indoc::indoc;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rmcp::model::{
    AnnotateAble, CallToolRequestParams, CallToolResult, Content, ErrorCode,
    GetPromptRequestParams, GetPromptResult, Implementation, ListPromptsResult,
    ListResourcesResult, ListToolsResult, PaginatedRequestParams, Prompt, PromptArgument,
    PromptMessage, PromptMessageRole, ProtocolVersion, RawResource, ReadResourceRequestParams,
    ReadResourceResult, ResourceContents, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::error::{ErrorKind, ToolError};
use crate::registry::{ParamType, ToolCallRequest, ToolDefinition, ToolRegistry};

pub const TOOL_GREET_RESOURCE: &str = "greetResource";
pub const PROMPT_GREET: &str = "greet";
pub const PARAM_WHOM: &str = "whom";
pub const RESOURCE_URI_STATIC: &str = "test://static/resource";
const RESOURCE_TEXT_STATIC: &str = "This is a sample resource";

// Unreserved characters stay as-is, everything else is %-escaped.
const QUERY_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// MCP front end over a shared [`ToolRegistry`].
///
/// The HTTP service builds one instance per session; they all share the registry.
#[derive(Clone)]
pub struct ToolServer {
    registry: Arc<ToolRegistry>,
    name: String,
}

impl ToolServer {
    pub fn new(registry: Arc<ToolRegistry>, name: impl Into<String>) -> Self {
        Self {
            registry,
            name: name.into(),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    fn tools(&self) -> Vec<Tool> {
        self.registry
            .list_tools()
            .into_iter()
            .chain(std::iter::once(greet_resource_definition()))
            .map(|def| {
                Tool::new(
                    def.name().to_string(),
                    def.description().to_string(),
                    def.input_schema(),
                )
            })
            .collect()
    }

    fn prompts() -> Vec<Prompt> {
        vec![Prompt::new(
            PROMPT_GREET,
            Some("A prompt that greets the user"),
            Some(vec![PromptArgument {
                name: PARAM_WHOM.to_string(),
                title: None,
                description: Some("whom gets greeted".to_string()),
                required: Some(true),
            }]),
        )]
    }

    /// Runs a `tools/call`, logging the payload.
    pub fn call(&self, request: ToolCallRequest) -> Result<CallToolResult, ToolError> {
        info!(tool = %request.name, arguments = %serde_json::Value::Object(request.arguments.clone()), "tools/call");

        let outcome = if request.name == TOOL_GREET_RESOURCE {
            greet_resource(&request)
        } else {
            self.registry.dispatch(&request).map(|value| {
                info!(tool = %request.name, result = %value, "tool succeeded");
                success_result(value)
            })
        };

        match outcome {
            Ok(result) => Ok(result),
            Err(err) => {
                match err.kind() {
                    ErrorKind::Internal => error!(tool = %request.name, error = %err, "tool failed"),
                    _ => warn!(tool = %request.name, error = %err, "tool call rejected"),
                }
                Err(err)
            }
        }
    }
}

/// Strings go out as plain text; other values as their JSON rendering.
fn success_result(value: Value) -> CallToolResult {
    let text = match &value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let mut result = CallToolResult::success(vec![Content::text(text)]);
    result.structured_content = Some(json!({ "result": value }));
    result
}

fn greet_resource_definition() -> ToolDefinition {
    // The result is a resource link, the declared return type is not checked.
    ToolDefinition::new(
        TOOL_GREET_RESOURCE,
        "example to get a greeting via a resource",
        ParamType::String,
    )
    .param(PARAM_WHOM, ParamType::String)
}

/// `data:` URI carrying the query-escaped greeting for `whom`.
pub fn greeting_uri(whom: &str) -> String {
    let greeting = format!("Hello, {whom}!");
    let escaped = utf8_percent_encode(&greeting, QUERY_ESCAPE)
        .to_string()
        .replace("%20", "+");
    format!("data:{escaped}")
}

fn greet_resource(request: &ToolCallRequest) -> Result<CallToolResult, ToolError> {
    greet_resource_definition().validate(&request.arguments)?;
    let whom = request
        .arguments
        .get(PARAM_WHOM)
        .and_then(Value::as_str)
        .unwrap_or_default();

    let mut link = RawResource::new(greeting_uri(whom), "Sample tools/call");
    link.description = Some("A sample tools/call for demonstration".to_string());
    link.mime_type = Some("text/plain".to_string());
    info!(tool = %request.name, uri = %link.uri, "tool succeeded");
    Ok(CallToolResult::success(vec![Content::resource_link(link)]))
}

impl ServerHandler for ToolServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder()
                .enable_prompts()
                .enable_resources()
                .enable_tools()
                .build(),
            server_info: Implementation {
                name: self.name.clone(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                indoc! {r#"
                Example tool server.

                Tools: add(a, b), mult(a, b), lower(s), greetResource(whom).
                Prompt: greet(whom). Resource: test://static/resource.
            "#}
                .to_string(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult::with_all_items(self.tools()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let request = ToolCallRequest::new(request.name, request.arguments.unwrap_or_default());
        self.call(request).map_err(McpError::from)
    }

    async fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListPromptsResult, McpError> {
        Ok(ListPromptsResult::with_all_items(Self::prompts()))
    }

    async fn get_prompt(
        &self,
        request: GetPromptRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<GetPromptResult, McpError> {
        if request.name != PROMPT_GREET {
            return Err(McpError::invalid_params(
                format!("Unknown prompt: {}", request.name),
                None,
            ));
        }

        let whom = request
            .arguments
            .as_ref()
            .and_then(|args| args.get(PARAM_WHOM))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                McpError::invalid_params(format!("Missing required argument: {PARAM_WHOM}"), None)
            })?;

        Ok(GetPromptResult {
            description: Some("A simple prompt to greet someone".to_string()),
            messages: vec![PromptMessage::new_text(
                PromptMessageRole::User,
                format!("What's up, {whom}?"),
            )],
        })
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        let mut resource = RawResource::new(RESOURCE_URI_STATIC, "Static Resource");
        resource.mime_type = Some("text/plain".to_string());
        Ok(ListResourcesResult::with_all_items(vec![
            resource.no_annotation()
        ]))
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        if request.uri != RESOURCE_URI_STATIC {
            return Err(McpError::new(
                ErrorCode::RESOURCE_NOT_FOUND,
                format!("Unknown resource: {}", request.uri),
                None,
            ));
        }
        Ok(ReadResourceResult {
            contents: vec![ResourceContents::TextResourceContents {
                uri: RESOURCE_URI_STATIC.to_string(),
                mime_type: Some("text/plain".to_string()),
                text: RESOURCE_TEXT_STATIC.to_string(),
                meta: None,
            }],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::default_registry;
    use rmcp::object;

    fn server() -> ToolServer {
        ToolServer::new(Arc::new(default_registry()), "test")
    }

    #[test]
    fn success_carries_text_and_structured_value() {
        let result = server()
            .call(ToolCallRequest::new("add", object!({"a": 6, "b": 2})))
            .unwrap();
        assert_eq!(result.structured_content, Some(json!({"result": 8})));
        assert_eq!(result.is_error, Some(false));
        let text = result.content[0].as_text().map(|t| t.text.clone());
        assert_eq!(text.as_deref(), Some("8"));
    }

    #[test]
    fn string_result_text_is_unquoted() {
        let result = server()
            .call(ToolCallRequest::new("lower", object!({"s": "HeLLo"})))
            .unwrap();
        assert_eq!(result.structured_content, Some(json!({"result": "hello"})));
        let text = result.content[0].as_text().map(|t| t.text.clone());
        assert_eq!(text.as_deref(), Some("hello"));
    }

    #[test]
    fn greet_resource_returns_data_link() {
        let result = server()
            .call(ToolCallRequest::new(
                TOOL_GREET_RESOURCE,
                object!({"whom": "World"}),
            ))
            .unwrap();
        let link = result.content[0].as_resource_link().unwrap();
        assert_eq!(link.uri, "data:Hello%2C+World%21");
        assert_eq!(link.mime_type.as_deref(), Some("text/plain"));
        assert_eq!(result.structured_content, None);
    }

    #[test]
    fn greet_resource_validates_arguments() {
        let err = server()
            .call(ToolCallRequest::new(TOOL_GREET_RESOURCE, object!({"whom": 3})))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = server()
            .call(ToolCallRequest::new(TOOL_GREET_RESOURCE, object!({})))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn greeting_uri_escapes_like_a_query() {
        assert_eq!(greeting_uri("a+b/c"), "data:Hello%2C+a%2Bb%2Fc%21");
        assert_eq!(greeting_uri("x-y_z.~"), "data:Hello%2C+x-y_z.~%21");
    }

    #[test]
    fn unknown_tool_maps_to_method_not_found() {
        let err = server()
            .call(ToolCallRequest::new("divide", object!({"a": 1, "b": 2})))
            .unwrap_err();
        let data = McpError::from(err);
        assert_eq!(data.code, ErrorCode::METHOD_NOT_FOUND);
        assert_eq!(data.data, Some(json!({"kind": "not_found"})));
    }

    #[test]
    fn tools_advertise_schema() {
        let tools = server().tools();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_ref()).collect();
        assert_eq!(names, vec!["add", "mult", "lower", "greetResource"]);
        let lower = &tools[2];
        assert_eq!(
            lower.input_schema.get("required"),
            Some(&json!(["s"]))
        );
    }

    #[test]
    fn info_advertises_name_and_capabilities() {
        let info = server().get_info();
        assert_eq!(info.server_info.name, "test");
        assert!(info.capabilities.tools.is_some());
        assert!(info.capabilities.prompts.is_some());
        assert!(info.capabilities.resources.is_some());
    }

    #[test]
    fn greet_prompt_declares_required_argument() {
        let prompts = ToolServer::prompts();
        assert_eq!(prompts.len(), 1);
        let args = prompts[0].arguments.as_ref().unwrap();
        assert_eq!(args[0].name, PARAM_WHOM);
        assert_eq!(args[0].required, Some(true));
    }
}
