use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::dispatch::Dispatcher;
use super::protocol::*;
use super::transport::Handler;
use crate::context::AppContext;

const MCP_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "toolforge";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol handler: validates envelopes and routes methods.
pub struct Server {
    dispatcher: Dispatcher,
}

impl Server {
    pub fn new(ctx: &AppContext) -> Self {
        Self::with_dispatcher(Dispatcher::new(
            ctx.registry.clone(),
            ctx.tools.usage.clone(),
            ctx.tools.config.settings.dispatch.timeout(),
        ))
    }

    pub fn with_dispatcher(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Turn one raw line into exactly one response.
    pub async fn handle_request(&self, raw: &str) -> JsonRpcResponse {
        let value: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => {
                warn!("Failed to parse request: {}", e);
                return JsonRpcResponse::error(None, PARSE_ERROR, format!("Parse error: {}", e));
            }
        };

        let request = match JsonRpcRequest::from_value(value) {
            Ok(req) => req,
            Err(e) => {
                warn!("Invalid request: {}", e);
                return JsonRpcResponse::error(
                    e.id(),
                    INVALID_REQUEST,
                    format!("Invalid Request: {}", e),
                );
            }
        };

        debug!(
            "Processing request: method={}, id={}",
            request.method, request.id
        );

        match request.method.as_str() {
            "initialize" => self.handle_initialize(request),
            "ListTools" | "tools/list" => self.handle_list_tools(request),
            "CallTool" | "tools/call" => self.handle_call_tool(request).await,
            _ => {
                warn!("Unknown method: {}", request.method);
                JsonRpcResponse::error(
                    Some(request.id),
                    METHOD_NOT_FOUND,
                    format!("Method not found: {}", request.method),
                )
            }
        }
    }

    fn handle_initialize(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let result = InitializeResult {
            protocol_version: MCP_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(json!({})),
            },
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: SERVER_VERSION.to_string(),
            },
        };

        respond(request.id, &result)
    }

    fn handle_list_tools(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        #[derive(Serialize)]
        struct ListToolsResult {
            tools: Vec<Tool>,
        }

        let result = ListToolsResult {
            tools: self.dispatcher.registry().list(),
        };

        respond(request.id, &result)
    }

    async fn handle_call_tool(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let params = request.params.unwrap_or(Value::Null);

        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return JsonRpcResponse::error(
                Some(request.id),
                INVALID_PARAMS,
                "Invalid params: missing tool name".to_string(),
            );
        };

        let arguments = match params.get("arguments") {
            None | Some(Value::Null) => json!({}),
            Some(args @ Value::Object(_)) => args.clone(),
            Some(_) => {
                return JsonRpcResponse::error(
                    Some(request.id),
                    INVALID_PARAMS,
                    "Invalid params: arguments must be an object".to_string(),
                );
            }
        };

        debug!("Tool call: {}", name);

        let result = self.dispatcher.dispatch(name, arguments).await;
        respond(request.id, &result)
    }
}

fn respond<T: Serialize>(id: Value, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(v) => JsonRpcResponse::success(Some(id), v),
        Err(e) => JsonRpcResponse::error(
            Some(id),
            INTERNAL_ERROR,
            format!("Internal error: {}", e),
        ),
    }
}

impl Handler for Server {
    async fn handle_line(&self, line: &str) -> JsonRpcResponse {
        self.handle_request(line).await
    }
}
