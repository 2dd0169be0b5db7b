use std::sync::Arc;

use msm_core::{AccessLayer, MemoryGraph, QueryKind};
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};

/// MCP front end over a loaded, read-only gateway. Holds no mutable state.
#[derive(Clone)]
pub struct MsmServer {
    gateway: Arc<AccessLayer<MemoryGraph>>,
    tool_router: ToolRouter<Self>,
}

impl MsmServer {
    pub fn new(gateway: AccessLayer<MemoryGraph>) -> Self {
        Self {
            gateway: Arc::new(gateway),
            tool_router: Self::tool_router(),
        }
    }
}

fn text_result(value: &Value) -> CallToolResult {
    CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(value).unwrap_or_default(),
    )])
}

fn refused(kind: &str, message: impl std::fmt::Display) -> CallToolResult {
    CallToolResult::error(vec![Content::text(format!("{kind}: {message}"))])
}

// --- Tool parameter types ---

#[derive(Debug, Deserialize, JsonSchema)]
struct QueryRequest {
    /// Query type name, e.g. "SPATIAL_GROUP". Call msm_schema for the list.
    query_type: String,
    /// Query parameters as a JSON object. Every timestamp must be an explicit
    /// number; "now"-style values are refused.
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SchemaRequest {
    /// Restrict the answer to one query type. Omit to list all of them.
    query_type: Option<String>,
}

#[tool_router]
impl MsmServer {
    #[tool(
        description = "Run one typed read query against market-structure memory. Returns the normalized structural result. Evaluative parameters (signal, score, confidence, ...) and implicit time references are refused. Kinds without stored traversal history return wired=false and a null result."
    )]
    async fn msm_query(
        &self,
        Parameters(req): Parameters<QueryRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.gateway.execute(&req.query_type, &req.params) {
            Ok(response) => {
                let wired = response.is_wired();
                Ok(text_result(&json!({
                    "query_type": req.query_type,
                    "wired": wired,
                    "result": response.into_json(),
                })))
            }
            Err(e) => {
                tracing::warn!(query_type = %req.query_type, kind = e.kind(), "query refused");
                Ok(refused(e.kind(), e))
            }
        }
    }

    #[tool(
        description = "Describe the field contract of a query type: field names, types, and which are required. Omit query_type to list every query type."
    )]
    async fn msm_schema(
        &self,
        Parameters(req): Parameters<SchemaRequest>,
    ) -> Result<CallToolResult, McpError> {
        let described = match req.query_type.as_deref() {
            Some(name) => match QueryKind::resolve(name) {
                Ok(kind) => kind.describe(),
                Err(e) => return Ok(refused(e.kind(), e)),
            },
            None => Value::Array(QueryKind::ALL.iter().map(|k| k.describe()).collect()),
        };
        Ok(text_result(&described))
    }

    #[tool(description = "Get memory statistics: node count, observation count, and query types.")]
    async fn msm_stats(&self) -> Result<CallToolResult, McpError> {
        let graph = self.gateway.store();
        let unwired: Vec<&str> = QueryKind::ALL
            .iter()
            .filter(|k| !k.is_wired())
            .map(|k| k.name())
            .collect();
        Ok(text_result(&json!({
            "nodes": graph.len(),
            "observations": graph.observation_count(),
            "query_types": QueryKind::ALL.len(),
            "unwired_query_types": unwired,
        })))
    }
}

#[tool_handler]
impl ServerHandler for MsmServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Read-only access to market-structure memory.\n\n\
                 - Use msm_schema to see the closed set of query types and their fields.\n\
                 - Use msm_query with explicit numeric timestamps. Results are structural \
                   measurements only; there are no signals, scores, or recommendations.\n\
                 - A refused query names its error kind (ACCESS_DENIED, SCHEMA_VALIDATION, \
                   EPISTEMIC_SAFETY, DETERMINISM, INVALID_INPUT). Refusals are final; \
                   fix the parameters rather than retrying."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msm_core::{LifecycleState, MemoryNode};

    fn make_server() -> MsmServer {
        let mut graph = MemoryGraph::new();
        graph.insert_node(MemoryNode::new("a", "BTC-USD", 100.0, 1000.0, "pivot_high"));
        graph.insert_node(MemoryNode::new("b", "BTC-USD", 95.0, 1000.0, "sweep"));
        graph.record_transition("b", 1500.0, LifecycleState::Dormant);
        MsmServer::new(AccessLayer::new(Arc::new(graph)).unwrap())
    }

    fn text_from_result(result: &CallToolResult) -> String {
        result
            .content
            .iter()
            .filter_map(|c| match &c.raw {
                RawContent::Text(t) => Some(t.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    fn parse_result(result: &CallToolResult) -> Value {
        let text = text_from_result(result);
        serde_json::from_str(&text).expect("handler should return valid JSON")
    }

    async fn query(server: &MsmServer, query_type: &str, params: Value) -> CallToolResult {
        server
            .msm_query(Parameters(QueryRequest {
                query_type: query_type.to_string(),
                params,
            }))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_msm_query_spatial_group() {
        let server = make_server();
        let result = query(
            &server,
            "SPATIAL_GROUP",
            json!({"min_price": 90, "max_price": 110, "current_ts": 2000, "include_dormant": true}),
        )
        .await;
        let json = parse_result(&result);
        assert_eq!(json["wired"], true);
        assert_eq!(json["result"][0]["node_id"], "b");
        assert_eq!(json["result"][1]["node_id"], "a");
    }

    #[tokio::test]
    async fn test_msm_query_refusal_names_kind() {
        let server = make_server();
        let result = query(
            &server,
            "IDENTITY",
            json!({"node_id": "a", "current_ts": 2000, "confidence": 0.9}),
        )
        .await;
        assert_eq!(result.is_error, Some(true));
        assert!(text_from_result(&result).starts_with("EPISTEMIC_SAFETY"));
    }

    #[tokio::test]
    async fn test_msm_query_implicit_time() {
        let server = make_server();
        let result = query(
            &server,
            "IDENTITY",
            json!({"node_id": "a", "current_ts": "latest"}),
        )
        .await;
        assert!(text_from_result(&result).starts_with("DETERMINISM"));
    }

    #[tokio::test]
    async fn test_msm_query_not_wired() {
        let server = make_server();
        let result = query(
            &server,
            "BOUNDARY_VIOLATION",
            json!({"node_id": "a", "boundary_price": 100, "start_ts": 1000, "end_ts": 2000}),
        )
        .await;
        let json = parse_result(&result);
        assert_eq!(json["wired"], false);
        assert!(json["result"].is_null());
    }

    #[tokio::test]
    async fn test_msm_schema_single_and_all() {
        let server = make_server();
        let one = server
            .msm_schema(Parameters(SchemaRequest {
                query_type: Some("PROXIMITY".into()),
            }))
            .await
            .unwrap();
        assert_eq!(parse_result(&one)["query_type"], "PROXIMITY");

        let all = server
            .msm_schema(Parameters(SchemaRequest { query_type: None }))
            .await
            .unwrap();
        assert_eq!(parse_result(&all).as_array().unwrap().len(), 19);

        let unknown = server
            .msm_schema(Parameters(SchemaRequest {
                query_type: Some("TRADE_IDEA".into()),
            }))
            .await
            .unwrap();
        assert!(text_from_result(&unknown).starts_with("ACCESS_DENIED"));
    }

    #[tokio::test]
    async fn test_msm_stats() {
        let server = make_server();
        let json = parse_result(&server.msm_stats().await.unwrap());
        assert_eq!(json["nodes"], 2);
        assert_eq!(json["observations"], 0);
        assert_eq!(
            json["unwired_query_types"],
            json!(["BOUNDARY_VIOLATION", "CONVERSION_FAILURE"])
        );
    }

    #[test]
    fn test_tool_registration() {
        let server = make_server();
        let info = server.get_info();

        assert!(info.instructions.is_some());
        assert!(info.capabilities.tools.is_some());
    }
}
