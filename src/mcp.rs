//! MCP server over stdio.
//!
//! Exposes three tools to MCP clients:
//!
//! * `search_repository` answers a question about a repository, with the
//!   same success and failure JSON as `POST /query`.
//! * `repo_overview` summarizes a repository's stack, file statistics and README as
//!   markdown, without indexing it.
//! * `index_repository` builds an index ahead of the first question.
//!
//! Logs go to stderr; stdout carries only JSON-RPC frames.

use std::borrow::Cow;
use std::sync::Arc;

use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler, ServiceExt};
use serde::Deserialize;
use serde_json::json;

use crate::query::{resolve_reference, QueryEngine, QueryOutcome, QueryRequest};

const SEARCH_TOOL: &str = "search_repository";
const INDEX_TOOL: &str = "index_repository";
const OVERVIEW_TOOL: &str = "repo_overview";

#[derive(Clone)]
pub struct McpBridge {
    engine: QueryEngine,
}

#[derive(Deserialize)]
struct OverviewArgs {
    repository_reference: String,
}

#[derive(Deserialize)]
struct IndexArgs {
    repository_reference: String,
    #[serde(default)]
    force: bool,
}

impl McpBridge {
    pub fn new(engine: QueryEngine) -> Self {
        Self { engine }
    }

    fn tools() -> Vec<Tool> {
        vec![
            tool(
                SEARCH_TOOL,
                "Answer a natural-language question about a code repository with ranked \
                 source snippets. Indexes the repository on first use.",
                json!({
                    "type": "object",
                    "properties": {
                        "repository_reference": {
                            "type": "string",
                            "description": "Repository URL (https, ssh, git@host:owner/name) or local path"
                        },
                        "question": { "type": "string" },
                        "top_k": { "type": "integer", "minimum": 1, "maximum": 50, "default": 10 }
                    },
                    "required": ["repository_reference", "question"]
                }),
                true,
            ),
            tool(
                OVERVIEW_TOOL,
                "Get a quick overview of a code repository: detected languages, frameworks \
                 and tools, file statistics, likely entry points, config files and the README. \
                 Start here before asking detailed questions.",
                json!({
                    "type": "object",
                    "properties": {
                        "repository_reference": {
                            "type": "string",
                            "description": "Repository URL (https, ssh, git@host:owner/name) or local path"
                        }
                    },
                    "required": ["repository_reference"]
                }),
                true,
            ),
            tool(
                INDEX_TOOL,
                "Build the index for a repository without asking a question. \
                 Set force to rebuild a fresh index.",
                json!({
                    "type": "object",
                    "properties": {
                        "repository_reference": { "type": "string" },
                        "force": { "type": "boolean", "default": false }
                    },
                    "required": ["repository_reference"]
                }),
                false,
            ),
        ]
    }

    async fn search(&self, args: serde_json::Value) -> Result<CallToolResult, McpError> {
        let request: QueryRequest = serde_json::from_value(args)
            .map_err(|e| McpError::invalid_params(format!("{SEARCH_TOOL}: {e}"), None))?;
        let outcome = QueryOutcome::from(self.engine.answer(&request).await);
        let failed = matches!(outcome, QueryOutcome::Failure { .. });
        let text = serde_json::to_string_pretty(&outcome).unwrap_or_default();
        Ok(if failed {
            CallToolResult::error(vec![Content::text(text)])
        } else {
            CallToolResult::success(vec![Content::text(text)])
        })
    }

    async fn overview(&self, args: serde_json::Value) -> Result<CallToolResult, McpError> {
        let args: OverviewArgs = serde_json::from_value(args)
            .map_err(|e| McpError::invalid_params(format!("{OVERVIEW_TOOL}: {e}"), None))?;
        Ok(match self.engine.overview(&args.repository_reference).await {
            Ok(overview) => CallToolResult::success(vec![Content::text(overview.to_markdown())]),
            Err(e) => {
                let outcome = QueryOutcome::from(Err(e));
                let text = serde_json::to_string_pretty(&outcome).unwrap_or_default();
                CallToolResult::error(vec![Content::text(text)])
            }
        })
    }

    async fn index(&self, args: serde_json::Value) -> Result<CallToolResult, McpError> {
        let args: IndexArgs = serde_json::from_value(args)
            .map_err(|e| McpError::invalid_params(format!("{INDEX_TOOL}: {e}"), None))?;
        let result = async {
            let reference = resolve_reference(&args.repository_reference)?;
            let coordinator = self.engine.coordinator();
            if args.force {
                coordinator.rebuild(&reference).await
            } else {
                coordinator.ensure_index(&reference).await
            }
        }
        .await;

        Ok(match result {
            Ok(meta) => {
                let text = serde_json::to_string_pretty(&json!({ "success": true, "index": meta }))
                    .unwrap_or_default();
                CallToolResult::success(vec![Content::text(text)])
            }
            Err(e) => {
                let outcome = QueryOutcome::from(Err(e));
                let text = serde_json::to_string_pretty(&outcome).unwrap_or_default();
                CallToolResult::error(vec![Content::text(text)])
            }
        })
    }
}

fn tool(
    name: &'static str,
    description: &'static str,
    schema: serde_json::Value,
    read_only: bool,
) -> Tool {
    let input_schema = match schema {
        serde_json::Value::Object(map) => Arc::new(map),
        _ => Arc::new(serde_json::Map::new()),
    };
    Tool {
        name: Cow::Borrowed(name),
        title: None,
        description: Some(Cow::Borrowed(description)),
        input_schema,
        output_schema: None,
        annotations: Some(ToolAnnotations::new().read_only(read_only)),
        execution: None,
        icons: None,
        meta: None,
    }
}

impl ServerHandler for McpBridge {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "repo-scout".to_string(),
                title: Some("Repo Scout".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Use repo_overview for a first look at any git repository or local directory, \
                 then search_repository to ask questions about it. The first question about a \
                 repository indexes it, which can take a while for large repositories."
                    .to_string(),
            ),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult::with_all_items(Self::tools())))
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        Self::tools().into_iter().find(|t| t.name == name)
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let args = request
            .arguments
            .map(serde_json::Value::Object)
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));

        match &*request.name {
            SEARCH_TOOL => self.search(args).await,
            OVERVIEW_TOOL => self.overview(args).await,
            INDEX_TOOL => self.index(args).await,
            other => Err(McpError::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("no tool registered with name: {other}"),
                None,
            )),
        }
    }
}

/// Serve the MCP protocol on stdin/stdout until the client disconnects.
pub async fn run_stdio(engine: QueryEngine) -> anyhow::Result<()> {
    let transport = (tokio::io::stdin(), tokio::io::stdout());
    let service = McpBridge::new(engine).serve(transport).await?;
    tracing::info!("MCP server ready on stdio");
    service.waiting().await?;
    Ok(())
}
