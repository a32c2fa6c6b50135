//! MCP (Model Context Protocol) server exposing the tools to agents.

use crate::tools::{
    BenefitRecordsParams, SearchArticlesParams, SearchUsersParams, ToolOutput, ToolService,
};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult, Content, ErrorData, Implementation, ProtocolVersion, ServerCapabilities,
        ServerInfo, Tool,
    },
    tool, tool_handler, tool_router, ServerHandler,
};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const SERVER_NAME: &str = "rag_finance_news_tools";

/// Serves the financial-news tools over any rmcp transport.
#[derive(Clone)]
pub struct FinanceNewsServer {
    tools: Arc<dyn ToolService>,
    /// Every call runs under a child of this token.
    shutdown: CancellationToken,
    tool_router: ToolRouter<Self>,
}

impl FinanceNewsServer {
    pub fn new(tools: impl ToolService + 'static, shutdown: CancellationToken) -> Self {
        Self {
            tools: Arc::new(tools),
            shutdown,
            tool_router: Self::tool_router(),
        }
    }

    /// Tool metadata with the JSON schemas derived from the parameter types.
    pub fn tool_catalog() -> Vec<Tool> {
        Self::tool_router().list_all()
    }
}

fn into_call_result(output: ToolOutput) -> CallToolResult {
    match output {
        ToolOutput::Text(text) => CallToolResult::success(vec![Content::text(text)]),
        ToolOutput::Structured(value) => CallToolResult::structured(value),
        ToolOutput::Error(message) => CallToolResult::error(vec![Content::text(message)]),
    }
}

#[tool_router]
impl FinanceNewsServer {
    #[tool(
        description = "Semantic search over financial-news articles. Good for fuzzy, natural-language questions and similarity judgements. Not for 'latest' lists, ordering by time, or exact field filters."
    )]
    pub async fn search_articles(
        &self,
        Parameters(params): Parameters<SearchArticlesParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let cancel = self.shutdown.child_token();
        Ok(into_call_result(
            self.tools.search_articles(params, &cancel).await,
        ))
    }

    #[tool(description = "List users registered within a time range.")]
    pub async fn search_users(
        &self,
        Parameters(params): Parameters<SearchUsersParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let cancel = self.shutdown.child_token();
        Ok(into_call_result(self.tools.search_users(params, &cancel).await))
    }

    #[tool(
        description = "For a list of user ids, look up which subscription columns they claimed free access to."
    )]
    pub async fn get_user_benefit_records(
        &self,
        Parameters(params): Parameters<BenefitRecordsParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let cancel = self.shutdown.child_token();
        Ok(into_call_result(
            self.tools.user_benefit_records(params, &cancel).await,
        ))
    }
}

#[tool_handler]
impl ServerHandler for FinanceNewsServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: Some("Financial News Retrieval Tools".to_string()),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Use 'search_articles' for natural-language questions about financial news. \
                 Use 'search_users' and 'get_user_benefit_records' for user registrations and \
                 free-access grants. Times are 'YYYY-MM-DD HH:MM:SS' in UTC+8."
                    .to_string(),
            ),
        }
    }
}

/// A call result flattened for a terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedResult {
    pub text: String,
    pub is_error: bool,
}

/// Structured content is pretty-printed; otherwise the text blocks are joined.
pub fn render_call_result(result: &CallToolResult) -> Result<RenderedResult, serde_json::Error> {
    let wire = serde_json::to_value(result)?;
    let is_error = wire
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    if let Some(structured) = wire.get("structuredContent").filter(|value| !value.is_null()) {
        return Ok(RenderedResult {
            text: serde_json::to_string_pretty(structured)?,
            is_error,
        });
    }

    let text = wire
        .get("content")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n");
    Ok(RenderedResult { text, is_error })
}
