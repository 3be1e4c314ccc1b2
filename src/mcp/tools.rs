/// MCP tool handlers over the SOP index.
///
/// 1. search_sops   – retrieve the chunks closest to a question
/// 2. sync_sops     – run a differential sync of the source directory
/// 3. fetch_status  – when the last sync ran and whether files changed since
/// 4. build_prompt  – retrieve and assemble a grounded prompt
use crate::indexer::{self, Indexer, SyncReport};
use crate::mcp::server::McpContext;
use crate::prompt;
use crate::retriever::{RetrievedChunk, Retriever};
use rmcp::handler::server::ServerHandler;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{ErrorData as McpError, handler::server::tool::ToolRouter, model::*, tool, tool_router};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{error, info};

// ── Parameter structs ────────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
struct SearchParams {
    /// Question in natural language
    query: String,
    /// Max results (default from config, usually 5)
    top_k: Option<usize>,
}

#[derive(Deserialize, JsonSchema)]
struct PromptParams {
    /// Question to answer from the SOPs
    query: String,
    /// Text of a document the user uploaded alongside the question
    uploaded_context: Option<String>,
    /// Max chunks to retrieve (default from config)
    top_k: Option<usize>,
}

// ── Response helpers ─────────────────────────────────────────────────

fn json_result(value: serde_json::Value) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(&value).unwrap_or_default(),
    )]))
}

fn error_result(msg: &str) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::error(vec![Content::text(msg.to_string())]))
}

// ── Shared logic ─────────────────────────────────────────────────────

async fn retrieve(ctx: &McpContext, query: &str, top_k: usize) -> Vec<RetrievedChunk> {
    let store = ctx.store.lock().await;
    Retriever::new(&*store, ctx.embedder.as_ref()).search(query, top_k)
}

async fn run_sync(ctx: &McpContext) -> Result<SyncReport, String> {
    let chunker = ctx.config.chunker().map_err(|e| format!("{e:#}"))?;
    let mut store = ctx.store.clone().lock_owned().await;
    let ctx = ctx.clone();

    tokio::task::spawn_blocking(move || {
        let mut indexer = Indexer::new(
            ctx.config.source_dir(),
            ctx.metadata.clone(),
            &mut *store,
            ctx.embedder.as_ref(),
            ctx.extractor.as_ref(),
        )
        .with_chunker(chunker)
        .with_lock_stale_after(ctx.config.lock_stale_after());
        indexer.reindex(None).map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| format!("sync task failed: {e}"))?
}

fn status_value(ctx: &McpContext) -> Result<serde_json::Value, String> {
    let metadata = ctx.metadata.load().map_err(|e| e.to_string())?;
    let status = indexer::fetch_status(&ctx.config.source_dir(), &metadata, chrono::Utc::now());
    serde_json::to_value(status).map_err(|e| e.to_string())
}

// ── Tool implementations ─────────────────────────────────────────────

#[derive(Clone)]
pub struct SopTools {
    pub ctx: McpContext,
    pub tool_router: ToolRouter<Self>,
}

impl ServerHandler for SopTools {}

#[tool_router]
impl SopTools {
    pub fn new(ctx: McpContext) -> Self {
        Self {
            ctx,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        description = "Semantic search over indexed SOP documents. Returns the closest chunks with their source file and similarity."
    )]
    async fn search_sops(
        &self,
        params: Parameters<SearchParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        if p.query.trim().is_empty() {
            return error_result("query is required");
        }

        let top_k = p.top_k.unwrap_or(self.ctx.config.search_top_k);
        let results = retrieve(&self.ctx, &p.query, top_k).await;

        json_result(serde_json::json!({ "results": results }))
    }

    #[tool(
        description = "Sync the SOP directory into the index. Only new, modified and deleted files are processed."
    )]
    async fn sync_sops(&self) -> Result<CallToolResult, McpError> {
        match run_sync(&self.ctx).await {
            Ok(report) => {
                info!(
                    "Sync via MCP finished: {} processed, {} errors",
                    report.total_processed,
                    report.errors.len()
                );
                json_result(serde_json::json!({ "success": true, "report": report }))
            }
            Err(e) => {
                error!("Sync via MCP failed: {e}");
                error_result(&format!("sync failed: {e}"))
            }
        }
    }

    #[tool(description = "Report when the SOPs were last synced and whether files changed since")]
    async fn fetch_status(&self) -> Result<CallToolResult, McpError> {
        match status_value(&self.ctx) {
            Ok(value) => json_result(value),
            Err(e) => error_result(&format!("status unavailable: {e}")),
        }
    }

    #[tool(
        description = "Retrieve relevant SOP chunks for a question and assemble a grounded prompt for a language model"
    )]
    async fn build_prompt(
        &self,
        params: Parameters<PromptParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        if p.query.trim().is_empty() {
            return error_result("query is required");
        }

        let top_k = p.top_k.unwrap_or(self.ctx.config.search_top_k);
        let chunks = retrieve(&self.ctx, &p.query, top_k).await;
        let text = prompt::build_prompt(&p.query, &chunks, p.uploaded_context.as_deref());
        let sources: Vec<&str> = chunks.iter().map(|c| c.metadata.source.as_str()).collect();

        json_result(serde_json::json!({
            "prompt": text,
            "has_context": !chunks.is_empty() || p.uploaded_context.is_some(),
            "sources": sources,
        }))
    }
}
