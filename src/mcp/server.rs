/// MCP server setup using `rmcp` with stdio transport.
///
/// Provides `McpContext` (shared state) and `McpServer` (startup logic).
use crate::mcp::tools::SopTools;
use anyhow::{Context, Result};
use rmcp::{ServiceExt, handler::server::router::Router, transport::io::stdio};
use std::sync::Arc;
use tracing::info;

use crate::{
    config::Config, embedder::Embedder, extractor::TextExtractor, indexer::MetadataStore,
    store::SqliteStore,
};
use tokio::sync::Mutex as TokioMutex;

/// Shared application context available to all tool handlers.
#[derive(Clone)]
pub struct McpContext {
    pub store: Arc<TokioMutex<SqliteStore>>,
    pub config: Arc<Config>,
    pub embedder: Arc<dyn Embedder>,
    pub extractor: Arc<dyn TextExtractor>,
    pub metadata: MetadataStore,
}

impl McpContext {
    pub fn new(
        store: SqliteStore,
        config: Config,
        embedder: Arc<dyn Embedder>,
        extractor: Arc<dyn TextExtractor>,
    ) -> Self {
        let metadata = MetadataStore::new(config.metadata_path());
        Self {
            store: Arc::new(TokioMutex::new(store)),
            config: Arc::new(config),
            embedder,
            extractor,
            metadata,
        }
    }
}

/// MCP server wrapping the context and serving via stdio.
#[derive(Clone)]
pub struct McpServer {
    pub ctx: McpContext,
}

impl McpServer {
    pub fn new(ctx: McpContext) -> Self {
        Self { ctx }
    }

    /// Serve on stdio until the client disconnects.
    pub async fn start(self) -> Result<()> {
        info!(
            "Starting MCP server on stdio (collection '{}')",
            self.ctx.config.collection
        );
        let (stdin, stdout) = stdio();

        let sop_tools = SopTools::new(self.ctx.clone());
        let router = Router::new(sop_tools.clone()).with_tools(sop_tools.tool_router.clone());

        let service = router
            .serve((stdin, stdout))
            .await
            .context("MCP server failed to start on stdio transport")?;
        service
            .waiting()
            .await
            .context("MCP server encountered an error during stdio transport")?;

        Ok(())
    }
}
