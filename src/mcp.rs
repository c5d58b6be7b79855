use rmcp::{
    handler::server::tool::ToolRouter, handler::server::wrapper::Parameters,
    model::*, tool, tool_handler, tool_router,
    transport::stdio, ErrorData as McpError, ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::app::App;
use crate::record::Source;

// ── Parameter structs ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
struct SearchPapersParams {
    #[schemars(description = "Title search query; empty matches every paper")]
    query: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct IngestSourceParams {
    #[schemars(description = "Source to ingest: 'openalex' or 's2ag'")]
    source: String,
    #[schemars(description = "Maximum lines to read (defaults to the configured batch size)")]
    max_records: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct IndexRecordParams {
    #[schemars(description = "Source the record comes from: 'openalex' or 's2ag'")]
    source: String,
    #[schemars(description = "Raw record as the source serves it. S2AG records must include 'abstract'.")]
    record: serde_json::Value,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SimilarityParams {
    #[schemars(description = "DOI to compare (defaults to the configured DOI)")]
    doi: Option<String>,
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(format!("Serialization error: {}", e), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

// ── Server ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct PaperIndexServer {
    tool_router: ToolRouter<Self>,
    app: App,
}

#[tool_router]
impl PaperIndexServer {
    pub fn new(app: App) -> Self {
        Self {
            tool_router: Self::tool_router(),
            app,
        }
    }

    #[tool(description = "Search indexed papers by title. Returns raw index hits (_index, _id, _score, _source).")]
    async fn search_papers(
        &self,
        Parameters(params): Parameters<SearchPapersParams>,
    ) -> Result<CallToolResult, McpError> {
        let hits = self
            .app
            .gateway
            .search(&params.query)
            .await
            .map_err(|e| McpError::internal_error(format!("Search failed: {:#}", e), None))?;
        json_result(&hits)
    }

    #[tool(description = "Ingest a bounded batch from one source ('openalex' or 's2ag') into the papers index")]
    async fn ingest_source(
        &self,
        Parameters(params): Parameters<IngestSourceParams>,
    ) -> Result<CallToolResult, McpError> {
        let source: Source = params.source.parse().map_err(|e| {
            tracing::warn!("Rejected ingest request: {}", e);
            McpError::invalid_params(format!("{}", e), None)
        })?;
        let max = params.max_records.unwrap_or(self.app.config.batch_size);

        let report = self
            .app
            .pipeline
            .ingest(source, &self.app.config.files, max)
            .await
            .map_err(|e| McpError::internal_error(format!("Ingest failed: {}", e), None))?;
        json_result(&report)
    }

    #[tool(description = "Ingest one batch from OpenAlex and then one from S2AG, using the configured batch size")]
    async fn process_data(&self) -> Result<CallToolResult, McpError> {
        let reports = self
            .app
            .pipeline
            .process_data(&self.app.config.files, self.app.config.batch_size)
            .await
            .map_err(|e| McpError::internal_error(format!("Ingest failed: {}", e), None))?;
        json_result(&reports)
    }

    #[tool(description = "Normalize a single raw record and upsert it under its content fingerprint")]
    async fn index_record(
        &self,
        Parameters(params): Parameters<IndexRecordParams>,
    ) -> Result<CallToolResult, McpError> {
        let outcome = self
            .app
            .pipeline
            .index_record(&params.source, params.record)
            .await
            .map_err(|e| match e {
                crate::ingest::IngestError::Record(_) => {
                    McpError::invalid_params(e.to_string(), None)
                }
                _ => McpError::internal_error(format!("Indexing failed: {}", e), None),
            })?;
        json_result(&outcome)
    }

    #[tool(description = "Cosine similarity between the OpenAlex and Semantic Scholar abstracts of a DOI")]
    async fn similarity_score(
        &self,
        Parameters(params): Parameters<SimilarityParams>,
    ) -> Result<CallToolResult, McpError> {
        let doi = params
            .doi
            .unwrap_or_else(|| self.app.config.default_doi.clone());

        match self.app.similarity.score_doi(doi.trim()).await {
            Ok(Some(report)) => json_result(&report),
            Ok(None) => Ok(CallToolResult::success(vec![Content::text(format!(
                "No abstract available from both sources for DOI: {}",
                doi
            ))])),
            Err(e) => Err(McpError::internal_error(format!("Similarity failed: {}", e), None)),
        }
    }
}

#[tool_handler]
impl ServerHandler for PaperIndexServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Ingest OpenAlex and S2AG dumps into a deduplicated papers index, \
                 search it by title, and compare abstracts across the two APIs."
                    .into(),
            ),
        }
    }
}

/// Serve the MCP tools over stdio until the client disconnects.
pub async fn run_stdio(app: App) -> anyhow::Result<()> {
    tracing::info!("Starting paper-index MCP server");
    let service = PaperIndexServer::new(app).serve(stdio()).await?;
    service.waiting().await?;
    Ok(())
}
