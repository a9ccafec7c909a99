//! Query Engine: answer a natural-language question about a repository.
//!
//! 1. Validate the request and normalize the repository reference.
//! 2. Ask the [`IndexCoordinator`] for a fresh index (building if needed).
//! 3. Embed the question and run a top-k similarity query.
//! 4. Shape the hits into a [`QueryResponse`].
//!
//! The whole call is bounded by `query_timeout`. Failures keep their
//! [`ScoutError::kind`] so callers can tell an unreachable repository from
//! an unavailable model; [`QueryOutcome`] renders either shape as JSON:
//!
//! ```json
//! {"success": true, "repository": {...}, "query": "...", "code_snippets": [...], "total_results": 3}
//! {"success": false, "error_kind": "acquisition_error", "message": "..."}
//! ```

use std::path::Path;
use std::time::Duration;

use scout_core::identity::RepoReference;
use scout_core::models::{IndexMeta, ScoredChunk};
use scout_core::{ScoutError, ScoutResult};
use serde::{Deserialize, Serialize};

use crate::coordinator::IndexCoordinator;
use crate::overview::RepoOverview;

pub const DEFAULT_TOP_K: usize = 10;
pub const MAX_TOP_K: usize = 50;

#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub repository_reference: String,
    pub question: String,
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepositorySummary {
    pub url: String,
    pub owner: Option<String>,
    pub name: Option<String>,
    pub total_files_indexed: i64,
    pub total_chunks: i64,
}

impl From<&IndexMeta> for RepositorySummary {
    fn from(meta: &IndexMeta) -> Self {
        Self {
            url: meta.location.clone(),
            owner: meta.owner.clone(),
            name: meta.name.clone(),
            total_files_indexed: meta.total_files,
            total_chunks: meta.total_chunks,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CodeSnippet {
    pub file_path: String,
    pub content: String,
    pub start_line: i64,
    pub end_line: i64,
    pub language: String,
    pub relevance_score: f32,
}

impl From<ScoredChunk> for CodeSnippet {
    fn from(hit: ScoredChunk) -> Self {
        Self {
            file_path: hit.chunk.file_path,
            content: hit.chunk.text,
            start_line: hit.chunk.start_line,
            end_line: hit.chunk.end_line,
            language: hit.chunk.language,
            relevance_score: hit.score,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub repository: RepositorySummary,
    pub query: String,
    pub code_snippets: Vec<CodeSnippet>,
    pub total_results: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryFailure {
    pub error_kind: &'static str,
    pub message: String,
}

impl From<&ScoutError> for QueryFailure {
    fn from(e: &ScoutError) -> Self {
        Self {
            error_kind: e.kind(),
            message: e.to_string(),
        }
    }
}

/// Success or failure, serialized with a `success` flag.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum QueryOutcome {
    Success {
        success: bool,
        #[serde(flatten)]
        response: QueryResponse,
    },
    Failure {
        success: bool,
        #[serde(flatten)]
        failure: QueryFailure,
    },
}

impl From<ScoutResult<QueryResponse>> for QueryOutcome {
    fn from(result: ScoutResult<QueryResponse>) -> Self {
        match result {
            Ok(response) => QueryOutcome::Success {
                success: true,
                response,
            },
            Err(e) => QueryOutcome::Failure {
                success: false,
                failure: QueryFailure::from(&e),
            },
        }
    }
}

/// Parse a user-supplied reference, resolving relative local paths
/// against the current directory.
pub fn resolve_reference(input: &str) -> ScoutResult<RepoReference> {
    let parsed = RepoReference::parse(input)?;
    if parsed.is_remote() || Path::new(&parsed.location).is_absolute() {
        return Ok(parsed);
    }
    let cwd = std::env::current_dir().map_err(|e| {
        ScoutError::InvalidRequest(format!("cannot resolve relative path '{input}': {e}"))
    })?;
    RepoReference::parse(&cwd.join(&parsed.location).to_string_lossy())
}

#[derive(Clone)]
pub struct QueryEngine {
    coordinator: IndexCoordinator,
    query_timeout: Duration,
}

impl QueryEngine {
    pub fn new(coordinator: IndexCoordinator, query_timeout: Duration) -> Self {
        Self {
            coordinator,
            query_timeout,
        }
    }

    pub fn coordinator(&self) -> &IndexCoordinator {
        &self.coordinator
    }

    pub async fn answer(&self, request: &QueryRequest) -> ScoutResult<QueryResponse> {
        let top_k = request.top_k.unwrap_or(DEFAULT_TOP_K);
        if !(1..=MAX_TOP_K).contains(&top_k) {
            return Err(ScoutError::InvalidRequest(format!(
                "top_k must be between 1 and {MAX_TOP_K}, got {top_k}"
            )));
        }
        let question = request.question.trim();
        if question.is_empty() {
            return Err(ScoutError::InvalidRequest("question is empty".into()));
        }
        let reference = resolve_reference(&request.repository_reference)?;

        match tokio::time::timeout(
            self.query_timeout,
            self.answer_inner(&reference, question, top_k),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ScoutError::Timeout(format!(
                "query against {} exceeded {}s",
                reference.canonical(),
                self.query_timeout.as_secs()
            ))),
        }
    }

    /// Summarize a repository without indexing it, bounded by the query
    /// timeout.
    pub async fn overview(&self, repository_reference: &str) -> ScoutResult<RepoOverview> {
        let reference = resolve_reference(repository_reference)?;
        match tokio::time::timeout(self.query_timeout, self.coordinator.overview(&reference)).await
        {
            Ok(result) => result,
            Err(_) => Err(ScoutError::Timeout(format!(
                "overview of {} exceeded {}s",
                reference.canonical(),
                self.query_timeout.as_secs()
            ))),
        }
    }

    async fn answer_inner(
        &self,
        reference: &RepoReference,
        question: &str,
        top_k: usize,
    ) -> ScoutResult<QueryResponse> {
        let meta = self.coordinator.ensure_index(reference).await?;
        let query_vector = self.coordinator.embedder().embed(question).await?;
        let hits = self
            .coordinator
            .store()
            .query(&meta.repo_id, &query_vector, top_k)
            .await?;
        tracing::debug!(repo_id = %meta.repo_id, hits = hits.len(), "query answered");

        let code_snippets: Vec<CodeSnippet> = hits.into_iter().map(CodeSnippet::from).collect();
        Ok(QueryResponse {
            repository: RepositorySummary::from(&meta),
            query: question.to_string(),
            total_results: code_snippets.len(),
            code_snippets,
        })
    }
}
