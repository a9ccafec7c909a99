//! Storage abstraction for repository indexes.
//!
//! The [`IndexStore`] trait is the only way the rest of the system reads
//! or writes an index. A repository's index is replaced wholesale: a
//! reader sees either the previous record or the new one, never a mix.
//!
//! Implementations must be `Send + Sync` to be shared across request
//! handlers.

pub mod memory;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::ScoutResult;
use crate::models::{IndexMeta, IndexRecord, ScoredChunk};

/// Abstract storage backend for repository indexes.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_index`](IndexStore::upsert_index) | Atomically replace a repository's index |
/// | [`query`](IndexStore::query) | Top-k cosine similarity over one repository |
/// | [`index_meta`](IndexStore::index_meta) | Metadata of the current index, if any |
/// | [`has_fresh_index`](IndexStore::has_fresh_index) | Whether `built_at` is within a TTL of now |
/// | [`delete_index`](IndexStore::delete_index) | Drop a repository's index |
/// | [`list_indexes`](IndexStore::list_indexes) | Metadata of every stored index |
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Replace any existing index for `record.meta.repo_id` with `record`.
    ///
    /// All-or-nothing: on error the previous index is untouched.
    async fn upsert_index(&self, record: IndexRecord) -> ScoutResult<()>;

    /// The `top_k` chunks of `repo_id` most similar to `query_vector`.
    ///
    /// Fails with [`NotFound`](crate::error::ScoutError::NotFound) when
    /// `repo_id` has no index.
    async fn query(
        &self,
        repo_id: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> ScoutResult<Vec<ScoredChunk>>;

    async fn index_meta(&self, repo_id: &str) -> ScoutResult<Option<IndexMeta>>;

    /// Returns `true` if an index for `repo_id` exists and was built less
    /// than `ttl` ago.
    async fn has_fresh_index(&self, repo_id: &str, ttl: chrono::Duration) -> ScoutResult<bool> {
        Ok(self
            .index_meta(repo_id)
            .await?
            .is_some_and(|meta| meta.is_fresh(ttl, Utc::now())))
    }

    /// Remove the index for `repo_id`. Returns whether one existed.
    async fn delete_index(&self, repo_id: &str) -> ScoutResult<bool>;

    async fn list_indexes(&self) -> ScoutResult<Vec<IndexMeta>>;
}
