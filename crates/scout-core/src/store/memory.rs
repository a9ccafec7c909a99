//! In-memory [`IndexStore`] for tests and embedded use.
//!
//! Each repository's record sits behind one `RwLock`ed map entry and is
//! swapped as a whole, which gives the same all-or-nothing visibility as
//! the SQLite backend's transaction.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::{ScoutError, ScoutResult};
use crate::models::{IndexMeta, IndexRecord, ScoredChunk};
use crate::search::rank_top_k;

use super::IndexStore;

pub struct InMemoryStore {
    indexes: RwLock<HashMap<String, Arc<IndexRecord>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            indexes: RwLock::new(HashMap::new()),
        }
    }

    fn get(&self, repo_id: &str) -> ScoutResult<Option<Arc<IndexRecord>>> {
        let guard = self
            .indexes
            .read()
            .map_err(|_| ScoutError::Store("in-memory index lock poisoned".into()))?;
        Ok(guard.get(repo_id).cloned())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IndexStore for InMemoryStore {
    async fn upsert_index(&self, record: IndexRecord) -> ScoutResult<()> {
        if record.chunks.len() != record.vectors.len() {
            return Err(ScoutError::Store(format!(
                "{} chunks but {} vectors",
                record.chunks.len(),
                record.vectors.len()
            )));
        }
        let mut guard = self
            .indexes
            .write()
            .map_err(|_| ScoutError::Store("in-memory index lock poisoned".into()))?;
        guard.insert(record.meta.repo_id.clone(), Arc::new(record));
        Ok(())
    }

    async fn query(
        &self,
        repo_id: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> ScoutResult<Vec<ScoredChunk>> {
        let record = self
            .get(repo_id)?
            .ok_or_else(|| ScoutError::NotFound(format!("no index for repository {repo_id}")))?;
        rank_top_k(
            query_vector,
            record
                .chunks
                .iter()
                .zip(record.vectors.iter().map(|v| v.as_slice())),
            top_k,
        )
    }

    async fn index_meta(&self, repo_id: &str) -> ScoutResult<Option<IndexMeta>> {
        Ok(self.get(repo_id)?.map(|r| r.meta.clone()))
    }

    async fn delete_index(&self, repo_id: &str) -> ScoutResult<bool> {
        let mut guard = self
            .indexes
            .write()
            .map_err(|_| ScoutError::Store("in-memory index lock poisoned".into()))?;
        Ok(guard.remove(repo_id).is_some())
    }

    async fn list_indexes(&self) -> ScoutResult<Vec<IndexMeta>> {
        let guard = self
            .indexes
            .read()
            .map_err(|_| ScoutError::Store("in-memory index lock poisoned".into()))?;
        let mut metas: Vec<IndexMeta> = guard.values().map(|r| r.meta.clone()).collect();
        metas.sort_by(|a, b| a.repo_id.cmp(&b.repo_id));
        Ok(metas)
    }
}
