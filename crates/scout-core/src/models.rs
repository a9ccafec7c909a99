//! Core data models that flow through the indexing and retrieval pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A contiguous, line-bounded slice of one file in a working tree.
///
/// Lines are 1-based and inclusive. `file_path` is relative to the
/// working-tree root and always uses `/` as separator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub repo_id: String,
    pub file_path: String,
    pub chunk_index: i64,
    pub start_line: i64,
    pub end_line: i64,
    pub text: String,
    pub language: String,
}

/// Metadata of a persisted repository index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub repo_id: String,
    pub location: String,
    pub owner: Option<String>,
    pub name: Option<String>,
    pub built_at: DateTime<Utc>,
    pub total_files: i64,
    pub total_chunks: i64,
    pub skipped_files: i64,
    pub model: String,
    pub dims: i64,
}

impl IndexMeta {
    /// `true` while `now - built_at < ttl`.
    pub fn is_fresh(&self, ttl: chrono::Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.built_at) < ttl
    }
}

/// Everything a build hands to the store in one atomic replace.
///
/// `vectors[i]` is the embedding of `chunks[i].text`.
#[derive(Debug, Clone)]
pub struct IndexRecord {
    pub meta: IndexMeta,
    pub chunks: Vec<Chunk>,
    pub vectors: Vec<Vec<f32>>,
}

/// One ranked hit from a repository index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}
