//! Top-k ranking over a repository's stored vectors.
//!
//! Every backend funnels its candidates through [`rank_top_k`] so that
//! scoring and tie-breaking are identical whether the index lives in
//! memory or in SQLite.

use std::cmp::Ordering;

use crate::embedding::cosine_similarity;
use crate::error::{ScoutError, ScoutResult};
use crate::models::{Chunk, ScoredChunk};

/// Score every `(chunk, vector)` pair against `query` and keep the best
/// `top_k`.
///
/// Ordering is by cosine similarity descending, ties broken by
/// `(file_path, start_line)` ascending. A `top_k` larger than the
/// candidate set returns all candidates. A query vector whose length
/// differs from the stored vectors is a [`ScoutError::Store`]: the index
/// was built with a different model and must be rebuilt.
pub fn rank_top_k<'a, I>(query: &[f32], candidates: I, top_k: usize) -> ScoutResult<Vec<ScoredChunk>>
where
    I: IntoIterator<Item = (&'a Chunk, &'a [f32])>,
{
    let mut scored = Vec::new();
    for (chunk, vector) in candidates {
        if vector.len() != query.len() {
            return Err(ScoutError::Store(format!(
                "query vector has {} dimensions but index vectors have {}",
                query.len(),
                vector.len()
            )));
        }
        scored.push(ScoredChunk {
            chunk: chunk.clone(),
            score: cosine_similarity(query, vector),
        });
    }

    scored.sort_by(compare_ranked);
    scored.truncate(top_k);
    Ok(scored)
}

fn compare_ranked(a: &ScoredChunk, b: &ScoredChunk) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.chunk.file_path.cmp(&b.chunk.file_path))
        .then_with(|| a.chunk.start_line.cmp(&b.chunk.start_line))
}
