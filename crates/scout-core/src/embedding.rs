//! Embedder trait, deterministic hashing embedder, and vector utilities.
//!
//! Defines the [`Embedder`] trait that every embedding backend
//! implements, plus pure helpers for vector serialization and
//! similarity computation.
//!
//! [`HashEmbedder`] is a dependency-free feature-hashing model: each
//! identifier token is hashed into one signed bucket of a fixed-size
//! vector, which is then L2-normalized. It needs no model download, is
//! bit-for-bit reproducible, and rewards lexical overlap between a
//! question and a chunk, which makes it the default for offline use and
//! for tests.
//!
//! Network and ONNX-backed providers live in the `repo-scout` app crate.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::{ScoutError, ScoutResult};

/// A text → vector model.
///
/// Implementations must be deterministic: the same model and the same
/// text always produce the same vector, and `embed_many` must return
/// exactly what per-item `embed` calls would.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier recorded alongside every index it builds.
    fn model_name(&self) -> &str;

    /// Vector dimensionality.
    fn dims(&self) -> usize;

    /// Embed a batch, one vector per input in input order.
    async fn embed_many(&self, texts: &[String]) -> ScoutResult<Vec<Vec<f32>>>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> ScoutResult<Vec<f32>> {
        let mut vectors = self.embed_many(&[text.to_string()]).await?;
        match vectors.pop() {
            Some(v) if vectors.is_empty() => Ok(v),
            _ => Err(ScoutError::Embedding(format!(
                "model {} returned an unexpected number of vectors",
                self.model_name()
            ))),
        }
    }
}

/// Deterministic feature-hashing embedder.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    model: String,
    dims: usize,
    max_input_chars: Option<usize>,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            model: format!("hash-{dims}"),
            dims: dims.max(1),
            max_input_chars: None,
        }
    }

    /// Reject inputs longer than `limit` characters with an embedding error.
    pub fn with_max_input_chars(mut self, limit: Option<usize>) -> Self {
        self.max_input_chars = limit;
        self
    }

    fn embed_one(&self, text: &str) -> ScoutResult<Vec<f32>> {
        if let Some(limit) = self.max_input_chars {
            let len = text.chars().count();
            if len > limit {
                return Err(ScoutError::Embedding(format!(
                    "input of {len} characters exceeds the {limit} character limit of {}",
                    self.model
                )));
            }
        }

        let mut vector = vec![0.0f32; self.dims];
        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut word = [0u8; 8];
            word.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(word) % self.dims as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        normalize(&mut vector);
        Ok(vector)
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_many(&self, texts: &[String]) -> ScoutResult<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed_one(t)).collect()
    }
}

/// Identifier tokens, lower-cased, with snake_case and camelCase parts
/// emitted in addition to the whole word.
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in text
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
    {
        tokens.push(word.to_ascii_lowercase());

        let mut parts = Vec::new();
        let mut current = String::new();
        let mut prev: Option<char> = None;
        for c in word.chars() {
            if c == '_' {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            } else {
                let boundary = c.is_ascii_uppercase()
                    && prev.is_some_and(|p| p.is_ascii_lowercase() || p.is_ascii_digit());
                if boundary && !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
                current.push(c.to_ascii_lowercase());
            }
            prev = Some(c);
        }
        if !current.is_empty() {
            parts.push(current);
        }
        if parts.len() > 1 {
            tokens.extend(parts);
        }
    }
    tokens
}

/// Scale `v` to unit length in place. Zero vectors are left untouched.
pub fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use scout_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB produced by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; higher is more similar.
///
/// Returns `0.0` for empty vectors, zero vectors, or vectors of
/// different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}
