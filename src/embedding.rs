//! Embedding providers.
//!
//! Concrete [`Embedder`] implementations selected by `[embedding].provider`:
//!
//! | Config Value | Embedder | Notes |
//! |--------------|----------|-------|
//! | `"hash"` | [`HashEmbedder`] | deterministic feature hashing, no model download |
//! | `"local"` | `LocalEmbedder` | fastembed ONNX models, loaded once and reused |
//! | `"openai"` | [`OpenAiEmbedder`] | `POST /v1/embeddings`, needs `OPENAI_API_KEY` |
//! | `"ollama"` | [`OllamaEmbedder`] | `POST {url}/api/embed` |
//!
//! # Retry Strategy
//!
//! The HTTP providers use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Every provider checks that it got one vector of the advertised
//! dimensionality per input; anything else is an embedding error.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use scout_core::embedding::{Embedder, HashEmbedder};
use scout_core::{ScoutError, ScoutResult};

use crate::config::EmbeddingConfig;

/// Build the embedder named by the configuration.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "hash" => Ok(Arc::new(
            HashEmbedder::new(config.dims.unwrap_or(384))
                .with_max_input_chars(config.max_input_chars),
        )),
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

fn check_input_lengths(texts: &[String], limit: Option<usize>, model: &str) -> ScoutResult<()> {
    let Some(limit) = limit else {
        return Ok(());
    };
    for text in texts {
        let len = text.chars().count();
        if len > limit {
            return Err(ScoutError::Embedding(format!(
                "input of {len} characters exceeds the {limit} character limit of {model}"
            )));
        }
    }
    Ok(())
}

fn check_output(
    model: &str,
    dims: usize,
    inputs: usize,
    vectors: Vec<Vec<f32>>,
) -> ScoutResult<Vec<Vec<f32>>> {
    if vectors.len() != inputs {
        return Err(ScoutError::Embedding(format!(
            "{model} returned {} vectors for {inputs} inputs",
            vectors.len()
        )));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
        return Err(ScoutError::Embedding(format!(
            "{model} returned a {}-dimensional vector, expected {dims}",
            bad.len()
        )));
    }
    Ok(vectors)
}

// ============ HTTP providers ============

struct HttpSettings {
    client: reqwest::Client,
    max_retries: u32,
    max_input_chars: Option<usize>,
}

impl HttpSettings {
    fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            max_retries: config.max_retries,
            max_input_chars: config.max_input_chars,
        })
    }

    /// POST `body` to `url`, retrying transient failures with backoff.
    async fn post_json(
        &self,
        label: &str,
        url: &str,
        bearer: Option<&str>,
        body: &serde_json::Value,
    ) -> ScoutResult<serde_json::Value> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(attempt, delay_secs = delay.as_secs(), "{label} retrying");
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.post(url).json(body);
            if let Some(token) = bearer {
                request = request.bearer_auth(token);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json::<serde_json::Value>().await.map_err(|e| {
                            ScoutError::Embedding(format!("{label} returned invalid JSON: {e}"))
                        });
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(format!("{label} API error {status}: {body_text}"));
                        continue;
                    }
                    return Err(ScoutError::Embedding(format!(
                        "{label} API error {status}: {body_text}"
                    )));
                }
                Err(e) => {
                    last_err = Some(format!("{label} connection error ({url}): {e}"));
                    continue;
                }
            }
        }

        Err(ScoutError::Embedding(last_err.unwrap_or_else(|| {
            format!("{label} embedding failed after retries")
        })))
    }
}

fn json_vector(value: &serde_json::Value, label: &str) -> ScoutResult<Vec<f32>> {
    let invalid = |why: &str| ScoutError::Embedding(format!("Invalid {label} response: {why}"));
    value
        .as_array()
        .ok_or_else(|| invalid("embedding is not an array"))?
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| invalid("non-numeric value"))
        })
        .collect()
}

/// Embeddings from the OpenAI API.
pub struct OpenAiEmbedder {
    model: String,
    dims: usize,
    api_key: String,
    http: HttpSettings,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        Ok(Self {
            model,
            dims,
            api_key,
            http: HttpSettings::new(config)?,
        })
    }
}

/// Extract `data[].embedding`, ordered by `data[].index`.
fn parse_openai_response(json: &serde_json::Value) -> ScoutResult<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| {
            ScoutError::Embedding("Invalid OpenAI response: missing data array".into())
        })?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let embedding = item.get("embedding").ok_or_else(|| {
            ScoutError::Embedding("Invalid OpenAI response: missing embedding".into())
        })?;
        indexed.push((index, json_vector(embedding, "OpenAI")?));
    }
    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_many(&self, texts: &[String]) -> ScoutResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        check_input_lengths(texts, self.http.max_input_chars, &self.model)?;
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = self
            .http
            .post_json(
                "OpenAI",
                "https://api.openai.com/v1/embeddings",
                Some(&self.api_key),
                &body,
            )
            .await?;
        check_output(&self.model, self.dims, texts.len(), parse_openai_response(&json)?)
    }
}

/// Embeddings from a local Ollama instance.
pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    url: String,
    http: HttpSettings,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        Ok(Self {
            model,
            dims,
            url: url.trim_end_matches('/').to_string(),
            http: HttpSettings::new(config)?,
        })
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> ScoutResult<Vec<Vec<f32>>> {
    json.get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            ScoutError::Embedding("Invalid Ollama response: missing embeddings array".into())
        })?
        .iter()
        .map(|e| json_vector(e, "Ollama"))
        .collect()
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_many(&self, texts: &[String]) -> ScoutResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        check_input_lengths(texts, self.http.max_input_chars, &self.model)?;
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let url = format!("{}/api/embed", self.url);
        let json = self.http.post_json("Ollama", &url, None, &body).await?;
        check_output(&self.model, self.dims, texts.len(), parse_ollama_response(&json)?)
    }
}

// ============ Local Provider (fastembed) ============

/// Local ONNX inference through fastembed.
///
/// The model is downloaded from Hugging Face on first use and cached;
/// the loaded session is kept for the life of the embedder.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalEmbedder {
    model_name: String,
    dims: usize,
    batch_size: usize,
    max_input_chars: Option<usize>,
    model: fastembed::EmbeddingModel,
    session: Arc<std::sync::Mutex<Option<fastembed::TextEmbedding>>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "all-minilm-l6-v2".to_string())
            .to_lowercase();
        let (model, default_dims) = fastembed_model(&model_name)?;
        if config.device != "cpu" {
            tracing::warn!(
                "embedding.device '{}' is not supported by the bundled runtime; using cpu",
                config.device
            );
        }
        Ok(Self {
            model_name,
            dims: config.dims.unwrap_or(default_dims),
            batch_size: config.batch_size,
            max_input_chars: config.max_input_chars,
            model,
            session: Arc::new(std::sync::Mutex::new(None)),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn fastembed_model(name: &str) -> Result<(fastembed::EmbeddingModel, usize)> {
    use fastembed::EmbeddingModel as M;
    match name {
        "all-minilm-l6-v2" | "sentence-transformers/all-minilm-l6-v2" => Ok((M::AllMiniLML6V2, 384)),
        "bge-small-en-v1.5" => Ok((M::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Ok((M::BGEBaseENV15, 768)),
        "bge-large-en-v1.5" => Ok((M::BGELargeENV15, 1024)),
        "nomic-embed-text-v1.5" => Ok((M::NomicEmbedTextV15, 768)),
        "multilingual-e5-small" => Ok((M::MultilingualE5Small, 384)),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1.5, multilingual-e5-small",
            other
        ),
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_many(&self, texts: &[String]) -> ScoutResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        check_input_lengths(texts, self.max_input_chars, &self.model_name)?;

        let session = Arc::clone(&self.session);
        let model = self.model.clone();
        let batch_size = self.batch_size;
        let inputs = texts.to_vec();
        let vectors = tokio::task::spawn_blocking(move || -> ScoutResult<Vec<Vec<f32>>> {
            let mut guard = session
                .lock()
                .map_err(|_| ScoutError::Embedding("local model lock poisoned".into()))?;
            if guard.is_none() {
                let loaded = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(model).with_show_download_progress(false),
                )
                .map_err(|e| {
                    ScoutError::Embedding(format!("Failed to initialize local embedding model: {e}"))
                })?;
                *guard = Some(loaded);
            }
            let Some(session) = guard.as_mut() else {
                return Err(ScoutError::Embedding("local model unavailable".into()));
            };
            session
                .embed(inputs, Some(batch_size))
                .map_err(|e| ScoutError::Embedding(format!("Local embedding failed: {e}")))
        })
        .await
        .map_err(|e| ScoutError::Embedding(format!("local embedding task failed: {e}")))??;

        check_output(&self.model_name, self.dims, texts.len(), vectors)
    }
}
