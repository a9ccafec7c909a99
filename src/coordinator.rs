//! Index Coordinator: build each repository's index at most once at a time.
//!
//! ```text
//! ensure_index(ref)
//!   │ repo_id = ref.repo_id()
//!   ├─ store has fresh index (same model, built_at within ttl) ──▶ return it
//!   └─ lock in_flight
//!        ├─ build already running for repo_id ──▶ subscribe, wait for its outcome
//!        └─ none running ──▶ register channel, spawn build task, wait
//!
//! rebuild(ref)
//!   └─ lock in_flight
//!        ├─ forced build running ──▶ subscribe, wait for its outcome
//!        ├─ unforced build running ──▶ wait for it to end, then start over
//!        └─ none running ──▶ register forced build, spawn, wait
//!
//! build task (one per repo_id)
//!   re-check freshness
//!   acquire ─▶ chunk (blocking pool) ─▶ embed in batches ─▶ upsert_index
//!   unregister, then publish outcome to every waiter
//! ```
//!
//! The in-flight map is keyed by repository identity, so builds of
//! different repositories run in parallel while a second request for the
//! same repository waits for the running build instead of starting
//! another. Readers of a fresh index never touch the map.
//!
//! A build that fails or exceeds `build_timeout` commits nothing: the
//! store's atomic upsert is the only write, and it happens last. The
//! previous index, if any, stays servable. When two builds of the same
//! repository complete one after another, the later commit wins.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use scout_core::embedding::Embedder;
use scout_core::identity::RepoReference;
use scout_core::models::{Chunk, IndexMeta, IndexRecord};
use scout_core::store::IndexStore;
use scout_core::{ScoutError, ScoutResult};
use serde::Serialize;
use tokio::sync::watch;

use crate::acquire::Acquirer;
use crate::chunk::{ChunkEvent, ChunkerOptions, SkippedFile, TreeChunker};
use crate::config::Config;
use crate::overview::{self, RepoOverview};

type BuildOutcome = ScoutResult<IndexMeta>;

/// Snapshot of a repository's index and cache state.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub repo_id: String,
    pub location: String,
    pub indexed: bool,
    pub fresh: bool,
    pub building: bool,
    pub meta: Option<IndexMeta>,
    pub tree_acquired_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct IndexCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    acquirer: Acquirer,
    chunker_options: ChunkerOptions,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn IndexStore>,
    ttl: chrono::Duration,
    build_timeout: Duration,
    batch_size: usize,
    in_flight: Mutex<HashMap<String, InFlight>>,
}

#[derive(Clone)]
struct InFlight {
    rx: watch::Receiver<Option<BuildOutcome>>,
    /// Skips the freshness re-check.
    force: bool,
}

/// Removes a build's in-flight entry when the build task ends, including
/// by panic.
struct InFlightGuard {
    inner: Arc<Inner>,
    repo_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut map) = self.inner.in_flight.lock() {
            map.remove(&self.repo_id);
        }
    }
}

struct TreeScan {
    chunks: Vec<Chunk>,
    skipped: Vec<SkippedFile>,
    total_files: i64,
}

impl IndexCoordinator {
    pub fn new(
        acquirer: Acquirer,
        chunker_options: ChunkerOptions,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn IndexStore>,
        ttl: chrono::Duration,
        build_timeout: Duration,
        batch_size: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                acquirer,
                chunker_options,
                embedder,
                store,
                ttl,
                build_timeout,
                batch_size: batch_size.max(1),
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn from_config(
        config: &Config,
        acquirer: Acquirer,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn IndexStore>,
    ) -> Self {
        Self::new(
            acquirer,
            ChunkerOptions::from_config(&config.chunking),
            embedder,
            store,
            config.cache.ttl(),
            config.cache.build_timeout(),
            config.embedding.batch_size,
        )
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.inner.embedder
    }

    pub fn store(&self) -> &Arc<dyn IndexStore> {
        &self.inner.store
    }

    /// Return a fresh index for `reference`, building it if needed.
    pub async fn ensure_index(&self, reference: &RepoReference) -> ScoutResult<IndexMeta> {
        let repo_id = reference.repo_id();
        if let Some(meta) = self.inner.fresh_meta(&repo_id).await? {
            tracing::debug!(repo_id = %repo_id, "serving cached index");
            return Ok(meta);
        }
        self.join_or_start(reference, false).await
    }

    /// Rebuild regardless of freshness. Joins a forced build already in
    /// flight; an unforced one may settle for the stored index, so it is
    /// waited out and followed by a build of our own.
    pub async fn rebuild(&self, reference: &RepoReference) -> ScoutResult<IndexMeta> {
        self.join_or_start(reference, true).await
    }

    pub async fn status(&self, reference: &RepoReference) -> ScoutResult<IndexStatus> {
        let repo_id = reference.repo_id();
        let meta = self.inner.store.index_meta(&repo_id).await?;
        let fresh = meta
            .as_ref()
            .is_some_and(|m| self.inner.is_current(m, Utc::now()));
        let building = self.in_flight(&repo_id)?.is_some();
        let tree_acquired_at = self
            .inner
            .acquirer
            .cached_tree(reference)
            .await
            .map(|t| t.acquired_at);
        Ok(IndexStatus {
            repo_id,
            location: reference.canonical(),
            indexed: meta.is_some(),
            fresh,
            building,
            meta,
            tree_acquired_at,
        })
    }

    /// Drop the index and any cached clone of `reference`, after letting a
    /// running build finish. Returns whether an index existed.
    pub async fn clear(&self, reference: &RepoReference) -> ScoutResult<bool> {
        let repo_id = reference.repo_id();
        if let Some(rx) = self.in_flight(&repo_id)? {
            // the outcome is irrelevant, only that the build is over
            let _ = wait_for(rx).await;
        }
        let existed = self.inner.store.delete_index(&repo_id).await?;
        self.inner.acquirer.evict(reference).await?;
        tracing::info!(repo_id = %repo_id, existed, "index cleared");
        Ok(existed)
    }

    /// Acquire `reference` and summarize its working tree without indexing it.
    pub async fn overview(&self, reference: &RepoReference) -> ScoutResult<RepoOverview> {
        let tree = self.inner.acquirer.acquire(reference).await?;
        let path = tree.path.display().to_string();
        let reference = reference.clone();
        tokio::task::spawn_blocking(move || overview::describe(&tree, &reference))
            .await
            .map_err(|e| ScoutError::Chunking {
                path,
                message: format!("overview task failed: {e}"),
            })
    }

    pub async fn list(&self) -> ScoutResult<Vec<IndexMeta>> {
        self.inner.store.list_indexes().await
    }

    fn in_flight(&self, repo_id: &str) -> ScoutResult<Option<watch::Receiver<Option<BuildOutcome>>>> {
        let map = self
            .inner
            .in_flight
            .lock()
            .map_err(|_| ScoutError::Store("in-flight build map poisoned".into()))?;
        Ok(map.get(repo_id).map(|entry| entry.rx.clone()))
    }

    async fn join_or_start(&self, reference: &RepoReference, force: bool) -> BuildOutcome {
        let repo_id = reference.repo_id();
        loop {
            let (rx, joined) = {
                let mut map = self
                    .inner
                    .in_flight
                    .lock()
                    .map_err(|_| ScoutError::Store("in-flight build map poisoned".into()))?;
                let running = map.get(&repo_id).cloned();
                match running {
                    Some(entry) if entry.force || !force => {
                        tracing::debug!(repo_id = %repo_id, "joining build in progress");
                        (entry.rx, true)
                    }
                    Some(entry) => {
                        tracing::debug!(repo_id = %repo_id, "waiting out unforced build before rebuilding");
                        (entry.rx, false)
                    }
                    None => {
                        let (tx, rx) = watch::channel(None);
                        map.insert(
                            repo_id.clone(),
                            InFlight {
                                rx: rx.clone(),
                                force,
                            },
                        );
                        let guard = InFlightGuard {
                            inner: Arc::clone(&self.inner),
                            repo_id: repo_id.clone(),
                        };
                        let reference = reference.clone();
                        tokio::spawn(async move {
                            let outcome = guard.inner.run_build(&reference, force).await;
                            drop(guard);
                            tx.send_replace(Some(outcome));
                        });
                        (rx, true)
                    }
                }
            };
            let outcome = wait_for(rx).await;
            if joined {
                return outcome;
            }
        }
    }
}

async fn wait_for(mut rx: watch::Receiver<Option<BuildOutcome>>) -> BuildOutcome {
    loop {
        let current = rx.borrow_and_update().clone();
        if let Some(outcome) = current {
            return outcome;
        }
        if rx.changed().await.is_err() {
            return Err(ScoutError::Store(
                "index build ended without reporting an outcome".into(),
            ));
        }
    }
}

impl Inner {
    fn is_current(&self, meta: &IndexMeta, now: DateTime<Utc>) -> bool {
        meta.is_fresh(self.ttl, now) && meta.model == self.embedder.model_name()
    }

    async fn fresh_meta(&self, repo_id: &str) -> ScoutResult<Option<IndexMeta>> {
        Ok(self
            .store
            .index_meta(repo_id)
            .await?
            .filter(|m| self.is_current(m, Utc::now())))
    }

    async fn run_build(&self, reference: &RepoReference, force: bool) -> BuildOutcome {
        let repo_id = reference.repo_id();
        if !force {
            if let Some(meta) = self.fresh_meta(&repo_id).await? {
                return Ok(meta);
            }
        }

        let started = Instant::now();
        tracing::info!(repo_id = %repo_id, repo = %reference.canonical(), force, "index build started");
        let outcome = match tokio::time::timeout(self.build_timeout, self.build(reference)).await {
            Ok(result) => result,
            Err(_) => Err(ScoutError::Timeout(format!(
                "building the index for {} exceeded {}s",
                reference.canonical(),
                self.build_timeout.as_secs()
            ))),
        };

        match &outcome {
            Ok(meta) => tracing::info!(
                repo_id = %repo_id,
                files = meta.total_files,
                chunks = meta.total_chunks,
                skipped = meta.skipped_files,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "index build complete"
            ),
            Err(e) => tracing::warn!(repo_id = %repo_id, kind = e.kind(), "index build failed: {e:#}"),
        }
        outcome
    }

    async fn build(&self, reference: &RepoReference) -> BuildOutcome {
        let tree = self.acquirer.acquire(reference).await?;
        let chunker = TreeChunker::new(&tree, self.chunker_options.clone())?;

        let scan = tokio::task::spawn_blocking(move || scan_tree(&chunker))
            .await
            .map_err(|e| ScoutError::Chunking {
                path: tree.path.display().to_string(),
                message: format!("chunking task failed: {e}"),
            })?;
        for skipped in &scan.skipped {
            tracing::warn!(
                repo_id = %tree.repo_id,
                path = %skipped.path,
                reason = skipped.reason.as_str(),
                "skipped file: {}",
                skipped.detail
            );
        }

        let vectors = self.embed_chunks(&tree.repo_id, &scan.chunks).await?;

        let meta = IndexMeta {
            repo_id: tree.repo_id.clone(),
            location: reference.canonical(),
            owner: reference.owner.clone(),
            name: reference.name.clone(),
            built_at: Utc::now(),
            total_files: scan.total_files,
            total_chunks: scan.chunks.len() as i64,
            skipped_files: scan.skipped.len() as i64,
            model: self.embedder.model_name().to_string(),
            dims: self.embedder.dims() as i64,
        };
        self.store
            .upsert_index(IndexRecord {
                meta: meta.clone(),
                chunks: scan.chunks,
                vectors,
            })
            .await?;
        Ok(meta)
    }

    async fn embed_chunks(&self, repo_id: &str, chunks: &[Chunk]) -> ScoutResult<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(chunks.len());
        let batches = chunks.len().div_ceil(self.batch_size);
        for (i, batch) in chunks.chunks(self.batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedded = self.embedder.embed_many(&texts).await?;
            if embedded.len() != texts.len() {
                return Err(ScoutError::Embedding(format!(
                    "{} returned {} vectors for {} chunks",
                    self.embedder.model_name(),
                    embedded.len(),
                    texts.len()
                )));
            }
            vectors.extend(embedded);
            tracing::debug!(repo_id = %repo_id, batch = i + 1, of = batches, "embedded batch");
        }
        Ok(vectors)
    }
}

fn scan_tree(chunker: &TreeChunker) -> TreeScan {
    let mut chunks: Vec<Chunk> = Vec::new();
    let mut skipped = Vec::new();
    let mut total_files = 0i64;
    for event in chunker.events() {
        match event {
            ChunkEvent::Chunk(chunk) => {
                if chunk.chunk_index == 0 {
                    total_files += 1;
                }
                chunks.push(chunk);
            }
            ChunkEvent::Skipped(file) => skipped.push(file),
        }
    }
    TreeScan {
        chunks,
        skipped,
        total_files,
    }
}
