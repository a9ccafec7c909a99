//! End-to-end tests of the acquire → chunk → embed → store → query pipeline.
//!
//! Remote repositories are materialized by a fixture cloner that writes
//! files instead of running git, so every test runs offline. The embedder
//! is the deterministic hashing model wrapped with call counters.

use async_trait::async_trait;
use repo_scout::acquire::{Acquirer, Cloner};
use repo_scout::chunk::ChunkerOptions;
use repo_scout::config::{ChunkingConfig, Config};
use repo_scout::coordinator::IndexCoordinator;
use repo_scout::query::{QueryEngine, QueryOutcome, QueryRequest};
use repo_scout::sqlite_store::SqliteStore;
use repo_scout::{db, migrate, server};
use scout_core::embedding::{Embedder, HashEmbedder};
use scout_core::identity::RepoReference;
use scout_core::store::memory::InMemoryStore;
use scout_core::store::IndexStore;
use scout_core::{AcquisitionFailure, ScoutError, ScoutResult};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const FOO_PY: &str = "def foo():\n    \"\"\"function named foo\"\"\"\n    return 1\n";
const BAR_PY: &str = "class Bar:\n    pass\n";
const PACKAGE_JSON: &str = r#"{"name": "webapp", "dependencies": {"express": "^4.18.0"}}"#;
const INDEX_TS: &str = "import express from 'express';\nexpress().listen(3000);\n";
const README_MD: &str = "# Webapp\n\nA tiny express server.\n";

// ─── Test doubles ───────────────────────────────────────────────────

/// Writes a fixed file set per repository name.
struct FixtureCloner {
    repos: HashMap<String, Vec<(&'static str, &'static str)>>,
    calls: AtomicUsize,
    fail: AtomicBool,
    delay: Duration,
    /// Per-repository delays overriding `delay`.
    slow: HashMap<String, Duration>,
}

impl FixtureCloner {
    fn new(delay: Duration, slow: &[(&str, Duration)]) -> Self {
        let mut repos = HashMap::new();
        repos.insert("demo".to_string(), vec![("a.py", FOO_PY), ("b.py", BAR_PY)]);
        repos.insert("alpha".to_string(), vec![("a.py", FOO_PY)]);
        repos.insert("beta".to_string(), vec![("b.py", BAR_PY)]);
        repos.insert(
            "webapp".to_string(),
            vec![
                ("package.json", PACKAGE_JSON),
                ("README.md", README_MD),
                ("src/index.ts", INDEX_TS),
            ],
        );
        Self {
            repos,
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            delay,
            slow: slow
                .iter()
                .map(|(name, delay)| (name.to_string(), *delay))
                .collect(),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Cloner for FixtureCloner {
    async fn clone_repo(&self, reference: &RepoReference, dest: &Path) -> ScoutResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = reference.name.clone().unwrap_or_default();
        let delay = self.slow.get(&name).copied().unwrap_or(self.delay);
        tokio::time::sleep(delay).await;
        if self.fail.load(Ordering::SeqCst) {
            return Err(ScoutError::acquisition(
                AcquisitionFailure::Unreachable,
                "could not resolve host",
            ));
        }
        let files = self.repos.get(&name).cloned().unwrap_or_default();
        tokio::fs::create_dir_all(dest).await.unwrap();
        for (path, body) in files {
            let path = dest.join(path);
            tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
            tokio::fs::write(path, body).await.unwrap();
        }
        Ok(())
    }
}

/// Counts embedded texts; can be told to fail its next call.
struct CountingEmbedder {
    inner: HashEmbedder,
    texts: AtomicUsize,
    fail_next: AtomicBool,
}

impl CountingEmbedder {
    fn new() -> Self {
        Self {
            inner: HashEmbedder::new(384),
            texts: AtomicUsize::new(0),
            fail_next: AtomicBool::new(false),
        }
    }

    fn texts(&self) -> usize {
        self.texts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dims(&self) -> usize {
        self.inner.dims()
    }

    async fn embed_many(&self, texts: &[String]) -> ScoutResult<Vec<Vec<f32>>> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ScoutError::Embedding("model unavailable".into()));
        }
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        self.inner.embed_many(texts).await
    }
}

// ─── Harness ────────────────────────────────────────────────────────

struct Harness {
    _dir: TempDir,
    repo_dir: std::path::PathBuf,
    cloner: Arc<FixtureCloner>,
    embedder: Arc<CountingEmbedder>,
    engine: QueryEngine,
}

struct Settings {
    clone_delay: Duration,
    slow_repos: Vec<(&'static str, Duration)>,
    build_timeout: Duration,
    query_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            clone_delay: Duration::ZERO,
            slow_repos: Vec::new(),
            build_timeout: Duration::from_secs(30),
            query_timeout: Duration::from_secs(30),
        }
    }
}

fn harness_with_store(store: Arc<dyn IndexStore>, dir: TempDir, settings: Settings) -> Harness {
    let repo_dir = dir.path().join("repos");
    let cloner = Arc::new(FixtureCloner::new(
        settings.clone_delay,
        &settings.slow_repos,
    ));
    let embedder = Arc::new(CountingEmbedder::new());
    let acquirer = Acquirer::new(
        repo_dir.clone(),
        chrono::Duration::hours(24),
        Duration::from_secs(10),
        cloner.clone(),
    );
    let coordinator = IndexCoordinator::new(
        acquirer,
        ChunkerOptions::from_config(&ChunkingConfig::default()),
        embedder.clone(),
        store,
        chrono::Duration::hours(24),
        settings.build_timeout,
        64,
    );
    Harness {
        _dir: dir,
        repo_dir,
        cloner,
        embedder,
        engine: QueryEngine::new(coordinator, settings.query_timeout),
    }
}

fn harness(settings: Settings) -> Harness {
    harness_with_store(
        Arc::new(InMemoryStore::new()),
        TempDir::new().unwrap(),
        settings,
    )
}

fn ask(repo: &str, question: &str, top_k: Option<usize>) -> QueryRequest {
    QueryRequest {
        repository_reference: repo.to_string(),
        question: question.to_string(),
        top_k,
    }
}

const DEMO: &str = "https://github.com/acme/demo";

// ─── Retrieval ──────────────────────────────────────────────────────

#[tokio::test]
async fn answers_with_the_most_relevant_file() {
    let h = harness(Settings::default());

    let response = h
        .engine
        .answer(&ask(DEMO, "function named foo", Some(1)))
        .await
        .unwrap();

    assert_eq!(response.total_results, 1);
    assert_eq!(response.code_snippets[0].file_path, "a.py");
    assert_eq!(response.code_snippets[0].language, "python");
    assert_eq!(response.code_snippets[0].start_line, 1);
    assert!(response.code_snippets[0].content.contains("def foo"));
    assert_eq!(response.repository.url, DEMO);
    assert_eq!(response.repository.owner.as_deref(), Some("acme"));
    assert_eq!(response.repository.name.as_deref(), Some("demo"));
    assert_eq!(response.repository.total_files_indexed, 2);
    assert_eq!(response.repository.total_chunks, 2);
    assert_eq!(response.query, "function named foo");
}

#[tokio::test]
async fn scores_are_descending() {
    let h = harness(Settings::default());
    let response = h
        .engine
        .answer(&ask(DEMO, "function named foo", None))
        .await
        .unwrap();
    assert_eq!(response.total_results, 2);
    let scores: Vec<f32> = response
        .code_snippets
        .iter()
        .map(|s| s.relevance_score)
        .collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
}

#[tokio::test]
async fn equivalent_references_share_one_index() {
    let h = harness(Settings::default());
    h.engine
        .answer(&ask(DEMO, "foo", None))
        .await
        .unwrap();
    h.engine
        .answer(&ask("git@github.com:Acme/demo.git", "foo", None))
        .await
        .unwrap();
    assert_eq!(h.cloner.calls(), 1);
    assert_eq!(h.engine.coordinator().list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn indexes_local_directory_in_place() {
    let h = harness(Settings::default());
    let local = TempDir::new().unwrap();
    std::fs::write(local.path().join("a.py"), FOO_PY).unwrap();
    std::fs::write(local.path().join("b.py"), BAR_PY).unwrap();

    let response = h
        .engine
        .answer(&ask(
            &local.path().to_string_lossy(),
            "function named foo",
            Some(1),
        ))
        .await
        .unwrap();

    assert_eq!(response.code_snippets[0].file_path, "a.py");
    assert_eq!(h.cloner.calls(), 0);
    assert!(response.repository.owner.is_none());
}

// ─── Caching and concurrency ────────────────────────────────────────

#[tokio::test]
async fn fresh_index_skips_acquire_and_chunk_embedding() {
    let h = harness(Settings::default());
    h.engine
        .answer(&ask(DEMO, "function named foo", None))
        .await
        .unwrap();
    assert_eq!(h.cloner.calls(), 1);
    // two chunks plus the question
    assert_eq!(h.embedder.texts(), 3);

    h.engine
        .answer(&ask(DEMO, "class Bar", None))
        .await
        .unwrap();
    assert_eq!(h.cloner.calls(), 1);
    assert_eq!(h.embedder.texts(), 4);
}

#[tokio::test]
async fn concurrent_queries_share_one_build() {
    let h = harness(Settings {
        clone_delay: Duration::from_millis(200),
        ..Settings::default()
    });

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = h.engine.clone();
        handles.push(tokio::spawn(async move {
            engine.answer(&ask(DEMO, "function named foo", Some(1))).await
        }));
    }
    for handle in handles {
        let response = handle.await.unwrap().unwrap();
        assert_eq!(response.code_snippets[0].file_path, "a.py");
    }

    assert_eq!(h.cloner.calls(), 1);
    // one build of two chunks, then eight questions
    assert_eq!(h.embedder.texts(), 2 + 8);
}

#[tokio::test]
async fn different_repositories_build_independently() {
    let h = harness(Settings::default());

    let alpha = h
        .engine
        .answer(&ask("https://github.com/acme/alpha", "class Bar", None))
        .await
        .unwrap();
    let beta = h
        .engine
        .answer(&ask("https://github.com/acme/beta", "function named foo", None))
        .await
        .unwrap();

    assert!(alpha.code_snippets.iter().all(|s| s.file_path == "a.py"));
    assert!(beta.code_snippets.iter().all(|s| s.file_path == "b.py"));
    assert_eq!(h.cloner.calls(), 2);
    assert_eq!(h.engine.coordinator().list().await.unwrap().len(), 2);
}

#[tokio::test]
async fn slow_build_does_not_block_other_repositories() {
    let h = harness(Settings {
        slow_repos: vec![("alpha", Duration::from_millis(500))],
        ..Settings::default()
    });
    let started = Instant::now();

    let engine = h.engine.clone();
    let alpha = tokio::spawn(async move {
        engine
            .answer(&ask("https://github.com/acme/alpha", "class Bar", None))
            .await
    });
    // alpha is registered and cloning before beta starts
    tokio::time::sleep(Duration::from_millis(20)).await;

    let beta = h
        .engine
        .answer(&ask("https://github.com/acme/beta", "function named foo", None))
        .await
        .unwrap();
    let beta_elapsed = started.elapsed();
    assert!(
        beta_elapsed < Duration::from_millis(300),
        "beta waited {beta_elapsed:?}"
    );
    assert!(!alpha.is_finished());
    assert_eq!(beta.code_snippets[0].file_path, "b.py");

    let alpha = alpha.await.unwrap().unwrap();
    assert!(started.elapsed() >= Duration::from_millis(500));
    assert_eq!(alpha.code_snippets[0].file_path, "a.py");
    assert_eq!(h.cloner.calls(), 2);
}

#[tokio::test]
async fn failed_rebuild_keeps_previous_index() {
    let h = harness(Settings::default());
    let reference = RepoReference::parse(DEMO).unwrap();
    let before = h.engine.coordinator().ensure_index(&reference).await.unwrap();

    h.embedder.fail_next.store(true, Ordering::SeqCst);
    let err = h.engine.coordinator().rebuild(&reference).await.unwrap_err();
    assert_eq!(err.kind(), "embedding_error");

    let status = h.engine.coordinator().status(&reference).await.unwrap();
    assert!(status.indexed);
    assert!(!status.building);
    assert_eq!(status.meta.unwrap().built_at, before.built_at);

    let response = h
        .engine
        .answer(&ask(DEMO, "function named foo", Some(1)))
        .await
        .unwrap();
    assert_eq!(response.code_snippets[0].file_path, "a.py");
}

#[tokio::test]
async fn forced_rebuild_replaces_index() {
    let h = harness(Settings::default());
    let reference = RepoReference::parse(DEMO).unwrap();
    let first = h.engine.coordinator().ensure_index(&reference).await.unwrap();
    let second = h.engine.coordinator().rebuild(&reference).await.unwrap();
    assert!(second.built_at >= first.built_at);
    assert_eq!(second.total_chunks, first.total_chunks);
    // the cached tree is still fresh, so no second clone
    assert_eq!(h.cloner.calls(), 1);
    assert_eq!(h.embedder.texts(), 4);
}

#[tokio::test]
async fn forced_rebuild_waits_out_unforced_build_then_rebuilds() {
    let h = harness(Settings {
        clone_delay: Duration::from_millis(200),
        ..Settings::default()
    });
    let reference = RepoReference::parse(DEMO).unwrap();

    let coordinator = h.engine.coordinator().clone();
    let first_reference = reference.clone();
    let first = tokio::spawn(async move { coordinator.ensure_index(&first_reference).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.engine.coordinator().status(&reference).await.unwrap().building);

    let forced = h.engine.coordinator().rebuild(&reference).await.unwrap();
    let first = first.await.unwrap().unwrap();

    assert!(forced.built_at >= first.built_at);
    // two builds of two chunks; the second reuses the fresh clone
    assert_eq!(h.embedder.texts(), 4);
    assert_eq!(h.cloner.calls(), 1);
}

#[tokio::test]
async fn forced_rebuilds_share_one_build() {
    let h = harness(Settings {
        clone_delay: Duration::from_millis(100),
        ..Settings::default()
    });
    let reference = RepoReference::parse(DEMO).unwrap();

    let (a, b) = tokio::join!(
        h.engine.coordinator().rebuild(&reference),
        h.engine.coordinator().rebuild(&reference)
    );
    assert_eq!(a.unwrap().built_at, b.unwrap().built_at);
    assert_eq!(h.embedder.texts(), 2);
}

#[tokio::test]
async fn build_timeout_commits_nothing() {
    let h = harness(Settings {
        clone_delay: Duration::from_millis(500),
        build_timeout: Duration::from_millis(50),
        ..Settings::default()
    });
    let reference = RepoReference::parse(DEMO).unwrap();
    let err = h
        .engine
        .coordinator()
        .ensure_index(&reference)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "timeout");
    assert!(h.engine.coordinator().list().await.unwrap().is_empty());
    assert!(!h.repo_dir.join(reference.repo_id()).exists());
}

#[tokio::test]
async fn clear_removes_index_and_tree() {
    let h = harness(Settings::default());
    let reference = RepoReference::parse(DEMO).unwrap();
    h.engine.coordinator().ensure_index(&reference).await.unwrap();
    assert!(h.repo_dir.join(reference.repo_id()).exists());

    assert!(h.engine.coordinator().clear(&reference).await.unwrap());
    assert!(!h.repo_dir.join(reference.repo_id()).exists());
    let status = h.engine.coordinator().status(&reference).await.unwrap();
    assert!(!status.indexed);
    assert!(status.tree_acquired_at.is_none());
    assert!(!h.engine.coordinator().clear(&reference).await.unwrap());
}

// ─── Overview ───────────────────────────────────────────────────────

#[tokio::test]
async fn overview_summarizes_without_indexing() {
    let h = harness(Settings::default());
    let webapp = "https://github.com/acme/webapp";

    let overview = h.engine.overview(webapp).await.unwrap();
    assert_eq!(overview.name, "webapp");
    assert_eq!(overview.location, webapp);
    assert_eq!(overview.stack.languages, vec!["JavaScript/TypeScript"]);
    assert_eq!(overview.stack.frameworks, vec!["Express.js"]);
    assert_eq!(overview.entry_points, vec!["src/index.ts"]);
    assert_eq!(overview.config_files, vec!["package.json"]);
    assert_eq!(overview.file_stats.total_files, 3);
    assert!(overview.readme.as_deref().unwrap().starts_with("# Webapp"));
    assert_eq!(h.embedder.texts(), 0);
    assert!(h.engine.coordinator().list().await.unwrap().is_empty());

    // the next question reuses the acquired tree
    h.engine
        .answer(&ask(webapp, "where does the server listen?", Some(1)))
        .await
        .unwrap();
    assert_eq!(h.cloner.calls(), 1);
}

#[tokio::test]
async fn overview_of_unreachable_repository_fails() {
    let h = harness(Settings::default());
    h.cloner.fail.store(true, Ordering::SeqCst);
    let err = h.engine.overview(DEMO).await.unwrap_err();
    assert_eq!(err.kind(), "acquisition_error");
    assert_eq!(h.engine.overview("  ").await.unwrap_err().kind(), "invalid_request");
}

// ─── Errors ─────────────────────────────────────────────────────────

#[tokio::test]
async fn invalid_requests_are_rejected_before_any_work() {
    let h = harness(Settings::default());
    for request in [
        ask(DEMO, "   ", None),
        ask(DEMO, "foo", Some(0)),
        ask(DEMO, "foo", Some(51)),
        ask("", "foo", None),
    ] {
        let err = h.engine.answer(&request).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_request", "{request:?}");
    }
    assert_eq!(h.cloner.calls(), 0);
}

#[tokio::test]
async fn unreachable_repository_reports_acquisition_error() {
    let h = harness(Settings::default());
    h.cloner.fail.store(true, Ordering::SeqCst);

    let outcome = QueryOutcome::from(h.engine.answer(&ask(DEMO, "foo", None)).await);
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["error_kind"], "acquisition_error");
    assert!(json["message"]
        .as_str()
        .unwrap()
        .contains("could not resolve host"));
}

#[tokio::test]
async fn missing_local_directory_is_an_acquisition_error() {
    let h = harness(Settings::default());
    let err = h
        .engine
        .answer(&ask("/definitely/not/here/repo", "foo", None))
        .await
        .unwrap_err();
    match err {
        ScoutError::Acquisition { reason, .. } => {
            assert_eq!(reason, AcquisitionFailure::InvalidReference)
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn slow_build_hits_query_timeout() {
    let h = harness(Settings {
        clone_delay: Duration::from_millis(500),
        query_timeout: Duration::from_millis(50),
        ..Settings::default()
    });
    let err = h
        .engine
        .answer(&ask(DEMO, "foo", None))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "timeout");
}

// ─── Persistence and HTTP ───────────────────────────────────────────

async fn sqlite_store(dir: &Path) -> Arc<dyn IndexStore> {
    let mut config = Config::default();
    config.storage.db_path = dir.join("scout.sqlite");
    let pool = db::connect(&config).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    Arc::new(SqliteStore::new(pool))
}

#[tokio::test]
async fn sqlite_index_survives_restart() {
    let db_dir = TempDir::new().unwrap();

    let first = harness_with_store(
        sqlite_store(db_dir.path()).await,
        TempDir::new().unwrap(),
        Settings::default(),
    );
    first
        .engine
        .answer(&ask(DEMO, "function named foo", Some(1)))
        .await
        .unwrap();
    assert_eq!(first.cloner.calls(), 1);
    drop(first);

    let second = harness_with_store(
        sqlite_store(db_dir.path()).await,
        TempDir::new().unwrap(),
        Settings::default(),
    );
    let response = second
        .engine
        .answer(&ask(DEMO, "function named foo", Some(1)))
        .await
        .unwrap();
    assert_eq!(response.code_snippets[0].file_path, "a.py");
    assert_eq!(second.cloner.calls(), 0);
    assert_eq!(second.embedder.texts(), 1);
}

#[tokio::test]
async fn http_query_round_trip() {
    let h = harness(Settings::default());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = server::router(h.engine.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = reqwest::Client::new();
    let ok: serde_json::Value = client
        .post(format!("http://{addr}/query"))
        .json(&serde_json::json!({
            "repository_reference": DEMO,
            "question": "function named foo",
            "top_k": 1
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(ok["success"], true);
    assert_eq!(ok["code_snippets"][0]["file_path"], "a.py");
    assert_eq!(ok["total_results"], 1);

    let bad = client
        .post(format!("http://{addr}/query"))
        .json(&serde_json::json!({
            "repository_reference": DEMO,
            "question": ""
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(bad.status().as_u16(), 400);
    let body: serde_json::Value = bad.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error_kind"], "invalid_request");

    let listed: serde_json::Value = client
        .get(format!("http://{addr}/indexes"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["indexes"].as_array().unwrap().len(), 1);

    let overview: serde_json::Value = client
        .post(format!("http://{addr}/overview"))
        .json(&serde_json::json!({ "repository_reference": DEMO }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(overview["success"], true);
    assert_eq!(overview["overview"]["file_stats"]["total_files"], 2);
}

#[tokio::test]
async fn http_malformed_bodies_get_invalid_request_json() {
    let h = harness(Settings::default());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = server::router(h.engine.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let client = reqwest::Client::new();

    let bodies = [
        (
            "query",
            serde_json::json!({ "repository_reference": DEMO, "question": "q", "top_k": -1 }),
        ),
        ("query", serde_json::json!({ "repository_reference": DEMO })),
        ("index", serde_json::json!({ "force": true })),
        ("overview", serde_json::json!({})),
    ];
    for (route, body) in bodies {
        let response = client
            .post(format!("http://{addr}/{route}"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400, "{route} {body}");
        let json: serde_json::Value = response.json().await.unwrap();
        assert_eq!(json["success"], false, "{route} {body}");
        assert_eq!(json["error_kind"], "invalid_request", "{route} {body}");
        assert!(!json["message"].as_str().unwrap().is_empty());
    }

    let garbled = client
        .post(format!("http://{addr}/query"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(garbled.status().as_u16(), 400);
    let json: serde_json::Value = garbled.json().await.unwrap();
    assert_eq!(json["error_kind"], "invalid_request");
    assert_eq!(h.cloner.calls(), 0);
}
