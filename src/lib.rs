//! # Repo Scout
//!
//! Index a code repository on demand and answer natural-language questions
//! about it with ranked source snippets.
//!
//! The first question about a repository acquires a working tree (a shallow
//! clone for remotes, the directory itself for local paths), chunks every
//! text file, embeds the chunks and stores the vectors. Later questions
//! reuse the stored index until it ages past the cache TTL.
//!
//! ## Architecture
//!
//! ```text
//!  question + repo ──▶ ┌──────────────┐   fresh index? ──yes──▶ ┌──────────┐
//!                      │ QueryEngine  │─────────────────────────▶│  Store   │
//!                      └──────┬───────┘                          │ (SQLite) │
//!                             │ no                               └────▲─────┘
//!                      ┌──────▼───────┐                               │ upsert
//!                      │ Coordinator  │──▶ Acquirer ─▶ Chunker ─▶ Embedder
//!                      └──────────────┘   (one build per repository)
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! scout init
//! scout query https://github.com/owner/repo "where is the retry logic?"
//! scout serve http
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`acquire`] | Clone or locate a repository working tree |
//! | [`chunk`] | Walk a working tree and chunk its files |
//! | [`embedding`] | Embedding providers |
//! | [`sqlite_store`] | SQLite-backed index store |
//! | [`coordinator`] | Single-flight index builds |
//! | [`query`] | Question answering |
//! | [`overview`] | Repository structure and stack summary |
//! | [`server`] | HTTP API |
//! | [`mcp`] | MCP stdio server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod acquire;
pub mod chunk;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod embedding;
pub mod mcp;
pub mod migrate;
pub mod overview;
pub mod query;
pub mod server;
pub mod sqlite_store;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::acquire::Acquirer;
use crate::config::Config;
use crate::coordinator::IndexCoordinator;
use crate::query::QueryEngine;
use crate::sqlite_store::SqliteStore;

/// Wire the full pipeline from configuration: database, store, embedder,
/// acquirer, coordinator and engine.
pub async fn open_engine(config: &Config) -> Result<QueryEngine> {
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool)
        .await
        .context("failed to migrate index database")?;
    let store = Arc::new(SqliteStore::new(pool));
    let embedder = embedding::create_embedder(&config.embedding)?;
    let acquirer = Acquirer::from_config(config);
    let coordinator = IndexCoordinator::from_config(config, acquirer, embedder, store);
    Ok(QueryEngine::new(coordinator, config.cache.query_timeout()))
}
