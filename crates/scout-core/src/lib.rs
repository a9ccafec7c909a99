//! # scout-core
//!
//! Platform-neutral logic for repo-scout: the error taxonomy, repository
//! identity, data models, line-aware chunking, the embedder trait with a
//! deterministic hashing model, the index store trait with an in-memory
//! backend, and top-k ranking.
//!
//! This crate performs no filesystem, network, or database I/O and pulls
//! in no async runtime.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod identity;
pub mod models;
pub mod search;
pub mod store;

pub use error::{AcquisitionFailure, ScoutError, ScoutResult};
