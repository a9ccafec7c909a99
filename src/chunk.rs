//! Chunker: walk a working tree and chunk every eligible file.
//!
//! [`TreeChunker::events`] returns a lazy iterator of [`ChunkEvent`]s.
//! Files are visited in file-name order, so walking an unmodified tree
//! twice yields the same sequence; calling `events()` again restarts the
//! walk.
//!
//! | Check | Outcome |
//! |-------|---------|
//! | under `.git`, `node_modules`, `target`, … or an exclude glob | ignored |
//! | extension not in the allowlist | ignored |
//! | larger than `max_file_size_kb` | [`SkipReason::TooLarge`] |
//! | binary extension or NUL byte in the first 8000 bytes | [`SkipReason::Binary`] |
//! | read error | [`SkipReason::Unreadable`] |
//! | whitespace only | [`SkipReason::Empty`] |
//!
//! Text is decoded as UTF-8, falling back to Latin-1, which maps every
//! byte and therefore never fails. Chunking itself is
//! [`scout_core::chunk::chunk_file`].

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use scout_core::chunk::{chunk_file, ChunkParams};
use scout_core::models::Chunk;
use scout_core::{ScoutError, ScoutResult};
use serde::Serialize;
use walkdir::{DirEntry, WalkDir};

use crate::acquire::{WorkingTree, MARKER_FILE};
use crate::config::ChunkingConfig;

const BINARY_SNIFF_BYTES: usize = 8000;

pub(crate) const SKIP_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "__pycache__",
    ".venv",
    "venv",
    "dist",
    "build",
    ".next",
    "target",
];

const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "pdf", "zip", "gz", "tgz", "bz2", "xz",
    "7z", "rar", "jar", "war", "class", "exe", "dll", "so", "dylib", "a", "o", "obj", "wasm",
    "bin", "dat", "db", "sqlite", "woff", "woff2", "ttf", "otf", "eot", "mp3", "mp4", "mov",
    "avi", "pyc", "pyo",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    TooLarge,
    Binary,
    Empty,
    Unreadable,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::TooLarge => "too_large",
            SkipReason::Binary => "binary",
            SkipReason::Empty => "empty",
            SkipReason::Unreadable => "unreadable",
        }
    }
}

/// A file left out of the index, with why.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedFile {
    pub path: String,
    pub reason: SkipReason,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChunkEvent {
    Chunk(Chunk),
    Skipped(SkippedFile),
}

#[derive(Debug, Clone)]
pub struct ChunkerOptions {
    pub params: ChunkParams,
    pub max_file_bytes: u64,
    /// Lower-case extensions without the dot; empty admits every file.
    pub include_extensions: Vec<String>,
    pub exclude_globs: Vec<String>,
}

impl ChunkerOptions {
    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self {
            params: config.params(),
            max_file_bytes: config.max_file_size_kb * 1024,
            include_extensions: config
                .include_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            exclude_globs: config.exclude_globs.clone(),
        }
    }
}

pub struct TreeChunker {
    root: PathBuf,
    repo_id: String,
    options: ChunkerOptions,
    excludes: GlobSet,
}

impl TreeChunker {
    pub fn new(tree: &WorkingTree, options: ChunkerOptions) -> ScoutResult<Self> {
        let mut patterns: Vec<String> = SKIP_DIRS
            .iter()
            .flat_map(|d| [format!("**/{d}"), format!("**/{d}/**")])
            .collect();
        patterns.push(MARKER_FILE.to_string());
        patterns.extend(options.exclude_globs.iter().cloned());
        let excludes = build_globset(&patterns)?;

        Ok(Self {
            root: tree.path.clone(),
            repo_id: tree.repo_id.clone(),
            options,
            excludes,
        })
    }

    /// Start a fresh walk of the tree.
    pub fn events(&self) -> ChunkEvents<'_> {
        let root = self.root.clone();
        let excludes = self.excludes.clone();
        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |e| {
                e.depth() == 0 || !excludes.is_match(relative_path(&root, e.path()))
            });
        ChunkEvents {
            chunker: self,
            walker: Box::new(walker),
            pending: VecDeque::new(),
        }
    }

    fn admits_extension(&self, rel: &str) -> bool {
        if self.options.include_extensions.is_empty() {
            return true;
        }
        match extension_of(rel) {
            Some(ext) => self.options.include_extensions.iter().any(|e| *e == ext),
            None => false,
        }
    }

    fn visit_file(&self, entry: &DirEntry, rel: String) -> Vec<ChunkEvent> {
        let skipped = |reason: SkipReason, detail: String| {
            vec![ChunkEvent::Skipped(SkippedFile {
                path: rel.clone(),
                reason,
                detail,
            })]
        };

        let size = match entry.metadata() {
            Ok(meta) => meta.len(),
            Err(e) => return skipped(SkipReason::Unreadable, e.to_string()),
        };
        if size > self.options.max_file_bytes {
            return skipped(
                SkipReason::TooLarge,
                format!("{size} bytes exceeds {} byte limit", self.options.max_file_bytes),
            );
        }
        if extension_of(&rel).is_some_and(|ext| BINARY_EXTENSIONS.contains(&ext.as_str())) {
            return skipped(SkipReason::Binary, "binary extension".to_string());
        }

        let bytes = match std::fs::read(entry.path()) {
            Ok(b) => b,
            Err(e) => return skipped(SkipReason::Unreadable, e.to_string()),
        };
        if bytes.iter().take(BINARY_SNIFF_BYTES).any(|b| *b == 0) {
            return skipped(SkipReason::Binary, "NUL byte in content".to_string());
        }

        let text = decode_text(bytes);
        let chunks = chunk_file(&self.repo_id, &rel, &text, &self.options.params);
        if chunks.is_empty() {
            return skipped(SkipReason::Empty, "no non-whitespace content".to_string());
        }
        chunks.into_iter().map(ChunkEvent::Chunk).collect()
    }
}

/// Lazy, finite walk over one working tree.
pub struct ChunkEvents<'a> {
    chunker: &'a TreeChunker,
    walker: Box<dyn Iterator<Item = walkdir::Result<DirEntry>> + 'a>,
    pending: VecDeque<ChunkEvent>,
}

impl Iterator for ChunkEvents<'_> {
    type Item = ChunkEvent;

    fn next(&mut self) -> Option<ChunkEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e
                        .path()
                        .map(|p| relative_path(&self.chunker.root, p))
                        .unwrap_or_default();
                    return Some(ChunkEvent::Skipped(SkippedFile {
                        path,
                        reason: SkipReason::Unreadable,
                        detail: e.to_string(),
                    }));
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = relative_path(&self.chunker.root, entry.path());
            if !self.chunker.admits_extension(&rel) {
                continue;
            }
            self.pending.extend(self.chunker.visit_file(&entry, rel));
        }
    }
}

/// `/`-separated path of `path` relative to `root`.
fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn extension_of(rel: &str) -> Option<String> {
    let name = rel.rsplit('/').next().unwrap_or(rel);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => Some(ext.to_ascii_lowercase()),
        _ => None,
    }
}

/// UTF-8 when valid, otherwise Latin-1.
fn decode_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
    }
}

fn build_globset(patterns: &[String]) -> ScoutResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| ScoutError::Chunking {
            path: pattern.clone(),
            message: format!("invalid exclude glob: {e}"),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| ScoutError::Chunking {
        path: String::new(),
        message: format!("invalid exclude globs: {e}"),
    })
}
