//! Repository identity and reference normalization.
//!
//! A [`RepoReference`] is the canonical form of whatever the caller typed:
//! a clone URL, a GitHub browse URL, an scp-style `git@host:owner/name`
//! reference, or a filesystem path. Normalization is pure and idempotent:
//! `parse(r.canonical()) == r` for every parsed `r`.
//!
//! ```text
//! https://GitHub.com/Owner/Repo.git/      ─┐
//! git@github.com:owner/repo.git            ├─▶ remote  https://github.com/owner/repo
//! ssh://git@github.com/owner/repo          ─┘
//! https://github.com/owner/repo/tree/dev   ──▶ remote  https://github.com/owner/repo  (branch "dev")
//! /srv/code/./app/                         ──▶ local   /srv/code/app
//! ```
//!
//! The [`repo_id`](RepoReference::repo_id) derived from the canonical form
//! names both the working-tree directory and the stored index, so a tree
//! refresh and an index rebuild always refer to the same repository.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{AcquisitionFailure, ScoutError, ScoutResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoKind {
    Local,
    Remote,
}

impl RepoKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepoKind::Local => "local",
            RepoKind::Remote => "remote",
        }
    }
}

/// Normalized identity of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoReference {
    pub kind: RepoKind,
    /// Canonical location: `https://host/path` for remotes, a lexically
    /// normalized path for local trees.
    pub location: String,
    pub owner: Option<String>,
    pub name: Option<String>,
    /// Branch selected through a `/tree/<branch>` browse URL.
    pub branch: Option<String>,
}

impl RepoReference {
    /// Parse and normalize a user-supplied reference.
    ///
    /// Relative local paths are normalized lexically but not resolved
    /// against the working directory; callers that accept relative paths
    /// absolutize them first.
    pub fn parse(input: &str) -> ScoutResult<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ScoutError::InvalidRequest(
                "repository reference is empty".to_string(),
            ));
        }
        if is_remote(trimmed) {
            parse_remote(trimmed)
        } else {
            Ok(parse_local(trimmed))
        }
    }

    /// The string form that parses back to `self`.
    pub fn canonical(&self) -> String {
        match &self.branch {
            Some(branch) => format!("{}/tree/{}", self.location, branch),
            None => self.location.clone(),
        }
    }

    /// Stable storage key: `{slug}-{sha256(kind:canonical)[..12]}`.
    pub fn repo_id(&self) -> String {
        let slug = match (&self.owner, &self.name) {
            (Some(owner), Some(name)) => format!("{owner}_{name}"),
            (None, Some(name)) => name.clone(),
            _ => "root".to_string(),
        };
        let key = format!("{}:{}", self.kind.as_str(), self.canonical());
        format!("{}-{}", sanitize_slug(&slug), short_hash(&key))
    }

    pub fn is_remote(&self) -> bool {
        self.kind == RepoKind::Remote
    }
}

fn is_remote(input: &str) -> bool {
    const SCHEMES: [&str; 4] = ["http://", "https://", "ssh://", "git://"];
    let lower = input.to_ascii_lowercase();
    if SCHEMES.iter().any(|s| lower.starts_with(s)) {
        return true;
    }
    // scp-like syntax: user@host:path
    match (input.find('@'), input.find(':')) {
        (Some(at), Some(colon)) => at < colon && !input[..colon].contains('/'),
        _ => false,
    }
}

fn invalid(input: &str, why: &str) -> ScoutError {
    ScoutError::acquisition(
        AcquisitionFailure::InvalidReference,
        format!("cannot parse repository reference '{input}': {why}"),
    )
}

fn parse_remote(input: &str) -> ScoutResult<RepoReference> {
    let (host, path) = if let Some(idx) = input.find("://") {
        let scheme = input[..idx].to_ascii_lowercase();
        let rest = &input[idx + 3..];
        let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
        let host = authority.rsplit('@').next().unwrap_or(authority);
        let host = if scheme == "ssh" || scheme == "git" {
            host.split(':').next().unwrap_or(host)
        } else {
            host
        };
        (host.to_string(), path.to_string())
    } else {
        let after_user = input.split_once('@').map(|(_, r)| r).unwrap_or(input);
        let (host, path) = after_user
            .split_once(':')
            .ok_or_else(|| invalid(input, "missing ':' in scp-style reference"))?;
        (host.to_string(), path.to_string())
    };

    let path = path.split(['?', '#']).next().unwrap_or("");
    let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let mut branch = None;
    if segments.len() >= 4 && segments[2] == "tree" {
        branch = Some(segments[3..].join("/"));
        segments.truncate(2);
    }

    if let Some(last) = segments.last_mut() {
        let seg: &str = *last;
        if seg.len() > 4 && seg.to_ascii_lowercase().ends_with(".git") {
            *last = &seg[..seg.len() - 4];
        }
    }

    let host = host.to_lowercase();
    if host.is_empty() {
        return Err(invalid(input, "missing host"));
    }
    if segments.is_empty() {
        return Err(invalid(input, "missing repository path"));
    }

    let segments: Vec<String> = segments.iter().map(|s| s.to_lowercase()).collect();
    let location = format!("https://{}/{}", host, segments.join("/"));
    let name = segments.last().cloned();
    let owner = if segments.len() >= 2 {
        Some(segments[0].clone())
    } else {
        None
    };

    Ok(RepoReference {
        kind: RepoKind::Remote,
        location,
        owner,
        name,
        branch,
    })
}

fn parse_local(input: &str) -> RepoReference {
    let unified = input.replace('\\', "/");
    let absolute = unified.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in unified.split('/') {
        match part {
            "" | "." => {}
            ".." => match parts.last().copied() {
                Some(last) if last != ".." => {
                    parts.pop();
                }
                _ if absolute => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    let location = match (absolute, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    };
    let name = parts
        .last()
        .filter(|p| **p != "..")
        .map(|p| p.to_string());

    RepoReference {
        kind: RepoKind::Local,
        location,
        owner: None,
        name,
        branch: None,
    }
}

fn sanitize_slug(raw: &str) -> String {
    let slug: String = raw
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(48)
        .collect();
    if slug.is_empty() {
        "repo".to_string()
    } else {
        slug
    }
}

fn short_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_variants_share_identity() {
        let variants = [
            "https://github.com/Owner/Repo",
            "https://github.com/owner/repo.git",
            "https://github.com/owner/repo/",
            "HTTPS://GITHUB.COM/owner/repo.git/",
            "git@github.com:owner/repo.git",
            "ssh://git@github.com/owner/repo",
            "http://github.com/owner/repo",
        ];
        let first = RepoReference::parse(variants[0]).unwrap();
        assert_eq!(first.location, "https://github.com/owner/repo");
        assert_eq!(first.owner.as_deref(), Some("owner"));
        assert_eq!(first.name.as_deref(), Some("repo"));
        for v in &variants[1..] {
            let r = RepoReference::parse(v).unwrap();
            assert_eq!(r, first, "variant {v}");
            assert_eq!(r.repo_id(), first.repo_id());
        }
    }

    #[test]
    fn browse_url_carries_branch() {
        let r = RepoReference::parse("https://github.com/owner/repo/tree/feature/x").unwrap();
        assert_eq!(r.location, "https://github.com/owner/repo");
        assert_eq!(r.branch.as_deref(), Some("feature/x"));
        let plain = RepoReference::parse("https://github.com/owner/repo").unwrap();
        assert_ne!(r.repo_id(), plain.repo_id());
    }

    #[test]
    fn normalization_is_idempotent() {
        let inputs = [
            "https://github.com/Owner/Repo.git",
            "git@gitlab.com:group/project.git",
            "https://github.com/owner/repo/tree/main",
            "/srv/code/./app/../app/",
            "relative/dir/",
            "../up/one",
        ];
        for input in inputs {
            let once = RepoReference::parse(input).unwrap();
            let twice = RepoReference::parse(&once.canonical()).unwrap();
            assert_eq!(once, twice, "input {input}");
        }
    }

    #[test]
    fn local_paths_normalize_lexically() {
        let r = RepoReference::parse("/srv/code/./app/../app/").unwrap();
        assert_eq!(r.kind, RepoKind::Local);
        assert_eq!(r.location, "/srv/code/app");
        assert_eq!(r.name.as_deref(), Some("app"));
        assert!(r.owner.is_none());
    }

    #[test]
    fn local_paths_keep_case() {
        let a = RepoReference::parse("/srv/App").unwrap();
        let b = RepoReference::parse("/srv/app").unwrap();
        assert_ne!(a.repo_id(), b.repo_id());
    }

    #[test]
    fn repo_id_is_slug_plus_hash() {
        let r = RepoReference::parse("https://github.com/rust-lang/cargo").unwrap();
        let id = r.repo_id();
        assert!(id.starts_with("rust-lang_cargo-"), "{id}");
        assert_eq!(id.len(), "rust-lang_cargo-".len() + 12);
    }

    #[test]
    fn empty_reference_is_invalid_request() {
        let err = RepoReference::parse("   ").unwrap_err();
        assert_eq!(err.kind(), "invalid_request");
    }

    #[test]
    fn remote_without_path_is_invalid_reference() {
        let err = RepoReference::parse("https://github.com/").unwrap_err();
        match err {
            ScoutError::Acquisition { reason, .. } => {
                assert_eq!(reason, AcquisitionFailure::InvalidReference)
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
