//! Error taxonomy shared by every pipeline stage.
//!
//! Every failure that can reach a caller maps to one [`ScoutError`]
//! variant, and every variant maps to a stable, machine-readable
//! [`kind`](ScoutError::kind) string:
//!
//! | Variant | `error_kind` |
//! |---------|--------------|
//! | [`Acquisition`](ScoutError::Acquisition) | `acquisition_error` |
//! | [`Chunking`](ScoutError::Chunking) | `chunking_error` |
//! | [`Embedding`](ScoutError::Embedding) | `embedding_error` |
//! | [`Store`](ScoutError::Store) | `store_error` |
//! | [`NotFound`](ScoutError::NotFound) | `not_found` |
//! | [`Timeout`](ScoutError::Timeout) | `timeout` |
//! | [`InvalidRequest`](ScoutError::InvalidRequest) | `invalid_request` |
//!
//! The type is `Clone` so that a single build outcome can be handed to
//! every caller waiting on the same repository.

use std::fmt;

use serde::Serialize;

/// Why a repository could not be acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionFailure {
    Unreachable,
    Authentication,
    DiskSpace,
    Timeout,
    InvalidReference,
    Other,
}

impl AcquisitionFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcquisitionFailure::Unreachable => "unreachable",
            AcquisitionFailure::Authentication => "authentication",
            AcquisitionFailure::DiskSpace => "disk_space",
            AcquisitionFailure::Timeout => "timeout",
            AcquisitionFailure::InvalidReference => "invalid_reference",
            AcquisitionFailure::Other => "other",
        }
    }
}

impl fmt::Display for AcquisitionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoutError {
    #[error("acquisition failed ({reason}): {message}")]
    Acquisition {
        reason: AcquisitionFailure,
        message: String,
    },

    #[error("chunking failed for {path}: {message}")]
    Chunking { path: String, message: String },

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("index store failure: {0}")]
    Store(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ScoutError {
    pub fn acquisition(reason: AcquisitionFailure, message: impl Into<String>) -> Self {
        ScoutError::Acquisition {
            reason,
            message: message.into(),
        }
    }

    /// Stable identifier surfaced to callers as `error_kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            ScoutError::Acquisition { .. } => "acquisition_error",
            ScoutError::Chunking { .. } => "chunking_error",
            ScoutError::Embedding(_) => "embedding_error",
            ScoutError::Store(_) => "store_error",
            ScoutError::NotFound(_) => "not_found",
            ScoutError::Timeout(_) => "timeout",
            ScoutError::InvalidRequest(_) => "invalid_request",
        }
    }
}

pub type ScoutResult<T> = Result<T, ScoutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        let cases = [
            (
                ScoutError::acquisition(AcquisitionFailure::Timeout, "slow"),
                "acquisition_error",
            ),
            (
                ScoutError::Chunking {
                    path: "a.py".into(),
                    message: "bad".into(),
                },
                "chunking_error",
            ),
            (ScoutError::Embedding("x".into()), "embedding_error"),
            (ScoutError::Store("x".into()), "store_error"),
            (ScoutError::NotFound("x".into()), "not_found"),
            (ScoutError::Timeout("x".into()), "timeout"),
            (ScoutError::InvalidRequest("x".into()), "invalid_request"),
        ];
        for (err, kind) in cases {
            assert_eq!(err.kind(), kind);
        }
    }

    #[test]
    fn acquisition_message_names_reason() {
        let err = ScoutError::acquisition(AcquisitionFailure::Authentication, "denied");
        assert_eq!(
            err.to_string(),
            "acquisition failed (authentication): denied"
        );
    }
}
