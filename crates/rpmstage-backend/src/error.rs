use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("repository '{repo_id}' unavailable: {reason}")]
    RepoUnavailable { repo_id: String, reason: String },

    #[error("download failed for {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("package file vanished at {}: {reason}", path.display())]
    PackageVanished { path: PathBuf, reason: String },

    #[error("checksum mismatch for {}: expected {expected}, got {actual}", path.display())]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("no such repository: {repo_id}")]
    MissingRepo { repo_id: String },

    #[error("transaction check found {} problem(s)", problems.len())]
    DepCheck { problems: Vec<String> },

    #[error("package sack error: {reason}")]
    Sack { reason: String },

    #[error("rpm transaction failed with {} error(s)", errors.len())]
    Transaction { errors: Vec<String> },

    #[error("backend failed with {} error(s)", errors.len())]
    Backend { errors: Vec<String> },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl BackendError {
    pub fn backend_from(err: &anyhow::Error) -> Self {
        Self::Backend {
            errors: err.chain().map(|cause| cause.to_string()).collect(),
        }
    }
}
