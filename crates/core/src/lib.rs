//! Shared types and backend contracts for rusty-curator.

pub mod backend;
pub mod manifest;
pub mod protocol;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CuratorError {
    #[error("asset '{0}' already has an operation in flight")]
    Busy(String),
    #[error("asset '{0}' is not in the catalog")]
    UnknownAsset(String),
    #[error("cannot derive owner/name from repository url '{0}'")]
    InvalidRepoUrl(String),
    #[error("no release artifact of {repo} matched '{extension}'")]
    NoMatchingArtifact { repo: String, extension: String },
    #[error("invalid artifact pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("operation on '{0}' timed out")]
    TimedOut(String),
    #[error("catalog error: {0}")]
    Catalog(String),
}
