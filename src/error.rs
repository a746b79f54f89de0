//! Error taxonomy for a deploy run.
//!
//! Every stage of the pipeline maps its failures onto one [`DeployError`] variant.
//! There is no partial success: the first error aborts the run and is reported
//! back to the build as a single line.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DeployError>;

#[derive(Debug, Error)]
pub enum DeployError {
    /// A required option is missing or has an unusable value.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A rule could not be evaluated (bad shape or bad pattern).
    #[error("Invalid include / exclude rule: {0}")]
    InvalidRule(String),

    /// Listing the candidate files failed.
    #[error("failed to discover files under {path}: {source}")]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading or writing an HTML/CSS file during URL rewriting failed.
    #[error("failed to rewrite {path}: {source}")]
    Rewrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A single object upload failed.
    #[error("failed to upload {path} to {destination}: {source}")]
    Transfer {
        path: PathBuf,
        destination: String,
        #[source]
        source: crate::storage::StorageError,
    },
}

impl DeployError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        DeployError::Configuration(msg.into())
    }

    pub fn invalid_rule(msg: impl Into<String>) -> Self {
        DeployError::InvalidRule(msg.into())
    }

    /// True for errors that stem from the options rather than from I/O.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DeployError::Configuration(_) | DeployError::InvalidRule(_)
        )
    }
}
