//! Error handling for CTD processing operations.
//!
//! Provides error types with enough context (dataset, variable, path) to
//! report a failed dataset and move on to the next one.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CtdError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("Manifest error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Directory traversal error: {0}")]
    DirectoryTraversal(#[from] walkdir::Error),

    #[error("Dataset not found at path: {path}")]
    DatasetNotFound { path: PathBuf },

    #[error("Profile ID already exists in dataset {dataset} (field '{field}')")]
    ProfileIdExists { dataset: String, field: String },

    #[error("Dataset {dataset} has no variable '{variable}'")]
    MissingVariable { dataset: String, variable: String },

    #[error("Dataset {dataset} has no dimension '{dimension}'")]
    MissingDimension { dataset: String, dimension: String },

    #[error(
        "Length mismatch in dataset {dataset}: variable '{variable}' has {found} values, dimension expects {expected}"
    )]
    LengthMismatch {
        dataset: String,
        variable: String,
        expected: usize,
        found: usize,
    },

    #[error("Invalid variable '{variable}' in dataset {dataset}: {reason}")]
    InvalidVariable {
        dataset: String,
        variable: String,
        reason: String,
    },

    #[error(
        "Ragged arrays cannot be co-indexed in dataset {dataset}: profile {profile} has {depth_rows} depth and {press_rows} pressure samples"
    )]
    RaggedMismatch {
        dataset: String,
        profile: usize,
        depth_rows: usize,
        press_rows: usize,
    },

    #[error("Cannot parse timestamp '{value}' in dataset {dataset}: {reason}")]
    TimestampParse {
        dataset: String,
        value: String,
        reason: String,
    },

    #[error("Unknown timezone: {name}")]
    UnknownTimezone { name: String },

    #[error("No free profile ID found after {attempts} attempts")]
    IdSpaceExhausted { attempts: u64 },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl CtdError {
    /// Errors that abort the remaining datasets of a source instead of just one dataset
    pub fn is_source_fatal(&self) -> bool {
        matches!(self, CtdError::ProfileIdExists { .. })
    }

    pub(crate) fn missing_variable(dataset: &str, variable: &str) -> Self {
        CtdError::MissingVariable {
            dataset: dataset.to_string(),
            variable: variable.to_string(),
        }
    }

    pub(crate) fn invalid_variable(
        dataset: &str,
        variable: &str,
        reason: impl Into<String>,
    ) -> Self {
        CtdError::InvalidVariable {
            dataset: dataset.to_string(),
            variable: variable.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CtdError>;
