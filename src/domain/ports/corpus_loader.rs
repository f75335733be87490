//! Corpus Loader Port
//!
//! Defines how the data manager obtains parsed, validated records.
//! Implementations may read from the filesystem, a bundle, or memory.

use crate::domain::entities::{Component, Guideline, Token};
use crate::error::ServiceError;
use async_trait::async_trait;
use std::path::Path;

/// A record that failed parsing or validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordError {
    /// Where the record came from, e.g. `tokens/colors.json[2]`
    pub location: String,
    pub message: String,
}

impl RecordError {
    pub fn new(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

/// Everything one pass over the data source produced.
#[derive(Debug, Clone, Default)]
pub struct LoadOutcome {
    pub tokens: Vec<Token>,
    pub components: Vec<Component>,
    pub guidelines: Vec<Guideline>,
    /// Per-record failures; a non-empty list means the dataset is unusable
    pub errors: Vec<RecordError>,
}

impl LoadOutcome {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Outbound port for reading the corpus.
///
/// Returns `Err` only when the source itself is unreachable (missing
/// directory, permission denied). Bad records go into [`LoadOutcome::errors`].
#[async_trait]
pub trait CorpusLoader: Send + Sync {
    async fn load(&self, source: &Path) -> Result<LoadOutcome, ServiceError>;
}
