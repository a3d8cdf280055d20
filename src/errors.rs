use std::io;

use thiserror::Error;

use crate::types::DatasetId;

/// Error type for configuration, dataset, and collaborator failures.
#[derive(Debug, Error)]
pub enum TuneError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error(
        "negative sampling needs at least two distinct answers, found {distinct} among {records} records"
    )]
    DegenerateAnswers { records: usize, distinct: usize },
    #[error("dataset '{source_id}' is unavailable: {reason}")]
    SourceUnavailable { source_id: DatasetId, reason: String },
    #[error("invalid record at {origin} row {row}: {reason}")]
    InvalidRecord {
        origin: String,
        row: usize,
        reason: String,
    },
    #[error("tokenizer failure: {0}")]
    Tokenizer(String),
    #[error("trainer failure: {0}")]
    Trainer(String),
    #[error("evaluation failure: {0}")]
    Evaluation(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
