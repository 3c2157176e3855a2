//! Plan-loading failure kinds.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("failed to read plan file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path} as JSON: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown concept: {0}")]
    UnknownConcept(String),

    #[error("unknown inference: {0}")]
    UnknownInference(String),

    #[error("duplicate flow_index in inference_repo: {0}")]
    DuplicateFlowIndex(String),

    #[error("duplicate concept_name in concept_repo: {0}")]
    DuplicateConcept(String),
}

pub type Result<T> = std::result::Result<T, RepoError>;
