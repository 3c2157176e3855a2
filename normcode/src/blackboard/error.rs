//! Blackboard query/mutation failure kinds.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlackboardError {
    #[error("concept '{0}' is not complete")]
    NotComplete(String),

    #[error("unknown concept: {0}")]
    UnknownConcept(String),

    #[error("unknown inference: {0}")]
    UnknownInference(String),

    #[error("no truth mask recorded for concept: {0}")]
    NoTruthMask(String),
}

pub type Result<T> = std::result::Result<T, BlackboardError>;
