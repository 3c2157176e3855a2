//! The engine-wide error taxonomy. Each variant's scope and propagation
//! policy (fatal for the run / fatal for one inference / logged and
//! retried) is documented alongside it; the Orchestrator is what actually
//! enforces the policy when a handler returns one of these.

use thiserror::Error;

use crate::blackboard::BlackboardError;
use crate::reference::RefError;
use crate::repo::RepoError;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Fatal at load: the run never starts.
    #[error("plan validation failed: {0}")]
    PlanValidation(#[from] RepoError),

    /// Fatal for the one inference that referenced it; downstream
    /// consumers stall.
    #[error(transparent)]
    Blackboard(#[from] BlackboardError),

    /// Fatal for the one inference performing the tensor operation.
    #[error(transparent)]
    Reference(#[from] RefError),

    /// Raised to the caller from a `BodyInterface` call. The engine
    /// retries once only if the inference's working interpretation marks
    /// it `retriable`; otherwise fatal for that inference.
    #[error("body call failed: {0}")]
    BodyError(String),

    /// No waitlist progress for `cycles` consecutive scans; the run ends
    /// `stuck`.
    #[error("no progress after {cycles} cycles")]
    TimingStuck { cycles: u64 },

    /// Persistence failure. Logged; the run continues if the next
    /// checkpoint write succeeds. Repeated failures are surfaced as
    /// fatal by the caller that observes them.
    #[error("checkpoint store error: {0}")]
    CheckpointIo(#[from] normstore::StoreError),

    /// A working_interpretation referenced a concept that does not exist
    /// in the loaded plan.
    #[error("unknown condition concept: {0}")]
    UnknownCondition(String),

    /// Catch-all for malformed `working_interpretation` payloads a
    /// handler could not parse into its expected syntax shape.
    #[error("malformed working interpretation in {flow_index}: {detail}")]
    MalformedWorkingInterpretation { flow_index: String, detail: String },
}

pub type Result<T> = std::result::Result<T, EngineError>;
