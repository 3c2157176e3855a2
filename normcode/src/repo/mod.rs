//! Plan repositories: concepts and inferences loaded once from the
//! external plan artifact, immutable for the lifetime of a run.

mod concept;
mod error;
mod flow_index;
mod inference;
mod repos;

pub use concept::{Concept, TypeTag};
pub use error::{RepoError, Result};
pub use flow_index::FlowIndex;
pub use inference::{Inference, Sequence};
pub use repos::{ConceptRepo, InferenceRepo};
