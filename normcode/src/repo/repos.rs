//! Immutable, load-once repositories over the plan artifact.

use std::collections::HashMap;
use std::path::Path;

use super::concept::Concept;
use super::error::{RepoError, Result};
use super::flow_index::FlowIndex;
use super::inference::Inference;

/// Read-only view over `concept_repo.json`, loaded once at run start.
#[derive(Debug, Clone)]
pub struct ConceptRepo {
    by_name: HashMap<String, Concept>,
}

impl ConceptRepo {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| RepoError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw, &path.display().to_string())
    }

    pub fn from_json_str(raw: &str, path_for_errors: &str) -> Result<Self> {
        let concepts: Vec<Concept> = serde_json::from_str(raw).map_err(|source| RepoError::Json {
            path: path_for_errors.to_string(),
            source,
        })?;
        let mut by_name = HashMap::with_capacity(concepts.len());
        for concept in concepts {
            if by_name.insert(concept.concept_name.clone(), concept).is_some() {
                return Err(RepoError::DuplicateConcept(
                    by_name.keys().last().cloned().unwrap_or_default(),
                ));
            }
        }
        Ok(Self { by_name })
    }

    pub fn get_concept(&self, name: &str) -> Result<&Concept> {
        self.by_name
            .get(name)
            .ok_or_else(|| RepoError::UnknownConcept(name.to_string()))
    }

    pub fn all_concepts(&self) -> impl Iterator<Item = &Concept> {
        self.by_name.values()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// Read-only view over `inference_repo.json`, loaded once at run start.
#[derive(Debug, Clone)]
pub struct InferenceRepo {
    by_flow_index: HashMap<FlowIndex, Inference>,
    sorted: Vec<FlowIndex>,
}

impl InferenceRepo {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| RepoError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw, &path.display().to_string())
    }

    pub fn from_json_str(raw: &str, path_for_errors: &str) -> Result<Self> {
        let inferences: Vec<Inference> = serde_json::from_str(raw).map_err(|source| RepoError::Json {
            path: path_for_errors.to_string(),
            source,
        })?;
        let mut by_flow_index = HashMap::with_capacity(inferences.len());
        for inference in inferences {
            let flow_index = inference.flow_index();
            if by_flow_index.insert(flow_index.clone(), inference).is_some() {
                return Err(RepoError::DuplicateFlowIndex(flow_index.to_string()));
            }
        }
        let mut sorted: Vec<FlowIndex> = by_flow_index.keys().cloned().collect();
        sorted.sort();
        Ok(Self { by_flow_index, sorted })
    }

    pub fn get_inference(&self, flow_index: &FlowIndex) -> Result<&Inference> {
        self.by_flow_index
            .get(flow_index)
            .ok_or_else(|| RepoError::UnknownInference(flow_index.to_string()))
    }

    /// Every inference, ordered by flow_index with leaves before ancestors
    /// within a subtree (see [`FlowIndex`]'s `Ord` impl).
    pub fn all_inferences_sorted(&self) -> Vec<&Inference> {
        self.sorted.iter().map(|fi| &self.by_flow_index[fi]).collect()
    }

    /// Inferences whose flow_index is an immediate child of `parent`.
    pub fn children(&self, parent: &FlowIndex) -> Vec<&Inference> {
        self.sorted
            .iter()
            .filter(|fi| fi.parent().as_ref() == Some(parent))
            .map(|fi| &self.by_flow_index[fi])
            .collect()
    }

    pub fn parent(&self, flow_index: &FlowIndex) -> Option<&Inference> {
        flow_index.parent().and_then(|p| self.by_flow_index.get(&p))
    }

    /// Inferences anywhere in `flow_index`'s subtree with `sequence ==
    /// timing`, used for readiness gating.
    pub fn timing_children(&self, parent: &FlowIndex) -> Vec<&Inference> {
        self.children(parent)
            .into_iter()
            .filter(|inf| inf.sequence == super::inference::Sequence::Timing)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_flow_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_flow_index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_concepts() -> &'static str {
        r#"[
            {"concept_name": "a", "type": "{}", "is_ground_concept": true, "is_final_concept": false, "reference_axis_names": [], "reference_data": "1"},
            {"concept_name": "b", "type": "{}", "is_ground_concept": false, "is_final_concept": true}
        ]"#
    }

    fn sample_inferences() -> &'static str {
        r#"[
            {"flow_info": {"flow_index": "1"}, "inference_sequence": "simple", "concept_to_infer": "b", "function_concept": "f", "value_concepts": ["a"]},
            {"flow_info": {"flow_index": "1.1"}, "inference_sequence": "timing", "concept_to_infer": "gate", "function_concept": "t", "value_concepts": []}
        ]"#
    }

    #[test]
    fn loads_and_looks_up_concepts() {
        let repo = ConceptRepo::from_json_str(sample_concepts(), "test").unwrap();
        assert_eq!(repo.len(), 2);
        assert!(repo.get_concept("a").unwrap().is_ground());
        assert!(repo.get_concept("missing").is_err());
    }

    #[test]
    fn loads_and_sorts_inferences() {
        let repo = InferenceRepo::from_json_str(sample_inferences(), "test").unwrap();
        let sorted = repo.all_inferences_sorted();
        assert_eq!(sorted[0].flow_index(), FlowIndex::new("1.1"));
        assert_eq!(sorted[1].flow_index(), FlowIndex::new("1"));
    }

    #[test]
    fn derives_children_and_timing_children() {
        let repo = InferenceRepo::from_json_str(sample_inferences(), "test").unwrap();
        let children = repo.children(&FlowIndex::new("1"));
        assert_eq!(children.len(), 1);
        let timing = repo.timing_children(&FlowIndex::new("1"));
        assert_eq!(timing.len(), 1);
        assert_eq!(timing[0].concept_to_infer, "gate");
    }

    #[test]
    fn rejects_duplicate_flow_index() {
        let dup = r#"[
            {"flow_info": {"flow_index": "1"}, "inference_sequence": "simple", "concept_to_infer": "a", "function_concept": "f"},
            {"flow_info": {"flow_index": "1"}, "inference_sequence": "simple", "concept_to_infer": "b", "function_concept": "f"}
        ]"#;
        let err = InferenceRepo::from_json_str(dup, "test").unwrap_err();
        assert!(matches!(err, RepoError::DuplicateFlowIndex(_)));
    }
}
