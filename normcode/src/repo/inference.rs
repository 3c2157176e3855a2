//! Inference definitions, as loaded from `inference_repo.json`.

use serde::{Deserialize, Serialize};

use super::flow_index::FlowIndex;

/// Which handler pipeline realizes an inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sequence {
    Grouping,
    Assigning,
    Timing,
    Looping,
    Imperative,
    Judgement,
    Simple,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FlowInfo {
    flow_index: String,
}

/// A single scheduled step that produces one concept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inference {
    #[serde(rename = "flow_info")]
    flow_info: FlowInfo,
    #[serde(rename = "inference_sequence")]
    pub sequence: Sequence,
    pub concept_to_infer: String,
    pub function_concept: String,
    #[serde(default)]
    pub value_concepts: Vec<String>,
    #[serde(default)]
    pub context_concepts: Vec<String>,
    #[serde(default)]
    pub working_interpretation: serde_json::Value,
}

impl Inference {
    pub fn flow_index(&self) -> FlowIndex {
        FlowIndex::new(self.flow_info.flow_index.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_nested_flow_info() {
        let json = serde_json::json!({
            "flow_info": { "flow_index": "1.2.3" },
            "inference_sequence": "imperative",
            "concept_to_infer": "out",
            "function_concept": "fn",
            "value_concepts": ["a", "b"],
            "context_concepts": [],
            "working_interpretation": { "paradigm_id": "p1" },
        });
        let inf: Inference = serde_json::from_value(json).unwrap();
        assert_eq!(inf.flow_index(), FlowIndex::new("1.2.3"));
        assert_eq!(inf.sequence, Sequence::Imperative);
        assert_eq!(inf.value_concepts, vec!["a", "b"]);
    }

    #[test]
    fn missing_working_interpretation_defaults_to_null() {
        let json = serde_json::json!({
            "flow_info": { "flow_index": "1" },
            "inference_sequence": "simple",
            "concept_to_infer": "out",
            "function_concept": "fn",
        });
        let inf: Inference = serde_json::from_value(json).unwrap();
        assert!(inf.working_interpretation.is_null());
        assert!(inf.value_concepts.is_empty());
    }
}
