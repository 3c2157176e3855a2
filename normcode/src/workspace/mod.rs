//! Per-run scratchpad for loop iteration state and timing-injected
//! filters. Free-form, keyed by string, initialized empty, checkpointed
//! alongside the Blackboard.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::reference::{Reference, TruthMask};

/// One loop iteration's recorded concept values.
pub type IterationSlot = HashMap<String, Reference>;

/// A timing handler's filter injection for a parent inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub truth_mask: TruthMask,
    pub condition_name: String,
    pub source_flow_index: String,
    /// Axis the mask is aligned to when `truth_mask` is `PerCell`, passed
    /// straight through to `ops::apply_truth_mask`.
    pub filter_axis: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workspace {
    /// `"{loop_index}_{loop_base_concept}" -> { iteration_ordinal ->
    /// { concept_name -> Reference } }`.
    loops: HashMap<String, HashMap<u64, IterationSlot>>,
    /// `"__filter__{flow_index}" -> list<FilterSpec>`.
    filters: HashMap<String, Vec<FilterSpec>>,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loop_key(loop_index: &str, loop_base_concept: &str) -> String {
        format!("{loop_index}_{loop_base_concept}")
    }

    pub fn filter_key(flow_index: &str) -> String {
        format!("__filter__{flow_index}")
    }

    /// All iteration slots recorded so far for a loop, keyed by ordinal.
    pub fn loop_slots(&self, loop_key: &str) -> Option<&HashMap<u64, IterationSlot>> {
        self.loops.get(loop_key)
    }

    pub fn loop_slots_mut(&mut self, loop_key: &str) -> &mut HashMap<u64, IterationSlot> {
        self.loops.entry(loop_key.to_string()).or_default()
    }

    /// Record (or overwrite) a concept value for one loop iteration.
    /// Slots are only ever added within a run — iteration ordinals already
    /// recorded are never removed.
    pub fn set_iteration_value(&mut self, loop_key: &str, ordinal: u64, concept: &str, reference: Reference) {
        self.loop_slots_mut(loop_key)
            .entry(ordinal)
            .or_default()
            .insert(concept.to_string(), reference);
    }

    pub fn iteration_value(&self, loop_key: &str, ordinal: u64, concept: &str) -> Option<&Reference> {
        self.loops.get(loop_key)?.get(&ordinal)?.get(concept)
    }

    pub fn loop_progress_count(&self, loop_key: &str) -> usize {
        self.loops.get(loop_key).map(|slots| slots.len()).unwrap_or(0)
    }

    /// Append a timing-injected filter for `flow_index`. Multiple filters
    /// accumulated at the same key are combined with AND semantics by the
    /// consuming IR step.
    pub fn push_filter(&mut self, flow_index: &str, filter: FilterSpec) {
        self.filters.entry(Self::filter_key(flow_index)).or_default().push(filter);
    }

    pub fn filters_for(&self, flow_index: &str) -> &[FilterSpec] {
        self.filters
            .get(&Self::filter_key(flow_index))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn clear_filters(&mut self, flow_index: &str) {
        self.filters.remove(&Self::filter_key(flow_index));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::Scalar;

    #[test]
    fn loop_key_matches_documented_format() {
        assert_eq!(Workspace::loop_key("1.2", "docs"), "1.2_docs");
    }

    #[test]
    fn iteration_slots_accumulate_without_removal() {
        let mut ws = Workspace::new();
        let key = Workspace::loop_key("1", "docs");
        ws.set_iteration_value(&key, 0, "elem", Reference::scalar(Scalar::Int(1)));
        ws.set_iteration_value(&key, 1, "elem", Reference::scalar(Scalar::Int(2)));
        assert_eq!(ws.loop_progress_count(&key), 2);
        assert_eq!(
            ws.iteration_value(&key, 0, "elem").unwrap(),
            &Reference::scalar(Scalar::Int(1))
        );
    }

    #[test]
    fn filters_accumulate_at_same_key() {
        let mut ws = Workspace::new();
        ws.push_filter(
            "1.1",
            FilterSpec {
                truth_mask: TruthMask::Global(true),
                condition_name: "cond".into(),
                source_flow_index: "1.1".into(),
                filter_axis: "item".into(),
            },
        );
        ws.push_filter(
            "1.1",
            FilterSpec {
                truth_mask: TruthMask::Global(false),
                condition_name: "cond2".into(),
                source_flow_index: "1.2".into(),
                filter_axis: "item".into(),
            },
        );
        assert_eq!(ws.filters_for("1.1").len(), 2);
        assert!(ws.filters_for("1.2").is_empty());
    }
}
