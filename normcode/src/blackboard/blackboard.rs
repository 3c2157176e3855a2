//! Per-run authoritative state: concept/inference status and values.
//!
//! Owned exclusively by the Orchestrator — no internal locking. Sequence
//! handlers receive a read-only view (via `&Blackboard`) and return output
//! buffers the Orchestrator applies, mirroring how `StateManager` owns
//! `TaskStore` exclusively rather than sharing it behind a mutex.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::reference::{Reference, TruthMask};
use crate::repo::FlowIndex;

use super::error::{BlackboardError, Result};
use super::union_find::UnionFind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConceptStatus {
    Empty,
    Pending,
    InProgress,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceStatus {
    Pending,
    InProgress,
    Complete,
    Skipped,
    /// A handler returned a fatal error for this inference. Downstream
    /// consumers of its `concept_to_infer` stay `pending` forever, which is
    /// exactly how the run reaches `stuck` per spec §7.
    Failed,
}

/// One timing inference's verdict, keyed by the timing inference's own
/// `flow_index` (not the parent it gates) so multiple timing children of
/// the same parent don't clobber each other; the Orchestrator aggregates
/// across a parent's timing children when computing its readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingGate {
    pub ready: bool,
    pub to_be_skipped: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionDetail {
    Success,
    ConditionNotMet,
    Skipped,
    Error(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Blackboard {
    concept_status: HashMap<String, ConceptStatus>,
    concept_reference: HashMap<String, Reference>,
    inference_status: HashMap<FlowIndex, InferenceStatus>,
    completion_detail: HashMap<FlowIndex, CompletionDetail>,
    truth_masks: HashMap<String, TruthMask>,
    alias_chain: UnionFind,
    timing_gates: HashMap<FlowIndex, TimingGate>,
}

impl Blackboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical name for `name` after following the alias chain.
    pub fn resolve(&mut self, name: &str) -> String {
        self.alias_chain.find(name)
    }

    /// Register an alias: `secondary` now resolves to the same canonical
    /// concept as `primary`.
    pub fn add_alias(&mut self, primary: &str, secondary: &str) {
        self.alias_chain.union(primary, secondary);
    }

    pub fn status_of_concept(&mut self, name: &str) -> ConceptStatus {
        let canonical = self.resolve(name);
        self.concept_status.get(&canonical).copied().unwrap_or(ConceptStatus::Empty)
    }

    pub fn status_of_inference(&self, flow_index: &FlowIndex) -> InferenceStatus {
        self.inference_status.get(flow_index).copied().unwrap_or(InferenceStatus::Pending)
    }

    pub fn completion_detail_of(&self, flow_index: &FlowIndex) -> Option<&CompletionDetail> {
        self.completion_detail.get(flow_index)
    }

    pub fn value_of_concept(&mut self, name: &str) -> Result<Reference> {
        let canonical = self.resolve(name);
        if self.concept_status.get(&canonical).copied().unwrap_or(ConceptStatus::Empty) != ConceptStatus::Complete {
            return Err(BlackboardError::NotComplete(name.to_string()));
        }
        self.concept_reference
            .get(&canonical)
            .cloned()
            .ok_or_else(|| BlackboardError::NotComplete(name.to_string()))
    }

    /// Atomically set a concept's value and transition it to `complete`.
    pub fn set_concept_value(&mut self, name: &str, reference: Reference) {
        let canonical = self.resolve(name);
        self.concept_reference.insert(canonical.clone(), reference);
        self.concept_status.insert(canonical, ConceptStatus::Complete);
    }

    /// Seed a concept as `pending` without a value, e.g. at run init for
    /// every non-ground concept.
    pub fn mark_pending(&mut self, name: &str) {
        let canonical = self.resolve(name);
        self.concept_status.entry(canonical).or_insert(ConceptStatus::Pending);
    }

    pub fn set_inference_started(&mut self, flow_index: &FlowIndex) {
        self.inference_status.insert(flow_index.clone(), InferenceStatus::InProgress);
    }

    pub fn set_inference_complete(&mut self, flow_index: &FlowIndex, detail: CompletionDetail) {
        self.inference_status.insert(flow_index.clone(), InferenceStatus::Complete);
        self.completion_detail.insert(flow_index.clone(), detail);
    }

    pub fn set_inference_skipped(&mut self, flow_index: &FlowIndex) {
        self.inference_status.insert(flow_index.clone(), InferenceStatus::Skipped);
        self.completion_detail.insert(flow_index.clone(), CompletionDetail::Skipped);
    }

    pub fn set_inference_failed(&mut self, flow_index: &FlowIndex, message: String) {
        self.inference_status.insert(flow_index.clone(), InferenceStatus::Failed);
        self.completion_detail.insert(flow_index.clone(), CompletionDetail::Error(message));
    }

    /// Revert a mid-iteration looping inference back to `pending` so the
    /// next waitlist scan dispatches it again.
    pub fn set_inference_pending(&mut self, flow_index: &FlowIndex) {
        self.inference_status.insert(flow_index.clone(), InferenceStatus::Pending);
    }

    /// Record one timing inference's ready/skip verdict, keyed by its own
    /// `flow_index`. The Orchestrator aggregates over a parent's timing
    /// children (AND on ready, OR on to_be_skipped) to decide readiness.
    pub fn set_timing_gate(&mut self, timing_flow_index: &FlowIndex, ready: bool, to_be_skipped: bool) {
        self.timing_gates.insert(timing_flow_index.clone(), TimingGate { ready, to_be_skipped });
    }

    pub fn timing_gate(&self, timing_flow_index: &FlowIndex) -> Option<TimingGate> {
        self.timing_gates.get(timing_flow_index).copied()
    }

    pub fn set_truth_mask(&mut self, concept: &str, mask: TruthMask) {
        let canonical = self.resolve(concept);
        self.truth_masks.insert(canonical, mask);
    }

    pub fn get_truth_mask(&mut self, concept: &str) -> Result<&TruthMask> {
        let canonical = self.resolve(concept);
        self.truth_masks
            .get(&canonical)
            .ok_or_else(|| BlackboardError::NoTruthMask(concept.to_string()))
    }
}
