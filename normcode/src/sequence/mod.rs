//! Seven sequence handlers, dispatched by a `match` over `Sequence` rather
//! than a vtable — each sequence's named steps (IWI/IR/GR/AR/T/LR/MFP/MVP/
//! TVA/TIP/MIA/OR/OWI) collapse into ordinary function calls against a
//! shared `StepContext`.

mod assigning;
mod grouping;
mod imperative;
mod looping;
mod simple;
mod syntax;
mod timing;

pub use syntax::{
    AssigningMarker, AssigningSyntax, ByAxes, GroupingMarker, GroupingSyntax, ImperativeSyntax,
    LoopingSyntax, SelectorSpec, TimingMarker, TimingSyntax, ValueSelector,
};

use serde_json::Value;

use crate::blackboard::{Blackboard, CompletionDetail};
use crate::body::BodyInterface;
use crate::error::Result;
use crate::reference::{Cell, Reference, Scalar, TruthMask, NONE_AXIS};
use crate::repo::{ConceptRepo, FlowIndex, Inference, InferenceRepo, Sequence};
use crate::workspace::Workspace;

/// Everything one handler invocation needs, borrowed from the
/// Orchestrator's owned state for the duration of the call.
pub struct StepContext<'a> {
    pub inference: &'a Inference,
    pub flow_index: FlowIndex,
    pub concepts: &'a ConceptRepo,
    pub inferences: &'a InferenceRepo,
    pub blackboard: &'a mut Blackboard,
    pub workspace: &'a mut Workspace,
    pub body: &'a dyn BodyInterface,
}

/// What a handler produces for the Orchestrator to fold back into the
/// Blackboard/Workspace. `done` is `true` for every sequence except
/// Looping mid-iteration, where it signals "not yet, reschedule me".
#[derive(Debug)]
pub struct StepOutcome {
    pub output: Option<Reference>,
    pub alias: Option<(String, String)>,
    pub truth_mask: Option<TruthMask>,
    pub completion_detail: Option<CompletionDetail>,
    pub loop_progress: bool,
    pub done: bool,
    /// Set only by the `timing` handler: `(ready, to_be_skipped)` for the
    /// Orchestrator to record against this timing inference's own
    /// flow_index via `Blackboard::set_timing_gate` — timing handlers read
    /// the live Blackboard but never write it directly.
    pub timing_gate: Option<(bool, bool)>,
}

impl Default for StepOutcome {
    fn default() -> Self {
        Self {
            output: None,
            alias: None,
            truth_mask: None,
            completion_detail: None,
            timing_gate: None,
            loop_progress: false,
            done: true,
        }
    }
}

/// Dispatch one inference to its handler.
pub async fn dispatch(ctx: StepContext<'_>) -> Result<StepOutcome> {
    match ctx.inference.sequence {
        Sequence::Simple => simple::run(ctx).await,
        Sequence::Grouping => grouping::run(ctx).await,
        Sequence::Assigning => assigning::run(ctx).await,
        Sequence::Timing => timing::run(ctx).await,
        Sequence::Looping => looping::run(ctx).await,
        Sequence::Imperative => imperative::run(ctx, false).await,
        Sequence::Judgement => imperative::run(ctx, true).await,
    }
}

/// Shared IR (Input References) step: resolve every `value_concepts` and
/// `context_concepts` reference from the Blackboard, applying any
/// workspace-injected timing filters accumulated for this inference
/// (AND-combined, applied only to references that carry the filter axis).
pub(crate) fn load_input_references(ctx: &mut StepContext<'_>) -> Result<(Vec<Reference>, Vec<Reference>)> {
    let mut values = Vec::with_capacity(ctx.inference.value_concepts.len());
    for name in ctx.inference.value_concepts.clone().iter() {
        values.push(load_one(ctx, name)?);
    }
    let mut context = Vec::with_capacity(ctx.inference.context_concepts.len());
    for name in ctx.inference.context_concepts.clone().iter() {
        context.push(load_one(ctx, name)?);
    }
    Ok((values, context))
}

fn load_one(ctx: &mut StepContext<'_>, name: &str) -> Result<Reference> {
    let mut reference = ctx.blackboard.value_of_concept(name)?;
    let flow_index_str = ctx.flow_index.to_string();
    let filters = ctx.workspace.filters_for(&flow_index_str).to_vec();
    for filter in filters {
        if reference.axis_position(&filter.filter_axis).is_some() {
            reference = crate::reference::ops::apply_truth_mask(&reference, &filter.truth_mask, &filter.filter_axis)?;
        }
    }
    Ok(reference)
}

pub(crate) fn cell_to_json(cell: &Cell) -> Value {
    match cell {
        Cell::Skip => Value::Null,
        Cell::Scalar(s) => s.to_json(),
        Cell::Dict(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), cell_to_json(v))).collect()),
        Cell::List(items) => Value::Array(items.iter().map(cell_to_json).collect()),
    }
}

pub(crate) fn json_to_cell(value: &Value) -> Cell {
    match value {
        Value::Array(items) => Cell::List(items.iter().map(json_to_cell).collect()),
        Value::Object(map) => Cell::Dict(map.iter().map(|(k, v)| (k.clone(), json_to_cell(v))).collect()),
        other => Scalar::from_json(other).map(Cell::Scalar).unwrap_or(Cell::Skip),
    }
}

/// A reference's cells as a single JSON value for a paradigm call: a
/// singleton reference yields its bare cell, anything else yields a JSON
/// array in row-major order.
pub(crate) fn reference_to_json(reference: &Reference) -> Value {
    let leaves = reference.get_leaves();
    if leaves.len() == 1 {
        cell_to_json(&leaves[0])
    } else {
        Value::Array(leaves.iter().map(cell_to_json).collect())
    }
}

pub(crate) fn cell_to_reference(cell: Cell) -> Reference {
    Reference::new(vec![NONE_AXIS.to_string()], vec![1], vec![cell]).expect("singleton shape is always valid")
}
