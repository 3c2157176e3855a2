//! `timing` (`@.`, `@:'`, `@:!`): IWI, T, OWI — gate the parent inference
//! and optionally inject a filter for its IR step. Reads the live
//! Blackboard; never writes it directly (the Orchestrator records the
//! verdict from [`super::StepOutcome::timing_gate`]).

use crate::blackboard::ConceptStatus;
use crate::error::{EngineError, Result};

use super::syntax::{TimingMarker, TimingSyntax};
use super::{StepContext, StepOutcome};
use crate::workspace::FilterSpec;

pub async fn run(mut ctx: StepContext<'_>) -> Result<StepOutcome> {
    // IWI
    let syntax = TimingSyntax::parse(&ctx.flow_index, &ctx.inference.working_interpretation)?;

    // T
    let producing_flow_index = ctx
        .inferences
        .all_inferences_sorted()
        .into_iter()
        .find(|inf| inf.concept_to_infer == syntax.condition)
        .map(|inf| inf.flow_index());

    let Some(producing_flow_index) = producing_flow_index else {
        return Err(EngineError::UnknownCondition(syntax.condition.clone()));
    };

    if ctx.blackboard.status_of_concept(&syntax.condition) != ConceptStatus::Complete {
        // The condition hasn't resolved yet: this timing inference is not
        // ready to gate its parent.
        return Ok(StepOutcome {
            timing_gate: Some((false, false)),
            done: false,
            ..Default::default()
        });
    }

    let condition_true = match ctx.blackboard.completion_detail_of(&producing_flow_index) {
        Some(crate::blackboard::CompletionDetail::ConditionNotMet) => false,
        Some(crate::blackboard::CompletionDetail::Error(_)) => false,
        _ => true,
    };

    let (ready, to_be_skipped) = match syntax.marker {
        TimingMarker::Always => (true, false),
        TimingMarker::FiresWhenTrue => (true, !condition_true),
        TimingMarker::SkipsWhenTrue => (true, condition_true),
    };

    // Timing handlers mutate the Workspace directly (per spec §3.5) even
    // though they only ever read the Blackboard.
    if !to_be_skipped {
        if let Ok(mask) = ctx.blackboard.get_truth_mask(&syntax.condition).cloned() {
            if let Some(parent) = ctx.flow_index.parent() {
                let filter_axis = syntax.filter_axis.clone().unwrap_or_else(|| match &mask {
                    crate::reference::TruthMask::PerCell { axis, .. } => axis.clone(),
                    crate::reference::TruthMask::Global(_) => crate::reference::NONE_AXIS.to_string(),
                });
                ctx.workspace.push_filter(
                    &parent.to_string(),
                    FilterSpec {
                        truth_mask: mask,
                        condition_name: syntax.condition.clone(),
                        source_flow_index: ctx.flow_index.to_string(),
                        filter_axis,
                    },
                );
            }
        }
    }

    Ok(StepOutcome {
        timing_gate: Some((ready, to_be_skipped)),
        completion_detail: Some(crate::blackboard::CompletionDetail::Success),
        ..Default::default()
    })
}
