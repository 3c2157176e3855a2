//! `looping` (`*every` / `*.`): IWI, IR, GR, LR, OR, OWI — iterate a base
//! collection, carrying state across iterations in the Workspace rather
//! than as graph cycles (see spec §9, "Cyclic structures").
//!
//! The LR step here folds in the per-iteration computation itself via a
//! `call_paradigm` dispatch keyed by the inference's `function_concept` —
//! the source material's LR description presumes a separately-dispatched
//! child inference has already computed and stored each iteration's
//! carried values directly into the Workspace; this engine does not model
//! nested per-iteration inference dispatch, so the loop handler performs
//! that one semantic step itself. Documented as an Open Question
//! resolution in `DESIGN.md`.

use std::collections::HashMap;

use serde_json::Value;

use crate::blackboard::CompletionDetail;
use crate::error::Result;
use crate::reference::{ops, Reference, NONE_AXIS};
use crate::workspace::Workspace;

use super::syntax::LoopingSyntax;
use super::{cell_to_reference, json_to_cell, reference_to_json, StepContext, StepOutcome};

pub async fn run(mut ctx: StepContext<'_>) -> Result<StepOutcome> {
    // IWI
    let syntax = LoopingSyntax::parse(&ctx.flow_index, &ctx.inference.working_interpretation)?;
    // IR
    let base = ctx.blackboard.value_of_concept(&syntax.loop_base_concept)?;

    // GR: flatten the base collection to an ordered, deterministic list of
    // elements (insertion/row-major order of the surviving leaves).
    let elements: Vec<Reference> = base.get_leaves().into_iter().map(cell_to_reference).collect();
    let axis = syntax
        .create_axis
        .clone()
        .unwrap_or_else(|| base.axes.first().cloned().unwrap_or_else(|| NONE_AXIS.to_string()));

    if elements.is_empty() {
        // Boundary: an empty base collection completes in one cycle with
        // a shape-(0,) output along create_axis.
        let output = Reference::new(vec![axis], vec![0], vec![])?;
        return Ok(StepOutcome {
            output: Some(output),
            completion_detail: Some(CompletionDetail::Success),
            ..Default::default()
        });
    }

    let mut in_loop: Vec<(String, u64)> = syntax.in_loop_concepts.iter().map(|(k, v)| (k.clone(), *v)).collect();
    in_loop.sort_by(|a, b| a.0.cmp(&b.0));

    let loop_key = Workspace::loop_key(&syntax.loop_index, &syntax.loop_base_concept);

    // LR step 1: find the next element not yet recorded for this loop.
    let next_ordinal = (0..elements.len() as u64).find(|i| {
        ctx.workspace
            .loop_slots(&loop_key)
            .map(|slots| !slots.contains_key(i))
            .unwrap_or(true)
    });

    match next_ordinal {
        Some(ordinal) => run_one_iteration(&mut ctx, &syntax, &loop_key, ordinal, &elements, &in_loop).await,
        None => aggregate(&mut ctx, &loop_key, &axis, &elements, &in_loop, &syntax.loop_base_concept),
    }
}

async fn run_one_iteration(
    ctx: &mut StepContext<'_>,
    syntax: &LoopingSyntax,
    loop_key: &str,
    ordinal: u64,
    elements: &[Reference],
    in_loop: &[(String, u64)],
) -> Result<StepOutcome> {
    let idx = ordinal as usize;

    // LR step 2: store the new base element in a fresh iteration slot.
    ctx.workspace
        .set_iteration_value(loop_key, ordinal, &syntax.loop_base_concept, elements[idx].clone());

    // LR step 3: resolve each in-loop carried concept from `current -
    // carry_index` (carry_index 0 reads the context-supplied initial
    // value, by concept name, straight from the Blackboard).
    let mut inputs = HashMap::new();
    inputs.insert(syntax.loop_base_concept.clone(), reference_to_json(&elements[idx]));
    for (name, carry_index) in in_loop {
        let carried = if *carry_index == 0 {
            ctx.blackboard.value_of_concept(name)?
        } else if ordinal >= *carry_index {
            match ctx.workspace.iteration_value(loop_key, ordinal - carry_index, name) {
                Some(r) => r.clone(),
                None => ctx.blackboard.value_of_concept(name)?,
            }
        } else {
            ctx.blackboard.value_of_concept(name)?
        };
        inputs.insert(name.clone(), reference_to_json(&carried));
    }

    let result = ctx.body.call_paradigm(&ctx.inference.function_concept, inputs).await?;
    if let Value::Object(map) = &result {
        for (name, _) in in_loop {
            if let Some(v) = map.get(name) {
                ctx.workspace
                    .set_iteration_value(loop_key, ordinal, name, cell_to_reference(json_to_cell(v)));
            }
        }
    }

    Ok(StepOutcome {
        loop_progress: true,
        done: false,
        ..Default::default()
    })
}

/// LR step 4 / OWI: once every element has every required concept present
/// in the workspace, aggregate the carried "output" concept (the first
/// in-loop concept, by name, with a nonzero carry_index — i.e. a value
/// actually produced per-iteration rather than merely supplied once at
/// loop start) across iterations along `axis`.
fn aggregate(
    ctx: &mut StepContext<'_>,
    loop_key: &str,
    axis: &str,
    elements: &[Reference],
    in_loop: &[(String, u64)],
    loop_base_concept: &str,
) -> Result<StepOutcome> {
    let output_concept = in_loop
        .iter()
        .find(|(_, carry)| *carry > 0)
        .map(|(name, _)| name.clone())
        .unwrap_or_else(|| loop_base_concept.to_string());

    let mut per_iteration = Vec::with_capacity(elements.len());
    for i in 0..elements.len() as u64 {
        let value = ctx
            .workspace
            .iteration_value(loop_key, i, &output_concept)
            .cloned()
            .unwrap_or_else(|| elements[i as usize].clone());
        per_iteration.push(value);
    }
    let output = ops::concat(&per_iteration, axis, None)?;

    Ok(StepOutcome {
        output: Some(output),
        completion_detail: Some(CompletionDetail::Success),
        loop_progress: false,
        done: true,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blackboard::Blackboard;
    use crate::body::mock::MockBody;
    use crate::reference::{Cell, Scalar};
    use crate::repo::{ConceptRepo, FlowIndex, Inference, InferenceRepo};

    fn inference(wi: serde_json::Value) -> Inference {
        serde_json::from_value(serde_json::json!({
            "flow_info": {"flow_index": "1"},
            "inference_sequence": "looping",
            "concept_to_infer": "sum_digits",
            "function_concept": "add_digit",
            "value_concepts": ["digits"],
            "working_interpretation": wi,
        }))
        .unwrap()
    }

    fn digits_ref(values: Vec<i64>) -> Reference {
        Reference::new(
            vec!["digit".into()],
            vec![values.len()],
            values.into_iter().map(|v| Cell::Scalar(Scalar::Int(v))).collect(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn empty_base_collection_completes_in_one_cycle() {
        let inf = inference(serde_json::json!({
            "loop_index": "1", "loop_base_concept": "digits", "create_axis": "out",
        }));
        let concepts = ConceptRepo::from_json_str("[]", "test").unwrap();
        let inferences = InferenceRepo::from_json_str("[]", "test").unwrap();
        let mut bb = Blackboard::new();
        bb.set_concept_value("digits", digits_ref(vec![]));
        let mut ws = Workspace::new();
        let body = MockBody::new();
        let ctx = StepContext {
            inference: &inf,
            flow_index: FlowIndex::new("1"),
            concepts: &concepts,
            inferences: &inferences,
            blackboard: &mut bb,
            workspace: &mut ws,
            body: &body,
        };
        let outcome = run(ctx).await.unwrap();
        assert!(outcome.done);
        let output = outcome.output.unwrap();
        assert_eq!(output.shape, vec![0]);
    }

    #[tokio::test]
    async fn iterates_carrying_state_and_aggregates_on_completion() {
        let inf = inference(serde_json::json!({
            "loop_index": "1",
            "loop_base_concept": "digits",
            "create_axis": "out",
            "in_loop_concepts": {"carry": 1},
        }));
        let concepts = ConceptRepo::from_json_str("[]", "test").unwrap();
        let inferences = InferenceRepo::from_json_str("[]", "test").unwrap();
        let mut bb = Blackboard::new();
        bb.set_concept_value("digits", digits_ref(vec![3, 4, 5]));
        bb.set_concept_value("carry", Reference::scalar(Scalar::Int(0)));
        let mut ws = Workspace::new();
        let body = MockBody::new().with_paradigm_sequence(
            "add_digit",
            vec![serde_json::json!({"carry": 1}), serde_json::json!({"carry": 2}), serde_json::json!({"carry": 3})],
        );

        // Drive three iterations, then the final aggregation pass.
        for _ in 0..4 {
            let ctx = StepContext {
                inference: &inf,
                flow_index: FlowIndex::new("1"),
                concepts: &concepts,
                inferences: &inferences,
                blackboard: &mut bb,
                workspace: &mut ws,
                body: &body,
            };
            let outcome = run(ctx).await.unwrap();
            if outcome.done {
                let output = outcome.output.unwrap();
                assert_eq!(output.axes[0], "out");
                assert_eq!(output.shape[0], 3);
                assert_eq!(
                    output.data,
                    vec![
                        Cell::Scalar(Scalar::Int(1)),
                        Cell::Scalar(Scalar::Int(2)),
                        Cell::Scalar(Scalar::Int(3))
                    ]
                );
                return;
            }
            assert!(outcome.loop_progress);
        }
        panic!("loop did not converge within 4 drive cycles");
    }
}
