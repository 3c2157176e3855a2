//! `assigning` (`$=`, `$.`, `$%`, `$+`, `$-`): IWI, IR, AR, OR, OWI —
//! produce the output as a direct function of a source concept. The AR
//! step dispatches on [`AssigningMarker`].

use crate::blackboard::CompletionDetail;
use crate::error::{EngineError, Result};
use crate::reference::{ops, Cell, Reference, Scalar, TruthMask, NONE_AXIS};

use super::syntax::{AssigningMarker, AssigningSyntax, SelectorSpec};
use super::{cell_to_reference, json_to_cell, load_input_references, StepContext, StepOutcome};

pub async fn run(mut ctx: StepContext<'_>) -> Result<StepOutcome> {
    // IWI
    let syntax = AssigningSyntax::parse(&ctx.flow_index, &ctx.inference.working_interpretation)?;
    // IR
    let (values, _context) = load_input_references(&mut ctx)?;

    // AR
    let (output, alias) = match syntax.marker {
        AssigningMarker::Identity => identity(&ctx, &values)?,
        AssigningMarker::Specification => (specification(&ctx, &values, syntax.selector.as_ref())?, None),
        AssigningMarker::Abstraction => (abstraction(&syntax)?, None),
        AssigningMarker::Continuation => (continuation(&values)?, None),
        AssigningMarker::Selection => (selection(&values, syntax.selector.as_ref())?, None),
    };

    // OR/OWI
    Ok(StepOutcome {
        output: Some(output),
        alias,
        completion_detail: Some(CompletionDetail::Success),
        ..Default::default()
    })
}

/// `$=`: register `concept_to_infer` as an alias of the source concept;
/// the output equals the source's reference, byte-for-byte.
fn identity(ctx: &StepContext<'_>, values: &[Reference]) -> Result<(Reference, Option<(String, String)>)> {
    let source = values.first().ok_or_else(|| missing_value(ctx, "identity"))?.clone();
    let source_name = ctx
        .inference
        .value_concepts
        .first()
        .cloned()
        .ok_or_else(|| missing_value(ctx, "identity"))?;
    Ok((source, Some((source_name, ctx.inference.concept_to_infer.clone()))))
}

/// `$.`: select the first non-`Skip` cell along the input's leaves (in
/// row-major order) satisfying an optional equality selector.
fn specification(ctx: &StepContext<'_>, values: &[Reference], selector: Option<&SelectorSpec>) -> Result<Reference> {
    let source = values.first().ok_or_else(|| missing_value(ctx, "specification"))?;
    let leaves = source.get_leaves();
    let chosen = leaves
        .into_iter()
        .find(|cell| selector.map(|s| cell_matches(cell, s)).unwrap_or(true))
        .ok_or_else(|| EngineError::MalformedWorkingInterpretation {
            flow_index: ctx.flow_index.to_string(),
            detail: "specification found no non-skip cell satisfying its selector".to_string(),
        })?;
    Ok(cell_to_reference(chosen))
}

/// `$%`: wrap a literal value from the working interpretation as a
/// reference with the declared axes (defaulting to `[_none_axis]`).
fn abstraction(syntax: &AssigningSyntax) -> Result<Reference> {
    let axes = if syntax.axis_names.is_empty() {
        vec![NONE_AXIS.to_string()]
    } else {
        syntax.axis_names.clone()
    };
    let cell = json_to_cell(&syntax.literal_value);
    match cell {
        Cell::List(items) if axes.len() == 1 && axes[0] != NONE_AXIS => {
            let len = items.len();
            Reference::new(axes, vec![len], items).map_err(EngineError::from)
        }
        other => Reference::new(vec![NONE_AXIS.to_string()], vec![1], vec![other]).map_err(EngineError::from),
    }
}

/// `$+`: append a new element into the base's accumulated list — the
/// representation loop-body state accumulation carries across iterations.
/// A base with no prior accumulation (`Skip`, absent, or a bare scalar) is
/// treated as the start of a fresh list.
fn continuation(values: &[Reference]) -> Result<Reference> {
    let base_list = match values.first().and_then(|r| r.data.first()) {
        Some(Cell::List(items)) => items.clone(),
        Some(Cell::Skip) | None => Vec::new(),
        Some(other) => vec![other.clone()],
    };
    let new_cell = values.get(1).and_then(|r| r.data.first()).cloned().unwrap_or(Cell::Skip);
    let mut combined = base_list;
    combined.push(new_cell);
    Reference::new(vec![NONE_AXIS.to_string()], vec![1], vec![Cell::List(combined)]).map_err(EngineError::from)
}

/// `$-`: project/subset the input by an equality predicate against the
/// selector's axis, masking out cells that don't match.
fn selection(values: &[Reference], selector: Option<&SelectorSpec>) -> Result<Reference> {
    let source = values.first().cloned().unwrap_or_else(|| Reference::scalar(Scalar::Null));
    let Some(selector) = selector else {
        return Ok(source);
    };
    let Ok(size) = source.axis_size(&selector.axis) else {
        return Ok(source);
    };
    let pos = source.axis_position(&selector.axis).expect("axis_size succeeded");
    let mut bools = vec![false; size];
    for flat in 0..source.total_cells() {
        let multi = source.multi_index(flat);
        if cell_matches(&source.data[flat], selector) {
            bools[multi[pos]] = true;
        }
    }
    let mask = TruthMask::PerCell {
        axis: selector.axis.clone(),
        values: bools,
    };
    ops::apply_truth_mask(&source, &mask, &selector.axis).map_err(EngineError::from)
}

fn cell_matches(cell: &Cell, selector: &SelectorSpec) -> bool {
    if cell.is_skip() {
        return false;
    }
    match &selector.equals {
        None => true,
        Some(expected) => super::cell_to_json(cell) == *expected,
    }
}

fn missing_value(ctx: &StepContext<'_>, marker: &str) -> EngineError {
    EngineError::MalformedWorkingInterpretation {
        flow_index: ctx.flow_index.to_string(),
        detail: format!("{marker} assigning requires at least one value_concept"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blackboard::{Blackboard, ConceptStatus};
    use crate::body::mock::MockBody;
    use crate::repo::{ConceptRepo, FlowIndex, Inference, InferenceRepo};
    use crate::workspace::Workspace;

    fn inference(wi: serde_json::Value, values: Vec<&str>) -> Inference {
        serde_json::from_value(serde_json::json!({
            "flow_info": {"flow_index": "1"},
            "inference_sequence": "assigning",
            "concept_to_infer": "out",
            "function_concept": "assign",
            "value_concepts": values,
            "working_interpretation": wi,
        }))
        .unwrap()
    }

    async fn run_with(inf: &Inference, bb: &mut Blackboard) -> StepOutcome {
        let concepts = ConceptRepo::from_json_str("[]", "test").unwrap();
        let inferences = InferenceRepo::from_json_str("[]", "test").unwrap();
        let mut ws = Workspace::new();
        let body = MockBody::new();
        let ctx = StepContext {
            inference: inf,
            flow_index: FlowIndex::new("1"),
            concepts: &concepts,
            inferences: &inferences,
            blackboard: bb,
            workspace: &mut ws,
            body: &body,
        };
        run(ctx).await.unwrap()
    }

    #[tokio::test]
    async fn identity_registers_alias_and_passes_through_value() {
        let inf = inference(serde_json::json!({"marker": "$="}), vec!["source"]);
        let mut bb = Blackboard::new();
        bb.set_concept_value("source", Reference::scalar(Scalar::Int(9)));
        let outcome = run_with(&inf, &mut bb).await;
        assert_eq!(outcome.alias, Some(("source".to_string(), "out".to_string())));
        assert_eq!(outcome.output, Some(Reference::scalar(Scalar::Int(9))));
        bb.add_alias(&outcome.alias.as_ref().unwrap().0, &outcome.alias.as_ref().unwrap().1);
        assert_eq!(bb.status_of_concept("out"), ConceptStatus::Complete);
    }

    #[tokio::test]
    async fn specification_selects_first_matching_cell() {
        let inf = inference(
            serde_json::json!({"marker": "$.", "selector": {"axis": "x", "equals": 7}}),
            vec!["source"],
        );
        let mut bb = Blackboard::new();
        bb.set_concept_value(
            "source",
            Reference::new(
                vec!["x".into()],
                vec![3],
                vec![Cell::Scalar(Scalar::Int(1)), Cell::Scalar(Scalar::Int(7)), Cell::Scalar(Scalar::Int(9))],
            )
            .unwrap(),
        );
        let outcome = run_with(&inf, &mut bb).await;
        assert_eq!(outcome.output, Some(Reference::scalar(Scalar::Int(7))));
    }

    #[tokio::test]
    async fn abstraction_wraps_literal_as_none_axis_scalar() {
        let inf = inference(serde_json::json!({"marker": "$%", "literal_value": "hello"}), vec![]);
        let mut bb = Blackboard::new();
        let outcome = run_with(&inf, &mut bb).await;
        assert_eq!(outcome.output, Some(Reference::scalar(Scalar::Text("hello".to_string()))));
    }

    #[tokio::test]
    async fn continuation_appends_to_accumulated_list() {
        let inf = inference(serde_json::json!({"marker": "$+"}), vec!["base", "elem"]);
        let mut bb = Blackboard::new();
        bb.set_concept_value(
            "base",
            Reference::new(vec![NONE_AXIS.to_string()], vec![1], vec![Cell::List(vec![Cell::Scalar(Scalar::Int(1))])]).unwrap(),
        );
        bb.set_concept_value("elem", Reference::scalar(Scalar::Int(2)));
        let outcome = run_with(&inf, &mut bb).await;
        assert_eq!(
            outcome.output.unwrap().data[0],
            Cell::List(vec![Cell::Scalar(Scalar::Int(1)), Cell::Scalar(Scalar::Int(2))])
        );
    }

    #[tokio::test]
    async fn selection_masks_non_matching_cells() {
        let inf = inference(
            serde_json::json!({"marker": "$-", "selector": {"axis": "docs", "equals": "keep"}}),
            vec!["source"],
        );
        let mut bb = Blackboard::new();
        bb.set_concept_value(
            "source",
            Reference::new(
                vec!["docs".into()],
                vec![2],
                vec![Cell::Scalar(Scalar::Text("keep".into())), Cell::Scalar(Scalar::Text("drop".into()))],
            )
            .unwrap(),
        );
        let outcome = run_with(&inf, &mut bb).await;
        let output = outcome.output.unwrap();
        assert_eq!(output.data[0], Cell::Scalar(Scalar::Text("keep".into())));
        assert_eq!(output.data[1], Cell::Skip);
    }
}
