//! `grouping` (`&in` / `&across`): IWI, IR, GR, OR, OWI — deterministic
//! tensor combination of every `value_concepts` input into one output
//! reference. The GR step is the only sequence-specific step; everything
//! else is the shared IR/OR/OWI plumbing in [`super`].

use crate::blackboard::CompletionDetail;
use crate::error::{EngineError, Result};
use crate::reference::{ops, Reference};

use super::syntax::{GroupingMarker, GroupingSyntax};
use super::{load_input_references, StepContext, StepOutcome};

pub async fn run(mut ctx: StepContext<'_>) -> Result<StepOutcome> {
    // IWI
    let syntax = GroupingSyntax::parse(&ctx.flow_index, &ctx.inference.working_interpretation)?;
    // IR
    let (values, _context) = load_input_references(&mut ctx)?;
    let names = ctx.inference.value_concepts.clone();

    // GR
    let output = group(&syntax, &values, &names, &ctx.flow_index)?;

    Ok(StepOutcome {
        output: Some(output),
        completion_detail: Some(CompletionDetail::Success),
        ..Default::default()
    })
}

fn group(
    syntax: &GroupingSyntax,
    values: &[Reference],
    names: &[String],
    flow_index: &crate::repo::FlowIndex,
) -> Result<Reference> {
    // Collapse each input's by_axes (minus any protected axis — a
    // protected axis named in both by_axes and protect_axes is kept).
    let mut collapsed = Vec::with_capacity(values.len());
    for (i, value) in values.iter().enumerate() {
        let raw_axes = syntax
            .by_axes
            .as_ref()
            .map(|b| b.for_index(i, values.len()))
            .unwrap_or_default();
        let to_collapse: Vec<String> = raw_axes
            .into_iter()
            .filter(|a| !syntax.protect_axes.iter().any(|p| p == a))
            .collect();
        collapsed.push(if to_collapse.is_empty() {
            value.clone()
        } else {
            ops::collapse(value, &to_collapse)?
        });
    }

    match syntax.marker {
        GroupingMarker::In => match &syntax.create_axis {
            Some(axis) => ops::concat(&collapsed, axis, Some(names)).map_err(EngineError::from),
            None => {
                let shared = shared_axes_in_order(&collapsed);
                ops::cross_product(&collapsed, &shared).map_err(EngineError::from)
            }
        },
        GroupingMarker::Across => match &syntax.create_axis {
            Some(axis) => ops::concat(&collapsed, axis, None).map_err(EngineError::from),
            None => Err(EngineError::MalformedWorkingInterpretation {
                flow_index: flow_index.to_string(),
                detail: "&across grouping requires an explicit create_axis; the legacy default is inconsistent across plan sources".to_string(),
            }),
        },
    }
}

/// Axes shared by every collapsed input, in first-occurrence order across
/// the input list — the alignment dimension for the legacy (no
/// `create_axis`) `&in` cross-product.
fn shared_axes_in_order(refs: &[Reference]) -> Vec<String> {
    let Some(first) = refs.first() else { return Vec::new() };
    first
        .axes
        .iter()
        .filter(|axis| refs[1..].iter().all(|r| r.axis_position(axis).is_some()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blackboard::Blackboard;
    use crate::body::mock::MockBody;
    use crate::reference::{Cell, Scalar};
    use crate::repo::{ConceptRepo, FlowIndex, Inference, InferenceRepo};
    use crate::workspace::Workspace;

    fn scalar_ref(axis: &str, values: Vec<i64>) -> Reference {
        Reference::new(
            vec![axis.to_string()],
            vec![values.len()],
            values.into_iter().map(|v| Cell::Scalar(Scalar::Int(v))).collect(),
        )
        .unwrap()
    }

    fn inference(wi: serde_json::Value, values: Vec<&str>) -> Inference {
        serde_json::from_value(serde_json::json!({
            "flow_info": {"flow_index": "1"},
            "inference_sequence": "grouping",
            "concept_to_infer": "out",
            "function_concept": "group",
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
    async fn in_marker_concatenates_with_annotation_under_create_axis() {
        let inf = inference(
            serde_json::json!({"marker": "in", "create_axis": "items"}),
            vec!["a", "b"],
        );
        let mut bb = Blackboard::new();
        bb.set_concept_value("a", Reference::scalar(Scalar::Int(1)));
        bb.set_concept_value("b", Reference::scalar(Scalar::Int(2)));
        let outcome = run_with(&inf, &mut bb).await;
        let output = outcome.output.unwrap();
        assert_eq!(output.axes[0], "items");
        assert_eq!(output.shape[0], 2);
        assert!(matches!(&output.data[0], Cell::Dict(m) if m.contains_key("a")));
    }

    #[tokio::test]
    async fn across_requires_explicit_create_axis() {
        let inf = inference(serde_json::json!({"marker": "across"}), vec!["a"]);
        let mut bb = Blackboard::new();
        bb.set_concept_value("a", Reference::scalar(Scalar::Int(1)));
        let concepts = ConceptRepo::from_json_str("[]", "test").unwrap();
        let inferences = InferenceRepo::from_json_str("[]", "test").unwrap();
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
        let err = run(ctx).await.unwrap_err();
        assert!(matches!(err, EngineError::MalformedWorkingInterpretation { .. }));
    }

    #[tokio::test]
    async fn in_marker_legacy_cross_products_on_shared_axes() {
        let inf = inference(serde_json::json!({"marker": "in"}), vec!["a", "b"]);
        let mut bb = Blackboard::new();
        bb.set_concept_value("a", scalar_ref("shared", vec![1, 2]));
        bb.set_concept_value("b", scalar_ref("shared", vec![1, 2]));
        let outcome = run_with(&inf, &mut bb).await;
        let output = outcome.output.unwrap();
        assert_eq!(output.axes, vec!["shared"]);
        assert_eq!(output.shape, vec![2]);
    }

    #[tokio::test]
    async fn protect_axes_are_not_collapsed() {
        let inf = inference(
            serde_json::json!({
                "marker": "in",
                "by_axes": [["shared"]],
                "protect_axes": ["shared"],
                "create_axis": "items",
            }),
            vec!["a"],
        );
        let mut bb = Blackboard::new();
        bb.set_concept_value("a", scalar_ref("shared", vec![1, 2]));
        let outcome = run_with(&inf, &mut bb).await;
        let output = outcome.output.unwrap();
        // "shared" survives under the new create_axis dimension.
        assert!(output.axes.contains(&"shared".to_string()));
    }
}
