//! `simple`: IWI, IR, OR, OWI — passthrough. No working interpretation to
//! speak of; the output is simply the single value concept's reference,
//! stamped onto `concept_to_infer` unchanged.

use crate::blackboard::CompletionDetail;
use crate::error::{EngineError, Result};

use super::{load_input_references, StepContext, StepOutcome};

pub async fn run(mut ctx: StepContext<'_>) -> Result<StepOutcome> {
    // IWI: simple carries no syntax to parse.
    // IR: load the single value concept (plus any context, unused here).
    let (values, _context) = load_input_references(&mut ctx)?;
    let output = values.into_iter().next().ok_or_else(|| EngineError::MalformedWorkingInterpretation {
        flow_index: ctx.flow_index.to_string(),
        detail: "simple sequence requires exactly one value_concept".to_string(),
    })?;

    // OR/OWI: stamp the passthrough value back with no transformation.
    Ok(StepOutcome {
        output: Some(output),
        completion_detail: Some(CompletionDetail::Success),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blackboard::Blackboard;
    use crate::body::mock::MockBody;
    use crate::reference::{Reference, Scalar};
    use crate::repo::{ConceptRepo, FlowIndex, Inference, InferenceRepo, Sequence};
    use crate::workspace::Workspace;

    fn inference() -> Inference {
        serde_json::from_value(serde_json::json!({
            "flow_info": {"flow_index": "1"},
            "inference_sequence": "simple",
            "concept_to_infer": "out",
            "function_concept": "identity",
            "value_concepts": ["in"],
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn passes_through_the_single_input_unchanged() {
        let inf = inference();
        let concepts = ConceptRepo::from_json_str("[]", "test").unwrap();
        let inferences = InferenceRepo::from_json_str("[]", "test").unwrap();
        let mut bb = Blackboard::new();
        bb.set_concept_value("in", Reference::scalar(Scalar::Int(5)));
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
        assert_eq!(outcome.output, Some(Reference::scalar(Scalar::Int(5))));
        assert_eq!(outcome.completion_detail, Some(CompletionDetail::Success));
    }
}
