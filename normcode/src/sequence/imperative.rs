//! `imperative`/`judgement` (semantic): IWI, IR, MFP, MVP, TVA, TIP, MIA —
//! invoke the external Body to compute an output from inputs. `judgement`
//! shares every step with `imperative` except TIP, which additionally
//! reduces the result to a [`TruthMask`] via the declared quantifier.
//!
//! MFP ("materialise a composed callable") collapses to nothing concrete
//! here: the composed-callable graph lives entirely behind
//! [`BodyInterface::call_paradigm`], which the engine calls unexamined —
//! there is no client-side step to perform once a paradigm_id is in hand.

use std::collections::HashMap;

use serde_json::Value;

use crate::blackboard::CompletionDetail;
use crate::body::PerceptionWrapper;
use crate::error::{EngineError, Result};
use crate::reference::{Cell, Quantifier, Reference, NONE_AXIS};

use super::syntax::{ImperativeSyntax, ValueSelector};
use super::{cell_to_reference, json_to_cell, load_input_references, reference_to_json, StepContext, StepOutcome};

pub async fn run(mut ctx: StepContext<'_>, is_judgement: bool) -> Result<StepOutcome> {
    // IWI
    let syntax = ImperativeSyntax::parse(&ctx.flow_index, &ctx.inference.working_interpretation)?;
    // IR
    let (values, _context) = load_input_references(&mut ctx)?;

    // MVP
    let positional = select_positional_inputs(&ctx, &syntax, &values)?;
    let (resolved, save_path) = resolve_perception_wrappers(&mut ctx, &positional).await?;
    let mut inputs = HashMap::with_capacity(resolved.len());
    for (i, value) in resolved.iter().enumerate() {
        inputs.insert(format!("input_{}", i + 1), value.clone());
    }

    // TVA
    let result = ctx.body.call_paradigm(&syntax.paradigm_id, inputs).await?;

    // TIP
    let output = wrap_result(&ctx, &result, &syntax.o_shape)?;
    let (truth_mask, completion_detail) = if is_judgement {
        let quantifier = syntax.quantifier.as_deref().and_then(Quantifier::parse).unwrap_or(Quantifier::AllTrue);
        let axis = syntax.o_shape.first().cloned().unwrap_or_else(|| NONE_AXIS.to_string());
        let bools: Vec<bool> = output.data.iter().map(Cell::is_truthy).collect();
        let mask = quantifier.evaluate(&axis, bools);
        let detail = if mask.is_true() { CompletionDetail::Success } else { CompletionDetail::ConditionNotMet };
        (Some(mask), detail)
    } else {
        (None, CompletionDetail::Success)
    };

    // MIA
    if let Some(path) = save_path {
        ctx.body.write_file(&path, &result.to_string()).await?;
    }

    Ok(StepOutcome {
        output: Some(output),
        truth_mask,
        completion_detail: Some(completion_detail),
        ..Default::default()
    })
}

/// `value_selectors`, when present, define the positional input list
/// exactly (extracting `[index].key`, optionally unpacking a list result
/// into several positional inputs). Otherwise `value_order` picks and
/// orders a subset of the loaded `value_concepts`; with neither, every
/// loaded value is passed through in declared order.
fn select_positional_inputs(ctx: &StepContext<'_>, syntax: &ImperativeSyntax, values: &[Reference]) -> Result<Vec<Reference>> {
    if !syntax.value_selectors.is_empty() {
        let mut out = Vec::with_capacity(syntax.value_selectors.len());
        for selector in &syntax.value_selectors {
            let source = values
                .get(selector.index)
                .ok_or_else(|| malformed(ctx, "value_selector index out of range"))?;
            let cell = select_cell(source, selector);
            if selector.unpack {
                if let Cell::List(items) = &cell {
                    out.extend(items.iter().cloned().map(cell_to_reference));
                    continue;
                }
            }
            out.push(cell_to_reference(cell));
        }
        Ok(out)
    } else if !syntax.value_order.is_empty() {
        syntax
            .value_order
            .iter()
            .map(|&i| values.get(i).cloned().ok_or_else(|| malformed(ctx, "value_order index out of range")))
            .collect()
    } else {
        Ok(values.to_vec())
    }
}

fn select_cell(source: &Reference, selector: &ValueSelector) -> Cell {
    let base = source.data.first().cloned().unwrap_or(Cell::Skip);
    match &selector.key {
        Some(key) => match &base {
            Cell::Dict(map) => map.get(key).cloned().unwrap_or(Cell::Skip),
            _ => Cell::Skip,
        },
        None => base,
    }
}

/// Resolve perception wrappers on every string-typed positional input.
/// `%{script_location}(path)` implements the generate-once-then-reuse
/// contract from §4.4.6: a missing script file is generated from the
/// nearest `%{prompt_location}` input via a `"script_generation"`
/// paradigm call, persisted, then used as-is; an existing file is read
/// and reused without regenerating.
async fn resolve_perception_wrappers(ctx: &mut StepContext<'_>, refs: &[Reference]) -> Result<(Vec<Value>, Option<String>)> {
    let mut prompt_cache: Option<String> = None;
    for r in refs {
        if let Value::String(s) = reference_to_json(r) {
            if let Some(PerceptionWrapper::PromptLocation(path)) = PerceptionWrapper::parse(&s) {
                prompt_cache = ctx.body.read_file(&path).await.ok();
            }
        }
    }

    let mut resolved = Vec::with_capacity(refs.len());
    let mut save_path = None;
    for r in refs {
        let json = reference_to_json(r);
        let Value::String(text) = &json else {
            resolved.push(json);
            continue;
        };
        let Some(wrapper) = PerceptionWrapper::parse(text) else {
            resolved.push(json);
            continue;
        };
        match wrapper {
            PerceptionWrapper::SavePath(path) => {
                save_path = Some(path.clone());
                resolved.push(Value::String(path));
            }
            PerceptionWrapper::ScriptLocation(path) => match ctx.body.read_file(&path).await {
                Ok(content) => resolved.push(Value::String(content)),
                Err(_) => {
                    let mut gen_inputs = HashMap::new();
                    gen_inputs.insert("prompt".to_string(), Value::String(prompt_cache.clone().unwrap_or_default()));
                    let generated = ctx.body.call_paradigm("script_generation", gen_inputs).await?;
                    let script = generated.as_str().unwrap_or_default().to_string();
                    ctx.body.write_file(&path, &script).await?;
                    resolved.push(Value::String(script));
                }
            },
            other => resolved.push(other.resolve(ctx.body).await?),
        }
    }
    Ok((resolved, save_path))
}

/// TIP's output-shaping half: wrap the raw paradigm result as a Reference
/// of the declared `o_shape`. An empty `o_shape` yields a `_none_axis`
/// scalar; a rank-N shape descends N levels of nested JSON arrays,
/// inferring each axis's size from the first element at that depth.
fn wrap_result(ctx: &StepContext<'_>, result: &Value, o_shape: &[String]) -> Result<Reference> {
    if o_shape.is_empty() {
        let cell = json_to_cell(result);
        return Reference::new(vec![NONE_AXIS.to_string()], vec![1], vec![cell]).map_err(EngineError::from);
    }

    let mut shape = Vec::with_capacity(o_shape.len());
    let mut cursor = result.clone();
    for _ in 0..o_shape.len() {
        let arr = cursor
            .as_array()
            .cloned()
            .ok_or_else(|| malformed(ctx, "imperative result rank does not match declared o_shape"))?;
        shape.push(arr.len());
        cursor = arr.first().cloned().unwrap_or(Value::Null);
    }

    let mut data = Vec::new();
    flatten_by_shape(result, &shape, 0, &mut data);
    Reference::new(o_shape.to_vec(), shape, data).map_err(EngineError::from)
}

fn flatten_by_shape(value: &Value, shape: &[usize], depth: usize, out: &mut Vec<Cell>) {
    if depth == shape.len() {
        out.push(json_to_cell(value));
        return;
    }
    if let Value::Array(items) = value {
        for item in items {
            flatten_by_shape(item, shape, depth + 1, out);
        }
    }
}

fn malformed(ctx: &StepContext<'_>, detail: &str) -> EngineError {
    EngineError::MalformedWorkingInterpretation {
        flow_index: ctx.flow_index.to_string(),
        detail: detail.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blackboard::Blackboard;
    use crate::body::mock::MockBody;
    use crate::reference::Scalar;
    use crate::repo::{ConceptRepo, FlowIndex, Inference, InferenceRepo};
    use crate::workspace::Workspace;

    fn inference(wi: serde_json::Value, values: Vec<&str>, sequence: &str) -> Inference {
        serde_json::from_value(serde_json::json!({
            "flow_info": {"flow_index": "1"},
            "inference_sequence": sequence,
            "concept_to_infer": "out",
            "function_concept": "paradigm",
            "value_concepts": values,
            "working_interpretation": wi,
        }))
        .unwrap()
    }

    async fn run_with(inf: &Inference, bb: &mut Blackboard, body: &MockBody, is_judgement: bool) -> StepOutcome {
        let concepts = ConceptRepo::from_json_str("[]", "test").unwrap();
        let inferences = InferenceRepo::from_json_str("[]", "test").unwrap();
        let mut ws = Workspace::new();
        let ctx = StepContext {
            inference: inf,
            flow_index: FlowIndex::new("1"),
            concepts: &concepts,
            inferences: &inferences,
            blackboard: bb,
            workspace: &mut ws,
            body,
        };
        run(ctx, is_judgement).await.unwrap()
    }

    #[tokio::test]
    async fn imperative_wraps_scalar_result_with_no_o_shape() {
        let inf = inference(serde_json::json!({"paradigm_id": "add"}), vec!["a"], "imperative");
        let mut bb = Blackboard::new();
        bb.set_concept_value("a", Reference::scalar(Scalar::Int(2)));
        let body = MockBody::new().with_paradigm("add", serde_json::json!(4));
        let outcome = run_with(&inf, &mut bb, &body, false).await;
        assert_eq!(outcome.output.unwrap(), Reference::scalar(Scalar::Int(4)));
    }

    #[tokio::test]
    async fn imperative_wraps_rank_one_array_result() {
        let inf = inference(
            serde_json::json!({"paradigm_id": "split", "o_shape": ["part"]}),
            vec!["a"],
            "imperative",
        );
        let mut bb = Blackboard::new();
        bb.set_concept_value("a", Reference::scalar(Scalar::Text("ab".into())));
        let body = MockBody::new().with_paradigm("split", serde_json::json!(["a", "b"]));
        let outcome = run_with(&inf, &mut bb, &body, false).await;
        let output = outcome.output.unwrap();
        assert_eq!(output.axes, vec!["part"]);
        assert_eq!(output.shape, vec![2]);
    }

    #[tokio::test]
    async fn judgement_all_true_succeeds() {
        let inf = inference(
            serde_json::json!({"paradigm_id": "check", "quantifier": "ALL True"}),
            vec!["a"],
            "judgement",
        );
        let mut bb = Blackboard::new();
        bb.set_concept_value("a", Reference::scalar(Scalar::Int(1)));
        let body = MockBody::new().with_paradigm("check", serde_json::json!(true));
        let outcome = run_with(&inf, &mut bb, &body, true).await;
        assert_eq!(outcome.truth_mask, Some(crate::reference::TruthMask::Global(true)));
        assert_eq!(outcome.completion_detail, Some(CompletionDetail::Success));
    }

    #[tokio::test]
    async fn judgement_false_records_condition_not_met() {
        let inf = inference(serde_json::json!({"paradigm_id": "check"}), vec!["a"], "judgement");
        let mut bb = Blackboard::new();
        bb.set_concept_value("a", Reference::scalar(Scalar::Int(1)));
        let body = MockBody::new().with_paradigm("check", serde_json::json!(false));
        let outcome = run_with(&inf, &mut bb, &body, true).await;
        assert_eq!(outcome.completion_detail, Some(CompletionDetail::ConditionNotMet));
    }

    #[tokio::test]
    async fn value_selectors_unpack_a_list_into_positional_inputs() {
        let inf = inference(
            serde_json::json!({
                "paradigm_id": "sum",
                "value_selectors": [{"index": 0, "unpack": true}],
            }),
            vec!["a"],
            "imperative",
        );
        let mut bb = Blackboard::new();
        bb.set_concept_value(
            "a",
            Reference::new(
                vec![NONE_AXIS.to_string()],
                vec![1],
                vec![Cell::List(vec![Cell::Scalar(Scalar::Int(1)), Cell::Scalar(Scalar::Int(2))])],
            )
            .unwrap(),
        );
        let body = MockBody::new().with_paradigm("sum", serde_json::json!(3));
        let outcome = run_with(&inf, &mut bb, &body, false).await;
        assert_eq!(outcome.output.unwrap(), Reference::scalar(Scalar::Int(3)));
    }

    #[tokio::test]
    async fn script_location_generates_and_persists_when_file_is_absent() {
        let inf = inference(serde_json::json!({"paradigm_id": "run_script"}), vec!["prompt", "script"], "imperative");
        let mut bb = Blackboard::new();
        bb.set_concept_value("prompt", Reference::scalar(Scalar::Text("%{prompt_location}(/tmp/p.txt)".into())));
        bb.set_concept_value("script", Reference::scalar(Scalar::Text("%{script_location}(/tmp/s.py)".into())));
        let body = MockBody::new()
            .with_file("/tmp/p.txt", "write a script")
            .with_paradigm("script_generation", serde_json::json!("print('hi')"))
            .with_paradigm("run_script", serde_json::json!("hi"));
        let outcome = run_with(&inf, &mut bb, &body, false).await;
        assert_eq!(outcome.output.unwrap(), Reference::scalar(Scalar::Text("hi".into())));
        assert_eq!(body.files.lock().unwrap().get("/tmp/s.py").cloned(), Some("print('hi')".to_string()));
    }
}
