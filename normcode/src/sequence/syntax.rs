//! Parses each sequence's `working_interpretation` JSON into a typed
//! record during the shared IWI (Interpret Working Interpretation) step.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::error::EngineError;
use crate::repo::FlowIndex;

fn parse<T: for<'de> Deserialize<'de>>(flow_index: &FlowIndex, wi: &Value) -> Result<T, EngineError> {
    serde_json::from_value(wi.clone()).map_err(|source| EngineError::MalformedWorkingInterpretation {
        flow_index: flow_index.to_string(),
        detail: source.to_string(),
    })
}

/// Which axes a grouping inference collapses per input. Accepts both the
/// per-ref (`[[axis, ...], ...]`) and legacy shared (`[axis, ...]`)
/// encodings — an explicit resolution of an open question in the source
/// material, which left this dual encoding ambiguous. A legacy list used
/// against more than one input concept is logged: which input the list
/// was meant for is not recoverable from the encoding itself.
#[derive(Debug, Clone)]
pub enum ByAxes {
    PerRef(Vec<Vec<String>>),
    Legacy(Vec<String>),
}

impl ByAxes {
    pub fn for_index(&self, i: usize, input_count: usize) -> Vec<String> {
        match self {
            ByAxes::PerRef(v) => v.get(i).cloned().unwrap_or_default(),
            ByAxes::Legacy(v) => {
                if input_count > 1 {
                    tracing::warn!(
                        input_count,
                        "legacy shared by_axes applied against multiple grouping inputs; encoding is ambiguous"
                    );
                }
                v.clone()
            }
        }
    }
}

impl<'de> Deserialize<'de> for ByAxes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        match &value {
            Value::Array(items) if !items.is_empty() && items.iter().all(|i| i.is_array()) => {
                let per_ref: Vec<Vec<String>> = serde_json::from_value(value).map_err(serde::de::Error::custom)?;
                Ok(ByAxes::PerRef(per_ref))
            }
            _ => {
                let legacy: Vec<String> = serde_json::from_value(value).map_err(serde::de::Error::custom)?;
                Ok(ByAxes::Legacy(legacy))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingMarker {
    In,
    Across,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupingSyntax {
    pub marker: GroupingMarker,
    #[serde(default)]
    pub by_axes: Option<ByAxes>,
    #[serde(default)]
    pub protect_axes: Vec<String>,
    #[serde(default)]
    pub create_axis: Option<String>,
}

impl GroupingSyntax {
    pub fn parse(flow_index: &FlowIndex, wi: &Value) -> Result<Self, EngineError> {
        parse(flow_index, wi)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum AssigningMarker {
    #[serde(rename = "$=")]
    Identity,
    #[serde(rename = "$.")]
    Specification,
    #[serde(rename = "$%")]
    Abstraction,
    #[serde(rename = "$+")]
    Continuation,
    #[serde(rename = "$-")]
    Selection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectorSpec {
    pub axis: String,
    #[serde(default)]
    pub equals: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssigningSyntax {
    pub marker: AssigningMarker,
    pub selector: Option<SelectorSpec>,
    pub literal_value: Value,
    pub axis_names: Vec<String>,
    pub concat_axis: Option<String>,
}

impl Default for AssigningSyntax {
    fn default() -> Self {
        Self {
            marker: AssigningMarker::Identity,
            selector: None,
            literal_value: Value::Null,
            axis_names: Vec::new(),
            concat_axis: None,
        }
    }
}

impl AssigningSyntax {
    pub fn parse(flow_index: &FlowIndex, wi: &Value) -> Result<Self, EngineError> {
        parse(flow_index, wi)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum TimingMarker {
    #[serde(rename = "@.")]
    Always,
    #[serde(rename = "@:'")]
    FiresWhenTrue,
    #[serde(rename = "@:!")]
    SkipsWhenTrue,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimingSyntax {
    pub marker: TimingMarker,
    pub condition: String,
    #[serde(default)]
    pub filter_axis: Option<String>,
}

impl TimingSyntax {
    pub fn parse(flow_index: &FlowIndex, wi: &Value) -> Result<Self, EngineError> {
        parse(flow_index, wi)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoopingSyntax {
    pub loop_index: String,
    pub loop_base_concept: String,
    #[serde(default)]
    pub create_axis: Option<String>,
    /// `in_loop_concept_name -> carry_index` (0 = the concept's value as
    /// supplied to the loop; N>0 = read from the slot N iterations back).
    #[serde(default)]
    pub in_loop_concepts: HashMap<String, u64>,
}

impl LoopingSyntax {
    pub fn parse(flow_index: &FlowIndex, wi: &Value) -> Result<Self, EngineError> {
        parse(flow_index, wi)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValueSelector {
    pub index: usize,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub unpack: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImperativeSyntax {
    pub paradigm_id: String,
    pub value_order: Vec<usize>,
    pub value_selectors: Vec<ValueSelector>,
    pub o_shape: Vec<String>,
    pub quantifier: Option<String>,
}

impl Default for ImperativeSyntax {
    fn default() -> Self {
        Self {
            paradigm_id: String::new(),
            value_order: Vec::new(),
            value_selectors: Vec::new(),
            o_shape: Vec::new(),
            quantifier: None,
        }
    }
}

impl ImperativeSyntax {
    pub fn parse(flow_index: &FlowIndex, wi: &Value) -> Result<Self, EngineError> {
        parse(flow_index, wi)
    }
}
