//! Concept definitions, as loaded from `concept_repo.json`.

use serde::{Deserialize, Serialize};

use crate::reference::{Cell, Reference, Scalar};

/// Role a concept plays in the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeTag {
    Object,
    Relation,
    Proposition,
    Subject,
    Imperative,
    Judgement,
    Operator,
}

impl TypeTag {
    /// Maps the plan artifact's raw `"type"` marker strings onto the
    /// role enum. Unrecognized markers fall back to `Operator` with a
    /// warning — the marker vocabulary above is not exhaustively
    /// documented in the source plans observed so far.
    pub fn from_marker(marker: &str) -> Self {
        match marker {
            "{}" => TypeTag::Object,
            "[]" => TypeTag::Relation,
            "<>" => TypeTag::Proposition,
            ":S:" => TypeTag::Subject,
            "::({})" => TypeTag::Imperative,
            "<{}>" => TypeTag::Judgement,
            "*every" => TypeTag::Operator,
            other => {
                tracing::warn!(marker = other, "unrecognized concept type marker, defaulting to operator");
                TypeTag::Operator
            }
        }
    }
}

/// A named slot that holds a `Reference`, typed by role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concept {
    pub concept_name: String,
    #[serde(rename = "type", deserialize_with = "deserialize_type_tag")]
    pub type_tag: TypeTag,
    #[serde(default)]
    pub is_ground_concept: bool,
    #[serde(default)]
    pub is_final_concept: bool,
    #[serde(default)]
    pub is_invariant: bool,
    #[serde(default)]
    pub reference_axis_names: Vec<String>,
    #[serde(default)]
    pub reference_data: serde_json::Value,
}

fn deserialize_type_tag<'de, D>(deserializer: D) -> Result<TypeTag, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let marker = String::deserialize(deserializer)?;
    Ok(TypeTag::from_marker(&marker))
}

impl Concept {
    /// True iff this concept's value is supplied externally.
    pub fn is_ground(&self) -> bool {
        self.is_ground_concept
    }

    pub fn is_final(&self) -> bool {
        self.is_final_concept
    }

    /// Build the initial `Reference` for a ground concept from its raw
    /// JSON `reference_data`. Scalars and (possibly nested) lists are
    /// supported; the axes are `reference_axis_names` if given, otherwise
    /// `_none_axis` for a bare scalar.
    pub fn initial_reference(&self) -> Option<Reference> {
        if !self.is_ground_concept {
            return None;
        }
        Some(json_to_reference(&self.reference_data, &self.reference_axis_names))
    }
}

fn json_to_reference(value: &serde_json::Value, axis_names: &[String]) -> Reference {
    match value {
        serde_json::Value::Array(items) => {
            let axis = axis_names.first().cloned().unwrap_or_else(|| "_none_axis".to_string());
            let data: Vec<Cell> = items.iter().map(json_to_cell).collect();
            let len = data.len();
            Reference::new(vec![axis], vec![len], data).expect("shape matches data by construction")
        }
        other => Reference::scalar(Scalar::from_json(other).unwrap_or(Scalar::Null)),
    }
}

fn json_to_cell(value: &serde_json::Value) -> Cell {
    match value {
        serde_json::Value::Array(items) => Cell::List(items.iter().map(json_to_cell).collect()),
        serde_json::Value::Object(map) => {
            Cell::Dict(map.iter().map(|(k, v)| (k.clone(), json_to_cell(v))).collect())
        }
        other => Scalar::from_json(other).map(Cell::Scalar).unwrap_or(Cell::Skip),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_marker_maps_known_markers() {
        assert_eq!(TypeTag::from_marker("{}"), TypeTag::Object);
        assert_eq!(TypeTag::from_marker("<{}>"), TypeTag::Judgement);
        assert_eq!(TypeTag::from_marker("::({})"), TypeTag::Imperative);
    }

    #[test]
    fn from_marker_falls_back_to_operator() {
        assert_eq!(TypeTag::from_marker("???"), TypeTag::Operator);
    }

    #[test]
    fn ground_concept_builds_list_reference() {
        let concept = Concept {
            concept_name: "number_pair".into(),
            type_tag: TypeTag::Object,
            is_ground_concept: true,
            is_final_concept: false,
            is_invariant: false,
            reference_axis_names: vec!["digits".into()],
            reference_data: serde_json::json!(["123", "456"]),
        };
        let r = concept.initial_reference().unwrap();
        assert_eq!(r.axes, vec!["digits"]);
        assert_eq!(r.total_cells(), 2);
    }

    #[test]
    fn non_ground_concept_has_no_initial_reference() {
        let concept = Concept {
            concept_name: "x".into(),
            type_tag: TypeTag::Object,
            is_ground_concept: false,
            is_final_concept: false,
            is_invariant: false,
            reference_axis_names: vec![],
            reference_data: serde_json::Value::Null,
        };
        assert!(concept.initial_reference().is_none());
    }
}
