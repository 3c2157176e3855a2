//! The leaf/cell value types a [`super::Reference`] holds.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A scalar leaf value. Kept deliberately small — the engine treats scalars
/// opaquely and never interprets their contents beyond what a sequence
/// handler's working interpretation asks for (e.g. a selector comparing a
/// `Scalar::Text` against a literal).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Null => write!(f, "null"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Float(x) => write!(f, "{x}"),
            Scalar::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Scalar::Int(i)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

impl Scalar {
    /// Convert to/from the loosely-typed JSON the plan artifact and the
    /// `BodyInterface` exchange. Unrepresentable JSON (e.g. a bare array or
    /// object showing up where a scalar was expected) is rejected by the
    /// caller, not here.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(Scalar::Null),
            serde_json::Value::Bool(b) => Some(Scalar::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Scalar::Int(i))
                } else {
                    n.as_f64().map(Scalar::Float)
                }
            }
            serde_json::Value::String(s) => Some(Scalar::Text(s.clone())),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Scalar::Null => serde_json::Value::Null,
            Scalar::Bool(b) => serde_json::Value::Bool(*b),
            Scalar::Int(i) => serde_json::json!(*i),
            Scalar::Float(x) => serde_json::json!(*x),
            Scalar::Text(s) => serde_json::Value::String(s.clone()),
        }
    }

    /// Truthiness used by judgement quantifiers when a tool result cell is
    /// not already a `Bool`.
    pub fn is_truthy(&self) -> bool {
        match self {
            Scalar::Null => false,
            Scalar::Bool(b) => *b,
            Scalar::Int(i) => *i != 0,
            Scalar::Float(x) => *x != 0.0,
            Scalar::Text(s) => !s.is_empty(),
        }
    }
}

/// A single cell of a [`super::Reference`]'s flattened, row-major data
/// vector. `Skip` is the sentinel produced by `apply_truth_mask` and by skip
/// propagation for a filtered-out or skipped cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    Skip,
    Scalar(Scalar),
    /// Produced by `annotate`: a leaf list turned into a named mapping.
    /// `BTreeMap` keeps key order deterministic for canonical serialization.
    Dict(BTreeMap<String, Cell>),
    /// Produced by `collapse`/`concat`: an ordered grouping of cells.
    List(Vec<Cell>),
}

impl Cell {
    pub fn is_skip(&self) -> bool {
        matches!(self, Cell::Skip)
    }

    pub fn as_list(&self) -> Option<&[Cell]> {
        match self {
            Cell::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Cell::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Truthiness for judgement quantifiers: `Skip` is never true, `List`
    /// collapses to "any element truthy" only when explicitly asked via
    /// `TruthMask` quantifiers (this helper answers the single-cell case).
    pub fn is_truthy(&self) -> bool {
        match self {
            Cell::Skip => false,
            Cell::Scalar(s) => s.is_truthy(),
            Cell::Dict(_) => true,
            Cell::List(items) => !items.is_empty(),
        }
    }
}
