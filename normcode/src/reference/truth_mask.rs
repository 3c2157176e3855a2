//! Truth masks produced by judgement handlers and consumed by
//! `apply_truth_mask` / timing gates.

use serde::{Deserialize, Serialize};

/// The result of evaluating a judgement's quantifier over a tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TruthMask {
    /// `ALL True` / `ANY True` / `ALL False` reduce to one boolean that
    /// applies uniformly wherever the mask is consulted.
    Global(bool),
    /// `FOR EACH True` keeps one boolean per cell along `axis`.
    PerCell { axis: String, values: Vec<bool> },
}

/// The quantifier a judgement's working interpretation names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quantifier {
    AllTrue,
    AnyTrue,
    ForEachTrue,
    AllFalse,
}

impl Quantifier {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "ALL True" => Some(Quantifier::AllTrue),
            "ANY True" => Some(Quantifier::AnyTrue),
            "FOR EACH True" => Some(Quantifier::ForEachTrue),
            "ALL False" => Some(Quantifier::AllFalse),
            _ => None,
        }
    }

    /// Apply this quantifier to a list of per-cell booleans (already
    /// extracted from a tool result reference along some axis).
    pub fn evaluate(self, axis: &str, bools: Vec<bool>) -> TruthMask {
        match self {
            Quantifier::AllTrue => TruthMask::Global(bools.iter().all(|b| *b)),
            Quantifier::AnyTrue => TruthMask::Global(bools.iter().any(|b| *b)),
            Quantifier::AllFalse => TruthMask::Global(bools.iter().all(|b| !*b)),
            Quantifier::ForEachTrue => TruthMask::PerCell {
                axis: axis.to_string(),
                values: bools,
            },
        }
    }
}

impl TruthMask {
    /// Does this mask, taken as a whole, assert truth? Used by timing gates
    /// (`@:'`/`@:!`) which only care about the aggregate outcome, not the
    /// per-cell breakdown.
    pub fn is_true(&self) -> bool {
        match self {
            TruthMask::Global(b) => *b,
            TruthMask::PerCell { values, .. } => values.iter().all(|v| *v),
        }
    }

    /// Per-cell boolean vector of length `len`, broadcasting a `Global`
    /// mask uniformly.
    pub fn broadcast(&self, len: usize) -> Vec<bool> {
        match self {
            TruthMask::Global(b) => vec![*b; len],
            TruthMask::PerCell { values, .. } => values.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantifiers_reduce_correctly() {
        let bools = vec![true, true, false];
        assert_eq!(Quantifier::AllTrue.evaluate("x", bools.clone()), TruthMask::Global(false));
        assert_eq!(Quantifier::AnyTrue.evaluate("x", bools.clone()), TruthMask::Global(true));
        assert_eq!(Quantifier::AllFalse.evaluate("x", bools.clone()), TruthMask::Global(false));
        assert_eq!(
            Quantifier::ForEachTrue.evaluate("x", bools.clone()),
            TruthMask::PerCell {
                axis: "x".into(),
                values: bools
            }
        );
    }

    #[test]
    fn global_mask_broadcasts() {
        let mask = TruthMask::Global(true);
        assert_eq!(mask.broadcast(3), vec![true, true, true]);
    }

    #[test]
    fn parse_rejects_unknown_strings() {
        assert_eq!(Quantifier::parse("SOME True"), None);
        assert_eq!(Quantifier::parse("ALL True"), Some(Quantifier::AllTrue));
    }
}
