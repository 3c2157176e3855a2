//! The `Reference` tensor type itself and the row-major index arithmetic
//! the operators in [`super::ops`] build on.

use serde::{Deserialize, Serialize};

use super::cell::{Cell, Scalar};
use super::error::{RefError, Result};

/// The sentinel axis name denoting a singleton scalar reference.
pub const NONE_AXIS: &str = "_none_axis";

/// How a reference's cells should be interpreted. Advisory only: not
/// enforced beyond operator pre-conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum ElementTypeHint {
    #[default]
    Scalar,
    Dict(Option<String>),
    PerceptualSign,
    TruthValue,
    Paradigm,
}

/// An N-dimensional tensor with named axes.
///
/// `data` is stored flat, row-major (last axis varies fastest), rather than
/// as a literal nested `Vec<Vec<..>>`: this makes `slice`/`project`/
/// `collapse` index arithmetic rather than recursive tree surgery, at the
/// cost of needing stride bookkeeping. `axes.len() == shape.len()` and
/// `data.len() == shape.iter().product()` are maintained as invariants by
/// every constructor and operator in this module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub axes: Vec<String>,
    pub shape: Vec<usize>,
    pub data: Vec<Cell>,
    #[serde(default)]
    pub element_type_hint: ElementTypeHint,
}

impl Reference {
    /// Construct a reference, validating that axes are unique and the
    /// shape matches the data length.
    pub fn new(axes: Vec<String>, shape: Vec<usize>, data: Vec<Cell>) -> Result<Self> {
        if axes.len() != shape.len() {
            return Err(RefError::ShapeMismatch(format!(
                "{} axes but {} shape entries",
                axes.len(),
                shape.len()
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for axis in &axes {
            if !seen.insert(axis.clone()) {
                return Err(RefError::AxisDuplicate(axis.clone()));
            }
        }
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(RefError::ShapeMismatch(format!(
                "shape {:?} implies {} cells but got {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            axes,
            shape,
            data,
            element_type_hint: ElementTypeHint::default(),
        })
    }

    pub fn with_hint(mut self, hint: ElementTypeHint) -> Self {
        self.element_type_hint = hint;
        self
    }

    /// A singleton scalar reference on `_none_axis`.
    pub fn scalar(value: Scalar) -> Self {
        Self {
            axes: vec![NONE_AXIS.to_string()],
            shape: vec![1],
            data: vec![Cell::Scalar(value)],
            element_type_hint: ElementTypeHint::Scalar,
        }
    }

    /// An empty (all-`Skip`) reference with the given declared axes/shape —
    /// used by skip propagation when a parent inference is skipped.
    pub fn empty(axes: Vec<String>, shape: Vec<usize>) -> Result<Self> {
        let count: usize = shape.iter().product();
        Self::new(axes, shape, vec![Cell::Skip; count])
    }

    pub fn total_cells(&self) -> usize {
        self.data.len()
    }

    pub fn rank(&self) -> usize {
        self.axes.len()
    }

    pub fn axis_position(&self, axis: &str) -> Option<usize> {
        self.axes.iter().position(|a| a == axis)
    }

    pub fn axis_size(&self, axis: &str) -> Result<usize> {
        let pos = self
            .axis_position(axis)
            .ok_or_else(|| RefError::AxisUnknown(axis.to_string()))?;
        Ok(self.shape[pos])
    }

    /// Row-major strides: `strides[i]` is the number of flat cells spanned
    /// by incrementing axis `i` by one.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1usize; self.shape.len()];
        for i in (0..self.shape.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * self.shape[i + 1];
        }
        strides
    }

    pub fn flat_index(&self, multi: &[usize]) -> usize {
        let strides = self.strides();
        multi.iter().zip(strides.iter()).map(|(i, s)| i * s).sum()
    }

    /// Decompose a flat index into a per-axis multi-index.
    pub fn multi_index(&self, mut flat: usize) -> Vec<usize> {
        let strides = self.strides();
        let mut out = vec![0usize; self.shape.len()];
        for (i, stride) in strides.iter().enumerate() {
            out[i] = flat / stride;
            flat %= stride;
        }
        out
    }

    /// Iterate every multi-index in row-major order.
    pub fn iter_multi_indices(&self) -> impl Iterator<Item = Vec<usize>> + '_ {
        (0..self.total_cells()).map(move |flat| self.multi_index(flat))
    }

    pub fn get(&self, multi: &[usize]) -> &Cell {
        &self.data[self.flat_index(multi)]
    }

    /// Linearised leaf extraction, excluding `Skip`.
    pub fn get_leaves(&self) -> Vec<Cell> {
        self.data.iter().filter(|c| !c.is_skip()).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_reference_has_none_axis() {
        let r = Reference::scalar(Scalar::Int(42));
        assert_eq!(r.axes, vec![NONE_AXIS]);
        assert_eq!(r.shape, vec![1]);
        assert_eq!(r.total_cells(), 1);
    }

    #[test]
    fn rejects_mismatched_shape() {
        let err = Reference::new(
            vec!["a".into()],
            vec![2],
            vec![Cell::Scalar(Scalar::Int(1))],
        )
        .unwrap_err();
        assert!(matches!(err, RefError::ShapeMismatch(_)));
    }

    #[test]
    fn rejects_duplicate_axes() {
        let err = Reference::new(
            vec!["a".into(), "a".into()],
            vec![1, 1],
            vec![Cell::Scalar(Scalar::Int(1))],
        )
        .unwrap_err();
        assert!(matches!(err, RefError::AxisDuplicate(_)));
    }

    #[test]
    fn strides_and_multi_index_round_trip() {
        // axes a (size 2), b (size 3): row-major means b varies fastest.
        let data: Vec<Cell> = (0..6).map(|i| Cell::Scalar(Scalar::Int(i))).collect();
        let r = Reference::new(vec!["a".into(), "b".into()], vec![2, 3], data).unwrap();
        assert_eq!(r.strides(), vec![3, 1]);
        for flat in 0..6 {
            let multi = r.multi_index(flat);
            assert_eq!(r.flat_index(&multi), flat);
        }
        assert_eq!(r.get(&[1, 2]), &Cell::Scalar(Scalar::Int(5)));
    }

    #[test]
    fn get_leaves_excludes_skip() {
        let r = Reference::new(
            vec!["a".into()],
            vec![3],
            vec![Cell::Scalar(Scalar::Int(1)), Cell::Skip, Cell::Scalar(Scalar::Int(3))],
        )
        .unwrap();
        assert_eq!(r.get_leaves(), vec![Cell::Scalar(Scalar::Int(1)), Cell::Scalar(Scalar::Int(3))]);
    }
}
