//! The reference-algebra operators. All operators are pure: they read
//! `&Reference` inputs and return a new `Reference`, never mutating in
//! place.

use std::collections::BTreeMap;

use super::cell::Cell;
use super::error::{RefError, Result};
use super::reference::{Reference, NONE_AXIS};
use super::truth_mask::TruthMask;

/// Fix `axis` at `index`, removing that axis from the result.
pub fn slice(reference: &Reference, axis: &str, index: usize) -> Result<Reference> {
    let pos = reference
        .axis_position(axis)
        .ok_or_else(|| RefError::AxisUnknown(axis.to_string()))?;
    let size = reference.shape[pos];
    if index >= size {
        return Err(RefError::IndexOutOfBounds {
            axis: axis.to_string(),
            index,
            size,
        });
    }

    let mut new_axes = reference.axes.clone();
    let mut new_shape = reference.shape.clone();
    new_axes.remove(pos);
    new_shape.remove(pos);

    let new_total: usize = new_shape.iter().product();
    let mut data = Vec::with_capacity(new_total);
    for flat in 0..new_total {
        let sub_multi = multi_index_for(&new_shape, flat);
        let mut full_multi = sub_multi;
        full_multi.insert(pos, index);
        data.push(reference.get(&full_multi).clone());
    }
    Reference::new(new_axes, new_shape, data)
}

/// Retain only `keep_axes` (in the given order); every other axis must be
/// a singleton (shape 1) and is dropped.
pub fn project(reference: &Reference, keep_axes: &[String]) -> Result<Reference> {
    let mut current = reference.clone();
    // Drop non-kept axes from the back so positions of earlier axes are
    // unaffected.
    let mut i = current.axes.len();
    while i > 0 {
        i -= 1;
        let axis = current.axes[i].clone();
        if !keep_axes.iter().any(|k| k == &axis) {
            if current.shape[i] != 1 {
                return Err(RefError::NotSingleton(axis));
            }
            current = slice(&current, &axis, 0)?;
        }
    }
    permute(&current, keep_axes)
}

/// Reorder axes to match `new_order` exactly (a transpose).
pub fn permute(reference: &Reference, new_order: &[String]) -> Result<Reference> {
    if new_order.len() != reference.axes.len() {
        return Err(RefError::ShapeMismatch(format!(
            "permute expected {} axes, got {}",
            reference.axes.len(),
            new_order.len()
        )));
    }
    let mut positions = Vec::with_capacity(new_order.len());
    for axis in new_order {
        positions.push(
            reference
                .axis_position(axis)
                .ok_or_else(|| RefError::AxisUnknown(axis.clone()))?,
        );
    }
    let new_shape: Vec<usize> = positions.iter().map(|&p| reference.shape[p]).collect();
    let new_total: usize = new_shape.iter().product();
    let mut data = Vec::with_capacity(new_total);
    for flat in 0..new_total {
        let new_multi = multi_index_for(&new_shape, flat);
        let mut old_multi = vec![0usize; reference.axes.len()];
        for (new_axis_idx, &old_axis_idx) in positions.iter().enumerate() {
            old_multi[old_axis_idx] = new_multi[new_axis_idx];
        }
        data.push(reference.get(&old_multi).clone());
    }
    Reference::new(new_order.to_vec(), new_shape, data)
}

/// Align `refs` on `shared_axes` (which must agree in size across every
/// ref) and combine into a reference whose axes are the first-occurrence
/// union of every input's axes. Non-shared axes become independent
/// dimensions (a Cartesian product). Each output cell is a `Cell::List` of
/// the corresponding cell from every input, in input order — this is the
/// grouping handler's shared-axis combination mode.
///
/// Empty `shared_axes` degenerates to the full Cartesian product over every
/// axis of every input.
pub fn cross_product(refs: &[Reference], shared_axes: &[String]) -> Result<Reference> {
    if refs.is_empty() {
        return Reference::new(vec![NONE_AXIS.to_string()], vec![0], vec![]);
    }

    for shared in shared_axes {
        let mut size = None;
        for r in refs {
            let s = r.axis_size(shared)?;
            match size {
                None => size = Some(s),
                Some(expected) if expected != s => {
                    return Err(RefError::ShapeMismatch(format!(
                        "shared axis '{shared}' has size {s} in one ref and {expected} in another"
                    )))
                }
                _ => {}
            }
        }
    }

    // Union axes: shared axes first (input order of first occurrence),
    // then each ref's private axes in input order.
    let mut union_axes: Vec<String> = Vec::new();
    let mut union_shape: Vec<usize> = Vec::new();
    for shared in shared_axes {
        union_axes.push(shared.clone());
        union_shape.push(refs[0].axis_size(shared)?);
    }
    // (ref_index, axis_name) for every private axis, in first-occurrence
    // order across refs.
    let mut private_axes: Vec<(usize, String)> = Vec::new();
    for (ri, r) in refs.iter().enumerate() {
        for axis in &r.axes {
            if !shared_axes.contains(axis) {
                union_axes.push(axis.clone());
                union_shape.push(r.axis_size(axis)?);
                private_axes.push((ri, axis.clone()));
            }
        }
    }

    let total: usize = union_shape.iter().product();
    let mut data = Vec::with_capacity(total);
    for flat in 0..total {
        let multi = multi_index_for(&union_shape, flat);
        let shared_vals = &multi[..shared_axes.len()];
        let private_vals = &multi[shared_axes.len()..];

        let mut combined = Vec::with_capacity(refs.len());
        for (ri, r) in refs.iter().enumerate() {
            let mut sub_multi = vec![0usize; r.axes.len()];
            for (i, shared) in shared_axes.iter().enumerate() {
                let pos = r.axis_position(shared).expect("validated above");
                sub_multi[pos] = shared_vals[i];
            }
            for (pi, (owner, axis)) in private_axes.iter().enumerate() {
                if *owner == ri {
                    let pos = r.axis_position(axis).expect("exists by construction");
                    sub_multi[pos] = private_vals[pi];
                }
            }
            combined.push(r.get(&sub_multi).clone());
        }
        data.push(Cell::List(combined));
    }
    Reference::new(union_axes, union_shape, data)
}

/// Flatten `axes_to_remove`, yielding for each surviving multi-index a
/// `Cell::List` of the values that varied over the removed axes, in
/// row-major insertion order. Removing every axis yields a singleton
/// reference (`_none_axis`) holding one list of every original cell.
pub fn collapse(reference: &Reference, axes_to_remove: &[String]) -> Result<Reference> {
    for axis in axes_to_remove {
        if reference.axis_position(axis).is_none() {
            return Err(RefError::AxisUnknown(axis.clone()));
        }
    }

    let remove_positions: Vec<usize> = axes_to_remove
        .iter()
        .map(|a| reference.axis_position(a).unwrap())
        .collect();
    let keep_positions: Vec<usize> = (0..reference.axes.len())
        .filter(|p| !remove_positions.contains(p))
        .collect();

    if keep_positions.is_empty() {
        // Collapse over every axis: one list containing every cell, in
        // this reference's existing row-major order.
        return Reference::new(vec![NONE_AXIS.to_string()], vec![1], vec![Cell::List(reference.data.clone())]);
    }

    let keep_axes: Vec<String> = keep_positions.iter().map(|&p| reference.axes[p].clone()).collect();
    let keep_shape: Vec<usize> = keep_positions.iter().map(|&p| reference.shape[p]).collect();
    let remove_shape: Vec<usize> = remove_positions.iter().map(|&p| reference.shape[p]).collect();

    let keep_total: usize = keep_shape.iter().product();
    let remove_total: usize = remove_shape.iter().product::<usize>().max(1);

    let mut data = Vec::with_capacity(keep_total);
    for keep_flat in 0..keep_total {
        let keep_multi = multi_index_for(&keep_shape, keep_flat);
        let mut group = Vec::with_capacity(remove_total);
        for remove_flat in 0..remove_total {
            let remove_multi = if remove_shape.is_empty() {
                vec![]
            } else {
                multi_index_for(&remove_shape, remove_flat)
            };
            let mut full_multi = vec![0usize; reference.axes.len()];
            for (i, &pos) in keep_positions.iter().enumerate() {
                full_multi[pos] = keep_multi[i];
            }
            for (i, &pos) in remove_positions.iter().enumerate() {
                full_multi[pos] = remove_multi[i];
            }
            group.push(reference.get(&full_multi).clone());
        }
        data.push(Cell::List(group));
    }
    Reference::new(keep_axes, keep_shape, data)
}

/// Turn every `Cell::List` leaf into a `Cell::Dict` keyed by `names`
/// (`names.len()` must equal the list length for every leaf).
pub fn annotate(reference: &Reference, names: &[String]) -> Result<Reference> {
    let mut data = Vec::with_capacity(reference.data.len());
    for cell in &reference.data {
        data.push(annotate_cell(cell, names)?);
    }
    Reference::new(reference.axes.clone(), reference.shape.clone(), data)
}

fn annotate_cell(cell: &Cell, names: &[String]) -> Result<Cell> {
    match cell {
        Cell::Skip => Ok(Cell::Skip),
        Cell::List(items) => {
            if items.len() != names.len() {
                return Err(RefError::ShapeMismatch(format!(
                    "annotate expected {} names for a {}-element leaf",
                    names.len(),
                    items.len()
                )));
            }
            let mut map = BTreeMap::new();
            for (name, item) in names.iter().zip(items.iter()) {
                map.insert(name.clone(), item.clone());
            }
            Ok(Cell::Dict(map))
        }
        other => Err(RefError::ShapeMismatch(format!(
            "annotate requires list leaves, found {other:?}"
        ))),
    }
}

/// Recursively flatten list-of-lists leaves into a single flat list per
/// cell.
pub fn flatten_leaves(reference: &Reference) -> Result<Reference> {
    let data = reference.data.iter().map(flatten_cell).collect();
    Reference::new(reference.axes.clone(), reference.shape.clone(), data)
}

fn flatten_cell(cell: &Cell) -> Cell {
    match cell {
        Cell::List(items) => {
            let mut flat = Vec::with_capacity(items.len());
            for item in items {
                match flatten_cell(item) {
                    Cell::List(inner) => flat.extend(inner),
                    other => flat.push(other),
                }
            }
            Cell::List(flat)
        }
        other => other.clone(),
    }
}

/// For every cell along `filter_axis`, replace it with `Skip` where `mask`
/// is false at that position; other axes are untouched.
pub fn apply_truth_mask(reference: &Reference, mask: &TruthMask, filter_axis: &str) -> Result<Reference> {
    let size = reference.axis_size(filter_axis)?;
    let bools = mask.broadcast(size);
    if bools.len() != size {
        return Err(RefError::ShapeMismatch(format!(
            "truth mask has {} entries but axis '{}' has size {}",
            bools.len(),
            filter_axis,
            size
        )));
    }

    let pos = reference.axis_position(filter_axis).unwrap();
    let mut data = reference.data.clone();
    for (flat, cell) in data.iter_mut().enumerate() {
        let multi = reference.multi_index(flat);
        if !bools[multi[pos]] {
            *cell = Cell::Skip;
        }
    }
    Reference::new(reference.axes.clone(), reference.shape.clone(), data)
}

/// Stack `refs` along a new axis `create_axis`. Every ref must share the
/// same remaining axes/shape. `names`, if given, must have one entry per
/// ref and is used to annotate each ref's whole cell set with
/// `Dict{name: cell}` before stacking.
pub fn concat(refs: &[Reference], create_axis: &str, names: Option<&[String]>) -> Result<Reference> {
    if refs.is_empty() {
        return Reference::new(vec![create_axis.to_string()], vec![0], vec![]);
    }
    if let Some(names) = names {
        if names.len() != refs.len() {
            return Err(RefError::ShapeMismatch(format!(
                "concat given {} names for {} refs",
                names.len(),
                refs.len()
            )));
        }
    }

    let base_axes = &refs[0].axes;
    let base_shape = &refs[0].shape;
    for r in &refs[1..] {
        if &r.axes != base_axes || &r.shape != base_shape {
            return Err(RefError::ShapeMismatch(
                "concat requires every ref to share axes and shape".to_string(),
            ));
        }
    }
    if base_axes.iter().any(|a| a == create_axis) {
        return Err(RefError::AxisDuplicate(create_axis.to_string()));
    }

    let mut new_axes = vec![create_axis.to_string()];
    new_axes.extend(base_axes.iter().cloned());
    let mut new_shape = vec![refs.len()];
    new_shape.extend(base_shape.iter().copied());

    let mut data = Vec::with_capacity(new_shape.iter().product());
    for (i, r) in refs.iter().enumerate() {
        for cell in &r.data {
            let wrapped = match names {
                Some(names) => {
                    let mut map = BTreeMap::new();
                    map.insert(names[i].clone(), cell.clone());
                    Cell::Dict(map)
                }
                None => cell.clone(),
            };
            data.push(wrapped);
        }
    }
    Reference::new(new_axes, new_shape, data)
}

/// Linearised leaf extraction excluding `Skip` (delegates to
/// `Reference::get_leaves`; kept as a free function for symmetry with the
/// other operators in this module).
pub fn get_leaves(reference: &Reference) -> Vec<Cell> {
    reference.get_leaves()
}

fn multi_index_for(shape: &[usize], mut flat: usize) -> Vec<usize> {
    let mut strides = vec![1usize; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    let mut out = vec![0usize; shape.len()];
    for (i, stride) in strides.iter().enumerate() {
        out[i] = flat / stride;
        flat %= stride;
    }
    out
}
