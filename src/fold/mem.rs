//! Folds for the memory-reference ops.

use smallvec::SmallVec;

use crate::fold::{FoldOutcome, FoldResult, InPlaceUpdate, single};
use crate::ir::{Module, OpId, OpKind, Value};
use crate::verify::mem::{
    cast_only_loses_information, infer_subview_type, is_permutation, is_trivial_subview, rank_reduction_mask,
    verify_cast_types,
};

use crate::attr::Attr;

/// When `value` comes through a cast that only erases static information,
/// the value the cast was fed with.
pub(crate) fn bypass_lossy_cast(module: &Module, value: Value) -> Option<Value> {
    let cast = module.defining_op_of(value, OpKind::Cast)?;
    let source = module.op(cast).operand(0);
    let source_ty = module.value_type(source);
    let result_ty = module.op(cast).result_type(0);
    if cast_only_loses_information(source_ty.as_memref()?, result_ty.as_memref()?) {
        Some(source)
    } else {
        None
    }
}

// =============================================================================
// cast
// =============================================================================

/// Identity casts fold away; chained casts fold to a single cast of the
/// original source when the composition is still a valid cast.
pub fn fold_cast(module: &Module, op: OpId) -> FoldOutcome {
    let source = module.op(op).operand(0);
    let result_ty = module.op(op).result_type(0);
    if module.value_type(source) == result_ty {
        return single(FoldResult::Existing(source));
    }
    if let Some(inner) = module.defining_op_of(source, OpKind::Cast) {
        let original = module.op(inner).operand(0);
        if verify_cast_types(&module.value_type(original), &result_ty).is_ok() {
            return FoldOutcome::InPlace(InPlaceUpdate {
                operands: SmallVec::from_iter([(0, original)]),
                ..Default::default()
            });
        }
    }
    FoldOutcome::Unchanged
}

// =============================================================================
// dim
// =============================================================================

/// `dim` with a constant index folds through static shapes, the dynamic-size
/// operands of allocations, and the size components of subviews. An
/// out-of-range index is permanently unfoldable, never an error.
pub fn fold_dim(module: &Module, op: OpId) -> FoldOutcome {
    let source = module.op(op).operand(0);
    if let Some(original) = bypass_lossy_cast(module, source) {
        return FoldOutcome::InPlace(InPlaceUpdate {
            operands: SmallVec::from_iter([(0, original)]),
            ..Default::default()
        });
    }
    let Some(index) = module.const_int(module.op(op).operand(1)) else {
        return FoldOutcome::Unchanged;
    };
    let source_ty = module.value_type(source);
    let Some(memref) = source_ty.as_memref() else {
        return FoldOutcome::Unchanged;
    };
    if index < 0 || index as usize >= memref.rank() {
        return FoldOutcome::Unchanged;
    }
    let dim = index as usize;
    if let Some(size) = memref.shape[dim].as_static() {
        return single(FoldResult::Constant(Attr::int(size)));
    }
    let Some(defining) = module.defining_op(source) else {
        return FoldOutcome::Unchanged;
    };
    match module.op(defining).kind() {
        OpKind::Alloc | OpKind::Alloca => {
            let position = memref.dynamic_dims_before(dim);
            single(FoldResult::Existing(module.op(defining).operand(position)))
        }
        OpKind::Subview => {
            let Some(groups) = module.mixed_operand_groups(defining) else {
                return FoldOutcome::Unchanged;
            };
            let (Some(offsets), Some(sizes), Some(strides)) = (
                module.dims_attr(defining, "static_offsets"),
                module.dims_attr(defining, "static_sizes"),
                module.dims_attr(defining, "static_strides"),
            ) else {
                return FoldOutcome::Unchanged;
            };
            let view_source_ty = module.value_type(module.op(defining).operand(0));
            let Some(view_source) = view_source_ty.as_memref() else {
                return FoldOutcome::Unchanged;
            };
            // Rank-reduced subviews drop unit dims; remap the result dim onto
            // the size list through the projection mask. A rank-preserving
            // subview gets an all-kept mask and maps the dim onto itself.
            let expected_ty = infer_subview_type(view_source, &offsets, &sizes, &strides);
            let Some(expected) = expected_ty.as_memref() else {
                return FoldOutcome::Unchanged;
            };
            let Some(mask) = rank_reduction_mask(expected, memref) else {
                return FoldOutcome::Unchanged;
            };
            let Some(position) = (0..sizes.len()).filter(|&i| !mask[i]).nth(dim) else {
                return FoldOutcome::Unchanged;
            };
            if let Some(size) = sizes[position].as_static() {
                return single(FoldResult::Constant(Attr::int(size)));
            }
            let before = sizes[..position].iter().filter(|s| s.is_dynamic()).count();
            single(FoldResult::Existing(groups[1][before]))
        }
        _ => FoldOutcome::Unchanged,
    }
}

// =============================================================================
// subview
// =============================================================================

/// A subview that selects the whole source with unit strides and keeps the
/// source type is the source.
pub fn fold_subview(module: &Module, op: OpId) -> FoldOutcome {
    let source = module.op(op).operand(0);
    let source_ty = module.value_type(source);
    let Some(memref) = source_ty.as_memref() else {
        return FoldOutcome::Unchanged;
    };
    let (Some(offsets), Some(sizes), Some(strides)) = (
        module.dims_attr(op, "static_offsets"),
        module.dims_attr(op, "static_sizes"),
        module.dims_attr(op, "static_strides"),
    ) else {
        return FoldOutcome::Unchanged;
    };
    if module.op(op).result_type(0) == source_ty && is_trivial_subview(memref, &offsets, &sizes, &strides) {
        return single(FoldResult::Existing(source));
    }
    FoldOutcome::Unchanged
}

// =============================================================================
// transpose
// =============================================================================

fn compose_permutations(outer: &[i64], inner: &[i64]) -> Vec<i64> {
    outer.iter().map(|&p| inner[p as usize]).collect()
}

/// Identity transposes fold away; `transpose(transpose(x))` composes the
/// permutations and reads from `x` directly.
pub fn fold_transpose(module: &Module, op: OpId) -> FoldOutcome {
    let source = module.op(op).operand(0);
    let Some(permutation) = module.op(op).attr("permutation").and_then(|a| a.as_int_array().map(<[i64]>::to_vec))
    else {
        return FoldOutcome::Unchanged;
    };
    let identity = permutation.iter().enumerate().all(|(i, &p)| p == i as i64);
    if identity && module.op(op).result_type(0) == module.value_type(source) {
        return single(FoldResult::Existing(source));
    }
    if let Some(inner) = module.defining_op_of(source, OpKind::Transpose) {
        let Some(inner_permutation) =
            module.op(inner).attr("permutation").and_then(|a| a.as_int_array().map(<[i64]>::to_vec))
        else {
            return FoldOutcome::Unchanged;
        };
        let original = module.op(inner).operand(0);
        let rank = match module.value_type(original).as_memref() {
            Some(m) => m.rank(),
            None => return FoldOutcome::Unchanged,
        };
        if !is_permutation(&permutation, rank) || !is_permutation(&inner_permutation, rank) {
            return FoldOutcome::Unchanged;
        }
        let composed = compose_permutations(&permutation, &inner_permutation);
        return FoldOutcome::InPlace(InPlaceUpdate {
            operands: SmallVec::from_iter([(0, original)]),
            attrs: SmallVec::from_iter([("permutation", Attr::int_array(composed))]),
            ..Default::default()
        });
    }
    FoldOutcome::Unchanged
}

// =============================================================================
// reinterpret_cast
// =============================================================================

/// The declared layout fully overrides the source layout, so the source can
/// be bypassed through any `cast` or earlier `reinterpret_cast`. A
/// reinterpret that reproduces the fully-static source type folds away.
pub fn fold_reinterpret_cast(module: &Module, op: OpId) -> FoldOutcome {
    let source = module.op(op).operand(0);
    let source_ty = module.value_type(source);
    let result_ty = module.op(op).result_type(0);
    if source_ty == result_ty {
        if let Some(memref) = source_ty.as_memref() {
            if memref.is_static_shape() && memref.has_static_layout() {
                return single(FoldResult::Existing(source));
            }
        }
    }
    if let Some(defining) = module.defining_op(source) {
        match module.op(defining).kind() {
            OpKind::Cast | OpKind::ReinterpretCast => {
                let original = module.op(defining).operand(0);
                if module.value_type(original).memref_element_and_space()
                    == source_ty.memref_element_and_space()
                {
                    return FoldOutcome::InPlace(InPlaceUpdate {
                        operands: SmallVec::from_iter([(0, original)]),
                        ..Default::default()
                    });
                }
            }
            _ => {}
        }
    }
    FoldOutcome::Unchanged
}

// =============================================================================
// expand_shape / collapse_shape
// =============================================================================

fn reassociation(module: &Module, op: OpId) -> Option<Vec<Vec<i64>>> {
    module.op(op).attr("reassociation").and_then(|a| a.as_int_groups().map(<[Vec<i64>]>::to_vec))
}

fn fold_reshape_pair(module: &Module, op: OpId, inverse: OpKind) -> FoldOutcome {
    let source = module.op(op).operand(0);
    let result_ty = module.op(op).result_type(0);
    let Some(groups) = reassociation(module, op) else {
        return FoldOutcome::Unchanged;
    };
    // Trivial reassociation: every group a singleton and the type unchanged.
    if groups.iter().all(|g| g.len() == 1) && module.value_type(source) == result_ty {
        return single(FoldResult::Existing(source));
    }
    if let Some(inner) = module.defining_op_of(source, inverse) {
        let original = module.op(inner).operand(0);
        if reassociation(module, inner).as_deref() == Some(&groups[..]) && module.value_type(original) == result_ty {
            return single(FoldResult::Existing(original));
        }
    }
    FoldOutcome::Unchanged
}

pub fn fold_expand_shape(module: &Module, op: OpId) -> FoldOutcome {
    fold_reshape_pair(module, op, OpKind::CollapseShape)
}

pub fn fold_collapse_shape(module: &Module, op: OpId) -> FoldOutcome {
    let source = module.op(op).operand(0);
    if let Some(original) = bypass_lossy_cast(module, source) {
        return FoldOutcome::InPlace(InPlaceUpdate {
            operands: SmallVec::from_iter([(0, original)]),
            ..Default::default()
        });
    }
    fold_reshape_pair(module, op, OpKind::ExpandShape)
}

// =============================================================================
// atomic_rmw
// =============================================================================

/// The memref operand bypasses casts that only erase static information.
pub fn fold_atomic_rmw(module: &Module, op: OpId) -> FoldOutcome {
    let memref = module.op(op).operand(1);
    if let Some(original) = bypass_lossy_cast(module, memref) {
        return FoldOutcome::InPlace(InPlaceUpdate {
            operands: SmallVec::from_iter([(1, original)]),
            ..Default::default()
        });
    }
    FoldOutcome::Unchanged
}

// =============================================================================
// extract_metadata
// =============================================================================

/// Per-result partial fold: the offset, size and stride results resolve to
/// constants wherever the source layout is static. Results without uses are
/// skipped by the driver, so a partially static source still folds as far as
/// it can.
pub fn fold_extract_metadata(module: &Module, op: OpId) -> FoldOutcome {
    let source_ty = module.value_type(module.op(op).operand(0));
    let Some(memref) = source_ty.as_memref() else {
        return FoldOutcome::Unchanged;
    };
    let rank = memref.rank();
    let (offset, strides) = memref.offset_and_strides();
    let mut results: SmallVec<[Option<FoldResult>; 2]> = SmallVec::new();
    results.push(None);
    results.push(offset.as_static().map(|v| FoldResult::Constant(Attr::int(v))));
    for dim in 0..rank {
        results.push(memref.shape[dim].as_static().map(|v| FoldResult::Constant(Attr::int(v))));
    }
    for dim in 0..rank {
        results.push(strides[dim].as_static().map(|v| FoldResult::Constant(Attr::int(v))));
    }
    if results.iter().all(Option::is_none) {
        return FoldOutcome::Unchanged;
    }
    FoldOutcome::Results(results)
}
