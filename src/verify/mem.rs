//! Verifiers for the memory-reference ops.
//!
//! The type-inference helpers (`infer_subview_type`, the rank-reduction
//! projection check, cast compatibility) are shared with the folders and
//! canonicalization patterns, which recompute result types when they bypass
//! casts or rewrite slices.

use smallvec::SmallVec;
use snafu::ensure;

use crate::error::{
    AllocaOutsideScopeSnafu, AtomicKindMismatchSnafu, DimSizeMismatchSnafu, DynamicSizeCountMismatchSnafu,
    ElementTypeMismatchSnafu, ExpectedRankedMemRefSnafu, GroupDynamicityMismatchSnafu, GroupSizeMismatchSnafu,
    InvalidPermutationSnafu, MemorySpaceMismatchSnafu, MissingAttributeSnafu, NonContiguousGroupSnafu,
    NotIndexTypeSnafu, OffsetMismatchSnafu, OperandCountMismatchSnafu, RankMismatchSnafu,
    ReassociationGroupCountSnafu, ReassociationNotContiguousSnafu, ReinterpretMismatchSnafu, Result,
    ResultCountMismatchSnafu, SliceArityMismatchSnafu, StrideMismatchSnafu, SubscriptCountMismatchSnafu,
    SubviewTypeMismatchSnafu, TransposeResultMismatchSnafu, UnrankedCastUnsupportedSnafu,
};
use crate::ir::{Module, OpId, OpKind};
use crate::sdim::SDim;
use crate::types::{Layout, MemRefType, Shape, Type};

/// Two static-or-dynamic quantities that do not provably disagree.
pub(crate) fn dims_compatible(a: SDim, b: SDim) -> bool {
    match (a.as_static(), b.as_static()) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

// =============================================================================
// Allocation
// =============================================================================

fn verify_alloc_like(module: &Module, op: OpId) -> Result<()> {
    let operation = module.op(op);
    let name = operation.kind().name();
    ensure!(
        operation.num_results() == 1,
        ResultCountMismatchSnafu { op: name, expected: 1usize, actual: operation.num_results() }
    );
    let ty = operation.result_type(0);
    let memref = ty.as_memref().ok_or_else(|| {
        ExpectedRankedMemRefSnafu { op: name, actual: ty.clone() }.build()
    })?;
    ensure!(
        operation.num_operands() == memref.dynamic_dim_count(),
        DynamicSizeCountMismatchSnafu {
            expected: memref.dynamic_dim_count(),
            actual: operation.num_operands(),
            ty: ty.clone(),
        }
    );
    for &operand in operation.operands() {
        let operand_ty = module.value_type(operand);
        ensure!(operand_ty.is_index(), NotIndexTypeSnafu { actual: operand_ty });
    }
    Ok(())
}

pub fn verify_alloc(module: &Module, op: OpId) -> Result<()> {
    verify_alloc_like(module, op)
}

/// `alloca` additionally needs an ancestor that opens an automatic
/// allocation scope. The module body itself does not count.
pub fn verify_alloca(module: &Module, op: OpId) -> Result<()> {
    verify_alloc_like(module, op)?;
    let mut current = module.parent_op(op);
    while let Some(ancestor) = current {
        if module.op(ancestor).kind().has_allocation_scope() {
            return Ok(());
        }
        current = module.parent_op(ancestor);
    }
    AllocaOutsideScopeSnafu.fail()
}

pub fn verify_dealloc(module: &Module, op: OpId) -> Result<()> {
    let operation = module.op(op);
    ensure!(
        operation.num_operands() == 1,
        OperandCountMismatchSnafu { op: "dealloc", expected: 1usize, actual: operation.num_operands() }
    );
    let ty = module.value_type(operation.operand(0));
    ensure!(
        ty.memref_element_and_space().is_some(),
        ExpectedRankedMemRefSnafu { op: "dealloc", actual: ty }
    );
    Ok(())
}

// =============================================================================
// Access
// =============================================================================

fn ranked_operand(module: &Module, op: OpId, index: usize, name: &'static str) -> Result<MemRefType> {
    let ty = module.value_type(module.op(op).operand(index));
    match ty.as_memref() {
        Some(m) => Ok(m.clone()),
        None => ExpectedRankedMemRefSnafu { op: name, actual: ty }.fail(),
    }
}

fn verify_subscripts(module: &Module, op: OpId, name: &'static str, rank: usize, indices: &[crate::ir::Value]) -> Result<()> {
    ensure!(
        indices.len() == rank,
        SubscriptCountMismatchSnafu { op: name, rank, subscripts: indices.len() }
    );
    for &index in indices {
        let ty = module.value_type(index);
        ensure!(ty.is_index(), NotIndexTypeSnafu { actual: ty });
    }
    Ok(())
}

pub fn verify_load(module: &Module, op: OpId) -> Result<()> {
    let memref = ranked_operand(module, op, 0, "load")?;
    let operation = module.op(op);
    verify_subscripts(module, op, "load", memref.rank(), &operation.operands()[1..])?;
    ensure!(
        operation.result_type(0) == memref.element,
        ElementTypeMismatchSnafu { from: memref.element, result: operation.result_type(0) }
    );
    Ok(())
}

pub fn verify_store(module: &Module, op: OpId) -> Result<()> {
    let operation = module.op(op);
    ensure!(
        operation.num_operands() >= 2,
        OperandCountMismatchSnafu { op: "store", expected: 2usize, actual: operation.num_operands() }
    );
    let memref = ranked_operand(module, op, 1, "store")?;
    verify_subscripts(module, op, "store", memref.rank(), &operation.operands()[2..])?;
    let stored = module.value_type(operation.operand(0));
    ensure!(
        stored == memref.element,
        ElementTypeMismatchSnafu { from: memref.element, result: stored }
    );
    Ok(())
}

pub fn verify_dim(module: &Module, op: OpId) -> Result<()> {
    let operation = module.op(op);
    ensure!(
        operation.num_operands() == 2,
        OperandCountMismatchSnafu { op: "dim", expected: 2usize, actual: operation.num_operands() }
    );
    ranked_operand(module, op, 0, "dim")?;
    let index_ty = module.value_type(operation.operand(1));
    ensure!(index_ty.is_index(), NotIndexTypeSnafu { actual: index_ty });
    Ok(())
}

// =============================================================================
// Cast
// =============================================================================

pub fn verify_cast(module: &Module, op: OpId) -> Result<()> {
    let operation = module.op(op);
    let source = module.value_type(operation.operand(0));
    let result = operation.result_type(0);
    verify_cast_types(&source, &result)
}

pub(crate) fn verify_cast_types(source: &Type, result: &Type) -> Result<()> {
    let (source_element, source_space) = source
        .memref_element_and_space()
        .ok_or_else(|| ExpectedRankedMemRefSnafu { op: "cast", actual: source.clone() }.build())?;
    let (result_element, result_space) = result
        .memref_element_and_space()
        .ok_or_else(|| ExpectedRankedMemRefSnafu { op: "cast", actual: result.clone() }.build())?;
    ensure!(
        source_element == result_element,
        ElementTypeMismatchSnafu { from: source_element, result: result_element }
    );
    ensure!(
        source_space == result_space,
        MemorySpaceMismatchSnafu { from: source_space, result: result_space }
    );
    match (source.as_memref(), result.as_memref()) {
        (Some(s), Some(r)) => {
            ensure!(s.rank() == r.rank(), RankMismatchSnafu { from: s.rank(), result: r.rank() });
            for (dim, (&sd, &rd)) in s.shape.iter().zip(r.shape.iter()).enumerate() {
                ensure!(dims_compatible(sd, rd), DimSizeMismatchSnafu { dim, from: sd, result: rd });
            }
            let (s_offset, s_strides) = s.offset_and_strides();
            let (r_offset, r_strides) = r.offset_and_strides();
            ensure!(
                dims_compatible(s_offset, r_offset),
                OffsetMismatchSnafu { from: s_offset, result: r_offset }
            );
            for (dim, (&ss, &rs)) in s_strides.iter().zip(r_strides.iter()).enumerate() {
                ensure!(dims_compatible(ss, rs), StrideMismatchSnafu { dim, from: ss, result: rs });
            }
            Ok(())
        }
        (None, None) => UnrankedCastUnsupportedSnafu.fail(),
        // Ranked to unranked or back only needs the element/space agreement
        // checked above.
        _ => Ok(()),
    }
}

/// True when the cast only erases static information: wherever the result
/// type is static, the source is static and equal. Consumers of such a cast
/// can use the source directly.
pub(crate) fn cast_only_loses_information(source: &MemRefType, result: &MemRefType) -> bool {
    if source.rank() != result.rank() || source.element != result.element || source.space != result.space {
        return false;
    }
    let refines = |s: SDim, r: SDim| r.is_dynamic() || s == r;
    if !source.shape.iter().zip(result.shape.iter()).all(|(&s, &r)| refines(s, r)) {
        return false;
    }
    let (s_offset, s_strides) = source.offset_and_strides();
    let (r_offset, r_strides) = result.offset_and_strides();
    refines(s_offset, r_offset) && s_strides.iter().zip(r_strides.iter()).all(|(&s, &r)| refines(s, r))
}

// =============================================================================
// Subview
// =============================================================================

/// The exact (non-rank-reduced) result type of a subview:
/// `offset' = offset + Σ offset_i · stride_i`, `stride'_i = stride_i · step_i`,
/// shape taken from the sizes. Saturating through dynamic inputs.
pub fn infer_subview_type(source: &MemRefType, offsets: &[SDim], sizes: &[SDim], strides: &[SDim]) -> Type {
    let (base_offset, base_strides) = source.offset_and_strides();
    let mut offset = base_offset;
    for (&off, &stride) in offsets.iter().zip(base_strides.iter()) {
        offset = offset + off * stride;
    }
    let new_strides: Shape = base_strides.iter().zip(strides.iter()).map(|(&b, &s)| b * s).collect();
    Type::memref(
        source.element.clone(),
        sizes.iter().copied().collect(),
        Layout::Strided { offset, strides: new_strides },
        source.space,
    )
}

/// Which dimensions of `expected` a rank-reduced `actual` drops. Dropped
/// dimensions must be statically 1; kept dimensions must agree in size and
/// not provably disagree in stride; offsets must not provably disagree.
///
/// Matching is greedy in order: each kept dimension of `actual` binds to the
/// earliest still-unbound compatible dimension of `expected`. When several
/// unit dims share a stride with the next kept dim this picks one of the
/// valid assignments, and since a unit dim skipped here could only rebind a
/// later kept dim to an earlier slot, greedy never rejects a type for which
/// some assignment exists. The stride occurrence counts of the two types
/// stay consistent because every kept binding consumes exactly one
/// stride-compatible slot. `None` when no assignment exists.
pub(crate) fn rank_reduction_mask(expected: &MemRefType, actual: &MemRefType) -> Option<SmallVec<[bool; 4]>> {
    if actual.rank() > expected.rank() || expected.element != actual.element || expected.space != actual.space {
        return None;
    }
    let (e_offset, e_strides) = expected.offset_and_strides();
    let (a_offset, a_strides) = actual.offset_and_strides();
    if !dims_compatible(e_offset, a_offset) {
        return None;
    }
    let mut mask: SmallVec<[bool; 4]> = SmallVec::new();
    let mut j = 0usize;
    for i in 0..expected.rank() {
        let matches = j < actual.rank()
            && expected.shape[i] == actual.shape[j]
            && dims_compatible(e_strides[i], a_strides[j]);
        if matches {
            mask.push(false);
            j += 1;
        } else if expected.shape[i].is(1) {
            mask.push(true);
        } else {
            return None;
        }
    }
    (j == actual.rank()).then_some(mask)
}

/// Whether `actual` is a valid rank-reduced projection of `expected`.
pub(crate) fn rank_reduced_compatible(expected: &MemRefType, actual: &MemRefType) -> bool {
    rank_reduction_mask(expected, actual).is_some()
}

/// Offsets all zero, strides all one, sizes equal to the full source shape.
pub(crate) fn is_trivial_subview(source: &MemRefType, offsets: &[SDim], sizes: &[SDim], strides: &[SDim]) -> bool {
    offsets.iter().all(|o| o.is(0))
        && strides.iter().all(|s| s.is(1))
        && sizes.iter().zip(source.shape.iter()).all(|(a, b)| a == b)
}

fn slice_attrs(module: &Module, op: OpId, name: &'static str, rank: usize) -> Result<(Shape, Shape, Shape)> {
    let offsets = module
        .dims_attr(op, "static_offsets")
        .ok_or_else(|| MissingAttributeSnafu { op: name, name: "static_offsets" }.build())?;
    let sizes = module
        .dims_attr(op, "static_sizes")
        .ok_or_else(|| MissingAttributeSnafu { op: name, name: "static_sizes" }.build())?;
    let strides = module
        .dims_attr(op, "static_strides")
        .ok_or_else(|| MissingAttributeSnafu { op: name, name: "static_strides" }.build())?;
    ensure!(
        offsets.len() == rank && sizes.len() == rank && strides.len() == rank,
        SliceArityMismatchSnafu {
            op: name,
            rank,
            offsets: offsets.len(),
            sizes: sizes.len(),
            strides: strides.len(),
        }
    );
    let dynamic = offsets.iter().chain(&sizes).chain(&strides).filter(|d| d.is_dynamic()).count();
    ensure!(
        module.op(op).num_operands() == 1 + dynamic,
        OperandCountMismatchSnafu { op: name, expected: 1 + dynamic, actual: module.op(op).num_operands() }
    );
    Ok((offsets, sizes, strides))
}

pub fn verify_subview(module: &Module, op: OpId) -> Result<()> {
    let source = ranked_operand(module, op, 0, "subview")?;
    let result_ty = module.op(op).result_type(0);
    let result = result_ty
        .as_memref()
        .ok_or_else(|| ExpectedRankedMemRefSnafu { op: "subview", actual: result_ty.clone() }.build())?;
    let (offsets, sizes, strides) = slice_attrs(module, op, "subview", source.rank())?;
    ensure!(
        source.space == result.space,
        MemorySpaceMismatchSnafu { from: source.space, result: result.space }
    );
    ensure!(
        source.element == result.element,
        ElementTypeMismatchSnafu { from: source.element.clone(), result: result.element.clone() }
    );
    let expected_ty = infer_subview_type(&source, &offsets, &sizes, &strides);
    if expected_ty == result_ty {
        return Ok(());
    }
    let expected = match expected_ty.as_memref() {
        Some(m) => m,
        None => return SubviewTypeMismatchSnafu { expected: expected_ty, actual: result_ty }.fail(),
    };
    ensure!(
        rank_reduced_compatible(expected, result),
        SubviewTypeMismatchSnafu { expected: expected_ty.clone(), actual: result_ty }
    );
    Ok(())
}

// =============================================================================
// Reshape
// =============================================================================

fn verify_reassociation_coverage(groups: &[Vec<i64>], flat_rank: usize) -> Result<()> {
    let mut next = 0i64;
    for (group_index, group) in groups.iter().enumerate() {
        for &dim in group {
            ensure!(dim == next, ReassociationNotContiguousSnafu { group_index });
            next += 1;
        }
    }
    ensure!(
        next == flat_rank as i64,
        ReassociationNotContiguousSnafu { group_index: groups.len().saturating_sub(1) }
    );
    Ok(())
}

/// Group sizes against the collapsed dimension: static products must agree,
/// and a group with a dynamic member must collapse to a dynamic dimension.
fn verify_group_sizes(groups: &[Vec<i64>], expanded: &Shape, collapsed: &Shape) -> Result<()> {
    for (group_index, group) in groups.iter().enumerate() {
        let dims: SmallVec<[SDim; 4]> = group.iter().map(|&d| expanded[d as usize]).collect();
        let collapsed_dim = collapsed[group_index];
        let any_dynamic = dims.iter().any(SDim::is_dynamic);
        if any_dynamic || collapsed_dim.is_dynamic() {
            ensure!(
                any_dynamic == collapsed_dim.is_dynamic(),
                GroupDynamicityMismatchSnafu { group_index, dim: collapsed_dim }
            );
            continue;
        }
        let product = SDim::product(dims.iter().copied());
        ensure!(
            product == collapsed_dim,
            GroupSizeMismatchSnafu {
                group_index,
                group_product: product.as_static().unwrap_or(0),
                dim: collapsed_dim,
            }
        );
    }
    Ok(())
}

/// Stride contiguity of one collapse group. Permissive: dynamic strides and
/// sizes are assumed contiguous unless the `strict-reshape` feature is on.
fn verify_group_contiguity(source: &MemRefType, group: &[i64], group_index: usize) -> Result<()> {
    let (_, strides) = source.offset_and_strides();
    for pair in group.windows(2) {
        let outer = strides[pair[0] as usize];
        let inner = strides[pair[1] as usize];
        let inner_size = source.shape[pair[1] as usize];
        let expected = inner * inner_size;
        match (outer.as_static(), expected.as_static()) {
            (Some(a), Some(b)) => ensure!(a == b, NonContiguousGroupSnafu { group_index }),
            _ => {
                if cfg!(feature = "strict-reshape") {
                    return NonContiguousGroupSnafu { group_index }.fail();
                }
            }
        }
    }
    Ok(())
}

fn reshape_types(module: &Module, op: OpId, name: &'static str) -> Result<(MemRefType, MemRefType, Vec<Vec<i64>>)> {
    let source = ranked_operand(module, op, 0, name)?;
    let result_ty = module.op(op).result_type(0);
    let result = result_ty
        .as_memref()
        .ok_or_else(|| ExpectedRankedMemRefSnafu { op: name, actual: result_ty.clone() }.build())?
        .clone();
    ensure!(
        source.element == result.element,
        ElementTypeMismatchSnafu { from: source.element.clone(), result: result.element.clone() }
    );
    ensure!(
        source.space == result.space,
        MemorySpaceMismatchSnafu { from: source.space, result: result.space }
    );
    let groups = module
        .op(op)
        .attr("reassociation")
        .and_then(|a| a.as_int_groups().map(|g| g.to_vec()))
        .ok_or_else(|| MissingAttributeSnafu { op: name, name: "reassociation" }.build())?;
    Ok((source, result, groups))
}

pub fn verify_collapse_shape(module: &Module, op: OpId) -> Result<()> {
    let (source, result, groups) = reshape_types(module, op, "collapse_shape")?;
    ensure!(
        groups.len() == result.rank(),
        ReassociationGroupCountSnafu { groups: groups.len(), dims: result.rank() }
    );
    verify_reassociation_coverage(&groups, source.rank())?;
    verify_group_sizes(&groups, &source.shape, &result.shape)?;
    for (group_index, group) in groups.iter().enumerate() {
        verify_group_contiguity(&source, group, group_index)?;
    }
    Ok(())
}

pub fn verify_expand_shape(module: &Module, op: OpId) -> Result<()> {
    let (source, result, groups) = reshape_types(module, op, "expand_shape")?;
    ensure!(
        groups.len() == source.rank(),
        ReassociationGroupCountSnafu { groups: groups.len(), dims: source.rank() }
    );
    verify_reassociation_coverage(&groups, result.rank())?;
    verify_group_sizes(&groups, &result.shape, &source.shape)
}

// =============================================================================
// Reinterpret and metadata
// =============================================================================

pub fn verify_reinterpret_cast(module: &Module, op: OpId) -> Result<()> {
    let operation = module.op(op);
    let source_ty = module.value_type(operation.operand(0));
    let (source_element, source_space) = source_ty
        .memref_element_and_space()
        .ok_or_else(|| ExpectedRankedMemRefSnafu { op: "reinterpret_cast", actual: source_ty.clone() }.build())?;
    let result_ty = operation.result_type(0);
    let result = result_ty
        .as_memref()
        .ok_or_else(|| ExpectedRankedMemRefSnafu { op: "reinterpret_cast", actual: result_ty.clone() }.build())?;
    ensure!(
        source_element == result.element,
        ElementTypeMismatchSnafu { from: source_element, result: result.element.clone() }
    );
    ensure!(
        source_space == result.space,
        MemorySpaceMismatchSnafu { from: source_space, result: result.space }
    );
    let offsets = module
        .dims_attr(op, "static_offsets")
        .ok_or_else(|| MissingAttributeSnafu { op: "reinterpret_cast", name: "static_offsets" }.build())?;
    let sizes = module
        .dims_attr(op, "static_sizes")
        .ok_or_else(|| MissingAttributeSnafu { op: "reinterpret_cast", name: "static_sizes" }.build())?;
    let strides = module
        .dims_attr(op, "static_strides")
        .ok_or_else(|| MissingAttributeSnafu { op: "reinterpret_cast", name: "static_strides" }.build())?;
    ensure!(
        offsets.len() == 1 && sizes.len() == result.rank() && strides.len() == result.rank(),
        SliceArityMismatchSnafu {
            op: "reinterpret_cast",
            rank: result.rank(),
            offsets: offsets.len(),
            sizes: sizes.len(),
            strides: strides.len(),
        }
    );
    let dynamic = offsets.iter().chain(&sizes).chain(&strides).filter(|d| d.is_dynamic()).count();
    ensure!(
        operation.num_operands() == 1 + dynamic,
        OperandCountMismatchSnafu {
            op: "reinterpret_cast",
            expected: 1 + dynamic,
            actual: operation.num_operands(),
        }
    );
    // Declared components must match the result type exactly, dynamic
    // entries included.
    for (index, (&declared, &actual)) in sizes.iter().zip(result.shape.iter()).enumerate() {
        ensure!(declared == actual, ReinterpretMismatchSnafu { what: "size", index, declared, actual });
    }
    let (r_offset, r_strides) = result.offset_and_strides();
    ensure!(
        offsets[0] == r_offset,
        ReinterpretMismatchSnafu { what: "offset", index: 0usize, declared: offsets[0], actual: r_offset }
    );
    for (index, (&declared, &actual)) in strides.iter().zip(r_strides.iter()).enumerate() {
        ensure!(declared == actual, ReinterpretMismatchSnafu { what: "stride", index, declared, actual });
    }
    Ok(())
}

pub fn verify_extract_metadata(module: &Module, op: OpId) -> Result<()> {
    let source = ranked_operand(module, op, 0, "extract_metadata")?;
    let operation = module.op(op);
    let expected = 2 + 2 * source.rank();
    ensure!(
        operation.num_results() == expected,
        ResultCountMismatchSnafu { op: "extract_metadata", expected, actual: operation.num_results() }
    );
    let base_ty = operation.result_type(0);
    let base = base_ty
        .as_memref()
        .ok_or_else(|| ExpectedRankedMemRefSnafu { op: "extract_metadata", actual: base_ty.clone() }.build())?;
    ensure!(base.rank() == 0, RankMismatchSnafu { from: 0usize, result: base.rank() });
    ensure!(
        base.element == source.element,
        ElementTypeMismatchSnafu { from: source.element.clone(), result: base.element.clone() }
    );
    for index in 1..expected {
        let ty = operation.result_type(index);
        ensure!(ty.is_index(), NotIndexTypeSnafu { actual: ty });
    }
    Ok(())
}

// =============================================================================
// Atomic and transpose
// =============================================================================

pub fn verify_atomic_rmw(module: &Module, op: OpId) -> Result<()> {
    let operation = module.op(op);
    let kind = match operation.kind() {
        OpKind::AtomicRmw(kind) => kind,
        _ => return Ok(()),
    };
    ensure!(
        operation.num_operands() >= 2,
        OperandCountMismatchSnafu { op: "atomic_rmw", expected: 2usize, actual: operation.num_operands() }
    );
    let memref = ranked_operand(module, op, 1, "atomic_rmw")?;
    verify_subscripts(module, op, "atomic_rmw", memref.rank(), &operation.operands()[2..])?;
    let value_ty = module.value_type(operation.operand(0));
    ensure!(
        value_ty == memref.element && operation.result_type(0) == memref.element,
        ElementTypeMismatchSnafu { from: memref.element.clone(), result: value_ty }
    );
    let applies = if kind.is_float_kind() { memref.element.is_float() } else { memref.element.is_integer() };
    ensure!(applies, AtomicKindMismatchSnafu { kind, element: memref.element });
    Ok(())
}

/// Result dim `i` is source dim `permutation[i]`, strides likewise.
pub(crate) fn permuted_type(source: &MemRefType, permutation: &[i64]) -> Type {
    let (offset, strides) = source.offset_and_strides();
    let shape: Shape = permutation.iter().map(|&p| source.shape[p as usize]).collect();
    let permuted_strides: Shape = permutation.iter().map(|&p| strides[p as usize]).collect();
    Type::memref(
        source.element.clone(),
        shape,
        Layout::Strided { offset, strides: permuted_strides },
        source.space,
    )
}

pub(crate) fn is_permutation(permutation: &[i64], rank: usize) -> bool {
    if permutation.len() != rank {
        return false;
    }
    let mut seen = vec![false; rank];
    for &p in permutation {
        if p < 0 || p as usize >= rank || seen[p as usize] {
            return false;
        }
        seen[p as usize] = true;
    }
    true
}

pub fn verify_transpose(module: &Module, op: OpId) -> Result<()> {
    let source = ranked_operand(module, op, 0, "transpose")?;
    let permutation = module
        .op(op)
        .attr("permutation")
        .and_then(|a| a.as_int_array().map(|p| p.to_vec()))
        .ok_or_else(|| MissingAttributeSnafu { op: "transpose", name: "permutation" }.build())?;
    ensure!(
        is_permutation(&permutation, source.rank()),
        InvalidPermutationSnafu { permutation: permutation.clone(), rank: source.rank() }
    );
    let expected = permuted_type(&source, &permutation);
    let actual = module.op(op).result_type(0);
    ensure!(expected == actual, TransposeResultMismatchSnafu { expected, actual });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Value;
    use smallvec::smallvec;

    fn f32_memref(shape: &[i64]) -> Type {
        Type::memref_identity(Type::float(32), shape.iter().copied())
    }

    #[test]
    fn test_subview_inference() {
        let source_ty = f32_memref(&[16, 16]);
        let source = source_ty.as_memref().unwrap();
        let offsets: Shape = smallvec![SDim::new(2), SDim::new(3)];
        let sizes: Shape = smallvec![SDim::new(4), SDim::new(4)];
        let strides: Shape = smallvec![SDim::new(1), SDim::new(1)];
        let inferred = infer_subview_type(source, &offsets, &sizes, &strides);
        let m = inferred.as_memref().unwrap();
        let (offset, out_strides) = m.offset_and_strides();
        assert_eq!(offset.as_static(), Some(35));
        let s: Vec<i64> = out_strides.iter().map(|s| s.as_static().unwrap()).collect();
        assert_eq!(s, [16, 1]);
    }

    #[test]
    fn test_rank_reduction_drops_unit_dims() {
        let expected_ty = Type::memref(
            Type::float(32),
            smallvec![SDim::new(1), SDim::new(4), SDim::new(1), SDim::new(8)],
            Layout::Strided {
                offset: SDim::new(0),
                strides: smallvec![SDim::new(32), SDim::new(8), SDim::new(8), SDim::new(1)],
            },
            Default::default(),
        );
        let reduced_ty = Type::memref(
            Type::float(32),
            smallvec![SDim::new(4), SDim::new(8)],
            Layout::Strided { offset: SDim::new(0), strides: smallvec![SDim::new(8), SDim::new(1)] },
            Default::default(),
        );
        assert!(rank_reduced_compatible(
            expected_ty.as_memref().unwrap(),
            reduced_ty.as_memref().unwrap()
        ));
        // Dropping a non-unit dim is rejected.
        let bad_ty = Type::memref(
            Type::float(32),
            smallvec![SDim::new(1), SDim::new(1), SDim::new(8)],
            Layout::Strided {
                offset: SDim::new(0),
                strides: smallvec![SDim::new(32), SDim::new(8), SDim::new(1)],
            },
            Default::default(),
        );
        assert!(!rank_reduced_compatible(
            expected_ty.as_memref().unwrap(),
            bad_ty.as_memref().unwrap()
        ));
    }

    #[test]
    fn test_rank_reduction_mask_follows_stride_evidence() {
        let strided = |shape: &[i64], strides: &[i64]| {
            Type::memref(
                Type::float(32),
                shape.iter().map(|&d| SDim::new(d)).collect(),
                Layout::Strided {
                    offset: SDim::new(0),
                    strides: strides.iter().map(|&s| SDim::new(s)).collect(),
                },
                Default::default(),
            )
        };
        let expected_ty = strided(&[1, 1, 4], &[8, 2, 1]);
        let expected = expected_ty.as_memref().unwrap();

        // The kept unit dim is picked by its stride, not by position.
        let low_ty = strided(&[1, 4], &[2, 1]);
        let mask = rank_reduction_mask(expected, low_ty.as_memref().unwrap()).unwrap();
        assert_eq!(mask.as_slice(), [true, false, false]);
        let high_ty = strided(&[1, 4], &[8, 1]);
        let mask = rank_reduction_mask(expected, high_ty.as_memref().unwrap()).unwrap();
        assert_eq!(mask.as_slice(), [false, true, false]);

        // A kept dim whose stride matches nothing rejects the projection.
        let narrow_ty = strided(&[1, 4], &[2, 1]);
        let bad_ty = strided(&[4], &[3]);
        assert!(rank_reduction_mask(narrow_ty.as_memref().unwrap(), bad_ty.as_memref().unwrap()).is_none());
    }

    #[test]
    fn test_cast_compatibility_rules() {
        let static_ty = f32_memref(&[4, 8]);
        let dynamic_ty = Type::memref(
            Type::float(32),
            smallvec![SDim::DYNAMIC, SDim::new(8)],
            Layout::Identity,
            Default::default(),
        );
        assert!(verify_cast_types(&static_ty, &dynamic_ty).is_ok());
        assert!(verify_cast_types(&dynamic_ty, &static_ty).is_ok());
        let other = f32_memref(&[5, 8]);
        assert!(verify_cast_types(&static_ty, &other).is_err());
        let unranked = Type::unranked_memref(Type::float(32), Default::default());
        assert!(verify_cast_types(&static_ty, &unranked).is_ok());
        assert!(verify_cast_types(&unranked, &unranked).is_err());
    }

    #[test]
    fn test_cast_mismatch_errors_carry_both_sides() {
        let f32_ty = f32_memref(&[4, 8]);
        let i32_ty = Type::memref_identity(Type::int(32, true), [4, 8]);
        let err = verify_cast_types(&f32_ty, &i32_ty).unwrap_err();
        assert!(matches!(err, crate::error::Error::ElementTypeMismatch { .. }));
        assert!(err.to_string().contains("element type mismatch"));

        let f32_3d = f32_memref(&[4, 8, 2]);
        let err = verify_cast_types(&f32_ty, &f32_3d).unwrap_err();
        assert!(matches!(err, crate::error::Error::RankMismatch { .. }));
        assert_eq!(err.to_string(), "rank mismatch: 2 vs 3");
    }

    #[test]
    fn test_cast_information_direction() {
        let static_ty = f32_memref(&[4, 8]);
        let dynamic_ty = Type::memref(
            Type::float(32),
            smallvec![SDim::DYNAMIC, SDim::new(8)],
            Layout::Identity,
            Default::default(),
        );
        let s = static_ty.as_memref().unwrap();
        let d = dynamic_ty.as_memref().unwrap();
        assert!(cast_only_loses_information(s, d));
        assert!(!cast_only_loses_information(d, s));
    }

    #[test]
    fn test_alloca_requires_scope() {
        let mut module = Module::new();
        let body = module.body();
        let ty = f32_memref(&[4]);
        let outside = module.alloca(body, ty.clone(), &[]);
        assert!(verify_alloca(&module, outside).is_err());

        let scope = module.alloca_scope(body, &[]);
        let scope_body = module.entry_block(module.op(scope).region(0)).unwrap();
        let inside = module.alloca(scope_body, ty, &[]);
        module.yield_op(scope_body, &[]);
        assert!(verify_alloca(&module, inside).is_ok());
    }

    #[test]
    fn test_alloc_dynamic_operand_count() {
        let mut module = Module::new();
        let body = module.body();
        let ty = Type::memref(
            Type::float(32),
            smallvec![SDim::DYNAMIC, SDim::new(8)],
            Layout::Identity,
            Default::default(),
        );
        let size = module.constant_index(body, 16);
        let good = module.alloc(body, ty.clone(), &[size]);
        assert!(verify_alloc(&module, good).is_ok());
        let bad = module.alloc(body, ty, &[]);
        assert!(verify_alloc(&module, bad).is_err());
    }

    #[test]
    fn test_collapse_group_checks() {
        let mut module = Module::new();
        let body = module.body();
        let source = module.alloc(body, f32_memref(&[2, 3, 4]), &[]);
        let ok = module.collapse_shape(body, Value::result(source, 0), vec![vec![0, 1], vec![2]], f32_memref(&[6, 4]));
        let ok_op = module.defining_op(ok).unwrap();
        assert!(verify_collapse_shape(&module, ok_op).is_ok());

        let source2 = module.alloc(body, f32_memref(&[2, 3, 4]), &[]);
        let bad =
            module.collapse_shape(body, Value::result(source2, 0), vec![vec![0, 1], vec![2]], f32_memref(&[7, 4]));
        let bad_op = module.defining_op(bad).unwrap();
        assert!(verify_collapse_shape(&module, bad_op).is_err());
    }

    #[test]
    fn test_transpose_verifies_permuted_type() {
        let mut module = Module::new();
        let body = module.body();
        let source = module.alloc(body, f32_memref(&[4, 8]), &[]);
        let result_ty = Type::memref(
            Type::float(32),
            smallvec![SDim::new(8), SDim::new(4)],
            Layout::Strided { offset: SDim::new(0), strides: smallvec![SDim::new(1), SDim::new(8)] },
            Default::default(),
        );
        let t = module.transpose(body, Value::result(source, 0), &[1, 0], result_ty);
        let op = module.defining_op(t).unwrap();
        assert!(verify_transpose(&module, op).is_ok());

        let source2 = module.alloc(body, f32_memref(&[4, 8]), &[]);
        let t2 = module.transpose(body, Value::result(source2, 0), &[1, 1], f32_memref(&[8, 4]));
        let op2 = module.defining_op(t2).unwrap();
        assert!(verify_transpose(&module, op2).is_err());
    }
}
