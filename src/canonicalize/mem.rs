//! Canonicalization patterns for the memory-reference ops.

use smallvec::SmallVec;

use crate::canonicalize::{RewriteResult, Rewriter};
use crate::fold::mem::bypass_lossy_cast;
use crate::ir::{OpId, OpKind, Value};
use crate::sdim::SDim;
use crate::types::{Layout, Shape, Type};
use crate::verify::mem::{infer_subview_type, is_trivial_subview, verify_cast_types};

/// An allocation whose only users deallocate it or store into it is dead;
/// the users go with it.
pub fn erase_dead_alloc(rewriter: &mut Rewriter<'_>, op: OpId) -> RewriteResult {
    let value = Value::result(op, 0);
    for record in rewriter.uses(value) {
        let keeps_alive = match rewriter.op(record.op).kind() {
            OpKind::Dealloc => false,
            // A store into the buffer is dead with it; a store *of* the
            // buffer pointer escapes it.
            OpKind::Store => record.operand_index != 1,
            _ => true,
        };
        if keeps_alive {
            return RewriteResult::NoMatch;
        }
    }
    for user in rewriter.user_ops(value) {
        rewriter.erase_op(user);
    }
    rewriter.erase_op(op);
    RewriteResult::Changed
}

/// Constant dynamic sizes move into the allocation's type; a cast back to
/// the original type keeps the users well typed.
pub fn promote_alloc_const_sizes(rewriter: &mut Rewriter<'_>, op: OpId) -> RewriteResult {
    let kind = rewriter.op(op).kind();
    let old_ty = rewriter.op(op).result_type(0);
    let Some(memref) = old_ty.as_memref() else {
        return RewriteResult::NoMatch;
    };
    if !matches!(memref.layout, Layout::Identity) {
        return RewriteResult::NoMatch;
    }
    let operands = rewriter.op(op).operands().to_vec();
    let mut shape: Shape = Shape::new();
    let mut kept: SmallVec<[Value; 4]> = SmallVec::new();
    let mut cursor = 0usize;
    let mut promoted = false;
    for &dim in &memref.shape {
        if dim.is_static() {
            shape.push(dim);
            continue;
        }
        let operand = operands[cursor];
        cursor += 1;
        match rewriter.const_int(operand).filter(|&size| size >= 0) {
            Some(size) => {
                shape.push(SDim::new(size));
                promoted = true;
            }
            None => {
                shape.push(SDim::DYNAMIC);
                kept.push(operand);
            }
        }
    }
    if !promoted {
        return RewriteResult::NoMatch;
    }
    let new_ty = Type::memref(memref.element.clone(), shape, Layout::Identity, memref.space);
    let replacement = rewriter.create_op(kind, &kept, &[new_ty.clone()], vec![], 0);
    rewriter.insert_op_before(op, replacement);
    let cast = rewriter.create_op(OpKind::Cast, &[Value::result(replacement, 0)], &[old_ty], vec![], 0);
    rewriter.insert_op_before(op, cast);
    rewriter.revisit(replacement);
    rewriter.revisit(cast);
    rewriter.replace_op_with_values(op, &[Value::result(cast, 0)]);
    RewriteResult::Changed
}

/// A subview over the whole source whose type only re-spells the layout
/// becomes a plain cast.
pub fn trivial_subview_to_cast(rewriter: &mut Rewriter<'_>, op: OpId) -> RewriteResult {
    let source = rewriter.op(op).operand(0);
    let source_ty = rewriter.value_type(source);
    let result_ty = rewriter.op(op).result_type(0);
    let Some(memref) = source_ty.as_memref() else {
        return RewriteResult::NoMatch;
    };
    let (Some(offsets), Some(sizes), Some(strides)) = (
        rewriter.dims_attr(op, "static_offsets"),
        rewriter.dims_attr(op, "static_sizes"),
        rewriter.dims_attr(op, "static_strides"),
    ) else {
        return RewriteResult::NoMatch;
    };
    if source_ty == result_ty || !is_trivial_subview(memref, &offsets, &sizes, &strides) {
        return RewriteResult::NoMatch;
    }
    if verify_cast_types(&source_ty, &result_ty).is_err() {
        return RewriteResult::NoMatch;
    }
    let cast = rewriter.create_op(OpKind::Cast, &[source], &[result_ty], vec![], 0);
    rewriter.insert_op_before(op, cast);
    rewriter.revisit(cast);
    rewriter.replace_op_with_values(op, &[Value::result(cast, 0)]);
    RewriteResult::Changed
}

/// A subview of a cast that only erased static information reads from the
/// cast's source instead; the result type is re-inferred from the more
/// static source and cast back for the existing users.
pub fn fold_cast_into_subview(rewriter: &mut Rewriter<'_>, op: OpId) -> RewriteResult {
    let source = rewriter.op(op).operand(0);
    let Some(original) = bypass_lossy_cast(rewriter, source) else {
        return RewriteResult::NoMatch;
    };
    let old_ty = rewriter.op(op).result_type(0);
    let Some(old_memref) = old_ty.as_memref() else {
        return RewriteResult::NoMatch;
    };
    let original_ty = rewriter.value_type(original);
    let Some(original_memref) = original_ty.as_memref() else {
        return RewriteResult::NoMatch;
    };
    // Rank-reduced subviews keep their shape; only same-rank slices get a
    // re-inferred type.
    if old_memref.rank() != original_memref.rank() {
        rewriter.set_operand(op, 0, original);
        return RewriteResult::Changed;
    }
    let Some(groups) = rewriter.mixed_operand_groups(op) else {
        return RewriteResult::NoMatch;
    };
    let (Some(offsets), Some(sizes), Some(strides)) = (
        rewriter.resolved_dims(op, "static_offsets", &groups[0]),
        rewriter.resolved_dims(op, "static_sizes", &groups[1]),
        rewriter.resolved_dims(op, "static_strides", &groups[2]),
    ) else {
        return RewriteResult::NoMatch;
    };
    let new_ty = infer_subview_type(original_memref, &offsets, &sizes, &strides);
    if new_ty == old_ty {
        rewriter.set_operand(op, 0, original);
        return RewriteResult::Changed;
    }
    if verify_cast_types(&new_ty, &old_ty).is_err() {
        return RewriteResult::NoMatch;
    }
    let mut operands: SmallVec<[Value; 4]> = SmallVec::new();
    operands.push(original);
    operands.extend(groups.iter().flatten().copied());
    let attrs = rewriter.op(op).attrs.to_vec();
    let replacement = rewriter.create_op(OpKind::Subview, &operands, &[new_ty], attrs, 0);
    rewriter.insert_op_before(op, replacement);
    let cast = rewriter.create_op(OpKind::Cast, &[Value::result(replacement, 0)], &[old_ty], vec![], 0);
    rewriter.insert_op_before(op, cast);
    rewriter.revisit(replacement);
    rewriter.revisit(cast);
    rewriter.replace_op_with_values(op, &[Value::result(cast, 0)]);
    RewriteResult::Changed
}

/// Whether `op` is the last op before the terminator of a single-block
/// ancestor that provides an automatic allocation scope. Inlining such a
/// scope keeps its allocas freed at the same point the parent frees its own.
fn last_op_in_allocation_scope(rewriter: &Rewriter<'_>, op: OpId) -> bool {
    let Some(parent) = rewriter.parent_op(op) else {
        return false;
    };
    if !rewriter.op(parent).kind().has_allocation_scope() {
        return false;
    }
    let Some(block) = rewriter.op(op).parent_block() else {
        return false;
    };
    if rewriter.region(rewriter.block(block).parent_region()).blocks().len() != 1 {
        return false;
    }
    let ops = rewriter.block(block).ops();
    match rewriter.terminator(block) {
        Some(_) => ops.len() >= 2 && ops[ops.len() - 2] == op,
        None => ops.last() == Some(&op),
    }
}

/// An `alloca_scope` that performs no stack allocation is a plain region,
/// and one closing out a single-block enclosing scope frees its allocas at
/// the same point anyway; either way the body inlines into the parent block.
pub fn inline_alloca_scope(rewriter: &mut Rewriter<'_>, op: OpId) -> RewriteResult {
    let region = rewriter.op(op).region(0);
    let Some(block) = rewriter.entry_block(region) else {
        return RewriteResult::NoMatch;
    };
    let allocates = rewriter
        .walk_region(region)
        .iter()
        .any(|&inner| matches!(rewriter.op(inner).kind(), OpKind::Alloca | OpKind::AllocScope));
    if allocates && !last_op_in_allocation_scope(rewriter, op) {
        return RewriteResult::NoMatch;
    }
    let Some(terminator) = rewriter.terminator(block) else {
        return RewriteResult::NoMatch;
    };
    let yielded = rewriter.op(terminator).operands().to_vec();
    rewriter.module.inline_block_before(block, op, &[]);
    rewriter.erase_op(terminator);
    rewriter.replace_op_with_values(op, &yielded);
    RewriteResult::Changed
}

/// An `alloca` whose operands are all defined outside its `alloca_scope`
/// moves in front of the scope, into the enclosing automatic allocation
/// scope. No match when no enclosing scope would take over the cleanup.
pub fn hoist_alloca_from_scope(rewriter: &mut Rewriter<'_>, op: OpId) -> RewriteResult {
    let Some(scope) = rewriter.parent_op(op) else {
        return RewriteResult::NoMatch;
    };
    if rewriter.op(scope).kind() != OpKind::AllocScope {
        return RewriteResult::NoMatch;
    }
    let mut target = rewriter.parent_op(scope);
    while let Some(ancestor) = target {
        if rewriter.op(ancestor).kind().has_allocation_scope() {
            break;
        }
        target = rewriter.parent_op(ancestor);
    }
    if target.is_none() {
        return RewriteResult::NoMatch;
    }
    let region = rewriter.op(scope).region(0);
    let operands = rewriter.op(op).operands().to_vec();
    if operands.iter().any(|&v| !rewriter.is_defined_outside(v, region)) {
        return RewriteResult::NoMatch;
    }
    rewriter.module.remove_from_block(op);
    rewriter.module.insert_op_before(scope, op);
    rewriter.revisit(scope);
    rewriter.revisit(op);
    RewriteResult::Changed
}
