//! Canonicalization patterns for the structured-control-flow ops.

use std::collections::HashSet;

use smallvec::SmallVec;

use crate::canonicalize::{RewriteResult, Rewriter};
use crate::ir::{BlockId, OpId, OpKind, Value};
use crate::types::Type;

/// Move a block's ops in front of `anchor`, substitute its arguments with
/// `args`, drop the terminator and return what it yielded.
fn splice_block_before(rewriter: &mut Rewriter<'_>, block: BlockId, anchor: OpId, args: &[Value]) -> Option<Vec<Value>> {
    let terminator = rewriter.terminator(block)?;
    rewriter.module.inline_block_before(block, anchor, args);
    let yielded = rewriter.op(terminator).operands().to_vec();
    rewriter.erase_op(terminator);
    Some(yielded)
}

fn rebuild_terminator(rewriter: &mut Rewriter<'_>, old: OpId, kind: OpKind, operands: &[Value]) {
    let replacement = rewriter.create_op(kind, operands, &[], vec![], 0);
    rewriter.insert_op_before(old, replacement);
    rewriter.erase_op(old);
}

// =============================================================================
// for
// =============================================================================

/// Loops that provably run zero or one times, or whose body does nothing,
/// disappear.
pub fn simplify_for_bounds(rewriter: &mut Rewriter<'_>, op: OpId) -> RewriteResult {
    let lb = rewriter.op(op).operand(0);
    let ub = rewriter.op(op).operand(1);
    let step = rewriter.op(op).operand(2);
    let inits = rewriter.op(op).operands()[3..].to_vec();

    // Zero-trip: equal bound values, or a non-positive constant range.
    let zero_trip = lb == ub
        || matches!(
            (rewriter.const_int(lb), rewriter.const_int(ub)),
            (Some(a), Some(b)) if b <= a
        );
    if zero_trip {
        rewriter.replace_op_with_values(op, &inits);
        return RewriteResult::Changed;
    }

    // Single-trip: the first step crosses the range.
    if let (Some(a), Some(b), Some(s)) =
        (rewriter.const_int(lb), rewriter.const_int(ub), rewriter.const_int(step))
    {
        // Widen before subtracting; the range can span the whole i64 domain.
        if s > 0 && s as i128 >= b as i128 - a as i128 {
            let body = rewriter.for_body(op);
            let mut args: SmallVec<[Value; 4]> = SmallVec::new();
            args.push(lb);
            args.extend_from_slice(&inits);
            let Some(yielded) = splice_block_before(rewriter, body, op, &args) else {
                return RewriteResult::NoMatch;
            };
            rewriter.replace_op_with_values(op, &yielded);
            return RewriteResult::Changed;
        }
    }

    // Identity body: only the yield, forwarding the iter args unchanged.
    let body = rewriter.for_body(op);
    if rewriter.block(body).ops().len() == 1 {
        if let Some(terminator) = rewriter.terminator(body) {
            let identity = rewriter
                .op(terminator)
                .operands()
                .iter()
                .enumerate()
                .all(|(i, &v)| v == Value::argument(body, 1 + i));
            if identity {
                rewriter.replace_op_with_values(op, &inits);
                return RewriteResult::Changed;
            }
        }
    }
    RewriteResult::NoMatch
}

enum DroppedIterArg {
    /// The carried value never changes; the init flows through.
    Init,
    /// Same (init, yielded) pair as an earlier position.
    DuplicateOf(usize),
}

/// Prune loop-carried values that are forwarded unchanged, dead, or
/// duplicates of an earlier pair. Surviving positions shift down; dropped
/// results take their init (or the surviving duplicate's result).
pub fn prune_for_iter_args(rewriter: &mut Rewriter<'_>, op: OpId) -> RewriteResult {
    let num = rewriter.op(op).num_results();
    if num == 0 {
        return RewriteResult::NoMatch;
    }
    let body = rewriter.for_body(op);
    let Some(old_yield) = rewriter.terminator(body) else {
        return RewriteResult::NoMatch;
    };
    let inits = rewriter.op(op).operands()[3..].to_vec();
    let yielded = rewriter.op(old_yield).operands().to_vec();
    if yielded.len() != num {
        return RewriteResult::NoMatch;
    }

    let mut dropped: Vec<Option<DroppedIterArg>> = Vec::with_capacity(num);
    let mut seen: Vec<(Value, Value, usize)> = Vec::new();
    for i in 0..num {
        let arg = Value::argument(body, 1 + i);
        let result = Value::result(op, i);
        let forwarded = yielded[i] == arg
            || yielded[i] == inits[i]
            || (!rewriter.has_uses(arg) && !rewriter.has_uses(result));
        if forwarded {
            dropped.push(Some(DroppedIterArg::Init));
            continue;
        }
        if let Some(&(_, _, first)) = seen.iter().find(|&&(init, y, _)| init == inits[i] && y == yielded[i]) {
            dropped.push(Some(DroppedIterArg::DuplicateOf(first)));
        } else {
            seen.push((inits[i], yielded[i], i));
            dropped.push(None);
        }
    }
    if dropped.iter().all(Option::is_none) {
        return RewriteResult::NoMatch;
    }

    // New result index for each kept position.
    let mut new_index = vec![usize::MAX; num];
    let mut next = 0usize;
    for i in 0..num {
        if dropped[i].is_none() {
            new_index[i] = next;
            next += 1;
        }
    }

    let mut operands: SmallVec<[Value; 4]> = SmallVec::new();
    operands.extend_from_slice(&rewriter.op(op).operands()[..3]);
    let mut result_types: SmallVec<[Type; 2]> = SmallVec::new();
    for i in 0..num {
        if dropped[i].is_none() {
            operands.push(inits[i]);
            result_types.push(rewriter.op(op).result_type(i));
        }
    }
    let replacement = rewriter.create_op(OpKind::For, &operands, &result_types, vec![], 1);
    rewriter.insert_op_before(op, replacement);
    let old_region = rewriter.op(op).region(0);
    let new_region = rewriter.op(replacement).region(0);
    rewriter.take_region_body(old_region, new_region);

    let kept_yield: SmallVec<[Value; 4]> =
        (0..num).filter(|&i| dropped[i].is_none()).map(|i| yielded[i]).collect();
    rebuild_terminator(rewriter, old_yield, OpKind::Yield, &kept_yield);

    // Redirect the dropped iter args, then compact the block arguments.
    for i in 0..num {
        let arg = Value::argument(body, 1 + i);
        match dropped[i] {
            Some(DroppedIterArg::Init) => rewriter.replace_all_uses(arg, inits[i]),
            Some(DroppedIterArg::DuplicateOf(first)) => {
                rewriter.replace_all_uses(arg, Value::argument(body, 1 + first));
            }
            None => {}
        }
    }
    let mut mask = vec![false; 1 + num];
    for i in 0..num {
        mask[1 + i] = dropped[i].is_some();
    }
    rewriter.module.erase_block_args(body, &mask);

    for i in 0..num {
        let old_result = Value::result(op, i);
        let new_result = match dropped[i] {
            None => Value::result(replacement, new_index[i]),
            Some(DroppedIterArg::Init) => inits[i],
            Some(DroppedIterArg::DuplicateOf(first)) => Value::result(replacement, new_index[first]),
        };
        rewriter.replace_all_uses(old_result, new_result);
    }
    rewriter.revisit(replacement);
    rewriter.erase_op(op);
    RewriteResult::Changed
}

// =============================================================================
// if
// =============================================================================

/// A constant condition selects one region; its body inlines in place of
/// the op.
pub fn inline_static_if(rewriter: &mut Rewriter<'_>, op: OpId) -> RewriteResult {
    let Some(flag) = rewriter.const_bool(rewriter.op(op).operand(0)) else {
        return RewriteResult::NoMatch;
    };
    let block = if flag {
        rewriter.then_block(op)
    } else {
        match rewriter.else_block(op) {
            Some(block) => block,
            // No else and no results: the whole op is a no-op.
            None => {
                rewriter.erase_op(op);
                return RewriteResult::Changed;
            }
        }
    };
    let Some(yielded) = splice_block_before(rewriter, block, op, &[]) else {
        return RewriteResult::NoMatch;
    };
    rewriter.replace_op_with_values(op, &yielded);
    RewriteResult::Changed
}

/// An if with no results whose branches only yield is a no-op.
pub fn erase_empty_if(rewriter: &mut Rewriter<'_>, op: OpId) -> RewriteResult {
    if rewriter.op(op).num_results() != 0 {
        return RewriteResult::NoMatch;
    }
    let then = rewriter.then_block(op);
    if rewriter.block(then).ops().len() != 1 {
        return RewriteResult::NoMatch;
    }
    if let Some(els) = rewriter.else_block(op) {
        if rewriter.block(els).ops().len() != 1 {
            return RewriteResult::NoMatch;
        }
    }
    rewriter.erase_op(op);
    RewriteResult::Changed
}

/// An else region that only yields (and feeds no results) is dropped.
pub fn erase_empty_else(rewriter: &mut Rewriter<'_>, op: OpId) -> RewriteResult {
    if rewriter.op(op).num_results() != 0 {
        return RewriteResult::NoMatch;
    }
    let Some(els) = rewriter.else_block(op) else {
        return RewriteResult::NoMatch;
    };
    if rewriter.block(els).ops().len() != 1 {
        return RewriteResult::NoMatch;
    }
    rewriter.module.erase_block(els);
    RewriteResult::Changed
}

/// Results whose two yields agree, or yield complementary booleans, are
/// computed from the condition directly.
pub fn replace_if_yield_results(rewriter: &mut Rewriter<'_>, op: OpId) -> RewriteResult {
    let Some(els) = rewriter.else_block(op) else {
        return RewriteResult::NoMatch;
    };
    let then = rewriter.then_block(op);
    let (Some(then_yield), Some(else_yield)) = (rewriter.terminator(then), rewriter.terminator(els)) else {
        return RewriteResult::NoMatch;
    };
    let condition = rewriter.op(op).operand(0);
    let region = rewriter.op(op).region(0);
    let mut changed = false;
    for index in 0..rewriter.op(op).num_results() {
        let result = Value::result(op, index);
        if !rewriter.has_uses(result) {
            continue;
        }
        let t = rewriter.op(then_yield).operand(index);
        let e = rewriter.op(else_yield).operand(index);
        if t == e && rewriter.is_defined_outside(t, region) {
            rewriter.replace_all_uses(result, t);
            changed = true;
            continue;
        }
        match (rewriter.const_bool(t), rewriter.const_bool(e)) {
            (Some(true), Some(false)) => {
                rewriter.replace_all_uses(result, condition);
                changed = true;
            }
            (Some(false), Some(true)) => {
                let negated = rewriter.create_op(OpKind::Not, &[condition], &[Type::bool_()], vec![], 0);
                rewriter.insert_op_before(op, negated);
                rewriter.revisit(negated);
                rewriter.replace_all_uses(result, Value::result(negated, 0));
                changed = true;
            }
            _ => {}
        }
    }
    if changed { RewriteResult::Changed } else { RewriteResult::NoMatch }
}

/// Rebuild the op with only the used results; both yields drop the same
/// positions and surviving results are remapped.
pub fn prune_if_results(rewriter: &mut Rewriter<'_>, op: OpId) -> RewriteResult {
    let num = rewriter.op(op).num_results();
    if num == 0 {
        return RewriteResult::NoMatch;
    }
    let used: Vec<bool> = (0..num).map(|i| rewriter.has_uses(Value::result(op, i))).collect();
    if used.iter().all(|&u| u) {
        return RewriteResult::NoMatch;
    }
    let Some(els) = rewriter.else_block(op) else {
        return RewriteResult::NoMatch;
    };
    let then = rewriter.then_block(op);
    let (Some(then_yield), Some(else_yield)) = (rewriter.terminator(then), rewriter.terminator(els)) else {
        return RewriteResult::NoMatch;
    };
    let condition = rewriter.op(op).operand(0);
    let kept_types: SmallVec<[Type; 2]> =
        (0..num).filter(|&i| used[i]).map(|i| rewriter.op(op).result_type(i)).collect();
    let replacement = rewriter.create_op(OpKind::If, &[condition], &kept_types, vec![], 2);
    rewriter.insert_op_before(op, replacement);
    for region_index in 0..2 {
        let old_region = rewriter.op(op).region(region_index);
        let new_region = rewriter.op(replacement).region(region_index);
        rewriter.take_region_body(old_region, new_region);
    }
    for old_yield in [then_yield, else_yield] {
        let kept: SmallVec<[Value; 4]> = (0..num)
            .filter(|&i| used[i])
            .map(|i| rewriter.op(old_yield).operand(i))
            .collect();
        rebuild_terminator(rewriter, old_yield, OpKind::Yield, &kept);
    }
    let mut next = 0usize;
    for i in 0..num {
        if used[i] {
            rewriter.replace_all_uses(Value::result(op, i), Value::result(replacement, next));
            next += 1;
        }
    }
    rewriter.revisit(replacement);
    rewriter.erase_op(op);
    RewriteResult::Changed
}

/// `if a { if b { ... } }` becomes `if and(a, b) { ... }` when neither
/// level yields values and the inner condition is defined outside.
pub fn merge_nested_ifs(rewriter: &mut Rewriter<'_>, op: OpId) -> RewriteResult {
    if rewriter.op(op).num_results() != 0 || rewriter.else_block(op).is_some() {
        return RewriteResult::NoMatch;
    }
    let then = rewriter.then_block(op);
    let ops = rewriter.block(then).ops();
    if ops.len() != 2 {
        return RewriteResult::NoMatch;
    }
    let inner = ops[0];
    if rewriter.op(inner).kind() != OpKind::If
        || rewriter.op(inner).num_results() != 0
        || rewriter.else_block(inner).is_some()
    {
        return RewriteResult::NoMatch;
    }
    let inner_condition = rewriter.op(inner).operand(0);
    let region = rewriter.op(op).region(0);
    if !rewriter.is_defined_outside(inner_condition, region) {
        return RewriteResult::NoMatch;
    }
    let outer_condition = rewriter.op(op).operand(0);
    let conjunction = rewriter.create_op(
        OpKind::And,
        &[outer_condition, inner_condition],
        &[Type::bool_()],
        vec![],
        0,
    );
    rewriter.insert_op_before(op, conjunction);
    rewriter.revisit(conjunction);
    rewriter.set_operand(op, 0, Value::result(conjunction, 0));
    let inner_then = rewriter.then_block(inner);
    if splice_block_before(rewriter, inner_then, inner, &[]).is_none() {
        return RewriteResult::Changed;
    }
    rewriter.erase_op(inner);
    RewriteResult::Changed
}

enum PrevResultUse {
    /// Lands in the merged then branch; reads the first if's then yield.
    MergedThen,
    /// Lands in the merged else branch; reads the first if's else yield.
    MergedElse,
    /// A pure op between the two ifs; reads a select on the condition.
    Between,
    /// Downstream of both; remapped to the merged op's result.
    Later,
}

/// Two sequential ifs on the same or logically negated condition merge into
/// one, result lists concatenated. Negation cross-wires the branches. Pure
/// ops between the two (typically the negation feeding the second
/// condition) move in front of the merged op; any read they make of the
/// first if's results is resolved with a select keyed on the shared
/// condition.
pub fn merge_consecutive_ifs(rewriter: &mut Rewriter<'_>, op: OpId) -> RewriteResult {
    let mut between: Vec<OpId> = Vec::new();
    let mut cursor = rewriter.prev_op(op);
    let prev = loop {
        let Some(candidate) = cursor else {
            return RewriteResult::NoMatch;
        };
        if rewriter.op(candidate).kind() == OpKind::If {
            break candidate;
        }
        if !rewriter.op(candidate).kind().is_pure() {
            return RewriteResult::NoMatch;
        }
        between.push(candidate);
        cursor = rewriter.prev_op(candidate);
    };
    between.reverse();

    let prev_cond = rewriter.op(prev).operand(0);
    let own_cond = rewriter.op(op).operand(0);
    let negated = if own_cond == prev_cond {
        false
    } else {
        let own_is_not = rewriter
            .defining_op_of(own_cond, OpKind::Not)
            .is_some_and(|n| rewriter.op(n).operand(0) == prev_cond);
        let prev_is_not = rewriter
            .defining_op_of(prev_cond, OpKind::Not)
            .is_some_and(|n| rewriter.op(n).operand(0) == own_cond);
        if !own_is_not && !prev_is_not {
            return RewriteResult::NoMatch;
        }
        true
    };

    let prev_then = rewriter.then_block(prev);
    let Some(prev_then_yield) = rewriter.terminator(prev_then) else {
        return RewriteResult::NoMatch;
    };
    let prev_else = rewriter.else_block(prev);
    let prev_else_yield = match prev_else {
        Some(els) => match rewriter.terminator(els) {
            Some(terminator) => Some(terminator),
            None => return RewriteResult::NoMatch,
        },
        None => None,
    };
    let own_then = rewriter.then_block(op);
    let Some(own_then_yield) = rewriter.terminator(own_then) else {
        return RewriteResult::NoMatch;
    };
    let own_else = rewriter.else_block(op);
    let own_else_yield = match own_else {
        Some(els) => match rewriter.terminator(els) {
            Some(terminator) => Some(terminator),
            None => return RewriteResult::NoMatch,
        },
        None => None,
    };

    let n = rewriter.op(prev).num_results();
    let m = rewriter.op(op).num_results();
    let prev_then_vals = rewriter.op(prev_then_yield).operands().to_vec();
    let prev_else_vals = prev_else_yield.map(|y| rewriter.op(y).operands().to_vec()).unwrap_or_default();
    if prev_then_vals.len() != n || (n > 0 && prev_else_vals.len() != n) {
        return RewriteResult::NoMatch;
    }

    // Branch sources for the merged op; negation swaps the second if's
    // branches.
    let (src_then, src_then_yield, src_else, src_else_yield) = if negated {
        (own_else, own_else_yield, Some(own_then), Some(own_then_yield))
    } else {
        (Some(own_then), Some(own_then_yield), own_else, own_else_yield)
    };
    if m > 0 && (src_then_yield.is_none() || src_else_yield.is_none()) {
        return RewriteResult::NoMatch;
    }
    if src_then_yield.is_some_and(|y| rewriter.op(y).operands().len() != m)
        || src_else_yield.is_some_and(|y| rewriter.op(y).operands().len() != m)
    {
        return RewriteResult::NoMatch;
    }

    // Classify every use of the first if's results before mutating.
    let dest_then_region = rewriter.op(op).region(if negated { 1 } else { 0 });
    let dest_else_region = rewriter.op(op).region(if negated { 0 } else { 1 });
    let in_merged_then: HashSet<OpId> = rewriter.walk_region(dest_then_region).into_iter().collect();
    let in_merged_else: HashSet<OpId> = rewriter.walk_region(dest_else_region).into_iter().collect();
    let mut in_between: HashSet<OpId> = HashSet::new();
    for &b in &between {
        in_between.insert(b);
        for &region in &rewriter.op(b).regions().to_vec() {
            in_between.extend(rewriter.walk_region(region));
        }
    }
    let mut retargets: Vec<(usize, OpId, usize, PrevResultUse)> = Vec::new();
    let mut needs_select = vec![false; n];
    for i in 0..n {
        for record in rewriter.uses(Value::result(prev, i)) {
            let site = if in_merged_then.contains(&record.op) {
                PrevResultUse::MergedThen
            } else if in_merged_else.contains(&record.op) {
                PrevResultUse::MergedElse
            } else if in_between.contains(&record.op) {
                needs_select[i] = true;
                PrevResultUse::Between
            } else {
                PrevResultUse::Later
            };
            retargets.push((i, record.op, record.operand_index as usize, site));
        }
    }
    // A select runs before the merged op, so both candidate values must
    // come from outside the first if.
    let prev_then_region = rewriter.op(prev).region(0);
    let prev_else_region = rewriter.op(prev).region(1);
    for i in 0..n {
        if needs_select[i]
            && (!rewriter.is_defined_outside(prev_then_vals[i], prev_then_region)
                || !rewriter.is_defined_outside(prev_else_vals[i], prev_else_region))
        {
            return RewriteResult::NoMatch;
        }
    }

    // Commit: selects and the in-between ops move in front of the first if.
    let mut selects: Vec<Option<Value>> = vec![None; n];
    for i in 0..n {
        if needs_select[i] {
            let ty = rewriter.op(prev).result_type(i);
            let select = rewriter.create_op(
                OpKind::Select,
                &[prev_cond, prev_then_vals[i], prev_else_vals[i]],
                &[ty],
                vec![],
                0,
            );
            rewriter.insert_op_before(prev, select);
            rewriter.revisit(select);
            selects[i] = Some(Value::result(select, 0));
        }
    }
    for &b in &between {
        rewriter.module.remove_from_block(b);
        rewriter.module.insert_op_before(prev, b);
    }
    for (i, user, operand_index, site) in retargets {
        let replacement = match site {
            PrevResultUse::MergedThen => prev_then_vals[i],
            PrevResultUse::MergedElse => prev_else_vals[i],
            PrevResultUse::Between => match selects[i] {
                Some(value) => value,
                None => continue,
            },
            PrevResultUse::Later => continue,
        };
        rewriter.set_operand(user, operand_index, replacement);
        rewriter.revisit(user);
    }

    // Captured after the rewiring so reads of the first if's results inside
    // these yields already point at the resolved values.
    let src_then_vals =
        src_then_yield.map(|y| rewriter.op(y).operands().to_vec()).unwrap_or_default();
    let src_else_vals =
        src_else_yield.map(|y| rewriter.op(y).operands().to_vec()).unwrap_or_default();

    let mut merged_types: SmallVec<[Type; 2]> = SmallVec::new();
    merged_types.extend(rewriter.op(prev).result_types().iter().cloned());
    merged_types.extend(rewriter.op(op).result_types().iter().cloned());
    let merged = rewriter.create_op(OpKind::If, &[prev_cond], &merged_types, vec![], 2);
    rewriter.insert_op_before(prev, merged);

    // Then branch: the first body followed by the second's contribution.
    let merged_then_region = rewriter.op(merged).region(0);
    rewriter.module.take_region_body(prev_then_region, merged_then_region);
    if let (Some(src_block), Some(src_yield)) = (src_then, src_then_yield) {
        rewriter.module.inline_block_before(src_block, prev_then_yield, &[]);
        rewriter.erase_op(src_yield);
        if m > 0 {
            let mut concat: SmallVec<[Value; 4]> = SmallVec::new();
            concat.extend_from_slice(&prev_then_vals);
            concat.extend_from_slice(&src_then_vals);
            rebuild_terminator(rewriter, prev_then_yield, OpKind::Yield, &concat);
        }
    }

    // Else branch likewise; created fresh when only the second if has one.
    let merged_else_region = rewriter.op(merged).region(1);
    rewriter.module.take_region_body(prev_else_region, merged_else_region);
    if let (Some(src_block), Some(src_yield)) = (src_else, src_else_yield) {
        match prev_else_yield {
            Some(anchor) => {
                rewriter.module.inline_block_before(src_block, anchor, &[]);
                rewriter.erase_op(src_yield);
                if m > 0 {
                    let mut concat: SmallVec<[Value; 4]> = SmallVec::new();
                    concat.extend_from_slice(&prev_else_vals);
                    concat.extend_from_slice(&src_else_vals);
                    rebuild_terminator(rewriter, anchor, OpKind::Yield, &concat);
                }
            }
            None => {
                let block = rewriter.module.create_block(merged_else_region, &[]);
                rewriter.module.merge_blocks(src_block, block, &[]);
            }
        }
    }

    for i in 0..n {
        rewriter.replace_all_uses(Value::result(prev, i), Value::result(merged, i));
    }
    for j in 0..m {
        rewriter.replace_all_uses(Value::result(op, j), Value::result(merged, n + j));
    }
    rewriter.revisit(merged);
    rewriter.erase_op(op);
    rewriter.erase_op(prev);
    RewriteResult::Changed
}

// =============================================================================
// while
// =============================================================================

fn while_condition_terminator(rewriter: &Rewriter<'_>, op: OpId) -> Option<OpId> {
    let before = rewriter.before_block(op);
    rewriter.terminator(before).filter(|&t| rewriter.op(t).kind() == OpKind::Condition)
}

/// Inside the after region, an argument fed by the condition flag itself is
/// always true.
pub fn while_condition_truth(rewriter: &mut Rewriter<'_>, op: OpId) -> RewriteResult {
    let Some(condition) = while_condition_terminator(rewriter, op) else {
        return RewriteResult::NoMatch;
    };
    let flag = rewriter.op(condition).operand(0);
    let after = rewriter.after_block(op);
    let mut changed = false;
    for index in 0..rewriter.block(after).num_args() {
        let arg = Value::argument(after, index);
        if rewriter.op(condition).operand(1 + index) == flag && rewriter.has_uses(arg) {
            let truth = rewriter.create_op(
                OpKind::Constant,
                &[],
                &[Type::bool_()],
                vec![("value", crate::attr::Attr::bool_(true))],
                0,
            );
            rewriter.module.insert_op_at_start(after, truth);
            rewriter.revisit(truth);
            rewriter.replace_all_uses(arg, Value::result(truth, 0));
            changed = true;
        }
    }
    if changed { RewriteResult::Changed } else { RewriteResult::NoMatch }
}

/// Values forwarded by the condition but defined outside the loop reach
/// their users directly; the corresponding arguments and results go dead.
pub fn while_invariant_condition_args(rewriter: &mut Rewriter<'_>, op: OpId) -> RewriteResult {
    let Some(condition) = while_condition_terminator(rewriter, op) else {
        return RewriteResult::NoMatch;
    };
    let before_region = rewriter.op(op).region(0);
    let after = rewriter.after_block(op);
    let mut changed = false;
    for index in 0..rewriter.block(after).num_args() {
        let forwarded = rewriter.op(condition).operand(1 + index);
        if forwarded == rewriter.op(condition).operand(0) {
            continue;
        }
        if !rewriter.is_defined_outside(forwarded, before_region) {
            continue;
        }
        let arg = Value::argument(after, index);
        if rewriter.has_uses(arg) {
            rewriter.replace_all_uses(arg, forwarded);
            changed = true;
        }
        let result = Value::result(op, index);
        if rewriter.has_uses(result) {
            rewriter.replace_all_uses(result, forwarded);
            changed = true;
        }
    }
    if changed { RewriteResult::Changed } else { RewriteResult::NoMatch }
}

/// Duplicate condition operands fold onto their first occurrence, leaving
/// the later results and after-arguments dead.
pub fn dedupe_while_condition_args(rewriter: &mut Rewriter<'_>, op: OpId) -> RewriteResult {
    let Some(condition) = while_condition_terminator(rewriter, op) else {
        return RewriteResult::NoMatch;
    };
    let forwarded = rewriter.op(condition).operands()[1..].to_vec();
    let after = rewriter.after_block(op);
    let mut changed = false;
    for j in 0..forwarded.len() {
        let Some(i) = forwarded[..j].iter().position(|&v| v == forwarded[j]) else {
            continue;
        };
        let arg = Value::argument(after, j);
        if rewriter.has_uses(arg) {
            rewriter.replace_all_uses(arg, Value::argument(after, i));
            changed = true;
        }
        let result = Value::result(op, j);
        if rewriter.has_uses(result) {
            rewriter.replace_all_uses(result, Value::result(op, i));
            changed = true;
        }
    }
    if changed { RewriteResult::Changed } else { RewriteResult::NoMatch }
}

/// Drop (result, after-argument) pairs with no uses on either side.
pub fn prune_while_results(rewriter: &mut Rewriter<'_>, op: OpId) -> RewriteResult {
    let num = rewriter.op(op).num_results();
    if num == 0 {
        return RewriteResult::NoMatch;
    }
    let Some(condition) = while_condition_terminator(rewriter, op) else {
        return RewriteResult::NoMatch;
    };
    let after = rewriter.after_block(op);
    if rewriter.block(after).num_args() != num {
        return RewriteResult::NoMatch;
    }
    let drop: Vec<bool> = (0..num)
        .map(|i| !rewriter.has_uses(Value::result(op, i)) && !rewriter.has_uses(Value::argument(after, i)))
        .collect();
    if drop.iter().all(|&d| !d) {
        return RewriteResult::NoMatch;
    }
    let inits = rewriter.op(op).operands().to_vec();
    let kept_types: SmallVec<[Type; 2]> =
        (0..num).filter(|&i| !drop[i]).map(|i| rewriter.op(op).result_type(i)).collect();
    let replacement = rewriter.create_op(OpKind::While, &inits, &kept_types, vec![], 2);
    rewriter.insert_op_before(op, replacement);
    for region_index in 0..2 {
        let old_region = rewriter.op(op).region(region_index);
        let new_region = rewriter.op(replacement).region(region_index);
        rewriter.take_region_body(old_region, new_region);
    }
    let flag = rewriter.op(condition).operand(0);
    let mut operands: SmallVec<[Value; 4]> = SmallVec::new();
    operands.push(flag);
    for i in 0..num {
        if !drop[i] {
            operands.push(rewriter.op(condition).operand(1 + i));
        }
    }
    rebuild_terminator(rewriter, condition, OpKind::Condition, &operands);
    rewriter.module.erase_block_args(after, &drop);
    let mut next = 0usize;
    for i in 0..num {
        if !drop[i] {
            rewriter.replace_all_uses(Value::result(op, i), Value::result(replacement, next));
            next += 1;
        }
    }
    rewriter.revisit(replacement);
    rewriter.erase_op(op);
    RewriteResult::Changed
}

/// Drop init values whose before-region argument is never used; the after
/// region's yield loses the same positions.
pub fn prune_while_before_args(rewriter: &mut Rewriter<'_>, op: OpId) -> RewriteResult {
    let before = rewriter.before_block(op);
    let num = rewriter.block(before).num_args();
    if num == 0 || rewriter.op(op).num_operands() != num {
        return RewriteResult::NoMatch;
    }
    let after = rewriter.after_block(op);
    let Some(after_yield) = rewriter.terminator(after) else {
        return RewriteResult::NoMatch;
    };
    if rewriter.op(after_yield).num_operands() != num {
        return RewriteResult::NoMatch;
    }
    let drop: Vec<bool> = (0..num).map(|i| !rewriter.has_uses(Value::argument(before, i))).collect();
    if drop.iter().all(|&d| !d) {
        return RewriteResult::NoMatch;
    }
    let inits: SmallVec<[Value; 4]> = (0..num)
        .filter(|&i| !drop[i])
        .map(|i| rewriter.op(op).operand(i))
        .collect();
    let result_types: SmallVec<[Type; 2]> = rewriter.op(op).result_types().iter().cloned().collect();
    let replacement = rewriter.create_op(OpKind::While, &inits, &result_types, vec![], 2);
    rewriter.insert_op_before(op, replacement);
    for region_index in 0..2 {
        let old_region = rewriter.op(op).region(region_index);
        let new_region = rewriter.op(replacement).region(region_index);
        rewriter.take_region_body(old_region, new_region);
    }
    let kept_yield: SmallVec<[Value; 4]> = (0..num)
        .filter(|&i| !drop[i])
        .map(|i| rewriter.op(after_yield).operand(i))
        .collect();
    rebuild_terminator(rewriter, after_yield, OpKind::Yield, &kept_yield);
    rewriter.module.erase_block_args(before, &drop);
    for i in 0..rewriter.op(op).num_results() {
        rewriter.replace_all_uses(Value::result(op, i), Value::result(replacement, i));
    }
    rewriter.revisit(replacement);
    rewriter.erase_op(op);
    RewriteResult::Changed
}

// =============================================================================
// index_switch
// =============================================================================

/// A constant selector picks its region statically; that region inlines in
/// place of the op.
pub fn inline_constant_case(rewriter: &mut Rewriter<'_>, op: OpId) -> RewriteResult {
    let Some(value) = rewriter.const_int(rewriter.op(op).operand(0)) else {
        return RewriteResult::NoMatch;
    };
    let Some(cases) = rewriter.op(op).attr("cases").and_then(|a| a.as_int_array().map(<[i64]>::to_vec)) else {
        return RewriteResult::NoMatch;
    };
    let block = match cases.iter().position(|&c| c == value) {
        Some(case_index) => rewriter.case_block(op, case_index),
        None => rewriter.default_block(op),
    };
    let Some(yielded) = splice_block_before(rewriter, block, op, &[]) else {
        return RewriteResult::NoMatch;
    };
    rewriter.replace_op_with_values(op, &yielded);
    RewriteResult::Changed
}

// =============================================================================
// parallel
// =============================================================================

fn constant_trip_count(rewriter: &Rewriter<'_>, lb: Value, ub: Value, step: Value) -> Option<i64> {
    let lb = rewriter.const_int(lb)?;
    let ub = rewriter.const_int(ub)?;
    let step = rewriter.const_int(step)?;
    if step <= 0 {
        return None;
    }
    if ub <= lb {
        return Some(0);
    }
    // Widened: ub - lb can overflow i64 on its own.
    let trips = (ub as i128 - lb as i128 + step as i128 - 1) / step as i128;
    i64::try_from(trips).ok()
}

/// Dimensions that provably run zero or one times collapse: a zero-trip
/// dimension kills the whole loop, single-trip dimensions pin their
/// induction variable to the lower bound and drop out.
pub fn simplify_parallel_dims(rewriter: &mut Rewriter<'_>, op: OpId) -> RewriteResult {
    let operands = rewriter.op(op).operands().to_vec();
    let n = operands.len() / 3;
    let trips: Vec<Option<i64>> = (0..n)
        .map(|d| constant_trip_count(rewriter, operands[d], operands[n + d], operands[2 * n + d]))
        .collect();
    if trips.iter().any(|&t| t == Some(0)) {
        rewriter.erase_op(op);
        return RewriteResult::Changed;
    }
    let single: Vec<bool> = trips.iter().map(|&t| t == Some(1)).collect();
    if single.iter().all(|&s| !s) {
        return RewriteResult::NoMatch;
    }
    let body = rewriter.parallel_body(op);
    for d in 0..n {
        if !single[d] {
            continue;
        }
        let arg = Value::argument(body, d);
        if !rewriter.has_uses(arg) {
            continue;
        }
        // A single-trip dimension has a constant lower bound.
        let Some(lb) = rewriter.const_int(operands[d]) else {
            continue;
        };
        let pinned = rewriter.create_op(
            OpKind::Constant,
            &[],
            &[Type::index()],
            vec![("value", crate::attr::Attr::int(lb))],
            0,
        );
        rewriter.module.insert_op_at_start(body, pinned);
        rewriter.revisit(pinned);
        rewriter.replace_all_uses(arg, Value::result(pinned, 0));
    }
    if single.iter().all(|&s| s) {
        let mask = vec![true; n];
        rewriter.module.erase_block_args(body, &mask);
        if splice_block_before(rewriter, body, op, &[]).is_none() {
            return RewriteResult::Changed;
        }
        rewriter.erase_op(op);
        return RewriteResult::Changed;
    }
    let mut kept: SmallVec<[Value; 4]> = SmallVec::new();
    for group in 0..3 {
        for d in 0..n {
            if !single[d] {
                kept.push(operands[group * n + d]);
            }
        }
    }
    let replacement = rewriter.create_op(OpKind::Parallel, &kept, &[], vec![], 1);
    rewriter.insert_op_before(op, replacement);
    let old_region = rewriter.op(op).region(0);
    let new_region = rewriter.op(replacement).region(0);
    rewriter.take_region_body(old_region, new_region);
    rewriter.module.erase_block_args(body, &single);
    rewriter.revisit(replacement);
    rewriter.erase_op(op);
    RewriteResult::Changed
}

/// A parallel loop whose body is just another parallel loop (with invariant
/// bounds) flattens into one loop over the combined dimensions.
pub fn merge_nested_parallel(rewriter: &mut Rewriter<'_>, op: OpId) -> RewriteResult {
    let body = rewriter.parallel_body(op);
    let ops = rewriter.block(body).ops();
    if ops.len() != 2 {
        return RewriteResult::NoMatch;
    }
    let inner = ops[0];
    if rewriter.op(inner).kind() != OpKind::Parallel {
        return RewriteResult::NoMatch;
    }
    let region = rewriter.op(op).region(0);
    let inner_bounds = rewriter.op(inner).operands().to_vec();
    if inner_bounds.iter().any(|&v| !rewriter.is_defined_outside(v, region)) {
        return RewriteResult::NoMatch;
    }
    let inner_body = rewriter.parallel_body(inner);
    if rewriter.terminator(inner_body).is_none() {
        return RewriteResult::NoMatch;
    }
    let outer_bounds = rewriter.op(op).operands().to_vec();
    let n = outer_bounds.len() / 3;
    let m = inner_bounds.len() / 3;
    let mut combined: SmallVec<[Value; 4]> = SmallVec::new();
    for group in 0..3 {
        combined.extend_from_slice(&outer_bounds[group * n..(group + 1) * n]);
        combined.extend_from_slice(&inner_bounds[group * m..(group + 1) * m]);
    }
    let replacement = rewriter.create_op(OpKind::Parallel, &combined, &[], vec![], 1);
    let arg_types: SmallVec<[Type; 4]> = (0..n + m).map(|_| Type::index()).collect();
    let new_region = rewriter.op(replacement).region(0);
    let new_body = rewriter.create_block(new_region, &arg_types);
    rewriter.insert_op_before(op, replacement);
    for d in 0..n {
        rewriter.replace_all_uses(Value::argument(body, d), Value::argument(new_body, d));
    }
    let inner_replacements: SmallVec<[Value; 4]> =
        (0..m).map(|d| Value::argument(new_body, n + d)).collect();
    rewriter.module.merge_blocks(inner_body, new_body, &inner_replacements);
    rewriter.revisit(replacement);
    rewriter.erase_op(op);
    RewriteResult::Changed
}
