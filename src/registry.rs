//! Per-kind dispatch table binding each op to its verifier, folder and
//! canonicalization patterns.
//!
//! The verifier runs after the structural checks shared by all ops. The
//! folder runs before the pattern list; patterns are tried in order and the
//! first match wins.

use crate::canonicalize::PatternFn;
use crate::canonicalize::{flow as flow_patterns, mem as mem_patterns};
use crate::error::Result;
use crate::fold::{flow as flow_folds, fold_nothing, mem as mem_folds, FoldFn};
use crate::ir::{Module, OpId, OpKind};
use crate::verify::{flow as flow_verify, mem as mem_verify, verify_nothing};

pub struct OpSpec {
    pub verify: fn(&Module, OpId) -> Result<()>,
    pub fold: FoldFn,
    pub patterns: &'static [PatternFn],
}

macro_rules! spec {
    ($verify:expr) => {
        spec!($verify, fold_nothing, &[])
    };
    ($verify:expr, $fold:expr) => {
        spec!($verify, $fold, &[])
    };
    ($verify:expr, $fold:expr, $patterns:expr) => {
        &OpSpec { verify: $verify, fold: $fold, patterns: $patterns }
    };
}

pub fn spec(kind: OpKind) -> &'static OpSpec {
    match kind {
        OpKind::Constant => spec!(flow_verify::verify_constant),
        OpKind::Select => spec!(flow_verify::verify_select, flow_folds::fold_select),
        OpKind::Not => spec!(flow_verify::verify_not, flow_folds::fold_not),
        OpKind::And => spec!(flow_verify::verify_and, flow_folds::fold_and),

        OpKind::Alloc => spec!(
            mem_verify::verify_alloc,
            fold_nothing,
            &[mem_patterns::erase_dead_alloc, mem_patterns::promote_alloc_const_sizes]
        ),
        OpKind::Alloca => spec!(
            mem_verify::verify_alloca,
            fold_nothing,
            &[
                mem_patterns::erase_dead_alloc,
                mem_patterns::promote_alloc_const_sizes,
                mem_patterns::hoist_alloca_from_scope,
            ]
        ),
        OpKind::AllocScope => spec!(verify_nothing, fold_nothing, &[mem_patterns::inline_alloca_scope]),
        OpKind::Dealloc => spec!(mem_verify::verify_dealloc),
        OpKind::Load => spec!(mem_verify::verify_load),
        OpKind::Store => spec!(mem_verify::verify_store),
        OpKind::Cast => spec!(mem_verify::verify_cast, mem_folds::fold_cast),
        OpKind::Dim => spec!(mem_verify::verify_dim, mem_folds::fold_dim),
        OpKind::Subview => spec!(
            mem_verify::verify_subview,
            mem_folds::fold_subview,
            &[mem_patterns::trivial_subview_to_cast, mem_patterns::fold_cast_into_subview]
        ),
        OpKind::ExpandShape => spec!(mem_verify::verify_expand_shape, mem_folds::fold_expand_shape),
        OpKind::CollapseShape => spec!(mem_verify::verify_collapse_shape, mem_folds::fold_collapse_shape),
        OpKind::ReinterpretCast => {
            spec!(mem_verify::verify_reinterpret_cast, mem_folds::fold_reinterpret_cast)
        }
        OpKind::ExtractMetadata => {
            spec!(mem_verify::verify_extract_metadata, mem_folds::fold_extract_metadata)
        }
        OpKind::AtomicRmw(_) => spec!(mem_verify::verify_atomic_rmw, mem_folds::fold_atomic_rmw),
        OpKind::Transpose => spec!(mem_verify::verify_transpose, mem_folds::fold_transpose),

        OpKind::For => spec!(
            flow_verify::verify_for,
            fold_nothing,
            &[flow_patterns::simplify_for_bounds, flow_patterns::prune_for_iter_args]
        ),
        OpKind::While => spec!(
            flow_verify::verify_while,
            fold_nothing,
            &[
                flow_patterns::while_condition_truth,
                flow_patterns::while_invariant_condition_args,
                flow_patterns::dedupe_while_condition_args,
                flow_patterns::prune_while_results,
                flow_patterns::prune_while_before_args,
            ]
        ),
        OpKind::If => spec!(
            flow_verify::verify_if,
            flow_folds::fold_if,
            &[
                flow_patterns::inline_static_if,
                flow_patterns::erase_empty_if,
                flow_patterns::replace_if_yield_results,
                flow_patterns::prune_if_results,
                flow_patterns::erase_empty_else,
                flow_patterns::merge_nested_ifs,
                flow_patterns::merge_consecutive_ifs,
            ]
        ),
        OpKind::IndexSwitch => spec!(
            flow_verify::verify_index_switch,
            fold_nothing,
            &[flow_patterns::inline_constant_case]
        ),
        OpKind::Parallel => spec!(
            flow_verify::verify_parallel,
            fold_nothing,
            &[flow_patterns::simplify_parallel_dims, flow_patterns::merge_nested_parallel]
        ),

        // Terminators are verified through their parent op.
        OpKind::Yield | OpKind::Condition => spec!(verify_nothing),
    }
}
