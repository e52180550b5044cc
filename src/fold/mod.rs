//! Constant folding.
//!
//! Folders are pure queries: `fn(&Module, OpId) -> FoldOutcome`. They never
//! mutate the graph; the driver applies the outcome through [`apply_fold`].
//! This keeps every fold usable both from the canonicalization worklist and
//! from analyses that only want to know what an op would fold to.
//!
//! Multi-result ops fold per result: a `Results` outcome carries one
//! `Option` slot per result, so `extract_metadata` can resolve its static
//! components while leaving the dynamic ones in place.

pub mod flow;
pub mod mem;

use smallvec::SmallVec;

use crate::attr::Attr;
use crate::ir::{Module, OpId, OpKind, Value};

/// What one result folds to.
#[derive(Debug, Clone)]
pub enum FoldResult {
    /// An existing value in the graph.
    Existing(Value),
    /// A constant; the driver materializes a `constant` op for it.
    Constant(Attr),
}

/// An update the op absorbs without being replaced: operand substitutions,
/// attribute rewrites and region swaps. Result types never change.
#[derive(Debug, Clone, Default)]
pub struct InPlaceUpdate {
    pub operands: SmallVec<[(usize, Value); 2]>,
    pub attrs: SmallVec<[(&'static str, Attr); 1]>,
    pub swap_regions: Option<(usize, usize)>,
}

#[derive(Debug, Clone)]
pub enum FoldOutcome {
    Unchanged,
    InPlace(InPlaceUpdate),
    Results(SmallVec<[Option<FoldResult>; 2]>),
}

pub type FoldFn = fn(&Module, OpId) -> FoldOutcome;

pub(crate) fn fold_nothing(_module: &Module, _op: OpId) -> FoldOutcome {
    FoldOutcome::Unchanged
}

/// Shorthand for a single-result fold.
pub(crate) fn single(result: FoldResult) -> FoldOutcome {
    FoldOutcome::Results(SmallVec::from_iter([Some(result)]))
}

/// Apply a fold outcome. Returns the values whose uses changed (for worklist
/// re-enqueueing), or `None` when nothing happened. The folded op is erased
/// when it is side-effect free and every result lost its last use.
pub fn apply_fold(module: &mut Module, op: OpId, outcome: FoldOutcome) -> Option<Vec<Value>> {
    match outcome {
        FoldOutcome::Unchanged => None,
        FoldOutcome::InPlace(update) => {
            for (index, value) in update.operands {
                module.set_operand(op, index, value);
            }
            for (name, attr) in update.attrs {
                module.set_attr(op, name, attr);
            }
            if let Some((a, b)) = update.swap_regions {
                module.swap_op_regions(op, a, b);
            }
            Some(module.result_values(op).to_vec())
        }
        FoldOutcome::Results(results) => {
            let mut changed = Vec::new();
            for (index, slot) in results.into_iter().enumerate() {
                let Some(result) = slot else { continue };
                let old = Value::result(op, index);
                if !module.has_uses(old) {
                    continue;
                }
                let new = match result {
                    FoldResult::Existing(value) => value,
                    FoldResult::Constant(attr) => {
                        let ty = module.op(op).result_type(index);
                        let constant =
                            module.create_op(OpKind::Constant, &[], &[ty], vec![("value", attr)], 0);
                        module.insert_op_before(op, constant);
                        Value::result(constant, 0)
                    }
                };
                module.replace_all_uses(old, new);
                changed.push(new);
            }
            if changed.is_empty() {
                return None;
            }
            let kind = module.op(op).kind();
            if kind.is_pure() && module.result_values(op).iter().all(|&v| !module.has_uses(v)) {
                module.erase_op(op);
            }
            Some(changed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    #[test]
    fn test_apply_existing_erases_pure_op() {
        let mut module = Module::new();
        let body = module.body();
        let flag = module.constant_bool(body, true);
        let a = module.constant_index(body, 1);
        let b = module.constant_index(body, 2);
        let selected = module.select(body, flag, a, b);
        let user = module.not(body, selected);
        let _ = user;
        let select_op = module.defining_op(selected).unwrap();
        let outcome = single(FoldResult::Existing(a));
        let changed = apply_fold(&mut module, select_op, outcome).unwrap();
        assert_eq!(changed, vec![a]);
        assert!(!module.is_live(select_op));
    }

    #[test]
    fn test_apply_constant_materializes_before_op() {
        let mut module = Module::new();
        let body = module.body();
        let a = module.constant_bool(body, false);
        let n = module.not(body, a);
        let user = module.not(body, n);
        let not_op = module.defining_op(n).unwrap();
        let outcome = single(FoldResult::Constant(Attr::bool_(true)));
        assert!(apply_fold(&mut module, not_op, outcome).is_some());
        assert!(!module.is_live(not_op));
        let user_op = module.defining_op(user).unwrap();
        let operand = module.op(user_op).operand(0);
        assert_eq!(module.const_bool(operand), Some(true));
        assert_eq!(module.value_type(operand), Type::bool_());
    }

    #[test]
    fn test_unused_results_not_materialized() {
        let mut module = Module::new();
        let body = module.body();
        let a = module.constant_bool(body, false);
        let n = module.not(body, a);
        let not_op = module.defining_op(n).unwrap();
        // No users: nothing to do, op left alone.
        assert!(apply_fold(&mut module, not_op, single(FoldResult::Constant(Attr::bool_(true)))).is_none());
        assert!(module.is_live(not_op));
    }
}
