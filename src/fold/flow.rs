//! Folds for the control-flow and support ops.

use smallvec::SmallVec;

use crate::attr::Attr;
use crate::fold::{FoldOutcome, FoldResult, InPlaceUpdate, single};
use crate::ir::{Module, OpId, OpKind};

pub fn fold_select(module: &Module, op: OpId) -> FoldOutcome {
    let operation = module.op(op);
    if let Some(flag) = module.const_bool(operation.operand(0)) {
        let chosen = operation.operand(if flag { 1 } else { 2 });
        return single(FoldResult::Existing(chosen));
    }
    if operation.operand(1) == operation.operand(2) {
        return single(FoldResult::Existing(operation.operand(1)));
    }
    FoldOutcome::Unchanged
}

pub fn fold_not(module: &Module, op: OpId) -> FoldOutcome {
    let operand = module.op(op).operand(0);
    if let Some(value) = module.const_bool(operand) {
        return single(FoldResult::Constant(Attr::bool_(!value)));
    }
    if let Some(inner) = module.defining_op_of(operand, OpKind::Not) {
        return single(FoldResult::Existing(module.op(inner).operand(0)));
    }
    FoldOutcome::Unchanged
}

pub fn fold_and(module: &Module, op: OpId) -> FoldOutcome {
    let lhs = module.op(op).operand(0);
    let rhs = module.op(op).operand(1);
    if lhs == rhs {
        return single(FoldResult::Existing(lhs));
    }
    match (module.const_bool(lhs), module.const_bool(rhs)) {
        (Some(a), Some(b)) => single(FoldResult::Constant(Attr::bool_(a && b))),
        (Some(false), _) | (_, Some(false)) => single(FoldResult::Constant(Attr::bool_(false))),
        (Some(true), _) => single(FoldResult::Existing(rhs)),
        (_, Some(true)) => single(FoldResult::Existing(lhs)),
        _ => FoldOutcome::Unchanged,
    }
}

/// `if not(c) then A else B` with a non-empty else becomes
/// `if c then B else A`, absorbing the negation in place.
pub fn fold_if(module: &Module, op: OpId) -> FoldOutcome {
    let condition = module.op(op).operand(0);
    let Some(negation) = module.defining_op_of(condition, OpKind::Not) else {
        return FoldOutcome::Unchanged;
    };
    if module.else_block(op).is_none() {
        return FoldOutcome::Unchanged;
    }
    FoldOutcome::InPlace(InPlaceUpdate {
        operands: SmallVec::from_iter([(0, module.op(negation).operand(0))]),
        swap_regions: Some((0, 1)),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fold::apply_fold;
    use crate::ir::Value;
    use crate::types::Type;

    #[test]
    fn test_select_constant_flag() {
        let mut module = Module::new();
        let body = module.body();
        let flag = module.constant_bool(body, false);
        let a = module.constant_index(body, 1);
        let b = module.constant_index(body, 2);
        let s = module.select(body, flag, a, b);
        let op = module.defining_op(s).unwrap();
        match fold_select(&module, op) {
            FoldOutcome::Results(results) => {
                assert!(matches!(results[0], Some(FoldResult::Existing(v)) if v == b));
            }
            other => panic!("expected a result fold, got {other:?}"),
        }
    }

    #[test]
    fn test_and_short_circuits() {
        let mut module = Module::new();
        let body = module.body();
        let t = module.constant_bool(body, true);
        let x = module.not(body, t);
        let a = module.and(body, t, x);
        let op = module.defining_op(a).unwrap();
        match fold_and(&module, op) {
            FoldOutcome::Results(results) => {
                assert!(matches!(results[0], Some(FoldResult::Existing(v)) if v == x));
            }
            other => panic!("expected a result fold, got {other:?}"),
        }
    }

    #[test]
    fn test_double_negation() {
        let mut module = Module::new();
        let body = module.body();
        let a = module.constant_bool(body, true);
        let b = module.constant_bool(body, false);
        let flag = module.and(body, a, b);
        let once = module.not(body, flag);
        let twice = module.not(body, once);
        let op = module.defining_op(twice).unwrap();
        match fold_not(&module, op) {
            FoldOutcome::Results(results) => {
                assert!(matches!(results[0], Some(FoldResult::Existing(v)) if v == flag));
            }
            other => panic!("expected a result fold, got {other:?}"),
        }
    }

    #[test]
    fn test_if_absorbs_negation() {
        let mut module = Module::new();
        let body = module.body();
        let raw = module.constant_bool(body, true);
        let x = module.not(body, raw);
        let negated = module.not(body, x);
        let i = module.if_op(body, negated, &[Type::index()], true);
        let then = module.then_block(i);
        let tv = module.constant_index(then, 1);
        module.yield_op(then, &[tv]);
        let els = module.else_block(i).unwrap();
        let ev = module.constant_index(els, 2);
        module.yield_op(els, &[ev]);
        let user = module.not(body, Value::result(i, 0));
        let _ = user;

        let outcome = fold_if(&module, i);
        assert!(apply_fold(&mut module, i, outcome).is_some());
        assert_eq!(module.op(i).operand(0), x);
        assert_eq!(module.then_block(i), els);
    }
}
