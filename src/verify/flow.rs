//! Verifiers for the structured-control-flow and support ops.
//!
//! These run after the structural pass, so region-carrying ops may assume
//! their mandatory regions have entry blocks ending in the right terminator
//! kind; everything here is about operand/argument/result type agreement.

use smallvec::SmallVec;
use snafu::ensure;

use crate::error::{
    CaseCountMismatchSnafu, ConditionNotBoolSnafu, DuplicateCaseValueSnafu, EmptyBoundsSnafu,
    InductionTypeMismatchSnafu, IterArityMismatchSnafu, IterTypeMismatchSnafu, MissingAttributeSnafu,
    MissingElseSnafu, NonPositiveStepSnafu, NotIndexTypeSnafu, OperandCountMismatchSnafu,
    OperandTypeMismatchSnafu, RegionArgMismatchSnafu, Result, YieldArityMismatchSnafu, YieldTypeMismatchSnafu,
};
use crate::ir::{BlockId, Module, OpId};
use crate::types::Type;

fn operand_types(module: &Module, op: OpId, from: usize) -> SmallVec<[Type; 4]> {
    module.op(op).operands()[from..].iter().map(|&v| module.value_type(v)).collect()
}

/// The terminator of `block` must carry exactly `expected` operand types.
fn verify_terminator_types(
    module: &Module,
    block: BlockId,
    expected: &[Type],
    terminator: &'static str,
) -> Result<()> {
    let term = match module.block(block).ops().last() {
        Some(&op) => op,
        None => return Ok(()),
    };
    // The condition flag of a `condition` terminator is not forwarded.
    let skip = usize::from(terminator == "condition");
    let actual = operand_types(module, term, skip);
    ensure!(
        actual.len() == expected.len(),
        YieldArityMismatchSnafu { terminator, expected: expected.len(), actual: actual.len() }
    );
    for (index, (e, a)) in expected.iter().zip(actual.iter()).enumerate() {
        ensure!(
            e == a,
            YieldTypeMismatchSnafu { terminator, index, expected: e.clone(), actual: a.clone() }
        );
    }
    Ok(())
}

// =============================================================================
// Support ops
// =============================================================================

pub fn verify_constant(module: &Module, op: OpId) -> Result<()> {
    ensure!(
        module.op(op).attr("value").is_some(),
        MissingAttributeSnafu { op: "constant", name: "value" }
    );
    Ok(())
}

pub fn verify_select(module: &Module, op: OpId) -> Result<()> {
    let operation = module.op(op);
    ensure!(
        operation.num_operands() == 3,
        OperandCountMismatchSnafu { op: "select", expected: 3usize, actual: operation.num_operands() }
    );
    let flag = module.value_type(operation.operand(0));
    ensure!(flag.is_bool(), ConditionNotBoolSnafu { actual: flag });
    let result = operation.result_type(0);
    for index in 1..3 {
        let actual = module.value_type(operation.operand(index));
        ensure!(
            actual == result,
            OperandTypeMismatchSnafu { op: "select", index, expected: result.clone(), actual }
        );
    }
    Ok(())
}

pub fn verify_not(module: &Module, op: OpId) -> Result<()> {
    let operation = module.op(op);
    ensure!(
        operation.num_operands() == 1,
        OperandCountMismatchSnafu { op: "not", expected: 1usize, actual: operation.num_operands() }
    );
    let actual = module.value_type(operation.operand(0));
    ensure!(
        actual == operation.result_type(0),
        OperandTypeMismatchSnafu { op: "not", index: 0usize, expected: operation.result_type(0), actual }
    );
    Ok(())
}

pub fn verify_and(module: &Module, op: OpId) -> Result<()> {
    let operation = module.op(op);
    ensure!(
        operation.num_operands() == 2,
        OperandCountMismatchSnafu { op: "and", expected: 2usize, actual: operation.num_operands() }
    );
    for index in 0..2 {
        let actual = module.value_type(operation.operand(index));
        ensure!(
            actual == operation.result_type(0),
            OperandTypeMismatchSnafu { op: "and", index, expected: operation.result_type(0), actual }
        );
    }
    Ok(())
}

// =============================================================================
// for
// =============================================================================

pub fn verify_for(module: &Module, op: OpId) -> Result<()> {
    let operation = module.op(op);
    ensure!(
        operation.num_operands() >= 3,
        OperandCountMismatchSnafu { op: "for", expected: 3usize, actual: operation.num_operands() }
    );
    let inits = operation.num_operands() - 3;
    ensure!(
        inits == operation.num_results(),
        IterArityMismatchSnafu { inits, results: operation.num_results() }
    );
    let bound_ty = module.value_type(operation.operand(0));
    for index in 1..3 {
        let actual = module.value_type(operation.operand(index));
        ensure!(
            actual == bound_ty,
            OperandTypeMismatchSnafu { op: "for", index, expected: bound_ty.clone(), actual }
        );
    }
    let body = module.for_body(op);
    let mut expected_args: SmallVec<[Type; 4]> = SmallVec::new();
    expected_args.push(bound_ty.clone());
    expected_args.extend(operand_types(module, op, 3));
    let actual_args: SmallVec<[Type; 4]> = module.block(body).arg_types().iter().cloned().collect();
    ensure!(
        expected_args.len() == actual_args.len(),
        RegionArgMismatchSnafu { expected: expected_args.clone(), actual: actual_args.clone() }
    );
    ensure!(
        actual_args[0] == bound_ty,
        InductionTypeMismatchSnafu { induction: actual_args[0].clone(), bound: bound_ty }
    );
    for index in 0..inits {
        let init = module.value_type(operation.operand(3 + index));
        let iter = actual_args[1 + index].clone();
        let result = operation.result_type(index);
        ensure!(init == iter && iter == result, IterTypeMismatchSnafu { index, init, result });
    }
    let result_types: SmallVec<[Type; 4]> = operation.result_types().iter().cloned().collect();
    verify_terminator_types(module, body, &result_types, "yield")
}

// =============================================================================
// while
// =============================================================================

pub fn verify_while(module: &Module, op: OpId) -> Result<()> {
    let operation = module.op(op);
    let init_types = operand_types(module, op, 0);
    let before = module.before_block(op);
    let before_args: SmallVec<[Type; 4]> = module.block(before).arg_types().iter().cloned().collect();
    ensure!(
        init_types == before_args,
        RegionArgMismatchSnafu { expected: init_types, actual: before_args.clone() }
    );
    let condition = match module.block(before).ops().last() {
        Some(&term) => term,
        None => return Ok(()),
    };
    let flag = module.value_type(module.op(condition).operand(0));
    ensure!(flag.is_bool(), ConditionNotBoolSnafu { actual: flag });
    let forwarded = operand_types(module, condition, 1);
    let after = module.after_block(op);
    let after_args: SmallVec<[Type; 4]> = module.block(after).arg_types().iter().cloned().collect();
    ensure!(
        forwarded == after_args,
        RegionArgMismatchSnafu { expected: forwarded, actual: after_args }
    );
    let result_types: SmallVec<[Type; 4]> = operation.result_types().iter().cloned().collect();
    verify_terminator_types(module, before, &result_types, "condition")?;
    let before_arg_types: SmallVec<[Type; 4]> = module.block(before).arg_types().iter().cloned().collect();
    verify_terminator_types(module, after, &before_arg_types, "yield")
}

// =============================================================================
// if
// =============================================================================

pub fn verify_if(module: &Module, op: OpId) -> Result<()> {
    let operation = module.op(op);
    ensure!(
        operation.num_operands() == 1,
        OperandCountMismatchSnafu { op: "if", expected: 1usize, actual: operation.num_operands() }
    );
    let flag = module.value_type(operation.operand(0));
    ensure!(flag.is_bool(), ConditionNotBoolSnafu { actual: flag });
    let else_block = module.else_block(op);
    ensure!(operation.num_results() == 0 || else_block.is_some(), MissingElseSnafu);
    let result_types: SmallVec<[Type; 4]> = operation.result_types().iter().cloned().collect();
    verify_terminator_types(module, module.then_block(op), &result_types, "yield")?;
    if let Some(else_block) = else_block {
        verify_terminator_types(module, else_block, &result_types, "yield")?;
    }
    Ok(())
}

// =============================================================================
// index_switch
// =============================================================================

pub fn verify_index_switch(module: &Module, op: OpId) -> Result<()> {
    let operation = module.op(op);
    let arg_ty = module.value_type(operation.operand(0));
    ensure!(arg_ty.is_index(), NotIndexTypeSnafu { actual: arg_ty });
    let cases = operation
        .attr("cases")
        .and_then(|a| a.as_int_array().map(|c| c.to_vec()))
        .ok_or_else(|| MissingAttributeSnafu { op: "index_switch", name: "cases" }.build())?;
    ensure!(
        operation.num_regions() == 1 + cases.len(),
        CaseCountMismatchSnafu { values: cases.len(), regions: operation.num_regions().saturating_sub(1) }
    );
    for (i, &value) in cases.iter().enumerate() {
        ensure!(!cases[..i].contains(&value), DuplicateCaseValueSnafu { value });
    }
    let result_types: SmallVec<[Type; 4]> = operation.result_types().iter().cloned().collect();
    verify_terminator_types(module, module.default_block(op), &result_types, "yield")?;
    for case_index in 0..cases.len() {
        verify_terminator_types(module, module.case_block(op, case_index), &result_types, "yield")?;
    }
    Ok(())
}

// =============================================================================
// parallel
// =============================================================================

pub fn verify_parallel(module: &Module, op: OpId) -> Result<()> {
    let operation = module.op(op);
    let total = operation.num_operands();
    ensure!(total > 0 && total % 3 == 0, EmptyBoundsSnafu);
    let n = total / 3;
    for &operand in operation.operands() {
        let ty = module.value_type(operand);
        ensure!(ty.is_index(), NotIndexTypeSnafu { actual: ty });
    }
    for index in 2 * n..3 * n {
        if let Some(step) = module.const_int(operation.operand(index)) {
            ensure!(step > 0, NonPositiveStepSnafu { value: step });
        }
    }
    let body = module.parallel_body(op);
    let args = module.block(body).arg_types();
    let expected: SmallVec<[Type; 4]> = (0..n).map(|_| Type::index()).collect();
    ensure!(
        args.len() == n,
        RegionArgMismatchSnafu { expected: expected.clone(), actual: args.iter().cloned().collect::<SmallVec<[Type; 4]>>() }
    );
    for ty in args {
        ensure!(ty.is_index(), NotIndexTypeSnafu { actual: ty.clone() });
    }
    verify_terminator_types(module, body, &[], "yield")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Value;
    use crate::verify::verify_op;

    #[test]
    fn test_for_well_formed() {
        let mut module = Module::new();
        let body = module.body();
        let lb = module.constant_index(body, 0);
        let ub = module.constant_index(body, 10);
        let step = module.constant_index(body, 1);
        let init = module.constant_index(body, 0);
        let f = module.for_op(body, lb, ub, step, &[init]);
        let loop_body = module.for_body(f);
        let iter = Value::argument(loop_body, 1);
        module.yield_op(loop_body, &[iter]);
        assert!(verify_op(&module, f).is_ok());
    }

    #[test]
    fn test_for_yield_arity() {
        let mut module = Module::new();
        let body = module.body();
        let lb = module.constant_index(body, 0);
        let ub = module.constant_index(body, 10);
        let step = module.constant_index(body, 1);
        let init = module.constant_index(body, 0);
        let f = module.for_op(body, lb, ub, step, &[init]);
        let loop_body = module.for_body(f);
        module.yield_op(loop_body, &[]);
        assert!(verify_op(&module, f).is_err());
    }

    #[test]
    fn test_while_condition_types() {
        let mut module = Module::new();
        let body = module.body();
        let init = module.constant_index(body, 0);
        let w = module.while_op(body, &[init], &[Type::index()]);
        let before = module.before_block(w);
        let flag = module.constant_bool(before, true);
        module.condition_op(before, flag, &[Value::argument(before, 0)]);
        let after = module.after_block(w);
        module.yield_op(after, &[Value::argument(after, 0)]);
        assert!(verify_op(&module, w).is_ok());
    }

    #[test]
    fn test_if_with_results_needs_else() {
        let mut module = Module::new();
        let body = module.body();
        let flag = module.constant_bool(body, true);
        let i = module.if_op(body, flag, &[Type::index()], false);
        let then = module.then_block(i);
        let v = module.constant_index(then, 1);
        module.yield_op(then, &[v]);
        assert!(verify_op(&module, i).is_err());
    }

    #[test]
    fn test_index_switch_duplicate_cases() {
        let mut module = Module::new();
        let body = module.body();
        let arg = module.constant_index(body, 1);
        let sw = module.index_switch(body, arg, &[3, 3], &[]);
        module.yield_op(module.default_block(sw), &[]);
        module.yield_op(module.case_block(sw, 0), &[]);
        module.yield_op(module.case_block(sw, 1), &[]);
        assert!(verify_op(&module, sw).is_err());
    }

    #[test]
    fn test_parallel_step_positivity() {
        let mut module = Module::new();
        let body = module.body();
        let lb = module.constant_index(body, 0);
        let ub = module.constant_index(body, 8);
        let step = module.constant_index(body, 0);
        let p = module.parallel(body, &[lb], &[ub], &[step]);
        module.yield_op(module.parallel_body(p), &[]);
        assert!(verify_op(&module, p).is_err());
    }
}
