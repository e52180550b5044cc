//! Verifier coverage: each family of rules rejects its malformed input.

use smallvec::smallvec;

use crate::diag::CollectingSink;
use crate::error::Error;
use crate::ir::{Module, OpKind, RmwKind, Value};
use crate::sdim::SDim;
use crate::types::{Layout, MemorySpace, Type};
use crate::verify::{verify_module, verify_op};

#[test]
fn test_alloc_dynamic_size_count() {
    let mut module = Module::new();
    let body = module.body();
    let ty = Type::memref(
        Type::float(32),
        smallvec![SDim::DYNAMIC, SDim::new(4)],
        Layout::Identity,
        MemorySpace::default(),
    );
    // One dynamic dim, zero size operands.
    let op = module.alloc(body, ty, &[]);
    assert!(matches!(verify_op(&module, op), Err(Error::DynamicSizeCountMismatch { .. })));
}

#[test]
fn test_alloca_requires_enclosing_scope() {
    let mut module = Module::new();
    let body = module.body();
    let ty = Type::memref_identity(Type::float(32), [4]);
    let stray = module.alloca(body, ty.clone(), &[]);
    assert!(matches!(verify_op(&module, stray), Err(Error::AllocaOutsideScope)));

    let scope = module.alloca_scope(body, &[]);
    let inner = module.entry_block(module.op(scope).region(0)).unwrap();
    let scoped = module.alloca(inner, ty, &[]);
    module.yield_op(inner, &[]);
    assert!(verify_op(&module, scoped).is_ok());
}

#[test]
fn test_load_subscript_arity_and_type() {
    let mut module = Module::new();
    let body = module.body();
    let ty = Type::memref_identity(Type::float(32), [4, 4]);
    let source = module.alloc(body, ty, &[]);
    let zero = module.constant_index(body, 0);
    let short = module.load(body, Value::result(source, 0), &[zero]);
    let op = module.defining_op(short).unwrap();
    assert!(matches!(verify_op(&module, op), Err(Error::SubscriptCountMismatch { .. })));

    let flag = module.constant_bool(body, true);
    let bad_index = module.load(body, Value::result(source, 0), &[zero, flag]);
    let op = module.defining_op(bad_index).unwrap();
    assert!(matches!(verify_op(&module, op), Err(Error::NotIndexType { .. })));
}

#[test]
fn test_store_element_type_mismatch() {
    let mut module = Module::new();
    let body = module.body();
    let ty = Type::memref_identity(Type::float(32), [2]);
    let dest = module.alloc(body, ty, &[]);
    let zero = module.constant_index(body, 0);
    let flag = module.constant_bool(body, true);
    let op = module.store(body, flag, Value::result(dest, 0), &[zero]);
    assert!(matches!(verify_op(&module, op), Err(Error::ElementTypeMismatch { .. })));
}

#[test]
fn test_atomic_kind_must_match_element_category() {
    let mut module = Module::new();
    let body = module.body();
    let ty = Type::memref_identity(Type::int(32, true), [2]);
    let dest = module.alloc(body, ty, &[]);
    let zero = module.constant_index(body, 0);
    let value = module.constant(body, Type::int(32, true), crate::attr::Attr::int(7));
    let float_kind = module.atomic_rmw(body, RmwKind::AddF, value, Value::result(dest, 0), &[zero]);
    let op = module.defining_op(float_kind).unwrap();
    assert!(matches!(verify_op(&module, op), Err(Error::AtomicKindMismatch { .. })));
}

#[test]
fn test_unranked_to_unranked_cast_rejected() {
    let mut module = Module::new();
    let body = module.body();
    let ranked = Type::memref_identity(Type::float(32), [4]);
    let unranked = Type::unranked_memref(Type::float(32), MemorySpace::default());
    let source = module.alloc(body, ranked, &[]);
    let erased = module.cast(body, Value::result(source, 0), unranked.clone());
    let again = module.cast(body, erased, unranked);
    let op = module.defining_op(again).unwrap();
    assert!(matches!(verify_op(&module, op), Err(Error::UnrankedCastUnsupported)));
}

#[test]
fn test_transpose_requires_valid_permutation() {
    let mut module = Module::new();
    let body = module.body();
    let ty = Type::memref_identity(Type::float(32), [2, 3]);
    let source = module.alloc(body, ty.clone(), &[]);
    let bad = module.transpose(body, Value::result(source, 0), &[0, 0], ty);
    let op = module.defining_op(bad).unwrap();
    assert!(matches!(verify_op(&module, op), Err(Error::InvalidPermutation { .. })));
}

#[test]
fn test_if_with_results_needs_else() {
    let mut module = Module::new();
    let body = module.body();
    let flag = module.constant_bool(body, true);
    let value = module.constant_bool(body, false);
    let op = module.if_op(body, flag, &[Type::bool_()], false);
    let then = module.then_block(op);
    module.yield_op(then, &[value]);
    assert!(matches!(verify_op(&module, op), Err(Error::MissingElse)));
}

#[test]
fn test_for_bound_and_yield_types() {
    let mut module = Module::new();
    let body = module.body();
    let lb = module.constant_index(body, 0);
    let ub = module.constant_index(body, 4);
    let step = module.constant_index(body, 1);
    let init = module.constant_bool(body, true);
    let op = module.for_op(body, lb, ub, step, &[init]);
    let fb = module.for_body(op);
    // Yields an index where a bool is carried.
    module.yield_op(fb, &[Value::argument(fb, 0)]);
    assert!(matches!(verify_op(&module, op), Err(Error::YieldTypeMismatch { .. })));
}

#[test]
fn test_while_condition_flag_must_be_bool() {
    let mut module = Module::new();
    let body = module.body();
    let init = module.constant_index(body, 0);
    let op = module.while_op(body, &[init], &[Type::index()]);
    let before = module.before_block(op);
    let arg = Value::argument(before, 0);
    // The index argument is not a valid continuation flag.
    module.condition_op(before, arg, &[arg]);
    let after = module.after_block(op);
    module.yield_op(after, &[Value::argument(after, 0)]);
    assert!(matches!(verify_op(&module, op), Err(Error::ConditionNotBool { .. })));
}

#[test]
fn test_index_switch_rejects_duplicate_cases() {
    let mut module = Module::new();
    let body = module.body();
    let selector = module.constant_index(body, 0);
    let op = module.index_switch(body, selector, &[3, 3], &[]);
    for region in 0..3 {
        let block = module.entry_block(module.op(op).region(region)).unwrap();
        module.yield_op(block, &[]);
    }
    assert!(matches!(verify_op(&module, op), Err(Error::DuplicateCaseValue { .. })));
}

#[test]
fn test_parallel_step_must_be_positive() {
    let mut module = Module::new();
    let body = module.body();
    let lb = module.constant_index(body, 0);
    let ub = module.constant_index(body, 4);
    let step = module.constant_index(body, 0);
    let op = module.parallel(body, &[lb], &[ub], &[step]);
    let pb = module.parallel_body(op);
    module.yield_op(pb, &[]);
    assert!(matches!(verify_op(&module, op), Err(Error::NonPositiveStep { .. })));
}

#[test]
fn test_missing_terminator_is_structural() {
    let mut module = Module::new();
    let body = module.body();
    let flag = module.constant_bool(body, true);
    let op = module.if_op(body, flag, &[], false);
    // No yield in the then region.
    assert!(matches!(verify_op(&module, op), Err(Error::MissingTerminator { .. })));
}

#[test]
fn test_verify_module_collects_every_error() {
    let mut module = Module::new();
    let body = module.body();
    let ty = Type::memref_identity(Type::float(32), [4]);
    module.alloca(body, ty.clone(), &[]);
    let dest = module.alloc(body, ty, &[]);
    let zero = module.constant_index(body, 0);
    let flag = module.constant_bool(body, true);
    module.store(body, flag, Value::result(dest, 0), &[zero]);
    let mut sink = CollectingSink::new();
    assert_eq!(verify_module(&module, &mut sink), 2);
    assert_eq!(sink.error_count(), 2);
    assert!(sink.diagnostics.iter().all(|d| !d.notes.is_empty()));
}

#[test]
fn test_reinterpret_cast_attrs_must_match_result() {
    let mut module = Module::new();
    let body = module.body();
    let source_ty = Type::memref_identity(Type::float(32), [8]);
    let source = module.alloc(body, source_ty, &[]);
    // Declares sizes [4] but a result type of [8].
    let declared = Type::memref(
        Type::float(32),
        smallvec![SDim::new(8)],
        Layout::Strided { offset: SDim::new(0), strides: smallvec![SDim::new(1)] },
        MemorySpace::default(),
    );
    let bad = module.reinterpret_cast(
        body,
        Value::result(source, 0),
        SDim::new(0),
        &[SDim::new(4)],
        &[SDim::new(1)],
        &[],
        declared,
    );
    let op = module.defining_op(bad).unwrap();
    assert!(matches!(verify_op(&module, op), Err(Error::ReinterpretMismatch { .. })));
}
