//! Whole-pipeline tests for the memory-reference ops.

use smallvec::smallvec;

use crate::attr::Attr;
use crate::canonicalize::canonicalize;
use crate::diag::CollectingSink;
use crate::ir::{Module, OpKind, RmwKind, Value};
use crate::sdim::SDim;
use crate::types::{Layout, MemorySpace, Shape, Type};
use crate::verify::mem::{infer_subview_type, permuted_type};
use crate::verify::{verify_module, verify_op};

fn ops_of_kind(module: &Module, kind: OpKind) -> Vec<crate::ir::OpId> {
    module.walk().into_iter().filter(|&op| module.op(op).kind() == kind).collect()
}

fn atomics(module: &Module) -> Vec<crate::ir::OpId> {
    module
        .walk()
        .into_iter()
        .filter(|&op| matches!(module.op(op).kind(), OpKind::AtomicRmw(_)))
        .collect()
}

#[test]
fn test_subview_offset_and_strides_inference() {
    let source = Type::memref_identity(Type::float(32), [16, 16]);
    let m = source.as_memref().unwrap();
    let offsets: Shape = smallvec![SDim::new(2), SDim::new(3)];
    let sizes: Shape = smallvec![SDim::new(4), SDim::new(4)];
    let strides: Shape = smallvec![SDim::new(1), SDim::new(1)];
    let inferred = infer_subview_type(m, &offsets, &sizes, &strides);
    let result = inferred.as_memref().unwrap();
    assert_eq!(result.shape, sizes);
    match &result.layout {
        Layout::Strided { offset, strides } => {
            assert!(offset.is(2 * 16 + 3));
            assert!(strides[0].is(16));
            assert!(strides[1].is(1));
        }
        Layout::Identity => panic!("expected a strided layout"),
    }
}

#[test]
fn test_subview_with_inferred_type_verifies() {
    let mut module = Module::new();
    let body = module.body();
    let source_ty = Type::memref_identity(Type::float(32), [16, 16]);
    let source = module.alloc(body, source_ty.clone(), &[]);
    let offsets: Shape = smallvec![SDim::new(2), SDim::new(3)];
    let sizes: Shape = smallvec![SDim::new(4), SDim::new(4)];
    let strides: Shape = smallvec![SDim::new(1), SDim::new(1)];
    let inferred = infer_subview_type(source_ty.as_memref().unwrap(), &offsets, &sizes, &strides);
    let view = module.subview_static(body, Value::result(source, 0), &[2, 3], &[4, 4], &[1, 1], inferred);
    module.dealloc(body, view);
    let mut sink = CollectingSink::new();
    assert_eq!(verify_module(&module, &mut sink), 0);
}

#[test]
fn test_subview_declared_type_must_match() {
    let mut module = Module::new();
    let body = module.body();
    let source_ty = Type::memref_identity(Type::float(32), [16, 16]);
    let source = module.alloc(body, source_ty, &[]);
    // Declares the slice as identity-layout, losing the real offset.
    let wrong = Type::memref_identity(Type::float(32), [4, 4]);
    let view = module.subview_static(body, Value::result(source, 0), &[2, 3], &[4, 4], &[1, 1], wrong);
    module.dealloc(body, view);
    let mut sink = CollectingSink::new();
    assert_eq!(verify_module(&module, &mut sink), 1);
}

#[test]
fn test_cast_legal_in_both_dynamicity_directions() {
    let static_ty = Type::memref_identity(Type::int(32, true), [8]);
    let dynamic_ty = Type::memref(
        Type::int(32, true),
        smallvec![SDim::DYNAMIC],
        Layout::Identity,
        MemorySpace::default(),
    );

    let mut module = Module::new();
    let body = module.body();
    let source = module.alloc(body, static_ty.clone(), &[]);
    let erased = module.cast(body, Value::result(source, 0), dynamic_ty.clone());
    let erase_op = module.defining_op(erased).unwrap();
    assert!(verify_op(&module, erase_op).is_ok());

    // Sharpening dynamic to static is an asserting cast, also legal.
    let size = module.constant_index(body, 8);
    let dynamic = module.alloc(body, dynamic_ty, &[size]);
    let sharpened = module.cast(body, Value::result(dynamic, 0), static_ty.clone());
    let sharpen_op = module.defining_op(sharpened).unwrap();
    assert!(verify_op(&module, sharpen_op).is_ok());

    // Two disagreeing static sizes are illegal either way.
    let other_ty = Type::memref_identity(Type::int(32, true), [4]);
    let shrunk = module.cast(body, Value::result(source, 0), other_ty.clone());
    let shrink_op = module.defining_op(shrunk).unwrap();
    assert!(verify_op(&module, shrink_op).is_err());
    let grown_src = module.alloc(body, other_ty, &[]);
    let grown = module.cast(body, Value::result(grown_src, 0), static_ty);
    let grow_op = module.defining_op(grown).unwrap();
    assert!(verify_op(&module, grow_op).is_err());
}

#[test]
fn test_dim_folds_to_static_size_or_operand() {
    let mut module = Module::new();
    let body = module.body();
    let size = module.constant_index(body, 12);
    let ty = Type::memref(
        Type::float(32),
        smallvec![SDim::new(8), SDim::DYNAMIC],
        Layout::Identity,
        MemorySpace::default(),
    );
    let source = module.alloc(body, ty, &[size]);
    let out = module.alloc(body, Type::memref_identity(Type::index(), [2]), &[]);
    let zero = module.constant_index(body, 0);
    let one = module.constant_index(body, 1);
    let d0 = module.dim(body, Value::result(source, 0), zero);
    let d1 = module.dim(body, Value::result(source, 0), one);
    module.atomic_rmw(body, RmwKind::AddI, d0, Value::result(out, 0), &[zero]);
    module.atomic_rmw(body, RmwKind::AddI, d1, Value::result(out, 0), &[one]);

    let mut sink = CollectingSink::new();
    assert!(canonicalize(&mut module, &mut sink));
    assert!(ops_of_kind(&module, OpKind::Dim).is_empty());
    let anchors = atomics(&module);
    assert_eq!(anchors.len(), 2);
    // The static dimension became a constant, the dynamic one traced back
    // to the alloc's size operand.
    assert_eq!(module.const_int(module.op(anchors[0]).operand(0)), Some(8));
    assert_eq!(module.op(anchors[1]).operand(0), size);
}

#[test]
fn test_extract_metadata_folds_static_results() {
    let mut module = Module::new();
    let body = module.body();
    let ty = Type::memref_identity(Type::float(32), [4, 8]);
    let source = module.alloc(body, ty, &[]);
    let meta = module.extract_metadata(body, Value::result(source, 0));
    let out = module.alloc(body, Type::memref_identity(Type::index(), [4]), &[]);
    // Accumulate size 0, size 1, stride 0, stride 1.
    for (slot, result) in [(0, 2), (1, 3), (2, 4), (3, 5)] {
        let index = module.constant_index(body, slot);
        module.atomic_rmw(body, RmwKind::AddI, Value::result(meta, result), Value::result(out, 0), &[index]);
    }

    let mut sink = CollectingSink::new();
    assert!(canonicalize(&mut module, &mut sink));
    let anchors = atomics(&module);
    let accumulated: Vec<Option<i64>> =
        anchors.iter().map(|&a| module.const_int(module.op(a).operand(0))).collect();
    assert_eq!(accumulated, vec![Some(4), Some(8), Some(8), Some(1)]);
    // All queried results are constants now, so the op itself is gone.
    assert!(ops_of_kind(&module, OpKind::ExtractMetadata).is_empty());
}

#[test]
fn test_transpose_involution_cancels() {
    let mut module = Module::new();
    let body = module.body();
    let ty = Type::memref_identity(Type::int(32, true), [4, 8]);
    let source = module.alloc(body, ty.clone(), &[]);
    let flipped_ty = permuted_type(ty.as_memref().unwrap(), &[1, 0]);
    let once = module.transpose(body, Value::result(source, 0), &[1, 0], flipped_ty);
    let twice = module.transpose(body, once, &[1, 0], ty);
    let zero = module.constant_index(body, 0);
    let unit = module.constant(body, Type::int(32, true), Attr::int(1));
    module.atomic_rmw(body, RmwKind::AddI, unit, twice, &[zero, zero]);

    let mut sink = CollectingSink::new();
    assert!(canonicalize(&mut module, &mut sink));
    assert!(ops_of_kind(&module, OpKind::Transpose).is_empty());
    let anchor = atomics(&module)[0];
    assert_eq!(module.op(anchor).operand(1), Value::result(source, 0));
}

#[test]
fn test_expand_collapse_pair_cancels() {
    let mut module = Module::new();
    let body = module.body();
    let flat = Type::memref_identity(Type::int(32, true), [24]);
    let grouped = Type::memref_identity(Type::int(32, true), [4, 6]);
    let source = module.alloc(body, flat.clone(), &[]);
    let expanded = module.expand_shape(body, Value::result(source, 0), vec![vec![0, 1]], grouped);
    let collapsed = module.collapse_shape(body, expanded, vec![vec![0, 1]], flat);
    let zero = module.constant_index(body, 0);
    let unit = module.constant(body, Type::int(32, true), Attr::int(1));
    module.atomic_rmw(body, RmwKind::AddI, unit, collapsed, &[zero]);

    let mut sink = CollectingSink::new();
    assert!(canonicalize(&mut module, &mut sink));
    let anchor = atomics(&module)[0];
    assert_eq!(module.op(anchor).operand(1), Value::result(source, 0));
}
