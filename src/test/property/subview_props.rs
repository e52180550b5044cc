//! Property tests for strided-slice type inference.

use proptest::prelude::*;

use crate::diag::CollectingSink;
use crate::ir::{Module, Value};
use crate::sdim::SDim;
use crate::test::generators::arb_static_shape;
use crate::types::{Layout, Shape, Type};
use crate::verify::mem::infer_subview_type;
use crate::verify::verify_module;

fn arb_slice() -> impl Strategy<Value = (Vec<i64>, Vec<i64>, Vec<i64>, Vec<i64>)> {
    arb_static_shape(1..=3).prop_flat_map(|shape| {
        let rank = shape.len();
        let offsets = shape.iter().map(|&d| 0..d).collect::<Vec<_>>();
        (
            Just(shape),
            offsets,
            proptest::collection::vec(1i64..=4, rank),
            proptest::collection::vec(1i64..=3, rank),
        )
    })
}

proptest! {
    /// The inferred slice type has the requested sizes as its shape, the
    /// dot-product offset, and the source strides scaled by the steps.
    #[test]
    fn subview_inference_formula((shape, offsets, sizes, strides) in arb_slice()) {
        let source_ty = Type::memref_identity(Type::float(32), shape.clone());
        let source = source_ty.as_memref().unwrap();
        let offset_dims: Shape = offsets.iter().map(|&v| SDim::new(v)).collect();
        let size_dims: Shape = sizes.iter().map(|&v| SDim::new(v)).collect();
        let stride_dims: Shape = strides.iter().map(|&v| SDim::new(v)).collect();
        let inferred = infer_subview_type(source, &offset_dims, &size_dims, &stride_dims);
        let result = inferred.as_memref().unwrap();

        prop_assert_eq!(&result.shape, &size_dims);
        let base_strides: Vec<i64> = shape
            .iter()
            .rev()
            .scan(1i64, |acc, &d| {
                let s = *acc;
                *acc *= d;
                Some(s)
            })
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        let expected_offset: i64 = offsets.iter().zip(&base_strides).map(|(o, s)| o * s).sum();
        let (offset, result_strides) = result.offset_and_strides();
        prop_assert_eq!(offset.as_static(), Some(expected_offset));
        for ((rs, bs), step) in result_strides.iter().zip(&base_strides).zip(&strides) {
            prop_assert_eq!(rs.as_static(), Some(bs * step));
        }
        // Identity-equivalent results may normalize away the strided layout.
        if expected_offset == 0 && strides.iter().all(|&s| s == 1) && sizes == shape {
            prop_assert!(matches!(result.layout, Layout::Identity));
        }
    }

    /// A subview built with its inferred type always passes verification.
    #[test]
    fn subview_inferred_type_verifies((shape, offsets, sizes, strides) in arb_slice()) {
        let mut module = Module::new();
        let body = module.body();
        let source_ty = Type::memref_identity(Type::float(32), shape);
        let source = module.alloc(body, source_ty.clone(), &[]);
        let offset_dims: Shape = offsets.iter().map(|&v| SDim::new(v)).collect();
        let size_dims: Shape = sizes.iter().map(|&v| SDim::new(v)).collect();
        let stride_dims: Shape = strides.iter().map(|&v| SDim::new(v)).collect();
        let inferred =
            infer_subview_type(source_ty.as_memref().unwrap(), &offset_dims, &size_dims, &stride_dims);
        let view = module.subview_static(body, Value::result(source, 0), &offsets, &sizes, &strides, inferred);
        module.dealloc(body, view);
        let mut sink = CollectingSink::new();
        prop_assert_eq!(verify_module(&module, &mut sink), 0);
    }
}
