//! Typed op constructors.
//!
//! Each constructor appends a fully-formed operation to a block: operands in
//! the canonical order, static offset/size/stride components encoded into
//! attribute arrays (dynamic entries use the [`SDim`] sentinel, with the
//! runtime values appended as trailing operands), and region-carrying ops get
//! their entry blocks created with the right argument signatures. The
//! constructors do not verify; `verify` runs as a separate pass.

use smallvec::SmallVec;

use crate::attr::Attr;
use crate::ir::{BlockId, Module, OpId, OpKind, RmwKind, Value};
use crate::sdim::SDim;
use crate::types::{Shape, Type, TypeKind};

fn encode_dims(dims: &[SDim]) -> Attr {
    Attr::int_array(dims.iter().map(SDim::encode))
}

pub(crate) fn decode_dims(raw: &[i64]) -> Shape {
    raw.iter().map(|&v| SDim::decode(v)).collect()
}

impl Module {
    // ==========================================================================
    // Support ops
    // ==========================================================================

    pub fn constant(&mut self, block: BlockId, ty: Type, value: Attr) -> Value {
        let op = self.build_op(block, OpKind::Constant, &[], &[ty], vec![("value", value)], 0);
        Value::result(op, 0)
    }

    pub fn constant_index(&mut self, block: BlockId, value: i64) -> Value {
        self.constant(block, Type::index(), Attr::int(value))
    }

    pub fn constant_bool(&mut self, block: BlockId, value: bool) -> Value {
        self.constant(block, Type::bool_(), Attr::bool_(value))
    }

    pub fn select(&mut self, block: BlockId, condition: Value, if_true: Value, if_false: Value) -> Value {
        let ty = self.value_type(if_true);
        let op = self.build_op(block, OpKind::Select, &[condition, if_true, if_false], &[ty], vec![], 0);
        Value::result(op, 0)
    }

    pub fn not(&mut self, block: BlockId, value: Value) -> Value {
        let ty = self.value_type(value);
        let op = self.build_op(block, OpKind::Not, &[value], &[ty], vec![], 0);
        Value::result(op, 0)
    }

    pub fn and(&mut self, block: BlockId, lhs: Value, rhs: Value) -> Value {
        let ty = self.value_type(lhs);
        let op = self.build_op(block, OpKind::And, &[lhs, rhs], &[ty], vec![], 0);
        Value::result(op, 0)
    }

    // ==========================================================================
    // Memory-reference ops
    // ==========================================================================

    pub fn alloc(&mut self, block: BlockId, ty: Type, dynamic_sizes: &[Value]) -> OpId {
        self.build_op(block, OpKind::Alloc, dynamic_sizes, &[ty], vec![], 0)
    }

    pub fn alloca(&mut self, block: BlockId, ty: Type, dynamic_sizes: &[Value]) -> OpId {
        self.build_op(block, OpKind::Alloca, dynamic_sizes, &[ty], vec![], 0)
    }

    /// An `alloca_scope` with an empty entry block; the caller fills the body
    /// and terminates it with a `yield` of the result-typed values.
    pub fn alloca_scope(&mut self, block: BlockId, result_types: &[Type]) -> OpId {
        let op = self.build_op(block, OpKind::AllocScope, &[], result_types, vec![], 1);
        let region = self.op(op).region(0);
        self.create_block(region, &[]);
        op
    }

    pub fn dealloc(&mut self, block: BlockId, memref: Value) -> OpId {
        self.build_op(block, OpKind::Dealloc, &[memref], &[], vec![], 0)
    }

    pub fn load(&mut self, block: BlockId, memref: Value, indices: &[Value]) -> Value {
        let element = match self.value_type(memref).as_memref() {
            Some(m) => m.element.clone(),
            None => Type::none(),
        };
        let mut operands: SmallVec<[Value; 4]> = SmallVec::new();
        operands.push(memref);
        operands.extend_from_slice(indices);
        let op = self.build_op(block, OpKind::Load, &operands, &[element], vec![], 0);
        Value::result(op, 0)
    }

    pub fn store(&mut self, block: BlockId, value: Value, memref: Value, indices: &[Value]) -> OpId {
        let mut operands: SmallVec<[Value; 4]> = SmallVec::new();
        operands.push(value);
        operands.push(memref);
        operands.extend_from_slice(indices);
        self.build_op(block, OpKind::Store, &operands, &[], vec![], 0)
    }

    pub fn cast(&mut self, block: BlockId, source: Value, ty: Type) -> Value {
        let op = self.build_op(block, OpKind::Cast, &[source], &[ty], vec![], 0);
        Value::result(op, 0)
    }

    pub fn dim(&mut self, block: BlockId, source: Value, index: Value) -> Value {
        let op = self.build_op(block, OpKind::Dim, &[source, index], &[Type::index()], vec![], 0);
        Value::result(op, 0)
    }

    /// A strided slice. Dynamic entries in the static lists use the sentinel
    /// and consume `dynamic_*` operands in list order.
    #[allow(clippy::too_many_arguments)]
    pub fn subview(
        &mut self,
        block: BlockId,
        source: Value,
        offsets: &[SDim],
        sizes: &[SDim],
        strides: &[SDim],
        dynamic_offsets: &[Value],
        dynamic_sizes: &[Value],
        dynamic_strides: &[Value],
        ty: Type,
    ) -> Value {
        let mut operands: SmallVec<[Value; 4]> = SmallVec::new();
        operands.push(source);
        operands.extend_from_slice(dynamic_offsets);
        operands.extend_from_slice(dynamic_sizes);
        operands.extend_from_slice(dynamic_strides);
        let attrs = vec![
            ("static_offsets", encode_dims(offsets)),
            ("static_sizes", encode_dims(sizes)),
            ("static_strides", encode_dims(strides)),
        ];
        let op = self.build_op(block, OpKind::Subview, &operands, &[ty], attrs, 0);
        Value::result(op, 0)
    }

    /// All-static subview.
    pub fn subview_static(
        &mut self,
        block: BlockId,
        source: Value,
        offsets: &[i64],
        sizes: &[i64],
        strides: &[i64],
        ty: Type,
    ) -> Value {
        let offsets: Shape = offsets.iter().map(|&v| SDim::new(v)).collect();
        let sizes: Shape = sizes.iter().map(|&v| SDim::new(v)).collect();
        let strides: Shape = strides.iter().map(|&v| SDim::new(v)).collect();
        self.subview(block, source, &offsets, &sizes, &strides, &[], &[], &[], ty)
    }

    pub fn expand_shape(&mut self, block: BlockId, source: Value, reassociation: Vec<Vec<i64>>, ty: Type) -> Value {
        let attrs = vec![("reassociation", Attr::int_groups(reassociation))];
        let op = self.build_op(block, OpKind::ExpandShape, &[source], &[ty], attrs, 0);
        Value::result(op, 0)
    }

    pub fn collapse_shape(&mut self, block: BlockId, source: Value, reassociation: Vec<Vec<i64>>, ty: Type) -> Value {
        let attrs = vec![("reassociation", Attr::int_groups(reassociation))];
        let op = self.build_op(block, OpKind::CollapseShape, &[source], &[ty], attrs, 0);
        Value::result(op, 0)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn reinterpret_cast(
        &mut self,
        block: BlockId,
        source: Value,
        offset: SDim,
        sizes: &[SDim],
        strides: &[SDim],
        dynamic_operands: &[Value],
        ty: Type,
    ) -> Value {
        let mut operands: SmallVec<[Value; 4]> = SmallVec::new();
        operands.push(source);
        operands.extend_from_slice(dynamic_operands);
        let attrs = vec![
            ("static_offsets", encode_dims(&[offset])),
            ("static_sizes", encode_dims(sizes)),
            ("static_strides", encode_dims(strides)),
        ];
        let op = self.build_op(block, OpKind::ReinterpretCast, &operands, &[ty], attrs, 0);
        Value::result(op, 0)
    }

    /// Decompose a memref into base buffer, offset, sizes and strides.
    /// Results: `[base, offset, size_0.., stride_0..]`.
    pub fn extract_metadata(&mut self, block: BlockId, source: Value) -> OpId {
        let source_ty = self.value_type(source);
        let (element, space, rank) = match source_ty.as_memref() {
            Some(m) => (m.element.clone(), m.space, m.rank()),
            None => match source_ty.kind() {
                TypeKind::UnrankedMemRef { element, space } => (element.clone(), *space, 0),
                _ => (Type::none(), Default::default(), 0),
            },
        };
        let base = Type::memref(element, Shape::new(), crate::types::Layout::Identity, space);
        let mut results: SmallVec<[Type; 4]> = SmallVec::new();
        results.push(base);
        results.push(Type::index());
        for _ in 0..rank {
            results.push(Type::index());
        }
        for _ in 0..rank {
            results.push(Type::index());
        }
        self.build_op(block, OpKind::ExtractMetadata, &[source], &results, vec![], 0)
    }

    pub fn atomic_rmw(&mut self, block: BlockId, kind: RmwKind, value: Value, memref: Value, indices: &[Value]) -> Value {
        let ty = self.value_type(value);
        let mut operands: SmallVec<[Value; 4]> = SmallVec::new();
        operands.push(value);
        operands.push(memref);
        operands.extend_from_slice(indices);
        let op = self.build_op(block, OpKind::AtomicRmw(kind), &operands, &[ty], vec![], 0);
        Value::result(op, 0)
    }

    pub fn transpose(&mut self, block: BlockId, source: Value, permutation: &[i64], ty: Type) -> Value {
        let attrs = vec![("permutation", Attr::int_array(permutation.iter().copied()))];
        let op = self.build_op(block, OpKind::Transpose, &[source], &[ty], attrs, 0);
        Value::result(op, 0)
    }

    // ==========================================================================
    // Structured control flow
    // ==========================================================================

    /// A `for` loop. The body entry block gets the induction variable (typed
    /// like the lower bound) followed by one argument per init value; the
    /// caller terminates it with a `yield` of the next iteration's values.
    pub fn for_op(&mut self, block: BlockId, lb: Value, ub: Value, step: Value, inits: &[Value]) -> OpId {
        let mut operands: SmallVec<[Value; 4]> = SmallVec::new();
        operands.extend_from_slice(&[lb, ub, step]);
        operands.extend_from_slice(inits);
        let result_types: SmallVec<[Type; 2]> = inits.iter().map(|&v| self.value_type(v)).collect();
        let op = self.build_op(block, OpKind::For, &operands, &result_types, vec![], 1);
        let mut arg_types: SmallVec<[Type; 4]> = SmallVec::new();
        arg_types.push(self.value_type(lb));
        arg_types.extend(result_types.iter().cloned());
        let region = self.op(op).region(0);
        self.create_block(region, &arg_types);
        op
    }

    /// A `while` loop. The before block takes the init types and must end in
    /// `condition`; the after block takes the result types and must end in
    /// `yield` of before-typed values.
    pub fn while_op(&mut self, block: BlockId, inits: &[Value], result_types: &[Type]) -> OpId {
        let op = self.build_op(block, OpKind::While, inits, result_types, vec![], 2);
        let init_types: SmallVec<[Type; 4]> = inits.iter().map(|&v| self.value_type(v)).collect();
        let before = self.op(op).region(0);
        self.create_block(before, &init_types);
        let after = self.op(op).region(1);
        self.create_block(after, result_types);
        op
    }

    /// An `if`. The else region is left without blocks when `with_else` is
    /// false; ops defining results must have a non-empty else.
    pub fn if_op(&mut self, block: BlockId, condition: Value, result_types: &[Type], with_else: bool) -> OpId {
        let op = self.build_op(block, OpKind::If, &[condition], result_types, vec![], 2);
        let then = self.op(op).region(0);
        self.create_block(then, &[]);
        if with_else {
            let else_region = self.op(op).region(1);
            self.create_block(else_region, &[]);
        }
        op
    }

    /// An `index_switch`. Region 0 is the default; region `1 + i` handles
    /// `cases[i]`.
    pub fn index_switch(&mut self, block: BlockId, arg: Value, cases: &[i64], result_types: &[Type]) -> OpId {
        let attrs = vec![("cases", Attr::int_array(cases.iter().copied()))];
        let op = self.build_op(block, OpKind::IndexSwitch, &[arg], result_types, attrs, 1 + cases.len());
        for i in 0..=cases.len() {
            let region = self.op(op).region(i);
            self.create_block(region, &[]);
        }
        op
    }

    /// A `parallel` loop over `lbs.len()` dimensions. The body gets one
    /// index-typed induction argument per dimension.
    pub fn parallel(&mut self, block: BlockId, lbs: &[Value], ubs: &[Value], steps: &[Value]) -> OpId {
        let mut operands: SmallVec<[Value; 4]> = SmallVec::new();
        operands.extend_from_slice(lbs);
        operands.extend_from_slice(ubs);
        operands.extend_from_slice(steps);
        let op = self.build_op(block, OpKind::Parallel, &operands, &[], vec![], 1);
        let arg_types: SmallVec<[Type; 4]> = lbs.iter().map(|_| Type::index()).collect();
        let region = self.op(op).region(0);
        self.create_block(region, &arg_types);
        op
    }

    pub fn yield_op(&mut self, block: BlockId, values: &[Value]) -> OpId {
        self.build_op(block, OpKind::Yield, values, &[], vec![], 0)
    }

    /// The `while` before-region terminator: a bool flag plus the values
    /// forwarded to the after region (and out of the loop).
    pub fn condition_op(&mut self, block: BlockId, condition: Value, args: &[Value]) -> OpId {
        let mut operands: SmallVec<[Value; 4]> = SmallVec::new();
        operands.push(condition);
        operands.extend_from_slice(args);
        self.build_op(block, OpKind::Condition, &operands, &[], vec![], 0)
    }

    // ==========================================================================
    // Region accessors for the control-flow ops
    // ==========================================================================

    pub fn for_body(&self, op: OpId) -> BlockId {
        self.entry_or_panic(self.op(op).region(0))
    }

    pub fn before_block(&self, op: OpId) -> BlockId {
        self.entry_or_panic(self.op(op).region(0))
    }

    pub fn after_block(&self, op: OpId) -> BlockId {
        self.entry_or_panic(self.op(op).region(1))
    }

    pub fn then_block(&self, op: OpId) -> BlockId {
        self.entry_or_panic(self.op(op).region(0))
    }

    pub fn else_block(&self, op: OpId) -> Option<BlockId> {
        self.entry_block(self.op(op).region(1))
    }

    pub fn default_block(&self, op: OpId) -> BlockId {
        self.entry_or_panic(self.op(op).region(0))
    }

    pub fn case_block(&self, op: OpId, case_index: usize) -> BlockId {
        self.entry_or_panic(self.op(op).region(1 + case_index))
    }

    pub fn parallel_body(&self, op: OpId) -> BlockId {
        self.entry_or_panic(self.op(op).region(0))
    }

    fn entry_or_panic(&self, region: crate::ir::RegionId) -> BlockId {
        match self.entry_block(region) {
            Some(block) => block,
            None => panic!("region has no entry block"),
        }
    }

    /// Static list attribute decoded into dimensions.
    pub fn dims_attr(&self, op: OpId, name: &str) -> Option<Shape> {
        Some(decode_dims(self.op(op).attr(name)?.as_int_array()?))
    }

    /// Trailing dynamic operands of a slice-like op, split into the
    /// offset/size/stride groups by sentinel count. `None` when the operand
    /// count disagrees with the attributes.
    pub fn mixed_operand_groups(&self, op: OpId) -> Option<[SmallVec<[Value; 4]>; 3]> {
        let counts: SmallVec<[usize; 3]> = ["static_offsets", "static_sizes", "static_strides"]
            .iter()
            .map(|name| {
                self.dims_attr(op, name)
                    .map(|dims| dims.iter().filter(|d| d.is_dynamic()).count())
                    .unwrap_or(0)
            })
            .collect();
        let operands = self.op(op).operands();
        if operands.len() != 1 + counts.iter().sum::<usize>() {
            return None;
        }
        let mut cursor = 1;
        let mut groups: [SmallVec<[Value; 4]>; 3] = [SmallVec::new(), SmallVec::new(), SmallVec::new()];
        for (group, &count) in groups.iter_mut().zip(counts.iter()) {
            group.extend_from_slice(&operands[cursor..cursor + count]);
            cursor += count;
        }
        Some(groups)
    }

    /// A static list attribute with dynamic entries replaced by the constant
    /// values of the corresponding dynamic operands, when known.
    pub fn resolved_dims(&self, op: OpId, name: &str, dynamic_operands: &[Value]) -> Option<Shape> {
        let dims = self.dims_attr(op, name)?;
        let mut cursor = 0;
        let resolved = dims
            .iter()
            .map(|&dim| {
                if dim.is_static() {
                    return dim;
                }
                let operand = dynamic_operands[cursor];
                cursor += 1;
                self.const_int(operand).map_or(SDim::DYNAMIC, SDim::new)
            })
            .collect();
        Some(resolved)
    }
}
