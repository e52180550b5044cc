//! The mutable Operation/Region/Block graph.
//!
//! Operations own regions, regions own blocks, blocks own operations and
//! typed arguments. All entities live in per-kind arenas inside a [`Module`]
//! and are addressed by generation-checked handles, so non-owning edges
//! (operands, use lists) are plain copyable values that can never dangle
//! silently: touching a freed slot through a stale handle panics.
//!
//! # Mutation discipline
//!
//! Every operand write goes through the module so def/use edges stay in
//! sync. Erasure is two-phase: an entity is first unlinked (operands removed
//! from the use lists of their definitions, the op removed from its block)
//! and only then is its slot reclaimed. Erasing a definition that still has
//! uses is a hard invariant violation.

pub mod build;

use smallvec::SmallVec;

use crate::attr::Attr;
use crate::types::Type;

// =============================================================================
// Handles
// =============================================================================

macro_rules! handle {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name {
            index: u32,
            generation: u32,
        }
    };
}

handle!(OpId);
handle!(BlockId);
handle!(RegionId);

/// An operation result or a block argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Value {
    Result { op: OpId, index: u32 },
    Argument { block: BlockId, index: u32 },
}

impl Value {
    pub fn result(op: OpId, index: usize) -> Self {
        Value::Result { op, index: index as u32 }
    }

    pub fn argument(block: BlockId, index: usize) -> Self {
        Value::Argument { block, index: index as u32 }
    }
}

/// A use site: an operand slot of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Use {
    pub op: OpId,
    pub operand_index: u32,
}

// =============================================================================
// Operation kinds
// =============================================================================

/// Reduction kind of an atomic read-modify-write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RmwKind {
    AddF,
    MaximumF,
    MinimumF,
    MulF,
    AddI,
    MaxS,
    MaxU,
    MinS,
    MinU,
    MulI,
    OrI,
    AndI,
}

impl RmwKind {
    pub fn is_float_kind(&self) -> bool {
        matches!(self, RmwKind::AddF | RmwKind::MaximumF | RmwKind::MinimumF | RmwKind::MulF)
    }
}

/// The kind tag of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    // Support ops
    Constant,
    Select,
    Not,
    And,
    // Memory-reference family
    Alloc,
    Alloca,
    AllocScope,
    Dealloc,
    Load,
    Store,
    Cast,
    Dim,
    Subview,
    ExpandShape,
    CollapseShape,
    ReinterpretCast,
    ExtractMetadata,
    AtomicRmw(RmwKind),
    Transpose,
    // Structured control flow
    For,
    While,
    If,
    IndexSwitch,
    Parallel,
    // Terminators
    Yield,
    Condition,
}

impl OpKind {
    pub fn name(&self) -> &'static str {
        match self {
            OpKind::Constant => "constant",
            OpKind::Select => "select",
            OpKind::Not => "not",
            OpKind::And => "and",
            OpKind::Alloc => "alloc",
            OpKind::Alloca => "alloca",
            OpKind::AllocScope => "alloca_scope",
            OpKind::Dealloc => "dealloc",
            OpKind::Load => "load",
            OpKind::Store => "store",
            OpKind::Cast => "cast",
            OpKind::Dim => "dim",
            OpKind::Subview => "subview",
            OpKind::ExpandShape => "expand_shape",
            OpKind::CollapseShape => "collapse_shape",
            OpKind::ReinterpretCast => "reinterpret_cast",
            OpKind::ExtractMetadata => "extract_metadata",
            OpKind::AtomicRmw(_) => "atomic_rmw",
            OpKind::Transpose => "transpose",
            OpKind::For => "for",
            OpKind::While => "while",
            OpKind::If => "if",
            OpKind::IndexSwitch => "index_switch",
            OpKind::Parallel => "parallel",
            OpKind::Yield => "yield",
            OpKind::Condition => "condition",
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(self, OpKind::Yield | OpKind::Condition)
    }

    /// Side-effect-free ops: erasable by the driver when all results are
    /// unused. Loads count (read-only), allocations and stores do not.
    pub fn is_pure(&self) -> bool {
        matches!(
            self,
            OpKind::Constant
                | OpKind::Select
                | OpKind::Not
                | OpKind::And
                | OpKind::Load
                | OpKind::Cast
                | OpKind::Dim
                | OpKind::Subview
                | OpKind::ExpandShape
                | OpKind::CollapseShape
                | OpKind::ReinterpretCast
                | OpKind::ExtractMetadata
                | OpKind::Transpose
        )
    }

    /// Kinds whose bodies provide an automatic allocation scope for `alloca`.
    pub fn has_allocation_scope(&self) -> bool {
        matches!(self, OpKind::AllocScope | OpKind::For | OpKind::While | OpKind::Parallel)
    }

    /// Kinds that may (transitively) perform a stack allocation somewhere in
    /// their regions without opening their own scope for it.
    pub fn is_region_op(&self) -> bool {
        matches!(
            self,
            OpKind::AllocScope | OpKind::For | OpKind::While | OpKind::If | OpKind::IndexSwitch | OpKind::Parallel
        )
    }
}

// =============================================================================
// Entities
// =============================================================================

#[derive(Debug)]
pub struct Operation {
    pub(crate) kind: OpKind,
    pub(crate) operands: SmallVec<[Value; 4]>,
    pub(crate) result_types: SmallVec<[Type; 2]>,
    pub(crate) result_uses: SmallVec<[Vec<Use>; 2]>,
    pub(crate) attrs: SmallVec<[(&'static str, Attr); 2]>,
    pub(crate) regions: SmallVec<[RegionId; 1]>,
    pub(crate) parent: Option<BlockId>,
}

impl Operation {
    pub fn kind(&self) -> OpKind {
        self.kind
    }

    pub fn operands(&self) -> &[Value] {
        &self.operands
    }

    pub fn operand(&self, index: usize) -> Value {
        self.operands[index]
    }

    pub fn num_operands(&self) -> usize {
        self.operands.len()
    }

    pub fn num_results(&self) -> usize {
        self.result_types.len()
    }

    pub fn result_types(&self) -> &[Type] {
        &self.result_types
    }

    pub fn result_type(&self, index: usize) -> Type {
        self.result_types[index].clone()
    }

    pub fn attr(&self, name: &str) -> Option<&Attr> {
        self.attrs.iter().find(|(n, _)| *n == name).map(|(_, a)| a)
    }

    pub fn regions(&self) -> &[RegionId] {
        &self.regions
    }

    pub fn region(&self, index: usize) -> RegionId {
        self.regions[index]
    }

    pub fn num_regions(&self) -> usize {
        self.regions.len()
    }

    pub fn parent_block(&self) -> Option<BlockId> {
        self.parent
    }
}

#[derive(Debug)]
pub struct Block {
    pub(crate) arg_types: SmallVec<[Type; 4]>,
    pub(crate) arg_uses: SmallVec<[Vec<Use>; 4]>,
    pub(crate) ops: Vec<OpId>,
    pub(crate) parent: RegionId,
}

impl Block {
    pub fn num_args(&self) -> usize {
        self.arg_types.len()
    }

    pub fn arg_types(&self) -> &[Type] {
        &self.arg_types
    }

    pub fn ops(&self) -> &[OpId] {
        &self.ops
    }

    pub fn parent_region(&self) -> RegionId {
        self.parent
    }
}

#[derive(Debug)]
pub struct Region {
    pub(crate) blocks: Vec<BlockId>,
    pub(crate) parent: Option<OpId>,
}

impl Region {
    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    pub fn parent_op(&self) -> Option<OpId> {
        self.parent
    }
}

// =============================================================================
// Module: the arena
// =============================================================================

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    entry: Option<T>,
}

/// One top-level IR unit: the arena plus a distinguished body region.
#[derive(derive_more::Debug)]
pub struct Module {
    ops: Vec<Slot<Operation>>,
    blocks: Vec<Slot<Block>>,
    regions: Vec<Slot<Region>>,
    #[debug(skip)]
    free_ops: Vec<u32>,
    #[debug(skip)]
    free_blocks: Vec<u32>,
    #[debug(skip)]
    free_regions: Vec<u32>,
    body: RegionId,
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}

impl Module {
    pub fn new() -> Self {
        let mut module = Module {
            ops: Vec::new(),
            blocks: Vec::new(),
            regions: Vec::new(),
            free_ops: Vec::new(),
            free_blocks: Vec::new(),
            free_regions: Vec::new(),
            body: RegionId { index: 0, generation: 0 },
        };
        let body = module.create_region(None);
        module.create_block(body, &[]);
        module.body = body;
        module
    }

    /// The top-level region.
    pub fn body_region(&self) -> RegionId {
        self.body
    }

    /// The entry block of the top-level region.
    pub fn body(&self) -> BlockId {
        self.region(self.body).blocks[0]
    }

    // ==========================================================================
    // Slot plumbing
    // ==========================================================================

    fn alloc_slot<T>(slots: &mut Vec<Slot<T>>, free: &mut Vec<u32>, entry: T) -> (u32, u32) {
        if let Some(index) = free.pop() {
            let slot = &mut slots[index as usize];
            slot.entry = Some(entry);
            (index, slot.generation)
        } else {
            let index = slots.len() as u32;
            slots.push(Slot { generation: 0, entry: Some(entry) });
            (index, 0)
        }
    }

    fn free<T>(slots: &mut [Slot<T>], free: &mut Vec<u32>, index: u32, generation: u32) {
        let slot = &mut slots[index as usize];
        assert_eq!(slot.generation, generation, "double free through a stale handle");
        assert!(slot.entry.is_some(), "double free through a stale handle");
        slot.entry = None;
        slot.generation += 1;
        free.push(index);
    }

    fn slot_ref<'a, T>(slots: &'a [Slot<T>], index: u32, generation: u32, what: &str) -> &'a T {
        let slot = &slots[index as usize];
        assert_eq!(slot.generation, generation, "stale {what} handle");
        match &slot.entry {
            Some(entry) => entry,
            None => panic!("stale {what} handle"),
        }
    }

    fn slot_mut<'a, T>(slots: &'a mut [Slot<T>], index: u32, generation: u32, what: &str) -> &'a mut T {
        let slot = &mut slots[index as usize];
        assert_eq!(slot.generation, generation, "stale {what} handle");
        match &mut slot.entry {
            Some(entry) => entry,
            None => panic!("stale {what} handle"),
        }
    }

    pub fn op(&self, id: OpId) -> &Operation {
        Self::slot_ref(&self.ops, id.index, id.generation, "operation")
    }

    fn op_mut(&mut self, id: OpId) -> &mut Operation {
        Self::slot_mut(&mut self.ops, id.index, id.generation, "operation")
    }

    pub fn block(&self, id: BlockId) -> &Block {
        Self::slot_ref(&self.blocks, id.index, id.generation, "block")
    }

    fn block_mut(&mut self, id: BlockId) -> &mut Block {
        Self::slot_mut(&mut self.blocks, id.index, id.generation, "block")
    }

    pub fn region(&self, id: RegionId) -> &Region {
        Self::slot_ref(&self.regions, id.index, id.generation, "region")
    }

    fn region_mut(&mut self, id: RegionId) -> &mut Region {
        Self::slot_mut(&mut self.regions, id.index, id.generation, "region")
    }

    /// Whether the handle still refers to a live operation.
    pub fn is_live(&self, id: OpId) -> bool {
        let slot = &self.ops[id.index as usize];
        slot.generation == id.generation && slot.entry.is_some()
    }

    // ==========================================================================
    // Construction
    // ==========================================================================

    pub fn create_region(&mut self, parent: Option<OpId>) -> RegionId {
        let (index, generation) = Self::alloc_slot(&mut self.regions, &mut self.free_regions, Region {
            blocks: Vec::new(),
            parent,
        });
        RegionId { index, generation }
    }

    pub fn create_block(&mut self, region: RegionId, arg_types: &[Type]) -> BlockId {
        let block = Block {
            arg_types: arg_types.iter().cloned().collect(),
            arg_uses: arg_types.iter().map(|_| Vec::new()).collect(),
            ops: Vec::new(),
            parent: region,
        };
        let (index, generation) = Self::alloc_slot(&mut self.blocks, &mut self.free_blocks, block);
        let id = BlockId { index, generation };
        self.region_mut(region).blocks.push(id);
        id
    }

    /// Create a detached operation. Regions are created empty; the caller
    /// attaches blocks and finally inserts the op into a block.
    pub fn create_op(
        &mut self,
        kind: OpKind,
        operands: &[Value],
        result_types: &[Type],
        attrs: Vec<(&'static str, Attr)>,
        num_regions: usize,
    ) -> OpId {
        let op = Operation {
            kind,
            operands: SmallVec::new(),
            result_types: result_types.iter().cloned().collect(),
            result_uses: result_types.iter().map(|_| Vec::new()).collect(),
            attrs: attrs.into_iter().collect(),
            regions: SmallVec::new(),
            parent: None,
        };
        let (index, generation) = Self::alloc_slot(&mut self.ops, &mut self.free_ops, op);
        let id = OpId { index, generation };
        for &operand in operands {
            self.push_operand(id, operand);
        }
        for _ in 0..num_regions {
            let region = self.create_region(Some(id));
            self.op_mut(id).regions.push(region);
        }
        id
    }

    pub fn append_op(&mut self, block: BlockId, op: OpId) {
        debug_assert!(self.op(op).parent.is_none(), "op already attached");
        self.block_mut(block).ops.push(op);
        self.op_mut(op).parent = Some(block);
    }

    pub fn insert_op_at_start(&mut self, block: BlockId, op: OpId) {
        debug_assert!(self.op(op).parent.is_none(), "op already attached");
        self.block_mut(block).ops.insert(0, op);
        self.op_mut(op).parent = Some(block);
    }

    pub fn insert_op_before(&mut self, anchor: OpId, op: OpId) {
        debug_assert!(self.op(op).parent.is_none(), "op already attached");
        let block = match self.op(anchor).parent {
            Some(block) => block,
            None => panic!("anchor op is detached"),
        };
        let position = self.position_in_block(anchor);
        self.block_mut(block).ops.insert(position, op);
        self.op_mut(op).parent = Some(block);
    }

    /// Create and append in one step.
    pub fn build_op(
        &mut self,
        block: BlockId,
        kind: OpKind,
        operands: &[Value],
        result_types: &[Type],
        attrs: Vec<(&'static str, Attr)>,
        num_regions: usize,
    ) -> OpId {
        let op = self.create_op(kind, operands, result_types, attrs, num_regions);
        self.append_op(block, op);
        op
    }

    // ==========================================================================
    // Def/use maintenance
    // ==========================================================================

    fn use_list_mut(&mut self, value: Value) -> &mut Vec<Use> {
        match value {
            Value::Result { op, index } => &mut self.op_mut(op).result_uses[index as usize],
            Value::Argument { block, index } => &mut self.block_mut(block).arg_uses[index as usize],
        }
    }

    fn use_list(&self, value: Value) -> &Vec<Use> {
        match value {
            Value::Result { op, index } => &self.op(op).result_uses[index as usize],
            Value::Argument { block, index } => &self.block(block).arg_uses[index as usize],
        }
    }

    fn push_operand(&mut self, op: OpId, value: Value) {
        let operand_index = self.op(op).operands.len() as u32;
        self.op_mut(op).operands.push(value);
        self.use_list_mut(value).push(Use { op, operand_index });
    }

    pub fn set_operand(&mut self, op: OpId, index: usize, value: Value) {
        let old = self.op(op).operands[index];
        if old == value {
            return;
        }
        let record = Use { op, operand_index: index as u32 };
        self.use_list_mut(old).retain(|u| *u != record);
        self.op_mut(op).operands[index] = value;
        self.use_list_mut(value).push(record);
    }

    /// Drop trailing operands starting at `from` (their uses are unlinked).
    pub fn truncate_operands(&mut self, op: OpId, from: usize) {
        while self.op(op).operands.len() > from {
            let index = self.op(op).operands.len() - 1;
            let value = self.op(op).operands[index];
            let record = Use { op, operand_index: index as u32 };
            self.use_list_mut(value).retain(|u| *u != record);
            self.op_mut(op).operands.pop();
        }
    }

    pub fn has_uses(&self, value: Value) -> bool {
        !self.use_list(value).is_empty()
    }

    pub fn uses(&self, value: Value) -> Vec<Use> {
        self.use_list(value).clone()
    }

    /// Distinct operations using `value`.
    pub fn user_ops(&self, value: Value) -> Vec<OpId> {
        let mut users: Vec<OpId> = self.use_list(value).iter().map(|u| u.op).collect();
        users.dedup();
        users
    }

    pub fn replace_all_uses(&mut self, old: Value, new: Value) {
        if old == new {
            return;
        }
        let uses = self.uses(old);
        for record in uses {
            self.set_operand(record.op, record.operand_index as usize, new);
        }
    }

    // ==========================================================================
    // Values
    // ==========================================================================

    pub fn value_type(&self, value: Value) -> Type {
        match value {
            Value::Result { op, index } => self.op(op).result_types[index as usize].clone(),
            Value::Argument { block, index } => self.block(block).arg_types[index as usize].clone(),
        }
    }

    pub fn defining_op(&self, value: Value) -> Option<OpId> {
        match value {
            Value::Result { op, .. } => Some(op),
            Value::Argument { .. } => None,
        }
    }

    /// Defining op if it is of the given kind.
    pub fn defining_op_of(&self, value: Value, kind: OpKind) -> Option<OpId> {
        self.defining_op(value).filter(|&op| self.op(op).kind == kind)
    }

    pub fn result_values(&self, op: OpId) -> SmallVec<[Value; 2]> {
        (0..self.op(op).num_results()).map(|i| Value::result(op, i)).collect()
    }

    pub fn block_args(&self, block: BlockId) -> SmallVec<[Value; 4]> {
        (0..self.block(block).num_args()).map(|i| Value::argument(block, i)).collect()
    }

    /// Constant attribute feeding `value`, if its defining op is a constant.
    pub fn const_value(&self, value: Value) -> Option<Attr> {
        let op = self.defining_op_of(value, OpKind::Constant)?;
        self.op(op).attr("value").cloned()
    }

    pub fn const_int(&self, value: Value) -> Option<i64> {
        self.const_value(value)?.as_int()
    }

    pub fn const_bool(&self, value: Value) -> Option<bool> {
        self.const_value(value)?.as_bool()
    }

    // ==========================================================================
    // Attributes
    // ==========================================================================

    pub fn set_attr(&mut self, op: OpId, name: &'static str, attr: Attr) {
        let attrs = &mut self.op_mut(op).attrs;
        if let Some(entry) = attrs.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = attr;
        } else {
            attrs.push((name, attr));
        }
    }

    // ==========================================================================
    // Navigation
    // ==========================================================================

    pub fn parent_op(&self, op: OpId) -> Option<OpId> {
        let block = self.op(op).parent?;
        self.region(self.block(block).parent).parent
    }

    pub fn position_in_block(&self, op: OpId) -> usize {
        let block = match self.op(op).parent {
            Some(block) => block,
            None => panic!("op is detached"),
        };
        match self.block(block).ops.iter().position(|&o| o == op) {
            Some(position) => position,
            None => panic!("op missing from its parent block"),
        }
    }

    pub fn prev_op(&self, op: OpId) -> Option<OpId> {
        let block = self.op(op).parent?;
        let position = self.position_in_block(op);
        if position == 0 { None } else { Some(self.block(block).ops[position - 1]) }
    }

    pub fn entry_block(&self, region: RegionId) -> Option<BlockId> {
        self.region(region).blocks.first().copied()
    }

    /// Last op of the block when it is a terminator kind.
    pub fn terminator(&self, block: BlockId) -> Option<OpId> {
        let last = *self.block(block).ops.last()?;
        self.op(last).kind.is_terminator().then_some(last)
    }

    /// Region of the value's defining point.
    pub fn value_region(&self, value: Value) -> Option<RegionId> {
        match value {
            Value::Result { op, .. } => Some(self.block(self.op(op).parent?).parent),
            Value::Argument { block, .. } => Some(self.block(block).parent),
        }
    }

    /// True when `ancestor` is `region` or transitively encloses it.
    pub fn region_is_ancestor(&self, ancestor: RegionId, region: RegionId) -> bool {
        let mut current = region;
        loop {
            if current == ancestor {
                return true;
            }
            let Some(parent_op) = self.region(current).parent else {
                return false;
            };
            let Some(block) = self.op(parent_op).parent else {
                return false;
            };
            current = self.block(block).parent;
        }
    }

    /// True when `value` is defined outside `region` (and all of its nested
    /// regions).
    pub fn is_defined_outside(&self, value: Value, region: RegionId) -> bool {
        match self.value_region(value) {
            Some(value_region) => !self.region_is_ancestor(region, value_region),
            None => true,
        }
    }

    /// Preorder walk over the whole module.
    pub fn walk(&self) -> Vec<OpId> {
        self.walk_region(self.body)
    }

    /// Preorder walk over a region subtree.
    pub fn walk_region(&self, region: RegionId) -> Vec<OpId> {
        let mut out = Vec::new();
        self.walk_region_into(region, &mut out);
        out
    }

    fn walk_region_into(&self, region: RegionId, out: &mut Vec<OpId>) {
        for &block in &self.region(region).blocks {
            for &op in &self.block(block).ops {
                out.push(op);
                for &nested in self.op(op).regions() {
                    self.walk_region_into(nested, out);
                }
            }
        }
    }

    // ==========================================================================
    // Block surgery
    // ==========================================================================

    pub fn add_block_arg(&mut self, block: BlockId, ty: Type) -> Value {
        let b = self.block_mut(block);
        b.arg_types.push(ty);
        b.arg_uses.push(Vec::new());
        Value::argument(block, b.arg_types.len() - 1)
    }

    /// Erase the arguments marked in `to_erase` (must be unused) and remap
    /// the uses of the surviving arguments to their new indices.
    pub fn erase_block_args(&mut self, block: BlockId, to_erase: &[bool]) {
        let num_args = self.block(block).num_args();
        assert_eq!(to_erase.len(), num_args);
        let mut new_index = 0usize;
        let mut remap: Vec<Option<usize>> = Vec::with_capacity(num_args);
        for (i, &erase) in to_erase.iter().enumerate() {
            if erase {
                assert!(
                    self.block(block).arg_uses[i].is_empty(),
                    "erasing block argument {i} that still has uses"
                );
                remap.push(None);
            } else {
                remap.push(Some(new_index));
                new_index += 1;
            }
        }
        // Rewrite surviving uses to the compacted indices.
        for (old, mapped) in remap.iter().enumerate() {
            let Some(new) = *mapped else { continue };
            if new == old {
                continue;
            }
            let uses = self.block(block).arg_uses[old].clone();
            for record in uses {
                self.op_mut(record.op).operands[record.operand_index as usize] = Value::argument(block, new);
            }
        }
        let b = self.block_mut(block);
        let mut kept_types: SmallVec<[Type; 4]> = SmallVec::new();
        let mut kept_uses: SmallVec<[Vec<Use>; 4]> = SmallVec::new();
        for (i, keep) in remap.iter().enumerate() {
            if keep.is_some() {
                kept_types.push(b.arg_types[i].clone());
                kept_uses.push(std::mem::take(&mut b.arg_uses[i]));
            }
        }
        b.arg_types = kept_types;
        b.arg_uses = kept_uses;
    }

    /// Replace every use of `source`'s arguments with `replacements`, then
    /// move all of `source`'s ops in front of `anchor`. `source` is left
    /// empty and argument-free, ready to be erased.
    pub fn inline_block_before(&mut self, source: BlockId, anchor: OpId, replacements: &[Value]) {
        assert_eq!(self.block(source).num_args(), replacements.len());
        for (i, &replacement) in replacements.iter().enumerate() {
            self.replace_all_uses(Value::argument(source, i), replacement);
        }
        let ops = std::mem::take(&mut self.block_mut(source).ops);
        let dest = match self.op(anchor).parent {
            Some(block) => block,
            None => panic!("anchor op is detached"),
        };
        let mut position = self.position_in_block(anchor);
        for op in ops {
            self.block_mut(dest).ops.insert(position, op);
            self.op_mut(op).parent = Some(dest);
            position += 1;
        }
        let b = self.block_mut(source);
        b.arg_types.clear();
        b.arg_uses.clear();
    }

    /// Replace `source`'s arguments with `replacements` and append its ops
    /// to the end of `dest`.
    pub fn merge_blocks(&mut self, source: BlockId, dest: BlockId, replacements: &[Value]) {
        assert_eq!(self.block(source).num_args(), replacements.len());
        for (i, &replacement) in replacements.iter().enumerate() {
            self.replace_all_uses(Value::argument(source, i), replacement);
        }
        let ops = std::mem::take(&mut self.block_mut(source).ops);
        for &op in &ops {
            self.op_mut(op).parent = Some(dest);
        }
        self.block_mut(dest).ops.extend(ops);
        let b = self.block_mut(source);
        b.arg_types.clear();
        b.arg_uses.clear();
    }

    /// Move the entire block list of `source` into `dest` (which must be
    /// empty). Used to transplant a region body between same-shaped ops.
    pub fn take_region_body(&mut self, source: RegionId, dest: RegionId) {
        assert!(self.region(dest).blocks.is_empty(), "destination region must be empty");
        let blocks = std::mem::take(&mut self.region_mut(source).blocks);
        for &block in &blocks {
            self.block_mut(block).parent = dest;
        }
        self.region_mut(dest).blocks = blocks;
    }

    // ==========================================================================
    // Erasure
    // ==========================================================================

    fn unlink_operands(&mut self, op: OpId) {
        for index in 0..self.op(op).operands.len() {
            let value = self.op(op).operands[index];
            let record = Use { op, operand_index: index as u32 };
            self.use_list_mut(value).retain(|u| *u != record);
        }
    }

    /// Detach `op` from its block without freeing it.
    pub fn remove_from_block(&mut self, op: OpId) {
        if let Some(block) = self.op(op).parent {
            self.block_mut(block).ops.retain(|&o| o != op);
            self.op_mut(op).parent = None;
        }
    }

    /// Erase an operation (and everything its regions own). All results must
    /// be unused; redirect or erase the users first.
    pub fn erase_op(&mut self, op: OpId) {
        for (i, uses) in self.op(op).result_uses.iter().enumerate() {
            assert!(uses.is_empty(), "erasing op '{}' whose result #{i} still has uses", self.op(op).kind.name());
        }
        self.remove_from_block(op);
        self.unlink_operands(op);
        let regions: SmallVec<[RegionId; 1]> = self.op(op).regions.clone();
        for region in regions {
            self.erase_region(region);
        }
        Self::free(&mut self.ops, &mut self.free_ops, op.index, op.generation);
    }

    fn erase_region(&mut self, region: RegionId) {
        // Phase 1: unlink every operand edge in the subtree so no use list
        // points into it, then phase 2: reclaim the slots.
        let ops = self.walk_region(region);
        for &op in &ops {
            self.unlink_operands(op);
        }
        for op in ops.into_iter().rev() {
            let nested: SmallVec<[RegionId; 1]> = self.op(op).regions.clone();
            for r in nested {
                let blocks = self.region(r).blocks.clone();
                for block in blocks {
                    Self::free(&mut self.blocks, &mut self.free_blocks, block.index, block.generation);
                }
                Self::free(&mut self.regions, &mut self.free_regions, r.index, r.generation);
            }
            Self::free(&mut self.ops, &mut self.free_ops, op.index, op.generation);
        }
        let blocks = self.region(region).blocks.clone();
        for block in blocks {
            Self::free(&mut self.blocks, &mut self.free_blocks, block.index, block.generation);
        }
        Self::free(&mut self.regions, &mut self.free_regions, region.index, region.generation);
    }

    /// Erase a block and everything it contains. Its arguments must be
    /// unused from outside.
    pub fn erase_block(&mut self, block: BlockId) {
        for uses in &self.block(block).arg_uses {
            assert!(uses.is_empty(), "erasing a block whose arguments still have uses");
        }
        let ops = self.block(block).ops.clone();
        for op in ops.into_iter().rev() {
            self.erase_op(op);
        }
        let region = self.block(block).parent;
        self.region_mut(region).blocks.retain(|&b| b != block);
        Self::free(&mut self.blocks, &mut self.free_blocks, block.index, block.generation);
    }

    pub fn swap_op_regions(&mut self, op: OpId, a: usize, b: usize) {
        self.op_mut(op).regions.swap(a, b);
    }

    /// Replace every result of `op` with the paired value, then erase it.
    pub fn replace_op_with_values(&mut self, op: OpId, values: &[Value]) {
        assert_eq!(self.op(op).num_results(), values.len());
        for (i, &value) in values.iter().enumerate() {
            self.replace_all_uses(Value::result(op, i), value);
        }
        self.erase_op(op);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::Attr;
    use crate::types::Type;

    fn const_index(module: &mut Module, block: BlockId, v: i64) -> OpId {
        module.build_op(block, OpKind::Constant, &[], &[Type::index()], vec![("value", Attr::int(v))], 0)
    }

    #[test]
    fn test_create_and_use_lists() {
        let mut module = Module::new();
        let body = module.body();
        let c = const_index(&mut module, body, 3);
        let v = Value::result(c, 0);
        let and = module.build_op(body, OpKind::And, &[v, v], &[Type::index()], vec![], 0);
        assert_eq!(module.uses(v).len(), 2);
        assert_eq!(module.user_ops(v), vec![and]);
    }

    #[test]
    fn test_replace_all_uses() {
        let mut module = Module::new();
        let body = module.body();
        let a = const_index(&mut module, body, 1);
        let b = const_index(&mut module, body, 2);
        let and = module.build_op(
            body,
            OpKind::And,
            &[Value::result(a, 0), Value::result(a, 0)],
            &[Type::index()],
            vec![],
            0,
        );
        module.replace_all_uses(Value::result(a, 0), Value::result(b, 0));
        assert!(!module.has_uses(Value::result(a, 0)));
        assert_eq!(module.uses(Value::result(b, 0)).len(), 2);
        assert_eq!(module.op(and).operand(0), Value::result(b, 0));
    }

    #[test]
    fn test_erase_op_frees_slot() {
        let mut module = Module::new();
        let body = module.body();
        let c = const_index(&mut module, body, 3);
        module.erase_op(c);
        assert!(!module.is_live(c));
        assert_eq!(module.block(body).ops().len(), 0);
    }

    #[test]
    #[should_panic(expected = "still has uses")]
    fn test_erase_with_uses_panics() {
        let mut module = Module::new();
        let body = module.body();
        let c = const_index(&mut module, body, 3);
        let v = Value::result(c, 0);
        module.build_op(body, OpKind::And, &[v, v], &[Type::index()], vec![], 0);
        module.erase_op(c);
    }

    #[test]
    fn test_erase_block_args_remaps_indices() {
        let mut module = Module::new();
        let region = module.body_region();
        let block = module.create_block(region, &[Type::index(), Type::index(), Type::index()]);
        let arg2 = Value::argument(block, 2);
        let user = module.build_op(block, OpKind::And, &[arg2, arg2], &[Type::index()], vec![], 0);
        // Erase arg #1: arg #2 shifts down to index 1.
        module.erase_block_args(block, &[false, true, false]);
        assert_eq!(module.block(block).num_args(), 2);
        assert_eq!(module.op(user).operand(0), Value::argument(block, 1));
        assert!(module.has_uses(Value::argument(block, 1)));
    }

    #[test]
    fn test_inline_block_before() {
        let mut module = Module::new();
        let body = module.body();
        let init = const_index(&mut module, body, 7);
        let anchor = const_index(&mut module, body, 0);
        // A detached single-block region whose op uses the block argument.
        let holder = module.create_op(OpKind::AllocScope, &[], &[], vec![], 1);
        let region = module.op(holder).region(0);
        let inner = module.create_block(region, &[Type::index()]);
        let arg = Value::argument(inner, 0);
        let user = module.build_op(inner, OpKind::And, &[arg, arg], &[Type::index()], vec![], 0);

        module.inline_block_before(inner, anchor, &[Value::result(init, 0)]);
        assert_eq!(module.op(user).parent_block(), Some(body));
        assert_eq!(module.op(user).operand(0), Value::result(init, 0));
        let position_user = module.position_in_block(user);
        let position_anchor = module.position_in_block(anchor);
        assert!(position_user < position_anchor);
    }

    #[test]
    fn test_region_ancestry() {
        let mut module = Module::new();
        let body = module.body();
        let scope = module.build_op(body, OpKind::AllocScope, &[], &[], vec![], 1);
        let inner_region = module.op(scope).region(0);
        module.create_block(inner_region, &[]);
        assert!(module.region_is_ancestor(module.body_region(), inner_region));
        assert!(!module.region_is_ancestor(inner_region, module.body_region()));
    }
}
