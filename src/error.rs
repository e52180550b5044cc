use smallvec::SmallVec;
use snafu::Snafu;

use crate::ir::RmwKind;
use crate::sdim::SDim;
use crate::types::{MemorySpace, Type};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    // =========================================================================
    // Structural errors
    // =========================================================================
    /// Region that must contain at least one block is empty.
    #[snafu(display("{op} requires a non-empty region #{region_index}"))]
    EmptyRegion { op: &'static str, region_index: usize },

    /// Block is missing its mandatory terminator.
    #[snafu(display("{op} expects region #{region_index} to terminate with '{expected}'"))]
    MissingTerminator { op: &'static str, region_index: usize, expected: &'static str },

    /// Op has a different number of regions than its kind requires.
    #[snafu(display("{op} expects {expected} regions, found {actual}"))]
    RegionCountMismatch { op: &'static str, expected: usize, actual: usize },

    /// Op has a different number of operands than its kind requires.
    #[snafu(display("{op} expects {expected} operands, found {actual}"))]
    OperandCountMismatch { op: &'static str, expected: usize, actual: usize },

    /// Op has a different number of results than its kind requires.
    #[snafu(display("{op} expects {expected} results, found {actual}"))]
    ResultCountMismatch { op: &'static str, expected: usize, actual: usize },

    /// Required attribute is absent or of the wrong payload kind.
    #[snafu(display("{op} requires attribute '{name}'"))]
    MissingAttribute { op: &'static str, name: &'static str },

    // =========================================================================
    // Memory-reference semantics
    // =========================================================================
    /// Operand is not a ranked memory reference.
    #[snafu(display("{op} expects a ranked memref operand, got {actual:?}"))]
    ExpectedRankedMemRef { op: &'static str, actual: Type },

    /// Dynamic-size operand count differs from dynamic dims in the type.
    #[snafu(display("expected {expected} dynamic size operands for {ty:?}, found {actual}"))]
    DynamicSizeCountMismatch { expected: usize, actual: usize, ty: Type },

    /// Stack-like allocation outside any automatic allocation scope.
    #[snafu(display("stack allocation requires an ancestor with an automatic allocation scope"))]
    AllocaOutsideScope,

    /// Subscript operand count differs from the target rank.
    #[snafu(display("{op} expects {rank} subscripts for the target rank, found {subscripts}"))]
    SubscriptCountMismatch { op: &'static str, rank: usize, subscripts: usize },

    /// Cast between memrefs with different element types.
    #[snafu(display("element type mismatch: {from:?} vs {result:?}"))]
    ElementTypeMismatch { from: Type, result: Type },

    /// Cast between memrefs in different memory spaces.
    #[snafu(display("memory space mismatch: {} vs {}", from.0, result.0))]
    MemorySpaceMismatch { from: MemorySpace, result: MemorySpace },

    /// Ranked cast between types of different rank.
    #[snafu(display("rank mismatch: {from} vs {result}"))]
    RankMismatch { from: usize, result: usize },

    /// Static sizes disagree at a dimension where both sides are static.
    #[snafu(display("size mismatch at dimension {dim}: {from} vs {result}"))]
    DimSizeMismatch { dim: usize, from: SDim, result: SDim },

    /// Static offsets disagree.
    #[snafu(display("offset mismatch: {from} vs {result}"))]
    OffsetMismatch { from: SDim, result: SDim },

    /// Static strides disagree at a dimension.
    #[snafu(display("stride mismatch at dimension {dim}: {from} vs {result}"))]
    StrideMismatch { dim: usize, from: SDim, result: SDim },

    /// Unranked-to-unranked casts carry no information and are rejected.
    #[snafu(display("cast between unranked memref types is not supported"))]
    UnrankedCastUnsupported,

    /// Slice-like op whose offset/size/stride lists disagree with the rank.
    #[snafu(display("{op} expects {rank} offsets/sizes/strides, found {offsets}/{sizes}/{strides}"))]
    SliceArityMismatch { op: &'static str, rank: usize, offsets: usize, sizes: usize, strides: usize },

    /// Result type is neither the inferred type nor a valid rank reduction.
    #[snafu(display("result type {actual:?} is not a valid projection of inferred type {expected:?}"))]
    SubviewTypeMismatch { expected: Type, actual: Type },

    /// Reassociation group count differs from the collapsed rank.
    #[snafu(display("expected {dims} reassociation groups, found {groups}"))]
    ReassociationGroupCount { groups: usize, dims: usize },

    /// Reassociation indices must cover expanded dims in order, no gaps.
    #[snafu(display("reassociation group #{group_index} is not a contiguous run of dimensions"))]
    ReassociationNotContiguous { group_index: usize },

    /// Group static product disagrees with the collapsed dimension.
    #[snafu(display("group #{group_index} multiplies to {group_product} but the collapsed dimension is {dim}"))]
    GroupSizeMismatch { group_index: usize, group_product: i64, dim: SDim },

    /// Group dynamicity disagrees with the collapsed dimension.
    #[snafu(display("group #{group_index} dynamicity disagrees with the collapsed dimension {dim}"))]
    GroupDynamicityMismatch { group_index: usize, dim: SDim },

    /// Collapse over provably non-contiguous strides.
    #[snafu(display("group #{group_index} collapses non-contiguous dimensions"))]
    NonContiguousGroup { group_index: usize },

    /// Static components of a reinterpret result disagree with its attributes.
    #[snafu(display("{what} mismatch at position {index}: declared {declared}, result type has {actual}"))]
    ReinterpretMismatch { what: &'static str, index: usize, declared: SDim, actual: SDim },

    /// Permutation attribute is not a permutation of the source rank.
    #[snafu(display("invalid permutation {permutation:?} for rank {rank}"))]
    InvalidPermutation { permutation: Vec<i64>, rank: usize },

    /// Transposed result type disagrees with the permuted source type.
    #[snafu(display("transpose result {actual:?} does not match permuted type {expected:?}"))]
    TransposeResultMismatch { expected: Type, actual: Type },

    /// Atomic kind and element type belong to different categories.
    #[snafu(display("atomic kind {kind:?} does not apply to element type {element:?}"))]
    AtomicKindMismatch { kind: RmwKind, element: Type },

    // =========================================================================
    // Structured control flow semantics
    // =========================================================================
    /// Loop-carried value count differs from the result count.
    #[snafu(display("mismatch in number of loop-carried values ({inits}) and defined values ({results})"))]
    IterArityMismatch { inits: usize, results: usize },

    /// Loop-carried types disagree at a position.
    #[snafu(display("types mismatch between iter operand #{index} ({init:?}) and defined value ({result:?})"))]
    IterTypeMismatch { index: usize, init: Type, result: Type },

    /// Induction variable type differs from the bound/step type.
    #[snafu(display("expected induction variable type {bound:?}, found {induction:?}"))]
    InductionTypeMismatch { induction: Type, bound: Type },

    /// Terminator operand count differs from the expected list.
    #[snafu(display("{terminator} yields {actual} values, expected {expected}"))]
    YieldArityMismatch { terminator: &'static str, expected: usize, actual: usize },

    /// Terminator operand type disagrees at a position.
    #[snafu(display("{terminator} operand #{index} has type {actual:?}, expected {expected:?}"))]
    YieldTypeMismatch { terminator: &'static str, index: usize, expected: Type, actual: Type },

    /// Condition operand must be boolean.
    #[snafu(display("condition must be bool, got {actual:?}"))]
    ConditionNotBool { actual: Type },

    /// Conditional that defines values needs an else region.
    #[snafu(display("must have an else block if defining values"))]
    MissingElse,

    /// Duplicate value in a switch case list.
    #[snafu(display("duplicate case value {value}"))]
    DuplicateCaseValue { value: i64 },

    /// Case value count differs from case region count.
    #[snafu(display("has {regions} case regions but {values} case values"))]
    CaseCountMismatch { values: usize, regions: usize },

    /// Parallel loop with no bound triples.
    #[snafu(display("needs at least one tuple element for lower bound, upper bound and step"))]
    EmptyBounds,

    /// Constant step must be positive.
    #[snafu(display("constant step operand must be positive, got {value}"))]
    NonPositiveStep { value: i64 },

    /// Induction arguments must have index type.
    #[snafu(display("expects induction variable arguments of index type, got {actual:?}"))]
    NotIndexType { actual: Type },

    /// Operand type disagrees with the expected type.
    #[snafu(display("{op} operand #{index} has type {actual:?}, expected {expected:?}"))]
    OperandTypeMismatch { op: &'static str, index: usize, expected: Type, actual: Type },

    /// Region argument types disagree with the forwarded values.
    #[snafu(display("region argument types {expected:?} disagree with forwarded types {actual:?}"))]
    RegionArgMismatch { expected: SmallVec<[Type; 4]>, actual: SmallVec<[Type; 4]> },
}
