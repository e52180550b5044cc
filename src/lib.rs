//! Region-based intermediate representation for a memory-reference dialect
//! with structured control flow, plus the passes that keep it healthy.
//!
//! # Module Organization
//!
//! - [`types`] - Interned types (memrefs with layouts, scalars, index)
//! - [`attr`] - Interned attributes attached to operations
//! - [`ir`] - The module/region/block/op store and builders
//! - [`sdim`] - Static-or-dynamic dimension arithmetic
//! - [`verify`] - Structural and per-op verification
//! - [`fold`] - Per-op constant folding
//! - [`canonicalize`] - Greedy worklist rewriting to a fixpoint
//! - [`successor`] - Region-level control-flow successor queries
//! - [`registry`] - Per-kind dispatch for verify/fold/patterns
//! - [`diag`] - Diagnostics and sinks
//! - [`error`] - Error types and result handling

extern crate self as cinder_ir;

pub mod attr;
pub mod canonicalize;
pub mod diag;
pub mod error;
pub mod fold;
pub mod intern;
pub mod ir;
pub mod registry;
pub mod sdim;
pub mod successor;
pub mod types;
pub mod verify;

#[cfg(any(test, feature = "proptest"))]
pub mod test;

// All core types remain accessible at the crate root.
pub use attr::{Attr, AttrKind};
pub use canonicalize::{canonicalize, PatternFn, RewriteResult, Rewriter, MAX_REWRITES};
pub use diag::{CollectingSink, Diagnostic, DiagnosticSink, Severity};
pub use error::{Error, Result};
pub use fold::{apply_fold, FoldFn, FoldOutcome, FoldResult, InPlaceUpdate};
pub use ir::{BlockId, Module, OpId, OpKind, RegionId, RmwKind, Value};
pub use registry::{spec, OpSpec};
pub use sdim::SDim;
pub use successor::{successor_regions, RegionPoint, SuccessorTarget, Successors};
pub use types::{Layout, MemRefType, MemorySpace, Shape, Type, TypeKind};
pub use verify::{verify_module, verify_op};
