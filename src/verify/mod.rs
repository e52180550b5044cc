//! Structural and semantic verification.
//!
//! Verification is a pure query: per-kind verifiers take `(&Module, OpId)`
//! and return a [`Result`]. The module-level pass walks every op, converts
//! failures into [`Diagnostic`] records through an injected sink and keeps
//! collecting, so one broken op does not hide the rest.
//!
//! Structural preconditions (regions non-empty where required, mandatory
//! terminators present and last) run before kind dispatch; the per-kind
//! verifiers may then assume a well-shaped region tree.

pub mod flow;
pub mod mem;

use crate::diag::{Diagnostic, DiagnosticSink};
use crate::error::{EmptyRegionSnafu, MissingTerminatorSnafu, Result};
use crate::ir::{Module, OpId, OpKind, RegionId};
use crate::registry;

/// Verify a single operation: structure first, then kind semantics.
pub fn verify_op(module: &Module, op: OpId) -> Result<()> {
    verify_structure(module, op)?;
    (registry::spec(module.op(op).kind()).verify)(module, op)
}

/// Verify every operation in the module. Failures become error diagnostics
/// in the sink; returns the number of failures.
pub fn verify_module(module: &Module, sink: &mut dyn DiagnosticSink) -> usize {
    let mut failures = 0;
    for op in module.walk() {
        if let Err(error) = verify_op(module, op) {
            let name = module.op(op).kind().name();
            sink.report(Diagnostic::error(op, error.to_string()).with_note(format!("while verifying '{name}'")));
            failures += 1;
        }
    }
    failures
}

/// Regions that must be non-empty for the kind, with the terminator each of
/// their blocks must end in.
fn required_regions(kind: OpKind, num_regions: usize) -> Vec<(usize, OpKind)> {
    match kind {
        OpKind::AllocScope | OpKind::For | OpKind::Parallel => vec![(0, OpKind::Yield)],
        OpKind::While => vec![(0, OpKind::Condition), (1, OpKind::Yield)],
        // The else region of `if` may be empty; a present block still needs
        // a yield, which the kind verifier checks against the result types.
        OpKind::If => vec![(0, OpKind::Yield)],
        OpKind::IndexSwitch => (0..num_regions).map(|i| (i, OpKind::Yield)).collect(),
        _ => vec![],
    }
}

fn verify_structure(module: &Module, op: OpId) -> Result<()> {
    let operation = module.op(op);
    let kind = operation.kind();
    for (region_index, expected) in required_regions(kind, operation.num_regions()) {
        let region = operation.region(region_index);
        if module.entry_block(region).is_none() {
            return EmptyRegionSnafu { op: kind.name(), region_index }.fail();
        }
        verify_region_terminators(module, region, kind.name(), region_index, expected)?;
    }
    // Optional regions that do have blocks still need terminators.
    if kind == OpKind::If {
        let else_region = operation.region(1);
        if module.entry_block(else_region).is_some() {
            verify_region_terminators(module, else_region, kind.name(), 1, OpKind::Yield)?;
        }
    }
    Ok(())
}

fn verify_region_terminators(
    module: &Module,
    region: RegionId,
    op: &'static str,
    region_index: usize,
    expected: OpKind,
) -> Result<()> {
    for &block in module.region(region).blocks() {
        let terminates = module
            .block(block)
            .ops()
            .last()
            .is_some_and(|&last| module.op(last).kind() == expected);
        if !terminates {
            return MissingTerminatorSnafu { op, region_index, expected: expected.name() }.fail();
        }
    }
    Ok(())
}

/// Generic verifier for kinds with no semantic rules of their own.
pub(crate) fn verify_nothing(_module: &Module, _op: OpId) -> Result<()> {
    Ok(())
}
