//! Greedy worklist canonicalization.
//!
//! The driver seeds a worklist with every op, then repeatedly pops one and
//! tries, in order: driver-level erasure of side-effect-free ops with no
//! remaining uses, the kind's folder, and the kind's pattern list
//! (first match wins). Any change re-enqueues the affected neighborhood:
//! the op itself, its parent, the users of changed values and whatever the
//! pattern explicitly touched.
//!
//! Patterns follow an atomicity contract: every precondition is checked
//! before the first mutation, so a pattern either leaves the module intact
//! and reports `NoMatch` or commits a complete rewrite and reports
//! `Changed`.
//!
//! Termination is fixpoint-or-ceiling: a module that keeps changing past
//! [`MAX_REWRITES`] stops with a warning diagnostic instead of spinning.

pub mod flow;
pub mod mem;

use std::collections::{HashSet, VecDeque};

use crate::diag::{Diagnostic, DiagnosticSink};
use crate::fold::apply_fold;
use crate::ir::{Module, OpId, Value};
use crate::registry;

/// Upper bound on applied rewrites per canonicalization run.
pub const MAX_REWRITES: usize = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteResult {
    NoMatch,
    Changed,
}

pub type PatternFn = fn(&mut Rewriter<'_>, OpId) -> RewriteResult;

/// Mutation handle passed to patterns. Wraps the module and records which
/// ops the pattern touched, so the driver can re-enqueue them.
pub struct Rewriter<'m> {
    pub module: &'m mut Module,
    pending: Vec<OpId>,
}

impl<'m> Rewriter<'m> {
    pub fn new(module: &'m mut Module) -> Self {
        Rewriter { module, pending: Vec::new() }
    }

    /// Ask the driver to revisit `op` after this pattern commits.
    pub fn revisit(&mut self, op: OpId) {
        self.pending.push(op);
    }

    /// Replace all uses of `old`, queueing the affected users.
    pub fn replace_all_uses(&mut self, old: Value, new: Value) {
        self.pending.extend(self.module.user_ops(old));
        self.module.replace_all_uses(old, new);
    }

    /// Replace every result of `op` and erase it, queueing affected users.
    pub fn replace_op_with_values(&mut self, op: OpId, values: &[Value]) {
        for (index, &value) in values.iter().enumerate() {
            self.replace_all_uses(Value::result(op, index), value);
        }
        self.erase_op(op);
    }

    pub fn erase_op(&mut self, op: OpId) {
        if let Some(parent) = self.module.parent_op(op) {
            self.pending.push(parent);
        }
        // Producers may become dead once this op and its regions are gone.
        // Ops inside the erased subtree end up as stale handles the driver
        // skips.
        let mut subtree = vec![op];
        for &region in &self.module.op(op).regions().to_vec() {
            subtree.extend(self.module.walk_region(region));
        }
        for inner in subtree {
            for operand in self.module.op(inner).operands().to_vec() {
                if let Some(defining) = self.module.defining_op(operand) {
                    self.pending.push(defining);
                }
            }
        }
        self.module.erase_op(op);
    }
}

impl std::ops::Deref for Rewriter<'_> {
    type Target = Module;

    fn deref(&self) -> &Module {
        self.module
    }
}

impl std::ops::DerefMut for Rewriter<'_> {
    fn deref_mut(&mut self) -> &mut Module {
        self.module
    }
}

struct Worklist {
    queue: VecDeque<OpId>,
    queued: HashSet<OpId>,
}

impl Worklist {
    fn seeded(module: &Module) -> Self {
        let mut list = Worklist { queue: VecDeque::new(), queued: HashSet::new() };
        // Reverse preorder: nested and later ops first, so producers see
        // already-simplified consumers less often than the reverse.
        for op in module.walk().into_iter().rev() {
            list.push(op);
        }
        list
    }

    fn push(&mut self, op: OpId) {
        if self.queued.insert(op) {
            self.queue.push_back(op);
        }
    }

    fn pop(&mut self) -> Option<OpId> {
        let op = self.queue.pop_front()?;
        self.queued.remove(&op);
        Some(op)
    }
}

/// Run folding and patterns to fixpoint. Returns true when anything changed.
pub fn canonicalize(module: &mut Module, sink: &mut dyn DiagnosticSink) -> bool {
    let mut worklist = Worklist::seeded(module);
    let mut changed_anything = false;
    let mut rewrites = 0usize;

    while let Some(op) = worklist.pop() {
        if !module.is_live(op) {
            continue;
        }
        if rewrites >= MAX_REWRITES {
            tracing::warn!(rewrites, "canonicalization stopped before reaching a fixpoint");
            sink.report(Diagnostic::warning(op, "canonicalization stopped before reaching a fixpoint"));
            break;
        }

        let kind = module.op(op).kind();

        // Driver-level erasure of pure ops with no remaining uses.
        if kind.is_pure() && module.result_values(op).iter().all(|&v| !module.has_uses(v)) {
            tracing::trace!(op = kind.name(), "erasing unused pure op");
            if let Some(parent) = module.parent_op(op) {
                worklist.push(parent);
            }
            for &operand in &module.op(op).operands().to_vec() {
                if let Some(defining) = module.defining_op(operand) {
                    worklist.push(defining);
                }
            }
            module.erase_op(op);
            changed_anything = true;
            rewrites += 1;
            continue;
        }

        // Fold before patterns.
        let operands = module.op(op).operands().to_vec();
        let outcome = (registry::spec(kind).fold)(module, op);
        if let Some(changed) = apply_fold(module, op, outcome) {
            tracing::trace!(op = kind.name(), "applied fold");
            for operand in operands {
                if let Some(defining) = module.defining_op(operand) {
                    worklist.push(defining);
                }
            }
            for value in changed {
                for user in module.user_ops(value) {
                    worklist.push(user);
                }
                if let Some(defining) = module.defining_op(value) {
                    worklist.push(defining);
                }
            }
            if module.is_live(op) {
                worklist.push(op);
                if let Some(parent) = module.parent_op(op) {
                    worklist.push(parent);
                }
            }
            changed_anything = true;
            rewrites += 1;
            continue;
        }

        // First matching pattern wins; the rest wait for the revisit.
        for pattern in registry::spec(kind).patterns {
            let mut rewriter = Rewriter::new(module);
            match pattern(&mut rewriter, op) {
                RewriteResult::NoMatch => continue,
                RewriteResult::Changed => {
                    tracing::debug!(op = kind.name(), "applied pattern");
                    let pending = rewriter.pending;
                    for touched in pending {
                        if module.is_live(touched) {
                            worklist.push(touched);
                        }
                    }
                    if module.is_live(op) {
                        worklist.push(op);
                    }
                    changed_anything = true;
                    rewrites += 1;
                    break;
                }
            }
        }
    }

    changed_anything
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::CollectingSink;
    use crate::ir::{OpKind, RmwKind};
    use crate::types::Type;

    #[test]
    fn test_dce_erases_unused_chain() {
        let mut module = Module::new();
        let body = module.body();
        let a = module.constant_bool(body, true);
        let b = module.not(body, a);
        let _ = module.not(body, b);
        let mut sink = CollectingSink::new();
        assert!(canonicalize(&mut module, &mut sink));
        assert!(module.block(body).ops().is_empty());
        assert_eq!(sink.diagnostics.len(), 0);
    }

    #[test]
    fn test_fold_feeds_users_transitively() {
        let mut module = Module::new();
        let body = module.body();
        let t = module.constant_bool(body, true);
        let f = module.constant_bool(body, false);
        let n = module.not(body, f);
        let conj = module.and(body, t, n);
        let keep = module.alloc(body, Type::memref_identity(Type::bool_(), [1]), &[]);
        let index = module.constant_index(body, 0);
        let _ = module.atomic_rmw(body, RmwKind::AndI, conj, Value::result(keep, 0), &[index]);
        let mut sink = CollectingSink::new();
        assert!(canonicalize(&mut module, &mut sink));
        // The accumulated flag collapsed to a single constant `true`.
        let atomic = module
            .block(body)
            .ops()
            .iter()
            .copied()
            .find(|&op| matches!(module.op(op).kind(), OpKind::AtomicRmw(_)))
            .unwrap();
        assert_eq!(module.const_bool(module.op(atomic).operand(0)), Some(true));
    }
}
