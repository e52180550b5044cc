//! Region successor analysis.
//!
//! Answers "where can control go next" for a region-carrying op: either from
//! the parent (about to enter the op) or from one of its regions (about to
//! leave it). Constant condition or selector operands prune the successor
//! set; unknown operands yield every feasible target.

use smallvec::SmallVec;

use crate::ir::{Module, OpId, OpKind};

/// Where control currently is, relative to the op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionPoint {
    /// The op itself is about to execute.
    Parent,
    /// Control is leaving the op's region with this index.
    Region(usize),
}

/// Where control can go next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuccessorTarget {
    /// The op completes and control resumes after it.
    Parent,
    /// Control enters the op's region with this index.
    Region(usize),
}

pub type Successors = SmallVec<[SuccessorTarget; 2]>;

fn targets(list: impl IntoIterator<Item = SuccessorTarget>) -> Successors {
    list.into_iter().collect()
}

/// Feasible successors of `op` seen from `point`.
pub fn successor_regions(module: &Module, op: OpId, point: RegionPoint) -> Successors {
    let operation = module.op(op);
    match operation.kind() {
        OpKind::For => match point {
            RegionPoint::Parent => targets([SuccessorTarget::Region(0)]),
            RegionPoint::Region(_) => targets([SuccessorTarget::Region(0), SuccessorTarget::Parent]),
        },
        OpKind::While => match point {
            RegionPoint::Parent => targets([SuccessorTarget::Region(0)]),
            RegionPoint::Region(0) => {
                let flag = module
                    .terminator(module.before_block(op))
                    .filter(|&term| module.op(term).kind() == OpKind::Condition)
                    .and_then(|term| module.const_bool(module.op(term).operand(0)));
                match flag {
                    Some(true) => targets([SuccessorTarget::Region(1)]),
                    Some(false) => targets([SuccessorTarget::Parent]),
                    None => targets([SuccessorTarget::Region(1), SuccessorTarget::Parent]),
                }
            }
            RegionPoint::Region(_) => targets([SuccessorTarget::Region(0)]),
        },
        OpKind::If => match point {
            RegionPoint::Parent => {
                let else_target = if module.else_block(op).is_some() {
                    SuccessorTarget::Region(1)
                } else {
                    SuccessorTarget::Parent
                };
                match module.const_bool(operation.operand(0)) {
                    Some(true) => targets([SuccessorTarget::Region(0)]),
                    Some(false) => targets([else_target]),
                    None => targets([SuccessorTarget::Region(0), else_target]),
                }
            }
            RegionPoint::Region(_) => targets([SuccessorTarget::Parent]),
        },
        OpKind::IndexSwitch => match point {
            RegionPoint::Parent => {
                let cases = operation.attr("cases").and_then(|a| a.as_int_array().map(<[i64]>::to_vec));
                match (module.const_int(operation.operand(0)), cases) {
                    (Some(value), Some(cases)) => {
                        let target = cases
                            .iter()
                            .position(|&c| c == value)
                            .map_or(SuccessorTarget::Region(0), |i| SuccessorTarget::Region(1 + i));
                        targets([target])
                    }
                    _ => (0..operation.num_regions()).map(SuccessorTarget::Region).collect(),
                }
            }
            RegionPoint::Region(_) => targets([SuccessorTarget::Parent]),
        },
        // The parallel body is entered once; iteration structure is not
        // modeled as re-entry.
        OpKind::Parallel | OpKind::AllocScope => match point {
            RegionPoint::Parent => targets([SuccessorTarget::Region(0)]),
            RegionPoint::Region(_) => targets([SuccessorTarget::Parent]),
        },
        _ => Successors::new(),
    }
}
