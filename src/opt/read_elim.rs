//! Redundant read elimination.
//!
//! A read of location L through address A is redundant when the most recent
//! store covering L also went through A: the stored value is still what
//! memory holds, so the read's users can take it directly. This is the
//! payoff the memory chain exists for.
//!
//! The pass walks program order with a map of available stores keyed by
//! `(address node, location)`. Precision rules:
//! - only `is_single` locations are keyed; the wildcard can stand for
//!   several locations at once and must never be forwarded from
//! - a write invalidates every map entry whose location overlaps the
//!   written one, then records its own store
//! - addresses are compared by node identity, which is conservative but
//!   sound: the same address node always computes the same address within
//!   one execution of the fragment
//! - a read other nodes hold under a non-value usage kind stays: a guarded
//!   read doubles as a guard anchor for its dependents, and removing it
//!   would leave them holding a corpse

use log::debug;
use rustc_hash::FxHashMap;

use crate::ir::graph::Graph;
use crate::ir::location::LocationIdentity;
use crate::ir::node::{InputKind, NodeId, NodeOp};
use crate::opt::Pass;

/// Forwards stored values to redundant reads and kills the reads.
#[derive(Debug, Default)]
pub struct ReadElimination {
    eliminated: usize,
}

impl ReadElimination {
    /// Fresh pass.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads eliminated over the pass's lifetime.
    pub fn eliminated(&self) -> usize {
        self.eliminated
    }
}

impl Pass for ReadElimination {
    fn name(&self) -> &'static str {
        "read-elimination"
    }

    fn run(&mut self, g: &mut Graph) -> bool {
        let mut available: FxHashMap<(NodeId, LocationIdentity), NodeId> = FxHashMap::default();
        let mut replacements: Vec<(NodeId, NodeId)> = Vec::new();

        for (id, node) in g.iter() {
            if node.is_dead() {
                continue;
            }
            match &node.op {
                NodeOp::Read(a) => {
                    if let Some(&value) = available.get(&(a.address, a.location)) {
                        // A guarded read may anchor Guard dependents (dual
                        // role); killing it would orphan them. Only a read
                        // held purely for its value is removable.
                        let anchored = g.uses(id).iter().any(|u| u.kind != InputKind::Value);
                        if !anchored {
                            replacements.push((id, value));
                        }
                    }
                }
                NodeOp::Write(w) => {
                    let loc = w.access.location;
                    // The store clobbers everything it may overlap.
                    available.retain(|&(_, l), _| !l.overlaps(loc));
                    if loc.is_single() {
                        available.insert((w.access.address, loc), w.value);
                    }
                }
                _ => {}
            }
        }

        let changed = !replacements.is_empty();
        for (read, value) in replacements {
            debug!("read-elimination: {read} forwards stored value {value}");
            g.replace_value_uses(read, value);
            g.kill(read);
            self.eliminated += 1;
        }
        changed
    }
}

// =============================================================================
// Tests
// =============================================================================
