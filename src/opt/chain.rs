//! Memory-chain threading and shortening.
//!
//! After graph construction every memory access is linked to the nearest
//! prior memory checkpoint in program order, whatever its location. That is
//! always correct and maximally conservative: it forbids every reordering.
//!
//! Shortening then walks each access's chain past checkpoints whose
//! locations provably do not overlap the access's own. Skipping a disjoint
//! write cannot reorder any pair of overlapping operations, so the ordering
//! guarantee survives every rewire; what changes is that scheduling and
//! elimination passes see through unrelated stores. This is the enabling
//! step for redundant read elimination.

use log::debug;

use crate::ir::graph::Graph;
use crate::ir::node::NodeId;
use crate::opt::Pass;

// =============================================================================
// Initial threading
// =============================================================================

/// Link every memory access to the nearest prior checkpoint.
///
/// Creation order is program order for the fixed memory ops this crate
/// carries, so a single forward walk suffices. Accesses before the first
/// write bottom out at `Start`. Already-threaded accesses are left alone.
pub fn thread_memory_chain(g: &mut Graph) {
    let ids: Vec<NodeId> = g.ids().collect();
    let mut last_checkpoint = g.start();
    for id in ids {
        let node = g.node(id);
        if node.is_dead() {
            continue;
        }
        let is_access = node.is_memory_access();
        let is_checkpoint = node.is_memory_checkpoint();
        if is_access && g.last_location_access(id).is_none() {
            g.set_last_location_access(id, Some(last_checkpoint));
        }
        if is_checkpoint {
            last_checkpoint = id;
        }
    }
}

// =============================================================================
// Chain shortening
// =============================================================================

/// Rewires each access's chain link to skip non-overlapping checkpoints.
///
/// Targets are computed from program order, not by walking current links:
/// a link that was already shortened no longer remembers the checkpoints it
/// skipped, so chasing it transitively for a *different* location could hop
/// past an overlapping write.
#[derive(Debug, Default)]
pub struct ChainShortening {
    rewired: usize,
}

impl ChainShortening {
    /// Fresh pass.
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain links rewired over the pass's lifetime.
    pub fn rewired(&self) -> usize {
        self.rewired
    }
}

impl Pass for ChainShortening {
    fn name(&self) -> &'static str {
        "chain-shortening"
    }

    fn run(&mut self, g: &mut Graph) -> bool {
        let mut changed = false;
        // Checkpoints seen so far, in program order. Start is first and has
        // location ANY, so every search terminates on it at the latest.
        let mut checkpoints: Vec<NodeId> = Vec::new();
        let ids: Vec<NodeId> = g.ids().collect();
        for id in ids {
            let node = g.node(id);
            if node.is_dead() {
                continue;
            }
            if node.is_memory_access() {
                let location = match node.as_access() {
                    Some(a) => a.location,
                    None => continue,
                };
                let current = g.last_location_access(id);
                // Leave unthreaded accesses to thread_memory_chain.
                if current.is_some() {
                    let target = checkpoints.iter().rev().copied().find(|&c| {
                        g.node(c)
                            .memory_location()
                            .is_none_or(|l| l.overlaps(location))
                    });
                    if target.is_some() && target != current {
                        debug!(
                            "chain-shortening: {id} lastLocationAccess {current:?} -> {target:?}"
                        );
                        g.set_last_location_access(id, target);
                        self.rewired += 1;
                        changed = true;
                    }
                }
            }
            if g.node(id).is_memory_checkpoint() {
                checkpoints.push(id);
            }
        }
        changed
    }
}

// =============================================================================
// Tests
// =============================================================================
