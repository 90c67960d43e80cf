//! Structural-integrity checking.
//!
//! Validation failures are compiler-internal errors: they abort the current
//! method's compilation (the caller falls back to the unoptimized tier) but
//! are never recovered from in place. The checker reports every problem it
//! finds rather than stopping at the first, because a desynchronized usage
//! index usually surfaces as several of them at once.

use thiserror::Error;

use super::arena::BitSet;
use super::graph::{Graph, Usage};
use super::node::{InputKind, NodeId, NodeOp};

// =============================================================================
// Errors
// =============================================================================

/// A structural-integrity violation found in a graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityError {
    /// An input edge points outside the arena.
    #[error("node {user} holds out-of-graph input {input}")]
    DanglingInput { user: NodeId, input: NodeId },

    /// An input edge points at a killed node.
    #[error("node {user} holds dead node {input} as a {kind:?} input")]
    DeadInput {
        user: NodeId,
        input: NodeId,
        kind: InputKind,
    },

    /// An edge kind the target does not allow, e.g. a `Guard` usage of an
    /// access whose null-check guard is not set.
    #[error("node {user} holds {input} as a {kind:?} input, which {input} does not allow")]
    DisallowedUsage {
        user: NodeId,
        input: NodeId,
        kind: InputKind,
    },

    /// A forward edge with no matching entry in the reverse usage index.
    #[error("usage index is missing the {kind:?} edge {user} -> {input}")]
    MissingUsage {
        user: NodeId,
        input: NodeId,
        kind: InputKind,
    },

    /// A reverse-index entry with no matching forward edge.
    #[error("usage index has stale {kind:?} edge {user} -> {input}")]
    StaleUsage {
        user: NodeId,
        input: NodeId,
        kind: InputKind,
    },

    /// The access's address input is not an address node.
    #[error("access {access} has non-address input {input}")]
    BadAddressInput { access: NodeId, input: NodeId },

    /// Following `lastLocationAccess` links from this node revisits a node.
    #[error("memory chain starting at {access} is cyclic")]
    CyclicChain { access: NodeId },
}

// =============================================================================
// Verifier
// =============================================================================

/// Check every structural invariant of a graph.
///
/// Returns all violations found; an empty `Ok` means the graph is sound for
/// the passes that consume it.
pub fn verify_graph(g: &Graph) -> Result<(), Vec<IntegrityError>> {
    let mut errors = Vec::new();

    check_edges(g, &mut errors);
    check_usage_index(g, &mut errors);
    check_chains(g, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Forward edges: in-arena, alive, and of a kind the target allows.
fn check_edges(g: &Graph, errors: &mut Vec<IntegrityError>) {
    for (user, node) in g.iter() {
        if node.is_dead() {
            continue;
        }
        for (kind, input) in node.inputs() {
            let Some(target) = g.get(input) else {
                errors.push(IntegrityError::DanglingInput { user, input });
                continue;
            };
            if target.is_dead() {
                errors.push(IntegrityError::DeadInput { user, input, kind });
                continue;
            }
            if !target.allows_usage(kind) {
                errors.push(IntegrityError::DisallowedUsage { user, input, kind });
            }
            if kind == InputKind::Address && !matches!(target.op, NodeOp::Address(_)) {
                errors.push(IntegrityError::BadAddressInput {
                    access: user,
                    input,
                });
            }
        }
    }
}

/// Reverse index mirrors the forward edges exactly.
fn check_usage_index(g: &Graph, errors: &mut Vec<IntegrityError>) {
    for (user, node) in g.iter() {
        if node.is_dead() {
            continue;
        }
        for (kind, input) in node.inputs() {
            let present = g
                .uses(input)
                .iter()
                .any(|u| u.user == user && u.kind == kind);
            if !present {
                errors.push(IntegrityError::MissingUsage { user, input, kind });
            }
        }
    }
    for id in g.ids() {
        for &Usage { user, kind } in g.uses(id) {
            let forward = !g.node(user).is_dead()
                && g.node(user)
                    .inputs()
                    .iter()
                    .any(|&(k, input)| k == kind && input == id);
            if !forward {
                errors.push(IntegrityError::StaleUsage {
                    user,
                    input: id,
                    kind,
                });
            }
        }
    }
}

/// Memory chains terminate; a cycle would make "executes no later than"
/// meaningless.
fn check_chains(g: &Graph, errors: &mut Vec<IntegrityError>) {
    let mut visited = BitSet::with_capacity(g.len());
    for (id, node) in g.iter() {
        if node.is_dead() || !node.is_memory_access() {
            continue;
        }
        visited.clear();
        visited.insert(id.as_usize());
        let mut cursor = g.last_location_access(id);
        while let Some(pred) = cursor {
            if !visited.insert(pred.as_usize()) {
                errors.push(IntegrityError::CyclicChain { access: id });
                break;
            }
            cursor = g.last_location_access(pred);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::location::{ClassId, FieldId, LocationIdentity};
    use crate::ir::memory::BarrierType;
    use crate::ir::node::GuardKind;

    fn loc() -> LocationIdentity {
        LocationIdentity::field(ClassId(0), FieldId(0))
    }

    fn graph_with_write() -> (Graph, NodeId) {
        let mut g = Graph::new();
        let base = g.parameter(0);
        let off = g.const_int(8);
        let addr = g.offset_address(base, off);
        let val = g.const_int(1);
        let w = g.write(addr, loc(), val, BarrierType::None);
        (g, w)
    }

    #[test]
    fn test_well_formed_graph_passes() {
        let (mut g, w) = graph_with_write();
        let s = g.frame_state(3);
        let h = g.handle(s);
        g.set_state_after(w, Some(h));
        g.set_last_location_access(w, Some(g.start()));
        assert_eq!(verify_graph(&g), Ok(()));
    }

    #[test]
    fn test_guard_usage_without_null_check_rejected() {
        let (mut g, w1) = graph_with_write();
        let base = g.parameter(1);
        let off = g.const_int(8);
        let addr = g.offset_address(base, off);
        let r = g.read(addr, loc());

        // w1 has no null-check guard, so using it as a guard is illegal.
        g.set_guard(r, Some(w1));

        let errors = verify_graph(&g).unwrap_err();
        assert!(errors.contains(&IntegrityError::DisallowedUsage {
            user: r,
            input: w1,
            kind: InputKind::Guard,
        }));
    }

    #[test]
    fn test_guard_usage_with_null_check_accepted() {
        let (mut g, w1) = graph_with_write();
        let cond = g.parameter(1);
        let nn = g.guard(cond, GuardKind::NotNull);
        g.set_guard(w1, Some(nn));

        let base = g.parameter(2);
        let off = g.const_int(8);
        let addr = g.offset_address(base, off);
        let r = g.read(addr, loc());

        // Now w1 doubles as a guard, so the usage is legal.
        g.set_guard(r, Some(w1));
        assert_eq!(verify_graph(&g), Ok(()));
    }

    #[test]
    fn test_dead_input_detected() {
        let (mut g, w) = graph_with_write();
        let s = g.frame_state(3);
        let h = g.handle(s);
        g.set_state_after(w, Some(h));
        // Killing the state behind the write's back leaves a dead edge.
        g.kill(s);

        let errors = verify_graph(&g).unwrap_err();
        assert!(errors.iter().any(|e| matches!(
            e,
            IntegrityError::DeadInput {
                kind: InputKind::State,
                ..
            }
        )));
    }

    #[test]
    fn test_cyclic_chain_detected() {
        let (mut g, w1) = graph_with_write();
        let base = g.parameter(1);
        let off = g.const_int(8);
        let addr = g.offset_address(base, off);
        let val = g.const_int(2);
        let w2 = g.write(addr, loc(), val, BarrierType::None);

        g.set_last_location_access(w2, Some(w1));
        g.set_last_location_access(w1, Some(w2));

        let errors = verify_graph(&g).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, IntegrityError::CyclicChain { .. })));
    }
}
