//! The graph substrate: node ownership, input edges, and the reverse usage
//! index.
//!
//! # Edge bookkeeping
//!
//! The reverse usage index must mirror the forward edge set at all times, or
//! liveness and reachability queries silently rot. Every reference mutation
//! in the crate therefore funnels through one private operation,
//! [`Graph::update_usages`]; node payloads never edit their own edges.
//!
//! # Handles and liveness
//!
//! `NodeId`s are plain arena indices, meaningful only inside their own
//! graph. References that cross a graph boundary (a frame state handed to a
//! write during graph stitching) travel as [`NodeHandle`]s, which carry the
//! owning [`GraphId`]. A handle from a discarded graph fails the identity
//! check instead of silently resolving to an unrelated node.
//!
//! # Concurrency
//!
//! One compilation thread mutates one graph at a time; there is no internal
//! locking and concurrent mutation is out of contract. Independent graphs
//! compile in parallel freely.

use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

use super::arena::{Arena, SecondaryMap};
use super::location::LocationIdentity;
use super::memory::{AccessData, BarrierType, WriteData};
use super::node::{
    AddressData, FrameStateData, GuardData, GuardKind, InputKind, Node, NodeId, NodeOp,
};

// =============================================================================
// Graph identity
// =============================================================================

static NEXT_GRAPH_ID: AtomicU64 = AtomicU64::new(0);

/// Identity of one graph instance, unique for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphId(u64);

impl GraphId {
    fn next() -> Self {
        GraphId(NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A node reference that is checkable across graph boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    /// The graph the node belongs to.
    pub graph: GraphId,
    /// The node within that graph.
    pub node: NodeId,
}

// =============================================================================
// Usage edges
// =============================================================================

/// One entry in a node's reverse usage list: `user` holds the node as an
/// input of the given kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    /// The node holding the reference.
    pub user: NodeId,
    /// The kind of the edge.
    pub kind: InputKind,
}

type UsageList = SmallVec<[Usage; 4]>;

// =============================================================================
// Graph
// =============================================================================

/// An IR graph: arena-owned nodes plus the reverse usage index.
#[derive(Debug)]
pub struct Graph {
    id: GraphId,
    nodes: Arena<Node>,
    uses: SecondaryMap<Node, UsageList>,
    start: NodeId,
    /// Bytecode offset stamped onto newly created nodes.
    next_bc_offset: u32,
}

impl Graph {
    /// Create a graph containing only the start node.
    pub fn new() -> Self {
        let mut nodes = Arena::with_capacity(64);
        let start = nodes.alloc(Node::new(NodeOp::Start));
        Graph {
            id: GraphId::next(),
            nodes,
            uses: SecondaryMap::new(),
            start,
            next_bc_offset: 0,
        }
    }

    /// This graph's process-unique identity.
    #[inline]
    pub fn id(&self) -> GraphId {
        self.id
    }

    /// The start node, doubling as the initial memory checkpoint.
    #[inline]
    pub fn start(&self) -> NodeId {
        self.start
    }

    /// A cross-graph handle for one of this graph's nodes.
    #[inline]
    pub fn handle(&self, node: NodeId) -> NodeHandle {
        debug_assert!(self.nodes.contains(node));
        NodeHandle {
            graph: self.id,
            node,
        }
    }

    /// Bytecode offset stamped onto nodes created from here on.
    pub fn set_bc_offset(&mut self, offset: u32) {
        self.next_bc_offset = offset;
    }

    // =========================================================================
    // Node access
    // =========================================================================

    /// Look up a node. Panics on an ID from another graph's range.
    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// Look up a node, or `None` for an ID outside this graph.
    #[inline]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Number of nodes, dead ones included.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if only the start node exists.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Iterate over all nodes in creation order. For the fixed memory ops
    /// this crate carries, creation order is program order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter()
    }

    /// Iterate over all node IDs in creation order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        self.nodes.ids()
    }

    /// Reverse usage list of a node.
    pub fn uses(&self, id: NodeId) -> &[Usage] {
        self.uses.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Total number of usages of a node, all kinds.
    pub fn use_count(&self, id: NodeId) -> usize {
        self.uses(id).len()
    }

    // =========================================================================
    // Node creation
    // =========================================================================

    fn add_node(&mut self, op: NodeOp) -> NodeId {
        let mut node = Node::new(op);
        node.bc_offset = self.next_bc_offset;
        let inputs = node.inputs();
        let id = self.nodes.alloc(node);
        for (kind, input) in inputs {
            assert!(
                self.nodes.contains(input),
                "input {input} of new node {id} is not in this graph"
            );
            self.uses.entry(input).push(Usage { user: id, kind });
        }
        id
    }

    /// Create an integer constant.
    pub fn const_int(&mut self, value: i64) -> NodeId {
        self.add_node(NodeOp::ConstInt(value))
    }

    /// Create a parameter node.
    pub fn parameter(&mut self, index: u16) -> NodeId {
        self.add_node(NodeOp::Parameter(index))
    }

    /// Create an `base + offset` address expression.
    pub fn offset_address(&mut self, base: NodeId, offset: NodeId) -> NodeId {
        self.add_node(NodeOp::Address(AddressData { base, offset }))
    }

    /// Create a guard over a condition value.
    pub fn guard(&mut self, condition: NodeId, kind: GuardKind) -> NodeId {
        self.add_node(NodeOp::Guard(GuardData { condition, kind }))
    }

    /// Create a frame-state snapshot for `bci`.
    pub fn frame_state(&mut self, bci: u32) -> NodeId {
        self.add_node(NodeOp::FrameState(FrameStateData { bci }))
    }

    /// Create a memory read. The address input must be an address node.
    pub fn read(&mut self, address: NodeId, location: LocationIdentity) -> NodeId {
        self.assert_address(address);
        self.add_node(NodeOp::Read(AccessData::new(
            address,
            location,
            BarrierType::None,
        )))
    }

    /// Create a memory write of `value`. The address input must be an
    /// address node; the barrier tag is fixed here for the backend.
    pub fn write(
        &mut self,
        address: NodeId,
        location: LocationIdentity,
        value: NodeId,
        barrier: BarrierType,
    ) -> NodeId {
        self.assert_address(address);
        self.add_node(NodeOp::Write(WriteData::new(
            address, location, value, barrier,
        )))
    }

    fn assert_address(&self, address: NodeId) {
        assert!(
            matches!(self.nodes[address].op, NodeOp::Address(_)),
            "access address {address} must be an address node"
        );
    }

    // =========================================================================
    // Edge mutation
    // =========================================================================

    /// Swap one usage edge of `user`: drop `old`'s entry, record `new`'s.
    ///
    /// Every optional-input setter goes through here so the reverse index
    /// can never diverge from the forward edges.
    fn update_usages(
        &mut self,
        user: NodeId,
        kind: InputKind,
        old: Option<NodeId>,
        new: Option<NodeId>,
    ) {
        if old == new {
            return;
        }
        if let Some(old) = old {
            let list = self.uses.entry(old);
            if let Some(pos) = list
                .iter()
                .position(|u| u.user == user && u.kind == kind)
            {
                list.swap_remove(pos);
            }
        }
        if let Some(new) = new {
            self.uses.entry(new).push(Usage { user, kind });
        }
    }

    /// Attach, replace, or clear the frame-state snapshot of a write.
    ///
    /// The state travels as a handle: attaching a state that belongs to a
    /// different (for instance discarded) graph, or one that has been
    /// killed, is a bug in an earlier phase and asserts fatally.
    pub fn set_state_after(&mut self, write: NodeId, state: Option<NodeHandle>) {
        let state = state.map(|h| {
            assert!(
                h.graph == self.id,
                "frame state {:?} does not belong to this graph",
                h
            );
            assert!(
                self.nodes.contains(h.node) && !self.nodes[h.node].is_dead(),
                "frame state {} must be alive",
                h.node
            );
            assert!(
                matches!(self.nodes[h.node].op, NodeOp::FrameState(_)),
                "state input {} must be a frame state",
                h.node
            );
            h.node
        });
        let old = match &mut self.nodes[write].op {
            NodeOp::Write(w) => std::mem::replace(&mut w.state_after, state),
            _ => panic!("node {write} is not a write"),
        };
        self.update_usages(write, InputKind::State, old, state);
    }

    /// The frame state attached to a write, if any.
    pub fn state_after(&self, write: NodeId) -> Option<NodeId> {
        self.nodes[write].as_write().and_then(|w| w.state_after)
    }

    /// Rewire the memory-chain predecessor of an access.
    ///
    /// The target must be a live memory checkpoint. The access performs no
    /// analysis; whoever calls this owns the ordering argument.
    pub fn set_last_location_access(&mut self, access: NodeId, target: Option<NodeId>) {
        if let Some(t) = target {
            assert!(
                self.nodes.contains(t) && !self.nodes[t].is_dead(),
                "chain target {t} must be alive"
            );
            assert!(
                self.nodes[t].is_memory_checkpoint(),
                "chain target {t} must be a memory checkpoint"
            );
        }
        let old = match self.nodes[access].as_access_mut() {
            Some(a) => std::mem::replace(&mut a.last_location_access, target),
            None => panic!("node {access} is not a memory access"),
        };
        self.update_usages(access, InputKind::Memory, old, target);
    }

    /// The memory-chain predecessor of an access, if threaded.
    pub fn last_location_access(&self, access: NodeId) -> Option<NodeId> {
        self.nodes[access]
            .as_access()
            .and_then(|a| a.last_location_access)
    }

    /// Attach, replace, or clear the null-check guard of an access.
    pub fn set_guard(&mut self, access: NodeId, guard: Option<NodeId>) {
        if let Some(g) = guard {
            assert!(
                self.nodes.contains(g) && !self.nodes[g].is_dead(),
                "guard {g} must be alive"
            );
        }
        let old = match self.nodes[access].as_access_mut() {
            Some(a) => std::mem::replace(&mut a.guard, guard),
            None => panic!("node {access} is not a memory access"),
        };
        self.update_usages(access, InputKind::Guard, old, guard);
    }

    /// Redirect every value usage of `old` to `new`.
    ///
    /// Only `Value` edges move: memory, state, and guard usages encode
    /// roles `new` may not play, and their owners rewire them explicitly.
    pub fn replace_value_uses(&mut self, old: NodeId, new: NodeId) {
        let moved: Vec<Usage> = self
            .uses(old)
            .iter()
            .copied()
            .filter(|u| u.kind == InputKind::Value)
            .collect();
        for usage in moved {
            let node = &mut self.nodes[usage.user];
            match &mut node.op {
                NodeOp::Address(a) => {
                    if a.base == old {
                        a.base = new;
                    }
                    if a.offset == old {
                        a.offset = new;
                    }
                }
                NodeOp::Guard(g) => {
                    if g.condition == old {
                        g.condition = new;
                    }
                }
                NodeOp::Write(w) => {
                    if w.value == old {
                        w.value = new;
                    }
                }
                _ => {}
            }
            self.update_usages(usage.user, InputKind::Value, Some(old), Some(new));
        }
    }

    /// Kill a node: mark it dead and drop its forward edges from the
    /// reverse index. The arena slot stays; edges *to* the corpse are the
    /// caller's bug and the validator's catch.
    pub fn kill(&mut self, id: NodeId) {
        let inputs = self.nodes[id].inputs();
        for (kind, input) in inputs {
            self.update_usages(id, kind, Some(input), None);
        }
        self.nodes[id].mark_dead();
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::location::{ClassId, FieldId};

    fn loc(field: u32) -> LocationIdentity {
        LocationIdentity::field(ClassId(0), FieldId(field))
    }

    /// base, offset, address, value.
    fn setup(g: &mut Graph) -> (NodeId, NodeId) {
        let base = g.parameter(0);
        let offset = g.const_int(16);
        let addr = g.offset_address(base, offset);
        let value = g.const_int(42);
        (addr, value)
    }

    #[test]
    fn test_construction_registers_usages() {
        let mut g = Graph::new();
        let (addr, value) = setup(&mut g);
        let w = g.write(addr, loc(0), value, BarrierType::None);

        assert_eq!(g.use_count(addr), 1);
        assert_eq!(g.use_count(value), 1);
        assert_eq!(
            g.uses(addr),
            &[Usage {
                user: w,
                kind: InputKind::Address
            }]
        );
    }

    #[test]
    fn test_set_state_after_twice_moves_one_usage() {
        let mut g = Graph::new();
        let (addr, value) = setup(&mut g);
        let w = g.write(addr, loc(0), value, BarrierType::None);
        let s1 = g.frame_state(10);
        let s2 = g.frame_state(20);

        let h1 = g.handle(s1);
        let h2 = g.handle(s2);

        g.set_state_after(w, Some(h1));
        assert_eq!(g.state_after(w), Some(s1));
        assert_eq!(g.use_count(s1), 1);
        assert_eq!(g.use_count(s2), 0);

        g.set_state_after(w, Some(h2));
        assert_eq!(g.state_after(w), Some(s2));
        assert_eq!(g.use_count(s1), 0);
        assert_eq!(g.use_count(s2), 1);

        g.set_state_after(w, None);
        assert_eq!(g.state_after(w), None);
        assert_eq!(g.use_count(s2), 0);
    }

    #[test]
    #[should_panic(expected = "does not belong to this graph")]
    fn test_state_from_discarded_graph_asserts() {
        let mut other = Graph::new();
        let s = other.frame_state(5);
        let stale = other.handle(s);
        drop(other);

        let mut g = Graph::new();
        let (addr, value) = setup(&mut g);
        let w = g.write(addr, loc(0), value, BarrierType::None);
        g.set_state_after(w, Some(stale));
    }

    #[test]
    #[should_panic(expected = "must be alive")]
    fn test_dead_state_asserts() {
        let mut g = Graph::new();
        let (addr, value) = setup(&mut g);
        let w = g.write(addr, loc(0), value, BarrierType::None);
        let s = g.frame_state(5);
        let h = g.handle(s);
        g.kill(s);
        g.set_state_after(w, Some(h));
    }

    #[test]
    #[should_panic(expected = "must be an address node")]
    fn test_write_requires_address_node() {
        let mut g = Graph::new();
        let not_an_address = g.const_int(0);
        let value = g.const_int(1);
        g.write(not_an_address, loc(0), value, BarrierType::None);
    }

    #[test]
    fn test_chain_link_bookkeeping() {
        let mut g = Graph::new();
        let (addr, value) = setup(&mut g);
        let w1 = g.write(addr, loc(0), value, BarrierType::None);
        let w2 = g.write(addr, loc(0), value, BarrierType::None);

        g.set_last_location_access(w2, Some(w1));
        assert_eq!(g.last_location_access(w2), Some(w1));
        assert_eq!(g.use_count(w1), 1);

        let start = g.start();
        g.set_last_location_access(w2, Some(start));
        assert_eq!(g.last_location_access(w2), Some(start));
        assert_eq!(g.use_count(w1), 0);
    }

    #[test]
    #[should_panic(expected = "must be a memory checkpoint")]
    fn test_chain_target_must_be_checkpoint() {
        let mut g = Graph::new();
        let (addr, _) = setup(&mut g);
        let r1 = g.read(addr, loc(0));
        let r2 = g.read(addr, loc(0));
        // A read is not a checkpoint.
        g.set_last_location_access(r2, Some(r1));
    }

    #[test]
    fn test_replace_value_uses_moves_only_value_edges() {
        let mut g = Graph::new();
        let (addr, old_value) = setup(&mut g);
        let w = g.write(addr, loc(0), old_value, BarrierType::None);
        let new_value = g.const_int(7);

        g.replace_value_uses(old_value, new_value);

        assert_eq!(g.node(w).as_write().unwrap().value, new_value);
        assert_eq!(g.use_count(old_value), 0);
        assert_eq!(g.use_count(new_value), 1);
        // The address edge didn't move.
        assert_eq!(g.use_count(addr), 1);
    }

    #[test]
    fn test_kill_drops_forward_edges() {
        let mut g = Graph::new();
        let (addr, value) = setup(&mut g);
        let r = g.read(addr, loc(0));
        assert_eq!(g.use_count(addr), 1);

        g.kill(r);
        assert!(g.node(r).is_dead());
        assert_eq!(g.use_count(addr), 0);
        let _ = value;
    }

    #[test]
    fn test_graph_ids_unique() {
        let a = Graph::new();
        let b = Graph::new();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_validator_catches_desynchronized_usage_index() {
        use crate::ir::validate::{verify_graph, IntegrityError};

        let mut g = Graph::new();
        let (addr, value) = setup(&mut g);
        let w = g.write(addr, loc(0), value, BarrierType::None);
        assert_eq!(verify_graph(&g), Ok(()));

        // Drop the write's value edge from the index behind the
        // substrate's back: the forward edge is now unmirrored.
        let list = g.uses.entry(value);
        let pos = list
            .iter()
            .position(|u| u.user == w && u.kind == InputKind::Value)
            .unwrap();
        list.swap_remove(pos);

        let errors = verify_graph(&g).unwrap_err();
        assert!(errors.contains(&IntegrityError::MissingUsage {
            user: w,
            input: value,
            kind: InputKind::Value,
        }));

        // Restore it, then plant an entry with no forward edge.
        g.uses.entry(value).push(Usage {
            user: w,
            kind: InputKind::Value,
        });
        assert_eq!(verify_graph(&g), Ok(()));

        g.uses.entry(addr).push(Usage {
            user: w,
            kind: InputKind::State,
        });
        let errors = verify_graph(&g).unwrap_err();
        assert!(errors.contains(&IntegrityError::StaleUsage {
            user: w,
            input: addr,
            kind: InputKind::State,
        }));
    }
}
