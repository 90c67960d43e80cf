//! Access and write node payloads, and the capability traits they implement.
//!
//! The source system expressed "this node is simultaneously a memory access,
//! a state split, and a guard" through multiple interface inheritance on a
//! class hierarchy. Here each capability is an independent trait implemented
//! selectively by the op payload structs; the structural validator in
//! `validate.rs` is the single place that checks the rules the capabilities
//! imply, instead of scattering checks across virtual dispatch.
//!
//! The payloads own required inputs (`address`, `value`) and optional inputs
//! (`guard`, `state_after`, `last_location_access`) as plain node IDs. They
//! never mutate edges themselves: every setter lives on [`Graph`] so the
//! reverse usage index is updated in exactly one place.
//!
//! [`Graph`]: crate::ir::graph::Graph

use super::location::LocationIdentity;
use super::node::NodeId;

// =============================================================================
// Barrier Type
// =============================================================================

/// Which GC write-barrier sequence the backend must emit around a write.
///
/// Chosen at construction from the static type of the stored value and never
/// mutated afterwards; the backend is the only consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BarrierType {
    /// No barrier: primitive store, or the collector needs none here.
    None = 0,
    /// Precise barrier for a reference store to an object field.
    Field = 1,
    /// Barrier for a reference store to an array element.
    Array = 2,
}

// =============================================================================
// Capability traits
// =============================================================================

/// A node that reads or writes memory through a computed address and
/// participates in the memory ordering chain.
pub trait MemoryAccess {
    /// The address expression. Always a valid node for a constructed access.
    fn address(&self) -> NodeId;

    /// The location class this access may touch. Immutable after
    /// construction.
    fn location(&self) -> LocationIdentity;

    /// The GC barrier the backend must emit for this access.
    fn barrier(&self) -> BarrierType;

    /// The most recent prior memory checkpoint that may affect an
    /// overlapping location, if the chain has been threaded.
    fn last_location_access(&self) -> Option<NodeId>;
}

/// A node that captures a deoptimization state snapshot describing the
/// interpreter state *after* it executes.
pub trait StateSplit {
    /// The attached frame state, if any.
    fn state_after(&self) -> Option<NodeId>;

    /// Whether this node has an observable side effect. Side-effecting
    /// nodes may never be removed or reordered across each other without
    /// chain-respecting justification.
    fn has_side_effect(&self) -> bool;
}

/// A node that may carry a null-check guard.
///
/// When the guard is present the node plays a dual role: it is a memory
/// operation *and* a guard other nodes may depend on, which legalizes
/// `Guard`-kind usages of it. The graph doesn't enforce the dual role at
/// mutation time; the validator does.
pub trait Guarding {
    /// The null-check guard, if one was attached.
    fn guard(&self) -> Option<NodeId>;
}

// =============================================================================
// Access payload
// =============================================================================

/// Shared payload of every node that accesses memory through an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessData {
    /// The address expression (an `Address` node). Required input.
    pub address: NodeId,
    /// Location class of the access.
    pub location: LocationIdentity,
    /// GC barrier selection. `None` for reads.
    pub barrier: BarrierType,
    /// Optional null-check guard input.
    pub guard: Option<NodeId>,
    /// Optional back-link into the memory ordering chain. Relation only:
    /// the access stores and exposes the link, the optimizer maintains it.
    pub last_location_access: Option<NodeId>,
}

impl AccessData {
    /// Payload for a fresh access with no guard and an unthreaded chain.
    pub fn new(address: NodeId, location: LocationIdentity, barrier: BarrierType) -> Self {
        AccessData {
            address,
            location,
            barrier,
            guard: None,
            last_location_access: None,
        }
    }
}

impl MemoryAccess for AccessData {
    #[inline]
    fn address(&self) -> NodeId {
        self.address
    }

    #[inline]
    fn location(&self) -> LocationIdentity {
        self.location
    }

    #[inline]
    fn barrier(&self) -> BarrierType {
        self.barrier
    }

    #[inline]
    fn last_location_access(&self) -> Option<NodeId> {
        self.last_location_access
    }
}

impl Guarding for AccessData {
    #[inline]
    fn guard(&self) -> Option<NodeId> {
        self.guard
    }
}

// =============================================================================
// Write payload
// =============================================================================

/// Payload of a write node.
///
/// A write stores `value` through `access.address`, produces no value result
/// (its stamp is void), acts as the memory checkpoint for its location, and
/// optionally snapshots deopt state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteData {
    /// The underlying memory access.
    pub access: AccessData,
    /// The stored value. Required input.
    pub value: NodeId,
    /// Optional frame-state snapshot taken after the write.
    pub state_after: Option<NodeId>,
}

impl WriteData {
    /// Payload for a fresh write with no state attached.
    pub fn new(
        address: NodeId,
        location: LocationIdentity,
        value: NodeId,
        barrier: BarrierType,
    ) -> Self {
        WriteData {
            access: AccessData::new(address, location, barrier),
            value,
            state_after: None,
        }
    }
}

impl MemoryAccess for WriteData {
    #[inline]
    fn address(&self) -> NodeId {
        self.access.address
    }

    #[inline]
    fn location(&self) -> LocationIdentity {
        self.access.location
    }

    #[inline]
    fn barrier(&self) -> BarrierType {
        self.access.barrier
    }

    #[inline]
    fn last_location_access(&self) -> Option<NodeId> {
        self.access.last_location_access
    }
}

impl StateSplit for WriteData {
    #[inline]
    fn state_after(&self) -> Option<NodeId> {
        self.state_after
    }

    /// Always true: a write is observable no matter what it stores.
    #[inline]
    fn has_side_effect(&self) -> bool {
        true
    }
}

impl Guarding for WriteData {
    #[inline]
    fn guard(&self) -> Option<NodeId> {
        self.access.guard
    }
}

// =============================================================================
// Tests
// =============================================================================
