//! IR node definitions for the memory subsystem.
//!
//! This crate carries only the ops the memory model needs: address and value
//! producers, guards, reads, writes, frame states, and the start anchor.
//! Arithmetic and control flow live elsewhere and plug into the same
//! substrate.
//!
//! # Edges and usage kinds
//!
//! Every input edge has an [`InputKind`]. The kind is part of the edge, not
//! the node: the same write is held as a `Memory` input by its chain
//! successor, as a `Guard` input by accesses relying on its implicit null
//! check, and as a `State`/`Value` producer never. Which kinds a node may be
//! held under is the allowed-usage rule ([`Node::allows_usage`]), checked by
//! the validator rather than at mutation time.

use smallvec::SmallVec;

use super::arena::Id;
use super::location::LocationIdentity;
use super::memory::{AccessData, Guarding, StateSplit, WriteData};

// =============================================================================
// Node ID
// =============================================================================

/// Unique identifier for a node in its graph.
pub type NodeId = Id<Node>;

/// Inline capacity for input enumeration; a write with every optional input
/// present has five.
pub type InputVec = SmallVec<[(InputKind, NodeId); 5]>;

// =============================================================================
// Usage kinds
// =============================================================================

/// The kind of an input edge, mirrored into the reverse usage index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InputKind {
    /// An ordinary data value.
    Value = 0,
    /// An address expression.
    Address = 1,
    /// A memory ordering predecessor (`lastLocationAccess`).
    Memory = 2,
    /// A deoptimization state snapshot.
    State = 3,
    /// A guard dependency.
    Guard = 4,
    /// A control predecessor.
    Control = 5,
}

// =============================================================================
// Output stamp
// =============================================================================

/// What a node produces. Writes are `Void`: a write yields no value, only a
/// side effect and an ordering token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Stamp {
    /// No result.
    Void = 0,
    /// Integer value.
    Int = 1,
    /// Reference value.
    Object = 2,
    /// Memory address.
    Address = 3,
    /// Guard token.
    Guard = 4,
    /// Deopt state snapshot.
    State = 5,
    /// Control token.
    Control = 6,
}

// =============================================================================
// Op payloads
// =============================================================================

/// Payload of an address node: `base + offset`, both value inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressData {
    /// Base object or raw pointer.
    pub base: NodeId,
    /// Byte offset from the base.
    pub offset: NodeId,
}

/// What a guard checks before letting dependents execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GuardKind {
    /// Value is not null.
    NotNull = 0,
    /// Index is within bounds.
    Bounds = 1,
    /// Value has the expected type.
    Type = 2,
}

/// Payload of a guard node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardData {
    /// The checked condition value.
    pub condition: NodeId,
    /// What failing the check means.
    pub kind: GuardKind,
}

/// Payload of a frame-state node: enough to rebuild interpreter state at
/// `bci`. The full value list is the deopt subsystem's concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStateData {
    /// Bytecode index the snapshot describes.
    pub bci: u32,
}

// =============================================================================
// Node operation
// =============================================================================

/// The operation a node performs, with its owned inputs inline.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOp {
    /// Graph entry; the initial memory checkpoint every chain bottoms out
    /// at. Its location is `ANY`.
    Start,
    /// Integer constant.
    ConstInt(i64),
    /// Incoming parameter.
    Parameter(u16),
    /// Address computation.
    Address(AddressData),
    /// Explicit guard.
    Guard(GuardData),
    /// Memory read through an address.
    Read(AccessData),
    /// Memory write through an address.
    Write(WriteData),
    /// Deoptimization state snapshot.
    FrameState(FrameStateData),
}

impl NodeOp {
    /// The stamp this op produces.
    pub fn stamp(&self) -> Stamp {
        match self {
            NodeOp::Start => Stamp::Control,
            NodeOp::ConstInt(_) => Stamp::Int,
            NodeOp::Parameter(_) => Stamp::Object,
            NodeOp::Address(_) => Stamp::Address,
            NodeOp::Guard(_) => Stamp::Guard,
            NodeOp::Read(_) => Stamp::Int,
            // A write produces no value result.
            NodeOp::Write(_) => Stamp::Void,
            NodeOp::FrameState(_) => Stamp::State,
        }
    }
}

// =============================================================================
// Node flags
// =============================================================================

bitflags::bitflags! {
    /// Node property flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct NodeFlags: u8 {
        /// Node has been killed; edges to it are structural errors.
        const DEAD = 0b0000_0001;
        /// Node is fixed in program order; the scheduler may not float it.
        const PINNED = 0b0000_0010;
    }
}

// =============================================================================
// Node
// =============================================================================

/// A node in the graph: an op with its inputs, an output stamp, and the
/// bytecode position it came from (consumed by deopt metadata emission).
#[derive(Debug, Clone)]
pub struct Node {
    /// The operation.
    pub op: NodeOp,
    /// Output stamp, fixed at construction.
    pub stamp: Stamp,
    /// Property flags.
    pub flags: NodeFlags,
    /// Originating bytecode offset.
    pub bc_offset: u32,
}

impl Node {
    /// Create a node for `op` at bytecode offset 0. Memory ops and `Start`
    /// come out pinned.
    pub fn new(op: NodeOp) -> Self {
        let stamp = op.stamp();
        let pinned = matches!(op, NodeOp::Start | NodeOp::Read(_) | NodeOp::Write(_));
        Node {
            op,
            stamp,
            flags: if pinned {
                NodeFlags::PINNED
            } else {
                NodeFlags::empty()
            },
            bc_offset: 0,
        }
    }

    /// Enumerate this node's input edges with their kinds, required inputs
    /// first, optional inputs only when present.
    pub fn inputs(&self) -> InputVec {
        let mut out = InputVec::new();
        match &self.op {
            NodeOp::Start | NodeOp::ConstInt(_) | NodeOp::Parameter(_) | NodeOp::FrameState(_) => {
            }
            NodeOp::Address(a) => {
                out.push((InputKind::Value, a.base));
                out.push((InputKind::Value, a.offset));
            }
            NodeOp::Guard(g) => {
                out.push((InputKind::Value, g.condition));
            }
            NodeOp::Read(a) => {
                out.push((InputKind::Address, a.address));
                if let Some(g) = a.guard {
                    out.push((InputKind::Guard, g));
                }
                if let Some(m) = a.last_location_access {
                    out.push((InputKind::Memory, m));
                }
            }
            NodeOp::Write(w) => {
                out.push((InputKind::Address, w.access.address));
                out.push((InputKind::Value, w.value));
                if let Some(g) = w.access.guard {
                    out.push((InputKind::Guard, g));
                }
                if let Some(s) = w.state_after {
                    out.push((InputKind::State, s));
                }
                if let Some(m) = w.access.last_location_access {
                    out.push((InputKind::Memory, m));
                }
            }
        }
        out
    }

    /// Whether consumers may hold this node under the given usage kind.
    ///
    /// The `Guard` case is the dual-role rule: an access is a legal guard
    /// dependency only when its own null-check guard is set, because only
    /// then does executing it prove anything to a dependent.
    pub fn allows_usage(&self, kind: InputKind) -> bool {
        match kind {
            InputKind::Value => matches!(
                self.op,
                NodeOp::ConstInt(_) | NodeOp::Parameter(_) | NodeOp::Read(_)
            ),
            InputKind::Address => matches!(self.op, NodeOp::Address(_)),
            InputKind::Memory => self.is_memory_checkpoint(),
            InputKind::State => matches!(self.op, NodeOp::FrameState(_)),
            InputKind::Guard => match &self.op {
                NodeOp::Guard(_) => true,
                NodeOp::Read(a) => a.guard().is_some(),
                NodeOp::Write(w) => w.guard().is_some(),
                _ => false,
            },
            InputKind::Control => matches!(self.op, NodeOp::Start),
        }
    }

    /// Whether this node is a memory checkpoint a chain link may target:
    /// `Start` (the initial state) or a write.
    #[inline]
    pub fn is_memory_checkpoint(&self) -> bool {
        matches!(self.op, NodeOp::Start | NodeOp::Write(_))
    }

    /// The location a checkpoint covers, or the location an access touches.
    /// `Start` covers `ANY`; pure value nodes cover nothing.
    pub fn memory_location(&self) -> Option<LocationIdentity> {
        match &self.op {
            NodeOp::Start => Some(LocationIdentity::ANY),
            NodeOp::Read(a) => Some(a.location),
            NodeOp::Write(w) => Some(w.access.location),
            _ => None,
        }
    }

    /// Whether this node reads or writes memory.
    #[inline]
    pub fn is_memory_access(&self) -> bool {
        matches!(self.op, NodeOp::Read(_) | NodeOp::Write(_))
    }

    /// Whether this node has an observable side effect. Constant per op:
    /// true exactly for writes.
    #[inline]
    pub fn has_side_effect(&self) -> bool {
        match &self.op {
            NodeOp::Write(w) => w.has_side_effect(),
            _ => false,
        }
    }

    /// The access payload, for uniform consumption by passes.
    pub fn as_access(&self) -> Option<&AccessData> {
        match &self.op {
            NodeOp::Read(a) => Some(a),
            NodeOp::Write(w) => Some(&w.access),
            _ => None,
        }
    }

    /// The access payload, mutably. Edge mutations must still go through
    /// the graph's setters.
    pub(crate) fn as_access_mut(&mut self) -> Option<&mut AccessData> {
        match &mut self.op {
            NodeOp::Read(a) => Some(a),
            NodeOp::Write(w) => Some(&mut w.access),
            _ => None,
        }
    }

    /// The write payload, if this is a write.
    pub fn as_write(&self) -> Option<&WriteData> {
        match &self.op {
            NodeOp::Write(w) => Some(w),
            _ => None,
        }
    }

    /// True if the node has been killed.
    #[inline]
    pub fn is_dead(&self) -> bool {
        self.flags.contains(NodeFlags::DEAD)
    }

    /// Mark the node as killed.
    #[inline]
    pub fn mark_dead(&mut self) {
        self.flags.insert(NodeFlags::DEAD);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::location::{ClassId, FieldId};
    use crate::ir::memory::BarrierType;

    fn loc() -> LocationIdentity {
        LocationIdentity::field(ClassId(0), FieldId(0))
    }

    fn write_node() -> Node {
        Node::new(NodeOp::Write(WriteData::new(
            NodeId::new(1),
            loc(),
            NodeId::new(2),
            BarrierType::None,
        )))
    }

    #[test]
    fn test_write_stamp_is_void() {
        assert_eq!(write_node().stamp, Stamp::Void);
    }

    #[test]
    fn test_write_inputs_required_then_optional() {
        let mut node = write_node();
        assert_eq!(
            node.inputs().as_slice(),
            &[
                (InputKind::Address, NodeId::new(1)),
                (InputKind::Value, NodeId::new(2)),
            ]
        );

        if let NodeOp::Write(w) = &mut node.op {
            w.state_after = Some(NodeId::new(3));
            w.access.last_location_access = Some(NodeId::new(0));
        }
        let inputs = node.inputs();
        assert_eq!(inputs.len(), 4);
        assert!(inputs.contains(&(InputKind::State, NodeId::new(3))));
        assert!(inputs.contains(&(InputKind::Memory, NodeId::new(0))));
    }

    #[test]
    fn test_guard_usage_requires_null_check() {
        let mut node = write_node();
        assert!(!node.allows_usage(InputKind::Guard));

        node.as_access_mut().unwrap().guard = Some(NodeId::new(9));
        assert!(node.allows_usage(InputKind::Guard));

        // Memory usages are fine either way: a write is a checkpoint.
        assert!(node.allows_usage(InputKind::Memory));
        // A write produces no value.
        assert!(!node.allows_usage(InputKind::Value));
    }

    #[test]
    fn test_checkpoints_and_side_effects() {
        let start = Node::new(NodeOp::Start);
        assert!(start.is_memory_checkpoint());
        assert_eq!(start.memory_location(), Some(LocationIdentity::ANY));
        assert!(!start.has_side_effect());

        let write = write_node();
        assert!(write.is_memory_checkpoint());
        assert!(write.has_side_effect());
        assert!(write.flags.contains(NodeFlags::PINNED));

        let read = Node::new(NodeOp::Read(AccessData::new(
            NodeId::new(1),
            loc(),
            BarrierType::None,
        )));
        assert!(!read.is_memory_checkpoint());
        assert!(!read.has_side_effect());
        assert!(read.is_memory_access());

        let c = Node::new(NodeOp::ConstInt(3));
        assert!(!c.flags.contains(NodeFlags::PINNED));
        assert_eq!(c.memory_location(), None);
    }
}
