//! Memory-dependency core of a sea-of-nodes JIT IR.
//!
//! This crate models the part of an optimizing JIT's intermediate
//! representation that deals with memory:
//! - **Location identities**: symbolic tags naming which abstract memory
//!   location an operation may touch, used for alias queries
//! - **Access/write nodes**: reads and writes through computed addresses,
//!   with GC barrier tags, null-check guards, and deopt state snapshots
//! - **Memory ordering chain**: a per-location def-use chain
//!   (`lastLocationAccess`) that later passes consult before reordering or
//!   eliminating memory operations
//! - **Graph substrate**: arena-backed nodes with a reverse usage-edge
//!   index that stays consistent across every reference mutation
//!
//! Control flow, arithmetic, instruction selection, and register allocation
//! live in other crates; this one only has to get aliasing and ordering
//! right, because getting them wrong miscompiles silently.

pub mod ir;
pub mod opt;

pub use ir::graph::{Graph, GraphId, NodeHandle, Usage};
pub use ir::location::{ClassId, ElementKind, FieldId, LocationIdentity};
pub use ir::memory::{AccessData, BarrierType, Guarding, MemoryAccess, StateSplit, WriteData};
pub use ir::node::{
    AddressData, FrameStateData, GuardData, GuardKind, InputKind, Node, NodeFlags, NodeId, NodeOp,
    Stamp,
};
pub use ir::validate::{verify_graph, IntegrityError};
