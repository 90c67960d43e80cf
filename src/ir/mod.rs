//! The memory IR.
//!
//! # Core Components
//!
//! - **Arena** (`arena.rs`): typed-ID storage for nodes and side tables
//! - **Location** (`location.rs`): symbolic memory location identities
//! - **Node** (`node.rs`): node representation and usage kinds
//! - **Memory** (`memory.rs`): access/write payloads and capability traits
//! - **Graph** (`graph.rs`): the edge substrate with reverse usage tracking
//! - **Validate** (`validate.rs`): structural-integrity checking
//!
//! # Design Principles
//!
//! - **Arena allocation**: nodes are indices, never pointers, so rewiring a
//!   chain link can't dangle
//! - **Centralized edge bookkeeping**: every input mutation goes through one
//!   `update_usages` operation on the graph
//! - **Capabilities as traits**: a node is simultaneously a memory access, a
//!   state split, and a guard by implementing independent traits, checked by
//!   one validator instead of scattered virtual dispatch

pub mod arena;
pub mod graph;
pub mod location;
pub mod memory;
pub mod node;
pub mod validate;

pub use arena::{Arena, BitSet, Id, SecondaryMap};
pub use graph::{Graph, GraphId, NodeHandle, Usage};
pub use location::{ClassId, ElementKind, FieldId, LocationIdentity};
pub use memory::{AccessData, BarrierType, Guarding, MemoryAccess, StateSplit, WriteData};
pub use node::{
    AddressData, FrameStateData, GuardData, GuardKind, InputKind, Node, NodeFlags, NodeId, NodeOp,
    Stamp,
};
