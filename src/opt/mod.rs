//! Optimization passes over the memory graph.
//!
//! # Passes
//!
//! - **Chain** (`chain.rs`): conservative memory-chain threading, then
//!   alias-driven chain shortening
//! - **Read elimination** (`read_elim.rs`): forwards stored values to
//!   redundant reads
//!
//! Passes mutate the graph in place through the substrate's setters, so the
//! usage index stays consistent without any pass-local bookkeeping.

pub mod chain;
pub mod read_elim;

use crate::ir::graph::Graph;

/// A graph transformation. `run` returns whether anything changed, which
/// drives fixed-point iteration in the surrounding pipeline.
pub trait Pass {
    /// Pass name for logs and statistics.
    fn name(&self) -> &'static str;

    /// Run the pass once.
    fn run(&mut self, graph: &mut Graph) -> bool;
}

pub use chain::{thread_memory_chain, ChainShortening};
pub use read_elim::ReadElimination;
