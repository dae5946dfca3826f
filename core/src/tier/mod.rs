// tiercell/src/tier/mod.rs

//! A tier is one node of the cell's DAG. It wraps a job, knows which tiers it
//! feeds, and optionally buffers its emissions.
//!
//! Tiers are built while the cell is being assembled, then frozen into `Arc`s
//! when the cell is finalized. Edges are stored as [`TierId`]s into the cell's
//! arena, never as references, so tearing down a cell is just clearing it.

pub mod definition;
pub(crate) mod dispatch;
pub(crate) mod gather;

pub(crate) use definition::Tier;
