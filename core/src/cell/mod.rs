// tiercell/src/cell/mod.rs

//! The cell: graph assembly, the shared scheduler state, and the blocking
//! iterator that drives it.

pub mod definition;
pub mod execution;
pub(crate) mod state;

pub use definition::{Cell, OUTPUT_TIER};
pub use execution::{IntoOutput, Output};
