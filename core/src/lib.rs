// src/lib.rs

//! Tiercell: concurrent tiered pipelines behind a plain iterator.
//!
//! A [`Cell`] is a directed acyclic graph of *tiers*. Each tier wraps an async
//! job; a job receives the values emitted upstream and may emit any number of
//! values downstream through its [`Route`]. Tiers without destinations feed
//! the cell's output, which the caller consumes synchronously:
//!  - Root tiers run once when iteration starts.
//!  - Every emission schedules one invocation of each destination tier.
//!  - Tiers may buffer their emissions and forward them in batches.
//!  - `add_gather` joins the outputs of several tiers by key.
//!  - A pluggable [`Coordinator`] gates, throttles and flushes invocations
//!    without changing the graph (see [`PoolCoordinator`]).
//!  - The first job error is yielded by the iterator, after the cleanup
//!    callbacks ran.
//!
//! ```no_run
//! use tiercell::{Cell, CellResult, Route, Sources, TierSpec};
//!
//! # fn main() -> CellResult<()> {
//! let mut cell: Cell<u64> = Cell::new();
//! let numbers = cell.add_tier("numbers", Sources::none(), TierSpec::new(), |route: Route<u64>, _| async move {
//!   for n in 0..10 {
//!     route.emit(n).await?;
//!   }
//!   Ok::<_, tiercell::CellError>(())
//! })?;
//! cell.add_tier("square", numbers, TierSpec::new(), |route: Route<u64>, values: Vec<u64>| async move {
//!   for n in values {
//!     route.emit(n * n).await?;
//!   }
//!   Ok::<_, tiercell::CellError>(())
//! })?;
//!
//! let squares = cell.output()?.collect::<CellResult<Vec<_>>>()?;
//! assert_eq!(squares.len(), 10);
//! # Ok(())
//! # }
//! ```

pub mod cell;
pub mod coordination;
pub mod core;
pub mod error;
pub mod tier;

// --- Re-exports for the Public API ---

pub use crate::cell::{Cell, IntoOutput, Output, OUTPUT_TIER};
pub use crate::core::{Buffer, BoxFuture, Cleaner, Job, Route, SourceRef, Sources, TierId, TierInfo, TierSpec};

pub use crate::coordination::{Coordinator, CoordinatorKind, NoopCoordinator, PoolCoordinator, Slot};

pub use crate::error::{CellError, CellResult};
