// tiercell/src/coordination/mod.rs

//! Coordinators are the pluggable policy of a cell. They decide when a new
//! invocation is admitted, when it may start, and when a buffering tier should
//! flush. The graph never changes with the policy: the same cell can run
//! unthrottled or pool-bounded by swapping the coordinator.

pub mod noop;
pub mod pool;

pub use noop::NoopCoordinator;
pub use pool::PoolCoordinator;

use crate::core::identity::TierInfo;
use crate::error::{CellError, CellResult};
use async_trait::async_trait;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::OwnedSemaphorePermit;

/// Whatever a coordinator reserved in `start`, returned to it in `finish`.
///
/// Dropping a slot releases what it holds, so an invocation cancelled between
/// `start` and `finish` cannot leak a concurrency permit.
#[derive(Debug, Default)]
pub struct Slot {
  permit: Option<OwnedSemaphorePermit>,
}

impl Slot {
  /// A slot that holds nothing.
  pub fn free() -> Self {
    Self { permit: None }
  }

  pub fn held(permit: OwnedSemaphorePermit) -> Self {
    Self { permit: Some(permit) }
  }

  pub fn is_held(&self) -> bool {
    self.permit.is_some()
  }
}

/// Lifecycle and throttle hooks around every job invocation of a cell.
///
/// `setup`, `close` and `reset` run on the caller's thread; the async hooks run
/// on the cell's scheduler and may suspend to apply back-pressure.
#[async_trait]
pub trait Coordinator: Send + Sync {
  fn name(&self) -> &str;

  /// Runs once at finalize with every tier of the frozen graph, including the
  /// implicit output tier.
  fn setup(&self, _tiers: &[TierInfo]) -> CellResult<()> {
    Ok(())
  }

  /// Releases policy state when the cell closes.
  fn close(&self) {}

  /// Restores policy state so the coordinator can be set up again.
  fn reset(&self) {
    self.close()
  }

  /// Called before an invocation is scheduled. Suspending here blocks the
  /// emitting job.
  async fn enqueue(&self, _tier: &TierInfo) -> CellResult<()> {
    Ok(())
  }

  /// Called right before the job body runs.
  async fn start(&self, _tier: &TierInfo) -> CellResult<Slot> {
    Ok(Slot::free())
  }

  /// Called right after the job body returned, with the slot from `start`.
  async fn finish(&self, _tier: &TierInfo, slot: Slot) {
    drop(slot);
  }

  /// Asked by a tier with an unbounded buffer after each emission.
  async fn flush(&self, _tier: &TierInfo) -> bool {
    false
  }
}

/// The reference policies, addressable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorKind {
  Noop,
  Pool,
}

impl CoordinatorKind {
  pub fn build(self) -> Arc<dyn Coordinator> {
    match self {
      CoordinatorKind::Noop => Arc::new(NoopCoordinator),
      CoordinatorKind::Pool => Arc::new(PoolCoordinator::new()),
    }
  }
}

impl FromStr for CoordinatorKind {
  type Err = CellError;

  fn from_str(name: &str) -> Result<Self, Self::Err> {
    match name {
      noop::NAME => Ok(CoordinatorKind::Noop),
      pool::NAME => Ok(CoordinatorKind::Pool),
      other => Err(CellError::UnknownCoordinator { name: other.to_string() }),
    }
  }
}
