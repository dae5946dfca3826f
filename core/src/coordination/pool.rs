// tiercell/src/coordination/pool.rs

//! Treats every tier with a `pool_size` as a pooled resource: at most that many
//! invocations of the tier run their job body at once.

use crate::coordination::{Coordinator, Slot};
use crate::core::identity::{TierId, TierInfo};
use crate::error::{CellError, CellResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{event, Level};

pub(crate) const NAME: &str = "pool";

#[derive(Debug, Default)]
pub struct PoolCoordinator {
  default_size: Option<usize>,
  pools: Mutex<HashMap<TierId, Arc<Semaphore>>>,
}

impl PoolCoordinator {
  /// Tiers without a `pool_size` run unbounded.
  pub fn new() -> Self {
    Self::default()
  }

  /// Tiers without a `pool_size` get `size` slots. A zero size is rejected at
  /// setup.
  pub fn with_default_size(size: usize) -> Self {
    Self {
      default_size: Some(size),
      pools: Mutex::new(HashMap::new()),
    }
  }

  /// Free slots for a pooled tier, `None` if the tier is not pooled.
  pub fn available(&self, tier: TierId) -> Option<usize> {
    self.pools.lock().get(&tier).map(|sem| sem.available_permits())
  }

  fn pool_for(&self, tier: TierId) -> Option<Arc<Semaphore>> {
    self.pools.lock().get(&tier).cloned()
  }
}

#[async_trait]
impl Coordinator for PoolCoordinator {
  fn name(&self) -> &str {
    NAME
  }

  fn setup(&self, tiers: &[TierInfo]) -> CellResult<()> {
    let mut pools = HashMap::new();
    for tier in tiers {
      let size = match tier.spec.pool_size.or(self.default_size) {
        None => continue,
        Some(0) => {
          return Err(CellError::Configuration {
            tier: tier.name.clone(),
            message: "pool size of 0 is invalid".to_string(),
          })
        }
        Some(size) if size > Semaphore::MAX_PERMITS => {
          return Err(CellError::Configuration {
            tier: tier.name.clone(),
            message: format!("pool size of {size} exceeds the limit of {}", Semaphore::MAX_PERMITS),
          })
        }
        Some(size) => size,
      };
      event!(Level::DEBUG, tier = %tier.name, size, "Pool created.");
      pools.insert(tier.id, Arc::new(Semaphore::new(size)));
    }
    *self.pools.lock() = pools;
    Ok(())
  }

  fn close(&self) {
    let mut pools = self.pools.lock();
    for sem in pools.values() {
      sem.close();
    }
    pools.clear();
  }

  fn reset(&self) {
    self.pools.lock().clear();
  }

  async fn start(&self, tier: &TierInfo) -> CellResult<Slot> {
    let Some(sem) = self.pool_for(tier.id) else {
      return Ok(Slot::free());
    };
    let permit = sem.acquire_owned().await.map_err(|_| CellError::Closed)?;
    Ok(Slot::held(permit))
  }

  async fn finish(&self, _tier: &TierInfo, slot: Slot) {
    // Dropping the permit hands the slot to the next waiter.
    drop(slot);
  }
}
