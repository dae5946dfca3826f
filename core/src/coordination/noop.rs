// tiercell/src/coordination/noop.rs

use crate::coordination::Coordinator;
use crate::core::identity::TierInfo;
use async_trait::async_trait;

pub(crate) const NAME: &str = "noop";

/// Nothing is gated or delayed. Unbounded buffers flush on every emission.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCoordinator;

#[async_trait]
impl Coordinator for NoopCoordinator {
  fn name(&self) -> &str {
    NAME
  }

  async fn flush(&self, _tier: &TierInfo) -> bool {
    true
  }
}
