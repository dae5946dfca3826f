// tiercell/src/tier/definition.rs

use crate::core::identity::{TierId, TierInfo};
use crate::core::job::Job;
use crate::core::spec::{Buffer, TierSpec};
use parking_lot::Mutex;

pub(crate) struct TierState<T> {
  pub(crate) buffer: Vec<T>,
  pub(crate) closed: bool,
}

pub(crate) struct Tier<T: Clone + Send + 'static> {
  info: TierInfo,
  pub(crate) job: Job<T>,
  pub(crate) targets: Vec<TierId>,
  pub(crate) source_count: usize,
  pub(crate) buffering: Buffer,
  pub(crate) state: Mutex<TierState<T>>,
}

impl<T: Clone + Send + 'static> Tier<T> {
  pub(crate) fn new(id: TierId, name: String, spec: TierSpec, job: Job<T>) -> Self {
    let buffering = spec.buffer.normalized();
    Self {
      info: TierInfo::new(id, name, spec),
      job,
      targets: Vec::new(),
      source_count: 0,
      buffering,
      state: Mutex::new(TierState {
        buffer: Vec::new(),
        closed: false,
      }),
    }
  }

  pub(crate) fn info(&self) -> &TierInfo {
    &self.info
  }

  pub(crate) fn id(&self) -> TierId {
    self.info.id
  }

  pub(crate) fn name(&self) -> &str {
    &self.info.name
  }

  pub(crate) fn target_count(&self) -> usize {
    self.targets.len()
  }

  /// Adds `target` to the tiers fed by this one. Only valid while the cell is
  /// still being assembled.
  pub(crate) fn add_target(&mut self, target: TierId) {
    self.targets.push(target);
  }

  pub(crate) fn has_buffered(&self) -> bool {
    let state = self.state.lock();
    !state.closed && !state.buffer.is_empty()
  }

  /// Drops buffered values and marks the tier unusable.
  pub(crate) fn close(&self) {
    let mut state = self.state.lock();
    state.closed = true;
    state.buffer.clear();
  }
}

impl<T: Clone + Send + 'static> std::fmt::Debug for Tier<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Tier")
      .field("id", &self.info.id)
      .field("name", &self.info.name)
      .field("sources", &self.source_count)
      .field("targets", &self.targets.len())
      .field("buffering", &self.buffering)
      .field("closed", &self.state.lock().closed)
      .finish()
  }
}
