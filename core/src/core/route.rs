// tiercell/src/core/route.rs

//! The per-invocation context record handed to every job.

use crate::cell::state::CellCore;
use crate::core::identity::{TierId, TierInfo};
use crate::core::spec::TierSpec;
use crate::error::CellResult;
use crate::tier::{dispatch, Tier};
use std::future::Future;
use std::sync::Arc;

/// Immutable bundle of "who triggered me, where do I live, how do I emit".
///
/// A fresh `Route` is built for every job invocation and dropped when the job
/// finishes. Cloning it is cheap (two `Arc`s and a handle).
pub struct Route<T: Clone + Send + 'static> {
  source: Option<TierId>,
  tier: Arc<Tier<T>>,
  core: Arc<CellCore<T>>,
}

impl<T: Clone + Send + 'static> Route<T> {
  pub(crate) fn new(source: Option<TierId>, tier: Arc<Tier<T>>, core: Arc<CellCore<T>>) -> Self {
    Self { source, tier, core }
  }

  /// The upstream tier whose emission triggered this invocation, `None` for a
  /// root invocation.
  pub fn source(&self) -> Option<TierId> {
    self.source
  }

  /// The tier this invocation belongs to.
  pub fn tier(&self) -> &TierInfo {
    self.tier.info()
  }

  pub fn spec(&self) -> &TierSpec {
    &self.tier.info().spec
  }

  pub fn cell_id(&self) -> u64 {
    self.core.cell_id()
  }

  /// Forwards one value to every destination tier.
  ///
  /// Unbuffered tiers wait here until each destination has admitted the new
  /// invocation, so a slow coordinator gate back-pressures the emitting job.
  pub async fn emit(&self, value: T) -> CellResult<()> {
    dispatch::emit(&self.core, &self.tier, vec![value]).await
  }

  /// Forwards several values as a single emission: destinations of an
  /// unbuffered tier are invoked once with all of them.
  pub async fn emit_many(&self, values: Vec<T>) -> CellResult<()> {
    if values.is_empty() {
      return Ok(());
    }
    dispatch::emit(&self.core, &self.tier, values).await
  }

  /// Forwards whatever this tier has buffered so far. No-op when unbuffered.
  pub async fn flush(&self) -> CellResult<()> {
    dispatch::flush(&self.core, &self.tier).await
  }

  /// Runs `fut` on the cell's scheduler outside the tier graph.
  ///
  /// The task counts as outstanding work, is cancelled when the cell is
  /// abandoned or closed, and an error it returns is reported like a job
  /// error.
  pub fn spawn<F, E>(&self, fut: F) -> CellResult<()>
  where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<anyhow::Error> + 'static,
  {
    self.core.spawn_background(fut)
  }

  pub(crate) fn deliver(&self, values: Vec<T>) {
    self.core.push_output(values);
  }
}

impl<T: Clone + Send + 'static> Clone for Route<T> {
  fn clone(&self) -> Self {
    Self {
      source: self.source,
      tier: Arc::clone(&self.tier),
      core: Arc::clone(&self.core),
    }
  }
}

impl<T: Clone + Send + 'static> std::fmt::Debug for Route<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Route")
      .field("source", &self.source)
      .field("tier", self.tier.info())
      .finish()
  }
}
