// tiercell/src/cell/execution.rs

//! The synchronous pull interface of a cell and its teardown.
//!
//! Every pull first hands out results that are already queued. When none are,
//! it runs the cell's scheduler until a job delivers output, an error is
//! captured, or the pending-work count drops to zero. At zero, tiers that still
//! hold buffered values are flushed; iteration ends only when a pass flushes
//! nothing and no output is left. Teardown then cancels whatever is still
//! scheduled, runs the cleanup callbacks and closes the cell.

use crate::cell::definition::{Cell, Phase};
use crate::cell::state::CellCore;
use crate::error::{CellError, CellResult};
use crate::tier::dispatch;
use std::future::Future;
use std::iter::FusedIterator;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{event, instrument, Level};

impl<T: Clone + Send + 'static> Cell<T> {
  /// Finalizes the cell if needed, starts every root tier and returns the
  /// result iterator.
  ///
  /// A cell runs once: calling this again fails with
  /// [`CellError::AlreadyFinalized`]. Dropping the iterator before it is
  /// exhausted cancels outstanding work, runs the cleanup callbacks and closes
  /// the cell.
  #[instrument(name = "Cell::output", skip_all, fields(cell = self.id), err(Display))]
  pub fn output(&mut self) -> CellResult<Output<'_, T>> {
    let cell = self;
    cell.start()?;
    Ok(Output { cell })
  }

  /// Tears the cell down. Idempotent.
  ///
  /// Outstanding work is cancelled first. If the cell was finalized, cleanup
  /// callbacks that have not run yet run now; the first one to fail is
  /// returned. Then the coordinator is closed and every tier is released.
  #[instrument(name = "Cell::close", skip_all, fields(cell = self.id))]
  pub fn close(&mut self) -> CellResult<()> {
    if self.closed {
      return Ok(());
    }
    if self.phase == Phase::Running {
      self.interrupted = true;
    }
    if self.finalized {
      self.wind_down()
    } else {
      self.release();
      Ok(())
    }
  }

  pub(crate) fn start(&mut self) -> CellResult<()> {
    if self.phase != Phase::Building {
      return Err(CellError::AlreadyFinalized);
    }
    if self.closed {
      return Err(CellError::Closed);
    }
    if !self.finalized {
      self.finalize()?;
    }
    let core = self.core()?;
    let roots = self.roots.clone();
    event!(Level::DEBUG, cell = self.id, roots = roots.len(), "Starting root tiers.");
    let started = self.block_on(async {
      for root in roots {
        let tier = core.tier(root)?;
        dispatch::enqueue(&core, &tier, None, Vec::new()).await?;
      }
      Ok::<(), CellError>(())
    })?;
    self.phase = Phase::Running;
    if let Err(err) = started {
      core.capture(err);
    }
    Ok(())
  }

  pub(crate) fn pull(&mut self) -> Option<CellResult<T>> {
    if self.phase != Phase::Running {
      return None;
    }
    let core = self.core.clone()?;
    loop {
      if let Some(value) = core.next_output() {
        return Some(Ok(value));
      }

      core.reap();
      if let Some(err) = core.take_error() {
        event!(Level::DEBUG, cell = self.id, error = %err, "Surfacing captured error.");
        if let Err(cleanup_err) = self.wind_down() {
          event!(Level::WARN, cell = self.id, error = %cleanup_err, "Cleanup failed after an earlier error.");
        }
        return Some(Err(err));
      }

      if core.pending() > 0 {
        if let Err(err) = self.block_on(core.progress()) {
          return Some(Err(err));
        }
        continue;
      }

      match self.flush_stragglers(&core) {
        Ok(true) => continue,
        Ok(false) => {}
        Err(err) => {
          core.capture(err);
          continue;
        }
      }

      // A task that panicked after releasing its pending count is only
      // visible once reaped.
      core.reap();
      if core.has_error() {
        continue;
      }

      event!(Level::DEBUG, cell = self.id, "Cell drained.");
      return self.wind_down().err().map(Err);
    }
  }

  /// Flushes every tier that went quiet with values still buffered.
  fn flush_stragglers(&self, core: &Arc<CellCore<T>>) -> CellResult<bool> {
    let buffered: Vec<_> = core.tiers().into_iter().filter(|tier| tier.has_buffered()).collect();
    if buffered.is_empty() {
      return Ok(false);
    }
    event!(Level::TRACE, cell = self.id, tiers = buffered.len(), "Flushing leftover buffers.");
    self.block_on(async {
      for tier in &buffered {
        dispatch::flush(core, tier).await?;
      }
      Ok::<bool, CellError>(true)
    })?
  }

  /// Stops iteration early on behalf of a dropped iterator.
  pub(crate) fn abandon(&mut self) {
    if self.phase != Phase::Running {
      return;
    }
    self.interrupted = true;
    event!(Level::DEBUG, cell = self.id, pending = self.pending(), "Iteration abandoned.");
    if let Err(err) = self.wind_down() {
      event!(Level::WARN, cell = self.id, error = %err, "Cleanup failed after iteration was abandoned.");
    }
  }

  pub(crate) fn wind_down(&mut self) -> CellResult<()> {
    if self.phase == Phase::Drained {
      return Ok(());
    }
    self.phase = Phase::Drained;
    self.cancel_outstanding();
    let cleanup = self.run_cleaners();
    self.release();
    cleanup
  }

  fn cancel_outstanding(&mut self) {
    let (Some(core), Some(runtime)) = (&self.core, &self.runtime) else {
      return;
    };
    let mut tasks = core.cancel_all();
    if tasks.is_empty() {
      return;
    }
    event!(Level::DEBUG, cell = self.id, tasks = tasks.len(), "Cancelling outstanding tasks.");
    runtime.block_on(async { while tasks.join_next().await.is_some() {} });
  }

  fn run_cleaners(&mut self) -> CellResult<()> {
    let cleaners = std::mem::take(&mut self.cleaners);
    if cleaners.is_empty() {
      return Ok(());
    }
    let Some(runtime) = &self.runtime else {
      return Ok(());
    };
    event!(Level::DEBUG, cell = self.id, cleaners = cleaners.len(), "Running cleanup jobs.");
    runtime.block_on(async move {
      let mut set = JoinSet::new();
      for cleaner in cleaners {
        set.spawn(cleaner());
      }
      let mut first = None;
      while let Some(joined) = set.join_next().await {
        let err = match joined {
          Ok(Ok(())) => continue,
          Ok(Err(source)) => CellError::Cleanup { source },
          Err(join_err) => CellError::Panicked {
            message: join_err.to_string(),
          },
        };
        if first.is_none() {
          first = Some(err);
        } else {
          event!(Level::WARN, error = %err, "Dropping cleanup error, another one is already pending.");
        }
      }
      first.map_or(Ok(()), Err)
    })
  }

  /// Closes the coordinator and drops the scheduler, the tiers and every
  /// callback. Nothing of the graph survives this.
  fn release(&mut self) {
    if self.closed {
      return;
    }
    self.closed = true;
    if let Some(core) = self.core.take() {
      // Only reachable without a prior cancel when finalize succeeded but
      // iteration never started.
      let _ = core.cancel_all();
      core.release_graph();
    }
    if self.finalized {
      self.coordinator.close();
    }
    self.runtime = None;
    self.tiers.clear();
    self.cleaners.clear();
    self.roots.clear();
    event!(Level::DEBUG, cell = self.id, interrupted = self.interrupted, "Cell closed.");
  }

  fn core(&self) -> CellResult<Arc<CellCore<T>>> {
    self.core.clone().ok_or(CellError::Closed)
  }

  fn block_on<F: Future>(&self, fut: F) -> CellResult<F::Output> {
    let runtime = self.runtime.as_ref().ok_or(CellError::Closed)?;
    Ok(runtime.block_on(fut))
  }
}

impl<T: Clone + Send + 'static> Drop for Cell<T> {
  fn drop(&mut self) {
    if let Err(err) = self.close() {
      event!(Level::WARN, cell = self.id, error = %err, "Cleanup failed while dropping cell.");
    }
  }
}

/// Borrowing result iterator returned by [`Cell::output`].
///
/// Yields `Ok(value)` for every value delivered by a leaf tier and at most one
/// `Err`: the first error captured during the run, after which it is fused.
pub struct Output<'a, T: Clone + Send + 'static> {
  cell: &'a mut Cell<T>,
}

impl<T: Clone + Send + 'static> Output<'_, T> {
  /// Outstanding job invocations and background tasks.
  pub fn pending(&self) -> usize {
    self.cell.pending()
  }
}

impl<T: Clone + Send + 'static> Iterator for Output<'_, T> {
  type Item = CellResult<T>;

  fn next(&mut self) -> Option<Self::Item> {
    self.cell.pull()
  }
}

impl<T: Clone + Send + 'static> FusedIterator for Output<'_, T> {}

impl<T: Clone + Send + 'static> Drop for Output<'_, T> {
  fn drop(&mut self) {
    self.cell.abandon();
  }
}

/// Owning result iterator, `Cell::into_iter()`.
///
/// A failure to start the cell (for example a coordinator rejecting its
/// configuration) is yielded as the first item.
pub struct IntoOutput<T: Clone + Send + 'static> {
  cell: Cell<T>,
  startup: Option<CellError>,
}

impl<T: Clone + Send + 'static> IntoOutput<T> {
  pub fn cell(&self) -> &Cell<T> {
    &self.cell
  }
}

impl<T: Clone + Send + 'static> Iterator for IntoOutput<T> {
  type Item = CellResult<T>;

  fn next(&mut self) -> Option<Self::Item> {
    if let Some(err) = self.startup.take() {
      return Some(Err(err));
    }
    self.cell.pull()
  }
}

impl<T: Clone + Send + 'static> FusedIterator for IntoOutput<T> {}

impl<T: Clone + Send + 'static> IntoIterator for Cell<T> {
  type Item = CellResult<T>;
  type IntoIter = IntoOutput<T>;

  fn into_iter(mut self) -> Self::IntoIter {
    let startup = self.start().err();
    IntoOutput { cell: self, startup }
  }
}
