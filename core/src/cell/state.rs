// tiercell/src/cell/state.rs

//! State shared between a cell and every task running on its scheduler.
//!
//! All of it is only touched from the cell's own thread (the caller's thread
//! while it drives the current-thread runtime), so the locks are never
//! contended. Guards are never held across an `.await`.

use crate::coordination::Coordinator;
use crate::core::identity::TierId;
use crate::error::{CellError, CellResult};
use crate::tier::Tier;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{event, Level};

struct CellState<T> {
  pending: usize,
  output: VecDeque<T>,
  error: Option<CellError>,
  closing: bool,
}

pub(crate) struct CellCore<T: Clone + Send + 'static> {
  cell_id: u64,
  coordinator: Arc<dyn Coordinator>,
  graph: RwLock<Vec<Arc<Tier<T>>>>,
  state: Mutex<CellState<T>>,
  tasks: Mutex<JoinSet<()>>,
  progress: Notify,
}

impl<T: Clone + Send + 'static> CellCore<T> {
  pub(crate) fn new(cell_id: u64, coordinator: Arc<dyn Coordinator>, graph: Vec<Arc<Tier<T>>>) -> Self {
    Self {
      cell_id,
      coordinator,
      graph: RwLock::new(graph),
      state: Mutex::new(CellState {
        pending: 0,
        output: VecDeque::new(),
        error: None,
        closing: false,
      }),
      tasks: Mutex::new(JoinSet::new()),
      progress: Notify::new(),
    }
  }

  pub(crate) fn cell_id(&self) -> u64 {
    self.cell_id
  }

  pub(crate) fn coordinator(&self) -> &Arc<dyn Coordinator> {
    &self.coordinator
  }

  pub(crate) fn tier(&self, id: TierId) -> CellResult<Arc<Tier<T>>> {
    self.graph.read().get(id.index).cloned().ok_or(CellError::Closed)
  }

  pub(crate) fn tiers(&self) -> Vec<Arc<Tier<T>>> {
    self.graph.read().clone()
  }

  /// Counts one more outstanding unit of work until the guard drops.
  pub(crate) fn begin_work(self: &Arc<Self>) -> CellResult<PendingGuard<T>> {
    let mut state = self.state.lock();
    if state.closing {
      return Err(CellError::Closed);
    }
    state.pending += 1;
    Ok(PendingGuard { core: Arc::clone(self) })
  }

  pub(crate) fn pending(&self) -> usize {
    self.state.lock().pending
  }

  pub(crate) fn spawn<F>(&self, fut: F) -> CellResult<()>
  where
    F: Future<Output = ()> + Send + 'static,
  {
    if self.state.lock().closing {
      return Err(CellError::Closed);
    }
    // Finished entries would otherwise pile up until the iterator reaps.
    self.reap();
    self.tasks.lock().spawn(fut);
    Ok(())
  }

  pub(crate) fn spawn_background<F, E>(self: &Arc<Self>, fut: F) -> CellResult<()>
  where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<anyhow::Error> + 'static,
  {
    let work = self.begin_work()?;
    let core = Arc::clone(self);
    self.spawn(async move {
      if let Err(err) = fut.await {
        core.capture(CellError::Background { source: err.into() });
      }
      drop(work);
    })
  }

  /// Records `err` unless an error is already waiting; the first one wins.
  pub(crate) fn capture(&self, err: CellError) {
    {
      let mut state = self.state.lock();
      if state.error.is_none() {
        event!(Level::DEBUG, cell = self.cell_id, error = %err, "Error captured.");
        state.error = Some(err);
      } else {
        event!(Level::WARN, cell = self.cell_id, error = %err, "Dropping error, another one is already pending.");
      }
    }
    self.progress.notify_one();
  }

  pub(crate) fn has_error(&self) -> bool {
    self.state.lock().error.is_some()
  }

  pub(crate) fn take_error(&self) -> Option<CellError> {
    self.state.lock().error.take()
  }

  pub(crate) fn push_output(&self, values: Vec<T>) {
    self.state.lock().output.extend(values);
    self.progress.notify_one();
  }

  pub(crate) fn next_output(&self) -> Option<T> {
    self.state.lock().output.pop_front()
  }

  /// Resolves once something happened that the iterator should look at:
  /// output, an error, or the pending count reaching zero.
  pub(crate) async fn progress(&self) {
    self.progress.notified().await;
  }

  /// Collects finished tasks, turning panics into captured errors.
  pub(crate) fn reap(&self) {
    loop {
      let joined = self.tasks.lock().try_join_next();
      match joined {
        Some(Ok(())) => {}
        Some(Err(err)) if err.is_panic() => self.capture(CellError::Panicked {
          message: panic_message(err.into_panic()),
        }),
        Some(Err(_)) => {}
        None => break,
      }
    }
  }

  /// Refuses new work and hands out every task still alive, aborted.
  pub(crate) fn cancel_all(&self) -> JoinSet<()> {
    self.state.lock().closing = true;
    let mut tasks = std::mem::take(&mut *self.tasks.lock());
    tasks.abort_all();
    tasks
  }

  /// Drops every tier, its job and its edges.
  pub(crate) fn release_graph(&self) {
    let graph = std::mem::take(&mut *self.graph.write());
    for tier in &graph {
      tier.close();
    }
    let mut state = self.state.lock();
    state.output.clear();
  }

  fn finish_work(&self) {
    let idle = {
      let mut state = self.state.lock();
      state.pending = state.pending.saturating_sub(1);
      state.pending == 0
    };
    if idle || std::thread::panicking() {
      self.progress.notify_one();
    }
  }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
  if let Some(msg) = payload.downcast_ref::<&str>() {
    (*msg).to_string()
  } else if let Some(msg) = payload.downcast_ref::<String>() {
    msg.clone()
  } else {
    "non-string panic payload".to_string()
  }
}

/// One unit of outstanding work. Dropping it, normally or because its task
/// was cancelled or panicked, releases the count exactly once.
pub(crate) struct PendingGuard<T: Clone + Send + 'static> {
  core: Arc<CellCore<T>>,
}

impl<T: Clone + Send + 'static> Drop for PendingGuard<T> {
  fn drop(&mut self) {
    self.core.finish_work();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::coordination::NoopCoordinator;

  #[test]
  fn test_spawn_drops_finished_tasks() {
    let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
    let core: CellCore<u32> = CellCore::new(1, Arc::new(NoopCoordinator), Vec::new());

    runtime.block_on(async {
      for _ in 0..100 {
        core.spawn(async {}).unwrap();
        tokio::task::yield_now().await;
      }
    });

    let kept = core.tasks.lock().len();
    assert!(kept < 10, "finished tasks were kept: {kept}");
    assert!(!core.has_error());
  }
}
