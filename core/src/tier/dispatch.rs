// tiercell/src/tier/dispatch.rs

//! Scheduling, execution and emission for frozen tiers.
//!
//! An invocation moves through `scheduled -> admitted -> running -> finished`:
//! [`enqueue`] takes the pending-work count and waits on the coordinator's
//! admission gate, then spawns [`execute`], which brackets the job body with the
//! coordinator's `start`/`finish` hooks. The pending count is released when the
//! invocation's [`PendingGuard`] drops, which also covers cancellation.

use crate::cell::state::{CellCore, PendingGuard};
use crate::core::identity::TierId;
use crate::core::route::Route;
use crate::core::spec::Buffer;
use crate::error::{CellError, CellResult};
use crate::tier::Tier;
use std::sync::Arc;
use tracing::{debug_span, event, Instrument, Level};

/// Schedules one invocation of `tier` with `data`.
pub(crate) async fn enqueue<T: Clone + Send + 'static>(
  core: &Arc<CellCore<T>>,
  tier: &Arc<Tier<T>>,
  source: Option<TierId>,
  data: Vec<T>,
) -> CellResult<()> {
  let work = core.begin_work()?;
  core.coordinator().enqueue(tier.info()).await?;

  event!(Level::TRACE, tier = %tier.name(), values = data.len(), "Invocation admitted.");
  let route = Route::new(source, Arc::clone(tier), Arc::clone(core));
  let span = debug_span!("tier_job", tier = %tier.name(), cell = core.cell_id());
  core.spawn(execute(Arc::clone(core), Arc::clone(tier), route, data, work).instrument(span))?;

  // Give the freshly scheduled task, and everything queued before it, a turn
  // before the emitting job continues.
  tokio::task::yield_now().await;
  Ok(())
}

async fn execute<T: Clone + Send + 'static>(
  core: Arc<CellCore<T>>,
  tier: Arc<Tier<T>>,
  route: Route<T>,
  data: Vec<T>,
  work: PendingGuard<T>,
) {
  let coordinator = Arc::clone(core.coordinator());
  let slot = match coordinator.start(tier.info()).await {
    Ok(slot) => slot,
    Err(err) => {
      core.capture(err);
      return;
    }
  };

  event!(Level::TRACE, "Job running.");
  let result = (tier.job)(route, data).await;
  coordinator.finish(tier.info(), slot).await;

  if let Err(err) = result {
    event!(Level::DEBUG, error = %err, "Job failed.");
    core.capture(CellError::job(tier.name(), err));
  }
  drop(work);
}

/// Forwards `values` from `tier` according to its buffering mode.
pub(crate) async fn emit<T: Clone + Send + 'static>(
  core: &Arc<CellCore<T>>,
  tier: &Arc<Tier<T>>,
  values: Vec<T>,
) -> CellResult<()> {
  match tier.buffering {
    Buffer::Off => forward(core, tier, values).await,
    Buffer::Fixed(capacity) => {
      if push_buffered(tier, values)? >= capacity {
        flush(core, tier).await
      } else {
        Ok(())
      }
    }
    Buffer::Unbounded => {
      push_buffered(tier, values)?;
      if core.coordinator().flush(tier.info()).await {
        flush(core, tier).await
      } else {
        Ok(())
      }
    }
  }
}

/// Swaps out the buffer and forwards its contents as one emission.
pub(crate) async fn flush<T: Clone + Send + 'static>(core: &Arc<CellCore<T>>, tier: &Arc<Tier<T>>) -> CellResult<()> {
  if !tier.buffering.is_buffered() {
    return Ok(());
  }
  let batch = {
    let mut state = tier.state.lock();
    if state.closed {
      return Err(CellError::Closed);
    }
    std::mem::take(&mut state.buffer)
  };
  if batch.is_empty() {
    return Ok(());
  }
  event!(Level::TRACE, tier = %tier.name(), values = batch.len(), "Buffer flushed.");
  forward(core, tier, batch).await
}

fn push_buffered<T: Clone + Send + 'static>(tier: &Tier<T>, values: Vec<T>) -> CellResult<usize> {
  let mut state = tier.state.lock();
  if state.closed {
    return Err(CellError::Closed);
  }
  state.buffer.extend(values);
  Ok(state.buffer.len())
}

async fn forward<T: Clone + Send + 'static>(
  core: &Arc<CellCore<T>>,
  tier: &Arc<Tier<T>>,
  values: Vec<T>,
) -> CellResult<()> {
  for target_id in &tier.targets {
    let target = core.tier(*target_id)?;
    enqueue(core, &target, Some(tier.id()), values.clone()).await?;
  }
  Ok(())
}
