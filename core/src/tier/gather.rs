// tiercell/src/tier/gather.rs

//! The join operator behind [`Cell::add_gather`](crate::Cell::add_gather).
//!
//! A gather tier is sourced by N tiers. Every value it receives is filed under
//! `key_fn(&value)` in the slot of the tier that emitted it; once all N slots
//! of a key are filled the group is removed and emitted downstream as one
//! emission, values ordered like the sources were listed.

use crate::core::identity::TierId;
use crate::core::job::Job;
use crate::core::route::Route;
use crate::error::CellError;
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tracing::{event, Level};

struct SlotTaken;

struct Groups<K, T> {
  tier: String,
  width: usize,
  open: Mutex<HashMap<K, Vec<Option<T>>>>,
}

impl<K: Hash + Eq, T> Groups<K, T> {
  fn new(tier: String, width: usize) -> Self {
    Self {
      tier,
      width,
      open: Mutex::new(HashMap::new()),
    }
  }

  /// Files `value` under `key` in `slot`. Returns the full group once the
  /// last slot is filled.
  fn offer(&self, key: K, slot: usize, value: T) -> Result<Option<Vec<T>>, SlotTaken> {
    let mut open = self.open.lock();
    match open.entry(key) {
      Entry::Occupied(mut entry) => {
        let group = entry.get_mut();
        if group[slot].is_some() {
          return Err(SlotTaken);
        }
        group[slot] = Some(value);
        if group.iter().all(Option::is_some) {
          Ok(Some(entry.remove().into_iter().flatten().collect()))
        } else {
          Ok(None)
        }
      }
      Entry::Vacant(entry) => {
        if self.width == 1 {
          return Ok(Some(vec![value]));
        }
        let mut group: Vec<Option<T>> = (0..self.width).map(|_| None).collect();
        group[slot] = Some(value);
        entry.insert(group);
        Ok(None)
      }
    }
  }
}

impl<K, T> Drop for Groups<K, T> {
  fn drop(&mut self) {
    let unfinished = self.open.get_mut().len();
    if unfinished > 0 {
      event!(Level::DEBUG, tier = %self.tier, unfinished, "Dropping incomplete gather groups.");
    }
  }
}

/// Builds the job of a gather tier fed by `sources` (id and name, in order).
pub(crate) fn gather_job<T, K, F>(tier_name: String, sources: Vec<(TierId, String)>, key_fn: F) -> Job<T>
where
  T: Clone + Send + 'static,
  K: Hash + Eq + Send + 'static,
  F: Fn(&T) -> K + Send + Sync + 'static,
{
  let groups = Arc::new(Groups::<K, T>::new(tier_name, sources.len()));
  let sources = Arc::new(sources);
  let key_fn = Arc::new(key_fn);

  Box::new(move |route: Route<T>, data: Vec<T>| {
    let groups = Arc::clone(&groups);
    let sources = Arc::clone(&sources);
    let key_fn = Arc::clone(&key_fn);
    Box::pin(async move {
      let slot = route
        .source()
        .and_then(|source| sources.iter().position(|(id, _)| *id == source))
        .ok_or_else(|| CellError::Internal(format!("gather tier '{}' invoked by a tier it does not gather", groups.tier)))?;

      for value in data {
        let key = key_fn(&value);
        let complete = groups.offer(key, slot, value).map_err(|SlotTaken| CellError::GatherConflict {
          tier: groups.tier.clone(),
          source_tier: sources[slot].1.clone(),
        })?;
        if let Some(group) = complete {
          route.emit_many(group).await?;
        }
      }
      Ok::<(), anyhow::Error>(())
    })
  })
}
