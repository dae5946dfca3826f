// tiercell/src/cell/definition.rs

//! Contains the `Cell<T>` struct and the methods that assemble its tier graph.

use crate::cell::state::CellCore;
use crate::coordination::{Coordinator, CoordinatorKind, NoopCoordinator};
use crate::core::identity::{TierId, TierInfo};
use crate::core::job::{boxed_cleaner, boxed_job, Cleaner, Job, SourceRef, Sources};
use crate::core::route::Route;
use crate::core::spec::TierSpec;
use crate::error::{CellError, CellResult};
use crate::tier::gather::gather_job;
use crate::tier::Tier;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::{event, instrument, Level};

/// Name of the tier every leaf feeds; its job delivers values to the caller.
pub const OUTPUT_TIER: &str = "<output>";

static NEXT_CELL_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
  Building,
  Running,
  Drained,
}

/// One pipeline instance: a DAG of tiers plus the scheduler that runs them.
///
/// A cell is assembled with [`add_tier`](Cell::add_tier) and friends, then
/// consumed once through [`output`](Cell::output) or `into_iter()`. Iterating
/// drives the cell's own current-thread tokio runtime until the next result is
/// ready, so the caller stays in plain blocking code while jobs run
/// concurrently.
///
/// The synchronous interface must not be used from inside another tokio
/// runtime: tokio refuses to nest `block_on`. Move the cell to a dedicated
/// thread (or `spawn_blocking`) in that case.
pub struct Cell<T: Clone + Send + 'static> {
  pub(crate) id: u64,
  pub(crate) tiers: Vec<Tier<T>>,
  names: HashMap<String, TierId>,
  pub(crate) cleaners: Vec<Cleaner>,
  pub(crate) coordinator: Arc<dyn Coordinator>,
  pub(crate) roots: Vec<TierId>,
  pub(crate) runtime: Option<Runtime>,
  pub(crate) core: Option<Arc<CellCore<T>>>,
  pub(crate) phase: Phase,
  pub(crate) finalized: bool,
  pub(crate) interrupted: bool,
  pub(crate) closed: bool,
}

impl<T: Clone + Send + 'static> Cell<T> {
  /// Creates an empty cell with the no-op coordinator.
  pub fn new() -> Self {
    Self::with_coordinator(Arc::new(NoopCoordinator))
  }

  pub fn with_coordinator(coordinator: Arc<dyn Coordinator>) -> Self {
    let id = NEXT_CELL_ID.fetch_add(1, Ordering::Relaxed);
    event!(Level::DEBUG, cell = id, coordinator = coordinator.name(), "Cell created.");
    Self {
      id,
      tiers: Vec::new(),
      names: HashMap::new(),
      cleaners: Vec::new(),
      coordinator,
      roots: Vec::new(),
      runtime: None,
      core: None,
      phase: Phase::Building,
      finalized: false,
      interrupted: false,
      closed: false,
    }
  }

  /// Creates a cell with one of the reference coordinators, `"noop"` or
  /// `"pool"`.
  pub fn with_coordinator_name(name: &str) -> CellResult<Self> {
    let kind: CoordinatorKind = name.parse()?;
    Ok(Self::with_coordinator(kind.build()))
  }

  pub fn id(&self) -> u64 {
    self.id
  }

  pub fn is_finalized(&self) -> bool {
    self.finalized
  }

  pub fn is_closed(&self) -> bool {
    self.closed
  }

  /// True once the caller stopped iterating before the cell drained.
  pub fn is_interrupted(&self) -> bool {
    self.interrupted
  }

  /// Outstanding job invocations and background tasks.
  pub fn pending(&self) -> usize {
    self.core.as_ref().map_or(0, |core| core.pending())
  }

  /// Number of registered tiers, including generated gather tiers and, once
  /// finalized, the output tier.
  pub fn tier_count(&self) -> usize {
    match &self.core {
      Some(core) => core.tiers().len(),
      None => self.tiers.len(),
    }
  }

  /// Looks up a tier by name.
  pub fn tier(&self, name: &str) -> Option<TierId> {
    self.names.get(name).copied()
  }

  /// Describes a tier that has not been released yet.
  pub fn tier_info(&self, id: TierId) -> Option<TierInfo> {
    if id.cell != self.id {
      return None;
    }
    match &self.core {
      Some(core) => core.tier(id).ok().map(|tier| tier.info().clone()),
      None => self.tiers.get(id.index).map(|tier| tier.info().clone()),
    }
  }

  fn ensure_not_finalized(&self) -> CellResult<()> {
    if self.finalized {
      return Err(CellError::AlreadyFinalized);
    }
    Ok(())
  }

  fn resolve(&self, source: &SourceRef) -> CellResult<TierId> {
    match source {
      SourceRef::Id(id) if id.cell == self.id && id.index < self.tiers.len() => Ok(*id),
      SourceRef::Id(id) => Err(CellError::UnknownSource { name: id.to_string() }),
      SourceRef::Name(name) => self
        .names
        .get(name)
        .copied()
        .ok_or_else(|| CellError::UnknownSource { name: name.clone() }),
    }
  }

  /// Registers a job as a new tier fed by `sources` (one edge per entry).
  ///
  /// The job receives the invocation's [`Route`] and the values of the
  /// emission that triggered it; a tier without sources is a root and runs
  /// once, with no values, when iteration starts.
  pub fn add_tier<F, Fut, E>(
    &mut self,
    name: &str,
    sources: impl Into<Sources>,
    spec: TierSpec,
    job_fn: F,
  ) -> CellResult<TierId>
  where
    F: Fn(Route<T>, Vec<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<anyhow::Error> + 'static,
  {
    self.ensure_not_finalized()?;
    if name == OUTPUT_TIER {
      return Err(CellError::DuplicateTier { name: name.to_string() });
    }
    let sources = sources
      .into()
      .0
      .iter()
      .map(|source| self.resolve(source))
      .collect::<CellResult<Vec<_>>>()?;
    self.push_tier(name, &sources, spec, boxed_job(job_fn))
  }

  /// Registers a job sourced from the most recently added tier, like a pipe.
  pub fn append_tier<F, Fut, E>(&mut self, name: &str, spec: TierSpec, job_fn: F) -> CellResult<TierId>
  where
    F: Fn(Route<T>, Vec<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<anyhow::Error> + 'static,
  {
    let tail = self.tiers.last().map(Tier::id);
    self.add_tier(name, tail, spec, job_fn)
  }

  /// Registers a join: `job_fn` runs once per distinct `key_fn` value, after
  /// every tier in `sources` emitted a value with that key. It receives one
  /// value per source, in the order the sources are listed here.
  ///
  /// A source emitting a second value for a key whose group is still open is
  /// a contract violation reported as [`CellError::GatherConflict`].
  pub fn add_gather<K, KF, F, Fut, E>(
    &mut self,
    name: &str,
    sources: impl Into<Sources>,
    key_fn: KF,
    spec: TierSpec,
    job_fn: F,
  ) -> CellResult<TierId>
  where
    K: Hash + Eq + Send + 'static,
    KF: Fn(&T) -> K + Send + Sync + 'static,
    F: Fn(Route<T>, Vec<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<anyhow::Error> + 'static,
  {
    self.ensure_not_finalized()?;
    let gather_name = format!("gather:{name}");
    let sources = sources
      .into()
      .0
      .iter()
      .map(|source| self.resolve(source))
      .collect::<CellResult<Vec<_>>>()?;
    if sources.is_empty() {
      return Err(CellError::Configuration {
        tier: gather_name,
        message: "a gather needs at least one source".to_string(),
      });
    }
    let mut seen = HashSet::new();
    if !sources.iter().all(|id| seen.insert(*id)) {
      return Err(CellError::Configuration {
        tier: gather_name,
        message: "a source may only be gathered once".to_string(),
      });
    }
    if name == OUTPUT_TIER || self.names.contains_key(name) {
      return Err(CellError::DuplicateTier { name: name.to_string() });
    }

    let named_sources = sources
      .iter()
      .map(|id| (*id, self.tiers[id.index].name().to_string()))
      .collect();
    let gather = self.push_tier(
      &gather_name,
      &sources,
      TierSpec::default(),
      gather_job(gather_name.clone(), named_sources, key_fn),
    )?;
    self.push_tier(name, &[gather], spec, boxed_job(job_fn))
  }

  /// Adds an edge from `source` to an existing `tier`.
  ///
  /// The source must have been registered before the tier. Edges therefore
  /// always point forward in registration order, which rules out cycles.
  pub fn add_source(&mut self, tier: TierId, source: impl Into<SourceRef>) -> CellResult<()> {
    self.ensure_not_finalized()?;
    let tier = self.resolve(&SourceRef::Id(tier))?;
    let source = self.resolve(&source.into())?;
    if source.index >= tier.index {
      return Err(CellError::InvalidEdge {
        from: self.tiers[source.index].name().to_string(),
        to: self.tiers[tier.index].name().to_string(),
      });
    }
    self.link(source, tier);
    Ok(())
  }

  /// Registers a callback that runs once, after the cell drained, failed, or
  /// was abandoned.
  pub fn add_cleanup<F, Fut, E>(&mut self, cleanup_fn: F) -> CellResult<()>
  where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<anyhow::Error> + 'static,
  {
    self.ensure_not_finalized()?;
    self.cleaners.push(boxed_cleaner(cleanup_fn));
    Ok(())
  }

  fn push_tier(&mut self, name: &str, sources: &[TierId], spec: TierSpec, job: Job<T>) -> CellResult<TierId> {
    if self.names.contains_key(name) {
      return Err(CellError::DuplicateTier { name: name.to_string() });
    }
    let id = TierId::new(self.id, self.tiers.len());
    self.tiers.push(Tier::new(id, name.to_string(), spec, job));
    self.names.insert(name.to_string(), id);
    for source in sources {
      self.link(*source, id);
    }
    event!(Level::DEBUG, cell = self.id, tier = name, sources = sources.len(), "Tier added.");
    Ok(id)
  }

  fn link(&mut self, source: TierId, target: TierId) {
    self.tiers[source.index].add_target(target);
    self.tiers[target.index].source_count += 1;
  }

  /// Freezes the graph.
  ///
  /// Roots (tiers without sources) are remembered for the start of iteration,
  /// every leaf (tier without destinations) is wired into the output tier,
  /// the scheduler is built and the coordinator is set up with the complete
  /// tier list. Returns the roots. Fails if called twice.
  #[instrument(name = "Cell::finalize", skip_all, fields(cell = self.id, tiers = self.tiers.len()), err(Display))]
  pub fn finalize(&mut self) -> CellResult<Vec<TierId>> {
    self.ensure_not_finalized()?;
    self.finalized = true;

    let roots: Vec<TierId> = self.tiers.iter().filter(|t| t.source_count == 0).map(Tier::id).collect();
    let leaves: Vec<TierId> = self.tiers.iter().filter(|t| t.target_count() == 0).map(Tier::id).collect();
    let deliver = boxed_job(|route: Route<T>, data: Vec<T>| async move {
      route.deliver(data);
      Ok::<(), CellError>(())
    });
    self.push_tier(OUTPUT_TIER, &leaves, TierSpec::default(), deliver)?;

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;

    let tiers: Vec<Arc<Tier<T>>> = std::mem::take(&mut self.tiers).into_iter().map(Arc::new).collect();
    let infos: Vec<TierInfo> = tiers.iter().map(|tier| tier.info().clone()).collect();
    self.coordinator.setup(&infos)?;

    event!(
      Level::DEBUG,
      roots = roots.len(),
      leaves = leaves.len(),
      coordinator = self.coordinator.name(),
      "Cell finalized."
    );
    self.core = Some(Arc::new(CellCore::new(self.id, Arc::clone(&self.coordinator), tiers)));
    self.runtime = Some(runtime);
    self.roots = roots.clone();
    Ok(roots)
  }
}

impl<T: Clone + Send + 'static> Default for Cell<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: Clone + Send + 'static> std::fmt::Debug for Cell<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Cell")
      .field("id", &self.id)
      .field("coordinator", &self.coordinator.name())
      .field("tiers", &self.tier_count())
      .field("pending", &self.pending())
      .field("finalized", &self.finalized)
      .field("interrupted", &self.interrupted)
      .field("closed", &self.closed)
      .finish()
  }
}
