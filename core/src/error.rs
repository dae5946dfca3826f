// tiercell/src/error.rs
use anyhow::Error as AnyhowError;
use thiserror::Error;

/// Everything a cell can report, from graph construction to the iterator.
///
/// Configuration errors (`AlreadyFinalized`, `UnknownSource`, `DuplicateTier`,
/// `InvalidEdge`, `Configuration`, `UnknownCoordinator`) are returned from the
/// call that caused them. `Job`, `Background`, `Panicked` and `GatherConflict`
/// are captured asynchronously and yielded by the iterator; only the first one
/// of a run is kept.
#[derive(Debug, Error)]
pub enum CellError {
  #[error("Cell is already finalized")]
  AlreadyFinalized,

  #[error("Cell is closed")]
  Closed,

  #[error("Unknown source tier: {name}")]
  UnknownSource { name: String },

  #[error("Tier '{name}' is already registered")]
  DuplicateTier { name: String },

  #[error("Tier '{to}' cannot source from '{from}': a source must be registered before the tiers it feeds")]
  InvalidEdge { from: String, to: String },

  #[error("Configuration error for tier '{tier}': {message}")]
  Configuration { tier: String, message: String },

  #[error("Unknown coordinator: {name}")]
  UnknownCoordinator { name: String },

  #[error("Job for tier '{tier}' failed. Source: {source}")]
  Job {
    tier: String,
    #[source]
    source: AnyhowError,
  },

  #[error("Background task failed. Source: {source}")]
  Background {
    #[source]
    source: AnyhowError,
  },

  #[error("Cleanup job failed. Source: {source}")]
  Cleanup {
    #[source]
    source: AnyhowError,
  },

  #[error("Task panicked: {message}")]
  Panicked { message: String },

  #[error("Gather tier '{tier}' got a second value from '{source_tier}' for a group that is still open")]
  GatherConflict { tier: String, source_tier: String },

  #[error("Failed to start the cell scheduler: {0}")]
  Runtime(#[from] std::io::Error),

  #[error("Internal cell error: {0}")]
  Internal(String),
}

impl CellError {
  /// True for the errors raised synchronously while building a cell.
  pub fn is_configuration(&self) -> bool {
    matches!(
      self,
      CellError::AlreadyFinalized
        | CellError::UnknownSource { .. }
        | CellError::DuplicateTier { .. }
        | CellError::InvalidEdge { .. }
        | CellError::Configuration { .. }
        | CellError::UnknownCoordinator { .. }
    )
  }

  /// Wraps a failed job body. A gather conflict raised by the generated
  /// gather job is passed through as is.
  pub(crate) fn job(tier: &str, err: AnyhowError) -> Self {
    match err.downcast::<CellError>() {
      Ok(conflict @ CellError::GatherConflict { .. }) => conflict,
      Ok(inner) => CellError::Job {
        tier: tier.to_string(),
        source: AnyhowError::new(inner),
      },
      Err(source) => CellError::Job {
        tier: tier.to_string(),
        source,
      },
    }
  }
}

pub type CellResult<T, E = CellError> = std::result::Result<T, E>;
