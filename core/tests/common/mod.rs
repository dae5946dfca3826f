// tests/common/mod.rs
#![allow(dead_code)] // Allow unused code in this common test module

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tiercell::{Cell, CellError, CellResult, Job, Route};
use tracing::Level;

// --- Common Error Type for Tests ---
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TestError {
  #[error("Test job failed: {0}")]
  Job(String),

  #[error("Test cleanup failed: {0}")]
  Cleanup(String),
}

// --- Common Job Creators ---

/// A root job emitting `0..count`.
pub fn counting_job(count: u32) -> Job<u32> {
  Box::new(move |route: Route<u32>, _data: Vec<u32>| {
    Box::pin(async move {
      for n in 0..count {
        route.emit(n).await?;
      }
      Ok(())
    })
  })
}

/// A job re-emitting every value it receives, mapped through `f`.
pub fn map_job(f: fn(u32) -> u32) -> Job<u32> {
  Box::new(move |route: Route<u32>, data: Vec<u32>| {
    Box::pin(async move {
      for value in data {
        route.emit(f(value)).await?;
      }
      Ok(())
    })
  })
}

/// A job that sleeps, then fails with `message`.
pub fn failing_job(message: &'static str, delay: Duration) -> Job<u32> {
  Box::new(move |_route: Route<u32>, _data: Vec<u32>| {
    Box::pin(async move {
      tokio::time::sleep(delay).await;
      tracing::warn!(target: "test_jobs", "failing with: '{}'", message);
      Err(TestError::Job(message.to_string()).into())
    })
  })
}

/// Drains a cell into a vector, stopping at the first error.
pub fn collect(cell: &mut Cell<u32>) -> CellResult<Vec<u32>> {
  let output = cell.output()?;
  output.collect()
}

/// Drains a cell, keeping errors as items.
pub fn collect_all(cell: &mut Cell<u32>) -> CellResult<Vec<CellResult<u32>>> {
  let output = cell.output()?;
  Ok(output.collect())
}

pub fn sorted(mut values: Vec<u32>) -> Vec<u32> {
  values.sort_unstable();
  values
}

/// Finds the `TestError` behind a job error, if there is one.
pub fn job_error(err: &CellError) -> Option<&TestError> {
  match err {
    CellError::Job { source, .. } | CellError::Background { source } | CellError::Cleanup { source } => {
      source.downcast_ref::<TestError>()
    }
    _ => None,
  }
}

// --- Helper for Tracing Setup (call once per test run if needed) ---
use once_cell::sync::Lazy;
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer() // Important for tests to capture output
    .try_init()
    .ok(); // Allow multiple initializations in tests (ok if fails)
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

// --- Concurrency probe ---

/// Tracks how many job bodies run at once and the highest value seen.
#[derive(Debug, Default)]
pub struct Gauge {
  current: AtomicUsize,
  peak: AtomicUsize,
}

impl Gauge {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn enter(&self) {
    let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
    self.peak.fetch_max(now, Ordering::SeqCst);
  }

  pub fn exit(&self) {
    self.current.fetch_sub(1, Ordering::SeqCst);
  }

  pub fn peak(&self) -> usize {
    self.peak.load(Ordering::SeqCst)
  }

  pub fn current(&self) -> usize {
    self.current.load(Ordering::SeqCst)
  }
}
