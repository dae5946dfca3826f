// tiercell/src/core/job.rs

//! Boxed job and cleanup types, plus the ways a tier can name its sources.

use crate::core::identity::TierId;
use crate::core::route::Route;
use std::future::Future;
use std::pin::Pin;

/// A `Send` boxed future, the shape every job body is erased into.
pub type BoxFuture<R> = Pin<Box<dyn Future<Output = R> + Send + 'static>>;

/// Type alias for a tier job.
///
/// A job is an asynchronous function that receives the per-invocation
/// [`Route`] and the values of the emission that triggered it (empty for a
/// root invocation), and may call [`Route::emit`] any number of times.
///
/// Jobs registered through [`Cell::add_tier`](crate::Cell::add_tier) may
/// return any error convertible into `anyhow::Error`; it is converted here.
pub type Job<T> = Box<dyn Fn(Route<T>, Vec<T>) -> BoxFuture<anyhow::Result<()>> + Send + Sync>;

/// A callback run once after the cell has drained or been abandoned.
pub type Cleaner = Box<dyn FnOnce() -> BoxFuture<anyhow::Result<()>> + Send>;

pub(crate) fn boxed_job<T, F, Fut, E>(job_fn: F) -> Job<T>
where
  T: Clone + Send + 'static,
  F: Fn(Route<T>, Vec<T>) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<(), E>> + Send + 'static,
  E: Into<anyhow::Error> + 'static,
{
  Box::new(move |route, data| {
    let user_fut = job_fn(route, data);
    Box::pin(async move { user_fut.await.map_err(Into::into) })
  })
}

pub(crate) fn boxed_cleaner<F, Fut, E>(cleanup_fn: F) -> Cleaner
where
  F: FnOnce() -> Fut + Send + 'static,
  Fut: Future<Output = Result<(), E>> + Send + 'static,
  E: Into<anyhow::Error> + 'static,
{
  Box::new(move || {
    let user_fut = cleanup_fn();
    Box::pin(async move { user_fut.await.map_err(Into::into) })
  })
}

/// A reference to an already registered tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
  Id(TierId),
  Name(String),
}

impl From<TierId> for SourceRef {
  fn from(id: TierId) -> Self {
    SourceRef::Id(id)
  }
}

impl From<&TierId> for SourceRef {
  fn from(id: &TierId) -> Self {
    SourceRef::Id(*id)
  }
}

impl From<&str> for SourceRef {
  fn from(name: &str) -> Self {
    SourceRef::Name(name.to_string())
  }
}

impl From<String> for SourceRef {
  fn from(name: String) -> Self {
    SourceRef::Name(name)
  }
}

/// Ordered list of sources for a new tier. One edge is created per entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sources(pub(crate) Vec<SourceRef>);

impl Sources {
  /// No sources: the tier is a root and runs once when iteration starts.
  pub fn none() -> Self {
    Self(Vec::new())
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }
}

impl<S: Into<SourceRef>> From<Option<S>> for Sources {
  fn from(source: Option<S>) -> Self {
    Self(source.into_iter().map(Into::into).collect())
  }
}

impl From<TierId> for Sources {
  fn from(id: TierId) -> Self {
    Self(vec![SourceRef::Id(id)])
  }
}

impl From<&str> for Sources {
  fn from(name: &str) -> Self {
    Self(vec![SourceRef::from(name)])
  }
}

impl<S: Into<SourceRef>> From<Vec<S>> for Sources {
  fn from(sources: Vec<S>) -> Self {
    Self(sources.into_iter().map(Into::into).collect())
  }
}

impl<S: Into<SourceRef>, const N: usize> From<[S; N]> for Sources {
  fn from(sources: [S; N]) -> Self {
    Self(sources.into_iter().map(Into::into).collect())
  }
}

impl From<&[TierId]> for Sources {
  fn from(sources: &[TierId]) -> Self {
    Self(sources.iter().map(SourceRef::from).collect())
  }
}
