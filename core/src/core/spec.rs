// tiercell/src/core/spec.rs

//! Per-tier configuration.

use std::collections::HashMap;

/// How a tier holds its emissions before forwarding them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Buffer {
  /// Every emission is forwarded immediately.
  #[default]
  Off,
  /// Emissions are collected and forwarded as one batch once `n` are held.
  /// `Fixed(0)` behaves like `Off`.
  Fixed(usize),
  /// Emissions are collected until the coordinator's `flush` hook says so,
  /// or until the cell goes quiet.
  Unbounded,
}

impl Buffer {
  pub(crate) fn normalized(self) -> Self {
    match self {
      Buffer::Fixed(0) => Buffer::Off,
      other => other,
    }
  }

  pub fn is_buffered(&self) -> bool {
    !matches!(self.normalized(), Buffer::Off)
  }
}

/// Configuration attached to a tier at registration.
///
/// `buffer` is read by the tier itself, `pool_size` by the
/// [`PoolCoordinator`](crate::PoolCoordinator); `options` is a free-form map
/// for custom coordinators.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TierSpec {
  pub buffer: Buffer,
  pub pool_size: Option<usize>,
  pub options: HashMap<String, String>,
}

impl TierSpec {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn buffer(mut self, buffer: Buffer) -> Self {
    self.buffer = buffer;
    self
  }

  pub fn pool_size(mut self, size: usize) -> Self {
    self.pool_size = Some(size);
    self
  }

  pub fn option<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
    self.options.insert(key.into(), value.into());
    self
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self.options.get(key).map(String::as_str)
  }
}
