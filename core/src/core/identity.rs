// tiercell/src/core/identity.rs

//! Handles and read-only descriptions of tiers.

use crate::core::spec::TierSpec;
use std::fmt;

/// Stable handle to a tier inside one cell's arena.
///
/// The handle carries the owning cell's id so a handle from another cell is
/// rejected instead of silently wiring the wrong tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TierId {
  pub(crate) cell: u64,
  pub(crate) index: usize,
}

impl TierId {
  pub(crate) fn new(cell: u64, index: usize) -> Self {
    Self { cell, index }
  }

  /// Position of the tier in registration order.
  pub fn index(&self) -> usize {
    self.index
  }

  /// Id of the cell that owns this tier.
  pub fn cell_id(&self) -> u64 {
    self.cell
  }
}

impl fmt::Display for TierId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "cell{}/tier{}", self.cell, self.index)
  }
}

/// What coordinators and jobs get to see about a tier.
#[derive(Debug, Clone, PartialEq)]
pub struct TierInfo {
  pub id: TierId,
  pub name: String,
  pub spec: TierSpec,
}

impl TierInfo {
  pub(crate) fn new(id: TierId, name: String, spec: TierSpec) -> Self {
    Self { id, name, spec }
  }
}

impl fmt::Display for TierInfo {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} ({})", self.name, self.id)
  }
}
