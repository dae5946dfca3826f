// tests/cell_iteration_tests.rs
mod common; // Reference the common module

use common::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tiercell::{Cell, CellError, CellResult, Route, Sources, TierSpec, OUTPUT_TIER};

#[test]
fn test_empty_cell_yields_nothing() {
  setup_tracing();
  let mut cell: Cell<u32> = Cell::new();

  let values = collect(&mut cell).expect("empty cell should drain cleanly");

  assert!(values.is_empty());
  assert!(cell.is_closed());
  assert!(!cell.is_interrupted());
}

#[test]
fn test_root_without_emissions_runs_once() {
  setup_tracing();
  let runs = Arc::new(AtomicUsize::new(0));
  let mut cell: Cell<u32> = Cell::new();

  let runs_clone = runs.clone();
  cell
    .add_tier("quiet", Sources::none(), TierSpec::new(), move |_route: Route<u32>, data: Vec<u32>| {
      let runs = runs_clone.clone();
      async move {
        assert!(data.is_empty(), "root invocations get no values");
        runs.fetch_add(1, Ordering::SeqCst);
        Ok::<_, TestError>(())
      }
    })
    .unwrap();

  let values = collect(&mut cell).unwrap();

  assert!(values.is_empty());
  assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn test_value_flows_from_root_to_leaf() {
  setup_tracing();
  let mut cell: Cell<u32> = Cell::new();
  let root = cell
    .add_tier("root", Sources::none(), TierSpec::new(), |route: Route<u32>, _| async move {
      route.emit(42).await?;
      Ok::<_, CellError>(())
    })
    .unwrap();
  cell.add_tier("identity", root, TierSpec::new(), map_job(|v| v)).unwrap();

  assert_eq!(collect(&mut cell).unwrap(), vec![42]);
}

#[test]
fn test_single_chain_preserves_emission_order() {
  setup_tracing();
  let mut cell: Cell<u32> = Cell::new();
  let numbers = cell.add_tier("numbers", Sources::none(), TierSpec::new(), counting_job(50)).unwrap();
  cell.add_tier("plus_one", numbers, TierSpec::new(), map_job(|v| v + 1)).unwrap();

  let values = collect(&mut cell).unwrap();

  assert_eq!(values, (1..=50).collect::<Vec<_>>());
}

#[test]
fn test_two_level_fan_out_delivers_every_combination() {
  setup_tracing();
  let mut cell: Cell<u32> = Cell::new();
  let numbers = cell.add_tier("numbers", Sources::none(), TierSpec::new(), counting_job(4)).unwrap();
  let split = cell
    .add_tier("split", numbers, TierSpec::new(), |route: Route<u32>, data: Vec<u32>| async move {
      for value in data {
        route.emit(value * 10).await?;
        route.emit(value * 10 + 1).await?;
      }
      Ok::<_, CellError>(())
    })
    .unwrap();
  cell.add_tier("shift", split, TierSpec::new(), map_job(|v| v + 100)).unwrap();

  let values = collect(&mut cell).unwrap();

  let expected: Vec<u32> = (0..4).flat_map(|v| [v * 10 + 100, v * 10 + 101]).collect();
  assert_eq!(sorted(values.clone()), sorted(expected));
  // Children of one parent keep their relative order.
  for parent in 0..4 {
    let children: Vec<u32> = values.iter().copied().filter(|v| (v - 100) / 10 == parent).collect();
    assert_eq!(children, vec![parent * 10 + 100, parent * 10 + 101]);
  }
}

#[test]
fn test_tier_with_two_sources_sees_both() {
  setup_tracing();
  let seen = Arc::new(Mutex::new(Vec::new()));
  let mut cell: Cell<u32> = Cell::new();
  let left = cell
    .add_tier("left", Sources::none(), TierSpec::new(), |route: Route<u32>, _| async move {
      route.emit(1).await?;
      Ok::<_, CellError>(())
    })
    .unwrap();
  let right = cell
    .add_tier("right", Sources::none(), TierSpec::new(), |route: Route<u32>, _| async move {
      route.emit(2).await?;
      Ok::<_, CellError>(())
    })
    .unwrap();

  let seen_clone = seen.clone();
  cell
    .add_tier("merge", [left, right], TierSpec::new(), move |route: Route<u32>, data: Vec<u32>| {
      let seen = seen_clone.clone();
      async move {
        let source = route.source().expect("merge is never a root");
        seen.lock().push((source, data.clone()));
        route.emit_many(data).await?;
        Ok::<_, CellError>(())
      }
    })
    .unwrap();

  let values = collect(&mut cell).unwrap();

  assert_eq!(sorted(values), vec![1, 2]);
  let mut seen = seen.lock().clone();
  seen.sort();
  assert_eq!(seen, vec![(left, vec![1]), (right, vec![2])]);
}

#[test]
fn test_every_destination_gets_every_value() {
  setup_tracing();
  let mut cell: Cell<u32> = Cell::new();
  let numbers = cell.add_tier("numbers", Sources::none(), TierSpec::new(), counting_job(3)).unwrap();
  cell.add_tier("tens", numbers, TierSpec::new(), map_job(|v| v + 10)).unwrap();
  cell.add_tier("twenties", "numbers", TierSpec::new(), map_job(|v| v + 20)).unwrap();

  let values = collect(&mut cell).unwrap();

  assert_eq!(sorted(values), vec![10, 11, 12, 20, 21, 22]);
}

#[test]
fn test_emit_many_invokes_destination_once() {
  setup_tracing();
  let invocations = Arc::new(AtomicUsize::new(0));
  let mut cell: Cell<u32> = Cell::new();
  let root = cell
    .add_tier("root", Sources::none(), TierSpec::new(), |route: Route<u32>, _| async move {
      route.emit_many(vec![1, 2, 3]).await?;
      route.emit_many(Vec::new()).await?;
      Ok::<_, CellError>(())
    })
    .unwrap();

  let invocations_clone = invocations.clone();
  cell
    .add_tier("sum", root, TierSpec::new(), move |route: Route<u32>, data: Vec<u32>| {
      let invocations = invocations_clone.clone();
      async move {
        invocations.fetch_add(1, Ordering::SeqCst);
        route.emit(data.iter().sum()).await?;
        Ok::<_, CellError>(())
      }
    })
    .unwrap();

  assert_eq!(collect(&mut cell).unwrap(), vec![6]);
  assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

#[test]
fn test_append_tier_chains_like_a_pipe() {
  setup_tracing();
  let mut cell: Cell<u32> = Cell::new();
  cell.append_tier("numbers", TierSpec::new(), counting_job(3)).unwrap();
  cell.append_tier("double", TierSpec::new(), map_job(|v| v * 2)).unwrap();
  cell.append_tier("plus_one", TierSpec::new(), map_job(|v| v + 1)).unwrap();

  assert_eq!(collect(&mut cell).unwrap(), vec![1, 3, 5]);
}

#[test]
fn test_owned_iteration() {
  setup_tracing();
  let mut cell: Cell<u32> = Cell::new();
  cell.append_tier("numbers", TierSpec::new(), counting_job(5)).unwrap();

  let values = cell.into_iter().collect::<CellResult<Vec<_>>>().unwrap();

  assert_eq!(values, vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_route_describes_its_tier() {
  setup_tracing();
  let mut cell: Cell<u32> = Cell::new();
  let cell_id = cell.id();
  cell
    .add_tier(
      "described",
      Sources::none(),
      TierSpec::new().option("region", "eu"),
      move |route: Route<u32>, _| async move {
        assert_eq!(route.tier().name, "described");
        assert_eq!(route.spec().get("region"), Some("eu"));
        assert_eq!(route.cell_id(), cell_id);
        assert!(route.source().is_none());
        route.emit(1).await?;
        Ok::<_, CellError>(())
      },
    )
    .unwrap();

  assert_eq!(collect(&mut cell).unwrap(), vec![1]);
}

#[test]
fn test_finalize_wires_leaves_into_output() {
  setup_tracing();
  let mut cell: Cell<u32> = Cell::new();
  let a = cell.add_tier("a", Sources::none(), TierSpec::new(), counting_job(1)).unwrap();
  let b = cell.add_tier("b", Sources::none(), TierSpec::new(), counting_job(1)).unwrap();
  cell.add_tier("c", a, TierSpec::new(), map_job(|v| v)).unwrap();

  let roots = cell.finalize().unwrap();

  assert_eq!(roots, vec![a, b]);
  assert_eq!(cell.tier_count(), 4);
  let output = cell.tier(OUTPUT_TIER).expect("output tier is registered at finalize");
  assert_eq!(cell.tier_info(output).unwrap().name, OUTPUT_TIER);
  assert_eq!(sorted(collect(&mut cell).unwrap()), vec![0, 0]);
}
