// tiercell/examples/fan_out_fetch.rs

use std::sync::Arc;
use std::time::{Duration, Instant};
use tiercell::{CellError, CellResult, Cell, PoolCoordinator, Route, Sources, TierSpec};
use tracing::info;

#[derive(Clone, Debug)]
enum Item {
  Url(String),
  Page { url: String, bytes: usize },
  Link(String),
}

// Stand-in for an HTTP client.
async fn fetch(url: &str) -> Result<usize, CellError> {
  tokio::time::sleep(Duration::from_millis(50)).await;
  Ok(url.len() * 100)
}

fn main() -> CellResult<()> {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

  info!("--- Fan-out Fetch Example ---");

  // At most 4 fetches in flight, however many URLs are discovered.
  let mut cell: Cell<Item> = Cell::with_coordinator(Arc::new(PoolCoordinator::new()));

  let seeds = cell.add_tier("seeds", Sources::none(), TierSpec::new(), |route: Route<Item>, _| async move {
    for site in ["alpha", "beta", "gamma"] {
      route.emit(Item::Url(format!("https://{site}.example"))).await?;
    }
    Ok::<_, CellError>(())
  })?;

  let fetched = cell.add_tier("fetch", seeds, TierSpec::new().pool_size(4), |route: Route<Item>, data: Vec<Item>| async move {
    for item in data {
      if let Item::Url(url) = item {
        let bytes = fetch(&url).await?;
        info!(%url, bytes, "Fetched.");
        route.emit(Item::Page { url, bytes }).await?;
      }
    }
    Ok::<_, CellError>(())
  })?;

  cell.add_tier("links", fetched, TierSpec::new(), |route: Route<Item>, data: Vec<Item>| async move {
    for item in data {
      if let Item::Page { url, bytes } = item {
        for n in 0..bytes / 1_000 {
          route.emit(Item::Link(format!("{url}/page/{n}"))).await?;
        }
      }
    }
    Ok::<_, CellError>(())
  })?;

  let started = Instant::now();
  let mut links = 0;
  for item in cell.output()? {
    if let Item::Link(link) = item? {
      links += 1;
      info!(%link, "Discovered.");
    }
  }
  info!(links, elapsed_ms = started.elapsed().as_millis() as u64, "Done.");
  Ok(())
}
