// tiercell/examples/error_handling.rs

use std::time::Duration;
use tiercell::{Cell, CellError, Route, Sources, TierSpec};
use tracing::{error, info};

#[derive(Debug, thiserror::Error)]
enum AppError {
  #[error("Upstream rejected item {0}")]
  Rejected(u32),
}

fn main() -> Result<(), CellError> {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

  info!("--- Error Handling Example ---");

  let mut cell: Cell<u32> = Cell::new();
  let numbers = cell.append_tier("numbers", TierSpec::new(), |route: Route<u32>, _| async move {
    for n in 0..10 {
      route.emit(n).await?;
    }
    Ok::<_, CellError>(())
  })?;

  cell.add_tier("validate", numbers, TierSpec::new(), |route: Route<u32>, data: Vec<u32>| async move {
    for n in data {
      tokio::time::sleep(Duration::from_millis(u64::from(n))).await;
      if n == 6 {
        return Err(anyhow::Error::new(AppError::Rejected(n)));
      }
      route.emit(n).await?;
    }
    Ok::<_, anyhow::Error>(())
  })?;

  cell.add_cleanup(|| async {
    info!("Releasing connections.");
    Ok::<_, CellError>(())
  })?;

  for result in cell.output()? {
    match result {
      Ok(n) => info!(n, "Validated."),
      Err(CellError::Job { tier, source }) => {
        error!(%tier, error = %source, "Job failed, iteration stopped.");
      }
      Err(other) => error!(error = %other, "Cell failed."),
    }
  }
  info!(interrupted = cell.is_interrupted(), closed = cell.is_closed(), "Finished.");
  Ok(())
}
