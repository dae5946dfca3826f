// tiercell/examples/gather_join.rs

use tiercell::{Buffer, Cell, CellError, CellResult, Route, Sources, TierSpec};
use tracing::info;

#[derive(Clone, Debug)]
enum Record {
  User { id: u32, name: String },
  Order { user: u32, total: u32 },
  Report(String),
}

impl Record {
  fn user_id(&self) -> u32 {
    match self {
      Record::User { id, .. } => *id,
      Record::Order { user, .. } => *user,
      Record::Report(_) => 0,
    }
  }
}

fn main() -> CellResult<()> {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

  info!("--- Gather Example ---");

  let mut cell: Cell<Record> = Cell::new();

  let users = cell.add_tier("users", Sources::none(), TierSpec::new(), |route: Route<Record>, _| async move {
    for (id, name) in [(1, "ada"), (2, "grace"), (3, "edsger")] {
      route.emit(Record::User { id, name: name.to_string() }).await?;
    }
    Ok::<_, CellError>(())
  })?;

  // Totals arrive in a different order than the users.
  let orders = cell.add_tier("orders", Sources::none(), TierSpec::new(), |route: Route<Record>, _| async move {
    for (user, total) in [(3, 12), (1, 40), (2, 7)] {
      route.emit(Record::Order { user, total }).await?;
    }
    Ok::<_, CellError>(())
  })?;

  cell.add_gather(
    "report",
    [users, orders],
    Record::user_id,
    TierSpec::new().buffer(Buffer::Fixed(2)),
    |route: Route<Record>, data: Vec<Record>| async move {
      if let [Record::User { name, .. }, Record::Order { total, .. }] = data.as_slice() {
        route.emit(Record::Report(format!("{name} spent {total}"))).await?;
      }
      Ok::<_, CellError>(())
    },
  )?;

  for record in cell.output()? {
    if let Record::Report(line) = record? {
      info!("{}", line);
    }
  }
  Ok(())
}
