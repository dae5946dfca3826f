pub mod identity;
pub mod job;
pub mod route;
pub mod spec;

// Re-export key types for easier access from other modules (and lib.rs)
pub use identity::{TierId, TierInfo};
pub use job::{BoxFuture, Cleaner, Job, SourceRef, Sources};
pub use route::Route;
pub use spec::{Buffer, TierSpec};
