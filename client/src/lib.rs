//! Session-side engine of the atlas map: fetches geometry and statistics
//! separately, caches them per view, joins them locally and drives
//! drill-down and point navigation.

pub mod cache;
pub mod config;
pub mod error;
pub mod guard;
pub mod locate;
pub mod navigator;
pub mod prefetch;
pub mod retry;
pub mod session;
pub mod source;

#[cfg(test)]
mod testing;

pub use cache::{CacheEntry, LevelCache, ViewKey};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use locate::PointLocator;
pub use navigator::{DrillDownFrame, InteractionMode, NavOutcome, Navigator, UnitRef};
pub use session::{LoadedView, MapSession};
pub use source::{DataSource, HttpSource};
