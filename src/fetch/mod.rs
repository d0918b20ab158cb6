//! Outbound HTTP fetching.
//!
//! - `types` - `FetchRequest` / `FetchResult` records and URL validation
//! - `executor` - `FetchExecutor`, which owns the shared outbound session

pub mod executor;
pub mod types;

pub use executor::FetchExecutor;
pub use types::{FetchBody, FetchRequest, FetchResult};
