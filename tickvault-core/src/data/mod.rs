//! Provider and storage seams, plus their concrete implementations.

pub mod allowance;
pub mod provider;
pub mod retry;
pub mod schema;
pub mod storage;
pub mod yahoo;

pub use allowance::{Allowance, AllowanceExhausted};
pub use provider::{FetchError, Provider};
pub use retry::{Backoff, RetryPolicy};
pub use schema::BarSchema;
pub use storage::{ParquetStorage, SeriesStatus, Storage, StorageError, StoredMeta};
pub use yahoo::YahooProvider;
