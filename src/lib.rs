pub mod collector;
pub mod config;
pub mod error;
pub mod limiter;
pub mod paginator;
pub mod sink;

pub use collector::{RunSummary, collect, run};
pub use config::{CollectorConfig, FailurePolicy};
pub use error::{CollectError, Result};
pub use limiter::TokenBucket;
pub use paginator::{NvdClient, Page, PageSource, Paginator, Record, Vulnerability};
pub use sink::{PartitionSink, PartitionSummary, partition_key, partition_path};
