use std::path::PathBuf;

use tokio::time::Instant;

use crate::error::{CollectError, Result};

pub const DEFAULT_BASE_URL: &str = "https://services.nvd.nist.gov/rest/json/cves/2.0";
pub const DEFAULT_OUTPUT_DIR: &str = "nvd_cve";
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 5;
/// Highest regular zstd level. Levels above it ("ultra") need hundreds of
/// megabytes per open stream, and one stream is open per year.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 19;

/// What to do when a page cannot be fetched or decoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailurePolicy {
    /// The first failure ends the run.
    Strict,
    /// Retry after the next limiter wait; the run ends once more than
    /// `max_consecutive_failures` pages in a row have failed.
    Tolerant { max_consecutive_failures: u32 },
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self::Tolerant {
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
        }
    }
}

/// Settings for one collection run.
#[derive(Clone, Debug)]
pub struct CollectorConfig {
    /// Paginated endpoint; `startIndex` is appended as a query parameter.
    pub base_url: String,
    /// Sent verbatim in the `apiKey` header, even when empty.
    pub api_key: String,
    /// Directory receiving `<year>.jsonl.zst` files.
    pub output_dir: PathBuf,
    /// Sustained requests per second.
    pub rate: f64,
    /// Requests allowed back to back before the rate applies.
    pub burst: u32,
    pub failure_policy: FailurePolicy,
    pub compression_level: i32,
    /// Limiter waits fail once this instant would be passed.
    pub deadline: Option<Instant>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            rate: 1.0,
            burst: 2,
            failure_policy: FailurePolicy::default(),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            deadline: None,
        }
    }
}

impl CollectorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn with_rate(mut self, rate: f64, burst: u32) -> Self {
        self.rate = rate;
        self.burst = burst;
        self
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    pub fn with_compression_level(mut self, compression_level: i32) -> Self {
        self.compression_level = compression_level;
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.rate.is_finite() && self.rate > 0.0) {
            return Err(CollectError::Config(format!(
                "rate must be a positive number, got {}",
                self.rate
            )));
        }
        if self.burst == 0 {
            return Err(CollectError::Config("burst must be at least 1".to_string()));
        }
        let levels = zstd::compression_level_range();
        if !levels.contains(&self.compression_level) {
            return Err(CollectError::Config(format!(
                "compression level {} outside {}..={}",
                self.compression_level,
                levels.start(),
                levels.end()
            )));
        }
        if self.base_url.is_empty() {
            return Err(CollectError::Config("base url is empty".to_string()));
        }
        Ok(())
    }
}
