use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use nvd_collector_rs::config::{DEFAULT_BASE_URL, DEFAULT_COMPRESSION_LEVEL, DEFAULT_MAX_CONSECUTIVE_FAILURES, DEFAULT_OUTPUT_DIR};
use nvd_collector_rs::{CollectorConfig, FailurePolicy};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Policy {
    Strict,
    Tolerant,
}

/// Download every CVE from the NVD API into per-year zstd JSONL files.
#[derive(Parser, Debug)]
#[clap(about, version, author)]
struct Args {
    #[clap(long, env = "NVD_API_KEY", default_value = "", hide_env_values = true)]
    api_key: String,

    #[clap(short, long, default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    #[clap(long, default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Sustained requests per second
    #[clap(short, long, default_value_t = 1.0)]
    rate: f64,

    #[clap(short, long, default_value_t = 2)]
    burst: u32,

    #[clap(long, value_enum, default_value_t = Policy::Tolerant)]
    failure_policy: Policy,

    /// Consecutive failed pages tolerated before giving up
    #[clap(long, default_value_t = DEFAULT_MAX_CONSECUTIVE_FAILURES)]
    max_failures: u32,

    /// zstd level; 20 and above trade a lot of memory for a little ratio
    #[clap(short = 'l', long, default_value_t = DEFAULT_COMPRESSION_LEVEL)]
    compression_level: i32,

    /// Stop waiting for request slots after this many seconds
    #[clap(long)]
    max_runtime: Option<u64>,
}

impl Args {
    fn into_config(self) -> CollectorConfig {
        let failure_policy = match self.failure_policy {
            Policy::Strict => FailurePolicy::Strict,
            Policy::Tolerant => FailurePolicy::Tolerant {
                max_consecutive_failures: self.max_failures,
            },
        };
        let deadline = self
            .max_runtime
            .map(|secs| tokio::time::Instant::now() + Duration::from_secs(secs));

        CollectorConfig::new()
            .with_api_key(self.api_key)
            .with_base_url(self.base_url)
            .with_output_dir(self.output_dir)
            .with_rate(self.rate, self.burst)
            .with_failure_policy(failure_policy)
            .with_compression_level(self.compression_level)
            .with_deadline(deadline)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();

    if let Err(err) = nvd_collector_rs::run(args.into_config()).await {
        tracing::error!(%err, "collection failed");
        std::process::exit(1);
    }

    Ok(())
}
