use std::pin::pin;

use futures::TryStreamExt;

use crate::config::CollectorConfig;
use crate::error::Result;
use crate::limiter::TokenBucket;
use crate::paginator::{NvdClient, PageSource, Paginator};
use crate::sink::{PartitionSink, PartitionSummary};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub pages: u64,
    pub records: u64,
    pub partitions: Vec<PartitionSummary>,
}

#[derive(Debug, Default)]
struct Progress {
    pages: u64,
    records: u64,
}

/// Drain `paginator` into `sink`, then close every partition.
///
/// The closing pass runs whether or not the loop failed. A loop error takes
/// precedence over close errors, which are then only logged.
pub async fn collect<S: PageSource>(paginator: Paginator<S>, mut sink: PartitionSink) -> Result<RunSummary> {
    let mut progress = Progress::default();
    let outcome = drain(paginator, &mut sink, &mut progress).await;
    let closed = sink.close_all();

    match (outcome, closed) {
        (Ok(()), Ok(partitions)) => Ok(RunSummary {
            pages: progress.pages,
            records: progress.records,
            partitions,
        }),
        (Ok(()), Err(err)) => Err(err),
        (Err(err), closed) => {
            if let Err(close_err) = closed {
                tracing::error!(error = %close_err, "partitions not closed cleanly");
            }
            tracing::error!(pages = progress.pages, records = progress.records, "run aborted");
            Err(err)
        }
    }
}

async fn drain<S: PageSource>(paginator: Paginator<S>, sink: &mut PartitionSink, progress: &mut Progress) -> Result<()> {
    let mut pages = pin!(paginator.into_stream());
    while let Some(page) = pages.try_next().await? {
        for vulnerability in &page.vulnerabilities {
            sink.ingest(&vulnerability.cve)?;
        }
        progress.pages += 1;
        progress.records += page.vulnerabilities.len() as u64;
        tracing::debug!(
            start_index = page.start_index,
            records = page.vulnerabilities.len(),
            total = page.total_results,
            "page stored"
        );
    }
    Ok(())
}

/// Collect the whole dataset described by `config`.
pub async fn run(config: CollectorConfig) -> Result<RunSummary> {
    config.validate()?;

    let limiter = TokenBucket::new(config.rate, config.burst)?;
    tracing::info!(
        base_url = %config.base_url,
        output_dir = %config.output_dir.display(),
        rate = limiter.rate(),
        burst = config.burst,
        policy = ?config.failure_policy,
        "starting collection"
    );

    let client = NvdClient::new(reqwest::Client::new(), config.base_url, config.api_key);
    let paginator = Paginator::new(client, limiter, config.failure_policy).with_deadline(config.deadline);
    let sink = PartitionSink::create(config.output_dir, config.compression_level)?;

    let summary = collect(paginator, sink).await?;
    tracing::info!(
        pages = summary.pages,
        records = summary.records,
        partitions = summary.partitions.len(),
        "collection finished"
    );
    Ok(summary)
}
