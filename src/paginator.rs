use std::future::Future;

use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::time::Instant;

use crate::config::FailurePolicy;
use crate::error::{CollectError, Result};
use crate::limiter::TokenBucket;

/// One vulnerability entry, kept exactly as the server sent it.
pub type Record = Map<String, Value>;

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub results_per_page: u64,
    pub total_results: u64,
    pub start_index: u64,
    #[serde(default)]
    pub vulnerabilities: Vec<Vulnerability>,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub cve: Record,
}

impl Page {
    /// Offset of the page after this one, as reported by the server.
    pub fn next_index(&self) -> u64 {
        self.start_index.saturating_add(self.results_per_page)
    }
}

/// Something that can return the page starting at a given offset.
pub trait PageSource {
    fn fetch(&self, start_index: u64) -> impl Future<Output = Result<Page>>;
}

/// HTTP source for the NVD CVE API.
#[derive(Debug, Clone)]
pub struct NvdClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl NvdClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

impl PageSource for NvdClient {
    async fn fetch(&self, start_index: u64) -> Result<Page> {
        let request_error = |source| CollectError::Request {
            start_index,
            source,
        };

        let body = self
            .client
            .get(&self.base_url)
            .query(&[("startIndex", start_index)])
            .header("apiKey", &self.api_key)
            .send()
            .await
            .map_err(request_error)?
            .error_for_status()
            .map_err(request_error)?
            .bytes()
            .await
            .map_err(request_error)?;

        serde_json::from_slice(&body).map_err(|source| CollectError::Decode {
            start_index,
            source,
        })
    }
}

/// Walks the remote dataset page by page.
///
/// The cursor always moves to `startIndex + resultsPerPage` of the last page
/// received, and the total is replaced by every page, so a dataset that grows
/// during the run is drained to its latest reported size.
pub struct Paginator<S> {
    source: S,
    limiter: TokenBucket,
    policy: FailurePolicy,
    deadline: Option<Instant>,
    cursor: u64,
    total: Option<u64>,
    consecutive_failures: u32,
}

impl<S: PageSource> Paginator<S> {
    pub fn new(source: S, limiter: TokenBucket, policy: FailurePolicy) -> Self {
        Self {
            source,
            limiter,
            policy,
            deadline: None,
            cursor: 0,
            total: None,
            consecutive_failures: 0,
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Latest `totalResults`, unknown until the first page arrives.
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    fn exhausted(&self) -> bool {
        self.total.is_some_and(|total| self.cursor >= total)
    }

    /// Fetch the next page, or `None` once the cursor has reached the total.
    pub async fn next_page(&mut self) -> Result<Option<Page>> {
        loop {
            if self.exhausted() {
                return Ok(None);
            }

            self.limiter.wait(self.deadline).await?;
            tracing::info!(start_index = self.cursor, total = ?self.total, "downloading page");

            match self.source.fetch(self.cursor).await {
                Ok(page) => return self.advance(page).map(Some),
                Err(err) if err.is_transient() => self.record_failure(err)?,
                Err(err) => return Err(err),
            }
        }
    }

    fn advance(&mut self, page: Page) -> Result<Page> {
        self.consecutive_failures = 0;
        let next = page.next_index();
        if next <= self.cursor && self.cursor < page.total_results {
            return Err(CollectError::CursorStalled {
                cursor: self.cursor,
                start_index: page.start_index,
                results_per_page: page.results_per_page,
                total_results: page.total_results,
            });
        }
        self.total = Some(page.total_results);
        self.cursor = next;
        Ok(page)
    }

    fn record_failure(&mut self, err: CollectError) -> Result<()> {
        match self.policy {
            FailurePolicy::Strict => Err(err),
            FailurePolicy::Tolerant {
                max_consecutive_failures,
            } => {
                self.consecutive_failures += 1;
                tracing::warn!(
                    start_index = self.cursor,
                    failures = self.consecutive_failures,
                    error = %err,
                    "page fetch failed"
                );
                if self.consecutive_failures > max_consecutive_failures {
                    return Err(CollectError::TooManyFailures {
                        failures: self.consecutive_failures,
                        last: Box::new(err),
                    });
                }
                Ok(())
            }
        }
    }

    /// Pages as a stream; the first error ends it.
    pub fn into_stream(self) -> impl Stream<Item = Result<Page>> {
        futures::stream::try_unfold(self, |mut paginator| async move {
            let page = paginator.next_page().await?;
            Ok::<_, CollectError>(page.map(|page| (page, paginator)))
        })
    }
}
