use std::sync::Arc;

use crate::error::HnError;
use crate::hn_api::{RawItem, StoryId, StorySource};

/// The simplified story handed out to callers.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RankedRecord {
    pub(crate) title: Option<String>,
    pub(crate) uri: Option<String>,
    pub(crate) posted_by: Option<String>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub(crate) time: chrono::DateTime<chrono::Utc>,
    pub(crate) score: i64,
    pub(crate) comment_count: usize,
}

impl From<RawItem> for RankedRecord {
    fn from(item: RawItem) -> Self {
        Self {
            comment_count: item.kids.as_ref().map_or(0, Vec::len),
            title: item.title,
            uri: item.url,
            posted_by: item.by,
            time: item.time,
            score: item.score,
        }
    }
}

/// Highest score first. The sort is stable so equal scores keep the order in
/// which their fetches completed.
fn sort_records(records: &mut [RankedRecord]) {
    records.sort_by(|a, b| b.score.cmp(&a.score));
}

/// Fetches story details with a bounded number of concurrent requests and
/// ranks them.
#[derive(Clone)]
pub(crate) struct Aggregator {
    source: Arc<dyn StorySource>,
    max_concurrent_fetches: usize,
}

impl Aggregator {
    pub(crate) fn new(source: Arc<dyn StorySource>, max_concurrent_fetches: usize) -> Self {
        Self {
            source,
            max_concurrent_fetches: max_concurrent_fetches.max(1),
        }
    }

    /// Looks up the current best story ids and aggregates them.
    pub(crate) async fn best_stories(
        &self,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> crate::error::Result<Vec<RankedRecord>> {
        let ids = self.source.best_story_ids().await?;
        tracing::info!(num_ids = ids.len(), "Got best story ids");
        self.aggregate(ids, cancel).await
    }

    /// Fetches every id, skipping the ones that fail. Once `cancel` fires no
    /// new fetches are started, fetches already running are awaited and
    /// whatever was collected is returned.
    pub(crate) async fn aggregate(
        &self,
        ids: Vec<StoryId>,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> crate::error::Result<Vec<RankedRecord>> {
        let attempted = ids.len();
        let mut pending = ids.into_iter();
        let mut records = Vec::with_capacity(attempted);
        let mut failed = 0;
        let mut cancelled = false;

        let mut queries_set: tokio::task::JoinSet<(StoryId, crate::error::Result<RawItem>)> =
            tokio::task::JoinSet::new();

        loop {
            while !cancelled && queries_set.len() < self.max_concurrent_fetches {
                let Some(id) = pending.next() else {
                    break;
                };

                if cancel.is_cancelled() {
                    tracing::info!(
                        num_not_started = pending.len() + 1,
                        "Refresh cancellation requested"
                    );
                    cancelled = true;
                    break;
                }

                let source = Arc::clone(&self.source);
                queries_set.spawn(async move { (id, source.item(id).await) });
            }

            let Some(res) = queries_set.join_next().await else {
                break;
            };

            match res {
                Ok((_, Ok(item))) => records.push(RankedRecord::from(item)),
                Ok((id, Err(e))) => {
                    failed += 1;
                    tracing::warn!(id, error = %e, "Skipping story that could not be fetched");
                }
                Err(e) => {
                    failed += 1;
                    tracing::error!(error =? e, "Story fetch task did not complete");
                }
            }
        }

        if records.is_empty() {
            if cancelled {
                return Err(HnError::AggregationCancelled);
            }
            if failed > 0 {
                return Err(HnError::NoStoriesFetched { attempted });
            }
        }

        sort_records(&mut records);

        tracing::info!(
            num_stories = records.len(),
            num_failed = failed,
            cancelled,
            "Aggregated best stories"
        );

        Ok(records)
    }
}
