use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::aggregator::{Aggregator, RankedRecord};
use crate::cache::SnapshotCache;

enum Mode {
    Cached(Arc<SnapshotCache>),
    Direct {
        aggregator: Aggregator,
        cancel: tokio_util::sync::CancellationToken,
        last_count: AtomicUsize,
    },
}

/// What the request layer talks to. Range checks on `count` are left to the
/// caller, see [`BestStories::known_count`].
pub(crate) struct BestStories {
    mode: Mode,
}

impl BestStories {
    pub(crate) fn cached(cache: Arc<SnapshotCache>) -> Self {
        Self {
            mode: Mode::Cached(cache),
        }
    }

    /// Every call aggregates from upstream.
    pub(crate) fn uncached(
        aggregator: Aggregator,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Self {
        Self {
            mode: Mode::Direct {
                aggregator,
                cancel,
                last_count: AtomicUsize::new(0),
            },
        }
    }

    pub(crate) fn cache(&self) -> Option<&Arc<SnapshotCache>> {
        match &self.mode {
            Mode::Cached(cache) => Some(cache),
            Mode::Direct { .. } => None,
        }
    }

    /// Size of the most recent ranking, 0 until one has been fetched.
    pub(crate) fn known_count(&self) -> usize {
        match &self.mode {
            Mode::Cached(cache) => cache.current().map_or(0, |snapshot| snapshot.len()),
            Mode::Direct { last_count, .. } => last_count.load(Ordering::SeqCst),
        }
    }

    /// The `count` highest scored stories. Fewer are returned when fewer are
    /// known.
    pub(crate) async fn best_stories(&self, count: usize) -> crate::error::Result<Vec<RankedRecord>> {
        match &self.mode {
            Mode::Cached(cache) => {
                let snapshot = cache.get().await?;
                Ok(snapshot.records.iter().take(count).cloned().collect())
            }
            Mode::Direct {
                aggregator,
                cancel,
                last_count,
            } => {
                let mut records = aggregator.best_stories(cancel).await?;
                last_count.store(records.len(), Ordering::SeqCst);
                records.truncate(count);
                Ok(records)
            }
        }
    }
}
