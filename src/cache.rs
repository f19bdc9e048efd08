use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::aggregator::{Aggregator, RankedRecord};
use crate::error::HnError;

/// One published ranking. Never modified after it is stored, a refresh
/// replaces it with a new one.
#[derive(Debug)]
pub(crate) struct Snapshot {
    pub(crate) records: Vec<RankedRecord>,
    pub(crate) fetched_at: chrono::DateTime<chrono::Utc>,
    expires_at: tokio::time::Instant,
}

impl Snapshot {
    fn new(records: Vec<RankedRecord>, ttl: std::time::Duration) -> Self {
        Self {
            records,
            fetched_at: chrono::Utc::now(),
            expires_at: expiry_after(ttl),
        }
    }

    fn is_fresh(&self) -> bool {
        tokio::time::Instant::now() < self.expires_at
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }
}

/// `now + ttl`, saturating at roughly thirty years out.
fn expiry_after(ttl: std::time::Duration) -> tokio::time::Instant {
    const FAR_FUTURE: std::time::Duration = std::time::Duration::from_secs(86400 * 365 * 30);

    let now = tokio::time::Instant::now();
    now.checked_add(ttl.min(FAR_FUTURE)).unwrap_or(now)
}

/// Holds the latest [`Snapshot`]. Reads are lock-free; refreshes are
/// serialized so a burst of cold reads results in a single aggregation.
pub(crate) struct SnapshotCache {
    aggregator: Aggregator,
    ttl: std::time::Duration,
    current: arc_swap::ArcSwapOption<Snapshot>,
    refresh_lock: tokio::sync::Mutex<()>,
    /// Bumped after every refresh attempt, successful or not.
    refresh_generation: AtomicU64,
    last_failure: arc_swap::ArcSwapOption<HnError>,
    shutdown: tokio_util::sync::CancellationToken,
}

impl SnapshotCache {
    pub(crate) fn new(
        aggregator: Aggregator,
        ttl: std::time::Duration,
        shutdown: tokio_util::sync::CancellationToken,
    ) -> Self {
        Self {
            aggregator,
            ttl,
            current: arc_swap::ArcSwapOption::empty(),
            refresh_lock: tokio::sync::Mutex::new(()),
            refresh_generation: AtomicU64::new(0),
            last_failure: arc_swap::ArcSwapOption::empty(),
            shutdown,
        }
    }

    /// The last published snapshot, fresh or not.
    pub(crate) fn current(&self) -> Option<Arc<Snapshot>> {
        self.current.load_full()
    }

    fn fresh(&self) -> Option<Arc<Snapshot>> {
        self.current().filter(|snapshot| snapshot.is_fresh())
    }

    /// Returns the cached snapshot while it is fresh, otherwise refreshes and
    /// waits for the result. Callers that arrive while another refresh is
    /// running take its outcome, success or failure, instead of starting
    /// their own.
    ///
    /// Fails only when the refresh fails and nothing was ever published.
    pub(crate) async fn get(&self) -> crate::error::Result<Arc<Snapshot>> {
        if let Some(snapshot) = self.fresh() {
            tracing::debug!("Data retrieved from the cache");
            return Ok(snapshot);
        }

        let generation = self.refresh_generation.load(Ordering::SeqCst);
        let _guard = self.refresh_lock.lock().await;
        if let Some(snapshot) = self.fresh() {
            tracing::debug!("Data refreshed by a concurrent caller");
            return Ok(snapshot);
        }

        if self.refresh_generation.load(Ordering::SeqCst) != generation {
            tracing::debug!("Sharing the outcome of a concurrent refresh");
            return match (self.current(), self.last_failure.load_full()) {
                (Some(previous), _) => Ok(previous),
                (None, Some(err)) => Err(HnError::clone(&err)),
                (None, None) => self.refresh_locked().await,
            };
        }

        self.refresh_locked().await
    }

    /// Refreshes regardless of freshness.
    pub(crate) async fn refresh(&self) -> crate::error::Result<Arc<Snapshot>> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> crate::error::Result<Arc<Snapshot>> {
        let result = crate::backoff::retry_with(
            crate::backoff::backoff_refresh(),
            crate::backoff::REFRESH_RETRIES,
            |e: &HnError| !matches!(e, HnError::AggregationCancelled),
            || self.aggregator.best_stories(&self.shutdown),
        )
        .await;
        self.refresh_generation.fetch_add(1, Ordering::SeqCst);

        let err = match result {
            Ok(records) => {
                let snapshot = Arc::new(Snapshot::new(records, self.ttl));
                self.current.store(Some(Arc::clone(&snapshot)));
                self.last_failure.store(None);
                tracing::info!(
                    num_stories = snapshot.len(),
                    fetched_at = %snapshot.fetched_at,
                    "Cache refreshed"
                );
                return Ok(snapshot);
            }
            Err(e) => HnError::RefreshFailure {
                attempts: crate::backoff::REFRESH_RETRIES + 1,
                source: Arc::new(e),
            },
        };
        self.last_failure.store(Some(Arc::new(err.clone())));

        match self.current() {
            Some(previous) => {
                tracing::error!(
                    error = %err,
                    stale_since = %previous.fetched_at,
                    "Cache refresh failed, keeping previous snapshot"
                );
                Ok(previous)
            }
            None => {
                tracing::error!(error = %err, "Cache refresh failed and no snapshot exists");
                Err(err)
            }
        }
    }

    /// Spawns the refresh loop. The first refresh runs immediately, then once
    /// per `interval` until [`SnapshotCache::stop`] is called. `interval` must
    /// be non-zero.
    pub(crate) fn start(
        self: &Arc<Self>,
        interval: std::time::Duration,
    ) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cache.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        // Failures are logged by the refresh itself.
                        let _ = cache.refresh().await;
                    }
                }
            }

            tracing::info!("Background cache refresh stopped");
        });

        tracing::info!(
            interval_secs = interval.as_secs(),
            "Background cache refresh started"
        );
        handle
    }

    /// Stops the refresh loop. An aggregation in progress stops starting new
    /// fetches and publishes what it has.
    pub(crate) fn stop(&self) {
        self.shutdown.cancel();
    }
}
