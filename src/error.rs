pub(crate) type Result<T> = std::result::Result<T, HnError>;

#[derive(Debug, Clone, thiserror::Error)]
pub(crate) enum HnError {
    #[error("Transient fetch failure for {url} (status {status:?}): {reason}")]
    TransientFetchFailure {
        url: String,
        status: Option<u16>,
        reason: String,
    },

    #[error("Malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },

    #[error("Aggregation cancelled before any story was fetched")]
    AggregationCancelled,

    #[error("All {attempted} story fetches failed")]
    NoStoriesFetched { attempted: usize },

    #[error("Cache refresh failed after {attempts} attempts: {source}")]
    RefreshFailure {
        attempts: usize,
        #[source]
        source: std::sync::Arc<HnError>,
    },
}

impl HnError {
    /// Network errors and non-2xx statuses are worth another attempt. A body we
    /// could not parse will not get better by asking again.
    pub(crate) fn is_transient(&self) -> bool {
        matches!(self, HnError::TransientFetchFailure { .. })
    }
}
