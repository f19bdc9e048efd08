use backoff::backoff::Backoff;

const MAX_INTERVAL_BETWEEN_TRIES: std::time::Duration = std::time::Duration::from_secs(60);

/// Upstream calls get the first attempt plus this many retries.
pub(crate) const WEB_CALL_RETRIES: usize = 3;
pub(crate) const WEB_CALL_INITIAL_INTERVAL: std::time::Duration =
    std::time::Duration::from_secs(2);

pub(crate) const REFRESH_RETRIES: usize = 3;

/// Waits `initial`, then doubles: 2s, 4s, 8s with the default interval.
pub(crate) fn backoff_web_call(initial: std::time::Duration) -> backoff::ExponentialBackoff {
    backoff::ExponentialBackoffBuilder::new()
        .with_initial_interval(initial)
        .with_multiplier(2.0)
        .with_randomization_factor(0.0)
        .with_max_interval(MAX_INTERVAL_BETWEEN_TRIES)
        .with_max_elapsed_time(None)
        .build()
}

/// Cache refreshes retry immediately.
pub(crate) fn backoff_refresh() -> backoff::backoff::Zero {
    backoff::backoff::Zero {}
}

/// Runs `op` until it succeeds, the error is not retryable, the retry budget is
/// spent or the schedule gives up. The last error is returned unchanged.
pub(crate) async fn retry_with<B, T, E, F, Fut, P>(
    mut backoff: B,
    retries: usize,
    is_retryable: P,
    mut op: F,
) -> Result<T, E>
where
    B: Backoff,
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    backoff.reset();
    let mut attempt = 0;

    loop {
        attempt += 1;
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if attempt > retries || !is_retryable(&err) {
            return Err(err);
        }

        let Some(delay) = backoff.next_backoff() else {
            return Err(err);
        };

        tracing::warn!(
            error = %err,
            attempt,
            retry_in =? delay,
            "Attempt failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}
