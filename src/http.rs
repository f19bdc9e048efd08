use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};

use crate::aggregator::RankedRecord;
use crate::best_stories::BestStories;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) stories: Arc<BestStories>,
}

pub(crate) fn router(stories: Arc<BestStories>) -> Router {
    Router::new()
        .route("/api/hn/{count}", get(best_stories_handler))
        .route("/health", get(|| async { "ok" }))
        .with_state(AppState { stories })
}

async fn best_stories_handler(
    State(app): State<AppState>,
    Path(count): Path<i64>,
) -> Result<Json<Vec<RankedRecord>>, (StatusCode, String)> {
    if count <= 0 {
        tracing::info!(count, "Fewer stories requested");
        return Err((StatusCode::BAD_REQUEST, "Fewer stories requested".to_string()));
    }

    // Nothing known yet means nothing to check against, the first request
    // fills the ranking.
    let known = app.stories.known_count();
    let count = usize::try_from(count).unwrap_or(usize::MAX);
    if known > 0 && count > known {
        tracing::info!(count, known, "More stories requested than available");
        return Err((
            StatusCode::BAD_REQUEST,
            "More stories requested than available".to_string(),
        ));
    }

    app.stories.best_stories(count).await.map(Json).map_err(|e| {
        tracing::error!(error = %e, "Failed to get data");
        (StatusCode::SERVICE_UNAVAILABLE, "Failed to get data".to_string())
    })
}
