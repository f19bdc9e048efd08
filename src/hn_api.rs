use crate::error::HnError;

pub(crate) const DEFAULT_BASE_URL: &str = "https://hacker-news.firebaseio.com/v0/";

pub(crate) type StoryId = u64;

/// Item as returned by `item/{id}.json`. Only part of it is projected into a
/// [`crate::aggregator::RankedRecord`], unknown fields are ignored.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub(crate) struct RawItem {
    #[allow(unused)]
    pub(crate) id: StoryId,
    #[serde(default)]
    #[allow(unused)]
    pub(crate) deleted: bool,
    #[serde(rename = "type")]
    #[allow(unused)]
    pub(crate) item_type: Option<String>,
    pub(crate) by: Option<String>,
    #[serde(default, with = "chrono::serde::ts_seconds")]
    pub(crate) time: chrono::DateTime<chrono::Utc>,
    #[allow(unused)]
    pub(crate) text: Option<String>,
    #[serde(default)]
    #[allow(unused)]
    pub(crate) dead: bool,
    #[allow(unused)]
    pub(crate) parent: Option<StoryId>,
    #[allow(unused)]
    pub(crate) poll: Option<StoryId>,
    pub(crate) kids: Option<Vec<StoryId>>,
    pub(crate) url: Option<String>,
    #[serde(default)]
    pub(crate) score: i64,
    pub(crate) title: Option<String>,
    #[allow(unused)]
    pub(crate) parts: Option<Vec<StoryId>>,
    #[allow(unused)]
    pub(crate) descendants: Option<i64>,
}

/// Where stories come from. Implemented over HTTP by [`HnClient`].
#[async_trait::async_trait]
pub(crate) trait StorySource: Send + Sync {
    async fn best_story_ids(&self) -> crate::error::Result<Vec<StoryId>>;

    async fn item(&self, id: StoryId) -> crate::error::Result<RawItem>;
}

#[derive(Debug, Clone)]
pub(crate) struct HnClient {
    client: reqwest::Client,
    base_url: String,
    initial_retry_interval: std::time::Duration,
}

impl HnClient {
    pub(crate) fn new(base_url: &str) -> Self {
        let base_url = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };

        Self {
            client: crate::CLIENT.clone(),
            base_url,
            initial_retry_interval: crate::backoff::WEB_CALL_INITIAL_INTERVAL,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_initial_retry_interval(mut self, interval: std::time::Duration) -> Self {
        self.initial_retry_interval = interval;
        self
    }

    /// GETs `path` under the base url, retrying network errors and non-2xx
    /// statuses. Returns the body of the first successful response.
    async fn get_text(&self, path: &str) -> crate::error::Result<String> {
        let url = format!("{}{}", self.base_url, path);

        crate::backoff::retry_with(
            crate::backoff::backoff_web_call(self.initial_retry_interval),
            crate::backoff::WEB_CALL_RETRIES,
            HnError::is_transient,
            || self.get_once(&url),
        )
        .await
    }

    async fn get_once(&self, url: &str) -> crate::error::Result<String> {
        let response =
            self.client
                .get(url)
                .send()
                .await
                .map_err(|e| HnError::TransientFetchFailure {
                    url: url.to_string(),
                    status: e.status().map(|s| s.as_u16()),
                    reason: e.to_string(),
                })?;

        let status = response.status();
        if !status.is_success() {
            return Err(HnError::TransientFetchFailure {
                url: url.to_string(),
                status: Some(status.as_u16()),
                reason: status.canonical_reason().unwrap_or("unknown").to_string(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| HnError::TransientFetchFailure {
                url: url.to_string(),
                status: Some(status.as_u16()),
                reason: e.to_string(),
            })
    }
}

#[async_trait::async_trait]
impl StorySource for HnClient {
    async fn best_story_ids(&self) -> crate::error::Result<Vec<StoryId>> {
        let body = self.get_text("beststories.json").await?;

        // A broken id list should not take a refresh down with it.
        match serde_json::from_str::<Option<Vec<StoryId>>>(&body) {
            Ok(ids) => Ok(ids.unwrap_or_default()),
            Err(e) => {
                tracing::warn!(error = %e, "Unparseable best stories list, treating as empty");
                Ok(Vec::new())
            }
        }
    }

    async fn item(&self, id: StoryId) -> crate::error::Result<RawItem> {
        let path = format!("item/{id}.json");
        let body = self.get_text(&path).await?;

        let malformed = |reason: String| HnError::MalformedResponse {
            url: format!("{}{}", self.base_url, path),
            reason,
        };

        serde_json::from_str::<Option<RawItem>>(&body)
            .map_err(|e| malformed(e.to_string()))?
            .ok_or_else(|| malformed("item does not exist".to_string()))
    }
}
