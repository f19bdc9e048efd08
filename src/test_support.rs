//! In-memory story source for exercising the aggregator, cache and facade
//! without touching the network.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::HnError;
use crate::hn_api::{RawItem, StoryId, StorySource};

pub(crate) fn story(id: StoryId, score: i64) -> RawItem {
    RawItem {
        id,
        item_type: Some("story".to_string()),
        by: Some(format!("user{id}")),
        time: chrono::DateTime::from_timestamp(1_700_000_000 + id as i64, 0).unwrap(),
        kids: Some((0..id).collect()),
        url: Some(format!("https://example.com/{id}")),
        score,
        title: Some(format!("Story {id}")),
        ..Default::default()
    }
}

#[derive(Default)]
pub(crate) struct FakeSource {
    ids: Mutex<Vec<StoryId>>,
    items: Mutex<HashMap<StoryId, RawItem>>,
    failing: Mutex<HashSet<StoryId>>,
    fail_everything: AtomicBool,
    delay: Mutex<std::time::Duration>,
    cancel_on_call: Mutex<Option<(usize, tokio_util::sync::CancellationToken)>>,

    pub(crate) ids_calls: AtomicUsize,
    pub(crate) item_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub(crate) max_in_flight: AtomicUsize,
}

impl FakeSource {
    /// Every story listed is served with the given score.
    pub(crate) fn with_stories(stories: &[(StoryId, i64)]) -> Self {
        let source = Self::default();
        source.set_stories(stories);
        source
    }

    pub(crate) fn set_stories(&self, stories: &[(StoryId, i64)]) {
        *self.ids.lock().unwrap() = stories.iter().map(|(id, _)| *id).collect();
        *self.items.lock().unwrap() = stories
            .iter()
            .map(|(id, score)| (*id, story(*id, *score)))
            .collect();
    }

    pub(crate) fn fail_item(&self, id: StoryId) {
        self.failing.lock().unwrap().insert(id);
    }

    pub(crate) fn fail_everything(&self, fail: bool) {
        self.fail_everything.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_delay(&self, delay: std::time::Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Cancels `token` when the `call`th item fetch starts.
    pub(crate) fn cancel_on_call(&self, call: usize, token: tokio_util::sync::CancellationToken) {
        *self.cancel_on_call.lock().unwrap() = Some((call, token));
    }

    fn failure(id: StoryId) -> HnError {
        HnError::TransientFetchFailure {
            url: format!("item/{id}.json"),
            status: Some(500),
            reason: "Internal Server Error".to_string(),
        }
    }
}

#[async_trait::async_trait]
impl StorySource for FakeSource {
    async fn best_story_ids(&self) -> crate::error::Result<Vec<StoryId>> {
        self.ids_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.ids.lock().unwrap().clone())
    }

    async fn item(&self, id: StoryId) -> crate::error::Result<RawItem> {
        let call = self.item_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((at, token)) = self.cancel_on_call.lock().unwrap().as_ref() {
            if *at == call {
                token.cancel();
            }
        }

        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_everything.load(Ordering::SeqCst) || self.failing.lock().unwrap().contains(&id)
        {
            return Err(Self::failure(id));
        }

        self.items
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| HnError::MalformedResponse {
                url: format!("item/{id}.json"),
                reason: "item does not exist".to_string(),
            })
    }
}
