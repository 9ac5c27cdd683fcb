use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use feed_filter::{ChannelTarget, guide};
use tokio::time::Instant;
use tracing::debug;

use super::{Feed, FeedResponse, Revalidation, revalidate};
use crate::cache::{Artifact, FeedCache};
use crate::upstream::Origin;

/// Serves the channel-scoped XMLTV guide.
///
/// Guides change rarely and are expensive to filter, so a cached guide is
/// served without contacting the origin for `refresh_window` after the last
/// successful origin interaction.
pub struct GuideProxy {
    origin: Arc<dyn Origin>,
    url: String,
    target: ChannelTarget,
    refresh_window: Duration,
    cache: FeedCache,
}

impl GuideProxy {
    pub fn new(
        origin: Arc<dyn Origin>,
        url: impl Into<String>,
        target: ChannelTarget,
        refresh_window: Duration,
    ) -> Self {
        Self {
            origin,
            url: url.into(),
            target,
            refresh_window,
            cache: FeedCache::new(),
        }
    }

    pub fn cache(&self) -> &FeedCache {
        &self.cache
    }

    /// Answer a request carrying `if_none_match`.
    pub async fn serve(&self, if_none_match: Option<&str>) -> crate::Result<FeedResponse> {
        if let Some(snapshot) = self.cache.snapshot()
            && snapshot.is_fresh(Instant::now(), self.refresh_window)
            && snapshot.artifact.matches(if_none_match)
        {
            return Ok(FeedResponse::NotModified);
        }

        let mut cache = self.cache.lock().await;
        let now = Instant::now();

        if let Some(artifact) = cache.fresh_artifact(now, self.refresh_window) {
            debug!("Guide is fresh; origin not contacted");
            return Ok(FeedResponse::for_client(artifact, if_none_match));
        }

        let artifact = match revalidate(Feed::Guide, self.origin.as_ref(), &self.url, &cache)
            .await?
        {
            Revalidation::Unchanged(artifact) => {
                cache.touch(now);
                artifact
            }
            Revalidation::Changed { validator, body } => {
                let filtered = self.filter(body).await?;
                let artifact = cache.store(validator, Artifact::new(filtered), Some(now));
                debug!(
                    etag = %artifact.validator(),
                    bytes = artifact.body().len(),
                    "Guide refreshed"
                );
                artifact
            }
        };

        Ok(FeedResponse::for_client(&artifact, if_none_match))
    }

    /// Run the guide filter off the async workers; guides can be several megabytes.
    async fn filter(&self, raw: Bytes) -> crate::Result<Vec<u8>> {
        let target = self.target.clone();
        tokio::task::spawn_blocking(move || guide::filter(&raw, &target))
            .await
            .map_err(|e| crate::Error::Other(format!("Guide filter task failed: {e}")))?
            .map_err(crate::Error::from)
    }
}
