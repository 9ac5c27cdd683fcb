use std::sync::Arc;

use feed_filter::{ChannelTarget, playlist};
use regex::Regex;
use tracing::debug;

use super::{Feed, FeedResponse, Revalidation, revalidate};
use crate::cache::{Artifact, FeedCache};
use crate::upstream::Origin;

/// Serves the channel-scoped M3U playlist.
///
/// Every request that misses the client's validator revalidates with the
/// origin; the filter only runs when the origin sends a new playlist.
pub struct PlaylistProxy {
    origin: Arc<dyn Origin>,
    url: String,
    pattern: Regex,
    target: ChannelTarget,
    cache: FeedCache,
}

impl PlaylistProxy {
    pub fn new(
        origin: Arc<dyn Origin>,
        url: impl Into<String>,
        pattern: Regex,
        target: ChannelTarget,
    ) -> Self {
        Self {
            origin,
            url: url.into(),
            pattern,
            target,
            cache: FeedCache::new(),
        }
    }

    pub fn cache(&self) -> &FeedCache {
        &self.cache
    }

    /// Answer a request carrying `if_none_match`.
    pub async fn serve(&self, if_none_match: Option<&str>) -> crate::Result<FeedResponse> {
        if let Some(snapshot) = self.cache.snapshot()
            && snapshot.artifact.matches(if_none_match)
        {
            return Ok(FeedResponse::NotModified);
        }

        let mut cache = self.cache.lock().await;

        if let Some(artifact) = cache.artifact()
            && artifact.matches(if_none_match)
        {
            return Ok(FeedResponse::NotModified);
        }

        let artifact = match revalidate(Feed::Playlist, self.origin.as_ref(), &self.url, &cache)
            .await?
        {
            Revalidation::Unchanged(artifact) => artifact,
            Revalidation::Changed { validator, body } => {
                let filtered = playlist::filter(&body, &self.pattern, &self.target);
                let artifact = cache.store(validator, Artifact::new(filtered), None);
                debug!(
                    etag = %artifact.validator(),
                    bytes = artifact.body().len(),
                    "Playlist refreshed"
                );
                artifact
            }
        };

        Ok(FeedResponse::for_client(&artifact, if_none_match))
    }
}
