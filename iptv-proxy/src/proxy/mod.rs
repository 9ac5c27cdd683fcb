//! Conditional-fetch proxies for the playlist and guide feeds.
//!
//! Both feeds share the same protocol against the origin:
//!
//! 1. Answer `304` straight away when the client already holds the cached
//!    artifact.
//! 2. Otherwise revalidate with the origin, sending the stored origin `ETag`.
//! 3. On `304` from the origin serve the cached artifact; if nothing is cached
//!    yet, retry once without a validator.
//! 4. On `200` re-run the filter and replace the cached artifact.
//!
//! The guide feed adds a freshness window during which step 2 is skipped.

mod guide;
mod playlist;

pub use guide::GuideProxy;
pub use playlist::PlaylistProxy;

use bytes::Bytes;
use tracing::debug;

use crate::cache::{Artifact, CacheGuard};
use crate::upstream::{Origin, OriginResponse, UpstreamError};

/// The feeds served by the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    Playlist,
    Guide,
}

impl Feed {
    pub fn name(self) -> &'static str {
        match self {
            Self::Playlist => "playlist",
            Self::Guide => "guide",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Playlist => "application/vnd.apple.mpegurl",
            Self::Guide => "application/xml",
        }
    }

    /// Body of the `502` answered when the feed cannot be refreshed.
    pub fn unavailable_message(self) -> &'static str {
        match self {
            Self::Playlist => "Upstream M3U unavailable",
            Self::Guide => "Upstream EPG unavailable",
        }
    }
}

impl std::fmt::Display for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What to send back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedResponse {
    NotModified,
    Ok(Artifact),
}

impl FeedResponse {
    /// `304` if the client already holds `artifact`, otherwise the artifact itself.
    pub fn for_client(artifact: &Artifact, if_none_match: Option<&str>) -> Self {
        if artifact.matches(if_none_match) {
            Self::NotModified
        } else {
            Self::Ok(artifact.clone())
        }
    }
}

/// Result of asking the origin about the cached representation.
#[derive(Debug)]
enum Revalidation {
    /// The origin still has what we filtered last time.
    Unchanged(Artifact),
    /// The origin sent a new representation that must be filtered.
    Changed { validator: String, body: Bytes },
}

/// Steps 2 and 3 of the protocol. Must be called with the entry locked.
async fn revalidate(
    feed: Feed,
    origin: &dyn Origin,
    url: &str,
    cache: &CacheGuard<'_>,
) -> Result<Revalidation, UpstreamError> {
    let upstream_validator = cache.upstream_validator();

    let response = match origin.fetch(url, upstream_validator).await? {
        OriginResponse::NotModified => match cache.artifact() {
            Some(artifact) => {
                debug!(%feed, "Origin reports no change; serving cached artifact");
                return Ok(Revalidation::Unchanged(artifact.clone()));
            }
            None => {
                debug!(%feed, "Origin reports no change but nothing is cached; retrying unconditionally");
                origin.fetch(url, None).await?
            }
        },
        response => response,
    };

    match response {
        OriginResponse::Modified { validator, body } => {
            debug!(%feed, bytes = body.len(), "Origin sent a new representation");
            Ok(Revalidation::Changed { validator, body })
        }
        OriginResponse::NotModified => Err(UpstreamError::status(
            reqwest::StatusCode::NOT_MODIFIED,
            url,
        )),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted in-memory origin.

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use reqwest::StatusCode;

    use crate::upstream::{Origin, OriginResponse, UpstreamError};

    #[derive(Debug, Clone)]
    pub enum Scripted {
        NotModified,
        Body { etag: &'static str, body: &'static str },
        /// A body that need not be valid UTF-8.
        Bytes { etag: &'static str, body: &'static [u8] },
        Status(u16),
    }

    /// Replays scripted responses in order and records the validators it was sent.
    #[derive(Default)]
    pub struct ScriptedOrigin {
        script: Mutex<VecDeque<Scripted>>,
        seen: Mutex<Vec<Option<String>>>,
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl ScriptedOrigin {
        pub fn new(script: impl IntoIterator<Item = Scripted>) -> Self {
            Self {
                script: Mutex::new(script.into_iter().collect()),
                ..Default::default()
            }
        }

        /// Hold every response for `delay` before answering.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn push(&self, response: Scripted) {
            self.script.lock().push_back(response);
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// `If-None-Match` values received, one per call.
        pub fn validators(&self) -> Vec<Option<String>> {
            self.seen.lock().clone()
        }
    }

    #[async_trait]
    impl Origin for ScriptedOrigin {
        async fn fetch(
            &self,
            url: &str,
            validator: Option<&str>,
        ) -> Result<OriginResponse, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().push(validator.map(str::to_string));
            let next = self.script.lock().pop_front();

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            match next {
                Some(Scripted::NotModified) => Ok(OriginResponse::NotModified),
                Some(Scripted::Body { etag, body }) => Ok(OriginResponse::Modified {
                    validator: etag.to_string(),
                    body: Bytes::from_static(body.as_bytes()),
                }),
                Some(Scripted::Bytes { etag, body }) => Ok(OriginResponse::Modified {
                    validator: etag.to_string(),
                    body: Bytes::from_static(body),
                }),
                Some(Scripted::Status(code)) => Err(UpstreamError::status(
                    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_GATEWAY),
                    url,
                )),
                None => Err(UpstreamError::status(StatusCode::SERVICE_UNAVAILABLE, url)),
            }
        }
    }
}
