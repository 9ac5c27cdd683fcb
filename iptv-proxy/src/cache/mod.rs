//! Per-feed cache of the filtered artifact.
//!
//! Each feed owns exactly one [`FeedCache`]. The entry is guarded by an async
//! mutex that is held across the origin request and the filter pass, which
//! serializes refreshes of the same feed. Every write also publishes an
//! immutable [`CacheSnapshot`] so the `If-None-Match` fast path can run
//! without waiting for the mutex.

use std::time::Duration;

use bytes::Bytes;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;

/// Strong `ETag` for a response body: the quoted lowercase hex SHA-256 digest.
pub fn etag_for(body: &[u8]) -> String {
    format!("\"{}\"", hex::encode(Sha256::digest(body)))
}

/// A filtered body together with its validator.
///
/// The validator is derived from the body at construction, so the pair can
/// never drift apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    validator: String,
    body: Bytes,
}

impl Artifact {
    pub fn new(body: impl Into<Bytes>) -> Self {
        let body = body.into();
        Self {
            validator: etag_for(&body),
            body,
        }
    }

    pub fn validator(&self) -> &str {
        &self.validator
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Whether the client's `If-None-Match` value names this artifact.
    ///
    /// Byte-exact comparison: no weak validators, no lists.
    pub fn matches(&self, if_none_match: Option<&str>) -> bool {
        if_none_match == Some(self.validator.as_str())
    }
}

#[derive(Debug, Default)]
struct CacheEntry {
    /// Origin `ETag`, empty when unknown.
    upstream_validator: String,
    artifact: Option<Artifact>,
    /// Last successful origin interaction (guide feed only).
    last_fetch: Option<Instant>,
}

/// Read-only copy of the cached artifact, used outside the lock.
#[derive(Debug, Clone)]
pub struct CacheSnapshot {
    pub artifact: Artifact,
    pub last_fetch: Option<Instant>,
}

impl CacheSnapshot {
    /// Whether the snapshot was fetched less than `window` before `now`.
    pub fn is_fresh(&self, now: Instant, window: Duration) -> bool {
        is_within(self.last_fetch, now, window)
    }
}

fn is_within(last_fetch: Option<Instant>, now: Instant, window: Duration) -> bool {
    last_fetch.is_some_and(|at| now.saturating_duration_since(at) < window)
}

/// Cache for one feed.
#[derive(Debug, Default)]
pub struct FeedCache {
    entry: Mutex<CacheEntry>,
    snapshot: RwLock<Option<CacheSnapshot>>,
}

impl FeedCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest published state, without taking the entry lock.
    ///
    /// May be stale by the time it is used; callers must confirm any decision
    /// other than a `304` under [`FeedCache::lock`].
    pub fn snapshot(&self) -> Option<CacheSnapshot> {
        self.snapshot.read().clone()
    }

    /// Acquire the entry for a check-and-refresh cycle.
    pub async fn lock(&self) -> CacheGuard<'_> {
        CacheGuard {
            entry: self.entry.lock().await,
            snapshot: &self.snapshot,
        }
    }
}

/// Exclusive access to a feed's cache entry.
pub struct CacheGuard<'a> {
    entry: MutexGuard<'a, CacheEntry>,
    snapshot: &'a RwLock<Option<CacheSnapshot>>,
}

impl CacheGuard<'_> {
    /// Origin validator to send as `If-None-Match`, if one is known.
    pub fn upstream_validator(&self) -> Option<&str> {
        Some(self.entry.upstream_validator.as_str()).filter(|v| !v.is_empty())
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        self.entry.artifact.as_ref()
    }

    pub fn last_fetch(&self) -> Option<Instant> {
        self.entry.last_fetch
    }

    /// The cached artifact if it was fetched less than `window` before `now`.
    pub fn fresh_artifact(&self, now: Instant, window: Duration) -> Option<&Artifact> {
        self.entry
            .artifact
            .as_ref()
            .filter(|_| is_within(self.entry.last_fetch, now, window))
    }

    /// Replace the cached artifact and the origin validator together.
    ///
    /// `fetched_at` stamps the freshness clock; `None` leaves it untouched.
    pub fn store(
        &mut self,
        upstream_validator: String,
        artifact: Artifact,
        fetched_at: Option<Instant>,
    ) -> Artifact {
        self.entry.upstream_validator = upstream_validator;
        self.entry.artifact = Some(artifact.clone());
        if fetched_at.is_some() {
            self.entry.last_fetch = fetched_at;
        }
        self.publish();
        artifact
    }

    /// Move the freshness clock forward without changing the artifact.
    pub fn touch(&mut self, now: Instant) {
        self.entry.last_fetch = Some(now);
        self.publish();
    }

    fn publish(&self) {
        let snapshot = self.entry.artifact.clone().map(|artifact| CacheSnapshot {
            artifact,
            last_fetch: self.entry.last_fetch,
        });
        *self.snapshot.write() = snapshot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_etag_format() {
        let etag = etag_for(b"");
        assert_eq!(
            etag,
            "\"e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855\""
        );
        assert_eq!(etag.len(), 66);
    }

    #[test]
    fn test_artifact_validator_tracks_body() {
        let artifact = Artifact::new(Bytes::from_static(b"#EXTM3U\n"));
        assert_eq!(artifact.validator(), etag_for(b"#EXTM3U\n"));
        assert!(artifact.matches(Some(&etag_for(b"#EXTM3U\n"))));
        assert!(!artifact.matches(None));
        assert!(!artifact.matches(Some("W/\"weak\"")));
    }

    #[tokio::test]
    async fn test_empty_cache() {
        let cache = FeedCache::new();
        assert!(cache.snapshot().is_none());

        let guard = cache.lock().await;
        assert!(guard.upstream_validator().is_none());
        assert!(guard.artifact().is_none());
        assert!(guard.last_fetch().is_none());
    }

    #[tokio::test]
    async fn test_store_publishes_snapshot() {
        let cache = FeedCache::new();
        let now = Instant::now();

        {
            let mut guard = cache.lock().await;
            guard.store("\"v1\"".to_string(), Artifact::new("body"), Some(now));
            assert_eq!(guard.upstream_validator(), Some("\"v1\""));
        }

        let snapshot = cache.snapshot().unwrap();
        assert_eq!(snapshot.artifact.body(), &Bytes::from_static(b"body"));
        assert_eq!(snapshot.last_fetch, Some(now));
    }

    #[tokio::test]
    async fn test_store_without_timestamp_keeps_last_fetch() {
        let cache = FeedCache::new();
        let now = Instant::now();

        let mut guard = cache.lock().await;
        guard.touch(now);
        guard.store(String::new(), Artifact::new("a"), None);

        assert_eq!(guard.last_fetch(), Some(now));
        assert!(guard.upstream_validator().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_freshness_window() {
        let cache = FeedCache::new();
        let window = Duration::from_secs(60);

        let mut guard = cache.lock().await;
        guard.store(String::new(), Artifact::new("a"), Some(Instant::now()));
        assert!(guard.fresh_artifact(Instant::now(), window).is_some());

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(guard.fresh_artifact(Instant::now(), window).is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(guard.fresh_artifact(Instant::now(), window).is_none());
        drop(guard);

        assert!(!cache.snapshot().unwrap().is_fresh(Instant::now(), window));
    }

    #[tokio::test]
    async fn test_touch_without_artifact_publishes_nothing() {
        let cache = FeedCache::new();
        cache.lock().await.touch(Instant::now());
        assert!(cache.snapshot().is_none());
    }
}
