//! Time-bounded local cache of large remote index documents.
//!
//! One cache instance is constructed at startup and shared by every
//! fetcher. Entries are keyed by `(provider, dimension)`; a fresh entry is
//! served from disk without any network call, a stale or cold entry is
//! refreshed lazily on access. Refreshes are single-flight per key so
//! concurrent misses share one in-flight download.

use crate::fetch::download::RemoteClient;
use crate::traits::FetchError;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Index entries stay fresh for 8 hours after a successful refresh.
pub const DEFAULT_INDEX_TTL: Duration = Duration::from_secs(8 * 60 * 60);

/// Cache key: provider plus optional dimension (e.g. architecture).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub provider: String,
    pub dimension: Option<String>,
}

impl CacheKey {
    /// Channel-level index key (one file per provider).
    pub fn channel(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            dimension: None,
        }
    }

    /// Dimension-level index key (one file per provider + dimension).
    pub fn dimension(provider: &str, dimension: &str) -> Self {
        Self {
            provider: provider.to_string(),
            dimension: Some(dimension.to_string()),
        }
    }

    /// Backing file name for this key.
    pub fn file_name(&self) -> String {
        match &self.dimension {
            Some(dimension) => format!("{}-{}.json", self.provider, dimension),
            None => format!("{}.json", self.provider),
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    fresh_until: Option<Instant>,
}

/// TTL'd, single-flight cache of provider-published JSON indexes.
///
/// Documents are fetched verbatim (streaming GET, no hashing) and cached
/// unmodified on disk under the cache root.
pub struct RemoteIndexCache {
    root: PathBuf,
    ttl: Duration,
    client: Arc<dyn RemoteClient>,
    slots: Mutex<HashMap<CacheKey, Arc<Mutex<Slot>>>>,
}

impl RemoteIndexCache {
    pub fn new(root: impl Into<PathBuf>, client: Arc<dyn RemoteClient>) -> Self {
        Self {
            root: root.into(),
            ttl: DEFAULT_INDEX_TTL,
            client,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Overrides the freshness TTL (default 8 hours).
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    async fn slot(&self, key: &CacheKey) -> Arc<Mutex<Slot>> {
        let mut slots = self.slots.lock().await;
        slots.entry(key.clone()).or_default().clone()
    }

    /// Returns the parsed index for `key`, refreshing from `source_url`
    /// when the entry is cold or past its TTL.
    ///
    /// A refresh failure serves the stale copy when a previous refresh
    /// succeeded and returns `Ok(None)` ("index unavailable") on a cold
    /// cache; the caller treats `None` as a skip, not a failure.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::MalformedIndex`] when the cached document
    /// cannot be parsed, and [`FetchError::Io`] on local read failures —
    /// both transient from the caller's point of view.
    pub async fn get_or_refresh(
        &self,
        key: &CacheKey,
        source_url: &str,
    ) -> Result<Option<serde_json::Value>, FetchError> {
        // Per-key lock held across the freshness check and the download:
        // concurrent misses on the same key wait here and then see a fresh
        // entry instead of racing a second transfer.
        let slot = self.slot(key).await;
        let mut slot = slot.lock().await;

        let path = self.root.join(key.file_name());
        let fresh = slot
            .fresh_until
            .is_some_and(|until| Instant::now() < until)
            && path.exists();

        if !fresh {
            tokio::fs::create_dir_all(&self.root).await?;

            // Stage the transfer next to the final path so a failed
            // refresh never clobbers a previously cached copy.
            let staged = self.root.join(format!("{}.part", key.file_name()));
            match self.client.download(source_url, &staged).await {
                Ok(()) => {
                    tokio::fs::rename(&staged, &path).await?;
                    slot.fresh_until = Some(Instant::now() + self.ttl);
                    debug!(key = %key.file_name(), url = source_url, "Index refreshed");
                }
                Err(e) => {
                    warn!(key = %key.file_name(), url = source_url, error = %e,
                        "Index refresh failed");
                    if slot.fresh_until.is_none() || !path.exists() {
                        // Cold cache with a failed first fetch: nothing to
                        // fall back to.
                        return Ok(None);
                    }
                    debug!(key = %key.file_name(), "Serving stale index copy");
                }
            }
        }

        let raw = tokio::fs::read(&path).await?;
        let document =
            serde_json::from_slice(&raw).map_err(|e| FetchError::MalformedIndex {
                key: key.file_name(),
                message: e.to_string(),
            })?;
        Ok(Some(document))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::download::DownloadError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts transfers; fails every call after the first `succeed` ones.
    struct CountingClient {
        payload: Vec<u8>,
        hits: AtomicUsize,
        succeed: usize,
    }

    impl CountingClient {
        fn new(payload: &[u8]) -> Self {
            Self {
                payload: payload.to_vec(),
                hits: AtomicUsize::new(0),
                succeed: usize::MAX,
            }
        }

        fn failing_after(payload: &[u8], succeed: usize) -> Self {
            Self {
                payload: payload.to_vec(),
                hits: AtomicUsize::new(0),
                succeed,
            }
        }

        fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RemoteClient for CountingClient {
        async fn download(&self, url: &str, dest: &std::path::Path) -> Result<(), DownloadError> {
            let hit = self.hits.fetch_add(1, Ordering::SeqCst);
            if hit >= self.succeed {
                return Err(DownloadError::Status {
                    status: 503,
                    url: url.to_string(),
                });
            }
            tokio::fs::write(dest, &self.payload).await?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_fresh_entry_skips_network() {
        let root = tempfile::tempdir().unwrap();
        let client = Arc::new(CountingClient::new(b"{\"subdirs\":[\"noarch\"]}"));
        let cache = RemoteIndexCache::new(root.path(), client.clone());
        let key = CacheKey::channel("conda-forge");

        let first = cache.get_or_refresh(&key, "https://x/channeldata.json").await.unwrap();
        let second = cache.get_or_refresh(&key, "https://x/channeldata.json").await.unwrap();

        assert_eq!(client.hits(), 1);
        assert_eq!(first, second);
        assert_eq!(first.unwrap()["subdirs"][0], "noarch");
    }

    #[tokio::test]
    async fn test_concurrent_cold_misses_share_one_download() {
        let root = tempfile::tempdir().unwrap();
        let client = Arc::new(CountingClient::new(b"{}"));
        let cache = Arc::new(RemoteIndexCache::new(root.path(), client.clone()));
        let key = CacheKey::dimension("conda-forge", "linux-64");

        let a = cache.clone();
        let b = cache.clone();
        let key_a = key.clone();
        let key_b = key.clone();
        let (ra, rb) = tokio::join!(
            async move { a.get_or_refresh(&key_a, "https://x/repodata.json").await },
            async move { b.get_or_refresh(&key_b, "https://x/repodata.json").await },
        );

        assert!(ra.unwrap().is_some());
        assert!(rb.unwrap().is_some());
        assert_eq!(client.hits(), 1);
    }

    #[tokio::test]
    async fn test_cold_cache_download_failure_returns_none() {
        let root = tempfile::tempdir().unwrap();
        let client = Arc::new(CountingClient::failing_after(b"{}", 0));
        let cache = RemoteIndexCache::new(root.path(), client);
        let key = CacheKey::channel("conda-forge");

        let result = cache.get_or_refresh(&key, "https://x/channeldata.json").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_stale_copy_served_after_failed_refresh() {
        let root = tempfile::tempdir().unwrap();
        let client = Arc::new(CountingClient::failing_after(b"{\"v\":1}", 1));
        // Zero TTL forces a refresh attempt on every access
        let cache = RemoteIndexCache::new(root.path(), client.clone())
            .with_ttl(Duration::ZERO);
        let key = CacheKey::channel("anaconda-main");

        let first = cache.get_or_refresh(&key, "https://x/channeldata.json").await.unwrap();
        assert!(first.is_some());

        // Second access: refresh fails, stale copy comes back
        let second = cache.get_or_refresh(&key, "https://x/channeldata.json").await.unwrap();
        assert_eq!(second.unwrap()["v"], 1);
        assert_eq!(client.hits(), 2);
    }

    #[tokio::test]
    async fn test_malformed_document_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let client = Arc::new(CountingClient::new(b"not json"));
        let cache = RemoteIndexCache::new(root.path(), client);
        let key = CacheKey::channel("conda-forge");

        let result = cache.get_or_refresh(&key, "https://x/channeldata.json").await;
        assert!(matches!(result, Err(FetchError::MalformedIndex { .. })));
    }

    #[test]
    fn test_key_file_layout() {
        assert_eq!(CacheKey::channel("conda-forge").file_name(), "conda-forge.json");
        assert_eq!(
            CacheKey::dimension("conda-forge", "linux-64").file_name(),
            "conda-forge-linux-64.json"
        );
    }
}
