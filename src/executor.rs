use crate::config::FetchConfig;
use crate::fetch::cache::RemoteIndexCache;
use crate::fetch::download::{HttpArtifactClient, RemoteClient};
use crate::fetch::providers::conda::CondaFetcher;
use crate::fetch::result::FetchOutcome;
use crate::model::Request;
use crate::registry::FetcherRegistry;
use crate::traits::FetchError;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, instrument};

/// Semaphore-bounded entry point for queue workers.
///
/// Each worker calls [`FetchExecutor::execute`] with one request at a
/// time; pipelines suspend cooperatively on I/O, so many fetches share a
/// process, bounded by the concurrency limit. No retries happen here —
/// errors propagate for the caller to requeue or dead-letter, skips are
/// final.
pub struct FetchExecutor {
    registry: Arc<FetcherRegistry>,
    semaphore: Arc<Semaphore>,
}

impl FetchExecutor {
    pub fn new(registry: Arc<FetcherRegistry>, concurrency_limit: usize) -> Self {
        Self {
            registry,
            semaphore: Arc::new(Semaphore::new(concurrency_limit)),
        }
    }

    /// Wires the default engine: one HTTP client and index cache shared
    /// by every registered provider fetcher.
    pub fn from_config(config: &FetchConfig) -> Result<Self, FetchError> {
        let client: Arc<dyn RemoteClient> =
            Arc::new(HttpArtifactClient::with_connect_timeout(config.connect_timeout())?);
        let cache = Arc::new(
            RemoteIndexCache::new(&config.cache_dir, client.clone())
                .with_ttl(config.index_ttl()),
        );
        let registry =
            FetcherRegistry::new().register(Arc::new(CondaFetcher::new(cache, client)));
        Ok(Self::new(Arc::new(registry), config.concurrency_limit))
    }

    /// Runs the fetch pipeline for one request to completion.
    ///
    /// A provider no registered fetcher covers is reported as a skip;
    /// everything else is the selected fetcher's outcome, unchanged.
    #[instrument(skip(self, request), fields(coordinate = %request.url))]
    pub async fn execute(&self, request: Request) -> Result<FetchOutcome, FetchError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| FetchError::Executor(format!("Semaphore error: {e}")))?;

        let Some(fetcher) = self.registry.dispatch(&request) else {
            return Ok(FetchOutcome::skip(format!(
                "No fetcher registered for provider {}",
                request.spec.provider
            )));
        };

        info!("Starting fetch via {}", fetcher.id());
        let outcome = fetcher.handle(&request).await;
        match &outcome {
            Ok(FetchOutcome::Fetched(_)) => info!("Fetch complete"),
            Ok(FetchOutcome::Skipped(reason)) => info!(reason = %reason, "Fetch skipped"),
            Err(error) => info!(error = %error, "Fetch failed"),
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Fetcher;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    struct CountingFetcher {
        handled: AtomicUsize,
    }

    #[async_trait]
    impl Fetcher for CountingFetcher {
        fn id(&self) -> &'static str {
            "counting"
        }

        fn can_handle(&self, request: &Request) -> bool {
            request.spec.provider == "conda-forge"
        }

        async fn handle(&self, _request: &Request) -> Result<FetchOutcome, FetchError> {
            self.handled.fetch_add(1, Ordering::SeqCst);
            Ok(FetchOutcome::skip("counted"))
        }
    }

    #[tokio::test]
    async fn test_execute_dispatches_to_matching_fetcher() {
        init_tracing();
        let fetcher = Arc::new(CountingFetcher {
            handled: AtomicUsize::new(0),
        });
        let registry = Arc::new(FetcherRegistry::new().register(fetcher.clone()));
        let executor = FetchExecutor::new(registry, 4);

        let request = Request::new("conda/conda-forge/-/numpy/-").unwrap();
        let outcome = executor.execute(request).await.unwrap();

        assert_eq!(outcome.skip_reason(), Some("counted"));
        assert_eq!(fetcher.handled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsupported_provider_is_a_skip() {
        init_tracing();
        let registry = Arc::new(FetcherRegistry::new());
        let executor = FetchExecutor::new(registry, 1);

        let request = Request::new("conda/foo/-/numpy/-").unwrap();
        let outcome = executor.execute(request).await.unwrap();

        let reason = outcome.skip_reason().unwrap();
        assert!(reason.contains("foo"));
    }
}
