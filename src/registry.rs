//! Capability-based dispatch of requests to provider fetchers.

use crate::model::Request;
use crate::traits::Fetcher;
use std::sync::Arc;
use tracing::debug;

/// Startup-populated table of provider fetchers.
///
/// Dispatch returns the first fetcher whose `can_handle` predicate
/// accepts the request. Registering two fetchers with overlapping
/// predicates is a configuration error; the table is not defended against
/// it and simply keeps registration order.
#[derive(Default)]
pub struct FetcherRegistry {
    fetchers: Vec<Arc<dyn Fetcher>>,
}

impl FetcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a fetcher. Builder-style so startup wiring reads as one
    /// expression; there is no runtime mutation after that.
    pub fn register(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetchers.push(fetcher);
        self
    }

    /// Selects the fetcher able to handle `request`, if any.
    ///
    /// `None` means no registered provider covers the request's spec; the
    /// caller surfaces that as an unsupported-provider condition.
    pub fn dispatch(&self, request: &Request) -> Option<Arc<dyn Fetcher>> {
        let found = self
            .fetchers
            .iter()
            .find(|fetcher| fetcher.can_handle(request))
            .cloned();
        if found.is_none() {
            debug!(provider = %request.spec.provider, "No fetcher matches provider");
        }
        found
    }

    pub fn len(&self) -> usize {
        self.fetchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fetchers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::result::FetchOutcome;
    use crate::traits::FetchError;
    use async_trait::async_trait;

    struct ProviderStub {
        id: &'static str,
        provider: &'static str,
    }

    #[async_trait]
    impl Fetcher for ProviderStub {
        fn id(&self) -> &'static str {
            self.id
        }

        fn can_handle(&self, request: &Request) -> bool {
            request.spec.provider == self.provider
        }

        async fn handle(&self, _request: &Request) -> Result<FetchOutcome, FetchError> {
            Ok(FetchOutcome::skip("stub"))
        }
    }

    fn registry() -> FetcherRegistry {
        FetcherRegistry::new()
            .register(Arc::new(ProviderStub {
                id: "alpha",
                provider: "conda-forge",
            }))
            .register(Arc::new(ProviderStub {
                id: "beta",
                provider: "anaconda-main",
            }))
    }

    #[test]
    fn test_dispatch_selects_matching_fetcher() {
        let registry = registry();
        let request = Request::new("conda/anaconda-main/-/numpy/-").unwrap();
        let fetcher = registry.dispatch(&request).unwrap();
        assert_eq!(fetcher.id(), "beta");
    }

    #[test]
    fn test_dispatch_unknown_provider_returns_none() {
        let registry = registry();
        let request = Request::new("conda/foo/-/numpy/-").unwrap();
        assert!(registry.dispatch(&request).is_none());
    }

    #[test]
    fn test_first_registration_wins() {
        let registry = FetcherRegistry::new()
            .register(Arc::new(ProviderStub {
                id: "first",
                provider: "conda-forge",
            }))
            .register(Arc::new(ProviderStub {
                id: "second",
                provider: "conda-forge",
            }));
        let request = Request::new("conda/conda-forge/-/numpy/-").unwrap();
        assert_eq!(registry.dispatch(&request).unwrap().id(), "first");
    }
}
