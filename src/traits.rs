use crate::fetch::download::{DecompressionError, DownloadError};
use crate::fetch::result::FetchOutcome;
use crate::model::{MalformedSpecError, Request};
use async_trait::async_trait;
use thiserror::Error;

/// Transient failures of the fetch pipeline.
///
/// Everything here is retryable by the caller; skips are not errors and
/// travel as [`FetchOutcome::Skipped`] instead.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Download failed: {0}")]
    Download(#[from] DownloadError),

    #[error("Decompression failed: {0}")]
    Decompression(#[from] DecompressionError),

    #[error("Malformed index document '{key}': {message}")]
    MalformedIndex { key: String, message: String },

    #[error(transparent)]
    Spec(#[from] MalformedSpecError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Executor unavailable: {0}")]
    Executor(String),
}

/// A per-provider fetch implementation.
///
/// Implementations turn a [`Request`] into a [`FetchOutcome`]: either a
/// complete fetch result or a terminal, non-retryable skip. Transient
/// failures propagate as [`FetchError`] for the caller to retry or
/// dead-letter.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Returns a short identifier for this fetcher, used in logging.
    fn id(&self) -> &'static str;

    /// Capability predicate: true iff this fetcher can serve the request's
    /// provider. Pure function over the parsed spec.
    fn can_handle(&self, request: &Request) -> bool;

    /// Runs the fetch pipeline for one request: validate, resolve identity
    /// fields against the provider's indexes, download, verify, extract,
    /// and build the result document.
    ///
    /// Any temporary resources acquired during the call are released on
    /// every exit path; on success their release is deferred to the
    /// returned result's cleanup handle.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] for transient conditions (network, non-2xx
    /// download status, malformed index, corrupt archive).
    async fn handle(&self, request: &Request) -> Result<FetchOutcome, FetchError>;
}
