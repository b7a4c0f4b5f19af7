//! Fetch outcomes and the result document handed to downstream analysis.

use crate::model::Spec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::warn;

/// Registry-side provenance for a fetched artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryData {
    /// Per-component channel metadata, verbatim from the channel index
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_data: Option<serde_json::Value>,

    /// Matched dimension-level index entry, when the artifact came from one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_data: Option<serde_json::Value>,

    /// Resolved canonical download URL
    pub download_url: String,
}

/// Structured result document persisted/forwarded to license analysis.
///
/// `location` is a read-only filesystem tree for the consumer;
/// `declared_licenses` is a non-authoritative hint and may be absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchDocument {
    /// Path to the extracted artifact contents
    pub location: PathBuf,

    /// Provenance metadata from the registry indexes
    pub registry_data: RegistryData,

    /// Release timestamp in fixed calendar text form
    pub release_date: String,

    /// License field recorded by the registry, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_licenses: Option<String>,

    /// Content digests of the downloaded artifact, hex-encoded by algorithm
    pub hashes: BTreeMap<String, String>,

    /// Resolved spec with the provider's authoritative casing
    pub cased_spec: Spec,
}

/// Exactly-once, idempotent release of adopted temp paths.
///
/// Safe to call from any thread and safe to call again after the
/// underlying paths were already removed.
#[derive(Debug)]
pub struct CleanupHandle {
    paths: Mutex<Vec<PathBuf>>,
}

impl CleanupHandle {
    pub(crate) fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths: Mutex::new(paths),
        }
    }

    /// A handle that owns nothing; releasing it is a no-op.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Removes the owned paths. The first call takes them; later calls see
    /// an empty list and do nothing.
    pub fn release(&self) {
        let paths = match self.paths.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(_) => return,
        };
        for path in paths {
            let removed = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            if let Err(e) = removed {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "Failed to release fetch resource");
                }
            }
        }
    }
}

/// A complete fetch result: the document plus cleanup ownership of the
/// temporary resources backing `document.location`.
///
/// The consumer calls [`FetchResult::release`] once it is done with the
/// extracted tree; dropping the result without releasing is a backstop
/// that cleans up anyway.
#[derive(Debug)]
pub struct FetchResult {
    /// The structured result document
    pub document: FetchDocument,

    cleanup: CleanupHandle,
}

impl FetchResult {
    pub fn new(document: FetchDocument, cleanup: CleanupHandle) -> Self {
        Self { document, cleanup }
    }

    /// Releases the temporary resources backing this result.
    pub fn release(&self) {
        self.cleanup.release();
    }
}

impl Drop for FetchResult {
    fn drop(&mut self) {
        self.cleanup.release();
    }
}

/// Terminal outcome of a fetch pipeline run.
///
/// Exactly one of {`Fetched`, `Skipped`, a propagated error} results from
/// a `handle()` call; a skip is deliberate and never retried.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Artifact downloaded, verified, and extracted
    Fetched(FetchResult),

    /// Terminal, non-retryable miss with a human-readable reason naming
    /// the missing identity component
    Skipped(String),
}

impl FetchOutcome {
    pub fn skip(reason: impl Into<String>) -> Self {
        Self::Skipped(reason.into())
    }

    pub fn is_fetched(&self) -> bool {
        matches!(self, Self::Fetched(_))
    }

    pub fn skip_reason(&self) -> Option<&str> {
        match self {
            Self::Skipped(reason) => Some(reason),
            Self::Fetched(_) => None,
        }
    }

    pub fn result(&self) -> Option<&FetchResult> {
        match self {
            Self::Fetched(result) => Some(result),
            Self::Skipped(_) => None,
        }
    }
}
