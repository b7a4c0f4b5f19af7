//! Fetch module - the fetch-dispatch pipeline building blocks.
//!
//! This module provides the core pieces a provider fetcher composes:
//! - **Results**: [`FetchOutcome`], [`FetchResult`], [`FetchDocument`]
//! - **Transfer**: [`download::RemoteClient`] and streaming hash/extract helpers
//! - **Indexes**: [`cache::RemoteIndexCache`] with TTL and single-flight refresh
//! - **Matching**: [`matcher::match_releases`] over dimension index entries
//! - **Temp resources**: [`temp::ScopedTemp`] with guaranteed release

pub mod cache;
pub mod download;
pub mod matcher;
pub mod providers;
pub mod result;
pub mod temp;

// Re-export commonly used types
pub use cache::{CacheKey, RemoteIndexCache, DEFAULT_INDEX_TTL};
pub use download::{
    compute_hashes, decompress, DecompressionError, DownloadError, HttpArtifactClient,
    RemoteClient,
};
pub use matcher::{match_releases, RepoEntry};
pub use result::{CleanupHandle, FetchDocument, FetchOutcome, FetchResult, RegistryData};
pub use temp::ScopedTemp;
