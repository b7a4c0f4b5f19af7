//! Exemplar provider: conda channels.
//!
//! Serves the `conda` (binary package) and `condasrc` (source archive)
//! artifact kinds from the anaconda.org / repo.anaconda.com channels.
//! Identity resolution walks two index levels: `channeldata.json` at the
//! channel root (per-component metadata and advertised architecture
//! dimensions) and `{architecture}/repodata.json` (concrete builds).

use crate::fetch::cache::{CacheKey, RemoteIndexCache};
use crate::fetch::download::{compute_hashes, decompress, RemoteClient};
use crate::fetch::matcher::{match_releases, RepoEntry};
use crate::fetch::result::{FetchDocument, FetchOutcome, FetchResult, RegistryData};
use crate::fetch::temp::ScopedTemp;
use crate::model::{Request, Spec};
use crate::traits::{FetchError, Fetcher};
use async_trait::async_trait;
use chrono::DateTime;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

const TYPE_BINARY: &str = "conda";
const TYPE_SOURCE: &str = "condasrc";

/// Architecture-independent dimension, preferred when advertised.
const NOARCH: &str = "noarch";

/// Channels this fetcher serves: provider id → channel base URL.
fn channel_base(provider: &str) -> Option<&'static str> {
    match provider {
        "conda-forge" => Some("https://conda.anaconda.org/conda-forge"),
        "anaconda-main" => Some("https://repo.anaconda.com/pkgs/main"),
        "anaconda-r" => Some("https://repo.anaconda.com/pkgs/r"),
        _ => None,
    }
}

/// Renders an epoch timestamp as the fixed calendar text form.
fn release_date_from_millis(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|t| t.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
        .unwrap_or_default()
}

fn release_date_from_seconds(seconds: i64) -> String {
    release_date_from_millis(seconds.saturating_mul(1000))
}

fn string_list(value: &Value, field: &str) -> Vec<String> {
    value
        .get(field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Per-provider fetcher for conda channels.
pub struct CondaFetcher {
    cache: Arc<RemoteIndexCache>,
    client: Arc<dyn RemoteClient>,
    temp_root: Option<PathBuf>,
}

impl CondaFetcher {
    pub fn new(cache: Arc<RemoteIndexCache>, client: Arc<dyn RemoteClient>) -> Self {
        Self {
            cache,
            client,
            temp_root: None,
        }
    }

    /// Overrides where per-request temp resources are created (default:
    /// the system temp directory).
    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }

    fn acquire_temp(&self, artifact_name: &str) -> std::io::Result<ScopedTemp> {
        match &self.temp_root {
            Some(root) => ScopedTemp::acquire_in(root, "conda", artifact_name),
            None => ScopedTemp::acquire("conda", artifact_name),
        }
    }

    /// Shared tail of both artifact kinds: download, extract, hash, and
    /// assemble the result with cleanup adopted by it.
    async fn fetch_artifact(
        &self,
        download_url: String,
        artifact_name: &str,
        registry_data: RegistryData,
        release_date: String,
        declared_licenses: Option<String>,
        cased_spec: Spec,
    ) -> Result<FetchOutcome, FetchError> {
        let temp = self.acquire_temp(artifact_name)?;

        // Any failure from here on drops `temp`, which removes both the
        // partial artifact and the extraction dir.
        self.client.download(&download_url, temp.file()).await?;

        let archive = temp.file().to_path_buf();
        let contents = temp.dir().to_path_buf();
        tokio::task::spawn_blocking(move || decompress(&archive, &contents)).await??;

        let hashes = compute_hashes(temp.file()).await?;

        debug!(url = %download_url, location = %temp.dir().display(), "Artifact fetched");

        let document = FetchDocument {
            location: temp.dir().to_path_buf(),
            registry_data,
            release_date,
            declared_licenses,
            hashes,
            cased_spec,
        };
        Ok(FetchOutcome::Fetched(FetchResult::new(document, temp.adopt())))
    }

    async fn handle_source(
        &self,
        spec: &Spec,
        cased_name: &str,
        package_data: &Value,
        architecture: &str,
    ) -> Result<FetchOutcome, FetchError> {
        let Some(source_url) = package_data.get("source_url").and_then(Value::as_str) else {
            return Ok(FetchOutcome::skip(format!(
                "Missing source file URL in channel data for {cased_name}"
            )));
        };

        let channel_version = package_data
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if let Some(version) = spec.version.as_deref() {
            if version != channel_version {
                return Ok(FetchOutcome::skip(format!(
                    "Version {version} of {cased_name} does not match channel version \
                     {channel_version} in {}",
                    spec.provider
                )));
            }
        }

        let artifact_name = source_url.rsplit('/').next().unwrap_or("source.tar.gz");
        let registry_data = RegistryData {
            channel_data: Some(package_data.clone()),
            repo_data: None,
            download_url: source_url.to_string(),
        };
        let release_date = package_data
            .get("timestamp")
            .and_then(Value::as_i64)
            .map(release_date_from_seconds)
            .unwrap_or_default();
        let declared_licenses = package_data
            .get("license")
            .and_then(Value::as_str)
            .map(str::to_string);
        let cased_spec = spec.with_resolution(
            Some(cased_name),
            Some(architecture),
            Some(channel_version),
            None,
        );

        self.fetch_artifact(
            source_url.to_string(),
            artifact_name,
            registry_data,
            release_date,
            declared_licenses,
            cased_spec,
        )
        .await
    }

    async fn handle_binary(
        &self,
        spec: &Spec,
        base: &str,
        channel: &str,
        cased_name: &str,
        package_data: &Value,
        package_subdirs: &[String],
        architecture: &str,
    ) -> Result<FetchOutcome, FetchError> {
        if !package_subdirs.iter().any(|s| s == architecture) {
            return Ok(FetchOutcome::skip(format!(
                "Architecture {architecture} is not available for {cased_name} in {channel}"
            )));
        }

        let key = CacheKey::dimension(channel, architecture);
        let repodata_url = format!("{base}/{architecture}/repodata.json");
        let Some(repodata) = self.cache.get_or_refresh(&key, &repodata_url).await? else {
            return Ok(FetchOutcome::skip(format!(
                "Architecture index for {channel}/{architecture} is unavailable"
            )));
        };

        let entries = parse_repo_entries(&repodata, &key)?;
        let matches = match_releases(
            &entries,
            cased_name,
            spec.version.as_deref(),
            spec.build.as_deref(),
        );
        let Some(entry) = matches.first() else {
            return Ok(FetchOutcome::skip(format!(
                "Missing build of {cased_name} with version {} and build {} on architecture \
                 {architecture} in {channel}",
                spec.version.as_deref().unwrap_or("any"),
                spec.build.as_deref().unwrap_or("any"),
            )));
        };
        if matches.len() > 1 {
            debug!(
                candidates = matches.len(),
                chosen = %entry.file_name,
                "Multiple builds matched; taking the best-ordered one"
            );
        }

        let download_url = format!("{base}/{architecture}/{}", entry.file_name);
        let registry_data = RegistryData {
            channel_data: Some(package_data.clone()),
            repo_data: Some(serde_json::to_value(entry).unwrap_or(Value::Null)),
            download_url: download_url.clone(),
        };
        let release_date = entry
            .timestamp
            .map(release_date_from_millis)
            .unwrap_or_default();
        let cased_spec = spec.with_resolution(
            Some(cased_name),
            Some(architecture),
            Some(entry.version.as_str()),
            Some(entry.build.as_str()),
        );
        let artifact_name = entry.file_name.clone();
        let declared_licenses = entry.license.clone();

        self.fetch_artifact(
            download_url,
            &artifact_name,
            registry_data,
            release_date,
            declared_licenses,
            cased_spec,
        )
        .await
    }
}

/// Flattens the `packages` and `packages.conda` maps of a repodata
/// document into entries carrying their file names.
fn parse_repo_entries(repodata: &Value, key: &CacheKey) -> Result<Vec<RepoEntry>, FetchError> {
    let mut entries = Vec::new();
    for map_name in ["packages", "packages.conda"] {
        let Some(map) = repodata.get(map_name).and_then(Value::as_object) else {
            continue;
        };
        for (file_name, raw) in map {
            let mut entry: RepoEntry = serde_json::from_value(raw.clone()).map_err(|e| {
                FetchError::MalformedIndex {
                    key: key.file_name(),
                    message: format!("entry '{file_name}': {e}"),
                }
            })?;
            entry.file_name = file_name.clone();
            entries.push(entry);
        }
    }
    Ok(entries)
}

#[async_trait]
impl Fetcher for CondaFetcher {
    fn id(&self) -> &'static str {
        "conda"
    }

    fn can_handle(&self, request: &Request) -> bool {
        channel_base(&request.spec.provider.to_ascii_lowercase()).is_some()
    }

    async fn handle(&self, request: &Request) -> Result<FetchOutcome, FetchError> {
        let spec = &request.spec;

        if spec.artifact_type != TYPE_BINARY && spec.artifact_type != TYPE_SOURCE {
            return Ok(FetchOutcome::skip(format!(
                "Unrecognized component type {} for the conda fetcher",
                spec.artifact_type
            )));
        }

        let channel = spec.provider.to_ascii_lowercase();
        let Some(base) = channel_base(&channel) else {
            return Ok(FetchOutcome::skip(format!(
                "Unrecognized conda channel {}",
                spec.provider
            )));
        };

        let channel_key = CacheKey::channel(&channel);
        let channeldata_url = format!("{base}/channeldata.json");
        let Some(channel_data) = self
            .cache
            .get_or_refresh(&channel_key, &channeldata_url)
            .await?
        else {
            return Ok(FetchOutcome::skip(format!(
                "Channel index for {channel} is unavailable"
            )));
        };

        let channel_subdirs = string_list(&channel_data, "subdirs");
        if channel_subdirs.is_empty() {
            return Ok(FetchOutcome::skip(format!(
                "Channel {channel} publishes no architecture dimensions"
            )));
        }

        // Case-insensitive lookup; the channel's key casing is
        // authoritative and is what the result records.
        let packages = channel_data.get("packages").and_then(Value::as_object);
        let Some((cased_name, package_data)) = packages.and_then(|map| {
            map.iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(&spec.name))
        }) else {
            return Ok(FetchOutcome::skip(format!(
                "Package {} not found in channel {channel}",
                spec.name
            )));
        };

        let mut package_subdirs = string_list(package_data, "subdirs");
        if package_subdirs.is_empty() {
            package_subdirs = channel_subdirs;
        }

        // Lenient default when no architecture was requested: prefer the
        // architecture-independent dimension, else the first advertised
        // one. An explicitly requested architecture is checked strictly in
        // the binary branch; a later zero-match never falls back to
        // another dimension.
        let architecture = match spec.namespace.as_deref() {
            Some(namespace) => namespace.to_string(),
            None if package_subdirs.iter().any(|s| s == NOARCH) => NOARCH.to_string(),
            None => package_subdirs[0].clone(),
        };

        info!(
            coordinate = %request.url,
            architecture = %architecture,
            "Resolved fetch target"
        );

        if spec.artifact_type == TYPE_SOURCE {
            self.handle_source(spec, cased_name, package_data, &architecture)
                .await
        } else {
            self.handle_binary(
                spec,
                base,
                &channel,
                cased_name,
                package_data,
                &package_subdirs,
                &architecture,
            )
            .await
        }
    }
}
