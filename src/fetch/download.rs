//! Artifact transfer, content hashing, and archive extraction.
//!
//! [`RemoteClient`] is the seam between the fetch pipeline and the
//! network, so tests can substitute canned transfers. The production
//! implementation streams response bodies straight to disk and never
//! leaves a partially written file behind on failure.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};

/// Fixed, identifiable client identity sent with every request.
const CLIENT_IDENTITY: &str = concat!("package-fetcher/", env!("CARGO_PKG_VERSION"));

/// Read/write chunk size for streaming transfers and digests.
const CHUNK_SIZE: usize = 64 * 1024;

/// Errors raised while transferring a remote artifact.
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Transport-level failure (DNS, connect, TLS, mid-body abort)
    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// The server answered with a non-2xx status
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// The HTTP client itself could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    /// Local write failure
    #[error("I/O error writing download: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while extracting a downloaded archive.
#[derive(Error, Debug)]
pub enum DecompressionError {
    /// The file name carries no recognized archive extension
    #[error("Unsupported archive format: {0}")]
    UnsupportedFormat(String),

    /// The archive could not be read to the end
    #[error("Corrupted archive: {0}")]
    Corrupted(String),

    #[error("I/O error during extraction: {0}")]
    Io(#[from] std::io::Error),
}

/// Streaming GET transfer to a local path.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Downloads `url` to `dest`.
    ///
    /// Resolves only once the full body is written, flushed, and closed.
    /// On any failure the partially written file is removed before the
    /// error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] for transport failures and non-2xx
    /// responses.
    async fn download(&self, url: &str, dest: &Path) -> Result<(), DownloadError>;
}

/// Production [`RemoteClient`] backed by reqwest.
#[derive(Clone)]
pub struct HttpArtifactClient {
    client: reqwest::Client,
}

impl HttpArtifactClient {
    /// Creates a client with a 30 second connect timeout and no total
    /// timeout (artifact bodies can be large).
    pub fn new() -> Result<Self, DownloadError> {
        Self::with_connect_timeout(Duration::from_secs(30))
    }

    pub fn with_connect_timeout(timeout: Duration) -> Result<Self, DownloadError> {
        let client = reqwest::Client::builder()
            .user_agent(CLIENT_IDENTITY)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| DownloadError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RemoteClient for HttpArtifactClient {
    async fn download(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        let transport = |e: reqwest::Error| DownloadError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        };

        let mut response = self.client.get(url).send().await.map_err(transport)?;
        if !response.status().is_success() {
            return Err(DownloadError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let write_result: Result<u64, DownloadError> = async {
            let mut file = tokio::fs::File::create(dest).await?;
            let mut written = 0u64;
            while let Some(chunk) = response.chunk().await.map_err(transport)? {
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await?;
            file.sync_all().await?;
            Ok(written)
        }
        .await;

        match write_result {
            Ok(written) => {
                debug!(url, bytes = written, dest = %dest.display(), "Download complete");
                Ok(())
            }
            Err(e) => {
                // Never leave a partial file behind as a "successful" download
                if let Err(remove_err) = tokio::fs::remove_file(dest).await {
                    if remove_err.kind() != std::io::ErrorKind::NotFound {
                        warn!(dest = %dest.display(), error = %remove_err,
                            "Failed to remove partial download");
                    }
                }
                Err(e)
            }
        }
    }
}

/// Computes the fixed digest set (sha1, sha256) over `path`.
///
/// Streams the file in fixed-size chunks; never loads the whole artifact
/// into memory.
///
/// # Errors
///
/// Returns the underlying I/O error if the file cannot be read.
pub async fn compute_hashes(path: &Path) -> Result<BTreeMap<String, String>, std::io::Error> {
    use sha1::Sha1;
    use sha2::{Digest, Sha256};

    let mut file = tokio::fs::File::open(path).await?;
    let mut sha1 = Sha1::new();
    let mut sha256 = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        sha1.update(&buf[..n]);
        sha256.update(&buf[..n]);
    }

    let mut hashes = BTreeMap::new();
    hashes.insert("sha1".to_string(), hex::encode(sha1.finalize()));
    hashes.insert("sha256".to_string(), hex::encode(sha256.finalize()));
    Ok(hashes)
}

/// Extracts `archive` into `dest`, dispatching on the file name extension.
///
/// Supported: `.tar.gz`/`.tgz`, `.tar.bz2`/`.tbz2`, `.tar`, and zip
/// containers (`.zip`, `.conda`).
///
/// Blocking: callers on an async runtime should run this via
/// `tokio::task::spawn_blocking`.
///
/// # Errors
///
/// Returns [`DecompressionError::UnsupportedFormat`] for unrecognized
/// extensions and [`DecompressionError::Corrupted`] for archives that
/// cannot be read to the end.
pub fn decompress(archive: &Path, dest: &Path) -> Result<(), DecompressionError> {
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    std::fs::create_dir_all(dest)?;
    let file = std::fs::File::open(archive)?;
    let corrupted = |e: std::io::Error| DecompressionError::Corrupted(e.to_string());

    if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") {
        let mut tar = tar::Archive::new(bzip2::read::BzDecoder::new(file));
        tar.unpack(dest).map_err(corrupted)?;
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        let mut tar = tar::Archive::new(flate2::read::GzDecoder::new(file));
        tar.unpack(dest).map_err(corrupted)?;
    } else if name.ends_with(".tar") {
        let mut tar = tar::Archive::new(file);
        tar.unpack(dest).map_err(corrupted)?;
    } else if name.ends_with(".zip") || name.ends_with(".conda") {
        let mut zip = zip::ZipArchive::new(file)
            .map_err(|e| DecompressionError::Corrupted(e.to_string()))?;
        zip.extract(dest)
            .map_err(|e| DecompressionError::Corrupted(e.to_string()))?;
    } else {
        return Err(DecompressionError::UnsupportedFormat(name));
    }

    Ok(())
}

/// In-test archive fixtures shared with the provider tests.
#[cfg(test)]
pub(crate) mod fixtures {
    use std::io::Write;
    use tar::Builder;

    fn append_all(builder: &mut Builder<impl Write>, files: &[(&str, &[u8])]) {
        for (path, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_path(path).unwrap();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append(&header, &content[..]).unwrap();
        }
    }

    pub(crate) fn build_tar_gz(files: &[(&str, &[u8])]) -> Vec<u8> {
        let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        let mut builder = Builder::new(encoder);
        append_all(&mut builder, files);
        builder.into_inner().unwrap().finish().unwrap()
    }

    pub(crate) fn build_tar_bz2(files: &[(&str, &[u8])]) -> Vec<u8> {
        let encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::best());
        let mut builder = Builder::new(encoder);
        append_all(&mut builder, files);
        builder.into_inner().unwrap().finish().unwrap()
    }
}
