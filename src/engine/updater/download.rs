//! HTTP Download Manager
//!
//! Handles artifact downloads with resume support and progress tracking.

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, CONTENT_LENGTH, ETAG, IF_RANGE, LAST_MODIFIED, RANGE};
use reqwest::{StatusCode, Url};
use std::fs::{self, File};
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Download result with metadata
#[derive(Debug)]
pub struct DownloadResult {
    pub path: PathBuf,
    pub bytes_downloaded: u64,
    pub resumed: bool,
}

/// Snapshot handed to the progress callback
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadProgress {
    /// 0 to 100, never decreasing within one download
    pub percent: f64,
    pub transferred: u64,
    /// 0 while the server has not announced a length
    pub total: u64,
}

impl DownloadProgress {
    fn new(transferred: u64, total: u64) -> Self {
        let percent = if total > 0 {
            (transferred as f64 / total as f64 * 100.0).min(100.0)
        } else {
            0.0
        };
        Self {
            percent,
            transferred,
            total,
        }
    }
}

/// Download error types
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Download stalled for {0:?}")]
    Timeout(Duration),
}

impl From<reqwest::Error> for DownloadError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

/// Inactivity limit used when none is configured
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(9_000);

/// Download manager for update artifacts
pub struct Downloader {
    client: reqwest::Client,
    idle_timeout: Duration,
}

impl Downloader {
    /// Create a new downloader
    pub fn new(user_agent: &str) -> Self {
        let client = match reqwest::Client::builder().user_agent(user_agent).build() {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(error = %e, "falling back to default download client");
                reqwest::Client::default()
            }
        };
        Self {
            client,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    /// Longest wait for the response head or the next body chunk
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    async fn within<T>(&self, fut: impl Future<Output = T>) -> Result<T, DownloadError> {
        tokio::time::timeout(self.idle_timeout, fut)
            .await
            .map_err(|_| DownloadError::Timeout(self.idle_timeout))
    }

    /// Download a file with progress callback
    ///
    /// Resumes from `<dest>.partial` only when the validator (ETag or
    /// Last-Modified) recorded with it is still current, using `If-Range`; any
    /// other leftover is discarded. The callback always receives a final 100%
    /// snapshot.
    pub async fn download<F>(
        &self,
        url: &Url,
        dest: &Path,
        mut on_progress: F,
    ) -> Result<DownloadResult, DownloadError>
    where
        F: FnMut(DownloadProgress),
    {
        let partial_path = partial_path(dest);
        let validator_path = validator_path(dest);
        if let Some(parent) = partial_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut start_byte: u64 = 0;
        let mut validator = None;
        if partial_path.exists() {
            match fs::read_to_string(&validator_path) {
                Ok(saved) if !saved.trim().is_empty() => {
                    start_byte = fs::metadata(&partial_path)?.len();
                    validator = Some(saved.trim().to_string());
                }
                _ => {
                    tracing::debug!(partial = %partial_path.display(), "discarding unverifiable partial download");
                    fs::remove_file(&partial_path)?;
                }
            }
        }

        // Build request with range header if resuming
        let mut request = self.client.get(url.clone());
        if let (true, Some(validator)) = (start_byte > 0, validator.as_deref()) {
            request = request
                .header(RANGE, format!("bytes={}-", start_byte))
                .header(IF_RANGE, validator);
        }

        let response = self.within(request.send()).await??;
        let status = response.status();

        if !status.is_success() {
            return Err(DownloadError::InvalidResponse(format!("HTTP {}", status)));
        }

        // Server ignored the range request or the artifact changed: start over
        if start_byte > 0 && status != StatusCode::PARTIAL_CONTENT {
            start_byte = 0;
        }
        let resumed = start_byte > 0;

        let mut file = if resumed {
            fs::OpenOptions::new().append(true).open(&partial_path)?
        } else {
            match response_validator(response.headers()) {
                Some(value) => fs::write(&validator_path, value)?,
                None => remove_if_exists(&validator_path)?,
            }
            File::create(&partial_path)?
        };

        let mut total_size = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|len| len.to_str().ok())
            .and_then(|len| len.parse::<u64>().ok())
            .map(|len| len + start_byte)
            .unwrap_or(0);

        let mut downloaded = start_byte;
        on_progress(DownloadProgress::new(downloaded, total_size));

        let mut stream = response.bytes_stream();

        while let Some(chunk_result) = self.within(stream.next()).await? {
            let chunk = chunk_result?;
            file.write_all(&chunk)?;
            downloaded += chunk.len() as u64;
            if downloaded > total_size && total_size > 0 {
                // Content-Length lied; stop claiming a percentage past 100
                total_size = downloaded;
            }
            on_progress(DownloadProgress::new(downloaded, total_size));
        }

        file.flush()?;
        drop(file);

        if total_size == 0 || downloaded < total_size {
            if total_size > 0 {
                return Err(DownloadError::InvalidResponse(format!(
                    "connection closed after {} of {} bytes",
                    downloaded, total_size
                )));
            }
            total_size = downloaded;
        }
        on_progress(DownloadProgress::new(downloaded, total_size));

        // Rename to final destination
        fs::rename(&partial_path, dest)?;
        remove_if_exists(&validator_path)?;

        Ok(DownloadResult {
            path: dest.to_path_buf(),
            bytes_downloaded: downloaded,
            resumed,
        })
    }
}

/// Strong ETag, else Last-Modified; weak ETags cannot be used with If-Range
fn response_validator(headers: &HeaderMap) -> Option<String> {
    let etag = headers
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.starts_with("W/"));
    etag.or_else(|| headers.get(LAST_MODIFIED).and_then(|v| v.to_str().ok()))
        .map(str::to_string)
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn validator_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".partial.validator");
    PathBuf::from(name)
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

/// File name for a downloaded artifact.
///
/// Uses the last URL path segment, falling back to `<app>-<version>` when the
/// URL ends in a directory.
pub fn artifact_file_name(url: &Url, app_name: &str, version: &str) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}-{}", app_name, version))
}

/// Per-version directory under `root`, so artifacts published under a fixed
/// name never share a partial file across releases
pub fn version_dir(root: &Path, version: &str) -> PathBuf {
    let name: String = version
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || "._-+".contains(c) { c } else { '_' })
        .collect();
    match name.trim_matches('.') {
        "" => root.join("unversioned"),
        _ => root.join(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percent() {
        assert_eq!(DownloadProgress::new(50, 200).percent, 25.0);
        assert_eq!(DownloadProgress::new(10, 0).percent, 0.0);
        assert_eq!(DownloadProgress::new(300, 200).percent, 100.0);
    }

    #[test]
    fn test_partial_path_keeps_extension() {
        assert_eq!(
            partial_path(Path::new("/tmp/OGforge-1.2.0.dmg")),
            PathBuf::from("/tmp/OGforge-1.2.0.dmg.partial")
        );
    }

    #[test]
    fn test_version_dir_is_a_single_component() {
        let root = Path::new("/cache/updates");
        assert_eq!(version_dir(root, "1.2.0"), root.join("1.2.0"));
        assert_eq!(version_dir(root, "../../etc"), root.join(".._.._etc"));
        assert_eq!(version_dir(root, ".."), root.join("unversioned"));
    }

    #[test]
    fn test_response_validator_prefers_strong_etag() {
        let mut headers = HeaderMap::new();
        headers.insert(LAST_MODIFIED, "Tue, 01 Sep 2026 10:00:00 GMT".parse().unwrap());
        assert_eq!(
            response_validator(&headers).as_deref(),
            Some("Tue, 01 Sep 2026 10:00:00 GMT")
        );

        headers.insert(ETAG, "W/\"weak\"".parse().unwrap());
        assert_eq!(
            response_validator(&headers).as_deref(),
            Some("Tue, 01 Sep 2026 10:00:00 GMT")
        );

        headers.insert(ETAG, "\"v1.2.0\"".parse().unwrap());
        assert_eq!(response_validator(&headers).as_deref(), Some("\"v1.2.0\""));
        assert!(response_validator(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_artifact_file_name() {
        let url = Url::parse("https://host/downloads/OGforge-1.2.0.dmg?sig=1").unwrap();
        assert_eq!(artifact_file_name(&url, "OGforge", "1.2.0"), "OGforge-1.2.0.dmg");

        let url = Url::parse("https://host/downloads/").unwrap();
        assert_eq!(artifact_file_name(&url, "OGforge", "1.2.0"), "OGforge-1.2.0");
    }
}
