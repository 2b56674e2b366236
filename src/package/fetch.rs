//! Downloading source archives.
//!
//! The fetch stage talks to the network only through [`Fetcher`], which
//! lets tests substitute a recording double.

use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;

/// Failure while downloading an archive.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to download {url}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to download {url}: HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("failed to write {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("checksum mismatch for {}:\n  expected: {expected}\n  actual:   {actual}", path.display())]
    Checksum {
        path: PathBuf,
        expected: String,
        actual: String,
    },
}

/// Something that can place the body of a URL at a path.
pub trait Fetcher: Send + Sync {
    /// Download `url` to exactly `dest`. `dest`'s parent exists.
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError>;
}

/// Blocking HTTP(S) downloader.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(None::<Duration>)
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        HttpFetcher { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        let http_error = |source| FetchError::Http {
            url: url.to_string(),
            source,
        };
        let io_error = |source| FetchError::Io {
            path: dest.to_path_buf(),
            source,
        };

        let response = self.client.get(url).send().map_err(http_error)?;
        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let progress = download_progress(response.content_length(), dest);

        // Stream into a sibling temp file so an interrupted download never
        // looks like a cached archive.
        let dir = dest.parent().unwrap_or_else(|| Path::new("."));
        let mut partial = tempfile::NamedTempFile::new_in(dir).map_err(io_error)?;
        io::copy(&mut progress.wrap_read(response), partial.as_file_mut()).map_err(io_error)?;
        partial
            .persist(dest)
            .map_err(|e| io_error(e.error))?;

        progress.finish_and_clear();
        Ok(())
    }
}

fn download_progress(len: Option<u64>, dest: &Path) -> ProgressBar {
    match len {
        Some(len) if io::stderr().is_terminal() => {
            let pb = ProgressBar::new(len);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            let name = dest
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            pb.set_message(name);
            pb
        }
        _ => ProgressBar::hidden(),
    }
}

/// Check a downloaded archive against an expected SHA256.
pub fn verify_checksum(path: &Path, expected: &str) -> Result<(), FetchError> {
    let actual = crate::util::hash::sha256_file(path).map_err(|source| FetchError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(FetchError::Checksum {
            path: path.to_path_buf(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}
