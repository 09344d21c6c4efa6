use chrono::NaiveDate;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};
use url::Url;

use crate::fetch_error::FetchError;
use crate::fetcher::PageFetcher;
use crate::link_extractor::BulletinLink;

/// Everything after this marker in a bulletin URL is the local file name
pub const FILE_NAME_MARKER: &str = "reports/oil_xls/";

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("IO error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot derive a file name from URL: {0}")]
    InvalidFileName(String),
}

/// A bulletin that is present in the download directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub path: PathBuf,
    pub date: NaiveDate,
    /// `false` when the file was already on disk and nothing was fetched
    pub fresh: bool,
}

/// Stores bulletin files under a directory, skipping files that already exist
#[derive(Clone)]
pub struct BulletinDownloader {
    fetcher: Arc<dyn PageFetcher>,
    download_dir: PathBuf,
}

impl BulletinDownloader {
    pub fn new(fetcher: Arc<dyn PageFetcher>, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            download_dir: download_dir.into(),
        }
    }

    /// Download one bulletin unless a file with the same name is already present
    #[instrument(skip(self, link), fields(url = %link.url, date = %link.date))]
    pub async fn download(&self, link: &BulletinLink) -> Result<DownloadedFile, DownloadError> {
        let file_name = file_name_for(&link.url)?;
        let path = self.download_dir.join(&file_name);

        tokio::fs::create_dir_all(&self.download_dir)
            .await
            .map_err(|source| DownloadError::Io {
                path: self.download_dir.clone(),
                source,
            })?;

        if tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_file()) {
            debug!("{} already downloaded, skipping", file_name);
            return Ok(DownloadedFile {
                path,
                date: link.date,
                fresh: false,
            });
        }

        let page = self.fetcher.fetch(&link.url).await?;
        let bytes = page.into_bytes();

        // Each attempt gets its own temporary file, so two tasks fetching the
        // same URL never rename each other's data away
        let partial = self.download_dir.join(partial_name(&file_name));
        if let Err(e) = write_then_rename(&partial, &path, &bytes).await {
            if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                debug!(path = %partial.display(), error = %cleanup, "No partial file to remove");
            }
            return Err(e);
        }

        debug!("Downloaded {} ({} bytes)", file_name, bytes.len());
        Ok(DownloadedFile {
            path,
            date: link.date,
            fresh: true,
        })
    }

    /// Download many bulletins with at most `concurrency` requests in flight.
    /// Results keep the order of `links`; the first failure aborts the batch.
    #[instrument(skip(self, links), fields(count = links.len()))]
    pub async fn download_all(
        &self,
        links: &[BulletinLink],
        concurrency: usize,
    ) -> Result<Vec<DownloadedFile>, DownloadError> {
        let files: Vec<DownloadedFile> = stream::iter(links)
            .map(|link| self.download(link))
            .buffered(concurrency.max(1))
            .try_collect()
            .await?;

        let fresh = files.iter().filter(|f| f.fresh).count();
        info!(
            "Downloaded {} new bulletins, {} already present",
            fresh,
            files.len() - fresh
        );
        Ok(files)
    }
}

static PARTIAL_SEQ: AtomicUsize = AtomicUsize::new(0);

fn partial_name(file_name: &str) -> String {
    let seq = PARTIAL_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{file_name}.{}-{seq}.part", std::process::id())
}

async fn write_then_rename(partial: &Path, path: &Path, bytes: &[u8]) -> Result<(), DownloadError> {
    tokio::fs::write(partial, bytes)
        .await
        .map_err(|source| DownloadError::Io {
            path: partial.to_path_buf(),
            source,
        })?;
    tokio::fs::rename(partial, path)
        .await
        .map_err(|source| DownloadError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Local file name for a bulletin URL
pub fn file_name_for(url: &str) -> Result<String, DownloadError> {
    let name = match url.rsplit_once(FILE_NAME_MARKER) {
        Some((_, name)) => name.to_string(),
        None => Url::parse(url)
            .ok()
            .and_then(|u| u.path_segments()?.last().map(str::to_string))
            .unwrap_or_default(),
    };

    if name.is_empty() || name == ".." || name.contains(['/', '\\']) {
        return Err(DownloadError::InvalidFileName(url.to_string()));
    }

    Ok(name)
}
