use crate::db::DbError;
use crate::fetch_error::FetchError;
use crate::importers::downloader::DownloadError;
use crate::importers::row_converter::ConvertError;
use crate::importers::table_extractor::ExtractError;

/// Error types for bulletin import operations
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Download failed: {0}")]
    Download(#[from] DownloadError),

    #[error("Extraction failed for {path}: {source}")]
    Extract {
        path: String,
        #[source]
        source: ExtractError,
    },

    #[error("Row conversion failed: {0}")]
    Convert(#[from] ConvertError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ImportError {
    /// Errors that only spoil one bulletin; the batch moves on to the next file
    pub fn is_per_file(&self) -> bool {
        matches!(self, ImportError::Extract { .. } | ImportError::Convert(_))
    }
}
