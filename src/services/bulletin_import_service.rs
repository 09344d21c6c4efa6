use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::collector::{BulletinCollector, DateWindow};
use crate::fetcher::PageFetcher;
use crate::importers::downloader::{BulletinDownloader, DownloadedFile};
use crate::importers::table_extractor::TableExtractor;
use crate::link_extractor::LinkExtractor;
use crate::services::{ImportError, TradeImporter};

/// Outcome of one collection run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportStats {
    pub links_found: usize,
    pub files_downloaded: usize,
    pub files_already_present: usize,
    pub files_imported: usize,
    pub files_failed: usize,
    pub rows_inserted: usize,
    pub duration_secs: f64,
}

/// Runs the whole pipeline: collect links, download bulletins, extract, import
#[derive(Clone)]
pub struct BulletinImportService {
    listing_url: String,
    fetcher: Arc<dyn PageFetcher>,
    link_extractor: Arc<dyn LinkExtractor>,
    downloader: BulletinDownloader,
    table_extractor: TableExtractor,
    importer: Option<TradeImporter>,
    download_concurrency: usize,
    max_pages: Option<usize>,
    show_progress: bool,
}

impl BulletinImportService {
    /// A service without an importer only collects and downloads
    pub fn new(
        listing_url: impl Into<String>,
        fetcher: Arc<dyn PageFetcher>,
        link_extractor: Arc<dyn LinkExtractor>,
        downloader: BulletinDownloader,
        importer: Option<TradeImporter>,
    ) -> Self {
        Self {
            listing_url: listing_url.into(),
            fetcher,
            link_extractor,
            downloader,
            table_extractor: TableExtractor::new(),
            importer,
            download_concurrency: 1,
            max_pages: None,
            show_progress: false,
        }
    }

    pub fn with_download_concurrency(mut self, concurrency: usize) -> Self {
        self.download_concurrency = concurrency.max(1);
        self
    }

    pub fn with_max_pages(mut self, max_pages: Option<usize>) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Process every bulletin published inside `window`.
    ///
    /// Fetch, download and database failures abort the run. A bulletin that
    /// cannot be extracted is logged, counted in `files_failed` and skipped.
    #[instrument(skip(self), fields(start = %window.start, end = %window.end))]
    pub async fn run(&self, window: DateWindow) -> Result<ImportStats, ImportError> {
        let start_time = Instant::now();
        let mut stats = ImportStats::default();

        let collector = BulletinCollector::new(
            self.listing_url.clone(),
            Arc::clone(&self.fetcher),
            Arc::clone(&self.link_extractor),
            window,
        )
        .with_max_pages(self.max_pages);

        let links = collector.collect().await?;
        stats.links_found = links.len();
        info!("Found {} bulletins between {} and {}", links.len(), window.start, window.end);

        let files = self
            .downloader
            .download_all(&links, self.download_concurrency)
            .await?;
        stats.files_downloaded = files.iter().filter(|f| f.fresh).count();
        stats.files_already_present = files.len() - stats.files_downloaded;

        let Some(importer) = &self.importer else {
            info!("Download-only run, skipping import");
            stats.duration_secs = start_time.elapsed().as_secs_f64();
            return Ok(stats);
        };

        let pb = self.progress_bar(files.len() as u64);

        for file in &files {
            pb.set_message(file.date.to_string());

            match self.import_file(importer, file).await {
                Ok(inserted) => {
                    stats.files_imported += 1;
                    stats.rows_inserted += inserted;
                }
                Err(e) if e.is_per_file() => {
                    warn!(path = %file.path.display(), error = %e, "Skipping bulletin");
                    stats.files_failed += 1;
                }
                Err(e) => {
                    error!(path = %file.path.display(), error = %e, "Import aborted");
                    pb.abandon();
                    return Err(e);
                }
            }

            pb.inc(1);
        }

        pb.finish_with_message(format!(
            "{} imported, {} failed",
            stats.files_imported, stats.files_failed
        ));

        stats.duration_secs = start_time.elapsed().as_secs_f64();
        info!(
            "✓ Import complete ({:.1}s): {} files, {} rows inserted, {} files failed",
            stats.duration_secs, stats.files_imported, stats.rows_inserted, stats.files_failed
        );
        Ok(stats)
    }

    /// Extract one downloaded bulletin and store its new rows
    #[instrument(skip(self, importer, file), fields(path = %file.path.display(), date = %file.date))]
    async fn import_file(
        &self,
        importer: &TradeImporter,
        file: &DownloadedFile,
    ) -> Result<usize, ImportError> {
        let extractor = self.table_extractor.clone();
        let path = file.path.clone();

        // calamine is synchronous
        let table = tokio::task::spawn_blocking(move || extractor.extract_file(&path))
            .await?
            .map_err(|source| ImportError::Extract {
                path: file.path.display().to_string(),
                source,
            })?;
        debug!("Extracted {} rows", table.len());

        let inserted = importer
            .save_table_bulk(&table, file.date)
            .await?
            .map(|created| created.len())
            .unwrap_or(0);

        Ok(inserted)
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(len);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} bulletins ({msg})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        pb
    }
}
