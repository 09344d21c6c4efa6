use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::fetch_error::FetchError;
use crate::fetcher::PageFetcher;
use crate::link_extractor::{BulletinLink, LinkExtractor};

/// Trading dates a collection run is interested in. Both bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// The listing is newest-first, so the first link older than `start`
    /// means every remaining link (and page) is older too.
    pub fn is_past_window(&self, date: NaiveDate) -> bool {
        date < self.start
    }

    pub fn is_ahead_of_window(&self, date: NaiveDate) -> bool {
        date > self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        !self.is_past_window(date) && !self.is_ahead_of_window(date)
    }
}

/// Walks the paginated results listing until the date window is exhausted
pub struct BulletinCollector {
    listing_url: String,
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<dyn LinkExtractor>,
    window: DateWindow,
    max_pages: Option<usize>,
}

impl BulletinCollector {
    pub fn new(
        listing_url: impl Into<String>,
        fetcher: Arc<dyn PageFetcher>,
        extractor: Arc<dyn LinkExtractor>,
        window: DateWindow,
    ) -> Self {
        Self {
            listing_url: listing_url.into(),
            fetcher,
            extractor,
            window,
            max_pages: None,
        }
    }

    /// Stop after `max_pages` listing pages even if the window is not exhausted
    pub fn with_max_pages(mut self, max_pages: Option<usize>) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// URL of a 1-based listing page
    pub fn page_url(listing_url: &str, page_number: usize) -> String {
        if page_number <= 1 {
            listing_url.to_string()
        } else {
            format!("{listing_url}?page=page-{page_number}")
        }
    }

    #[instrument(skip(self), fields(listing_url = %self.listing_url, start = %self.window.start, end = %self.window.end))]
    pub async fn collect(&self) -> Result<Vec<BulletinLink>, FetchError> {
        let mut results = Vec::new();
        let mut collected_urls = HashSet::new();
        let mut page_number = 1;
        let mut page_url = self.listing_url.clone();

        loop {
            let html = self.fetcher.fetch(&page_url).await?.text();

            let mut exhausted = false;
            let mut seen = 0usize;
            let mut skipped_newer = 0usize;

            for link in self.extractor.extract(&html) {
                seen += 1;

                if self.window.is_ahead_of_window(link.date) {
                    skipped_newer += 1;
                    continue;
                }

                if self.window.is_past_window(link.date) {
                    debug!(date = %link.date, url = %link.url, "Reached link older than window start");
                    exhausted = true;
                    break;
                }

                // The listing repeats a bulletin when it shifts between pages
                if !collected_urls.insert(link.url.clone()) {
                    debug!(url = %link.url, "Skipping duplicate bulletin link");
                    continue;
                }

                results.push(link);
            }

            debug!(
                page = page_number,
                links = seen,
                skipped_newer,
                collected = results.len(),
                "Scanned listing page"
            );

            if exhausted {
                break;
            }

            if seen == 0 {
                warn!(page = page_number, url = %page_url, "Listing page has no bulletin links, stopping");
                break;
            }

            if self.max_pages.is_some_and(|max| page_number >= max) {
                warn!(page = page_number, "Reached page limit before the window was exhausted");
                break;
            }

            page_number += 1;
            page_url = Self::page_url(&self.listing_url, page_number);
            info!(page = page_number, url = %page_url, "Fetching next listing page");
        }

        info!(
            "Collected {} bulletin links across {} pages",
            results.len(),
            page_number
        );
        Ok(results)
    }
}
