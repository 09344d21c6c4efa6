// End-to-end tests for BulletinImportService using canned pages and an in-memory store

mod common;

use bulletin_loader::collector::{BulletinCollector, DateWindow};
use bulletin_loader::db::TradeStore;
use bulletin_loader::fetch_error::FetchError;
use bulletin_loader::fetcher::PageFetcher;
use bulletin_loader::importers::downloader::{BulletinDownloader, DownloadError};
use bulletin_loader::link_extractor::{BulletinLinkExtractor, LinkExtractor};
use bulletin_loader::services::{BulletinImportService, ImportError, ImportStats, TradeImporter};
use common::{
    bulletin_url, date, listing_html, sample_bulletin, InMemoryTradeStore, StaticPageFetcher,
    LISTING, SITE,
};
use std::sync::Arc;
use tempfile::TempDir;
use url::Url;

fn page(n: usize) -> String {
    BulletinCollector::page_url(LISTING, n)
}

fn service(
    fetcher: &Arc<StaticPageFetcher>,
    dir: &TempDir,
    store: Option<&Arc<InMemoryTradeStore>>,
) -> BulletinImportService {
    let fetcher: Arc<dyn PageFetcher> = fetcher.clone();
    let extractor: Arc<dyn LinkExtractor> =
        Arc::new(BulletinLinkExtractor::new(Url::parse(SITE).unwrap()));
    let downloader = BulletinDownloader::new(Arc::clone(&fetcher), dir.path());
    let importer = store.map(|s| {
        let shared: Arc<dyn TradeStore> = s.clone();
        TradeImporter::new(shared)
    });

    BulletinImportService::new(LISTING, fetcher, extractor, downloader, importer)
        .with_download_concurrency(2)
}

fn two_bulletin_site() -> StaticPageFetcher {
    StaticPageFetcher::new()
        .with_page(page(1), listing_html(&["20240320", "20240315", "20240314"]))
        .with_page(page(2), listing_html(&["20240301"]))
        .with_page(bulletin_url("20240315"), b"not a workbook".to_vec())
        .with_page(bulletin_url("20240314"), b"not a workbook either".to_vec())
}

#[tokio::test]
async fn test_download_only_run_collects_and_stores_files() {
    let fetcher = Arc::new(two_bulletin_site());
    let dir = TempDir::new().unwrap();
    let window = DateWindow::new(date(2024, 3, 10), date(2024, 3, 15));

    let stats = service(&fetcher, &dir, None).run(window).await.unwrap();

    assert_eq!(stats.links_found, 2);
    assert_eq!(stats.files_downloaded, 2);
    assert_eq!(stats.files_already_present, 0);
    assert_eq!(stats.files_imported, 0);
    assert_eq!(stats.files_failed, 0);
    assert!(dir.path().join("oil_xls_20240315162000.xls").exists());
    assert!(dir.path().join("oil_xls_20240314162000.xls").exists());
}

#[tokio::test]
async fn test_second_run_reuses_downloaded_files() {
    let fetcher = Arc::new(two_bulletin_site());
    let dir = TempDir::new().unwrap();
    let window = DateWindow::new(date(2024, 3, 10), date(2024, 3, 15));
    let service = service(&fetcher, &dir, None);

    service.run(window).await.unwrap();
    let stats = service.run(window).await.unwrap();

    assert_eq!(stats.files_downloaded, 0);
    assert_eq!(stats.files_already_present, 2);

    let bulletin_requests = fetcher
        .requests()
        .iter()
        .filter(|url| url.ends_with(".xls"))
        .count();
    assert_eq!(bulletin_requests, 2);
}

#[tokio::test]
async fn test_unreadable_bulletins_are_counted_not_fatal() {
    let fetcher = Arc::new(two_bulletin_site());
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryTradeStore::new());
    let window = DateWindow::new(date(2024, 3, 10), date(2024, 3, 15));

    let stats = service(&fetcher, &dir, Some(&store))
        .run(window)
        .await
        .unwrap();

    assert_eq!(
        ImportStats {
            duration_secs: 0.0,
            ..stats
        },
        ImportStats {
            links_found: 2,
            files_downloaded: 2,
            files_already_present: 0,
            files_imported: 0,
            files_failed: 2,
            rows_inserted: 0,
            duration_secs: 0.0,
        }
    );
    assert!(store.rows().is_empty());
}

#[tokio::test]
async fn test_listing_failure_aborts_run() {
    let fetcher = Arc::new(StaticPageFetcher::new().with_status(page(1), 503));
    let dir = TempDir::new().unwrap();
    let window = DateWindow::new(date(2024, 3, 10), date(2024, 3, 15));

    let result = service(&fetcher, &dir, None).run(window).await;

    assert!(matches!(
        result,
        Err(ImportError::Fetch(FetchError::Status { status: 503, .. }))
    ));
}

#[tokio::test]
async fn test_missing_bulletin_aborts_run() {
    let fetcher = Arc::new(
        StaticPageFetcher::new()
            .with_page(page(1), listing_html(&["20240315", "20240301"]))
            .with_status(bulletin_url("20240315"), 404),
    );
    let dir = TempDir::new().unwrap();
    let window = DateWindow::new(date(2024, 3, 10), date(2024, 3, 15));

    let result = service(&fetcher, &dir, None).run(window).await;

    assert!(matches!(
        result,
        Err(ImportError::Download(DownloadError::Fetch(FetchError::Status {
            status: 404,
            ..
        })))
    ));
}

#[tokio::test]
async fn test_empty_window_downloads_nothing() {
    let fetcher = Arc::new(two_bulletin_site());
    let dir = TempDir::new().unwrap();
    let window = DateWindow::new(date(2024, 3, 16), date(2024, 3, 19));

    let stats = service(&fetcher, &dir, None).run(window).await.unwrap();

    assert_eq!(stats.links_found, 0);
    assert_eq!(stats.files_downloaded, 0);
    assert_eq!(fetcher.requests(), vec![page(1)]);
}

#[tokio::test]
async fn test_run_imports_rows_from_sample_bulletin() {
    let fetcher = Arc::new(
        StaticPageFetcher::new()
            .with_page(page(1), listing_html(&["20240315", "20240301"]))
            .with_page(
                bulletin_url("20240315"),
                std::fs::read(sample_bulletin()).unwrap(),
            ),
    );
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryTradeStore::new());
    let window = DateWindow::new(date(2024, 3, 10), date(2024, 3, 15));
    let service = service(&fetcher, &dir, Some(&store));

    let stats = service.run(window).await.unwrap();

    assert_eq!(stats.links_found, 1);
    assert_eq!(stats.files_imported, 1);
    assert_eq!(stats.files_failed, 0);
    assert_eq!(stats.rows_inserted, 2);

    let rows = store.rows();
    let products: Vec<&str> = rows.iter().map(|r| r.exchange_product_id.as_str()).collect();
    assert_eq!(products, vec!["A100ANK060F", "DT5CUFA065J"]);
    assert!(rows.iter().all(|r| r.date == date(2024, 3, 15)));

    let diesel = &rows[1];
    assert_eq!(diesel.oil_id, "DT5C");
    assert_eq!(diesel.delivery_basis_id, "UFA");
    assert_eq!(diesel.delivery_basis_name, "ст. Уфа");
    assert_eq!(diesel.delivery_type_id, "J");
    assert_eq!(diesel.volume, Some(130));
    assert_eq!(diesel.total.as_ref().map(|t| t.as_str()), Some("8775000.5"));
    assert_eq!(diesel.count, Some(2));

    // Re-running the same window stores nothing new
    let again = service.run(window).await.unwrap();
    assert_eq!(again.rows_inserted, 0);
    assert_eq!(again.files_failed, 0);
    assert_eq!(store.rows().len(), 2);
}
