// Shared test doubles and fixtures for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use bulletin_loader::db::{DbError, NewTradingResult, TradeStore, TradingResult};
use bulletin_loader::fetch_error::FetchError;
use bulletin_loader::fetcher::{Page, PageFetcher};
use calamine::{Data, Range};
use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

pub const SITE: &str = "https://spimex.com";
pub const LISTING: &str = "https://spimex.com/markets/oil_products/trades/results/";

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Path of the committed sample bulletin for 2024-03-15
pub fn sample_bulletin() -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("sample-data-files")
        .join("oil_xls_20240315162000.xlsx")
}

/// Relative href as rendered on the listing, with the cache-busting query
pub fn bulletin_href(day: &str) -> String {
    format!("/upload/reports/oil_xls/oil_xls_{day}162000.xls?r=4127")
}

/// Absolute URL the extractor resolves `bulletin_href(day)` to
pub fn bulletin_url(day: &str) -> String {
    format!("{SITE}/upload/reports/oil_xls/oil_xls_{day}162000.xls")
}

/// Listing page markup with one anchor per bulletin day, newest first
pub fn listing_html(days: &[&str]) -> String {
    let anchors: String = days
        .iter()
        .map(|day| {
            format!(
                r#"<div class="accordeon-inner__wrap-item">
                     <a class="accordeon-inner__item-title link xls" href="{}" target="_blank">Бюллетень</a>
                   </div>"#,
                bulletin_href(day)
            )
        })
        .collect();
    format!("<html><body><div class=\"accordeon-inner\">{anchors}</div></body></html>")
}

/// Serves canned bodies per URL and records every request in order.
/// Unknown URLs answer 404.
#[derive(Default)]
pub struct StaticPageFetcher {
    pages: HashMap<String, Result<Vec<u8>, u16>>,
    requests: Mutex<Vec<String>>,
}

impl StaticPageFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.pages.insert(url.into(), Ok(body.into()));
        self
    }

    pub fn with_status(mut self, url: impl Into<String>, status: u16) -> Self {
        self.pages.insert(url.into(), Err(status));
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for StaticPageFetcher {
    async fn fetch(&self, url: &str) -> Result<Page, FetchError> {
        self.requests.lock().unwrap().push(url.to_string());

        match self.pages.get(url) {
            Some(Ok(body)) => Ok(Page::new(body.clone())),
            Some(Err(status)) => Err(FetchError::Status {
                url: url.to_string(),
                status: *status,
            }),
            None => Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

/// Trade store backed by a vector, enforcing the (product, date) key
#[derive(Default)]
pub struct InMemoryTradeStore {
    rows: Mutex<Vec<TradingResult>>,
    bulk_calls: Mutex<usize>,
}

impl InMemoryTradeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<TradingResult> {
        self.rows.lock().unwrap().clone()
    }

    pub fn bulk_calls(&self) -> usize {
        *self.bulk_calls.lock().unwrap()
    }

    fn insert(&self, record: &NewTradingResult) -> Result<TradingResult, DbError> {
        let mut rows = self.rows.lock().unwrap();
        if rows
            .iter()
            .any(|r| r.exchange_product_id == record.exchange_product_id && r.date == record.date)
        {
            return Err(DbError::SqlxError(sqlx::Error::Protocol(format!(
                "duplicate key ({}, {})",
                record.exchange_product_id, record.date
            ))));
        }

        let now = Utc::now();
        let created = TradingResult {
            id: rows.len() as i64 + 1,
            exchange_product_id: record.exchange_product_id.clone(),
            exchange_product_name: record.exchange_product_name.clone(),
            oil_id: record.oil_id.clone(),
            delivery_basis_id: record.delivery_basis_id.clone(),
            delivery_basis_name: record.delivery_basis_name.clone(),
            delivery_type_id: record.delivery_type_id.clone(),
            volume: record.volume,
            total: record.total.clone(),
            count: record.count,
            date: record.date,
            created_on: now,
            updated_on: now,
        };
        rows.push(created.clone());
        Ok(created)
    }
}

#[async_trait]
impl TradeStore for InMemoryTradeStore {
    async fn exists(&self, exchange_product_id: &str, date: NaiveDate) -> Result<bool, DbError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .any(|r| r.exchange_product_id == exchange_product_id && r.date == date))
    }

    async fn create(&self, record: &NewTradingResult) -> Result<TradingResult, DbError> {
        self.insert(record)
    }

    async fn bulk_create(
        &self,
        records: &[NewTradingResult],
    ) -> Result<Vec<TradingResult>, DbError> {
        *self.bulk_calls.lock().unwrap() += 1;
        records.iter().map(|r| self.insert(r)).collect()
    }
}

/// Grid of string cells; empty strings become `Data::Empty`
pub fn grid(rows: &[&[&str]]) -> Range<Data> {
    let height = rows.len().max(1) as u32;
    let width = rows.iter().map(|r| r.len()).max().unwrap_or(1).max(1) as u32;

    let mut range = Range::new((0, 0), (height - 1, width - 1));
    for (r, row) in rows.iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            if !value.is_empty() {
                range.set_value((r as u32, c as u32), Data::String(value.to_string()));
            }
        }
    }
    range
}

pub const HEADER: [&str; 6] = [
    "Код\nИнструмента",
    "Наименование\nИнструмента",
    "Базис\nпоставки",
    "Объем\nДоговоров\nв единицах\nизмерения",
    "Обьем\nДоговоров,\nруб.",
    "Количество\nДоговоров,\nшт.",
];

/// A bulletin sheet: preamble, the metric-ton section and the given data rows
pub fn bulletin_grid(data: &[&[&str]]) -> Range<Data> {
    let mut rows: Vec<&[&str]> = vec![
        &["Бюллетень по итогам торгов", "", "", "", "", ""],
        &["Дата торгов: 15.03.2024", "", "", "", "", ""],
        &["Единица измерения: Метрическая тонна", "", "", "", "", ""],
        &HEADER,
        &["", "", "", "", "", ""],
    ];
    rows.extend_from_slice(data);
    grid(&rows)
}
