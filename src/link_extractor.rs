use chrono::NaiveDate;
use scraper::{Html, Selector};
use serde::Serialize;
use tracing::{debug, info};
use url::Url;

/// Anchors rendered by the results listing for downloadable bulletins
const LINK_SELECTOR: &str = "a.accordeon-inner__item-title.link.xls";

/// Path fragment every bulletin file lives under
pub const REPORTS_MARKER: &str = "upload/reports/oil_xls/oil_xls_";

/// File-name prefix directly followed by the YYYYMMDD trading date
const DATE_TOKEN: &str = "oil_xls_";

const FILE_EXTENSION: &str = ".xls";

/// A bulletin file published on a listing page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulletinLink {
    pub url: String,
    pub date: NaiveDate,
}

impl BulletinLink {
    pub fn new(url: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            url: url.into(),
            date,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LinkDateError {
    #[error("No date token in href: {0}")]
    MissingToken(String),
    #[error("Invalid date '{token}': {source}")]
    Invalid {
        token: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Turns one listing page into bulletin links, in document order
pub trait LinkExtractor: Send + Sync {
    fn extract<'a>(&'a self, html: &str) -> Box<dyn Iterator<Item = BulletinLink> + Send + 'a>;
}

#[derive(Debug, Clone)]
pub struct BulletinLinkExtractor {
    base_url: Url,
}

impl BulletinLinkExtractor {
    pub fn new(base_url: Url) -> Self {
        Self { base_url }
    }

    fn candidate(&self, href: &str) -> Option<BulletinLink> {
        let href = href.split('?').next().unwrap_or_default();

        if !href.contains(REPORTS_MARKER) || !href.ends_with(FILE_EXTENSION) {
            return None;
        }

        let date = match parse_link_date(href) {
            Ok(date) => date,
            Err(e) => {
                info!(href = %href, error = %e, "Skipping bulletin link without a usable date");
                return None;
            }
        };

        Some(BulletinLink {
            url: self.resolve(href),
            date,
        })
    }

    fn resolve(&self, href: &str) -> String {
        if Url::parse(href).is_ok() {
            return href.to_string();
        }
        match self.base_url.join(href) {
            Ok(url) => url.to_string(),
            Err(_) => format!("{}{}", self.base_url.as_str().trim_end_matches('/'), href),
        }
    }
}

impl LinkExtractor for BulletinLinkExtractor {
    fn extract<'a>(&'a self, html: &str) -> Box<dyn Iterator<Item = BulletinLink> + Send + 'a> {
        let hrefs: Vec<String> = {
            let document = Html::parse_document(html);
            let selector = Selector::parse(LINK_SELECTOR).unwrap();
            document
                .select(&selector)
                .filter_map(|a| a.value().attr("href"))
                .map(str::to_string)
                .collect()
        };
        debug!("Found {} candidate anchors", hrefs.len());

        Box::new(hrefs.into_iter().filter_map(move |href| self.candidate(&href)))
    }
}

/// Reads the trading date encoded right after the `oil_xls_` token
pub fn parse_link_date(href: &str) -> Result<NaiveDate, LinkDateError> {
    let rest = href
        .split(DATE_TOKEN)
        .nth(1)
        .ok_or_else(|| LinkDateError::MissingToken(href.to_string()))?;
    let token: String = rest.chars().take(8).collect();

    NaiveDate::parse_from_str(&token, "%Y%m%d")
        .map_err(|source| LinkDateError::Invalid { token, source })
}
