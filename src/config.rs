use std::env;
use std::path::PathBuf;

const DEFAULT_SITE_URL: &str = "https://spimex.com";
const LISTING_PATH: &str = "/markets/oil_products/trades/results/";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub site_url: String,
    pub listing_url: String,
    pub download_dir: PathBuf,
    pub download_concurrency: usize,
    pub http_timeout_secs: u64,
    pub fetch_retries: usize,
    pub max_pages: Option<usize>,
    pub db_max_connections: u32,
}

impl Config {
    /// Only `DATABASE_URL` has no default; download-only runs work without it
    pub fn from_env() -> Self {
        let site_url = env::var("SITE_URL").unwrap_or_else(|_| DEFAULT_SITE_URL.to_string());
        let listing_url = env::var("LISTING_URL")
            .unwrap_or_else(|_| format!("{}{LISTING_PATH}", site_url.trim_end_matches('/')));

        Config {
            database_url: env::var("DATABASE_URL").ok(),
            site_url,
            listing_url,
            download_dir: env::var("DOWNLOAD_DIR")
                .unwrap_or_else(|_| "downloads".to_string())
                .into(),
            download_concurrency: env::var("DOWNLOAD_CONCURRENCY")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .unwrap_or(4),
            http_timeout_secs: env::var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .unwrap_or(60),
            fetch_retries: env::var("FETCH_RETRIES")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .unwrap_or(0),
            max_pages: env::var("MAX_PAGES").ok().and_then(|v| v.parse().ok()),
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
        }
    }
}
