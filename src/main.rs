use chrono::{NaiveDate, Utc};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use url::Url;

use bulletin_loader::collector::DateWindow;
use bulletin_loader::config::Config;
use bulletin_loader::db::{self, TradingResultRepository};
use bulletin_loader::fetcher::{HttpPageFetcher, PageFetcher};
use bulletin_loader::importers::BulletinDownloader;
use bulletin_loader::link_extractor::{BulletinLinkExtractor, LinkExtractor};
use bulletin_loader::scheduler;
use bulletin_loader::services::{BulletinImportService, TradeImporter};

#[derive(Parser, Debug)]
#[command(name = "bulletin-loader")]
#[command(about = "Collect, download and import oil products trading bulletins", long_about = None)]
struct Cli {
    /// First trading date to collect (inclusive)
    #[arg(long, default_value = "2023-01-01")]
    start_date: NaiveDate,

    /// Last trading date to collect (inclusive, default: today)
    #[arg(long)]
    end_date: Option<NaiveDate>,

    /// Only download bulletins, skip extraction and database import
    #[arg(long)]
    download_only: bool,

    /// Keep running and re-import every N minutes
    #[arg(long, env = "IMPORT_INTERVAL_MINUTES")]
    interval_minutes: Option<u64>,

    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,

    /// Print run statistics as JSON when done
    #[arg(long)]
    summary_json: bool,
}

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,bulletin_loader=debug")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true),
        )
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_env();
    info!("Starting bulletin loader with config: {:?}", config);

    let end_date = cli.end_date.unwrap_or_else(|| Utc::now().date_naive());
    if end_date < cli.start_date {
        return Err(format!("end date {} is before start date {}", end_date, cli.start_date).into());
    }

    let fetcher: Arc<dyn PageFetcher> = Arc::new(
        HttpPageFetcher::new(Duration::from_secs(config.http_timeout_secs))?
            .with_retries(config.fetch_retries),
    );
    let link_extractor: Arc<dyn LinkExtractor> =
        Arc::new(BulletinLinkExtractor::new(Url::parse(&config.site_url)?));
    let downloader = BulletinDownloader::new(Arc::clone(&fetcher), config.download_dir.clone());

    let importer = if cli.download_only {
        None
    } else {
        let database_url = config
            .database_url
            .as_deref()
            .ok_or("DATABASE_URL must be set unless --download-only is given")?;
        let pool = db::pool::connect(database_url, config.db_max_connections).await?;
        Some(TradeImporter::new(Arc::new(TradingResultRepository::new(pool))))
    };

    let service = BulletinImportService::new(
        config.listing_url.clone(),
        fetcher,
        link_extractor,
        downloader,
        importer,
    )
    .with_download_concurrency(config.download_concurrency)
    .with_max_pages(config.max_pages)
    .with_progress(!cli.no_progress);

    if let Some(interval) = cli.interval_minutes {
        info!("Starting background import scheduler");
        scheduler::start_import_scheduler(service, cli.start_date, interval).await;
        return Ok(());
    }

    let stats = service.run(DateWindow::new(cli.start_date, end_date)).await?;
    if cli.summary_json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }

    Ok(())
}
