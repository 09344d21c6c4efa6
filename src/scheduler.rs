use chrono::{NaiveDate, Utc};
use std::time::Duration;
use tokio::time;
use tracing::{debug, error, info, instrument};

use crate::collector::DateWindow;
use crate::services::BulletinImportService;

/// Re-run the import every `interval_minutes`, always up to the current day.
/// Failed runs are logged and retried on the next tick.
#[instrument(skip(service), fields(interval_minutes = %interval_minutes))]
pub async fn start_import_scheduler(
    service: BulletinImportService,
    start_date: NaiveDate,
    interval_minutes: u64,
) {
    let mut interval = time::interval(Duration::from_secs(interval_minutes.max(1) * 60));

    info!("Import scheduler started with {} minute interval", interval_minutes);

    loop {
        interval.tick().await;
        debug!("Scheduler tick - initiating import");

        let window = DateWindow::new(start_date, Utc::now().date_naive());
        match service.run(window).await {
            Ok(stats) => {
                if stats.rows_inserted > 0 {
                    info!("Successfully imported {} new trading results", stats.rows_inserted);
                } else {
                    debug!("No new trading results to store");
                }
            }
            Err(e) => {
                error!("Scheduled import failed: {}", e);
            }
        }
    }
}
