use chrono::NaiveDate;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::db::{NewTradingResult, TradeStore, TradingResult};
use crate::importers::row_converter::convert_row;
use crate::importers::table_extractor::{CleanedTable, TableRow};
use crate::services::ImportError;

/// Writes cleaned bulletin rows to storage, one row per product and trading day
#[derive(Clone)]
pub struct TradeImporter {
    store: Arc<dyn TradeStore>,
}

impl TradeImporter {
    pub fn new(store: Arc<dyn TradeStore>) -> Self {
        Self { store }
    }

    /// Insert a single row unless the product already has a record for `date`.
    /// Returns `None` when the row was a duplicate.
    #[instrument(skip(self, row))]
    pub async fn save_row(
        &self,
        row: &TableRow<'_>,
        date: NaiveDate,
    ) -> Result<Option<TradingResult>, ImportError> {
        let record = convert_row(row, date)?;

        if self
            .store
            .exists(&record.exchange_product_id, record.date)
            .await?
        {
            info!(
                product = %record.exchange_product_id,
                "Trading result already stored, skipping"
            );
            return Ok(None);
        }

        Ok(Some(self.store.create(&record).await?))
    }

    /// Insert every new row of a bulletin in one all-or-nothing batch.
    ///
    /// Rows whose key is already stored, or repeats an earlier row of the same
    /// table, are left out. Rows that cannot be converted are logged and skipped.
    /// Returns `None` when nothing new was found.
    #[instrument(skip(self, table), fields(rows = table.len()))]
    pub async fn save_table_bulk(
        &self,
        table: &CleanedTable,
        date: NaiveDate,
    ) -> Result<Option<Vec<TradingResult>>, ImportError> {
        let mut records = Vec::with_capacity(table.len());
        let mut rejected = 0;
        for (idx, row) in table.rows().enumerate() {
            match convert_row(&row, date) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(row = idx, error = %e, "Skipping unconvertible row");
                    rejected += 1;
                }
            }
        }

        let new_records = self.filter_new(records).await?;
        debug!(
            "{} new records, {} rejected rows",
            new_records.len(),
            rejected
        );

        if new_records.is_empty() {
            info!("No new trading results for {}", date);
            return Ok(None);
        }

        Ok(Some(self.store.bulk_create(&new_records).await?))
    }

    async fn filter_new(
        &self,
        records: Vec<NewTradingResult>,
    ) -> Result<Vec<NewTradingResult>, ImportError> {
        let mut seen: HashSet<(String, NaiveDate)> = HashSet::new();
        let mut new_records = Vec::with_capacity(records.len());
        let mut duplicates = 0;

        for record in records {
            let (product, date) = record.key();
            if !seen.insert((product.to_string(), date)) {
                duplicates += 1;
                continue;
            }
            if self
                .store
                .exists(&record.exchange_product_id, record.date)
                .await?
            {
                duplicates += 1;
                continue;
            }
            new_records.push(record);
        }

        if duplicates > 0 {
            debug!("Skipped {} duplicate trading results", duplicates);
        }
        Ok(new_records)
    }
}
