use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, error, info, instrument};

use crate::db::{Amount, DbError, NewTradingResult, TradingResult};

const RETURNING_COLUMNS: &str = "id, exchange_product_id, exchange_product_name, oil_id, \
     delivery_basis_id, delivery_basis_name, delivery_type_id, volume, total::TEXT AS total, \
     count, date, created_on, updated_on";

/// Ten binds per row keeps each statement well under the Postgres parameter limit
const INSERT_CHUNK_SIZE: usize = 1000;

/// Storage used by the importer. Creation is all-or-nothing.
#[async_trait]
pub trait TradeStore: Send + Sync {
    async fn exists(&self, exchange_product_id: &str, date: NaiveDate) -> Result<bool, DbError>;

    async fn create(&self, record: &NewTradingResult) -> Result<TradingResult, DbError>;

    async fn bulk_create(
        &self,
        records: &[NewTradingResult],
    ) -> Result<Vec<TradingResult>, DbError>;
}

#[derive(Clone)]
pub struct TradingResultRepository {
    pool: PgPool,
}

impl TradingResultRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub async fn count_for_date(&self, date: NaiveDate) -> Result<i64, DbError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM trading_results WHERE date = $1",
        )
        .bind(date)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    #[instrument(skip(self))]
    pub async fn find_by_date(&self, date: NaiveDate) -> Result<Vec<TradingResult>, DbError> {
        debug!("Querying trading results for {}", date);

        let results = sqlx::query_as::<_, TradingResult>(&format!(
            "SELECT {RETURNING_COLUMNS} FROM trading_results WHERE date = $1 ORDER BY exchange_product_id"
        ))
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        debug!("Found {} trading results", results.len());
        Ok(results)
    }
}

fn push_insert_values<'a>(
    builder: &mut QueryBuilder<'a, Postgres>,
    records: &'a [NewTradingResult],
) {
    builder.push(
        "INSERT INTO trading_results (exchange_product_id, exchange_product_name, oil_id, \
         delivery_basis_id, delivery_basis_name, delivery_type_id, volume, total, count, date) ",
    );
    builder.push_values(records, |mut row, record| {
        row.push_bind(&record.exchange_product_id)
            .push_bind(&record.exchange_product_name)
            .push_bind(&record.oil_id)
            .push_bind(&record.delivery_basis_id)
            .push_bind(&record.delivery_basis_name)
            .push_bind(&record.delivery_type_id)
            .push_bind(record.volume)
            .push_bind(record.total.as_ref().map(Amount::as_str))
            .push_unseparated("::NUMERIC")
            .push_bind(record.count)
            .push_bind(record.date);
    });
    builder.push(" RETURNING ");
    builder.push(RETURNING_COLUMNS);
}

#[async_trait]
impl TradeStore for TradingResultRepository {
    #[instrument(skip(self))]
    async fn exists(&self, exchange_product_id: &str, date: NaiveDate) -> Result<bool, DbError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM trading_results WHERE exchange_product_id = $1 AND date = $2)",
        )
        .bind(exchange_product_id)
        .bind(date)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    #[instrument(skip(self, record), fields(product = %record.exchange_product_id, date = %record.date))]
    async fn create(&self, record: &NewTradingResult) -> Result<TradingResult, DbError> {
        let mut builder = QueryBuilder::new("");
        push_insert_values(&mut builder, std::slice::from_ref(record));

        let created = builder
            .build_query_as::<TradingResult>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to insert trading result");
                e
            })?;

        debug!(id = created.id, "Inserted trading result");
        Ok(created)
    }

    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn bulk_create(
        &self,
        records: &[NewTradingResult],
    ) -> Result<Vec<TradingResult>, DbError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "Beginning transaction to insert {} trading results",
            records.len()
        );
        let mut tx = self.pool.begin().await?;
        let mut created = Vec::with_capacity(records.len());

        for chunk in records.chunks(INSERT_CHUNK_SIZE) {
            let mut builder = QueryBuilder::new("");
            push_insert_values(&mut builder, chunk);

            // Dropping `tx` on error rolls the whole batch back
            let rows = builder
                .build_query_as::<TradingResult>()
                .fetch_all(&mut *tx)
                .await
                .map_err(|e| {
                    error!(error = %e, chunk = chunk.len(), "Bulk insert failed, rolling back");
                    e
                })?;
            created.extend(rows);
        }

        tx.commit().await?;
        info!("Inserted {} trading results", created.len());
        Ok(created)
    }
}
