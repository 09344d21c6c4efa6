use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Column widths of the `trading_results` table
pub const EXCHANGE_PRODUCT_ID_LENGTH: usize = 24;
pub const EXCHANGE_PRODUCT_NAME_LENGTH: usize = 240;
pub const DELIVERY_BASIS_NAME_LENGTH: usize = 120;

/// Integer digits allowed by NUMERIC(14, 2)
const AMOUNT_INTEGER_DIGITS: usize = 12;

/// Exact non-negative monetary amount, kept in its decimal text form.
/// Bound as text and cast to NUMERIC in SQL so no precision is lost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct Amount(String);

impl Amount {
    /// Accepts digits with at most one decimal point, e.g. `"1500"` or `"1500.25"`
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let (integer, fraction) = match value.split_once('.') {
            Some((i, f)) => (i, f),
            None => (value, ""),
        };

        let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
        if integer.is_empty() && fraction.is_empty() {
            return None;
        }
        if !all_digits(integer) || !all_digits(fraction) {
            return None;
        }
        if integer.trim_start_matches('0').len() > AMOUNT_INTEGER_DIGITS {
            return None;
        }

        Some(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Sub-codes packed into an exchange product code such as `A100ANK060F`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductCode {
    pub oil_id: String,
    pub delivery_basis_id: String,
    pub delivery_type_id: String,
}

impl ProductCode {
    /// First four characters are the product, the next three the delivery
    /// basis, the last one the delivery type. Codes under 7 characters carry
    /// no sub-codes.
    pub fn derive(exchange_product_id: &str) -> Option<Self> {
        let chars: Vec<char> = exchange_product_id.chars().collect();
        if chars.len() < 7 {
            return None;
        }

        Some(Self {
            oil_id: chars[..4].iter().collect(),
            delivery_basis_id: chars[4..7].iter().collect(),
            delivery_type_id: chars[chars.len() - 1].to_string(),
        })
    }
}

/// A trading result ready to be inserted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTradingResult {
    pub exchange_product_id: String,
    pub exchange_product_name: String,
    pub oil_id: String,
    pub delivery_basis_id: String,
    pub delivery_basis_name: String,
    pub delivery_type_id: String,
    pub volume: Option<i64>,
    pub total: Option<Amount>,
    pub count: Option<i32>,
    pub date: NaiveDate,
}

impl NewTradingResult {
    /// Deduplication key: one row per product per trading day
    pub fn key(&self) -> (&str, NaiveDate) {
        (&self.exchange_product_id, self.date)
    }
}

// Database entity model
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TradingResult {
    pub id: i64,
    pub exchange_product_id: String,
    pub exchange_product_name: String,
    pub oil_id: String,
    pub delivery_basis_id: String,
    pub delivery_basis_name: String,
    pub delivery_type_id: String,
    pub volume: Option<i64>,
    pub total: Option<Amount>,
    pub count: Option<i32>,
    pub date: NaiveDate,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}
