use calamine::Data;
use chrono::NaiveDate;
use thiserror::Error;

use crate::db::models::{
    Amount, NewTradingResult, ProductCode, DELIVERY_BASIS_NAME_LENGTH,
    EXCHANGE_PRODUCT_ID_LENGTH, EXCHANGE_PRODUCT_NAME_LENGTH,
};
use crate::importers::table_extractor::{cell_text, TableRow};

pub const PRODUCT_ID_COLUMN: &str = "Код Инструмента";
pub const PRODUCT_NAME_COLUMN: &str = "Наименование Инструмента";
pub const DELIVERY_BASIS_COLUMN: &str = "Базис поставки";
pub const VOLUME_COLUMN: &str = "Объем Договоров в единицах измерения";
// The bulletin spells this caption with a soft sign
pub const TOTAL_COLUMN: &str = "Обьем Договоров, руб.";
pub const COUNT_COLUMN: &str = "Количество Договоров, шт.";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConvertError {
    #[error("Missing column: {0}")]
    MissingColumn(&'static str),

    #[error("Invalid number in {column}: '{value}'")]
    InvalidNumber { column: &'static str, value: String },

    #[error("Product code '{0}' is too short to derive sub-codes")]
    InvalidProductCode(String),

    #[error("{column} exceeds {max} characters: '{value}'")]
    TooLong {
        column: &'static str,
        max: usize,
        value: String,
    },
}

/// Map one cleaned bulletin row to a record for the given trading date
pub fn convert_row(row: &TableRow<'_>, date: NaiveDate) -> Result<NewTradingResult, ConvertError> {
    let exchange_product_id = required_text(row, PRODUCT_ID_COLUMN, EXCHANGE_PRODUCT_ID_LENGTH)?;
    let exchange_product_name =
        required_text(row, PRODUCT_NAME_COLUMN, EXCHANGE_PRODUCT_NAME_LENGTH)?;
    let delivery_basis_name =
        required_text(row, DELIVERY_BASIS_COLUMN, DELIVERY_BASIS_NAME_LENGTH)?;

    let codes = ProductCode::derive(&exchange_product_id)
        .ok_or_else(|| ConvertError::InvalidProductCode(exchange_product_id.clone()))?;

    let volume = optional_integer(row, VOLUME_COLUMN)?;
    let total = row.text(TOTAL_COLUMN).and_then(|value| Amount::parse(&value));

    let count = optional_integer(row, COUNT_COLUMN)?
        .ok_or(ConvertError::MissingColumn(COUNT_COLUMN))?;
    let count = i32::try_from(count).map_err(|_| ConvertError::InvalidNumber {
        column: COUNT_COLUMN,
        value: count.to_string(),
    })?;

    Ok(NewTradingResult {
        exchange_product_id,
        exchange_product_name,
        oil_id: codes.oil_id,
        delivery_basis_id: codes.delivery_basis_id,
        delivery_basis_name,
        delivery_type_id: codes.delivery_type_id,
        volume,
        total,
        count: Some(count),
        date,
    })
}

fn required_text(
    row: &TableRow<'_>,
    column: &'static str,
    max: usize,
) -> Result<String, ConvertError> {
    let value = row
        .text(column)
        .ok_or(ConvertError::MissingColumn(column))?
        .trim()
        .to_string();

    if value.chars().count() > max {
        return Err(ConvertError::TooLong { column, max, value });
    }
    Ok(value)
}

/// `-`, blank and NaN cells are absent rather than zero
fn optional_integer(row: &TableRow<'_>, column: &'static str) -> Result<Option<i64>, ConvertError> {
    let Some(cell) = row.get(column) else {
        return Ok(None);
    };

    match cell {
        Data::Empty => Ok(None),
        Data::Int(i) => Ok(Some(*i)),
        Data::Float(f) if f.is_nan() => Ok(None),
        Data::Float(f) => Ok(Some(f.trunc() as i64)),
        other => {
            let text = cell_text(other);
            let text = text.trim();
            if text.is_empty() || text == "-" {
                return Ok(None);
            }
            text.parse::<i64>()
                .map(Some)
                .map_err(|_| ConvertError::InvalidNumber {
                    column,
                    value: text.to_string(),
                })
        }
    }
}
