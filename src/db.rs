pub mod error;
pub mod models;
pub mod pool;
pub mod trading_result_repository;

pub use error::DbError;
pub use models::*;
pub use trading_result_repository::{TradeStore, TradingResultRepository};
