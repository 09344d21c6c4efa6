pub mod bulletin_import_service;
pub mod import_error;
pub mod trade_importer;

pub use bulletin_import_service::{BulletinImportService, ImportStats};
pub use import_error::ImportError;
pub use trade_importer::TradeImporter;
