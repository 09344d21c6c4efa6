// Bulletin files: download, table extraction and row conversion

pub mod downloader;
pub mod row_converter;
pub mod table_extractor;

// Re-export commonly used items
pub use downloader::{BulletinDownloader, DownloadError, DownloadedFile};
pub use row_converter::{convert_row, ConvertError};
pub use table_extractor::{CleanedTable, ExtractError, TableExtractor, TableLayout, TableRow};
