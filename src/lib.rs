pub mod collector;
pub mod config;
pub mod db;
pub mod fetch_error;
pub mod fetcher;
pub mod importers;
pub mod link_extractor;
pub mod scheduler;
pub mod services;
