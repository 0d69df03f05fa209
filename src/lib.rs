pub mod batch;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod scrape;
pub mod source;
pub mod storage;

pub mod util {
    pub mod env;
}

pub use batch::{BatchIngestor, BatchRunResult};
pub use scrape::{AutomationSession, ScrapedRecord};
