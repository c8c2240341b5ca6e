pub mod config;
pub mod data;
pub mod espc;
pub mod export;
pub mod fetch;
pub mod pipeline;
pub mod simd;

mod error;
mod utils;

#[cfg(test)]
mod testing;

pub use data::SqliteData;
pub use error::CrawlerError;
pub use export::{CsvStore, Outputs};
pub use fetch::HttpFetcher;
pub use pipeline::{setup_or_checkpoint, CorrelatedRow, DatasetRow, PipelineDriver, RunSummary};
pub use utils::{canonical_url, extract_postcode};

/// Fetches raw markup. Anything but a successful response is a
/// `CrawlerError::Fetch`, never an empty page.
#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, CrawlerError>;
}

/// Durable outputs of a run. Both operations overwrite what was saved before.
#[async_trait::async_trait]
pub trait Storage: Send + Sync {
    async fn save_datasets(
        &self,
        all: &[DatasetRow],
        selected: &[DatasetRow],
    ) -> Result<(), CrawlerError>;

    async fn save_unresolved(&self, urls: &[String]) -> Result<(), CrawlerError>;
}
