use crate::{CrawlerError, DatasetRow, Storage};
use csv::WriterBuilder;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const ALL_FILE: &str = "all_info.csv";
pub const SELECTED_FILE: &str = "selected_info.csv";
pub const UNRESOLVED_FILE: &str = "unresolved.json";

/// Column header of both datasets. The leading column holds the row index
/// and has no name.
pub const HEADERS: [&str; 15] = [
    "",
    "title",
    "url",
    "postcode",
    "price_val",
    "price_type",
    "epc",
    "council_tax",
    "bed_num",
    "bath_num",
    "couch_num",
    "floor_area",
    "simd_2012_overall_rank_bar",
    "simd_2016_overall_rank_bar",
    "simd_2020_overall_rank_bar",
];

/// Writes the two datasets as csv and the unresolved urls as a json array,
/// all inside `dir`.
#[derive(Debug, Clone)]
pub struct CsvStore {
    dir: PathBuf,
}

impl CsvStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CrawlerError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(CsvStore { dir })
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    fn write_dataset(path: &Path, rows: &[DatasetRow]) -> Result<(), CrawlerError> {
        // Header goes in by hand so an empty dataset still gets one.
        let mut writer = WriterBuilder::new().has_headers(false).from_path(path)?;
        writer.write_record(HEADERS)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        debug!("Wrote {} rows to {}", rows.len(), path.display());
        Ok(())
    }
}

#[async_trait::async_trait]
impl Storage for CsvStore {
    async fn save_datasets(
        &self,
        all: &[DatasetRow],
        selected: &[DatasetRow],
    ) -> Result<(), CrawlerError> {
        Self::write_dataset(&self.path(ALL_FILE), all)?;
        Self::write_dataset(&self.path(SELECTED_FILE), selected)
    }

    async fn save_unresolved(&self, urls: &[String]) -> Result<(), CrawlerError> {
        let mut writer = BufWriter::new(File::create(self.path(UNRESOLVED_FILE))?);
        serde_json::to_writer_pretty(&mut writer, urls)?;
        writer.flush()?;
        Ok(())
    }
}

/// Every configured store, saved in order. The first failure stops the save.
#[derive(Default)]
pub struct Outputs {
    stores: Vec<Box<dyn Storage>>,
}

impl Outputs {
    pub fn new() -> Self {
        Outputs::default()
    }

    pub fn with(mut self, store: impl Storage + 'static) -> Self {
        self.stores.push(Box::new(store));
        self
    }
}

#[async_trait::async_trait]
impl Storage for Outputs {
    async fn save_datasets(
        &self,
        all: &[DatasetRow],
        selected: &[DatasetRow],
    ) -> Result<(), CrawlerError> {
        for store in &self.stores {
            store.save_datasets(all, selected).await?;
        }
        Ok(())
    }

    async fn save_unresolved(&self, urls: &[String]) -> Result<(), CrawlerError> {
        for store in &self.stores {
            store.save_unresolved(urls).await?;
        }
        Ok(())
    }
}
