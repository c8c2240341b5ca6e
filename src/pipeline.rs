use crate::espc::{ListingPaginator, PropertyRecord};
use crate::simd::{Browser, IndexQueryClient, IndexRecord};
use crate::{CrawlerError, PageFetcher, Storage};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

/// Lowest overall decile bar, in every year, for a row to be selected.
pub const MIN_OVERALL_BAR: i8 = 7;
/// Price ceiling for anything not sold at a fixed price.
pub const PRICE_CEILING: i64 = 180_000;

/// A listing and its three yearly index records, built only once all three
/// lookups have succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelatedRow {
    pub property: PropertyRecord,
    pub simd_2020: IndexRecord,
    pub simd_2016: IndexRecord,
    pub simd_2012: IndexRecord,
}

impl CorrelatedRow {
    pub fn is_selected(&self) -> bool {
        let (b2012, b2016, b2020) = (
            self.simd_2012.overall_bar(),
            self.simd_2016.overall_bar(),
            self.simd_2020.overall_bar(),
        );
        let least_deprived = b2012.min(b2016).min(b2020) >= MIN_OVERALL_BAR;
        let affordable = !(self.property.price_val > PRICE_CEILING
            && !self.property.price_type.contains("fixed"));
        let efficient = !matches!(self.property.epc.as_str(), "E" | "D");
        let improving = b2012 <= b2016 && b2016 <= b2020;

        least_deprived && affordable && efficient && improving
    }

    pub fn to_dataset_row(&self, index: usize) -> DatasetRow {
        let p = &self.property;
        DatasetRow {
            index,
            title: p.title.clone(),
            url: p.url.clone(),
            postcode: p.postcode.clone(),
            price_val: p.price_val,
            price_type: p.price_type.clone(),
            epc: p.epc.clone(),
            council_tax: p.council_tax.clone(),
            bed_num: p.bed_num,
            bath_num: p.bath_num,
            couch_num: p.couch_num,
            floor_area: p.floor_area,
            simd_2012_overall_rank_bar: self.simd_2012.overall_bar(),
            simd_2016_overall_rank_bar: self.simd_2016.overall_bar(),
            simd_2020_overall_rank_bar: self.simd_2020.overall_bar(),
        }
    }
}

/// Flat output row. Field order is the column order of the written datasets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetRow {
    #[serde(rename = "")]
    pub index: usize,
    pub title: String,
    pub url: String,
    pub postcode: String,
    pub price_val: i64,
    pub price_type: String,
    pub epc: String,
    pub council_tax: String,
    pub bed_num: i32,
    pub bath_num: i32,
    pub couch_num: i32,
    pub floor_area: i32,
    pub simd_2012_overall_rank_bar: i8,
    pub simd_2016_overall_rank_bar: i8,
    pub simd_2020_overall_rank_bar: i8,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub pages: u32,
    pub listings: usize,
    pub duplicates: usize,
    pub correlated: usize,
    pub selected: usize,
    pub unresolved: usize,
    /// Message of the error that stopped iteration early, if any.
    pub aborted: Option<String>,
}

#[derive(Debug, Default)]
struct RunState {
    seen: HashSet<String>,
    rows: Vec<CorrelatedRow>,
    unresolved: Vec<String>,
}

/// Joins every listing the paginator yields with its three index records.
///
/// Index failures only cost the listing (it goes to the unresolved list and
/// a checkpoint is written); paginator failures end the run, after which the
/// final checkpoint is still written.
pub struct PipelineDriver<F, B, S> {
    paginator: ListingPaginator<F>,
    client: IndexQueryClient<B>,
    storage: S,
    state: RunState,
    summary: RunSummary,
}

impl<F, B, S> PipelineDriver<F, B, S>
where
    F: PageFetcher,
    B: Browser,
    S: Storage,
{
    pub fn new(paginator: ListingPaginator<F>, client: IndexQueryClient<B>, storage: S) -> Self {
        PipelineDriver {
            paginator,
            client,
            storage,
            state: RunState::default(),
            summary: RunSummary::default(),
        }
    }

    pub fn rows(&self) -> &[CorrelatedRow] {
        &self.state.rows
    }

    pub fn unresolved(&self) -> &[String] {
        &self.state.unresolved
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_client(self) -> IndexQueryClient<B> {
        self.client
    }

    /// Runs to completion and writes the final checkpoint. Only a failed
    /// final checkpoint is returned as an error.
    pub async fn run(&mut self) -> Result<RunSummary, CrawlerError> {
        let search = self.paginator.constraints();
        info!(
            "Searching {} (beds {}, max price {}, types {})",
            search.location, search.min_beds, search.max_price, search.property_type
        );

        if let Err(e) = self.crawl().await {
            error!("Run stopped early: {}", e);
            self.summary.aborted = Some(e.to_string());
        }

        self.checkpoint().await?;

        self.summary.correlated = self.state.rows.len();
        self.summary.selected = self.state.rows.iter().filter(|r| r.is_selected()).count();
        self.summary.unresolved = self.state.unresolved.len();
        info!(
            "Finished after {} pages: {} listings, {} correlated, {} selected, {} unresolved",
            self.summary.pages,
            self.summary.listings,
            self.summary.correlated,
            self.summary.selected,
            self.summary.unresolved
        );
        Ok(self.summary.clone())
    }

    async fn crawl(&mut self) -> Result<(), CrawlerError> {
        while let Some(records) = self.paginator.advance().await? {
            self.summary.pages += 1;
            info!("Start on page={} ({} listings)", self.summary.pages, records.len());

            for property in records {
                self.process(property).await?;
            }
        }
        Ok(())
    }

    async fn process(&mut self, property: PropertyRecord) -> Result<(), CrawlerError> {
        if !self.state.seen.insert(property.url.clone()) {
            debug!("Skip duplicate {}", property.url);
            self.summary.duplicates += 1;
            return Ok(());
        }
        self.summary.listings += 1;

        info!("Getting results for {} ({})", property.url, property.postcode);
        match self.resolve(&property.postcode).await {
            Ok((simd_2020, simd_2016, simd_2012)) => {
                self.state.rows.push(CorrelatedRow {
                    property,
                    simd_2020,
                    simd_2016,
                    simd_2012,
                });
            }
            Err(e) => {
                error!("Unresolved {}: {}", property.url, e);
                self.state.unresolved.push(property.url);
                self.checkpoint().await?;
            }
        }
        Ok(())
    }

    /// Queries the three editions one after another on the shared session.
    async fn resolve(
        &mut self,
        postcode: &str,
    ) -> Result<(IndexRecord, IndexRecord, IndexRecord), CrawlerError> {
        if postcode.is_empty() {
            warn!("No postcode to look up");
            return Err(CrawlerError::parse("simd.scot", "empty postcode"));
        }

        let simd_2020 = self.client.query(postcode, 2020).await?;
        let simd_2016 = self.client.query(postcode, 2016).await?;
        let simd_2012 = self.client.query(postcode, 2012).await?;
        Ok((simd_2020, simd_2016, simd_2012))
    }

    /// Overwrites every output with the current run state.
    async fn checkpoint(&self) -> Result<(), CrawlerError> {
        let all: Vec<DatasetRow> = self
            .state
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| row.to_dataset_row(i))
            .collect();
        let selected: Vec<DatasetRow> = self
            .state
            .rows
            .iter()
            .zip(&all)
            .filter(|(row, _)| row.is_selected())
            .map(|(_, dataset_row)| dataset_row.clone())
            .collect();

        debug!(
            "Checkpoint: {} rows, {} selected, {} unresolved",
            all.len(),
            selected.len(),
            self.state.unresolved.len()
        );
        self.storage.save_unresolved(&self.state.unresolved).await?;
        self.storage.save_datasets(&all, &selected).await
    }
}

/// Passes a setup result through. When setup failed, empty outputs are
/// written before the error is returned, so files from an earlier run are
/// never left looking like this run's.
pub async fn setup_or_checkpoint<T, S: Storage>(
    setup: Result<T, CrawlerError>,
    storage: &S,
) -> Result<T, CrawlerError> {
    let e = match setup {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    error!("Setup failed, writing empty outputs: {}", e);
    let written = match storage.save_unresolved(&[]).await {
        Ok(()) => storage.save_datasets(&[], &[]).await,
        Err(save_error) => Err(save_error),
    };
    if let Err(save_error) = written {
        error!("Unable to write empty outputs: {}", save_error);
    }
    Err(e)
}
