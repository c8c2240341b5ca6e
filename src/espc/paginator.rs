use super::{parse_property, PropertyRecord};
use crate::{CrawlerError, PageFetcher};
use futures::stream::{self, StreamExt, TryStreamExt};
use lazy_static::lazy_static;
use scraper::{Html, Selector};
use std::num::NonZeroUsize;
use tracing::{debug, info};

pub const BASE_URL: &str = "https://espc.com";

const E: &str = "Invalid selector";
lazy_static! {
    static ref NO_RESULTS: Selector = Selector::parse("div.no-results").expect(E);
    static ref LISTING_LINK: Selector = Selector::parse("div.infoWrap > a").expect(E);
    static ref BASE: reqwest::Url = reqwest::Url::parse(BASE_URL).expect("Invalid base url");
}

/// Search constraints baked into every result-page url.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchConstraints {
    pub location: String,
    pub min_beds: String,
    pub max_price: String,
    pub property_type: String,
    pub page_size: u32,
}

impl Default for SearchConstraints {
    fn default() -> Self {
        SearchConstraints {
            location: "edinburgh".to_string(),
            min_beds: "1plus".to_string(),
            max_price: "210000".to_string(),
            property_type: "flat,house".to_string(),
            page_size: 50,
        }
    }
}

impl SearchConstraints {
    pub fn page_url(&self, page: u32) -> String {
        format!(
            "{}/properties?p={}&ps={}&locations={}&minbeds={}&maxprice={}&ptype={}",
            BASE_URL,
            page,
            self.page_size,
            self.location,
            self.min_beds,
            self.max_price,
            self.property_type
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Fetching(u32),
    Exhausted,
}

/// Walks result pages until the portal renders its "no results" marker.
///
/// There is no page count to go on: the marker is the only stop signal, so
/// `max_pages` exists as an optional cap for callers that want one.
pub struct ListingPaginator<F> {
    fetcher: F,
    constraints: SearchConstraints,
    workers: usize,
    max_pages: Option<u32>,
    state: PageState,
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

impl<F: PageFetcher> ListingPaginator<F> {
    pub fn new(fetcher: F, constraints: SearchConstraints) -> Self {
        ListingPaginator {
            fetcher,
            constraints,
            workers: default_workers(),
            max_pages: None,
            state: PageState::Fetching(1),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_max_pages(mut self, max_pages: Option<u32>) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    pub fn constraints(&self) -> &SearchConstraints {
        &self.constraints
    }

    pub fn reset(&mut self) {
        self.state = PageState::Fetching(1);
    }

    pub async fn fetch_page(&self, page: u32) -> Result<String, CrawlerError> {
        let url = self.constraints.page_url(page);
        debug!("url created for page={}: {}", page, url);
        self.fetcher.fetch(&url).await
    }

    pub fn is_valid_page(html: &str) -> bool {
        Html::parse_document(html)
            .select(&NO_RESULTS)
            .next()
            .is_none()
    }

    pub fn extract_listing_urls(html: &str) -> Vec<String> {
        Html::parse_document(html)
            .select(&LISTING_LINK)
            .filter_map(|a| a.value().attr("href"))
            .map(str::trim)
            .filter(|href| !href.is_empty())
            .filter_map(|href| BASE.join(href).ok())
            .map(String::from)
            .collect()
    }

    /// Fetches and parses every listing, `workers` at a time. The first
    /// failure cancels the rest and is returned as is.
    async fn resolve(&self, urls: Vec<String>) -> Result<Vec<PropertyRecord>, CrawlerError> {
        let workers = self.workers.min(urls.len()).max(1);
        let fetcher = &self.fetcher;

        stream::iter(urls)
            .map(|url| async move {
                let html = fetcher.fetch(&url).await?;
                parse_property(&html, &url)
            })
            .buffered(workers)
            .try_collect()
            .await
    }

    /// Yields the records of the current page and moves to the next one.
    /// `Ok(None)` once the results run out. On error the page is left
    /// current, so calling again retries it.
    pub async fn advance(&mut self) -> Result<Option<Vec<PropertyRecord>>, CrawlerError> {
        let page = match self.state {
            PageState::Exhausted => return Ok(None),
            PageState::Fetching(page) => page,
        };

        if matches!(self.max_pages, Some(max) if page > max) {
            info!("Reached page cap at page={}", page);
            self.state = PageState::Exhausted;
            return Ok(None);
        }

        let html = self.fetch_page(page).await?;
        if !Self::is_valid_page(&html) {
            info!("No results on page={}", page);
            self.state = PageState::Exhausted;
            return Ok(None);
        }

        let urls = Self::extract_listing_urls(&html);
        debug!("Found {} listings on page={}", urls.len(), page);
        let records = self.resolve(urls).await?;

        self.state = PageState::Fetching(page + 1);
        Ok(Some(records))
    }

    /// Resolves only the listing at zero-based `index` on `page`,
    /// independent of the iteration state.
    pub async fn get(&self, index: usize, page: u32) -> Result<PropertyRecord, CrawlerError> {
        let html = self.fetch_page(page).await?;
        if !Self::is_valid_page(&html) {
            return Err(CrawlerError::InvalidPage { page });
        }

        let urls = Self::extract_listing_urls(&html);
        let url = urls.get(index).ok_or(CrawlerError::ListingOutOfRange {
            index,
            page,
            len: urls.len(),
        })?;
        let html = self.fetcher.fetch(url).await?;
        parse_property(&html, url)
    }
}
