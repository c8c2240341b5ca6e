//! In-memory stand-ins for the network, the browser and the outputs.

use crate::simd::Browser;
use crate::{CrawlerError, DatasetRow, PageFetcher, Storage};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::time::Duration;

#[derive(Default)]
pub struct FakeFetcher {
    pages: HashMap<String, String>,
    calls: Mutex<Vec<String>>,
    latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeFetcher {
    pub fn new() -> Self {
        FakeFetcher::default()
    }

    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    pub fn with_fixture(self, url: &str, file: &str) -> Self {
        let html = std::fs::read_to_string(format!("tests/htmls/{}", file)).unwrap();
        self.with_page(url, &html)
    }

    /// Every fetch sleeps this long, so overlapping fetches become visible.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Highest number of fetches that were running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<String, CrawlerError> {
        self.calls.lock().unwrap().push(url.to_string());
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| CrawlerError::fetch(url, "404 Not Found"))
    }
}

/// What the result panel shows for one data zone.
#[derive(Debug, Clone)]
pub struct ZoneFixture {
    id: String,
    name: String,
    rows: Vec<Vec<String>>,
}

impl ZoneFixture {
    pub fn new(id: &str, name: &str) -> Self {
        ZoneFixture {
            id: id.to_string(),
            name: name.to_string(),
            rows: vec![],
        }
    }

    pub fn row(mut self, caption: &str, bar: &str) -> Self {
        self.rows.push(vec![caption.to_string(), bar.to_string()]);
        self
    }
}

#[derive(Debug, Default)]
struct Session {
    actions: Vec<String>,
    typed: Vec<String>,
    navigations: usize,
    year: Option<u16>,
    postcode: Option<String>,
    window: (u32, u32),
    failing_reads: u32,
}

/// Scripted index app. Zones are keyed by (postcode, year); a `"*"`
/// postcode matches anything typed for that year.
#[derive(Default)]
pub struct FakeBrowser {
    zones: HashMap<(String, u16), ZoneFixture>,
    clear_disabled: bool,
    session: Mutex<Session>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        FakeBrowser::default()
    }

    pub fn with_zone(self, year: u16, zone: ZoneFixture) -> Self {
        self.with_postcode_zone("*", year, zone)
    }

    pub fn with_postcode_zone(mut self, postcode: &str, year: u16, zone: ZoneFixture) -> Self {
        self.zones.insert((postcode.to_string(), year), zone);
        self
    }

    pub fn with_clear_disabled(mut self) -> Self {
        self.clear_disabled = true;
        self
    }

    /// The next `n` data zone reads fail as if the panel had not rendered.
    pub fn failing_reads(self, n: u32) -> Self {
        self.session.lock().unwrap().failing_reads = n;
        self
    }

    pub fn actions(&self) -> Vec<String> {
        self.session.lock().unwrap().actions.clone()
    }

    pub fn typed(&self) -> Vec<String> {
        self.session.lock().unwrap().typed.clone()
    }

    pub fn navigations(&self) -> usize {
        self.session.lock().unwrap().navigations
    }

    fn record(&self, action: String) {
        self.session.lock().unwrap().actions.push(action);
    }

    fn zone(&self) -> Result<ZoneFixture, CrawlerError> {
        let session = self.session.lock().unwrap();
        let year = session.year.unwrap_or_default();
        let postcode = session.postcode.clone().unwrap_or_default();
        self.zones
            .get(&(postcode.clone(), year))
            .or_else(|| self.zones.get(&("*".to_string(), year)))
            .cloned()
            .ok_or_else(|| {
                CrawlerError::Browser(format!("no result panel for {} ({})", postcode, year))
            })
    }
}

#[async_trait::async_trait]
impl Browser for FakeBrowser {
    async fn goto(&self, url: &str) -> Result<(), CrawlerError> {
        let year = url
            .split("#/simd")
            .nth(1)
            .and_then(|rest| rest.split('/').next())
            .and_then(|year| year.parse().ok());
        let mut session = self.session.lock().unwrap();
        session.year = year;
        session.navigations += 1;
        session.actions.push(format!("goto {}", url));
        Ok(())
    }

    async fn set_window_size(&self, width: u32, height: u32) -> Result<(), CrawlerError> {
        self.session.lock().unwrap().window = (width, height);
        self.record(format!("window {}x{}", width, height));
        Ok(())
    }

    async fn refresh(&self) -> Result<(), CrawlerError> {
        self.record("refresh".to_string());
        Ok(())
    }

    async fn wait_for(&self, _selector: &str, _timeout: Duration) -> Result<(), CrawlerError> {
        Ok(())
    }

    async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>, CrawlerError> {
        if selector == "#clearSelectedDataButton" && name == "class" {
            let class = if self.clear_disabled { "btn disabled" } else { "btn" };
            return Ok(Some(class.to_string()));
        }
        Ok(None)
    }

    async fn text(&self, selector: &str) -> Result<String, CrawlerError> {
        match selector {
            "#datazoneid" => {
                {
                    let mut session = self.session.lock().unwrap();
                    if session.failing_reads > 0 {
                        session.failing_reads -= 1;
                        return Err(CrawlerError::Browser("#datazoneid not rendered".to_string()));
                    }
                }
                Ok(self.zone()?.id)
            }
            "#igname" => Ok(self.zone()?.name),
            other => Err(CrawlerError::Browser(format!("no element {}", other))),
        }
    }

    async fn click(&self, selector: &str) -> Result<(), CrawlerError> {
        self.record(format!("click {}", selector));
        Ok(())
    }

    async fn replace_text(&self, selector: &str, text: &str) -> Result<(), CrawlerError> {
        let mut session = self.session.lock().unwrap();
        session.postcode = Some(text.to_string());
        session.typed.push(text.to_string());
        session.actions.push(format!("type {} {}", selector, text));
        Ok(())
    }

    async fn read_table(
        &self,
        _row_selector: &str,
        _cell_selectors: &[&str],
    ) -> Result<Vec<Vec<String>>, CrawlerError> {
        Ok(self.zone()?.rows)
    }

    async fn move_mouse(&self, x: f64, y: f64) -> Result<(), CrawlerError> {
        self.record(format!("mouse {},{}", x, y));
        Ok(())
    }

    async fn click_at(&self, x: f64, y: f64) -> Result<(), CrawlerError> {
        self.record(format!("click_at {},{}", x, y));
        Ok(())
    }

    async fn eval_i64(&self, script: &str) -> Result<i64, CrawlerError> {
        let (width, height) = self.session.lock().unwrap().window;
        match script {
            "window.innerWidth" => Ok(width as i64),
            "window.innerHeight" => Ok(height as i64),
            other => Err(CrawlerError::Browser(format!("unexpected script {}", other))),
        }
    }
}

/// Keeps every save so tests can inspect the checkpoint history.
#[derive(Default)]
pub struct MemoryStore {
    datasets: Mutex<Vec<(Vec<DatasetRow>, Vec<DatasetRow>)>>,
    unresolved: Mutex<Vec<Vec<String>>>,
}

impl MemoryStore {
    pub fn datasets(&self) -> Vec<(Vec<DatasetRow>, Vec<DatasetRow>)> {
        self.datasets.lock().unwrap().clone()
    }

    pub fn unresolved(&self) -> Vec<Vec<String>> {
        self.unresolved.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Storage for MemoryStore {
    async fn save_datasets(
        &self,
        all: &[DatasetRow],
        selected: &[DatasetRow],
    ) -> Result<(), CrawlerError> {
        self.datasets
            .lock()
            .unwrap()
            .push((all.to_vec(), selected.to_vec()));
        Ok(())
    }

    async fn save_unresolved(&self, urls: &[String]) -> Result<(), CrawlerError> {
        self.unresolved.lock().unwrap().push(urls.to_vec());
        Ok(())
    }
}
