use super::{entry_url, Browser, Domain, DomainRank, IndexRecord};
use crate::CrawlerError;
use itertools::Itertools;
use tokio::time::Duration;
use tracing::{debug, warn};

const CLEAR_BUTTON: &str = "#clearSelectedDataButton";
const POSTCODE_INPUT: &str = "#postcode";
const POSTCODE_BUTTON: &str = "#postcodeButton";
const DATA_ZONE_ID: &str = "#datazoneid";
const DATA_ZONE_NAME: &str = "#igname";
const COMPONENT_ROWS: &str = "#componenttable > tbody > tr";
const COMPONENT_CAPTION: &str = ".componentcaption";
const COMPONENT_BAR: &str = ".componentcaption + div";
const SOURCE: &str = "simd.scot";

#[derive(Debug, Clone)]
pub struct QueryConfig {
    pub window_size: (u32, u32),
    pub max_attempts: u32,
    pub element_timeout: Duration,
    pub settle_base: Duration,
    pub settle_step: Duration,
}

impl Default for QueryConfig {
    fn default() -> Self {
        QueryConfig {
            window_size: (1920, 1080),
            max_attempts: 10,
            element_timeout: Duration::from_secs(10),
            settle_base: Duration::from_millis(100),
            settle_step: Duration::from_secs(1),
        }
    }
}

impl QueryConfig {
    /// Grows by one `settle_step` every third attempt (attempts count from 1).
    pub fn settle_delay(&self, attempt: u32) -> Duration {
        self.settle_base + self.settle_step * (attempt / 3)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loaded,
    Cleared,
    Submitted,
    Resolved,
    Failed,
}

/// What the session was last asked and how far that request got.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub year: Option<u16>,
    pub postcode: Option<String>,
    pub phase: Phase,
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState {
            year: None,
            postcode: None,
            phase: Phase::Idle,
        }
    }
}

/// Drives one browser session against the deprivation-index app.
///
/// The app keeps its own selection state between queries, so a client
/// must not be shared: `query` takes `&mut self` and every call carries
/// the full (postcode, year) request.
pub struct IndexQueryClient<B> {
    browser: B,
    config: QueryConfig,
    state: SessionState,
}

impl<B: Browser> IndexQueryClient<B> {
    pub fn new(browser: B, config: QueryConfig) -> Self {
        IndexQueryClient {
            browser,
            config,
            state: SessionState::default(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn browser(&self) -> &B {
        &self.browser
    }

    pub fn into_browser(self) -> B {
        self.browser
    }

    /// Runs the clear/query/wait/read cycle, restarting it from navigation
    /// on any failure, up to `max_attempts` times.
    pub async fn query(&mut self, postcode: &str, year: u16) -> Result<IndexRecord, CrawlerError> {
        self.state = SessionState {
            year: Some(year),
            postcode: Some(postcode.to_string()),
            phase: Phase::Idle,
        };

        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error = String::new();
        for attempt in 1..=max_attempts {
            match self.attempt(postcode, year, attempt).await {
                Ok(record) => {
                    self.state.phase = Phase::Resolved;
                    debug!("Resolved {} on attempt {}", record, attempt);
                    return Ok(record);
                }
                Err(e) => {
                    warn!(
                        "Attempt {}/{} for {} ({}) failed in {:?}: {}",
                        attempt, max_attempts, postcode, year, self.state.phase, e
                    );
                    last_error = e.to_string();
                }
            }
        }

        self.state.phase = Phase::Failed;
        Err(CrawlerError::MaxRetriesExceeded {
            postcode: postcode.to_string(),
            year,
            attempts: max_attempts,
            last_error,
        })
    }

    async fn attempt(
        &mut self,
        postcode: &str,
        year: u16,
        attempt: u32,
    ) -> Result<IndexRecord, CrawlerError> {
        self.state.phase = Phase::Idle;

        let (width, height) = self.config.window_size;
        self.browser.goto(&entry_url(year)).await?;
        self.browser.set_window_size(width, height).await?;
        self.browser.refresh().await?;
        self.state.phase = Phase::Loaded;

        self.clear().await?;
        self.state.phase = Phase::Cleared;

        self.start_search(postcode).await?;
        self.state.phase = Phase::Submitted;

        tokio::time::sleep(self.config.settle_delay(attempt)).await;
        self.read_results(postcode, year).await
    }

    async fn clear(&self) -> Result<(), CrawlerError> {
        self.browser
            .wait_for(CLEAR_BUTTON, self.config.element_timeout)
            .await?;
        let class = self.browser.attribute(CLEAR_BUTTON, "class").await?;
        if !class.unwrap_or_default().contains("disabled") {
            self.browser.click(CLEAR_BUTTON).await?;
        }
        Ok(())
    }

    async fn start_search(&self, postcode: &str) -> Result<(), CrawlerError> {
        let timeout = self.config.element_timeout;
        self.browser.wait_for(POSTCODE_INPUT, timeout).await?;
        self.browser.replace_text(POSTCODE_INPUT, postcode).await?;

        self.browser.wait_for(POSTCODE_BUTTON, timeout).await?;
        self.browser.click(POSTCODE_BUTTON).await?;

        // Overlays only go away, and the result panel only renders, after
        // the pointer is reset and the map centre is clicked.
        self.browser.move_mouse(0.0, 0.0).await?;
        let width = self.browser.eval_i64("window.innerWidth").await?;
        let height = self.browser.eval_i64("window.innerHeight").await?;
        self.browser
            .click_at((width / 2) as f64, (height / 2) as f64)
            .await
    }

    async fn read_results(&self, postcode: &str, year: u16) -> Result<IndexRecord, CrawlerError> {
        let data_zone_id = self.browser.text(DATA_ZONE_ID).await?.trim().to_lowercase();
        let data_zone_name = self.browser.text(DATA_ZONE_NAME).await?.trim().to_lowercase();
        let mut record = IndexRecord::new(data_zone_id, data_zone_name, postcode.to_string(), year);

        let rows = self
            .browser
            .read_table(COMPONENT_ROWS, &[COMPONENT_CAPTION, COMPONENT_BAR])
            .await?;
        for row in rows {
            let (caption, bar) = row
                .iter()
                .map(String::as_str)
                .collect_tuple()
                .ok_or_else(|| CrawlerError::Browser(format!("malformed row {:?}", row)))?;
            let (domain, rank) = parse_row(caption, bar)?;
            record.set(domain, rank);
        }

        Ok(record)
    }
}

/// Parses a "Income domain: 6530.5" caption and its "10" bar cell.
fn parse_row(caption: &str, bar: &str) -> Result<(Domain, DomainRank), CrawlerError> {
    let invalid = |reason: String| CrawlerError::parse(SOURCE, reason);

    let (name, value) = caption
        .splitn(2, ':')
        .collect_tuple()
        .ok_or_else(|| invalid(format!("caption without value {:?}", caption)))?;
    let domain = Domain::classify(&name.trim().to_lowercase())?;

    let rank = value
        .trim()
        .parse::<f64>()
        .map_err(|e| invalid(format!("rank {:?}: {}", value, e)))?
        .trunc() as i64;
    let bar = bar
        .trim()
        .parse::<i8>()
        .map_err(|e| invalid(format!("bar {:?}: {}", bar, e)))?;
    if !(1..=10).contains(&bar) {
        return Err(invalid(format!("bar {} outside 1..=10", bar)));
    }

    Ok((domain, DomainRank { rank, bar }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBrowser, ZoneFixture};
    use pretty_assertions::assert_eq;

    fn quick() -> QueryConfig {
        QueryConfig {
            settle_base: Duration::ZERO,
            settle_step: Duration::ZERO,
            element_timeout: Duration::ZERO,
            ..QueryConfig::default()
        }
    }

    fn marchmont_2020() -> ZoneFixture {
        ZoneFixture::new("S01008616", "Marchmont East and Sciennes")
            .row("Overall: 6843", "10")
            .row("Income domain: 6530.5", "10")
            .row("Employment domain: 6960", "10")
            .row("Health domain: 6969", "10")
            .row("Education domain: 5944", "9")
            .row("Housing domain: 106", "1")
            .row("Geographic Access domain: 6819", "10")
            .row("Crime domain: 5540", "8")
    }

    #[tokio::test]
    async fn reads_all_eight_domains() {
        let browser = FakeBrowser::new().with_zone(2020, marchmont_2020());
        let mut client = IndexQueryClient::new(browser, quick());

        let record = client.query("eh9 1hf", 2020).await.unwrap();

        assert_eq!(record.data_zone_id, "s01008616");
        assert_eq!(record.data_zone_name, "marchmont east and sciennes");
        assert_eq!(record.postcode, "eh9 1hf");
        assert_eq!(record.year, 2020);
        let expected = [
            (Domain::Overall, 6843, 10),
            (Domain::Income, 6530, 10),
            (Domain::Employment, 6960, 10),
            (Domain::Health, 6969, 10),
            (Domain::Education, 5944, 9),
            (Domain::Housing, 106, 1),
            (Domain::GeographicAccess, 6819, 10),
            (Domain::Crime, 5540, 8),
        ];
        for (domain, rank, bar) in expected {
            assert_eq!(record.get(domain), DomainRank { rank, bar }, "{:?}", domain);
        }

        assert_eq!(client.state().phase, Phase::Resolved);
        assert_eq!(client.state().year, Some(2020));
        assert_eq!(client.browser().typed(), vec!["eh9 1hf".to_string()]);
    }

    #[tokio::test]
    async fn cycle_order_and_viewport_click() {
        let browser = FakeBrowser::new().with_zone(2016, marchmont_2020());
        let mut client = IndexQueryClient::new(browser, quick());
        client.query("eh9 1hf", 2016).await.unwrap();

        let actions = client.browser().actions();
        assert_eq!(
            actions,
            vec![
                "goto https://simd.scot/#/simd2016/BTTTFTT/14/-3.2023/55.9450/".to_string(),
                "window 1920x1080".to_string(),
                "refresh".to_string(),
                "click #clearSelectedDataButton".to_string(),
                "type #postcode eh9 1hf".to_string(),
                "click #postcodeButton".to_string(),
                "mouse 0,0".to_string(),
                "click_at 960,540".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn disabled_clear_button_is_left_alone() {
        let browser = FakeBrowser::new()
            .with_zone(2020, marchmont_2020())
            .with_clear_disabled();
        let mut client = IndexQueryClient::new(browser, quick());
        client.query("eh9 1hf", 2020).await.unwrap();

        assert!(!client
            .browser()
            .actions()
            .contains(&"click #clearSelectedDataButton".to_string()));
    }

    #[tokio::test]
    async fn transient_failures_restart_the_whole_cycle() {
        let browser = FakeBrowser::new()
            .with_zone(2020, marchmont_2020())
            .failing_reads(2);
        let mut client = IndexQueryClient::new(browser, quick());

        let record = client.query("eh9 1hf", 2020).await.unwrap();
        assert_eq!(record.overall_bar(), 10);
        assert_eq!(client.browser().navigations(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_ten_attempts() {
        let browser = FakeBrowser::new().failing_reads(u32::MAX);
        let mut client = IndexQueryClient::new(browser, quick());

        let err = client.query("eh9 1hf", 2012).await.unwrap_err();
        assert!(matches!(
            err,
            CrawlerError::MaxRetriesExceeded { attempts: 10, year: 2012, .. }
        ));
        assert_eq!(client.browser().navigations(), 10);
        assert_eq!(client.state().phase, Phase::Failed);
    }

    #[tokio::test]
    async fn unknown_domain_is_retried_then_fatal() {
        let browser = FakeBrowser::new().with_zone(
            2020,
            marchmont_2020().row("Broadband domain: 12", "3"),
        );
        let mut client = IndexQueryClient::new(browser, QueryConfig { max_attempts: 3, ..quick() });

        let err = client.query("eh9 1hf", 2020).await.unwrap_err();
        match err {
            CrawlerError::MaxRetriesExceeded {
                attempts,
                last_error,
                ..
            } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("broadband"), "{}", last_error);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(client.browser().navigations(), 3);
    }

    #[tokio::test]
    async fn session_is_reused_across_years() {
        let browser = FakeBrowser::new()
            .with_zone(2020, marchmont_2020())
            .with_zone(
                2012,
                ZoneFixture::new(
                    "S01002002",
                    "Edinburgh, City of - Marchmont East and Sciennes",
                )
                .row("Overall: 6481", "10"),
            );
        let mut client = IndexQueryClient::new(browser, quick());

        let newer = client.query("eh9 1hf", 2020).await.unwrap();
        let older = client.query("eh9 1hf", 2012).await.unwrap();
        assert_eq!(newer.year, 2020);
        assert_eq!(older.year, 2012);
        assert_eq!(older.data_zone_id, "s01002002");
        assert_eq!(older.get(Domain::Crime), DomainRank::UNKNOWN);
        assert_eq!(client.browser().navigations(), 2);
    }

    #[test]
    fn settle_delay_grows_every_third_attempt() {
        let config = QueryConfig::default();
        assert_eq!(config.settle_delay(1), Duration::from_millis(100));
        assert_eq!(config.settle_delay(2), Duration::from_millis(100));
        assert_eq!(config.settle_delay(3), Duration::from_millis(1100));
        assert_eq!(config.settle_delay(9), Duration::from_millis(3100));
    }

    #[test]
    fn bars_outside_deciles_are_rejected() {
        assert!(parse_row("Overall: 10", "0").is_err());
        assert!(parse_row("Overall: 10", "11").is_err());
        assert!(parse_row("Overall: ten", "5").is_err());
        assert_eq!(
            parse_row("Crime domain: 5540", " 8 ").unwrap(),
            (Domain::Crime, DomainRank { rank: 5540, bar: 8 })
        );
    }
}
