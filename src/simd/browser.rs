use crate::CrawlerError;
use tokio::time::Duration;

/// The slice of a live browser session the index client drives.
///
/// Every lookup takes a CSS selector and works on the first match, except
/// `read_table`, which returns one row of cell texts per matching row.
#[async_trait::async_trait]
pub trait Browser: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), CrawlerError>;
    async fn set_window_size(&self, width: u32, height: u32) -> Result<(), CrawlerError>;
    async fn refresh(&self) -> Result<(), CrawlerError>;

    /// Polls until `selector` matches or `timeout` elapses.
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<(), CrawlerError>;

    async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>, CrawlerError>;
    async fn text(&self, selector: &str) -> Result<String, CrawlerError>;
    async fn click(&self, selector: &str) -> Result<(), CrawlerError>;
    /// Empties the input, then types `text` into it.
    async fn replace_text(&self, selector: &str, text: &str) -> Result<(), CrawlerError>;

    async fn read_table(
        &self,
        row_selector: &str,
        cell_selectors: &[&str],
    ) -> Result<Vec<Vec<String>>, CrawlerError>;

    async fn move_mouse(&self, x: f64, y: f64) -> Result<(), CrawlerError>;
    async fn click_at(&self, x: f64, y: f64) -> Result<(), CrawlerError>;

    async fn eval_i64(&self, script: &str) -> Result<i64, CrawlerError>;
}
