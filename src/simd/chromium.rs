use super::Browser;
use crate::CrawlerError;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::layout::Point;
use chromiumoxide::Page;
use futures::StreamExt;
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn cdp_error(e: impl ToString) -> CrawlerError {
    CrawlerError::Browser(e.to_string())
}

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub window_size: (u32, u32),
    pub headed: bool,
    pub executable: Option<PathBuf>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        LaunchOptions {
            window_size: (1920, 1080),
            headed: false,
            executable: None,
        }
    }
}

/// One Chrome process with a single tab, driven over the devtools protocol.
pub struct ChromiumBrowser {
    browser: CdpBrowser,
    page: Page,
    handler: JoinHandle<()>,
}

impl ChromiumBrowser {
    pub async fn launch(options: &LaunchOptions) -> Result<Self, CrawlerError> {
        let (width, height) = options.window_size;
        let mut builder = BrowserConfig::builder().window_size(width, height);
        if options.headed {
            builder = builder.with_head();
        }
        if let Some(executable) = &options.executable {
            builder = builder.chrome_executable(executable);
        }
        let config = builder.build().map_err(CrawlerError::Browser)?;

        let (browser, mut handler) = CdpBrowser::launch(config).await.map_err(cdp_error)?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler stopped: {}", e);
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await.map_err(cdp_error)?;
        debug!("Browser launched ({}x{}, headed={})", width, height, options.headed);
        Ok(ChromiumBrowser {
            browser,
            page,
            handler,
        })
    }

    pub async fn close(mut self) -> Result<(), CrawlerError> {
        if let Err(e) = self.page.close().await {
            warn!("Unable to close tab: {}", e);
        }
        self.browser.close().await.map_err(cdp_error)?;
        if let Err(e) = self.browser.wait().await {
            warn!("Browser did not exit cleanly: {}", e);
        }
        self.handler.await.map_err(cdp_error)?;
        Ok(())
    }

    async fn element(&self, selector: &str) -> Result<chromiumoxide::Element, CrawlerError> {
        self.page
            .find_element(selector)
            .await
            .map_err(|e| CrawlerError::Browser(format!("{}: {}", selector, e)))
    }
}

#[async_trait::async_trait]
impl Browser for ChromiumBrowser {
    async fn goto(&self, url: &str) -> Result<(), CrawlerError> {
        self.page.goto(url).await.map_err(cdp_error)?;
        Ok(())
    }

    async fn set_window_size(&self, width: u32, height: u32) -> Result<(), CrawlerError> {
        let params = SetDeviceMetricsOverrideParams::new(width as i64, height as i64, 1.0, false);
        self.page.execute(params).await.map_err(cdp_error)?;
        Ok(())
    }

    async fn refresh(&self) -> Result<(), CrawlerError> {
        self.page.reload().await.map_err(cdp_error)?;
        Ok(())
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<(), CrawlerError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(CrawlerError::Browser(format!(
                    "{} did not appear within {:?}",
                    selector, timeout
                )));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>, CrawlerError> {
        self.element(selector)
            .await?
            .attribute(name)
            .await
            .map_err(cdp_error)
    }

    async fn text(&self, selector: &str) -> Result<String, CrawlerError> {
        let text = self
            .element(selector)
            .await?
            .inner_text()
            .await
            .map_err(cdp_error)?;
        Ok(text.unwrap_or_default())
    }

    async fn click(&self, selector: &str) -> Result<(), CrawlerError> {
        self.element(selector).await?.click().await.map_err(cdp_error)?;
        Ok(())
    }

    async fn replace_text(&self, selector: &str, text: &str) -> Result<(), CrawlerError> {
        let clear = format!("document.querySelector({:?}).value = ''", selector);
        self.page.evaluate(clear).await.map_err(cdp_error)?;

        let input = self.element(selector).await?;
        input.click().await.map_err(cdp_error)?;
        input.type_str(text).await.map_err(cdp_error)?;
        Ok(())
    }

    async fn read_table(
        &self,
        row_selector: &str,
        cell_selectors: &[&str],
    ) -> Result<Vec<Vec<String>>, CrawlerError> {
        let rows = self
            .page
            .find_elements(row_selector)
            .await
            .map_err(cdp_error)?;

        let mut table = Vec::with_capacity(rows.len());
        for row in rows {
            let mut cells = Vec::with_capacity(cell_selectors.len());
            for selector in cell_selectors {
                let cell = row
                    .find_element(*selector)
                    .await
                    .map_err(|e| CrawlerError::Browser(format!("{}: {}", selector, e)))?;
                cells.push(cell.inner_text().await.map_err(cdp_error)?.unwrap_or_default());
            }
            table.push(cells);
        }
        Ok(table)
    }

    async fn move_mouse(&self, x: f64, y: f64) -> Result<(), CrawlerError> {
        self.page
            .move_mouse(Point::new(x, y))
            .await
            .map_err(cdp_error)?;
        Ok(())
    }

    async fn click_at(&self, x: f64, y: f64) -> Result<(), CrawlerError> {
        self.page.click(Point::new(x, y)).await.map_err(cdp_error)?;
        Ok(())
    }

    async fn eval_i64(&self, script: &str) -> Result<i64, CrawlerError> {
        self.page
            .evaluate(script)
            .await
            .map_err(cdp_error)?
            .into_value::<i64>()
            .map_err(cdp_error)
    }
}
