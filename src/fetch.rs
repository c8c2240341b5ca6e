use crate::{CrawlerError, PageFetcher};
use reqwest::{header, Client, StatusCode};
use std::time::Instant;
use tokio::time::Duration;
use tracing::debug;

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/108.0.0.0 Safari/537.36";

lazy_static::lazy_static! {
    static ref LAST_REQUEST_MUTEX: tokio::sync::Mutex<Option<Instant>> = tokio::sync::Mutex::new(None);
    static ref REQUEST_DELAY: Duration = Duration::from_millis(200);
}

/// reqwest client that only ever accepts a 200 response.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<HttpFetcher, CrawlerError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::USER_AGENT, header::HeaderValue::from_static(USER_AGENT));
        headers.insert(
            header::ACCEPT_LANGUAGE,
            header::HeaderValue::from_static("en-GB,en;q=0.9"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CrawlerError::fetch("<client>", e))?;
        Ok(HttpFetcher { client })
    }

    /// Spaces consecutive requests by `REQUEST_DELAY`, process wide.
    async fn throttle() {
        let mut last_request_mutex = LAST_REQUEST_MUTEX.lock().await;
        let last_request = last_request_mutex.take();
        if let Some(last_request) = last_request {
            let duration = Instant::now().duration_since(last_request);
            if duration < *REQUEST_DELAY {
                tokio::time::sleep(*REQUEST_DELAY - duration).await;
            }
        }
        last_request_mutex.replace(Instant::now());
    }
}

#[async_trait::async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, CrawlerError> {
        Self::throttle().await;

        debug!("Visit {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CrawlerError::fetch(url, e))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(CrawlerError::fetch(url, format!("status {}", status)));
        }

        response.text().await.map_err(|e| CrawlerError::fetch(url, e))
    }
}
