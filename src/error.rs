#[derive(Debug, thiserror::Error)]
pub enum CrawlerError {
    #[error("Fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Unable to parse {url}: {reason}")]
    Parse { url: String, reason: String },

    #[error("Unknown feature icon {icon} on {url}")]
    UnknownFeature { url: String, icon: String },

    #[error("Unknown deprivation domain {name:?}")]
    UnknownDomain { name: String },

    #[error("Query for {postcode} ({year}) failed after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded {
        postcode: String,
        year: u16,
        attempts: u32,
        last_error: String,
    },

    #[error("The html is invalid for page={page}")]
    InvalidPage { page: u32 },

    #[error("Unable to get listing {index} on page={page} ({len} listings)")]
    ListingOutOfRange { index: usize, page: u32, len: usize },

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Database error")]
    DatabaseError(#[from] sqlx::error::Error),

    #[error("IO error")]
    Io(#[from] std::io::Error),

    #[error("CSV error")]
    Csv(#[from] csv::Error),

    #[error("JSON error")]
    Json(#[from] serde_json::Error),
}

impl CrawlerError {
    pub(crate) fn parse(url: &str, reason: impl Into<String>) -> Self {
        CrawlerError::Parse {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn fetch(url: &str, reason: impl ToString) -> Self {
        CrawlerError::Fetch {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}
