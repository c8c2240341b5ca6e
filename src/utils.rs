use chrono::{DateTime, FixedOffset, Offset};
use lazy_regex::regex;
use sqlx::SqlitePool;

pub(crate) async fn is_table_exists(
    pool: &SqlitePool,
    table_name: &str,
) -> Result<bool, sqlx::Error> {
    Ok(
        sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name = ?")
            .bind(table_name)
            .fetch_optional(pool)
            .await?
            .is_some(),
    )
}

pub(crate) fn get_now() -> DateTime<FixedOffset> {
    let now = chrono::offset::Local::now();
    now.with_timezone(&now.offset().fix())
}

/// Strips the query string, which the portal decorates with ad-tracking parameters.
pub fn canonical_url(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

/// Last UK-postcode-shaped substring of an already lower-cased address.
pub fn extract_postcode(address: &str) -> Option<&str> {
    regex!(r"[a-z]{2}\d+\s*\d+[a-z]+")
        .find_iter(address)
        .last()
        .map(|m| m.as_str())
}
