mod extractor;
mod paginator;

pub use extractor::parse_property;
pub use paginator::{ListingPaginator, PageState, SearchConstraints, BASE_URL};

use std::fmt;

/// One listing on the portal. `-1` and `""` mean the page did not show the field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyRecord {
    pub price_type: String,
    pub price_val: i64,
    pub title: String,
    pub address: String,
    pub postcode: String,
    pub bed_num: i32,
    pub bath_num: i32,
    pub couch_num: i32,
    pub floor_area: i32,
    pub council_tax: String,
    pub epc: String,
    /// Canonical url, the dedup key for a run.
    pub url: String,
}

impl fmt::Display for PropertyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} at {}", self.price_type, self.price_val, self.postcode)
    }
}
