mod browser;
#[cfg(feature = "chromium")]
mod chromium;
mod client;

pub use browser::Browser;
#[cfg(feature = "chromium")]
pub use chromium::{ChromiumBrowser, LaunchOptions};
pub use client::{IndexQueryClient, Phase, QueryConfig, SessionState};

use crate::CrawlerError;
use std::fmt;

pub fn entry_url(year: u16) -> String {
    format!("https://simd.scot/#/simd{}/BTTTFTT/14/-3.2023/55.9450/", year)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Overall,
    Income,
    Employment,
    Health,
    Education,
    Housing,
    GeographicAccess,
    Crime,
}

impl Domain {
    pub const ALL: [Domain; 8] = [
        Domain::Overall,
        Domain::Income,
        Domain::Employment,
        Domain::Health,
        Domain::Education,
        Domain::Housing,
        Domain::GeographicAccess,
        Domain::Crime,
    ];

    /// Maps a lower-cased table caption onto its domain by substring.
    pub fn classify(name: &str) -> Result<Domain, CrawlerError> {
        let domain = if name.contains("overall") {
            Domain::Overall
        } else if name.contains("income") {
            Domain::Income
        } else if name.contains("employment") {
            Domain::Employment
        } else if name.contains("health") {
            Domain::Health
        } else if name.contains("education") {
            Domain::Education
        } else if name.contains("housing") {
            Domain::Housing
        } else if name.contains("geographic") {
            Domain::GeographicAccess
        } else if name.contains("crime") {
            Domain::Crime
        } else {
            return Err(CrawlerError::UnknownDomain {
                name: name.to_string(),
            });
        };
        Ok(domain)
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Rank within the year's data zones plus its decile bar (10 = least deprived).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainRank {
    pub rank: i64,
    pub bar: i8,
}

impl DomainRank {
    pub const UNKNOWN: DomainRank = DomainRank { rank: -1, bar: -1 };
}

impl Default for DomainRank {
    fn default() -> Self {
        DomainRank::UNKNOWN
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRecord {
    pub data_zone_id: String,
    pub data_zone_name: String,
    pub postcode: String,
    pub year: u16,
    ranks: [DomainRank; 8],
}

impl IndexRecord {
    pub fn new(data_zone_id: String, data_zone_name: String, postcode: String, year: u16) -> Self {
        IndexRecord {
            data_zone_id,
            data_zone_name,
            postcode,
            year,
            ranks: [DomainRank::UNKNOWN; 8],
        }
    }

    pub fn get(&self, domain: Domain) -> DomainRank {
        self.ranks[domain.index()]
    }

    pub fn set(&mut self, domain: Domain, rank: DomainRank) {
        self.ranks[domain.index()] = rank;
    }

    pub fn overall_bar(&self) -> i8 {
        self.get(Domain::Overall).bar
    }
}

impl fmt::Display for IndexRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Year={} SIMD at {}, {}",
            self.year, self.data_zone_name, self.postcode
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_caption_maps_to_one_domain() {
        let captions = [
            ("overall", Domain::Overall),
            ("income domain", Domain::Income),
            ("employment domain", Domain::Employment),
            ("health domain", Domain::Health),
            ("education, skills & training", Domain::Education),
            ("housing domain", Domain::Housing),
            ("geographic access to services", Domain::GeographicAccess),
            ("crime domain", Domain::Crime),
        ];
        for (caption, domain) in captions {
            assert_eq!(Domain::classify(caption).unwrap(), domain);
        }
    }

    #[test]
    fn unknown_caption_is_an_error() {
        let err = Domain::classify("access to broadband").unwrap_err();
        assert!(
            matches!(err, CrawlerError::UnknownDomain { name } if name == "access to broadband")
        );
    }

    #[test]
    fn fresh_record_is_unknown_everywhere() {
        let mut record =
            IndexRecord::new("s01008616".into(), "marchmont".into(), "eh9 1hf".into(), 2020);
        for domain in Domain::ALL {
            assert_eq!(record.get(domain), DomainRank::UNKNOWN);
        }
        record.set(Domain::Crime, DomainRank { rank: 5540, bar: 8 });
        assert_eq!(record.get(Domain::Crime).bar, 8);
        assert_eq!(record.overall_bar(), -1);
    }

    #[test]
    fn entry_url_is_year_parameterised() {
        assert_eq!(
            entry_url(2016),
            "https://simd.scot/#/simd2016/BTTTFTT/14/-3.2023/55.9450/"
        );
    }
}
