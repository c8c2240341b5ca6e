use crate::espc::SearchConstraints;
use crate::simd::QueryConfig;
use clap::Parser;
use std::path::PathBuf;

/// Joins portal listings with the deprivation index and keeps the ones
/// worth a viewing.
#[derive(Parser, Debug, Clone)]
#[command(name = "property-insights", version)]
pub struct Args {
    /// Search location on the portal
    #[arg(long, default_value = "edinburgh")]
    pub location: String,

    /// Minimum bedrooms filter, as the portal spells it
    #[arg(long, default_value = "1plus")]
    pub min_beds: String,

    /// Maximum asking price
    #[arg(long, default_value = "210000")]
    pub max_price: String,

    /// Comma separated property types
    #[arg(long, default_value = "flat,house")]
    pub property_type: String,

    /// Listings per result page
    #[arg(long, default_value_t = 50)]
    pub page_size: u32,

    /// Stop after this many result pages
    #[arg(long)]
    pub max_pages: Option<u32>,

    /// Concurrent listing fetches per page (defaults to available parallelism)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Directory receiving the csv and json outputs
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Also keep the outputs in `<NAME>.db`
    #[arg(long, value_name = "NAME")]
    pub sqlite: Option<String>,

    /// Browser window, WIDTHxHEIGHT
    #[arg(long, default_value = "1920x1080", value_parser = parse_window)]
    pub window: (u32, u32),

    /// Show the browser window instead of running headless
    #[arg(long)]
    pub headed: bool,

    /// Chrome or Chromium binary to launch instead of the detected one
    #[arg(long)]
    pub chrome: Option<PathBuf>,

    /// Attempts per index query before the listing is given up
    #[arg(long, default_value_t = 10)]
    pub max_attempts: u32,
}

fn parse_window(s: &str) -> Result<(u32, u32), String> {
    let (width, height) = s
        .split_once('x')
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {:?}", s))?;
    let width = width.trim().parse().map_err(|e| format!("width: {}", e))?;
    let height = height.trim().parse().map_err(|e| format!("height: {}", e))?;
    Ok((width, height))
}

impl Args {
    pub fn constraints(&self) -> SearchConstraints {
        SearchConstraints {
            location: self.location.clone(),
            min_beds: self.min_beds.clone(),
            max_price: self.max_price.clone(),
            property_type: self.property_type.clone(),
            page_size: self.page_size,
        }
    }

    pub fn query_config(&self) -> QueryConfig {
        QueryConfig {
            window_size: self.window,
            max_attempts: self.max_attempts,
            ..QueryConfig::default()
        }
    }
}
