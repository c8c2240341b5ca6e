use crate::{espc::PropertyRecord, utils, CrawlerError};
use lazy_regex::regex;
use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Selector};
use tracing::warn;

const E: &str = "Invalid selector";
lazy_static! {
    static ref PRICE: Selector = Selector::parse("div.price-wrap > div.pd-price").expect(E);
    static ref TITLE: Selector = Selector::parse("div.pd-title > h1").expect(E);
    static ref ADDRESS: Selector = Selector::parse("div.pd-title > .address").expect(E);
    static ref FEATURES: Selector = Selector::parse("div.pd-features > div.feature").expect(E);
    static ref FEATURE_ICON: Selector = Selector::parse("img").expect(E);
    static ref FEATURE_NUMBER: Selector = Selector::parse(".number").expect(E);
    static ref FLOOR_AREA: Selector =
        Selector::parse("div.pd-metric > .icon-floor_area + strong").expect(E);
    static ref COUNCIL_TAX: Selector =
        Selector::parse("div.pd-metric > .icon-home + strong").expect(E);
    static ref EPC: Selector = Selector::parse("div.pd-metric > .icon-epc + strong").expect(E);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Feature {
    Bed,
    Bath,
    Couch,
}

impl Feature {
    fn classify(icon: &str) -> Option<Feature> {
        if icon.contains("bed.svg") {
            Some(Feature::Bed)
        } else if icon.contains("bath.svg") {
            Some(Feature::Bath)
        } else if icon.contains("couch.svg") {
            Some(Feature::Couch)
        } else {
            None
        }
    }
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn required_text(
    doc: &Html,
    selector: &Selector,
    url: &str,
    what: &str,
) -> Result<String, CrawlerError> {
    doc.select(selector)
        .next()
        .map(text_of)
        .ok_or_else(|| CrawlerError::parse(url, format!("missing {}", what)))
}

fn optional_text(doc: &Html, selector: &Selector) -> Option<String> {
    doc.select(selector).next().map(text_of)
}

/// Splits "offers over £130,000" into ("offers over", 130000).
fn parse_price(text: &str, url: &str) -> Result<(String, i64), CrawlerError> {
    let mut parts = text.split('£');
    let price_type = parts.next().unwrap_or_default().trim().to_lowercase();
    let value = parts
        .next()
        .ok_or_else(|| CrawlerError::parse(url, format!("no price value in {:?}", text)))?;
    let price_val = value
        .trim()
        .replace(',', "")
        .parse::<i64>()
        .map_err(|e| CrawlerError::parse(url, format!("price {:?}: {}", value, e)))?;
    Ok((price_type, price_val))
}

fn parse_count(text: &str, url: &str) -> Result<i32, CrawlerError> {
    text.trim()
        .parse::<i32>()
        .map_err(|e| CrawlerError::parse(url, format!("count {:?}: {}", text, e)))
}

/// Parses a listing detail page.
///
/// Missing optional metrics fall back to their unknown sentinel, a missing
/// postcode is logged and left empty, but an unrecognised feature icon fails
/// the whole listing.
pub fn parse_property(html: &str, url: &str) -> Result<PropertyRecord, CrawlerError> {
    let doc = Html::parse_document(html);

    let (price_type, price_val) = parse_price(&required_text(&doc, &PRICE, url, "price")?, url)?;
    let title = required_text(&doc, &TITLE, url, "title")?.to_lowercase();
    let address = required_text(&doc, &ADDRESS, url, "address")?.to_lowercase();

    let postcode = match utils::extract_postcode(&address) {
        Some(postcode) => postcode.to_string(),
        None => {
            warn!("Unable to find postcode for {}", url);
            String::new()
        }
    };

    let mut bed_num = -1;
    let mut bath_num = -1;
    let mut couch_num = -1;
    for feature in doc.select(&FEATURES) {
        let icon = feature
            .select(&FEATURE_ICON)
            .next()
            .and_then(|img| img.value().attr("src"))
            .ok_or_else(|| CrawlerError::parse(url, "feature without icon"))?;
        let num = feature
            .select(&FEATURE_NUMBER)
            .next()
            .map(text_of)
            .ok_or_else(|| CrawlerError::parse(url, "feature without number"))?;
        let num = parse_count(&num, url)?;

        match Feature::classify(icon) {
            Some(Feature::Bed) => bed_num = num,
            Some(Feature::Bath) => bath_num = num,
            Some(Feature::Couch) => couch_num = num,
            None => {
                return Err(CrawlerError::UnknownFeature {
                    url: url.to_string(),
                    icon: icon.to_string(),
                })
            }
        }
    }

    let floor_area = match optional_text(&doc, &FLOOR_AREA) {
        Some(text) => {
            let digits = regex!(r"\d+")
                .find(&text)
                .ok_or_else(|| CrawlerError::parse(url, format!("floor area {:?}", text)))?;
            parse_count(digits.as_str(), url)?
        }
        None => -1,
    };
    let council_tax = optional_text(&doc, &COUNCIL_TAX).unwrap_or_default();
    let epc = optional_text(&doc, &EPC).unwrap_or_default();

    Ok(PropertyRecord {
        price_type,
        price_val,
        title,
        address,
        postcode,
        bed_num,
        bath_num,
        couch_num,
        floor_area,
        council_tax,
        epc,
        url: utils::canonical_url(url).to_string(),
    })
}
