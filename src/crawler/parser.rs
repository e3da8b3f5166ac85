use std::sync::LazyLock;

use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::crawler::models::{Extraction, RawListing};
use crate::error::MalformedFragment;

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

static RESULT_ROW: LazyLock<Selector> = LazyLock::new(|| selector("li.result-row"));
static DATE: LazyLock<Selector> = LazyLock::new(|| selector("time.result-date"));
static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("a.result-title.hdrlnk"));
static PRICE: LazyLock<Selector> = LazyLock::new(|| selector("span.result-price"));
static HOOD: LazyLock<Selector> = LazyLock::new(|| selector("span.result-hood"));
static HOUSING: LazyLock<Selector> = LazyLock::new(|| selector("span.housing"));

/// Extracts every listing on a search results page. `page_url` resolves
/// relative listing links.
pub fn extract_listings(html: &str, page_url: &Url) -> Extraction {
    let document = Html::parse_document(html);
    let mut extraction = Extraction::default();

    for row in document.select(&RESULT_ROW) {
        match parse_listing(row, page_url) {
            Ok(listing) => extraction.listings.push(listing),
            Err(e) => {
                debug!(error = %e, "Skipping malformed listing fragment");
                extraction.skipped += 1;
            }
        }
    }

    extraction
}

pub fn parse_listing(row: ElementRef<'_>, page_url: &Url) -> Result<RawListing, MalformedFragment> {
    let title = row
        .select(&TITLE)
        .next()
        .ok_or(MalformedFragment { field: "link" })?;

    let link = title
        .value()
        .attr("href")
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .and_then(|href| page_url.join(href).ok())
        .ok_or(MalformedFragment { field: "link" })?;

    let header = non_empty(text_of(title)).ok_or(MalformedFragment { field: "header" })?;
    let price_text = required_text(row, &PRICE, "price")?;
    let address_text = required_text(row, &HOOD, "address")?;

    let date = row
        .select(&DATE)
        .next()
        .and_then(|el| el.value().attr("datetime"))
        .map(|d| d.trim().to_string());

    // "2br - 900ft2", "900ft2 -", "1br -" or nothing at all
    let housing = row.select(&HOUSING).next().map(text_of).unwrap_or_default();
    let bedrooms_text = housing
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string();

    Ok(RawListing {
        date,
        link: link.to_string(),
        header,
        price_text,
        address_text,
        bedrooms_text,
        sqft_text: housing,
    })
}

fn required_text(
    row: ElementRef<'_>,
    sel: &Selector,
    field: &'static str,
) -> Result<String, MalformedFragment> {
    row.select(sel)
        .next()
        .map(text_of)
        .and_then(non_empty)
        .ok_or(MalformedFragment { field })
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}
