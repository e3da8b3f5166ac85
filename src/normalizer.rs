//! Column transforms that turn raw listing text into typed values.
//!
//! Price and address clean row by row. Area and bedroom counts impute missing
//! rows with the median of the column, so they run in two passes over the
//! whole batch.

use std::sync::LazyLock;

use regex::Regex;

use crate::crawler::models::{CleanedListing, RawListing};
use crate::error::CleanError;

const CURRENCY: char = '$';
const AREA_MARKER: &str = "ft2";
const BEDROOM_MARKER: &str = "br";

static AREA_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r".*ft2").expect("static regex"));

pub fn normalize(batch: Vec<RawListing>) -> Result<Vec<CleanedListing>, CleanError> {
    let sq_feet = clean_sqft(batch.iter().map(|l| l.sqft_text.as_str()))?;
    let bedrooms = clean_bedrooms(batch.iter().map(|l| l.bedrooms_text.as_str()))?;

    batch
        .into_iter()
        .zip(sq_feet.into_iter().zip(bedrooms))
        .map(|(raw, (sq_foot, bedrooms))| -> Result<CleanedListing, CleanError> {
            Ok(CleanedListing {
                price: clean_price(&raw.price_text)?,
                address: clean_address(&raw.address_text),
                date: raw.date,
                link: raw.link,
                header: raw.header,
                bedrooms,
                sq_foot,
            })
        })
        .collect()
}

/// `"$1,234"` -> `1234`. The currency symbol is mandatory.
pub fn clean_price(raw: &str) -> Result<i64, CleanError> {
    let malformed = || CleanError::MalformedPrice(raw.to_string());

    let amount = raw
        .trim()
        .strip_prefix(CURRENCY)
        .ok_or_else(malformed)?
        .replace(',', "");

    amount.trim().parse().map_err(|_| malformed())
}

/// Area column. Rows without an area marker are imputed with the median.
pub fn clean_sqft<'a>(raw: impl IntoIterator<Item = &'a str>) -> Result<Vec<i64>, CleanError> {
    let parsed = raw
        .into_iter()
        .map(parse_sqft)
        .collect::<Result<Vec<_>, _>>()?;

    impute_median(parsed).ok_or_else(|| CleanError::MalformedArea("no area to impute from".into()))
}

fn parse_sqft(raw: &str) -> Result<Option<i64>, CleanError> {
    let Some((before, _)) = raw.split_once(AREA_MARKER) else {
        return Ok(None);
    };

    // the bedroom prefix sits on the first line ("2br -\n900") or before
    // the dash ("2br - 900")
    let before = match before.split_once('\n') {
        Some((_, rest)) => rest,
        None => before,
    };
    let token = before.rsplit('-').next().unwrap_or(before);
    let compact: String = token
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();

    compact
        .parse()
        .map(Some)
        .map_err(|_| CleanError::MalformedArea(raw.to_string()))
}

/// Bedroom column. Empty rows and rows carrying only an area are imputed.
pub fn clean_bedrooms<'a>(raw: impl IntoIterator<Item = &'a str>) -> Result<Vec<i64>, CleanError> {
    let parsed = raw
        .into_iter()
        .map(parse_bedrooms)
        .collect::<Result<Vec<_>, _>>()?;

    impute_median(parsed)
        .ok_or_else(|| CleanError::MalformedBedroom("no bedroom count to impute from".into()))
}

fn parse_bedrooms(raw: &str) -> Result<Option<i64>, CleanError> {
    let value = raw.trim();
    if value.is_empty() {
        return Ok(None);
    }

    let value = match value.split_once(BEDROOM_MARKER) {
        Some((count, _)) => count,
        None => value,
    };
    if AREA_ONLY.is_match(value) {
        return Ok(None);
    }

    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|_| CleanError::MalformedBedroom(raw.to_string()))
}

/// `"123 Main St (Downtown)"` -> `"Downtown"`; text without parentheses is kept.
pub fn clean_address(raw: &str) -> String {
    match raw.split_once('(') {
        Some((_, rest)) => rest.split(')').next().unwrap_or(rest).trim().to_string(),
        None => raw.to_string(),
    }
}

/// Integer-truncated median of the known values.
pub fn median(values: &[i64]) -> Option<i64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        let (low, high) = (sorted[mid - 1], sorted[mid]);
        Some(low + (high - low) / 2)
    }
}

/// Fills `None` with the median of the `Some` values. Returns `None` only when
/// something is missing and nothing is known.
fn impute_median(column: Vec<Option<i64>>) -> Option<Vec<i64>> {
    let known: Vec<i64> = column.iter().flatten().copied().collect();

    if known.len() == column.len() {
        return Some(known);
    }

    let fill = median(&known)?;
    Some(column.into_iter().map(|v| v.unwrap_or(fill)).collect())
}
