use anyhow::Context;
use reqwest::{Client, Url};
use tokio::time::{sleep, Duration};
use tracing::{debug, info};

use crate::config::Config;
use crate::crawler::models::Extraction;

mod fetcher;
mod parser;
pub mod models;
pub mod service;

pub use fetcher::build_client;

/// Search page URL for a result offset, e.g. `.../search/apa?s=120`.
pub fn page_url(base_url: &str, offset: u32) -> anyhow::Result<Url> {
    let mut url = Url::parse(base_url)
        .with_context(|| format!("invalid listings base url {base_url:?}"))?;
    url.query_pairs_mut().append_pair("s", &offset.to_string());
    Ok(url)
}

/// Walks the paginated search results. Stops early at the first page that
/// has no listings at all.
pub async fn crawl_search_pages(cfg: &Config, client: &Client) -> anyhow::Result<Extraction> {
    let mut all = Extraction::default();

    for offset in cfg.page_offsets() {
        let url = page_url(&cfg.base_url, offset)?;
        debug!(offset, "Fetching search page");

        let html = fetcher::fetch_html(client, url.as_str(), cfg.fetch_retries).await?;
        let page = parser::extract_listings(&html, &url);

        if page.listings.is_empty() && page.skipped == 0 {
            info!(offset, "No listings on page, stopping");
            break;
        }

        info!(
            offset,
            count = page.listings.len(),
            skipped = page.skipped,
            "Extracted listings"
        );
        all.merge(page);

        sleep(Duration::from_millis(cfg.delay_ms)).await;
    }

    Ok(all)
}
