use anyhow::Context;
use reqwest::Client;
use tracing::{info, warn};

use crate::{
    config::Config,
    crawler,
    normalizer,
    storage::postgres::Storage,
};

#[derive(Debug, Default)]
pub struct RunSummary {
    pub scraped: usize,
    pub skipped: usize,
    pub inserted: usize,
    pub duplicates_removed: Option<u64>,
}

pub struct ScrapingService {
    cfg: Config,
    client: Client,
    storage: Storage,
}

impl ScrapingService {
    pub async fn new(cfg: Config) -> anyhow::Result<Self> {
        let client = crawler::build_client(cfg.request_timeout)
            .context("failed to build http client")?;
        let storage = Storage::connect(cfg.database.connect_options()?, &cfg.table).await?;
        Ok(Self { cfg, client, storage })
    }

    /// Scrape, clean and store once. The pool is closed whatever the outcome.
    pub async fn run(&self) -> anyhow::Result<RunSummary> {
        let result = self.run_pipeline().await;
        self.storage.close().await;
        result
    }

    async fn run_pipeline(&self) -> anyhow::Result<RunSummary> {
        info!(base_url = %self.cfg.base_url, "Extracting listings");
        let extraction = crawler::crawl_search_pages(&self.cfg, &self.client).await?;

        if extraction.skipped > 0 {
            warn!(skipped = extraction.skipped, "Skipped malformed listing fragments");
        }

        let mut summary = RunSummary {
            scraped: extraction.listings.len(),
            skipped: extraction.skipped,
            ..RunSummary::default()
        };

        info!(count = summary.scraped, "Transforming listings");
        let cleaned = normalizer::normalize(extraction.listings)
            .context("listing batch failed to normalize, nothing stored")?;

        info!(table = %self.cfg.table, count = cleaned.len(), "Loading listings");
        let report = self.storage.store(&cleaned).await?;

        summary.inserted = report.inserted();
        summary.duplicates_removed = report.duplicates_removed.as_ref().ok().copied();

        info!(
            created_table = report.created_table,
            inserted = summary.inserted,
            first_id = report.ids.start(),
            last_id = report.ids.end(),
            duplicates_removed = ?summary.duplicates_removed,
            "Run complete"
        );
        Ok(summary)
    }
}
