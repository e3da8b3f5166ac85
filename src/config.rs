use std::env;
use std::time::Duration;

use anyhow::{bail, Context};
use regex::Regex;
use sqlx::postgres::PgConnectOptions;

const DEFAULT_BASE_URL: &str = "https://minneapolis.craigslist.org/search/apa";
const DEFAULT_TABLE: &str = "listings";

pub struct Config {
    pub base_url: String,
    pub page_size: u32,
    pub max_results: u32,
    pub delay_ms: u64,
    pub request_timeout: Duration,
    pub fetch_retries: u32,
    pub table: String,
    pub database: DatabaseTarget,
}

/// Where the listings table lives. A full `DATABASE_URL` wins over the parts.
pub enum DatabaseTarget {
    Url(String),
    Parts {
        host: String,
        port: u16,
        user: String,
        password: Option<String>,
        database: String,
    },
}

impl DatabaseTarget {
    pub fn connect_options(&self) -> anyhow::Result<PgConnectOptions> {
        match self {
            DatabaseTarget::Url(url) => url
                .parse::<PgConnectOptions>()
                .context("DATABASE_URL is not a valid Postgres connection string"),
            DatabaseTarget::Parts {
                host,
                port,
                user,
                password,
                database,
            } => {
                let mut opts = PgConnectOptions::new()
                    .host(host)
                    .port(*port)
                    .username(user)
                    .database(database);
                if let Some(password) = password {
                    opts = opts.password(password);
                }
                Ok(opts)
            }
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let parsed = |key: &str, default: u64| -> anyhow::Result<u64> {
            match lookup(key) {
                Some(v) => v
                    .trim()
                    .parse()
                    .with_context(|| format!("{key} must be a non-negative integer, got {v:?}")),
                None => Ok(default),
            }
        };

        let parsed_u32 = |key: &str, default: u32| -> anyhow::Result<u32> {
            u32::try_from(parsed(key, default.into())?)
                .with_context(|| format!("{key} does not fit in 32 bits"))
        };

        let page_size = parsed_u32("PAGE_SIZE", 120)?;
        if page_size == 0 {
            bail!("PAGE_SIZE must be greater than zero");
        }

        let table = lookup("LISTINGS_TABLE").unwrap_or_else(|| DEFAULT_TABLE.to_string());
        // interpolated into SQL, so only plain identifiers are accepted
        let ident = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$")?;
        if !ident.is_match(&table) {
            bail!("LISTINGS_TABLE {table:?} is not a plain SQL identifier");
        }

        let database = match lookup("DATABASE_URL") {
            Some(url) => DatabaseTarget::Url(url),
            None => DatabaseTarget::Parts {
                host: lookup("DB_HOST").unwrap_or_else(|| "localhost".to_string()),
                port: parsed("DB_PORT", 5432)?
                    .try_into()
                    .context("DB_PORT is out of range")?,
                user: lookup("DB_USER").context("set DATABASE_URL or DB_USER")?,
                password: lookup("DB_PASSWORD"),
                database: lookup("DB_NAME").context("set DATABASE_URL or DB_NAME")?,
            },
        };

        Ok(Self {
            base_url: lookup("LISTINGS_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            page_size,
            max_results: parsed_u32("MAX_RESULTS", 3000)?,
            delay_ms: parsed("DELAY_MS", 1000)?,
            request_timeout: Duration::from_secs(parsed("REQUEST_TIMEOUT_SECS", 30)?),
            fetch_retries: parsed_u32("FETCH_RETRIES", 2)?,
            table,
            database,
        })
    }

    /// Result offsets to request, one per search page.
    pub fn page_offsets(&self) -> impl Iterator<Item = u32> {
        (0..self.max_results).step_by(self.page_size as usize)
    }
}
