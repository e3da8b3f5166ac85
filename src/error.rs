use thiserror::Error;

/// Transport failure reaching the listings site. Fatal for the run.
#[derive(Error, Debug)]
#[error("fetching {url} failed after {attempts} attempt(s): {source}")]
pub struct FetchError {
    pub url: String,
    pub attempts: u32,
    #[source]
    pub source: reqwest::Error,
}

/// A listing fragment without one of its structurally required fields.
/// The fragment is skipped and counted; the batch continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("listing fragment has no {field}")]
pub struct MalformedFragment {
    pub field: &'static str,
}

/// Column transform failures. Any of these aborts the batch before storage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CleanError {
    #[error("malformed price {0:?}")]
    MalformedPrice(String),

    #[error("malformed area {0:?}")]
    MalformedArea(String),

    #[error("malformed bedroom count {0:?}")]
    MalformedBedroom(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database unreachable: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("appending batch to {table} failed: {source}")]
    Append {
        table: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("removing duplicates from {table} failed: {source}")]
    Dedupe {
        table: String,
        #[source]
        source: sqlx::Error,
    },
}
