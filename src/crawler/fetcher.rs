use std::time::Duration;

use reqwest::Client;
use tokio::time::sleep;
use tracing::warn;

use crate::error::FetchError;

const BACKOFF_BASE_MS: u64 = 500;

pub fn build_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent("apartment-scraper/0.1")
        .timeout(timeout)
        .build()
}

/// GET `url`, retrying transport errors and error statuses up to `retries`
/// extra times with exponential backoff.
pub async fn fetch_html(client: &Client, url: &str, retries: u32) -> Result<String, FetchError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match try_fetch(client, url).await {
            Ok(body) => return Ok(body),
            Err(source) if attempt > retries => {
                return Err(FetchError {
                    url: url.to_string(),
                    attempts: attempt,
                    source,
                })
            }
            Err(e) => {
                let backoff = backoff_delay(attempt);
                warn!(url, attempt, error = %e, ?backoff, "Fetch failed, retrying");
                sleep(backoff).await;
            }
        }
    }
}

async fn try_fetch(client: &Client, url: &str) -> reqwest::Result<String> {
    let res = client.get(url).send().await?.error_for_status()?;
    res.text().await
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(BACKOFF_BASE_MS << (attempt - 1).min(6))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_delay(1), Duration::from_millis(500));
        assert_eq!(backoff_delay(2), Duration::from_millis(1000));
        assert_eq!(backoff_delay(3), Duration::from_millis(2000));
        assert_eq!(backoff_delay(20), Duration::from_millis(32_000));
    }

    #[tokio::test]
    async fn unreachable_host_reports_every_attempt() {
        let client = build_client(Duration::from_secs(2)).unwrap();
        // port 9 on loopback refuses connections
        let err = fetch_html(&client, "http://127.0.0.1:9/search", 1)
            .await
            .unwrap_err();

        assert_eq!(err.attempts, 2);
        assert_eq!(err.url, "http://127.0.0.1:9/search");
    }
}
