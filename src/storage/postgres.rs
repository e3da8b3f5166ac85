use std::ops::RangeInclusive;
use std::time::Duration;

use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool,
    Postgres,
    Transaction,
};
use tracing::{debug, info, warn};

use crate::crawler::models::CleanedListing;
use crate::error::StoreError;

/// What one `store` call did to the table.
#[derive(Debug)]
pub struct StoreReport {
    pub created_table: bool,
    pub ids: RangeInclusive<i64>,
    /// Dedupe runs after the append is committed; its failure leaves the
    /// append in place.
    pub duplicates_removed: Result<u64, StoreError>,
}

impl StoreReport {
    pub fn inserted(&self) -> usize {
        self.ids.clone().count()
    }
}

pub struct Storage {
    pool: PgPool,
    table: String,
}

impl Storage {
    /// `table` must already be a validated plain identifier.
    pub async fn connect(options: PgConnectOptions, table: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(StoreError::Connection)?;

        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Appends the batch under fresh ids, then drops older duplicates.
    pub async fn store(&self, listings: &[CleanedListing]) -> Result<StoreReport, StoreError> {
        let (created_table, ids) = self.append_batch(listings).await.map_err(|source| {
            StoreError::Append {
                table: self.table.clone(),
                source,
            }
        })?;

        let duplicates_removed = self.remove_duplicates().await.map_err(|source| {
            StoreError::Dedupe {
                table: self.table.clone(),
                source,
            }
        });

        match &duplicates_removed {
            Ok(removed) => debug!(removed, table = %self.table, "Duplicate rows removed"),
            Err(e) => warn!(error = %e, "Duplicates left in place until the next run"),
        }

        Ok(StoreReport {
            created_table,
            ids,
            duplicates_removed,
        })
    }

    /// Creates the table when missing, reads the current max id and inserts
    /// every listing, all in one transaction.
    async fn append_batch(
        &self,
        listings: &[CleanedListing],
    ) -> Result<(bool, RangeInclusive<i64>), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let created_table = !self.table_exists(&mut tx).await?;
        if created_table {
            info!(table = %self.table, "Creating listings table");
            sqlx::query(&format!(
                r#"
                CREATE TABLE {} (
                    id BIGINT PRIMARY KEY,
                    date TEXT,
                    link TEXT NOT NULL,
                    header TEXT NOT NULL,
                    price BIGINT NOT NULL,
                    address TEXT NOT NULL,
                    bedrooms BIGINT NOT NULL,
                    sq_foot BIGINT NOT NULL
                )
                "#,
                self.table
            ))
            .execute(&mut *tx)
            .await?;
        }

        let current_max: i64 =
            sqlx::query_scalar(&format!("SELECT COALESCE(MAX(id)::bigint, 0) FROM {}", self.table))
                .fetch_one(&mut *tx)
                .await?;

        let ids = next_ids(current_max, listings.len());
        for (id, listing) in ids.clone().zip(listings) {
            self.insert_listing_tx(&mut tx, id, listing).await?;
        }

        tx.commit().await?;
        Ok((created_table, ids))
    }

    async fn table_exists(&self, tx: &mut Transaction<'_, Postgres>) -> Result<bool, sqlx::Error> {
        let found: Option<String> = sqlx::query_scalar("SELECT to_regclass($1)::text")
            .bind(&self.table)
            .fetch_one(&mut **tx)
            .await?;
        Ok(found.is_some())
    }

    async fn insert_listing_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
        listing: &CleanedListing,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(&format!(
            r#"
            INSERT INTO {} (id, date, link, header, price, address, bedrooms, sq_foot)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
            self.table
        ))
        .bind(id)
        .bind(&listing.date)
        .bind(&listing.link)
        .bind(&listing.header)
        .bind(listing.price)
        .bind(&listing.address)
        .bind(listing.bedrooms)
        .bind(listing.sq_foot)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Keeps the highest id per (link, header). Safe to repeat.
    async fn remove_duplicates(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(&format!(
            r#"
            DELETE FROM {t} AS older
            USING {t} AS newer
            WHERE older.link = newer.link
              AND older.header = newer.header
              AND older.id < newer.id
            "#,
            t = self.table
        ))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

/// Ids for `count` new rows continuing after `current_max`. Empty when
/// `count` is zero.
pub fn next_ids(current_max: i64, count: usize) -> RangeInclusive<i64> {
    (current_max + 1)..=(current_max + count as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;

    #[test]
    fn ids_continue_from_current_max() {
        assert_eq!(next_ids(0, 3), 1..=3);
        assert_eq!(next_ids(41, 2), 42..=43);
        assert_eq!(next_ids(7, 0).count(), 0);
    }

    fn listing(link: &str, header: &str, price: i64) -> CleanedListing {
        CleanedListing {
            date: Some("2023-03-01 12:34".into()),
            link: link.into(),
            header: header.into(),
            price,
            address: "Downtown".into(),
            bedrooms: 2,
            sq_foot: 900,
        }
    }

    async fn test_storage(table: &str) -> Storage {
        let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");
        let storage = Storage::connect(url.parse().unwrap(), table).await.unwrap();
        sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
            .execute(&storage.pool)
            .await
            .unwrap();
        storage
    }

    async fn rows(storage: &Storage) -> Vec<(i64, String, String, i64)> {
        sqlx::query(&format!(
            "SELECT id, link, header, price FROM {} ORDER BY id",
            storage.table
        ))
        .fetch_all(&storage.pool)
        .await
        .unwrap()
        .into_iter()
        .map(|r| (r.get("id"), r.get("link"), r.get("header"), r.get("price")))
        .collect()
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn first_store_creates_table_with_ids_from_one() {
        let storage = test_storage("listings_test_create").await;

        let report = storage
            .store(&[listing("https://x/1", "A", 1), listing("https://x/2", "B", 2)])
            .await
            .unwrap();

        assert!(report.created_table);
        assert_eq!(report.ids, 1..=2);
        assert_eq!(report.inserted(), 2);
        assert_eq!(report.duplicates_removed.unwrap(), 0);
        assert_eq!(rows(&storage).await.len(), 2);
        storage.close().await;
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn duplicate_key_keeps_newest_row() {
        let storage = test_storage("listings_test_newest").await;

        let report = storage
            .store(&[
                listing("https://x/1", "Nice 2BR", 1000),
                listing("https://x/1", "Nice 2BR", 1050),
            ])
            .await
            .unwrap();
        assert_eq!(report.duplicates_removed.unwrap(), 1);

        let rows = rows(&storage).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, 2);
        assert_eq!(rows[0].3, 1050);
        storage.close().await;
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn repeated_runs_are_idempotent_and_ids_monotonic() {
        let storage = test_storage("listings_test_repeat").await;
        let batch = [
            listing("https://x/1", "A", 1),
            listing("https://x/2", "B", 2),
            listing("https://x/3", "C", 3),
        ];

        let first = storage.store(&batch).await.unwrap();
        let second = storage.store(&batch).await.unwrap();
        let third = storage.store(&batch).await.unwrap();

        assert!(!second.created_table);
        assert_eq!(second.ids, 4..=6);
        assert_eq!(third.ids, 7..=9);
        assert_eq!(second.duplicates_removed.as_ref().ok(), Some(&3));

        let rows = rows(&storage).await;
        assert_eq!(rows.len(), 3);
        let ids: Vec<i64> = rows.iter().map(|r| r.0).collect();
        assert_eq!(ids, vec![7, 8, 9]);

        let appended = first.inserted() + second.inserted() + third.inserted();
        assert_eq!(*ids.last().unwrap(), appended as i64);
        storage.close().await;
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn appends_to_existing_table_with_integer_ids() {
        let storage = test_storage("listings_test_int4").await;
        sqlx::query(
            r#"
            CREATE TABLE listings_test_int4 (
                id INTEGER PRIMARY KEY,
                date VARCHAR,
                link VARCHAR,
                header VARCHAR,
                price INTEGER,
                address VARCHAR,
                bedrooms INTEGER,
                sq_foot INTEGER
            )
            "#,
        )
        .execute(&storage.pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO listings_test_int4 VALUES (5, NULL, 'https://x/0', 'Old', 700, 'Uptown', 1, 500)",
        )
        .execute(&storage.pool)
        .await
        .unwrap();

        let report = storage
            .store(&[listing("https://x/1", "A", 1), listing("https://x/2", "B", 2)])
            .await
            .unwrap();

        assert!(!report.created_table);
        assert_eq!(report.ids, 6..=7);
        storage.close().await;
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn empty_batch_creates_table_without_rows() {
        let storage = test_storage("listings_test_empty").await;

        let report = storage.store(&[]).await.unwrap();
        assert!(report.created_table);
        assert_eq!(report.inserted(), 0);
        assert!(report.ids.is_empty());
        assert!(rows(&storage).await.is_empty());

        let report = storage.store(&[listing("https://x/1", "A", 1)]).await.unwrap();
        assert!(!report.created_table);
        assert_eq!(report.ids, 1..=1);
        storage.close().await;
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn same_link_with_new_header_is_not_a_duplicate() {
        let storage = test_storage("listings_test_key").await;

        storage
            .store(&[listing("https://x/1", "Nice 2BR", 1000)])
            .await
            .unwrap();
        storage
            .store(&[listing("https://x/1", "Nice 2BR - price drop", 950)])
            .await
            .unwrap();

        assert_eq!(rows(&storage).await.len(), 2);
        storage.close().await;
    }
}
