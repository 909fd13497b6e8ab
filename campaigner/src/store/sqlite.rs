//! SQLite-backed store implementation.
//!
//! Uses runtime-built queries so the crate compiles without a database at
//! hand. The eligibility query mirrors what the API's list management
//! writes: a `subscribers` table plus a `subscribers_lists` membership
//! table, joined and de-duplicated per dispatch page.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::types::{CampaignStatus, Subscriber};
use super::{CampaignStore, SubscriberStore};

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to the given SQLite URL (e.g. `sqlite://campaigner.db` or
    /// `sqlite::memory:`).
    pub async fn connect(database_url: &str) -> Result<Self> {
        // An in-memory database lives and dies with its connection, so it
        // must be pinned to a single one.
        let options = if database_url.starts_with("sqlite::memory:") {
            SqlitePoolOptions::new().max_connections(1).min_connections(1)
        } else {
            SqlitePoolOptions::new()
        };

        let pool = options
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the tables this worker reads and writes, if absent. The API
    /// service owns the full schema in production; this keeps a fresh
    /// database usable.
    pub async fn init_schema(&self) -> Result<()> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS campaigns (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                template_name TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'draft',
                dispatch_started INTEGER NOT NULL DEFAULT 0
            )",
            "CREATE TABLE IF NOT EXISTS subscribers (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                email TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '',
                active INTEGER NOT NULL DEFAULT 1,
                blacklisted INTEGER NOT NULL DEFAULT 0
            )",
            "CREATE TABLE IF NOT EXISTS subscribers_lists (
                subscriber_id INTEGER NOT NULL,
                list_id INTEGER NOT NULL,
                PRIMARY KEY (subscriber_id, list_id)
            )",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to create schema")?;
        }

        Ok(())
    }
}

#[async_trait]
impl SubscriberStore for SqliteStore {
    async fn fetch_eligible(
        &self,
        list_ids: &[i64],
        user_id: i64,
        cursor: i64,
        page_size: i64,
    ) -> Result<Vec<Subscriber>> {
        if list_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT DISTINCT s.id, s.user_id, s.name, s.email, s.metadata, \
             s.active, s.blacklisted \
             FROM subscribers s \
             JOIN subscribers_lists sl ON sl.subscriber_id = s.id \
             WHERE s.user_id = ",
        );
        query.push_bind(user_id);
        query.push(" AND s.active = 1 AND s.blacklisted = 0 AND s.id > ");
        query.push_bind(cursor);
        query.push(" AND sl.list_id IN (");
        let mut in_list = query.separated(", ");
        for list_id in list_ids {
            in_list.push_bind(*list_id);
        }
        in_list.push_unseparated(")");
        query.push(" ORDER BY s.id ASC LIMIT ");
        query.push_bind(page_size);

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch subscribers")?;

        let mut subscribers = Vec::with_capacity(rows.len());
        for row in rows {
            subscribers.push(Subscriber {
                id: row.try_get("id")?,
                user_id: row.try_get("user_id")?,
                name: row.try_get("name")?,
                email: row.try_get("email")?,
                metadata: row.try_get("metadata")?,
                active: row.try_get("active")?,
                blacklisted: row.try_get("blacklisted")?,
            });
        }

        Ok(subscribers)
    }
}

#[async_trait]
impl CampaignStore for SqliteStore {
    async fn begin_dispatch(&self, campaign_id: i64, user_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE campaigns SET dispatch_started = 1 \
             WHERE id = ? AND user_id = ? AND dispatch_started = 0",
        )
        .bind(campaign_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .context("Failed to claim dispatch")?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_status(
        &self,
        campaign_id: i64,
        user_id: i64,
        status: CampaignStatus,
    ) -> Result<()> {
        sqlx::query("UPDATE campaigns SET status = ? WHERE id = ? AND user_id = ?")
            .bind(status.as_str())
            .bind(campaign_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to update campaign status")?;

        Ok(())
    }
}
