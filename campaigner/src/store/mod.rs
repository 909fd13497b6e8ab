//! Storage traits and the bundled SQLite adapter.
//!
//! The dispatch pipeline only ever talks to storage through these two
//! traits; the API service owns the rest of the schema.

pub mod sqlite;
pub mod types;

use anyhow::Result;
use async_trait::async_trait;

pub use sqlite::SqliteStore;
pub use types::{CampaignStatus, Subscriber};

/// Read access to eligible subscribers for a dispatch run.
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    /// Fetch one page of subscribers that are active, not blacklisted and
    /// belong to at least one of the requested lists, de-duplicated across
    /// overlapping memberships.
    ///
    /// Returns at most `page_size` subscribers with `id > cursor`, ordered
    /// by ascending id.
    async fn fetch_eligible(
        &self,
        list_ids: &[i64],
        user_id: i64,
        cursor: i64,
        page_size: i64,
    ) -> Result<Vec<Subscriber>>;
}

/// Write access to the campaign row owned by a dispatch run.
#[async_trait]
pub trait CampaignStore: Send + Sync {
    /// Atomically claim the dispatch for a campaign. Returns true for the
    /// caller that acquired the fence; every later caller gets false and
    /// must not send anything.
    async fn begin_dispatch(&self, campaign_id: i64, user_id: i64) -> Result<bool>;

    /// Persist the campaign status.
    async fn update_status(
        &self,
        campaign_id: i64,
        user_id: i64,
        status: CampaignStatus,
    ) -> Result<()>;
}
