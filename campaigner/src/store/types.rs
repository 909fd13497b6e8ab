//! Storage entity types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Campaign lifecycle status.
///
/// The API moves a campaign from `Draft` to `InProgress` before publishing
/// the dispatch trigger; this worker only ever writes a terminal status once
/// the run ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    InProgress,
    Sent,
    PartiallySent,
    Failed,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Draft => "draft",
            CampaignStatus::InProgress => "in_progress",
            CampaignStatus::Sent => "sent",
            CampaignStatus::PartiallySent => "partially_sent",
            CampaignStatus::Failed => "failed",
        }
    }
}

/// A subscriber eligible for dispatch.
///
/// `metadata` holds the per-subscriber merge fields as a raw JSON object
/// (string keys and values), exactly as stored. Parsing is deferred to batch
/// construction so one subscriber's bad data cannot fail a whole page.
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub email: String,
    pub metadata: String,
    pub active: bool,
    pub blacklisted: bool,
}

impl Subscriber {
    /// Normalize identifying fields before the subscriber enters a batch.
    /// Addresses are matched case-insensitively by the provider and by the
    /// bounce/complaint webhooks downstream.
    pub fn normalize(&mut self) {
        self.email = self.email.trim().to_lowercase();
        self.name = self.name.trim().to_string();
    }

    /// Parse the stored metadata into merge fields.
    ///
    /// An empty metadata column is treated as "no fields". Anything else
    /// must be a flat JSON object of strings.
    pub fn template_data(&self) -> Result<HashMap<String, String>, serde_json::Error> {
        if self.metadata.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&self.metadata)
    }
}
