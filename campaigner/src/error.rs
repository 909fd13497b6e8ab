//! Dispatch error taxonomy.
//!
//! Only `MalformedRequest` and `Fetch` stop work: the first abandons the
//! message at the broker, the second cuts the pagination loop short.
//! Everything else is recovered where it happens, logged, and recorded in
//! the run's outcome.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The trigger payload was empty or failed to decode.
    #[error("malformed dispatch request: {0}")]
    MalformedRequest(String),

    /// A subscriber page fetch failed; the run is cut short.
    #[error("subscriber fetch failed: {0}")]
    Fetch(#[source] anyhow::Error),

    /// Merge-field data could not be serialized for one subscriber.
    #[error("invalid template data for subscriber {subscriber_id}: {source}")]
    Serialization {
        subscriber_id: i64,
        #[source]
        source: serde_json::Error,
    },

    /// A batch could not be published to the delivery queue.
    #[error("batch publish failed: {0}")]
    Publish(#[source] anyhow::Error),

    /// The terminal campaign status could not be persisted.
    #[error("campaign status write failed: {0}")]
    Persist(#[source] anyhow::Error),

    /// Another trigger already claimed this campaign's dispatch.
    #[error("campaign {0} already has a dispatch in flight")]
    AlreadyDispatching(i64),
}
