//! Campaigner - asynchronous bulk email campaign dispatch.
//!
//! This library backs the `campaigner-worker` binary: a RabbitMQ consumer
//! that turns one start-campaign trigger into provider-sized bulk-send
//! batches and a terminal campaign status.
//!
//! ## Architecture
//!
//! ```text
//! API → campaigns queue → Worker → send_bulk_emails queue → Delivery
//!                           ↑↓
//!                     subscriber/campaign store
//! ```

pub mod config;
pub mod consumer;
pub mod dispatch;
pub mod error;
pub mod queue;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use dispatch::{
    BatchSink, DispatchHandler, DispatchOutcome, Dispatcher,
};
pub use error::DispatchError;
pub use queue::{
    BatchEnvelope, DispatchRequest, Publisher, CAMPAIGNS_QUEUE, PROVIDER_BATCH_LIMIT,
    SEND_BULK_QUEUE,
};
pub use store::{CampaignStatus, CampaignStore, SqliteStore, Subscriber, SubscriberStore};
