//! Queue module for RabbitMQ operations.
//!
//! This module provides:
//! - Message types for the two-queue architecture
//! - Async publisher for outbound batches
//!
//! ## Architecture
//!
//! ```text
//! API → campaigns queue → Worker → send_bulk_emails queue → Delivery
//! ```

pub mod publisher;
pub mod types;

pub use publisher::Publisher;
pub use types::{
    BatchEnvelope, Destination, DispatchRequest, MessageTag, ProviderCredentials,
    ProviderInput, CAMPAIGNS_QUEUE, PROVIDER_BATCH_LIMIT, SEND_BULK_QUEUE,
};
