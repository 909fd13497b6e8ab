//! The campaign dispatch pipeline.
//!
//! One dispatch run walks the eligible-subscriber set page by page, splits
//! each page into provider-sized batches, publishes every batch to the
//! delivery queue and finally persists the campaign's terminal status:
//!
//! ```text
//! DispatchRequest → pager → batches → delivery queue → status write
//! ```

pub mod batch;
pub mod outcome;
pub mod pager;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::error::DispatchError;
use crate::queue::types::{BatchEnvelope, DispatchRequest, PROVIDER_BATCH_LIMIT};
use crate::store::{CampaignStore, SubscriberStore};

pub use batch::{build_batches, Batch};
pub use outcome::{BatchResult, DispatchOutcome};
pub use pager::SubscriberPager;

/// Destination for assembled batch envelopes. The AMQP publisher implements
/// this in production; tests record envelopes in memory.
#[async_trait]
pub trait BatchSink: Send + Sync {
    async fn publish_batch(&self, envelope: &BatchEnvelope) -> anyhow::Result<()>;
}

/// The capability the consumer registers its workers against: process one
/// decoded trigger message to completion.
#[async_trait]
pub trait DispatchHandler: Send + Sync {
    async fn handle(&self, request: DispatchRequest)
        -> Result<DispatchOutcome, DispatchError>;
}

pub struct Dispatcher {
    subscribers: Arc<dyn SubscriberStore>,
    campaigns: Arc<dyn CampaignStore>,
    sink: Arc<dyn BatchSink>,
    page_size: i64,
    chunk_size: usize,
}

impl Dispatcher {
    pub fn new(
        subscribers: Arc<dyn SubscriberStore>,
        campaigns: Arc<dyn CampaignStore>,
        sink: Arc<dyn BatchSink>,
        page_size: i64,
        chunk_size: usize,
    ) -> Self {
        Dispatcher {
            subscribers,
            campaigns,
            sink,
            page_size,
            // the provider rejects larger batches outright
            chunk_size: chunk_size.clamp(1, PROVIDER_BATCH_LIMIT),
        }
    }

    async fn publish(&self, request: &DispatchRequest, batch: Batch, outcome: &mut DispatchOutcome) {
        let recipients = batch.destinations.len();

        let envelope = match BatchEnvelope::from_request(request, batch.destinations) {
            Ok(envelope) => envelope,
            Err(e) => {
                let e = DispatchError::Publish(e.into());
                error!(campaign_id = request.campaign_id, error = %e, "batch_serialize_failed");
                outcome.batches.push(BatchResult::Failed {
                    reason: e.to_string(),
                });
                return;
            }
        };

        match self.sink.publish_batch(&envelope).await {
            Ok(()) => {
                info!(
                    campaign_id = request.campaign_id,
                    batch_id = %envelope.batch_id,
                    recipients = recipients,
                    "batch_published"
                );
                outcome.batches.push(BatchResult::Published {
                    batch_id: envelope.batch_id,
                    recipients,
                });
            }
            Err(e) => {
                let e = DispatchError::Publish(e);
                error!(
                    campaign_id = request.campaign_id,
                    batch_id = %envelope.batch_id,
                    error = %e,
                    "batch_publish_failed"
                );
                outcome.batches.push(BatchResult::Failed {
                    reason: e.to_string(),
                });
            }
        }
    }

    /// Persist the terminal status chosen by the outcome. Runs exactly once
    /// per dispatch; a write failure is logged and not retried.
    async fn finalize(&self, outcome: &DispatchOutcome, user_id: i64) {
        let status = outcome.terminal_status();

        match self
            .campaigns
            .update_status(outcome.campaign_id, user_id, status)
            .await
        {
            Ok(()) => info!(
                campaign_id = outcome.campaign_id,
                status = status.as_str(),
                "campaign_finalized"
            ),
            Err(e) => {
                let e = DispatchError::Persist(e);
                error!(
                    campaign_id = outcome.campaign_id,
                    status = status.as_str(),
                    error = %e,
                    "campaign_status_write_failed"
                );
            }
        }
    }
}

#[async_trait]
impl DispatchHandler for Dispatcher {
    async fn handle(
        &self,
        request: DispatchRequest,
    ) -> Result<DispatchOutcome, DispatchError> {
        let acquired = self
            .campaigns
            .begin_dispatch(request.campaign_id, request.user_id)
            .await
            .map_err(DispatchError::Persist)?;

        if !acquired {
            warn!(
                campaign_id = request.campaign_id,
                user_id = request.user_id,
                "dispatch_already_claimed"
            );
            return Err(DispatchError::AlreadyDispatching(request.campaign_id));
        }

        info!(
            campaign_id = request.campaign_id,
            user_id = request.user_id,
            list_ids = ?request.list_ids,
            "dispatch_started"
        );

        let mut outcome = DispatchOutcome::new(request.campaign_id);
        let mut pager = SubscriberPager::new(
            self.subscribers.as_ref(),
            &request.list_ids,
            request.user_id,
            self.page_size,
        );

        loop {
            let page = match pager.next_page().await {
                Ok(page) => page,
                Err(e) => {
                    let e = DispatchError::Fetch(e);
                    error!(
                        campaign_id = request.campaign_id,
                        user_id = request.user_id,
                        list_ids = ?request.list_ids,
                        error = %e,
                        "subscriber_fetch_failed"
                    );
                    outcome.fetch_aborted = true;
                    break;
                }
            };

            if page.is_empty() {
                break;
            }

            outcome.pages_fetched += 1;
            outcome.subscribers_seen += page.len() as u64;

            for batch in build_batches(&page, &request.template_data, self.chunk_size) {
                outcome.subscribers_skipped += batch.skipped.len() as u64;
                if batch.destinations.is_empty() {
                    continue;
                }
                self.publish(&request, batch, &mut outcome).await;
            }
        }

        self.finalize(&outcome, request.user_id).await;

        info!(
            campaign_id = request.campaign_id,
            pages = outcome.pages_fetched,
            subscribers = outcome.subscribers_seen,
            skipped = outcome.subscribers_skipped,
            published = outcome.batches_published(),
            failed = outcome.batches_failed(),
            aborted = outcome.fetch_aborted,
            "dispatch_complete"
        );

        Ok(outcome)
    }
}
