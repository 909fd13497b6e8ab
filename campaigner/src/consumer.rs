//! RabbitMQ consumer module using lapin.
//!
//! Connects to RabbitMQ, consumes start-campaign triggers from the
//! campaigns queue and runs each one through the registered
//! `DispatchHandler` on its own task. Concurrency is bounded by the
//! channel prefetch: the broker hands out at most `worker_concurrency`
//! unacked messages at a time.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions,
        QueueDeclareOptions,
    },
    types::FieldTable,
    Channel, Connection, ConnectionProperties,
};
use tokio::signal;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::dispatch::DispatchHandler;
use crate::error::DispatchError;
use crate::queue::types::{DispatchRequest, CAMPAIGNS_QUEUE, SEND_BULK_QUEUE};

/// Run the dispatch consumer until shutdown.
///
/// This function:
/// 1. Connects to RabbitMQ using the configured URL
/// 2. Sets QoS prefetch to the worker concurrency
/// 3. Declares both queues (idempotent operation)
/// 4. Consumes trigger messages, spawning a task per dispatch run
/// 5. Drains in-flight runs on SIGINT/SIGTERM
pub async fn run(config: &Config, handler: Arc<dyn DispatchHandler>) -> Result<()> {
    info!(url_length = config.amqp_url.len(), "rabbitmq_connecting");

    let conn = Connection::connect(&config.amqp_url, ConnectionProperties::default())
        .await
        .context("Failed to connect to RabbitMQ")?;

    info!("rabbitmq_connected");

    let channel = conn
        .create_channel()
        .await
        .context("Failed to create channel")?;

    info!("rabbitmq_channel_created");

    // Prefetch bounds the number of dispatch runs in flight
    let prefetch_count = config.worker_concurrency as u16;
    channel
        .basic_qos(prefetch_count, BasicQosOptions::default())
        .await
        .context("Failed to set QoS")?;

    info!(prefetch_count = prefetch_count, "rabbitmq_qos_set");

    for queue in [CAMPAIGNS_QUEUE, SEND_BULK_QUEUE] {
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .context("Failed to declare queue")?;
    }

    info!(
        trigger_queue = CAMPAIGNS_QUEUE,
        delivery_queue = SEND_BULK_QUEUE,
        "rabbitmq_queues_declared"
    );

    let mut consumer = channel
        .basic_consume(
            CAMPAIGNS_QUEUE,
            "campaigner-worker",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await
        .context("Failed to start consumer")?;

    info!(queue = CAMPAIGNS_QUEUE, "rabbitmq_consumer_started");
    info!("worker_ready");

    let channel = Arc::new(channel);
    let mut runs: JoinSet<()> = JoinSet::new();

    // Create shutdown signal future
    let shutdown = async {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received SIGINT"),
            _ = terminate => info!("Received SIGTERM"),
        }
    };

    tokio::pin!(shutdown);

    // Consume until shutdown
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("worker_stopping");
                break;
            }
            delivery = consumer.next() => {
                match delivery {
                    Some(Ok(delivery)) => {
                        info!(
                            queue = CAMPAIGNS_QUEUE,
                            delivery_tag = delivery.delivery_tag,
                            body_length = delivery.data.len(),
                            "rabbitmq_trigger_received"
                        );

                        let handler = Arc::clone(&handler);
                        let channel = Arc::clone(&channel);

                        runs.spawn(async move {
                            process_delivery(&channel, handler.as_ref(), delivery).await;
                        });
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "rabbitmq_delivery_error");
                    }
                    None => {
                        warn!("rabbitmq_consumer_closed");
                        break;
                    }
                }
            }
        }
    }

    // Let in-flight dispatch runs finish before exiting; a run already
    // inside its pagination loop is never cancelled mid-way.
    while runs.join_next().await.is_some() {}

    info!("worker_shutdown_complete");
    Ok(())
}

/// Decode one trigger message and run it through the handler, settling the
/// delivery according to the outcome.
async fn process_delivery(
    channel: &Channel,
    handler: &dyn DispatchHandler,
    delivery: lapin::message::Delivery,
) {
    let delivery_tag = delivery.delivery_tag;

    let request = match decode_request(&delivery.data) {
        Ok(request) => request,
        Err(e) => {
            error!(
                delivery_tag = delivery_tag,
                error = %e,
                body_preview = %String::from_utf8_lossy(
                    &delivery.data[..delivery.data.len().min(500)]
                ),
                "trigger_decode_failed"
            );

            // Abandon the message; the payload will never decode
            nack(channel, delivery_tag, false).await;
            return;
        }
    };

    let campaign_id = request.campaign_id;

    match handler.handle(request).await {
        Ok(outcome) => {
            ack(channel, delivery_tag).await;
            info!(
                campaign_id = campaign_id,
                status = outcome.terminal_status().as_str(),
                "trigger_completed"
            );
        }
        Err(DispatchError::AlreadyDispatching(_)) => {
            // Duplicate trigger: drop it rather than double-send
            warn!(campaign_id = campaign_id, "trigger_dropped_duplicate");
            ack(channel, delivery_tag).await;
        }
        Err(e) => {
            // The run never started; give the broker a chance to redeliver
            error!(campaign_id = campaign_id, error = %e, "trigger_failed");
            nack(channel, delivery_tag, true).await;
        }
    }
}

fn decode_request(body: &[u8]) -> Result<DispatchRequest, DispatchError> {
    if body.is_empty() {
        return Err(DispatchError::MalformedRequest("body is blank".to_string()));
    }

    serde_json::from_slice(body).map_err(|e| DispatchError::MalformedRequest(e.to_string()))
}

async fn ack(channel: &Channel, delivery_tag: u64) {
    if let Err(e) = channel
        .basic_ack(delivery_tag, BasicAckOptions::default())
        .await
    {
        error!(delivery_tag = delivery_tag, error = %e, "rabbitmq_ack_failed");
    }
}

async fn nack(channel: &Channel, delivery_tag: u64, requeue: bool) {
    if let Err(e) = channel
        .basic_nack(
            delivery_tag,
            BasicNackOptions {
                requeue,
                ..Default::default()
            },
        )
        .await
    {
        error!(delivery_tag = delivery_tag, error = %e, "rabbitmq_nack_failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_request_blank_body() {
        let err = decode_request(b"").unwrap_err();
        assert!(matches!(err, DispatchError::MalformedRequest(_)));
    }

    #[test]
    fn test_decode_request_invalid_json() {
        let err = decode_request(b"{not json").unwrap_err();
        assert!(matches!(err, DispatchError::MalformedRequest(_)));
    }

    #[test]
    fn test_decode_request_valid() {
        let body = br#"{
            "list_ids": [1],
            "source": "news@example.com",
            "campaign_id": 5,
            "user_id": 2,
            "template_name": "welcome",
            "template_data": {},
            "credentials": {"key": "k", "secret": "s", "region": "us-east-1"}
        }"#;

        let request = decode_request(body).unwrap();
        assert_eq!(request.campaign_id, 5);
        assert_eq!(request.list_ids, vec![1]);
    }
}
