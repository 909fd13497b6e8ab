//! Queue message types for the two-queue dispatch architecture.
//!
//! This module defines the message formats for:
//! - `campaigns` queue: start-campaign triggers from the API
//! - `send_bulk_emails` queue: provider-sized batches ready for delivery

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Queue name for start-campaign trigger messages.
pub const CAMPAIGNS_QUEUE: &str = "campaigns";

/// Queue name for outbound bulk-send batches.
pub const SEND_BULK_QUEUE: &str = "send_bulk_emails";

/// Hard upper bound on destinations per batch imposed by the bulk provider.
pub const PROVIDER_BATCH_LIMIT: usize = 50;

/// Delivery provider credentials carried through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCredentials {
    pub key: String,
    pub secret: String,
    pub region: String,
}

// =============================================================================
// Trigger types (campaigns queue)
// =============================================================================

/// Start-campaign message consumed from the campaigns queue.
///
/// Published by the API once it has validated ownership and moved the
/// campaign from draft to in-progress. Immutable once received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRequest {
    /// Recipient lists to enumerate
    pub list_ids: Vec<i64>,
    /// Sender email address
    pub source: String,
    /// Campaign being dispatched
    pub campaign_id: i64,
    /// Owner of the campaign and its lists
    pub user_id: i64,
    /// Provider template to render with
    pub template_name: String,
    /// Default/fallback merge fields for every recipient
    #[serde(default)]
    pub template_data: HashMap<String, String>,
    /// Delivery provider credentials
    pub credentials: ProviderCredentials,
}

// =============================================================================
// Batch types (send_bulk_emails queue)
// =============================================================================

/// One recipient inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    /// Recipient email address
    pub to: String,
    /// JSON-encoded merge fields for this recipient
    pub replacement_data: String,
}

/// Attribution tag attached to every message in a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageTag {
    pub name: String,
    pub value: String,
}

/// The bulk-send call the delivery worker will make to the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInput {
    pub source: String,
    pub template: String,
    pub destinations: Vec<Destination>,
    /// JSON-encoded fallback merge fields
    pub default_template_data: String,
    pub tags: Vec<MessageTag>,
}

/// Envelope published to the send_bulk_emails queue, one per batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchEnvelope {
    /// Idempotency/tracing key, unique per batch
    pub batch_id: String,
    pub campaign_id: i64,
    pub user_id: i64,
    pub credentials: ProviderCredentials,
    pub provider_input: ProviderInput,
}

impl BatchEnvelope {
    /// Assemble an envelope for one chunk of destinations, minting a fresh
    /// batch id and serializing the campaign's default merge fields.
    pub fn from_request(
        request: &DispatchRequest,
        destinations: Vec<Destination>,
    ) -> Result<Self, serde_json::Error> {
        let default_template_data = serde_json::to_string(&request.template_data)?;

        Ok(BatchEnvelope {
            batch_id: Uuid::new_v4().to_string(),
            campaign_id: request.campaign_id,
            user_id: request.user_id,
            credentials: request.credentials.clone(),
            provider_input: ProviderInput {
                source: request.source.clone(),
                template: request.template_name.clone(),
                destinations,
                default_template_data,
                tags: vec![
                    MessageTag {
                        name: "campaign_id".to_string(),
                        value: request.campaign_id.to_string(),
                    },
                    MessageTag {
                        name: "user_id".to_string(),
                        value: request.user_id.to_string(),
                    },
                ],
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> DispatchRequest {
        DispatchRequest {
            list_ids: vec![1, 2],
            source: "news@example.com".to_string(),
            campaign_id: 7,
            user_id: 3,
            template_name: "welcome".to_string(),
            template_data: HashMap::from([("company".to_string(), "Acme".to_string())]),
            credentials: ProviderCredentials {
                key: "key".to_string(),
                secret: "secret".to_string(),
                region: "us-east-1".to_string(),
            },
        }
    }

    #[test]
    fn test_dispatch_request_deserialization() {
        let json = r#"{
            "list_ids": [1, 2],
            "source": "news@example.com",
            "campaign_id": 7,
            "user_id": 3,
            "template_name": "welcome",
            "template_data": {"company": "Acme"},
            "credentials": {"key": "k", "secret": "s", "region": "eu-west-1"}
        }"#;

        let request: DispatchRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.list_ids, vec![1, 2]);
        assert_eq!(request.campaign_id, 7);
        assert_eq!(request.template_data.get("company"), Some(&"Acme".to_string()));
        assert_eq!(request.credentials.region, "eu-west-1");
    }

    #[test]
    fn test_dispatch_request_missing_template_data() {
        let json = r#"{
            "list_ids": [4],
            "source": "news@example.com",
            "campaign_id": 1,
            "user_id": 1,
            "template_name": "plain",
            "credentials": {"key": "k", "secret": "s", "region": "us-east-1"}
        }"#;

        let request: DispatchRequest = serde_json::from_str(json).unwrap();
        assert!(request.template_data.is_empty());
    }

    #[test]
    fn test_envelope_from_request() {
        let destinations = vec![Destination {
            to: "sub@example.com".to_string(),
            replacement_data: r#"{"name":"Ana"}"#.to_string(),
        }];

        let envelope = BatchEnvelope::from_request(&request(), destinations).unwrap();

        assert!(!envelope.batch_id.is_empty());
        assert_eq!(envelope.campaign_id, 7);
        assert_eq!(envelope.user_id, 3);
        assert_eq!(envelope.provider_input.source, "news@example.com");
        assert_eq!(envelope.provider_input.template, "welcome");
        assert_eq!(envelope.provider_input.destinations.len(), 1);
        assert_eq!(
            envelope.provider_input.default_template_data,
            r#"{"company":"Acme"}"#
        );

        let tags = &envelope.provider_input.tags;
        assert_eq!(tags[0].name, "campaign_id");
        assert_eq!(tags[0].value, "7");
        assert_eq!(tags[1].name, "user_id");
        assert_eq!(tags[1].value, "3");
    }

    #[test]
    fn test_envelope_batch_ids_distinct() {
        let request = request();
        let a = BatchEnvelope::from_request(&request, Vec::new()).unwrap();
        let b = BatchEnvelope::from_request(&request, Vec::new()).unwrap();
        assert_ne!(a.batch_id, b.batch_id);
    }

    #[test]
    fn test_envelope_serialization_round_trip() {
        let envelope = BatchEnvelope::from_request(&request(), Vec::new()).unwrap();

        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains("\"batch_id\""));
        assert!(json.contains("\"provider_input\""));

        let parsed: BatchEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.batch_id, envelope.batch_id);
        assert_eq!(parsed.provider_input.tags.len(), 2);
    }
}
