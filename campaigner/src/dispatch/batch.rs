//! Batch construction.
//!
//! Splits a page of subscribers into provider-sized chunks and merges the
//! campaign's default merge fields with each subscriber's own. Batches are
//! not atomic: a subscriber whose stored metadata is not valid JSON is
//! dropped from the batch and the rest proceed.

use std::collections::HashMap;

use tracing::warn;

use crate::error::DispatchError;
use crate::queue::types::Destination;
use crate::store::types::Subscriber;

/// One provider-sized chunk of recipients, ready for envelope assembly.
#[derive(Debug)]
pub struct Batch {
    pub destinations: Vec<Destination>,
    /// Ids of subscribers dropped for unserializable merge fields.
    pub skipped: Vec<i64>,
}

/// Build batches of at most `chunk_size` destinations out of one page,
/// preserving page order. Lazy: each batch is materialized as the iterator
/// advances, and a fresh call is needed per page.
pub fn build_batches<'a>(
    page: &'a [Subscriber],
    default_data: &'a HashMap<String, String>,
    chunk_size: usize,
) -> impl Iterator<Item = Batch> + 'a {
    page.chunks(chunk_size.max(1)).map(move |chunk| {
        let mut destinations = Vec::with_capacity(chunk.len());
        let mut skipped = Vec::new();

        for subscriber in chunk {
            let mut subscriber = subscriber.clone();
            subscriber.normalize();

            match replacement_data(&subscriber, default_data) {
                Ok(data) => destinations.push(Destination {
                    to: subscriber.email,
                    replacement_data: data,
                }),
                Err(e) => {
                    warn!(
                        subscriber_id = subscriber.id,
                        error = %e,
                        "subscriber_skipped"
                    );
                    skipped.push(subscriber.id);
                }
            }
        }

        Batch {
            destinations,
            skipped,
        }
    })
}

/// Merge defaults with the subscriber's own fields (subscriber wins) and
/// serialize for the provider.
fn replacement_data(
    subscriber: &Subscriber,
    default_data: &HashMap<String, String>,
) -> Result<String, DispatchError> {
    let serialization = |source| DispatchError::Serialization {
        subscriber_id: subscriber.id,
        source,
    };

    let mut merged = default_data.clone();
    merged.extend(subscriber.template_data().map_err(serialization)?);
    serde_json::to_string(&merged).map_err(serialization)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscriber(id: i64, email: &str, metadata: &str) -> Subscriber {
        Subscriber {
            id,
            user_id: 1,
            name: format!("sub-{id}"),
            email: email.to_string(),
            metadata: metadata.to_string(),
            active: true,
            blacklisted: false,
        }
    }

    fn page(count: usize) -> Vec<Subscriber> {
        (1..=count as i64)
            .map(|id| subscriber(id, &format!("sub{id}@example.com"), ""))
            .collect()
    }

    #[test]
    fn test_chunk_sizes() {
        let page = page(120);
        let defaults = HashMap::new();

        let sizes: Vec<usize> = build_batches(&page, &defaults, 50)
            .map(|b| b.destinations.len())
            .collect();

        assert_eq!(sizes, vec![50, 50, 20]);
    }

    #[test]
    fn test_page_order_preserved() {
        let page = page(120);
        let defaults = HashMap::new();

        let batches: Vec<Batch> = build_batches(&page, &defaults, 50).collect();

        assert_eq!(batches[0].destinations[0].to, "sub1@example.com");
        assert_eq!(batches[0].destinations[49].to, "sub50@example.com");
        assert_eq!(batches[1].destinations[0].to, "sub51@example.com");
        assert_eq!(batches[2].destinations[19].to, "sub120@example.com");
    }

    #[test]
    fn test_empty_page_yields_no_batches() {
        let defaults = HashMap::new();
        assert_eq!(build_batches(&[], &defaults, 50).count(), 0);
    }

    #[test]
    fn test_invalid_metadata_skips_subscriber_only() {
        let mut page = page(50);
        page[10].metadata = "{broken".to_string();
        let defaults = HashMap::new();

        let batches: Vec<Batch> = build_batches(&page, &defaults, 50).collect();

        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].destinations.len(), 49);
        assert_eq!(batches[0].skipped, vec![11]);
    }

    #[test]
    fn test_merge_subscriber_wins_over_defaults() {
        let page = vec![subscriber(
            1,
            "a@example.com",
            r#"{"name":"Ana","city":"Lisbon"}"#,
        )];
        let defaults = HashMap::from([
            ("name".to_string(), "subscriber".to_string()),
            ("company".to_string(), "Acme".to_string()),
        ]);

        let batches: Vec<Batch> = build_batches(&page, &defaults, 50).collect();
        let merged: HashMap<String, String> =
            serde_json::from_str(&batches[0].destinations[0].replacement_data).unwrap();

        assert_eq!(merged.get("name"), Some(&"Ana".to_string()));
        assert_eq!(merged.get("city"), Some(&"Lisbon".to_string()));
        assert_eq!(merged.get("company"), Some(&"Acme".to_string()));
    }

    #[test]
    fn test_addresses_normalized() {
        let page = vec![subscriber(1, "  Ana@Example.COM ", "")];
        let defaults = HashMap::new();

        let batches: Vec<Batch> = build_batches(&page, &defaults, 50).collect();

        assert_eq!(batches[0].destinations[0].to, "ana@example.com");
    }
}
