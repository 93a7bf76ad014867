use common::domain::CanonicalEvent;
use std::collections::HashSet;
use tracing::debug;

/// Collapse events sharing a dedup key, keeping the first-seen event.
///
/// Input order of the survivors is preserved. Nothing is remembered between
/// calls, so duplicates spread across batches are all kept.
pub fn dedupe(events: Vec<CanonicalEvent>) -> Vec<CanonicalEvent> {
    let received = events.len();
    let mut seen = HashSet::with_capacity(received);

    let unique: Vec<CanonicalEvent> = events
        .into_iter()
        .filter(|event| seen.insert(event.dedup_key.clone()))
        .collect();

    if unique.len() < received {
        debug!(
            received,
            unique = unique.len(),
            "dropped duplicate events from batch"
        );
    }

    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::DedupKey;

    fn event(key: &str, speed: f64) -> CanonicalEvent {
        let mut fields = serde_json::Map::new();
        fields.insert("vehicle_id".to_string(), serde_json::json!(key));
        fields.insert("speed".to_string(), serde_json::json!(speed));
        CanonicalEvent {
            dedup_key: DedupKey::text(key),
            fields,
            ingestion_timestamp: "2024-07-24T10:30:58.292".to_string(),
            source_timestamp: None,
        }
    }

    #[test]
    fn test_first_seen_wins() {
        let events = vec![event("V1", 10.0), event("V2", 20.0), event("V1", 99.0)];
        let unique = dedupe(events);

        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].dedup_key, DedupKey::text("V1"));
        assert_eq!(unique[0].fields["speed"], serde_json::json!(10.0));
        assert_eq!(unique[1].dedup_key, DedupKey::text("V2"));
    }

    #[test]
    fn test_distinct_keys_are_untouched() {
        let events = vec![event("V3", 1.0), event("V1", 2.0), event("V2", 3.0)];
        assert_eq!(dedupe(events.clone()), events);
    }

    #[test]
    fn test_dedupe_is_idempotent() {
        let once = dedupe(vec![
            event("V1", 1.0),
            event("V1", 2.0),
            event("V2", 3.0),
            event("V2", 4.0),
        ]);
        assert_eq!(dedupe(once.clone()), once);
    }

    #[test]
    fn test_text_and_numeric_keys_are_not_duplicates() {
        let mut numeric = event("1", 5.0);
        numeric.dedup_key = DedupKey::Number("1".to_string());

        let unique = dedupe(vec![numeric, event("1", 6.0)]);
        assert_eq!(unique.len(), 2);
    }

    #[test]
    fn test_empty_batch() {
        assert!(dedupe(Vec::new()).is_empty());
    }
}
