//! Identifier generation.

use uuid::Uuid;

/// Generates a new execution id.
///
/// UUID v7 keeps ids sortable by creation time, which makes store listings
/// and log lines line up with run order.
#[must_use]
pub fn generate_execution_id() -> String {
    Uuid::now_v7().to_string()
}

/// Generates an id for synthesized trigger events.
#[must_use]
pub fn generate_event_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_are_unique() {
        let ids: HashSet<String> = (0..1000).map(|_| generate_execution_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_execution_ids_sort_by_creation() {
        let first = generate_execution_id();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = generate_execution_id();
        assert!(first < second);
    }

    #[test]
    fn test_event_id_is_v4() {
        let id = Uuid::parse_str(&generate_event_id()).unwrap();
        assert_eq!(id.get_version_num(), 4);
    }
}
