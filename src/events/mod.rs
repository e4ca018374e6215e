//! Append-only event log.

use crate::error::Result;
use crate::store::Store;
use crate::types::EventRecord;

/// Appends one event. The type is free-form text on the wire so externally
/// recorded types survive round trips; the crate's own call sites use
/// [`crate::types::EventType`].
pub fn log_event(store: &dyn Store, event_type: &str, message: &str, user: &str) -> Result<()> {
    store.append_event(event_type, message, user)
}

/// Events in insertion order, optionally filtered by exact type (`%` matches
/// all) and by a substring of the message, typically a collection name.
pub fn get_eventlog(
    store: &dyn Store,
    event_type: Option<&str>,
    collection: Option<&str>,
) -> Result<Vec<EventRecord>> {
    store.list_events(event_type, collection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::types::EventType;
    use tempfile::TempDir;

    #[test]
    fn test_log_and_filter_events() {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();

        log_event(
            &store,
            EventType::Created.as_str(),
            "created alice_parcels",
            "alice",
        )
        .unwrap();
        log_event(
            &store,
            EventType::Published.as_str(),
            "published alice_parcels",
            "alice",
        )
        .unwrap();

        let all = get_eventlog(&store, None, None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].event_type, "CREATED");

        let published = get_eventlog(&store, Some("PUBLISHED"), None).unwrap();
        assert_eq!(published.len(), 1);

        let wildcard = get_eventlog(&store, Some("%"), Some("alice_parcels")).unwrap();
        assert_eq!(wildcard.len(), 2);
    }
}
