//! Access grants on collections: per-principal read sharing, public
//! publishing, and full-privilege group sharing.
//!
//! Grants are independent of namespace ownership; a principal can read a
//! collection without owning its namespace, and reading confers no right to
//! alter the schema.

use std::collections::{HashSet, VecDeque};

use chrono::Utc;

use crate::catalog::ownership;
use crate::error::{Error, Result};
use crate::store::{SqliteStore, Store};
use crate::types::{CollectionGrant, Privilege, Session, PUBLIC_GRANTEE};

/// A collection qualifies for grants only when its identifier sequence is
/// discoverable, i.e. the stored table definition declares the
/// auto-incrementing generator. This is the proxy check that the target is a
/// genuine managed collection rather than an arbitrary table.
fn has_identifier_sequence(store: &SqliteStore, collection: &str) -> Result<bool> {
    let conn = store.connection();
    let sql: Option<String> = {
        use rusqlite::OptionalExtension;
        conn.query_row(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [collection],
            |row| row.get(0),
        )
        .optional()?
    };
    Ok(sql.is_some_and(|s| s.to_ascii_uppercase().contains("AUTOINCREMENT")))
}

/// Grants read access (SELECT plus identifier-sequence usage) on the
/// collection to `grantee`.
pub fn grant_access(
    store: &SqliteStore,
    session: &Session,
    collection: &str,
    grantee: &str,
) -> Result<()> {
    if !has_identifier_sequence(store, collection)? {
        return Err(Error::not_found(format!(
            "identifier sequence for {collection}"
        )));
    }

    store.upsert_collection_grant(&CollectionGrant {
        collection: collection.to_string(),
        grantee: grantee.to_string(),
        grantor: session.whoami().to_string(),
        privileges: Privilege::Read,
        granted_at: Utc::now(),
    })?;
    tracing::info!(
        "{} granted read on {} to {}",
        session.whoami(),
        collection,
        grantee
    );
    Ok(())
}

/// Revokes a previous grant. Tolerant of the grant (or the sequence) no
/// longer existing.
pub fn revoke_access(
    store: &SqliteStore,
    session: &Session,
    collection: &str,
    grantee: &str,
) -> Result<()> {
    store.delete_collection_grant(collection, grantee)?;
    tracing::info!(
        "{} revoked access on {} from {}",
        session.whoami(),
        collection,
        grantee
    );
    Ok(())
}

/// Publishes the collection to the universal `public` pseudo-principal.
pub fn publish_collection(store: &SqliteStore, session: &Session, collection: &str) -> Result<()> {
    grant_access(store, session, collection, PUBLIC_GRANTEE)
}

pub fn unpublish_collection(
    store: &SqliteStore,
    session: &Session,
    collection: &str,
) -> Result<()> {
    revoke_access(store, session, collection, PUBLIC_GRANTEE)
}

/// Grants full privileges on the collection to a group, the project-style
/// sharing mode distinct from public read access.
pub fn group_publish_collection(
    store: &SqliteStore,
    session: &Session,
    collection: &str,
    group: &str,
) -> Result<()> {
    if !has_identifier_sequence(store, collection)? {
        return Err(Error::not_found(format!(
            "identifier sequence for {collection}"
        )));
    }
    store.upsert_collection_grant(&CollectionGrant {
        collection: collection.to_string(),
        grantee: group.to_string(),
        grantor: session.whoami().to_string(),
        privileges: Privilege::All,
        granted_at: Utc::now(),
    })?;
    Ok(())
}

pub fn group_unpublish_collection(
    store: &SqliteStore,
    session: &Session,
    collection: &str,
    group: &str,
) -> Result<()> {
    store.delete_collection_grant(collection, group)?;
    Ok(())
}

/// Makes `group` a co-owner of the caller's database by inserting the
/// `(database, group)` registry row, so every member becomes a transitive
/// owner of the namespace. This is the one path that bypasses the global
/// name-exclusivity check of database creation.
pub fn group_publish_database(
    store: &dyn Store,
    session: &Session,
    database: &str,
    group: &str,
) -> Result<()> {
    if !store.database_exists_for(database, session.whoami())? {
        return Err(Error::permission_denied(session.whoami(), database));
    }
    if !store.database_exists_for(database, group)? {
        store.insert_database(database, group)?;
    }
    Ok(())
}

pub fn group_unpublish_database(
    store: &dyn Store,
    session: &Session,
    database: &str,
    group: &str,
) -> Result<()> {
    if !store.database_exists_for(database, session.whoami())? {
        return Err(Error::permission_denied(session.whoami(), database));
    }
    store.delete_database(database, group)?;
    Ok(())
}

/// Grants issued by the caller to others, as `(collection, grantee)` pairs,
/// optionally restricted to one database. The caller's own self-grants are
/// filtered out.
pub fn list_my_grants(
    store: &dyn Store,
    session: &Session,
    database: Option<&str>,
) -> Result<Vec<(String, String)>> {
    let grants = store.list_grants_by_grantor(session.whoami())?;
    let mut rows = Vec::new();
    for grant in grants {
        if grant.grantee == session.whoami() {
            continue;
        }
        if let Some(db) = database {
            let prefix = format!("{db}_");
            if !grant.collection.starts_with(&prefix) {
                continue;
            }
        }
        // report the short name relative to the longest registered database
        let short = short_name(store, &grant.collection)?;
        rows.push((short, grant.grantee));
    }
    Ok(rows)
}

fn short_name(store: &dyn Store, collection: &str) -> Result<String> {
    let winner = store
        .list_all_databases()?
        .into_iter()
        .filter(|db| {
            collection.len() > db.name.len() + 1
                && collection.starts_with(&db.name)
                && collection.as_bytes()[db.name.len()] == b'_'
        })
        .max_by_key(|db| db.name.len());
    Ok(match winner {
        Some(db) => collection[db.name.len() + 1..].to_string(),
        None => collection.to_string(),
    })
}

/// Access rights on one collection: explicit grants plus the implicit full
/// privileges of the recorded owner.
pub fn get_grants(store: &dyn Store, collection: &str) -> Result<Vec<(String, Privilege)>> {
    let mut rows: Vec<(String, Privilege)> = store
        .list_grants_on(collection)?
        .into_iter()
        .map(|g| (g.grantee, g.privileges))
        .collect();
    if let Some(record) = store.get_collection_record(collection)? {
        rows.push((record.owner, Privilege::All));
    }
    rows.sort();
    rows.dedup();
    Ok(rows)
}

/// True if `principal` may read the collection: namespace ownership, a
/// direct or group-mediated grant, or a public grant. The spatial query
/// engine itself never consults ownership; this is the storage-layer
/// visibility gate invoked ahead of it.
pub fn can_read(store: &dyn Store, collection: &str, principal: &str) -> Result<bool> {
    if ownership::is_allowed(store, collection, principal)? {
        return Ok(true);
    }

    let grants = store.list_grants_on(collection)?;
    if grants.is_empty() {
        return Ok(false);
    }

    let mut reachable: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();
    queue.push_back(principal.to_string());
    while let Some(candidate) = queue.pop_front() {
        if !reachable.insert(candidate.clone()) {
            continue;
        }
        for group in store.list_groups_of(&candidate)? {
            if !reachable.contains(&group) {
                queue.push_back(group);
            }
        }
    }

    Ok(grants
        .iter()
        .any(|g| g.grantee == PUBLIC_GRANTEE || reachable.contains(&g.grantee)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::collections;
    use crate::store::SqliteStore;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, SqliteStore) {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        (temp, store)
    }

    #[test]
    fn test_grant_requires_identifier_sequence() {
        let (_temp, store) = open_store();
        let alice = Session::user("alice");
        store.insert_database("alice", "alice").unwrap();

        // an arbitrary table without the generator does not qualify
        store
            .connection()
            .execute("CREATE TABLE \"alice_raw\" (id INTEGER PRIMARY KEY)", [])
            .unwrap();
        let err = grant_access(&store, &alice, "alice_raw", "bob").unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));

        collections::create_collection(&store, &alice, "alice_parcels", &BTreeMap::new(), 4326)
            .unwrap();
        grant_access(&store, &alice, "alice_parcels", "bob").unwrap();

        assert!(can_read(&store, "alice_parcels", "bob").unwrap());
        assert!(!can_read(&store, "alice_parcels", "carol").unwrap());
    }

    #[test]
    fn test_publish_unpublish_public() {
        let (_temp, store) = open_store();
        let alice = Session::user("alice");
        store.insert_database("alice", "alice").unwrap();
        collections::create_collection(&store, &alice, "alice_parcels", &BTreeMap::new(), 4326)
            .unwrap();

        publish_collection(&store, &alice, "alice_parcels").unwrap();
        assert!(can_read(&store, "alice_parcels", "anyone").unwrap());

        unpublish_collection(&store, &alice, "alice_parcels").unwrap();
        assert!(!can_read(&store, "alice_parcels", "anyone").unwrap());
    }

    #[test]
    fn test_list_my_grants_excludes_self() {
        let (_temp, store) = open_store();
        let alice = Session::user("alice");
        store.insert_database("alice", "alice").unwrap();
        collections::create_collection(&store, &alice, "alice_parcels", &BTreeMap::new(), 4326)
            .unwrap();

        grant_access(&store, &alice, "alice_parcels", "alice").unwrap();
        grant_access(&store, &alice, "alice_parcels", "bob").unwrap();

        let grants = list_my_grants(&store, &alice, None).unwrap();
        assert_eq!(grants, vec![("parcels".to_string(), "bob".to_string())]);

        let filtered = list_my_grants(&store, &alice, Some("other")).unwrap();
        assert!(filtered.is_empty());
    }
}
