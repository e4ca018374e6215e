//! Database (namespace) ownership registry.
//!
//! A collection belongs to the registered database whose name is the longest
//! prefix of its physical name; a principal may act on a collection when it
//! owns that database directly or through transitive group membership.

use std::collections::{HashSet, VecDeque};

use crate::catalog::ddl;
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{CollectionInfo, Database, Session};

/// True if `principal` owns a registered database whose name prefixes
/// `collection`, directly or through any group it is a transitive member of.
///
/// The membership graph is walked with an explicit visited set, so a
/// degenerate self-membership or an accidental cycle terminates instead of
/// recursing forever.
pub fn is_allowed(store: &dyn Store, collection: &str, principal: &str) -> Result<bool> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();
    queue.push_back(principal.to_string());

    while let Some(candidate) = queue.pop_front() {
        if !visited.insert(candidate.clone()) {
            continue;
        }
        if store.owns_matching_database(collection, &candidate)? {
            return Ok(true);
        }
        for group in store.list_groups_of(&candidate)? {
            if !visited.contains(&group) {
                queue.push_back(group);
            }
        }
    }
    Ok(false)
}

/// Shorthand that raises `PermissionDenied` naming the caller and target.
pub fn require_allowed(store: &dyn Store, collection: &str, session: &Session) -> Result<()> {
    if is_allowed(store, collection, session.whoami())? {
        Ok(())
    } else {
        Err(Error::permission_denied(session.whoami(), collection))
    }
}

/// Registers a new database for the caller.
///
/// Invariant DB-NAME-GLOBAL: the name must be free across *all* owners, even
/// though storage is only unique per `(name, owner)`. Group-publishing a
/// database inserts additional owner rows without this check.
pub fn create_database(store: &dyn Store, session: &Session, name: &str) -> Result<()> {
    ddl::validate_database_name(name)?;
    if store.database_exists_any(name)? {
        return Err(Error::already_exists(format!("database {name}")));
    }
    store.insert_database(name, session.whoami())?;
    tracing::info!("database {} created for {}", name, session.whoami());
    Ok(())
}

/// Removes the caller's bookkeeping row for `name`. A missing row is a
/// silent no-op. Physical collections under the namespace are left in place;
/// they become unreachable for collection management until the name is
/// registered again.
pub fn truncate_database(store: &dyn Store, session: &Session, name: &str) -> Result<()> {
    let removed = store.delete_database(name, session.whoami())?;
    if removed {
        tracing::info!("database {} truncated by {}", name, session.whoami());
    }
    Ok(())
}

pub fn database_exists(store: &dyn Store, name: &str) -> Result<bool> {
    store.database_exists_any(name)
}

pub fn list_my_databases(store: &dyn Store, session: &Session) -> Result<Vec<Database>> {
    store.list_databases_for(session.whoami())
}

/// Owner names that count as `principal` for enumeration purposes: the
/// principal itself plus its transitive groups.
fn reachable_owners(store: &dyn Store, principal: &str) -> Result<HashSet<String>> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();
    queue.push_back(principal.to_string());

    while let Some(candidate) = queue.pop_front() {
        if !visited.insert(candidate.clone()) {
            continue;
        }
        for group in store.list_groups_of(&candidate)? {
            if !visited.contains(&group) {
                queue.push_back(group);
            }
        }
    }
    Ok(visited)
}

/// Enumerates the collections visible to `principal` through ownership: the
/// same prefix-match join as [`is_allowed`], but producing rows instead of a
/// boolean. Each physical table is attributed to its longest matching
/// registered database; tables whose winning database is owned by someone
/// else are skipped. Ordered by owner, then database, then short name.
pub fn list_collections_for(
    store: &dyn Store,
    principal: &str,
    database: Option<&str>,
) -> Result<Vec<CollectionInfo>> {
    let owners = reachable_owners(store, principal)?;
    let databases = store.list_all_databases()?;
    let tables = store.list_physical_tables()?;

    let mut rows = Vec::new();
    for table in &tables {
        // longest/most-specific prefix wins across all registered databases
        let winner = databases
            .iter()
            .filter(|db| {
                table.len() > db.name.len() + 1
                    && table.starts_with(&db.name)
                    && table.as_bytes()[db.name.len()] == b'_'
            })
            .max_by_key(|db| db.name.len());

        let Some(db) = winner else { continue };
        if !owners.contains(&db.owner) {
            continue;
        }
        if let Some(filter) = database {
            if db.name != filter {
                continue;
            }
        }
        rows.push(CollectionInfo {
            owner: db.owner.clone(),
            database: db.name.clone(),
            collection: table[db.name.len() + 1..].to_string(),
            table: table.clone(),
        });
    }

    rows.sort_by(|a, b| {
        (&a.owner, &a.database, &a.collection).cmp(&(&b.owner, &b.database, &b.collection))
    });
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::types::{Principal, PrincipalKind};
    use chrono::Utc;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, SqliteStore) {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        (temp, store)
    }

    fn add_principal(store: &SqliteStore, name: &str, kind: PrincipalKind) {
        store
            .create_principal(&Principal {
                name: name.to_string(),
                kind,
                password_hash: None,
                created_at: Utc::now(),
            })
            .unwrap();
    }

    #[test]
    fn test_direct_ownership() {
        let (_temp, store) = open_store();
        store.insert_database("alice", "alice").unwrap();

        assert!(is_allowed(&store, "alice_parcels", "alice").unwrap());
        assert!(!is_allowed(&store, "alice_parcels", "bob").unwrap());
    }

    #[test]
    fn test_transitive_group_ownership() {
        let (_temp, store) = open_store();
        add_principal(&store, "alice", PrincipalKind::User);
        add_principal(&store, "surveyors", PrincipalKind::Group);
        add_principal(&store, "gis", PrincipalKind::Group);
        store.insert_database("projects", "gis").unwrap();

        // alice -> surveyors -> gis owns "projects"
        store.add_member("surveyors", "alice").unwrap();
        store.add_member("gis", "surveyors").unwrap();

        assert!(is_allowed(&store, "projects_sites", "alice").unwrap());
        assert!(is_allowed(&store, "projects_sites", "surveyors").unwrap());
        assert!(!is_allowed(&store, "projects_sites", "bob").unwrap());
    }

    #[test]
    fn test_membership_cycle_terminates() {
        let (_temp, store) = open_store();
        add_principal(&store, "a", PrincipalKind::Group);
        add_principal(&store, "b", PrincipalKind::Group);
        store.add_member("a", "b").unwrap();
        store.add_member("b", "a").unwrap();
        store.add_member("a", "a").unwrap();

        assert!(!is_allowed(&store, "nowhere_x", "a").unwrap());
    }

    #[test]
    fn test_create_database_is_globally_exclusive() {
        let (_temp, store) = open_store();
        let alice = Session::user("alice");
        let bob = Session::user("bob");

        create_database(&store, &alice, "shared").unwrap();

        // the check is deliberately owner-agnostic
        let err = create_database(&store, &bob, "shared").unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
    }

    #[test]
    fn test_truncate_database_is_silent_for_missing_row() {
        let (_temp, store) = open_store();
        let alice = Session::user("alice");
        let bob = Session::user("bob");

        create_database(&store, &alice, "mine").unwrap();
        // bob does not own the row: no-op, not an error
        truncate_database(&store, &bob, "mine").unwrap();
        assert!(database_exists(&store, "mine").unwrap());

        truncate_database(&store, &alice, "mine").unwrap();
        assert!(!database_exists(&store, "mine").unwrap());

        // truncating again stays silent
        truncate_database(&store, &alice, "mine").unwrap();
    }
}
