//! User and group lifecycle.
//!
//! All mutations here require the administrative capability. Registering a
//! user performs the privilege catch-up: new roles start with no procedure
//! grants, so the full management set is seeded, together with the user's
//! default self-named database.

use chrono::Utc;

use crate::auth::TokenGenerator;
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{Principal, PrincipalKind, Session};

/// Every management procedure a registered user may execute. Seeded onto new
/// users at registration; principals without these grants (for instance
/// read-only service roles) are refused at dispatch.
pub const MANAGEMENT_PROCEDURES: &[&str] = &[
    "create_database",
    "truncate_database",
    "create_collection",
    "create_collections",
    "drop_collections",
    "add_properties",
    "drop_properties",
    "get_properties",
    "rename_collection",
    "copy_collection",
    "create_index",
    "drop_index",
    "show_indexes",
    "grant_access",
    "revoke_access",
    "publish_collection",
    "unpublish_collection",
    "group_publish_collection",
    "group_unpublish_collection",
    "group_publish_database",
    "group_unpublish_database",
    "insert_rows",
    "update_rows",
    "delete_rows",
    "log_event",
];

fn require_admin(session: &Session) -> Result<()> {
    if session.is_admin {
        Ok(())
    } else {
        Err(Error::permission_denied(
            session.whoami(),
            "role management",
        ))
    }
}

/// Refuses management procedures for principals that never received the
/// execute grant. Administrators bypass the check.
pub fn require_procedure(store: &dyn Store, session: &Session, procedure: &str) -> Result<()> {
    if session.is_admin {
        return Ok(());
    }
    if store.has_procedure_grant(session.whoami(), procedure)? {
        Ok(())
    } else {
        Err(Error::permission_denied(
            session.whoami(),
            format!("procedure {procedure}"),
        ))
    }
}

/// Creates a login-capable role, seeds its management privileges, and
/// registers its default self-owned database. Re-registering an existing
/// name is tolerated: the privilege and database seeding still run so a
/// partially provisioned user converges, and the duplicate is logged rather
/// than raised.
pub fn register_user(
    store: &dyn Store,
    session: &Session,
    name: &str,
    password: &str,
) -> Result<()> {
    require_admin(session)?;

    let password_hash = TokenGenerator::new().hash(password)?;
    match store.create_principal(&Principal {
        name: name.to_string(),
        kind: PrincipalKind::User,
        password_hash: Some(password_hash),
        created_at: Utc::now(),
    }) {
        Ok(()) => {}
        Err(Error::AlreadyExists { .. }) => {
            tracing::warn!("user {} already registered", name);
        }
        Err(e) => return Err(e),
    }

    store.grant_procedures(name, MANAGEMENT_PROCEDURES)?;

    if !store.database_exists_for(name, name)? {
        store.insert_database(name, name)?;
    }

    tracing::info!("user {} registered", name);
    Ok(())
}

pub fn user_exists(store: &dyn Store, session: &Session, name: &str) -> Result<bool> {
    require_admin(session)?;
    Ok(store
        .get_principal(name)?
        .is_some_and(|p| p.kind == PrincipalKind::User))
}

/// Drops a user role. Registered databases and collections are left behind;
/// principals are never deleted implicitly, and neither is their data.
pub fn drop_user(store: &dyn Store, session: &Session, name: &str) -> Result<()> {
    require_admin(session)?;
    if !store.delete_principal(name)? {
        return Err(Error::not_found(format!("role {name}")));
    }
    tracing::info!("user {} dropped", name);
    Ok(())
}

/// Creates a non-login role used purely as an authorization aggregation
/// point.
pub fn create_group(store: &dyn Store, session: &Session, name: &str) -> Result<()> {
    require_admin(session)?;
    store.create_principal(&Principal {
        name: name.to_string(),
        kind: PrincipalKind::Group,
        password_hash: None,
        created_at: Utc::now(),
    })?;
    tracing::info!("group {} created", name);
    Ok(())
}

pub fn add_user_to_group(
    store: &dyn Store,
    session: &Session,
    group: &str,
    user: &str,
) -> Result<()> {
    require_admin(session)?;
    let principal = store
        .get_principal(group)?
        .ok_or_else(|| Error::not_found(format!("role {group}")))?;
    if principal.kind != PrincipalKind::Group {
        return Err(Error::invalid_argument(format!("{group} is not a group")));
    }
    if store.get_principal(user)?.is_none() {
        return Err(Error::not_found(format!("role {user}")));
    }
    store.add_member(group, user)
}

pub fn remove_user_from_group(
    store: &dyn Store,
    session: &Session,
    group: &str,
    user: &str,
) -> Result<()> {
    require_admin(session)?;
    store.remove_member(group, user)?;
    Ok(())
}

pub fn list_group_members(store: &dyn Store, session: &Session, group: &str) -> Result<Vec<String>> {
    require_admin(session)?;
    if store.get_principal(group)?.is_none() {
        return Err(Error::not_found(format!("role {group}")));
    }
    store.list_members(group)
}

/// The principal itself plus every group reachable through membership,
/// sorted by name.
pub fn user_roles(store: &dyn Store, name: &str) -> Result<Vec<String>> {
    use std::collections::{HashSet, VecDeque};

    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();
    queue.push_back(name.to_string());
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

    let mut roles: Vec<String> = visited.into_iter().collect();
    roles.sort();
    Ok(roles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, SqliteStore) {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        (temp, store)
    }

    #[test]
    fn test_register_user_seeds_database_and_privileges() {
        let (_temp, store) = open_store();
        let admin = Session::admin("admin");

        register_user(&store, &admin, "alice", "secret").unwrap();

        assert!(store.database_exists_for("alice", "alice").unwrap());
        assert!(
            store
                .has_procedure_grant("alice", "create_collection")
                .unwrap()
        );
        assert!(user_exists(&store, &admin, "alice").unwrap());
    }

    #[test]
    fn test_register_user_twice_is_tolerated() {
        let (_temp, store) = open_store();
        let admin = Session::admin("admin");

        register_user(&store, &admin, "alice", "secret").unwrap();
        register_user(&store, &admin, "alice", "secret").unwrap();
    }

    #[test]
    fn test_role_management_requires_admin() {
        let (_temp, store) = open_store();
        let alice = Session::user("alice");

        let err = register_user(&store, &alice, "mallory", "pw").unwrap_err();
        assert!(matches!(err, Error::PermissionDenied { .. }));

        let err = create_group(&store, &alice, "any_group").unwrap_err();
        assert!(matches!(err, Error::PermissionDenied { .. }));
    }

    #[test]
    fn test_unregistered_principal_lacks_procedures() {
        let (_temp, store) = open_store();
        let admin = Session::admin("admin");
        register_user(&store, &admin, "alice", "secret").unwrap();

        let alice = Session::user("alice");
        let reader = Session::user("read_only");

        require_procedure(&store, &alice, "create_collection").unwrap();
        let err = require_procedure(&store, &reader, "create_collection").unwrap_err();
        assert!(matches!(err, Error::PermissionDenied { .. }));
    }

    #[test]
    fn test_group_membership_and_roles() {
        let (_temp, store) = open_store();
        let admin = Session::admin("admin");

        register_user(&store, &admin, "alice", "pw").unwrap();
        create_group(&store, &admin, "surveyors").unwrap();

        add_user_to_group(&store, &admin, "surveyors", "alice").unwrap();
        assert_eq!(
            list_group_members(&store, &admin, "surveyors").unwrap(),
            vec!["alice"]
        );
        assert_eq!(
            user_roles(&store, "alice").unwrap(),
            vec!["alice", "surveyors"]
        );

        remove_user_from_group(&store, &admin, "surveyors", "alice").unwrap();
        assert_eq!(user_roles(&store, "alice").unwrap(), vec!["alice"]);
    }

    #[test]
    fn test_add_member_to_non_group_fails() {
        let (_temp, store) = open_store();
        let admin = Session::admin("admin");

        register_user(&store, &admin, "alice", "pw").unwrap();
        register_user(&store, &admin, "bob", "pw").unwrap();

        let err = add_user_to_group(&store, &admin, "alice", "bob").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
