use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use super::Store;
use super::schema::{BOOKKEEPING_TABLES, SCHEMA};
use crate::error::{Error, Result};
use crate::types::*;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns a guard to the underlying database connection. The schema
    /// builder and query engine execute their dynamic SQL through this.
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn()
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch(SCHEMA)?;

        let versions: i64 =
            conn.query_row("SELECT COUNT(*) FROM version_info", [], |row| row.get(0))?;
        if versions == 0 {
            conn.execute(
                "INSERT INTO version_info (version) VALUES (?1)",
                params![env!("CARGO_PKG_VERSION")],
            )?;
        }
        Ok(())
    }

    // Database (namespace) registry

    fn insert_database(&self, name: &str, owner: &str) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO databases (name, owner) VALUES (?1, ?2)",
            params![name, owner],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(Error::already_exists(format!("database {name}")))
            }
            Err(e) => Err(Error::from(e)),
        }
    }

    fn delete_database(&self, name: &str, owner: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM databases WHERE name = ?1 AND owner = ?2",
            params![name, owner],
        )?;
        Ok(rows > 0)
    }

    fn database_exists_any(&self, name: &str) -> Result<bool> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM databases WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn database_exists_for(&self, name: &str, owner: &str) -> Result<bool> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM databases WHERE name = ?1 AND owner = ?2",
            params![name, owner],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn list_databases_for(&self, owner: &str) -> Result<Vec<Database>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT name, owner, created_at FROM databases WHERE owner = ?1 ORDER BY name",
        )?;

        let rows = stmt.query_map(params![owner], |row| {
            Ok(Database {
                name: row.get(0)?,
                owner: row.get(1)?,
                created_at: parse_datetime(&row.get::<_, String>(2)?),
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_all_databases(&self) -> Result<Vec<Database>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT name, owner, created_at FROM databases ORDER BY owner, name")?;

        let rows = stmt.query_map([], |row| {
            Ok(Database {
                name: row.get(0)?,
                owner: row.get(1)?,
                created_at: parse_datetime(&row.get::<_, String>(2)?),
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn owns_matching_database(&self, collection: &str, owner: &str) -> Result<bool> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM databases WHERE owner = ?1 AND ?2 LIKE name || '_%'",
            params![owner, collection],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // Principal operations

    fn create_principal(&self, principal: &Principal) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO principals (name, kind, password_hash, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                principal.name,
                principal.kind.as_str(),
                principal.password_hash,
                format_datetime(&principal.created_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(Error::already_exists(format!("role {}", principal.name)))
            }
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_principal(&self, name: &str) -> Result<Option<Principal>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT name, kind, password_hash, created_at FROM principals WHERE name = ?1",
            params![name],
            |row| {
                Ok(Principal {
                    name: row.get(0)?,
                    kind: PrincipalKind::parse(&row.get::<_, String>(1)?)
                        .unwrap_or(PrincipalKind::User),
                    password_hash: row.get(2)?,
                    created_at: parse_datetime(&row.get::<_, String>(3)?),
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    fn delete_principal(&self, name: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM principals WHERE name = ?1", params![name])?;
        Ok(rows > 0)
    }

    // Group membership

    fn add_member(&self, role: &str, member: &str) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO role_members (role_name, member_name) VALUES (?1, ?2)",
            params![role, member],
        )?;
        Ok(())
    }

    fn remove_member(&self, role: &str, member: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM role_members WHERE role_name = ?1 AND member_name = ?2",
            params![role, member],
        )?;
        Ok(rows > 0)
    }

    fn list_members(&self, role: &str) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT member_name FROM role_members WHERE role_name = ?1 ORDER BY member_name",
        )?;

        let rows = stmt.query_map(params![role], |row| row.get(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_groups_of(&self, member: &str) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT role_name FROM role_members WHERE member_name = ?1 ORDER BY role_name",
        )?;

        let rows = stmt.query_map(params![member], |row| row.get(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // Procedure privileges

    fn grant_procedures(&self, principal: &str, procedures: &[&str]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        for procedure in procedures {
            tx.execute(
                "INSERT OR IGNORE INTO procedure_grants (principal, procedure) VALUES (?1, ?2)",
                params![principal, procedure],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn has_procedure_grant(&self, principal: &str, procedure: &str) -> Result<bool> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM procedure_grants WHERE principal = ?1 AND procedure = ?2",
            params![principal, procedure],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // Collection registry

    fn register_collection(&self, name: &str, srid: i32, owner: &str) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO collections (name, srid, owner) VALUES (?1, ?2, ?3)",
            params![name, srid, owner],
        )?;
        Ok(())
    }

    fn unregister_collection(&self, name: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM collections WHERE name = ?1", params![name])?;
        Ok(rows > 0)
    }

    fn get_collection_record(&self, name: &str) -> Result<Option<CollectionRecord>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT name, srid, owner, created_at FROM collections WHERE name = ?1",
            params![name],
            |row| {
                Ok(CollectionRecord {
                    name: row.get(0)?,
                    srid: row.get(1)?,
                    owner: row.get(2)?,
                    created_at: parse_datetime(&row.get::<_, String>(3)?),
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    fn rename_collection_record(&self, old: &str, new: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE collections SET name = ?1 WHERE name = ?2",
            params![new, old],
        )?;
        Ok(())
    }

    // Collection grants

    fn upsert_collection_grant(&self, grant: &CollectionGrant) -> Result<()> {
        self.conn().execute(
            "INSERT INTO collection_grants (collection, grantee, grantor, privileges, granted_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (collection, grantee) DO UPDATE SET
                grantor = excluded.grantor,
                privileges = excluded.privileges,
                granted_at = excluded.granted_at",
            params![
                grant.collection,
                grant.grantee,
                grant.grantor,
                grant.privileges.as_str(),
                format_datetime(&grant.granted_at),
            ],
        )?;
        Ok(())
    }

    fn delete_collection_grant(&self, collection: &str, grantee: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM collection_grants WHERE collection = ?1 AND grantee = ?2",
            params![collection, grantee],
        )?;
        Ok(rows > 0)
    }

    fn delete_grants_for_collection(&self, collection: &str) -> Result<()> {
        self.conn().execute(
            "DELETE FROM collection_grants WHERE collection = ?1",
            params![collection],
        )?;
        Ok(())
    }

    fn list_grants_by_grantor(&self, grantor: &str) -> Result<Vec<CollectionGrant>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT collection, grantee, grantor, privileges, granted_at
             FROM collection_grants WHERE grantor = ?1 ORDER BY collection, grantee",
        )?;

        let rows = stmt.query_map(params![grantor], grant_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_grants_on(&self, collection: &str) -> Result<Vec<CollectionGrant>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT collection, grantee, grantor, privileges, granted_at
             FROM collection_grants WHERE collection = ?1 ORDER BY grantee",
        )?;

        let rows = stmt.query_map(params![collection], grant_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn rename_collection_grants(&self, old: &str, new: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE collection_grants SET collection = ?1 WHERE collection = ?2",
            params![new, old],
        )?;
        Ok(())
    }

    // Managed secondary indexes

    fn register_index(&self, index: &CollectionIndex) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO collection_indexes (collection, property, index_name, kind)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                index.collection,
                index.property,
                index.index_name,
                index.kind.as_str(),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(Error::already_exists(format!("index {}", index.index_name)))
            }
            Err(e) => Err(Error::from(e)),
        }
    }

    fn unregister_index(
        &self,
        collection: &str,
        property: &str,
    ) -> Result<Option<CollectionIndex>> {
        let conn = self.conn();
        let index = conn
            .query_row(
                "SELECT collection, property, index_name, kind
                 FROM collection_indexes WHERE collection = ?1 AND property = ?2",
                params![collection, property],
                index_from_row,
            )
            .optional()?;

        if index.is_some() {
            conn.execute(
                "DELETE FROM collection_indexes WHERE collection = ?1 AND property = ?2",
                params![collection, property],
            )?;
        }
        Ok(index)
    }

    fn list_indexes_for(&self, collection: &str) -> Result<Vec<CollectionIndex>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT collection, property, index_name, kind
             FROM collection_indexes WHERE collection = ?1 ORDER BY property",
        )?;

        let rows = stmt.query_map(params![collection], index_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn rename_index_collection(&self, old: &str, new: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE collection_indexes SET collection = ?1 WHERE collection = ?2",
            params![new, old],
        )?;
        Ok(())
    }

    // Token operations

    fn create_token(&self, token: &Token) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO tokens (id, token_hash, token_lookup, is_admin, principal, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                token.id,
                token.token_hash,
                token.token_lookup,
                token.is_admin,
                token.principal,
                format_datetime(&token.created_at),
                token.expires_at.as_ref().map(format_datetime),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(Error::TokenLookupCollision)
            }
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, token_hash, token_lookup, is_admin, principal, created_at, expires_at, last_used_at
             FROM tokens WHERE token_lookup = ?1",
            params![lookup],
            |row| {
                Ok(Token {
                    id: row.get(0)?,
                    token_hash: row.get(1)?,
                    token_lookup: row.get(2)?,
                    is_admin: row.get(3)?,
                    principal: row.get(4)?,
                    created_at: parse_datetime(&row.get::<_, String>(5)?),
                    expires_at: row.get::<_, Option<String>>(6)?.map(|s| parse_datetime(&s)),
                    last_used_at: row.get::<_, Option<String>>(7)?.map(|s| parse_datetime(&s)),
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    fn update_token_last_used(&self, id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE tokens SET last_used_at = ?1 WHERE id = ?2",
            params![format_datetime(&Utc::now()), id],
        )?;
        Ok(())
    }

    fn has_admin_token(&self) -> Result<bool> {
        let conn = self.conn();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM tokens WHERE is_admin = 1", [], |row| {
            row.get(0)
        })?;
        Ok(count > 0)
    }

    // Event log

    fn append_event(&self, event_type: &str, message: &str, username: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO eventlog (event_type, message, username) VALUES (?1, ?2, ?3)",
            params![event_type, message, username],
        )?;
        Ok(())
    }

    fn list_events(
        &self,
        event_type: Option<&str>,
        message_like: Option<&str>,
    ) -> Result<Vec<EventRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT event_type, message, username, date FROM eventlog
             WHERE event_type LIKE ?1 AND message LIKE ?2
             ORDER BY rowid",
        )?;

        let type_pattern = event_type.unwrap_or("%");
        let message_pattern = message_like
            .map(|m| format!("%{m}%"))
            .unwrap_or_else(|| "%".to_string());

        let rows = stmt.query_map(params![type_pattern, message_pattern], |row| {
            Ok(EventRecord {
                event_type: row.get(0)?,
                message: row.get(1)?,
                username: row.get(2)?,
                date: parse_datetime(&row.get::<_, String>(3)?),
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn version(&self) -> Result<String> {
        let conn = self.conn();
        conn.query_row("SELECT version FROM version_info LIMIT 1", [], |row| {
            row.get(0)
        })
        .map_err(Error::from)
    }

    fn list_physical_tables(&self) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut index_tables = std::collections::HashSet::new();
        let mut idx_stmt =
            conn.prepare("SELECT index_name FROM collection_indexes WHERE kind = 'spatial'")?;
        for name in idx_stmt.query_map([], |row| row.get::<_, String>(0))? {
            index_tables.insert(name?);
        }

        // R*Tree virtual tables materialize shadow tables alongside themselves
        Ok(names
            .into_iter()
            .filter(|n| !BOOKKEEPING_TABLES.contains(&n.as_str()))
            .filter(|n| {
                !index_tables.iter().any(|idx| {
                    n == idx
                        || *n == format!("{idx}_node")
                        || *n == format!("{idx}_rowid")
                        || *n == format!("{idx}_parent")
                })
            })
            .collect())
    }

    fn table_exists(&self, name: &str) -> Result<bool> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

fn grant_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CollectionGrant> {
    Ok(CollectionGrant {
        collection: row.get(0)?,
        grantee: row.get(1)?,
        grantor: row.get(2)?,
        privileges: Privilege::parse(&row.get::<_, String>(3)?).unwrap_or(Privilege::Read),
        granted_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

fn index_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CollectionIndex> {
    Ok(CollectionIndex {
        collection: row.get(0)?,
        property: row.get(1)?,
        index_name: row.get(2)?,
        kind: IndexKind::parse(&row.get::<_, String>(3)?).unwrap_or(IndexKind::Standard),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, SqliteStore) {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        (temp, store)
    }

    #[test]
    fn test_initialize_creates_tables() {
        let (_temp, store) = open_store();

        let conn = store.conn();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for expected in BOOKKEEPING_TABLES {
            assert!(tables.contains(&expected.to_string()), "missing {expected}");
        }
    }

    #[test]
    fn test_database_registry_uniqueness() {
        let (_temp, store) = open_store();

        store.insert_database("geo", "alice").unwrap();
        store.insert_database("geo", "surveyors").unwrap();

        let result = store.insert_database("geo", "alice");
        assert!(matches!(result, Err(Error::AlreadyExists { .. })));

        assert!(store.database_exists_any("geo").unwrap());
        assert!(store.database_exists_for("geo", "alice").unwrap());
        assert!(!store.database_exists_for("geo", "bob").unwrap());

        assert!(store.delete_database("geo", "alice").unwrap());
        assert!(!store.delete_database("geo", "alice").unwrap());
    }

    #[test]
    fn test_owns_matching_database_prefix() {
        let (_temp, store) = open_store();

        store.insert_database("alice", "alice").unwrap();
        assert!(store.owns_matching_database("alice_parcels", "alice").unwrap());
        assert!(!store.owns_matching_database("bob_parcels", "alice").unwrap());
        // the bare database name without a suffix does not match
        assert!(!store.owns_matching_database("alice", "alice").unwrap());
    }

    #[test]
    fn test_version_written_once() {
        let (_temp, store) = open_store();
        store.initialize().unwrap();

        assert_eq!(store.version().unwrap(), env!("CARGO_PKG_VERSION"));

        let conn = store.conn();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM version_info", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_event_log_filters() {
        let (_temp, store) = open_store();

        store
            .append_event("CREATED", "created db_col", "thomas")
            .unwrap();
        store
            .append_event("ROWS_ADDED", "added rows to other_col", "wahnfried")
            .unwrap();

        let all = store.list_events(None, None).unwrap();
        assert_eq!(all.len(), 2);

        let created = store.list_events(Some("CREATED"), None).unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].username, "thomas");

        let by_message = store.list_events(None, Some("other_col")).unwrap();
        assert_eq!(by_message.len(), 1);
        assert_eq!(by_message[0].event_type, "ROWS_ADDED");
    }
}
