//! Read-only storage usage and collection introspection, scoped to the
//! caller's own identity. Cross-principal visibility requires the
//! administrative capability and is not offered here.

use crate::catalog::ownership;
use crate::error::{Error, Result};
use crate::store::{SqliteStore, Store};
use crate::types::{CollectionInfo, CollectionUsage, Session};

/// Bytes used by one table, read from the dbstat virtual table. Builds
/// without dbstat fall back to the summed payload length of the geometry
/// column, which dominates storage for feature tables.
fn table_bytes(store: &SqliteStore, table: &str) -> Result<i64> {
    let conn = store.connection();
    match conn.query_row(
        "SELECT COALESCE(SUM(pgsize), 0) FROM dbstat WHERE name = ?1",
        [table],
        |row| row.get::<_, i64>(0),
    ) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.to_string().contains("no such table") => {
            tracing::warn!("dbstat unavailable, estimating size of {} from payload", table);
            let sql = format!(
                "SELECT COALESCE(SUM(LENGTH(geometry)), 0) FROM {}",
                crate::catalog::ddl::quote_ident(table)
            );
            match conn.query_row(&sql, [], |row| row.get(0)) {
                Ok(bytes) => Ok(bytes),
                Err(e) if e.to_string().contains("no such column") => Ok(0),
                Err(e) => Err(Error::Database(e)),
            }
        }
        Err(e) => Err(Error::Database(e)),
    }
}

#[must_use]
pub fn pretty_bytes(bytes: i64) -> String {
    const UNITS: &[&str] = &["B", "kB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// Storage used by the tables under the caller's identity prefix. Scoping is
/// by name-prefix match against the caller's own name only.
pub fn get_my_usage(
    store: &SqliteStore,
    session: &Session,
    pretty: bool,
) -> Result<Vec<CollectionUsage>> {
    let prefix = format!("{}_", session.whoami());
    let mut usage = Vec::new();
    for table in store.list_physical_tables()? {
        if !table.starts_with(&prefix) {
            continue;
        }
        let bytes = table_bytes(store, &table)?;
        usage.push(CollectionUsage {
            table,
            bytes,
            pretty: pretty.then(|| pretty_bytes(bytes)),
        });
    }
    Ok(usage)
}

/// Total bytes across the caller's tables.
pub fn get_my_usage_total(store: &SqliteStore, session: &Session) -> Result<i64> {
    Ok(get_my_usage(store, session, false)?
        .iter()
        .map(|u| u.bytes)
        .sum())
}

/// The collections the caller can manage, grouped under their databases.
pub fn get_my_collections(
    store: &SqliteStore,
    session: &Session,
    database: Option<&str>,
) -> Result<Vec<CollectionInfo>> {
    ownership::list_collections_for(store, session.whoami(), database)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pretty_bytes_units() {
        assert_eq!(pretty_bytes(0), "0 B");
        assert_eq!(pretty_bytes(512), "512 B");
        assert_eq!(pretty_bytes(2048), "2.0 kB");
        assert_eq!(pretty_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
