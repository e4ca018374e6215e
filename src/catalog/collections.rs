//! Collection lifecycle: creation, schema evolution, rename/copy, drop, and
//! secondary indexes.
//!
//! These operations synthesize DDL at runtime for names that are not known at
//! compile time; everything goes through the `ddl` choke point.

use std::collections::BTreeMap;

use geo::BoundingRect;
use serde::Deserialize;

use crate::catalog::ddl::{self, quote_ident};
use crate::catalog::ownership;
use crate::error::{Error, Result};
use crate::query::geometry::parse_wkt;
use crate::store::{SqliteStore, Store};
use crate::types::{CollectionIndex, IndexKind, PropertyInfo, Session};

/// Per-entry specification for batch creation.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionSpec {
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    pub crs: i32,
}

/// Creates a collection table with the fixed column set, installs the
/// modification trigger, applies the requested properties, and records the
/// caller as physical owner.
///
/// The caller must be allowed to act on `name` through the ownership
/// registry; otherwise the operation fails with `PermissionDenied` before
/// any DDL runs.
pub fn create_collection(
    store: &SqliteStore,
    session: &Session,
    name: &str,
    properties: &BTreeMap<String, String>,
    crs: i32,
) -> Result<()> {
    ddl::validate_collection_name(name)?;
    ownership::require_allowed(store, name, session)?;

    // validate the whole property map before touching the schema
    let mut columns: Vec<(String, ddl::PropertyType)> = Vec::new();
    for (property, type_expr) in properties {
        let column = property.to_lowercase();
        ddl::validate_property_name(&column)?;
        if ddl::FIXED_COLUMNS.contains(&column.as_str()) {
            return Err(Error::invalid_argument(format!(
                "property '{column}' collides with a fixed column"
            )));
        }
        columns.push((column, ddl::PropertyType::parse(type_expr)?));
    }

    {
        let conn = store.connection();
        conn.execute(&ddl::create_collection_sql(name), [])
            .map_err(|e| ddl::map_ddl_error(&format!("collection {name}"), e))?;
        conn.execute(&ddl::create_trigger_sql(name), [])
            .map_err(|e| ddl::map_ddl_error(&format!("collection {name}"), e))?;

        for (column, property_type) in &columns {
            conn.execute(
                &format!(
                    "ALTER TABLE {} ADD COLUMN {} {}",
                    quote_ident(name),
                    quote_ident(column),
                    property_type.sql()
                ),
                [],
            )
            .map_err(|e| ddl::map_ddl_error(&format!("property {column}"), e))?;
        }
    }

    store.register_collection(name, crs, session.whoami())?;
    tracing::info!("collection {} created by {}", name, session.whoami());
    Ok(())
}

/// Creates each entry of the batch in turn. There is deliberately no outer
/// transaction across entries: a failure partway through leaves the earlier
/// entries created, and the error names the entry that failed.
pub fn create_collections(
    store: &SqliteStore,
    session: &Session,
    batch: &BTreeMap<String, CollectionSpec>,
) -> Result<()> {
    for (name, spec) in batch {
        create_collection(store, session, name, &spec.properties, spec.crs)?;
    }
    Ok(())
}

/// Drops each named collection table together with its trigger, bookkeeping,
/// and grants. With `cascade` the managed spatial index tables are dropped
/// too; without it their presence is an error.
pub fn drop_collections(
    store: &SqliteStore,
    session: &Session,
    names: &[String],
    cascade: bool,
) -> Result<()> {
    for name in names {
        ddl::validate_collection_name(name)?;
        ownership::require_allowed(store, name, session)?;

        let indexes = store.list_indexes_for(name)?;
        let spatial: Vec<&CollectionIndex> = indexes
            .iter()
            .filter(|i| i.kind == IndexKind::Spatial)
            .collect();
        if !cascade && !spatial.is_empty() {
            return Err(Error::invalid_argument(format!(
                "collection {name} has dependent spatial indexes; drop with cascade"
            )));
        }

        {
            let conn = store.connection();
            for index in &spatial {
                conn.execute(
                    &format!("DROP TABLE IF EXISTS {}", quote_ident(&index.index_name)),
                    [],
                )?;
            }
            conn.execute(&format!("DROP TABLE {}", quote_ident(name)), [])
                .map_err(|e| ddl::map_ddl_error(&format!("collection {name}"), e))?;
        }

        for index in indexes {
            store.unregister_index(&index.collection, &index.property)?;
        }
        store.unregister_collection(name)?;
        store.delete_grants_for_collection(name)?;
        tracing::info!("collection {} dropped by {}", name, session.whoami());
    }
    Ok(())
}

/// Requires that the caller is the recorded physical owner of `collection`.
/// Schema evolution is gated at this level only; the namespace-level
/// ownership check ran once at creation time.
fn require_table_owner(store: &dyn Store, session: &Session, collection: &str) -> Result<()> {
    let record = store
        .get_collection_record(collection)?
        .ok_or_else(|| Error::not_found(format!("collection {collection}")))?;
    if record.owner != session.whoami() {
        return Err(Error::permission_denied(session.whoami(), collection));
    }
    Ok(())
}

/// Adds one column per property, names case-folded to lowercase.
pub fn add_properties(
    store: &SqliteStore,
    session: &Session,
    collection: &str,
    properties: &BTreeMap<String, String>,
) -> Result<()> {
    ddl::validate_collection_name(collection)?;
    require_table_owner(store, session, collection)?;

    for (property, type_expr) in properties {
        let column = property.to_lowercase();
        ddl::validate_property_name(&column)?;
        if ddl::FIXED_COLUMNS.contains(&column.as_str()) {
            return Err(Error::invalid_argument(format!(
                "property '{column}' collides with a fixed column"
            )));
        }
        let property_type = ddl::PropertyType::parse(type_expr)?;

        store
            .connection()
            .execute(
                &format!(
                    "ALTER TABLE {} ADD COLUMN {} {}",
                    quote_ident(collection),
                    quote_ident(&column),
                    property_type.sql()
                ),
                [],
            )
            .map_err(|e| ddl::map_ddl_error(&format!("property {column}"), e))?;
    }
    Ok(())
}

/// Drops the given property columns. The fixed columns are protected.
pub fn drop_properties(
    store: &SqliteStore,
    session: &Session,
    collection: &str,
    properties: &[String],
) -> Result<()> {
    ddl::validate_collection_name(collection)?;
    require_table_owner(store, session, collection)?;

    for property in properties {
        let column = property.to_lowercase();
        ddl::validate_property_name(&column)?;
        if ddl::FIXED_COLUMNS.contains(&column.as_str()) {
            return Err(Error::invalid_argument(format!(
                "column '{column}' is fixed and cannot be dropped"
            )));
        }

        store
            .connection()
            .execute(
                &format!(
                    "ALTER TABLE {} DROP COLUMN {}",
                    quote_ident(collection),
                    quote_ident(&column)
                ),
                [],
            )
            .map_err(|e| ddl::map_ddl_error(&format!("property {column}"), e))?;
    }
    Ok(())
}

/// Lists the columns of a collection table.
pub fn get_properties(store: &SqliteStore, collection: &str) -> Result<Vec<PropertyInfo>> {
    ddl::validate_collection_name(collection)?;
    if !store.table_exists(collection)? {
        return Err(Error::not_found(format!("collection {collection}")));
    }

    let conn = store.connection();
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(collection)))?;
    let rows = stmt.query_map([], |row| {
        Ok(PropertyInfo {
            name: row.get(1)?,
            data_type: row.get(2)?,
        })
    })?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

/// Renames a collection. Permission is checked against the *destination*
/// name, so a rename can donate a collection into any namespace the caller
/// owns, regardless of who owns the source namespace.
pub fn rename_collection(
    store: &SqliteStore,
    session: &Session,
    collection: &str,
    new_name: &str,
) -> Result<()> {
    ddl::validate_collection_name(collection)?;
    ddl::validate_collection_name(new_name)?;
    ownership::require_allowed(store, new_name, session)?;

    {
        let conn = store.connection();
        conn.execute(
            &format!(
                "DROP TRIGGER IF EXISTS {}",
                quote_ident(&ddl::trigger_name(collection))
            ),
            [],
        )?;
        conn.execute(
            &format!(
                "ALTER TABLE {} RENAME TO {}",
                quote_ident(collection),
                quote_ident(new_name)
            ),
            [],
        )
        .map_err(|e| ddl::map_ddl_error(&format!("collection {collection}"), e))?;
        conn.execute(&ddl::create_trigger_sql(new_name), [])?;
    }

    store.rename_collection_record(collection, new_name)?;
    store.rename_collection_grants(collection, new_name)?;
    store.rename_index_collection(collection, new_name)?;
    tracing::info!(
        "collection {} renamed to {} by {}",
        collection,
        new_name,
        session.whoami()
    );
    Ok(())
}

/// Copies a collection into `destination`: structure, secondary indexes,
/// modification trigger, and all rows. The same destination-side permission
/// rule as [`rename_collection`] applies.
pub fn copy_collection(
    store: &SqliteStore,
    session: &Session,
    source: &str,
    destination: &str,
) -> Result<()> {
    ddl::validate_collection_name(source)?;
    ddl::validate_collection_name(destination)?;
    ownership::require_allowed(store, destination, session)?;

    let create_sql: String = {
        let conn = store.connection();
        conn.query_row(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [source],
            |row| row.get(0),
        )
        .map_err(|_| Error::not_found(format!("collection {source}")))?
    };

    let quoted_source = quote_ident(source);
    let quoted_destination = quote_ident(destination);
    let destination_sql = if create_sql.contains(&quoted_source) {
        create_sql.replacen(&quoted_source, &quoted_destination, 1)
    } else {
        create_sql.replacen(source, &quoted_destination, 1)
    };

    {
        let conn = store.connection();
        conn.execute(&destination_sql, [])
            .map_err(|e| ddl::map_ddl_error(&format!("collection {destination}"), e))?;
        conn.execute(&ddl::create_trigger_sql(destination), [])?;
        conn.execute(
            &format!("INSERT INTO {quoted_destination} SELECT * FROM {quoted_source}"),
            [],
        )?;
    }

    let srid = store
        .get_collection_record(source)?
        .map(|r| r.srid)
        .unwrap_or(4326);
    store.register_collection(destination, srid, session.whoami())?;

    // re-create the managed secondary indexes under their own derived names
    for index in store.list_indexes_for(source)? {
        create_index(store, destination, &index.property)?;
    }

    tracing::info!(
        "collection {} copied to {} by {}",
        source,
        destination,
        session.whoami()
    );
    Ok(())
}

/// Creates a secondary index on one property. The `geometry` property gets a
/// spatial R*Tree index populated from the existing rows and kept in sync by
/// the row CRUD path; any other property gets a plain ordered index.
pub fn create_index(store: &SqliteStore, collection: &str, property: &str) -> Result<()> {
    ddl::validate_collection_name(collection)?;
    let column = property.to_lowercase();
    ddl::validate_property_name(&column)?;

    let name = ddl::index_name(collection, &column);
    let kind = if column == "geometry" {
        IndexKind::Spatial
    } else {
        IndexKind::Standard
    };

    {
        let conn = store.connection();
        match kind {
            IndexKind::Spatial => {
                conn.execute(
                    &format!(
                        "CREATE VIRTUAL TABLE {} USING rtree(id, minx, maxx, miny, maxy)",
                        quote_ident(&name)
                    ),
                    [],
                )
                .map_err(|e| ddl::map_ddl_error(&format!("index {name}"), e))?;

                let mut insert = conn.prepare(&format!(
                    "INSERT INTO {} (id, minx, maxx, miny, maxy) VALUES (?1, ?2, ?3, ?4, ?5)",
                    quote_ident(&name)
                ))?;
                let mut rows = conn.prepare(&format!(
                    "SELECT id, geometry FROM {}",
                    quote_ident(collection)
                ))?;
                let mut query = rows.query([])?;
                while let Some(row) = query.next()? {
                    let id: i64 = row.get(0)?;
                    let wkt_text: String = row.get(1)?;
                    let geom = parse_wkt(&wkt_text)?;
                    if let Some(rect) = geom.bounding_rect() {
                        insert.execute(rusqlite::params![
                            id,
                            rect.min().x,
                            rect.max().x,
                            rect.min().y,
                            rect.max().y
                        ])?;
                    }
                }
            }
            IndexKind::Standard => {
                conn.execute(
                    &format!(
                        "CREATE INDEX {} ON {} ({})",
                        quote_ident(&name),
                        quote_ident(collection),
                        quote_ident(&column)
                    ),
                    [],
                )
                .map_err(|e| ddl::map_ddl_error(&format!("index {name}"), e))?;
            }
        }
    }

    store.register_index(&CollectionIndex {
        collection: collection.to_string(),
        property: column,
        index_name: name,
        kind,
    })?;
    Ok(())
}

/// Drops the index on `(collection, property)` resolved through the same
/// deterministic naming as [`create_index`].
pub fn drop_index(store: &SqliteStore, collection: &str, property: &str) -> Result<()> {
    ddl::validate_collection_name(collection)?;
    let column = property.to_lowercase();
    ddl::validate_property_name(&column)?;

    let index = store
        .unregister_index(collection, &column)?
        .ok_or_else(|| Error::not_found(format!("index on {collection}.{column}")))?;

    let conn = store.connection();
    let sql = match index.kind {
        IndexKind::Spatial => format!("DROP TABLE IF EXISTS {}", quote_ident(&index.index_name)),
        IndexKind::Standard => format!("DROP INDEX IF EXISTS {}", quote_ident(&index.index_name)),
    };
    conn.execute(&sql, [])?;
    Ok(())
}

/// All index names attached to the collection, including the engine's
/// automatic primary key index and the managed spatial index tables.
pub fn show_indexes(store: &SqliteStore, collection: &str) -> Result<Vec<String>> {
    ddl::validate_collection_name(collection)?;
    if !store.table_exists(collection)? {
        return Err(Error::not_found(format!("collection {collection}")));
    }

    let mut names: Vec<String> = {
        let conn = store.connection();
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = ?1 ORDER BY name",
        )?;
        let rows = stmt.query_map([collection], |row| row.get::<_, String>(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()?
    };

    for index in store.list_indexes_for(collection)? {
        if index.kind == IndexKind::Spatial {
            names.push(index.index_name);
        }
    }
    names.sort();
    Ok(names)
}
