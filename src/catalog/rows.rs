//! Row-level CRUD over collection tables.
//!
//! Inserts, updates, and deletes run through parameter-bound dynamic SQL
//! built from validated column names, and keep any registered spatial
//! indexes synchronized within the same transaction.

use geo::BoundingRect;
use rusqlite::types::Value as SqlValue;
use serde_json::Value as JsonValue;

use crate::catalog::ddl::{self, quote_ident};
use crate::error::{Error, Result};
use crate::query::geometry::parse_wkt;
use crate::store::{SqliteStore, Store};
use crate::types::IndexKind;

fn bind_value(value: &JsonValue) -> Result<SqlValue> {
    match value {
        JsonValue::Null => Ok(SqlValue::Null),
        JsonValue::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(SqlValue::Integer(i))
            } else if let Some(f) = n.as_f64() {
                Ok(SqlValue::Real(f))
            } else {
                Err(Error::invalid_argument(format!("unbindable number {n}")))
            }
        }
        JsonValue::String(s) => Ok(SqlValue::Text(s.clone())),
        other => Ok(SqlValue::Text(other.to_string())),
    }
}

fn spatial_index_names(store: &dyn Store, collection: &str) -> Result<Vec<String>> {
    Ok(store
        .list_indexes_for(collection)?
        .into_iter()
        .filter(|i| i.kind == IndexKind::Spatial)
        .map(|i| i.index_name)
        .collect())
}

/// Inserts the given rows, each a JSON object of column name to value.
/// Geometry values are WKT and validated before they are bound. Returns the
/// number of rows inserted.
pub fn insert_rows(store: &SqliteStore, collection: &str, rows: &[JsonValue]) -> Result<usize> {
    ddl::validate_collection_name(collection)?;
    let spatial = spatial_index_names(store, collection)?;

    let mut conn = store.connection();
    let tx = conn.transaction()?;
    let mut inserted = 0usize;

    for row in rows {
        let object = row
            .as_object()
            .ok_or_else(|| Error::invalid_argument("row must be a JSON object"))?;

        let mut columns = Vec::with_capacity(object.len());
        let mut values: Vec<SqlValue> = Vec::with_capacity(object.len());
        let mut bbox = None;
        for (column, value) in object {
            let column = column.to_lowercase();
            ddl::validate_property_name(&column)?;
            if column == "geometry" {
                let wkt_text = value
                    .as_str()
                    .ok_or_else(|| Error::invalid_argument("geometry must be a WKT string"))?;
                bbox = parse_wkt(wkt_text)?.bounding_rect();
            }
            columns.push(quote_ident(&column));
            values.push(bind_value(value)?);
        }
        if columns.is_empty() {
            return Err(Error::invalid_argument("row has no columns"));
        }

        let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(collection),
            columns.join(", "),
            placeholders.join(", ")
        );
        tx.execute(&sql, rusqlite::params_from_iter(values.iter()))?;
        let id = tx.last_insert_rowid();

        if let Some(rect) = bbox {
            for index in &spatial {
                tx.execute(
                    &format!(
                        "INSERT INTO {} (id, minx, maxx, miny, maxy) VALUES (?1, ?2, ?3, ?4, ?5)",
                        quote_ident(index)
                    ),
                    rusqlite::params![id, rect.min().x, rect.max().x, rect.min().y, rect.max().y],
                )?;
            }
        }
        inserted += 1;
    }

    tx.commit()?;
    Ok(inserted)
}

/// Updates columns on every row matching `where_clause`. Returns the number
/// of rows touched. When the geometry column changes, the affected entries
/// in registered spatial indexes are rebuilt.
pub fn update_rows(
    store: &SqliteStore,
    collection: &str,
    values: &serde_json::Map<String, JsonValue>,
    where_clause: &str,
) -> Result<usize> {
    ddl::validate_collection_name(collection)?;
    if values.is_empty() {
        return Err(Error::invalid_argument("no columns to update"));
    }
    let spatial = spatial_index_names(store, collection)?;

    let mut assignments = Vec::with_capacity(values.len());
    let mut bound: Vec<SqlValue> = Vec::with_capacity(values.len());
    let mut geometry_changed = false;
    for (i, (column, value)) in values.iter().enumerate() {
        let column = column.to_lowercase();
        ddl::validate_property_name(&column)?;
        if column == "geometry" {
            let wkt_text = value
                .as_str()
                .ok_or_else(|| Error::invalid_argument("geometry must be a WKT string"))?;
            parse_wkt(wkt_text)?;
            geometry_changed = true;
        }
        assignments.push(format!("{} = ?{}", quote_ident(&column), i + 1));
        bound.push(bind_value(value)?);
    }

    let mut conn = store.connection();
    let tx = conn.transaction()?;

    let sql = format!(
        "UPDATE {} SET {} WHERE ({}) RETURNING id",
        quote_ident(collection),
        assignments.join(", "),
        where_clause
    );
    let ids: Vec<i64> = {
        let mut stmt = tx.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(bound.iter()), |row| row.get(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()?
    };

    if geometry_changed && !spatial.is_empty() {
        for id in &ids {
            let wkt_text: String = tx.query_row(
                &format!("SELECT geometry FROM {} WHERE id = ?1", quote_ident(collection)),
                [id],
                |row| row.get(0),
            )?;
            let rect = parse_wkt(&wkt_text)?.bounding_rect();
            for index in &spatial {
                tx.execute(
                    &format!("DELETE FROM {} WHERE id = ?1", quote_ident(index)),
                    [id],
                )?;
                if let Some(rect) = rect {
                    tx.execute(
                        &format!(
                            "INSERT INTO {} (id, minx, maxx, miny, maxy) VALUES (?1, ?2, ?3, ?4, ?5)",
                            quote_ident(index)
                        ),
                        rusqlite::params![
                            id,
                            rect.min().x,
                            rect.max().x,
                            rect.min().y,
                            rect.max().y
                        ],
                    )?;
                }
            }
        }
    }

    tx.commit()?;
    Ok(ids.len())
}

/// Deletes every row matching `where_clause`; returns the number removed.
pub fn delete_rows(store: &SqliteStore, collection: &str, where_clause: &str) -> Result<usize> {
    ddl::validate_collection_name(collection)?;
    let spatial = spatial_index_names(store, collection)?;

    let mut conn = store.connection();
    let tx = conn.transaction()?;

    let sql = format!(
        "DELETE FROM {} WHERE ({}) RETURNING id",
        quote_ident(collection),
        where_clause
    );
    let ids: Vec<i64> = {
        let mut stmt = tx.prepare(&sql)?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()?
    };

    for index in &spatial {
        for id in &ids {
            tx.execute(
                &format!("DELETE FROM {} WHERE id = ?1", quote_ident(index)),
                [id],
            )?;
        }
    }

    tx.commit()?;
    Ok(ids.len())
}
