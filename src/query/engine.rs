//! Dynamic read queries over collection tables.
//!
//! The engine is read-only and never consults ownership; visibility is gated
//! by the access layer before it runs. Every filtering or counting operation
//! treats zero matched rows as a failure (`EmptyResult`), never as a valid
//! empty answer — callers needing may-be-empty semantics catch and suppress
//! that error.

use geo::{BoundingRect, Distance, Euclidean};
use geo_types::{Geometry, Point};
use rusqlite::types::ValueRef;
use serde_json::{Map, Value as JsonValue, json};

use crate::catalog::ddl::{self, quote_ident};
use crate::error::{Error, Result};
use crate::query::geometry::{bbox_geometry, evaluate, geometry_type_tag, parse_wkt};
use crate::store::{SqliteStore, Store};
use crate::types::{CombineOp, ComparisonMode, IndexKind};

/// Always-true filter used when a caller supplies no extra clause, so the
/// bounding-box predicate alone still applies.
const TAUTOLOGY: &str = "1 = 1";

/// Marker column carrying the caller's extra filter result through the
/// bbox scan.
const FILTER_MATCH: &str = "__filter_match";

fn value_to_json(value: ValueRef<'_>) -> JsonValue {
    match value {
        ValueRef::Null => JsonValue::Null,
        ValueRef::Integer(i) => json!(i),
        ValueRef::Real(f) => json!(f),
        ValueRef::Text(t) => json!(String::from_utf8_lossy(t)),
        ValueRef::Blob(b) => json!(String::from_utf8_lossy(b)),
    }
}

fn row_to_json(row: &rusqlite::Row<'_>, columns: &[String]) -> rusqlite::Result<JsonValue> {
    let mut object = Map::new();
    for (i, name) in columns.iter().enumerate() {
        if name == FILTER_MATCH {
            continue;
        }
        object.insert(name.clone(), value_to_json(row.get_ref(i)?));
    }
    Ok(JsonValue::Object(object))
}

fn map_query_error(collection: &str, err: rusqlite::Error) -> Error {
    let message = err.to_string();
    if message.contains("no such table") {
        Error::not_found(format!("collection {collection}"))
    } else {
        Error::Database(err)
    }
}

/// Composes and runs a single SELECT, appending each clause only when
/// provided. Returns the aggregated rows as JSON objects.
#[allow(clippy::too_many_arguments)]
pub fn filter(
    store: &SqliteStore,
    collection: &str,
    select: Option<&str>,
    where_clause: Option<&str>,
    group_by: Option<&str>,
    order_by: Option<&str>,
    limit: Option<i64>,
    offset: Option<i64>,
) -> Result<Vec<JsonValue>> {
    ddl::validate_collection_name(collection)?;

    let mut sql = format!(
        "SELECT {} FROM {}",
        select.unwrap_or("*"),
        quote_ident(collection)
    );
    if let Some(clause) = where_clause {
        sql.push_str(&format!(" WHERE {clause}"));
    }
    if let Some(clause) = group_by {
        sql.push_str(&format!(" GROUP BY {clause}"));
    }
    if let Some(clause) = order_by {
        sql.push_str(&format!(" ORDER BY {clause}"));
    }
    if let Some(n) = limit {
        sql.push_str(&format!(" LIMIT {n}"));
    }
    if let Some(n) = offset {
        sql.push_str(&format!(" OFFSET {n}"));
    }

    let conn = store.connection();
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| map_query_error(collection, e))?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let rows = stmt
        .query_map([], |row| row_to_json(row, &columns))
        .map_err(|e| map_query_error(collection, e))?;
    let rows = rows.collect::<std::result::Result<Vec<_>, _>>()?;

    if rows.is_empty() {
        return Err(Error::EmptyResult);
    }
    Ok(rows)
}

/// Scans the collection evaluating `geometry <mode> rectangle`, combined
/// with the caller's extra filter under `op`. Rows come back ordered by
/// identifier ascending; limit and offset apply after the spatial filter.
#[allow(clippy::too_many_arguments)]
pub fn filter_by_bbox(
    store: &SqliteStore,
    collection: &str,
    bounds: (f64, f64, f64, f64),
    mode: ComparisonMode,
    bbox_crs: i32,
    where_clause: Option<&str>,
    op: CombineOp,
    limit: Option<i64>,
    offset: Option<i64>,
) -> Result<Vec<JsonValue>> {
    let rows = bbox_scan(
        store,
        collection,
        bounds,
        mode,
        bbox_crs,
        where_clause,
        op,
    )?;
    if rows.is_empty() {
        return Err(Error::EmptyResult);
    }

    let offset = offset.unwrap_or(0).max(0) as usize;
    let mut rows: Vec<JsonValue> = rows.into_iter().skip(offset).collect();
    if let Some(n) = limit {
        if n > 0 {
            rows.truncate(n as usize);
        }
    }
    if rows.is_empty() {
        return Err(Error::EmptyResult);
    }
    Ok(rows)
}

/// Same predicate construction as [`filter_by_bbox`], returning the scalar
/// match count; zero matches is an error.
pub fn count_by_bbox(
    store: &SqliteStore,
    collection: &str,
    bounds: (f64, f64, f64, f64),
    mode: ComparisonMode,
    bbox_crs: i32,
    where_clause: Option<&str>,
    op: CombineOp,
) -> Result<i64> {
    let rows = bbox_scan(
        store,
        collection,
        bounds,
        mode,
        bbox_crs,
        where_clause,
        op,
    )?;
    if rows.is_empty() {
        return Err(Error::EmptyResult);
    }
    Ok(rows.len() as i64)
}

#[allow(clippy::too_many_arguments)]
fn bbox_scan(
    store: &SqliteStore,
    collection: &str,
    bounds: (f64, f64, f64, f64),
    mode: ComparisonMode,
    bbox_crs: i32,
    where_clause: Option<&str>,
    op: CombineOp,
) -> Result<Vec<JsonValue>> {
    ddl::validate_collection_name(collection)?;
    check_crs(store, collection, bbox_crs)?;

    let (minx, miny, maxx, maxy) = bounds;
    let rect = bbox_geometry(minx, miny, maxx, maxy);
    let extra = where_clause.unwrap_or(TAUTOLOGY);

    let sql = format!(
        "SELECT *, ({extra}) AS {FILTER_MATCH} FROM {} ORDER BY id ASC",
        quote_ident(collection)
    );

    let conn = store.connection();
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| map_query_error(collection, e))?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let geometry_pos = columns
        .iter()
        .position(|c| c == "geometry")
        .ok_or_else(|| Error::not_found(format!("geometry column on {collection}")))?;
    let filter_pos = columns.len() - 1;

    let mut matched = Vec::new();
    let mut raw = stmt.query([]).map_err(|e| map_query_error(collection, e))?;
    while let Some(row) = raw.next()? {
        let wkt_text: String = row.get(geometry_pos)?;
        let geom = parse_wkt(&wkt_text)?;
        let spatial = evaluate(mode, &geom, &rect);
        // SQL three-valued logic: NULL filter results count as no match
        let extra_match = match row.get_ref(filter_pos)? {
            ValueRef::Integer(i) => i != 0,
            ValueRef::Real(f) => f != 0.0,
            _ => false,
        };

        let keep = match op {
            CombineOp::And => spatial && extra_match,
            CombineOp::Or => spatial || extra_match,
        };
        if keep {
            matched.push(row_to_json(row, &columns)?);
        }
    }
    Ok(matched)
}

fn check_crs(store: &dyn Store, collection: &str, crs: i32) -> Result<()> {
    if let Some(record) = store.get_collection_record(collection)? {
        if record.srid != crs {
            return Err(Error::invalid_argument(format!(
                "crs {crs} does not match collection srid {}; reproject before querying",
                record.srid
            )));
        }
    }
    Ok(())
}

/// Exact row count via a full scan.
pub fn count_collection(store: &SqliteStore, collection: &str) -> Result<i64> {
    ddl::validate_collection_name(collection)?;
    let conn = store.connection();
    conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", quote_ident(collection)),
        [],
        |row| row.get(0),
    )
    .map_err(|e| map_query_error(collection, e))
}

/// Approximate row count from stored statistics, trading accuracy for speed.
/// When the fast statistics are unavailable (the collection has never been
/// analyzed) the estimator falls back to the identifier-sequence high-water
/// mark, which is always non-negative.
pub fn estimate_collection_count(store: &SqliteStore, collection: &str) -> Result<i64> {
    ddl::validate_collection_name(collection)?;
    if !store.table_exists(collection)? {
        return Err(Error::not_found(format!("collection {collection}")));
    }

    let conn = store.connection();

    let stat: Option<String> = match conn.query_row(
        "SELECT stat FROM sqlite_stat1 WHERE tbl = ?1 LIMIT 1",
        [collection],
        |row| row.get(0),
    ) {
        Ok(s) => Some(s),
        Err(rusqlite::Error::QueryReturnedNoRows) => None,
        // sqlite_stat1 only exists after the first ANALYZE anywhere
        Err(e) if e.to_string().contains("no such table") => None,
        Err(e) => return Err(Error::Database(e)),
    };

    if let Some(stat) = stat {
        if let Some(first) = stat.split_whitespace().next() {
            if let Ok(n) = first.parse::<i64>() {
                return Ok(n);
            }
        }
    }

    let seq: Option<i64> = match conn.query_row(
        "SELECT seq FROM sqlite_sequence WHERE name = ?1",
        [collection],
        |row| row.get(0),
    ) {
        Ok(n) => Some(n),
        Err(rusqlite::Error::QueryReturnedNoRows) => None,
        Err(e) if e.to_string().contains("no such table") => None,
        Err(e) => return Err(Error::Database(e)),
    };
    Ok(seq.unwrap_or(0).max(0))
}

/// Rows ordered by euclidean distance from `(x, y)` ascending, each carrying
/// the computed distance and the geometry's readable WKT form.
pub fn nearest(
    store: &SqliteStore,
    collection: &str,
    x: f64,
    y: f64,
    point_crs: i32,
    limit: Option<i64>,
) -> Result<Vec<JsonValue>> {
    ddl::validate_collection_name(collection)?;
    check_crs(store, collection, point_crs)?;

    let origin = Geometry::Point(Point::new(x, y));
    let sql = format!("SELECT * FROM {} ORDER BY id ASC", quote_ident(collection));

    let conn = store.connection();
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| map_query_error(collection, e))?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let geometry_pos = columns
        .iter()
        .position(|c| c == "geometry")
        .ok_or_else(|| Error::not_found(format!("geometry column on {collection}")))?;

    let mut measured: Vec<(f64, JsonValue)> = Vec::new();
    let mut raw = stmt.query([]).map_err(|e| map_query_error(collection, e))?;
    while let Some(row) = raw.next()? {
        let wkt_text: String = row.get(geometry_pos)?;
        let geom = parse_wkt(&wkt_text)?;
        let distance = Euclidean::distance(&origin, &geom);

        let mut object = row_to_json(row, &columns)?;
        if let Some(map) = object.as_object_mut() {
            map.insert("distance".to_string(), json!(distance));
        }
        measured.push((distance, object));
    }

    if measured.is_empty() {
        return Err(Error::EmptyResult);
    }

    measured.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    let mut rows: Vec<JsonValue> = measured.into_iter().map(|(_, row)| row).collect();
    if let Some(n) = limit {
        if n > 0 {
            rows.truncate(n as usize);
        }
    }
    Ok(rows)
}

/// Geometry type tags present in the collection: the full per-row list, or
/// the distinct set when `aggregate` is set.
pub fn geometry_types(
    store: &SqliteStore,
    collection: &str,
    aggregate: bool,
) -> Result<Vec<String>> {
    ddl::validate_collection_name(collection)?;

    let sql = format!(
        "SELECT geometry FROM {} ORDER BY id ASC",
        quote_ident(collection)
    );
    let conn = store.connection();
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| map_query_error(collection, e))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| map_query_error(collection, e))?;

    let mut tags = Vec::new();
    for wkt_text in rows {
        let geom = parse_wkt(&wkt_text?)?;
        tags.push(geometry_type_tag(&geom).to_string());
    }
    if tags.is_empty() {
        return Err(Error::EmptyResult);
    }

    if aggregate {
        tags.sort();
        tags.dedup();
    }
    Ok(tags)
}

/// Exact aggregate bounds over every geometry in the collection, as
/// `(minx, miny, maxx, maxy)`.
pub fn collection_bbox(store: &SqliteStore, collection: &str) -> Result<(f64, f64, f64, f64)> {
    ddl::validate_collection_name(collection)?;

    let sql = format!("SELECT geometry FROM {}", quote_ident(collection));
    let conn = store.connection();
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| map_query_error(collection, e))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| map_query_error(collection, e))?;

    let mut bounds: Option<(f64, f64, f64, f64)> = None;
    for wkt_text in rows {
        let geom = parse_wkt(&wkt_text?)?;
        let Some(rect) = geom.bounding_rect() else {
            continue;
        };
        bounds = Some(match bounds {
            None => (rect.min().x, rect.min().y, rect.max().x, rect.max().y),
            Some((minx, miny, maxx, maxy)) => (
                minx.min(rect.min().x),
                miny.min(rect.min().y),
                maxx.max(rect.max().x),
                maxy.max(rect.max().y),
            ),
        });
    }
    bounds.ok_or(Error::EmptyResult)
}

/// Approximate bounds from the spatial index when one exists, falling back
/// to the exact scan otherwise.
pub fn estimate_collection_bbox(
    store: &SqliteStore,
    collection: &str,
) -> Result<(f64, f64, f64, f64)> {
    let spatial = store
        .list_indexes_for(collection)?
        .into_iter()
        .find(|i| i.kind == IndexKind::Spatial);

    let Some(index) = spatial else {
        return collection_bbox(store, collection);
    };

    let conn = store.connection();
    let bounds: (Option<f64>, Option<f64>, Option<f64>, Option<f64>) = conn.query_row(
        &format!(
            "SELECT MIN(minx), MIN(miny), MAX(maxx), MAX(maxy) FROM {}",
            quote_ident(&index.index_name)
        ),
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
    )?;
    drop(conn);

    match bounds {
        (Some(minx), Some(miny), Some(maxx), Some(maxy)) => Ok((minx, miny, maxx, maxy)),
        _ => collection_bbox(store, collection),
    }
}

/// CRS code recorded for the collection.
pub fn collection_srid(store: &dyn Store, collection: &str) -> Result<i32> {
    store
        .get_collection_record(collection)?
        .map(|r| r.srid)
        .ok_or_else(|| Error::not_found(format!("collection {collection}")))
}
