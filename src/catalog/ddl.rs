//! Identifier validation and DDL synthesis.
//!
//! Every piece of generated DDL flows through [`quote_ident`] over
//! identifiers checked by [`validate_ident`]; no call site concatenates
//! user-supplied names into SQL on its own. Property type expressions are
//! validated against the [`PropertyType`] allow-list instead of being passed
//! through to the engine verbatim.

use crate::error::{Error, Result};

/// Identifier length ceiling, matching the conventional 63-character limit
/// of the namespace registry's original host engine. Index names are
/// truncated to fit (see [`index_name`]).
pub const MAX_IDENT_LEN: usize = 63;

/// Collection names may be longer than plain identifiers since they carry a
/// database prefix.
pub const MAX_COLLECTION_NAME_LEN: usize = 128;

/// Columns present on every collection; they cannot be added or dropped as
/// properties.
pub const FIXED_COLUMNS: &[&str] = &["id", "created_at", "modified_at", "geometry"];

fn is_valid_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn validate_name(name: &str, entity: &str, max_len: usize) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_argument(format!(
            "{entity} name cannot be empty"
        )));
    }
    if name.len() > max_len {
        return Err(Error::invalid_argument(format!(
            "{entity} name cannot exceed {max_len} characters"
        )));
    }
    if !name.chars().all(is_valid_ident_char) {
        return Err(Error::invalid_argument(format!(
            "{entity} name can only contain alphanumeric characters, hyphens, and underscores"
        )));
    }
    Ok(())
}

pub fn validate_collection_name(name: &str) -> Result<()> {
    validate_name(name, "collection", MAX_COLLECTION_NAME_LEN)
}

pub fn validate_database_name(name: &str) -> Result<()> {
    validate_name(name, "database", MAX_IDENT_LEN)
}

pub fn validate_property_name(name: &str) -> Result<()> {
    validate_name(name, "property", MAX_IDENT_LEN)
}

/// Quotes an identifier for interpolation into generated SQL. Validation has
/// already rejected quote characters; the doubling is kept so the invariant
/// does not depend on the call order.
#[must_use]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// The enumerated set of permitted scalar property types. Type expressions
/// are matched case-insensitively against the names the original host engine
/// accepted; anything else is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    Integer,
    Bigint,
    Float,
    Text,
    Boolean,
    Date,
    Timestamp,
    Json,
}

impl PropertyType {
    pub fn parse(expr: &str) -> Result<Self> {
        match expr.trim().to_ascii_lowercase().as_str() {
            "int" | "integer" | "int4" | "serial" => Ok(PropertyType::Integer),
            "bigint" | "int8" => Ok(PropertyType::Bigint),
            "float" | "real" | "double" | "double precision" | "numeric" | "float8" => {
                Ok(PropertyType::Float)
            }
            "text" | "varchar" | "string" | "character varying" => Ok(PropertyType::Text),
            "bool" | "boolean" => Ok(PropertyType::Boolean),
            "date" => Ok(PropertyType::Date),
            "timestamp" | "timestamptz" | "datetime" => Ok(PropertyType::Timestamp),
            "json" | "jsonb" => Ok(PropertyType::Json),
            other => Err(Error::invalid_argument(format!(
                "unsupported property type '{other}'"
            ))),
        }
    }

    /// Storage affinity for the physical column.
    #[must_use]
    pub fn sql(self) -> &'static str {
        match self {
            PropertyType::Integer | PropertyType::Bigint => "INTEGER",
            PropertyType::Float => "REAL",
            PropertyType::Boolean => "INTEGER",
            PropertyType::Text
            | PropertyType::Date
            | PropertyType::Timestamp
            | PropertyType::Json => "TEXT",
        }
    }
}

/// Synthesizes the deterministic name for a secondary index on
/// `(collection, property)`.
///
/// The composed name is `idx_<property>_<collection>`; when it exceeds
/// [`MAX_IDENT_LEN`] the collection component is shortened from the front one
/// character at a time until the name fits. Identical inputs always produce
/// identical output, so repeated create/drop cycles resolve the same name.
#[must_use]
pub fn index_name(collection: &str, property: &str) -> String {
    let mut collection_part = collection;
    loop {
        let name = format!("idx_{property}_{collection_part}");
        if name.len() <= MAX_IDENT_LEN || collection_part.is_empty() {
            return name;
        }
        let mut chars = collection_part.chars();
        chars.next();
        collection_part = chars.as_str();
    }
}

/// Name of the trigger that stamps `modified_at` on updates.
#[must_use]
pub fn trigger_name(collection: &str) -> String {
    format!("{collection}_modtime")
}

/// CREATE TABLE statement for a new collection with the fixed column set.
#[must_use]
pub fn create_collection_sql(collection: &str) -> String {
    format!(
        "CREATE TABLE {} (\n\
         \x20   id INTEGER PRIMARY KEY AUTOINCREMENT,\n\
         \x20   created_at TEXT NOT NULL DEFAULT (datetime('now')),\n\
         \x20   modified_at TEXT,\n\
         \x20   geometry TEXT NOT NULL\n\
         )",
        quote_ident(collection)
    )
}

/// CREATE TRIGGER statement stamping the modification timestamp on every
/// update.
#[must_use]
pub fn create_trigger_sql(collection: &str) -> String {
    let table = quote_ident(collection);
    format!(
        "CREATE TRIGGER {} AFTER UPDATE ON {table} FOR EACH ROW \
         BEGIN UPDATE {table} SET modified_at = datetime('now') WHERE id = NEW.id; END",
        quote_ident(&trigger_name(collection))
    )
}

/// Maps an engine-level DDL failure onto the error taxonomy: duplicate
/// objects surface as `AlreadyExists`, missing ones as `NotFound`.
pub fn map_ddl_error(target: &str, err: rusqlite::Error) -> Error {
    let message = err.to_string();
    if message.contains("already exists") {
        Error::already_exists(target.to_string())
    } else if message.contains("no such table") || message.contains("no such index") {
        Error::not_found(target.to_string())
    } else {
        Error::Database(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_delimiters() {
        assert!(validate_collection_name("alice_parcels").is_ok());
        assert!(validate_collection_name("geodb_user-with-hyphens_test").is_ok());
        assert!(validate_collection_name("bad\"name").is_err());
        assert!(validate_collection_name("bad;drop").is_err());
        assert!(validate_collection_name("bad name").is_err());
        assert!(validate_collection_name("").is_err());
    }

    #[test]
    fn test_quote_ident_doubles_quotes() {
        assert_eq!(quote_ident("plain"), "\"plain\"");
        assert_eq!(quote_ident("with\"quote"), "\"with\"\"quote\"");
    }

    #[test]
    fn test_property_type_allow_list() {
        assert_eq!(PropertyType::parse("integer").unwrap().sql(), "INTEGER");
        assert_eq!(PropertyType::parse("FLOAT").unwrap().sql(), "REAL");
        assert_eq!(PropertyType::parse("varchar").unwrap().sql(), "TEXT");
        assert!(matches!(
            PropertyType::parse("blob; DROP TABLE x"),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_index_name_deterministic() {
        let a = index_name("alice_parcels", "area");
        let b = index_name("alice_parcels", "area");
        assert_eq!(a, b);
        assert_eq!(a, "idx_area_alice_parcels");
    }

    #[test]
    fn test_index_name_respects_length_ceiling() {
        let collection = "a".repeat(100);
        let name = index_name(&collection, "geometry");
        assert!(name.len() <= MAX_IDENT_LEN);
        assert_eq!(name, index_name(&collection, "geometry"));
        // the property component is preserved in full
        assert!(name.starts_with("idx_geometry_"));
    }

    #[test]
    fn test_index_name_front_truncates_collection() {
        let collection = format!("{}_tail", "x".repeat(60));
        let name = index_name(&collection, "p");
        assert_eq!(name.len(), MAX_IDENT_LEN);
        // the tail of the collection name survives, the front is cut
        assert!(name.ends_with("_tail"));
        assert!(name.starts_with("idx_p_"));
    }
}
