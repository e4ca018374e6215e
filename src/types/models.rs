use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered logical database: a namespace of collections owned by one
/// principal. Names are unique per owner in storage; creation additionally
/// enforces global name exclusivity (see `catalog::ownership`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Database {
    pub name: String,
    pub owner: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalKind {
    /// Can log in and own namespaces.
    User,
    /// Cannot log in; exists purely as an authorization aggregation point.
    Group,
}

impl PrincipalKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PrincipalKind::User => "user",
            PrincipalKind::Group => "group",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(PrincipalKind::User),
            "group" => Some(PrincipalKind::Group),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub name: String,
    pub kind: PrincipalKind,
    #[serde(skip)]
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    #[serde(skip)]
    pub token_hash: String,
    #[serde(skip)]
    pub token_lookup: String,
    pub is_admin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Privileges a grant confers on a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privilege {
    /// SELECT plus usage of the identifier sequence.
    Read,
    /// Full privileges, used for project-style group sharing.
    All,
}

impl Privilege {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Privilege::Read => "read",
            Privilege::All => "all",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "read" => Some(Privilege::Read),
            "all" => Some(Privilege::All),
            _ => None,
        }
    }
}

/// Grantee name for world-readable grants.
pub const PUBLIC_GRANTEE: &str = "public";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionGrant {
    pub collection: String,
    pub grantee: String,
    pub grantor: String,
    pub privileges: Privilege,
    pub granted_at: DateTime<Utc>,
}

/// CRS and ownership metadata for a managed collection table. The analog of
/// the PostGIS `geometry_columns` bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionRecord {
    pub name: String,
    pub srid: i32,
    pub owner: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Standard,
    Spatial,
}

impl IndexKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            IndexKind::Standard => "standard",
            IndexKind::Spatial => "spatial",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "standard" => Some(IndexKind::Standard),
            "spatial" => Some(IndexKind::Spatial),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionIndex {
    pub collection: String,
    pub property: String,
    pub index_name: String,
    pub kind: IndexKind,
}

/// One row of the collection enumeration projection: a physical table matched
/// to its registered database by longest-prefix policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub owner: String,
    pub database: String,
    /// Short name, the physical name with the database prefix stripped.
    pub collection: String,
    /// Full physical table name.
    pub table: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Created,
    Read,
    Updated,
    Deleted,
    Dropped,
    Copied,
    Renamed,
    Published,
    Unpublished,
    RowsAdded,
    RowsDropped,
}

impl EventType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Created => "CREATED",
            EventType::Read => "READ",
            EventType::Updated => "UPDATED",
            EventType::Deleted => "DELETED",
            EventType::Dropped => "DROPPED",
            EventType::Copied => "COPIED",
            EventType::Renamed => "RENAMED",
            EventType::Published => "PUBLISHED",
            EventType::Unpublished => "UNPUBLISHED",
            EventType::RowsAdded => "ROWS_ADDED",
            EventType::RowsDropped => "ROWS_DROPPED",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_type: String,
    pub message: String,
    pub username: String,
    pub date: DateTime<Utc>,
}

/// Storage usage for one collection table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionUsage {
    pub table: String,
    pub bytes: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pretty: Option<String>,
}

/// The acting identity for a request, resolved by the auth layer from the
/// session token before any operation runs.
#[derive(Debug, Clone)]
pub struct Session {
    pub principal: String,
    pub is_admin: bool,
}

impl Session {
    #[must_use]
    pub fn user(principal: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            is_admin: false,
        }
    }

    #[must_use]
    pub fn admin(principal: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            is_admin: true,
        }
    }

    /// The resolved name of the acting principal.
    #[must_use]
    pub fn whoami(&self) -> &str {
        &self.principal
    }
}

/// Column description returned by property introspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyInfo {
    pub name: String,
    pub data_type: String,
}
