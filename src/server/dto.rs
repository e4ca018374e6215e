use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::catalog::CollectionSpec;

fn default_crs() -> i32 {
    4326
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CreateDatabaseRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateCollectionRequest {
    pub collection: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default = "default_crs")]
    pub crs: i32,
}

#[derive(Debug, Deserialize)]
pub struct CreateCollectionsRequest {
    pub collections: BTreeMap<String, CollectionSpec>,
}

#[derive(Debug, Deserialize)]
pub struct DropCollectionsRequest {
    pub collections: Vec<String>,
    #[serde(default = "default_true")]
    pub cascade: bool,
}

#[derive(Debug, Deserialize)]
pub struct PropertiesRequest {
    pub collection: String,
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct DropPropertiesRequest {
    pub collection: String,
    pub properties: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CollectionRequest {
    pub collection: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameCollectionRequest {
    pub collection: String,
    pub new_name: String,
}

#[derive(Debug, Deserialize)]
pub struct CopyCollectionRequest {
    pub collection: String,
    pub destination: String,
}

#[derive(Debug, Deserialize)]
pub struct IndexRequest {
    pub collection: String,
    pub property: String,
}

#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    pub collection: String,
    pub grantee: String,
}

#[derive(Debug, Deserialize)]
pub struct GroupCollectionRequest {
    pub collection: String,
    pub group: String,
}

#[derive(Debug, Deserialize)]
pub struct GroupDatabaseRequest {
    pub database: String,
    pub group: String,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseFilterRequest {
    #[serde(default)]
    pub database: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FilterRequest {
    pub collection: String,
    #[serde(default)]
    pub select: Option<String>,
    #[serde(default, rename = "where")]
    pub where_clause: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub order: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct BboxRequest {
    pub collection: String,
    pub minx: f64,
    pub miny: f64,
    pub maxx: f64,
    pub maxy: f64,
    pub comparison_mode: String,
    #[serde(default = "default_crs")]
    pub bbox_crs: i32,
    #[serde(default, rename = "where")]
    pub where_clause: Option<String>,
    #[serde(default)]
    pub op: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct NearestRequest {
    pub collection: String,
    pub x: f64,
    pub y: f64,
    #[serde(default = "default_crs")]
    pub point_crs: i32,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct GeometryTypesRequest {
    pub collection: String,
    #[serde(default = "default_true")]
    pub aggregate: bool,
}

#[derive(Debug, Deserialize)]
pub struct InsertRowsRequest {
    pub collection: String,
    pub rows: Vec<JsonValue>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRowsRequest {
    pub collection: String,
    pub values: serde_json::Map<String, JsonValue>,
    #[serde(rename = "where")]
    pub where_clause: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRowsRequest {
    pub collection: String,
    #[serde(rename = "where")]
    pub where_clause: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterUserRequest {
    pub name: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct GroupMemberRequest {
    pub group: String,
    pub user: String,
}

#[derive(Debug, Deserialize)]
pub struct GroupRequest {
    pub group: String,
}

#[derive(Debug, Deserialize)]
pub struct UsageRequest {
    #[serde(default = "default_true")]
    pub pretty: bool,
}

#[derive(Debug, Deserialize)]
pub struct LogEventRequest {
    pub event_type: String,
    pub message: String,
    #[serde(default)]
    pub user: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EventlogRequest {
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub collection: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTokenRequest {
    #[serde(default)]
    pub principal: Option<String>,
    #[serde(default)]
    pub expires_in_seconds: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CreateTokenResponse {
    pub token: String,
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct GrantRow {
    pub collection: String,
    pub grantee: String,
}

#[derive(Debug, Serialize)]
pub struct AccessRightRow {
    pub grantee: String,
    pub privileges: String,
}

#[derive(Debug, Serialize)]
pub struct BboxResponse {
    pub minx: f64,
    pub miny: f64,
    pub maxx: f64,
    pub maxy: f64,
}
