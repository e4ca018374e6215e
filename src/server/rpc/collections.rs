use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};

use crate::auth::RequireSession;
use crate::catalog::{collections, rows};
use crate::roles;
use crate::server::AppState;
use crate::server::dto::{
    CollectionRequest, CopyCollectionRequest, CreateCollectionRequest, CreateCollectionsRequest,
    DeleteRowsRequest, DropCollectionsRequest, DropPropertiesRequest, IndexRequest,
    InsertRowsRequest, PropertiesRequest, RenameCollectionRequest, UpdateRowsRequest,
};
use crate::server::response::{ApiError, ApiResponse};

pub async fn create_collection(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCollectionRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    roles::require_procedure(store, &auth.session, "create_collection")?;
    collections::create_collection(
        store,
        &auth.session,
        &req.collection,
        &req.properties,
        req.crs,
    )?;
    Ok::<_, ApiError>(Json(ApiResponse::success(())))
}

pub async fn create_collections(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCollectionsRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    roles::require_procedure(store, &auth.session, "create_collections")?;
    collections::create_collections(store, &auth.session, &req.collections)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(())))
}

pub async fn drop_collections(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<DropCollectionsRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    roles::require_procedure(store, &auth.session, "drop_collections")?;
    collections::drop_collections(store, &auth.session, &req.collections, req.cascade)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(())))
}

pub async fn add_properties(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<PropertiesRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    roles::require_procedure(store, &auth.session, "add_properties")?;
    collections::add_properties(store, &auth.session, &req.collection, &req.properties)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(())))
}

pub async fn drop_properties(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<DropPropertiesRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    roles::require_procedure(store, &auth.session, "drop_properties")?;
    collections::drop_properties(store, &auth.session, &req.collection, &req.properties)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(())))
}

pub async fn get_properties(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CollectionRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    roles::require_procedure(store, &auth.session, "get_properties")?;
    let properties = collections::get_properties(store, &req.collection)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(properties)))
}

pub async fn rename_collection(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<RenameCollectionRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    roles::require_procedure(store, &auth.session, "rename_collection")?;
    collections::rename_collection(store, &auth.session, &req.collection, &req.new_name)?;
    Ok::<_, ApiError>(Json(ApiResponse::success("success")))
}

pub async fn copy_collection(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CopyCollectionRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    roles::require_procedure(store, &auth.session, "copy_collection")?;
    collections::copy_collection(store, &auth.session, &req.collection, &req.destination)?;
    Ok::<_, ApiError>(Json(ApiResponse::success("success")))
}

pub async fn create_index(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<IndexRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    roles::require_procedure(store, &auth.session, "create_index")?;
    collections::create_index(store, &req.collection, &req.property)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(())))
}

pub async fn drop_index(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<IndexRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    roles::require_procedure(store, &auth.session, "drop_index")?;
    collections::drop_index(store, &req.collection, &req.property)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(())))
}

pub async fn show_indexes(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CollectionRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    roles::require_procedure(store, &auth.session, "show_indexes")?;
    let indexes = collections::show_indexes(store, &req.collection)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(indexes)))
}

pub async fn insert_rows(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<InsertRowsRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    roles::require_procedure(store, &auth.session, "insert_rows")?;
    let inserted = rows::insert_rows(store, &req.collection, &req.rows)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(inserted)))
}

pub async fn update_rows(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdateRowsRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    roles::require_procedure(store, &auth.session, "update_rows")?;
    let updated = rows::update_rows(store, &req.collection, &req.values, &req.where_clause)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(updated)))
}

pub async fn delete_rows(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<DeleteRowsRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    roles::require_procedure(store, &auth.session, "delete_rows")?;
    let deleted = rows::delete_rows(store, &req.collection, &req.where_clause)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(deleted)))
}
