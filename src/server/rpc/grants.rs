use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};

use crate::auth::RequireSession;
use crate::catalog::grants;
use crate::roles;
use crate::server::AppState;
use crate::server::dto::{
    AccessRightRow, CollectionRequest, DatabaseFilterRequest, GrantRequest, GrantRow,
    GroupCollectionRequest, GroupDatabaseRequest,
};
use crate::server::response::{ApiError, ApiResponse};

pub async fn grant_access(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<GrantRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    roles::require_procedure(store, &auth.session, "grant_access")?;
    grants::grant_access(store, &auth.session, &req.collection, &req.grantee)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(())))
}

pub async fn revoke_access(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<GrantRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    roles::require_procedure(store, &auth.session, "revoke_access")?;
    grants::revoke_access(store, &auth.session, &req.collection, &req.grantee)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(())))
}

pub async fn publish_collection(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CollectionRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    roles::require_procedure(store, &auth.session, "publish_collection")?;
    grants::publish_collection(store, &auth.session, &req.collection)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(())))
}

pub async fn unpublish_collection(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CollectionRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    roles::require_procedure(store, &auth.session, "unpublish_collection")?;
    grants::unpublish_collection(store, &auth.session, &req.collection)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(())))
}

pub async fn group_publish_collection(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<GroupCollectionRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    roles::require_procedure(store, &auth.session, "group_publish_collection")?;
    grants::group_publish_collection(store, &auth.session, &req.collection, &req.group)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(())))
}

pub async fn group_unpublish_collection(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<GroupCollectionRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    roles::require_procedure(store, &auth.session, "group_unpublish_collection")?;
    grants::group_unpublish_collection(store, &auth.session, &req.collection, &req.group)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(())))
}

pub async fn group_publish_database(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<GroupDatabaseRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    roles::require_procedure(store, &auth.session, "group_publish_database")?;
    grants::group_publish_database(store, &auth.session, &req.database, &req.group)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(())))
}

pub async fn group_unpublish_database(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<GroupDatabaseRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    roles::require_procedure(store, &auth.session, "group_unpublish_database")?;
    grants::group_unpublish_database(store, &auth.session, &req.database, &req.group)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(())))
}

pub async fn list_my_grants(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<DatabaseFilterRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let grants = grants::list_my_grants(store, &auth.session, req.database.as_deref())?;
    let rows: Vec<GrantRow> = grants
        .into_iter()
        .map(|(collection, grantee)| GrantRow {
            collection,
            grantee,
        })
        .collect();
    Ok::<_, ApiError>(Json(ApiResponse::success(rows)))
}

pub async fn get_grants(
    _auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CollectionRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let rights = grants::get_grants(store, &req.collection)?;
    let rows: Vec<AccessRightRow> = rights
        .into_iter()
        .map(|(grantee, privileges)| AccessRightRow {
            grantee,
            privileges: privileges.as_str().to_string(),
        })
        .collect();
    Ok::<_, ApiError>(Json(ApiResponse::success(rows)))
}
