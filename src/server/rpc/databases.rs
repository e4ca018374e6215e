use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};

use crate::auth::RequireSession;
use crate::catalog::ownership;
use crate::roles;
use crate::server::AppState;
use crate::server::dto::{CreateDatabaseRequest, DatabaseFilterRequest};
use crate::server::response::{ApiError, ApiResponse};

pub async fn create_database(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateDatabaseRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    roles::require_procedure(store, &auth.session, "create_database")?;
    ownership::create_database(store, &auth.session, &req.name)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(())))
}

pub async fn truncate_database(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateDatabaseRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    roles::require_procedure(store, &auth.session, "truncate_database")?;
    ownership::truncate_database(store, &auth.session, &req.name)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(())))
}

pub async fn database_exists(
    _auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateDatabaseRequest>,
) -> impl IntoResponse {
    let exists = ownership::database_exists(state.store.as_ref(), &req.name)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(exists)))
}

pub async fn get_my_databases(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let databases = ownership::list_my_databases(state.store.as_ref(), &auth.session)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(databases)))
}

pub async fn get_my_collections(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<DatabaseFilterRequest>,
) -> impl IntoResponse {
    let collections = crate::usage::get_my_collections(
        state.store.as_ref(),
        &auth.session,
        req.database.as_deref(),
    )?;
    Ok::<_, ApiError>(Json(ApiResponse::success(collections)))
}
