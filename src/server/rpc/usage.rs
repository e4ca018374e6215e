use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};

use crate::auth::RequireSession;
use crate::catalog::ownership;
use crate::events;
use crate::roles;
use crate::server::AppState;
use crate::server::dto::{EventlogRequest, LogEventRequest, UsageRequest};
use crate::server::response::{ApiError, ApiResponse};
use crate::store::Store;
use crate::usage;

pub async fn whoami(auth: RequireSession) -> impl IntoResponse {
    Json(ApiResponse::success(auth.session.whoami().to_string()))
}

pub async fn user_allowed(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<crate::server::dto::CollectionRequest>,
) -> impl IntoResponse {
    let allowed = ownership::is_allowed(
        state.store.as_ref(),
        &req.collection,
        auth.session.whoami(),
    )?;
    Ok::<_, ApiError>(Json(ApiResponse::success(allowed)))
}

pub async fn get_my_usage(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<UsageRequest>,
) -> impl IntoResponse {
    let report = usage::get_my_usage(state.store.as_ref(), &auth.session, req.pretty)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(report)))
}

pub async fn log_event(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<LogEventRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    roles::require_procedure(store, &auth.session, "log_event")?;
    let user = req.user.as_deref().unwrap_or(auth.session.whoami());
    events::log_event(store, &req.event_type, &req.message, user)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(())))
}

pub async fn get_eventlog(
    _auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<EventlogRequest>,
) -> impl IntoResponse {
    let events = events::get_eventlog(
        state.store.as_ref(),
        req.event_type.as_deref(),
        req.collection.as_deref(),
    )?;
    Ok::<_, ApiError>(Json(ApiResponse::success(events)))
}

pub async fn get_version(
    _auth: RequireSession,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let version = state.store.version().map_err(ApiError::from)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(version)))
}
