use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};

use crate::auth::RequireSession;
use crate::catalog::grants;
use crate::error::Error;
use crate::query::engine;
use crate::server::AppState;
use crate::server::dto::{
    BboxRequest, BboxResponse, CollectionRequest, FilterRequest, GeometryTypesRequest,
    NearestRequest,
};
use crate::server::response::{ApiError, ApiResponse};
use crate::types::{CombineOp, ComparisonMode, Session};

/// The engine itself never consults ownership; readable visibility is gated
/// here, where the storage layer would have enforced SELECT privileges.
fn require_readable(
    store: &crate::store::SqliteStore,
    session: &Session,
    collection: &str,
) -> Result<(), Error> {
    if grants::can_read(store, collection, session.whoami())? {
        Ok(())
    } else {
        Err(Error::permission_denied(session.whoami(), collection))
    }
}

pub async fn get_collection(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<FilterRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    require_readable(store, &auth.session, &req.collection)?;
    let rows = engine::filter(
        store,
        &req.collection,
        req.select.as_deref(),
        req.where_clause.as_deref(),
        req.group.as_deref(),
        req.order.as_deref(),
        req.limit,
        req.offset,
    )?;
    Ok::<_, ApiError>(Json(ApiResponse::success(rows)))
}

pub async fn get_by_bbox(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<BboxRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    require_readable(store, &auth.session, &req.collection)?;

    let mode: ComparisonMode = req.comparison_mode.parse()?;
    let op: CombineOp = match &req.op {
        Some(op) => op.parse()?,
        None => CombineOp::And,
    };

    let rows = engine::filter_by_bbox(
        store,
        &req.collection,
        (req.minx, req.miny, req.maxx, req.maxy),
        mode,
        req.bbox_crs,
        req.where_clause.as_deref(),
        op,
        req.limit,
        req.offset,
    )?;
    Ok::<_, ApiError>(Json(ApiResponse::success(rows)))
}

pub async fn count_by_bbox(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<BboxRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    require_readable(store, &auth.session, &req.collection)?;

    let mode: ComparisonMode = req.comparison_mode.parse()?;
    let op: CombineOp = match &req.op {
        Some(op) => op.parse()?,
        None => CombineOp::And,
    };

    let count = engine::count_by_bbox(
        store,
        &req.collection,
        (req.minx, req.miny, req.maxx, req.maxy),
        mode,
        req.bbox_crs,
        req.where_clause.as_deref(),
        op,
    )?;
    Ok::<_, ApiError>(Json(ApiResponse::success(count)))
}

pub async fn count_collection(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CollectionRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    require_readable(store, &auth.session, &req.collection)?;
    let count = engine::count_collection(store, &req.collection)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(count)))
}

pub async fn estimate_collection_count(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CollectionRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    require_readable(store, &auth.session, &req.collection)?;
    let count = engine::estimate_collection_count(store, &req.collection)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(count)))
}

pub async fn nearest(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<NearestRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    require_readable(store, &auth.session, &req.collection)?;
    let rows = engine::nearest(
        store,
        &req.collection,
        req.x,
        req.y,
        req.point_crs,
        req.limit,
    )?;
    Ok::<_, ApiError>(Json(ApiResponse::success(rows)))
}

pub async fn geometry_types(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<GeometryTypesRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    require_readable(store, &auth.session, &req.collection)?;
    let types = engine::geometry_types(store, &req.collection, req.aggregate)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(types)))
}

pub async fn get_collection_bbox(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CollectionRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    require_readable(store, &auth.session, &req.collection)?;
    let (minx, miny, maxx, maxy) = engine::collection_bbox(store, &req.collection)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(BboxResponse {
        minx,
        miny,
        maxx,
        maxy,
    })))
}

pub async fn estimate_collection_bbox(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CollectionRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    require_readable(store, &auth.session, &req.collection)?;
    let (minx, miny, maxx, maxy) = engine::estimate_collection_bbox(store, &req.collection)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(BboxResponse {
        minx,
        miny,
        maxx,
        maxy,
    })))
}

pub async fn get_collection_srid(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CollectionRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    require_readable(store, &auth.session, &req.collection)?;
    let srid = engine::collection_srid(store, &req.collection)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(srid)))
}
