use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::auth::{RequireAdmin, RequireSession, TokenGenerator};
use crate::roles;
use crate::server::AppState;
use crate::server::dto::{
    CreateTokenRequest, CreateTokenResponse, GroupMemberRequest, GroupRequest,
    RegisterUserRequest, RoleRequest,
};
use crate::server::response::{ApiError, ApiResponse};
use crate::store::Store;
use crate::types::Token;

pub async fn register_user(
    admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterUserRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    roles::register_user(store, &admin.session, &req.name, &req.password)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(())))
}

pub async fn user_exists(
    admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Json(req): Json<RoleRequest>,
) -> impl IntoResponse {
    let exists = roles::user_exists(state.store.as_ref(), &admin.session, &req.name)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(exists)))
}

pub async fn drop_user(
    admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Json(req): Json<RoleRequest>,
) -> impl IntoResponse {
    roles::drop_user(state.store.as_ref(), &admin.session, &req.name)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(())))
}

pub async fn create_group(
    admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Json(req): Json<RoleRequest>,
) -> impl IntoResponse {
    roles::create_group(state.store.as_ref(), &admin.session, &req.name)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(())))
}

pub async fn group_grant(
    admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Json(req): Json<GroupMemberRequest>,
) -> impl IntoResponse {
    roles::add_user_to_group(state.store.as_ref(), &admin.session, &req.group, &req.user)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(())))
}

pub async fn group_revoke(
    admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Json(req): Json<GroupMemberRequest>,
) -> impl IntoResponse {
    roles::remove_user_from_group(state.store.as_ref(), &admin.session, &req.group, &req.user)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(())))
}

pub async fn get_group_users(
    admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Json(req): Json<GroupRequest>,
) -> impl IntoResponse {
    let members = roles::list_group_members(state.store.as_ref(), &admin.session, &req.group)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(members)))
}

pub async fn get_user_roles(
    _auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<RoleRequest>,
) -> impl IntoResponse {
    let roles = roles::user_roles(state.store.as_ref(), &req.name)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(roles)))
}

/// Mints a bearer token, bound to a principal or (when none is given) a new
/// admin token.
pub async fn create_token(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTokenRequest>,
) -> impl IntoResponse {
    if let Some(seconds) = req.expires_in_seconds {
        if seconds < 0 {
            return Err(ApiError::bad_request("expires_in_seconds cannot be negative"));
        }
    }
    if let Some(principal) = &req.principal {
        state
            .store
            .get_principal(principal)
            .map_err(ApiError::from)?
            .ok_or_else(|| ApiError::not_found("Principal not found"))?;
    }

    let expires_at = req
        .expires_in_seconds
        .map(|s| Utc::now() + Duration::seconds(s));

    let generator = TokenGenerator::new();

    const MAX_RETRIES: u32 = 3;
    for _ in 0..MAX_RETRIES {
        let (raw_token, lookup, hash) = generator
            .generate()
            .map_err(|_| ApiError::internal("Failed to generate token"))?;

        let token = Token {
            id: Uuid::new_v4().to_string(),
            token_hash: hash,
            token_lookup: lookup,
            is_admin: req.principal.is_none(),
            principal: req.principal.clone(),
            created_at: Utc::now(),
            expires_at,
            last_used_at: None,
        };

        match state.store.create_token(&token) {
            Ok(()) => {
                return Ok(Json(ApiResponse::success(CreateTokenResponse {
                    token: raw_token,
                    id: token.id,
                })));
            }
            Err(crate::error::Error::TokenLookupCollision) => continue,
            Err(_) => return Err(ApiError::internal("Failed to create token")),
        }
    }

    Err(ApiError::internal("Failed to create token after retries"))
}
