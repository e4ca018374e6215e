use std::sync::Arc;

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::helpers::{TokenValidationError, extract_token_from_header, validate_token};
use crate::server::AppState;
use crate::types::{PrincipalKind, Session, Token};

/// Extractor resolving the acting principal for a request. This is the
/// identity resolver: every access-checked operation starts here, and an
/// anonymous caller never reaches a handler body.
pub struct RequireSession {
    pub token: Token,
    pub session: Session,
}

/// Extractor that requires the administrative capability.
pub struct RequireAdmin {
    pub token: Token,
    pub session: Session,
}

#[derive(Debug)]
pub enum AuthError {
    MissingAuth,
    InvalidScheme,
    InvalidToken,
    TokenExpired,
    NotAdmin,
    GroupCannotLogIn,
    InternalError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingAuth => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::InvalidScheme => (StatusCode::UNAUTHORIZED, "Invalid authorization scheme"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid token"),
            AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "Token expired"),
            AuthError::NotAdmin => (StatusCode::FORBIDDEN, "Admin access required"),
            AuthError::GroupCannotLogIn => {
                (StatusCode::FORBIDDEN, "Group roles cannot log in directly")
            }
            AuthError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = json!({ "data": null, "error": message });

        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                "WWW-Authenticate",
                "Bearer realm=\"cadastre\"".parse().unwrap(),
            );
        }

        response
    }
}

impl FromRequestParts<Arc<AppState>> for RequireSession {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let (token, session) = extract_session(parts, state).await?;
        Ok(RequireSession { token, session })
    }
}

impl FromRequestParts<Arc<AppState>> for RequireAdmin {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let (token, session) = extract_session(parts, state).await?;

        if !session.is_admin {
            return Err(AuthError::NotAdmin);
        }

        Ok(RequireAdmin { token, session })
    }
}

async fn extract_session(
    parts: &mut Parts,
    state: &Arc<AppState>,
) -> Result<(Token, Session), AuthError> {
    let auth_header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let raw_token = extract_token_from_header(auth_header)
        .map_err(|e| match e {
            TokenValidationError::InvalidScheme => AuthError::InvalidScheme,
            TokenValidationError::InvalidToken => AuthError::InvalidToken,
            _ => AuthError::InternalError,
        })?
        .ok_or(AuthError::MissingAuth)?;

    let validated = validate_token(state, &raw_token).map_err(|e| match e {
        TokenValidationError::InvalidScheme => AuthError::InvalidScheme,
        TokenValidationError::InvalidToken => AuthError::InvalidToken,
        TokenValidationError::TokenExpired => AuthError::TokenExpired,
        TokenValidationError::InternalError => AuthError::InternalError,
    })?;

    let session = match &validated.principal {
        Some(principal) => {
            if principal.kind == PrincipalKind::Group {
                return Err(AuthError::GroupCannotLogIn);
            }
            Session {
                principal: principal.name.clone(),
                is_admin: validated.token.is_admin,
            }
        }
        // unbound admin tokens act under the reserved admin identity
        None if validated.token.is_admin => Session::admin("admin"),
        None => return Err(AuthError::InvalidToken),
    };

    Ok((validated.token, session))
}
