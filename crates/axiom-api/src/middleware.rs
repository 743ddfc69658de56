use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::debug;

use axiom_types::api::Claims;

use crate::auth::AppState;
use crate::db_call;
use crate::error::ApiError;

pub const SESSION_COOKIE: &str = "axiom_session";

/// Identity of whoever sent the request; `None` for anonymous callers.
/// Inserted into every request by [`identify`].
#[derive(Debug, Clone, Default)]
pub struct Caller(pub Option<Claims>);

impl Caller {
    pub fn user_id(&self) -> Option<i64> {
        self.0.as_ref().map(|c| c.sub)
    }
}

/// Resolve the caller from the session cookie or a bearer token. Invalid
/// or expired tokens make the caller anonymous rather than failing the
/// request; routes that need a user sit behind [`require_auth`].
pub async fn identify(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let claims = session_token(req.headers()).and_then(|token| {
        decode::<Claims>(
            &token,
            &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| debug!("Ignoring invalid session token: {}", e))
        .ok()
        .map(|data| data.claims)
    });

    req.extensions_mut().insert(Caller(claims));
    next.run(req).await
}

/// Reject anonymous callers with 401 and expose their `Claims` to handlers.
/// A token whose account no longer exists is treated as anonymous.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = req
        .extensions()
        .get::<Caller>()
        .and_then(|caller| caller.0.clone())
        .ok_or(ApiError::Unauthorized("Authentication required"))?;

    let user_id = claims.sub;
    if db_call(&state, move |db| db.get_user_by_id(user_id)).await?.is_none() {
        debug!("Session token names unknown user {}", user_id);
        return Err(ApiError::Unauthorized("Authentication required"));
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    CookieJar::from_headers(headers)
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
}
