use std::sync::{Arc, LazyLock};

use anyhow::anyhow;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;

use axiom_db::Database;
use axiom_engine::ChatEngine;
use axiom_types::api::{Claims, LoginRequest, LoginResponse, SignupRequest, SignupResponse, StatusMessage};

use crate::db_call;
use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::middleware::SESSION_COOKIE;

/// Matches the width of the original `email` column.
const MAX_EMAIL_CHARS: usize = 120;

const INVALID_CREDENTIALS: &str = "Invalid email or password";

/// Verified against when the email is unknown, so a miss costs the same
/// Argon2 work as a wrong password.
static DUMMY_HASH: LazyLock<Option<String>> = LazyLock::new(|| {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(b"axiom-unknown-user", &salt)
        .map(|h| h.to_string())
        .ok()
});

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub engine: Arc<dyn ChatEngine>,
    pub jwt_secret: String,
    pub session_ttl: chrono::Duration,
    /// Visibility given to newly started threads.
    pub threads_public_by_default: bool,
}

/// POST /signup and /register
pub async fn signup(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_string();
    if email.is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest("Email and password are required"));
    }
    if email.chars().count() > MAX_EMAIL_CHARS {
        return Err(ApiError::BadRequest("Email address is too long"));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| anyhow!("password hashing failed: {}", e))?
        .to_string();

    // The unique index decides duplicates, so concurrent signups can't both win
    let user_id = db_call(&state, move |db| db.create_user(&email, &password_hash))
        .await?
        .ok_or(ApiError::Conflict("Email address already registered"))?;

    info!("Registered user {}", user_id);

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            message: "User created successfully!".into(),
            user_id,
        }),
    ))
}

/// POST /login — verifies the password and opens a session.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    JsonBody(req): JsonBody<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    let email = req.email.trim().to_string();
    let Some(user) = db_call(&state, move |db| db.get_user_by_email(&email)).await? else {
        verify_against_dummy(&req.password);
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS));
    };

    // Verify password
    let parsed_hash =
        PasswordHash::new(&user.password_hash).map_err(|e| anyhow!("corrupt password hash for user {}: {}", user.id, e))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized(INVALID_CREDENTIALS))?;

    let token = create_token(&state.jwt_secret, user.id, &user.email, state.session_ttl)?;

    let cookie = Cookie::build((SESSION_COOKIE, token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);

    info!("User {} logged in", user.id);

    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            message: "Logged in successfully".into(),
            user_id: user.id,
            token,
        }),
    ))
}

/// POST /logout — always answers 200 and expires the session cookie.
pub async fn logout(jar: CookieJar) -> (CookieJar, Json<StatusMessage>) {
    let mut expired = Cookie::build((SESSION_COOKIE, "")).path("/").build();
    expired.make_removal();

    (
        jar.add(expired),
        Json(StatusMessage {
            message: "Logged out successfully".into(),
        }),
    )
}

fn verify_against_dummy(password: &str) -> bool {
    DUMMY_HASH
        .as_deref()
        .and_then(|hash| PasswordHash::new(hash).ok())
        .is_some_and(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
}

pub fn create_token(
    secret: &str,
    user_id: i64,
    email: &str,
    ttl: chrono::Duration,
) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        exp: (chrono::Utc::now() + ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
