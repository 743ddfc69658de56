use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Role;

// -- Session Claims --

/// Session token claims. Issued on login, carried either in the
/// `axiom_session` cookie or an `Authorization: Bearer` header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub email: String,
    pub exp: usize,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusMessage {
    pub message: String,
}

// -- Auth --

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    #[serde(default, alias = "username")]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignupResponse {
    pub message: String,
    pub user_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default, alias = "username")]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub message: String,
    pub user_id: i64,
    pub token: String,
}

// -- Threads --

#[derive(Debug, Serialize, Deserialize)]
pub struct StartThreadResponse {
    pub message: String,
    pub thread_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: i64,
    pub thread_id: i64,
    pub role: Role,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Entry of `GET /api/history`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub id: i64,
    pub title: String,
    pub created_at: String,
    pub is_public: bool,
}

/// Entry of `GET /api/public_threads`.
#[derive(Debug, Serialize, Deserialize)]
pub struct PublicThreadSummary {
    pub id: i64,
    pub title: String,
    pub author_email: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VisibilityResponse {
    pub message: String,
    pub is_public: bool,
}

// -- Fact checks --

#[derive(Debug, Deserialize)]
pub struct FactCheckRequest {
    #[serde(default)]
    pub claim: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FactCheckCreated {
    pub message: String,
    pub check_id: i64,
    pub verdict: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FactCheckResponse {
    pub id: i64,
    pub claim_text: String,
    pub verdict: Option<String>,
    pub user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}
