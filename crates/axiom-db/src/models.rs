//! Database row types. These map directly to SQLite rows and are kept
//! apart from the wire types in `axiom-types`.

use axiom_types::models::Role;

pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
}

pub struct ThreadRow {
    pub id: i64,
    pub user_id: i64,
    pub is_public: bool,
}

/// A thread joined with what the listings need: the author's email and
/// the thread's first user-authored message, if any.
pub struct ThreadListingRow {
    pub id: i64,
    pub user_id: i64,
    pub author_email: String,
    pub is_public: bool,
    pub created_at: String,
    pub first_user_message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub thread_id: i64,
    pub role: Role,
    pub message: String,
    pub created_at: String,
}

pub struct FactCheckRow {
    pub id: i64,
    pub claim_text: String,
    pub verdict: Option<String>,
    pub user_id: Option<i64>,
    pub created_at: String,
}
