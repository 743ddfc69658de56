//! Row-to-wire conversions shared by the handlers.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

use axiom_db::models::MessageRow;
use axiom_types::api::MessageResponse;

/// Listing titles keep this many characters of the first user message.
pub const TITLE_PREFIX_CHARS: usize = 50;

pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // Rows written by SQLite's datetime() have no zone and no 'T'
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

/// Minute-resolution UTC time used by the thread listings.
pub fn summary_time(raw: &str) -> String {
    parse_timestamp(raw).format("%Y-%m-%d %H:%M").to_string()
}

/// First user message cut to [`TITLE_PREFIX_CHARS`] with `...` appended
/// when longer, or `fallback` for a thread nobody has written in yet.
pub fn derive_title(first_user_message: Option<&str>, fallback: &str) -> String {
    match first_user_message {
        Some(text) if text.chars().count() > TITLE_PREFIX_CHARS => {
            let prefix: String = text.chars().take(TITLE_PREFIX_CHARS).collect();
            format!("{}...", prefix)
        }
        Some(text) => text.to_string(),
        None => fallback.to_string(),
    }
}

pub fn message_response(row: MessageRow) -> MessageResponse {
    MessageResponse {
        id: row.id,
        thread_id: row.thread_id,
        role: row.role,
        created_at: parse_timestamp(&row.created_at),
        message: row.message,
    }
}
