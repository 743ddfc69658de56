use axum::{Extension, Json, extract::State};
use tracing::{debug, info};

use axiom_db::AppendOutcome;
use axiom_db::models::MessageRow;
use axiom_types::api::{Claims, MessageResponse, SendMessageRequest};
use axiom_types::models::{PromptMessage, Role};

use crate::auth::AppState;
use crate::convert::message_response;
use crate::db_call;
use crate::error::ApiError;
use crate::extract::{JsonBody, Path};
use crate::threads::owned_thread;

/// User-authored messages a single thread may hold.
pub const MAX_USER_MESSAGES_PER_THREAD: i64 = 5;

/// Upper bound on a message or claim, in characters.
pub const MAX_MESSAGE_CHARS: usize = 1000;

pub const SYSTEM_PROMPT: &str = "You are a helpful and concise assistant.";

/// Non-blank and at most [`MAX_MESSAGE_CHARS`] characters.
pub(crate) fn is_acceptable_text(text: &str) -> bool {
    !text.trim().is_empty() && text.chars().count() <= MAX_MESSAGE_CHARS
}

/// The system instruction followed by the thread's messages in order.
pub fn assemble_prompt(system: &str, history: &[MessageRow]) -> Vec<PromptMessage> {
    std::iter::once(PromptMessage::new(Role::System, system))
        .chain(history.iter().map(|m| PromptMessage::new(m.role, m.message.clone())))
        .collect()
}

/// POST /api/chat/{thread_id}/message — one conversation turn.
///
/// Persists the user's message, replays the whole thread to the AI engine
/// and persists the answer. The user message is committed before the
/// engine is called and stays even if the engine fails; in that case the
/// stored assistant message is the engine's fallback text.
pub async fn send_message(
    State(state): State<AppState>,
    Path(thread_id): Path<i64>,
    Extension(claims): Extension<Claims>,
    JsonBody(req): JsonBody<SendMessageRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    owned_thread(&state, thread_id, &claims, "You are not authorized to post in this thread").await?;

    if !is_acceptable_text(&req.message) {
        return Err(ApiError::BadRequest("Message is missing or too long"));
    }

    let text = req.message;
    let outcome = db_call(&state, move |db| {
        db.append_user_message(thread_id, &text, MAX_USER_MESSAGES_PER_THREAD)
    })
    .await?;

    let user_message = match outcome {
        AppendOutcome::Appended(row) => row,
        AppendOutcome::QuotaReached => {
            info!("Thread {} hit the message quota", thread_id);
            return Err(ApiError::QuotaExceeded("Conversation limit reached."));
        }
    };
    debug!("Stored user message {} in thread {}", user_message.id, thread_id);

    let history = db_call(&state, move |db| db.get_thread_messages(thread_id)).await?;
    let prompt = assemble_prompt(SYSTEM_PROMPT, &history);

    let answer = axiom_engine::reply(state.engine.as_ref(), &prompt).await;

    let stored = db_call(&state, move |db| db.insert_message(thread_id, Role::Assistant, &answer)).await?;

    Ok(Json(message_response(stored)))
}
