use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use axiom_db::models::ThreadRow;
use axiom_types::api::{
    Claims, MessageResponse, PublicThreadSummary, StartThreadResponse, StatusMessage, ThreadSummary,
    VisibilityResponse,
};

use crate::auth::AppState;
use crate::convert::{derive_title, message_response, summary_time};
use crate::db_call;
use crate::error::ApiError;
use crate::extract::Path;
use crate::middleware::Caller;

pub(crate) async fn load_thread(state: &AppState, thread_id: i64) -> Result<ThreadRow, ApiError> {
    db_call(state, move |db| db.get_thread(thread_id))
        .await?
        .ok_or(ApiError::NotFound("Thread not found"))
}

/// Load a thread the caller must own. A missing thread is 404, someone
/// else's thread is 403 with `denied` as the message.
pub(crate) async fn owned_thread(
    state: &AppState,
    thread_id: i64,
    claims: &Claims,
    denied: &'static str,
) -> Result<ThreadRow, ApiError> {
    let thread = load_thread(state, thread_id).await?;
    if thread.user_id != claims.sub {
        return Err(ApiError::Forbidden(denied));
    }
    Ok(thread)
}

/// POST /api/chat/start
pub async fn start_thread(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub;
    let is_public = state.threads_public_by_default;
    let thread = db_call(&state, move |db| db.create_thread(user_id, is_public)).await?;

    info!("User {} started thread {}", user_id, thread.id);

    Ok((
        StatusCode::CREATED,
        Json(StartThreadResponse {
            message: "New chat thread created".into(),
            thread_id: thread.id,
        }),
    ))
}

/// GET /api/chat/{thread_id} — owner, or anyone when the thread is public.
pub async fn get_thread_messages(
    State(state): State<AppState>,
    Path(thread_id): Path<i64>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    let thread = load_thread(&state, thread_id).await?;
    if !thread.is_public && caller.user_id() != Some(thread.user_id) {
        return Err(ApiError::Forbidden("You are not authorized to access this thread"));
    }

    let rows = db_call(&state, move |db| db.get_thread_messages(thread_id)).await?;
    Ok(Json(rows.into_iter().map(message_response).collect()))
}

/// GET /api/history
pub async fn history(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ThreadSummary>>, ApiError> {
    let user_id = claims.sub;
    let rows = db_call(&state, move |db| db.list_threads_for_user(user_id)).await?;

    let summaries = rows
        .into_iter()
        .map(|t| ThreadSummary {
            id: t.id,
            title: derive_title(t.first_user_message.as_deref(), "New Chat"),
            created_at: summary_time(&t.created_at),
            is_public: t.is_public,
        })
        .collect();

    Ok(Json(summaries))
}

/// GET /api/public_threads
pub async fn public_threads(
    State(state): State<AppState>,
) -> Result<Json<Vec<PublicThreadSummary>>, ApiError> {
    let rows = db_call(&state, |db| db.list_public_threads()).await?;

    let summaries = rows
        .into_iter()
        .map(|t| PublicThreadSummary {
            id: t.id,
            title: derive_title(t.first_user_message.as_deref(), "Public Chat"),
            author_email: t.author_email,
            created_at: summary_time(&t.created_at),
        })
        .collect();

    Ok(Json(summaries))
}

/// DELETE /api/thread/{thread_id}
pub async fn delete_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<StatusMessage>, ApiError> {
    owned_thread(&state, thread_id, &claims, "You are not authorized to delete this thread").await?;

    if !db_call(&state, move |db| db.delete_thread(thread_id)).await? {
        return Err(ApiError::NotFound("Thread not found"));
    }

    info!("User {} deleted thread {}", claims.sub, thread_id);
    Ok(Json(StatusMessage {
        message: "Thread deleted successfully".into(),
    }))
}

/// POST /api/thread/{thread_id}/toggle_public
pub async fn toggle_public(
    State(state): State<AppState>,
    Path(thread_id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<VisibilityResponse>, ApiError> {
    owned_thread(&state, thread_id, &claims, "You are not authorized to change this setting").await?;

    let is_public = db_call(&state, move |db| db.toggle_thread_public(thread_id))
        .await?
        .ok_or(ApiError::NotFound("Thread not found"))?;

    info!("Thread {} is now {}", thread_id, if is_public { "public" } else { "private" });
    Ok(Json(VisibilityResponse {
        message: "Visibility updated".into(),
        is_public,
    }))
}
