use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use axiom_types::api::{Claims, FactCheckCreated, FactCheckRequest, FactCheckResponse, StatusMessage};
use axiom_types::models::{PromptMessage, Role};

use crate::auth::AppState;
use crate::chat::is_acceptable_text;
use crate::convert::parse_timestamp;
use crate::db_call;
use crate::error::ApiError;
use crate::extract::{JsonBody, Path};
use crate::middleware::Caller;

pub const FACT_CHECK_PROMPT: &str = "You are a precise and neutral fact-checking assistant. \
If you don't know an answer, say so. Verify dates carefully.";

/// POST /api/check — anonymous callers may submit too; their checks have
/// no owner.
pub async fn create_check(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    JsonBody(req): JsonBody<FactCheckRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !is_acceptable_text(&req.claim) {
        return Err(ApiError::BadRequest("Claim is missing or too long"));
    }

    let user_id = caller.user_id();
    let claim = req.claim;
    let prompt = [
        PromptMessage::new(Role::System, FACT_CHECK_PROMPT),
        PromptMessage::new(Role::User, claim.clone()),
    ];

    // Nothing is stored until the verdict is in
    let verdict = axiom_engine::reply(state.engine.as_ref(), &prompt).await;

    let check = db_call(&state, move |db| db.insert_fact_check(user_id, &claim, &verdict)).await?;

    info!("Fact check {} submitted", check.id);

    Ok((
        StatusCode::CREATED,
        Json(FactCheckCreated {
            message: "Fact check submitted!".into(),
            check_id: check.id,
            verdict: check.verdict,
        }),
    ))
}

/// GET /api/checks — the caller's own checks, newest first.
pub async fn list_checks(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<FactCheckResponse>>, ApiError> {
    let user_id = claims.sub;
    let rows = db_call(&state, move |db| db.list_fact_checks_for_user(user_id)).await?;

    Ok(Json(
        rows.into_iter()
            .map(|c| FactCheckResponse {
                id: c.id,
                created_at: parse_timestamp(&c.created_at),
                claim_text: c.claim_text,
                verdict: c.verdict,
                user_id: c.user_id,
            })
            .collect(),
    ))
}

/// DELETE /api/check/{check_id} — owner only; anonymous checks stay.
pub async fn delete_check(
    State(state): State<AppState>,
    Path(check_id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<StatusMessage>, ApiError> {
    let check = db_call(&state, move |db| db.get_fact_check(check_id))
        .await?
        .ok_or(ApiError::NotFound("Fact check not found"))?;

    if check.user_id != Some(claims.sub) {
        return Err(ApiError::Forbidden("You are not authorized to delete this item"));
    }

    db_call(&state, move |db| db.delete_fact_check(check_id)).await?;

    Ok(Json(StatusMessage {
        message: "Fact check deleted successfully".into(),
    }))
}
