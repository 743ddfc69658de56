//! The AI collaborator: turns a role-tagged message history into text.
//!
//! Handlers never see an engine failure. [`reply`] logs the error and hands
//! back one of the fixed apology strings instead.

pub mod openai;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error};

use axiom_types::models::PromptMessage;

pub use openai::{OpenAiConfig, OpenAiEngine};

/// Returned when the upstream answers 429 (quota or billing exhausted).
pub const BILLING_FALLBACK: &str =
    "API call failed due to a billing issue. Please check your plan and billing details on the OpenAI website.";

/// Returned for any other non-success upstream status.
pub const SERVICE_FALLBACK: &str = "Sorry, the AI service returned an error. Please try again later.";

/// Returned for transport failures, timeouts and unusable responses.
pub const UNEXPECTED_FALLBACK: &str =
    "Sorry, I encountered an unexpected error while processing your request.";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("upstream returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream response contained no choices")]
    EmptyResponse,
}

impl EngineError {
    pub fn fallback_text(&self) -> &'static str {
        match self {
            Self::Status { status: 429, .. } => BILLING_FALLBACK,
            Self::Status { .. } => SERVICE_FALLBACK,
            Self::Transport(_) | Self::EmptyResponse => UNEXPECTED_FALLBACK,
        }
    }
}

#[async_trait]
pub trait ChatEngine: Send + Sync {
    /// Sends the full ordered history and returns the generated text.
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, EngineError>;
}

/// Asks `engine` for the next assistant turn. Never fails.
pub async fn reply(engine: &dyn ChatEngine, messages: &[PromptMessage]) -> String {
    debug!("Sending {} messages to AI engine", messages.len());

    match engine.complete(messages).await {
        Ok(text) => {
            debug!("Received AI response ({} chars)", text.chars().count());
            text
        }
        Err(e) => {
            error!("AI engine call failed: {}", e);
            e.fallback_text().to_string()
        }
    }
}
