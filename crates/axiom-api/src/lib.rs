pub mod auth;
pub mod chat;
pub mod checks;
pub mod convert;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod threads;

use axum::{
    Json, Router,
    middleware::from_fn_with_state,
    routing::{delete, get, post},
};
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use axiom_db::Database;

pub use auth::{AppState, AppStateInner};
pub use error::ApiError;

/// Assemble the full HTTP surface around `state`.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/signup", post(auth::signup))
        .route("/register", post(auth::signup))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/api/chat/{thread_id}", get(threads::get_thread_messages))
        .route("/api/public_threads", get(threads::public_threads))
        .route("/api/check", post(checks::create_check))
        .route("/health", get(health));

    let protected_routes = Router::new()
        .route("/api/chat/start", post(threads::start_thread))
        .route("/api/chat/{thread_id}/message", post(chat::send_message))
        .route("/api/history", get(threads::history))
        .route("/api/thread/{thread_id}", delete(threads::delete_thread))
        .route("/api/thread/{thread_id}/toggle_public", post(threads::toggle_public))
        .route("/api/checks", get(checks::list_checks))
        .route("/api/check/{check_id}", delete(checks::delete_check))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(from_fn_with_state(state.clone(), middleware::identify))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Run a store operation on the blocking pool. Store errors become
/// [`ApiError::Internal`]; any open transaction was already rolled back
/// when the closure returned.
pub(crate) async fn db_call<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))?
        .map_err(ApiError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{HeaderMap, Method, Request, StatusCode, header};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use axiom_engine::{BILLING_FALLBACK, ChatEngine, EngineError};
    use axiom_types::models::{PromptMessage, Role};

    use crate::chat::{MAX_MESSAGE_CHARS, SYSTEM_PROMPT};

    /// Echoes the last prompt entry and records every prompt it was given.
    #[derive(Default)]
    struct ScriptedEngine {
        prompts: Mutex<Vec<Vec<PromptMessage>>>,
        fail_status: Option<u16>,
    }

    #[async_trait]
    impl ChatEngine for ScriptedEngine {
        async fn complete(&self, messages: &[PromptMessage]) -> Result<String, EngineError> {
            self.prompts.lock().unwrap().push(messages.to_vec());
            if let Some(status) = self.fail_status {
                return Err(EngineError::Status {
                    status,
                    body: String::new(),
                });
            }
            let last = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
            Ok(format!("echo: {}", last))
        }
    }

    struct TestApp {
        router: Router,
        engine: Arc<ScriptedEngine>,
    }

    impl TestApp {
        fn new() -> Self {
            Self::with_engine(ScriptedEngine::default())
        }

        fn with_engine(engine: ScriptedEngine) -> Self {
            let engine = Arc::new(engine);
            let state = Arc::new(AppStateInner {
                db: Database::open_in_memory().unwrap(),
                engine: engine.clone(),
                jwt_secret: "test-secret".into(),
                session_ttl: chrono::Duration::hours(1),
                threads_public_by_default: false,
            });
            Self {
                router: router(state),
                engine,
            }
        }

        async fn send(&self, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
            let resp = self.router.clone().oneshot(req).await.unwrap();
            let status = resp.status();
            let headers = resp.headers().clone();
            let bytes = resp.into_body().collect().await.unwrap().to_bytes();
            let body = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, headers, body)
        }

        async fn call(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
            }
            let req = match body {
                Some(body) => builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };
            let (status, _, body) = self.send(req).await;
            (status, body)
        }

        /// Sign up and log in; returns the session token.
        async fn register(&self, email: &str) -> String {
            let creds = json!({ "email": email, "password": "pw" });
            let (status, _) = self.call(Method::POST, "/signup", None, Some(creds.clone())).await;
            assert_eq!(status, StatusCode::CREATED);

            let (status, body) = self.call(Method::POST, "/login", None, Some(creds)).await;
            assert_eq!(status, StatusCode::OK);
            body["token"].as_str().unwrap().to_string()
        }

        async fn start_thread(&self, token: &str) -> i64 {
            let (status, body) = self.call(Method::POST, "/api/chat/start", Some(token), None).await;
            assert_eq!(status, StatusCode::CREATED);
            body["thread_id"].as_i64().unwrap()
        }

        async fn say(&self, token: &str, thread_id: i64, text: &str) -> (StatusCode, Value) {
            self.call(
                Method::POST,
                &format!("/api/chat/{}/message", thread_id),
                Some(token),
                Some(json!({ "message": text })),
            )
            .await
        }

        async fn messages(&self, token: Option<&str>, thread_id: i64) -> (StatusCode, Value) {
            self.call(Method::GET, &format!("/api/chat/{}", thread_id), token, None).await
        }
    }

    #[tokio::test]
    async fn second_signup_with_same_email_conflicts() {
        let app = TestApp::new();
        let creds = json!({ "email": "a@x.com", "password": "pw" });

        let (status, _) = app.call(Method::POST, "/signup", None, Some(creds.clone())).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = app.call(Method::POST, "/signup", None, Some(creds)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Email address already registered");

        // Same account through the alias route and field name
        let (status, _) = app
            .call(Method::POST, "/register", None, Some(json!({ "username": "a@x.com", "password": "x" })))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn signup_requires_both_fields() {
        let app = TestApp::new();
        let (status, _) = app
            .call(Method::POST, "/signup", None, Some(json!({ "email": "a@x.com" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .call(Method::POST, "/signup", None, Some(json!({ "email": "  ", "password": "pw" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn login_issues_session_only_for_correct_password() {
        let app = TestApp::new();
        app.register("a@x.com").await;

        let login = |password: &'static str| {
            Request::builder()
                .method(Method::POST)
                .uri("/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "email": "a@x.com", "password": password }).to_string()))
                .unwrap()
        };

        let (status, headers, body) = app.send(login("wrong")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(headers.get(header::SET_COOKIE).is_none());
        assert!(body.get("token").is_none());

        let (status, headers, body) = app.send(login("pw")).await;
        assert_eq!(status, StatusCode::OK);
        let cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap().to_string();
        assert!(cookie.starts_with("axiom_session="));
        assert!(cookie.contains("HttpOnly"));
        assert!(body["token"].as_str().is_some());

        // The cookie alone authenticates
        let session = cookie.split(';').next().unwrap().to_string();
        let req = Request::builder()
            .uri("/api/history")
            .header(header::COOKIE, session)
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = app.send(req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn unknown_email_is_unauthorized() {
        let app = TestApp::new();
        let (status, body) = app
            .call(Method::POST, "/login", None, Some(json!({ "email": "nobody@x.com", "password": "pw" })))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid email or password");
    }

    #[tokio::test]
    async fn logout_expires_the_cookie() {
        let app = TestApp::new();
        let req = Request::builder()
            .method(Method::POST)
            .uri("/logout")
            .body(Body::empty())
            .unwrap();
        let (status, headers, _) = app.send(req).await;
        assert_eq!(status, StatusCode::OK);

        let cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with("axiom_session="));
        assert!(cookie.contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn protected_routes_reject_anonymous_callers() {
        let app = TestApp::new();
        let (status, _) = app.call(Method::POST, "/api/chat/start", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = app.call(Method::GET, "/api/history", Some("not-a-jwt"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn tokens_for_missing_accounts_are_unauthorized() {
        let app = TestApp::new();
        let token = auth::create_token("test-secret", 999, "ghost@x.com", chrono::Duration::hours(1)).unwrap();

        let (status, body) = app.call(Method::POST, "/api/chat/start", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Authentication required");
    }

    #[tokio::test]
    async fn unreadable_bodies_are_json_bad_requests() {
        let app = TestApp::new();
        let post = |content_type: Option<&str>, body: &str| {
            let mut builder = Request::builder().method(Method::POST).uri("/signup");
            if let Some(content_type) = content_type {
                builder = builder.header(header::CONTENT_TYPE, content_type);
            }
            builder.body(Body::from(body.to_string())).unwrap()
        };

        let requests = [
            post(Some("application/json"), "{\"email\": "),
            post(None, r#"{"email":"a@x.com","password":"pw"}"#),
            post(Some("application/json"), r#"{"email":5,"password":"pw"}"#),
        ];
        for req in requests {
            let (status, _, body) = app.send(req).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(body["error"].is_string());
        }
    }

    #[tokio::test]
    async fn unknown_body_fields_are_ignored() {
        let app = TestApp::new();
        let creds = json!({ "email": "a@x.com", "password": "pw", "remember": true });

        let (status, _) = app.call(Method::POST, "/signup", None, Some(creds.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = app.call(Method::POST, "/login", None, Some(creds)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["token"].is_string());
    }

    #[tokio::test]
    async fn non_numeric_ids_are_bad_requests() {
        let app = TestApp::new();
        let token = app.register("a@x.com").await;

        let (status, body) = app.call(Method::GET, "/api/chat/abc", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid identifier in path");

        let (status, body) = app.call(Method::DELETE, "/api/thread/abc", Some(&token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn quota_scenario() {
        let app = TestApp::new();
        let token = app.register("a@x.com").await;
        let thread_id = app.start_thread(&token).await;

        let (status, reply) = app.say(&token, thread_id, "Hello").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply["role"], "assistant");
        assert_eq!(reply["message"], "echo: Hello");
        assert_eq!(reply["thread_id"], thread_id);

        let (_, messages) = app.messages(Some(&token), thread_id).await;
        let roles: Vec<&str> = messages
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, ["user", "assistant"]);

        for i in 2..=5 {
            let (status, _) = app.say(&token, thread_id, &format!("message {}", i)).await;
            assert_eq!(status, StatusCode::OK, "message {} should be accepted", i);
        }

        let (status, body) = app.say(&token, thread_id, "one too many").await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"], "Conversation limit reached.");

        let (_, messages) = app.messages(Some(&token), thread_id).await;
        assert_eq!(messages.as_array().unwrap().len(), 10);
        assert_eq!(app.engine.prompts.lock().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn engine_sees_system_prompt_and_ordered_history() {
        let app = TestApp::new();
        let token = app.register("a@x.com").await;
        let thread_id = app.start_thread(&token).await;

        app.say(&token, thread_id, "first").await;
        app.say(&token, thread_id, "second").await;

        let prompts = app.engine.prompts.lock().unwrap();
        let last = &prompts[1];
        let expected = [
            (Role::System, SYSTEM_PROMPT),
            (Role::User, "first"),
            (Role::Assistant, "echo: first"),
            (Role::User, "second"),
        ];
        assert_eq!(last.len(), expected.len());
        for (msg, (role, content)) in last.iter().zip(expected) {
            assert_eq!(msg.role, role);
            assert_eq!(msg.content, content);
        }
    }

    #[tokio::test]
    async fn messages_are_validated_before_anything_is_stored() {
        let app = TestApp::new();
        let token = app.register("a@x.com").await;
        let thread_id = app.start_thread(&token).await;

        let (status, _) = app.say(&token, thread_id, "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = app.say(&token, thread_id, "   ").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = app.say(&token, thread_id, &"a".repeat(MAX_MESSAGE_CHARS + 1)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, messages) = app.messages(Some(&token), thread_id).await;
        assert_eq!(messages, json!([]));

        let (status, _) = app.say(&token, thread_id, &"a".repeat(MAX_MESSAGE_CHARS)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn engine_failure_keeps_user_message_and_stores_fallback() {
        let app = TestApp::with_engine(ScriptedEngine {
            fail_status: Some(429),
            ..Default::default()
        });
        let token = app.register("a@x.com").await;
        let thread_id = app.start_thread(&token).await;

        let (status, reply) = app.say(&token, thread_id, "Hello").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply["message"], BILLING_FALLBACK);

        let (_, messages) = app.messages(Some(&token), thread_id).await;
        let messages = messages.as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["message"], "Hello");
        assert_eq!(messages[1]["message"], BILLING_FALLBACK);
    }

    #[tokio::test]
    async fn non_owners_get_forbidden() {
        let app = TestApp::new();
        let owner = app.register("a@x.com").await;
        let other = app.register("b@x.com").await;
        let thread_id = app.start_thread(&owner).await;
        app.say(&owner, thread_id, "private thoughts").await;

        let (status, _) = app.say(&other, thread_id, "hi").await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app.messages(Some(&other), thread_id).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app.messages(None, thread_id).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app
            .call(Method::POST, &format!("/api/thread/{}/toggle_public", thread_id), Some(&other), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app
            .call(Method::DELETE, &format!("/api/thread/{}", thread_id), Some(&other), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // Nothing changed for the owner
        let (_, messages) = app.messages(Some(&owner), thread_id).await;
        assert_eq!(messages.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_thread_is_not_found() {
        let app = TestApp::new();
        let token = app.register("a@x.com").await;

        let (status, _) = app.messages(Some(&token), 404).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = app.say(&token, 404, "hi").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn toggling_twice_restores_visibility() {
        let app = TestApp::new();
        let token = app.register("a@x.com").await;
        let thread_id = app.start_thread(&token).await;
        let long = "Is the Great Wall of China visible from the moon with the naked eye?";
        app.say(&token, thread_id, long).await;

        let toggle = format!("/api/thread/{}/toggle_public", thread_id);

        let (status, body) = app.call(Method::POST, &toggle, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_public"], true);

        let (_, public) = app.call(Method::GET, "/api/public_threads", None, None).await;
        let public = public.as_array().unwrap();
        assert_eq!(public.len(), 1);
        assert_eq!(public[0]["id"], thread_id);
        assert_eq!(public[0]["author_email"], "a@x.com");
        let title = public[0]["title"].as_str().unwrap();
        assert!(title.ends_with("..."));
        assert_eq!(title.chars().count(), 53);

        // Public threads are readable without a session
        let (status, _) = app.messages(None, thread_id).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = app.call(Method::POST, &toggle, Some(&token), None).await;
        assert_eq!(body["is_public"], false);

        let (_, public) = app.call(Method::GET, "/api/public_threads", None, None).await;
        assert_eq!(public, json!([]));
    }

    #[tokio::test]
    async fn history_lists_own_threads_with_titles() {
        let app = TestApp::new();
        let token = app.register("a@x.com").await;
        let other = app.register("b@x.com").await;

        let first = app.start_thread(&token).await;
        app.say(&token, first, "Hello").await;
        let second = app.start_thread(&token).await;
        app.start_thread(&other).await;

        let (status, history) = app.call(Method::GET, "/api/history", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let history = history.as_array().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0]["id"], second);
        assert_eq!(history[0]["title"], "New Chat");
        assert_eq!(history[1]["id"], first);
        assert_eq!(history[1]["title"], "Hello");
        assert_eq!(history[1]["is_public"], false);
    }

    #[tokio::test]
    async fn deleting_a_thread_removes_it() {
        let app = TestApp::new();
        let token = app.register("a@x.com").await;
        let thread_id = app.start_thread(&token).await;
        app.say(&token, thread_id, "Hello").await;

        let (status, _) = app
            .call(Method::DELETE, &format!("/api/thread/{}", thread_id), Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app.messages(Some(&token), thread_id).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (_, history) = app.call(Method::GET, "/api/history", Some(&token), None).await;
        assert_eq!(history, json!([]));
    }

    #[tokio::test]
    async fn fact_checks_accept_anonymous_claims() {
        let app = TestApp::new();
        let token = app.register("a@x.com").await;
        let other = app.register("b@x.com").await;

        let (status, body) = app
            .call(Method::POST, "/api/check", None, Some(json!({ "claim": "The moon is cheese" })))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["verdict"], "echo: The moon is cheese");
        let anonymous_id = body["check_id"].as_i64().unwrap();

        let (status, body) = app
            .call(Method::POST, "/api/check", Some(&token), Some(json!({ "claim": "Water is wet" })))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let own_id = body["check_id"].as_i64().unwrap();

        let (status, _) = app
            .call(Method::POST, "/api/check", None, Some(json!({ "claim": "" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, checks) = app.call(Method::GET, "/api/checks", Some(&token), None).await;
        let checks = checks.as_array().unwrap();
        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0]["claim_text"], "Water is wet");
        assert_eq!(checks[0]["verdict"], "echo: Water is wet");

        let delete = |id: i64| format!("/api/check/{}", id);
        let (status, _) = app.call(Method::DELETE, &delete(own_id), Some(&other), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = app.call(Method::DELETE, &delete(anonymous_id), Some(&token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = app.call(Method::DELETE, &delete(own_id), Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.call(Method::DELETE, &delete(own_id), Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let prompts = app.engine.prompts.lock().unwrap();
        assert_eq!(prompts[0][0].role, Role::System);
        assert_eq!(prompts[0][0].content, crate::checks::FACT_CHECK_PROMPT);
    }

    #[tokio::test]
    async fn health_needs_no_session() {
        let app = TestApp::new();
        let (status, body) = app.call(Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }
}
