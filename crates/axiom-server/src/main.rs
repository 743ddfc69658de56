mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use axiom_api::AppStateInner;
use axiom_engine::OpenAiEngine;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "axiom=debug,axiom_api=debug,axiom_engine=debug,axiom_db=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {:#}", e);
            std::process::exit(1);
        }
    };

    if config.threads_public_by_default {
        warn!("New threads start public (AXIOM_THREADS_PUBLIC_BY_DEFAULT)");
    }

    // Init database
    let db = axiom_db::Database::open(&config.db_path)?;

    let engine = OpenAiEngine::new(config.openai.clone())?;
    info!("AI engine ready (model {})", engine.model());

    let state = Arc::new(AppStateInner {
        db,
        engine: Arc::new(engine),
        jwt_secret: config.jwt_secret.clone(),
        session_ttl: config.session_ttl,
        threads_public_by_default: config.threads_public_by_default,
    });

    let app = axiom_api::router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Axiom server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
