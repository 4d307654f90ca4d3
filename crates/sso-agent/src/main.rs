//! SSO Agent Server Binary
//!
//! Loads the configuration, builds the session store and serves the agent's
//! HTTP surface.

use std::env;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use sso_agent::{create_router, AppState, Config, SessionStore};

#[tokio::main]
async fn main() {
    let log_level = env::var("SSO_AGENT_LOG_LEVEL")
        .unwrap_or_else(|_| "info".into())
        .parse()
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    let config_path = env::args()
        .nth(1)
        .or_else(|| env::var("SSO_AGENT_CONFIG").ok())
        .unwrap_or_else(|| "sso-agent.toml".into());
    let config = Config::load(&config_path).expect("Failed to load configuration");

    let store =
        Arc::new(SessionStore::new(&config.cookie).expect("Failed to initialize session store"));
    let state = Arc::new(AppState {
        store,
        revocation_tokens: config.web.revocations.tokens.clone(),
    });

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.web.listen)
        .await
        .expect("Failed to bind to address");
    info!(addr = %config.web.listen, "SSO agent listening");

    axum::serve(listener, app).await.expect("Server error");
}
