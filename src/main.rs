mod app;
mod auth;
mod config;
mod error;
mod labels;
mod payload;
mod recipes;
mod state;
mod store;

use crate::{app::build_app, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "recipebook=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let state = AppState::init().await?;

    if let Some(admin) = &state.config.admin {
        auth::services::ensure_superuser(state.store.as_ref(), admin).await?;
    }

    let config = state.config.clone();
    app::serve(build_app(state), &config).await
}
