use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use url::Url;

use product_studio::api::{self, AppState};
use product_studio::backend::HttpBackend;
use product_studio::config::{self, AdminConfig, SharedAdminConfig};
use product_studio::payments::GatewayVerifier;
use product_studio::session::SessionRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let port = env::var("STUDIO_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(3000);
    let bind_address = format!("0.0.0.0:{}", port);

    let backend_url = env::var("BACKEND_URL")
        .context("BACKEND_URL must point at the generation backend")?;
    let endpoint = Url::parse(backend_url.trim()).context("BACKEND_URL is not a valid URL")?;

    let admin_token = env::var("ADMIN_TOKEN")
        .ok()
        .filter(|value| !value.trim().is_empty());
    if admin_token.is_none() {
        tracing::warn!("ADMIN_TOKEN is unset, the admin surface is disabled");
    }

    let config_path = config::default_config_path();
    let admin = SharedAdminConfig::new(AdminConfig::load(&config_path).await);

    let backend = Arc::new(HttpBackend::new(endpoint));
    let verifier = Arc::new(GatewayVerifier::new());
    let sessions = Arc::new(SessionRegistry::new(backend, verifier, admin));

    let state = AppState {
        sessions,
        admin_token,
        config_path: Arc::new(config_path),
    };
    let router = api::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!(%bind_address, "product studio listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
