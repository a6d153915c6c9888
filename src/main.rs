use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tbank_integration::api::{self, AppState};
use tbank_integration::config::Config;
use tbank_integration::TBankClient;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Initialize logging
    init_tracing();

    // Load configuration
    let config = Config::from_env()?;

    // Log startup info
    tracing::info!("Starting T-Bank payment gateway");
    tracing::info!("Environment: {}", config.server.environment);
    tracing::info!("Terminal: {}", config.tbank.terminal_key);
    tracing::info!("Gateway URL: {}", config.tbank.base_url);
    if !config.tbank.verify_notification_token {
        tracing::warn!(
            "Notification token verification is disabled; webhooks are checked by terminal key only"
        );
    }

    let client = TBankClient::new(config.tbank.clone())?;
    let state = AppState::new(Arc::new(client), config.server.environment.clone());

    // Build router
    let app = api::router(state).layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id()),
    );

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("HOST and PORT must form a valid socket address")?;
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
