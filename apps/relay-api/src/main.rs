use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use relay_api::auth::HttpSessionAuth;
use relay_api::config::Config;
use relay_api::directory::HttpChatDirectory;
use relay_api::gateway::{dispatcher, online::OnlineUsers, registry::BrokerRegistry};
use relay_api::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing — env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    // The queue is this service's event source: refuse to start without it.
    let nats = async_nats::connect(&config.nats_url)
        .await
        .expect("failed to connect to NATS");

    let auth = Arc::new(HttpSessionAuth::new(&config.auth_url));
    let directory = Arc::new(HttpChatDirectory::new(&config.chat_url));

    let online = OnlineUsers::new();
    let registry = BrokerRegistry::spawn(directory, online.clone());

    dispatcher::start(&nats, &registry)
        .await
        .expect("failed to subscribe to event queues");

    tracing::info!(nats_url = %config.nats_url, chat_url = %config.chat_url, "relay-api configured");

    let state = AppState {
        config: Arc::new(config),
        auth,
        online,
        registry: registry.clone(),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(relay_api::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "relay-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // Drain every broker task before exiting.
    registry.shutdown().await;
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.expect("failed to listen for ctrl-c");
    tracing::info!("shutdown signal received");
}
