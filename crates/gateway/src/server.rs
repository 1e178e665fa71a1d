use std::net::SocketAddr;

use {
    axum::{
        Router,
        body::Bytes,
        extract::State,
        response::{IntoResponse, Json},
        routing::{get, post},
    },
    serde_json::json,
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::{debug, info},
};

use {wxhook_config::ServerConfig, wxhook_messages::Envelope, wxhook_plugins::PluginState};

use crate::{dispatcher::Dispatcher, error::Result};

#[derive(Clone)]
struct AppState {
    dispatcher: Dispatcher,
}

// ── Router ───────────────────────────────────────────────────────────────────

/// Build the webhook router (shared between production startup and tests).
pub fn build_app(dispatcher: Dispatcher, webhook_path: &str) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let webhook_path = if webhook_path.starts_with('/') {
        webhook_path.to_string()
    } else {
        format!("/{webhook_path}")
    };

    Router::new()
        .route("/health", get(health_handler))
        .route(&webhook_path, post(webhook_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(AppState { dispatcher })
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Serve until `shutdown` resolves, then drain the dispatcher.
pub async fn start_server(
    config: &ServerConfig,
    dispatcher: Dispatcher,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = build_app(dispatcher.clone(), &config.webhook_path);
    let addr = format!("{}:{}", config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local: SocketAddr = listener.local_addr()?;

    info!(
        addr = %local,
        webhook = %config.webhook_path,
        workers = dispatcher.pool().size(),
        plugins = dispatcher.plugins().len(),
        "webhook server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("webhook server stopped, draining deliveries");
    dispatcher.shutdown().await;
    Ok(())
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// Always acknowledges: the gateway must not retry because of what our
/// consumers do with the message.
async fn webhook_handler(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    match serde_json::from_slice::<Envelope>(&body) {
        Ok(envelope) => {
            state.dispatcher.ingest_async(envelope);
        },
        Err(e) => debug!(error = %e, bytes = body.len(), "ignoring malformed webhook body"),
    }
    Json(json!({ "ok": true }))
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let dispatcher = &state.dispatcher;
    let plugins: Vec<_> = dispatcher
        .plugins()
        .list()
        .into_iter()
        .map(|p| {
            json!({
                "name": p.name,
                "enabled": p.state == PluginState::Enabled,
            })
        })
        .collect();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "workers": dispatcher.pool().size(),
        "queued": dispatcher.pool().queued(),
        "running": dispatcher.pool().running(),
        "plugins": plugins,
    }))
}
