use crate::config::Config;
use crate::info;
use crate::metrics::MetricRegistry;

use axum::extract::State;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, decompression::RequestDecompressionLayer};

use std::sync::Arc;

struct AppState {
    registry: Arc<MetricRegistry>,
}

/// Serve the exposition endpoints until shutdown is signalled. In-flight
/// scrapes are allowed to complete.
pub async fn serve(
    config: Arc<Config>,
    registry: Arc<MetricRegistry>,
    mut shutdown: watch::Receiver<bool>,
) {
    let state = Arc::new(AppState { registry });

    let app: Router = app(state);

    let listener = TcpListener::bind(config.general().listen())
        .await
        .expect("failed to listen");

    info!("serving metrics on: {}", config.general().listen());

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
        .expect("failed to run http server");
}

fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/metrics", get(prometheus))
        .route("/metrics/json", get(json))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(RequestDecompressionLayer::new())
                .layer(CompressionLayer::new()),
        )
}

async fn root() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("nodepulse {version}\n")
}

// always 200 with whatever snapshot currently exists; a partially failed
// sampling pass must never turn into a failed scrape
async fn prometheus(State(state): State<Arc<AppState>>) -> String {
    super::prometheus::render(&state.registry.snapshot())
}

async fn json(State(state): State<Arc<AppState>>) -> String {
    serde_json::to_string(&state.registry.snapshot()).expect("failed to serialize snapshot")
}
