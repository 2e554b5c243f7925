//! HTTP routes wrapping the engine: the `/ws` upgrade plus `/health` and
//! `/metrics`/`/metrics/prom` diagnostics. Auth, token binding, and a
//! dashboard time-range query are out of scope; none of it is part of
//! this engine's surface.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::engine::Engine;
use crate::metrics::MetricsSnapshot;

use super::handler::websocket_handler;

pub fn create_router(cors_origins: &str) -> Router<Arc<Engine>> {
    let cors = if cors_origins == "*" {
        CorsLayer::permissive()
    } else {
        let origins: Vec<_> = cors_origins
            .split(',')
            .filter_map(|s| s.trim().parse::<axum::http::HeaderValue>().ok())
            .collect();

        if origins.is_empty() {
            tracing::warn!("no valid CORS origins configured, using permissive CORS");
            CorsLayer::permissive()
        } else {
            CorsLayer::new().allow_origin(origins).allow_methods(Any).allow_headers(Any)
        }
    };

    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/metrics/prom", get(prometheus_metrics_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn health_check(State(_engine): State<Arc<Engine>>) -> &'static str {
    "OK"
}

async fn metrics_handler(State(engine): State<Arc<Engine>>) -> axum::response::Json<MetricsSnapshot> {
    axum::response::Json(engine.metrics_snapshot())
}

async fn prometheus_metrics_handler(State(engine): State<Arc<Engine>>) -> String {
    let snapshot = engine.metrics_snapshot();
    let mut out = String::new();
    let line = |out: &mut String, name: &str, help: &str, value: u64| {
        out.push_str(&format!("# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n"));
    };
    line(&mut out, "scene_engine_connections_registered", "total registered connections", snapshot.connections_registered);
    line(&mut out, "scene_engine_matches_formed", "total matches formed", snapshot.matches_formed);
    line(&mut out, "scene_engine_probes_rejected", "total rejected p2p probes", snapshot.probes_rejected);
    line(&mut out, "scene_engine_games_started", "total games started", snapshot.games_started);
    line(&mut out, "scene_engine_cleanup_invocations", "total cleanup invocations", snapshot.cleanup_invocations);
    line(&mut out, "scene_engine_cleanup_noops", "total cleanup invocations that found nothing to do", snapshot.cleanup_noops);
    out.push_str(&format!(
        "# HELP scene_engine_sessions_active current live sessions\n# TYPE scene_engine_sessions_active gauge\nscene_engine_sessions_active {}\n",
        engine.session_count()
    ));
    out
}

pub async fn run_server(addr: SocketAddr, engine: Arc<Engine>, cors_origins: &str) -> anyhow::Result<()> {
    let app = create_router(cors_origins).with_state(engine);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
