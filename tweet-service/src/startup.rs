//! Application startup and lifecycle management.

use crate::config::TweetConfig;
use crate::services::{
    get_metrics, init_metrics, BroadcastPublisher, CacheBackend, PermissionService, PgStore,
    RedisCache, TweetEvent,
};
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;
use service_core::error::AppError;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

/// State for health check endpoints.
#[derive(Clone)]
struct HealthState {
    db: Arc<PgStore>,
    cache: Arc<RedisCache>,
}

/// HTTP status and summary for the given backend health. Redis is a derived
/// cache and reads fall back to the store without it, so losing it only
/// degrades the service.
fn health_status(postgres_ok: bool, redis_ok: bool) -> (StatusCode, &'static str) {
    match (postgres_ok, redis_ok) {
        (true, true) => (StatusCode::OK, "ok"),
        (true, false) => (StatusCode::OK, "degraded"),
        (false, _) => (StatusCode::SERVICE_UNAVAILABLE, "unhealthy"),
    }
}

/// Health check endpoint for Docker/K8s liveness probes.
async fn health_check(State(state): State<HealthState>) -> impl IntoResponse {
    let postgres = state.db.health_check().await;
    let redis = state.cache.health_check().await;

    let status_of = |ok: bool| if ok { "up" } else { "down" };
    let (code, status) = health_status(postgres.is_ok(), redis.is_ok());

    if let Err(e) = &postgres {
        tracing::warn!(error = %e, "Health check failed - database unavailable");
    }
    if let Err(e) = &redis {
        tracing::warn!(error = %e, "Health check failed - redis unavailable");
    }

    let body = Json(json!({
        "status": status,
        "service": "tweet-service",
        "version": env!("CARGO_PKG_VERSION"),
        "postgres": status_of(postgres.is_ok()),
        "redis": status_of(redis.is_ok()),
    }));

    (code, body)
}

/// Readiness check endpoint for K8s readiness probes.
async fn readiness_check(State(state): State<HealthState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => {
            tracing::debug!("Readiness check passed");
            StatusCode::OK
        }
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Metrics endpoint for Prometheus scraping.
async fn metrics_handler() -> impl IntoResponse {
    let metrics = get_metrics();
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        metrics,
    )
}

/// Drain published tweet events into the log.
async fn log_events(mut rx: broadcast::Receiver<TweetEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => tracing::debug!(tweet_id = event.tweet_id(), ?event, "Tweet event"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped = skipped, "Event log lagged behind publisher");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    health: HealthState,
    permissions: PermissionService,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: TweetConfig) -> Result<Self, AppError> {
        init_metrics();

        let db = PgStore::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;
        let db = Arc::new(db);

        let cache = RedisCache::new(&config.redis).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to Redis");
            AppError::InternalError(e)
        })?;
        let cache = Arc::new(cache);

        let events = BroadcastPublisher::default();
        tokio::spawn(log_events(events.subscribe()));

        let permissions = PermissionService::new(
            db.clone(),
            db.clone(),
            cache.clone(),
            Arc::new(events),
            &config.cache,
            &config.permissions,
        );

        let health = HealthState { db, cache };

        let http_addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let http_listener = TcpListener::bind(http_addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %http_addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        tracing::info!(http_port = http_port, "Tweet service listener bound");

        Ok(Self {
            http_port,
            http_listener,
            health,
            permissions,
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Permission service for in-process callers such as the API layer.
    pub fn permissions(&self) -> &PermissionService {
        &self.permissions
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let http_router = Router::new()
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(self.health);

        tracing::info!(
            service = "tweet-service",
            version = env!("CARGO_PKG_VERSION"),
            http_port = self.http_port,
            "Service ready to accept connections"
        );

        axum::serve(self.http_listener, http_router)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "HTTP server error");
                std::io::Error::other(format!("HTTP server error: {}", e))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redis_outage_degrades_without_failing_health() {
        assert_eq!(health_status(true, true), (StatusCode::OK, "ok"));
        assert_eq!(health_status(true, false), (StatusCode::OK, "degraded"));
        assert_eq!(
            health_status(false, true),
            (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
        );
    }
}
