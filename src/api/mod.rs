//! HTTP surface of the service

pub mod donations;
pub mod live;
pub mod transactions;
pub mod webhooks;

use crate::config::WebhookConfig;
use crate::health::{HealthChecker, HealthStatus};
use crate::middleware::logging::{request_logging_middleware, UuidRequestId};
use crate::middleware::webhook_auth::{require_client_certificate, require_webhook_identity};
use crate::services::notification::NotificationChannel;
use crate::services::transaction_lifecycle::TransactionLifecycle;
use crate::services::webhook_processor::WebhookProcessor;
use axum::{
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::{error, info};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<TransactionLifecycle>,
    pub processor: Arc<WebhookProcessor>,
    pub notifier: Arc<dyn NotificationChannel>,
    pub health_checker: HealthChecker,
}

pub fn build_router(state: AppState, webhook_config: Arc<WebhookConfig>) -> Router {
    // Identity is checked first on every callback route; the handshake also needs the cert
    let webhook_routes = Router::new()
        .route(
            "/webhook",
            post(webhooks::handshake).layer(from_fn_with_state(
                webhook_config.clone(),
                require_client_certificate,
            )),
        )
        .route("/webhook/pix", post(webhooks::confirm_pix))
        .route_layer(from_fn_with_state(webhook_config, require_webhook_identity));

    let mut router = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .route("/health/live", get(liveness))
        .route("/transactions", post(transactions::create_transaction))
        .route("/transactions/{id}", get(transactions::get_transaction))
        .route(
            "/transactions/donation/{donation_id}",
            get(transactions::list_paid_by_donation),
        )
        .route("/donations/{id}", get(donations::get_donation))
        .merge(webhook_routes);

    if state.notifier.supports_live_connections() {
        router = router.route("/ws", get(live::live_connection));
    } else {
        info!("Live connections disabled, notifications go through the broadcast channel");
    }

    router.with_state(state).layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
            .layer(axum::middleware::from_fn(request_logging_middleware))
            .layer(PropagateRequestIdLayer::x_request_id()),
    )
}

async fn root() -> &'static str {
    "Pix donations API"
}

async fn health(
    State(state): State<AppState>,
) -> Result<Json<HealthStatus>, (StatusCode, String)> {
    let health_status = state.health_checker.check_health().await;

    if health_status.is_healthy() {
        Ok(Json(health_status))
    } else {
        error!("❌ Health check failed - service unhealthy");
        Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "Service Unavailable".to_string(),
        ))
    }
}

/// Readiness probe - all dependencies must answer
async fn readiness(
    state: State<AppState>,
) -> Result<Json<HealthStatus>, (StatusCode, String)> {
    health(state).await
}

/// Liveness probe - the process is serving requests
async fn liveness() -> &'static str {
    "OK"
}
