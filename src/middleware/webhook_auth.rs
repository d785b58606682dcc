//! Authorization guards for the gateway callback routes.
//!
//! Both run before the body is read, so a rejected caller never reaches processing.

use crate::config::WebhookConfig;
use crate::error::{AppError, AppErrorKind, AuthorizationError};
use crate::middleware::error::get_request_id_from_headers;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

pub const IDENTITY_HEADER: &str = "user-id";

/// Header `user-id` must carry the configured webhook identity
pub async fn require_webhook_identity(
    State(config): State<Arc<WebhookConfig>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let presented = request
        .headers()
        .get(IDENTITY_HEADER)
        .and_then(|v| v.to_str().ok());

    if presented != Some(config.identity.as_str()) {
        let request_id = get_request_id_from_headers(request.headers());
        warn!(
            path = %request.uri().path(),
            identity_present = presented.is_some(),
            "🚫 Webhook call with wrong identity"
        );
        let err = AppError::new(AppErrorKind::Authorization(
            AuthorizationError::InvalidIdentity,
        ));
        return Err(match request_id {
            Some(id) => err.with_request_id(id),
            None => err,
        });
    }

    Ok(next.run(request).await)
}

/// TLS terminates at the proxy, which reports the client certificate check in a header
pub async fn require_client_certificate(
    State(config): State<Arc<WebhookConfig>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let verified = request
        .headers()
        .get(config.client_cert_header.as_str())
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case(&config.client_cert_verified_value))
        .unwrap_or(false);

    if !verified {
        warn!(path = %request.uri().path(), "🚫 Webhook call without verified client certificate");
        return Err(AppError::new(AppErrorKind::Authorization(
            AuthorizationError::MissingClientCertificate,
        )));
    }

    Ok(next.run(request).await)
}
