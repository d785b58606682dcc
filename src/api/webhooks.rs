use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{error, info, warn};

use crate::api::AppState;
use crate::error::{AppError, ValidationError};
use crate::middleware::error::get_request_id_from_headers;
use crate::services::webhook_processor::{parse_confirmations, ProcessingSummary};

#[derive(Debug, Serialize)]
pub struct ConfirmationResponse {
    pub msg: String,
    #[serde(flatten)]
    pub summary: ProcessingSummary,
}

/// POST /webhook
///
/// Called by the gateway when the webhook URL is registered. Guards do all the work.
pub async fn handshake() -> StatusCode {
    info!("🤝 Webhook handshake accepted");
    StatusCode::OK
}

/// POST /webhook/pix
pub async fn confirm_pix(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<JsonValue>, JsonRejection>,
) -> Result<Json<ConfirmationResponse>, AppError> {
    let request_id = get_request_id_from_headers(&headers);
    let with_id = |e: AppError| match &request_id {
        Some(id) => e.with_request_id(id.clone()),
        None => e,
    };

    let Json(payload) = payload.map_err(|rejection| {
        warn!(error = %rejection.body_text(), "Invalid JSON in Pix confirmation");
        with_id(
            ValidationError::MalformedPayload {
                reason: rejection.body_text(),
            }
            .into(),
        )
    })?;

    let confirmations = parse_confirmations(&payload).map_err(|e| {
        warn!(error = %e, "Rejected Pix confirmation payload");
        with_id(e.into())
    })?;

    info!(events = confirmations.len(), "📥 Pix confirmation received");

    let summary = state
        .processor
        .process_batch(&confirmations)
        .await
        .map_err(|e| {
            error!(error = %e, "Pix confirmation processing failed");
            with_id(e.into())
        })?;

    info!(
        processed = summary.processed,
        duplicates = summary.duplicates,
        "✅ Pix confirmation processed"
    );

    Ok(Json(ConfirmationResponse {
        msg: "Pagamento confirmado".to_string(),
        summary,
    }))
}
