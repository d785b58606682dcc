use crate::api::AppState;
use crate::database::transaction_repository::{Transaction, TransactionStatus};
use crate::error::{AppError, ValidationError};
use crate::middleware::error::get_request_id_from_headers;
use crate::services::transaction_lifecycle::CreateTransactionRequest;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

fn parse_id(raw: &str, field: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| {
        ValidationError::MalformedPayload {
            reason: format!("{} must be a UUID", field),
        }
        .into()
    })
}

/// POST /transactions
pub async fn create_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CreateTransactionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Transaction>), AppError> {
    let request_id = get_request_id_from_headers(&headers);
    let with_id = |e: AppError| match &request_id {
        Some(id) => e.with_request_id(id.clone()),
        None => e,
    };

    let Json(request) = payload.map_err(|rejection| {
        with_id(
            ValidationError::MalformedPayload {
                reason: rejection.body_text(),
            }
            .into(),
        )
    })?;

    let validated = request.validate().map_err(|e| with_id(e.into()))?;

    info!(
        donation_id = %validated.donation_id,
        amount = %validated.amount,
        "Donation transaction requested"
    );

    let transaction = state
        .lifecycle
        .create_transaction(validated)
        .await
        .map_err(|e| with_id(e.into()))?;

    Ok((StatusCode::CREATED, Json(transaction)))
}

/// Unauthenticated view of a transaction: enough to render the QR code and follow the
/// payment, without the donor's contact details
#[derive(Debug, Serialize)]
pub struct TransactionView {
    pub id: Uuid,
    pub txid: String,
    pub location: String,
    pub qr_code: String,
    pub pix_copy_paste: String,
    pub amount: String,
    pub alias: Option<String>,
    pub message: Option<String>,
    pub status: String,
    pub paid_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub donation_id: Uuid,
}

impl From<Transaction> for TransactionView {
    fn from(t: Transaction) -> Self {
        Self {
            id: t.id,
            txid: t.txid,
            location: t.location,
            qr_code: t.qr_code,
            pix_copy_paste: t.pix_copy_paste,
            amount: t.amount.with_scale(2).to_string(),
            alias: t.alias,
            message: t.message,
            status: t.status,
            paid_at: t.paid_at,
            created_at: t.created_at,
            donation_id: t.donation_id,
        }
    }
}

/// GET /transactions/{id}
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TransactionView>, AppError> {
    let id = parse_id(&id, "id")?;
    let transaction = state.lifecycle.get_by_id(id).await?;
    Ok(Json(TransactionView::from(transaction)))
}

/// Public view of a paid contribution, shown on the campaign page
#[derive(Debug, Serialize)]
pub struct DonorComment {
    pub alias: Option<String>,
    pub message: Option<String>,
    pub amount: String,
    pub paid_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<Transaction> for DonorComment {
    fn from(t: Transaction) -> Self {
        Self {
            alias: t.alias,
            message: t.message,
            amount: t.amount.with_scale(2).to_string(),
            paid_at: t.paid_at,
        }
    }
}

/// GET /transactions/donation/{donation_id}, paid contributions only
pub async fn list_paid_by_donation(
    State(state): State<AppState>,
    Path(donation_id): Path<String>,
) -> Result<Json<Vec<DonorComment>>, AppError> {
    let donation_id = parse_id(&donation_id, "donation_id")?;
    let transactions = state
        .lifecycle
        .get_by_donation(donation_id, TransactionStatus::Paid)
        .await?;

    Ok(Json(transactions.into_iter().map(DonorComment::from).collect()))
}
