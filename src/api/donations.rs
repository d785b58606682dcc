use crate::api::AppState;
use crate::database::donation_repository::Donation;
use crate::error::{AppError, DomainError, ValidationError};
use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

/// GET /donations/{id}, campaign with its running total
pub async fn get_donation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Donation>, AppError> {
    let donation_id = Uuid::parse_str(&id).map_err(|_| {
        AppError::from(ValidationError::MalformedPayload {
            reason: "id must be a UUID".to_string(),
        })
    })?;

    state
        .lifecycle
        .get_donation(donation_id)
        .await?
        .map(Json)
        .ok_or_else(|| {
            DomainError::DonationNotFound {
                donation_id: id,
            }
            .into()
        })
}
