use crate::database::error::DatabaseError;
use crate::database::repository::DonationStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{types::BigDecimal, FromRow, PgPool};
use uuid::Uuid;

/// Donation campaign entity
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Donation {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub goal: BigDecimal,
    pub amount_raised: BigDecimal,
    pub deadline: DateTime<Utc>,
    pub state: String,
    pub category: String,
    pub url_image: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    pub user_id: Uuid,
}

/// Repository for donation campaigns
pub struct DonationRepository {
    pool: PgPool,
}

impl DonationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DonationStore for DonationRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Donation>, DatabaseError> {
        sqlx::query_as::<_, Donation>(
            "SELECT id, name, description, goal, amount_raised, deadline, state, category,
                    url_image, created_at, deleted_at, user_id
             FROM donations
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
