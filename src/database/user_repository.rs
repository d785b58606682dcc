use crate::database::error::DatabaseError;
use crate::database::repository::UserStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Campaign owner. Only the fields the payout path needs are read here.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub pix_key: String,
    pub pix_key_type: String,
    pub created_at: DateTime<Utc>,
}

pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, DatabaseError> {
        sqlx::query_as::<_, User>(
            "SELECT id, name, email, password, pix_key, pix_key_type, created_at
             FROM users
             WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
