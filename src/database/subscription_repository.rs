use crate::database::error::DatabaseError;
use crate::database::repository::SubscriptionStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// A live client waiting for the confirmation of `txid`
#[derive(Debug, Clone, FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub txid: String,
    pub socket_id: String,
    pub created_at: DateTime<Utc>,
}

/// Mirror of the in-memory socket registry in `websocket_connections`
pub struct SubscriptionRepository {
    pool: PgPool,
}

impl SubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionStore for SubscriptionRepository {
    async fn create(&self, txid: &str, socket_id: &str) -> Result<Subscription, DatabaseError> {
        sqlx::query_as::<_, Subscription>(
            "INSERT INTO websocket_connections (txid, socket_id)
             VALUES ($1, $2)
             RETURNING id, txid, socket_id, created_at",
        )
        .bind(txid)
        .bind(socket_id)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn delete_by_txid(&self, txid: &str) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM websocket_connections WHERE txid = $1")
            .bind(txid)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected())
    }

    async fn delete_by_socket(&self, socket_id: &str) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM websocket_connections WHERE socket_id = $1")
            .bind(socket_id)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected())
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM websocket_connections WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected())
    }
}
