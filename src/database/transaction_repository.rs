use crate::database::donation_repository::Donation;
use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::repository::TransactionStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{types::BigDecimal, FromRow, PgPool};
use std::fmt;
use uuid::Uuid;

/// Persisted status literals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransactionStatus {
    #[serde(rename = "Pendente pagamento")]
    Pending,
    #[serde(rename = "Pago")]
    Paid,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "Pendente pagamento",
            TransactionStatus::Paid => "Pago",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Pendente pagamento" => Some(TransactionStatus::Pending),
            "Pago" => Some(TransactionStatus::Paid),
            _ => None,
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transaction entity
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Transaction {
    pub id: Uuid,
    pub txid: String,
    pub loc_id: i64,
    pub location: String,
    pub qr_code: String,
    pub pix_copy_paste: String,
    pub amount: BigDecimal,
    pub alias: Option<String>,
    pub email: String,
    pub message: Option<String>,
    pub status: String,
    pub end_to_end_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub donation_id: Uuid,
}

impl Transaction {
    pub fn is_paid(&self) -> bool {
        TransactionStatus::parse(&self.status) == Some(TransactionStatus::Paid)
    }
}

/// Row to insert once the charge, split and QR code all succeeded
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub txid: String,
    pub loc_id: i64,
    pub location: String,
    pub qr_code: String,
    pub pix_copy_paste: String,
    pub amount: BigDecimal,
    pub alias: Option<String>,
    pub email: String,
    pub message: Option<String>,
    pub donation_id: Uuid,
}

/// Result of a settlement attempt
#[derive(Debug, Clone)]
pub enum SettlementOutcome {
    Settled {
        transaction: Transaction,
        donation: Donation,
    },
    /// The transaction was already paid, possibly by a concurrent delivery
    AlreadyPaid,
}

const TRANSACTION_COLUMNS: &str = "id, txid, loc_id, location, qr_code, pix_copy_paste, amount, \
     alias, email, message, status, end_to_end_id, paid_at, created_at, donation_id";

/// Repository for donation transactions
pub struct TransactionRepository {
    pool: PgPool,
}

impl TransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionStore for TransactionRepository {
    async fn create(&self, new: NewTransaction) -> Result<Transaction, DatabaseError> {
        let sql = format!(
            "INSERT INTO transactions
             (txid, loc_id, location, qr_code, pix_copy_paste, amount, alias, email, message,
              status, donation_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             RETURNING {}",
            TRANSACTION_COLUMNS
        );

        sqlx::query_as::<_, Transaction>(&sql)
            .bind(&new.txid)
            .bind(new.loc_id)
            .bind(&new.location)
            .bind(&new.qr_code)
            .bind(&new.pix_copy_paste)
            .bind(&new.amount)
            .bind(&new.alias)
            .bind(&new.email)
            .bind(&new.message)
            .bind(TransactionStatus::Pending.as_str())
            .bind(new.donation_id)
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Transaction>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM transactions WHERE id = $1",
            TRANSACTION_COLUMNS
        );

        sqlx::query_as::<_, Transaction>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    async fn find_by_txid(&self, txid: &str) -> Result<Option<Transaction>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM transactions WHERE txid = $1",
            TRANSACTION_COLUMNS
        );

        sqlx::query_as::<_, Transaction>(&sql)
            .bind(txid)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    async fn find_by_donation(
        &self,
        donation_id: Uuid,
        status: TransactionStatus,
    ) -> Result<Vec<Transaction>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM transactions
             WHERE donation_id = $1 AND status = $2
             ORDER BY created_at DESC",
            TRANSACTION_COLUMNS
        );

        sqlx::query_as::<_, Transaction>(&sql)
            .bind(donation_id)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    async fn settle(
        &self,
        id: Uuid,
        confirmed_amount: &BigDecimal,
        end_to_end_id: &str,
    ) -> Result<SettlementOutcome, DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        // Compare-and-swap: a second delivery for the same txid matches no row
        let sql = format!(
            "UPDATE transactions
             SET status = $2, end_to_end_id = $3, paid_at = NOW()
             WHERE id = $1 AND status <> $2
             RETURNING {}",
            TRANSACTION_COLUMNS
        );

        let transaction = sqlx::query_as::<_, Transaction>(&sql)
            .bind(id)
            .bind(TransactionStatus::Paid.as_str())
            .bind(end_to_end_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        let transaction = match transaction {
            Some(transaction) => transaction,
            None => {
                tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
                return Ok(SettlementOutcome::AlreadyPaid);
            }
        };

        let donation = sqlx::query_as::<_, Donation>(
            "UPDATE donations
             SET amount_raised = amount_raised + $2
             WHERE id = $1
             RETURNING id, name, description, goal, amount_raised, deadline, state, category,
                       url_image, created_at, deleted_at, user_id",
        )
        .bind(transaction.donation_id)
        .bind(confirmed_amount)
        .fetch_optional(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        let donation = match donation {
            Some(donation) => donation,
            None => {
                tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
                return Err(DatabaseError::new(DatabaseErrorKind::NotFound {
                    entity: "Donation".to_string(),
                    id: transaction.donation_id.to_string(),
                }));
            }
        };

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;

        Ok(SettlementOutcome::Settled {
            transaction,
            donation,
        })
    }
}
