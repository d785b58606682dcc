//! Data-access contracts
//!
//! Services depend on these traits rather than on the Postgres repositories so the
//! settlement pipeline can be driven against in-memory stores in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::BigDecimal;
use uuid::Uuid;

use super::donation_repository::Donation;
use super::error::DatabaseError;
use super::subscription_repository::Subscription;
use super::transaction_repository::{
    NewTransaction, SettlementOutcome, Transaction, TransactionStatus,
};
use super::user_repository::User;

#[async_trait]
pub trait DonationStore: Send + Sync {
    /// Active (non-deleted) campaign by id
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Donation>, DatabaseError>;
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn create(&self, new: NewTransaction) -> Result<Transaction, DatabaseError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Transaction>, DatabaseError>;

    async fn find_by_txid(&self, txid: &str) -> Result<Option<Transaction>, DatabaseError>;

    async fn find_by_donation(
        &self,
        donation_id: Uuid,
        status: TransactionStatus,
    ) -> Result<Vec<Transaction>, DatabaseError>;

    /// Mark the transaction paid and credit its campaign in one unit of work. This is
    /// the only writer of a campaign's `amount_raised`.
    ///
    /// Only a transaction that is not yet paid is touched; otherwise the outcome is
    /// [`SettlementOutcome::AlreadyPaid`] and nothing is written.
    async fn settle(
        &self,
        id: Uuid,
        confirmed_amount: &BigDecimal,
        end_to_end_id: &str,
    ) -> Result<SettlementOutcome, DatabaseError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, DatabaseError>;
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn create(&self, txid: &str, socket_id: &str) -> Result<Subscription, DatabaseError>;

    async fn delete_by_txid(&self, txid: &str) -> Result<u64, DatabaseError>;

    async fn delete_by_socket(&self, socket_id: &str) -> Result<u64, DatabaseError>;

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, DatabaseError>;
}
