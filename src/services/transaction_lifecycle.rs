//! Donation transaction creation and lookup.
//!
//! A transaction is only persisted after the gateway accepted the charge, linked the
//! split and produced a QR code. Any gateway failure aborts creation and nothing is
//! retried; the caller resubmits.

use crate::database::donation_repository::Donation;
use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::repository::{DonationStore, TransactionStore};
use crate::database::transaction_repository::{NewTransaction, Transaction, TransactionStatus};
use crate::error::{AppError, AppErrorKind, DomainError, ValidationError};
use crate::logging::mask_email;
use crate::payments::{PixAmount, PixError, PixGateway};
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, LazyLock};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const MAX_ALIAS_LEN: usize = 100;
pub const MAX_MESSAGE_LEN: usize = 500;

static EMAIL_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());

/// Amount as sent by clients, either `"10.00"` or `10.0`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Text(String),
    Number(serde_json::Number),
}

impl AmountInput {
    fn raw(&self) -> String {
        match self {
            AmountInput::Text(s) => s.clone(),
            AmountInput::Number(n) => n.to_string(),
        }
    }
}

/// Body of `POST /transactions`
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTransactionRequest {
    pub amount: Option<AmountInput>,
    pub alias: Option<String>,
    pub email: Option<String>,
    pub message: Option<String>,
    pub donation_id: Option<String>,
}

/// Payload that passed boundary validation
#[derive(Debug, Clone)]
pub struct NewDonationTransaction {
    pub amount: PixAmount,
    pub alias: Option<String>,
    pub email: String,
    pub message: Option<String>,
    pub donation_id: Uuid,
}

fn optional_text(
    value: Option<String>,
    field: &str,
    max: usize,
) -> Result<Option<String>, ValidationError> {
    match value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(v) if v.chars().count() > max => Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        }),
        other => Ok(other),
    }
}

impl CreateTransactionRequest {
    pub fn validate(self) -> Result<NewDonationTransaction, ValidationError> {
        let raw_amount = self
            .amount
            .ok_or_else(|| ValidationError::MissingField {
                field: "amount".to_string(),
            })?
            .raw();
        let amount =
            PixAmount::parse(&raw_amount).map_err(|e| ValidationError::InvalidAmount {
                amount: raw_amount.clone(),
                reason: e.to_string(),
            })?;

        let email = self
            .email
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ValidationError::MissingField {
                field: "email".to_string(),
            })?;
        let email_ok = EMAIL_RE
            .as_ref()
            .map(|re| re.is_match(&email))
            .unwrap_or(false);
        if !email_ok {
            return Err(ValidationError::InvalidEmail { email });
        }

        let raw_donation = self
            .donation_id
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .ok_or_else(|| ValidationError::MissingField {
                field: "donation_id".to_string(),
            })?;
        let donation_id =
            Uuid::parse_str(&raw_donation).map_err(|_| ValidationError::InvalidDonation {
                donation_id: raw_donation.clone(),
            })?;

        Ok(NewDonationTransaction {
            amount,
            alias: optional_text(self.alias, "alias", MAX_ALIAS_LEN)?,
            email,
            message: optional_text(self.message, "message", MAX_MESSAGE_LEN)?,
            donation_id,
        })
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("donation {0} is not an active campaign")]
    InvalidDonation(Uuid),

    #[error("donation {0} was removed before the transaction was stored")]
    DonationVanished(Uuid),

    #[error("transaction {0} not found")]
    TransactionNotFound(String),

    #[error("charge creation failed: {0}")]
    ChargeFailed(PixError),

    #[error("split link failed for txid {txid}: {source}")]
    SplitFailed { txid: String, source: PixError },

    #[error("QR code generation failed for txid {txid}: {source}")]
    QrCodeFailed { txid: String, source: PixError },

    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
}

impl From<LifecycleError> for AppError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::InvalidDonation(id) => {
                AppError::new(AppErrorKind::Validation(ValidationError::InvalidDonation {
                    donation_id: id.to_string(),
                }))
            }
            LifecycleError::DonationVanished(id) => {
                AppError::new(AppErrorKind::Domain(DomainError::DonationNotFound {
                    donation_id: id.to_string(),
                }))
            }
            LifecycleError::TransactionNotFound(id) => {
                AppError::new(AppErrorKind::Domain(DomainError::TransactionNotFound {
                    transaction_id: id,
                }))
            }
            LifecycleError::ChargeFailed(source) => {
                AppError::from(source).with_context("create_charge")
            }
            LifecycleError::SplitFailed { txid, source } => {
                AppError::from(source).with_context(format!("link_split txid={}", txid))
            }
            LifecycleError::QrCodeFailed { txid, source } => {
                AppError::from(source).with_context(format!("generate_qr_code txid={}", txid))
            }
            LifecycleError::Database(db) => db.into(),
        }
    }
}

pub struct TransactionLifecycle {
    donations: Arc<dyn DonationStore>,
    transactions: Arc<dyn TransactionStore>,
    gateway: Arc<dyn PixGateway>,
    split_config_id: String,
}

impl TransactionLifecycle {
    pub fn new(
        donations: Arc<dyn DonationStore>,
        transactions: Arc<dyn TransactionStore>,
        gateway: Arc<dyn PixGateway>,
        split_config_id: impl Into<String>,
    ) -> Self {
        Self {
            donations,
            transactions,
            gateway,
            split_config_id: split_config_id.into(),
        }
    }

    /// Charge, link split, render QR code, then persist as `Pendente pagamento`
    pub async fn create_transaction(
        &self,
        payload: NewDonationTransaction,
    ) -> Result<Transaction, LifecycleError> {
        let donation = self
            .donations
            .find_by_id(payload.donation_id)
            .await?
            .ok_or(LifecycleError::InvalidDonation(payload.donation_id))?;

        let description = format!(
            "Doação solidária para a campanha chamada {}",
            donation.name
        );

        let charge = self
            .gateway
            .create_charge(&payload.amount, &description)
            .await
            .map_err(|e| {
                warn!(donation_id = %donation.id, error = %e, "Pix charge failed");
                LifecycleError::ChargeFailed(e)
            })?;
        info!(txid = %charge.txid, donation_id = %donation.id, "Charge requested");

        self.gateway
            .link_split(&charge.txid, &self.split_config_id)
            .await
            .map_err(|e| {
                warn!(txid = %charge.txid, error = %e, "Split link failed");
                LifecycleError::SplitFailed {
                    txid: charge.txid.clone(),
                    source: e,
                }
            })?;

        let qr = self
            .gateway
            .generate_qr_code(charge.loc_id)
            .await
            .map_err(|e| {
                warn!(txid = %charge.txid, error = %e, "QR code generation failed");
                LifecycleError::QrCodeFailed {
                    txid: charge.txid.clone(),
                    source: e,
                }
            })?;

        let pix_copy_paste = if qr.copy_paste.is_empty() {
            charge.pix_copy_paste.clone()
        } else {
            qr.copy_paste
        };

        let created = self
            .transactions
            .create(NewTransaction {
                txid: charge.txid.clone(),
                loc_id: charge.loc_id,
                location: charge.location,
                qr_code: qr.image_base64,
                pix_copy_paste,
                amount: payload.amount.into_decimal(),
                alias: payload.alias,
                email: payload.email,
                message: payload.message,
                donation_id: donation.id,
            })
            .await
            .map_err(|e| match &e.kind {
                DatabaseErrorKind::ForeignKeyViolation { .. } => {
                    LifecycleError::DonationVanished(donation.id)
                }
                _ => {
                    error!(txid = %charge.txid, error = %e, "Failed to persist transaction");
                    LifecycleError::Database(e)
                }
            })?;

        info!(
            transaction_id = %created.id,
            txid = %created.txid,
            amount = %created.amount,
            email = %mask_email(&created.email),
            "✅ Donation transaction pending payment"
        );

        Ok(created)
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Transaction, LifecycleError> {
        self.transactions
            .find_by_id(id)
            .await?
            .ok_or_else(|| LifecycleError::TransactionNotFound(id.to_string()))
    }

    pub async fn get_by_txid(&self, txid: &str) -> Result<Transaction, LifecycleError> {
        self.transactions
            .find_by_txid(txid)
            .await?
            .ok_or_else(|| LifecycleError::TransactionNotFound(txid.to_string()))
    }

    /// Transactions of a campaign in the given status
    pub async fn get_by_donation(
        &self,
        donation_id: Uuid,
        status: TransactionStatus,
    ) -> Result<Vec<Transaction>, LifecycleError> {
        Ok(self
            .transactions
            .find_by_donation(donation_id, status)
            .await?)
    }

    /// Active campaign with its running total
    pub async fn get_donation(&self, donation_id: Uuid) -> Result<Option<Donation>, LifecycleError> {
        Ok(self.donations.find_by_id(donation_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(body: serde_json::Value) -> CreateTransactionRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn valid_payload_is_normalized() {
        let donation_id = Uuid::new_v4();
        let valid = request(json!({
            "amount": "25.5",
            "alias": "  ",
            "email": " ana@example.com ",
            "message": "Força!",
            "donation_id": donation_id.to_string(),
        }))
        .validate()
        .unwrap();

        assert_eq!(valid.amount.to_string(), "25.50");
        assert_eq!(valid.alias, None);
        assert_eq!(valid.email, "ana@example.com");
        assert_eq!(valid.message.as_deref(), Some("Força!"));
        assert_eq!(valid.donation_id, donation_id);
    }

    #[test]
    fn numeric_amount_is_accepted() {
        let valid = request(json!({
            "amount": 10,
            "email": "ana@example.com",
            "donation_id": Uuid::new_v4().to_string(),
        }))
        .validate()
        .unwrap();
        assert_eq!(valid.amount.to_string(), "10.00");
    }

    #[test]
    fn invalid_fields_are_rejected() {
        let id = Uuid::new_v4().to_string();

        let err = request(json!({"amount": "0", "email": "a@b.co", "donation_id": id}))
            .validate()
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidAmount { .. }));

        let err = request(json!({"amount": "1.00", "email": "nope", "donation_id": id}))
            .validate()
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidEmail { .. }));

        let err = request(json!({"amount": "1.00", "email": "a@b.co", "donation_id": "42"}))
            .validate()
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidDonation { .. }));

        let err = request(json!({"email": "a@b.co", "donation_id": id}))
            .validate()
            .unwrap_err();
        assert!(matches!(err, ValidationError::MissingField { ref field } if field == "amount"));
    }

    #[test]
    fn long_free_text_is_rejected() {
        let err = request(json!({
            "amount": "1.00",
            "email": "a@b.co",
            "donation_id": Uuid::new_v4().to_string(),
            "message": "x".repeat(MAX_MESSAGE_LEN + 1),
        }))
        .validate()
        .unwrap_err();
        assert!(matches!(err, ValidationError::TooLong { max: MAX_MESSAGE_LEN, .. }));
    }

    #[test]
    fn gateway_failures_keep_their_classification() {
        let rejected: AppError = LifecycleError::ChargeFailed(PixError::Rejected {
            status: 400,
            reason: "Valor inválido".to_string(),
        })
        .into();
        assert_eq!(rejected.status_code(), 400);
        assert_eq!(rejected.user_message(), "Valor inválido");

        let unexpected: AppError = LifecycleError::QrCodeFailed {
            txid: "t".to_string(),
            source: PixError::unexpected("timeout"),
        }
        .into();
        assert_eq!(unexpected.status_code(), 500);

        let vanished: AppError = LifecycleError::DonationVanished(Uuid::nil()).into();
        assert_eq!(vanished.status_code(), 404);
    }
}
