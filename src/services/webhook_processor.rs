use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::database::error::DatabaseError;
use crate::database::repository::{DonationStore, TransactionStore, UserStore};
use crate::database::transaction_repository::{SettlementOutcome, Transaction};
use crate::error::{AppError, AppErrorKind, DomainError, ExternalError, ValidationError};
use crate::payments::PixAmount;
use crate::services::notification::{NotificationChannel, PAYMENT_MESSAGE};
use crate::services::payout::{PayoutError, PayoutService};

#[derive(Debug, Error)]
pub enum WebhookProcessorError {
    #[error("Malformed confirmation payload: {0}")]
    Malformed(String),
    #[error("Confirmation for txid {txid} could not be correlated: {reason}")]
    Correlation { txid: String, reason: String },
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Payout failed for txid {txid}: {source}")]
    Payout { txid: String, source: PayoutError },
}

impl WebhookProcessorError {
    /// Rank used to pick the error reported for a batch; server-side failures win so
    /// the gateway redelivers
    fn severity(&self) -> u8 {
        match self {
            WebhookProcessorError::Malformed(_) | WebhookProcessorError::Correlation { .. } => 0,
            WebhookProcessorError::Payout { .. } => 1,
            WebhookProcessorError::Database(_) => 2,
        }
    }
}

impl From<WebhookProcessorError> for AppError {
    fn from(err: WebhookProcessorError) -> Self {
        match err {
            WebhookProcessorError::Malformed(reason) => AppError::new(AppErrorKind::Validation(
                ValidationError::MalformedPayload { reason },
            )),
            WebhookProcessorError::Correlation { txid, reason } => {
                AppError::new(AppErrorKind::Domain(DomainError::Correlation { txid, reason }))
            }
            WebhookProcessorError::Database(db) => db.into(),
            WebhookProcessorError::Payout { txid, source } => {
                AppError::new(AppErrorKind::External(ExternalError::Payout {
                    message: source.to_string(),
                    refunded: source.refunded(),
                }))
                .with_context(format!("txid={}", txid))
            }
        }
    }
}

/// One element of the gateway's `pix` array
#[derive(Debug, Clone)]
pub struct PixConfirmation {
    pub txid: String,
    pub end_to_end_id: String,
    pub amount: PixAmount,
}

#[derive(Debug, Clone)]
pub enum ConfirmationOutcome {
    Settled { transaction: Transaction },
    /// Already paid, acknowledged without touching the campaign total
    Duplicate { txid: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingSummary {
    pub processed: usize,
    pub duplicates: usize,
}

fn required_str(event: &JsonValue, field: &str, index: usize) -> Result<String, WebhookProcessorError> {
    event
        .get(field)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| WebhookProcessorError::Malformed(format!("pix[{}].{} is required", index, field)))
}

/// Extract `txid`, `endToEndId` and `valor` from every element of `{ "pix": [...] }`.
///
/// The whole payload is rejected if any element is incomplete.
pub fn parse_confirmations(payload: &JsonValue) -> Result<Vec<PixConfirmation>, WebhookProcessorError> {
    let events = payload
        .get("pix")
        .and_then(|v| v.as_array())
        .ok_or_else(|| WebhookProcessorError::Malformed("field 'pix' must be an array".to_string()))?;

    events
        .iter()
        .enumerate()
        .map(|(index, event)| {
            let txid = required_str(event, "txid", index)?;
            let end_to_end_id = required_str(event, "endToEndId", index)?;

            let raw_valor = match event.get("valor") {
                Some(JsonValue::String(s)) => s.clone(),
                Some(JsonValue::Number(n)) => n.to_string(),
                _ => {
                    return Err(WebhookProcessorError::Malformed(format!(
                        "pix[{}].valor is required",
                        index
                    )))
                }
            };
            let amount = PixAmount::parse(&raw_valor).map_err(|e| {
                WebhookProcessorError::Malformed(format!("pix[{}].valor: {}", index, e))
            })?;

            Ok(PixConfirmation {
                txid,
                end_to_end_id,
                amount,
            })
        })
        .collect()
}

pub struct WebhookProcessor {
    transactions: Arc<dyn TransactionStore>,
    donations: Arc<dyn DonationStore>,
    users: Arc<dyn UserStore>,
    notifier: Arc<dyn NotificationChannel>,
    payout: Option<Arc<PayoutService>>,
}

impl WebhookProcessor {
    pub fn new(
        transactions: Arc<dyn TransactionStore>,
        donations: Arc<dyn DonationStore>,
        users: Arc<dyn UserStore>,
        notifier: Arc<dyn NotificationChannel>,
    ) -> Self {
        Self {
            transactions,
            donations,
            users,
            notifier,
            payout: None,
        }
    }

    pub fn with_payout(mut self, payout: Arc<PayoutService>) -> Self {
        self.payout = Some(payout);
        self
    }

    /// Process every confirmation. After all were tried, the most severe failure is
    /// returned (the earliest one among equals).
    pub async fn process_batch(
        &self,
        confirmations: &[PixConfirmation],
    ) -> Result<ProcessingSummary, WebhookProcessorError> {
        let mut summary = ProcessingSummary::default();
        let mut worst_error: Option<WebhookProcessorError> = None;

        for confirmation in confirmations {
            match self.process_confirmation(confirmation).await {
                Ok(ConfirmationOutcome::Settled { .. }) => summary.processed += 1,
                Ok(ConfirmationOutcome::Duplicate { .. }) => summary.duplicates += 1,
                Err(e) => {
                    warn!(txid = %confirmation.txid, error = %e, "Confirmation processing failed");
                    let replace = worst_error
                        .as_ref()
                        .map_or(true, |current| e.severity() > current.severity());
                    if replace {
                        worst_error = Some(e);
                    }
                }
            }
        }

        match worst_error {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    pub async fn process_confirmation(
        &self,
        confirmation: &PixConfirmation,
    ) -> Result<ConfirmationOutcome, WebhookProcessorError> {
        let txid = confirmation.txid.as_str();

        let transaction = self
            .transactions
            .find_by_txid(txid)
            .await?
            .ok_or_else(|| {
                warn!(txid = %txid, "Confirmation for unknown txid");
                WebhookProcessorError::Correlation {
                    txid: txid.to_string(),
                    reason: "no transaction with this txid".to_string(),
                }
            })?;

        let donation = self
            .donations
            .find_by_id(transaction.donation_id)
            .await?
            .ok_or_else(|| WebhookProcessorError::Correlation {
                txid: txid.to_string(),
                reason: format!("donation {} not found", transaction.donation_id),
            })?;

        let owner = self
            .users
            .find_by_id(donation.user_id)
            .await?
            .ok_or_else(|| WebhookProcessorError::Correlation {
                txid: txid.to_string(),
                reason: format!("owner {} of donation {} not found", donation.user_id, donation.id),
            })?;

        if transaction.is_paid() {
            info!(txid = %txid, "Duplicate confirmation ignored");
            return Ok(ConfirmationOutcome::Duplicate {
                txid: txid.to_string(),
            });
        }

        if confirmation.amount.as_decimal() != &transaction.amount {
            warn!(
                txid = %txid,
                requested = %transaction.amount,
                confirmed = %confirmation.amount,
                "Confirmed amount differs from requested amount, crediting confirmed amount"
            );
        }

        let (settled, donation) = match self
            .transactions
            .settle(
                transaction.id,
                confirmation.amount.as_decimal(),
                &confirmation.end_to_end_id,
            )
            .await
        {
            Ok(SettlementOutcome::Settled {
                transaction,
                donation,
            }) => (transaction, donation),
            Ok(SettlementOutcome::AlreadyPaid) => {
                info!(txid = %txid, "Concurrent confirmation already settled this txid");
                return Ok(ConfirmationOutcome::Duplicate {
                    txid: txid.to_string(),
                });
            }
            Err(e) => {
                error!(txid = %txid, error = %e, "❌ Settlement failed");
                return Err(e.into());
            }
        };

        info!(
            txid = %txid,
            donation_id = %donation.id,
            amount = %confirmation.amount,
            amount_raised = %donation.amount_raised,
            "✅ Payment settled"
        );

        self.notify(txid).await;

        if let Some(payout) = &self.payout {
            payout
                .forward(
                    &settled,
                    &donation,
                    &owner,
                    &confirmation.amount,
                    &confirmation.end_to_end_id,
                )
                .await
                .map_err(|source| WebhookProcessorError::Payout {
                    txid: txid.to_string(),
                    source,
                })?;
        }

        Ok(ConfirmationOutcome::Settled {
            transaction: settled,
        })
    }

    // Notification problems never fail a settled confirmation
    async fn notify(&self, txid: &str) {
        if let Err(e) = self.notifier.publish(txid, PAYMENT_MESSAGE).await {
            warn!(txid = %txid, error = %e, "Payment notification failed");
        }
        if let Err(e) = self.notifier.unsubscribe(txid).await {
            warn!(txid = %txid, error = %e, "Subscription cleanup failed");
        }
    }
}
