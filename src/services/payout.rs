//! Forwarding of confirmed donations to the campaign owner's Pix key.
//!
//! Only usable with a business gateway account. When the transfer fails the inbound
//! payment is returned to the donor with a refund keyed on its end-to-end id.

use crate::database::donation_repository::Donation;
use crate::database::transaction_repository::Transaction;
use crate::database::user_repository::User;
use crate::payments::ids::{refund_id, shipping_id};
use crate::payments::utils::mask_pix_key;
use crate::payments::{PixAmount, PixError, PixGateway, PixRefund, PixTransfer};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum PayoutError {
    #[error("payout failed ({transfer}); donor refunded ({})", .refund.status)]
    Refunded {
        transfer: PixError,
        refund: PixRefund,
    },

    #[error("payout failed ({transfer}); refund also failed ({refund})")]
    RefundFailed { transfer: PixError, refund: PixError },
}

impl PayoutError {
    pub fn refunded(&self) -> bool {
        matches!(self, PayoutError::Refunded { .. })
    }
}

pub struct PayoutService {
    gateway: Arc<dyn PixGateway>,
    payer_key: String,
}

impl PayoutService {
    pub fn new(gateway: Arc<dyn PixGateway>, payer_key: impl Into<String>) -> Self {
        Self {
            gateway,
            payer_key: payer_key.into(),
        }
    }

    pub async fn forward(
        &self,
        transaction: &Transaction,
        donation: &Donation,
        owner: &User,
        amount: &PixAmount,
        end_to_end_id: &str,
    ) -> Result<PixTransfer, PayoutError> {
        let shipping = shipping_id(transaction.loc_id, donation.id, owner.id);

        let transfer_error = match self
            .gateway
            .send_pix(amount, &self.payer_key, &owner.pix_key, &shipping)
            .await
        {
            Ok(transfer) => {
                info!(
                    txid = %transaction.txid,
                    shipping_id = %transfer.shipping_id,
                    payee = %mask_pix_key(&owner.pix_key),
                    "💸 Donation forwarded to campaign owner"
                );
                return Ok(transfer);
            }
            Err(e) => e,
        };

        warn!(
            txid = %transaction.txid,
            shipping_id = %shipping,
            error = %transfer_error,
            "Payout failed, refunding donor"
        );

        let refund = refund_id(end_to_end_id, transaction.loc_id, donation.id, owner.id);
        match self.gateway.refund_pix(end_to_end_id, &refund, amount).await {
            Ok(refund) => Err(PayoutError::Refunded {
                transfer: transfer_error,
                refund,
            }),
            Err(refund_error) => {
                error!(
                    txid = %transaction.txid,
                    end_to_end_id = %end_to_end_id,
                    error = %refund_error,
                    "❌ Refund after failed payout also failed"
                );
                Err(PayoutError::RefundFailed {
                    transfer: transfer_error,
                    refund: refund_error,
                })
            }
        }
    }
}
