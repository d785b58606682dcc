use crate::payments::error::PixResult;
use crate::payments::types::{Charge, PixAmount, PixRefund, PixTransfer, QrCode};
use async_trait::async_trait;

/// Pix gateway operations consumed by the donation flows
#[async_trait]
pub trait PixGateway: Send + Sync {
    /// Immediate charge for `amount`, payable by anyone, shown with `description`
    async fn create_charge(&self, amount: &PixAmount, description: &str) -> PixResult<Charge>;

    /// Attach the split configuration to the charge
    async fn link_split(&self, txid: &str, split_config_id: &str) -> PixResult<()>;

    async fn generate_qr_code(&self, loc_id: i64) -> PixResult<QrCode>;

    async fn send_pix(
        &self,
        amount: &PixAmount,
        payer_key: &str,
        payee_key: &str,
        shipping_id: &str,
    ) -> PixResult<PixTransfer>;

    async fn refund_pix(
        &self,
        end_to_end_id: &str,
        refund_id: &str,
        amount: &PixAmount,
    ) -> PixResult<PixRefund>;

    /// Register the public confirmation URL for the receiving key
    async fn configure_webhook(&self, webhook_url: &str) -> PixResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::error::PixError;

    struct MockGateway;

    #[async_trait]
    impl PixGateway for MockGateway {
        async fn create_charge(&self, _amount: &PixAmount, _description: &str) -> PixResult<Charge> {
            Ok(Charge {
                txid: "mocktxid".to_string(),
                loc_id: 1,
                location: "pix.example.com/qr/v2/1".to_string(),
                pix_copy_paste: "000201...".to_string(),
            })
        }

        async fn link_split(&self, _txid: &str, _split_config_id: &str) -> PixResult<()> {
            Err(PixError::Rejected {
                status: 404,
                reason: "Split não encontrado".to_string(),
            })
        }

        async fn generate_qr_code(&self, _loc_id: i64) -> PixResult<QrCode> {
            Ok(QrCode {
                image_base64: "data:image/png;base64,AAAA".to_string(),
                copy_paste: "000201...".to_string(),
            })
        }

        async fn send_pix(
            &self,
            _amount: &PixAmount,
            _payer_key: &str,
            _payee_key: &str,
            shipping_id: &str,
        ) -> PixResult<PixTransfer> {
            Ok(PixTransfer {
                shipping_id: shipping_id.to_string(),
                end_to_end_id: None,
                status: "EM_PROCESSAMENTO".to_string(),
            })
        }

        async fn refund_pix(
            &self,
            _end_to_end_id: &str,
            refund_id: &str,
            _amount: &PixAmount,
        ) -> PixResult<PixRefund> {
            Ok(PixRefund {
                refund_id: refund_id.to_string(),
                rtr_id: None,
                status: "EM_PROCESSAMENTO".to_string(),
            })
        }

        async fn configure_webhook(&self, _webhook_url: &str) -> PixResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn trait_can_be_implemented_by_mock_gateway() {
        let gateway: Box<dyn PixGateway> = Box::new(MockGateway);
        let amount = PixAmount::parse("10.00").unwrap();

        let charge = gateway
            .create_charge(&amount, "Doação")
            .await
            .expect("charge should succeed");
        assert_eq!(charge.txid, "mocktxid");

        let split = gateway.link_split(&charge.txid, "split-1").await;
        assert!(matches!(split, Err(PixError::Rejected { status: 404, .. })));
    }
}
