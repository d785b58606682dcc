use crate::config::PixConfig;
use crate::payments::auth::{AccessToken, TokenCache};
use crate::payments::error::{PixError, PixResult};
use crate::payments::provider::PixGateway;
use crate::payments::types::{
    Calendario, Charge, CobRequest, CobResponse, PixAmount, PixKeyRef, PixRefund, PixTransfer,
    QrCode, QrCodeResponse, RefundRequest, RefundResponse, SendRequest, SendResponse,
    TokenResponse, Valor, WebhookRequest,
};
use crate::payments::utils::{load_identity, mask_pix_key, GatewayAuth, PixHttpClient};
use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{info, warn};

/// Pix API client for Efí-compatible gateways (mutual TLS + OAuth client credentials)
pub struct EfiPixClient {
    base_url: String,
    client_id: String,
    client_secret: String,
    pix_key: String,
    charge_expiration: u64,
    http: PixHttpClient,
    tokens: TokenCache,
}

impl EfiPixClient {
    pub fn new(config: &PixConfig) -> PixResult<Self> {
        let identity = load_identity(&config.certificate, &config.certificate_password)?;
        let http = PixHttpClient::new(Duration::from_secs(config.request_timeout), identity)?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            pix_key: config.pix_key.clone(),
            charge_expiration: config.charge_expiration,
            http,
            tokens: TokenCache::default(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn fetch_token(&self) -> PixResult<AccessToken> {
        let body = serde_json::json!({ "grant_type": "client_credentials" });
        let value = self
            .http
            .request_json(
                "oauth_token",
                Method::POST,
                &self.endpoint("/oauth/token"),
                GatewayAuth::Basic {
                    user: &self.client_id,
                    password: &self.client_secret,
                },
                Some(&body),
                &[],
            )
            .await?;

        let token: TokenResponse = decode("oauth_token", value)?;
        info!(expires_in = token.expires_in, "🔑 Pix access token issued");

        Ok(AccessToken {
            value: token.access_token,
            expires_in: Duration::from_secs(token.expires_in),
        })
    }

    async fn access_token(&self) -> PixResult<String> {
        self.tokens.get_or_fetch(|| self.fetch_token()).await
    }

    /// Bearer call that refreshes the credential once when the gateway answers 401
    async fn authorized_call(
        &self,
        operation: &str,
        method: Method,
        path: &str,
        body: Option<&JsonValue>,
        headers: &[(&str, &str)],
    ) -> PixResult<JsonValue> {
        let url = self.endpoint(path);
        let token = self.access_token().await?;

        match self
            .http
            .request_json(
                operation,
                method.clone(),
                &url,
                GatewayAuth::Bearer(&token),
                body,
                headers,
            )
            .await
        {
            Err(PixError::Unauthorized { .. }) => {
                warn!(operation = %operation, "Pix access token rejected, refreshing once");
                self.tokens.invalidate().await;
                let token = self.access_token().await?;
                self.http
                    .request_json(
                        operation,
                        method,
                        &url,
                        GatewayAuth::Bearer(&token),
                        body,
                        headers,
                    )
                    .await
            }
            other => other,
        }
    }
}

fn decode<T: DeserializeOwned>(operation: &str, value: JsonValue) -> PixResult<T> {
    serde_json::from_value(value)
        .map_err(|e| PixError::unexpected(format!("{} response malformed: {}", operation, e)))
}

fn to_json<T: serde::Serialize>(operation: &str, body: &T) -> PixResult<JsonValue> {
    serde_json::to_value(body)
        .map_err(|e| PixError::unexpected(format!("{} request not serializable: {}", operation, e)))
}

#[async_trait]
impl PixGateway for EfiPixClient {
    async fn create_charge(&self, amount: &PixAmount, description: &str) -> PixResult<Charge> {
        let body = to_json(
            "create_charge",
            &CobRequest {
                calendario: Calendario {
                    expiracao: self.charge_expiration,
                },
                valor: Valor {
                    original: amount.to_string(),
                },
                chave: &self.pix_key,
                solicitacao_pagador: description,
            },
        )?;

        let value = self
            .authorized_call("create_charge", Method::POST, "/v2/cob", Some(&body), &[])
            .await?;
        let cob: CobResponse = decode("create_charge", value)?;

        info!(txid = %cob.txid, loc_id = cob.loc.id, amount = %amount, "🧾 Pix charge created");

        Ok(Charge {
            txid: cob.txid,
            loc_id: cob.loc.id,
            location: cob.loc.location,
            pix_copy_paste: cob.pix_copia_e_cola.unwrap_or_default(),
        })
    }

    async fn link_split(&self, txid: &str, split_config_id: &str) -> PixResult<()> {
        let path = format!("/v2/gn/split/cob/{}/vinculo/{}", txid, split_config_id);
        self.authorized_call("link_split", Method::PUT, &path, None, &[])
            .await?;
        Ok(())
    }

    async fn generate_qr_code(&self, loc_id: i64) -> PixResult<QrCode> {
        let path = format!("/v2/loc/{}/qrcode", loc_id);
        let value = self
            .authorized_call("generate_qr_code", Method::GET, &path, None, &[])
            .await?;
        let qr: QrCodeResponse = decode("generate_qr_code", value)?;

        Ok(QrCode {
            image_base64: qr.imagem_qrcode,
            copy_paste: qr.qrcode,
        })
    }

    async fn send_pix(
        &self,
        amount: &PixAmount,
        payer_key: &str,
        payee_key: &str,
        shipping_id: &str,
    ) -> PixResult<PixTransfer> {
        let body = to_json(
            "send_pix",
            &SendRequest {
                valor: amount.to_string(),
                pagador: PixKeyRef { chave: payer_key },
                favorecido: PixKeyRef { chave: payee_key },
            },
        )?;
        let path = format!("/v2/gn/pix/{}", shipping_id);

        let value = self
            .authorized_call("send_pix", Method::PUT, &path, Some(&body), &[])
            .await?;
        let sent: SendResponse = decode("send_pix", value)?;

        info!(
            shipping_id = %shipping_id,
            payee = %mask_pix_key(payee_key),
            status = %sent.status,
            "💸 Pix transfer requested"
        );

        Ok(PixTransfer {
            shipping_id: sent.id_envio.unwrap_or_else(|| shipping_id.to_string()),
            end_to_end_id: sent.e2e_id,
            status: sent.status,
        })
    }

    async fn refund_pix(
        &self,
        end_to_end_id: &str,
        refund_id: &str,
        amount: &PixAmount,
    ) -> PixResult<PixRefund> {
        let body = to_json(
            "refund_pix",
            &RefundRequest {
                valor: amount.to_string(),
            },
        )?;
        let path = format!("/v2/pix/{}/devolucao/{}", end_to_end_id, refund_id);

        let value = self
            .authorized_call("refund_pix", Method::PUT, &path, Some(&body), &[])
            .await?;
        let refund: RefundResponse = decode("refund_pix", value)?;

        info!(
            end_to_end_id = %end_to_end_id,
            refund_id = %refund_id,
            status = %refund.status,
            "↩️ Pix refund requested"
        );

        Ok(PixRefund {
            refund_id: refund.id.unwrap_or_else(|| refund_id.to_string()),
            rtr_id: refund.rtr_id,
            status: refund.status,
        })
    }

    async fn configure_webhook(&self, webhook_url: &str) -> PixResult<()> {
        let body = to_json("configure_webhook", &WebhookRequest { webhook_url })?;
        let path = format!("/v2/webhook/{}", self.pix_key);

        self.authorized_call(
            "configure_webhook",
            Method::PUT,
            &path,
            Some(&body),
            &[("x-skip-mtls-checking", "false")],
        )
        .await?;

        info!(webhook_url = %webhook_url, "🔗 Pix webhook registered");
        Ok(())
    }
}
