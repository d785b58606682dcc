use serde::{Deserialize, Serialize};
use sqlx::types::BigDecimal;
use std::fmt;
use std::str::FromStr;

/// Positive BRL amount with at most two fractional digits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixAmount(BigDecimal);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    Invalid(String),
    NotPositive,
    TooManyDecimals,
}

impl fmt::Display for AmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmountError::Invalid(raw) => write!(f, "invalid decimal amount: {}", raw),
            AmountError::NotPositive => write!(f, "amount must be greater than zero"),
            AmountError::TooManyDecimals => {
                write!(f, "amount must have at most two decimal places")
            }
        }
    }
}

impl PixAmount {
    pub fn parse(raw: &str) -> Result<Self, AmountError> {
        let trimmed = raw.trim();
        // BigDecimal accepts exponents, which Pix does not
        if trimmed.is_empty()
            || !trimmed
                .chars()
                .all(|c| c.is_ascii_digit() || c == '.' || c == '-' || c == '+')
        {
            return Err(AmountError::Invalid(raw.to_string()));
        }

        let parsed =
            BigDecimal::from_str(trimmed).map_err(|_| AmountError::Invalid(raw.to_string()))?;
        if parsed <= BigDecimal::from(0) {
            return Err(AmountError::NotPositive);
        }

        let normalized = parsed.normalized();
        if normalized.fractional_digit_count() > 2 {
            return Err(AmountError::TooManyDecimals);
        }

        Ok(PixAmount(parsed.with_scale(2)))
    }

    pub fn as_decimal(&self) -> &BigDecimal {
        &self.0
    }

    pub fn into_decimal(self) -> BigDecimal {
        self.0
    }
}

impl From<&PixAmount> for BigDecimal {
    fn from(amount: &PixAmount) -> Self {
        amount.0.clone()
    }
}

/// Gateway wire format, always two decimals (`"100.00"`)
impl fmt::Display for PixAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.with_scale(2))
    }
}

/// Immediate charge created by `POST /v2/cob`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Charge {
    pub txid: String,
    pub loc_id: i64,
    pub location: String,
    pub pix_copy_paste: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrCode {
    pub image_base64: String,
    pub copy_paste: String,
}

/// Outbound transfer accepted by the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixTransfer {
    pub shipping_id: String,
    pub end_to_end_id: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixRefund {
    pub refund_id: String,
    pub rtr_id: Option<String>,
    pub status: String,
}

// Wire structures

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CobRequest<'a> {
    pub calendario: Calendario,
    pub valor: Valor,
    pub chave: &'a str,
    #[serde(rename = "solicitacaoPagador")]
    pub solicitacao_pagador: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct Calendario {
    pub expiracao: u64,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct Valor {
    pub original: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CobResponse {
    pub txid: String,
    pub loc: CobLocation,
    #[serde(rename = "pixCopiaECola", default)]
    pub pix_copia_e_cola: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CobLocation {
    pub id: i64,
    pub location: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct QrCodeResponse {
    #[serde(rename = "imagemQrcode")]
    pub imagem_qrcode: String,
    pub qrcode: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SendRequest<'a> {
    pub valor: String,
    pub pagador: PixKeyRef<'a>,
    pub favorecido: PixKeyRef<'a>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct PixKeyRef<'a> {
    pub chave: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SendResponse {
    #[serde(rename = "idEnvio", default)]
    pub id_envio: Option<String>,
    #[serde(rename = "e2eId", default)]
    pub e2e_id: Option<String>,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct RefundRequest {
    pub valor: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RefundResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "rtrId", default)]
    pub rtr_id: Option<String>,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct WebhookRequest<'a> {
    #[serde(rename = "webhookUrl")]
    pub webhook_url: &'a str,
}
