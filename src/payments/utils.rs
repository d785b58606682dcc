use crate::config::CertificateSource;
use crate::payments::error::{PixError, PixResult};
use base64::Engine;
use reqwest::{Client, Identity, StatusCode};
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{debug, warn};

/// How a request authenticates against the gateway
#[derive(Debug, Clone, Copy)]
pub enum GatewayAuth<'a> {
    Basic { user: &'a str, password: &'a str },
    Bearer(&'a str),
}

/// Thin reqwest wrapper that classifies every response into [`PixError`].
///
/// Nothing is retried here; callers decide what to do with each class.
#[derive(Clone)]
pub struct PixHttpClient {
    client: Client,
    timeout: Duration,
}

impl PixHttpClient {
    pub fn new(timeout: Duration, identity: Option<Identity>) -> PixResult<Self> {
        let mut builder = Client::builder().timeout(timeout);
        if let Some(identity) = identity {
            builder = builder.identity(identity);
        }

        let client = builder.build().map_err(|e| PixError::Configuration {
            message: format!("failed to initialize HTTP client: {}", e),
        })?;

        Ok(Self { client, timeout })
    }

    pub async fn request_json(
        &self,
        operation: &str,
        method: reqwest::Method,
        url: &str,
        auth: GatewayAuth<'_>,
        body: Option<&JsonValue>,
        additional_headers: &[(&str, &str)],
    ) -> PixResult<JsonValue> {
        let mut request = self.client.request(method.clone(), url);

        request = match auth {
            GatewayAuth::Basic { user, password } => request.basic_auth(user, Some(password)),
            GatewayAuth::Bearer(token) => request.bearer_auth(token),
        };
        for (k, v) in additional_headers {
            request = request.header(*k, *v);
        }
        if let Some(payload) = body {
            request = request.json(payload);
        }

        debug!(operation = %operation, method = %method, url = %url, "Calling Pix gateway");

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                PixError::unexpected(format!(
                    "{} timed out after {}s",
                    operation,
                    self.timeout.as_secs()
                ))
            } else {
                PixError::unexpected(format!("{} request failed: {}", operation, e))
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| PixError::unexpected(format!("{} body unreadable: {}", operation, e)))?;

        classify_response(operation, status, &text)
    }
}

fn classify_response(operation: &str, status: StatusCode, text: &str) -> PixResult<JsonValue> {
    if status.is_success() {
        if text.trim().is_empty() {
            return Ok(JsonValue::Null);
        }
        return serde_json::from_str::<JsonValue>(text).map_err(|e| {
            PixError::unexpected(format!("{} returned invalid JSON: {}", operation, e))
        });
    }

    if status == StatusCode::UNAUTHORIZED {
        return Err(PixError::Unauthorized {
            operation: operation.to_string(),
        });
    }

    if status.is_client_error() {
        let reason = extract_reason(text).unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        warn!(
            operation = %operation,
            status = %status.as_u16(),
            reason = %reason,
            "Pix gateway rejected request"
        );
        return Err(PixError::Rejected {
            status: status.as_u16(),
            reason,
        });
    }

    Err(PixError::unexpected(format!(
        "{} failed with HTTP {}",
        operation,
        status.as_u16()
    )))
}

/// Pull the human-readable reason out of a gateway error body
pub fn extract_reason(body: &str) -> Option<String> {
    let json: JsonValue = serde_json::from_str(body).ok()?;

    let candidates = [
        json.get("mensagem"),
        json.get("error_description"),
        json.get("violacoes")
            .and_then(|v| v.get(0))
            .and_then(|v| v.get("razao")),
    ];

    // Bound to a local so the iterator's borrow of `json` ends before `json` drops
    let reason = candidates
        .into_iter()
        .flatten()
        .filter_map(|v| v.as_str())
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string);
    reason
}

/// Load the PKCS#12 client certificate used for mutual TLS
pub fn load_identity(source: &CertificateSource, password: &str) -> PixResult<Option<Identity>> {
    let der = match source {
        CertificateSource::None => return Ok(None),
        CertificateSource::File(path) => std::fs::read(path).map_err(|e| {
            PixError::Configuration {
                message: format!("cannot read certificate {}: {}", path.display(), e),
            }
        })?,
        CertificateSource::Base64(blob) => base64::engine::general_purpose::STANDARD
            .decode(blob.trim())
            .map_err(|e| PixError::Configuration {
                message: format!("certificate is not valid base64: {}", e),
            })?,
    };

    let identity =
        Identity::from_pkcs12_der(&der, password).map_err(|e| PixError::Configuration {
            message: format!("invalid PKCS#12 certificate: {}", e),
        })?;

    Ok(Some(identity))
}

/// Mask a Pix key for logs, keeping only its edges
pub fn mask_pix_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 6 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 3..].iter().collect();
    format!("{}***{}", head, tail)
}
