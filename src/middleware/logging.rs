//! Per-request tracing span and access log

use axum::{extract::Request, middleware::Next, response::Response};
use http::HeaderValue;
use std::time::Instant;
use tower_http::request_id::{MakeRequestId, RequestId};
use tracing::{info, warn, Instrument};
use uuid::Uuid;

/// Generates a v4 UUID for requests that arrive without `x-request-id`
#[derive(Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let span = tracing::info_span!(
        "http_request",
        request_id = %request_id,
        method = %method,
        path = %path,
    );

    async move {
        let started = Instant::now();
        let response = next.run(request).await;
        let status = response.status();
        let latency_ms = started.elapsed().as_millis() as u64;

        if status.is_server_error() {
            warn!(status = status.as_u16(), latency_ms, "request failed");
        } else {
            info!(status = status.as_u16(), latency_ms, "request completed");
        }

        response
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_request_ids_are_uuids() {
        let mut maker = UuidRequestId;
        let request = http::Request::builder().body(()).unwrap();

        let id = maker.make_request_id(&request).unwrap();
        let value = id.header_value().to_str().unwrap();
        assert!(Uuid::parse_str(value).is_ok());
    }
}
