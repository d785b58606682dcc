//! Deterministic identifiers for outbound transfers and refunds.
//!
//! The gateway treats these ids as idempotency keys, so the same confirmation always
//! maps to the same transfer.

use sha2::{Digest, Sha256};
use uuid::Uuid;

const GATEWAY_ID_LEN: usize = 35;

fn derive(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    let digest = hex::encode(hasher.finalize());

    let mut id: String = digest.chars().take(GATEWAY_ID_LEN).collect();
    while id.len() < GATEWAY_ID_LEN {
        id.push('0');
    }
    id
}

/// `idEnvio` for forwarding a settled donation to its owner
pub fn shipping_id(loc_id: i64, donation_id: Uuid, user_id: Uuid) -> String {
    derive(&[
        &loc_id.to_string(),
        &donation_id.to_string(),
        &user_id.to_string(),
    ])
}

/// Refund id used when the forward transfer fails
pub fn refund_id(end_to_end_id: &str, loc_id: i64, donation_id: Uuid, user_id: Uuid) -> String {
    derive(&[
        end_to_end_id,
        &loc_id.to_string(),
        &donation_id.to_string(),
        &user_id.to_string(),
    ])
}
