//! Payment-provider webhook signature verification and event mapping.
//!
//! The provider signs each webhook with a header of the form
//! `t=<unix seconds>,v1=<hex hmac-sha256>` where the HMAC covers
//! `"{t}.{raw body}"`. Several `v1` entries may be present during secret
//! rotation; any match is accepted.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::CoreError;
use crate::hashing::{hex_decode, hex_encode};
use crate::plans::SubscriptionStatus;

type HmacSha256 = Hmac<Sha256>;

/// Name of the signature header sent by the provider.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Maximum accepted clock skew between the provider and us.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

// Provider event type names we react to.
pub const EVENT_SUBSCRIPTION_CREATED: &str = "customer.subscription.created";
pub const EVENT_SUBSCRIPTION_UPDATED: &str = "customer.subscription.updated";
pub const EVENT_SUBSCRIPTION_DELETED: &str = "customer.subscription.deleted";
pub const EVENT_INVOICE_PAID: &str = "invoice.paid";
pub const EVENT_INVOICE_PAYMENT_FAILED: &str = "invoice.payment_failed";
pub const EVENT_CHECKOUT_COMPLETED: &str = "checkout.session.completed";

/// Compute the hex signature for a payload at `timestamp`.
pub fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    hex_encode(mac_for(secret, timestamp, payload).finalize().into_bytes())
}

/// Build a full signature header, as the provider would send it.
pub fn signature_header(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    format!("t={timestamp},v1={}", compute_signature(secret, timestamp, payload))
}

/// Verify a webhook signature header against the raw request body.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
    tolerance_secs: i64,
) -> Result<(), CoreError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse().ok(),
            "v1" => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| CoreError::Unauthorized("Signature header missing timestamp".into()))?;
    if signatures.is_empty() {
        return Err(CoreError::Unauthorized(
            "Signature header missing v1 signature".into(),
        ));
    }
    let within_tolerance = now
        .checked_sub(timestamp)
        .map(i64::unsigned_abs)
        .is_some_and(|skew| skew <= tolerance_secs.unsigned_abs());
    if !within_tolerance {
        return Err(CoreError::Unauthorized(
            "Signature timestamp outside tolerance".into(),
        ));
    }

    for sig in signatures {
        let Some(expected) = hex_decode(sig) else {
            continue;
        };
        if mac_for(secret, timestamp, payload)
            .verify_slice(&expected)
            .is_ok()
        {
            return Ok(());
        }
    }
    Err(CoreError::Unauthorized("Signature mismatch".into()))
}

fn mac_for(secret: &str, timestamp: i64, payload: &[u8]) -> HmacSha256 {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    mac
}

/// Map a provider subscription status string onto ours.
///
/// Provider states without a direct counterpart collapse onto the closest
/// one: `incomplete`/`unpaid` behave as `past_due`, `incomplete_expired`
/// as `canceled`.
pub fn map_provider_status(raw: &str) -> SubscriptionStatus {
    match raw {
        "trialing" => SubscriptionStatus::Trialing,
        "active" => SubscriptionStatus::Active,
        "past_due" | "unpaid" | "incomplete" => SubscriptionStatus::PastDue,
        _ => SubscriptionStatus::Canceled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const SECRET: &str = "whsec_test";
    const BODY: &[u8] = br#"{"id":"evt_1","type":"invoice.paid"}"#;

    #[test]
    fn valid_signature_accepted() {
        let now = 1_700_000_000;
        let header = signature_header(SECRET, now, BODY);
        assert!(verify_signature(BODY, &header, SECRET, now + 10, DEFAULT_TOLERANCE_SECS).is_ok());
    }

    #[test]
    fn any_of_multiple_signatures_accepted() {
        let now = 1_700_000_000;
        let good = compute_signature(SECRET, now, BODY);
        let header = format!("t={now},v1={},v1={good}", "00".repeat(32));
        assert!(verify_signature(BODY, &header, SECRET, now, DEFAULT_TOLERANCE_SECS).is_ok());
    }

    #[test]
    fn tampered_body_rejected() {
        let now = 1_700_000_000;
        let header = signature_header(SECRET, now, BODY);
        assert_matches!(
            verify_signature(b"{}", &header, SECRET, now, DEFAULT_TOLERANCE_SECS),
            Err(CoreError::Unauthorized(m)) if m.contains("mismatch")
        );
    }

    #[test]
    fn stale_timestamp_rejected() {
        let then = 1_700_000_000;
        let header = signature_header(SECRET, then, BODY);
        assert_matches!(
            verify_signature(BODY, &header, SECRET, then + 301, DEFAULT_TOLERANCE_SECS),
            Err(CoreError::Unauthorized(m)) if m.contains("tolerance")
        );
    }

    #[test]
    fn extreme_timestamps_rejected_without_overflow() {
        let now = 1_700_000_000;
        for t in [i64::MIN, i64::MAX] {
            let header = format!("t={t},v1={}", compute_signature(SECRET, t, BODY));
            assert_matches!(
                verify_signature(BODY, &header, SECRET, now, DEFAULT_TOLERANCE_SECS),
                Err(CoreError::Unauthorized(m)) if m.contains("tolerance")
            );
        }
        let header = "t=-9223372036854775808,v1=00";
        assert!(verify_signature(BODY, header, SECRET, 0, DEFAULT_TOLERANCE_SECS).is_err());
    }

    #[test]
    fn malformed_headers_rejected() {
        assert!(verify_signature(BODY, "v1=abcd", SECRET, 0, 300).is_err());
        assert!(verify_signature(BODY, "t=0", SECRET, 0, 300).is_err());
        assert!(verify_signature(BODY, "t=0,v1=zz", SECRET, 0, 300).is_err());
    }

    #[test]
    fn provider_status_mapping() {
        assert_eq!(map_provider_status("active"), SubscriptionStatus::Active);
        assert_eq!(map_provider_status("unpaid"), SubscriptionStatus::PastDue);
        assert_eq!(map_provider_status("incomplete_expired"), SubscriptionStatus::Canceled);
    }
}
