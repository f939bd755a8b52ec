//! Signature verification for inbound webhook deliveries.
//!
//! Mercado Pago signs each delivery with an `x-signature` header of the form
//! `ts=<unix seconds>,v1=<hex hmac>`. The HMAC-SHA256 manifest is
//! `{ts}.{request_id}.{data_id}`. Verification accepts any secret from a
//! rotation-tolerant list, and only within a bounded freshness window.

use crate::payments::utils::secure_eq;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Why a signature check failed. Logged as the security-event reason code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureRejection {
    MissingSignature,
    InvalidTs,
    SignatureExpired,
    SignatureMismatch,
}

impl SignatureRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureRejection::MissingSignature => "missing_signature",
            SignatureRejection::InvalidTs => "invalid_ts",
            SignatureRejection::SignatureExpired => "signature_expired",
            SignatureRejection::SignatureMismatch => "signature_mismatch",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedSignature {
    pub ts: Option<i64>,
    pub v1: String,
}

/// Parse a `ts=...,v1=...` signature header. Unknown keys are ignored.
pub fn parse_signature(signature_header: &str) -> ParsedSignature {
    let mut raw_ts = "";
    let mut v1 = "";

    for part in signature_header.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        match key.trim() {
            "ts" => raw_ts = value.trim(),
            "v1" => v1 = value.trim(),
            _ => {}
        }
    }

    ParsedSignature {
        ts: raw_ts.parse::<i64>().ok(),
        v1: v1.to_string(),
    }
}

/// Validate a delivery's signature against every secret in the rotation set.
/// `now_ms` is the receiver's clock; `max_age_ms` bounds how far the signed
/// timestamp may drift in either direction.
pub fn validate_signature(
    signature_header: &str,
    request_id: &str,
    data_id: &str,
    secrets: &[String],
    now_ms: i64,
    max_age_ms: i64,
) -> Result<(), SignatureRejection> {
    let ParsedSignature { ts, v1 } = parse_signature(signature_header);

    if request_id.is_empty() || data_id.is_empty() || v1.is_empty() {
        return Err(SignatureRejection::MissingSignature);
    }
    let Some(ts) = ts else {
        return Err(SignatureRejection::MissingSignature);
    };

    if ts <= 0 {
        return Err(SignatureRejection::InvalidTs);
    }

    let request_age_ms = (now_ms - ts * 1000).abs();
    if request_age_ms > max_age_ms {
        return Err(SignatureRejection::SignatureExpired);
    }

    let manifest = format!("{}.{}.{}", ts, request_id, data_id);
    for secret in secrets {
        if secret.is_empty() {
            continue;
        }
        let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => continue,
        };
        mac.update(manifest.as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());
        if secure_eq(expected.as_bytes(), v1.as_bytes()) {
            return Ok(());
        }
    }

    Err(SignatureRejection::SignatureMismatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW_MS: i64 = 5 * 60 * 1000;

    fn sign(secret: &str, ts: i64, request_id: &str, data_id: &str) -> String {
        let manifest = format!("{}.{}.{}", ts, request_id, data_id);
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(manifest.as_bytes());
        format!("ts={},v1={}", ts, hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn header_parsing_extracts_ts_and_v1() {
        let parsed = parse_signature("ts=1700000000, v1=abc123");
        assert_eq!(parsed.ts, Some(1_700_000_000));
        assert_eq!(parsed.v1, "abc123");
    }

    #[test]
    fn header_parsing_ignores_unknown_keys_and_garbage() {
        let parsed = parse_signature("foo=bar,,ts=5,junk,v1=x");
        assert_eq!(parsed.ts, Some(5));
        assert_eq!(parsed.v1, "x");
    }

    #[test]
    fn valid_signature_is_accepted() {
        let ts = 1_700_000_000;
        let header = sign("secret", ts, "req-1", "pay-1");
        let secrets = vec!["secret".to_string()];
        assert!(validate_signature(&header, "req-1", "pay-1", &secrets, ts * 1000, WINDOW_MS).is_ok());
    }

    #[test]
    fn rotated_secret_still_validates() {
        let ts = 1_700_000_000;
        let header = sign("old-secret", ts, "req-1", "pay-1");
        let secrets = vec!["new-secret".to_string(), "old-secret".to_string()];
        assert!(validate_signature(&header, "req-1", "pay-1", &secrets, ts * 1000, WINDOW_MS).is_ok());
    }

    #[test]
    fn missing_parts_are_rejected() {
        let ts = 1_700_000_000;
        let header = sign("secret", ts, "req-1", "pay-1");
        let secrets = vec!["secret".to_string()];
        assert_eq!(
            validate_signature(&header, "", "pay-1", &secrets, ts * 1000, WINDOW_MS),
            Err(SignatureRejection::MissingSignature)
        );
        assert_eq!(
            validate_signature(&header, "req-1", "", &secrets, ts * 1000, WINDOW_MS),
            Err(SignatureRejection::MissingSignature)
        );
        assert_eq!(
            validate_signature("v1=abc", "req-1", "pay-1", &secrets, ts * 1000, WINDOW_MS),
            Err(SignatureRejection::MissingSignature)
        );
    }

    #[test]
    fn non_positive_ts_is_invalid() {
        let secrets = vec!["secret".to_string()];
        assert_eq!(
            validate_signature("ts=0,v1=abc", "req-1", "pay-1", &secrets, 1000, WINDOW_MS),
            Err(SignatureRejection::InvalidTs)
        );
        assert_eq!(
            validate_signature("ts=-5,v1=abc", "req-1", "pay-1", &secrets, 1000, WINDOW_MS),
            Err(SignatureRejection::InvalidTs)
        );
    }

    #[test]
    fn stale_signature_is_expired() {
        let ts = 1_700_000_000;
        let header = sign("secret", ts, "req-1", "pay-1");
        let secrets = vec!["secret".to_string()];
        let now = ts * 1000 + WINDOW_MS + 1;
        assert_eq!(
            validate_signature(&header, "req-1", "pay-1", &secrets, now, WINDOW_MS),
            Err(SignatureRejection::SignatureExpired)
        );
    }

    #[test]
    fn future_dated_signature_is_also_expired() {
        // The window bounds drift in both directions.
        let ts = 1_700_000_000;
        let header = sign("secret", ts, "req-1", "pay-1");
        let secrets = vec!["secret".to_string()];
        let now = ts * 1000 - WINDOW_MS - 1;
        assert_eq!(
            validate_signature(&header, "req-1", "pay-1", &secrets, now, WINDOW_MS),
            Err(SignatureRejection::SignatureExpired)
        );
    }

    #[test]
    fn wrong_secret_is_a_mismatch() {
        let ts = 1_700_000_000;
        let header = sign("secret", ts, "req-1", "pay-1");
        let secrets = vec!["other".to_string()];
        assert_eq!(
            validate_signature(&header, "req-1", "pay-1", &secrets, ts * 1000, WINDOW_MS),
            Err(SignatureRejection::SignatureMismatch)
        );
    }

    #[test]
    fn tampered_data_id_is_a_mismatch() {
        let ts = 1_700_000_000;
        let header = sign("secret", ts, "req-1", "pay-1");
        let secrets = vec!["secret".to_string()];
        assert_eq!(
            validate_signature(&header, "req-1", "pay-2", &secrets, ts * 1000, WINDOW_MS),
            Err(SignatureRejection::SignatureMismatch)
        );
    }
}
