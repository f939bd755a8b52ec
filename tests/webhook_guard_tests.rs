//! End-to-end checks of the webhook ingestion guard: signed deliveries pass,
//! everything else is rejected with a reason code and in the right order.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use payments_backend::webhook::allowlist::IpAllowlist;
use payments_backend::webhook::replay::ReplayGuard;
use payments_backend::webhook::signature::SignatureRejection;
use payments_backend::webhook::{GuardContext, GuardRejection, WebhookGuard};

fn signed_header(secret: &str, ts: i64, request_id: &str, data_id: &str) -> String {
    let manifest = format!("{}.{}.{}", ts, request_id, data_id);
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(manifest.as_bytes());
    format!("ts={},v1={}", ts, hex::encode(mac.finalize().into_bytes()))
}

fn guard(secrets: &[&str], allowlist: IpAllowlist) -> WebhookGuard {
    WebhookGuard::new(
        secrets.iter().map(|s| s.to_string()).collect(),
        5 * 60 * 1000,
        ReplayGuard::new(None, 60_000),
        allowlist,
    )
}

fn provider_ctx(request_id: &str) -> GuardContext {
    GuardContext {
        actor_uid: None,
        request_id: request_id.to_string(),
        source_ip: Some("34.195.82.184".parse().unwrap()),
    }
}

#[tokio::test]
async fn genuine_delivery_from_provider_ip_passes() {
    let guard = guard(&["whsec_1"], IpAllowlist::default_providers());
    let ts = chrono::Utc::now().timestamp();
    let header = signed_header("whsec_1", ts, "req-1", "pay-1");

    assert!(guard
        .check(&provider_ctx("req-1"), &header, "pay-1")
        .await
        .is_ok());
}

#[tokio::test]
async fn rotation_keeps_old_secret_valid() {
    let guard = guard(&["whsec_new", "whsec_old"], IpAllowlist::default_providers());
    let ts = chrono::Utc::now().timestamp();
    let header = signed_header("whsec_old", ts, "req-1", "pay-1");

    assert!(guard
        .check(&provider_ctx("req-1"), &header, "pay-1")
        .await
        .is_ok());
}

#[tokio::test]
async fn forged_signature_is_rejected_before_anything_else() {
    // Even from an allowlisted address, a bad signature short-circuits.
    let guard = guard(&["whsec_1"], IpAllowlist::default_providers());
    let ts = chrono::Utc::now().timestamp();
    let header = signed_header("attacker-secret", ts, "req-1", "pay-1");

    let result = guard.check(&provider_ctx("req-1"), &header, "pay-1").await;
    assert_eq!(
        result,
        Err(GuardRejection::Signature(
            SignatureRejection::SignatureMismatch
        ))
    );
}

#[tokio::test]
async fn missing_header_is_rejected() {
    let guard = guard(&["whsec_1"], IpAllowlist::default_providers());
    let result = guard.check(&provider_ctx("req-1"), "", "pay-1").await;
    assert_eq!(
        result,
        Err(GuardRejection::Signature(
            SignatureRejection::MissingSignature
        ))
    );
}

#[tokio::test]
async fn expired_timestamp_is_rejected() {
    let guard = guard(&["whsec_1"], IpAllowlist::default_providers());
    let stale_ts = chrono::Utc::now().timestamp() - 3600;
    let header = signed_header("whsec_1", stale_ts, "req-1", "pay-1");

    let result = guard.check(&provider_ctx("req-1"), &header, "pay-1").await;
    assert_eq!(
        result,
        Err(GuardRejection::Signature(
            SignatureRejection::SignatureExpired
        ))
    );
}

#[tokio::test]
async fn off_allowlist_source_is_rejected_after_signature_passes() {
    let guard = guard(&["whsec_1"], IpAllowlist::default_providers());
    let ts = chrono::Utc::now().timestamp();
    let header = signed_header("whsec_1", ts, "req-1", "pay-1");
    let ctx = GuardContext {
        actor_uid: None,
        request_id: "req-1".to_string(),
        source_ip: Some("203.0.113.50".parse().unwrap()),
    };

    let result = guard.check(&ctx, &header, "pay-1").await;
    assert_eq!(result, Err(GuardRejection::IpBlocked));
    assert_eq!(result.unwrap_err().reason_code(), "ip_blocked");
}

#[tokio::test]
async fn custom_allowlist_overrides_defaults() {
    let guard = guard(&["whsec_1"], IpAllowlist::new(["203.0.113.0/24"]));
    let ts = chrono::Utc::now().timestamp();
    let header = signed_header("whsec_1", ts, "req-1", "pay-1");
    let ctx = GuardContext {
        actor_uid: None,
        request_id: "req-1".to_string(),
        source_ip: Some("203.0.113.50".parse().unwrap()),
    };

    assert!(guard.check(&ctx, &header, "pay-1").await.is_ok());
    // And the provider defaults are no longer accepted.
    assert_eq!(
        guard.check(&provider_ctx("req-1"), &header, "pay-1").await,
        Err(GuardRejection::IpBlocked)
    );
}
