//! Composition of the three ingestion checks. Nothing reaches the payments
//! core until a delivery has passed all of them.

use crate::webhook::allowlist::IpAllowlist;
use crate::webhook::replay::ReplayGuard;
use crate::webhook::signature::{validate_signature, SignatureRejection};
use std::net::IpAddr;
use thiserror::Error;
use tracing::warn;

/// Request-scoped facts the guard needs, passed explicitly so the core never
/// depends on any framework request type.
#[derive(Debug, Clone, Default)]
pub struct GuardContext {
    pub actor_uid: Option<String>,
    pub request_id: String,
    pub source_ip: Option<IpAddr>,
}

/// Reason-coded rejection. These are values, not exceptions: callers branch
/// on them to pick a response status, and every rejection is logged as a
/// security event before the handler sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GuardRejection {
    #[error("invalid signature: {0:?}")]
    Signature(SignatureRejection),
    #[error("replayed delivery")]
    Replayed,
    #[error("source ip not allowed")]
    IpBlocked,
}

impl GuardRejection {
    pub fn reason_code(&self) -> &'static str {
        match self {
            GuardRejection::Signature(inner) => inner.as_str(),
            GuardRejection::Replayed => "replayed",
            GuardRejection::IpBlocked => "ip_blocked",
        }
    }
}

pub struct WebhookGuard {
    secrets: Vec<String>,
    signature_window_ms: i64,
    replay: ReplayGuard,
    allowlist: IpAllowlist,
}

impl WebhookGuard {
    pub fn new(
        secrets: Vec<String>,
        signature_window_ms: i64,
        replay: ReplayGuard,
        allowlist: IpAllowlist,
    ) -> Self {
        Self {
            secrets,
            signature_window_ms,
            replay,
            allowlist,
        }
    }

    /// Run all three checks in order: signature, replay, allowlist. The first
    /// failure short-circuits; no state has been touched at that point beyond
    /// the replay cache entry itself.
    pub async fn check(
        &self,
        ctx: &GuardContext,
        signature_header: &str,
        data_id: &str,
    ) -> Result<(), GuardRejection> {
        let now_ms = chrono::Utc::now().timestamp_millis();

        if let Err(reason) = validate_signature(
            signature_header,
            &ctx.request_id,
            data_id,
            &self.secrets,
            now_ms,
            self.signature_window_ms,
        ) {
            let rejection = GuardRejection::Signature(reason);
            self.log_rejection(ctx, data_id, &rejection);
            return Err(rejection);
        }

        if self.replay.check_and_record(&ctx.request_id, data_id).await {
            let rejection = GuardRejection::Replayed;
            self.log_rejection(ctx, data_id, &rejection);
            return Err(rejection);
        }

        let ip_allowed = match ctx.source_ip {
            Some(ip) => self.allowlist.is_empty() || self.allowlist.contains(ip),
            // No resolvable source address fails closed.
            None => self.allowlist.is_empty(),
        };
        if !ip_allowed {
            let rejection = GuardRejection::IpBlocked;
            self.log_rejection(ctx, data_id, &rejection);
            return Err(rejection);
        }

        Ok(())
    }

    fn log_rejection(&self, ctx: &GuardContext, data_id: &str, rejection: &GuardRejection) {
        warn!(
            reason = rejection.reason_code(),
            request_id = %ctx.request_id,
            data_id = %data_id,
            source_ip = ?ctx.source_ip,
            "webhook delivery rejected"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    fn signed_header(secret: &str, ts: i64, request_id: &str, data_id: &str) -> String {
        let manifest = format!("{}.{}.{}", ts, request_id, data_id);
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(manifest.as_bytes());
        format!("ts={},v1={}", ts, hex::encode(mac.finalize().into_bytes()))
    }

    fn guard_with(allowlist: IpAllowlist) -> WebhookGuard {
        WebhookGuard::new(
            vec!["secret".to_string()],
            5 * 60 * 1000,
            ReplayGuard::new(None, 60_000),
            allowlist,
        )
    }

    fn ctx(request_id: &str, ip: &str) -> GuardContext {
        GuardContext {
            actor_uid: None,
            request_id: request_id.to_string(),
            source_ip: Some(ip.parse().unwrap()),
        }
    }

    #[tokio::test]
    async fn valid_delivery_passes_all_checks() {
        let guard = guard_with(IpAllowlist::new(["127.0.0.0/8"]));
        let ts = chrono::Utc::now().timestamp();
        let header = signed_header("secret", ts, "req-1", "pay-1");

        let result = guard.check(&ctx("req-1", "127.0.0.1"), &header, "pay-1").await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn bad_signature_is_rejected_with_reason() {
        let guard = guard_with(IpAllowlist::new(["127.0.0.0/8"]));
        let result = guard
            .check(&ctx("req-1", "127.0.0.1"), "ts=1,v1=bogus", "pay-1")
            .await;
        assert!(matches!(result, Err(GuardRejection::Signature(_))));
        assert_eq!(result.unwrap_err().reason_code(), "signature_expired");
    }

    #[tokio::test]
    async fn disallowed_ip_is_rejected() {
        let guard = guard_with(IpAllowlist::new(["10.0.0.0/8"]));
        let ts = chrono::Utc::now().timestamp();
        let header = signed_header("secret", ts, "req-1", "pay-1");

        let result = guard.check(&ctx("req-1", "127.0.0.1"), &header, "pay-1").await;
        assert_eq!(result, Err(GuardRejection::IpBlocked));
        assert_eq!(result.unwrap_err().reason_code(), "ip_blocked");
    }

    #[tokio::test]
    async fn missing_source_ip_fails_closed_when_allowlist_configured() {
        let guard = guard_with(IpAllowlist::new(["10.0.0.0/8"]));
        let ts = chrono::Utc::now().timestamp();
        let header = signed_header("secret", ts, "req-1", "pay-1");
        let ctx = GuardContext {
            actor_uid: None,
            request_id: "req-1".to_string(),
            source_ip: None,
        };

        let result = guard.check(&ctx, &header, "pay-1").await;
        assert_eq!(result, Err(GuardRejection::IpBlocked));
    }
}
