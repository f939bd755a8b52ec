//! Webhook ingestion guard. Every inbound delivery passes three checks
//! before it is allowed anywhere near the payments core: signature
//! authenticity within a bounded time window, replay dedup within a TTL,
//! and a source-IP allowlist. Any failure short-circuits with a reason code
//! and no state mutation.

pub mod allowlist;
pub mod guard;
pub mod replay;
pub mod signature;

pub use guard::{GuardContext, GuardRejection, WebhookGuard};
