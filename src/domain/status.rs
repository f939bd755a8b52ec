//! Canonical payment statuses and the provider-status transition table.
//!
//! The transition table is the single source of truth for how a raw provider
//! status string maps onto the `(intent, attempt, transaction)` status triple,
//! and the intent priority ranking decides whether a candidate transition may
//! be applied over the current one. Unknown provider statuses fail closed to
//! FAILED rather than being dropped, so a payment can never sit in an
//! unrecognized limbo state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical lifecycle status of a payment intent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentStatus {
    Created,
    RequiresConfirmation,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

impl IntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::Created => "CREATED",
            IntentStatus::RequiresConfirmation => "REQUIRES_CONFIRMATION",
            IntentStatus::Processing => "PROCESSING",
            IntentStatus::Succeeded => "SUCCEEDED",
            IntentStatus::Failed => "FAILED",
            IntentStatus::Canceled => "CANCELED",
        }
    }

    /// Monotonic ranking. A transition to a candidate status is applied only
    /// when `priority(candidate) >= priority(current)`, which makes late or
    /// duplicated confirmations idempotent: a stale "pending" can never undo
    /// an already-recorded "approved". FAILED/CANCELED rank below SUCCEEDED,
    /// so a late approval can still correct a payment previously marked
    /// failed, but not the other way around.
    pub fn priority(&self) -> u8 {
        match self {
            IntentStatus::Created => 10,
            IntentStatus::RequiresConfirmation => 20,
            IntentStatus::Processing => 30,
            IntentStatus::Failed | IntentStatus::Canceled => 40,
            IntentStatus::Succeeded => 50,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CREATED" => Some(IntentStatus::Created),
            "REQUIRES_CONFIRMATION" => Some(IntentStatus::RequiresConfirmation),
            "PROCESSING" => Some(IntentStatus::Processing),
            "SUCCEEDED" => Some(IntentStatus::Succeeded),
            "FAILED" => Some(IntentStatus::Failed),
            "CANCELED" => Some(IntentStatus::Canceled),
            _ => None,
        }
    }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of one concrete collection attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptStatus {
    Initiated,
    PendingProvider,
    Authorized,
    Captured,
    Failed,
    Canceled,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Initiated => "INITIATED",
            AttemptStatus::PendingProvider => "PENDING_PROVIDER",
            AttemptStatus::Authorized => "AUTHORIZED",
            AttemptStatus::Captured => "CAPTURED",
            AttemptStatus::Failed => "FAILED",
            AttemptStatus::Canceled => "CANCELED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "INITIATED" => Some(AttemptStatus::Initiated),
            "PENDING_PROVIDER" => Some(AttemptStatus::PendingProvider),
            "AUTHORIZED" => Some(AttemptStatus::Authorized),
            "CAPTURED" => Some(AttemptStatus::Captured),
            "FAILED" => Some(AttemptStatus::Failed),
            "CANCELED" => Some(AttemptStatus::Canceled),
            _ => None,
        }
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of the provider's own payment record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Approved,
    Rejected,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Approved => "APPROVED",
            TransactionStatus::Rejected => "REJECTED",
            TransactionStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ledger event types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    IntentCreated,
    AttemptCreated,
    StatusTransition,
    WebhookConfirmed,
    Reconciled,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::IntentCreated => "INTENT_CREATED",
            EventType::AttemptCreated => "ATTEMPT_CREATED",
            EventType::StatusTransition => "STATUS_TRANSITION",
            EventType::WebhookConfirmed => "WEBHOOK_CONFIRMED",
            EventType::Reconciled => "RECONCILED",
        }
    }
}

/// Who drove a confirmation into the ledger.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationSource {
    System,
    Webhook,
    Reconciliation,
}

impl ConfirmationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmationSource::System => "system",
            ConfirmationSource::Webhook => "webhook",
            ConfirmationSource::Reconciliation => "reconciliation",
        }
    }

    /// Confirmations from the webhook path and the reconciliation sweep write
    /// different event types; everything else is a system event.
    pub fn event_type(&self) -> EventType {
        match self {
            ConfirmationSource::Webhook => EventType::WebhookConfirmed,
            ConfirmationSource::Reconciliation => EventType::Reconciled,
            ConfirmationSource::System => EventType::StatusTransition,
        }
    }
}

impl fmt::Display for ConfirmationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The status triple a provider status resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub intent_status: IntentStatus,
    pub attempt_status: AttemptStatus,
    pub transaction_status: TransactionStatus,
}

pub fn normalize_provider_status(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Fixed mapping from a provider's raw status string to the canonical triple.
/// Unknown statuses map to an all-FAILED triple.
pub fn resolve_transition(provider_status: &str) -> Transition {
    match normalize_provider_status(provider_status).as_str() {
        "pending" => Transition {
            intent_status: IntentStatus::Processing,
            attempt_status: AttemptStatus::PendingProvider,
            transaction_status: TransactionStatus::Pending,
        },
        "in_process" => Transition {
            intent_status: IntentStatus::Processing,
            attempt_status: AttemptStatus::Authorized,
            transaction_status: TransactionStatus::Pending,
        },
        "approved" => Transition {
            intent_status: IntentStatus::Succeeded,
            attempt_status: AttemptStatus::Captured,
            transaction_status: TransactionStatus::Approved,
        },
        "rejected" => Transition {
            intent_status: IntentStatus::Failed,
            attempt_status: AttemptStatus::Failed,
            transaction_status: TransactionStatus::Rejected,
        },
        "cancelled" => Transition {
            intent_status: IntentStatus::Canceled,
            attempt_status: AttemptStatus::Canceled,
            transaction_status: TransactionStatus::Failed,
        },
        "charged_back" => Transition {
            intent_status: IntentStatus::Failed,
            attempt_status: AttemptStatus::Failed,
            transaction_status: TransactionStatus::Rejected,
        },
        _ => Transition {
            intent_status: IntentStatus::Failed,
            attempt_status: AttemptStatus::Failed,
            transaction_status: TransactionStatus::Failed,
        },
    }
}

/// Priority rule: apply the candidate only when it ranks at least as high as
/// the current status.
pub fn should_transition(from: IntentStatus, to: IntentStatus) -> bool {
    to.priority() >= from.priority()
}

/// Idempotency key for a confirmation: the provider's own event id when the
/// delivery carried one, else a deterministic fallback derived from the
/// payment id and the normalized status.
pub fn derive_idempotency_key(
    provider_event_id: Option<&str>,
    provider_payment_id: &str,
    provider_status: &str,
) -> String {
    match provider_event_id {
        Some(id) if !id.trim().is_empty() => id.trim().to_string(),
        _ => format!(
            "{}:{}",
            provider_payment_id,
            normalize_provider_status(provider_status)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_statuses_map_to_expected_triples() {
        let cases = [
            ("pending", IntentStatus::Processing, AttemptStatus::PendingProvider, TransactionStatus::Pending),
            ("in_process", IntentStatus::Processing, AttemptStatus::Authorized, TransactionStatus::Pending),
            ("approved", IntentStatus::Succeeded, AttemptStatus::Captured, TransactionStatus::Approved),
            ("rejected", IntentStatus::Failed, AttemptStatus::Failed, TransactionStatus::Rejected),
            ("cancelled", IntentStatus::Canceled, AttemptStatus::Canceled, TransactionStatus::Failed),
            ("charged_back", IntentStatus::Failed, AttemptStatus::Failed, TransactionStatus::Rejected),
        ];
        for (raw, intent, attempt, transaction) in cases {
            let t = resolve_transition(raw);
            assert_eq!(t.intent_status, intent, "intent for {}", raw);
            assert_eq!(t.attempt_status, attempt, "attempt for {}", raw);
            assert_eq!(t.transaction_status, transaction, "transaction for {}", raw);
        }
    }

    #[test]
    fn unknown_provider_status_fails_closed() {
        let t = resolve_transition("some_new_status");
        assert_eq!(t.intent_status, IntentStatus::Failed);
        assert_eq!(t.attempt_status, AttemptStatus::Failed);
        assert_eq!(t.transaction_status, TransactionStatus::Failed);
    }

    #[test]
    fn lookup_normalizes_case_and_whitespace() {
        let t = resolve_transition("  Approved ");
        assert_eq!(t.intent_status, IntentStatus::Succeeded);
    }

    #[test]
    fn priority_ordering_is_monotonic() {
        assert!(IntentStatus::Created.priority() < IntentStatus::RequiresConfirmation.priority());
        assert!(IntentStatus::RequiresConfirmation.priority() < IntentStatus::Processing.priority());
        assert!(IntentStatus::Processing.priority() < IntentStatus::Failed.priority());
        assert_eq!(IntentStatus::Failed.priority(), IntentStatus::Canceled.priority());
        assert!(IntentStatus::Failed.priority() < IntentStatus::Succeeded.priority());
    }

    #[test]
    fn succeeded_blocks_lower_priority_transitions() {
        assert!(!should_transition(IntentStatus::Succeeded, IntentStatus::Processing));
        assert!(!should_transition(IntentStatus::Succeeded, IntentStatus::Failed));
        assert!(!should_transition(IntentStatus::Succeeded, IntentStatus::Canceled));
        // Re-applying the same terminal status is allowed (idempotent).
        assert!(should_transition(IntentStatus::Succeeded, IntentStatus::Succeeded));
    }

    #[test]
    fn failed_can_still_be_promoted_to_succeeded() {
        // A late approval legitimately corrects a payment marked failed.
        assert!(should_transition(IntentStatus::Failed, IntentStatus::Succeeded));
        assert!(should_transition(IntentStatus::Canceled, IntentStatus::Succeeded));
    }

    #[test]
    fn idempotency_key_prefers_provider_event_id() {
        assert_eq!(derive_idempotency_key(Some("evt_1"), "pay_1", "approved"), "evt_1");
        assert_eq!(derive_idempotency_key(None, "pay_1", "Approved "), "pay_1:approved");
        // Blank event ids fall through to the derived form.
        assert_eq!(derive_idempotency_key(Some("  "), "pay_1", "rejected"), "pay_1:rejected");
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            IntentStatus::Created,
            IntentStatus::RequiresConfirmation,
            IntentStatus::Processing,
            IntentStatus::Succeeded,
            IntentStatus::Failed,
            IntentStatus::Canceled,
        ] {
            assert_eq!(IntentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(IntentStatus::parse("NOPE"), None);
    }
}
