pub mod entities;
pub mod status;

pub use entities::{PaymentAttempt, PaymentEvent, PaymentIntent, PaymentTransaction};
pub use status::{
    derive_idempotency_key, normalize_provider_status, resolve_transition, should_transition,
    AttemptStatus, ConfirmationSource, EventType, IntentStatus, TransactionStatus, Transition,
};
