//! Services module for business logic

pub mod payments_core;

pub use payments_core::{
    ConfirmationInput, ConfirmationOutcome, CreateIntentInput, CreatedIntent, PaymentsCoreError,
    PaymentsCoreService,
};
