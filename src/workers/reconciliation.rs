//! Reconciliation sweeper: the pull half of the dual-path convergence.
//!
//! Webhooks can arrive late, out of order, or never. On a fixed interval this
//! worker scans attempts stuck in provider-pending states beyond a threshold,
//! re-fetches their provider status, and drives the result through the same
//! confirmation path the webhook uses. Re-driving an already-confirmed
//! payment is safe: the priority rule makes it a no-op at the intent level.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::database::attempt_repository::AttemptRepository;
use crate::domain::{ConfirmationSource, PaymentAttempt};
use crate::payments::provider::PaymentProvider;
use crate::services::{ConfirmationInput, PaymentsCoreService};

/// Typed errors produced by the sweeper.
///
/// These stay internal to the worker; the loop never propagates a hard
/// failure upward so one bad payment cannot take down the whole cycle.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("database error: {0}")]
    Database(#[from] crate::database::error::DatabaseError),

    #[error("provider error for payment {provider_payment_id}: {message}")]
    Provider {
        provider_payment_id: String,
        message: String,
    },
}

#[derive(Debug, Clone)]
pub struct ReconciliationConfig {
    /// How often the worker wakes up to sweep.
    pub poll_interval: Duration,
    /// Attempts whose last update is older than this are re-checked.
    pub pending_minutes: i64,
    /// Maximum number of attempts fetched per cycle.
    pub batch_size: i64,
    /// Attempts older than this trigger an operational alert.
    pub aged_alert_minutes: i64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            pending_minutes: 15,
            batch_size: 100,
            aged_alert_minutes: 120,
        }
    }
}

impl ReconciliationConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.poll_interval = Duration::from_secs(
            std::env::var("RECONCILIATION_POLL_INTERVAL_SECONDS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(cfg.poll_interval.as_secs()),
        );
        cfg.pending_minutes = parse_bounded(
            std::env::var("MP_RECONCILIATION_PENDING_MINUTES").ok(),
            cfg.pending_minutes,
            5,
            1440,
        );
        cfg.batch_size = parse_bounded(
            std::env::var("MP_RECONCILIATION_BATCH_SIZE").ok(),
            cfg.batch_size,
            1,
            500,
        );
        cfg.aged_alert_minutes = parse_bounded(
            std::env::var("MP_AGED_PENDING_ALERT_MINUTES").ok(),
            cfg.aged_alert_minutes,
            10,
            10080,
        );
        cfg
    }
}

/// Per-cycle outcome counts, logged after every sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub scanned: usize,
    pub confirmed: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub errors: usize,
    pub aged: usize,
}

pub struct ReconciliationWorker {
    attempts: AttemptRepository,
    core: PaymentsCoreService,
    provider: Arc<dyn PaymentProvider>,
    config: ReconciliationConfig,
}

impl ReconciliationWorker {
    pub fn new(
        pool: PgPool,
        core: PaymentsCoreService,
        provider: Arc<dyn PaymentProvider>,
        config: ReconciliationConfig,
    ) -> Self {
        Self {
            attempts: AttemptRepository::new(pool),
            core,
            provider,
            config,
        }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            pending_minutes = self.config.pending_minutes,
            batch_size = self.config.batch_size,
            aged_alert_minutes = self.config.aged_alert_minutes,
            "reconciliation worker started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("reconciliation worker stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    match self.run_cycle().await {
                        Ok(stats) if stats.scanned > 0 => {
                            info!(
                                scanned = stats.scanned,
                                confirmed = stats.confirmed,
                                unchanged = stats.unchanged,
                                skipped = stats.skipped,
                                errors = stats.errors,
                                aged = stats.aged,
                                "reconciliation cycle finished"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(error = %e, "reconciliation cycle failed");
                        }
                    }
                }
            }
        }

        info!("reconciliation worker stopped");
    }

    pub async fn run_cycle(&self) -> Result<SweepStats, SweepError> {
        let stale = self
            .attempts
            .find_stale_pending(self.config.pending_minutes, self.config.batch_size)
            .await?;

        let mut stats = SweepStats {
            scanned: stale.len(),
            ..SweepStats::default()
        };
        let now = Utc::now();

        for attempt in stale {
            // Aged-out attempts raise an alert but still get swept.
            if is_aged(attempt.updated_at, now, self.config.aged_alert_minutes) {
                stats.aged += 1;
                warn!(
                    tenant_id = %attempt.tenant_id,
                    attempt_id = %attempt.id,
                    intent_id = %attempt.intent_id,
                    stale_minutes = minutes_since(attempt.updated_at, now),
                    "payment attempt pending beyond alert threshold"
                );
            }

            match self.reconcile_attempt(&attempt).await {
                Ok(Some(applied)) => {
                    if applied {
                        stats.confirmed += 1;
                    } else {
                        stats.unchanged += 1;
                    }
                }
                Ok(None) => stats.skipped += 1,
                Err(e) => {
                    stats.errors += 1;
                    // Transient; the next scheduled pass retries.
                    warn!(
                        tenant_id = %attempt.tenant_id,
                        attempt_id = %attempt.id,
                        error = %e,
                        "failed to reconcile attempt"
                    );
                }
            }
        }

        Ok(stats)
    }

    /// Returns `Some(transition_applied)` when a confirmation was driven,
    /// `None` when the attempt has nothing to reconcile against yet.
    async fn reconcile_attempt(
        &self,
        attempt: &PaymentAttempt,
    ) -> Result<Option<bool>, SweepError> {
        // Without a provider payment id there is nothing to fetch; the
        // payment never progressed past checkout and the webhook will create
        // the linkage if it ever completes.
        let Some(provider_payment_id) = attempt
            .provider_payment_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
        else {
            return Ok(None);
        };

        let payment = self
            .provider
            .fetch_payment(provider_payment_id)
            .await
            .map_err(|e| SweepError::Provider {
                provider_payment_id: provider_payment_id.to_string(),
                message: e.to_string(),
            })?;

        let outcome = self
            .core
            .confirm(ConfirmationInput {
                tenant_id: attempt.tenant_id.clone(),
                intent_id: attempt.intent_id,
                attempt_id: attempt.id,
                provider_payment_id: payment.provider_payment_id.clone(),
                provider_status: payment.provider_status.clone(),
                // No provider event id on the pull path; the derived
                // payment-id:status key dedups repeated sweeps.
                provider_event_id: None,
                request_id: None,
                amount: payment.amount.clone(),
                currency: payment.currency.clone(),
                raw_provider_payload: payment.raw_payload.clone(),
                source: ConfirmationSource::Reconciliation,
                actor_uid: None,
            })
            .await
            .map_err(|e| match e {
                crate::services::PaymentsCoreError::Database(db) => SweepError::Database(db),
                other => SweepError::Provider {
                    provider_payment_id: provider_payment_id.to_string(),
                    message: other.to_string(),
                },
            })?;

        Ok(Some(outcome.transition_applied))
    }
}

// ---------------------------------------------------------------------------
// Pure helper functions
// ---------------------------------------------------------------------------

fn parse_bounded(value: Option<String>, fallback: i64, min: i64, max: i64) -> i64 {
    value
        .and_then(|v| v.trim().parse::<i64>().ok())
        .map(|v| v.clamp(min, max))
        .unwrap_or(fallback)
}

fn minutes_since(updated_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - updated_at).num_minutes()
}

/// An attempt is "aged" once its last update is older than the alert
/// threshold.
fn is_aged(updated_at: DateTime<Utc>, now: DateTime<Utc>, alert_minutes: i64) -> bool {
    minutes_since(updated_at, now) >= alert_minutes
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    // --- parse_bounded ------------------------------------------------------

    #[test]
    fn bounded_parse_clamps_to_range() {
        assert_eq!(parse_bounded(Some("3".to_string()), 15, 5, 1440), 5);
        assert_eq!(parse_bounded(Some("10000".to_string()), 15, 5, 1440), 1440);
        assert_eq!(parse_bounded(Some("30".to_string()), 15, 5, 1440), 30);
    }

    #[test]
    fn bounded_parse_falls_back_on_garbage() {
        assert_eq!(parse_bounded(Some("abc".to_string()), 15, 5, 1440), 15);
        assert_eq!(parse_bounded(None, 15, 5, 1440), 15);
        assert_eq!(parse_bounded(Some("".to_string()), 100, 1, 500), 100);
    }

    // --- aged detection -----------------------------------------------------

    #[test]
    fn aged_detection_uses_alert_threshold() {
        let now = Utc::now();
        let fresh = now - ChronoDuration::minutes(30);
        let old = now - ChronoDuration::minutes(180);

        assert!(!is_aged(fresh, now, 120));
        assert!(is_aged(old, now, 120));
    }

    #[test]
    fn aged_detection_boundary_is_inclusive() {
        let now = Utc::now();
        let exactly = now - ChronoDuration::minutes(120);
        assert!(is_aged(exactly, now, 120));
    }

    // --- config -------------------------------------------------------------

    #[test]
    fn default_config_matches_operational_defaults() {
        let cfg = ReconciliationConfig::default();
        assert_eq!(cfg.poll_interval, Duration::from_secs(60));
        assert_eq!(cfg.pending_minutes, 15);
        assert_eq!(cfg.batch_size, 100);
        assert_eq!(cfg.aged_alert_minutes, 120);
    }

    // --- sweep stats --------------------------------------------------------

    #[test]
    fn sweep_stats_start_at_zero() {
        let stats = SweepStats::default();
        assert_eq!(stats.scanned, 0);
        assert_eq!(stats.confirmed, 0);
        assert_eq!(stats.errors, 0);
    }
}
