//! Payment deadline monitor.
//!
//! A sweep walks every tournament that enforces a payment deadline and
//! expires each overdue payment in its own unit of work. One payment failing
//! never stops the rest of the sweep.

use super::models::{PaymentId, SweepReport};
use crate::{
    db::{repository::RegistrationRepository, timeouts::with_timeout},
    error::{CoreError, CoreResult},
    participant::TournamentId,
};
use chrono::{DateTime, Utc};
use std::{sync::Arc, time::Duration};

/// Default time between sweeps (15 minutes)
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Expires unverified payments and hands their slots to the waitlist
pub struct PaymentDeadlineMonitor<R> {
    store: Arc<R>,
    op_timeout: Duration,
}

impl<R> Clone for PaymentDeadlineMonitor<R> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            op_timeout: self.op_timeout,
        }
    }
}

impl<R: RegistrationRepository> PaymentDeadlineMonitor<R> {
    pub fn new(store: Arc<R>, op_timeout: Duration) -> Self {
        Self { store, op_timeout }
    }

    /// Run one sweep as of `now`
    ///
    /// Only listing the tournaments can fail the sweep as a whole; per
    /// tournament and per payment errors are logged and counted.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> CoreResult<SweepReport> {
        let policies = with_timeout(self.op_timeout, self.store.policies_with_deadline()).await?;
        let mut report = SweepReport::default();

        for policy in policies {
            let Some(deadline) = policy.payment_deadline() else {
                continue;
            };
            let cutoff = now - deadline;

            let due = match with_timeout(
                self.op_timeout,
                self.store.expired_payments(policy.tournament_id, cutoff),
            )
            .await
            {
                Ok(due) => due,
                Err(e) => {
                    log::error!(
                        "Payment sweep: listing overdue payments of tournament {} failed: {}",
                        policy.tournament_id,
                        e
                    );
                    report.failed_count += 1;
                    continue;
                }
            };

            for payment_id in due {
                report.merge(self.expire_one(policy.tournament_id, payment_id, now).await);
            }
        }

        if report.expired_count > 0 || report.failed_count > 0 {
            log::info!(
                "Payment sweep at {}: {} expired, {} promoted, {} skipped, {} failed",
                now,
                report.expired_count,
                report.promoted_count,
                report.skipped_count,
                report.failed_count
            );
        }
        Ok(report)
    }

    async fn expire_one(
        &self,
        tournament_id: TournamentId,
        payment_id: PaymentId,
        now: DateTime<Utc>,
    ) -> SweepReport {
        let result = with_timeout(
            self.op_timeout,
            self.store
                .update_registrations(tournament_id, move |book| book.expire_payment(payment_id, now)),
        )
        .await;

        match result {
            Ok(outcome) => {
                log::info!(
                    "Payment {} expired; registration {} cancelled, promoted {:?}",
                    outcome.payment_id,
                    outcome.cancelled_registration,
                    outcome.promoted_registration
                );
                SweepReport {
                    expired_count: 1,
                    promoted_count: usize::from(outcome.promoted_registration.is_some()),
                    ..SweepReport::default()
                }
            }
            // Verified, waived or expired by a concurrent unit of work.
            Err(CoreError::Conflict(reason)) => {
                log::debug!("Payment {} skipped: {}", payment_id, reason);
                SweepReport {
                    skipped_count: 1,
                    ..SweepReport::default()
                }
            }
            Err(e) => {
                log::error!(
                    "Expiring payment {} of tournament {} failed: {}",
                    payment_id,
                    tournament_id,
                    e
                );
                SweepReport {
                    failed_count: 1,
                    ..SweepReport::default()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{MemoryStore, timeouts::DEFAULT_TRANSACTION_TIMEOUT},
        registration::{PaymentStatus, RegistrationStatus, TournamentPolicy},
    };
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    async fn store_with(policy: TournamentPolicy) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.upsert_policy(&policy).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_sweep_skips_tournaments_without_deadline() {
        let store = store_with(TournamentPolicy {
            tournament_id: 1,
            capacity: 1,
            entry_fee: 500,
            payment_deadline_hours: None,
        })
        .await;

        let (_, payment) = store
            .update_registrations(1, |book| {
                let r = book.register(10, t0())?;
                let p = book.submit_payment(r.id, t0())?;
                Ok((r, p))
            })
            .await
            .unwrap();

        let monitor = PaymentDeadlineMonitor::new(store.clone(), DEFAULT_TRANSACTION_TIMEOUT);
        let report = monitor.sweep_at(t0() + ChronoDuration::days(30)).await.unwrap();
        assert_eq!(report, SweepReport::default());

        let payments = store
            .update_registrations(1, |book| Ok(book.payment(payment.id)?.status))
            .await
            .unwrap();
        assert_eq!(payments, PaymentStatus::Submitted);
    }

    #[tokio::test]
    async fn test_sweep_expires_and_promotes() {
        let store = store_with(TournamentPolicy {
            tournament_id: 2,
            capacity: 1,
            entry_fee: 500,
            payment_deadline_hours: Some(24),
        })
        .await;

        let waiting = store
            .update_registrations(2, |book| {
                let r = book.register(10, t0())?;
                book.submit_payment(r.id, t0())?;
                book.register(11, t0())
            })
            .await
            .unwrap();
        assert_eq!(waiting.status, RegistrationStatus::Waitlisted);

        let monitor = PaymentDeadlineMonitor::new(store.clone(), DEFAULT_TRANSACTION_TIMEOUT);

        let early = monitor.sweep_at(t0() + ChronoDuration::hours(23)).await.unwrap();
        assert_eq!(early.expired_count, 0);

        let report = monitor.sweep_at(t0() + ChronoDuration::hours(25)).await.unwrap();
        assert_eq!(report.expired_count, 1);
        assert_eq!(report.promoted_count, 1);

        let regs = store.list_registrations(2).await.unwrap();
        let promoted = regs.iter().find(|r| r.id == waiting.id).unwrap();
        assert_eq!(promoted.status, RegistrationStatus::Pending);
        assert_eq!(promoted.waitlist_position, None);

        let again = monitor.sweep_at(t0() + ChronoDuration::hours(26)).await.unwrap();
        assert_eq!(again, SweepReport::default());
    }
}
