//! Background sweep loops.
//!
//! Two timers drive the engine's periodic work: the auto-confirm scan that
//! finalizes results whose opponent stayed silent, and the payment deadline
//! sweep that expires unverified payments and promotes the waitlist. Both run
//! on one task and stop when the shutdown signal fires.

use crate::{logging, metrics};
use bracketeer::{TournamentEngine, TournamentStore};
use std::time::Duration;
use tokio::{
    sync::watch,
    time::{self, MissedTickBehavior},
};

/// Sweep cadence
#[derive(Debug, Clone, Copy)]
pub struct SweepSchedule {
    pub auto_confirm_interval: Duration,
    pub payment_sweep_interval: Duration,
}

/// Run the auto-confirm scan once and record the outcome
pub async fn auto_confirm_once<S: TournamentStore>(engine: &TournamentEngine<S>) {
    match engine.run_auto_confirm_scan().await {
        Ok(report) => {
            logging::log_sweep(
                "auto_confirm",
                report.confirmed_count,
                report.skipped_count,
                report.failed_count,
            );
            metrics::auto_confirm_scan(report.confirmed_count, report.failed_count);
        }
        Err(e) => {
            tracing::error!(sweep = "auto_confirm", error = %e, "Sweep aborted");
            metrics::sweep_aborted("auto_confirm");
        }
    }
}

/// Run the payment deadline sweep once and record the outcome
pub async fn payment_sweep_once<S: TournamentStore>(engine: &TournamentEngine<S>) {
    match engine.run_payment_expiry_sweep().await {
        Ok(report) => {
            logging::log_sweep(
                "payment_expiry",
                report.expired_count,
                report.skipped_count,
                report.failed_count,
            );
            if report.promoted_count > 0 {
                tracing::info!(
                    sweep = "payment_expiry",
                    promoted = report.promoted_count,
                    "Waitlisted registrations promoted"
                );
            }
            metrics::payment_sweep(
                report.expired_count,
                report.promoted_count,
                report.failed_count,
            );
        }
        Err(e) => {
            tracing::error!(sweep = "payment_expiry", error = %e, "Sweep aborted");
            metrics::sweep_aborted("payment_expiry");
        }
    }
}

/// Drive both sweeps until `shutdown` turns true
///
/// A sweep that overruns its interval delays the next tick instead of
/// bursting to catch up.
pub async fn run<S: TournamentStore>(
    engine: TournamentEngine<S>,
    schedule: SweepSchedule,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut auto_confirm = time::interval(schedule.auto_confirm_interval);
    auto_confirm.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut payments = time::interval(schedule.payment_sweep_interval);
    payments.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(
        auto_confirm_secs = schedule.auto_confirm_interval.as_secs(),
        payment_sweep_secs = schedule.payment_sweep_interval.as_secs(),
        "Background sweeps started"
    );

    loop {
        tokio::select! {
            _ = auto_confirm.tick() => auto_confirm_once(&engine).await,
            _ = payments.tick() => payment_sweep_once(&engine).await,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!("Background sweeps stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use bracketeer::{LogNotifier, MemoryStore};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let engine = TournamentEngine::new(Arc::new(MemoryStore::new()), Arc::new(LogNotifier));
        let (tx, rx) = watch::channel(false);
        let schedule = SweepSchedule {
            auto_confirm_interval: Duration::from_millis(10),
            payment_sweep_interval: Duration::from_millis(10),
        };

        let handle = tokio::spawn(run(engine, schedule, rx));
        time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
