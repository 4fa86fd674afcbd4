//! Structured logging configuration.
//!
//! The library logs through the `log` facade; those records are bridged into
//! the `tracing` subscriber installed here.

use bracketeer::TournamentEvent;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info,sqlx=warn,hyper=warn";

/// Initialize structured logging
///
/// Levels are configurable via the `RUST_LOG` env var.
///
/// # Example
///
/// ```no_run
/// use bk_server::logging;
///
/// #[tokio::main]
/// async fn main() {
///     logging::init();
///     tracing::info!("Server starting");
/// }
/// ```
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Structured logging initialized");
}

/// Log a completed background sweep with structured fields
pub fn log_sweep(kind: &'static str, processed: usize, skipped: usize, failed: usize) {
    if failed > 0 {
        tracing::warn!(sweep = kind, processed, skipped, failed, "Sweep finished with failures");
    } else if processed > 0 {
        tracing::info!(sweep = kind, processed, skipped, "Sweep finished");
    } else {
        tracing::debug!(sweep = kind, skipped, "Sweep found nothing to do");
    }
}

/// Drain the engine's event channel into the log until every sender is gone
pub async fn log_events(mut events: UnboundedReceiver<TournamentEvent>) {
    while let Some(event) = events.recv().await {
        crate::metrics::event_published(event.topic());
        match &event {
            TournamentEvent::MatchScheduled {
                match_id,
                round,
                position,
                participant1,
                participant2,
                ..
            } => tracing::info!(
                topic = event.topic(),
                %match_id,
                round,
                position,
                participant1,
                participant2,
                "Match scheduled"
            ),
            TournamentEvent::DisputeOpened {
                submission_id,
                disputed_by,
                reason,
                ..
            } => tracing::info!(
                topic = event.topic(),
                %submission_id,
                disputed_by,
                reason = reason.as_str(),
                "Dispute opened"
            ),
            TournamentEvent::DisputeResolved {
                submission_id,
                resolution_type,
                resolver_id,
                ..
            } => tracing::info!(
                topic = event.topic(),
                %submission_id,
                resolution = resolution_type.as_str(),
                resolver_id,
                "Dispute resolved"
            ),
        }
    }
}
