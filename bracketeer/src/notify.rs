//! Outbound tournament events.
//!
//! Events are collected while a unit of work runs and handed to a
//! [`Notifier`] only after it commits. Delivery is fire-and-forget: a notifier
//! never blocks the caller and never reports failure back.

use crate::{
    bracket::{BracketId, MatchId},
    dispute::ResolutionType,
    lifecycle::SubmissionId,
    participant::{ParticipantId, StaffId},
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Event published to the notification channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "topic")]
pub enum TournamentEvent {
    #[serde(rename = "match.scheduled")]
    MatchScheduled {
        bracket_id: BracketId,
        match_id: MatchId,
        round: u32,
        position: u32,
        participant1: ParticipantId,
        participant2: ParticipantId,
    },
    #[serde(rename = "dispute.opened")]
    DisputeOpened {
        submission_id: SubmissionId,
        match_id: MatchId,
        disputed_by: ParticipantId,
        reason: String,
    },
    #[serde(rename = "dispute.resolved")]
    DisputeResolved {
        submission_id: SubmissionId,
        match_id: MatchId,
        resolution_type: ResolutionType,
        resolver_id: StaffId,
    },
}

impl TournamentEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            TournamentEvent::MatchScheduled { .. } => "match.scheduled",
            TournamentEvent::DisputeOpened { .. } => "dispute.opened",
            TournamentEvent::DisputeResolved { .. } => "dispute.resolved",
        }
    }
}

/// Sink for tournament events
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &TournamentEvent);
}

/// Forwards events into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<TournamentEvent>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TournamentEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, event: &TournamentEvent) {
        // Receiver gone means nobody is listening.
        let _ = self.tx.send(event.clone());
    }
}

/// Writes events to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: &TournamentEvent) {
        match serde_json::to_string(event) {
            Ok(json) => log::info!("event {}: {}", event.topic(), json),
            Err(e) => log::warn!("event {} could not be encoded: {}", event.topic(), e),
        }
    }
}
