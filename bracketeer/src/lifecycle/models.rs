//! Result submission data models.

use crate::{
    bracket::{BracketId, Match, MatchId},
    error::{CoreError, CoreResult},
    participant::ParticipantId,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Submission ID type
pub type SubmissionId = Uuid;

/// Hours the opponent has to confirm or dispute before the result stands
pub const AUTO_CONFIRM_WINDOW_HOURS: i64 = 24;

/// Confirmation window as a duration
pub fn auto_confirm_window() -> Duration {
    Duration::hours(AUTO_CONFIRM_WINDOW_HOURS)
}

/// Submission status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Confirmed,
    Disputed,
    UnderReview,
    Resolved,
    AutoConfirmed,
    Finalized,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Confirmed => "confirmed",
            SubmissionStatus::Disputed => "disputed",
            SubmissionStatus::UnderReview => "under_review",
            SubmissionStatus::Resolved => "resolved",
            SubmissionStatus::AutoConfirmed => "auto_confirmed",
            SubmissionStatus::Finalized => "finalized",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SubmissionStatus::Pending),
            "confirmed" => Some(SubmissionStatus::Confirmed),
            "disputed" => Some(SubmissionStatus::Disputed),
            "under_review" => Some(SubmissionStatus::UnderReview),
            "resolved" => Some(SubmissionStatus::Resolved),
            "auto_confirmed" => Some(SubmissionStatus::AutoConfirmed),
            "finalized" => Some(SubmissionStatus::Finalized),
            _ => None,
        }
    }

    /// Contested and waiting for staff
    pub fn is_disputed(&self) -> bool {
        matches!(self, SubmissionStatus::Disputed | SubmissionStatus::UnderReview)
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reported score line, keyed by participant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultPayload {
    pub scores: BTreeMap<ParticipantId, u32>,
    /// Explicit winner; required when the scores are tied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner_id: Option<ParticipantId>,
}

/// Winner, loser and slot-ordered scores derived from a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOutcome {
    pub winner: ParticipantId,
    pub loser: ParticipantId,
    pub score1: u32,
    pub score2: u32,
}

impl ResultPayload {
    pub fn from_scores(scores: impl IntoIterator<Item = (ParticipantId, u32)>) -> Self {
        Self {
            scores: scores.into_iter().collect(),
            winner_id: None,
        }
    }

    pub fn with_winner(mut self, winner: ParticipantId) -> Self {
        self.winner_id = Some(winner);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty() && self.winner_id.is_none()
    }

    /// Check the payload against `m` and derive the outcome
    ///
    /// # Errors
    ///
    /// * `CoreError::Validation` - empty payload, scores for anyone other than
    ///   the two participants, winner outside the match, or an undecided tie
    pub fn outcome(&self, m: &Match) -> CoreResult<MatchOutcome> {
        if self.is_empty() {
            return Err(CoreError::validation("result payload is empty"));
        }

        let (Some(p1), Some(p2)) = (m.participant1, m.participant2) else {
            return Err(CoreError::validation(format!(
                "match {} does not have two participants",
                m.id
            )));
        };

        let (Some(&score1), Some(&score2)) = (self.scores.get(&p1), self.scores.get(&p2)) else {
            return Err(CoreError::validation(format!(
                "payload must score both participants {p1} and {p2}"
            )));
        };

        if self.scores.len() != 2 {
            return Err(CoreError::validation(
                "payload scores someone who is not in the match",
            ));
        }

        let winner = match self.winner_id {
            Some(w) if w == p1 || w == p2 => w,
            Some(w) => {
                return Err(CoreError::validation(format!(
                    "declared winner {w} is not in the match"
                )));
            }
            None if score1 > score2 => p1,
            None if score2 > score1 => p2,
            None => {
                return Err(CoreError::validation(
                    "scores are tied and no winner was declared",
                ));
            }
        };

        let loser = if winner == p1 { p2 } else { p1 };
        Ok(MatchOutcome {
            winner,
            loser,
            score1,
            score2,
        })
    }
}

/// A participant's report of a match result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSubmission {
    pub id: SubmissionId,
    pub match_id: MatchId,
    pub bracket_id: BracketId,
    pub submitted_by: ParticipantId,
    pub payload: ResultPayload,
    pub proof_ref: Option<String>,
    pub status: SubmissionStatus,
    pub submitted_at: DateTime<Utc>,
    /// Always `submitted_at + 24h`; never rewritten
    pub auto_confirm_deadline: DateTime<Utc>,
    /// End of the current confirmation window; moves only when a dispute is dismissed
    pub confirm_window_ends_at: DateTime<Utc>,
    pub confirmed_by: Option<ParticipantId>,
    pub disputed_by: Option<ParticipantId>,
    pub dispute_reason: Option<String>,
    pub counter_payload: Option<ResultPayload>,
    pub responded_at: Option<DateTime<Utc>>,
    pub final_payload: Option<ResultPayload>,
    /// Status the submission passed through on its way to FINALIZED
    pub finalized_via: Option<SubmissionStatus>,
    pub finalized_at: Option<DateTime<Utc>>,
}

impl ResultSubmission {
    pub fn new(
        m: &Match,
        submitted_by: ParticipantId,
        payload: ResultPayload,
        proof_ref: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let deadline = now + auto_confirm_window();
        Self {
            id: Uuid::new_v4(),
            match_id: m.id,
            bracket_id: m.bracket_id,
            submitted_by,
            payload,
            proof_ref,
            status: SubmissionStatus::Pending,
            submitted_at: now,
            auto_confirm_deadline: deadline,
            confirm_window_ends_at: deadline,
            confirmed_by: None,
            disputed_by: None,
            dispute_reason: None,
            counter_payload: None,
            responded_at: None,
            final_payload: None,
            finalized_via: None,
            finalized_at: None,
        }
    }

    /// Still PENDING and the confirmation window has closed
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == SubmissionStatus::Pending && now > self.confirm_window_ends_at
    }
}
