//! Bracket and match data models.

use crate::{
    error::{CoreError, CoreResult},
    participant::{ParticipantId, TournamentId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Bracket ID type
pub type BracketId = Uuid;

/// Match ID type
pub type MatchId = Uuid;

/// Bracket format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BracketFormat {
    SingleElimination,
}

impl BracketFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            BracketFormat::SingleElimination => "single_elimination",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "single_elimination" => Some(BracketFormat::SingleElimination),
            _ => None,
        }
    }
}

/// Bracket header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bracket {
    pub id: BracketId,
    pub tournament_id: TournamentId,
    pub format: BracketFormat,
    pub total_rounds: u32,
    pub total_matches: u32,
    pub participant_count: u32,
    /// Locked brackets refuse structural edits
    pub is_locked: bool,
    pub created_at: DateTime<Utc>,
}

/// Match status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Waiting for one or both participants
    Scheduled,
    /// Both participants known
    Ready,
    /// Being played
    Live,
    /// A result was submitted and awaits the opponent
    PendingResult,
    /// Final result recorded
    Completed,
    /// Submitted result contested by the opponent
    Disputed,
    /// Decided by forfeit
    Forfeit,
    /// Called off by staff
    Cancelled,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Scheduled => "scheduled",
            MatchStatus::Ready => "ready",
            MatchStatus::Live => "live",
            MatchStatus::PendingResult => "pending_result",
            MatchStatus::Completed => "completed",
            MatchStatus::Disputed => "disputed",
            MatchStatus::Forfeit => "forfeit",
            MatchStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(MatchStatus::Scheduled),
            "ready" => Some(MatchStatus::Ready),
            "live" => Some(MatchStatus::Live),
            "pending_result" => Some(MatchStatus::PendingResult),
            "completed" => Some(MatchStatus::Completed),
            "disputed" => Some(MatchStatus::Disputed),
            "forfeit" => Some(MatchStatus::Forfeit),
            "cancelled" => Some(MatchStatus::Cancelled),
            _ => None,
        }
    }

    /// No further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MatchStatus::Completed | MatchStatus::Forfeit | MatchStatus::Cancelled
        )
    }

    /// Allowed edges of the match state machine
    pub fn can_transition_to(&self, next: MatchStatus) -> bool {
        use MatchStatus::*;
        matches!(
            (self, next),
            (Scheduled, Ready)
                | (Scheduled, Completed)
                | (Ready, Live)
                | (Ready, PendingResult)
                | (Ready, Forfeit)
                | (Ready, Cancelled)
                | (Live, PendingResult)
                | (Live, Forfeit)
                | (Live, Cancelled)
                | (PendingResult, Completed)
                | (PendingResult, Disputed)
                | (Disputed, Completed)
                | (Disputed, PendingResult)
        )
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node of the bracket tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub bracket_id: BracketId,
    /// 1-indexed round
    pub round: u32,
    /// 0-indexed position within the round
    pub position: u32,
    pub participant1: Option<ParticipantId>,
    pub participant2: Option<ParticipantId>,
    pub winner: Option<ParticipantId>,
    pub loser: Option<ParticipantId>,
    pub score1: Option<u32>,
    pub score2: Option<u32>,
    pub status: MatchStatus,
    /// Decided without play because a slot was a bye
    pub is_bye: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Match {
    pub fn new(bracket_id: BracketId, round: u32, position: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            bracket_id,
            round,
            position,
            participant1: None,
            participant2: None,
            winner: None,
            loser: None,
            score1: None,
            score2: None,
            status: MatchStatus::Scheduled,
            is_bye: false,
            completed_at: None,
        }
    }

    pub fn participants(&self) -> [Option<ParticipantId>; 2] {
        [self.participant1, self.participant2]
    }

    pub fn has_participant(&self, participant: ParticipantId) -> bool {
        self.participant1 == Some(participant) || self.participant2 == Some(participant)
    }

    /// The other participant, if `participant` plays in this match
    pub fn opponent_of(&self, participant: ParticipantId) -> Option<ParticipantId> {
        if self.participant1 == Some(participant) {
            self.participant2
        } else if self.participant2 == Some(participant) {
            self.participant1
        } else {
            None
        }
    }

    pub fn filled_slots(&self) -> usize {
        self.participants().iter().flatten().count()
    }

    /// Terminal without anyone advancing (double bye or cancelled)
    pub fn is_empty_result(&self) -> bool {
        self.status.is_terminal() && self.winner.is_none()
    }

    /// Move to `next`, refusing edges the state machine does not have
    pub fn transition_to(&mut self, next: MatchStatus) -> CoreResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::conflict(format!(
                "match {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    /// Clear everything that play or progression wrote
    pub(crate) fn reset(&mut self) {
        self.participant1 = None;
        self.participant2 = None;
        self.winner = None;
        self.loser = None;
        self.score1 = None;
        self.score2 = None;
        self.status = MatchStatus::Scheduled;
        self.is_bye = false;
        self.completed_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            MatchStatus::Scheduled,
            MatchStatus::Ready,
            MatchStatus::Live,
            MatchStatus::PendingResult,
            MatchStatus::Completed,
            MatchStatus::Disputed,
            MatchStatus::Forfeit,
            MatchStatus::Cancelled,
        ] {
            assert_eq!(MatchStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(MatchStatus::parse("paused"), None);
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for terminal in [
            MatchStatus::Completed,
            MatchStatus::Forfeit,
            MatchStatus::Cancelled,
        ] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(MatchStatus::Ready));
            assert!(!terminal.can_transition_to(MatchStatus::PendingResult));
        }
    }

    #[test]
    fn test_opponent_of() {
        let mut m = Match::new(Uuid::new_v4(), 1, 0);
        m.participant1 = Some(10);
        m.participant2 = Some(20);
        assert_eq!(m.opponent_of(10), Some(20));
        assert_eq!(m.opponent_of(20), Some(10));
        assert_eq!(m.opponent_of(30), None);
        assert_eq!(m.filled_slots(), 2);
    }

    #[test]
    fn test_transition_guard() {
        let mut m = Match::new(Uuid::new_v4(), 1, 0);
        assert!(matches!(
            m.transition_to(MatchStatus::Live),
            Err(CoreError::Conflict(_))
        ));
        m.transition_to(MatchStatus::Ready).unwrap();
        m.transition_to(MatchStatus::Live).unwrap();
        m.transition_to(MatchStatus::PendingResult).unwrap();
        assert_eq!(m.status, MatchStatus::PendingResult);
    }
}
