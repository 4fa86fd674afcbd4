//! Winner advancement and bye resolution.
//!
//! The parent of match `(round, position)` is `(round + 1, position / 2)`.
//! A slot that can never be filled is a bye: an empty round 1 slot, or a
//! feeder match that ended without a winner. A match with one participant and
//! a bye completes at once and advances that participant; two byes complete
//! it empty, which makes it a bye for its own parent in turn.

use super::{models::MatchId, models::MatchStatus, tree::BracketTree};
use crate::{
    error::{CoreError, CoreResult},
    notify::TournamentEvent,
    participant::ParticipantId,
};
use chrono::{DateTime, Utc};

/// What settling a match produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Still waiting on a feeder
    Waiting,
    /// Both participants known
    Ready,
    /// Completed by bye; its result must be propagated
    Resolved(MatchId),
}

impl BracketTree {
    /// Settle every round 1 match and cascade bye completions upward
    pub(super) fn settle_first_round(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        for position in 0..self.matches_in_round(1) {
            if let Settlement::Resolved(id) = self.settle(1, position, now)? {
                self.propagate(id, now)?;
            }
        }
        Ok(())
    }

    /// Advance the result of a terminal match up the tree.
    ///
    /// Walks parent by parent while each parent resolves on a bye, and stops
    /// at the first genuine pairing, a parent still waiting, or the final.
    pub(crate) fn propagate(&mut self, match_id: MatchId, now: DateTime<Utc>) -> CoreResult<()> {
        let total_rounds = self.bracket.total_rounds;
        let mut current = match_id;

        loop {
            let m = self.get_match(current)?;
            if !m.status.is_terminal() {
                return Err(CoreError::conflict(format!(
                    "match {} is {} and has nothing to propagate",
                    m.id, m.status
                )));
            }

            if m.round >= total_rounds {
                if let Some(champion) = m.winner {
                    log::info!("Bracket {} won by participant {}", self.bracket.id, champion);
                }
                return Ok(());
            }

            let (parent_round, parent_position, winner) = (m.round + 1, m.position / 2, m.winner);

            if let Some(winner) = winner {
                self.place_winner(parent_round, parent_position, winner)?;
            }

            match self.settle(parent_round, parent_position, now)? {
                Settlement::Resolved(parent) => current = parent,
                Settlement::Ready | Settlement::Waiting => return Ok(()),
            }
        }
    }

    /// Write `winner` into the first open slot of the match at `(round, position)`
    fn place_winner(&mut self, round: u32, position: u32, winner: ParticipantId) -> CoreResult<()> {
        let parent = self.match_at_mut(round, position)?;

        if parent.has_participant(winner) {
            return Ok(());
        }

        if parent.status.is_terminal() {
            return Err(CoreError::conflict(format!(
                "match {} is already {}",
                parent.id, parent.status
            )));
        }

        if parent.participant1.is_none() {
            parent.participant1 = Some(winner);
        } else if parent.participant2.is_none() {
            parent.participant2 = Some(winner);
        } else {
            return Err(CoreError::Corrupt(format!(
                "match {} has no open slot for {}",
                parent.id, winner
            )));
        }
        Ok(())
    }

    /// Slots of `(round, position)` that will never be filled
    fn bye_slots(&self, round: u32, position: u32) -> usize {
        if round == 1 {
            return self
                .match_at(1, position)
                .map_or(0, |m| 2 - m.filled_slots());
        }

        [2 * position, 2 * position + 1]
            .into_iter()
            .filter(|&feeder| {
                self.match_at(round - 1, feeder)
                    .is_some_and(|m| m.is_empty_result())
            })
            .count()
    }

    fn settle(&mut self, round: u32, position: u32, now: DateTime<Utc>) -> CoreResult<Settlement> {
        let byes = self.bye_slots(round, position);
        let bracket_id = self.bracket.id;
        let m = self.match_at_mut(round, position)?;

        if m.status != MatchStatus::Scheduled {
            return Ok(Settlement::Waiting);
        }

        match (m.filled_slots(), byes) {
            (2, _) => {
                m.transition_to(MatchStatus::Ready)?;
                let event = TournamentEvent::MatchScheduled {
                    bracket_id,
                    match_id: m.id,
                    round,
                    position,
                    participant1: m.participant1.unwrap_or_default(),
                    participant2: m.participant2.unwrap_or_default(),
                };
                self.emit(event);
                Ok(Settlement::Ready)
            }
            (1, byes) if byes > 0 => {
                m.winner = m.participant1.or(m.participant2);
                m.is_bye = true;
                m.completed_at = Some(now);
                m.transition_to(MatchStatus::Completed)?;
                log::debug!(
                    "Match {} (round {}) decided by bye for {:?}",
                    m.id,
                    round,
                    m.winner
                );
                Ok(Settlement::Resolved(m.id))
            }
            (0, 2) => {
                m.is_bye = true;
                m.completed_at = Some(now);
                m.transition_to(MatchStatus::Completed)?;
                Ok(Settlement::Resolved(m.id))
            }
            _ => Ok(Settlement::Waiting),
        }
    }
}
