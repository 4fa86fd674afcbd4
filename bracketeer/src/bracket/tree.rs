//! In-memory bracket aggregate.
//!
//! A `BracketTree` is the unit every bracket mutation works on: the header,
//! the seeded entrants, every match node and every result submission. Stores
//! hand out a tree under an exclusive lock, the domain mutates it, and the
//! store persists whatever the tree recorded in its [`TreeChanges`].

use super::models::{Bracket, BracketId, Match, MatchId, MatchStatus};
use crate::{
    dispute::DisputeResolution,
    error::{CoreError, CoreResult},
    lifecycle::{ResultSubmission, SubmissionId, SubmissionStatus},
    notify::TournamentEvent,
    participant::ParticipantId,
    seeding::SeededParticipant,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Everything a unit of work touched
#[derive(Debug, Default, Clone)]
pub struct TreeChanges {
    pub bracket: bool,
    pub entrants: bool,
    /// Entrants dropped from the bracket
    pub removed_entrants: Vec<ParticipantId>,
    pub matches: BTreeSet<MatchId>,
    pub submissions: BTreeSet<SubmissionId>,
    /// New audit records (append-only)
    pub resolutions: Vec<DisputeResolution>,
    pub events: Vec<TournamentEvent>,
}

impl TreeChanges {
    pub fn is_empty(&self) -> bool {
        !self.bracket
            && !self.entrants
            && self.removed_entrants.is_empty()
            && self.matches.is_empty()
            && self.submissions.is_empty()
            && self.resolutions.is_empty()
    }
}

/// Bracket aggregate
#[derive(Debug, Clone)]
pub struct BracketTree {
    pub(super) bracket: Bracket,
    pub(super) entrants: Vec<SeededParticipant>,
    /// Sorted by (round, position)
    pub(super) matches: Vec<Match>,
    pub(super) submissions: Vec<ResultSubmission>,
    pub(super) changes: TreeChanges,
}

impl BracketTree {
    /// Rebuild a tree from stored rows
    ///
    /// # Errors
    ///
    /// * `CoreError::Corrupt` - the rows do not form a complete bracket
    pub fn from_parts(
        bracket: Bracket,
        entrants: Vec<SeededParticipant>,
        mut matches: Vec<Match>,
        submissions: Vec<ResultSubmission>,
    ) -> CoreResult<Self> {
        matches.sort_by_key(|m| (m.round, m.position));

        let tree = Self {
            bracket,
            entrants,
            matches,
            submissions,
            changes: TreeChanges::default(),
        };
        tree.check_shape()?;
        Ok(tree)
    }

    fn check_shape(&self) -> CoreResult<()> {
        if self.matches.len() != self.bracket.total_matches as usize {
            return Err(CoreError::Corrupt(format!(
                "bracket {} has {} matches, expected {}",
                self.bracket.id,
                self.matches.len(),
                self.bracket.total_matches
            )));
        }

        for round in 1..=self.bracket.total_rounds {
            for position in 0..self.matches_in_round(round) {
                let found = self
                    .index_of(round, position)
                    .and_then(|i| self.matches.get(i))
                    .is_some_and(|m| m.round == round && m.position == position);
                if !found {
                    return Err(CoreError::Corrupt(format!(
                        "bracket {} is missing match at round {round} position {position}",
                        self.bracket.id
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn bracket(&self) -> &Bracket {
        &self.bracket
    }

    pub fn id(&self) -> BracketId {
        self.bracket.id
    }

    pub fn entrants(&self) -> &[SeededParticipant] {
        &self.entrants
    }

    pub fn matches(&self) -> &[Match] {
        &self.matches
    }

    pub fn submissions(&self) -> &[ResultSubmission] {
        &self.submissions
    }

    /// Slots in round 1
    pub fn bracket_size(&self) -> u32 {
        1u32 << self.bracket.total_rounds
    }

    pub fn matches_in_round(&self, round: u32) -> u32 {
        self.bracket_size() >> round
    }

    pub fn round(&self, round: u32) -> &[Match] {
        match self.index_of(round, 0) {
            Some(start) => {
                let end = start + self.matches_in_round(round) as usize;
                &self.matches[start..end.min(self.matches.len())]
            }
            None => &[],
        }
    }

    fn index_of(&self, round: u32, position: u32) -> Option<usize> {
        if round == 0 || round > self.bracket.total_rounds || position >= self.matches_in_round(round)
        {
            return None;
        }
        // Rounds before `round` hold size - size >> (round - 1) matches.
        let size = self.bracket_size();
        let offset = size - (size >> (round - 1));
        Some((offset + position) as usize)
    }

    pub fn match_at(&self, round: u32, position: u32) -> Option<&Match> {
        self.index_of(round, position).and_then(|i| self.matches.get(i))
    }

    pub fn match_by_id(&self, match_id: MatchId) -> Option<&Match> {
        self.matches.iter().find(|m| m.id == match_id)
    }

    /// # Errors
    ///
    /// * `CoreError::NotFound` - no such match in this bracket
    pub fn get_match(&self, match_id: MatchId) -> CoreResult<&Match> {
        self.match_by_id(match_id)
            .ok_or_else(|| CoreError::not_found("match", match_id))
    }

    /// Mutable access to a match; marks it for persistence
    pub(crate) fn match_mut(&mut self, match_id: MatchId) -> CoreResult<&mut Match> {
        let m = self
            .matches
            .iter_mut()
            .find(|m| m.id == match_id)
            .ok_or_else(|| CoreError::not_found("match", match_id))?;
        self.changes.matches.insert(m.id);
        Ok(m)
    }

    pub(super) fn match_at_mut(&mut self, round: u32, position: u32) -> CoreResult<&mut Match> {
        let bracket_id = self.bracket.id;
        let m = self
            .index_of(round, position)
            .and_then(|i| self.matches.get_mut(i))
            .ok_or_else(|| {
                CoreError::Corrupt(format!(
                    "bracket {bracket_id} has no match at round {round} position {position}"
                ))
            })?;
        self.changes.matches.insert(m.id);
        Ok(m)
    }

    /// # Errors
    ///
    /// * `CoreError::NotFound` - no such submission in this bracket
    pub fn submission(&self, submission_id: SubmissionId) -> CoreResult<&ResultSubmission> {
        self.submissions
            .iter()
            .find(|s| s.id == submission_id)
            .ok_or_else(|| CoreError::not_found("submission", submission_id))
    }

    pub(crate) fn submission_mut(
        &mut self,
        submission_id: SubmissionId,
    ) -> CoreResult<&mut ResultSubmission> {
        let s = self
            .submissions
            .iter_mut()
            .find(|s| s.id == submission_id)
            .ok_or_else(|| CoreError::not_found("submission", submission_id))?;
        self.changes.submissions.insert(s.id);
        Ok(s)
    }

    pub(crate) fn push_submission(&mut self, submission: ResultSubmission) {
        self.changes.submissions.insert(submission.id);
        self.submissions.push(submission);
    }

    /// Submission of `match_id` that has not been finalized yet
    pub fn active_submission(&self, match_id: MatchId) -> Option<&ResultSubmission> {
        self.submissions
            .iter()
            .find(|s| s.match_id == match_id && s.status != SubmissionStatus::Finalized)
    }

    pub fn finalized_submission(&self, match_id: MatchId) -> Option<&ResultSubmission> {
        self.submissions
            .iter()
            .find(|s| s.match_id == match_id && s.status == SubmissionStatus::Finalized)
    }

    /// PENDING submissions whose confirmation window closed before `now`
    pub fn overdue_submissions(&self, now: DateTime<Utc>) -> Vec<SubmissionId> {
        self.submissions
            .iter()
            .filter(|s| s.is_overdue(now))
            .map(|s| s.id)
            .collect()
    }

    pub(crate) fn record_resolution(&mut self, resolution: DisputeResolution) {
        self.changes.resolutions.push(resolution);
    }

    pub(crate) fn emit(&mut self, event: TournamentEvent) {
        self.changes.events.push(event);
    }

    pub fn changes(&self) -> &TreeChanges {
        &self.changes
    }

    /// Hand the recorded changes to the store and start a clean slate
    pub fn take_changes(&mut self) -> TreeChanges {
        std::mem::take(&mut self.changes)
    }

    /// Winner of the final, once decided
    pub fn champion(&self) -> Option<ParticipantId> {
        self.match_at(self.bracket.total_rounds, 0)
            .filter(|m| m.status.is_terminal())
            .and_then(|m| m.winner)
    }

    /// Round-1 slots in bracket order; `None` is a bye
    pub fn slot_layout(&self) -> Vec<Option<ParticipantId>> {
        self.round(1)
            .iter()
            .flat_map(|m| m.participants())
            .collect()
    }

    /// No match has been played and no result was ever reported
    pub fn is_pristine(&self) -> bool {
        self.submissions.is_empty()
            && self.matches.iter().all(|m| match m.status {
                MatchStatus::Scheduled | MatchStatus::Ready => true,
                MatchStatus::Completed => m.is_bye,
                _ => false,
            })
    }

    /// # Errors
    ///
    /// * `CoreError::Permission` - the bracket is locked
    pub fn ensure_unlocked(&self) -> CoreResult<()> {
        if self.bracket.is_locked {
            return Err(CoreError::permission(format!(
                "bracket {} is locked",
                self.bracket.id
            )));
        }
        Ok(())
    }

    fn ensure_editable(&self) -> CoreResult<()> {
        self.ensure_unlocked()?;
        if !self.is_pristine() {
            return Err(CoreError::conflict(format!(
                "bracket {} already has played matches",
                self.bracket.id
            )));
        }
        Ok(())
    }

    pub fn set_locked(&mut self, locked: bool) {
        if self.bracket.is_locked != locked {
            self.bracket.is_locked = locked;
            self.changes.bracket = true;
        }
    }

    /// Exchange the round-1 slots of two participants
    ///
    /// # Errors
    ///
    /// * `CoreError::Permission` - bracket locked
    /// * `CoreError::Conflict` - a match was already played
    /// * `CoreError::Validation` - either participant is not in the bracket
    pub fn swap_participants(
        &mut self,
        a: ParticipantId,
        b: ParticipantId,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        self.ensure_editable()?;
        if a == b {
            return Err(CoreError::validation("cannot swap a participant with itself"));
        }

        let mut slots = self.slot_layout();
        let ia = find_slot(&slots, a)?;
        let ib = find_slot(&slots, b)?;
        slots.swap(ia, ib);

        log::info!(
            "Swapping participants {} and {} in bracket {}",
            a,
            b,
            self.bracket.id
        );
        self.relayout(slots, now)
    }

    /// Turn a participant's round-1 slot into a bye
    ///
    /// # Errors
    ///
    /// * `CoreError::Permission` - bracket locked
    /// * `CoreError::Conflict` - a match was already played
    /// * `CoreError::Validation` - unknown participant, or fewer than two would remain
    pub fn remove_participant(
        &mut self,
        participant: ParticipantId,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        self.ensure_editable()?;

        let mut slots = self.slot_layout();
        let i = find_slot(&slots, participant)?;
        slots[i] = None;

        let remaining = slots.iter().flatten().count();
        if remaining < crate::bracket::MIN_PARTICIPANTS {
            return Err(CoreError::validation(format!(
                "removing {participant} would leave {remaining} participant(s)"
            )));
        }

        log::info!(
            "Removing participant {} from bracket {}",
            participant,
            self.bracket.id
        );
        self.entrants.retain(|e| e.id() != participant);
        self.changes.removed_entrants.push(participant);
        self.bracket.participant_count = remaining as u32;
        self.changes.bracket = true;
        self.relayout(slots, now)
    }

    /// Move a participant into an empty round-1 slot, leaving a bye behind
    ///
    /// # Errors
    ///
    /// * `CoreError::Permission` - bracket locked
    /// * `CoreError::Conflict` - a match was already played
    /// * `CoreError::Validation` - unknown participant, or `slot` is out of
    ///   range or already occupied
    pub fn move_participant(
        &mut self,
        participant: ParticipantId,
        slot: u32,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        self.ensure_editable()?;

        let mut slots = self.slot_layout();
        let from = find_slot(&slots, participant)?;
        let to = slot as usize;
        match slots.get(to) {
            None => {
                return Err(CoreError::validation(format!(
                    "slot {slot} is outside a bracket of {} slots",
                    slots.len()
                )));
            }
            Some(Some(_)) if to == from => return Ok(()),
            Some(Some(occupant)) => {
                return Err(CoreError::validation(format!(
                    "slot {slot} is held by participant {occupant}"
                )));
            }
            Some(None) => {}
        }
        slots.swap(from, to);

        log::info!(
            "Moving participant {} to slot {} in bracket {}",
            participant,
            slot,
            self.bracket.id
        );
        self.relayout(slots, now)
    }

    /// Rewrite round 1 from `slots` and re-derive every bye completion.
    ///
    /// Emits `match.scheduled` only for pairings that did not exist before.
    pub(super) fn relayout(
        &mut self,
        slots: Vec<Option<ParticipantId>>,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        if slots.len() != self.bracket_size() as usize {
            return Err(CoreError::validation(format!(
                "layout has {} slots, bracket needs {}",
                slots.len(),
                self.bracket_size()
            )));
        }

        let before: HashMap<MatchId, [Option<ParticipantId>; 2]> = self
            .matches
            .iter()
            .filter(|m| m.status == MatchStatus::Ready)
            .map(|m| (m.id, m.participants()))
            .collect();

        for m in &mut self.matches {
            m.reset();
            self.changes.matches.insert(m.id);
        }

        for (position, pair) in slots.chunks(2).enumerate() {
            let m = self.match_at_mut(1, position as u32)?;
            m.participant1 = pair[0];
            m.participant2 = pair[1];
        }

        let first_new_event = self.changes.events.len();
        self.settle_first_round(now)?;

        let fresh: Vec<TournamentEvent> = self.changes.events.split_off(first_new_event);
        self.changes
            .events
            .extend(fresh.into_iter().filter(|event| match event {
                TournamentEvent::MatchScheduled {
                    match_id,
                    participant1,
                    participant2,
                    ..
                } => !before.get(match_id).is_some_and(|pair| {
                    pair.contains(&Some(*participant1)) && pair.contains(&Some(*participant2))
                }),
                _ => true,
            }));

        self.check_consistency()
    }

    /// Verify the structural invariants of the tree
    ///
    /// # Errors
    ///
    /// * `CoreError::Validation` - the entrant list disagrees with the
    ///   header or the round-1 slots, a participant occupies two active
    ///   slots, a winner is not one of its match's participants, or a winner
    ///   never reached its parent
    pub fn check_consistency(&self) -> CoreResult<()> {
        if self.entrants.len() != self.bracket.participant_count as usize {
            return Err(CoreError::validation(format!(
                "bracket {} lists {} entrants for {} participants",
                self.bracket.id,
                self.entrants.len(),
                self.bracket.participant_count
            )));
        }

        let entrants: HashSet<ParticipantId> = self.entrants.iter().map(|e| e.id()).collect();
        let mut seen_in_round_one = HashSet::new();
        for p in self.slot_layout().into_iter().flatten() {
            if !entrants.contains(&p) {
                return Err(CoreError::validation(format!(
                    "participant {p} holds a slot but is not an entrant"
                )));
            }
            if !seen_in_round_one.insert(p) {
                return Err(CoreError::validation(format!(
                    "participant {p} holds two round 1 slots"
                )));
            }
        }

        let mut active = HashSet::new();
        for m in self.matches.iter().filter(|m| !m.status.is_terminal()) {
            for p in m.participants().into_iter().flatten() {
                if !active.insert(p) {
                    return Err(CoreError::validation(format!(
                        "participant {p} is in two active matches"
                    )));
                }
            }
        }

        for m in &self.matches {
            let Some(winner) = m.winner else { continue };

            if !m.has_participant(winner) {
                return Err(CoreError::validation(format!(
                    "winner {winner} of match {} is not one of its participants",
                    m.id
                )));
            }

            if m.round < self.bracket.total_rounds {
                let reached_parent = self
                    .match_at(m.round + 1, m.position / 2)
                    .is_some_and(|parent| parent.has_participant(winner));
                if !reached_parent {
                    return Err(CoreError::validation(format!(
                        "winner {winner} of match {} did not advance",
                        m.id
                    )));
                }
            }
        }

        Ok(())
    }
}

fn find_slot(slots: &[Option<ParticipantId>], participant: ParticipantId) -> CoreResult<usize> {
    slots
        .iter()
        .position(|s| *s == Some(participant))
        .ok_or_else(|| {
            CoreError::validation(format!("participant {participant} is not in the bracket"))
        })
}
