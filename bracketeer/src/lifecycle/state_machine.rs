//! Match and result-submission transitions.
//!
//! Every operation validates fully before its first write, so an error leaves
//! the tree exactly as it was.

use super::models::{MatchOutcome, ResultPayload, ResultSubmission, SubmissionId, SubmissionStatus};
use crate::{
    bracket::{BracketTree, Match, MatchId, MatchStatus},
    error::{CoreError, CoreResult},
    notify::TournamentEvent,
    participant::{ParticipantId, StaffId},
};
use chrono::{DateTime, Utc};

impl BracketTree {
    /// Record a participant's report of a match result
    ///
    /// # Errors
    ///
    /// * `CoreError::NotFound` - unknown match
    /// * `CoreError::Permission` - submitter does not play in the match
    /// * `CoreError::Conflict` - the match is finalized, already has an active
    ///   submission, or is not ready to be played
    /// * `CoreError::Validation` - the payload does not fit the match
    pub fn submit_result(
        &mut self,
        match_id: MatchId,
        submitter: ParticipantId,
        payload: ResultPayload,
        proof_ref: Option<String>,
        now: DateTime<Utc>,
    ) -> CoreResult<ResultSubmission> {
        let m = self.get_match(match_id)?;

        if m.status.is_terminal() || self.finalized_submission(match_id).is_some() {
            return Err(CoreError::conflict(format!(
                "match {match_id} already has a final result"
            )));
        }

        if let Some(active) = self.active_submission(match_id) {
            return Err(CoreError::conflict(format!(
                "match {match_id} already has submission {} ({})",
                active.id, active.status
            )));
        }

        if !m.has_participant(submitter) {
            return Err(CoreError::permission(format!(
                "participant {submitter} does not play in match {match_id}"
            )));
        }

        if !matches!(m.status, MatchStatus::Ready | MatchStatus::Live) {
            return Err(CoreError::conflict(format!(
                "match {match_id} is {} and cannot take a result",
                m.status
            )));
        }

        payload.outcome(m)?;

        let submission = ResultSubmission::new(m, submitter, payload, proof_ref, now);
        self.match_mut(match_id)?
            .transition_to(MatchStatus::PendingResult)?;
        self.push_submission(submission.clone());

        log::info!(
            "Result {} submitted for match {} by {}; auto-confirms at {}",
            submission.id,
            match_id,
            submitter,
            submission.auto_confirm_deadline
        );
        Ok(submission)
    }

    /// Opponent accepts the submitted result; the match is finalized
    ///
    /// # Errors
    ///
    /// * `CoreError::NotFound` - unknown submission
    /// * `CoreError::Permission` - responder is not the submitter's opponent
    /// * `CoreError::Conflict` - submission is no longer PENDING
    pub fn confirm_result(
        &mut self,
        submission_id: SubmissionId,
        responder: ParticipantId,
        now: DateTime<Utc>,
    ) -> CoreResult<ResultSubmission> {
        self.ensure_opponent(submission_id, responder)?;
        self.ensure_submission_status(submission_id, &[SubmissionStatus::Pending])?;

        let s = self.submission_mut(submission_id)?;
        s.status = SubmissionStatus::Confirmed;
        s.confirmed_by = Some(responder);
        s.responded_at = Some(now);
        let payload = s.payload.clone();

        self.finalize(submission_id, payload, now)?;
        self.submission(submission_id).cloned()
    }

    /// Opponent contests the submitted result
    ///
    /// # Errors
    ///
    /// * `CoreError::Validation` - blank reason, or a counter-payload that
    ///   does not fit the match
    /// * `CoreError::Permission` - responder is not the submitter's opponent
    /// * `CoreError::Conflict` - submission is no longer PENDING
    pub fn dispute_result(
        &mut self,
        submission_id: SubmissionId,
        responder: ParticipantId,
        counter_payload: Option<ResultPayload>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<ResultSubmission> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(CoreError::validation("a dispute needs a reason"));
        }

        let match_id = self.ensure_opponent(submission_id, responder)?;
        self.ensure_submission_status(submission_id, &[SubmissionStatus::Pending])?;

        let counter_payload = counter_payload.filter(|p| !p.is_empty());
        if let Some(counter) = &counter_payload {
            counter.outcome(self.get_match(match_id)?)?;
        }

        let s = self.submission_mut(submission_id)?;
        s.status = SubmissionStatus::Disputed;
        s.disputed_by = Some(responder);
        s.dispute_reason = Some(reason.to_string());
        s.counter_payload = counter_payload;
        s.responded_at = Some(now);
        let submission = s.clone();

        self.match_mut(match_id)?
            .transition_to(MatchStatus::Disputed)?;
        self.emit(TournamentEvent::DisputeOpened {
            submission_id,
            match_id,
            disputed_by: responder,
            reason: reason.to_string(),
        });

        log::info!(
            "Submission {} on match {} disputed by {}",
            submission_id,
            match_id,
            responder
        );
        Ok(submission)
    }

    /// Staff claims a disputed submission for review
    ///
    /// # Errors
    ///
    /// * `CoreError::Conflict` - submission is not DISPUTED
    pub fn begin_review(
        &mut self,
        submission_id: SubmissionId,
        staff: StaffId,
    ) -> CoreResult<ResultSubmission> {
        self.ensure_submission_status(submission_id, &[SubmissionStatus::Disputed])?;

        let s = self.submission_mut(submission_id)?;
        s.status = SubmissionStatus::UnderReview;
        log::info!("Staff {} reviewing submission {}", staff, submission_id);
        Ok(s.clone())
    }

    /// Finalize a submission whose confirmation window has closed
    ///
    /// # Errors
    ///
    /// * `CoreError::Conflict` - submission is not PENDING or still inside its window
    pub fn auto_confirm(
        &mut self,
        submission_id: SubmissionId,
        now: DateTime<Utc>,
    ) -> CoreResult<ResultSubmission> {
        let s = self.submission(submission_id)?;
        if !s.is_overdue(now) {
            return Err(CoreError::conflict(format!(
                "submission {submission_id} is {} with window ending {}",
                s.status, s.confirm_window_ends_at
            )));
        }

        let s = self.submission_mut(submission_id)?;
        s.status = SubmissionStatus::AutoConfirmed;
        let payload = s.payload.clone();

        log::info!("Auto-confirming submission {}", submission_id);
        self.finalize(submission_id, payload, now)?;
        self.submission(submission_id).cloned()
    }

    /// READY -> LIVE
    pub fn start_match(&mut self, match_id: MatchId) -> CoreResult<Match> {
        let m = self.get_match(match_id)?;
        if m.status != MatchStatus::Ready {
            return Err(CoreError::conflict(format!(
                "match {match_id} is {} and cannot start",
                m.status
            )));
        }

        let m = self.match_mut(match_id)?;
        m.transition_to(MatchStatus::Live)?;
        Ok(m.clone())
    }

    /// Award the match to the opponent of `forfeiting`
    ///
    /// # Errors
    ///
    /// * `CoreError::Validation` - `forfeiting` does not play in the match
    /// * `CoreError::Conflict` - the match is not READY/LIVE or a result is pending
    pub fn forfeit_match(
        &mut self,
        match_id: MatchId,
        forfeiting: ParticipantId,
        staff: StaffId,
        now: DateTime<Utc>,
    ) -> CoreResult<Match> {
        let m = self.get_match(match_id)?;
        let Some(winner) = m.opponent_of(forfeiting) else {
            return Err(CoreError::validation(format!(
                "participant {forfeiting} has no opponent in match {match_id}"
            )));
        };
        self.ensure_unplayed(match_id)?;

        let m = self.match_mut(match_id)?;
        m.transition_to(MatchStatus::Forfeit)?;
        m.winner = Some(winner);
        m.loser = Some(forfeiting);
        m.completed_at = Some(now);

        log::info!(
            "Match {} forfeited by {} (staff {}); {} advances",
            match_id,
            forfeiting,
            staff,
            winner
        );
        self.propagate(match_id, now)?;
        self.get_match(match_id).cloned()
    }

    /// Call off an unplayed match; nobody advances from it
    ///
    /// # Errors
    ///
    /// * `CoreError::Conflict` - the match is not READY/LIVE or a result is pending
    pub fn cancel_match(
        &mut self,
        match_id: MatchId,
        staff: StaffId,
        now: DateTime<Utc>,
    ) -> CoreResult<Match> {
        self.ensure_unplayed(match_id)?;

        let m = self.match_mut(match_id)?;
        m.transition_to(MatchStatus::Cancelled)?;
        m.completed_at = Some(now);

        log::warn!("Match {} cancelled by staff {}", match_id, staff);
        self.propagate(match_id, now)?;
        self.get_match(match_id).cloned()
    }

    /// Write the final result onto the match and advance the winner.
    ///
    /// The submission moves to FINALIZED, remembering the status it passed
    /// through.
    pub(crate) fn finalize(
        &mut self,
        submission_id: SubmissionId,
        payload: ResultPayload,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        let s = self.submission(submission_id)?;
        if s.status == SubmissionStatus::Finalized {
            return Err(CoreError::conflict(format!(
                "submission {submission_id} is already finalized"
            )));
        }
        let match_id = s.match_id;
        let MatchOutcome {
            winner,
            loser,
            score1,
            score2,
        } = payload.outcome(self.get_match(match_id)?)?;

        let m = self.match_mut(match_id)?;
        m.transition_to(MatchStatus::Completed)?;
        m.winner = Some(winner);
        m.loser = Some(loser);
        m.score1 = Some(score1);
        m.score2 = Some(score2);
        m.completed_at = Some(now);

        let s = self.submission_mut(submission_id)?;
        s.finalized_via = Some(s.status);
        s.status = SubmissionStatus::Finalized;
        s.final_payload = Some(payload);
        s.finalized_at = Some(now);

        log::info!(
            "Match {} finalized: {} beat {} ({}-{})",
            match_id,
            winner,
            loser,
            score1,
            score2
        );
        self.propagate(match_id, now)
    }

    /// Responder must be the other participant of the submission's match
    fn ensure_opponent(
        &self,
        submission_id: SubmissionId,
        responder: ParticipantId,
    ) -> CoreResult<MatchId> {
        let s = self.submission(submission_id)?;
        let m = self.get_match(s.match_id)?;

        if responder == s.submitted_by || m.opponent_of(s.submitted_by) != Some(responder) {
            return Err(CoreError::permission(format!(
                "participant {responder} cannot respond to submission {submission_id}"
            )));
        }
        Ok(m.id)
    }

    fn ensure_submission_status(
        &self,
        submission_id: SubmissionId,
        allowed: &[SubmissionStatus],
    ) -> CoreResult<()> {
        let s = self.submission(submission_id)?;
        if !allowed.contains(&s.status) {
            return Err(CoreError::conflict(format!(
                "submission {submission_id} is {}",
                s.status
            )));
        }
        Ok(())
    }

    fn ensure_unplayed(&self, match_id: MatchId) -> CoreResult<()> {
        let m = self.get_match(match_id)?;
        if !matches!(m.status, MatchStatus::Ready | MatchStatus::Live) {
            return Err(CoreError::conflict(format!(
                "match {match_id} is {}",
                m.status
            )));
        }
        if let Some(active) = self.active_submission(match_id) {
            return Err(CoreError::conflict(format!(
                "match {match_id} has pending submission {}",
                active.id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bracket::build_bracket,
        participant::Participant,
        seeding::{SeedingMode, apply_seeding},
    };
    use chrono::Duration;

    fn tree(n: i64) -> BracketTree {
        let roster: Vec<Participant> = (1..=n).map(|i| Participant::solo(i, format!("p{i}"))).collect();
        let seeded = apply_seeding(&roster, &SeedingMode::SlotOrder).unwrap();
        build_bracket(3, &seeded, Utc::now()).unwrap()
    }

    fn first_match(t: &BracketTree) -> MatchId {
        t.match_at(1, 0).unwrap().id
    }

    fn score(a: (ParticipantId, u32), b: (ParticipantId, u32)) -> ResultPayload {
        ResultPayload::from_scores([a, b])
    }

    #[test]
    fn test_confirm_finalizes_and_advances() {
        let mut t = tree(4);
        let m = first_match(&t);
        let now = Utc::now();

        let s = t.submit_result(m, 1, score((1, 3), (4, 1)), None, now).unwrap();
        assert_eq!(t.get_match(m).unwrap().status, MatchStatus::PendingResult);

        let s = t.confirm_result(s.id, 4, now).unwrap();
        assert_eq!(s.status, SubmissionStatus::Finalized);
        assert_eq!(s.finalized_via, Some(SubmissionStatus::Confirmed));

        let played = t.get_match(m).unwrap();
        assert_eq!(played.status, MatchStatus::Completed);
        assert_eq!(played.winner, Some(1));
        assert_eq!((played.score1, played.score2), (Some(3), Some(1)));
        assert_eq!(t.match_at(2, 0).unwrap().participant1, Some(1));
    }

    #[test]
    fn test_only_opponent_may_respond() {
        let mut t = tree(4);
        let m = first_match(&t);
        let now = Utc::now();
        let s = t.submit_result(m, 1, score((1, 3), (4, 1)), None, now).unwrap();

        for outsider in [1, 2, 99] {
            let err = t.confirm_result(s.id, outsider, now).unwrap_err();
            assert!(matches!(err, CoreError::Permission(_)), "{outsider}");
            let err = t.dispute_result(s.id, outsider, None, "no", now).unwrap_err();
            assert!(matches!(err, CoreError::Permission(_)), "{outsider}");
        }
    }

    #[test]
    fn test_submit_rejections() {
        let mut t = tree(4);
        let m = first_match(&t);
        let now = Utc::now();

        let err = t.submit_result(m, 2, score((1, 3), (4, 1)), None, now).unwrap_err();
        assert!(matches!(err, CoreError::Permission(_)));

        let err = t.submit_result(m, 1, score((1, 3), (3, 1)), None, now).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert_eq!(t.get_match(m).unwrap().status, MatchStatus::Ready);

        let final_match = t.match_at(2, 0).unwrap().id;
        let err = t.submit_result(final_match, 1, score((1, 1), (2, 0)), None, now).unwrap_err();
        assert!(matches!(err, CoreError::Permission(_) | CoreError::Conflict(_)));

        let s = t.submit_result(m, 1, score((1, 3), (4, 1)), None, now).unwrap();
        let err = t.submit_result(m, 4, score((1, 0), (4, 2)), None, now).unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));

        t.confirm_result(s.id, 4, now).unwrap();
        let err = t.submit_result(m, 4, score((1, 0), (4, 2)), None, now).unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
        let err = t.confirm_result(s.id, 4, now).unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[test]
    fn test_auto_confirm_after_window() {
        let mut t = tree(2);
        let m = first_match(&t);
        let t0 = Utc::now();
        let s = t.submit_result(m, 1, score((1, 16), (2, 12)), None, t0).unwrap();

        let err = t.auto_confirm(s.id, t0 + Duration::hours(23)).unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
        assert!(t.overdue_submissions(t0 + Duration::hours(23)).is_empty());

        let later = t0 + Duration::hours(24) + Duration::minutes(1);
        assert_eq!(t.overdue_submissions(later), vec![s.id]);
        let s = t.auto_confirm(s.id, later).unwrap();
        assert_eq!(s.status, SubmissionStatus::Finalized);
        assert_eq!(s.finalized_via, Some(SubmissionStatus::AutoConfirmed));
        assert_eq!(s.auto_confirm_deadline, t0 + Duration::hours(24));
        assert_eq!(t.champion(), Some(1));
    }

    #[test]
    fn test_dispute_blocks_auto_confirm_and_emits() {
        let mut t = tree(2);
        let m = first_match(&t);
        let t0 = Utc::now();
        let s = t.submit_result(m, 1, score((1, 16), (2, 12)), None, t0).unwrap();
        t.take_changes();

        let counter = score((1, 12), (2, 16));
        let d = t.dispute_result(s.id, 2, Some(counter.clone()), "scores swapped", t0).unwrap();
        assert_eq!(d.status, SubmissionStatus::Disputed);
        assert_eq!(d.counter_payload, Some(counter));
        assert_eq!(d.auto_confirm_deadline, s.auto_confirm_deadline);
        assert_eq!(t.get_match(m).unwrap().status, MatchStatus::Disputed);

        let events = t.take_changes().events;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].topic(), "dispute.opened");

        let err = t.auto_confirm(s.id, t0 + Duration::hours(48)).unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));

        let r = t.begin_review(s.id, 500).unwrap();
        assert_eq!(r.status, SubmissionStatus::UnderReview);
    }

    #[test]
    fn test_dispute_needs_reason() {
        let mut t = tree(2);
        let m = first_match(&t);
        let s = t.submit_result(m, 1, score((1, 2), (2, 0)), None, Utc::now()).unwrap();
        let err = t.dispute_result(s.id, 2, None, "   ", Utc::now()).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert_eq!(t.submission(s.id).unwrap().status, SubmissionStatus::Pending);
    }

    #[test]
    fn test_start_and_forfeit() {
        let mut t = tree(4);
        let m = first_match(&t);
        let now = Utc::now();

        let live = t.start_match(m).unwrap();
        assert_eq!(live.status, MatchStatus::Live);
        assert!(matches!(t.start_match(m), Err(CoreError::Conflict(_))));

        let err = t.forfeit_match(m, 3, 900, now).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let done = t.forfeit_match(m, 1, 900, now).unwrap();
        assert_eq!(done.status, MatchStatus::Forfeit);
        assert_eq!(done.winner, Some(4));
        assert_eq!(t.match_at(2, 0).unwrap().participant1, Some(4));
    }

    #[test]
    fn test_forfeit_refused_while_result_pending() {
        let mut t = tree(4);
        let m = first_match(&t);
        let now = Utc::now();
        t.submit_result(m, 1, score((1, 3), (4, 1)), None, now).unwrap();
        let err = t.forfeit_match(m, 4, 900, now).unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[test]
    fn test_cancelled_match_is_a_bye_for_parent() {
        let mut t = tree(4);
        let now = Utc::now();
        let upper = first_match(&t);
        let lower = t.match_at(1, 1).unwrap().id;

        let s = t.submit_result(lower, 2, score((2, 5), (3, 4)), None, now).unwrap();
        t.confirm_result(s.id, 3, now).unwrap();

        let cancelled = t.cancel_match(upper, 900, now).unwrap();
        assert_eq!(cancelled.status, MatchStatus::Cancelled);
        assert_eq!(cancelled.winner, None);

        let final_match = t.match_at(2, 0).unwrap();
        assert_eq!(final_match.status, MatchStatus::Completed);
        assert!(final_match.is_bye);
        assert_eq!(t.champion(), Some(2));
    }
}
