//! Staff resolution of disputed results.

use crate::{
    bracket::{BracketId, BracketTree, Match, MatchId, MatchStatus},
    error::{CoreError, CoreResult},
    lifecycle::{ResultPayload, SubmissionId, SubmissionStatus, auto_confirm_window},
    notify::TournamentEvent,
    participant::{ParticipantId, StaffId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Staff decision on a disputed submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionType {
    /// Keep the submitter's payload
    ApproveOriginal,
    /// Adopt the disputer's counter-payload
    ApproveDispute,
    /// Staff-entered payload
    CustomResult,
    /// Back to PENDING with a fresh confirmation window
    DismissDispute,
}

impl ResolutionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionType::ApproveOriginal => "approve_original",
            ResolutionType::ApproveDispute => "approve_dispute",
            ResolutionType::CustomResult => "custom_result",
            ResolutionType::DismissDispute => "dismiss_dispute",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "approve_original" => Some(ResolutionType::ApproveOriginal),
            "approve_dispute" => Some(ResolutionType::ApproveDispute),
            "custom_result" => Some(ResolutionType::CustomResult),
            "dismiss_dispute" => Some(ResolutionType::DismissDispute),
            _ => None,
        }
    }

    /// Whether applying this resolution finalizes the match
    pub fn requires_finalization(&self) -> bool {
        !matches!(self, ResolutionType::DismissDispute)
    }
}

/// Resolution input from staff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionRequest {
    pub resolution_type: ResolutionType,
    pub resolver_id: StaffId,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub custom_payload: Option<ResultPayload>,
}

/// Immutable audit record of a resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeResolution {
    pub id: Uuid,
    pub submission_id: SubmissionId,
    pub match_id: MatchId,
    pub bracket_id: BracketId,
    pub resolution_type: ResolutionType,
    pub resolver_id: StaffId,
    pub notes: Option<String>,
    /// Dispute as filed, kept after a dismissal clears it from the submission
    pub disputed_by: Option<ParticipantId>,
    pub dispute_reason: Option<String>,
    pub counter_payload: Option<ResultPayload>,
    pub custom_payload: Option<ResultPayload>,
    /// Payload the match was finalized with; `None` for a dismissal
    pub chosen_payload: Option<ResultPayload>,
    pub resolved_at: DateTime<Utc>,
}

impl BracketTree {
    /// Apply a staff decision to a disputed submission.
    ///
    /// The chosen payload is validated against the match before anything is
    /// written. Finalizing decisions complete the match and advance the
    /// winner; a dismissal puts the submission back to PENDING with a new
    /// 24h confirmation window.
    ///
    /// # Errors
    ///
    /// * `CoreError::NotFound` - unknown submission
    /// * `CoreError::Conflict` - submission is not DISPUTED or UNDER_REVIEW
    /// * `CoreError::Validation` - no counter-payload to approve, missing or
    ///   empty custom payload, or a payload that does not fit the match
    pub fn resolve_dispute(
        &mut self,
        submission_id: SubmissionId,
        request: ResolutionRequest,
        now: DateTime<Utc>,
    ) -> CoreResult<Match> {
        let s = self.submission(submission_id)?;
        if !s.status.is_disputed() {
            return Err(CoreError::conflict(format!(
                "submission {submission_id} is {} and has no open dispute",
                s.status
            )));
        }

        let chosen = match request.resolution_type {
            ResolutionType::ApproveOriginal => Some(s.payload.clone()),
            ResolutionType::ApproveDispute => Some(s.counter_payload.clone().ok_or_else(|| {
                CoreError::validation(format!(
                    "submission {submission_id} has no counter-payload to approve"
                ))
            })?),
            ResolutionType::CustomResult => Some(
                request
                    .custom_payload
                    .clone()
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| CoreError::validation("custom_result needs a payload"))?,
            ),
            ResolutionType::DismissDispute => None,
        };

        let match_id = s.match_id;
        if let Some(payload) = &chosen {
            payload.outcome(self.get_match(match_id)?)?;
        }

        let record = DisputeResolution {
            id: Uuid::new_v4(),
            submission_id,
            match_id,
            bracket_id: self.id(),
            resolution_type: request.resolution_type,
            resolver_id: request.resolver_id,
            notes: request.notes,
            disputed_by: s.disputed_by,
            dispute_reason: s.dispute_reason.clone(),
            counter_payload: s.counter_payload.clone(),
            custom_payload: request.custom_payload,
            chosen_payload: chosen.clone(),
            resolved_at: now,
        };

        match chosen {
            Some(payload) => {
                self.submission_mut(submission_id)?.status = SubmissionStatus::Resolved;
                self.finalize(submission_id, payload, now)?;
            }
            None => {
                let s = self.submission_mut(submission_id)?;
                s.status = SubmissionStatus::Pending;
                s.confirm_window_ends_at = now + auto_confirm_window();
                s.disputed_by = None;
                s.dispute_reason = None;
                s.counter_payload = None;
                s.responded_at = None;
                self.match_mut(match_id)?
                    .transition_to(MatchStatus::PendingResult)?;
            }
        }

        log::info!(
            "Dispute on submission {} resolved by staff {} as {}",
            submission_id,
            record.resolver_id,
            record.resolution_type.as_str()
        );

        self.emit(TournamentEvent::DisputeResolved {
            submission_id,
            match_id,
            resolution_type: record.resolution_type,
            resolver_id: record.resolver_id,
        });
        self.record_resolution(record);
        self.get_match(match_id).cloned()
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

    fn disputed(counter: Option<ResultPayload>) -> (BracketTree, SubmissionId, DateTime<Utc>) {
        let roster: Vec<Participant> = (1..=2).map(|i| Participant::solo(i, format!("p{i}"))).collect();
        let seeded = apply_seeding(&roster, &SeedingMode::SlotOrder).unwrap();
        let mut t = build_bracket(1, &seeded, Utc::now()).unwrap();
        let m = t.match_at(1, 0).unwrap().id;
        let t0 = Utc::now();
        let s = t
            .submit_result(m, 1, ResultPayload::from_scores([(1, 16), (2, 12)]), None, t0)
            .unwrap();
        t.dispute_result(s.id, 2, counter, "wrong score", t0).unwrap();
        t.take_changes();
        (t, s.id, t0)
    }

    fn request(kind: ResolutionType, custom: Option<ResultPayload>) -> ResolutionRequest {
        ResolutionRequest {
            resolution_type: kind,
            resolver_id: 77,
            notes: Some("checked the replay".to_string()),
            custom_payload: custom,
        }
    }

    fn winner(t: &BracketTree) -> Option<ParticipantId> {
        t.match_at(1, 0).and_then(|m| m.winner)
    }

    #[test]
    fn test_requires_finalization() {
        assert!(ResolutionType::ApproveOriginal.requires_finalization());
        assert!(ResolutionType::ApproveDispute.requires_finalization());
        assert!(ResolutionType::CustomResult.requires_finalization());
        assert!(!ResolutionType::DismissDispute.requires_finalization());
    }

    #[test]
    fn test_approve_original() {
        let (mut t, s, t0) = disputed(None);
        let m = t.resolve_dispute(s, request(ResolutionType::ApproveOriginal, None), t0).unwrap();
        assert_eq!(m.status, MatchStatus::Completed);
        assert_eq!(winner(&t), Some(1));

        let sub = t.submission(s).unwrap();
        assert_eq!(sub.status, SubmissionStatus::Finalized);
        assert_eq!(sub.finalized_via, Some(SubmissionStatus::Resolved));

        let changes = t.take_changes();
        assert_eq!(changes.resolutions.len(), 1);
        assert_eq!(changes.events[0].topic(), "dispute.resolved");
    }

    #[test]
    fn test_approve_dispute_uses_counter() {
        let counter = ResultPayload::from_scores([(1, 12), (2, 16)]);
        let (mut t, s, t0) = disputed(Some(counter.clone()));
        t.resolve_dispute(s, request(ResolutionType::ApproveDispute, None), t0).unwrap();
        assert_eq!(winner(&t), Some(2));
        let record = &t.changes().resolutions[0];
        assert_eq!(record.chosen_payload, Some(counter));
    }

    #[test]
    fn test_approve_dispute_without_counter_rejected() {
        let (mut t, s, t0) = disputed(None);
        let err = t
            .resolve_dispute(s, request(ResolutionType::ApproveDispute, None), t0)
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(t.take_changes().is_empty());
    }

    #[test]
    fn test_custom_result_requires_payload() {
        let (mut t, s, t0) = disputed(None);
        for custom in [None, Some(ResultPayload::default())] {
            let err = t
                .resolve_dispute(s, request(ResolutionType::CustomResult, custom), t0)
                .unwrap_err();
            assert!(matches!(err, CoreError::Validation(_)));
        }
        assert!(t.take_changes().is_empty());
        assert_eq!(t.submission(s).unwrap().status, SubmissionStatus::Disputed);

        let custom = ResultPayload::from_scores([(1, 1), (2, 1)]).with_winner(2);
        t.resolve_dispute(s, request(ResolutionType::CustomResult, Some(custom)), t0)
            .unwrap();
        assert_eq!(winner(&t), Some(2));
    }

    #[test]
    fn test_dismiss_restarts_window_only() {
        let (mut t, s, t0) = disputed(None);
        let later = t0 + Duration::hours(30);
        let m = t.resolve_dispute(s, request(ResolutionType::DismissDispute, None), later).unwrap();
        assert_eq!(m.status, MatchStatus::PendingResult);
        assert_eq!(m.winner, None);

        let sub = t.submission(s).unwrap();
        assert_eq!(sub.status, SubmissionStatus::Pending);
        assert_eq!(sub.auto_confirm_deadline, t0 + Duration::hours(24));
        assert_eq!(sub.confirm_window_ends_at, later + Duration::hours(24));

        // Nothing is overdue until the new window closes.
        assert!(t.overdue_submissions(later + Duration::hours(23)).is_empty());

        // A second dismissal sees PENDING and loses.
        let err = t
            .resolve_dispute(s, request(ResolutionType::DismissDispute, None), later)
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[test]
    fn test_dismissal_record_keeps_the_dispute() {
        let counter = ResultPayload::from_scores([(1, 12), (2, 16)]);
        let (mut t, s, t0) = disputed(Some(counter.clone()));
        t.resolve_dispute(s, request(ResolutionType::DismissDispute, None), t0)
            .unwrap();

        let sub = t.submission(s).unwrap();
        assert_eq!(sub.disputed_by, None);
        assert_eq!(sub.counter_payload, None);

        let changes = t.take_changes();
        let record = &changes.resolutions[0];
        assert_eq!(record.disputed_by, Some(2));
        assert_eq!(record.dispute_reason.as_deref(), Some("wrong score"));
        assert_eq!(record.counter_payload, Some(counter));
        assert_eq!(record.chosen_payload, None);
    }

    #[test]
    fn test_under_review_is_resolvable() {
        let (mut t, s, t0) = disputed(None);
        t.begin_review(s, 77).unwrap();
        t.resolve_dispute(s, request(ResolutionType::ApproveOriginal, None), t0)
            .unwrap();
        assert_eq!(winner(&t), Some(1));
    }
}
