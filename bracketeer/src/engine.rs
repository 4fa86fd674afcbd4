//! Tournament engine: the operation surface over a store and a notifier.

use crate::{
    bracket::{Bracket, BracketId, BracketTree, Match, MatchId, build_bracket, check_regeneration},
    db::{
        repository::TournamentStore,
        timeouts::{DEFAULT_TRANSACTION_TIMEOUT, with_timeout},
    },
    dispute::{DisputeResolution, ResolutionRequest},
    error::{CoreError, CoreResult},
    lifecycle::{ResultPayload, ResultSubmission, SubmissionId},
    notify::{Notifier, TournamentEvent},
    participant::{Participant, ParticipantId, StaffId, TournamentId},
    registration::{
        Payment, PaymentDeadlineMonitor, PaymentId, Registration, RegistrationBook,
        RegistrationId, SweepReport, TournamentPolicy,
    },
    seeding::{SeededParticipant, SeedingMode, apply_seeding},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};

/// Counts from one auto-confirm scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoConfirmReport {
    pub confirmed_count: usize,
    /// Submissions a concurrent unit of work already moved on
    pub skipped_count: usize,
    pub failed_count: usize,
}

/// Tournament engine
///
/// Every operation runs as one unit of work against the store, bounded by the
/// engine's operation timeout. Events are published only after the unit of
/// work committed.
pub struct TournamentEngine<S> {
    /// Persistence backend
    store: Arc<S>,

    /// Event sink
    notifier: Arc<dyn Notifier>,

    /// Time budget of a single store call
    op_timeout: Duration,

    /// Payment deadline monitor sharing the store
    monitor: PaymentDeadlineMonitor<S>,
}

impl<S> Clone for TournamentEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            notifier: Arc::clone(&self.notifier),
            op_timeout: self.op_timeout,
            monitor: self.monitor.clone(),
        }
    }
}

impl<S: TournamentStore> TournamentEngine<S> {
    /// Create a new engine
    ///
    /// # Arguments
    ///
    /// * `store` - Repository implementation (PostgreSQL or in-memory)
    /// * `notifier` - Sink for `match.scheduled` and dispute events
    pub fn new(store: Arc<S>, notifier: Arc<dyn Notifier>) -> Self {
        Self::with_op_timeout(store, notifier, DEFAULT_TRANSACTION_TIMEOUT)
    }

    /// Create an engine with a custom per-operation timeout
    pub fn with_op_timeout(store: Arc<S>, notifier: Arc<dyn Notifier>, op_timeout: Duration) -> Self {
        let monitor = PaymentDeadlineMonitor::new(Arc::clone(&store), op_timeout);
        Self {
            store,
            notifier,
            op_timeout,
            monitor,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn publish(&self, events: Vec<TournamentEvent>) {
        for event in &events {
            self.notifier.notify(event);
        }
    }

    async fn mutate_bracket<F, T>(&self, bracket_id: BracketId, apply: F) -> CoreResult<T>
    where
        F: FnOnce(&mut BracketTree) -> CoreResult<T> + Send,
        T: Send,
    {
        let (value, events) =
            with_timeout(self.op_timeout, self.store.update_bracket(bracket_id, apply)).await?;
        self.publish(events);
        Ok(value)
    }

    async fn mutate_registrations<F, T>(&self, tournament_id: TournamentId, apply: F) -> CoreResult<T>
    where
        F: FnOnce(&mut RegistrationBook) -> CoreResult<T> + Send,
        T: Send,
    {
        with_timeout(
            self.op_timeout,
            self.store.update_registrations(tournament_id, apply),
        )
        .await
    }

    async fn bracket_of_tournament(&self, tournament_id: TournamentId) -> CoreResult<BracketId> {
        with_timeout(self.op_timeout, self.store.bracket_for_tournament(tournament_id)).await
    }

    async fn bracket_of_match(&self, match_id: MatchId) -> CoreResult<BracketId> {
        with_timeout(self.op_timeout, self.store.bracket_for_match(match_id)).await
    }

    async fn bracket_of_submission(&self, submission_id: SubmissionId) -> CoreResult<BracketId> {
        with_timeout(self.op_timeout, self.store.bracket_for_submission(submission_id)).await
    }

    // === Seeding and bracket structure ===

    /// Assign seeds without touching storage
    pub fn apply_seeding(
        &self,
        participants: &[Participant],
        mode: &SeedingMode,
    ) -> CoreResult<Vec<SeededParticipant>> {
        apply_seeding(participants, mode)
    }

    /// Seed `participants` and build the tournament's bracket.
    ///
    /// Seeding is validated before the store is touched, so a rejected seed
    /// set never leaves a partial bracket behind. An existing bracket is
    /// replaced only when `force` is set and the bracket is unlocked.
    ///
    /// # Errors
    ///
    /// * `CoreError::Validation` - bad seeding or fewer than two participants
    /// * `CoreError::Conflict` - a bracket exists and `force` is not set
    /// * `CoreError::Permission` - the existing bracket is locked
    pub async fn generate_bracket(
        &self,
        tournament_id: TournamentId,
        participants: &[Participant],
        mode: &SeedingMode,
        force: bool,
    ) -> CoreResult<BracketTree> {
        let seeded = apply_seeding(participants, mode)?;
        let now = Utc::now();

        let (tree, events) = with_timeout(
            self.op_timeout,
            self.store.replace_bracket(tournament_id, move |existing| {
                check_regeneration(existing, force)?;
                build_bracket(tournament_id, &seeded, now)
            }),
        )
        .await?;

        log::info!(
            "Generated bracket {} for tournament {}: {} participants, {} rounds",
            tree.id(),
            tournament_id,
            tree.bracket().participant_count,
            tree.bracket().total_rounds
        );
        self.publish(events);
        Ok(tree)
    }

    /// Current bracket of a tournament
    pub async fn get_bracket(&self, tournament_id: TournamentId) -> CoreResult<BracketTree> {
        with_timeout(self.op_timeout, self.store.load_bracket(tournament_id))
            .await?
            .ok_or_else(|| CoreError::not_found("bracket", format!("tournament {tournament_id}")))
    }

    /// Seeded entrants of the tournament's bracket
    pub async fn list_participants(
        &self,
        tournament_id: TournamentId,
    ) -> CoreResult<Vec<SeededParticipant>> {
        with_timeout(self.op_timeout, self.store.list_participants(tournament_id)).await
    }

    pub async fn swap_participants(
        &self,
        tournament_id: TournamentId,
        a: ParticipantId,
        b: ParticipantId,
    ) -> CoreResult<Bracket> {
        let bracket_id = self.bracket_of_tournament(tournament_id).await?;
        let now = Utc::now();
        self.mutate_bracket(bracket_id, move |tree| {
            tree.swap_participants(a, b, now)?;
            Ok(tree.bracket().clone())
        })
        .await
    }

    pub async fn remove_participant(
        &self,
        tournament_id: TournamentId,
        participant: ParticipantId,
    ) -> CoreResult<Bracket> {
        let bracket_id = self.bracket_of_tournament(tournament_id).await?;
        let now = Utc::now();
        self.mutate_bracket(bracket_id, move |tree| {
            tree.remove_participant(participant, now)?;
            Ok(tree.bracket().clone())
        })
        .await
    }

    /// Move a participant into an empty round-1 slot
    pub async fn move_participant(
        &self,
        tournament_id: TournamentId,
        participant: ParticipantId,
        slot: u32,
    ) -> CoreResult<Bracket> {
        let bracket_id = self.bracket_of_tournament(tournament_id).await?;
        let now = Utc::now();
        self.mutate_bracket(bracket_id, move |tree| {
            tree.move_participant(participant, slot, now)?;
            Ok(tree.bracket().clone())
        })
        .await
    }

    pub async fn lock_bracket(&self, tournament_id: TournamentId, staff: StaffId) -> CoreResult<Bracket> {
        self.set_locked(tournament_id, staff, true).await
    }

    pub async fn unlock_bracket(&self, tournament_id: TournamentId, staff: StaffId) -> CoreResult<Bracket> {
        self.set_locked(tournament_id, staff, false).await
    }

    async fn set_locked(
        &self,
        tournament_id: TournamentId,
        staff: StaffId,
        locked: bool,
    ) -> CoreResult<Bracket> {
        let bracket_id = self.bracket_of_tournament(tournament_id).await?;
        let bracket = self
            .mutate_bracket(bracket_id, move |tree| {
                tree.set_locked(locked);
                Ok(tree.bracket().clone())
            })
            .await?;
        log::info!(
            "Bracket {} {} by staff {}",
            bracket_id,
            if locked { "locked" } else { "unlocked" },
            staff
        );
        Ok(bracket)
    }

    // === Match lifecycle ===

    pub async fn submit_result(
        &self,
        match_id: MatchId,
        submitter: ParticipantId,
        payload: ResultPayload,
        proof_ref: Option<String>,
    ) -> CoreResult<ResultSubmission> {
        let bracket_id = self.bracket_of_match(match_id).await?;
        let now = Utc::now();
        self.mutate_bracket(bracket_id, move |tree| {
            tree.submit_result(match_id, submitter, payload, proof_ref, now)
        })
        .await
    }

    pub async fn confirm_result(
        &self,
        submission_id: SubmissionId,
        responder: ParticipantId,
    ) -> CoreResult<ResultSubmission> {
        let bracket_id = self.bracket_of_submission(submission_id).await?;
        let now = Utc::now();
        self.mutate_bracket(bracket_id, move |tree| {
            tree.confirm_result(submission_id, responder, now)
        })
        .await
    }

    pub async fn dispute_result(
        &self,
        submission_id: SubmissionId,
        responder: ParticipantId,
        counter_payload: Option<ResultPayload>,
        reason: String,
    ) -> CoreResult<ResultSubmission> {
        let bracket_id = self.bracket_of_submission(submission_id).await?;
        let now = Utc::now();
        self.mutate_bracket(bracket_id, move |tree| {
            tree.dispute_result(submission_id, responder, counter_payload, &reason, now)
        })
        .await
    }

    pub async fn begin_review(
        &self,
        submission_id: SubmissionId,
        staff: StaffId,
    ) -> CoreResult<ResultSubmission> {
        let bracket_id = self.bracket_of_submission(submission_id).await?;
        self.mutate_bracket(bracket_id, move |tree| tree.begin_review(submission_id, staff))
            .await
    }

    pub async fn resolve_dispute(
        &self,
        submission_id: SubmissionId,
        request: ResolutionRequest,
    ) -> CoreResult<Match> {
        let bracket_id = self.bracket_of_submission(submission_id).await?;
        let now = Utc::now();
        self.mutate_bracket(bracket_id, move |tree| {
            tree.resolve_dispute(submission_id, request, now)
        })
        .await
    }

    /// Audit trail of a submission, oldest first
    pub async fn list_resolutions(
        &self,
        submission_id: SubmissionId,
    ) -> CoreResult<Vec<DisputeResolution>> {
        with_timeout(self.op_timeout, self.store.list_resolutions(submission_id)).await
    }

    pub async fn start_match(&self, match_id: MatchId) -> CoreResult<Match> {
        let bracket_id = self.bracket_of_match(match_id).await?;
        self.mutate_bracket(bracket_id, move |tree| tree.start_match(match_id))
            .await
    }

    pub async fn forfeit_match(
        &self,
        match_id: MatchId,
        forfeiting: ParticipantId,
        staff: StaffId,
    ) -> CoreResult<Match> {
        let bracket_id = self.bracket_of_match(match_id).await?;
        let now = Utc::now();
        self.mutate_bracket(bracket_id, move |tree| {
            tree.forfeit_match(match_id, forfeiting, staff, now)
        })
        .await
    }

    pub async fn cancel_match(&self, match_id: MatchId, staff: StaffId) -> CoreResult<Match> {
        let bracket_id = self.bracket_of_match(match_id).await?;
        let now = Utc::now();
        self.mutate_bracket(bracket_id, move |tree| tree.cancel_match(match_id, staff, now))
            .await
    }

    /// Auto-confirm every PENDING submission whose window has closed
    pub async fn run_auto_confirm_scan(&self) -> CoreResult<AutoConfirmReport> {
        self.run_auto_confirm_scan_at(Utc::now()).await
    }

    /// Auto-confirm scan as of `now`
    ///
    /// Each submission is its own unit of work; a submission confirmed or
    /// disputed in the meantime is skipped.
    pub async fn run_auto_confirm_scan_at(&self, now: DateTime<Utc>) -> CoreResult<AutoConfirmReport> {
        let overdue = with_timeout(self.op_timeout, self.store.overdue_submissions(now)).await?;
        let mut report = AutoConfirmReport::default();

        for (bracket_id, submission_id) in overdue {
            match self
                .mutate_bracket(bracket_id, move |tree| tree.auto_confirm(submission_id, now))
                .await
            {
                Ok(_) => {
                    log::info!("Submission {} auto-confirmed", submission_id);
                    report.confirmed_count += 1;
                }
                Err(CoreError::Conflict(reason)) => {
                    log::debug!("Submission {} skipped: {}", submission_id, reason);
                    report.skipped_count += 1;
                }
                Err(e) => {
                    log::error!(
                        "Auto-confirming submission {} in bracket {} failed: {}",
                        submission_id,
                        bracket_id,
                        e
                    );
                    report.failed_count += 1;
                }
            }
        }

        Ok(report)
    }

    // === Registration and payments ===

    /// Create or replace a tournament's registration policy
    ///
    /// # Errors
    ///
    /// * `CoreError::Validation` - zero capacity or a negative entry fee
    pub async fn set_policy(&self, policy: TournamentPolicy) -> CoreResult<TournamentPolicy> {
        if policy.capacity == 0 {
            return Err(CoreError::validation("capacity must be at least 1"));
        }
        if policy.entry_fee < 0 {
            return Err(CoreError::validation("entry fee cannot be negative"));
        }
        with_timeout(self.op_timeout, self.store.upsert_policy(&policy)).await?;
        Ok(policy)
    }

    pub async fn get_policy(&self, tournament_id: TournamentId) -> CoreResult<TournamentPolicy> {
        with_timeout(self.op_timeout, self.store.get_policy(tournament_id)).await
    }

    pub async fn register(
        &self,
        tournament_id: TournamentId,
        participant: ParticipantId,
    ) -> CoreResult<Registration> {
        let now = Utc::now();
        self.mutate_registrations(tournament_id, move |book| book.register(participant, now))
            .await
    }

    pub async fn withdraw(&self, registration_id: RegistrationId) -> CoreResult<Registration> {
        let tournament_id = with_timeout(
            self.op_timeout,
            self.store.tournament_for_registration(registration_id),
        )
        .await?;
        let now = Utc::now();
        self.mutate_registrations(tournament_id, move |book| book.withdraw(registration_id, now))
            .await
    }

    pub async fn submit_payment(&self, registration_id: RegistrationId) -> CoreResult<Payment> {
        let tournament_id = with_timeout(
            self.op_timeout,
            self.store.tournament_for_registration(registration_id),
        )
        .await?;
        let now = Utc::now();
        self.mutate_registrations(tournament_id, move |book| {
            book.submit_payment(registration_id, now)
        })
        .await
    }

    pub async fn verify_payment(&self, payment_id: PaymentId, staff: StaffId) -> CoreResult<Payment> {
        let tournament_id =
            with_timeout(self.op_timeout, self.store.tournament_for_payment(payment_id)).await?;
        let now = Utc::now();
        self.mutate_registrations(tournament_id, move |book| {
            book.verify_payment(payment_id, staff, now)
        })
        .await
    }

    pub async fn reject_payment(
        &self,
        payment_id: PaymentId,
        staff: StaffId,
        reason: String,
    ) -> CoreResult<Payment> {
        let tournament_id =
            with_timeout(self.op_timeout, self.store.tournament_for_payment(payment_id)).await?;
        let now = Utc::now();
        self.mutate_registrations(tournament_id, move |book| {
            book.reject_payment(payment_id, staff, &reason, now)
        })
        .await
    }

    pub async fn waive_payment(
        &self,
        registration_id: RegistrationId,
        staff: StaffId,
    ) -> CoreResult<Payment> {
        let tournament_id = with_timeout(
            self.op_timeout,
            self.store.tournament_for_registration(registration_id),
        )
        .await?;
        let now = Utc::now();
        self.mutate_registrations(tournament_id, move |book| {
            book.waive_payment(registration_id, staff, now)
        })
        .await
    }

    pub async fn list_registrations(
        &self,
        tournament_id: TournamentId,
    ) -> CoreResult<Vec<Registration>> {
        with_timeout(self.op_timeout, self.store.list_registrations(tournament_id)).await
    }

    /// Expire overdue payments and promote waitlisted registrations
    pub async fn run_payment_expiry_sweep(&self) -> CoreResult<SweepReport> {
        self.monitor.sweep_at(Utc::now()).await
    }

    pub async fn run_payment_expiry_sweep_at(&self, now: DateTime<Utc>) -> CoreResult<SweepReport> {
        self.monitor.sweep_at(now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bracket::MatchStatus,
        db::MemoryStore,
        notify::ChannelNotifier,
        registration::RegistrationStatus,
    };

    fn engine() -> (
        TournamentEngine<MemoryStore>,
        tokio::sync::mpsc::UnboundedReceiver<TournamentEvent>,
    ) {
        let (notifier, rx) = ChannelNotifier::new();
        (
            TournamentEngine::new(Arc::new(MemoryStore::new()), Arc::new(notifier)),
            rx,
        )
    }

    fn players(n: i64) -> Vec<Participant> {
        (1..=n).map(|i| Participant::solo(i, format!("p{i}"))).collect()
    }

    #[tokio::test]
    async fn test_generate_publishes_after_commit() {
        let (engine, mut rx) = engine();
        let tree = engine
            .generate_bracket(7, &players(4), &SeedingMode::SlotOrder, false)
            .await
            .unwrap();

        assert_eq!(tree.matches_in_round(1), 2);
        let mut topics = Vec::new();
        while let Ok(event) = rx.try_recv() {
            topics.push(event.topic());
        }
        assert_eq!(topics, vec!["match.scheduled", "match.scheduled"]);
    }

    #[tokio::test]
    async fn test_regeneration_requires_force() {
        let (engine, _rx) = engine();
        engine
            .generate_bracket(7, &players(4), &SeedingMode::SlotOrder, false)
            .await
            .unwrap();

        let again = engine
            .generate_bracket(7, &players(6), &SeedingMode::SlotOrder, false)
            .await;
        assert!(matches!(again, Err(CoreError::Conflict(_))));

        let forced = engine
            .generate_bracket(7, &players(6), &SeedingMode::SlotOrder, true)
            .await
            .unwrap();
        assert_eq!(forced.bracket().participant_count, 6);
        assert_eq!(engine.list_participants(7).await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_locked_bracket_refuses_edits() {
        let (engine, _rx) = engine();
        engine
            .generate_bracket(3, &players(4), &SeedingMode::SlotOrder, false)
            .await
            .unwrap();

        let bracket = engine.lock_bracket(3, 900).await.unwrap();
        assert!(bracket.is_locked);

        let swap = engine.swap_participants(3, 1, 2).await;
        assert!(matches!(swap, Err(CoreError::Permission(_))));
        let regen = engine
            .generate_bracket(3, &players(4), &SeedingMode::SlotOrder, true)
            .await;
        assert!(matches!(regen, Err(CoreError::Permission(_))));

        engine.unlock_bracket(3, 900).await.unwrap();
        engine.swap_participants(3, 1, 2).await.unwrap();
    }

    #[tokio::test]
    async fn test_confirmed_result_advances_winner() {
        let (engine, _rx) = engine();
        let tree = engine
            .generate_bracket(1, &players(4), &SeedingMode::SlotOrder, false)
            .await
            .unwrap();
        let first = tree.round(1)[0].clone();
        let (a, b) = (first.participant1.unwrap(), first.participant2.unwrap());

        let started = engine.start_match(first.id).await.unwrap();
        assert_eq!(started.status, MatchStatus::Live);

        let submission = engine
            .submit_result(first.id, a, ResultPayload::from_scores([(a, 3), (b, 1)]), None)
            .await
            .unwrap();
        let confirmed = engine.confirm_result(submission.id, b).await.unwrap();
        assert_eq!(confirmed.final_payload.as_ref(), Some(&submission.payload));

        let tree = engine.get_bracket(1).await.unwrap();
        assert_eq!(tree.match_at(1, 0).unwrap().winner, Some(a));
        assert!(tree.match_at(2, 0).unwrap().has_participant(a));
    }

    #[tokio::test]
    async fn test_unknown_ids_are_not_found() {
        let (engine, _rx) = engine();
        assert!(matches!(
            engine.get_bracket(404).await,
            Err(CoreError::NotFound { .. })
        ));
        assert!(matches!(
            engine.confirm_result(uuid::Uuid::new_v4(), 1).await,
            Err(CoreError::NotFound { .. })
        ));
        assert!(matches!(
            engine.register(404, 1).await,
            Err(CoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_policy_validation_and_free_registration() {
        let (engine, _rx) = engine();
        let bad = engine
            .set_policy(TournamentPolicy {
                tournament_id: 5,
                capacity: 0,
                entry_fee: 0,
                payment_deadline_hours: None,
            })
            .await;
        assert!(matches!(bad, Err(CoreError::Validation(_))));

        engine
            .set_policy(TournamentPolicy {
                tournament_id: 5,
                capacity: 1,
                entry_fee: 0,
                payment_deadline_hours: None,
            })
            .await
            .unwrap();

        let first = engine.register(5, 10).await.unwrap();
        let second = engine.register(5, 11).await.unwrap();
        assert_eq!(first.status, RegistrationStatus::Confirmed);
        assert_eq!(second.status, RegistrationStatus::Waitlisted);
        assert_eq!(second.waitlist_position, Some(1));

        let payment = engine.submit_payment(first.id).await;
        assert!(matches!(payment, Err(CoreError::Validation(_))));

        engine.withdraw(first.id).await.unwrap();
        let regs = engine.list_registrations(5).await.unwrap();
        let promoted = regs.iter().find(|r| r.id == second.id).unwrap();
        assert_eq!(promoted.status, RegistrationStatus::Confirmed);
        assert_eq!(promoted.waitlist_position, None);
    }
}
