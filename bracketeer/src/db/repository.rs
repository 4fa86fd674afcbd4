//! Repository trait definitions for testability and dependency injection.
//!
//! Mutations go through closures that run on an aggregate loaded under an
//! exclusive lock (`update_bracket`, `update_registrations`). A store only
//! writes when the closure succeeds, so a failed validation never leaves a
//! partial write behind.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    bracket::{BracketId, BracketTree, MatchId},
    dispute::DisputeResolution,
    error::CoreResult,
    lifecycle::SubmissionId,
    notify::TournamentEvent,
    participant::TournamentId,
    registration::{
        PaymentId, Registration, RegistrationBook, RegistrationId, TournamentPolicy,
    },
    seeding::SeededParticipant,
};

/// Value produced by a committed bracket unit of work, plus the events to publish
pub type Committed<T> = (T, Vec<TournamentEvent>);

/// Trait for participant lookups
#[async_trait]
pub trait ParticipantRepository: Send + Sync {
    /// Seeded entrants of the tournament's current bracket
    async fn list_participants(
        &self,
        tournament_id: TournamentId,
    ) -> CoreResult<Vec<SeededParticipant>>;
}

/// Trait for bracket, match and submission operations
#[async_trait]
pub trait MatchRepository: Send + Sync {
    /// Load the tournament's bracket without locking it
    async fn load_bracket(&self, tournament_id: TournamentId) -> CoreResult<Option<BracketTree>>;

    async fn bracket_for_tournament(&self, tournament_id: TournamentId) -> CoreResult<BracketId>;

    async fn bracket_for_match(&self, match_id: MatchId) -> CoreResult<BracketId>;

    async fn bracket_for_submission(&self, submission_id: SubmissionId) -> CoreResult<BracketId>;

    /// PENDING submissions whose confirmation window ended before `now`
    async fn overdue_submissions(
        &self,
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<(BracketId, SubmissionId)>>;

    /// Audit trail of a submission, oldest first
    async fn list_resolutions(
        &self,
        submission_id: SubmissionId,
    ) -> CoreResult<Vec<DisputeResolution>>;

    /// Replace the tournament's bracket with the one `build` returns.
    ///
    /// `build` sees the current bracket, if any, while the tournament is locked.
    async fn replace_bracket<F>(
        &self,
        tournament_id: TournamentId,
        build: F,
    ) -> CoreResult<Committed<BracketTree>>
    where
        F: FnOnce(Option<&BracketTree>) -> CoreResult<BracketTree> + Send;

    /// Run `apply` on the locked bracket and persist what it changed
    async fn update_bracket<F, T>(&self, bracket_id: BracketId, apply: F) -> CoreResult<Committed<T>>
    where
        F: FnOnce(&mut BracketTree) -> CoreResult<T> + Send,
        T: Send;
}

/// Trait for registration and payment operations
#[async_trait]
pub trait RegistrationRepository: Send + Sync {
    async fn upsert_policy(&self, policy: &TournamentPolicy) -> CoreResult<()>;

    async fn get_policy(&self, tournament_id: TournamentId) -> CoreResult<TournamentPolicy>;

    /// Policies with a positive payment deadline
    async fn policies_with_deadline(&self) -> CoreResult<Vec<TournamentPolicy>>;

    async fn tournament_for_registration(
        &self,
        registration_id: RegistrationId,
    ) -> CoreResult<TournamentId>;

    async fn tournament_for_payment(&self, payment_id: PaymentId) -> CoreResult<TournamentId>;

    /// SUBMITTED payments of the tournament submitted before `cutoff`
    async fn expired_payments(
        &self,
        tournament_id: TournamentId,
        cutoff: DateTime<Utc>,
    ) -> CoreResult<Vec<PaymentId>>;

    async fn list_registrations(&self, tournament_id: TournamentId)
    -> CoreResult<Vec<Registration>>;

    /// Run `apply` on the locked registration book and persist what it changed
    async fn update_registrations<F, T>(&self, tournament_id: TournamentId, apply: F) -> CoreResult<T>
    where
        F: FnOnce(&mut RegistrationBook) -> CoreResult<T> + Send,
        T: Send;
}

/// Everything the engine needs from storage
pub trait TournamentStore:
    ParticipantRepository + MatchRepository + RegistrationRepository + 'static
{
}

impl<S> TournamentStore for S where
    S: ParticipantRepository + MatchRepository + RegistrationRepository + 'static
{
}
