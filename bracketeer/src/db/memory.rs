//! In-memory store for tests and local runs.
//!
//! One async mutex per aggregate family stands in for row locks: a unit of
//! work holds it for its whole duration, mutates a copy and writes the copy
//! back only when the closure succeeds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::repository::{
    Committed, MatchRepository, ParticipantRepository, RegistrationRepository,
};
use crate::{
    bracket::{BracketId, BracketTree, MatchId},
    dispute::DisputeResolution,
    error::{CoreError, CoreResult},
    lifecycle::SubmissionId,
    participant::TournamentId,
    registration::{
        Payment, PaymentId, PaymentStatus, Registration, RegistrationBook, RegistrationId,
        TournamentPolicy,
    },
    seeding::SeededParticipant,
};

#[derive(Default)]
struct BracketState {
    trees: HashMap<BracketId, BracketTree>,
    by_tournament: HashMap<TournamentId, BracketId>,
    resolutions: Vec<DisputeResolution>,
}

impl BracketState {
    fn tree(&self, bracket_id: BracketId) -> CoreResult<&BracketTree> {
        self.trees
            .get(&bracket_id)
            .ok_or_else(|| CoreError::not_found("bracket", bracket_id))
    }
}

#[derive(Default)]
struct RegistrationState {
    policies: HashMap<TournamentId, TournamentPolicy>,
    registrations: HashMap<TournamentId, Vec<Registration>>,
    payments: HashMap<TournamentId, Vec<Payment>>,
}

/// Store backed by process memory
#[derive(Default)]
pub struct MemoryStore {
    brackets: Mutex<BracketState>,
    registrations: Mutex<RegistrationState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ParticipantRepository for MemoryStore {
    async fn list_participants(
        &self,
        tournament_id: TournamentId,
    ) -> CoreResult<Vec<SeededParticipant>> {
        let state = self.brackets.lock().await;
        Ok(state
            .by_tournament
            .get(&tournament_id)
            .and_then(|id| state.trees.get(id))
            .map(|tree| tree.entrants().to_vec())
            .unwrap_or_default())
    }
}

#[async_trait]
impl MatchRepository for MemoryStore {
    async fn load_bracket(&self, tournament_id: TournamentId) -> CoreResult<Option<BracketTree>> {
        let state = self.brackets.lock().await;
        Ok(state
            .by_tournament
            .get(&tournament_id)
            .and_then(|id| state.trees.get(id))
            .cloned())
    }

    async fn bracket_for_tournament(&self, tournament_id: TournamentId) -> CoreResult<BracketId> {
        let state = self.brackets.lock().await;
        state
            .by_tournament
            .get(&tournament_id)
            .copied()
            .ok_or_else(|| CoreError::not_found("bracket", format!("tournament {tournament_id}")))
    }

    async fn bracket_for_match(&self, match_id: MatchId) -> CoreResult<BracketId> {
        let state = self.brackets.lock().await;
        state
            .trees
            .values()
            .find(|tree| tree.match_by_id(match_id).is_some())
            .map(|tree| tree.id())
            .ok_or_else(|| CoreError::not_found("match", match_id))
    }

    async fn bracket_for_submission(&self, submission_id: SubmissionId) -> CoreResult<BracketId> {
        let state = self.brackets.lock().await;
        state
            .trees
            .values()
            .find(|tree| tree.submission(submission_id).is_ok())
            .map(|tree| tree.id())
            .ok_or_else(|| CoreError::not_found("submission", submission_id))
    }

    async fn overdue_submissions(
        &self,
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<(BracketId, SubmissionId)>> {
        let state = self.brackets.lock().await;
        Ok(state
            .trees
            .values()
            .flat_map(|tree| {
                tree.overdue_submissions(now)
                    .into_iter()
                    .map(move |s| (tree.id(), s))
            })
            .collect())
    }

    async fn list_resolutions(
        &self,
        submission_id: SubmissionId,
    ) -> CoreResult<Vec<DisputeResolution>> {
        let state = self.brackets.lock().await;
        Ok(state
            .resolutions
            .iter()
            .filter(|r| r.submission_id == submission_id)
            .cloned()
            .collect())
    }

    async fn replace_bracket<F>(
        &self,
        tournament_id: TournamentId,
        build: F,
    ) -> CoreResult<Committed<BracketTree>>
    where
        F: FnOnce(Option<&BracketTree>) -> CoreResult<BracketTree> + Send,
    {
        let mut state = self.brackets.lock().await;

        let existing_id = state.by_tournament.get(&tournament_id).copied();
        let existing = existing_id.and_then(|id| state.trees.get(&id));
        let mut tree = build(existing)?;

        if let Some(old) = existing_id {
            state.trees.remove(&old);
            state.resolutions.retain(|r| r.bracket_id != old);
        }

        let events = tree.take_changes().events;
        state.by_tournament.insert(tournament_id, tree.id());
        state.trees.insert(tree.id(), tree.clone());
        Ok((tree, events))
    }

    async fn update_bracket<F, T>(&self, bracket_id: BracketId, apply: F) -> CoreResult<Committed<T>>
    where
        F: FnOnce(&mut BracketTree) -> CoreResult<T> + Send,
        T: Send,
    {
        let mut state = self.brackets.lock().await;

        let mut tree = state.tree(bracket_id)?.clone();
        let value = apply(&mut tree)?;
        let changes = tree.take_changes();

        state.resolutions.extend(changes.resolutions);
        state.trees.insert(bracket_id, tree);
        Ok((value, changes.events))
    }
}

#[async_trait]
impl RegistrationRepository for MemoryStore {
    async fn upsert_policy(&self, policy: &TournamentPolicy) -> CoreResult<()> {
        let mut state = self.registrations.lock().await;
        state.policies.insert(policy.tournament_id, policy.clone());
        Ok(())
    }

    async fn get_policy(&self, tournament_id: TournamentId) -> CoreResult<TournamentPolicy> {
        let state = self.registrations.lock().await;
        state
            .policies
            .get(&tournament_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("tournament", tournament_id))
    }

    async fn policies_with_deadline(&self) -> CoreResult<Vec<TournamentPolicy>> {
        let state = self.registrations.lock().await;
        let mut policies: Vec<TournamentPolicy> = state
            .policies
            .values()
            .filter(|p| p.payment_deadline().is_some())
            .cloned()
            .collect();
        policies.sort_by_key(|p| p.tournament_id);
        Ok(policies)
    }

    async fn tournament_for_registration(
        &self,
        registration_id: RegistrationId,
    ) -> CoreResult<TournamentId> {
        let state = self.registrations.lock().await;
        state
            .registrations
            .iter()
            .find(|(_, regs)| regs.iter().any(|r| r.id == registration_id))
            .map(|(tournament_id, _)| *tournament_id)
            .ok_or_else(|| CoreError::not_found("registration", registration_id))
    }

    async fn tournament_for_payment(&self, payment_id: PaymentId) -> CoreResult<TournamentId> {
        let state = self.registrations.lock().await;
        state
            .payments
            .iter()
            .find(|(_, payments)| payments.iter().any(|p| p.id == payment_id))
            .map(|(tournament_id, _)| *tournament_id)
            .ok_or_else(|| CoreError::not_found("payment", payment_id))
    }

    async fn expired_payments(
        &self,
        tournament_id: TournamentId,
        cutoff: DateTime<Utc>,
    ) -> CoreResult<Vec<PaymentId>> {
        let state = self.registrations.lock().await;
        Ok(state
            .payments
            .get(&tournament_id)
            .map(|payments| {
                payments
                    .iter()
                    .filter(|p| p.status == PaymentStatus::Submitted && p.submitted_at < cutoff)
                    .map(|p| p.id)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list_registrations(
        &self,
        tournament_id: TournamentId,
    ) -> CoreResult<Vec<Registration>> {
        let state = self.registrations.lock().await;
        let mut regs = state
            .registrations
            .get(&tournament_id)
            .cloned()
            .unwrap_or_default();
        regs.sort_by_key(|r| r.created_at);
        Ok(regs)
    }

    async fn update_registrations<F, T>(&self, tournament_id: TournamentId, apply: F) -> CoreResult<T>
    where
        F: FnOnce(&mut RegistrationBook) -> CoreResult<T> + Send,
        T: Send,
    {
        let mut state = self.registrations.lock().await;

        let policy = state
            .policies
            .get(&tournament_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("tournament", tournament_id))?;
        let registrations = state
            .registrations
            .get(&tournament_id)
            .cloned()
            .unwrap_or_default();
        let payments = state.payments.get(&tournament_id).cloned().unwrap_or_default();

        let mut book = RegistrationBook::from_parts(policy, registrations, payments);
        let value = apply(&mut book)?;

        if !book.take_changes().is_empty() {
            state
                .registrations
                .insert(tournament_id, book.registrations().to_vec());
            state.payments.insert(tournament_id, book.payments().to_vec());
        }
        Ok(value)
    }
}
