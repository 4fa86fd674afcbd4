//! Bracket materialization from seeded entrants.

use super::{
    geometry::{BracketGeometry, seed_order},
    models::{Bracket, BracketFormat, Match},
    tree::BracketTree,
};
use crate::{
    error::{CoreError, CoreResult},
    participant::{ParticipantId, TournamentId},
    seeding::SeededParticipant,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

/// Build a complete single-elimination tree for `seeded`.
///
/// Every match node of every round is created up front. Seeds are placed in
/// the standard order, missing seeds become byes, and byes are resolved
/// through the rounds before the tree is returned.
///
/// # Errors
///
/// * `CoreError::Validation` - too few or too many entrants, or seeds that
///   are not exactly `1..=n`
pub fn build_bracket(
    tournament_id: TournamentId,
    seeded: &[SeededParticipant],
    now: DateTime<Utc>,
) -> CoreResult<BracketTree> {
    let geometry = BracketGeometry::for_participants(seeded.len())?;

    let mut by_seed: HashMap<u32, ParticipantId> = HashMap::with_capacity(seeded.len());
    for entrant in seeded {
        if entrant.seed == 0 || entrant.seed as usize > seeded.len() {
            return Err(CoreError::validation(format!(
                "seed {} of participant {} is out of range",
                entrant.seed,
                entrant.id()
            )));
        }
        if by_seed.insert(entrant.seed, entrant.id()).is_some() {
            return Err(CoreError::validation(format!(
                "seed {} assigned twice",
                entrant.seed
            )));
        }
    }

    let bracket = Bracket {
        id: Uuid::new_v4(),
        tournament_id,
        format: BracketFormat::SingleElimination,
        total_rounds: geometry.total_rounds,
        total_matches: geometry.total_matches as u32,
        participant_count: geometry.participant_count as u32,
        is_locked: false,
        created_at: now,
    };

    let mut matches = Vec::with_capacity(geometry.total_matches);
    for round in 1..=geometry.total_rounds {
        for position in 0..geometry.matches_in_round(round) {
            matches.push(Match::new(bracket.id, round, position as u32));
        }
    }

    let slots: Vec<Option<ParticipantId>> = seed_order(geometry.bracket_size)
        .into_iter()
        .map(|seed| by_seed.get(&seed).copied())
        .collect();

    log::info!(
        "Building bracket {} for tournament {}: {} entrants, size {}, {} byes, {} rounds",
        bracket.id,
        tournament_id,
        geometry.participant_count,
        geometry.bracket_size,
        geometry.byes,
        geometry.total_rounds
    );

    let mut tree = BracketTree::from_parts(bracket, seeded.to_vec(), matches, Vec::new())?;
    tree.changes.bracket = true;
    tree.changes.entrants = true;
    tree.relayout(slots, now)?;
    Ok(tree)
}

/// Decide whether a new bracket may replace `existing`.
///
/// # Errors
///
/// * `CoreError::Permission` - the existing bracket is locked
/// * `CoreError::Conflict` - a bracket exists and `force` is not set
pub fn check_regeneration(existing: Option<&BracketTree>, force: bool) -> CoreResult<()> {
    let Some(existing) = existing else {
        return Ok(());
    };

    existing.ensure_unlocked()?;

    if !force {
        return Err(CoreError::conflict(format!(
            "tournament {} already has bracket {}",
            existing.bracket().tournament_id,
            existing.id()
        )));
    }

    log::warn!(
        "Forcing regeneration of bracket {} for tournament {}",
        existing.id(),
        existing.bracket().tournament_id
    );
    Ok(())
}
