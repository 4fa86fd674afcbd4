//! Seed assignment for bracket placement.

use crate::{
    error::{CoreError, CoreResult},
    participant::{Competitor, Participant, ParticipantId},
};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// How seeds are assigned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SeedingMode {
    /// Seed = 1-based position in the input list
    SlotOrder,
    /// Uniform shuffle, then increasing seeds
    Random,
    /// Caller-supplied seed for every participant
    Manual { seeds: BTreeMap<ParticipantId, u32> },
}

/// Participant with its assigned seed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeededParticipant {
    pub participant: Participant,
    pub seed: u32,
}

impl SeededParticipant {
    pub fn id(&self) -> ParticipantId {
        self.participant.id()
    }
}

/// Shuffles entrants for random seeding
pub struct SeedRandomizer {
    rng: rand::rngs::ThreadRng,
}

impl SeedRandomizer {
    pub fn new() -> Self {
        Self { rng: rand::rng() }
    }

    /// Return the entrants in a uniformly random order
    pub fn shuffle(&mut self, participants: &[Participant]) -> Vec<Participant> {
        let mut order = participants.to_vec();
        order.shuffle(&mut self.rng);
        order
    }
}

impl Default for SeedRandomizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Assign seeds to `participants` under `mode`.
///
/// The output is ordered by seed. Manual seeding fails closed: any duplicate,
/// missing or out-of-range seed rejects the whole list.
///
/// # Errors
///
/// * `CoreError::Validation` - duplicate participants or an invalid manual seed set
pub fn apply_seeding(
    participants: &[Participant],
    mode: &SeedingMode,
) -> CoreResult<Vec<SeededParticipant>> {
    let mut seen = HashSet::with_capacity(participants.len());
    for p in participants {
        if !seen.insert(p.id()) {
            return Err(CoreError::validation(format!(
                "participant {} listed more than once",
                p.id()
            )));
        }
    }

    let seeded = match mode {
        SeedingMode::SlotOrder => number_in_order(participants.to_vec()),
        SeedingMode::Random => number_in_order(SeedRandomizer::new().shuffle(participants)),
        SeedingMode::Manual { seeds } => manual_seeds(participants, seeds)?,
    };

    Ok(seeded)
}

fn number_in_order(order: Vec<Participant>) -> Vec<SeededParticipant> {
    order
        .into_iter()
        .zip(1u32..)
        .map(|(participant, seed)| SeededParticipant { participant, seed })
        .collect()
}

fn manual_seeds(
    participants: &[Participant],
    seeds: &BTreeMap<ParticipantId, u32>,
) -> CoreResult<Vec<SeededParticipant>> {
    let n = participants.len() as u32;

    if seeds.len() != participants.len() {
        return Err(CoreError::validation(format!(
            "expected {} manual seeds, got {}",
            participants.len(),
            seeds.len()
        )));
    }

    let mut used = HashSet::with_capacity(participants.len());
    let mut seeded = Vec::with_capacity(participants.len());

    for participant in participants {
        let seed = *seeds.get(&participant.id()).ok_or_else(|| {
            CoreError::validation(format!("no seed given for participant {}", participant.id()))
        })?;

        if seed == 0 || seed > n {
            return Err(CoreError::validation(format!(
                "seed {seed} out of range 1..={n}"
            )));
        }

        if !used.insert(seed) {
            return Err(CoreError::validation(format!("seed {seed} assigned twice")));
        }

        seeded.push(SeededParticipant {
            participant: participant.clone(),
            seed,
        });
    }

    seeded.sort_by_key(|s| s.seed);
    Ok(seeded)
}
