//! Bracket geometry: size, byes, rounds, round names and seeded slot order.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// Smallest supported field
pub const MIN_PARTICIPANTS: usize = 2;

/// Largest supported bracket (10 rounds)
pub const MAX_BRACKET_SIZE: usize = 1024;

/// Derived shape of a single-elimination bracket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketGeometry {
    pub participant_count: usize,
    pub bracket_size: usize,
    pub byes: usize,
    pub total_rounds: u32,
    pub total_matches: usize,
}

impl BracketGeometry {
    /// Compute the geometry for `participant_count` entrants
    ///
    /// # Errors
    ///
    /// * `CoreError::Validation` - fewer than two entrants or more than the largest bracket
    pub fn for_participants(participant_count: usize) -> CoreResult<Self> {
        if participant_count < MIN_PARTICIPANTS {
            return Err(CoreError::validation(format!(
                "need at least {MIN_PARTICIPANTS} participants, got {participant_count}"
            )));
        }

        if participant_count > MAX_BRACKET_SIZE {
            return Err(CoreError::validation(format!(
                "at most {MAX_BRACKET_SIZE} participants are supported, got {participant_count}"
            )));
        }

        let size = bracket_size(participant_count);
        Ok(Self {
            participant_count,
            bracket_size: size,
            byes: size - participant_count,
            total_rounds: total_rounds(participant_count),
            total_matches: size - 1,
        })
    }

    /// Number of matches played in `round` (1-indexed)
    pub fn matches_in_round(&self, round: u32) -> usize {
        self.bracket_size >> round
    }

    pub fn round_name(&self, round: u32) -> String {
        round_name(round, self.matches_in_round(round))
    }
}

/// Smallest power of two >= `n`
pub fn bracket_size(n: usize) -> usize {
    n.max(1).next_power_of_two()
}

/// ceil(log2(n))
pub fn total_rounds(n: usize) -> u32 {
    bracket_size(n).trailing_zeros()
}

/// Byes needed to fill the bracket
pub fn byes(n: usize) -> usize {
    bracket_size(n) - n
}

/// Matches in a full single-elimination bracket
pub fn total_matches(n: usize) -> usize {
    bracket_size(n) - 1
}

/// Display name for a round, derived from how many matches it holds
pub fn round_name(round: u32, matches_in_round: usize) -> String {
    match matches_in_round {
        1 => "Final".to_string(),
        2 => "Semifinal".to_string(),
        4 => "Quarterfinal".to_string(),
        _ => format!("Round {round}"),
    }
}

/// Standard seeded slot order for a bracket of `size` slots.
///
/// Adjacent pairs are first-round matches: seed 1 meets seed `size`, seed 2
/// meets seed `size - 1`, and the top two seeds sit in opposite halves so they
/// can only meet in the final.
pub fn seed_order(size: usize) -> Vec<u32> {
    let mut order = vec![1u32];
    while order.len() < size {
        let mirror = (order.len() * 2 + 1) as u32;
        order = order.iter().flat_map(|&s| [s, mirror - s]).collect();
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_five_players() {
        let g = BracketGeometry::for_participants(5).unwrap();
        assert_eq!(g.bracket_size, 8);
        assert_eq!(g.byes, 3);
        assert_eq!(g.total_rounds, 3);
        assert_eq!(g.total_matches, 7);
        assert_eq!(g.matches_in_round(1), 4);
        assert_eq!(g.round_name(1), "Quarterfinal");
        assert_eq!(g.round_name(2), "Semifinal");
        assert_eq!(g.round_name(3), "Final");
    }

    #[test]
    fn test_geometry_exact_power_of_two() {
        let g = BracketGeometry::for_participants(16).unwrap();
        assert_eq!(g.bracket_size, 16);
        assert_eq!(g.byes, 0);
        assert_eq!(g.total_rounds, 4);
        assert_eq!(g.round_name(1), "Round 1");
    }

    #[test]
    fn test_geometry_two_players_is_a_final() {
        let g = BracketGeometry::for_participants(2).unwrap();
        assert_eq!(g.total_rounds, 1);
        assert_eq!(g.total_matches, 1);
        assert_eq!(g.round_name(1), "Final");
    }

    #[test]
    fn test_geometry_rejects_small_and_huge_fields() {
        assert!(matches!(
            BracketGeometry::for_participants(1),
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            BracketGeometry::for_participants(MAX_BRACKET_SIZE + 1),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_seed_order() {
        assert_eq!(seed_order(2), vec![1, 2]);
        assert_eq!(seed_order(4), vec![1, 4, 2, 3]);
        assert_eq!(seed_order(8), vec![1, 8, 4, 5, 2, 7, 3, 6]);
    }

    #[test]
    fn test_seed_order_pairs_sum_to_size_plus_one() {
        for size in [2usize, 4, 8, 16, 32, 64] {
            let order = seed_order(size);
            for pair in order.chunks(2) {
                assert_eq!((pair[0] + pair[1]) as usize, size + 1);
            }
        }
    }
}
