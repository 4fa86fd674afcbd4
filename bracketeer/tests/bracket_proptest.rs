/// Property-based tests for bracket geometry and seeding using proptest
///
/// These tests check the size/bye/match arithmetic and the seeding rules
/// across randomly generated field sizes and seed assignments.
use bracketeer::{
    Participant, SeedingMode, apply_seeding,
    bracket::{
        MAX_BRACKET_SIZE, MatchStatus, bracket_size, build_bracket, byes, seed_order,
        total_matches, total_rounds,
    },
};
use chrono::Utc;
use proptest::prelude::*;
use std::collections::{BTreeMap, HashSet};

fn field(n: usize) -> Vec<Participant> {
    (1..=n as i64)
        .map(|i| Participant::solo(i, format!("p{i}")))
        .collect()
}

// Strategy for a field size and a permutation of seeds 1..=n
fn manual_seeds_strategy() -> impl Strategy<Value = (usize, Vec<u32>)> {
    (2usize..=64).prop_flat_map(|n| {
        let seeds: Vec<u32> = (1..=n as u32).collect();
        (Just(n), Just(seeds).prop_shuffle())
    })
}

proptest! {
    #[test]
    fn test_geometry_arithmetic(n in 2usize..=MAX_BRACKET_SIZE) {
        let size = bracket_size(n);

        prop_assert!(size.is_power_of_two());
        prop_assert!(size >= n);
        prop_assert!(size / 2 < n, "bracket is not the smallest power of two");
        prop_assert_eq!(byes(n), size - n);
        prop_assert_eq!(total_matches(n), size - 1);
        prop_assert_eq!(1usize << total_rounds(n), size);
    }

    #[test]
    fn test_seed_order_is_permutation(exp in 1u32..=10) {
        let size = 1usize << exp;
        let order = seed_order(size);

        prop_assert_eq!(order.len(), size);
        let unique: HashSet<u32> = order.iter().copied().collect();
        prop_assert_eq!(unique.len(), size);

        // Every first-round pair sums to size + 1.
        for pair in order.chunks(2) {
            prop_assert_eq!(pair[0] + pair[1], size as u32 + 1);
        }
    }

    #[test]
    fn test_slot_order_is_idempotent(n in 2usize..=64) {
        let once = apply_seeding(&field(n), &SeedingMode::SlotOrder).unwrap();
        let reordered: Vec<Participant> = once.iter().map(|s| s.participant.clone()).collect();
        let twice = apply_seeding(&reordered, &SeedingMode::SlotOrder).unwrap();

        prop_assert_eq!(once, twice);
    }

    #[test]
    fn test_manual_permutation_accepted((n, seeds) in manual_seeds_strategy()) {
        let map: BTreeMap<i64, u32> = (1..=n as i64).zip(seeds.iter().copied()).collect();
        let seeded = apply_seeding(&field(n), &SeedingMode::Manual { seeds: map }).unwrap();

        let got: Vec<u32> = seeded.iter().map(|s| s.seed).collect();
        prop_assert_eq!(got, (1..=n as u32).collect::<Vec<_>>());
    }

    #[test]
    fn test_manual_duplicate_rejected((n, seeds) in manual_seeds_strategy(), dup in 0usize..64) {
        let mut seeds = seeds;
        let i = dup % n;
        let j = (i + 1) % n;
        seeds[j] = seeds[i];
        let map: BTreeMap<i64, u32> = (1..=n as i64).zip(seeds).collect();

        let mode = SeedingMode::Manual { seeds: map };
        let result = apply_seeding(&field(n), &mode);
        prop_assert!(result.is_err());
    }

    #[test]
    fn test_first_round_byes_match_geometry(n in 2usize..=128) {
        let seeded = apply_seeding(&field(n), &SeedingMode::SlotOrder).unwrap();
        let tree = build_bracket(1, &seeded, Utc::now()).unwrap();

        let round1 = tree.round(1);
        prop_assert_eq!(round1.len(), bracket_size(n) / 2);
        prop_assert_eq!(round1.iter().filter(|m| m.is_bye).count(), byes(n));
        prop_assert_eq!(tree.matches().len(), total_matches(n));
        prop_assert!(tree.check_consistency().is_ok());

        // Nobody is waiting on a match that can never be filled.
        for m in tree.matches() {
            if m.status == MatchStatus::Ready {
                prop_assert_eq!(m.filled_slots(), 2);
            }
        }
    }
}
