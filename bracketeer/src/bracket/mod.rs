//! Single-elimination brackets: geometry, construction, the match tree and
//! winner progression.

pub mod builder;
pub mod geometry;
pub mod models;
pub mod progression;
pub mod tree;

pub use builder::{build_bracket, check_regeneration};
pub use geometry::{
    BracketGeometry, MAX_BRACKET_SIZE, MIN_PARTICIPANTS, bracket_size, byes, round_name,
    seed_order, total_matches, total_rounds,
};
pub use models::{Bracket, BracketFormat, BracketId, Match, MatchId, MatchStatus};
pub use progression::Settlement;
pub use tree::{BracketTree, TreeChanges};
