//! Bracket generation and inspection.
//!
//! Generate a bracket:
//! ```bash
//! curl -X POST http://localhost:6969/api/v1/tournaments/1/bracket \
//!   -H "Content-Type: application/json" \
//!   -d '{"participants": [{"kind": "solo", "id": 1, "username": "wren"}, ...],
//!        "seeding": {"mode": "slot_order"}}'
//! ```

use super::{AppState, error::ApiResult};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use bracketeer::{
    Bracket, BracketTree, Match, Participant, ParticipantId, SeededParticipant, SeedingMode,
    TournamentId, TournamentStore,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct GenerateBracketRequest {
    pub participants: Vec<Participant>,
    #[serde(default = "default_seeding")]
    pub seeding: SeedingMode,
    /// Replace an existing, unlocked bracket
    #[serde(default)]
    pub force: bool,
}

fn default_seeding() -> SeedingMode {
    SeedingMode::SlotOrder
}

/// Full bracket as returned to clients
#[derive(Debug, Serialize, Deserialize)]
pub struct BracketResponse {
    pub bracket: Bracket,
    pub bracket_size: u32,
    pub entrants: Vec<SeededParticipant>,
    pub matches: Vec<Match>,
    pub champion: Option<ParticipantId>,
}

impl From<BracketTree> for BracketResponse {
    fn from(tree: BracketTree) -> Self {
        BracketResponse {
            bracket: tree.bracket().clone(),
            bracket_size: tree.bracket_size(),
            entrants: tree.entrants().to_vec(),
            matches: tree.matches().to_vec(),
            champion: tree.champion(),
        }
    }
}

/// Seed the participants and build the tournament's bracket.
///
/// # Errors
///
/// - `400 Bad Request`: bad seeding or fewer than two participants
/// - `403 Forbidden`: forced regeneration of a locked bracket
/// - `409 Conflict`: a bracket exists and `force` is not set
pub async fn generate_bracket<S: TournamentStore>(
    State(state): State<AppState<S>>,
    Path(tournament_id): Path<TournamentId>,
    Json(req): Json<GenerateBracketRequest>,
) -> ApiResult<(StatusCode, Json<BracketResponse>)> {
    let tree = state
        .engine
        .generate_bracket(tournament_id, &req.participants, &req.seeding, req.force)
        .await?;
    Ok((StatusCode::CREATED, Json(tree.into())))
}

/// Current bracket of a tournament.
///
/// # Errors
///
/// - `404 Not Found`: no bracket has been generated
pub async fn get_bracket<S: TournamentStore>(
    State(state): State<AppState<S>>,
    Path(tournament_id): Path<TournamentId>,
) -> ApiResult<Json<BracketResponse>> {
    let tree = state.engine.get_bracket(tournament_id).await?;
    Ok(Json(tree.into()))
}
