//! Match results, confirmations, disputes and staff resolutions.
//!
//! Submit a result:
//! ```bash
//! curl -X POST http://localhost:6969/api/v1/matches/<match_id>/results \
//!   -H "Content-Type: application/json" \
//!   -d '{"submitter_id": 1, "payload": {"scores": {"1": 16, "8": 12}}}'
//! ```

use super::{AppState, error::ApiResult};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use bracketeer::{
    Match, MatchId, ParticipantId, ResolutionRequest, ResultPayload, ResultSubmission,
    SubmissionId, TournamentStore,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct SubmitResultRequest {
    pub submitter_id: ParticipantId,
    pub payload: ResultPayload,
    #[serde(default)]
    pub proof_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub responder_id: ParticipantId,
}

#[derive(Debug, Deserialize)]
pub struct DisputeRequest {
    pub responder_id: ParticipantId,
    #[serde(default)]
    pub counter_payload: Option<ResultPayload>,
    pub reason: String,
}

/// Report a result for a LIVE match; the opponent has 24h to respond.
pub async fn submit_result<S: TournamentStore>(
    State(state): State<AppState<S>>,
    Path(match_id): Path<MatchId>,
    Json(req): Json<SubmitResultRequest>,
) -> ApiResult<(StatusCode, Json<ResultSubmission>)> {
    let submission = state
        .engine
        .submit_result(match_id, req.submitter_id, req.payload, req.proof_ref)
        .await?;
    Ok((StatusCode::CREATED, Json(submission)))
}

/// Opponent accepts the reported result.
pub async fn confirm_result<S: TournamentStore>(
    State(state): State<AppState<S>>,
    Path(submission_id): Path<SubmissionId>,
    Json(req): Json<ConfirmRequest>,
) -> ApiResult<Json<ResultSubmission>> {
    let submission = state
        .engine
        .confirm_result(submission_id, req.responder_id)
        .await?;
    Ok(Json(submission))
}

/// Opponent contests the reported result.
pub async fn dispute_result<S: TournamentStore>(
    State(state): State<AppState<S>>,
    Path(submission_id): Path<SubmissionId>,
    Json(req): Json<DisputeRequest>,
) -> ApiResult<Json<ResultSubmission>> {
    let submission = state
        .engine
        .dispute_result(submission_id, req.responder_id, req.counter_payload, req.reason)
        .await?;
    Ok(Json(submission))
}

/// Staff settles a disputed submission.
///
/// # Errors
///
/// - `400 Bad Request`: `custom_result` without a payload, or a payload that
///   does not fit the match
/// - `409 Conflict`: the submission is not under dispute
pub async fn resolve_dispute<S: TournamentStore>(
    State(state): State<AppState<S>>,
    Path(submission_id): Path<SubmissionId>,
    Json(req): Json<ResolutionRequest>,
) -> ApiResult<Json<Match>> {
    let resolved = state.engine.resolve_dispute(submission_id, req).await?;
    Ok(Json(resolved))
}
