//! Tournament registration and entry-fee payments.

use super::{AppState, error::ApiResult};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use bracketeer::{
    ParticipantId, Payment, Registration, RegistrationId, TournamentId, TournamentPolicy,
    TournamentStore,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct PolicyRequest {
    pub capacity: u32,
    #[serde(default)]
    pub entry_fee: i64,
    #[serde(default)]
    pub payment_deadline_hours: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub participant_id: ParticipantId,
}

/// Create or replace the tournament's registration rules.
pub async fn set_policy<S: TournamentStore>(
    State(state): State<AppState<S>>,
    Path(tournament_id): Path<TournamentId>,
    Json(req): Json<PolicyRequest>,
) -> ApiResult<Json<TournamentPolicy>> {
    let policy = state
        .engine
        .set_policy(TournamentPolicy {
            tournament_id,
            capacity: req.capacity,
            entry_fee: req.entry_fee,
            payment_deadline_hours: req.payment_deadline_hours,
        })
        .await?;
    Ok(Json(policy))
}

/// Register a participant; joins the waitlist when the tournament is full.
///
/// # Errors
///
/// - `404 Not Found`: the tournament has no registration policy
/// - `409 Conflict`: the participant already holds an active registration
pub async fn register<S: TournamentStore>(
    State(state): State<AppState<S>>,
    Path(tournament_id): Path<TournamentId>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<Registration>)> {
    let registration = state
        .engine
        .register(tournament_id, req.participant_id)
        .await?;
    Ok((StatusCode::CREATED, Json(registration)))
}

/// Withdraw a registration; a vacated slot goes to the waitlist.
pub async fn withdraw<S: TournamentStore>(
    State(state): State<AppState<S>>,
    Path(registration_id): Path<RegistrationId>,
) -> ApiResult<Json<Registration>> {
    let registration = state.engine.withdraw(registration_id).await?;
    Ok(Json(registration))
}

/// Record an entry-fee payment awaiting staff verification.
pub async fn submit_payment<S: TournamentStore>(
    State(state): State<AppState<S>>,
    Path(registration_id): Path<RegistrationId>,
) -> ApiResult<(StatusCode, Json<Payment>)> {
    let payment = state.engine.submit_payment(registration_id).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}
