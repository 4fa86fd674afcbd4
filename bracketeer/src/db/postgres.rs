//! PostgreSQL store.
//!
//! Bracket units of work lock the bracket row with `SELECT ... FOR UPDATE`,
//! load the whole tree inside the transaction and write back only the rows
//! the domain marked as changed. Registration units of work lock every
//! registration and payment row of the tournament the same way.
#![allow(clippy::needless_raw_string_hashes)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use super::repository::{
    Committed, MatchRepository, ParticipantRepository, RegistrationRepository,
};
use crate::{
    bracket::{Bracket, BracketFormat, BracketId, BracketTree, Match, MatchId, MatchStatus},
    dispute::{DisputeResolution, ResolutionType},
    error::{CoreError, CoreResult},
    lifecycle::{ResultPayload, ResultSubmission, SubmissionId, SubmissionStatus},
    participant::{Competitor, Participant, TournamentId},
    registration::{
        Payment, PaymentId, PaymentStatus, Registration, RegistrationBook, RegistrationId,
        RegistrationStatus, TournamentPolicy,
    },
    seeding::SeededParticipant,
};

/// Schema applied by [`PgStore::apply_schema`]
pub const SCHEMA: &str = include_str!("../../migrations/001_tournament_core.sql");

/// Store backed by PostgreSQL
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables, indexes and triggers if they do not exist yet
    pub async fn apply_schema(&self) -> CoreResult<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        log::info!("Database schema applied");
        Ok(())
    }
}

/// Map unique-constraint violations onto `Conflict`
fn map_unique(err: sqlx::Error, what: impl FnOnce() -> String) -> CoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => CoreError::conflict(what()),
        _ => CoreError::Database(err),
    }
}

fn to_u32(value: i32, column: &str) -> CoreResult<u32> {
    u32::try_from(value).map_err(|_| CoreError::Corrupt(format!("{column} = {value}")))
}

fn opt_u32(value: Option<i32>, column: &str) -> CoreResult<Option<u32>> {
    value.map(|v| to_u32(v, column)).transpose()
}

fn to_i32(value: u32, column: &str) -> CoreResult<i32> {
    i32::try_from(value).map_err(|_| CoreError::Corrupt(format!("{column} = {value} exceeds INTEGER")))
}

fn opt_i32(value: Option<u32>, column: &str) -> CoreResult<Option<i32>> {
    value.map(|v| to_i32(v, column)).transpose()
}

fn parse_enum<T>(raw: &str, parse: fn(&str) -> Option<T>, column: &str) -> CoreResult<T> {
    parse(raw).ok_or_else(|| CoreError::Corrupt(format!("unknown {column} '{raw}'")))
}

fn payload_from(value: Option<serde_json::Value>) -> CoreResult<Option<ResultPayload>> {
    Ok(value.map(serde_json::from_value).transpose()?)
}

fn payload_to(payload: Option<&ResultPayload>) -> CoreResult<Option<serde_json::Value>> {
    Ok(payload.map(serde_json::to_value).transpose()?)
}

fn bracket_from_row(r: &PgRow) -> CoreResult<Bracket> {
    Ok(Bracket {
        id: r.get("id"),
        tournament_id: r.get("tournament_id"),
        format: parse_enum(r.get("format"), BracketFormat::parse, "bracket format")?,
        total_rounds: to_u32(r.get("total_rounds"), "total_rounds")?,
        total_matches: to_u32(r.get("total_matches"), "total_matches")?,
        participant_count: to_u32(r.get("participant_count"), "participant_count")?,
        is_locked: r.get("is_locked"),
        created_at: r.get("created_at"),
    })
}

fn match_from_row(r: &PgRow) -> CoreResult<Match> {
    Ok(Match {
        id: r.get("id"),
        bracket_id: r.get("bracket_id"),
        round: to_u32(r.get("round"), "round")?,
        position: to_u32(r.get("position"), "position")?,
        participant1: r.get("participant1_id"),
        participant2: r.get("participant2_id"),
        winner: r.get("winner_id"),
        loser: r.get("loser_id"),
        score1: opt_u32(r.get("score1"), "score1")?,
        score2: opt_u32(r.get("score2"), "score2")?,
        status: parse_enum(r.get("status"), MatchStatus::parse, "match status")?,
        is_bye: r.get("is_bye"),
        completed_at: r.get("completed_at"),
    })
}

fn submission_from_row(r: &PgRow) -> CoreResult<ResultSubmission> {
    let finalized_via: Option<String> = r.get("finalized_via");
    Ok(ResultSubmission {
        id: r.get("id"),
        match_id: r.get("match_id"),
        bracket_id: r.get("bracket_id"),
        submitted_by: r.get("submitted_by"),
        payload: serde_json::from_value(r.get("payload"))?,
        proof_ref: r.get("proof_ref"),
        status: parse_enum(r.get("status"), SubmissionStatus::parse, "submission status")?,
        submitted_at: r.get("submitted_at"),
        auto_confirm_deadline: r.get("auto_confirm_deadline"),
        confirm_window_ends_at: r.get("confirm_window_ends_at"),
        confirmed_by: r.get("confirmed_by"),
        disputed_by: r.get("disputed_by"),
        dispute_reason: r.get("dispute_reason"),
        counter_payload: payload_from(r.get("counter_payload"))?,
        responded_at: r.get("responded_at"),
        final_payload: payload_from(r.get("final_payload"))?,
        finalized_via: finalized_via
            .as_deref()
            .map(|s| parse_enum(s, SubmissionStatus::parse, "finalized_via"))
            .transpose()?,
        finalized_at: r.get("finalized_at"),
    })
}

fn resolution_from_row(r: &PgRow) -> CoreResult<DisputeResolution> {
    Ok(DisputeResolution {
        id: r.get("id"),
        submission_id: r.get("submission_id"),
        match_id: r.get("match_id"),
        bracket_id: r.get("bracket_id"),
        resolution_type: parse_enum(r.get("resolution_type"), ResolutionType::parse, "resolution type")?,
        resolver_id: r.get("resolver_id"),
        notes: r.get("notes"),
        disputed_by: r.get("disputed_by"),
        dispute_reason: r.get("dispute_reason"),
        counter_payload: payload_from(r.get("counter_payload"))?,
        custom_payload: payload_from(r.get("custom_payload"))?,
        chosen_payload: payload_from(r.get("chosen_payload"))?,
        resolved_at: r.get("resolved_at"),
    })
}

fn entrant_from_row(r: &PgRow) -> CoreResult<SeededParticipant> {
    let kind: String = r.get("kind");
    let id = r.get("participant_id");
    let participant = Participant::from_parts(&kind, id, r.get("display_name"))
        .ok_or_else(|| CoreError::Corrupt(format!("unknown participant kind '{kind}'")))?;
    Ok(SeededParticipant {
        participant,
        seed: to_u32(r.get("seed"), "seed")?,
    })
}

fn policy_from_row(r: &PgRow) -> CoreResult<TournamentPolicy> {
    Ok(TournamentPolicy {
        tournament_id: r.get("tournament_id"),
        capacity: to_u32(r.get("capacity"), "capacity")?,
        entry_fee: r.get("entry_fee"),
        payment_deadline_hours: opt_u32(r.get("payment_deadline_hours"), "payment_deadline_hours")?,
    })
}

fn registration_from_row(r: &PgRow) -> CoreResult<Registration> {
    Ok(Registration {
        id: r.get("id"),
        tournament_id: r.get("tournament_id"),
        participant_id: r.get("participant_id"),
        status: parse_enum(r.get("status"), RegistrationStatus::parse, "registration status")?,
        waitlist_position: opt_u32(r.get("waitlist_position"), "waitlist_position")?,
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}

fn payment_from_row(r: &PgRow) -> CoreResult<Payment> {
    Ok(Payment {
        id: r.get("id"),
        registration_id: r.get("registration_id"),
        tournament_id: r.get("tournament_id"),
        status: parse_enum(r.get("status"), PaymentStatus::parse, "payment status")?,
        amount: r.get("amount"),
        submitted_at: r.get("submitted_at"),
        status_changed_at: r.get("status_changed_at"),
        reviewed_by: r.get("reviewed_by"),
        note: r.get("note"),
    })
}

const BRACKET_COLUMNS: &str = "id, tournament_id, format, total_rounds, total_matches, \
                               participant_count, is_locked, created_at";

/// Load the rest of a tree whose header row was already read (and locked)
async fn load_tree(tx: &mut Transaction<'_, Postgres>, bracket: Bracket) -> CoreResult<BracketTree> {
    let entrants = sqlx::query(
        "SELECT participant_id, kind, display_name, seed
         FROM bracket_participants WHERE bracket_id = $1 ORDER BY seed",
    )
    .bind(bracket.id)
    .fetch_all(&mut **tx)
    .await?
    .iter()
    .map(entrant_from_row)
    .collect::<CoreResult<Vec<_>>>()?;

    let matches = sqlx::query(
        "SELECT id, bracket_id, round, position, participant1_id, participant2_id,
                winner_id, loser_id, score1, score2, status, is_bye, completed_at
         FROM matches WHERE bracket_id = $1 ORDER BY round, position",
    )
    .bind(bracket.id)
    .fetch_all(&mut **tx)
    .await?
    .iter()
    .map(match_from_row)
    .collect::<CoreResult<Vec<_>>>()?;

    let submissions = sqlx::query(
        "SELECT * FROM result_submissions WHERE bracket_id = $1 ORDER BY submitted_at",
    )
    .bind(bracket.id)
    .fetch_all(&mut **tx)
    .await?
    .iter()
    .map(submission_from_row)
    .collect::<CoreResult<Vec<_>>>()?;

    BracketTree::from_parts(bracket, entrants, matches, submissions)
}

async fn insert_bracket(tx: &mut Transaction<'_, Postgres>, tree: &BracketTree) -> CoreResult<()> {
    let b = tree.bracket();
    sqlx::query(
        r#"
        INSERT INTO brackets (id, tournament_id, format, total_rounds, total_matches,
                              participant_count, is_locked, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(b.id)
    .bind(b.tournament_id)
    .bind(b.format.as_str())
    .bind(to_i32(b.total_rounds, "total_rounds")?)
    .bind(to_i32(b.total_matches, "total_matches")?)
    .bind(to_i32(b.participant_count, "participant_count")?)
    .bind(b.is_locked)
    .bind(b.created_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_unique(e, || format!("tournament {} already has a bracket", b.tournament_id)))?;

    for entrant in tree.entrants() {
        sqlx::query(
            "INSERT INTO bracket_participants (bracket_id, participant_id, kind, display_name, seed)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(b.id)
        .bind(entrant.id())
        .bind(entrant.participant.kind())
        .bind(entrant.participant.display_name())
        .bind(to_i32(entrant.seed, "seed")?)
        .execute(&mut **tx)
        .await?;
    }

    for m in tree.matches() {
        upsert_match(tx, m).await?;
    }
    Ok(())
}

async fn upsert_match(tx: &mut Transaction<'_, Postgres>, m: &Match) -> CoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO matches (id, bracket_id, round, position, participant1_id, participant2_id,
                             winner_id, loser_id, score1, score2, status, is_bye, completed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        ON CONFLICT (id) DO UPDATE SET
            participant1_id = EXCLUDED.participant1_id,
            participant2_id = EXCLUDED.participant2_id,
            winner_id = EXCLUDED.winner_id,
            loser_id = EXCLUDED.loser_id,
            score1 = EXCLUDED.score1,
            score2 = EXCLUDED.score2,
            status = EXCLUDED.status,
            is_bye = EXCLUDED.is_bye,
            completed_at = EXCLUDED.completed_at
        "#,
    )
    .bind(m.id)
    .bind(m.bracket_id)
    .bind(to_i32(m.round, "round")?)
    .bind(to_i32(m.position, "position")?)
    .bind(m.participant1)
    .bind(m.participant2)
    .bind(m.winner)
    .bind(m.loser)
    .bind(opt_i32(m.score1, "score1")?)
    .bind(opt_i32(m.score2, "score2")?)
    .bind(m.status.as_str())
    .bind(m.is_bye)
    .bind(m.completed_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_submission(
    tx: &mut Transaction<'_, Postgres>,
    s: &ResultSubmission,
) -> CoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO result_submissions (
            id, match_id, bracket_id, submitted_by, payload, proof_ref, status,
            submitted_at, auto_confirm_deadline, confirm_window_ends_at, confirmed_by,
            disputed_by, dispute_reason, counter_payload, responded_at, final_payload,
            finalized_via, finalized_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
        ON CONFLICT (id) DO UPDATE SET
            status = EXCLUDED.status,
            confirm_window_ends_at = EXCLUDED.confirm_window_ends_at,
            confirmed_by = EXCLUDED.confirmed_by,
            disputed_by = EXCLUDED.disputed_by,
            dispute_reason = EXCLUDED.dispute_reason,
            counter_payload = EXCLUDED.counter_payload,
            responded_at = EXCLUDED.responded_at,
            final_payload = EXCLUDED.final_payload,
            finalized_via = EXCLUDED.finalized_via,
            finalized_at = EXCLUDED.finalized_at
        "#,
    )
    .bind(s.id)
    .bind(s.match_id)
    .bind(s.bracket_id)
    .bind(s.submitted_by)
    .bind(serde_json::to_value(&s.payload)?)
    .bind(&s.proof_ref)
    .bind(s.status.as_str())
    .bind(s.submitted_at)
    .bind(s.auto_confirm_deadline)
    .bind(s.confirm_window_ends_at)
    .bind(s.confirmed_by)
    .bind(s.disputed_by)
    .bind(&s.dispute_reason)
    .bind(payload_to(s.counter_payload.as_ref())?)
    .bind(s.responded_at)
    .bind(payload_to(s.final_payload.as_ref())?)
    .bind(s.finalized_via.map(|v| v.as_str()))
    .bind(s.finalized_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_unique(e, || format!("match {} already has an active submission", s.match_id)))?;
    Ok(())
}

async fn insert_resolution(
    tx: &mut Transaction<'_, Postgres>,
    r: &DisputeResolution,
) -> CoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO dispute_resolutions (id, submission_id, match_id, bracket_id, resolution_type,
                                         resolver_id, notes, disputed_by, dispute_reason,
                                         counter_payload, custom_payload, chosen_payload, resolved_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(r.id)
    .bind(r.submission_id)
    .bind(r.match_id)
    .bind(r.bracket_id)
    .bind(r.resolution_type.as_str())
    .bind(r.resolver_id)
    .bind(&r.notes)
    .bind(r.disputed_by)
    .bind(&r.dispute_reason)
    .bind(payload_to(r.counter_payload.as_ref())?)
    .bind(payload_to(r.custom_payload.as_ref())?)
    .bind(payload_to(r.chosen_payload.as_ref())?)
    .bind(r.resolved_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Write every row `tree` marked as changed
async fn persist_tree(tx: &mut Transaction<'_, Postgres>, tree: &mut BracketTree) -> CoreResult<Vec<crate::notify::TournamentEvent>> {
    let changes = tree.take_changes();

    if changes.bracket {
        let b = tree.bracket();
        sqlx::query("UPDATE brackets SET is_locked = $2, participant_count = $3 WHERE id = $1")
            .bind(b.id)
            .bind(b.is_locked)
            .bind(to_i32(b.participant_count, "participant_count")?)
            .execute(&mut **tx)
            .await?;
    }

    for participant in &changes.removed_entrants {
        sqlx::query("DELETE FROM bracket_participants WHERE bracket_id = $1 AND participant_id = $2")
            .bind(tree.id())
            .bind(participant)
            .execute(&mut **tx)
            .await?;
    }

    for id in &changes.matches {
        let m = tree.get_match(*id)?;
        upsert_match(tx, m).await?;
    }

    for id in &changes.submissions {
        let s = tree.submission(*id)?;
        upsert_submission(tx, s).await?;
    }

    for r in &changes.resolutions {
        insert_resolution(tx, r).await?;
    }

    Ok(changes.events)
}

async fn upsert_registration(
    tx: &mut Transaction<'_, Postgres>,
    r: &Registration,
) -> CoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO registrations (id, tournament_id, participant_id, status, waitlist_position,
                                   created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (id) DO UPDATE SET
            status = EXCLUDED.status,
            waitlist_position = EXCLUDED.waitlist_position,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(r.id)
    .bind(r.tournament_id)
    .bind(r.participant_id)
    .bind(r.status.as_str())
    .bind(opt_i32(r.waitlist_position, "waitlist_position")?)
    .bind(r.created_at)
    .bind(r.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        map_unique(e, || {
            format!(
                "participant {} is already registered for tournament {}",
                r.participant_id, r.tournament_id
            )
        })
    })?;
    Ok(())
}

async fn upsert_payment(tx: &mut Transaction<'_, Postgres>, p: &Payment) -> CoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO payments (id, registration_id, tournament_id, status, amount, submitted_at,
                              status_changed_at, reviewed_by, note)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (id) DO UPDATE SET
            status = EXCLUDED.status,
            status_changed_at = EXCLUDED.status_changed_at,
            reviewed_by = EXCLUDED.reviewed_by,
            note = EXCLUDED.note
        "#,
    )
    .bind(p.id)
    .bind(p.registration_id)
    .bind(p.tournament_id)
    .bind(p.status.as_str())
    .bind(p.amount)
    .bind(p.submitted_at)
    .bind(p.status_changed_at)
    .bind(p.reviewed_by)
    .bind(&p.note)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_unique(e, || format!("registration {} already has an active payment", p.registration_id)))?;
    Ok(())
}

#[async_trait]
impl ParticipantRepository for PgStore {
    async fn list_participants(
        &self,
        tournament_id: TournamentId,
    ) -> CoreResult<Vec<SeededParticipant>> {
        sqlx::query(
            "SELECT bp.participant_id, bp.kind, bp.display_name, bp.seed
             FROM bracket_participants bp
             JOIN brackets b ON b.id = bp.bracket_id
             WHERE b.tournament_id = $1
             ORDER BY bp.seed",
        )
        .bind(tournament_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(entrant_from_row)
        .collect()
    }
}

#[async_trait]
impl MatchRepository for PgStore {
    async fn load_bracket(&self, tournament_id: TournamentId) -> CoreResult<Option<BracketTree>> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!(
            "SELECT {BRACKET_COLUMNS} FROM brackets WHERE tournament_id = $1"
        ))
        .bind(tournament_id)
        .fetch_optional(&mut *tx)
        .await?;

        let tree = match row {
            Some(row) => Some(load_tree(&mut tx, bracket_from_row(&row)?).await?),
            None => None,
        };
        tx.commit().await?;
        Ok(tree)
    }

    async fn bracket_for_tournament(&self, tournament_id: TournamentId) -> CoreResult<BracketId> {
        sqlx::query("SELECT id FROM brackets WHERE tournament_id = $1")
            .bind(tournament_id)
            .fetch_optional(&self.pool)
            .await?
            .map(|r| r.get("id"))
            .ok_or_else(|| CoreError::not_found("bracket", format!("tournament {tournament_id}")))
    }

    async fn bracket_for_match(&self, match_id: MatchId) -> CoreResult<BracketId> {
        sqlx::query("SELECT bracket_id FROM matches WHERE id = $1")
            .bind(match_id)
            .fetch_optional(&self.pool)
            .await?
            .map(|r| r.get("bracket_id"))
            .ok_or_else(|| CoreError::not_found("match", match_id))
    }

    async fn bracket_for_submission(&self, submission_id: SubmissionId) -> CoreResult<BracketId> {
        sqlx::query("SELECT bracket_id FROM result_submissions WHERE id = $1")
            .bind(submission_id)
            .fetch_optional(&self.pool)
            .await?
            .map(|r| r.get("bracket_id"))
            .ok_or_else(|| CoreError::not_found("submission", submission_id))
    }

    async fn overdue_submissions(
        &self,
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<(BracketId, SubmissionId)>> {
        let rows = sqlx::query(
            "SELECT bracket_id, id FROM result_submissions
             WHERE status = 'pending' AND confirm_window_ends_at < $1
             ORDER BY confirm_window_ends_at",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| (r.get("bracket_id"), r.get("id")))
            .collect())
    }

    async fn list_resolutions(
        &self,
        submission_id: SubmissionId,
    ) -> CoreResult<Vec<DisputeResolution>> {
        sqlx::query(
            "SELECT * FROM dispute_resolutions WHERE submission_id = $1 ORDER BY resolved_at",
        )
        .bind(submission_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(resolution_from_row)
        .collect()
    }

    async fn replace_bracket<F>(
        &self,
        tournament_id: TournamentId,
        build: F,
    ) -> CoreResult<Committed<BracketTree>>
    where
        F: FnOnce(Option<&BracketTree>) -> CoreResult<BracketTree> + Send,
    {
        let mut tx = self.pool.begin().await?;

        // Serializes generation for a tournament that has no bracket row yet.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(tournament_id)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query(&format!(
            "SELECT {BRACKET_COLUMNS} FROM brackets WHERE tournament_id = $1 FOR UPDATE"
        ))
        .bind(tournament_id)
        .fetch_optional(&mut *tx)
        .await?;

        let existing = match row {
            Some(row) => Some(load_tree(&mut tx, bracket_from_row(&row)?).await?),
            None => None,
        };

        let mut tree = build(existing.as_ref())?;

        if let Some(old) = &existing {
            sqlx::query("DELETE FROM brackets WHERE id = $1")
                .bind(old.id())
                .execute(&mut *tx)
                .await?;
        }

        insert_bracket(&mut tx, &tree).await?;
        let events = tree.take_changes().events;
        tx.commit().await?;

        Ok((tree, events))
    }

    async fn update_bracket<F, T>(&self, bracket_id: BracketId, apply: F) -> CoreResult<Committed<T>>
    where
        F: FnOnce(&mut BracketTree) -> CoreResult<T> + Send,
        T: Send,
    {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {BRACKET_COLUMNS} FROM brackets WHERE id = $1 FOR UPDATE"
        ))
        .bind(bracket_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| CoreError::not_found("bracket", bracket_id))?;

        let mut tree = load_tree(&mut tx, bracket_from_row(&row)?).await?;

        // Dropping `tx` on error rolls back.
        let value = apply(&mut tree)?;
        let events = persist_tree(&mut tx, &mut tree).await?;
        tx.commit().await?;

        Ok((value, events))
    }
}

#[async_trait]
impl RegistrationRepository for PgStore {
    async fn upsert_policy(&self, policy: &TournamentPolicy) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tournament_policies (tournament_id, capacity, entry_fee, payment_deadline_hours)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (tournament_id) DO UPDATE SET
                capacity = EXCLUDED.capacity,
                entry_fee = EXCLUDED.entry_fee,
                payment_deadline_hours = EXCLUDED.payment_deadline_hours,
                updated_at = NOW()
            "#,
        )
        .bind(policy.tournament_id)
        .bind(to_i32(policy.capacity, "capacity")?)
        .bind(policy.entry_fee)
        .bind(opt_i32(policy.payment_deadline_hours, "payment_deadline_hours")?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_policy(&self, tournament_id: TournamentId) -> CoreResult<TournamentPolicy> {
        let row = sqlx::query(
            "SELECT tournament_id, capacity, entry_fee, payment_deadline_hours
             FROM tournament_policies WHERE tournament_id = $1",
        )
        .bind(tournament_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| CoreError::not_found("tournament", tournament_id))?;
        policy_from_row(&row)
    }

    async fn policies_with_deadline(&self) -> CoreResult<Vec<TournamentPolicy>> {
        sqlx::query(
            "SELECT tournament_id, capacity, entry_fee, payment_deadline_hours
             FROM tournament_policies
             WHERE payment_deadline_hours > 0
             ORDER BY tournament_id",
        )
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(policy_from_row)
        .collect()
    }

    async fn tournament_for_registration(
        &self,
        registration_id: RegistrationId,
    ) -> CoreResult<TournamentId> {
        sqlx::query("SELECT tournament_id FROM registrations WHERE id = $1")
            .bind(registration_id)
            .fetch_optional(&self.pool)
            .await?
            .map(|r| r.get("tournament_id"))
            .ok_or_else(|| CoreError::not_found("registration", registration_id))
    }

    async fn tournament_for_payment(&self, payment_id: PaymentId) -> CoreResult<TournamentId> {
        sqlx::query("SELECT tournament_id FROM payments WHERE id = $1")
            .bind(payment_id)
            .fetch_optional(&self.pool)
            .await?
            .map(|r| r.get("tournament_id"))
            .ok_or_else(|| CoreError::not_found("payment", payment_id))
    }

    async fn expired_payments(
        &self,
        tournament_id: TournamentId,
        cutoff: DateTime<Utc>,
    ) -> CoreResult<Vec<PaymentId>> {
        let rows = sqlx::query(
            "SELECT id FROM payments
             WHERE tournament_id = $1 AND status = 'submitted' AND submitted_at < $2
             ORDER BY submitted_at",
        )
        .bind(tournament_id)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|r| r.get("id")).collect())
    }

    async fn list_registrations(
        &self,
        tournament_id: TournamentId,
    ) -> CoreResult<Vec<Registration>> {
        sqlx::query(
            "SELECT id, tournament_id, participant_id, status, waitlist_position, created_at, updated_at
             FROM registrations WHERE tournament_id = $1 ORDER BY created_at",
        )
        .bind(tournament_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(registration_from_row)
        .collect()
    }

    async fn update_registrations<F, T>(&self, tournament_id: TournamentId, apply: F) -> CoreResult<T>
    where
        F: FnOnce(&mut RegistrationBook) -> CoreResult<T> + Send,
        T: Send,
    {
        let mut tx = self.pool.begin().await?;

        let policy_row = sqlx::query(
            "SELECT tournament_id, capacity, entry_fee, payment_deadline_hours
             FROM tournament_policies WHERE tournament_id = $1 FOR UPDATE",
        )
        .bind(tournament_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| CoreError::not_found("tournament", tournament_id))?;
        let policy = policy_from_row(&policy_row)?;

        let registrations = sqlx::query(
            "SELECT id, tournament_id, participant_id, status, waitlist_position, created_at, updated_at
             FROM registrations WHERE tournament_id = $1
             ORDER BY waitlist_position NULLS FIRST, created_at
             FOR UPDATE",
        )
        .bind(tournament_id)
        .fetch_all(&mut *tx)
        .await?
        .iter()
        .map(registration_from_row)
        .collect::<CoreResult<Vec<_>>>()?;

        let payments = sqlx::query(
            "SELECT id, registration_id, tournament_id, status, amount, submitted_at,
                    status_changed_at, reviewed_by, note
             FROM payments WHERE tournament_id = $1
             FOR UPDATE",
        )
        .bind(tournament_id)
        .fetch_all(&mut *tx)
        .await?
        .iter()
        .map(payment_from_row)
        .collect::<CoreResult<Vec<_>>>()?;

        let mut book = RegistrationBook::from_parts(policy, registrations, payments);
        let value = apply(&mut book)?;
        let changes = book.take_changes();

        for id in &changes.registrations {
            upsert_registration(&mut tx, book.registration(*id)?).await?;
        }
        for id in &changes.payments {
            upsert_payment(&mut tx, book.payment(*id)?).await?;
        }

        tx.commit()
            .await
            .map_err(|e| map_unique(e, || format!("waitlist of tournament {tournament_id} changed concurrently")))?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_columns_reject_overflow() {
        assert_eq!(to_i32(7, "score1").unwrap(), 7);
        assert_eq!(to_i32(i32::MAX as u32, "score1").unwrap(), i32::MAX);

        let err = to_i32(u32::MAX, "score1").unwrap_err();
        assert!(matches!(err, CoreError::Corrupt(ref msg) if msg.contains("score1")));
        assert!(opt_i32(Some(u32::MAX), "capacity").is_err());
        assert_eq!(opt_i32(None, "capacity").unwrap(), None);
    }

    #[test]
    fn test_negative_columns_are_corrupt() {
        assert!(matches!(to_u32(-1, "seed"), Err(CoreError::Corrupt(_))));
        assert_eq!(opt_u32(Some(3), "seed").unwrap(), Some(3));
    }
}
