//! Five Player Cup Example
//!
//! Runs a five-team cup on the in-memory store: bracket generation with byes,
//! a confirmed result, a disputed result resolved by staff, and the final.

use bracketeer::{
    ChannelNotifier, MemoryStore, Participant, ResolutionRequest, ResolutionType, ResultPayload,
    SeedingMode, TournamentEngine, bracket::BracketGeometry,
};
use std::sync::Arc;

const STAFF: i64 = 1;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Five Player Cup ===\n");

    let (notifier, mut events) = ChannelNotifier::new();
    let engine = TournamentEngine::new(Arc::new(MemoryStore::new()), Arc::new(notifier));

    let teams = vec![
        Participant::team(1, "Falcons"),
        Participant::team(2, "Herons"),
        Participant::team(3, "Kestrels"),
        Participant::team(4, "Ospreys"),
        Participant::team(5, "Swifts"),
    ];

    let geometry = BracketGeometry::for_participants(teams.len())?;
    println!(
        "{} teams -> bracket of {}, {} byes, {} rounds",
        geometry.participant_count, geometry.bracket_size, geometry.byes, geometry.total_rounds
    );

    let tree = engine
        .generate_bracket(1, &teams, &SeedingMode::SlotOrder, false)
        .await?;
    for round in 1..=geometry.total_rounds {
        println!("\n{}:", geometry.round_name(round));
        for m in tree.round(round) {
            println!(
                "  #{} {:?} vs {:?} [{}]{}",
                m.position,
                m.participant1,
                m.participant2,
                m.status,
                if m.is_bye { " (bye)" } else { "" }
            );
        }
    }

    // Quarterfinal: Ospreys beat Swifts, confirmed by Swifts.
    let qf = tree.round(1).iter().find(|m| !m.is_bye).ok_or("no playable match")?;
    let s = engine
        .submit_result(qf.id, 4, ResultPayload::from_scores([(4, 13), (5, 9)]), None)
        .await?;
    engine.confirm_result(s.id, 5).await?;
    println!("\nOspreys beat Swifts 13-9");

    // Semifinal: Herons claim a win, Kestrels dispute, staff sets the score.
    let tree = engine.get_bracket(1).await?;
    let semi = tree.match_at(2, 1).ok_or("missing semifinal")?;
    let s = engine
        .submit_result(semi.id, 2, ResultPayload::from_scores([(2, 2), (3, 1)]), None)
        .await?;
    engine
        .dispute_result(s.id, 3, None, "map 3 was never played".to_string())
        .await?;
    let resolved = engine
        .resolve_dispute(
            s.id,
            ResolutionRequest {
                resolution_type: ResolutionType::CustomResult,
                resolver_id: STAFF,
                notes: Some("replayed map 3".to_string()),
                custom_payload: Some(ResultPayload::from_scores([(2, 1), (3, 2)])),
            },
        )
        .await?;
    println!("Staff ruling: winner {:?}", resolved.winner);

    // Upper semifinal and final.
    let tree = engine.get_bracket(1).await?;
    let upper = tree.match_at(2, 0).ok_or("missing semifinal")?;
    let s = engine
        .submit_result(upper.id, 1, ResultPayload::from_scores([(1, 3), (4, 0)]), None)
        .await?;
    engine.confirm_result(s.id, 4).await?;

    let tree = engine.get_bracket(1).await?;
    let final_match = tree.match_at(3, 0).ok_or("missing final")?;
    let s = engine
        .submit_result(final_match.id, 3, ResultPayload::from_scores([(1, 1), (3, 3)]), None)
        .await?;
    engine.confirm_result(s.id, 1).await?;

    let tree = engine.get_bracket(1).await?;
    println!("\nChampion: {:?}", tree.champion());

    println!("\nEvents:");
    while let Ok(event) = events.try_recv() {
        println!("  {}", serde_json::to_string(&event)?);
    }

    Ok(())
}
