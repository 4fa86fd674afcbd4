//! Integration tests for result submission, confirmation, auto-confirmation,
//! forfeits and cancellations.

use bracketeer::{
    CoreError, Match, MatchStatus, MemoryStore, Participant, ResultPayload, SeedingMode,
    SubmissionStatus, TournamentEngine, notify::LogNotifier,
};
use chrono::{Duration, Utc};
use std::sync::Arc;

async fn setup_bracket(tournament_id: i64, n: i64) -> (TournamentEngine<MemoryStore>, Vec<Match>) {
    let engine = TournamentEngine::new(Arc::new(MemoryStore::new()), Arc::new(LogNotifier));
    let players: Vec<Participant> = (1..=n)
        .map(|i| Participant::solo(i, format!("player{i}")))
        .collect();
    let tree = engine
        .generate_bracket(tournament_id, &players, &SeedingMode::SlotOrder, false)
        .await
        .expect("bracket");
    (engine, tree.round(1).to_vec())
}

fn pair(m: &Match) -> (i64, i64) {
    (m.participant1.unwrap(), m.participant2.unwrap())
}

#[tokio::test]
async fn test_silent_opponent_auto_confirms_after_24h() {
    let (engine, round1) = setup_bracket(1, 2).await;
    let final_match = &round1[0];
    let (a, b) = pair(final_match);

    let submission = engine
        .submit_result(final_match.id, a, ResultPayload::from_scores([(a, 16), (b, 12)]), None)
        .await
        .unwrap();
    assert_eq!(submission.status, SubmissionStatus::Pending);
    assert_eq!(
        submission.auto_confirm_deadline,
        submission.submitted_at + Duration::hours(24)
    );

    let early = engine
        .run_auto_confirm_scan_at(Utc::now() + Duration::hours(23))
        .await
        .unwrap();
    assert_eq!(early.confirmed_count, 0);

    let report = engine
        .run_auto_confirm_scan_at(Utc::now() + Duration::hours(25))
        .await
        .unwrap();
    assert_eq!(report.confirmed_count, 1);

    let tree = engine.get_bracket(1).await.unwrap();
    let finalized = tree.submission(submission.id).unwrap();
    assert_eq!(finalized.status, SubmissionStatus::Finalized);
    assert_eq!(finalized.finalized_via, Some(SubmissionStatus::AutoConfirmed));
    assert_eq!(finalized.auto_confirm_deadline, submission.auto_confirm_deadline);

    let m = tree.get_match(final_match.id).unwrap();
    assert_eq!(m.status, MatchStatus::Completed);
    assert_eq!(m.winner, Some(a));
    assert_eq!((m.score1, m.score2), (Some(16), Some(12)));
    assert_eq!(tree.champion(), Some(a));

    let rerun = engine
        .run_auto_confirm_scan_at(Utc::now() + Duration::hours(48))
        .await
        .unwrap();
    assert_eq!(rerun.confirmed_count, 0);
}

#[tokio::test]
async fn test_only_opponent_may_respond() {
    let (engine, round1) = setup_bracket(2, 4).await;
    let m = &round1[0];
    let (a, b) = pair(m);
    let outsider = round1[1].participant1.unwrap();

    let by_outsider = engine
        .submit_result(m.id, outsider, ResultPayload::from_scores([(a, 1), (b, 0)]), None)
        .await;
    assert!(matches!(by_outsider, Err(CoreError::Permission(_))));

    let submission = engine
        .submit_result(m.id, a, ResultPayload::from_scores([(a, 2), (b, 1)]), Some("vod://1".into()))
        .await
        .unwrap();

    let self_confirm = engine.confirm_result(submission.id, a).await;
    assert!(matches!(self_confirm, Err(CoreError::Permission(_))));
    let outsider_dispute = engine
        .dispute_result(submission.id, outsider, None, "wrong".into())
        .await;
    assert!(matches!(outsider_dispute, Err(CoreError::Permission(_))));

    let second = engine
        .submit_result(m.id, b, ResultPayload::from_scores([(a, 0), (b, 2)]), None)
        .await;
    assert!(matches!(second, Err(CoreError::Conflict(_))));

    engine.confirm_result(submission.id, b).await.unwrap();

    let after_final = engine
        .submit_result(m.id, b, ResultPayload::from_scores([(a, 0), (b, 2)]), None)
        .await;
    assert!(matches!(after_final, Err(CoreError::Conflict(_))));
    let reconfirm = engine.confirm_result(submission.id, b).await;
    assert!(matches!(reconfirm, Err(CoreError::Conflict(_))));
}

#[tokio::test]
async fn test_invalid_payloads_are_rejected() {
    let (engine, round1) = setup_bracket(3, 2).await;
    let m = &round1[0];
    let (a, b) = pair(m);

    let tie = engine
        .submit_result(m.id, a, ResultPayload::from_scores([(a, 1), (b, 1)]), None)
        .await;
    assert!(matches!(tie, Err(CoreError::Validation(_))));

    let stranger = engine
        .submit_result(m.id, a, ResultPayload::from_scores([(a, 3), (99, 1)]), None)
        .await;
    assert!(matches!(stranger, Err(CoreError::Validation(_))));

    let bad_winner = engine
        .submit_result(
            m.id,
            a,
            ResultPayload::from_scores([(a, 3), (b, 1)]).with_winner(99),
            None,
        )
        .await;
    assert!(matches!(bad_winner, Err(CoreError::Validation(_))));

    let declared_tie = engine
        .submit_result(
            m.id,
            a,
            ResultPayload::from_scores([(a, 1), (b, 1)]).with_winner(b),
            None,
        )
        .await
        .unwrap();
    engine.confirm_result(declared_tie.id, b).await.unwrap();

    let tree = engine.get_bracket(3).await.unwrap();
    assert_eq!(tree.get_match(m.id).unwrap().winner, Some(b));
}

#[tokio::test]
async fn test_dispute_keeps_deadline() {
    let (engine, round1) = setup_bracket(4, 2).await;
    let m = &round1[0];
    let (a, b) = pair(m);

    let submission = engine
        .submit_result(m.id, a, ResultPayload::from_scores([(a, 5), (b, 3)]), None)
        .await
        .unwrap();

    let blank = engine.dispute_result(submission.id, b, None, "   ".into()).await;
    assert!(matches!(blank, Err(CoreError::Validation(_))));

    let disputed = engine
        .dispute_result(
            submission.id,
            b,
            Some(ResultPayload::from_scores([(a, 3), (b, 5)])),
            "scores swapped".into(),
        )
        .await
        .unwrap();
    assert_eq!(disputed.status, SubmissionStatus::Disputed);
    assert_eq!(disputed.auto_confirm_deadline, submission.auto_confirm_deadline);

    // Disputed submissions are out of the auto-confirm scan's reach.
    let report = engine
        .run_auto_confirm_scan_at(Utc::now() + Duration::hours(30))
        .await
        .unwrap();
    assert_eq!(report.confirmed_count, 0);

    let tree = engine.get_bracket(4).await.unwrap();
    assert_eq!(tree.get_match(m.id).unwrap().status, MatchStatus::Disputed);
}

#[tokio::test]
async fn test_forfeit_advances_opponent() {
    let (engine, round1) = setup_bracket(5, 4).await;
    let m = &round1[1];
    let (a, b) = pair(m);

    let forfeited = engine.forfeit_match(m.id, a, 900).await.unwrap();
    assert_eq!(forfeited.status, MatchStatus::Forfeit);
    assert_eq!(forfeited.winner, Some(b));
    assert_eq!(forfeited.loser, Some(a));

    let tree = engine.get_bracket(5).await.unwrap();
    assert!(tree.match_at(2, 0).unwrap().has_participant(b));

    let again = engine.forfeit_match(m.id, b, 900).await;
    assert!(matches!(again, Err(CoreError::Conflict(_))));
}

#[tokio::test]
async fn test_forfeit_refused_while_result_pending() {
    let (engine, round1) = setup_bracket(6, 2).await;
    let m = &round1[0];
    let (a, b) = pair(m);

    engine
        .submit_result(m.id, a, ResultPayload::from_scores([(a, 1), (b, 0)]), None)
        .await
        .unwrap();

    let forfeit = engine.forfeit_match(m.id, b, 900).await;
    assert!(matches!(forfeit, Err(CoreError::Conflict(_))));
    let cancel = engine.cancel_match(m.id, 900).await;
    assert!(matches!(cancel, Err(CoreError::Conflict(_))));
}

#[tokio::test]
async fn test_cancelled_match_is_a_bye_for_its_parent() {
    let (engine, round1) = setup_bracket(7, 4).await;
    let upper = &round1[0];
    let lower = &round1[1];

    let cancelled = engine.cancel_match(upper.id, 900).await.unwrap();
    assert_eq!(cancelled.status, MatchStatus::Cancelled);
    assert_eq!(cancelled.winner, None);

    let (c, d) = pair(lower);
    let submission = engine
        .submit_result(lower.id, c, ResultPayload::from_scores([(c, 2), (d, 0)]), None)
        .await
        .unwrap();
    engine.confirm_result(submission.id, d).await.unwrap();

    let tree = engine.get_bracket(7).await.unwrap();
    let final_match = tree.match_at(2, 0).unwrap();
    assert_eq!(final_match.status, MatchStatus::Completed);
    assert!(final_match.is_bye);
    assert_eq!(tree.champion(), Some(c));
}

#[tokio::test]
async fn test_start_requires_ready() {
    let (engine, round1) = setup_bracket(8, 5).await;

    let bye = round1.iter().find(|m| m.is_bye).unwrap();
    let result = engine.start_match(bye.id).await;
    assert!(matches!(result, Err(CoreError::Conflict(_))));

    let real = round1.iter().find(|m| !m.is_bye).unwrap();
    let live = engine.start_match(real.id).await.unwrap();
    assert_eq!(live.status, MatchStatus::Live);
    assert!(matches!(
        engine.start_match(real.id).await,
        Err(CoreError::Conflict(_))
    ));
}
