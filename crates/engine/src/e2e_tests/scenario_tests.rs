//! The end-to-end match scenarios.

use futures_util::StreamExt;

use worldbuild_domain::{
    EventPayload, MatchEvent, Role, RoundOutcome, TeamId, TurnType, VoteChoice,
};

use crate::e2e_tests::harness::Harness;
use crate::engine::challenge;
use crate::infrastructure::ports::{MatchStatus, MatchStore};
use crate::infrastructure::providers::mock::{FaultKind, FaultTarget, MockProvider};

fn team_events<'a>(events: &'a [MatchEvent], team_id: TeamId) -> Vec<&'a MatchEvent> {
    events
        .iter()
        .filter(|e| e.team_id == Some(team_id))
        .collect()
}

fn count_payload(events: &[MatchEvent], kind: &str) -> usize {
    events.iter().filter(|e| e.payload.kind() == kind).count()
}

#[tokio::test]
async fn basic_tier_one_match_emits_the_full_protocol() {
    let harness = Harness::new(MockProvider::new()).await;
    let (match_id, events) = harness.run_match(42, 1).await;

    // Monotonic gap-free seq from 1.
    let seqs: Vec<i64> = events.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, (1..=events.len() as i64).collect::<Vec<_>>());

    assert_eq!(count_payload(&events, "match_created"), 1);
    assert_eq!(count_payload(&events, "challenge_revealed"), 1);
    assert_eq!(count_payload(&events, "canon_initialized"), 2);
    assert_eq!(count_payload(&events, "prompt_pack_generated"), 2);
    assert_eq!(count_payload(&events, "match_completed"), 1);
    assert_eq!(count_payload(&events, "turn_validation_failed"), 0);
    assert_eq!(count_payload(&events, "match_failed"), 0);

    // The challenge triple is the stable seed-derived one.
    let revealed = events
        .iter()
        .find_map(|e| match &e.payload {
            EventPayload::ChallengeRevealed(challenge) => Some(challenge.clone()),
            _ => None,
        })
        .expect("challenge revealed");
    assert_eq!(revealed, challenge::generate(42, 1).unwrap());

    // Phases start in order 1..=5 with the protocol round counts.
    let phases: Vec<(u8, u8)> = events
        .iter()
        .filter_map(|e| match e.payload {
            EventPayload::PhaseStarted { phase, round_count } => Some((phase, round_count)),
            _ => None,
        })
        .collect();
    assert_eq!(phases, vec![(1, 3), (2, 4), (3, 2), (4, 1), (5, 0)]);

    for team_id in TeamId::BOTH {
        let team = team_events(&events, team_id);
        let turns = team
            .iter()
            .filter(|e| e.payload.kind() == "turn_emitted")
            .count();
        // 9 rounds of 10 turns plus the 5-turn ratification.
        assert_eq!(turns, 95, "team {team_id} turn count");

        let vote_results: Vec<RoundOutcome> = team
            .iter()
            .filter_map(|e| match &e.payload {
                EventPayload::VoteResult { result, .. } => Some(*result),
                _ => None,
            })
            .collect();
        assert_eq!(vote_results.len(), 10);
        assert!(vote_results.iter().all(|r| *r == RoundOutcome::Accept));

        let patches = team
            .iter()
            .filter(|e| e.payload.kind() == "canon_patch_applied")
            .count();
        assert_eq!(patches, 10);
    }

    // Both final canons satisfy the full canon schema.
    let record = harness.store.get_match(match_id).await.unwrap().unwrap();
    assert_eq!(record.status, MatchStatus::Completed);
    for team_id in TeamId::BOTH {
        let canon = crate::engine::views::derive_team_canon(&events, team_id).unwrap();
        assert!(worldbuild_domain::canon::validate_complete(&canon).is_ok());
    }
}

#[tokio::test]
async fn deadlocked_vote_is_settled_by_synthesizer_tiebreak() {
    // Shape phase 2 round 1 to ACCEPT:2 / AMEND:1 / REJECT:1.
    let mock = MockProvider::new()
        .with_fault(
            FaultTarget {
                team_id: None,
                phase: 2,
                round: 1,
                role: Role::Lorekeeper,
                turn_type: TurnType::Vote,
            },
            FaultKind::VoteChoice {
                choice: VoteChoice::Amend,
                amendment_summary: None,
            },
        )
        .with_fault(
            FaultTarget {
                team_id: None,
                phase: 2,
                round: 1,
                role: Role::Contrarian,
                turn_type: TurnType::Vote,
            },
            FaultKind::VoteChoice {
                choice: VoteChoice::Reject,
                amendment_summary: None,
            },
        );

    let harness = Harness::new(mock).await;
    let (_, events) = harness.run_match(7, 1).await;

    for team_id in TeamId::BOTH {
        let team = team_events(&events, team_id);

        // Locate the deadlocked vote in phase 2 round 1.
        let deadlock_pos = team
            .iter()
            .position(|e| {
                matches!(
                    e.payload,
                    EventPayload::VoteResult {
                        phase: 2,
                        round: 1,
                        result: RoundOutcome::Deadlock,
                        ..
                    }
                )
            })
            .expect("deadlock vote_result");

        // A second Synthesizer RESOLUTION follows, then a binding result.
        let tail = &team[deadlock_pos + 1..];
        let tiebreak_pos = tail
            .iter()
            .position(|e| match &e.payload {
                EventPayload::TurnEmitted { phase: 2, round: 1, output, .. } => {
                    output.turn_type == TurnType::Resolution
                        && output.speaker_role == Role::Synthesizer
                }
                _ => false,
            })
            .expect("tiebreak resolution");
        let binding = tail[tiebreak_pos + 1..]
            .iter()
            .find_map(|e| match e.payload {
                EventPayload::VoteResult { phase: 2, round: 1, result, .. } => Some(result),
                _ => None,
            })
            .expect("binding vote_result");
        assert!(matches!(binding, RoundOutcome::Accept | RoundOutcome::Reject));
    }

    // The match still completes.
    assert_eq!(count_payload(&events, "match_completed"), 1);
}

#[tokio::test]
async fn phase_restricted_patch_is_abandoned_after_repairs() {
    // Phase 1 proposal keeps targeting /tension/conflict across repairs.
    let mock = MockProvider::new().with_fault(
        FaultTarget {
            team_id: None,
            phase: 1,
            round: 1,
            role: Role::Architect,
            turn_type: TurnType::Proposal,
        },
        FaultKind::ForcedPatchPath {
            path: "/tension/conflict".to_string(),
        },
    );

    let harness = Harness::new(mock).await;
    let (_, events) = harness.run_match(11, 1).await;

    for team_id in TeamId::BOTH {
        let team = team_events(&events, team_id);

        // The slot ends in turn_validation_failed carrying the patch kind.
        let failure = team
            .iter()
            .find_map(|e| match &e.payload {
                EventPayload::TurnValidationFailed { phase: 1, round: 1, errors, .. } => {
                    Some(errors.clone())
                }
                _ => None,
            })
            .expect("abandoned proposal");
        assert!(failure.iter().any(|e| e.contains("patch_rejected_phase")));

        // No proposal was emitted for that slot.
        let proposal_emitted = team.iter().any(|e| match &e.payload {
            EventPayload::TurnEmitted { phase: 1, round: 1, output, .. } => {
                output.turn_type == TurnType::Proposal
            }
            _ => false,
        });
        assert!(!proposal_emitted);

        // The vote proceeds with the proposer abstaining.
        let tally = team
            .iter()
            .find_map(|e| match &e.payload {
                EventPayload::VoteResult { phase: 1, round: 1, tally, .. } => Some(*tally),
                _ => None,
            })
            .expect("round 1 vote result");
        assert_eq!(tally.abstain, 1);
        assert_eq!(tally.accept, 3);
    }

    // 2 repair attempts = 3 provider calls for the slot, per team.
    assert_eq!(
        harness.mock.calls_for(1, 1, Role::Architect, TurnType::Proposal),
        6
    );
    // The abandoned proposer is never asked to vote in that round.
    let architect_votes: u32 = harness
        .mock
        .calls()
        .iter()
        .filter(|c| {
            c.phase == 1 && c.round == 1 && c.role == Role::Architect && c.turn_type == TurnType::Vote
        })
        .count() as u32;
    assert_eq!(architect_votes, 0);
}

#[tokio::test]
async fn schema_violation_is_repaired_by_adapter_retry() {
    // First adapter call for the slot fails to parse; the retry succeeds.
    let mock = MockProvider::new().with_fault(
        FaultTarget {
            team_id: Some(TeamId::A),
            phase: 1,
            round: 1,
            role: Role::Architect,
            turn_type: TurnType::Proposal,
        },
        FaultKind::SchemaViolation { calls: 1 },
    );

    let harness = Harness::new(mock).await;
    let (_, events) = harness.run_match(13, 1).await;

    assert_eq!(count_payload(&events, "turn_validation_failed"), 0);

    let team_a = team_events(&events, TeamId::A);
    let proposals = team_a
        .iter()
        .filter(|e| match &e.payload {
            EventPayload::TurnEmitted { phase: 1, round: 1, output, .. } => {
                output.turn_type == TurnType::Proposal
            }
            _ => false,
        })
        .count();
    assert_eq!(proposals, 1);

    // One failed call plus one successful retry, observable on the double.
    let team_a_calls: u32 = harness
        .mock
        .calls()
        .iter()
        .filter(|c| {
            c.team_id == TeamId::A
                && c.phase == 1
                && c.round == 1
                && c.role == Role::Architect
                && c.turn_type == TurnType::Proposal
        })
        .count() as u32;
    assert_eq!(team_a_calls, 2);

    assert_eq!(count_payload(&events, "match_completed"), 1);
}

#[tokio::test]
async fn failed_ratification_twice_fails_the_match() {
    // The Contrarian rejects crystallization on both attempts.
    let mut mock = MockProvider::new();
    for round in [1u8, 2u8] {
        mock = mock.with_fault(
            FaultTarget {
                team_id: None,
                phase: 4,
                round,
                role: Role::Contrarian,
                turn_type: TurnType::Vote,
            },
            FaultKind::VoteChoice {
                choice: VoteChoice::Reject,
                amendment_summary: None,
            },
        );
    }

    let harness = Harness::new(mock).await;
    let (match_id, events) = harness.run_match(21, 2).await;

    let error = events
        .iter()
        .find_map(|e| match &e.payload {
            EventPayload::MatchFailed { error } => Some(error.clone()),
            _ => None,
        })
        .expect("match_failed event");
    assert_eq!(error, "ratification_failed");

    assert_eq!(count_payload(&events, "match_completed"), 0);
    assert_eq!(count_payload(&events, "prompt_pack_generated"), 0);

    let record = harness.store.get_match(match_id).await.unwrap().unwrap();
    assert_eq!(record.status, MatchStatus::Failed);
    assert_eq!(record.error.as_deref(), Some("ratification_failed"));
}

#[tokio::test]
async fn live_tail_reconnect_resumes_without_gap_or_duplicate() {
    let harness = Harness::new(MockProvider::new()).await;
    let record = harness.service.create(Some(42), 1).await.unwrap();
    let match_id = record.match_id;

    // First subscription from the start of the log.
    let (subscriber_id, live_rx) = harness.hub.subscribe(match_id).await;
    let (tx, mut rx) = futures_channel::mpsc::channel(64);
    tokio::spawn(crate::api::stream::forward_events(
        harness.store.clone(),
        harness.hub.clone(),
        match_id,
        subscriber_id,
        0,
        live_rx,
        tx,
    ));

    let mut seen = Vec::new();
    while let Some(event) = rx.next().await {
        seen.push(event.seq);
        if event.seq == 25 {
            break;
        }
    }
    drop(rx); // Disconnect mid-stream.
    assert_eq!(seen, (1..=25).collect::<Vec<i64>>());

    harness.service.wait(match_id).await;

    // Reconnect after the last delivered seq.
    let (subscriber_id, live_rx) = harness.hub.subscribe(match_id).await;
    let (tx, mut rx) = futures_channel::mpsc::channel(64);
    tokio::spawn(crate::api::stream::forward_events(
        harness.store.clone(),
        harness.hub.clone(),
        match_id,
        subscriber_id,
        25,
        live_rx,
        tx,
    ));

    let mut resumed = Vec::new();
    while let Some(event) = rx.next().await {
        resumed.push(event.seq);
    }
    assert_eq!(resumed.first(), Some(&26));
    let expected: Vec<i64> = (26..=26 + resumed.len() as i64 - 1).collect();
    assert_eq!(resumed, expected, "no gaps or duplicates after reconnect");

    // The reconnect stream ended because the log reached a terminal event.
    let events = harness.store.list_events(match_id, 0).await.unwrap();
    assert_eq!(events.last().unwrap().seq, *resumed.last().unwrap());
    assert!(events.last().unwrap().is_terminal());
}

#[tokio::test]
async fn cancellation_fails_the_match_with_reason() {
    let harness = Harness::new_slow(MockProvider::new()).await;
    let record = harness.service.create(Some(5), 1).await.unwrap();
    let match_id = record.match_id;

    // Let the pipeline get some events in flight first.
    tokio::time::sleep(std::time::Duration::from_millis(60)).await;
    let cancelled = harness.service.cancel(match_id).await.unwrap();
    assert!(cancelled);

    let events = harness.store.list_events(match_id, 0).await.unwrap();
    let last = events.last().unwrap();
    assert!(matches!(
        &last.payload,
        EventPayload::MatchFailed { error } if error == "cancelled"
    ));

    let record = harness.store.get_match(match_id).await.unwrap().unwrap();
    assert_eq!(record.status, MatchStatus::Failed);
    assert_eq!(record.error.as_deref(), Some("cancelled"));

    // Cancelling again is a no-op.
    assert!(!harness.service.cancel(match_id).await.unwrap());
}
