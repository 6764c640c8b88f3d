//! Universal log properties checked over a full mock-driven match.

use worldbuild_domain::{
    content_hash, EventPayload, MatchEvent, Role, RoundOutcome, TeamId, TurnType,
};

use crate::e2e_tests::harness::Harness;
use crate::engine::rules;
use crate::engine::views;
use crate::infrastructure::ports::MatchStore;
use crate::infrastructure::providers::mock::MockProvider;

async fn completed_log() -> Vec<MatchEvent> {
    let harness = Harness::new(MockProvider::new()).await;
    let (_, events) = harness.run_match(1234, 3).await;
    assert!(events.last().unwrap().is_terminal());
    events
}

fn team_events(events: &[MatchEvent], team_id: TeamId) -> Vec<&MatchEvent> {
    events
        .iter()
        .filter(|e| e.team_id == Some(team_id))
        .collect()
}

#[tokio::test]
async fn seq_is_gap_free_from_one() {
    let events = completed_log().await;
    for (index, event) in events.iter().enumerate() {
        assert_eq!(event.seq, index as i64 + 1);
        assert_eq!(event.id, format!("{}:{}", event.match_id, event.seq));
    }
}

#[tokio::test]
async fn canon_hash_chain_replays_exactly() {
    let events = completed_log().await;

    let (completed_a, completed_b) = events
        .iter()
        .find_map(|e| match &e.payload {
            EventPayload::MatchCompleted {
                canon_hash_a,
                canon_hash_b,
            } => Some((canon_hash_a.clone(), canon_hash_b.clone())),
            _ => None,
        })
        .expect("match completed");

    for (team_id, final_hash) in [(TeamId::A, completed_a), (TeamId::B, completed_b)] {
        let mut chain: Option<String> = None;
        for event in team_events(&events, team_id) {
            match &event.payload {
                EventPayload::CanonInitialized { canon, canon_hash } => {
                    assert_eq!(*canon_hash, content_hash(canon));
                    chain = Some(canon_hash.clone());
                }
                EventPayload::CanonPatchApplied {
                    canon_before_hash,
                    canon_after_hash,
                    ..
                } => {
                    assert_eq!(chain.as_deref(), Some(canon_before_hash.as_str()));
                    chain = Some(canon_after_hash.clone());
                }
                _ => {}
            }
        }
        assert_eq!(chain.as_deref(), Some(final_hash.as_str()));

        // Folding the log reproduces the same document and hash.
        let derived = views::derive_team_canon(&events, team_id).expect("derived canon");
        assert_eq!(content_hash(&derived), final_hash);
    }
}

#[tokio::test]
async fn consecutive_proposals_alternate_within_phase() {
    let events = completed_log().await;
    for team_id in TeamId::BOTH {
        let mut last_proposer: Option<(u8, Role)> = None;
        for event in team_events(&events, team_id) {
            if let EventPayload::TurnEmitted { phase, output, .. } = &event.payload {
                if output.turn_type != TurnType::Proposal {
                    continue;
                }
                if let Some((prior_phase, prior_role)) = last_proposer {
                    if prior_phase == *phase {
                        assert_ne!(
                            prior_role, output.speaker_role,
                            "team {team_id} phase {phase}: same proposer twice"
                        );
                    }
                }
                last_proposer = Some((*phase, output.speaker_role));
            }
        }
    }
}

#[tokio::test]
async fn discourse_rules_hold_for_every_emitted_turn() {
    let events = completed_log().await;
    for event in &events {
        let EventPayload::TurnEmitted { output, .. } = &event.payload else {
            continue;
        };
        match output.turn_type {
            TurnType::Response => {
                assert!(
                    output.has_patch() || output.content.chars().count() >= 120,
                    "weak response: {:?}",
                    output.content
                );
            }
            TurnType::Objection => {
                assert_eq!(output.speaker_role, Role::Contrarian);
                assert!(output.content.chars().count() >= 80);
            }
            TurnType::Resolution => {
                assert!(!output.reference_ids().is_empty());
            }
            _ => {}
        }
    }
}

#[tokio::test]
async fn accepted_votes_are_followed_by_their_canon_mutation() {
    let events = completed_log().await;
    for team_id in TeamId::BOTH {
        let team = team_events(&events, team_id);
        for (index, event) in team.iter().enumerate() {
            let EventPayload::VoteResult {
                result: RoundOutcome::Accept,
                phase,
                round,
                ..
            } = &event.payload
            else {
                continue;
            };
            // Mock resolutions always carry a patch, so an ACCEPT must be
            // followed by the mutation for the same (phase, round).
            let next = team.get(index + 1).expect("event after ACCEPT");
            match &next.payload {
                EventPayload::CanonPatchApplied {
                    phase: patch_phase,
                    round: patch_round,
                    ..
                } => {
                    assert_eq!((patch_phase, patch_round), (phase, round));
                }
                other => panic!("expected canon_patch_applied after ACCEPT, got {}", other.kind()),
            }
        }
    }
}

#[tokio::test]
async fn applied_patches_respect_phase_write_scopes() {
    let events = completed_log().await;
    for event in &events {
        let EventPayload::CanonPatchApplied { phase, patch, .. } = &event.payload else {
            continue;
        };
        let prefixes = rules::allowed_patch_prefixes(*phase);
        for op in patch {
            assert!(
                rules::path_allowed(op.path(), prefixes),
                "phase {phase} admitted {}",
                op.path()
            );
        }
    }
}

#[tokio::test]
async fn event_listing_is_replay_deterministic() {
    let harness = Harness::new(MockProvider::new()).await;
    let (match_id, events) = harness.run_match(99, 1).await;

    for after in [0i64, 1, 10, 100, events.len() as i64] {
        let tail = harness.store.list_events(match_id, after).await.unwrap();
        let expected: Vec<i64> = events
            .iter()
            .map(|e| e.seq)
            .filter(|seq| *seq > after)
            .collect();
        assert_eq!(tail.iter().map(|e| e.seq).collect::<Vec<_>>(), expected);
    }
}
