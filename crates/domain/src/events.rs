//! The append-only match event log's record types.
//!
//! Every observable fact about a match is one of these records; derived
//! views (current canon, artifacts) are folds over them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::challenge::Challenge;
use crate::ids::MatchId;
use crate::patch::PatchOp;
use crate::prompt_pack::PromptPack;
use crate::team::TeamId;
use crate::turn::TurnOutput;

/// Outcome of a round's vote tally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundOutcome {
    Accept,
    Amend,
    Reject,
    Deadlock,
}

/// Per-choice vote counts for a round. Abstentions come from abandoned
/// turns; they count as REJECT only for the rejection threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    #[serde(rename = "ACCEPT")]
    pub accept: u8,
    #[serde(rename = "AMEND")]
    pub amend: u8,
    #[serde(rename = "REJECT")]
    pub reject: u8,
    #[serde(rename = "ABSTAIN")]
    pub abstain: u8,
}

/// The type-specific payload of a match event, serialized on the wire as
/// `{"type": ..., "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    MatchCreated {
        seed: i64,
        tier: u8,
    },
    ChallengeRevealed(Challenge),
    PhaseStarted {
        phase: u8,
        round_count: u8,
    },
    CanonInitialized {
        canon: Value,
        canon_hash: String,
    },
    TurnEmitted {
        phase: u8,
        round: u8,
        turn_id: String,
        output: TurnOutput,
    },
    TurnValidationFailed {
        phase: u8,
        round: u8,
        turn_id: String,
        errors: Vec<String>,
    },
    VoteResult {
        phase: u8,
        round: u8,
        result: RoundOutcome,
        tally: VoteTally,
    },
    CanonPatchApplied {
        phase: u8,
        round: u8,
        turn_id: String,
        patch: Vec<PatchOp>,
        canon_before_hash: String,
        canon_after_hash: String,
    },
    PromptPackGenerated {
        prompt_pack: PromptPack,
    },
    MatchCompleted {
        canon_hash_a: String,
        canon_hash_b: String,
    },
    MatchFailed {
        error: String,
    },
}

impl EventPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::MatchCreated { .. } => "match_created",
            EventPayload::ChallengeRevealed(_) => "challenge_revealed",
            EventPayload::PhaseStarted { .. } => "phase_started",
            EventPayload::CanonInitialized { .. } => "canon_initialized",
            EventPayload::TurnEmitted { .. } => "turn_emitted",
            EventPayload::TurnValidationFailed { .. } => "turn_validation_failed",
            EventPayload::VoteResult { .. } => "vote_result",
            EventPayload::CanonPatchApplied { .. } => "canon_patch_applied",
            EventPayload::PromptPackGenerated { .. } => "prompt_pack_generated",
            EventPayload::MatchCompleted { .. } => "match_completed",
            EventPayload::MatchFailed { .. } => "match_failed",
        }
    }
}

/// One immutable record in a match's append-only log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchEvent {
    pub id: String,
    pub seq: i64,
    pub ts: DateTime<Utc>,
    pub match_id: MatchId,
    pub team_id: Option<TeamId>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl MatchEvent {
    /// Terminal events end live streams.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.payload,
            EventPayload::MatchCompleted { .. } | EventPayload::MatchFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_wire_format_matches_table() {
        let event = MatchEvent {
            id: "m:3".into(),
            seq: 3,
            ts: "2026-08-02T10:00:00Z".parse().unwrap(),
            match_id: MatchId::new(),
            team_id: Some(TeamId::A),
            payload: EventPayload::PhaseStarted {
                phase: 1,
                round_count: 3,
            },
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "phase_started");
        assert_eq!(value["data"], json!({"phase": 1, "round_count": 3}));
        assert_eq!(value["team_id"], "A");
        assert_eq!(value["seq"], 3);

        let back: MatchEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn match_scoped_events_have_null_team() {
        let event = MatchEvent {
            id: "m:1".into(),
            seq: 1,
            ts: Utc::now(),
            match_id: MatchId::new(),
            team_id: None,
            payload: EventPayload::MatchCreated { seed: 42, tier: 1 },
        };
        let value = serde_json::to_value(&event).unwrap();
        assert!(value["team_id"].is_null());
        assert!(!event.is_terminal());
    }

    #[test]
    fn tally_uses_wire_spellings() {
        let tally = VoteTally {
            accept: 3,
            amend: 0,
            reject: 0,
            abstain: 1,
        };
        let value = serde_json::to_value(tally).unwrap();
        assert_eq!(value, json!({"ACCEPT": 3, "AMEND": 0, "REJECT": 0, "ABSTAIN": 1}));
    }

    #[test]
    fn terminal_events_are_flagged() {
        let failed = MatchEvent {
            id: "m:9".into(),
            seq: 9,
            ts: Utc::now(),
            match_id: MatchId::new(),
            team_id: None,
            payload: EventPayload::MatchFailed {
                error: "cancelled".into(),
            },
        };
        assert!(failed.is_terminal());
        assert_eq!(failed.payload.kind(), "match_failed");
    }
}
