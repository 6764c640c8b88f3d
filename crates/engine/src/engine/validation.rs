//! Discourse-rule validation of a TurnOutput in context.
//!
//! Returns every violation so the repair loop can hand the full list back
//! to the provider.

use std::fmt;

use worldbuild_domain::{Role, TurnOutput, TurnType, VoteChoice};

use crate::engine::canon::CanonStore;
use crate::engine::rules;
use crate::infrastructure::ports::TurnSpec;

pub const MIN_RESPONSE_CHARS: usize = 120;
pub const MIN_OBJECTION_CHARS: usize = 80;

/// Closed set of trivial affirmations forbidden as a whole RESPONSE.
const TRIVIAL_AFFIRMATIONS: &[&str] = &["+1", "agree", "sounds good", "yes", "lgtm"];

/// A single rule violation: wire kind code plus a human message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub kind: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// One emitted turn, as remembered for alternation and reference checks.
#[derive(Debug, Clone)]
pub struct TranscriptTurn {
    pub turn_id: String,
    pub role: Role,
    pub turn_type: TurnType,
    pub phase: u8,
}

/// Validate a turn output against the active rules. Empty result = ok.
pub fn validate_turn(
    output: &TurnOutput,
    spec: &TurnSpec,
    canon: &CanonStore,
    transcript: &[TranscriptTurn],
) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    // Rule 1: structural schema. Typed parsing already happened in the
    // adapter; what remains is content presence.
    if output.content.trim().is_empty() {
        errors.push(ValidationError::new("schema", "/content: must not be empty"));
    }

    // Rule 2: role/turn consistency with the turn spec.
    if output.speaker_role != spec.role {
        errors.push(ValidationError::new(
            "role_mismatch",
            format!(
                "/speaker_role: expected {}, got {}",
                spec.role, output.speaker_role
            ),
        ));
    }
    if output.turn_type != spec.turn_type {
        errors.push(ValidationError::new(
            "turn_type_mismatch",
            format!(
                "/turn_type: expected {}, got {}",
                spec.turn_type, output.turn_type
            ),
        ));
    }
    if !rules::is_role_allowed(spec.role, spec.turn_type) {
        errors.push(ValidationError::new(
            "role_mismatch",
            format!("<root>: role {} may not take a {} turn", spec.role, spec.turn_type),
        ));
    }

    match spec.turn_type {
        // Rule 3: no pure agreement.
        TurnType::Response => {
            if !output.has_patch() {
                let content = output.content.trim();
                if is_trivial_affirmation(content) {
                    errors.push(ValidationError::new(
                        "trivial_response",
                        "/content: trivial affirmations are forbidden",
                    ));
                } else if content.chars().count() < MIN_RESPONSE_CHARS {
                    errors.push(ValidationError::new(
                        "trivial_response",
                        format!(
                            "/content: a response without a canon_patch needs at least {MIN_RESPONSE_CHARS} characters"
                        ),
                    ));
                }
            }
        }
        // Rule 4: objections must be substantive.
        TurnType::Objection => {
            if output.content.trim().chars().count() < MIN_OBJECTION_CHARS {
                errors.push(ValidationError::new(
                    "objection_too_vague",
                    format!(
                        "/content: an objection needs at least {MIN_OBJECTION_CHARS} characters naming a specific concern"
                    ),
                ));
            }
        }
        // Rule 5: synthesizer traceability.
        TurnType::Resolution => {
            let refs = output.reference_ids();
            if refs.is_empty() {
                errors.push(ValidationError::new(
                    "missing_references",
                    "/references: a resolution must reference at least one prior turn",
                ));
            } else {
                for reference in refs {
                    if !transcript.iter().any(|t| &t.turn_id == reference) {
                        errors.push(ValidationError::new(
                            "unknown_reference",
                            format!("/references: '{reference}' is not a prior turn id"),
                        ));
                    }
                }
                if !refs.iter().any(|r| output.content.contains(r.as_str())) {
                    errors.push(ValidationError::new(
                        "missing_references",
                        "/content: must mention at least one referenced turn id",
                    ));
                }
            }
        }
        // Rule 6: proposer alternation within the phase.
        TurnType::Proposal => {
            let prior = transcript
                .iter()
                .rev()
                .find(|t| t.turn_type == TurnType::Proposal && t.phase == spec.phase);
            if let Some(prior) = prior {
                if prior.role == spec.role {
                    errors.push(ValidationError::new(
                        "proposer_alternation",
                        format!(
                            "/speaker_role: {} proposed the previous round of this phase",
                            spec.role
                        ),
                    ));
                }
            }
        }
        // Rule 8: votes carry a choice; amendments carry a summary.
        TurnType::Vote => match &output.vote {
            None => errors.push(ValidationError::new(
                "vote_missing_choice",
                "/vote: a vote turn must carry a ballot",
            )),
            Some(vote) => {
                if vote.choice == VoteChoice::Amend
                    && vote
                        .amendment_summary
                        .as_deref()
                        .map(str::trim)
                        .unwrap_or("")
                        .is_empty()
                {
                    errors.push(ValidationError::new(
                        "missing_amendment_summary",
                        "/vote/amendment_summary: required when voting AMEND",
                    ));
                }
            }
        },
    }

    // Rule 7: phase write restrictions, delegated to a canon dry-run.
    if output.has_patch() {
        if let Err(e) = canon.dry_run(output.patch_ops(), spec.phase) {
            errors.push(ValidationError::new(e.kind(), e.to_string()));
        }
    }

    errors
}

fn is_trivial_affirmation(content: &str) -> bool {
    let normalized = content
        .trim()
        .trim_end_matches(['.', '!'])
        .trim()
        .to_lowercase();
    TRIVIAL_AFFIRMATIONS.contains(&normalized.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use worldbuild_domain::{Challenge, PatchOp, TeamId, TurnVote};

    fn challenge() -> Challenge {
        Challenge {
            seed: 42,
            tier: 1,
            biome_setting: "volcanic archipelago".into(),
            inhabitants: "posthuman monks".into(),
            twist_constraint: "light is sacred and rationed".into(),
        }
    }

    fn store() -> CanonStore {
        CanonStore::init(TeamId::A, &challenge()).0
    }

    fn spec(role: Role, turn_type: TurnType, phase: u8) -> TurnSpec {
        TurnSpec {
            role,
            turn_type,
            phase,
            round: 1,
            allowed_patch_prefixes: rules::allowed_patch_prefixes(phase)
                .iter()
                .map(|s| s.to_string())
                .collect(),
            expected_references: vec![],
            pending_patch: None,
            proposer_hint: None,
            tiebreak: false,
            repair: None,
            attempt: 0,
        }
    }

    fn output(role: Role, turn_type: TurnType, content: &str) -> TurnOutput {
        TurnOutput {
            speaker_role: role,
            turn_type,
            content: content.into(),
            canon_patch: None,
            references: None,
            vote: None,
        }
    }

    fn long_text(len: usize) -> String {
        "A concrete mechanism with visible consequences. ".repeat(1 + len / 48)
    }

    #[test]
    fn role_mismatch_is_flagged() {
        let out = output(Role::Lorekeeper, TurnType::Objection, &long_text(100));
        let errors = validate_turn(
            &out,
            &spec(Role::Contrarian, TurnType::Objection, 1),
            &store(),
            &[],
        );
        assert!(errors.iter().any(|e| e.kind == "role_mismatch"));
    }

    #[test]
    fn trivial_response_is_rejected() {
        for content in ["+1", "Agree.", "SOUNDS GOOD", "yes", "lgtm!"] {
            let out = output(Role::Architect, TurnType::Response, content);
            let errors = validate_turn(
                &out,
                &spec(Role::Architect, TurnType::Response, 1),
                &store(),
                &[],
            );
            assert!(
                errors.iter().any(|e| e.kind == "trivial_response"),
                "expected rejection for {content:?}"
            );
        }
    }

    #[test]
    fn short_response_without_patch_is_rejected() {
        let out = output(Role::Architect, TurnType::Response, "Add a ritual.");
        let errors = validate_turn(
            &out,
            &spec(Role::Architect, TurnType::Response, 1),
            &store(),
            &[],
        );
        assert!(errors.iter().any(|e| e.kind == "trivial_response"));
    }

    #[test]
    fn short_response_with_patch_passes() {
        let mut out = output(Role::Architect, TurnType::Response, "Adjusting the name.");
        out.canon_patch = Some(vec![PatchOp::Replace {
            path: "/world_name".into(),
            value: json!("Azure Haven"),
        }]);
        let errors = validate_turn(
            &out,
            &spec(Role::Architect, TurnType::Response, 1),
            &store(),
            &[],
        );
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    }

    #[test]
    fn long_response_passes() {
        let out = output(Role::Architect, TurnType::Response, &long_text(140));
        let errors = validate_turn(
            &out,
            &spec(Role::Architect, TurnType::Response, 1),
            &store(),
            &[],
        );
        assert!(errors.is_empty());
    }

    #[test]
    fn vague_objection_is_rejected() {
        let out = output(Role::Contrarian, TurnType::Objection, "Seems off.");
        let errors = validate_turn(
            &out,
            &spec(Role::Contrarian, TurnType::Objection, 1),
            &store(),
            &[],
        );
        assert!(errors.iter().any(|e| e.kind == "objection_too_vague"));
    }

    #[test]
    fn resolution_requires_known_mentioned_reference() {
        let transcript = vec![TranscriptTurn {
            turn_id: "A-1-1-1".into(),
            role: Role::Architect,
            turn_type: TurnType::Proposal,
            phase: 1,
        }];

        let mut out = output(
            Role::Synthesizer,
            TurnType::Resolution,
            "Resolution: merging A-1-1-1 with the objection.",
        );
        out.references = Some(vec!["A-1-1-1".into()]);
        let errors = validate_turn(
            &out,
            &spec(Role::Synthesizer, TurnType::Resolution, 1),
            &store(),
            &transcript,
        );
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");

        // Missing references entirely.
        let bare = output(Role::Synthesizer, TurnType::Resolution, "Resolution.");
        let errors = validate_turn(
            &bare,
            &spec(Role::Synthesizer, TurnType::Resolution, 1),
            &store(),
            &transcript,
        );
        assert!(errors.iter().any(|e| e.kind == "missing_references"));

        // Reference to a turn that never happened.
        let mut ghost = out.clone();
        ghost.references = Some(vec!["A-9-9-9".into()]);
        ghost.content = "Resolution: merging A-9-9-9.".into();
        let errors = validate_turn(
            &ghost,
            &spec(Role::Synthesizer, TurnType::Resolution, 1),
            &store(),
            &transcript,
        );
        assert!(errors.iter().any(|e| e.kind == "unknown_reference"));

        // References present but never mentioned in the content.
        let mut unmentioned = out.clone();
        unmentioned.content = "Resolution: merging things.".into();
        let errors = validate_turn(
            &unmentioned,
            &spec(Role::Synthesizer, TurnType::Resolution, 1),
            &store(),
            &transcript,
        );
        assert!(errors.iter().any(|e| e.kind == "missing_references"));
    }

    #[test]
    fn consecutive_proposers_must_differ() {
        let transcript = vec![TranscriptTurn {
            turn_id: "A-1-1-1".into(),
            role: Role::Architect,
            turn_type: TurnType::Proposal,
            phase: 1,
        }];
        let out = output(Role::Architect, TurnType::Proposal, "Proposal again.");
        let errors = validate_turn(
            &out,
            &spec(Role::Architect, TurnType::Proposal, 1),
            &store(),
            &transcript,
        );
        assert!(errors.iter().any(|e| e.kind == "proposer_alternation"));

        // A prior proposal in another phase does not constrain this one.
        let cross_phase = vec![TranscriptTurn {
            turn_id: "A-1-3-9".into(),
            role: Role::Architect,
            turn_type: TurnType::Proposal,
            phase: 1,
        }];
        let out2 = output(Role::Architect, TurnType::Proposal, "New phase proposal.");
        let errors = validate_turn(
            &out2,
            &spec(Role::Architect, TurnType::Proposal, 2),
            &store(),
            &cross_phase,
        );
        assert!(errors.is_empty());
    }

    #[test]
    fn out_of_phase_patch_is_rejected_via_dry_run() {
        let mut out = output(Role::Architect, TurnType::Proposal, "Proposal with patch.");
        out.canon_patch = Some(vec![PatchOp::Replace {
            path: "/tension/conflict".into(),
            value: json!("too early"),
        }]);
        let errors = validate_turn(
            &out,
            &spec(Role::Architect, TurnType::Proposal, 1),
            &store(),
            &[],
        );
        assert!(errors.iter().any(|e| e.kind == "patch_rejected_phase"));
    }

    #[test]
    fn amend_vote_needs_summary() {
        let mut out = output(Role::Lorekeeper, TurnType::Vote, "Vote: AMEND");
        out.vote = Some(TurnVote {
            choice: VoteChoice::Amend,
            amendment_summary: None,
        });
        let errors = validate_turn(
            &out,
            &spec(Role::Lorekeeper, TurnType::Vote, 2),
            &store(),
            &[],
        );
        assert!(errors.iter().any(|e| e.kind == "missing_amendment_summary"));

        let mut missing = output(Role::Lorekeeper, TurnType::Vote, "Vote:");
        missing.vote = None;
        let errors = validate_turn(
            &missing,
            &spec(Role::Lorekeeper, TurnType::Vote, 2),
            &store(),
            &[],
        );
        assert!(errors.iter().any(|e| e.kind == "vote_missing_choice"));
    }
}
