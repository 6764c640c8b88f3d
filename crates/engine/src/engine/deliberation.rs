//! Per-team deliberation engine.
//!
//! Drives one team through the phased protocol: rounds of proposal,
//! objection, responses, resolution and vote for phases 1-3, unanimous
//! ratification in phase 4, and the prompt pack in phase 5. Each turn runs
//! a bounded repair loop; abandoned turns degrade the round instead of
//! failing the match.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use worldbuild_domain::{
    EventPayload, PatchOp, Role, RoundOutcome, TeamId, TurnOutput, TurnType, VoteChoice, VoteTally,
};

use crate::engine::canon::CanonStore;
use crate::engine::rules;
use crate::engine::validation::{self, TranscriptTurn};
use crate::infrastructure::ports::{
    ConversationHandle, ProviderError, ProviderPort, RepairContext, StoreError, TurnSpec,
};
use crate::infrastructure::recorder::MatchRecorder;

/// Bounds on the repair loop: 2 repair attempts = 3 provider calls per turn.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_repair_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_repair_attempts: 2,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Phase 4 failed ratification twice. Displays as the wire reason.
    #[error("ratification_failed")]
    RatificationFailed,
    #[error("{0}")]
    Provider(#[from] ProviderError),
    #[error("{0}")]
    Store(#[from] StoreError),
    #[error("internal: {0}")]
    Internal(String),
}

/// How a turn slot ended after the repair loop.
enum TurnOutcome {
    Emitted { turn_id: String, output: TurnOutput },
    Abandoned,
}

pub struct TeamEngine {
    team_id: TeamId,
    match_seed: i64,
    provider: Arc<dyn ProviderPort>,
    recorder: Arc<MatchRecorder>,
    config: EngineConfig,
    canon: CanonStore,
    handle: ConversationHandle,
    transcript: Vec<TranscriptTurn>,
    turn_counter: u32,
    next_proposer: Role,
    reject_hint: Option<String>,
}

impl TeamEngine {
    /// Open the provider conversation, initialize canon, and emit
    /// `canon_initialized`.
    pub async fn start(
        team_id: TeamId,
        match_seed: i64,
        challenge: &worldbuild_domain::Challenge,
        provider: Arc<dyn ProviderPort>,
        recorder: Arc<MatchRecorder>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let (canon, canon_hash) = CanonStore::init(team_id, challenge);
        let handle = provider
            .start_conversation(team_id, match_seed, challenge, canon.current())
            .await?;
        recorder
            .append(
                Some(team_id),
                EventPayload::CanonInitialized {
                    canon: canon.current().clone(),
                    canon_hash,
                },
            )
            .await?;

        Ok(Self {
            team_id,
            match_seed,
            provider,
            recorder,
            config,
            canon,
            handle,
            transcript: Vec::new(),
            turn_counter: 0,
            next_proposer: Role::Architect,
            reject_hint: None,
        })
    }

    pub fn final_hash(&self) -> String {
        self.canon.hash()
    }

    /// Run every round of one phase to completion.
    pub async fn run_phase(&mut self, phase: u8) -> Result<(), EngineError> {
        if phase == 4 {
            return self.run_ratification().await;
        }
        // The first proposer of every phase is the Architect.
        self.next_proposer = Role::Architect;
        for round in 1..=rules::rounds_for_phase(phase) {
            self.run_round(phase, round).await?;
        }
        Ok(())
    }

    /// Phase 5: one neutral provider call over the final canon.
    pub async fn emit_prompt_pack(&mut self) -> Result<(), EngineError> {
        let pack = self
            .provider
            .generate_prompt_pack(self.match_seed, self.team_id, self.canon.current())
            .await?;
        pack.validate().map_err(|errors| {
            EngineError::Internal(format!("prompt pack invalid: {}", errors.join("; ")))
        })?;
        self.recorder
            .append(
                Some(self.team_id),
                EventPayload::PromptPackGenerated { prompt_pack: pack },
            )
            .await?;
        Ok(())
    }

    async fn run_round(&mut self, phase: u8, round: u8) -> Result<(), EngineError> {
        let proposer = self.next_proposer;
        let responder = match proposer {
            Role::Architect => Role::Lorekeeper,
            _ => Role::Architect,
        };
        self.next_proposer = responder;

        let mut abandoned: HashSet<Role> = HashSet::new();
        let mut round_refs: Vec<String> = Vec::new();

        let proposal = self
            .take_turn(phase, round, proposer, TurnType::Proposal, Vec::new(), None, false)
            .await?;
        match proposal {
            TurnOutcome::Emitted { turn_id, .. } => round_refs.push(turn_id),
            TurnOutcome::Abandoned => {
                abandoned.insert(proposer);
            }
        }

        // Mandatory objection, then responses in fixed order.
        let objection = self
            .take_turn(
                phase,
                round,
                Role::Contrarian,
                TurnType::Objection,
                round_refs.clone(),
                None,
                false,
            )
            .await?;
        match objection {
            TurnOutcome::Emitted { turn_id, .. } => round_refs.push(turn_id),
            TurnOutcome::Abandoned => {
                abandoned.insert(Role::Contrarian);
            }
        }

        for role in [responder, Role::Contrarian, Role::Synthesizer] {
            let response = self
                .take_turn(
                    phase,
                    round,
                    role,
                    TurnType::Response,
                    round_refs.clone(),
                    None,
                    false,
                )
                .await?;
            match response {
                TurnOutcome::Emitted { turn_id, .. } => round_refs.push(turn_id),
                TurnOutcome::Abandoned => {
                    abandoned.insert(role);
                }
            }
        }

        let resolution = self
            .take_turn(
                phase,
                round,
                Role::Synthesizer,
                TurnType::Resolution,
                round_refs.clone(),
                None,
                false,
            )
            .await?;

        let (resolution_id, resolution_patch) = match resolution {
            TurnOutcome::Emitted { turn_id, output } => {
                let patch = output.canon_patch.unwrap_or_default();
                (turn_id, patch)
            }
            TurnOutcome::Abandoned => {
                // A failed resolution collapses straight to the deadlock
                // path: no votes are cast.
                let tally = VoteTally {
                    abstain: 4,
                    ..VoteTally::default()
                };
                self.emit_vote_result(phase, round, RoundOutcome::Deadlock, tally)
                    .await?;
                return self.run_tiebreak(phase, round, round_refs, tally).await;
            }
        };
        round_refs.push(resolution_id.clone());

        // Votes by all four roles; roles whose earlier turn was abandoned
        // abstain without a provider call.
        let mut votes: Vec<(Role, Option<TurnOutput>)> = Vec::with_capacity(4);
        for role in Role::ALL {
            if abandoned.contains(&role) {
                votes.push((role, None));
                continue;
            }
            let vote = self
                .take_turn(
                    phase,
                    round,
                    role,
                    TurnType::Vote,
                    vec![resolution_id.clone()],
                    Some(resolution_patch.clone()),
                    false,
                )
                .await?;
            match vote {
                TurnOutcome::Emitted { output, .. } => votes.push((role, Some(output))),
                TurnOutcome::Abandoned => votes.push((role, None)),
            }
        }

        let tally = tally_votes(&votes);
        let outcome = aggregate_votes(&votes, tally);
        self.emit_vote_result(phase, round, outcome, tally).await?;

        match outcome {
            RoundOutcome::Accept | RoundOutcome::Amend => {
                if !resolution_patch.is_empty() {
                    self.apply_patch(phase, round, &resolution_id, resolution_patch)
                        .await?;
                }
            }
            RoundOutcome::Reject => {
                self.record_reject_hint(phase, round);
            }
            RoundOutcome::Deadlock => {
                self.run_tiebreak(phase, round, round_refs, tally).await?;
            }
        }
        Ok(())
    }

    /// The Synthesizer's binding tie-break: a second RESOLUTION whose patch
    /// (or absence of one) decides the round.
    async fn run_tiebreak(
        &mut self,
        phase: u8,
        round: u8,
        round_refs: Vec<String>,
        tally: VoteTally,
    ) -> Result<(), EngineError> {
        let decision = self
            .take_turn(
                phase,
                round,
                Role::Synthesizer,
                TurnType::Resolution,
                round_refs,
                None,
                true,
            )
            .await?;

        match decision {
            TurnOutcome::Emitted { turn_id, output } if output.has_patch() => {
                let patch = output.canon_patch.unwrap_or_default();
                self.emit_vote_result(phase, round, RoundOutcome::Accept, tally)
                    .await?;
                self.apply_patch(phase, round, &turn_id, patch).await?;
            }
            _ => {
                self.emit_vote_result(phase, round, RoundOutcome::Reject, tally)
                    .await?;
                self.record_reject_hint(phase, round);
            }
        }
        Ok(())
    }

    /// Phase 4: a single crystallization resolution that must be ratified
    /// unanimously. One repeat is permitted.
    async fn run_ratification(&mut self) -> Result<(), EngineError> {
        let phase = 4;
        for attempt in 1..=2u8 {
            let round = attempt;
            // The crystallization references the tail of the deliberation.
            let expected_refs: Vec<String> = self
                .transcript
                .last()
                .map(|t| vec![t.turn_id.clone()])
                .unwrap_or_default();

            let resolution = self
                .take_turn(
                    phase,
                    round,
                    Role::Synthesizer,
                    TurnType::Resolution,
                    expected_refs,
                    None,
                    false,
                )
                .await?;

            let (resolution_id, patch) = match resolution {
                TurnOutcome::Emitted { turn_id, output } => {
                    (turn_id, output.canon_patch.unwrap_or_default())
                }
                TurnOutcome::Abandoned => {
                    let tally = VoteTally {
                        abstain: 4,
                        ..VoteTally::default()
                    };
                    self.emit_vote_result(phase, round, RoundOutcome::Reject, tally)
                        .await?;
                    continue;
                }
            };

            let mut votes: Vec<(Role, Option<TurnOutput>)> = Vec::with_capacity(4);
            for role in Role::ALL {
                let vote = self
                    .take_turn(
                        phase,
                        round,
                        role,
                        TurnType::Vote,
                        vec![resolution_id.clone()],
                        Some(patch.clone()),
                        false,
                    )
                    .await?;
                match vote {
                    TurnOutcome::Emitted { output, .. } => votes.push((role, Some(output))),
                    TurnOutcome::Abandoned => votes.push((role, None)),
                }
            }

            let tally = tally_votes(&votes);
            if tally.accept == 4 {
                self.emit_vote_result(phase, round, RoundOutcome::Accept, tally)
                    .await?;
                if !patch.is_empty() {
                    self.apply_patch(phase, round, &resolution_id, patch).await?;
                }
                return Ok(());
            }

            tracing::warn!(
                team_id = %self.team_id,
                attempt,
                ?tally,
                "Ratification vote was not unanimous"
            );
            self.emit_vote_result(phase, round, RoundOutcome::Reject, tally)
                .await?;
        }
        Err(EngineError::RatificationFailed)
    }

    /// One turn slot: provider call, validation, bounded repair.
    async fn take_turn(
        &mut self,
        phase: u8,
        round: u8,
        role: Role,
        turn_type: TurnType,
        expected_references: Vec<String>,
        pending_patch: Option<Vec<PatchOp>>,
        tiebreak: bool,
    ) -> Result<TurnOutcome, EngineError> {
        self.turn_counter += 1;
        let turn_id = format!("{}-{}-{}-{}", self.team_id, phase, round, self.turn_counter);
        let proposer_hint = if turn_type == TurnType::Proposal {
            self.reject_hint.take()
        } else {
            None
        };

        let mut repair: Option<RepairContext> = None;
        for attempt in 0..=self.config.max_repair_attempts {
            let spec = TurnSpec {
                role,
                turn_type,
                phase,
                round,
                allowed_patch_prefixes: rules::allowed_patch_prefixes(phase)
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                expected_references: expected_references.clone(),
                pending_patch: pending_patch.clone(),
                proposer_hint: proposer_hint.clone(),
                tiebreak,
                repair: repair.clone(),
                attempt,
            };

            let generation = match self.provider.generate_turn(&self.handle, &spec).await {
                Ok(generation) => generation,
                Err(e) => {
                    // Adapter retry budget exhausted: a turn failure.
                    tracing::warn!(
                        team_id = %self.team_id,
                        turn_id = %turn_id,
                        error = %e,
                        "Provider exhausted, abandoning turn"
                    );
                    self.recorder
                        .append(
                            Some(self.team_id),
                            EventPayload::TurnValidationFailed {
                                phase,
                                round,
                                turn_id: turn_id.clone(),
                                errors: vec![e.to_string()],
                            },
                        )
                        .await?;
                    return Ok(TurnOutcome::Abandoned);
                }
            };
            self.handle = generation.handle;

            let errors =
                validation::validate_turn(&generation.output, &spec, &self.canon, &self.transcript);
            if errors.is_empty() {
                self.recorder
                    .append(
                        Some(self.team_id),
                        EventPayload::TurnEmitted {
                            phase,
                            round,
                            turn_id: turn_id.clone(),
                            output: generation.output.clone(),
                        },
                    )
                    .await?;
                self.transcript.push(TranscriptTurn {
                    turn_id: turn_id.clone(),
                    role,
                    turn_type,
                    phase,
                });
                return Ok(TurnOutcome::Emitted {
                    turn_id,
                    output: generation.output,
                });
            }

            let error_strings: Vec<String> = errors.iter().map(ToString::to_string).collect();
            if attempt == self.config.max_repair_attempts {
                tracing::warn!(
                    team_id = %self.team_id,
                    turn_id = %turn_id,
                    errors = ?error_strings,
                    "Turn failed validation after all repair attempts"
                );
                self.recorder
                    .append(
                        Some(self.team_id),
                        EventPayload::TurnValidationFailed {
                            phase,
                            round,
                            turn_id: turn_id.clone(),
                            errors: error_strings,
                        },
                    )
                    .await?;
                return Ok(TurnOutcome::Abandoned);
            }

            repair = Some(RepairContext {
                previous_output: generation.output,
                errors: error_strings,
            });
        }
        unreachable!("repair loop always returns")
    }

    async fn apply_patch(
        &mut self,
        phase: u8,
        round: u8,
        turn_id: &str,
        patch: Vec<PatchOp>,
    ) -> Result<(), EngineError> {
        // The patch passed a dry-run at validation time and the canon has
        // not changed since, so failure here is a bug, not a turn fault.
        let applied = self
            .canon
            .apply(&patch, phase)
            .map_err(|e| EngineError::Internal(e.to_string()))?;
        self.recorder
            .append(
                Some(self.team_id),
                EventPayload::CanonPatchApplied {
                    phase,
                    round,
                    turn_id: turn_id.to_string(),
                    patch,
                    canon_before_hash: applied.before_hash,
                    canon_after_hash: applied.after_hash,
                },
            )
            .await?;
        Ok(())
    }

    async fn emit_vote_result(
        &self,
        phase: u8,
        round: u8,
        result: RoundOutcome,
        tally: VoteTally,
    ) -> Result<(), EngineError> {
        self.recorder
            .append(
                Some(self.team_id),
                EventPayload::VoteResult {
                    phase,
                    round,
                    result,
                    tally,
                },
            )
            .await?;
        Ok(())
    }

    fn record_reject_hint(&mut self, phase: u8, round: u8) {
        self.reject_hint = Some(format!(
            "the round {round} resolution in phase {phase} was rejected; \
             the next proposal must address the gap"
        ));
    }
}

fn tally_votes(votes: &[(Role, Option<TurnOutput>)]) -> VoteTally {
    let mut tally = VoteTally::default();
    for (_, output) in votes {
        match output.as_ref().and_then(|o| o.vote.as_ref()) {
            Some(vote) => match vote.choice {
                VoteChoice::Accept => tally.accept += 1,
                VoteChoice::Amend => tally.amend += 1,
                VoteChoice::Reject => tally.reject += 1,
            },
            None => tally.abstain += 1,
        }
    }
    tally
}

/// Vote aggregation precedence per the deliberation protocol. Abstentions
/// count as rejections only for the rejection threshold.
fn aggregate_votes(votes: &[(Role, Option<TurnOutput>)], tally: VoteTally) -> RoundOutcome {
    if tally.accept >= 3 {
        return RoundOutcome::Accept;
    }
    if tally.amend >= 2 && has_shared_amendment(votes) {
        return RoundOutcome::Amend;
    }
    if tally.reject + tally.abstain >= 2 {
        return RoundOutcome::Reject;
    }
    RoundOutcome::Deadlock
}

/// Whether at least two amenders supplied the same amendment text
/// (trimmed, case-insensitive).
fn has_shared_amendment(votes: &[(Role, Option<TurnOutput>)]) -> bool {
    let mut counts: HashMap<String, u8> = HashMap::new();
    for (_, output) in votes {
        let Some(vote) = output.as_ref().and_then(|o| o.vote.as_ref()) else {
            continue;
        };
        if vote.choice != VoteChoice::Amend {
            continue;
        }
        let Some(summary) = vote.amendment_summary.as_deref() else {
            continue;
        };
        let key = summary.trim().to_lowercase();
        if key.is_empty() {
            continue;
        }
        let count = counts.entry(key).or_insert(0);
        *count += 1;
        if *count >= 2 {
            return true;
        }
    }
    false
}
