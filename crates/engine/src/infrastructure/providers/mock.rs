//! In-tree mock provider.
//!
//! Returns fixture outputs derived deterministically from the turn
//! coordinates, so full matches run without any network dependency.
//! A fault script supports deterministic error injection: schema
//! violations, timeouts, phase-violating patches, and vote-tally shaping.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use worldbuild_domain::{
    team_prefix, Challenge, ImagePrompt, PatchOp, PromptPack, Role, TeamId, TurnOutput, TurnType,
    TurnVote, VoteChoice,
};

use crate::infrastructure::ports::{
    ConversationHandle, ProviderError, ProviderPort, TokenUsage, TurnGeneration, TurnSpec,
};

/// Where a fault applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FaultTarget {
    pub team_id: Option<TeamId>,
    pub phase: u8,
    pub round: u8,
    pub role: Role,
    pub turn_type: TurnType,
}

#[derive(Debug, Clone)]
pub enum FaultKind {
    /// Fail the first `calls` adapter calls for the slot with a
    /// schema-violation error (output did not parse as TurnOutput).
    SchemaViolation { calls: u32 },
    /// Fail the first `calls` adapter calls for the slot with a timeout.
    Timeout { calls: u32 },
    /// Always emit a patch rooted at `path`, regardless of phase scope.
    /// Repair attempts return the same output.
    ForcedPatchPath { path: String },
    /// Override the ballot for a VOTE slot.
    VoteChoice {
        choice: VoteChoice,
        amendment_summary: Option<String>,
    },
}

#[derive(Debug, Clone)]
struct Fault {
    target: FaultTarget,
    kind: FaultKind,
}

/// One recorded adapter call, for test assertions.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub team_id: TeamId,
    pub phase: u8,
    pub round: u8,
    pub role: Role,
    pub turn_type: TurnType,
    pub attempt: u32,
}

#[derive(Default)]
struct MockState {
    faults: Vec<Fault>,
    calls: Vec<CallRecord>,
    call_counts: HashMap<(TeamId, u8, u8, Role, TurnType), u32>,
}

pub struct MockProvider {
    state: Mutex<MockState>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn with_fault(self, target: FaultTarget, kind: FaultKind) -> Self {
        self.state
            .lock()
            .expect("mock state")
            .faults
            .push(Fault { target, kind });
        self
    }

    /// Every `generate_turn` call made so far, in order.
    pub fn calls(&self) -> Vec<CallRecord> {
        self.state.lock().expect("mock state").calls.clone()
    }

    pub fn calls_for(&self, phase: u8, round: u8, role: Role, turn_type: TurnType) -> u32 {
        self.calls()
            .iter()
            .filter(|c| {
                c.phase == phase && c.round == round && c.role == role && c.turn_type == turn_type
            })
            .count() as u32
    }

    fn fault_for(&self, team_id: TeamId, spec: &TurnSpec) -> Option<FaultKind> {
        let state = self.state.lock().expect("mock state");
        state
            .faults
            .iter()
            .find(|fault| {
                fault.target.team_id.map(|t| t == team_id).unwrap_or(true)
                    && fault.target.phase == spec.phase
                    && fault.target.round == spec.round
                    && fault.target.role == spec.role
                    && fault.target.turn_type == spec.turn_type
            })
            .map(|fault| fault.kind.clone())
    }

    /// Record the call and return how many calls this slot has seen
    /// (including this one).
    fn record_call(&self, team_id: TeamId, spec: &TurnSpec) -> u32 {
        let mut state = self.state.lock().expect("mock state");
        state.calls.push(CallRecord {
            team_id,
            phase: spec.phase,
            round: spec.round,
            role: spec.role,
            turn_type: spec.turn_type,
            attempt: spec.attempt,
        });
        let counter = state
            .call_counts
            .entry((team_id, spec.phase, spec.round, spec.role, spec.turn_type))
            .or_insert(0);
        *counter += 1;
        *counter
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn stable_rng(parts: &Value) -> StdRng {
    let mut hasher = Sha256::new();
    hasher.update(worldbuild_domain::canonical_json(parts).as_bytes());
    let digest = hasher.finalize();
    let seed = u64::from_be_bytes(digest[..8].try_into().expect("8 bytes"));
    StdRng::seed_from_u64(seed)
}

fn handle_challenge(handle: &ConversationHandle) -> Result<Challenge, ProviderError> {
    serde_json::from_value(handle.data["challenge"].clone())
        .map_err(|e| ProviderError::SchemaViolation(format!("mock handle corrupt: {e}")))
}

#[async_trait]
impl ProviderPort for MockProvider {
    async fn start_conversation(
        &self,
        team_id: TeamId,
        match_seed: i64,
        challenge: &Challenge,
        initial_canon: &Value,
    ) -> Result<ConversationHandle, ProviderError> {
        Ok(ConversationHandle {
            provider: "mock".to_string(),
            team_id,
            data: json!({
                "match_seed": match_seed,
                "challenge": challenge,
                "initial_canon": initial_canon,
                "turn_count": 0,
            }),
        })
    }

    async fn generate_turn(
        &self,
        handle: &ConversationHandle,
        spec: &TurnSpec,
    ) -> Result<TurnGeneration, ProviderError> {
        let team_id = handle.team_id;
        let calls_so_far = self.record_call(team_id, spec);
        let fault = self.fault_for(team_id, spec);

        match &fault {
            Some(FaultKind::SchemaViolation { calls }) if calls_so_far <= *calls => {
                return Err(ProviderError::SchemaViolation(
                    "output missing required field 'speaker_role'".to_string(),
                ));
            }
            Some(FaultKind::Timeout { calls }) if calls_so_far <= *calls => {
                return Err(ProviderError::Timeout("mock deadline exceeded".to_string()));
            }
            _ => {}
        }

        let challenge = handle_challenge(handle)?;
        let match_seed = handle.data["match_seed"].as_i64().unwrap_or(0);
        let mut rng = stable_rng(&json!([
            "mock-llm",
            match_seed,
            team_id,
            spec.phase,
            spec.round,
            spec.role,
            spec.turn_type,
            spec.attempt,
        ]));

        let mut output = match spec.turn_type {
            TurnType::Proposal => proposal_turn(&mut rng, team_id, &challenge, spec),
            TurnType::Objection => objection_turn(&mut rng, spec),
            TurnType::Response => response_turn(&mut rng, spec),
            TurnType::Resolution => resolution_turn(&mut rng, team_id, &challenge, spec),
            TurnType::Vote => vote_turn(spec),
        };

        match fault {
            Some(FaultKind::ForcedPatchPath { path }) => {
                output.canon_patch = Some(vec![PatchOp::Replace {
                    path,
                    value: json!("a change the current phase does not permit"),
                }]);
            }
            Some(FaultKind::VoteChoice {
                choice,
                amendment_summary,
            }) if spec.turn_type == TurnType::Vote => {
                output.content = format!("Vote: {choice}");
                output.vote = Some(TurnVote {
                    choice,
                    amendment_summary: amendment_summary.or_else(|| {
                        (choice == VoteChoice::Amend)
                            .then(|| "Sharpen the stakes with a specific visible tell.".to_string())
                    }),
                });
            }
            _ => {}
        }

        let mut data = handle.data.clone();
        data["turn_count"] = json!(data["turn_count"].as_i64().unwrap_or(0) + 1);

        Ok(TurnGeneration {
            output,
            handle: ConversationHandle {
                provider: "mock".to_string(),
                team_id,
                data,
            },
            usage: Some(TokenUsage {
                prompt_tokens: 0,
                completion_tokens: 0,
            }),
        })
    }

    async fn generate_prompt_pack(
        &self,
        match_seed: i64,
        team_id: TeamId,
        canon: &Value,
    ) -> Result<PromptPack, ProviderError> {
        let mut rng = stable_rng(&json!(["mock-prompt-pack", match_seed, team_id, canon]));

        let world_name = canon["world_name"]
            .as_str()
            .unwrap_or(team_prefix(team_id))
            .to_string();
        let mood = canon["aesthetic_mood"]
            .as_str()
            .unwrap_or("atmospheric, cinematic")
            .to_string();
        let governing_logic = canon["governing_logic"].as_str().unwrap_or("").to_string();

        let style_tag = *[
            "cinematic concept art, ultra-detailed, volumetric lighting",
            "painterly matte painting, moody atmosphere, high detail",
            "photoreal, wide dynamic range, dramatic lighting",
            "stylized realism, rich texture, soft haze",
        ]
        .choose(&mut rng)
        .expect("non-empty pool");

        let suffix =
            format!("Style: {style_tag}. Mood: {mood}. Governing logic visible: {governing_logic}");

        let hero = canon["hero_image_description"].as_str().unwrap_or("");
        let empty = Vec::new();
        let landmarks = canon["landmarks"].as_array().unwrap_or(&empty);

        let triptych = (0..3)
            .map(|idx| {
                let landmark = landmarks.get(idx).cloned().unwrap_or(Value::Null);
                let name = landmark["name"]
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Landmark {}", idx + 1));
                ImagePrompt {
                    title: format!("Landmark - {name}"),
                    prompt: format!(
                        "Square composition of {name}. {} Key visual: {}. Significance: {}. {suffix}",
                        landmark["description"].as_str().unwrap_or(""),
                        landmark["visual_key"].as_str().unwrap_or(""),
                        landmark["significance"].as_str().unwrap_or(""),
                    ),
                    negative_prompt: None,
                    aspect_ratio: Some("1:1".to_string()),
                }
            })
            .collect();

        Ok(PromptPack {
            hero_image: ImagePrompt {
                title: format!("Hero Image - {world_name}"),
                prompt: format!("{hero}\n{suffix}").trim().to_string(),
                negative_prompt: None,
                aspect_ratio: Some("16:9".to_string()),
            },
            landmark_triptych: triptych,
            inhabitant_portrait: ImagePrompt {
                title: format!("Inhabitant Portrait - {world_name}"),
                prompt: format!(
                    "Portrait of an inhabitant of {world_name} in context. Appearance: {}. \
                     Culture: {}. Relationship to place: {}. {suffix}",
                    canon["inhabitants"]["appearance"].as_str().unwrap_or(""),
                    canon["inhabitants"]["culture_snapshot"].as_str().unwrap_or(""),
                    canon["inhabitants"]["relationship_to_place"]
                        .as_str()
                        .unwrap_or(""),
                ),
                negative_prompt: None,
                aspect_ratio: Some("3:4".to_string()),
            },
            tension_snapshot: ImagePrompt {
                title: format!("Tension Snapshot - {world_name}"),
                prompt: format!(
                    "A narrative moment in {world_name} showing the central tension. Conflict: {}. \
                     Stakes: {}. Visible manifestation: {}. {suffix}",
                    canon["tension"]["conflict"].as_str().unwrap_or(""),
                    canon["tension"]["stakes"].as_str().unwrap_or(""),
                    canon["tension"]["visual_manifestation"].as_str().unwrap_or(""),
                ),
                negative_prompt: None,
                aspect_ratio: Some("16:9".to_string()),
            },
        })
    }
}

// =============================================================================
// Fixture generators
// =============================================================================

fn adjectives(rng: &mut StdRng) -> String {
    let mut words = vec![
        "windswept",
        "luminous",
        "austere",
        "verdigris",
        "salt-stung",
        "hushed",
        "cathedralic",
        "labyrinthine",
        "brine-sweet",
        "rusted",
        "glasslike",
        "emberlit",
    ];
    words.shuffle(rng);
    let count = rng.gen_range(3..=5);
    words[..count].join(", ")
}

fn proposal_patch(
    rng: &mut StdRng,
    team_id: TeamId,
    challenge: &Challenge,
    spec: &TurnSpec,
) -> (String, Vec<PatchOp>) {
    let team = team_prefix(team_id);
    match spec.phase {
        1 => {
            let world_name = format!(
                "{team} {}",
                ["Bastion", "Haven", "Sanctum", "Spires", "Archive"]
                    .choose(rng)
                    .expect("pool")
            );
            let governing_logic = *[
                "Light is sacred and rationed; every public act consumes measured radiance.",
                "All structures must be temporary; permanence is treated as a social crime.",
                "Vertical space is status; altitude dictates law, diet, and dialect.",
                "The founders are alive but sleeping; citizens interpret their dreams as edicts.",
            ]
            .choose(rng)
            .expect("pool");
            let mood = adjectives(rng);
            let patch = vec![
                PatchOp::Replace {
                    path: "/world_name".into(),
                    value: json!(world_name),
                },
                PatchOp::Replace {
                    path: "/governing_logic".into(),
                    value: json!(governing_logic),
                },
                PatchOp::Replace {
                    path: "/aesthetic_mood".into(),
                    value: json!(mood),
                },
                PatchOp::Replace {
                    path: "/inhabitants/appearance".into(),
                    value: json!(format!(
                        "{} {}",
                        ["lithe", "scarred", "mask-wearing", "ink-stained"]
                            .choose(rng)
                            .expect("pool"),
                        challenge.inhabitants
                    )),
                },
                PatchOp::Replace {
                    path: "/inhabitants/culture_snapshot".into(),
                    value: json!(format!(
                        "They trade in {} and speak in ritual shorthand to honor the rule.",
                        ["songs", "salt", "ink", "hours"].choose(rng).expect("pool")
                    )),
                },
                PatchOp::Replace {
                    path: "/inhabitants/relationship_to_place".into(),
                    value: json!(
                        "They treat the environment as a living ledger; every change must be paid back later."
                    ),
                },
            ];
            let content = format!(
                "Proposal: name the place **{world_name}** and center it on: {governing_logic} Mood: {mood}."
            );
            (content, patch)
        }
        2 => {
            let index = (spec.round - 1).min(2) as usize;
            let name = format!(
                "{team} {}",
                ["Steps", "Furnace", "Grotto", "Causeway", "Aviary"]
                    .choose(rng)
                    .expect("pool")
            );
            let patch = vec![
                PatchOp::Replace {
                    path: format!("/landmarks/{index}/name"),
                    value: json!(name),
                },
                PatchOp::Replace {
                    path: format!("/landmarks/{index}/description"),
                    value: json!(format!(
                        "A {} landmark shaped by the rule: {}.",
                        challenge.biome_setting,
                        ["echoing", "knife-edged", "slowly migrating", "lantern-lit"]
                            .choose(rng)
                            .expect("pool")
                    )),
                },
                PatchOp::Replace {
                    path: format!("/landmarks/{index}/significance"),
                    value: json!(*[
                        "It is where disputes are settled by ritual measurements.",
                        "It stores the community's most expensive resources.",
                        "It marks the boundary between legal and taboo behavior.",
                    ]
                    .choose(rng)
                    .expect("pool")),
                },
                PatchOp::Replace {
                    path: format!("/landmarks/{index}/visual_key"),
                    value: json!(*[
                        "floating lanterns tethered by braided wire",
                        "obsidian tiles that drink reflections",
                        "wind-bells made of bone-white glass",
                        "a spiral of red moss glowing in the dark",
                    ]
                    .choose(rng)
                    .expect("pool")),
                },
            ];
            let content = format!(
                "Proposal: define landmark {} as **{name}** tied to the governing logic.",
                index + 1
            );
            (content, patch)
        }
        3 => {
            let patch = vec![
                PatchOp::Replace {
                    path: "/tension/conflict".into(),
                    value: json!(*[
                        "A black-market of forbidden permanence spreads beneath the official rituals.",
                        "The ration of sacred light is shrinking, and no one agrees why.",
                        "Old dream-edicts contradict new survival needs, splitting households.",
                    ]
                    .choose(rng)
                    .expect("pool")),
                },
                PatchOp::Replace {
                    path: "/tension/stakes".into(),
                    value: json!(
                        "If unresolved, the rule that holds the city together will become a weapon instead of a compass."
                    ),
                },
                PatchOp::Replace {
                    path: "/tension/visual_manifestation".into(),
                    value: json!(*[
                        "public lamps flicker during arguments, casting long, accusatory shadows",
                        "temporary buildings sag as if exhausted, then are torn down overnight",
                        "secret stairways bloom with illegal carvings that refuse to erode",
                    ]
                    .choose(rng)
                    .expect("pool")),
                },
            ];
            (
                "Proposal: inject a tension that makes the rule unstable in a visible way.".into(),
                patch,
            )
        }
        _ => {
            let hero = format!(
                "A wide establishing shot of the {team} realm in a {}, with {} going about their \
                 daily rituals. The twist constraint '{}' manifests in the architecture and \
                 lighting. Foreground figures reveal culture through gesture, tools, and dress; \
                 the key tension is visible in the scene.",
                challenge.biome_setting, challenge.inhabitants, challenge.twist_constraint
            );
            let patch = vec![PatchOp::Replace {
                path: "/hero_image_description".into(),
                value: json!(hero),
            }];
            (
                "Proposal: crystallize the final spec with a hero image description that embodies the canon."
                    .into(),
                patch,
            )
        }
    }
}

fn proposal_turn(
    rng: &mut StdRng,
    team_id: TeamId,
    challenge: &Challenge,
    spec: &TurnSpec,
) -> TurnOutput {
    let (content, patch) = proposal_patch(rng, team_id, challenge, spec);
    TurnOutput {
        speaker_role: spec.role,
        turn_type: spec.turn_type,
        content,
        canon_patch: Some(patch),
        references: None,
        vote: None,
    }
}

fn objection_turn(rng: &mut StdRng, spec: &TurnSpec) -> TurnOutput {
    let content = *[
        "Objection: What fails first under stress? If outsiders arrive, how does the rule prevent \
         exploitation instead of enabling it?",
        "Objection: This risks becoming vibes-only. What concrete mechanism enforces the rule \
         day-to-day, and what's the loophole?",
        "Objection: The proposal creates a neat story, but where does the mess come from - waste, \
         dissent, weather, scarcity?",
    ]
    .choose(rng)
    .expect("pool");
    TurnOutput {
        speaker_role: spec.role,
        turn_type: spec.turn_type,
        content: content.to_string(),
        canon_patch: None,
        references: None,
        vote: None,
    }
}

fn response_turn(rng: &mut StdRng, spec: &TurnSpec) -> TurnOutput {
    let content = *[
        "Response: Add a visible enforcement ritual (tokens, lamps, ledgers) and a quiet \
         workaround that only insiders understand, so the rule reads as lived-in rather than \
         decorative.",
        "Response: Tie the rule to infrastructure - water, light, elevators - so breaking it has \
         immediate material consequences that any visitor would notice within an hour of arriving.",
        "Response: Ground it with one concrete example of daily life, plus a contradiction that \
         foreshadows later tension; the objection's edge case becomes a scheduled public ritual.",
    ]
    .choose(rng)
    .expect("pool");
    TurnOutput {
        speaker_role: spec.role,
        turn_type: spec.turn_type,
        content: content.to_string(),
        canon_patch: None,
        references: None,
        vote: None,
    }
}

fn resolution_turn(
    rng: &mut StdRng,
    team_id: TeamId,
    challenge: &Challenge,
    spec: &TurnSpec,
) -> TurnOutput {
    let (_, patch) = proposal_patch(rng, team_id, challenge, spec);
    let reference = spec
        .expected_references
        .first()
        .cloned()
        .unwrap_or_default();
    TurnOutput {
        speaker_role: spec.role,
        turn_type: spec.turn_type,
        content: format!(
            "Resolution: merging {reference} with the objection's edge case by adding an \
             enforcement mechanism and a known loophole."
        ),
        canon_patch: Some(patch),
        references: Some(spec.expected_references.clone()),
        vote: None,
    }
}

fn vote_turn(spec: &TurnSpec) -> TurnOutput {
    TurnOutput {
        speaker_role: spec.role,
        turn_type: spec.turn_type,
        content: "Vote: ACCEPT".to_string(),
        canon_patch: None,
        references: None,
        vote: Some(TurnVote {
            choice: VoteChoice::Accept,
            amendment_summary: None,
        }),
    }
}
