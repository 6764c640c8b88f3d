//! Prompt construction shared by the real provider adapters.

use serde_json::{json, Value};

use worldbuild_domain::{Challenge, Role, TurnType};

use crate::infrastructure::ports::TurnSpec;

pub fn role_mandate(role: Role) -> &'static str {
    match role {
        Role::Architect => {
            "Propose structural/physical elements (geography, buildings, infrastructure). \
             Think in systems and spaces."
        }
        Role::Lorekeeper => {
            "Propose history, culture, inhabitants, naming conventions. \
             Think in stories and meaning."
        }
        Role::Contrarian => {
            "Challenge every proposal with a specific objection or edge case. \
             Be constructively adversarial."
        }
        Role::Synthesizer => {
            "Resolve conflicts, merge ideas, call for votes, manage convergence. \
             Be diplomatic and decisive. You cannot propose new ideas, only merge \
             and refine existing ones."
        }
    }
}

pub fn turn_type_instruction(turn_type: TurnType) -> &'static str {
    match turn_type {
        TurnType::Proposal => "Make a proposal with a canon_patch. Be specific and actionable.",
        TurnType::Objection => {
            "Raise a specific concern or edge case about the current proposal. No vague objections."
        }
        TurnType::Response => {
            "Respond to the proposal and objection. You must add, modify, or object - no pure agreement."
        }
        TurnType::Resolution => {
            "Synthesize the discussion. Merge ideas, resolve conflicts, prepare for vote. \
             Include references to what you're merging, and mention at least one referenced \
             turn id in your content."
        }
        TurnType::Vote => {
            "Vote ACCEPT, AMEND, or REJECT. If AMEND, include a non-empty amendment_summary."
        }
    }
}

/// The shared system prompt opening each team's conversation.
pub fn system_prompt(challenge: &Challenge, initial_canon: &Value) -> String {
    format!(
        "You are a worldbuilding debate agent on a team of 4 agents \
         (Architect, Lorekeeper, Contrarian, Synthesizer).\n\n\
         CHALLENGE:\n\
         - Biome/Setting: {}\n\
         - Inhabitants: {}\n\
         - Twist Constraint: {}\n\n\
         INITIAL CANON (starting world state):\n{}\n\n\
         RULES:\n\
         1. No pure \"+1\" responses. You must always add, modify, or object.\n\
         2. Contrarian must object to every proposal with a specific concern.\n\
         3. Synthesizer cannot propose new ideas, only merge/refine existing ones.\n\
         4. All canon changes must be valid JSON Patch operations.\n\
         5. Output must be valid JSON matching the TurnOutput schema.\n\n\
         The deliberation has 4 phases:\n\
         - Phase 1 (Foundation): Establish name, governing logic, aesthetic mood\n\
         - Phase 2 (Landmarks): Define 3 key landmarks\n\
         - Phase 3 (Tension): Inject conflict/stakes\n\
         - Phase 4 (Crystallization): Final ratification\n\n\
         You will be told your role and turn type for each turn. Respond accordingly.",
        challenge.biome_setting,
        challenge.inhabitants,
        challenge.twist_constraint,
        serde_json::to_string_pretty(initial_canon).unwrap_or_default(),
    )
}

/// The per-turn user prompt.
pub fn turn_prompt(spec: &TurnSpec) -> String {
    let mut prompt = format!(
        "YOUR ROLE: {}\nMANDATE: {}\n\nPHASE: {}, ROUND: {}\nTURN TYPE: {}\nINSTRUCTION: {}\n\n\
         ALLOWED PATCH PREFIXES: {}",
        spec.role,
        role_mandate(spec.role),
        spec.phase,
        spec.round,
        spec.turn_type,
        turn_type_instruction(spec.turn_type),
        serde_json::to_string(&spec.allowed_patch_prefixes).unwrap_or_default(),
    );

    if !spec.expected_references.is_empty() {
        prompt.push_str(&format!(
            "\nEXPECTED REFERENCES: {}",
            serde_json::to_string(&spec.expected_references).unwrap_or_default()
        ));
    }

    if let Some(pending) = &spec.pending_patch {
        prompt.push_str(&format!(
            "\nPENDING PATCH (for voting): {}",
            serde_json::to_string(pending).unwrap_or_default()
        ));
    }

    if let Some(hint) = &spec.proposer_hint {
        prompt.push_str(&format!(
            "\nTHE PREVIOUS ROUND WAS REJECTED. You must address the gap: {hint}"
        ));
    }

    if spec.tiebreak {
        prompt.push_str(
            "\nTIEBREAK: the vote deadlocked. Your resolution is binding. \
             Carry a canon_patch to accept a merged outcome, or omit it to reject the round.",
        );
    }

    if let Some(repair) = &spec.repair {
        prompt.push_str(&format!(
            "\n\nREPAIR REQUIRED (attempt {}):\nYour previous output had validation errors:\n{}\n\n\
             Fix these errors in your next response.",
            spec.attempt + 1,
            serde_json::to_string_pretty(&repair.errors).unwrap_or_default(),
        ));
    }

    prompt.push_str("\n\nGenerate your TurnOutput now.");
    prompt
}

/// The neutral prompt-pack instruction; input is the final canon only.
pub fn prompt_pack_prompt(canon: &Value) -> String {
    format!(
        "You are a neutral Prompt Engineer.\n\n\
         Convert the following final world canon into a PromptPack for image generation.\n\n\
         Rules:\n\
         - Do not mention teams, debates, or voting.\n\
         - Make prompts richly visual: environment, composition, lighting, materials, mood, and key props.\n\
         - Keep the world's governing logic visible in every prompt.\n\
         - Provide 6 prompts total:\n\
           - hero_image (16:9 wide establishing shot)\n\
           - landmark_triptych[0..2] (1:1)\n\
           - inhabitant_portrait (3:4)\n\
           - tension_snapshot (16:9)\n\
         - Each prompt should stand alone (no external references), and should be safe for general audiences.\n\n\
         FINAL CANON (JSON):\n{}",
        serde_json::to_string_pretty(canon).unwrap_or_default(),
    )
}

/// JSON Schema for structured TurnOutput responses.
pub fn turn_output_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "speaker_role": {
                "type": "string",
                "enum": ["ARCHITECT", "LOREKEEPER", "CONTRARIAN", "SYNTHESIZER"]
            },
            "turn_type": {
                "type": "string",
                "enum": ["PROPOSAL", "OBJECTION", "RESPONSE", "RESOLUTION", "VOTE"]
            },
            "content": {"type": "string"},
            "canon_patch": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "op": {
                            "type": "string",
                            "enum": ["add", "remove", "replace", "move", "copy", "test"]
                        },
                        "path": {"type": "string"},
                        "from": {"type": "string"},
                        "value": {}
                    },
                    "required": ["op", "path"]
                }
            },
            "references": {"type": "array", "items": {"type": "string"}},
            "vote": {
                "type": "object",
                "properties": {
                    "choice": {"type": "string", "enum": ["ACCEPT", "AMEND", "REJECT"]},
                    "amendment_summary": {"type": "string"}
                },
                "required": ["choice"]
            }
        },
        "required": ["speaker_role", "turn_type", "content"]
    })
}

/// JSON Schema for structured PromptPack responses.
pub fn prompt_pack_schema() -> Value {
    let image_prompt = json!({
        "type": "object",
        "properties": {
            "title": {"type": "string"},
            "prompt": {"type": "string"},
            "negative_prompt": {"type": "string"},
            "aspect_ratio": {"type": "string"}
        },
        "required": ["title", "prompt"]
    });
    json!({
        "type": "object",
        "properties": {
            "hero_image": image_prompt,
            "landmark_triptych": {
                "type": "array",
                "items": image_prompt,
                "minItems": 3,
                "maxItems": 3
            },
            "inhabitant_portrait": image_prompt,
            "tension_snapshot": image_prompt
        },
        "required": ["hero_image", "landmark_triptych", "inhabitant_portrait", "tension_snapshot"]
    })
}
