//! Fixed deliberation rules: round counts, phase write scopes, and which
//! roles may take which turn types.

use worldbuild_domain::{Role, TurnType};

pub const PHASE_COUNT: u8 = 5;

/// Rounds per deliberation phase. Phase 5 has no rounds (prompt-pack only).
pub fn rounds_for_phase(phase: u8) -> u8 {
    match phase {
        1 => 3,
        2 => 4,
        3 => 2,
        4 => 1,
        _ => 0,
    }
}

/// Path prefixes a canon patch may touch during a phase.
pub fn allowed_patch_prefixes(phase: u8) -> &'static [&'static str] {
    match phase {
        1 => &[
            "/world_name",
            "/governing_logic",
            "/aesthetic_mood",
            "/inhabitants",
        ],
        2 => &["/landmarks"],
        3 => &["/tension"],
        4 => &["/"],
        _ => &[],
    }
}

/// Whether a path falls under one of the allowed prefixes.
pub fn path_allowed(path: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|prefix| {
        if *prefix == "/" {
            path.starts_with('/')
        } else {
            path == *prefix || path.starts_with(&format!("{prefix}/"))
        }
    })
}

pub fn is_role_allowed(role: Role, turn_type: TurnType) -> bool {
    match turn_type {
        TurnType::Proposal => matches!(role, Role::Architect | Role::Lorekeeper),
        TurnType::Objection => role == Role::Contrarian,
        TurnType::Response => true,
        TurnType::Resolution => role == Role::Synthesizer,
        TurnType::Vote => true,
    }
}
