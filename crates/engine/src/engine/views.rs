//! Event-sourced derived views.
//!
//! Canon and prompt packs are never read from live engine state; they are
//! folds over the match's event log, so any cursor into the log yields a
//! consistent view.

use serde_json::Value;

use worldbuild_domain::{apply_patch, EventPayload, MatchEvent, PromptPack, TeamId};

/// Fold `canon_initialized` + accepted patches into the team's canon at the
/// end of the given events. None before initialization.
pub fn derive_team_canon(events: &[MatchEvent], team_id: TeamId) -> Option<Value> {
    let mut canon: Option<Value> = None;
    for event in events {
        if event.team_id != Some(team_id) {
            continue;
        }
        match &event.payload {
            EventPayload::CanonInitialized { canon: initial, .. } => {
                if canon.is_none() {
                    canon = Some(initial.clone());
                }
            }
            EventPayload::CanonPatchApplied { patch, .. } => {
                if let Some(current) = canon.take() {
                    // Patches were validated before being logged; a replay
                    // failure means the log is corrupt, so surface nothing.
                    canon = apply_patch(&current, patch).ok();
                }
            }
            _ => {}
        }
    }
    canon
}

/// The team's most recent prompt pack, if one was generated.
pub fn derive_team_prompt_pack(events: &[MatchEvent], team_id: TeamId) -> Option<PromptPack> {
    let mut pack = None;
    for event in events {
        if event.team_id != Some(team_id) {
            continue;
        }
        if let EventPayload::PromptPackGenerated { prompt_pack } = &event.payload {
            pack = Some(prompt_pack.clone());
        }
    }
    pack
}
