use serde::{Deserialize, Serialize};

use crate::patch::PatchOp;
use crate::role::{Role, TurnType, VoteChoice};

/// The ballot carried by a VOTE turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnVote {
    pub choice: VoteChoice,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amendment_summary: Option<String>,
}

/// The structured output of a single agent turn.
///
/// Produced by a provider adapter, checked by the validator, and carried
/// verbatim in `turn_emitted` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnOutput {
    pub speaker_role: Role,
    pub turn_type: TurnType,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canon_patch: Option<Vec<PatchOp>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub references: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vote: Option<TurnVote>,
}

impl TurnOutput {
    /// The patch ops this turn carries, empty when absent.
    pub fn patch_ops(&self) -> &[PatchOp] {
        self.canon_patch.as_deref().unwrap_or(&[])
    }

    pub fn has_patch(&self) -> bool {
        !self.patch_ops().is_empty()
    }

    /// The prior-turn ids this turn references, empty when absent.
    pub fn reference_ids(&self) -> &[String] {
        self.references.as_deref().unwrap_or(&[])
    }
}
