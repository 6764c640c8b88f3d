//! Per-team canon store.
//!
//! Owns the live canon document for one team and applies accepted patches
//! under the current phase's write restrictions. Application is
//! copy-on-write: a rejected patch leaves the document untouched.

use serde_json::Value;

use worldbuild_domain::{
    apply_patch, canon, content_hash, Canon, Challenge, PatchOp, TeamId,
};

use crate::engine::rules;

/// Why a patch was rejected. `kind()` yields the wire error code.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CanonError {
    #[error("patch_rejected_phase: {0}")]
    RejectedPhase(String),
    #[error("patch_rejected_semantics: {0}")]
    RejectedSemantics(String),
    #[error("canon_schema_invalid: {0}")]
    SchemaInvalid(String),
}

impl CanonError {
    pub fn kind(&self) -> &'static str {
        match self {
            CanonError::RejectedPhase(_) => "patch_rejected_phase",
            CanonError::RejectedSemantics(_) => "patch_rejected_semantics",
            CanonError::SchemaInvalid(_) => "canon_schema_invalid",
        }
    }
}

/// Result of applying an accepted patch.
#[derive(Debug, Clone)]
pub struct AppliedPatch {
    pub before_hash: String,
    pub after_hash: String,
}

pub struct CanonStore {
    canon: Value,
}

impl CanonStore {
    /// Initialize with the placeholder structure; returns its hash.
    pub fn init(team_id: TeamId, challenge: &Challenge) -> (Self, String) {
        let canon = Canon::placeholder(team_id, challenge).to_value();
        let hash = content_hash(&canon);
        (Self { canon }, hash)
    }

    pub fn current(&self) -> &Value {
        &self.canon
    }

    pub fn hash(&self) -> String {
        content_hash(&self.canon)
    }

    /// Check a patch against the current document and phase without
    /// mutating anything.
    pub fn dry_run(&self, ops: &[PatchOp], phase: u8) -> Result<(), CanonError> {
        self.check(ops, phase).map(|_| ())
    }

    /// Apply a patch under the phase's write restrictions.
    pub fn apply(&mut self, ops: &[PatchOp], phase: u8) -> Result<AppliedPatch, CanonError> {
        let next = self.check(ops, phase)?;
        let before_hash = content_hash(&self.canon);
        let after_hash = content_hash(&next);
        self.canon = next;
        Ok(AppliedPatch {
            before_hash,
            after_hash,
        })
    }

    fn check(&self, ops: &[PatchOp], phase: u8) -> Result<Value, CanonError> {
        let prefixes = rules::allowed_patch_prefixes(phase);
        if prefixes.is_empty() {
            return Err(CanonError::RejectedPhase(format!(
                "canon is read-only in phase {phase}"
            )));
        }

        for (index, op) in ops.iter().enumerate() {
            if !rules::path_allowed(op.path(), prefixes) {
                return Err(CanonError::RejectedPhase(format!(
                    "/canon_patch/{index}/path: '{}' not allowed for phase {phase}",
                    op.path()
                )));
            }
            if let Some(from) = op.from_path() {
                if !rules::path_allowed(from, prefixes) {
                    return Err(CanonError::RejectedPhase(format!(
                        "/canon_patch/{index}/from: '{from}' not allowed for phase {phase}"
                    )));
                }
            }
        }

        let next = apply_patch(&self.canon, ops)
            .map_err(|e| CanonError::RejectedSemantics(e.to_string()))?;

        // Phase 4 writes anywhere, but the result must be a complete canon.
        if phase == 4 {
            canon::validate_complete(&next)
                .map_err(|errors| CanonError::SchemaInvalid(errors.join("; ")))?;
        }

        Ok(next)
    }
}
