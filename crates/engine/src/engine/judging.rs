//! Blind judging: team anonymization and score bookkeeping.
//!
//! The WORLD-1/WORLD-2 assignment is derived from a deterministic seed over
//! the match id, persisted on first use, and reused afterwards. Scores are
//! stored raw; the weighted total is a read-side computation.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

use worldbuild_domain::{MatchId, TeamId};

use crate::infrastructure::ports::{BlindMapping, JudgingScores, MatchStore, StoreError};

pub const BLIND_IDS: [&str; 2] = ["WORLD-1", "WORLD-2"];

/// Criterion weights: coherence 25, ambition 20, fidelity 20, artifact
/// quality 20, process quality 15 (percent).
const SCORE_WEIGHTS: [u32; 5] = [25, 20, 20, 20, 15];

/// Derive the match's blind assignment from its id alone.
pub fn blind_mapping_for(match_id: MatchId) -> BlindMapping {
    let mut hasher = Sha256::new();
    hasher.update(match_id.as_uuid().as_bytes());
    let digest = hasher.finalize();
    let seed = u64::from_be_bytes(digest[..8].try_into().expect("8 bytes"));
    let mut rng = StdRng::seed_from_u64(seed);

    if rng.gen_bool(0.5) {
        BlindMapping {
            world_1: TeamId::A,
            world_2: TeamId::B,
        }
    } else {
        BlindMapping {
            world_1: TeamId::B,
            world_2: TeamId::A,
        }
    }
}

/// Load the persisted mapping, creating and storing it on first request.
pub async fn get_or_assign_mapping(
    store: &Arc<dyn MatchStore>,
    match_id: MatchId,
) -> Result<BlindMapping, StoreError> {
    if let Some(mapping) = store.get_blind_mapping(match_id).await? {
        return Ok(mapping);
    }
    let mapping = blind_mapping_for(match_id);
    store.save_blind_mapping(match_id, &mapping).await?;
    // Re-read in case a concurrent request won the insert race.
    Ok(store
        .get_blind_mapping(match_id)
        .await?
        .unwrap_or(mapping))
}

/// Weighted total on the 1..=5 scale, 25/20/20/20/15.
pub fn weighted_total(scores: &JudgingScores) -> f64 {
    let weighted: u32 = scores
        .all()
        .iter()
        .zip(SCORE_WEIGHTS)
        .map(|(score, weight)| *score as u32 * weight)
        .sum();
    weighted as f64 / 100.0
}
