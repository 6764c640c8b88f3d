use serde::{Deserialize, Serialize};

/// The seed-derived creative constraints both teams deliberate under.
///
/// Immutable once revealed; derived deterministically from (seed, tier).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub seed: i64,
    pub tier: u8,
    pub biome_setting: String,
    pub inhabitants: String,
    pub twist_constraint: String,
}
