//! Seeded, tiered challenge generation.
//!
//! The same (seed, tier) pair always yields the same challenge triple.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use worldbuild_domain::Challenge;

const BIOMES_TIER_1: &[&str] = &[
    "volcanic archipelago",
    "subterranean fungal forest",
    "floating desert islands",
    "temperate river-delta megacity",
];

const BIOMES_TIER_2: &[&str] = &[
    "frozen megastructure",
    "storm-wracked salt flats",
    "tidal canyon labyrinth",
    "sunken mangrove basin",
];

const BIOMES_TIER_3: &[&str] = &[
    "underwater city of air-breathers",
    "desert of drifting ice",
    "mountain peak beneath an inland sea",
    "forest that grows only in shadow",
];

const INHABITANTS: &[&str] = &[
    "posthuman monks",
    "symbiotic hive-beings",
    "nomadic machine-spirits",
    "amphibious traders",
    "ash-smeared archivists",
    "glass-masked surveyors",
];

const TWISTS_TIER_1: &[&str] = &[
    "light is sacred and rationed",
    "all structures must be temporary",
    "vertical space is status",
    "the founders are still alive but sleeping",
];

const TWISTS_TIER_2: &[&str] = &[
    "fire is forbidden",
    "names are currency and can be stolen",
    "every building must have two exits: one real, one symbolic",
    "timekeeping is illegal; only tides and bells are allowed",
];

const TWISTS_TIER_3: &[&str] = &[
    "inhabitants fear submersion despite living underwater",
    "gravity is a negotiated service, not a constant",
    "speech causes structural decay, so silence is law",
    "the city repels maps; accuracy triggers earthquakes",
];

#[derive(Debug, thiserror::Error)]
#[error("tier must be 1, 2, or 3 (got {0})")]
pub struct InvalidTier(pub u8);

pub fn generate(seed: i64, tier: u8) -> Result<Challenge, InvalidTier> {
    let (biomes, twists) = match tier {
        1 => (BIOMES_TIER_1, TWISTS_TIER_1),
        2 => (BIOMES_TIER_2, TWISTS_TIER_2),
        3 => (BIOMES_TIER_3, TWISTS_TIER_3),
        other => return Err(InvalidTier(other)),
    };

    let mut rng = StdRng::seed_from_u64(seed as u64);
    Ok(Challenge {
        seed,
        tier,
        biome_setting: biomes.choose(&mut rng).expect("non-empty pool").to_string(),
        inhabitants: INHABITANTS
            .choose(&mut rng)
            .expect("non-empty pool")
            .to_string(),
        twist_constraint: twists.choose(&mut rng).expect("non-empty pool").to_string(),
    })
}
