//! The canon document: the structured fictional-world specification a team
//! converges upon during deliberation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::challenge::Challenge;
use crate::team::TeamId;

pub const LANDMARK_COUNT: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Landmark {
    pub name: String,
    pub description: String,
    pub significance: String,
    pub visual_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inhabitants {
    pub appearance: String,
    pub culture_snapshot: String,
    pub relationship_to_place: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tension {
    pub conflict: String,
    pub stakes: String,
    pub visual_manifestation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Canon {
    pub world_name: String,
    pub governing_logic: String,
    pub aesthetic_mood: String,
    pub landmarks: Vec<Landmark>,
    pub inhabitants: Inhabitants,
    pub tension: Tension,
    pub hero_image_description: String,
}

impl Canon {
    /// The placeholder structure every team starts Phase 1 from.
    pub fn placeholder(team_id: TeamId, challenge: &Challenge) -> Canon {
        let prefix = team_prefix(team_id);
        Canon {
            world_name: format!("{prefix} Unnamed"),
            governing_logic: format!("(TBD) Twist: {}.", challenge.twist_constraint),
            aesthetic_mood: "mysterious, unfinished, provisional".to_string(),
            landmarks: ["I", "II", "III"]
                .iter()
                .map(|numeral| Landmark {
                    name: format!("TBD Landmark {numeral}"),
                    description: "Placeholder landmark description.".to_string(),
                    significance: "Placeholder significance.".to_string(),
                    visual_key: "Placeholder visual key.".to_string(),
                })
                .collect(),
            inhabitants: Inhabitants {
                appearance: format!("Placeholder {}.", challenge.inhabitants),
                culture_snapshot: "Placeholder culture snapshot.".to_string(),
                relationship_to_place: "Placeholder relationship to place.".to_string(),
            },
            tension: Tension {
                conflict: "Placeholder conflict.".to_string(),
                stakes: "Placeholder stakes.".to_string(),
                visual_manifestation: "Placeholder visual manifestation.".to_string(),
            },
            hero_image_description: "Placeholder hero image description.".to_string(),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("canon serializes")
    }
}

/// Team color prefix used in placeholder naming.
pub fn team_prefix(team_id: TeamId) -> &'static str {
    match team_id {
        TeamId::A => "Azure",
        TeamId::B => "Cinder",
    }
}

/// Check a document against the full final-canon schema.
///
/// Used at Phase 4 ratification: the crystallized document must be a
/// structurally complete canon with exactly three landmarks and no empty
/// fields. Returns every violation, not just the first.
pub fn validate_complete(doc: &Value) -> Result<Canon, Vec<String>> {
    let canon: Canon = serde_json::from_value(doc.clone())
        .map_err(|e| vec![format!("<root>: not a canon document: {e}")])?;

    let mut errors = Vec::new();
    if canon.landmarks.len() != LANDMARK_COUNT {
        errors.push(format!(
            "/landmarks: expected exactly {LANDMARK_COUNT} landmarks, found {}",
            canon.landmarks.len()
        ));
    }

    let mut require = |path: &str, value: &str| {
        if value.trim().is_empty() {
            errors.push(format!("{path}: must not be empty"));
        }
    };
    require("/world_name", &canon.world_name);
    require("/governing_logic", &canon.governing_logic);
    require("/aesthetic_mood", &canon.aesthetic_mood);
    require("/hero_image_description", &canon.hero_image_description);
    require("/inhabitants/appearance", &canon.inhabitants.appearance);
    require(
        "/inhabitants/culture_snapshot",
        &canon.inhabitants.culture_snapshot,
    );
    require(
        "/inhabitants/relationship_to_place",
        &canon.inhabitants.relationship_to_place,
    );
    require("/tension/conflict", &canon.tension.conflict);
    require("/tension/stakes", &canon.tension.stakes);
    require(
        "/tension/visual_manifestation",
        &canon.tension.visual_manifestation,
    );
    for (i, landmark) in canon.landmarks.iter().enumerate() {
        require(&format!("/landmarks/{i}/name"), &landmark.name);
        require(&format!("/landmarks/{i}/description"), &landmark.description);
        require(
            &format!("/landmarks/{i}/significance"),
            &landmark.significance,
        );
        require(&format!("/landmarks/{i}/visual_key"), &landmark.visual_key);
    }

    if errors.is_empty() {
        Ok(canon)
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn challenge() -> Challenge {
        Challenge {
            seed: 42,
            tier: 1,
            biome_setting: "volcanic archipelago".into(),
            inhabitants: "posthuman monks".into(),
            twist_constraint: "light is sacred and rationed".into(),
        }
    }

    #[test]
    fn placeholder_carries_team_prefix_and_twist() {
        let canon = Canon::placeholder(TeamId::A, &challenge());
        assert_eq!(canon.world_name, "Azure Unnamed");
        assert!(canon.governing_logic.contains("light is sacred"));
        assert_eq!(canon.landmarks.len(), LANDMARK_COUNT);

        let canon_b = Canon::placeholder(TeamId::B, &challenge());
        assert_eq!(canon_b.world_name, "Cinder Unnamed");
    }

    #[test]
    fn placeholder_is_schema_complete() {
        let value = Canon::placeholder(TeamId::A, &challenge()).to_value();
        assert!(validate_complete(&value).is_ok());
    }

    #[test]
    fn empty_field_fails_final_schema() {
        let mut value = Canon::placeholder(TeamId::A, &challenge()).to_value();
        value["tension"]["stakes"] = serde_json::json!("");
        let errors = validate_complete(&value).unwrap_err();
        assert!(errors.iter().any(|e| e.starts_with("/tension/stakes")));
    }

    #[test]
    fn wrong_landmark_count_fails_final_schema() {
        let mut value = Canon::placeholder(TeamId::A, &challenge()).to_value();
        value["landmarks"].as_array_mut().unwrap().pop();
        let errors = validate_complete(&value).unwrap_err();
        assert!(errors.iter().any(|e| e.starts_with("/landmarks")));
    }
}
