use serde::{Deserialize, Serialize};

use crate::canon::LANDMARK_COUNT;

/// A single image-generation prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePrompt {
    pub title: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
}

/// The downstream artifact of a completed deliberation: six prompts derived
/// from the final canon alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptPack {
    pub hero_image: ImagePrompt,
    pub landmark_triptych: Vec<ImagePrompt>,
    pub inhabitant_portrait: ImagePrompt,
    pub tension_snapshot: ImagePrompt,
}

impl PromptPack {
    /// Strict shape check: exactly three triptych entries, no empty titles
    /// or prompts anywhere.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.landmark_triptych.len() != LANDMARK_COUNT {
            errors.push(format!(
                "/landmark_triptych: expected {LANDMARK_COUNT} prompts, found {}",
                self.landmark_triptych.len()
            ));
        }

        let mut check = |path: &str, prompt: &ImagePrompt| {
            if prompt.title.trim().is_empty() {
                errors.push(format!("{path}/title: must not be empty"));
            }
            if prompt.prompt.trim().is_empty() {
                errors.push(format!("{path}/prompt: must not be empty"));
            }
        };
        check("/hero_image", &self.hero_image);
        check("/inhabitant_portrait", &self.inhabitant_portrait);
        check("/tension_snapshot", &self.tension_snapshot);
        for (i, prompt) in self.landmark_triptych.iter().enumerate() {
            check(&format!("/landmark_triptych/{i}"), prompt);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt(title: &str) -> ImagePrompt {
        ImagePrompt {
            title: title.to_string(),
            prompt: format!("{title} in cinematic light"),
            negative_prompt: None,
            aspect_ratio: Some("16:9".to_string()),
        }
    }

    fn pack() -> PromptPack {
        PromptPack {
            hero_image: prompt("Hero"),
            landmark_triptych: vec![prompt("L1"), prompt("L2"), prompt("L3")],
            inhabitant_portrait: prompt("Portrait"),
            tension_snapshot: prompt("Tension"),
        }
    }

    #[test]
    fn complete_pack_validates() {
        assert!(pack().validate().is_ok());
    }

    #[test]
    fn short_triptych_is_rejected() {
        let mut p = pack();
        p.landmark_triptych.pop();
        let errors = p.validate().unwrap_err();
        assert!(errors[0].starts_with("/landmark_triptych"));
    }

    #[test]
    fn empty_prompt_is_rejected() {
        let mut p = pack();
        p.hero_image.prompt = "  ".to_string();
        let errors = p.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.starts_with("/hero_image/prompt")));
    }
}
