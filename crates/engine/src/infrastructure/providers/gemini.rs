//! Gemini adapter over the generateContent API.
//!
//! Gemini is stateless, so the handle carries the system instruction and
//! the full `contents` history.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use worldbuild_domain::{Challenge, PromptPack, TeamId, TurnOutput};

use crate::infrastructure::ports::{
    ConversationHandle, ProviderError, ProviderPort, TokenUsage, TurnGeneration, TurnSpec,
};
use crate::infrastructure::providers::prompts;
use crate::infrastructure::providers::{map_reqwest_error, ModelConfig};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

pub struct GeminiProvider {
    client: Client,
    api_key: String,
    config: ModelConfig,
}

impl GeminiProvider {
    pub fn new(api_key: String, config: ModelConfig) -> Self {
        Self {
            client: Client::new(),
            api_key,
            config,
        }
    }

    fn model(&self) -> &str {
        self.config.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    async fn post(&self, payload: Value) -> Result<Value, ProviderError> {
        let url = format!(
            "{BASE_URL}/{}:generateContent?key={}",
            self.model(),
            self.api_key
        );
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited(format!("gemini returned {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Unavailable(format!(
                "gemini returned {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::SchemaViolation(format!("gemini response not JSON: {e}")))
    }

    fn candidate_text(data: &Value) -> Result<&str, ProviderError> {
        data["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| {
                ProviderError::SchemaViolation("gemini response missing candidate text".to_string())
            })
    }

    fn usage(data: &Value) -> Option<TokenUsage> {
        let usage = data.get("usageMetadata")?;
        Some(TokenUsage {
            prompt_tokens: usage["promptTokenCount"].as_u64()? as u32,
            completion_tokens: usage["candidatesTokenCount"].as_u64()? as u32,
        })
    }
}

#[async_trait]
impl ProviderPort for GeminiProvider {
    async fn start_conversation(
        &self,
        team_id: TeamId,
        match_seed: i64,
        challenge: &Challenge,
        initial_canon: &Value,
    ) -> Result<ConversationHandle, ProviderError> {
        Ok(ConversationHandle {
            provider: "gemini".to_string(),
            team_id,
            data: json!({
                "match_seed": match_seed,
                "system_instruction": prompts::system_prompt(challenge, initial_canon),
                "contents": [],
            }),
        })
    }

    async fn generate_turn(
        &self,
        handle: &ConversationHandle,
        spec: &TurnSpec,
    ) -> Result<TurnGeneration, ProviderError> {
        let mut contents = handle.data["contents"]
            .as_array()
            .cloned()
            .unwrap_or_default();
        contents.push(json!({
            "role": "user",
            "parts": [{"text": prompts::turn_prompt(spec)}],
        }));

        let payload = json!({
            "contents": contents,
            "systemInstruction": {
                "parts": [{"text": handle.data["system_instruction"].as_str().unwrap_or_default()}]
            },
            "generationConfig": {
                "temperature": self.config.temperature,
                "maxOutputTokens": self.config.max_output_tokens,
                "responseMimeType": "application/json",
            },
        });

        let data = self.post(payload).await?;
        let text = Self::candidate_text(&data)?.to_string();
        let output: TurnOutput = serde_json::from_str(text.trim())
            .map_err(|e| ProviderError::SchemaViolation(format!("not a TurnOutput: {e}")))?;

        contents.push(json!({"role": "model", "parts": [{"text": text}]}));
        let mut new_data = handle.data.clone();
        new_data["contents"] = Value::Array(contents);

        Ok(TurnGeneration {
            output,
            handle: ConversationHandle {
                provider: "gemini".to_string(),
                team_id: handle.team_id,
                data: new_data,
            },
            usage: Self::usage(&data),
        })
    }

    async fn generate_prompt_pack(
        &self,
        _match_seed: i64,
        _team_id: TeamId,
        canon: &Value,
    ) -> Result<PromptPack, ProviderError> {
        let payload = json!({
            "contents": [{
                "role": "user",
                "parts": [{"text": prompts::prompt_pack_prompt(canon)}],
            }],
            "generationConfig": {
                "temperature": self.config.temperature,
                "maxOutputTokens": self.config.max_output_tokens.max(1200),
                "responseMimeType": "application/json",
            },
        });

        let data = self.post(payload).await?;
        let text = Self::candidate_text(&data)?;
        serde_json::from_str(text.trim())
            .map_err(|e| ProviderError::SchemaViolation(format!("not a PromptPack: {e}")))
    }
}
