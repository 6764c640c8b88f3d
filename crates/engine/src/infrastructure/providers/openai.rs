//! OpenAI adapter over the Responses API.
//!
//! Conversation state is kept server-side ("response chaining"): the handle
//! carries only the previous response id, and each call sends the turn spec
//! plus that id.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use worldbuild_domain::{Challenge, PromptPack, TeamId, TurnOutput};

use crate::infrastructure::ports::{
    ConversationHandle, ProviderError, ProviderPort, TokenUsage, TurnGeneration, TurnSpec,
};
use crate::infrastructure::providers::prompts;
use crate::infrastructure::providers::{map_reqwest_error, ModelConfig};

const RESPONSES_URL: &str = "https://api.openai.com/v1/responses";
const DEFAULT_MODEL: &str = "gpt-4.1-mini";

pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    config: ModelConfig,
}

impl OpenAiProvider {
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
        let response = self
            .client
            .post(RESPONSES_URL)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited(format!("openai returned {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Unavailable(format!(
                "openai returned {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::SchemaViolation(format!("openai response not JSON: {e}")))
    }

    fn output_text(data: &Value) -> Result<&str, ProviderError> {
        data["output"][0]["content"][0]["text"]
            .as_str()
            .ok_or_else(|| {
                ProviderError::SchemaViolation("openai response missing output text".to_string())
            })
    }

    fn usage(data: &Value) -> Option<TokenUsage> {
        let usage = data.get("usage")?;
        Some(TokenUsage {
            prompt_tokens: usage["input_tokens"].as_u64()? as u32,
            completion_tokens: usage["output_tokens"].as_u64()? as u32,
        })
    }
}

#[async_trait]
impl ProviderPort for OpenAiProvider {
    async fn start_conversation(
        &self,
        team_id: TeamId,
        match_seed: i64,
        challenge: &Challenge,
        initial_canon: &Value,
    ) -> Result<ConversationHandle, ProviderError> {
        let payload = json!({
            "model": self.model(),
            "input": prompts::system_prompt(challenge, initial_canon),
            "store": true,
        });
        let data = self.post(payload).await?;
        let response_id = data["id"].as_str().ok_or_else(|| {
            ProviderError::SchemaViolation("openai response missing id".to_string())
        })?;

        Ok(ConversationHandle {
            provider: "openai".to_string(),
            team_id,
            data: json!({"response_id": response_id, "match_seed": match_seed}),
        })
    }

    async fn generate_turn(
        &self,
        handle: &ConversationHandle,
        spec: &TurnSpec,
    ) -> Result<TurnGeneration, ProviderError> {
        let previous_response_id = handle.data["response_id"].as_str().ok_or_else(|| {
            ProviderError::SchemaViolation("conversation handle missing response_id".to_string())
        })?;

        let payload = json!({
            "model": self.model(),
            "previous_response_id": previous_response_id,
            "input": [{"role": "user", "content": prompts::turn_prompt(spec)}],
            "text": {
                "format": {
                    "type": "json_schema",
                    "name": "TurnOutput",
                    "schema": prompts::turn_output_schema(),
                    "strict": true,
                }
            },
            "temperature": self.config.temperature,
            "max_output_tokens": self.config.max_output_tokens,
            "store": true,
        });

        let data = self.post(payload).await?;
        let text = Self::output_text(&data)?;
        let output: TurnOutput = serde_json::from_str(text)
            .map_err(|e| ProviderError::SchemaViolation(format!("not a TurnOutput: {e}")))?;

        let mut new_data = handle.data.clone();
        new_data["response_id"] = data["id"].clone();

        Ok(TurnGeneration {
            output,
            handle: ConversationHandle {
                provider: "openai".to_string(),
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
            "model": self.model(),
            "input": [{"role": "user", "content": prompts::prompt_pack_prompt(canon)}],
            "text": {
                "format": {
                    "type": "json_schema",
                    "name": "PromptPack",
                    "schema": prompts::prompt_pack_schema(),
                    "strict": true,
                }
            },
            "temperature": self.config.temperature,
            "max_output_tokens": self.config.max_output_tokens.max(1200),
            "store": true,
        });

        let data = self.post(payload).await?;
        let text = Self::output_text(&data)?;
        serde_json::from_str(text)
            .map_err(|e| ProviderError::SchemaViolation(format!("not a PromptPack: {e}")))
    }
}
