//! Anthropic adapter over the Messages API.
//!
//! Anthropic keeps no server-side dialogue state, so the handle carries the
//! full message history ("message-history resending") plus the system
//! prompt, and every call replays it.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use worldbuild_domain::{Challenge, PromptPack, TeamId, TurnOutput};

use crate::infrastructure::ports::{
    ConversationHandle, ProviderError, ProviderPort, TokenUsage, TurnGeneration, TurnSpec,
};
use crate::infrastructure::providers::prompts;
use crate::infrastructure::providers::{map_reqwest_error, ModelConfig};

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    config: ModelConfig,
}

impl AnthropicProvider {
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
            .post(MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&payload)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited(format!(
                "anthropic returned {status}"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Unavailable(format!(
                "anthropic returned {status}: {body}"
            )));
        }

        response.json().await.map_err(|e| {
            ProviderError::SchemaViolation(format!("anthropic response not JSON: {e}"))
        })
    }

    fn response_text(data: &Value) -> Result<&str, ProviderError> {
        data["content"][0]["text"].as_str().ok_or_else(|| {
            ProviderError::SchemaViolation("anthropic response missing content text".to_string())
        })
    }

    fn usage(data: &Value) -> Option<TokenUsage> {
        let usage = data.get("usage")?;
        Some(TokenUsage {
            prompt_tokens: usage["input_tokens"].as_u64()? as u32,
            completion_tokens: usage["output_tokens"].as_u64()? as u32,
        })
    }

    /// One structured-output exchange against the carried history.
    async fn exchange(
        &self,
        system: &str,
        mut messages: Vec<Value>,
        user_prompt: String,
        schema_name: &str,
        schema: Value,
    ) -> Result<(Value, Vec<Value>, Option<TokenUsage>), ProviderError> {
        messages.push(json!({
            "role": "user",
            "content": format!(
                "{user_prompt}\n\nRespond with a single JSON object matching the {schema_name} \
                 schema below. No prose outside the JSON.\n{schema}"
            ),
        }));

        let payload = json!({
            "model": self.model(),
            "system": system,
            "messages": messages,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_output_tokens,
        });

        let data = self.post(payload).await?;
        let text = Self::response_text(&data)?.to_string();
        let parsed: Value = serde_json::from_str(text.trim())
            .map_err(|e| ProviderError::SchemaViolation(format!("not valid JSON: {e}")))?;

        messages.push(json!({"role": "assistant", "content": text}));
        let usage = Self::usage(&data);
        Ok((parsed, messages, usage))
    }
}

#[async_trait]
impl ProviderPort for AnthropicProvider {
    async fn start_conversation(
        &self,
        team_id: TeamId,
        match_seed: i64,
        challenge: &Challenge,
        initial_canon: &Value,
    ) -> Result<ConversationHandle, ProviderError> {
        Ok(ConversationHandle {
            provider: "anthropic".to_string(),
            team_id,
            data: json!({
                "match_seed": match_seed,
                "system": prompts::system_prompt(challenge, initial_canon),
                "messages": [],
            }),
        })
    }

    async fn generate_turn(
        &self,
        handle: &ConversationHandle,
        spec: &TurnSpec,
    ) -> Result<TurnGeneration, ProviderError> {
        let system = handle.data["system"].as_str().unwrap_or_default().to_string();
        let messages = handle.data["messages"]
            .as_array()
            .cloned()
            .unwrap_or_default();

        let (parsed, messages, usage) = self
            .exchange(
                &system,
                messages,
                prompts::turn_prompt(spec),
                "TurnOutput",
                prompts::turn_output_schema(),
            )
            .await?;

        let output: TurnOutput = serde_json::from_value(parsed)
            .map_err(|e| ProviderError::SchemaViolation(format!("not a TurnOutput: {e}")))?;

        let mut data = handle.data.clone();
        data["messages"] = Value::Array(messages);

        Ok(TurnGeneration {
            output,
            handle: ConversationHandle {
                provider: "anthropic".to_string(),
                team_id: handle.team_id,
                data,
            },
            usage,
        })
    }

    async fn generate_prompt_pack(
        &self,
        _match_seed: i64,
        _team_id: TeamId,
        canon: &Value,
    ) -> Result<PromptPack, ProviderError> {
        let (parsed, _, _) = self
            .exchange(
                "You are a neutral Prompt Engineer.",
                Vec::new(),
                prompts::prompt_pack_prompt(canon),
                "PromptPack",
                prompts::prompt_pack_schema(),
            )
            .await?;

        serde_json::from_value(parsed)
            .map_err(|e| ProviderError::SchemaViolation(format!("not a PromptPack: {e}")))
    }
}
