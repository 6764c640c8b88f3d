//! Provider adapters and the factory that selects one from settings.

pub mod anthropic;
pub mod gemini;
pub mod mock;
pub mod openai;
pub mod prompts;

use std::sync::Arc;
use std::time::Duration;

use crate::infrastructure::ports::{ProviderError, ProviderPort};
use crate::infrastructure::resilient::{ResilientProvider, RetryConfig};
use crate::settings::{ProviderKind, Settings, SettingsError};

/// Model parameters shared by the real adapters.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub model: Option<String>,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl ModelConfig {
    fn from_settings(settings: &Settings) -> Self {
        Self {
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_output_tokens: settings.max_output_tokens,
        }
    }
}

pub(crate) fn map_reqwest_error(error: reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout(error.to_string())
    } else {
        ProviderError::Unavailable(error.to_string())
    }
}

/// Build the configured provider, wrapped in retry + timeout.
pub fn create_provider(settings: &Settings) -> Result<Arc<dyn ProviderPort>, SettingsError> {
    let config = ModelConfig::from_settings(settings);
    let api_key = settings.api_key.clone().unwrap_or_default();

    let inner: Arc<dyn ProviderPort> = match settings.provider {
        ProviderKind::Mock => Arc::new(mock::MockProvider::new()),
        ProviderKind::OpenAi => Arc::new(openai::OpenAiProvider::new(api_key, config)),
        ProviderKind::Anthropic => Arc::new(anthropic::AnthropicProvider::new(api_key, config)),
        ProviderKind::Gemini => Arc::new(gemini::GeminiProvider::new(api_key, config)),
    };

    let retry = RetryConfig {
        call_timeout: Duration::from_secs(settings.provider_timeout_secs),
        ..RetryConfig::default()
    };
    Ok(Arc::new(ResilientProvider::new(inner, retry)))
}
