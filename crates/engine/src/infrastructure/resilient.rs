//! Resilient provider wrapper with timeout and bounded retry.
//!
//! Wraps any `ProviderPort` with a per-call timeout and exponential backoff
//! with jitter. All provider error kinds are retriable here; exhaustion
//! propagates the last error, which the engine then treats as a turn
//! failure.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;

use worldbuild_domain::{Challenge, PromptPack, TeamId};

use crate::infrastructure::ports::{
    ConversationHandle, ProviderError, ProviderPort, TurnGeneration, TurnSpec,
};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = just the initial attempt).
    pub max_retries: u32,
    /// Base delay in milliseconds before the first retry.
    pub base_delay_ms: u64,
    /// Cap on exponential growth.
    pub max_delay_ms: u64,
    /// Jitter factor (0.0-1.0) to avoid thundering herd.
    pub jitter_factor: f64,
    /// Per-call timeout.
    pub call_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            jitter_factor: 0.2,
            call_timeout: Duration::from_secs(60),
        }
    }
}

pub struct ResilientProvider {
    inner: Arc<dyn ProviderPort>,
    config: RetryConfig,
}

impl ResilientProvider {
    pub fn new(inner: Arc<dyn ProviderPort>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    fn calculate_delay(&self, attempt: u32) -> u64 {
        let base = self.config.base_delay_ms;
        let exponential = base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
        let capped = exponential.min(self.config.max_delay_ms);

        let jitter_range = (capped as f64 * self.config.jitter_factor) as i64;
        if jitter_range > 0 {
            let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
            (capped as i64 + jitter).max(0) as u64
        } else {
            capped
        }
    }

    async fn execute_with_retry<T, F, Fut>(
        &self,
        operation_name: &str,
        operation: F,
    ) -> Result<T, ProviderError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, ProviderError>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            let outcome = tokio::time::timeout(self.config.call_timeout, operation())
                .await
                .unwrap_or_else(|_| {
                    Err(ProviderError::Timeout(format!(
                        "call exceeded {}s",
                        self.config.call_timeout.as_secs()
                    )))
                });

            match outcome {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!(
                            attempt = attempt + 1,
                            operation = operation_name,
                            "Provider call succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(e) => {
                    if attempt < self.config.max_retries {
                        let delay = self.calculate_delay(attempt + 1);
                        tracing::warn!(
                            attempt = attempt + 1,
                            max_retries = self.config.max_retries,
                            delay_ms = delay,
                            error = %e,
                            operation = operation_name,
                            "Provider call failed, retrying..."
                        );
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        let error = last_error
            .unwrap_or_else(|| ProviderError::Unavailable("unknown provider error".to_string()));
        tracing::error!(
            attempts = self.config.max_retries + 1,
            error = %error,
            operation = operation_name,
            "Provider call failed after all retry attempts"
        );
        Err(error)
    }
}

#[async_trait]
impl ProviderPort for ResilientProvider {
    async fn start_conversation(
        &self,
        team_id: TeamId,
        match_seed: i64,
        challenge: &Challenge,
        initial_canon: &Value,
    ) -> Result<ConversationHandle, ProviderError> {
        let inner = Arc::clone(&self.inner);
        self.execute_with_retry("start_conversation", || {
            let inner = Arc::clone(&inner);
            let challenge = challenge.clone();
            let initial_canon = initial_canon.clone();
            async move {
                inner
                    .start_conversation(team_id, match_seed, &challenge, &initial_canon)
                    .await
            }
        })
        .await
    }

    async fn generate_turn(
        &self,
        handle: &ConversationHandle,
        spec: &TurnSpec,
    ) -> Result<TurnGeneration, ProviderError> {
        let inner = Arc::clone(&self.inner);
        self.execute_with_retry("generate_turn", || {
            let inner = Arc::clone(&inner);
            let handle = handle.clone();
            let spec = spec.clone();
            async move { inner.generate_turn(&handle, &spec).await }
        })
        .await
    }

    async fn generate_prompt_pack(
        &self,
        match_seed: i64,
        team_id: TeamId,
        canon: &Value,
    ) -> Result<PromptPack, ProviderError> {
        let inner = Arc::clone(&self.inner);
        self.execute_with_retry("generate_prompt_pack", || {
            let inner = Arc::clone(&inner);
            let canon = canon.clone();
            async move { inner.generate_prompt_pack(match_seed, team_id, &canon).await }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use worldbuild_domain::{Role, TurnOutput, TurnType};

    /// Provider that fails a configurable number of times before succeeding.
    struct FailingProvider {
        failures_remaining: AtomicU32,
        error: ProviderError,
    }

    impl FailingProvider {
        fn new(failure_count: u32, error: ProviderError) -> Self {
            Self {
                failures_remaining: AtomicU32::new(failure_count),
                error,
            }
        }

        fn output() -> TurnGeneration {
            TurnGeneration {
                output: TurnOutput {
                    speaker_role: Role::Architect,
                    turn_type: TurnType::Proposal,
                    content: "ok".into(),
                    canon_patch: None,
                    references: None,
                    vote: None,
                },
                handle: ConversationHandle {
                    provider: "test".into(),
                    team_id: TeamId::A,
                    data: Value::Null,
                },
                usage: None,
            }
        }
    }

    #[async_trait]
    impl ProviderPort for FailingProvider {
        async fn start_conversation(
            &self,
            team_id: TeamId,
            _match_seed: i64,
            _challenge: &Challenge,
            _initial_canon: &Value,
        ) -> Result<ConversationHandle, ProviderError> {
            Ok(ConversationHandle {
                provider: "test".into(),
                team_id,
                data: Value::Null,
            })
        }

        async fn generate_turn(
            &self,
            _handle: &ConversationHandle,
            _spec: &TurnSpec,
        ) -> Result<TurnGeneration, ProviderError> {
            let remaining = self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
            if remaining > 0 {
                Err(self.error.clone())
            } else {
                Ok(Self::output())
            }
        }

        async fn generate_prompt_pack(
            &self,
            _match_seed: i64,
            _team_id: TeamId,
            _canon: &Value,
        ) -> Result<PromptPack, ProviderError> {
            Err(ProviderError::Unavailable("not under test".into()))
        }
    }

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            base_delay_ms: 1,
            max_delay_ms: 5,
            jitter_factor: 0.0,
            call_timeout: Duration::from_secs(5),
        }
    }

    fn spec() -> TurnSpec {
        TurnSpec {
            role: Role::Architect,
            turn_type: TurnType::Proposal,
            phase: 1,
            round: 1,
            allowed_patch_prefixes: vec![],
            expected_references: vec![],
            pending_patch: None,
            proposer_hint: None,
            tiebreak: false,
            repair: None,
            attempt: 0,
        }
    }

    fn handle() -> ConversationHandle {
        ConversationHandle {
            provider: "test".into(),
            team_id: TeamId::A,
            data: Value::Null,
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_schema_violation() {
        let inner = Arc::new(FailingProvider::new(
            1,
            ProviderError::SchemaViolation("missing speaker_role".into()),
        ));
        let provider = ResilientProvider::new(inner, fast_config(2));
        let result = provider.generate_turn(&handle(), &spec()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn propagates_after_retry_budget_exhausted() {
        let inner = Arc::new(FailingProvider::new(
            10,
            ProviderError::RateLimited("slow down".into()),
        ));
        let provider = ResilientProvider::new(inner, fast_config(2));
        let result = provider.generate_turn(&handle(), &spec()).await;
        assert!(matches!(result, Err(ProviderError::RateLimited(_))));
    }

    #[test]
    fn exponential_backoff_without_jitter() {
        let provider = ResilientProvider::new(
            Arc::new(FailingProvider::new(0, ProviderError::Unavailable("".into()))),
            RetryConfig {
                max_retries: 5,
                base_delay_ms: 1000,
                max_delay_ms: 30_000,
                jitter_factor: 0.0,
                call_timeout: Duration::from_secs(60),
            },
        );
        assert_eq!(provider.calculate_delay(1), 1000);
        assert_eq!(provider.calculate_delay(2), 2000);
        assert_eq!(provider.calculate_delay(3), 4000);
        assert_eq!(provider.calculate_delay(6), 30_000);
    }
}
