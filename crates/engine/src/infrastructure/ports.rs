//! Port traits for infrastructure boundaries.
//!
//! These are the only abstractions in the engine: the language-model
//! provider, the durable match/event store, and the clock. Everything else
//! is concrete types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use worldbuild_domain::{
    Challenge, MatchEvent, MatchId, PatchOp, PromptPack, Role, TeamId, TurnOutput, TurnType,
};

// =============================================================================
// Error Types
// =============================================================================

/// Provider failure taxonomy. All variants are retriable at the adapter
/// layer up to a small bound before propagating.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("provider_timeout: {0}")]
    Timeout(String),
    #[error("provider_rate_limited: {0}")]
    RateLimited(String),
    #[error("provider_schema_violation: {0}")]
    SchemaViolation(String),
    #[error("provider_unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Not found")]
    NotFound,
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

// =============================================================================
// Provider Port
// =============================================================================

/// Opaque per-(match, team) conversation state threaded through provider
/// calls. Some providers keep dialogue state server-side (`data` is a small
/// id), others resend history (`data` is the message log). The engine never
/// inspects `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationHandle {
    pub provider: String,
    pub team_id: TeamId,
    pub data: Value,
}

/// Validation errors from a prior attempt, handed back to the provider so
/// it can produce a corrected output.
#[derive(Debug, Clone)]
pub struct RepairContext {
    pub previous_output: TurnOutput,
    pub errors: Vec<String>,
}

/// Everything the provider needs to generate one turn.
#[derive(Debug, Clone)]
pub struct TurnSpec {
    pub role: Role,
    pub turn_type: TurnType,
    pub phase: u8,
    pub round: u8,
    pub allowed_patch_prefixes: Vec<String>,
    pub expected_references: Vec<String>,
    /// The resolution patch under vote, when this is a VOTE turn.
    pub pending_patch: Option<Vec<PatchOp>>,
    /// Set after a REJECT round: the next proposal must address the gap.
    pub proposer_hint: Option<String>,
    /// Set on the binding second RESOLUTION after a deadlocked vote.
    pub tiebreak: bool,
    pub repair: Option<RepairContext>,
    pub attempt: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Result of a single provider turn call.
#[derive(Debug, Clone)]
pub struct TurnGeneration {
    pub output: TurnOutput,
    pub handle: ConversationHandle,
    pub usage: Option<TokenUsage>,
}

#[async_trait]
pub trait ProviderPort: Send + Sync {
    async fn start_conversation(
        &self,
        team_id: TeamId,
        match_seed: i64,
        challenge: &Challenge,
        initial_canon: &Value,
    ) -> Result<ConversationHandle, ProviderError>;

    async fn generate_turn(
        &self,
        handle: &ConversationHandle,
        spec: &TurnSpec,
    ) -> Result<TurnGeneration, ProviderError>;

    /// Neutral prompt-pack call: input is the final validated canon only.
    async fn generate_prompt_pack(
        &self,
        match_seed: i64,
        team_id: TeamId,
        canon: &Value,
    ) -> Result<PromptPack, ProviderError>;
}

// =============================================================================
// Match Store Port
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Running,
    Completed,
    Failed,
}

impl MatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Running => "running",
            MatchStatus::Completed => "completed",
            MatchStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        self != MatchStatus::Running
    }
}

/// The durable per-match record, mutated only by the match runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    pub match_id: MatchId,
    pub created_at: DateTime<Utc>,
    pub status: MatchStatus,
    pub seed: i64,
    pub tier: u8,
    pub challenge: Option<Challenge>,
    pub completed_at: Option<DateTime<Utc>>,
    pub canon_hash_a: Option<String>,
    pub canon_hash_b: Option<String>,
    pub error: Option<String>,
}

/// The five judging criteria, each scored 1..=5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgingScores {
    pub internal_coherence: u8,
    pub creative_ambition: u8,
    pub visual_fidelity: u8,
    pub artifact_quality: u8,
    pub process_quality: u8,
}

impl JudgingScores {
    pub fn all(&self) -> [u8; 5] {
        [
            self.internal_coherence,
            self.creative_ambition,
            self.visual_fidelity,
            self.artifact_quality,
            self.process_quality,
        ]
    }
}

#[derive(Debug, Clone)]
pub struct NewJudgingScore {
    pub match_id: MatchId,
    pub created_at: DateTime<Utc>,
    pub judge: String,
    pub blind_id: String,
    pub scores: JudgingScores,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgingScoreRecord {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub judge: String,
    pub blind_id: String,
    pub scores: JudgingScores,
    pub notes: Option<String>,
}

/// The persisted blind-judging assignment for a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlindMapping {
    pub world_1: TeamId,
    pub world_2: TeamId,
}

impl BlindMapping {
    pub fn team_for(&self, blind_id: &str) -> Option<TeamId> {
        match blind_id {
            "WORLD-1" => Some(self.world_1),
            "WORLD-2" => Some(self.world_2),
            _ => None,
        }
    }
}

#[async_trait]
pub trait MatchStore: Send + Sync {
    async fn create_match(&self, record: &MatchRecord) -> Result<(), StoreError>;
    async fn get_match(&self, match_id: MatchId) -> Result<Option<MatchRecord>, StoreError>;
    async fn list_matches(&self) -> Result<Vec<MatchRecord>, StoreError>;
    async fn set_challenge(
        &self,
        match_id: MatchId,
        challenge: &Challenge,
    ) -> Result<(), StoreError>;
    async fn mark_completed(
        &self,
        match_id: MatchId,
        completed_at: DateTime<Utc>,
        canon_hash_a: &str,
        canon_hash_b: &str,
    ) -> Result<(), StoreError>;
    async fn mark_failed(
        &self,
        match_id: MatchId,
        completed_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), StoreError>;

    /// Atomic, durable append. The event is visible to `list_events` only
    /// once this returns.
    async fn append_event(&self, event: &MatchEvent) -> Result<(), StoreError>;
    async fn list_events(
        &self,
        match_id: MatchId,
        after_seq: i64,
    ) -> Result<Vec<MatchEvent>, StoreError>;

    async fn add_judging_score(
        &self,
        score: &NewJudgingScore,
    ) -> Result<JudgingScoreRecord, StoreError>;
    async fn list_judging_scores(
        &self,
        match_id: MatchId,
    ) -> Result<Vec<JudgingScoreRecord>, StoreError>;

    async fn get_blind_mapping(&self, match_id: MatchId)
        -> Result<Option<BlindMapping>, StoreError>;
    async fn save_blind_mapping(
        &self,
        match_id: MatchId,
        mapping: &BlindMapping,
    ) -> Result<(), StoreError>;
}

// =============================================================================
// Testability Ports
// =============================================================================

pub trait ClockPort: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
