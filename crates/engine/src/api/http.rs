//! HTTP routes.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use worldbuild_domain::{Challenge, MatchId, PromptPack, TeamId};

use crate::app::App;
use crate::engine::{judging, views};
use crate::infrastructure::ports::{
    JudgingScores, MatchRecord, MatchStatus, NewJudgingScore, StoreError,
};

/// Create all HTTP routes, including the SSE stream.
pub fn routes() -> Router<Arc<App>> {
    Router::new()
        .route("/health", get(health))
        .route("/matches", post(create_match).get(list_matches))
        .route("/matches/{id}", get(get_match))
        .route("/matches/{id}/events", get(crate::api::stream::stream_events))
        .route("/matches/{id}/artifacts", get(get_artifacts))
        .route("/matches/{id}/judging/blind", get(get_blind_package))
        .route(
            "/matches/{id}/judging/scores",
            post(submit_score).get(list_scores),
        )
        .route("/matches/{id}/judging/reveal", get(reveal_mapping))
}

// =============================================================================
// DTOs
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateMatchRequest {
    pub seed: Option<i64>,
    #[serde(default = "default_tier")]
    pub tier: u8,
}

fn default_tier() -> u8 {
    1
}

#[derive(Debug, Serialize)]
pub struct MatchSummary {
    pub match_id: MatchId,
    pub status: MatchStatus,
}

#[derive(Debug, Serialize)]
pub struct MatchDetail {
    pub match_id: MatchId,
    pub status: MatchStatus,
    pub created_at: DateTime<Utc>,
    pub seed: i64,
    pub tier: u8,
    pub challenge: Option<Challenge>,
    pub completed_at: Option<DateTime<Utc>>,
    pub canon_hash_a: Option<String>,
    pub canon_hash_b: Option<String>,
    pub error: Option<String>,
}

impl From<MatchRecord> for MatchDetail {
    fn from(record: MatchRecord) -> Self {
        Self {
            match_id: record.match_id,
            status: record.status,
            created_at: record.created_at,
            seed: record.seed,
            tier: record.tier,
            challenge: record.challenge,
            completed_at: record.completed_at,
            canon_hash_a: record.canon_hash_a,
            canon_hash_b: record.canon_hash_b,
            error: record.error,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TeamArtifacts {
    pub canon: Option<Value>,
    pub prompt_pack: Option<PromptPack>,
}

#[derive(Debug, Serialize)]
pub struct ArtifactsResponse {
    pub match_id: MatchId,
    pub team_a: TeamArtifacts,
    pub team_b: TeamArtifacts,
}

#[derive(Debug, Serialize)]
pub struct BlindJudgingEntry {
    pub blind_id: String,
    pub canon: Value,
    pub prompt_pack: Option<PromptPack>,
}

#[derive(Debug, Serialize)]
pub struct BlindJudgingPackage {
    pub match_id: MatchId,
    pub entries: Vec<BlindJudgingEntry>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitScoreRequest {
    pub judge: String,
    pub blind_id: String,
    pub scores: JudgingScores,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct JudgingScoreResponse {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub judge: String,
    pub blind_id: String,
    pub scores: JudgingScores,
    pub notes: Option<String>,
    pub weighted_total: f64,
}

// =============================================================================
// Handlers
// =============================================================================

async fn health() -> Json<Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn create_match(
    State(app): State<Arc<App>>,
    Json(request): Json<CreateMatchRequest>,
) -> Result<(StatusCode, Json<MatchSummary>), ApiError> {
    let record = app
        .matches
        .create(request.seed, request.tier)
        .await
        .map_err(|e| match e {
            crate::engine::runner::ServiceError::InvalidTier(e) => ApiError::BadRequest(e.to_string()),
            crate::engine::runner::ServiceError::Store(e) => e.into(),
        })?;
    Ok((
        StatusCode::CREATED,
        Json(MatchSummary {
            match_id: record.match_id,
            status: record.status,
        }),
    ))
}

async fn list_matches(State(app): State<Arc<App>>) -> Result<Json<Vec<MatchSummary>>, ApiError> {
    let records = app.store.list_matches().await?;
    Ok(Json(
        records
            .into_iter()
            .map(|record| MatchSummary {
                match_id: record.match_id,
                status: record.status,
            })
            .collect(),
    ))
}

async fn get_match(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
) -> Result<Json<MatchDetail>, ApiError> {
    let record = app
        .store
        .get_match(MatchId::from_uuid(id))
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(record.into()))
}

async fn get_artifacts(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ArtifactsResponse>, ApiError> {
    let match_id = MatchId::from_uuid(id);
    app.store
        .get_match(match_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let events = app.store.list_events(match_id, 0).await?;
    let team_a_canon = views::derive_team_canon(&events, TeamId::A);
    let team_b_canon = views::derive_team_canon(&events, TeamId::B);
    // Nothing to show until both canons exist in the log.
    if team_a_canon.is_none() || team_b_canon.is_none() {
        return Err(ApiError::NotFound);
    }

    Ok(Json(ArtifactsResponse {
        match_id,
        team_a: TeamArtifacts {
            canon: team_a_canon,
            prompt_pack: views::derive_team_prompt_pack(&events, TeamId::A),
        },
        team_b: TeamArtifacts {
            canon: team_b_canon,
            prompt_pack: views::derive_team_prompt_pack(&events, TeamId::B),
        },
    }))
}

/// Load a match that has completed; judging routes 404 otherwise.
async fn completed_match(app: &App, match_id: MatchId) -> Result<MatchRecord, ApiError> {
    let record = app
        .store
        .get_match(match_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if record.status != MatchStatus::Completed {
        return Err(ApiError::NotFound);
    }
    Ok(record)
}

async fn get_blind_package(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
) -> Result<Json<BlindJudgingPackage>, ApiError> {
    let match_id = MatchId::from_uuid(id);
    completed_match(&app, match_id).await?;

    let events = app.store.list_events(match_id, 0).await?;
    let mapping = judging::get_or_assign_mapping(&app.store, match_id).await?;

    let entry = |blind_id: &str, team_id: TeamId| -> Result<BlindJudgingEntry, ApiError> {
        let canon = views::derive_team_canon(&events, team_id).ok_or_else(|| {
            ApiError::Internal(format!("missing canon_initialized events for team {team_id}"))
        })?;
        Ok(BlindJudgingEntry {
            blind_id: blind_id.to_string(),
            canon,
            prompt_pack: views::derive_team_prompt_pack(&events, team_id),
        })
    };

    Ok(Json(BlindJudgingPackage {
        match_id,
        entries: vec![
            entry(judging::BLIND_IDS[0], mapping.world_1)?,
            entry(judging::BLIND_IDS[1], mapping.world_2)?,
        ],
    }))
}

async fn submit_score(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
    Json(request): Json<SubmitScoreRequest>,
) -> Result<Json<JudgingScoreResponse>, ApiError> {
    let match_id = MatchId::from_uuid(id);
    completed_match(&app, match_id).await?;

    if request.judge.trim().is_empty() {
        return Err(ApiError::BadRequest("judge must not be empty".into()));
    }
    if !judging::BLIND_IDS.contains(&request.blind_id.as_str()) {
        return Err(ApiError::BadRequest(format!(
            "unknown blind_id '{}'",
            request.blind_id
        )));
    }
    if request.scores.all().iter().any(|s| !(1..=5).contains(s)) {
        return Err(ApiError::BadRequest(
            "each score must be between 1 and 5".into(),
        ));
    }

    let record = app
        .store
        .add_judging_score(&NewJudgingScore {
            match_id,
            created_at: Utc::now(),
            judge: request.judge,
            blind_id: request.blind_id,
            scores: request.scores,
            notes: request.notes,
        })
        .await?;

    let weighted_total = judging::weighted_total(&record.scores);
    Ok(Json(JudgingScoreResponse {
        id: record.id,
        created_at: record.created_at,
        judge: record.judge,
        blind_id: record.blind_id,
        scores: record.scores,
        notes: record.notes,
        weighted_total,
    }))
}

async fn list_scores(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<JudgingScoreResponse>>, ApiError> {
    let match_id = MatchId::from_uuid(id);
    app.store
        .get_match(match_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let records = app.store.list_judging_scores(match_id).await?;
    Ok(Json(
        records
            .into_iter()
            .map(|record| {
                let weighted_total = judging::weighted_total(&record.scores);
                JudgingScoreResponse {
                    id: record.id,
                    created_at: record.created_at,
                    judge: record.judge,
                    blind_id: record.blind_id,
                    scores: record.scores,
                    notes: record.notes,
                    weighted_total,
                }
            })
            .collect(),
    ))
}

async fn reveal_mapping(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
) -> Result<Json<BTreeMap<String, String>>, ApiError> {
    let match_id = MatchId::from_uuid(id);
    completed_match(&app, match_id).await?;

    let mapping = judging::get_or_assign_mapping(&app.store, match_id).await?;
    let mut reveal = BTreeMap::new();
    reveal.insert(
        judging::BLIND_IDS[0].to_string(),
        mapping.world_1.to_string(),
    );
    reveal.insert(
        judging::BLIND_IDS[1].to_string(),
        mapping.world_2.to_string(),
    );
    Ok(Json(reveal))
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug)]
pub enum ApiError {
    NotFound,
    BadRequest(String),
    Internal(String),
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Not found").into_response(),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ApiError::NotFound,
            other => ApiError::Internal(other.to_string()),
        }
    }
}
