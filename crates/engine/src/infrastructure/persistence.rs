//! SQLite-backed match store.
//!
//! One database holds every match: the `matches` record table, the
//! append-only `events` log keyed `(match_id, seq)`, judging scores, and
//! the blind-judging mapping. Event payloads are stored as JSON text.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use worldbuild_domain::{Challenge, MatchEvent, MatchId, TeamId};

use crate::infrastructure::ports::{
    BlindMapping, JudgingScoreRecord, JudgingScores, MatchRecord, MatchStatus, MatchStore,
    NewJudgingScore, StoreError,
};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `db_path` and ensure the
    /// schema exists.
    pub async fn new(db_path: &str) -> Result<Self, StoreError> {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Database(e.to_string()))?;
            }
        }

        let pool = SqlitePool::connect(&format!("sqlite:{db_path}?mode=rwc"))
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS matches (
                match_id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                status TEXT NOT NULL,
                seed INTEGER NOT NULL,
                tier INTEGER NOT NULL,
                challenge_json TEXT,
                completed_at TEXT,
                canon_hash_a TEXT,
                canon_hash_b TEXT,
                error TEXT
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS events (
                match_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                event_json TEXT NOT NULL,
                PRIMARY KEY (match_id, seq)
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_events_match_seq ON events(match_id, seq)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS judging_scores (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                match_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                judge TEXT NOT NULL,
                blind_id TEXT NOT NULL,
                scores_json TEXT NOT NULL,
                notes TEXT
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS blind_mapping (
                match_id TEXT PRIMARY KEY,
                world_1_team TEXT NOT NULL,
                world_2_team TEXT NOT NULL
            )
            "#,
        ];
        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;
        }
        Ok(())
    }

    fn row_to_match(row: sqlx::sqlite::SqliteRow) -> Result<MatchRecord, StoreError> {
        let match_id: String = row.get("match_id");
        let match_id = Uuid::parse_str(&match_id)
            .map(MatchId::from_uuid)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let status: String = row.get("status");
        let status = match status.as_str() {
            "running" => MatchStatus::Running,
            "completed" => MatchStatus::Completed,
            "failed" => MatchStatus::Failed,
            other => {
                return Err(StoreError::Serialization(format!(
                    "unknown match status '{other}'"
                )))
            }
        };

        let challenge_json: Option<String> = row.get("challenge_json");
        let challenge = challenge_json
            .map(|raw| serde_json::from_str::<Challenge>(&raw))
            .transpose()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        Ok(MatchRecord {
            match_id,
            created_at: parse_ts(row.get("created_at"))?,
            status,
            seed: row.get("seed"),
            tier: row.get::<i64, _>("tier") as u8,
            challenge,
            completed_at: row
                .get::<Option<String>, _>("completed_at")
                .map(parse_ts)
                .transpose()?,
            canon_hash_a: row.get("canon_hash_a"),
            canon_hash_b: row.get("canon_hash_b"),
            error: row.get("error"),
        })
    }

    fn row_to_score(row: sqlx::sqlite::SqliteRow) -> Result<JudgingScoreRecord, StoreError> {
        let scores_json: String = row.get("scores_json");
        let scores: JudgingScores = serde_json::from_str(&scores_json)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(JudgingScoreRecord {
            id: row.get("id"),
            created_at: parse_ts(row.get("created_at"))?,
            judge: row.get("judge"),
            blind_id: row.get("blind_id"),
            scores,
            notes: row.get("notes"),
        })
    }
}

fn parse_ts(raw: String) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(e.to_string()))
}

fn parse_team(raw: &str) -> Result<TeamId, StoreError> {
    match raw {
        "A" => Ok(TeamId::A),
        "B" => Ok(TeamId::B),
        other => Err(StoreError::Serialization(format!(
            "unknown team id '{other}'"
        ))),
    }
}

#[async_trait]
impl MatchStore for SqliteStore {
    async fn create_match(&self, record: &MatchRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO matches(match_id, created_at, status, seed, tier)
            VALUES(?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.match_id.to_string())
        .bind(record.created_at.to_rfc3339())
        .bind(record.status.as_str())
        .bind(record.seed)
        .bind(record.tier as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    async fn get_match(&self, match_id: MatchId) -> Result<Option<MatchRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM matches WHERE match_id = ?")
            .bind(match_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        row.map(Self::row_to_match).transpose()
    }

    async fn list_matches(&self) -> Result<Vec<MatchRecord>, StoreError> {
        let rows = sqlx::query("SELECT * FROM matches ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        rows.into_iter().map(Self::row_to_match).collect()
    }

    async fn set_challenge(
        &self,
        match_id: MatchId,
        challenge: &Challenge,
    ) -> Result<(), StoreError> {
        let challenge_json = serde_json::to_string(challenge)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        sqlx::query("UPDATE matches SET challenge_json = ? WHERE match_id = ?")
            .bind(challenge_json)
            .bind(match_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    async fn mark_completed(
        &self,
        match_id: MatchId,
        completed_at: DateTime<Utc>,
        canon_hash_a: &str,
        canon_hash_b: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE matches
            SET status = 'completed', completed_at = ?, canon_hash_a = ?, canon_hash_b = ?, error = NULL
            WHERE match_id = ?
            "#,
        )
        .bind(completed_at.to_rfc3339())
        .bind(canon_hash_a)
        .bind(canon_hash_b)
        .bind(match_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    async fn mark_failed(
        &self,
        match_id: MatchId,
        completed_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE matches
            SET status = 'failed', completed_at = ?, error = ?
            WHERE match_id = ?
            "#,
        )
        .bind(completed_at.to_rfc3339())
        .bind(error)
        .bind(match_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    async fn append_event(&self, event: &MatchEvent) -> Result<(), StoreError> {
        let event_json =
            serde_json::to_string(event).map_err(|e| StoreError::Serialization(e.to_string()))?;
        sqlx::query("INSERT INTO events(match_id, seq, event_json) VALUES(?, ?, ?)")
            .bind(event.match_id.to_string())
            .bind(event.seq)
            .bind(event_json)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    async fn list_events(
        &self,
        match_id: MatchId,
        after_seq: i64,
    ) -> Result<Vec<MatchEvent>, StoreError> {
        let rows = sqlx::query(
            "SELECT event_json FROM events WHERE match_id = ? AND seq > ? ORDER BY seq ASC",
        )
        .bind(match_id.to_string())
        .bind(after_seq)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                let event_json: String = row.get("event_json");
                serde_json::from_str(&event_json)
                    .map_err(|e| StoreError::Serialization(e.to_string()))
            })
            .collect()
    }

    async fn add_judging_score(
        &self,
        score: &NewJudgingScore,
    ) -> Result<JudgingScoreRecord, StoreError> {
        let scores_json = serde_json::to_string(&score.scores)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let result = sqlx::query(
            r#"
            INSERT INTO judging_scores(match_id, created_at, judge, blind_id, scores_json, notes)
            VALUES(?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(score.match_id.to_string())
        .bind(score.created_at.to_rfc3339())
        .bind(&score.judge)
        .bind(&score.blind_id)
        .bind(scores_json)
        .bind(&score.notes)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(JudgingScoreRecord {
            id: result.last_insert_rowid(),
            created_at: score.created_at,
            judge: score.judge.clone(),
            blind_id: score.blind_id.clone(),
            scores: score.scores,
            notes: score.notes.clone(),
        })
    }

    async fn list_judging_scores(
        &self,
        match_id: MatchId,
    ) -> Result<Vec<JudgingScoreRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, created_at, judge, blind_id, scores_json, notes
             FROM judging_scores WHERE match_id = ? ORDER BY id ASC",
        )
        .bind(match_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
        rows.into_iter().map(Self::row_to_score).collect()
    }

    async fn get_blind_mapping(
        &self,
        match_id: MatchId,
    ) -> Result<Option<BlindMapping>, StoreError> {
        let row = sqlx::query(
            "SELECT world_1_team, world_2_team FROM blind_mapping WHERE match_id = ?",
        )
        .bind(match_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        match row {
            Some(row) => {
                let world_1: String = row.get("world_1_team");
                let world_2: String = row.get("world_2_team");
                Ok(Some(BlindMapping {
                    world_1: parse_team(&world_1)?,
                    world_2: parse_team(&world_2)?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn save_blind_mapping(
        &self,
        match_id: MatchId,
        mapping: &BlindMapping,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO blind_mapping(match_id, world_1_team, world_2_team)
            VALUES(?, ?, ?)
            "#,
        )
        .bind(match_id.to_string())
        .bind(mapping.world_1.as_str())
        .bind(mapping.world_2.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }
}
