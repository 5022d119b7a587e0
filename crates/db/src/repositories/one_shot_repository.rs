use crate::error::DbError;
use crate::models::{OneShotRecord, OneShotRow};
use serde_json::Value;
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct OneShotRepository {
    pool: SqlitePool,
}

impl OneShotRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, run_id: &str, call_id: &str) -> Result<Option<Value>, DbError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT result FROM one_shot_results WHERE run_id = ? AND call_id = ?",
        )
        .bind(run_id)
        .bind(call_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((raw,)) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Store `result` unless a value was already recorded for the call, and
    /// return whichever value is now on record.
    pub async fn record(&self, run_id: &str, call_id: &str, result: &Value) -> Result<Value, DbError> {
        let raw = serde_json::to_string(result)?;

        sqlx::query(
            r#"
            INSERT INTO one_shot_results (run_id, call_id, result, recorded_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(run_id, call_id) DO NOTHING
            "#,
        )
        .bind(run_id)
        .bind(call_id)
        .bind(&raw)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        self.find(run_id, call_id)
            .await?
            .ok_or_else(|| DbError::RunNotFound(run_id.to_string()))
    }

    pub async fn find_by_run(&self, run_id: &str) -> Result<Vec<OneShotRecord>, DbError> {
        let rows: Vec<OneShotRow> = sqlx::query_as(
            r#"
            SELECT run_id, call_id, result, recorded_at
            FROM one_shot_results
            WHERE run_id = ?
            ORDER BY recorded_at ASC, call_id ASC
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_domain()).collect())
    }
}
