use crate::error::DbError;
use crate::models::{RunRecord, RunRow, RunStatus};
use migrator_core::RunRequest;
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct RunRepository {
    pool: SqlitePool,
}

impl RunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, run_id: &str) -> Result<Option<RunRecord>, DbError> {
        let row: Option<RunRow> = sqlx::query_as(
            r#"
            SELECT run_id, parent_run_id, request, status, attempts, error, created_at, updated_at
            FROM workflow_runs
            WHERE run_id = ?
            "#,
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_domain()))
    }

    /// Claim a new attempt of `run_id`, creating the record on first use.
    ///
    /// An existing record keeps its original request and parent; only its
    /// status, attempt counter and error are reset. A record that is still
    /// `running` is not claimed and yields [`DbError::RunInProgress`].
    pub async fn begin_attempt(
        &self,
        run_id: &str,
        parent_run_id: Option<&str>,
        request: &RunRequest,
    ) -> Result<RunRecord, DbError> {
        let request_json = serde_json::to_string(request)?;
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO workflow_runs (run_id, parent_run_id, request, status, attempts, error, created_at, updated_at)
            VALUES (?, ?, ?, 'running', 1, NULL, ?, ?)
            ON CONFLICT(run_id) DO UPDATE SET
                status = 'running',
                attempts = workflow_runs.attempts + 1,
                error = NULL,
                updated_at = excluded.updated_at
            WHERE workflow_runs.status != 'running'
            "#,
        )
        .bind(run_id)
        .bind(parent_run_id)
        .bind(&request_json)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::RunInProgress(run_id.to_string()));
        }

        self.find(run_id)
            .await?
            .ok_or_else(|| DbError::RunNotFound(run_id.to_string()))
    }

    /// Mark `run_id` and every descendant still `running` as failed.
    ///
    /// Used to take over a run whose previous owner went away without
    /// finishing. Returns how many records were released.
    pub async fn abandon(&self, run_id: &str, reason: &str) -> Result<u64, DbError> {
        let result = sqlx::query(
            r#"
            WITH RECURSIVE tree(run_id) AS (
                SELECT run_id FROM workflow_runs WHERE run_id = ?
                UNION ALL
                SELECT w.run_id FROM workflow_runs w JOIN tree t ON w.parent_run_id = t.run_id
            )
            UPDATE workflow_runs
            SET status = 'failed', error = ?, updated_at = ?
            WHERE status = 'running' AND run_id IN (SELECT run_id FROM tree)
            "#,
        )
        .bind(run_id)
        .bind(reason)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn mark_completed(&self, run_id: &str) -> Result<(), DbError> {
        self.set_status(run_id, RunStatus::Completed, None).await
    }

    pub async fn mark_failed(&self, run_id: &str, error: &str) -> Result<(), DbError> {
        self.set_status(run_id, RunStatus::Failed, Some(error)).await
    }

    async fn set_status(
        &self,
        run_id: &str,
        status: RunStatus,
        error: Option<&str>,
    ) -> Result<(), DbError> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_runs
            SET status = ?, error = ?, updated_at = ?
            WHERE run_id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(error)
        .bind(chrono::Utc::now().timestamp())
        .bind(run_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::RunNotFound(run_id.to_string()));
        }

        Ok(())
    }

    /// Child invocations of `parent_run_id` in submission order.
    pub async fn find_children(&self, parent_run_id: &str) -> Result<Vec<RunRecord>, DbError> {
        let rows: Vec<RunRow> = sqlx::query_as(
            r#"
            SELECT run_id, parent_run_id, request, status, attempts, error, created_at, updated_at
            FROM workflow_runs
            WHERE parent_run_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(parent_run_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_domain()).collect())
    }

    /// Top-level runs, newest first.
    pub async fn find_roots(&self) -> Result<Vec<RunRecord>, DbError> {
        let rows: Vec<RunRow> = sqlx::query_as(
            r#"
            SELECT run_id, parent_run_id, request, status, attempts, error, created_at, updated_at
            FROM workflow_runs
            WHERE parent_run_id IS NULL
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_domain()).collect())
    }
}
