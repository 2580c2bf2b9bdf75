use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::types::Json;
use tracing::{debug, info};

use crate::{NodeEntry, NodeEvent, Recorder, RunOutcome, RunRecord, RunStatus, StoreError};

/// SQLite-based recorder.
pub struct SqliteRecorder {
  pool: SqlitePool,
}

impl SqliteRecorder {
  /// Create a new SQLite recorder with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Open (creating if needed) a database file and bring its schema up to
  /// date.
  pub async fn open(path: &Path) -> Result<Self, StoreError> {
    let options = SqliteConnectOptions::new()
      .filename(path)
      .create_if_missing(true)
      .foreign_keys(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    let recorder = Self::new(pool);
    recorder.migrate().await?;
    info!(path = %path.display(), "run_database_opened");
    Ok(recorder)
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(&self.pool).await?;
    debug!("run_database_migrated");
    Ok(())
  }

  /// Explain why a conditional update touched no rows.
  async fn not_updated(&self, run_id: &str) -> StoreError {
    match self.get_run(run_id).await {
      Ok(_) => StoreError::AlreadyFinalized(run_id.to_string()),
      Err(e) => e,
    }
  }
}

#[async_trait]
impl Recorder for SqliteRecorder {
  async fn create_run(&self, run: &RunRecord) -> Result<(), StoreError> {
    sqlx::query(
      r#"
      INSERT INTO runs (run_id, workflow_id, reason, status, graph, error, error_node, artifacts, started_at, completed_at)
      VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
      "#,
    )
    .bind(&run.run_id)
    .bind(&run.workflow_id)
    .bind(run.reason)
    .bind(run.status)
    .bind(&run.graph)
    .bind(&run.error)
    .bind(&run.error_node)
    .bind(&run.artifacts)
    .bind(run.started_at)
    .bind(run.completed_at)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn mark_running(&self, run_id: &str) -> Result<(), StoreError> {
    let result = sqlx::query(
      r#"
      UPDATE runs
      SET status = ?
      WHERE run_id = ? AND status IN ('pending', 'running')
      "#,
    )
    .bind(RunStatus::Running)
    .bind(run_id)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      return Err(self.not_updated(run_id).await);
    }
    Ok(())
  }

  async fn append(&self, run_id: &str, entry: NodeEntry) -> Result<NodeEvent, StoreError> {
    // The sequence number is assigned inside the insert so concurrent
    // writers to the same run never collide.
    let event: NodeEvent = sqlx::query_as(
      r#"
      INSERT INTO node_events (run_id, seq, node_id, status, attempt, output, error, recorded_at)
      SELECT ?, COALESCE(MAX(seq), 0) + 1, ?, ?, ?, ?, ?, ?
      FROM node_events
      WHERE run_id = ?
      RETURNING run_id, seq, node_id, status, attempt, output, error, recorded_at
      "#,
    )
    .bind(run_id)
    .bind(&entry.node_id)
    .bind(entry.status)
    .bind(i64::from(entry.attempt))
    .bind(entry.output.map(Json))
    .bind(&entry.error)
    .bind(Utc::now())
    .bind(run_id)
    .fetch_one(&self.pool)
    .await
    .map_err(|e| match e {
      // Foreign key failures surface as database errors; report a missing run plainly.
      sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
        StoreError::NotFound(run_id.to_string())
      }
      other => StoreError::Database(other),
    })?;

    Ok(event)
  }

  async fn finalize(&self, run_id: &str, outcome: RunOutcome) -> Result<(), StoreError> {
    if !outcome.status.is_terminal() {
      return Err(StoreError::NotTerminal(outcome.status));
    }

    let result = sqlx::query(
      r#"
      UPDATE runs
      SET status = ?, error = ?, error_node = ?, artifacts = ?, completed_at = ?
      WHERE run_id = ? AND status NOT IN ('succeeded', 'failed', 'canceled')
      "#,
    )
    .bind(outcome.status)
    .bind(&outcome.error)
    .bind(&outcome.error_node)
    .bind(Json(&outcome.artifacts))
    .bind(Utc::now())
    .bind(run_id)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      return Err(self.not_updated(run_id).await);
    }
    Ok(())
  }

  async fn get_run(&self, run_id: &str) -> Result<RunRecord, StoreError> {
    sqlx::query_as(
      r#"
      SELECT run_id, workflow_id, reason, status, graph, error, error_node, artifacts, started_at, completed_at
      FROM runs
      WHERE run_id = ?
      "#,
    )
    .bind(run_id)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| StoreError::NotFound(run_id.to_string()))
  }

  async fn timeline(&self, run_id: &str) -> Result<Vec<NodeEvent>, StoreError> {
    let events: Vec<NodeEvent> = sqlx::query_as(
      r#"
      SELECT run_id, seq, node_id, status, attempt, output, error, recorded_at
      FROM node_events
      WHERE run_id = ?
      ORDER BY seq ASC
      "#,
    )
    .bind(run_id)
    .fetch_all(&self.pool)
    .await?;

    Ok(events)
  }

  async fn list_runs(&self, workflow_id: &str) -> Result<Vec<RunRecord>, StoreError> {
    let runs: Vec<RunRecord> = sqlx::query_as(
      r#"
      SELECT run_id, workflow_id, reason, status, graph, error, error_node, artifacts, started_at, completed_at
      FROM runs
      WHERE workflow_id = ?
      ORDER BY started_at DESC, rowid DESC
      "#,
    )
    .bind(workflow_id)
    .fetch_all(&self.pool)
    .await?;

    Ok(runs)
  }
}
