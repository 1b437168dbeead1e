//! SQLite-based run history

use crate::core::ExecutionStatus;
use crate::persistence::{JobSummary, PersistenceBackend, RunSummary};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

const RUN_COLUMNS: &str = "id, pipeline_name, status, started_at, completed_at, \
     total_jobs, passed_jobs, failed_jobs, cancelled_jobs";

/// SQLite run store
pub struct SqliteRunStore {
    pool: SqlitePool,
}

impl SqliteRunStore {
    /// Open (or create) a store at `db_path`; `:memory:` is supported
    pub async fn new(db_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path))
            .context("Invalid database path")?
            .create_if_missing(true);

        // One connection so an in-memory database is shared by every query
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Create store under the user's data directory
    pub async fn with_default_path() -> Result<Self> {
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
        let db_dir = data_dir.join("matrix-ci");
        std::fs::create_dir_all(&db_dir)
            .with_context(|| format!("Failed to create {}", db_dir.display()))?;

        Self::at(&db_dir.join("executions.db")).await
    }

    pub async fn at(path: &Path) -> Result<Self> {
        let path = path
            .to_str()
            .with_context(|| format!("Database path is not valid UTF-8: {}", path.display()))?;
        Self::new(path).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                pipeline_name TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                total_jobs INTEGER NOT NULL DEFAULT 0,
                passed_jobs INTEGER NOT NULL DEFAULT 0,
                failed_jobs INTEGER NOT NULL DEFAULT 0,
                cancelled_jobs INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS job_results (
                run_id TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
                number INTEGER NOT NULL,
                name TEXT NOT NULL,
                status TEXT NOT NULL,
                phase TEXT,
                error TEXT,
                allow_failure INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (run_id, number)
            );

            CREATE INDEX IF NOT EXISTS idx_runs_pipeline_name ON runs(pipeline_name);
            CREATE INDEX IF NOT EXISTS idx_runs_started_at ON runs(started_at);
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to initialise schema")?;

        Ok(())
    }

    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn parse_status(value: &str) -> Result<ExecutionStatus> {
        ExecutionStatus::parse(value).ok_or_else(|| anyhow!("Unknown status '{}' in history", value))
    }

    fn run_from_row(row: &SqliteRow) -> Result<RunSummary> {
        Ok(RunSummary {
            execution_id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            pipeline_name: row.get("pipeline_name"),
            status: Self::parse_status(&row.get::<String, _>("status"))?,
            started_at: Self::from_naive(row.get("started_at")),
            completed_at: row
                .get::<Option<NaiveDateTime>, _>("completed_at")
                .map(Self::from_naive),
            total_jobs: row.get::<i64, _>("total_jobs") as usize,
            passed_jobs: row.get::<i64, _>("passed_jobs") as usize,
            failed_jobs: row.get::<i64, _>("failed_jobs") as usize,
            cancelled_jobs: row.get::<i64, _>("cancelled_jobs") as usize,
            jobs: Vec::new(),
        })
    }

    async fn load_jobs(&self, execution_id: Uuid) -> Result<Vec<JobSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT number, name, status, phase, error, allow_failure
            FROM job_results
            WHERE run_id = ?1
            ORDER BY number ASC
            "#,
        )
        .bind(execution_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to load job results")?;

        rows.iter()
            .map(|row| {
                Ok(JobSummary {
                    number: row.get::<i64, _>("number") as usize,
                    name: row.get("name"),
                    status: Self::parse_status(&row.get::<String, _>("status"))?,
                    phase: row.get("phase"),
                    error: row.get("error"),
                    allow_failure: row.get::<i64, _>("allow_failure") != 0,
                })
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for SqliteRunStore {
    async fn save_run(&self, run: &RunSummary) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to start transaction")?;
        let id = run.execution_id.to_string();

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO runs
            (id, pipeline_name, status, started_at, completed_at,
             total_jobs, passed_jobs, failed_jobs, cancelled_jobs)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&id)
        .bind(&run.pipeline_name)
        .bind(run.status.as_str())
        .bind(Self::to_naive(run.started_at))
        .bind(run.completed_at.map(Self::to_naive))
        .bind(run.total_jobs as i64)
        .bind(run.passed_jobs as i64)
        .bind(run.failed_jobs as i64)
        .bind(run.cancelled_jobs as i64)
        .execute(&mut *tx)
        .await
        .context("Failed to save run")?;

        sqlx::query("DELETE FROM job_results WHERE run_id = ?1")
            .bind(&id)
            .execute(&mut *tx)
            .await
            .context("Failed to replace job results")?;

        for job in &run.jobs {
            sqlx::query(
                r#"
                INSERT INTO job_results (run_id, number, name, status, phase, error, allow_failure)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(&id)
            .bind(job.number as i64)
            .bind(&job.name)
            .bind(job.status.as_str())
            .bind(job.phase.as_deref())
            .bind(job.error.as_deref())
            .bind(job.allow_failure as i64)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to save result of job {}", job.number))?;
        }

        tx.commit().await.context("Failed to commit run")?;
        Ok(())
    }

    async fn load_run(&self, execution_id: Uuid) -> Result<Option<RunSummary>> {
        let row = sqlx::query(&format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS))
            .bind(execution_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load run")?;

        match row {
            Some(row) => {
                let mut run = Self::run_from_row(&row)?;
                run.jobs = self.load_jobs(execution_id).await?;
                Ok(Some(run))
            }
            None => Ok(None),
        }
    }

    async fn list_runs(&self, pipeline_name: &str) -> Result<Vec<RunSummary>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM runs WHERE pipeline_name = ?1 ORDER BY started_at DESC",
            RUN_COLUMNS
        ))
        .bind(pipeline_name)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list runs")?;

        let mut runs = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut run = Self::run_from_row(row)?;
            run.jobs = self.load_jobs(run.execution_id).await?;
            runs.push(run);
        }
        Ok(runs)
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT pipeline_name FROM runs ORDER BY pipeline_name ASC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list pipelines")?;

        Ok(rows.iter().map(|row| row.get("pipeline_name")).collect())
    }
}
