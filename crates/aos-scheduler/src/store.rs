use aos_core::{now_iso8601, Job, JobStatus, Workflow, WorkflowDefinition};
use aos_error::{AosError, AosResult, ErrorCode};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS workflows (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    definition_json TEXT NOT NULL,
    enabled INTEGER NOT NULL,
    created_ts TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    workflow_id TEXT NOT NULL,
    status TEXT NOT NULL,
    run_at TEXT NOT NULL,
    args_json TEXT NOT NULL,
    result_json TEXT,
    created_ts TEXT NOT NULL
);
";

/// Durable storage for [`Workflow`]s and their scheduled [`Job`]s (§3, §4.6).
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Inserts or replaces a workflow definition.
    async fn upsert_workflow(&self, workflow: &Workflow) -> AosResult<()>;
    /// Looks up a workflow by id.
    async fn get_workflow(&self, id: &str) -> AosResult<Option<Workflow>>;
    /// Lists every workflow, oldest first.
    async fn list_workflows(&self) -> AosResult<Vec<Workflow>>;
    /// Schedules a new job for `workflow_id`, due at `run_at`, returning its
    /// generated id.
    async fn schedule_job(&self, workflow_id: &str, run_at: &str, args_json: Value) -> AosResult<String>;
    /// Jobs with `status = pending` and `run_at <= now`, ordered by id
    /// ascending (§4.6 step 1).
    async fn due_jobs(&self, now_iso: &str) -> AosResult<Vec<Job>>;
    /// Records a job's terminal status and result summary.
    async fn mark_job_result(&self, job_id: &str, status: JobStatus, result_json: Value) -> AosResult<()>;
    /// Looks up a job by id.
    async fn get_job(&self, id: &str) -> AosResult<Option<Job>>;
    /// Lists every job, oldest first.
    async fn list_jobs(&self) -> AosResult<Vec<Job>>;
}

/// SQLite-backed [`JobStore`], mirroring the original chat/workflow database.
pub struct SqliteJobStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteJobStore {
    /// Opens (creating if necessary) the database at `db_path` and ensures
    /// its schema exists.
    pub fn open(db_path: impl Into<PathBuf>) -> AosResult<Self> {
        let conn = Connection::open(db_path.into())
            .map_err(|e| AosError::new(ErrorCode::Internal, "cannot open scheduler database").with_source(e))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| AosError::new(ErrorCode::Internal, "cannot create scheduler schema").with_source(e))?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// Opens an in-memory database, useful for tests.
    pub fn open_in_memory() -> AosResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AosError::new(ErrorCode::Internal, "cannot open in-memory scheduler database").with_source(e))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| AosError::new(ErrorCode::Internal, "cannot create scheduler schema").with_source(e))?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }
}

fn sql_err(e: rusqlite::Error) -> AosError {
    AosError::new(ErrorCode::Internal, "sqlite query failed").with_source(e)
}

fn join_err(e: tokio::task::JoinError) -> AosError {
    AosError::new(ErrorCode::Internal, "blocking sqlite task panicked").with_source(e)
}

fn status_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "pending",
        JobStatus::Done => "done",
        JobStatus::Failed => "failed",
    }
}

fn status_from_str(s: &str) -> AosResult<JobStatus> {
    match s {
        "pending" => Ok(JobStatus::Pending),
        "done" => Ok(JobStatus::Done),
        "failed" => Ok(JobStatus::Failed),
        other => Err(AosError::new(ErrorCode::Internal, format!("unknown job status in database: {other}"))),
    }
}

fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<(String, String, String, String, String, Option<String>, String)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn decode_job(raw: (String, String, String, String, String, Option<String>, String)) -> AosResult<Job> {
    let (id, workflow_id, status, run_at, args_json, result_json, created_ts) = raw;
    Ok(Job {
        id,
        workflow_id,
        status: status_from_str(&status)?,
        run_at,
        args_json: serde_json::from_str(&args_json)
            .map_err(|e| AosError::new(ErrorCode::Internal, "corrupt args_json in jobs table").with_source(e))?,
        result_json: result_json
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| AosError::new(ErrorCode::Internal, "corrupt result_json in jobs table").with_source(e))?,
        created_ts,
    })
}

fn decode_workflow(
    id: String,
    name: String,
    definition_json: String,
    enabled: bool,
    created_ts: String,
) -> AosResult<Workflow> {
    let definition: WorkflowDefinition = serde_json::from_str(&definition_json)
        .map_err(|e| AosError::new(ErrorCode::Internal, "corrupt definition_json in workflows table").with_source(e))?;
    Ok(Workflow { id, name, definition, enabled, created_ts })
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn upsert_workflow(&self, workflow: &Workflow) -> AosResult<()> {
        let conn = self.conn.clone();
        let workflow = workflow.clone();
        tokio::task::spawn_blocking(move || {
            let definition_json = serde_json::to_string(&workflow.definition)
                .map_err(|e| AosError::new(ErrorCode::Internal, "cannot serialize workflow definition").with_source(e))?;
            let conn = conn.lock().expect("scheduler connection mutex poisoned");
            conn.execute(
                "INSERT INTO workflows (id, name, definition_json, enabled, created_ts)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET name=excluded.name, definition_json=excluded.definition_json, enabled=excluded.enabled",
                params![workflow.id, workflow.name, definition_json, workflow.enabled as i64, workflow.created_ts],
            )
            .map_err(sql_err)?;
            Ok(())
        })
        .await
        .map_err(join_err)?
    }

    async fn get_workflow(&self, id: &str) -> AosResult<Option<Workflow>> {
        let conn = self.conn.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().expect("scheduler connection mutex poisoned");
            let row = conn
                .query_row(
                    "SELECT id, name, definition_json, enabled, created_ts FROM workflows WHERE id = ?1",
                    params![id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, i64>(3)?,
                            row.get::<_, String>(4)?,
                        ))
                    },
                )
                .optional()
                .map_err(sql_err)?;
            row.map(|(id, name, def, enabled, ts)| decode_workflow(id, name, def, enabled != 0, ts))
                .transpose()
        })
        .await
        .map_err(join_err)?
    }

    async fn list_workflows(&self) -> AosResult<Vec<Workflow>> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().expect("scheduler connection mutex poisoned");
            let mut stmt = conn
                .prepare("SELECT id, name, definition_json, enabled, created_ts FROM workflows ORDER BY created_ts ASC")
                .map_err(sql_err)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })
                .map_err(sql_err)?;
            let mut out = Vec::new();
            for row in rows {
                let (id, name, def, enabled, ts) = row.map_err(sql_err)?;
                out.push(decode_workflow(id, name, def, enabled != 0, ts)?);
            }
            Ok(out)
        })
        .await
        .map_err(join_err)?
    }

    async fn schedule_job(&self, workflow_id: &str, run_at: &str, args_json: Value) -> AosResult<String> {
        let conn = self.conn.clone();
        let workflow_id = workflow_id.to_string();
        let run_at = run_at.to_string();
        let id = format!("j-{}", &uuid::Uuid::new_v4().simple().to_string()[..12]);
        let created_ts = now_iso8601();
        tokio::task::spawn_blocking({
            let id = id.clone();
            move || {
                let args_str = args_json.to_string();
                let conn = conn.lock().expect("scheduler connection mutex poisoned");
                conn.execute(
                    "INSERT INTO jobs (id, workflow_id, status, run_at, args_json, result_json, created_ts)
                     VALUES (?1, ?2, 'pending', ?3, ?4, NULL, ?5)",
                    params![id, workflow_id, run_at, args_str, created_ts],
                )
                .map_err(sql_err)?;
                Ok(())
            }
        })
        .await
        .map_err(join_err)??;
        Ok(id)
    }

    async fn due_jobs(&self, now_iso: &str) -> AosResult<Vec<Job>> {
        let conn = self.conn.clone();
        let now_iso = now_iso.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().expect("scheduler connection mutex poisoned");
            let mut stmt = conn
                .prepare(
                    "SELECT id, workflow_id, status, run_at, args_json, result_json, created_ts
                     FROM jobs WHERE status = 'pending' AND run_at <= ?1 ORDER BY id ASC",
                )
                .map_err(sql_err)?;
            let rows = stmt.query_map(params![now_iso], row_to_job).map_err(sql_err)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(decode_job(row.map_err(sql_err)?)?);
            }
            Ok(out)
        })
        .await
        .map_err(join_err)?
    }

    async fn mark_job_result(&self, job_id: &str, status: JobStatus, result_json: Value) -> AosResult<()> {
        let conn = self.conn.clone();
        let job_id = job_id.to_string();
        let status = status_str(status).to_string();
        tokio::task::spawn_blocking(move || {
            let result_str = result_json.to_string();
            let conn = conn.lock().expect("scheduler connection mutex poisoned");
            conn.execute(
                "UPDATE jobs SET status = ?1, result_json = ?2 WHERE id = ?3",
                params![status, result_str, job_id],
            )
            .map_err(sql_err)?;
            Ok(())
        })
        .await
        .map_err(join_err)?
    }

    async fn get_job(&self, id: &str) -> AosResult<Option<Job>> {
        let conn = self.conn.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().expect("scheduler connection mutex poisoned");
            let row = conn
                .query_row(
                    "SELECT id, workflow_id, status, run_at, args_json, result_json, created_ts FROM jobs WHERE id = ?1",
                    params![id],
                    row_to_job,
                )
                .optional()
                .map_err(sql_err)?;
            row.map(decode_job).transpose()
        })
        .await
        .map_err(join_err)?
    }

    async fn list_jobs(&self) -> AosResult<Vec<Job>> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().expect("scheduler connection mutex poisoned");
            let mut stmt = conn
                .prepare(
                    "SELECT id, workflow_id, status, run_at, args_json, result_json, created_ts
                     FROM jobs ORDER BY created_ts ASC",
                )
                .map_err(sql_err)?;
            let rows = stmt.query_map([], row_to_job).map_err(sql_err)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(decode_job(row.map_err(sql_err)?)?);
            }
            Ok(out)
        })
        .await
        .map_err(join_err)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aos_core::WorkflowStepType;
    use serde_json::json;

    fn sample_workflow() -> Workflow {
        Workflow {
            id: "w1".to_string(),
            name: "weekly".to_string(),
            definition: WorkflowDefinition::Steps {
                steps: vec![aos_core::WorkflowStep {
                    step_type: WorkflowStepType::Run,
                    args: json!({"out": "reports/w1.md"}),
                }],
            },
            enabled: true,
            created_ts: now_iso8601(),
        }
    }

    #[tokio::test]
    async fn upsert_then_get_workflow_roundtrips() {
        let store = SqliteJobStore::open_in_memory().unwrap();
        store.upsert_workflow(&sample_workflow()).await.unwrap();
        let fetched = store.get_workflow("w1").await.unwrap().unwrap();
        assert_eq!(fetched.name, "weekly");
    }

    #[tokio::test]
    async fn upsert_is_idempotent_by_replace() {
        let store = SqliteJobStore::open_in_memory().unwrap();
        let mut wf = sample_workflow();
        store.upsert_workflow(&wf).await.unwrap();
        wf.name = "weekly-v2".to_string();
        store.upsert_workflow(&wf).await.unwrap();
        let fetched = store.get_workflow("w1").await.unwrap().unwrap();
        assert_eq!(fetched.name, "weekly-v2");
        assert_eq!(store.list_workflows().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn schedule_job_and_read_it_back() {
        let store = SqliteJobStore::open_in_memory().unwrap();
        store.upsert_workflow(&sample_workflow()).await.unwrap();
        let job_id = store.schedule_job("w1", "2020-01-01T00:00:00.000Z", json!({"out": "x.md"})).await.unwrap();
        let job = store.get_job(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.workflow_id, "w1");
    }

    #[tokio::test]
    async fn due_jobs_only_returns_pending_jobs_not_yet_past_and_ordered_by_id() {
        let store = SqliteJobStore::open_in_memory().unwrap();
        store.upsert_workflow(&sample_workflow()).await.unwrap();
        let past = store.schedule_job("w1", "2020-01-01T00:00:00.000Z", json!({})).await.unwrap();
        let _future = store.schedule_job("w1", "2999-01-01T00:00:00.000Z", json!({})).await.unwrap();

        let due = store.due_jobs("2026-07-27T00:00:00.000Z").await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, past);
    }

    #[tokio::test]
    async fn mark_job_result_updates_status_and_summary() {
        let store = SqliteJobStore::open_in_memory().unwrap();
        store.upsert_workflow(&sample_workflow()).await.unwrap();
        let job_id = store.schedule_job("w1", "2020-01-01T00:00:00.000Z", json!({})).await.unwrap();
        store
            .mark_job_result(&job_id, JobStatus::Done, json!({"ok": true, "steps": []}))
            .await
            .unwrap();
        let job = store.get_job(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.result_json.unwrap()["ok"], true);
    }
}
