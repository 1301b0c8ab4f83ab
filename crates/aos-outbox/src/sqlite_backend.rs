use crate::header::derive_header;
use crate::outbox::Outbox;
use aos_core::{new_trace_id, Envelope, Status};
use aos_envelope::{build_envelope, EnvelopeOptions};
use aos_error::{AosError, AosResult, ErrorCode};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;
use tokio::sync::Mutex as TokioMutex;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS episodes (
    trace_id TEXT PRIMARY KEY,
    goal TEXT NOT NULL,
    status TEXT NOT NULL,
    latency_ms INTEGER NOT NULL,
    header_json TEXT NOT NULL,
    sense_json TEXT,
    plan_json TEXT,
    artifacts_json TEXT NOT NULL,
    created_ts TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    trace_id TEXT NOT NULL,
    msg_id TEXT NOT NULL,
    ts TEXT NOT NULL,
    type TEXT NOT NULL,
    payload_json TEXT NOT NULL,
    budget_ctx_json TEXT,
    authz_json TEXT,
    labels_json TEXT,
    cost REAL
);
";

/// Relational Outbox backend (§4.3): two tables, `episodes` and `events`,
/// with the `events.id` autoincrement as the canonical per-trace order.
pub struct SqliteOutbox {
    conn: Arc<StdMutex<Connection>>,
    trace_meta: TokioMutex<HashMap<String, (Instant, String)>>,
    db_path: PathBuf,
}

impl SqliteOutbox {
    /// Opens (creating if necessary) the SQLite database at `db_path` and
    /// ensures its schema exists.
    pub fn open(db_path: impl Into<PathBuf>) -> AosResult<Self> {
        let db_path = db_path.into();
        let conn = Connection::open(&db_path)
            .map_err(|e| AosError::new(ErrorCode::Internal, "cannot open sqlite database").with_source(e))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| AosError::new(ErrorCode::Internal, "cannot create sqlite schema").with_source(e))?;
        Ok(Self {
            conn: Arc::new(StdMutex::new(conn)),
            trace_meta: TokioMutex::new(HashMap::new()),
            db_path,
        })
    }

    /// The database file path, as returned by `finalize`.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Loads every event for `trace_id`, ordered by the monotone `id`
    /// (canonical order).
    pub async fn load_events(&self, trace_id: &str) -> AosResult<Vec<Envelope>> {
        let conn = self.conn.clone();
        let trace_id = trace_id.to_string();
        tokio::task::spawn_blocking(move || load_events_blocking(&conn, &trace_id))
            .await
            .map_err(join_err)?
    }

    /// Lists every trace id whose `episodes` row exists, newest first,
    /// filtered to those starting with `prefix` (used by the Replay Engine's
    /// prefix resolution over the relational backend).
    pub async fn list_trace_ids_with_prefix(&self, prefix: &str) -> AosResult<Vec<String>> {
        let conn = self.conn.clone();
        let like = format!("{prefix}%");
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().expect("sqlite connection mutex poisoned");
            let mut stmt = conn
                .prepare("SELECT trace_id FROM episodes WHERE trace_id LIKE ?1 ORDER BY created_ts DESC")
                .map_err(sql_err)?;
            let rows = stmt.query_map(params![like], |row| row.get::<_, String>(0)).map_err(sql_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(sql_err)
        })
        .await
        .map_err(join_err)?
    }

    /// Reconstructs the full saved [`aos_core::Episode`] for `trace_id`, or
    /// `None` if no such episode was finalized.
    pub async fn load_episode(&self, trace_id: &str) -> AosResult<Option<aos_core::Episode>> {
        let conn = self.conn.clone();
        let trace_id_owned = trace_id.to_string();
        let row = tokio::task::spawn_blocking(move || load_episode_row_blocking(&conn, &trace_id_owned))
            .await
            .map_err(join_err)??;
        let Some((goal, status, latency_ms, header_json, sense_json, plan_json, artifacts_json)) = row else {
            return Ok(None);
        };
        let events = self.load_events(trace_id).await?;
        let status = match status.as_str() {
            "success" => Status::Success,
            _ => Status::Failed,
        };
        let header = serde_json::from_str(&header_json)
            .map_err(|e| AosError::new(ErrorCode::Internal, "cannot parse stored header_json").with_source(e))?;
        let sense = sense_json
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| AosError::new(ErrorCode::SchemaValidation, "cannot parse stored sense_json").with_source(e))?;
        let plan = plan_json
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| AosError::new(ErrorCode::SchemaValidation, "cannot parse stored plan_json").with_source(e))?;
        let artifacts = serde_json::from_str(&artifacts_json)
            .map_err(|e| AosError::new(ErrorCode::Internal, "cannot parse stored artifacts_json").with_source(e))?;
        Ok(Some(aos_core::Episode {
            trace_id: trace_id.to_string(),
            goal,
            status,
            latency_ms,
            header,
            events,
            sense,
            plan,
            artifacts,
        }))
    }
}

#[allow(clippy::type_complexity)]
fn load_episode_row_blocking(
    conn: &StdMutex<Connection>,
    trace_id: &str,
) -> AosResult<Option<(String, String, u64, String, Option<String>, Option<String>, String)>> {
    let conn = conn.lock().expect("sqlite connection mutex poisoned");
    conn.query_row(
        "SELECT goal, status, latency_ms, header_json, sense_json, plan_json, artifacts_json \
         FROM episodes WHERE trace_id = ?1",
        params![trace_id],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)? as u64,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, String>(6)?,
            ))
        },
    )
    .optional()
    .map_err(sql_err)
}

fn load_events_blocking(conn: &StdMutex<Connection>, trace_id: &str) -> AosResult<Vec<Envelope>> {
    let conn = conn.lock().expect("sqlite connection mutex poisoned");
    let mut stmt = conn
        .prepare(
            "SELECT msg_id, ts, type, payload_json, budget_ctx_json, authz_json, labels_json, cost \
             FROM events WHERE trace_id = ?1 ORDER BY id ASC",
        )
        .map_err(sql_err)?;
    let rows = stmt
        .query_map(params![trace_id], |row| {
            let payload_json: String = row.get(3)?;
            let budget_ctx_json: Option<String> = row.get(4)?;
            let authz_json: Option<String> = row.get(5)?;
            let labels_json: Option<String> = row.get(6)?;
            Ok(Envelope {
                msg_id: row.get(0)?,
                trace_id: trace_id.to_string(),
                schema_ver: aos_core::SCHEMA_VERSION.to_string(),
                ts: row.get(1)?,
                event_type: row.get(2)?,
                payload: serde_json::from_str(&payload_json).unwrap_or(Value::Null),
                budget_ctx: budget_ctx_json.and_then(|s| serde_json::from_str(&s).ok()),
                authz: authz_json.and_then(|s| serde_json::from_str(&s).ok()),
                labels: labels_json.and_then(|s| serde_json::from_str(&s).ok()),
                cost: row.get(7)?,
            })
        })
        .map_err(sql_err)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(sql_err)
}

fn sql_err(e: rusqlite::Error) -> AosError {
    AosError::new(ErrorCode::Internal, "sqlite query failed").with_source(e)
}

fn join_err(e: tokio::task::JoinError) -> AosError {
    AosError::new(ErrorCode::Internal, "blocking sqlite task panicked").with_source(e)
}

#[async_trait]
impl Outbox for SqliteOutbox {
    async fn new_trace(&self, goal: &str) -> AosResult<String> {
        let trace_id = new_trace_id();
        let mut meta = self.trace_meta.lock().await;
        meta.insert(trace_id.clone(), (Instant::now(), goal.to_string()));
        Ok(trace_id)
    }

    async fn append(
        &self,
        trace_id: &str,
        event_type: &str,
        payload: Value,
        opts: EnvelopeOptions,
    ) -> AosResult<()> {
        {
            let meta = self.trace_meta.lock().await;
            if !meta.contains_key(trace_id) {
                return Err(AosError::new(ErrorCode::NotFound, format!("no such trace {trace_id:?}"))
                    .with_context("trace_id", trace_id));
            }
        }
        let envelope = build_envelope(trace_id, event_type, payload, opts)?;
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || insert_event_blocking(&conn, &envelope))
            .await
            .map_err(join_err)?
    }

    async fn finalize(&self, trace_id: &str, status: Status, artifacts: Value) -> AosResult<String> {
        let (started, goal) = {
            let meta = self.trace_meta.lock().await;
            meta.get(trace_id)
                .cloned()
                .ok_or_else(|| AosError::new(ErrorCode::NotFound, format!("no such trace {trace_id:?}")))?
        };

        let events = self.load_events(trace_id).await?;
        let header = derive_header(&events);
        let sense = crate::header::extract_last(&events, "sense.srs_loaded", "srs");
        let plan = crate::header::extract_last(&events, "plan.generated", "plan");
        let latency_ms = started.elapsed().as_millis() as u64;

        let conn = self.conn.clone();
        let trace_id_owned = trace_id.to_string();
        let goal_owned = goal.clone();
        let status_str = match status {
            Status::Success => "success",
            Status::Failed => "failed",
        }
        .to_string();
        let header_json = serde_json::to_string(&header)
            .map_err(|e| AosError::new(ErrorCode::Internal, "cannot serialize header").with_source(e))?;
        let sense_json = sense.map(|v| v.to_string());
        let plan_json = plan.map(|v| v.to_string());
        let artifacts_json = artifacts.to_string();
        let created_ts = aos_core::now_iso8601();

        tokio::task::spawn_blocking(move || {
            upsert_episode_blocking(
                &conn,
                &trace_id_owned,
                &goal_owned,
                &status_str,
                latency_ms,
                &header_json,
                sense_json.as_deref(),
                plan_json.as_deref(),
                &artifacts_json,
                &created_ts,
            )
        })
        .await
        .map_err(join_err)??;

        Ok(self.db_path.to_string_lossy().into_owned())
    }
}

fn insert_event_blocking(conn: &StdMutex<Connection>, envelope: &Envelope) -> AosResult<()> {
    let conn = conn.lock().expect("sqlite connection mutex poisoned");
    conn.execute(
        "INSERT INTO events (trace_id, msg_id, ts, type, payload_json, budget_ctx_json, authz_json, labels_json, cost) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            envelope.trace_id,
            envelope.msg_id,
            envelope.ts,
            envelope.event_type,
            envelope.payload.to_string(),
            envelope.budget_ctx.as_ref().map(|v| v.to_string()),
            envelope.authz.as_ref().map(|v| v.to_string()),
            envelope.labels.as_ref().map(|v| v.to_string()),
            envelope.cost,
        ],
    )
    .map_err(sql_err)?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn upsert_episode_blocking(
    conn: &StdMutex<Connection>,
    trace_id: &str,
    goal: &str,
    status: &str,
    latency_ms: u64,
    header_json: &str,
    sense_json: Option<&str>,
    plan_json: Option<&str>,
    artifacts_json: &str,
    created_ts: &str,
) -> AosResult<()> {
    let conn = conn.lock().expect("sqlite connection mutex poisoned");
    conn.execute(
        "REPLACE INTO episodes (trace_id, goal, status, latency_ms, header_json, sense_json, plan_json, artifacts_json, created_ts) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            trace_id,
            goal,
            status,
            latency_ms as i64,
            header_json,
            sense_json,
            plan_json,
            artifacts_json,
            created_ts,
        ],
    )
    .map_err(sql_err)?;
    Ok(())
}

/// Fetches the most recently created trace ids, newest first (used by
/// `aos-cli episodes list`-style callers).
pub fn list_traces(conn: &StdMutex<Connection>, limit: u32) -> AosResult<Vec<String>> {
    let conn = conn.lock().expect("sqlite connection mutex poisoned");
    let mut stmt = conn
        .prepare("SELECT trace_id FROM episodes ORDER BY created_ts DESC LIMIT ?1")
        .map_err(sql_err)?;
    let rows = stmt
        .query_map(params![limit], |row| row.get::<_, String>(0))
        .map_err(sql_err)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(sql_err)
}

/// Fetches one episode's `header_json`/`sense_json`/`plan_json`/etc. row, or
/// `None` if absent.
pub fn fetch_episode_row(
    conn: &StdMutex<Connection>,
    trace_id: &str,
) -> AosResult<Option<(String, String, u64, String)>> {
    let conn = conn.lock().expect("sqlite connection mutex poisoned");
    conn.query_row(
        "SELECT goal, status, latency_ms, header_json FROM episodes WHERE trace_id = ?1",
        params![trace_id],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)? as u64,
                row.get::<_, String>(3)?,
            ))
        },
    )
    .optional()
    .map_err(sql_err)
}
