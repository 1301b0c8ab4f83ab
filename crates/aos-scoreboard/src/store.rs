use crate::project::ScoreRow;
use aos_error::{AosError, AosResult, ErrorCode};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS scores (
    trace_id TEXT PRIMARY KEY,
    goal TEXT,
    status TEXT,
    latency_ms INTEGER,
    score REAL,
    pass INTEGER,
    model TEXT,
    provider TEXT,
    ts TEXT
);
";

/// Durable storage for the scoreboard projection (§4.9, C13).
#[async_trait]
pub trait ScoreboardStore: Send + Sync {
    /// Inserts or replaces one row, keyed by `trace_id`.
    async fn upsert_row(&self, row: &ScoreRow) -> AosResult<()>;
    /// Returns every stored row, unordered.
    async fn all_rows(&self) -> AosResult<Vec<ScoreRow>>;
}

/// SQLite-backed [`ScoreboardStore`], mirroring the original `scores` table.
pub struct SqliteScoreboardStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteScoreboardStore {
    /// Opens (creating if necessary) the database at `db_path` and ensures
    /// its schema exists.
    pub fn open(db_path: impl Into<PathBuf>) -> AosResult<Self> {
        let conn = Connection::open(db_path.into())
            .map_err(|e| AosError::new(ErrorCode::Internal, "cannot open scoreboard database").with_source(e))?;
        conn.execute_batch(SCHEMA).map_err(|e| AosError::new(ErrorCode::Internal, "cannot create scoreboard schema").with_source(e))?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// Opens an in-memory database, useful for tests.
    pub fn open_in_memory() -> AosResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AosError::new(ErrorCode::Internal, "cannot open in-memory scoreboard database").with_source(e))?;
        conn.execute_batch(SCHEMA).map_err(|e| AosError::new(ErrorCode::Internal, "cannot create scoreboard schema").with_source(e))?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }
}

fn sql_err(e: rusqlite::Error) -> AosError {
    AosError::new(ErrorCode::Internal, "sqlite query failed").with_source(e)
}

fn join_err(e: tokio::task::JoinError) -> AosError {
    AosError::new(ErrorCode::Internal, "blocking sqlite task panicked").with_source(e)
}

fn row_to_score_row(row: &rusqlite::Row) -> rusqlite::Result<ScoreRow> {
    Ok(ScoreRow {
        trace_id: row.get(0)?,
        goal: row.get(1)?,
        status: row.get(2)?,
        latency_ms: row.get::<_, i64>(3)? as u64,
        score: row.get(4)?,
        pass: row.get::<_, Option<i64>>(5)?.map(|v| v != 0),
        model: row.get(6)?,
        provider: row.get(7)?,
        ts: row.get(8)?,
    })
}

#[async_trait]
impl ScoreboardStore for SqliteScoreboardStore {
    async fn upsert_row(&self, row: &ScoreRow) -> AosResult<()> {
        let conn = self.conn.clone();
        let row = row.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().expect("scoreboard connection mutex poisoned");
            conn.execute(
                "INSERT INTO scores (trace_id, goal, status, latency_ms, score, pass, model, provider, ts)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(trace_id) DO UPDATE SET
                   goal=excluded.goal, status=excluded.status, latency_ms=excluded.latency_ms,
                   score=excluded.score, pass=excluded.pass, model=excluded.model,
                   provider=excluded.provider, ts=excluded.ts",
                params![
                    row.trace_id,
                    row.goal,
                    row.status,
                    row.latency_ms as i64,
                    row.score,
                    row.pass.map(|p| p as i64),
                    row.model,
                    row.provider,
                    row.ts,
                ],
            )
            .map_err(sql_err)?;
            Ok(())
        })
        .await
        .map_err(join_err)?
    }

    async fn all_rows(&self) -> AosResult<Vec<ScoreRow>> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().expect("scoreboard connection mutex poisoned");
            let mut stmt = conn
                .prepare("SELECT trace_id, goal, status, latency_ms, score, pass, model, provider, ts FROM scores")
                .map_err(sql_err)?;
            let rows = stmt.query_map([], row_to_score_row).map_err(sql_err)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row.map_err(sql_err)?);
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

    fn row(trace_id: &str, score: f64, latency_ms: u64, model: &str) -> ScoreRow {
        ScoreRow {
            trace_id: trace_id.to_string(),
            goal: "weekly-report".to_string(),
            status: "success".to_string(),
            latency_ms,
            score: Some(score),
            pass: Some(score >= 0.8),
            model: Some(model.to_string()),
            provider: Some("local".to_string()),
            ts: "2026-07-27T00:00:00.000Z".to_string(),
        }
    }

    #[tokio::test]
    async fn upsert_then_list_roundtrips() {
        let store = SqliteScoreboardStore::open_in_memory().unwrap();
        store.upsert_row(&row("t-1", 0.9, 500, "mock")).await.unwrap();
        let rows = store.all_rows().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].trace_id, "t-1");
        assert_eq!(rows[0].pass, Some(true));
    }

    #[tokio::test]
    async fn upsert_is_idempotent_by_replace() {
        let store = SqliteScoreboardStore::open_in_memory().unwrap();
        store.upsert_row(&row("t-1", 0.2, 500, "mock")).await.unwrap();
        store.upsert_row(&row("t-1", 0.95, 600, "mock-v2")).await.unwrap();
        let rows = store.all_rows().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].model.as_deref(), Some("mock-v2"));
        assert_eq!(rows[0].score, Some(0.95));
    }
}
