use aos_core::{now_iso8601, Approval, ConversationTurn, Role};
use aos_error::{AosError, AosResult, ErrorCode};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    session_id TEXT PRIMARY KEY,
    created_ts TEXT NOT NULL,
    task_stack_json TEXT NOT NULL DEFAULT '[]'
);
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    ts TEXT NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    action_json TEXT
);
CREATE TABLE IF NOT EXISTS approvals (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    trace_id TEXT NOT NULL,
    action_json TEXT,
    decision TEXT NOT NULL,
    payload_json TEXT NOT NULL,
    created_ts TEXT NOT NULL,
    resolved_ts TEXT
);
";

/// Durable storage for chat sessions (§3, §4.6, C11): message history,
/// one-shot human approvals, and a per-session task stack.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Appends one turn to `session_id`'s history, creating the session
    /// first if this is its first message.
    async fn append_message(&self, session_id: &str, turn: ConversationTurn) -> AosResult<()>;

    /// Returns up to `limit` turns for `session_id`, oldest first.
    async fn history(&self, session_id: &str, limit: usize) -> AosResult<Vec<ConversationTurn>>;

    /// Deletes a session and all of its messages.
    async fn clear_session(&self, session_id: &str) -> AosResult<()>;

    /// Records a resolved approval decision against a trace.
    async fn record_approval(&self, approval: &Approval) -> AosResult<()>;

    /// Lists approval records for a trace, oldest first.
    async fn list_approvals(&self, trace_id: &str) -> AosResult<Vec<Approval>>;

    /// Returns `session_id`'s task stack, defaulting to an empty array for
    /// a session that has never set one.
    async fn task_stack(&self, session_id: &str) -> AosResult<Value>;

    /// Replaces `session_id`'s task stack wholesale.
    async fn set_task_stack(&self, session_id: &str, stack: Value) -> AosResult<()>;
}

/// SQLite-backed [`ChatStore`], mirroring the original sessions/messages
/// database, extended with an approvals log and a task-stack column.
pub struct SqliteChatStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteChatStore {
    /// Opens (creating if necessary) the database at `db_path` and ensures
    /// its schema exists.
    pub fn open(db_path: impl Into<PathBuf>) -> AosResult<Self> {
        let conn =
            Connection::open(db_path.into()).map_err(|e| AosError::new(ErrorCode::Internal, "cannot open chat database").with_source(e))?;
        conn.execute_batch(SCHEMA).map_err(|e| AosError::new(ErrorCode::Internal, "cannot create chat schema").with_source(e))?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// Opens an in-memory database, useful for tests.
    pub fn open_in_memory() -> AosResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AosError::new(ErrorCode::Internal, "cannot open in-memory chat database").with_source(e))?;
        conn.execute_batch(SCHEMA).map_err(|e| AosError::new(ErrorCode::Internal, "cannot create chat schema").with_source(e))?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }
}

fn sql_err(e: rusqlite::Error) -> AosError {
    AosError::new(ErrorCode::Internal, "sqlite query failed").with_source(e)
}

fn join_err(e: tokio::task::JoinError) -> AosError {
    AosError::new(ErrorCode::Internal, "blocking sqlite task panicked").with_source(e)
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
    }
}

fn role_from_str(s: &str) -> AosResult<Role> {
    match s {
        "user" => Ok(Role::User),
        "assistant" => Ok(Role::Assistant),
        "system" => Ok(Role::System),
        other => Err(AosError::new(ErrorCode::Internal, format!("unknown role in chat database: {other}"))),
    }
}

fn decode_turn(ts: String, role: String, content: String, action_json: Option<String>) -> AosResult<ConversationTurn> {
    let action = action_json
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| AosError::new(ErrorCode::Internal, "corrupt action_json in messages table").with_source(e))?;
    Ok(ConversationTurn { ts, role: role_from_str(&role)?, content, action })
}

fn decode_approval(
    trace_id: String,
    action_json: Option<String>,
    decision: String,
    payload_json: String,
    created_ts: String,
    resolved_ts: Option<String>,
) -> AosResult<Approval> {
    let action = action_json
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| AosError::new(ErrorCode::Internal, "corrupt action_json in approvals table").with_source(e))?;
    let payload = serde_json::from_str(&payload_json)
        .map_err(|e| AosError::new(ErrorCode::Internal, "corrupt payload_json in approvals table").with_source(e))?;
    Ok(Approval { trace_id, action, decision, payload, created_ts, resolved_ts })
}

#[async_trait]
impl ChatStore for SqliteChatStore {
    async fn append_message(&self, session_id: &str, turn: ConversationTurn) -> AosResult<()> {
        let conn = self.conn.clone();
        let session_id = session_id.to_string();
        let created_ts = now_iso8601();
        tokio::task::spawn_blocking(move || {
            let action_json = turn.action.as_ref().map(|v| v.to_string());
            let conn = conn.lock().expect("chat connection mutex poisoned");
            conn.execute(
                "INSERT OR IGNORE INTO sessions (session_id, created_ts) VALUES (?1, ?2)",
                params![session_id, created_ts],
            )
            .map_err(sql_err)?;
            conn.execute(
                "INSERT INTO messages (session_id, ts, role, content, action_json) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![session_id, turn.ts, role_str(turn.role), turn.content, action_json],
            )
            .map_err(sql_err)?;
            Ok(())
        })
        .await
        .map_err(join_err)?
    }

    async fn history(&self, session_id: &str, limit: usize) -> AosResult<Vec<ConversationTurn>> {
        let conn = self.conn.clone();
        let session_id = session_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().expect("chat connection mutex poisoned");
            let mut stmt = conn
                .prepare("SELECT ts, role, content, action_json FROM messages WHERE session_id = ?1 ORDER BY id ASC LIMIT ?2")
                .map_err(sql_err)?;
            let rows = stmt
                .query_map(params![session_id, limit as i64], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?, row.get::<_, Option<String>>(3)?))
                })
                .map_err(sql_err)?;
            let mut out = Vec::new();
            for row in rows {
                let (ts, role, content, action_json) = row.map_err(sql_err)?;
                out.push(decode_turn(ts, role, content, action_json)?);
            }
            Ok(out)
        })
        .await
        .map_err(join_err)?
    }

    async fn clear_session(&self, session_id: &str) -> AosResult<()> {
        let conn = self.conn.clone();
        let session_id = session_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().expect("chat connection mutex poisoned");
            conn.execute("DELETE FROM messages WHERE session_id = ?1", params![session_id]).map_err(sql_err)?;
            conn.execute("DELETE FROM sessions WHERE session_id = ?1", params![session_id]).map_err(sql_err)?;
            Ok(())
        })
        .await
        .map_err(join_err)?
    }

    async fn record_approval(&self, approval: &Approval) -> AosResult<()> {
        let conn = self.conn.clone();
        let approval = approval.clone();
        tokio::task::spawn_blocking(move || {
            let action_json = approval.action.as_ref().map(|v| v.to_string());
            let payload_json = approval.payload.to_string();
            let conn = conn.lock().expect("chat connection mutex poisoned");
            conn.execute(
                "INSERT INTO approvals (trace_id, action_json, decision, payload_json, created_ts, resolved_ts)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![approval.trace_id, action_json, approval.decision, payload_json, approval.created_ts, approval.resolved_ts],
            )
            .map_err(sql_err)?;
            Ok(())
        })
        .await
        .map_err(join_err)?
    }

    async fn list_approvals(&self, trace_id: &str) -> AosResult<Vec<Approval>> {
        let conn = self.conn.clone();
        let trace_id = trace_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().expect("chat connection mutex poisoned");
            let mut stmt = conn
                .prepare(
                    "SELECT trace_id, action_json, decision, payload_json, created_ts, resolved_ts
                     FROM approvals WHERE trace_id = ?1 ORDER BY id ASC",
                )
                .map_err(sql_err)?;
            let rows = stmt
                .query_map(params![trace_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Option<String>>(5)?,
                    ))
                })
                .map_err(sql_err)?;
            let mut out = Vec::new();
            for row in rows {
                let (trace_id, action_json, decision, payload_json, created_ts, resolved_ts) = row.map_err(sql_err)?;
                out.push(decode_approval(trace_id, action_json, decision, payload_json, created_ts, resolved_ts)?);
            }
            Ok(out)
        })
        .await
        .map_err(join_err)?
    }

    async fn task_stack(&self, session_id: &str) -> AosResult<Value> {
        let conn = self.conn.clone();
        let session_id = session_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().expect("chat connection mutex poisoned");
            let raw: Option<String> = conn
                .query_row("SELECT task_stack_json FROM sessions WHERE session_id = ?1", params![session_id], |row| row.get(0))
                .optional()
                .map_err(sql_err)?;
            match raw {
                Some(s) => serde_json::from_str(&s).map_err(|e| AosError::new(ErrorCode::Internal, "corrupt task_stack_json").with_source(e)),
                None => Ok(Value::Array(Vec::new())),
            }
        })
        .await
        .map_err(join_err)?
    }

    async fn set_task_stack(&self, session_id: &str, stack: Value) -> AosResult<()> {
        let conn = self.conn.clone();
        let session_id = session_id.to_string();
        let created_ts = now_iso8601();
        tokio::task::spawn_blocking(move || {
            let stack_json = stack.to_string();
            let conn = conn.lock().expect("chat connection mutex poisoned");
            conn.execute(
                "INSERT INTO sessions (session_id, created_ts, task_stack_json) VALUES (?1, ?2, ?3)
                 ON CONFLICT(session_id) DO UPDATE SET task_stack_json = excluded.task_stack_json",
                params![session_id, created_ts, stack_json],
            )
            .map_err(sql_err)?;
            Ok(())
        })
        .await
        .map_err(join_err)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn turn(role: Role, content: &str) -> ConversationTurn {
        ConversationTurn { ts: now_iso8601(), role, content: content.to_string(), action: None }
    }

    #[tokio::test]
    async fn append_then_history_roundtrips_in_order() {
        let store = SqliteChatStore::open_in_memory().unwrap();
        store.append_message("s1", turn(Role::User, "hi")).await.unwrap();
        store.append_message("s1", turn(Role::Assistant, "hello")).await.unwrap();
        let history = store.history("s1", 100).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "hi");
        assert_eq!(history[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn history_respects_limit() {
        let store = SqliteChatStore::open_in_memory().unwrap();
        for i in 0..5 {
            store.append_message("s1", turn(Role::User, &format!("msg{i}"))).await.unwrap();
        }
        let history = store.history("s1", 2).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "msg0");
    }

    #[tokio::test]
    async fn clear_session_removes_its_messages() {
        let store = SqliteChatStore::open_in_memory().unwrap();
        store.append_message("s1", turn(Role::User, "hi")).await.unwrap();
        store.clear_session("s1").await.unwrap();
        assert!(store.history("s1", 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn record_and_list_approvals_for_a_trace() {
        let store = SqliteChatStore::open_in_memory().unwrap();
        let approval = Approval {
            trace_id: "t-abc".to_string(),
            action: Some(json!({"type": "mcp_call", "tool": "fs.list_dir"})),
            decision: "approve".to_string(),
            payload: json!({"note": "looks fine"}),
            created_ts: now_iso8601(),
            resolved_ts: Some(now_iso8601()),
        };
        store.record_approval(&approval).await.unwrap();
        let listed = store.list_approvals("t-abc").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].decision, "approve");
    }

    #[tokio::test]
    async fn task_stack_defaults_empty_then_can_be_replaced() {
        let store = SqliteChatStore::open_in_memory().unwrap();
        assert_eq!(store.task_stack("s1").await.unwrap(), json!([]));
        store.set_task_stack("s1", json!(["task-a", "task-b"])).await.unwrap();
        assert_eq!(store.task_stack("s1").await.unwrap(), json!(["task-a", "task-b"]));
    }

    #[tokio::test]
    async fn set_task_stack_on_existing_session_preserves_its_messages() {
        let store = SqliteChatStore::open_in_memory().unwrap();
        store.append_message("s1", turn(Role::User, "hi")).await.unwrap();
        store.set_task_stack("s1", json!(["task-a"])).await.unwrap();
        assert_eq!(store.history("s1", 100).await.unwrap().len(), 1);
        assert_eq!(store.task_stack("s1").await.unwrap(), json!(["task-a"]));
    }
}
