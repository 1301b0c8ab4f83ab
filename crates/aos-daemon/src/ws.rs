//! Events WebSocket (§6: "for a job, frames `{type: log|progress|status|
//! event|final|error|ping, …}`; for a chat session, frames `{type:
//! chat.init|chat.message|chat.action|chat.status|chat.error|ping, …}` with
//! at-most-once-per-20s keepalive").
//!
//! Each connection drives its own job or chat session independently: there
//! is no shared subscriber fan-out bus here, just one task per socket
//! polling the in-memory job table or the outbox/agent directly, which is
//! enough to satisfy the wire contract above.

use crate::AppState;
use aos_chat::ChatStore;
use aos_core::{ConversationTurn, Role};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const PING_INTERVAL: Duration = Duration::from_secs(20);

/// `/ws/events?job_id=...` or `/ws/events?session=...`.
pub async fn events(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>, Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
    if let Some(job_id) = params.get("job_id").cloned() {
        ws.on_upgrade(move |socket| job_stream(socket, state, job_id))
    } else {
        let session_id = params.get("session").cloned().unwrap_or_else(|| "s-default".to_string());
        ws.on_upgrade(move |socket| chat_stream(socket, state, session_id))
    }
}

async fn job_stream(mut socket: WebSocket, state: Arc<AppState>, job_id: String) {
    let mut last_ping = tokio::time::Instant::now();
    loop {
        let record = state.run_jobs.read().await.get(&job_id).cloned();
        match record {
            None => {
                let _ = send_json(&mut socket, &json!({"type": "error", "message": "no such job"})).await;
                break;
            }
            Some(r) if r.done => {
                let frame = if r.ok == Some(true) {
                    json!({"type": "final", "ok": true, "trace_id": r.trace_id, "out_path": r.out_path})
                } else {
                    json!({"type": "error", "ok": false, "error": r.error})
                };
                let _ = send_json(&mut socket, &frame).await;
                break;
            }
            Some(_) => {
                if send_json(&mut socket, &json!({"type": "progress", "job_id": job_id})).await.is_err() {
                    break;
                }
            }
        }

        if last_ping.elapsed() >= PING_INTERVAL {
            if send_json(&mut socket, &json!({"type": "ping"})).await.is_err() {
                break;
            }
            last_ping = tokio::time::Instant::now();
        }

        tokio::select! {
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
            incoming = socket.recv() => {
                if matches!(incoming, None | Some(Err(_)) | Some(Ok(Message::Close(_)))) {
                    break;
                }
            }
        }
    }
}

async fn chat_stream(mut socket: WebSocket, state: Arc<AppState>, session_id: String) {
    let history = state.chat_store.history(&session_id, 100).await.unwrap_or_default();
    if send_json(&mut socket, &json!({"type": "chat.init", "session": session_id, "history": history})).await.is_err() {
        return;
    }

    let mut last_ping = tokio::time::Instant::now();
    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = handle_chat_message(&mut socket, &state, &session_id, &text).await {
                            let _ = send_json(&mut socket, &json!({"type": "chat.error", "message": e.message})).await;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    _ => {}
                }
            }
            _ = tokio::time::sleep(PING_INTERVAL) => {
                if last_ping.elapsed() >= PING_INTERVAL && send_json(&mut socket, &json!({"type": "ping"})).await.is_err() {
                    break;
                }
                last_ping = tokio::time::Instant::now();
            }
        }
    }
}

async fn handle_chat_message(socket: &mut WebSocket, state: &Arc<AppState>, session_id: &str, text: &str) -> Result<(), aos_error::AosError> {
    state
        .chat_store
        .append_message(session_id, ConversationTurn { ts: aos_core::now_iso8601(), role: Role::User, content: text.to_string(), action: None })
        .await?;

    let history = state.chat_store.history(session_id, 100).await?;
    let messages: Vec<aos_llm::ChatMessage> = history
        .iter()
        .map(|turn| aos_llm::ChatMessage::new(match turn.role {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }, turn.content.clone()))
        .collect();

    let response = state.mcp_agent.respond(session_id, &messages, text).await?;

    state
        .chat_store
        .append_message(session_id, ConversationTurn { ts: aos_core::now_iso8601(), role: Role::Assistant, content: response.reply.clone(), action: response.action.clone() })
        .await?;

    let _ = send_json(socket, &json!({"type": "chat.message", "reply": response.reply})).await;
    if response.action.is_some() {
        let _ = send_json(socket, &json!({"type": "chat.action", "action": response.action})).await;
    }
    Ok(())
}

async fn send_json(socket: &mut WebSocket, value: &serde_json::Value) -> Result<(), axum::Error> {
    socket.send(Message::Text(value.to_string().into())).await
}
