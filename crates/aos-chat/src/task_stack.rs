use crate::store::ChatStore;
use aos_error::{AosError, AosResult, ErrorCode};
use serde_json::Value;

/// Pushes `task` onto `session_id`'s task stack and returns the updated
/// stack (§3: "per-session task stack (opaque JSON blob)").
pub async fn push_task(store: &dyn ChatStore, session_id: &str, task: Value) -> AosResult<Value> {
    let mut stack = store.task_stack(session_id).await?;
    let array = stack.as_array_mut().ok_or_else(|| AosError::new(ErrorCode::Internal, "task stack is not a JSON array"))?;
    array.push(task);
    store.set_task_stack(session_id, stack.clone()).await?;
    Ok(stack)
}

/// Pops and returns the top of `session_id`'s task stack, or `None` if it
/// is empty.
pub async fn pop_task(store: &dyn ChatStore, session_id: &str) -> AosResult<Option<Value>> {
    let mut stack = store.task_stack(session_id).await?;
    let popped = stack.as_array_mut().ok_or_else(|| AosError::new(ErrorCode::Internal, "task stack is not a JSON array"))?.pop();
    store.set_task_stack(session_id, stack).await?;
    Ok(popped)
}
