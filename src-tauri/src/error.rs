//! Typed errors that cross the command boundary.
//!
//! Internals still use `anyhow::Result` for context chains (spawn failures,
//! I/O, poisoned locks); `CoreError` is the shape every `#[tauri::command]`
//! actually returns, so the frontend gets `{ kind, message }` instead of a
//! bare string.

use serde::Serialize;

#[derive(Debug, Clone, thiserror::Error, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "camelCase")]
pub enum CoreError {
    #[error("max sessions reached: {0}")]
    PoolExhausted(String),

    #[error("spawn failed: {0}")]
    SpawnFailed(String),

    #[error("no such session: {0}")]
    NoSuchSession(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("io error: {0}")]
    IoError(String),

    #[error("initialization failed: {0}")]
    InitializationFailed(String),
}

impl CoreError {
    pub fn no_such_session(session_id: usize) -> Self {
        CoreError::NoSuchSession(format!("session {session_id} does not exist"))
    }
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
